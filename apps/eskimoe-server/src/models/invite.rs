use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Invite {
    pub id: i32,
    pub code: String,
    pub used: bool,
    pub generated_by: i32,
    pub used_by: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInvite {
    pub code: String,
    pub generated_by: i32,
}
