use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::permissions::{Permission, Permissions};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Role {
    pub id: i32,
    pub name: String,
    #[schema(value_type = Vec<Permission>)]
    pub permissions: Permissions,
    /// The default role every member holds. Cannot be renamed or deleted.
    pub system_role: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub permissions: Permissions,
    pub system_role: bool,
}
