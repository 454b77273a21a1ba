use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::ordered_ids::OrderedIds;
use super::room::Room;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Category {
    pub id: i32,
    pub name: String,
    #[schema(value_type = Vec<i32>)]
    pub room_order: OrderedIds,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
}

/// A category with its rooms resolved in display order.
#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryWithRooms {
    #[serde(flatten)]
    pub category: Category,
    pub rooms: Vec<Room>,
}

impl CategoryWithRooms {
    /// Picks this category's rooms out of `rooms`, following `room_order`.
    /// Rooms missing from the order are appended by id.
    pub fn assemble(category: Category, rooms: &[Room]) -> Self {
        let mut own: Vec<Room> = rooms
            .iter()
            .filter(|room| room.category_id == category.id)
            .cloned()
            .collect();
        category.room_order.sort_by_order(&mut own, |room| room.id);
        Self {
            category,
            rooms: own,
        }
    }
}
