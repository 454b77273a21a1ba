pub mod broadcast;
pub mod id;

pub use broadcast::{BroadcastType, Envelope};
pub use id::PrefixedId;
