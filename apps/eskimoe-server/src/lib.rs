pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod permissions;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::store::EntityStore;
use gateway::hub::HubHandle;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub hub: HubHandle,
    pub config: Arc<Config>,
}
