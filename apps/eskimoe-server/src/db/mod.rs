pub mod memory;
pub mod pool;
pub mod postgres;
pub mod schema;
pub mod seed;
pub mod store;
