use std::sync::Arc;

use config::Config;
use governor::RequestGovernor;
use sqlx::PgPool;
use store::KeyValueStore;

pub mod cache;
pub mod common;
pub mod config;
pub mod error;
pub mod governor;
pub mod middleware;
pub mod result;
pub mod router;
pub mod routes;
pub mod store;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub store: Arc<dyn KeyValueStore>,
    pub governor: Arc<RequestGovernor>,
}
