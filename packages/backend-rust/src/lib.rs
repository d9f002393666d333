pub mod config;
pub mod db;
pub mod logging;
pub mod memory;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::MemoryConfig;
use crate::db::Database;
use crate::memory::clock::{Clock, SystemClock};
use crate::memory::store::{MemoryReviewStore, MemoryUnitStore};
use crate::services::memory::MemoryService;
use crate::state::AppState;

/// Wires the service over any store pair and wraps it in the HTTP stack.
pub fn build_router(
    units: Arc<dyn MemoryUnitStore>,
    reviews: Arc<dyn MemoryReviewStore>,
    clock: Arc<dyn Clock>,
    config: MemoryConfig,
    database: Option<Database>,
) -> axum::Router {
    let memory = Arc::new(MemoryService::new(units, reviews, clock, config));
    let state = AppState::new(memory, database);

    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub fn create_app(database: Database, config: MemoryConfig) -> axum::Router {
    let store = Arc::new(database.clone());
    build_router(
        store.clone(),
        store,
        Arc::new(SystemClock),
        config,
        Some(database),
    )
}
