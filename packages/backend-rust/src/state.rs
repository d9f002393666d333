use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::db::Database;
use crate::services::memory::MemoryService;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    database: Option<Database>,
    memory: Arc<MemoryService>,
}

impl AppState {
    pub fn new(memory: Arc<MemoryService>, database: Option<Database>) -> Self {
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            database,
            memory,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    /// `None` when the service runs on the in-process store.
    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub fn memory(&self) -> Arc<MemoryService> {
        Arc::clone(&self.memory)
    }
}
