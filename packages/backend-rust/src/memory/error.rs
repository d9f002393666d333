use serde::Serialize;
use thiserror::Error;

use crate::memory::store::StoreError;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory unit not found: {0}")]
    NotFound(String),
    #[error("memory unit {0} does not belong to owner")]
    Forbidden(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("storage failure: {0}")]
    Infrastructure(#[from] StoreError),
}

/// Why a single batch item was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemError {
    #[error("unit not found")]
    NotFound,
    #[error("unit does not belong to owner")]
    Forbidden,
    #[error("{0}")]
    Validation(String),
    #[error("unit was modified concurrently")]
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("item {index} ({unit_id}): {error}")]
pub struct ItemFailure {
    pub index: usize,
    pub unit_id: String,
    pub error: ItemError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{} batch item(s) failed: {}", .failures.len(), summarize(.failures))]
pub struct PartialBatchFailure {
    pub failures: Vec<ItemFailure>,
}

impl PartialBatchFailure {
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }
}

fn summarize(failures: &[ItemFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
