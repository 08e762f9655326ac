//! Gallery synchronization: photo records, cancellable timers and the
//! reconciliation of optimistic uploads with the remote listing.

mod model;
mod reconcile;
mod scheduler;

pub use model::{PhotoRecord, RemoteMetadata, SyncStatus};
pub use reconcile::{
    merge, EngineSettings, FetchOutcome, ReconciliationEngine, DEFAULT_MATCH_WINDOW,
    DEFAULT_OPTIMISTIC_EXPIRY,
};
pub use scheduler::{Scheduler, TaskToken};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("API Client Error: {0}")]
    ApiClientError(String),
    #[error("Engine has been shut down")]
    ShutDown,
}
