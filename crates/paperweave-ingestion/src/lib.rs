//! paperweave-ingestion: incremental metadata sync.
//!
//! - OAI-PMH harvesting under a sliding-window rate limit and retry policy
//! - Dublin Core record to canonical entity transform
//! - Sync orchestration with checkpoint advance only after durable commit
//! - Daily scheduler with overrun skipping

pub mod error;
pub mod harvester;
pub mod models;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
pub mod sources;
pub mod sync;
pub mod transform;

pub use error::{HarvestError, SyncError, TransformError};
pub use harvester::{HarvestSession, ProtocolHarvester};
pub use models::{OaiPage, RawRecord, RepositoryInfo};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use scheduler::{DailySchedule, ScheduleError, Scheduler, SyncJob, TickOutcome};
pub use sync::{SyncOptions, SyncOrchestrator, SyncReport};
