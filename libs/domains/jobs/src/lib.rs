//! Jobs Domain
//!
//! Tracks long-running background work per subject: one status row per
//! (subject, job kind) and one cached result per subject.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  JobRunner  │  ← spawns the job, writes exactly one terminal state
//! └──────┬──────┘
//!        │
//! ┌──────▼──────────────────────┐
//! │ JobStatusStore / ResultCache│  ← lifecycle rules, lazy expiry
//! └──────┬──────────────────────┘
//!        │
//! ┌──────▼──────┐
//! │ Repository  │  ← key-based persistence (trait + implementations)
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use domain_jobs::{
//!     InMemoryJobStatusRepository, InMemoryResultCacheRepository, JobRunner, JobStatusStore,
//!     ResultCache, SystemClock,
//! };
//!
//! let clock = Arc::new(SystemClock);
//! let store = JobStatusStore::new(Arc::new(InMemoryJobStatusRepository::new()), clock.clone());
//! let cache = ResultCache::new(Arc::new(InMemoryResultCacheRepository::new()), clock);
//! let runner = JobRunner::new(store, cache);
//! ```

pub mod cache;
pub mod clock;
pub mod entity;
pub mod error;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod runner;
pub mod store;

pub use cache::ResultCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{JobError, JobResult};
pub use models::{
    BillingProgress, BillingSummary, CacheSnapshot, DeployChecklist, DeployPhase, JobDetails,
    JobKind, JobState, JobStatus, MonthTotal, PhaseEntry, PhaseState, RefreshProgress,
};
pub use postgres::{PgJobStatusRepository, PgResultCacheRepository};
pub use repository::{
    InMemoryJobStatusRepository, InMemoryResultCacheRepository, JobStatusRepository,
    ResultCacheRepository,
};
pub use runner::{JobHandle, JobOutcome, JobRunner, Submission};
pub use store::JobStatusStore;
