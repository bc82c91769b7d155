//! Service layer behind the HTTP surface.
//!
//! 1. **Executor** (`executor`): bounded worker pool that carries the
//!    submitter's context into every task
//! 2. **Processing** (`processing`): demo business logic used by the handlers
//! 3. **Housekeeping** (`worker`): periodic session reaping

pub mod config;
pub mod executor;
pub mod processing;
pub mod worker;

// Re-export key types for convenient access.
pub use config::ServerConfig;
pub use executor::{ContextExecutor, ExecutorConfig, ExecutorError, RejectionPolicy, TaskHandle};
pub use processing::ProcessingService;
pub use worker::{Housekeeper, HousekeepingWorker, SessionReaper};
