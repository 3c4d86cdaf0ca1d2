//! # Pipeline Module
//!
//! Orchestrazione della conversione, separata in sottomoduli:
//! - `controller`: ciclo di vita del run, cancellazione, `RunResult`
//! - `scheduler`: coda bounded, discovery e pool di worker
//! - `progress`: contatori, stima del tempo residuo, observer
//! - `path_resolver`: path di output e scrittura atomica

pub mod controller;
pub mod path_resolver;
pub mod progress;
pub mod scheduler;

pub use controller::{CancelHandle, RunController, RunResult};
pub use path_resolver::PathResolver;
pub use progress::{ProgressAggregator, ProgressEvent, ProgressObserver, ProgressSnapshot, TaskIssue};
pub use scheduler::WorkScheduler;
