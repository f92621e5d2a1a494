//! Resumable serverless deployment orchestrator.
//!
//! `lambduh` runs inside a time-limited function invocation that is
//! triggered by objects landing in storage. A new archive starts a *run*:
//! the archive is unpacked, its declarative task list is ordered and
//! filtered, and the first unit of work is executed. Every invocation then
//! performs exactly one unit of work and persists the remaining work as a
//! continuation record, whose creation triggers the next invocation. When
//! the queue drains, a completion notification fires and the run's
//! temporary objects are removed.
//!
//! # Module Organization
//!
//! - [`types`] - Task descriptors, the deployment document, run context and
//!   continuation records
//! - [`loader`] / [`filter`] - Document loading, task ordering and include filters
//! - [`engine`] - The continuation state machine
//! - [`queue`] - Continuation persistence on top of an [`store::ObjectStore`]
//! - [`executor`] - Task executor contract, registry and built-in asset sync
//! - [`archive`] - Archive extraction into a scratch workspace
//! - [`notify`] - Lifecycle notifications
//! - [`trigger`] - Storage event parsing and classification
//! - [`config`] / [`logging`] - Engine configuration and tracing setup

pub mod archive;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod executor;
pub mod filter;
pub mod loader;
#[cfg(feature = "logging")]
pub mod logging;
pub mod notify;
pub mod queue;
pub mod store;
pub mod trigger;
pub mod types;

pub use config::EngineConfig;
pub use engine::{Engine, InvocationOutcome};
pub use error::DeployError;
pub use types::*;
