//! Top-level error type for deployment runs.
//!
//! [`DeployError`] is what every public engine operation returns. Lower
//! layers have their own error types ([`ObjectError`], [`ExecutorError`],
//! [`ArchiveError`]) which are wrapped here with the context the invocation
//! handler needs to log and notify.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::executor::ExecutorError;
use crate::store::ObjectError;
use crate::types::task::TaskKind;

/// Errors that end the current invocation.
///
/// None of these mutate the last persisted continuation record, so the run
/// can be resumed by re-delivering that record's marker object, except for
/// [`NotFound`](DeployError::NotFound) and [`Corrupt`](DeployError::Corrupt)
/// which mean the run is dead.
///
/// # Examples
///
/// ```
/// use lambduh::DeployError;
///
/// let err = DeployError::ConfigMissing { path: "lambduh.json".to_string() };
/// assert!(err.to_string().contains("lambduh.json"));
/// assert!(!err.is_dead_run());
///
/// let err = DeployError::NotFound { key: "1700000000000/remainingTasks/00003.lambduh.txt".to_string() };
/// assert!(err.is_dead_run());
/// ```
#[derive(Debug, Error)]
pub enum DeployError {
    /// The archive did not contain the deployment document.
    #[error("deployment document not found: {path}")]
    ConfigMissing {
        /// Path that was looked up inside the extracted tree.
        path: String,
    },

    /// The deployment document exists but cannot be used.
    #[error("invalid deployment document {path}: {message}")]
    ConfigInvalid {
        /// Path of the offending document.
        path: String,
        /// What was wrong with it.
        message: String,
    },

    /// Writing a continuation record failed.
    #[error("failed to persist continuation {key}")]
    StorageWrite {
        /// Key that could not be written.
        key: String,
        /// Underlying cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The continuation record named by the trigger does not exist.
    #[error("continuation record not found: {key}")]
    NotFound {
        /// Missing key.
        key: String,
    },

    /// The continuation record could not be decoded.
    #[error("continuation record {key} is corrupt")]
    Corrupt {
        /// Offending key.
        key: String,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },

    /// A task step failed.
    #[error("{kind} task step failed")]
    Executor {
        /// Kind of the task whose step failed.
        kind: TaskKind,
        /// Executor failure.
        #[source]
        source: ExecutorError,
    },

    /// No executor is registered for a queued task kind.
    #[error("no executor registered for {kind} tasks")]
    NoExecutor {
        /// The unhandled kind.
        kind: TaskKind,
    },

    /// Run-scoped objects were still present after the last cleanup pass.
    #[error("{remaining} object(s) left under {prefix} after cleanup")]
    CleanupIncomplete {
        /// Prefix being cleaned.
        prefix: String,
        /// Objects still listed under it.
        remaining: usize,
    },

    /// The deployment archive could not be unpacked.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Any other object storage failure.
    #[error(transparent)]
    Storage(#[from] ObjectError),
}

impl DeployError {
    /// Returns `true` when the run cannot be resumed from its trigger key.
    pub fn is_dead_run(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Corrupt { .. })
    }
}
