//! Task executors.
//!
//! An executor performs exactly one externally visible unit of work for the
//! task at the front of the queue and returns a *new* descriptor with that
//! unit removed. The engine swaps the new descriptor in only after the step
//! succeeded, so a failed step leaves the queue exactly as it was and the
//! step can be retried with the same input.
//!
//! Executors must tolerate at-least-once execution: a step whose result was
//! lost (crash or failed persist) runs again on the next invocation.

pub mod asset_sync;
pub mod throttle;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::store::ObjectError;
use crate::types::context::{DeployedApiSummary, RunContext};
use crate::types::task::{TaskDescriptor, TaskKind};

pub use asset_sync::AssetSyncExecutor;
pub use throttle::{retry_transient, RetryPolicy, Throttle};

/// Failure of a single step.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The step was rejected; retrying in-process will not help.
    #[error("{kind} step failed: {message}")]
    Failed { kind: TaskKind, message: String },

    /// A retryable condition (rate limit, permission propagation) that
    /// outlasted local retries or is reported for the caller to retry.
    #[error("transient failure: {message}")]
    Transient { message: String },

    /// The executor was handed a task of another kind.
    #[error("executor for {expected} received a {actual} task")]
    WrongKind { expected: TaskKind, actual: TaskKind },

    /// The step handed back a task of another kind.
    #[error("{expected} step returned a {actual} task")]
    KindChanged { expected: TaskKind, actual: TaskKind },

    /// The step reported a finished unit but the worklist did not shrink.
    #[error("{kind} step reported progress but left {remaining} unit(s) in place")]
    NoProgress { kind: TaskKind, remaining: usize },

    /// The same unit stayed pending for too many invocations.
    #[error("{kind} step made no progress in {attempts} attempt(s)")]
    Stalled { kind: TaskKind, attempts: u32 },

    #[error(transparent)]
    Store(#[from] ObjectError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient { .. } => true,
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// What an executor sees during a step.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub run: &'a RunContext,
    /// Root of the extracted archive.
    pub workspace: &'a Path,
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// The descriptor to keep at the front of the queue. An empty worklist
    /// pops the task.
    pub task: TaskDescriptor,

    /// `false` when the call made no visible progress and wants the same
    /// unit retried on the next invocation.
    pub done: bool,

    /// APIs allocated by this step, merged into the run context.
    pub deployed_apis: Vec<DeployedApiSummary>,
}

impl StepOutcome {
    /// The front unit finished; `task` is the shrunk descriptor.
    pub fn advanced(task: TaskDescriptor) -> Self {
        Self {
            task,
            done: true,
            deployed_apis: Vec::new(),
        }
    }

    /// Nothing changed; retry the same unit next invocation.
    pub fn pending(task: TaskDescriptor) -> Self {
        Self {
            task,
            done: false,
            deployed_apis: Vec::new(),
        }
    }

    pub fn with_deployed_api(mut self, summary: DeployedApiSummary) -> Self {
        self.deployed_apis.push(summary);
        self
    }
}

/// Executes units of work for one task kind.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// Performs one unit of work for `task`.
    ///
    /// Implementations must not loop over the whole worklist and must
    /// surface failures instead of swallowing them.
    async fn step(
        &self,
        task: &TaskDescriptor,
        ctx: StepContext<'_>,
    ) -> Result<StepOutcome, ExecutorError>;
}

/// Executors by task kind.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<TaskKind, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `executor` for its kind, replacing any previous one.
    pub fn register(&mut self, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(executor.kind(), executor);
    }

    pub fn get(&self, kind: TaskKind) -> Option<&Arc<dyn TaskExecutor>> {
        self.executors.get(&kind)
    }

    pub fn kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<TaskKind> = self.executors.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
