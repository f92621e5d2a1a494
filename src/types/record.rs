//! The continuation record written between invocations.

use serde::{Deserialize, Serialize};

use super::context::RunContext;
use crate::trigger::StorageEventRecord;

/// Durable hand-off from one invocation to the next.
///
/// `original_source` is the event that started the run; resumed
/// invocations use it to locate and re-extract the deployment archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationRecord {
    pub original_source: StorageEventRecord,
    pub remaining_tasks: RunContext,
}

impl ContinuationRecord {
    pub fn new(original_source: StorageEventRecord, remaining_tasks: RunContext) -> Self {
        Self {
            original_source,
            remaining_tasks,
        }
    }

    /// Shorthand for the run context.
    pub fn run(&self) -> &RunContext {
        &self.remaining_tasks
    }
}
