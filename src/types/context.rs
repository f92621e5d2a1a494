//! Run-scoped state carried from one invocation to the next.
//!
//! [`RunContext`] is created once when a run starts and rewritten on every
//! persist. Everything a later invocation needs (the remaining queue, the
//! run's identity, resources allocated by earlier steps) lives here; the
//! process itself keeps nothing between invocations.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::document::NotificationConfig;
use super::task::{TaskDescriptor, TaskKind};

/// Host invocation details the engine needs but cannot derive itself.
///
/// # Examples
///
/// ```
/// use lambduh::InvocationContext;
///
/// let ctx = InvocationContext::from_function_arn(
///     "arn:aws:lambda:eu-west-1:123456789012:function:lambduh",
///     300,
/// );
/// assert_eq!(ctx.region, "eu-west-1");
/// assert_eq!(ctx.account_id, "123456789012");
/// assert_eq!(ctx.function_timeout_seconds, 300);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationContext {
    pub region: String,
    pub account_id: String,
    pub function_timeout_seconds: u64,
}

impl InvocationContext {
    /// Parses region and account out of a function ARN
    /// (`arn:aws:lambda:<region>:<account>:function:<name>`).
    ///
    /// Unparseable ARNs leave both fields empty.
    pub fn from_function_arn(arn: &str, function_timeout_seconds: u64) -> Self {
        let mut parts = arn.split(':');
        let region = parts.nth(3).unwrap_or_default().to_string();
        let account_id = parts.next().unwrap_or_default().to_string();
        Self {
            region,
            account_id,
            function_timeout_seconds,
        }
    }
}

/// An HTTP API deployed during the run, kept for the completion summary and
/// for later steps that reference its identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedApiSummary {
    pub api_id: String,
    pub api_name: String,
    pub stage_name: String,
    pub region: String,
}

impl DeployedApiSummary {
    /// Public invoke URL of the deployed stage.
    pub fn url(&self) -> String {
        format!(
            "https://{}.execute-api.{}.amazonaws.com/{}",
            self.api_id, self.region, self.stage_name
        )
    }
}

/// State of one deployment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunContext {
    pub application_name: String,

    /// Remaining tasks; the front entry is the one in progress.
    pub tasks: Vec<TaskDescriptor>,

    /// Run start, fixed for the whole run and serialized as epoch millis.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,

    /// Index of the last persisted continuation; `-1` before the first.
    pub invocation_index: i64,

    #[serde(default)]
    pub region: String,

    #[serde(default)]
    pub account_id: String,

    #[serde(default)]
    pub function_timeout_seconds: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_config: Option<NotificationConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deployed_api_summaries: Vec<DeployedApiSummary>,

    /// Whether the archived input is removed along with the run.
    #[serde(default)]
    pub no_history: bool,

    /// Consecutive steps on the front task that made no progress.
    #[serde(default)]
    pub stalled_steps: u32,
}

impl RunContext {
    /// Creates the context for a fresh run. The start time is truncated to
    /// millisecond precision so it survives serialization unchanged.
    pub fn new(
        application_name: impl Into<String>,
        tasks: Vec<TaskDescriptor>,
        start_time: DateTime<Utc>,
        invocation: &InvocationContext,
    ) -> Self {
        let start_time =
            DateTime::from_timestamp_millis(start_time.timestamp_millis()).unwrap_or(start_time);
        Self {
            application_name: application_name.into(),
            tasks,
            start_time,
            invocation_index: -1,
            region: invocation.region.clone(),
            account_id: invocation.account_id.clone(),
            function_timeout_seconds: invocation.function_timeout_seconds,
            notification_config: None,
            deployed_api_summaries: Vec::new(),
            no_history: false,
            stalled_steps: 0,
        }
    }

    /// Storage prefix owning every object of this run.
    pub fn run_prefix(&self) -> String {
        self.start_time.timestamp_millis().to_string()
    }

    /// Number of invocations the run has used, counting the current one.
    pub fn invocation_count(&self) -> i64 {
        self.invocation_index + 2
    }

    /// Wall-clock time since the run started.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.start_time)
    }

    /// Task and unit counts per kind, in group order.
    pub fn task_counts(&self) -> BTreeMap<TaskKind, (usize, usize)> {
        let mut counts = BTreeMap::new();
        for task in &self.tasks {
            let entry = counts.entry(task.kind()).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += task.remaining();
        }
        counts
    }

    /// Records a deployed API, replacing an earlier entry for the same
    /// API and stage.
    pub fn record_api(&mut self, summary: DeployedApiSummary) {
        match self
            .deployed_api_summaries
            .iter_mut()
            .find(|s| s.api_id == summary.api_id && s.stage_name == summary.stage_name)
        {
            Some(existing) => *existing = summary,
            None => self.deployed_api_summaries.push(summary),
        }
    }
}
