//! The continuation engine.
//!
//! One invocation walks this state machine and stops at the first terminal
//! phase:
//!
//! ```text
//! LoadAndFilter ──► Dispatch ──► StepExecuting ──► Persisted (yield)
//!  (new runs only)     │
//!                      └──────► Complete (queue empty)
//! ```
//!
//! `Persisted` is the only suspension point. The record it writes is the
//! trigger of the next invocation, which re-enters at `Dispatch`. Nothing
//! is kept in memory between invocations.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::archive::{ArchiveExtractor, StoreArchiveExtractor, Workspace};
use crate::config::EngineConfig;
use crate::error::DeployError;
use crate::executor::{
    AssetSyncExecutor, ExecutorError, ExecutorRegistry, StepContext, StepOutcome, TaskExecutor,
};
use crate::loader;
use crate::notify::{self, NoopNotifier, Notification, Notifier};
use crate::queue::ContinuationQueue;
use crate::store::{ObjectLocation, ObjectStore};
use crate::trigger::{IgnoreReason, StorageEvent, StorageEventRecord, Trigger};
use crate::types::context::{InvocationContext, RunContext};
use crate::types::document::NotificationConfig;
use crate::types::record::ContinuationRecord;
use crate::types::task::TaskKind;

/// Result of handling one event record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InvocationOutcome {
    /// The record was not an archive or a continuation marker.
    Ignored { key: String, reason: IgnoreReason },

    /// One step ran and the continuation was written to `key`.
    Yielded {
        key: String,
        invocation_index: i64,
        remaining_tasks: usize,
    },

    /// The queue was empty; the run was notified and cleaned up.
    Completed {
        application_name: String,
        invocations: i64,
        cleaned_up: usize,
    },
}

/// States of one invocation.
#[derive(Debug)]
enum Phase {
    LoadAndFilter { archive: ObjectLocation },
    Dispatch,
    StepExecuting,
    Persisted,
    Complete,
}

/// Mutable state of the invocation being driven.
struct Invocation {
    /// Bucket holding the run's continuation records.
    state_bucket: String,
    trigger: StorageEventRecord,
    record: Option<ContinuationRecord>,
    workspace: Option<Workspace>,
}

impl Invocation {
    fn run(&self) -> Option<&RunContext> {
        self.record.as_ref().map(ContinuationRecord::run)
    }

    /// Location of the run's input archive, recovered from the record.
    fn trigger_archive(&self) -> Result<ObjectLocation, DeployError> {
        self.record
            .as_ref()
            .map(|record| record.original_source.location())
            .ok_or_else(|| DeployError::NotFound {
                key: self.trigger.location().key,
            })
    }

    fn record_mut(&mut self) -> Result<&mut ContinuationRecord, DeployError> {
        self.record
            .as_mut()
            .ok_or_else(|| DeployError::NotFound {
                key: self.trigger.location().key,
            })
    }
}

/// Drives deployment runs one step per invocation.
///
/// Collaborators are injected at construction; the engine reads no ambient
/// configuration.
pub struct Engine {
    config: EngineConfig,
    queue: ContinuationQueue,
    extractor: Arc<dyn ArchiveExtractor>,
    executors: ExecutorRegistry,
    notifier: Arc<dyn Notifier>,
}

impl Engine {
    /// Creates an engine with the built-in asset-sync executor, archive
    /// extraction through `store` and no notifications.
    pub fn new(config: EngineConfig, store: Arc<dyn ObjectStore>) -> Self {
        let mut executors = ExecutorRegistry::new();
        executors.register(Arc::new(AssetSyncExecutor::from_config(
            store.clone(),
            &config,
        )));
        let extractor: Arc<dyn ArchiveExtractor> = Arc::new(StoreArchiveExtractor::new(
            store.clone(),
            config.work_dir.clone(),
        ));
        Self {
            queue: ContinuationQueue::from_config(store, &config),
            config,
            extractor,
            executors,
            notifier: Arc::new(NoopNotifier),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Registers an executor, replacing any existing one for its kind.
    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executors.register(executor);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handles every record of a storage event in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing record. The failure is logged and an
    /// error notification is attempted before it is returned, so the host
    /// runtime can signal the failed invocation.
    pub async fn handle(
        &self,
        event: StorageEvent,
        invocation: InvocationContext,
    ) -> Result<Vec<InvocationOutcome>, DeployError> {
        let invocation = self.apply_overrides(invocation);
        let mut outcomes = Vec::with_capacity(event.records.len());
        for record in event.records {
            outcomes.push(self.handle_record(record, &invocation).await?);
        }
        Ok(outcomes)
    }

    /// Handles a single record.
    pub async fn handle_record(
        &self,
        record: StorageEventRecord,
        invocation: &InvocationContext,
    ) -> Result<InvocationOutcome, DeployError> {
        let (phase, state_bucket) = match Trigger::classify(&record, &self.config.marker_extension)
        {
            Trigger::Ignored { location, reason } => {
                info!(key = %location.key, ?reason, "ignoring event");
                return Ok(InvocationOutcome::Ignored {
                    key: location.key,
                    reason,
                });
            },
            Trigger::NewRun { archive, format } => {
                info!(%archive, ?format, "starting run");
                let bucket = self
                    .config
                    .state_bucket
                    .clone()
                    .unwrap_or_else(|| archive.bucket.clone());
                (Phase::LoadAndFilter { archive }, bucket)
            },
            Trigger::Resume { marker } => {
                debug!(%marker, "resuming run");
                (Phase::Dispatch, marker.bucket.clone())
            },
        };

        let mut state = Invocation {
            state_bucket,
            trigger: record,
            record: None,
            workspace: None,
        };
        match self.drive(&mut state, phase, invocation).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let key = state.trigger.location().key;
                error!(
                    key = %key,
                    error = %err,
                    dead_run = err.is_dead_run(),
                    "invocation failed"
                );
                self.notify_error(state.run(), &err, &key).await;
                Err(err)
            },
        }
    }

    async fn drive(
        &self,
        state: &mut Invocation,
        mut phase: Phase,
        invocation: &InvocationContext,
    ) -> Result<InvocationOutcome, DeployError> {
        loop {
            debug!(?phase, "entering phase");
            phase = match phase {
                Phase::LoadAndFilter { archive } => {
                    self.load_and_filter(state, archive, invocation).await?
                },
                Phase::Dispatch => self.dispatch(state).await?,
                Phase::StepExecuting => self.execute_step(state).await?,
                Phase::Persisted => return self.persist(state).await,
                Phase::Complete => return self.complete(state).await,
            };
        }
    }

    /// Builds the run from the archive and performs the start side effects.
    async fn load_and_filter(
        &self,
        state: &mut Invocation,
        archive: ObjectLocation,
        invocation: &InvocationContext,
    ) -> Result<Phase, DeployError> {
        let workspace = self.extractor.extract(&archive).await?;
        let run = loader::load(
            workspace.root(),
            &self.config.config_file_name,
            invocation,
            Utc::now(),
        )?;
        info!(
            application = %run.application_name,
            run = %run.run_prefix(),
            tasks = run.tasks.len(),
            "loaded deployment document"
        );

        self.notify(&run, notify::start_message(&run)).await;
        if !run.no_history {
            self.queue
                .archive_input(&state.state_bucket, &run, &archive)
                .await?;
        }

        state.record = Some(ContinuationRecord::new(state.trigger.clone(), run));
        state.workspace = Some(workspace);
        Ok(Phase::Dispatch)
    }

    /// Picks the next phase from the front of the queue.
    async fn dispatch(&self, state: &mut Invocation) -> Result<Phase, DeployError> {
        if state.record.is_none() {
            let marker = state.trigger.location();
            state.record = Some(self.queue.load(&marker).await?);
        }
        let record = state.record_mut()?;
        let tasks = &mut record.remaining_tasks.tasks;

        while tasks.first().is_some_and(|task| task.is_noop()) {
            let skipped = tasks.remove(0);
            debug!(kind = %skipped.kind(), "skipping task with nothing to do");
        }
        if tasks.is_empty() {
            Ok(Phase::Complete)
        } else {
            Ok(Phase::StepExecuting)
        }
    }

    /// Runs exactly one unit of work for the front task.
    ///
    /// The front task is replaced (or popped) only after the executor
    /// succeeded.
    async fn execute_step(&self, state: &mut Invocation) -> Result<Phase, DeployError> {
        if state.workspace.is_none() {
            let archive = state.trigger_archive()?;
            state.workspace = Some(self.extractor.extract(&archive).await?);
        }
        let Some(workspace) = state.workspace.as_ref() else {
            return Err(DeployError::NotFound {
                key: state.trigger.location().key,
            });
        };
        let Some(record) = state.record.as_mut() else {
            return Err(DeployError::NotFound {
                key: state.trigger.location().key,
            });
        };

        let run = &record.remaining_tasks;
        let Some(front) = run.tasks.first() else {
            return Ok(Phase::Complete);
        };
        let kind = front.kind();
        let executor = self
            .executors
            .get(kind)
            .ok_or(DeployError::NoExecutor { kind })?;

        let unit = front.next_unit().unwrap_or_default();
        let before = front.remaining();
        info!(
            %kind,
            unit = %unit,
            remaining = before,
            invocation_index = run.invocation_index + 1,
            "executing step"
        );
        let ctx = StepContext {
            run,
            workspace: workspace.root(),
        };
        let outcome = executor
            .step(front, ctx)
            .await
            .map_err(|source| DeployError::Executor { kind, source })?;

        let stalled_steps = self
            .check_progress(kind, before, run.stalled_steps, &outcome)
            .map_err(|source| DeployError::Executor { kind, source })?;

        let run = &mut record.remaining_tasks;
        run.stalled_steps = stalled_steps;
        for api in outcome.deployed_apis {
            run.record_api(api);
        }
        if outcome.task.is_complete() {
            run.tasks.remove(0);
            info!(%kind, "task complete");
        } else {
            run.tasks[0] = outcome.task;
        }
        Ok(Phase::Persisted)
    }

    /// Validates a step outcome against the task it ran on and returns the
    /// new count of consecutive stalled steps.
    ///
    /// A finished unit must shrink the worklist. A pending unit may repeat
    /// until `retry_attempts` invocations in a row made no progress.
    fn check_progress(
        &self,
        kind: TaskKind,
        before: usize,
        stalled_steps: u32,
        outcome: &StepOutcome,
    ) -> Result<u32, ExecutorError> {
        let actual = outcome.task.kind();
        if actual != kind {
            return Err(ExecutorError::KindChanged {
                expected: kind,
                actual,
            });
        }
        if outcome.done {
            let remaining = outcome.task.remaining();
            if remaining >= before {
                return Err(ExecutorError::NoProgress { kind, remaining });
            }
            return Ok(0);
        }

        let attempts = stalled_steps.saturating_add(1);
        let limit = self.config.retry_attempts.max(1);
        if attempts >= limit {
            return Err(ExecutorError::Stalled { kind, attempts });
        }
        info!(%kind, attempts, limit, "step made no progress, retrying next invocation");
        Ok(attempts)
    }

    async fn persist(&self, state: &mut Invocation) -> Result<InvocationOutcome, DeployError> {
        let bucket = state.state_bucket.clone();
        let record = state.record_mut()?;
        let location = self.queue.persist(&bucket, record).await?;
        let run = record.run();
        info!(
            key = %location.key,
            invocation_index = run.invocation_index,
            remaining_tasks = run.tasks.len(),
            "yielding"
        );
        Ok(InvocationOutcome::Yielded {
            key: location.key,
            invocation_index: run.invocation_index,
            remaining_tasks: run.tasks.len(),
        })
    }

    async fn complete(&self, state: &mut Invocation) -> Result<InvocationOutcome, DeployError> {
        let bucket = state.state_bucket.clone();
        let record = state.record_mut()?;
        let run = record.run().clone();

        self.notify(&run, notify::completion_message(&run, Utc::now()))
            .await;
        let cleaned_up = self.queue.cleanup_run(&bucket, &run).await?;
        info!(
            application = %run.application_name,
            invocations = run.invocation_count(),
            elapsed = %notify::format_elapsed(run.elapsed(Utc::now())),
            "run complete"
        );
        let invocations = run.invocation_count();
        Ok(InvocationOutcome::Completed {
            application_name: run.application_name,
            invocations,
            cleaned_up,
        })
    }

    fn apply_overrides(&self, mut invocation: InvocationContext) -> InvocationContext {
        if let Some(region) = &self.config.region {
            invocation.region = region.clone();
        }
        if let Some(account_id) = &self.config.account_id {
            invocation.account_id = account_id.clone();
        }
        invocation
    }

    /// Publishes to the run's topic, if any. Failures are only logged.
    async fn notify(&self, run: &RunContext, notification: Notification) {
        let Some(config) = run.notification_config.as_ref() else {
            return;
        };
        if let Err(e) = self.notifier.publish(config, &notification).await {
            warn!(topic = %config.topic_arn, error = %e, "notification failed");
        }
    }

    /// Reports a failed invocation on the run's topic, or on the configured
    /// error topic when the run is unknown.
    async fn notify_error(&self, run: Option<&RunContext>, err: &DeployError, key: &str) {
        match run {
            Some(run) if run.notification_config.is_some() => {
                self.notify(run, notify::error_message(Some(run), err, key))
                    .await;
            },
            _ => {
                let Some(topic_arn) = self.config.error_topic_arn.clone() else {
                    return;
                };
                let config = NotificationConfig {
                    topic_arn,
                    time_zone: None,
                };
                let notification = notify::error_message(run, err, key);
                if let Err(e) = self.notifier.publish(&config, &notification).await {
                    warn!(topic = %config.topic_arn, error = %e, "notification failed");
                }
            },
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("executors", &self.executors)
            .finish_non_exhaustive()
    }
}
