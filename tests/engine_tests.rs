//! End-to-end runs of the continuation engine over an in-memory store.
//!
//! Each test drives a run the way the function host would: the archive
//! event starts it, and every `Yielded` outcome is turned into the storage
//! event that triggers the next invocation.

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use lambduh::archive::{ArchiveError, ArchiveExtractor, Workspace};
use lambduh::executor::{ExecutorError, StepContext, StepOutcome, TaskExecutor};
use lambduh::notify::{Notification, Notifier, NotifyError};
use lambduh::store::{InMemoryObjectStore, ListPage, ObjectError, ObjectLocation, ObjectStore};
use lambduh::trigger::{IgnoreReason, StorageEvent, StorageEventRecord};
use lambduh::{
    DeployError, DeployedApiSummary, Engine, EngineConfig, InvocationContext, InvocationOutcome,
    NotificationConfig, TaskDescriptor, TaskKind,
};

const BUCKET: &str = "deploys";
const ARCHIVE: &str = "shop.zip";

// ─── Test Doubles ───────────────────────────────────────────────────────────

/// Deploys one function per step and remembers the order.
#[derive(Default)]
struct ScriptedCompute {
    deployed: Mutex<Vec<String>>,
    fail_next: AtomicUsize,
}

#[async_trait]
impl TaskExecutor for ScriptedCompute {
    fn kind(&self) -> TaskKind {
        TaskKind::ComputeDeploy
    }

    async fn step(
        &self,
        task: &TaskDescriptor,
        _ctx: StepContext<'_>,
    ) -> Result<StepOutcome, ExecutorError> {
        let TaskDescriptor::ComputeDeploy(compute) = task else {
            return Err(ExecutorError::WrongKind {
                expected: TaskKind::ComputeDeploy,
                actual: task.kind(),
            });
        };
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ExecutorError::Failed {
                kind: TaskKind::ComputeDeploy,
                message: "ResourceConflictException".to_string(),
            });
        }
        self.deployed
            .lock()
            .push(compute.functions[0].function_name.clone());
        Ok(StepOutcome::advanced(task.without_front()))
    }
}

/// Wires one endpoint or alias per step and reports the API it created.
struct ScriptedApi;

#[async_trait]
impl TaskExecutor for ScriptedApi {
    fn kind(&self) -> TaskKind {
        TaskKind::ApiWireUp
    }

    async fn step(
        &self,
        task: &TaskDescriptor,
        ctx: StepContext<'_>,
    ) -> Result<StepOutcome, ExecutorError> {
        let TaskDescriptor::ApiWireUp(api) = task else {
            return Err(ExecutorError::WrongKind {
                expected: TaskKind::ApiWireUp,
                actual: task.kind(),
            });
        };
        Ok(
            StepOutcome::advanced(task.without_front()).with_deployed_api(DeployedApiSummary {
                api_id: "abc123".to_string(),
                api_name: api.api_name.clone(),
                stage_name: api.stage_name.clone().unwrap_or_else(|| "prod".to_string()),
                region: ctx.run.region.clone(),
            }),
        )
    }
}

/// How [`UnreliableCompute`] answers the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Advance,
    Pending,
    SameTask,
    OtherKind,
}

/// A compute executor whose answers are set by the test.
struct UnreliableCompute {
    answer: Mutex<Answer>,
}

impl UnreliableCompute {
    fn new(answer: Answer) -> Self {
        Self {
            answer: Mutex::new(answer),
        }
    }

    fn answer(&self, answer: Answer) {
        *self.answer.lock() = answer;
    }
}

#[async_trait]
impl TaskExecutor for UnreliableCompute {
    fn kind(&self) -> TaskKind {
        TaskKind::ComputeDeploy
    }

    async fn step(
        &self,
        task: &TaskDescriptor,
        _ctx: StepContext<'_>,
    ) -> Result<StepOutcome, ExecutorError> {
        let answer = *self.answer.lock();
        Ok(match answer {
            Answer::Advance => StepOutcome::advanced(task.without_front()),
            Answer::Pending => StepOutcome::pending(task.clone()),
            Answer::SameTask => StepOutcome::advanced(task.clone()),
            Answer::OtherKind => StepOutcome::advanced(
                serde_json::from_value(json!({
                    "type": "assetSync", "source": "public", "bucket": "site", "files": ["a.css"]
                }))
                .unwrap(),
            ),
        })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn subjects(&self) -> Vec<String> {
        self.sent.lock().iter().map(|n| n.subject.clone()).collect()
    }

    fn bodies(&self) -> Vec<String> {
        self.sent.lock().iter().map(|n| n.body.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(
        &self,
        _config: &NotificationConfig,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

/// Serves a prepared directory instead of unpacking the archive.
struct FixedTree {
    dir: TempDir,
    extractions: AtomicUsize,
}

impl FixedTree {
    fn new(document: serde_json::Value) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("lambduh.json"),
            serde_json::to_vec(&document).unwrap(),
        )
        .unwrap();
        Self {
            dir,
            extractions: AtomicUsize::new(0),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[async_trait]
impl ArchiveExtractor for FixedTree {
    async fn extract(&self, _archive: &ObjectLocation) -> Result<Workspace, ArchiveError> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        Ok(Workspace::from_path(self.dir.path()))
    }
}

/// Fails continuation writes while `failing` is set.
struct FlakyStore {
    inner: InMemoryObjectStore,
    failing: AtomicBool,
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, ObjectError> {
        self.inner.get(location).await
    }

    async fn put(
        &self,
        location: &ObjectLocation,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), ObjectError> {
        if location.key.contains("/remainingTasks/") && self.failing.swap(false, Ordering::SeqCst) {
            return Err(ObjectError::backend("InternalError"));
        }
        self.inner.put(location, data, content_type).await
    }

    async fn copy(&self, from: &ObjectLocation, to: &ObjectLocation) -> Result<(), ObjectError> {
        self.inner.copy(from, to).await
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, ObjectError> {
        self.inner.list(bucket, prefix, continuation).await
    }

    async fn delete_many(&self, bucket: &str, keys: &[String]) -> Result<usize, ObjectError> {
        self.inner.delete_many(bucket, keys).await
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn invocation() -> InvocationContext {
    InvocationContext::from_function_arn("arn:aws:lambda:eu-west-1:123456789012:function:lambduh", 300)
}

fn event(key: &str) -> StorageEvent {
    StorageEvent {
        records: vec![StorageEventRecord::object_created(BUCKET, key)],
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        api_call_delay_ms: 0,
        retry_backoff_ms: 0,
        ..EngineConfig::default()
    }
}

fn three_functions() -> serde_json::Value {
    json!({
        "applicationName": "shop",
        "tasks": [{"type": "computeDeploy", "functions": [
            {"functionName": "a", "zipPath": "a.zip"},
            {"functionName": "b", "zipPath": "b.zip"},
            {"functionName": "c", "zipPath": "c.zip"}]}],
        "snsNotifications": {"topicArn": "arn:aws:sns:eu-west-1:123456789012:deploys"}
    })
}

struct Harness {
    engine: Engine,
    store: Arc<dyn ObjectStore>,
    compute: Arc<ScriptedCompute>,
    notifier: Arc<RecordingNotifier>,
    tree: Arc<FixedTree>,
}

impl Harness {
    async fn new(document: serde_json::Value) -> Self {
        Self::with_store(document, Arc::new(InMemoryObjectStore::new())).await
    }

    async fn with_store(document: serde_json::Value, store: Arc<dyn ObjectStore>) -> Self {
        store
            .put(&ObjectLocation::new(BUCKET, ARCHIVE), b"archive".to_vec(), None)
            .await
            .unwrap();
        let compute = Arc::new(ScriptedCompute::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let tree = Arc::new(FixedTree::new(document));
        let engine = Engine::new(config(), store.clone())
            .with_extractor(tree.clone())
            .with_executor(compute.clone())
            .with_executor(Arc::new(ScriptedApi))
            .with_notifier(notifier.clone());
        Self {
            engine,
            store,
            compute,
            notifier,
            tree,
        }
    }

    async fn invoke(&self, key: &str) -> Result<InvocationOutcome, DeployError> {
        let mut outcomes = self.engine.handle(event(key), invocation()).await?;
        assert_eq!(outcomes.len(), 1);
        Ok(outcomes.remove(0))
    }

    /// Follows yielded continuations until the run completes.
    async fn run_from(&self, key: &str) -> Vec<InvocationOutcome> {
        let mut outcomes = Vec::new();
        let mut next = key.to_string();
        loop {
            let outcome = self.invoke(&next).await.unwrap();
            outcomes.push(outcome.clone());
            match outcome {
                InvocationOutcome::Yielded { key, .. } => next = key,
                _ => return outcomes,
            }
        }
    }

    async fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        let mut continuation = None;
        loop {
            let page = self.store.list(BUCKET, "", continuation).await.unwrap();
            keys.extend(page.keys);
            match page.next {
                Some(next) => continuation = Some(next),
                None => return keys,
            }
        }
    }
}

fn yielded_key(outcome: &InvocationOutcome) -> String {
    match outcome {
        InvocationOutcome::Yielded { key, .. } => key.clone(),
        other => panic!("expected a yield, got {other:?}"),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_function_per_invocation() {
    let harness = Harness::new(three_functions()).await;
    let outcomes = harness.run_from(ARCHIVE).await;

    let indices: Vec<i64> = outcomes
        .iter()
        .filter_map(|o| match o {
            InvocationOutcome::Yielded {
                invocation_index, ..
            } => Some(*invocation_index),
            _ => None,
        })
        .collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(*harness.compute.deployed.lock(), vec!["a", "b", "c"]);

    match outcomes.last().unwrap() {
        InvocationOutcome::Completed {
            application_name,
            invocations,
            cleaned_up,
        } => {
            assert_eq!(application_name, "shop");
            assert_eq!(*invocations, 4);
            assert_eq!(*cleaned_up, 3);
        },
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn continuation_keys_follow_the_run_prefix() {
    let harness = Harness::new(three_functions()).await;
    let first = harness.invoke(ARCHIVE).await.unwrap();
    let key = yielded_key(&first);

    let (prefix, rest) = key.split_once('/').unwrap();
    assert!(prefix.bytes().all(|b| b.is_ascii_digit()));
    assert_eq!(rest, "remainingTasks/00000.lambduh.txt");

    let second = harness.invoke(&key).await.unwrap();
    assert_eq!(
        yielded_key(&second),
        format!("{prefix}/remainingTasks/00001.lambduh.txt")
    );
}

#[tokio::test]
async fn start_and_completion_notifications_and_history() {
    let harness = Harness::new(three_functions()).await;
    harness.run_from(ARCHIVE).await;

    let subjects = harness.notifier.subjects();
    assert_eq!(subjects.len(), 2);
    assert!(subjects[0].starts_with("Lambduh deployment: shop at "));
    assert_eq!(subjects[0], subjects[1]);
    let bodies = harness.notifier.bodies();
    assert!(bodies[0].contains("computeDeploy: 1 task(s), 3 unit(s)"));
    assert!(bodies[1].contains("over 4 invocation(s)"));

    let keys = harness.keys().await;
    assert_eq!(keys.len(), 2, "{keys:?}");
    assert!(keys.contains(&ARCHIVE.to_string()));
    assert!(keys.iter().any(|k| k.ends_with("/history/shop.zip")));
    assert!(!keys.iter().any(|k| k.contains("/remainingTasks/")));
}

#[tokio::test]
async fn no_history_removes_every_run_object() {
    let mut document = three_functions();
    document["history"] = json!({"noHistory": true});
    let harness = Harness::new(document).await;

    let first = harness.invoke(ARCHIVE).await.unwrap();
    assert!(!harness
        .keys()
        .await
        .iter()
        .any(|k| k.contains("/history/")));
    harness.run_from(&yielded_key(&first)).await;

    assert_eq!(harness.keys().await, vec![ARCHIVE.to_string()]);
}

/// Engine with an [`UnreliableCompute`] executor and the archive in place.
async fn unreliable_engine(answer: Answer, retry_attempts: u32) -> (Engine, Arc<UnreliableCompute>) {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
    store
        .put(&ObjectLocation::new(BUCKET, ARCHIVE), b"archive".to_vec(), None)
        .await
        .unwrap();
    let compute = Arc::new(UnreliableCompute::new(answer));
    let config = EngineConfig {
        retry_attempts,
        ..config()
    };
    let engine = Engine::new(config, store)
        .with_extractor(Arc::new(FixedTree::new(three_functions())))
        .with_executor(compute.clone());
    (engine, compute)
}

async fn step(engine: &Engine, key: &str) -> Result<InvocationOutcome, DeployError> {
    let mut outcomes = engine.handle(event(key), invocation()).await?;
    Ok(outcomes.remove(0))
}

#[tokio::test]
async fn step_returning_another_kind_fails() {
    let (engine, _compute) = unreliable_engine(Answer::OtherKind, 5).await;

    let err = step(&engine, ARCHIVE).await.unwrap_err();
    assert!(matches!(
        err,
        DeployError::Executor {
            kind: TaskKind::ComputeDeploy,
            source: ExecutorError::KindChanged {
                expected: TaskKind::ComputeDeploy,
                actual: TaskKind::AssetSync,
            },
        }
    ));
}

#[tokio::test]
async fn finished_unit_must_shrink_the_worklist() {
    let (engine, _compute) = unreliable_engine(Answer::SameTask, 5).await;

    let err = step(&engine, ARCHIVE).await.unwrap_err();
    assert!(matches!(
        err,
        DeployError::Executor {
            source: ExecutorError::NoProgress { remaining: 3, .. },
            ..
        }
    ));
}

#[tokio::test]
async fn pending_steps_give_up_after_retry_attempts() {
    let (engine, compute) = unreliable_engine(Answer::Pending, 3).await;

    let first = step(&engine, ARCHIVE).await.unwrap();
    let second = step(&engine, &yielded_key(&first)).await.unwrap();
    assert!(matches!(
        second,
        InvocationOutcome::Yielded {
            invocation_index: 1,
            remaining_tasks: 1,
            ..
        }
    ));

    // Progress resets the count.
    compute.answer(Answer::Advance);
    let advanced = step(&engine, &yielded_key(&second)).await.unwrap();

    compute.answer(Answer::Pending);
    let mut key = yielded_key(&advanced);
    for _ in 0..2 {
        key = yielded_key(&step(&engine, &key).await.unwrap());
    }
    let err = step(&engine, &key).await.unwrap_err();
    assert!(matches!(
        err,
        DeployError::Executor {
            source: ExecutorError::Stalled { attempts: 3, .. },
            ..
        }
    ));
}

#[tokio::test]
async fn failed_step_leaves_record_for_redelivery() {
    let harness = Harness::new(three_functions()).await;
    let first = yielded_key(&harness.invoke(ARCHIVE).await.unwrap());

    harness.compute.fail_next.store(1, Ordering::SeqCst);
    let err = harness.invoke(&first).await.unwrap_err();
    assert!(matches!(
        err,
        DeployError::Executor {
            kind: TaskKind::ComputeDeploy,
            ..
        }
    ));
    assert!(!err.is_dead_run());

    let subjects = harness.notifier.subjects();
    assert!(subjects.last().unwrap().ends_with("failed"));
    assert!(harness
        .notifier
        .bodies()
        .last()
        .unwrap()
        .contains("ResourceConflictException"));

    // The record that triggered the failed invocation is untouched.
    let keys = harness.keys().await;
    assert!(keys.contains(&first));
    assert!(!keys.iter().any(|k| k.ends_with("00001.lambduh.txt")));

    let retried = harness.invoke(&first).await.unwrap();
    assert!(matches!(
        retried,
        InvocationOutcome::Yielded {
            invocation_index: 1,
            remaining_tasks: 1,
            ..
        }
    ));
    assert_eq!(*harness.compute.deployed.lock(), vec!["a", "b"]);
}

#[tokio::test]
async fn failed_persist_repeats_the_step_without_skipping_an_index() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryObjectStore::new(),
        failing: AtomicBool::new(false),
    });
    let harness = Harness::with_store(three_functions(), store.clone()).await;
    let first = yielded_key(&harness.invoke(ARCHIVE).await.unwrap());

    store.failing.store(true, Ordering::SeqCst);
    let err = harness.invoke(&first).await.unwrap_err();
    assert!(matches!(err, DeployError::StorageWrite { .. }));

    let second = yielded_key(&harness.invoke(&first).await.unwrap());
    assert!(second.ends_with("/remainingTasks/00001.lambduh.txt"));
    harness.run_from(&second).await;

    // "b" ran twice; the deployed set is the same as a clean run.
    assert_eq!(*harness.compute.deployed.lock(), vec!["a", "b", "b", "c"]);
}

#[tokio::test]
async fn resumed_invocations_extract_the_archive_again() {
    let harness = Harness::new(three_functions()).await;
    harness.run_from(ARCHIVE).await;
    // Three steps need the tree; the completing invocation does not.
    assert_eq!(harness.tree.extractions.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unrelated_keys_are_ignored() {
    let harness = Harness::new(three_functions()).await;

    let outcome = harness.invoke("README.md").await.unwrap();
    assert_eq!(
        outcome,
        InvocationOutcome::Ignored {
            key: "README.md".to_string(),
            reason: IgnoreReason::UnrecognizedKey,
        }
    );

    let outcome = harness
        .invoke("1700000000000/history/shop.zip")
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        InvocationOutcome::Ignored {
            reason: IgnoreReason::HistoryCopy,
            ..
        }
    ));

    let mut removed = StorageEventRecord::object_created(BUCKET, ARCHIVE);
    removed.event_name = "ObjectRemoved:Delete".to_string();
    let outcomes = harness
        .engine
        .handle(
            StorageEvent {
                records: vec![removed],
            },
            invocation(),
        )
        .await
        .unwrap();
    assert!(matches!(
        outcomes[0],
        InvocationOutcome::Ignored {
            reason: IgnoreReason::NotObjectCreated,
            ..
        }
    ));

    assert!(harness.notifier.subjects().is_empty());
    assert_eq!(harness.keys().await, vec![ARCHIVE.to_string()]);
}

#[tokio::test]
async fn missing_or_corrupt_records_are_dead_runs() {
    let harness = Harness::new(three_functions()).await;

    let err = harness
        .invoke("1700000000000/remainingTasks/00004.lambduh.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::NotFound { .. }));

    let corrupt = "1700000000000/remainingTasks/00005.lambduh.txt";
    harness
        .store
        .put(&ObjectLocation::new(BUCKET, corrupt), b"[1, 2".to_vec(), None)
        .await
        .unwrap();
    let err = harness.invoke(corrupt).await.unwrap_err();
    assert!(matches!(err, DeployError::Corrupt { .. }));
    assert!(err.is_dead_run());
}

#[tokio::test]
async fn dead_runs_report_to_the_error_topic() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let config = EngineConfig {
        error_topic_arn: Some("arn:aws:sns:eu-west-1:123456789012:ops".to_string()),
        ..config()
    };
    let engine = Engine::new(config, store).with_notifier(notifier.clone());

    let key = "1700000000000/remainingTasks/00002.lambduh.txt";
    let err = engine.handle(event(key), invocation()).await.unwrap_err();
    assert!(err.is_dead_run());

    assert_eq!(notifier.subjects(), vec!["Lambduh deployment failed".to_string()]);
    let body = &notifier.bodies()[0];
    assert!(body.contains(key));
}

#[tokio::test]
async fn unregistered_kind_fails_the_invocation() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
    let tree = Arc::new(FixedTree::new(json!({
        "applicationName": "shop",
        "tasks": [{"type": "apiWireUp", "apiName": "shop-api",
                   "endpoints": [{"path": "/", "method": "GET", "functionName": "a"}]}]
    })));
    let engine = Engine::new(config(), store.clone()).with_extractor(tree);
    store
        .put(&ObjectLocation::new(BUCKET, ARCHIVE), b"archive".to_vec(), None)
        .await
        .unwrap();

    let err = engine
        .handle(event(ARCHIVE), invocation())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DeployError::NoExecutor {
            kind: TaskKind::ApiWireUp
        }
    ));
}

#[tokio::test]
async fn api_summaries_reach_the_completion_notice() {
    let harness = Harness::new(json!({
        "applicationName": "shop",
        "tasks": [
            {"type": "apiWireUp", "apiName": "shop-api", "stageName": "live",
             "endpoints": [{"path": "/users", "method": "GET", "functionName": "a"}],
             "aliases": [{"functionName": "a", "alias": "live"}]},
            {"type": "computeDeploy", "functions": [{"functionName": "a", "zipPath": "a.zip"}]}
        ],
        "snsNotifications": {"topicArn": "arn:aws:sns:eu-west-1:123456789012:deploys", "timeZone": "+02:00"}
    }))
    .await;

    let outcomes = harness.run_from(ARCHIVE).await;
    // compute (1) + endpoint (1) + alias (1) + completion
    assert_eq!(outcomes.len(), 4);

    let bodies = harness.notifier.bodies();
    assert!(bodies
        .last()
        .unwrap()
        .contains("shop-api (live): https://abc123.execute-api.eu-west-1.amazonaws.com/live"));
    assert!(harness.notifier.subjects()[0].ends_with("+02:00"));
}

#[tokio::test]
async fn empty_run_completes_in_one_invocation() {
    let harness = Harness::new(json!({
        "applicationName": "shop",
        "tasks": [{"type": "computeDeploy", "disabled": true,
                   "functions": [{"functionName": "a", "zipPath": "a.zip"}]}]
    }))
    .await;

    let outcome = harness.invoke(ARCHIVE).await.unwrap();
    assert_eq!(
        outcome,
        InvocationOutcome::Completed {
            application_name: "shop".to_string(),
            invocations: 1,
            cleaned_up: 0,
        }
    );
}

#[tokio::test]
async fn missing_document_is_reported_without_a_run() {
    let harness = Harness::new(json!({})).await;
    std::fs::remove_file(harness.tree.path().join("lambduh.json")).unwrap();

    let err = harness.invoke(ARCHIVE).await.unwrap_err();
    assert!(matches!(err, DeployError::ConfigMissing { .. }));
    assert!(harness.notifier.subjects().is_empty());
}

#[tokio::test]
async fn assets_are_published_from_a_real_archive() {
    let store = Arc::new(InMemoryObjectStore::new());
    let document = json!({
        "applicationName": "site",
        "tasks": [{"type": "assetSync", "source": "public", "bucket": "www", "prefix": "v1"}]
    });
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in [
        ("lambduh.json", document.to_string()),
        ("public/index.html", "<h1/>".to_string()),
        ("public/css/site.css", "h1{}".to_string()),
    ] {
        writer
            .start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    let bytes = writer.finish().unwrap().into_inner();
    store
        .put(&ObjectLocation::new(BUCKET, "site.zip"), bytes, None)
        .await
        .unwrap();

    let work = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        work_dir: work.path().to_path_buf(),
        ..config()
    };
    let engine = Engine::new(config, store.clone());

    let mut next = "site.zip".to_string();
    let mut invocations = 0;
    loop {
        invocations += 1;
        let outcomes = engine.handle(event(&next), invocation()).await.unwrap();
        match &outcomes[0] {
            InvocationOutcome::Yielded { key, .. } => next = key.clone(),
            InvocationOutcome::Completed { .. } => break,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(invocations, 3);
    assert_eq!(
        store.get(&ObjectLocation::new("www", "v1/index.html")).await.unwrap(),
        b"<h1/>"
    );
    assert_eq!(
        store
            .content_type(&ObjectLocation::new("www", "v1/css/site.css"))
            .as_deref(),
        Some("text/css; charset=utf-8")
    );
}
