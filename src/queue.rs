//! Continuation records in object storage.
//!
//! Every run owns the prefix `<startTimeEpochMs>/`:
//!
//! ```text
//! 1700000000000/remainingTasks/00000.lambduh.txt
//! 1700000000000/remainingTasks/00001.lambduh.txt
//! 1700000000000/history/shop.zip
//! ```
//!
//! The key written at the end of invocation `N` is the trigger of
//! invocation `N + 1`, so records are loaded by exact key and never by
//! scanning for the latest one. Zero-padding keeps lexical and numeric key
//! order aligned.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::constants::{
    CLEANUP_PASSES, HISTORY_SEGMENT, INVOCATION_INDEX_WIDTH, REMAINING_TASKS_SEGMENT,
};
use crate::error::DeployError;
use crate::store::{ObjectError, ObjectLocation, ObjectStore};
use crate::types::context::RunContext;
use crate::types::record::ContinuationRecord;

const RECORD_CONTENT_TYPE: &str = "application/json";

/// Reads, writes and removes the continuation records of runs.
#[derive(Clone)]
pub struct ContinuationQueue {
    store: Arc<dyn ObjectStore>,
    marker_extension: String,
    delete_batch: usize,
}

impl ContinuationQueue {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        marker_extension: impl Into<String>,
        delete_batch: usize,
    ) -> Self {
        Self {
            store,
            marker_extension: marker_extension.into(),
            delete_batch: delete_batch.max(1),
        }
    }

    pub fn from_config(store: Arc<dyn ObjectStore>, config: &EngineConfig) -> Self {
        Self::new(store, config.marker_extension.clone(), config.delete_batch())
    }

    /// Key of the record with `index` for `run`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use chrono::{TimeZone, Utc};
    /// use lambduh::queue::ContinuationQueue;
    /// use lambduh::store::InMemoryObjectStore;
    /// use lambduh::{InvocationContext, RunContext};
    ///
    /// let queue = ContinuationQueue::new(Arc::new(InMemoryObjectStore::new()), "lambduh.txt", 1000);
    /// let start = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    /// let run = RunContext::new("shop", Vec::new(), start, &InvocationContext::default());
    /// assert_eq!(queue.key_for(&run, 7), "1700000000000/remainingTasks/00007.lambduh.txt");
    /// ```
    pub fn key_for(&self, run: &RunContext, index: i64) -> String {
        format!(
            "{}/{REMAINING_TASKS_SEGMENT}/{index:0width$}.{}",
            run.run_prefix(),
            self.marker_extension,
            width = INVOCATION_INDEX_WIDTH
        )
    }

    /// Key of the archived copy of the run's input.
    pub fn history_key(run: &RunContext, archive: &ObjectLocation) -> String {
        format!(
            "{}/{HISTORY_SEGMENT}/{}",
            run.run_prefix(),
            archive.file_name()
        )
    }

    /// Writes `record` under the next invocation index.
    ///
    /// Completed tasks are dropped from the written copy. The index and
    /// task list in `record` are updated only after the write succeeded, so
    /// a failed persist leaves `record` as it was and the next successful
    /// attempt reuses the same index.
    ///
    /// # Errors
    ///
    /// [`DeployError::StorageWrite`] if encoding or the write fails.
    pub async fn persist(
        &self,
        bucket: &str,
        record: &mut ContinuationRecord,
    ) -> Result<ObjectLocation, DeployError> {
        let mut staged = record.clone();
        staged.remaining_tasks.invocation_index += 1;
        staged.remaining_tasks.tasks.retain(|task| !task.is_noop());

        let key = self.key_for(&staged.remaining_tasks, staged.remaining_tasks.invocation_index);
        let body = serde_json::to_vec(&staged).map_err(|e| DeployError::StorageWrite {
            key: key.clone(),
            source: Box::new(e),
        })?;

        let location = ObjectLocation::new(bucket, key);
        self.store
            .put(&location, body, Some(RECORD_CONTENT_TYPE))
            .await
            .map_err(|e| DeployError::StorageWrite {
                key: location.key.clone(),
                source: Box::new(e),
            })?;

        *record = staged;
        debug!(
            key = %location.key,
            invocation_index = record.remaining_tasks.invocation_index,
            remaining = record.remaining_tasks.tasks.len(),
            "persisted continuation"
        );
        Ok(location)
    }

    /// Loads the record at exactly `marker`.
    ///
    /// # Errors
    ///
    /// [`DeployError::NotFound`] if the object is gone and
    /// [`DeployError::Corrupt`] if it does not decode. Both mean the run
    /// cannot continue from this key.
    pub async fn load(&self, marker: &ObjectLocation) -> Result<ContinuationRecord, DeployError> {
        let bytes = self.store.get(marker).await.map_err(|e| match e {
            ObjectError::NotFound { key, .. } => DeployError::NotFound { key },
            other => DeployError::Storage(other),
        })?;
        serde_json::from_slice(&bytes).map_err(|source| DeployError::Corrupt {
            key: marker.key.clone(),
            source,
        })
    }

    /// Copies the run's input archive to its history key.
    pub async fn archive_input(
        &self,
        bucket: &str,
        run: &RunContext,
        archive: &ObjectLocation,
    ) -> Result<ObjectLocation, DeployError> {
        let target = ObjectLocation::new(bucket, Self::history_key(run, archive));
        self.store.copy(archive, &target).await?;
        debug!(from = %archive, to = %target, "archived run input");
        Ok(target)
    }

    /// Deletes the run's continuation records, or everything under the run
    /// prefix when the run keeps no history. Returns the number of deleted
    /// objects.
    ///
    /// The prefix is listed again after each pass, so keys a batch failed
    /// to delete are retried. Keys still present after [`CLEANUP_PASSES`]
    /// fail the cleanup.
    pub async fn cleanup_run(&self, bucket: &str, run: &RunContext) -> Result<usize, DeployError> {
        let prefix = if run.no_history {
            format!("{}/", run.run_prefix())
        } else {
            format!("{}/{REMAINING_TASKS_SEGMENT}/", run.run_prefix())
        };

        let mut deleted = 0;
        for pass in 1..=CLEANUP_PASSES {
            let keys = self.list_all(bucket, &prefix).await?;
            if keys.is_empty() {
                info!(bucket, prefix = %prefix, deleted, "cleaned up run");
                return Ok(deleted);
            }
            if pass > 1 {
                warn!(bucket, prefix = %prefix, left = keys.len(), pass, "retrying cleanup");
            }
            for batch in keys.chunks(self.delete_batch) {
                deleted += self.store.delete_many(bucket, batch).await?;
            }
        }

        let remaining = self.list_all(bucket, &prefix).await?.len();
        if remaining > 0 {
            return Err(DeployError::CleanupIncomplete { prefix, remaining });
        }
        info!(bucket, prefix = %prefix, deleted, "cleaned up run");
        Ok(deleted)
    }

    /// Every key under `prefix`, collected before any delete so deletes
    /// never shift the pages being listed.
    async fn list_all(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, DeployError> {
        let mut keys = Vec::new();
        let mut continuation = None;
        loop {
            let page = self.store.list(bucket, prefix, continuation).await?;
            keys.extend(page.keys);
            match page.next {
                Some(next) => continuation = Some(next),
                None => return Ok(keys),
            }
        }
    }
}
