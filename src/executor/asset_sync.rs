//! Static asset publishing, one file per step.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{
    retry_transient, ExecutorError, RetryPolicy, StepContext, StepOutcome, TaskExecutor, Throttle,
};
use crate::config::EngineConfig;
use crate::store::{ObjectLocation, ObjectStore};
use crate::types::task::{AssetSyncTask, TaskDescriptor, TaskKind};

/// Uploads the front file of an asset-sync task from the extracted archive
/// to `bucket/prefix/<file>`.
///
/// Re-uploading the same file is harmless, so the step is safe to repeat.
pub struct AssetSyncExecutor {
    store: Arc<dyn ObjectStore>,
    throttle: Throttle,
    retry: RetryPolicy,
}

impl AssetSyncExecutor {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            throttle: Throttle::new(std::time::Duration::ZERO),
            retry: RetryPolicy::none(),
        }
    }

    /// Executor with the throttle and retry policy from `config`.
    pub fn from_config(store: Arc<dyn ObjectStore>, config: &EngineConfig) -> Self {
        Self::new(store)
            .with_throttle(Throttle::from_config(config))
            .with_retry(RetryPolicy::from_config(config))
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl TaskExecutor for AssetSyncExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::AssetSync
    }

    async fn step(
        &self,
        task: &TaskDescriptor,
        ctx: StepContext<'_>,
    ) -> Result<StepOutcome, ExecutorError> {
        let TaskDescriptor::AssetSync(asset) = task else {
            return Err(ExecutorError::WrongKind {
                expected: TaskKind::AssetSync,
                actual: task.kind(),
            });
        };
        let Some(file) = asset.files.first() else {
            return Ok(StepOutcome::advanced(task.clone()));
        };

        let local = ctx.workspace.join(&asset.source).join(file);
        let data = tokio::fs::read(&local).await?;
        let destination = destination(asset, file);
        let content_type = content_type_for(file);

        retry_transient(self.retry, "asset upload", || {
            let data = data.clone();
            let destination = &destination;
            let content_type = content_type.as_str();
            async move {
                self.store
                    .put(destination, data, Some(content_type))
                    .await
                    .map_err(ExecutorError::from)
            }
        })
        .await?;
        self.throttle.pause().await;

        debug!(%destination, %content_type, size = data.len(), "uploaded asset");
        Ok(StepOutcome::advanced(task.without_front()))
    }
}

fn destination(asset: &AssetSyncTask, file: &str) -> ObjectLocation {
    let prefix = asset.prefix.trim_matches('/');
    let key = if prefix.is_empty() {
        file.to_string()
    } else {
        format!("{prefix}/{file}")
    };
    ObjectLocation::new(asset.bucket.clone(), key)
}

/// Content type guessed from the file extension. Text types are declared
/// UTF-8; unknown types are served as binary.
pub fn content_type_for(file: &str) -> String {
    let mime = mime_guess::from_path(file).first_or_octet_stream();
    if mime.type_() == "text" && mime.get_param("charset").is_none() {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    }
}
