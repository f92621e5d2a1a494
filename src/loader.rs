//! Deployment document loading, filtering and ordering.
//!
//! Runs once per run, on the invocation triggered by the archive. The
//! result is the initial [`RunContext`]: a queue that contains no disabled
//! or empty tasks and is grouped
//! `computeDeploy < apiWireUp < assetSync`, keeping document order inside
//! each group.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::DeployError;
use crate::filter::apply_include;
use crate::types::context::{InvocationContext, RunContext};
use crate::types::document::DeploymentDocument;
use crate::types::task::TaskDescriptor;

/// Reads the deployment document from the extracted tree root.
///
/// # Errors
///
/// [`DeployError::ConfigMissing`] if the file is absent,
/// [`DeployError::ConfigInvalid`] if it cannot be parsed.
pub fn read_document(root: &Path, file_name: &str) -> Result<DeploymentDocument, DeployError> {
    let path = root.join(file_name);
    let contents = match std::fs::read(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DeployError::ConfigMissing {
                path: file_name.to_string(),
            })
        },
        Err(e) => {
            return Err(DeployError::ConfigInvalid {
                path: file_name.to_string(),
                message: e.to_string(),
            })
        },
    };
    serde_json::from_slice(&contents).map_err(|e| DeployError::ConfigInvalid {
        path: file_name.to_string(),
        message: e.to_string(),
    })
}

/// Loads, expands, filters and orders the document's tasks into a fresh
/// run context.
pub fn load(
    root: &Path,
    file_name: &str,
    invocation: &InvocationContext,
    start_time: DateTime<Utc>,
) -> Result<RunContext, DeployError> {
    let document = read_document(root, file_name)?;
    let tasks = prepare_tasks(&document, root)?;

    let mut run = RunContext::new(&document.application_name, tasks, start_time, invocation);
    run.notification_config = document.sns_notifications.clone();
    run.no_history = document.no_history();
    Ok(run)
}

/// Expands asset worklists, applies filters, drops no-op tasks and sorts.
pub fn prepare_tasks(
    document: &DeploymentDocument,
    root: &Path,
) -> Result<Vec<TaskDescriptor>, DeployError> {
    let mut tasks = document
        .tasks
        .iter()
        .filter(|task| !task.is_disabled())
        .map(|task| expand_assets(task.clone(), root))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(filters) = &document.task_filters {
        if let Some(include) = &filters.include {
            tasks = apply_include(tasks, include);
        }
        if filters.exclude.as_ref().is_some_and(|e| !is_empty_filter(e)) {
            warn!("exclude filters are not supported and were ignored");
        }
    }

    let before = tasks.len();
    tasks.retain(|task| !task.is_noop());
    if tasks.len() < before {
        debug!(dropped = before - tasks.len(), "dropped tasks with nothing to do");
    }

    Ok(order_tasks(tasks))
}

/// Stable sort into execution group order.
///
/// # Examples
///
/// ```
/// use lambduh::loader::order_tasks;
/// use lambduh::{TaskDescriptor, TaskKind};
///
/// let tasks: Vec<TaskDescriptor> = serde_json::from_str(r#"[
///     {"type": "assetSync", "source": "public", "bucket": "site", "files": ["a"]},
///     {"type": "computeDeploy", "functions": [{"functionName": "foo", "zipPath": "foo.zip"}]},
///     {"type": "apiWireUp", "apiName": "api", "endpoints": [{"path": "/", "method": "GET", "functionName": "foo"}]}
/// ]"#).unwrap();
/// let kinds: Vec<TaskKind> = order_tasks(tasks).iter().map(|t| t.kind()).collect();
/// assert_eq!(kinds, vec![TaskKind::ComputeDeploy, TaskKind::ApiWireUp, TaskKind::AssetSync]);
/// ```
pub fn order_tasks(tasks: Vec<TaskDescriptor>) -> Vec<TaskDescriptor> {
    let mut indexed: Vec<(usize, TaskDescriptor)> = tasks.into_iter().enumerate().collect();
    indexed.sort_by_key(|(initial_order, task)| (task.kind(), *initial_order));
    indexed.into_iter().map(|(_, task)| task).collect()
}

fn is_empty_filter(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Fills an asset-sync task's empty file list from its source directory.
fn expand_assets(task: TaskDescriptor, root: &Path) -> Result<TaskDescriptor, DeployError> {
    let TaskDescriptor::AssetSync(mut asset) = task else {
        return Ok(task);
    };
    if !asset.files.is_empty() {
        return Ok(TaskDescriptor::AssetSync(asset));
    }

    let source = root.join(&asset.source);
    if !source.is_dir() {
        return Err(DeployError::ConfigInvalid {
            path: asset.source.clone(),
            message: "asset source directory not found in archive".to_string(),
        });
    }
    asset.files = list_files(&source, &asset.source)?;
    debug!(source = %asset.source, files = asset.files.len(), "expanded asset worklist");
    Ok(TaskDescriptor::AssetSync(asset))
}

/// Regular files under `dir`, relative and `/`-separated, sorted.
///
/// Unreadable entries and names that are not valid UTF-8 fail the load, as
/// they could not be published under a matching key.
fn list_files(dir: &Path, source: &str) -> Result<Vec<String>, DeployError> {
    let invalid = |message: String| DeployError::ConfigInvalid {
        path: source.to_string(),
        message,
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| invalid(format!("cannot read asset tree: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let Some(name) = relative.to_str() else {
            return Err(invalid(format!(
                "asset file name is not valid UTF-8: {}",
                relative.to_string_lossy()
            )));
        };
        files.push(name.replace('\\', "/"));
    }
    files.sort();
    Ok(files)
}
