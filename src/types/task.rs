//! Task descriptors.
//!
//! A [`TaskDescriptor`] is one entry of the deployment document's task list.
//! Each kind carries a *worklist* (files, functions, endpoints) that the
//! engine shrinks one element per invocation. The worklist is the task's
//! progress cursor: a task whose worklist is empty is complete and never
//! persisted again.
//!
//! # Serialization
//!
//! Descriptors are internally tagged on `type` with camelCase kind names:
//!
//! ```
//! use lambduh::{TaskDescriptor, TaskKind};
//!
//! let task: TaskDescriptor = serde_json::from_str(
//!     r#"{"type": "assetSync", "source": "public", "bucket": "site", "files": ["index.html"]}"#,
//! ).unwrap();
//! assert_eq!(task.kind(), TaskKind::AssetSync);
//! assert_eq!(task.remaining(), 1);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The kinds of deployment step the engine knows how to queue.
///
/// The derived `Ord` is the execution group order: compute functions first,
/// so API wiring can reference them, then API wiring, then static assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskKind {
    /// Create or update compute functions.
    ComputeDeploy,
    /// Wire HTTP API endpoints to functions.
    ApiWireUp,
    /// Publish static assets to a bucket.
    AssetSync,
}

impl TaskKind {
    /// All kinds in execution group order.
    pub const ALL: [TaskKind; 3] = [Self::ComputeDeploy, Self::ApiWireUp, Self::AssetSync];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ComputeDeploy => "computeDeploy",
            Self::ApiWireUp => "apiWireUp",
            Self::AssetSync => "assetSync",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single compute function to create or update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    /// Function name, also the key include filters match on.
    pub function_name: String,

    /// Path of the code bundle inside the extracted archive.
    pub zip_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,

    /// Alias to point at the newly published version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Executor-specific settings passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Creates or updates a list of compute functions, one per invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeDeployTask {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,

    /// Execution role for created functions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Remaining functions, processed front to back.
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
}

/// One HTTP endpoint to wire to a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSpec {
    pub path: String,
    pub method: String,
    pub function_name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A function alias the API stage should invoke, independent of endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasSpec {
    pub function_name: String,
    pub alias: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Wires an HTTP API: endpoints first, then aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiWireUpTask {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,

    pub api_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_name: Option<String>,

    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,

    #[serde(default)]
    pub aliases: Vec<AliasSpec>,
}

/// Uploads files from the extracted archive to a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSyncTask {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,

    /// Directory inside the extracted archive.
    pub source: String,

    /// Destination bucket.
    pub bucket: String,

    /// Destination key prefix.
    #[serde(default)]
    pub prefix: String,

    /// Remaining files, relative to `source`, `/`-separated. Left empty in
    /// the document, the loader fills it by walking `source`.
    #[serde(default)]
    pub files: Vec<String>,
}

/// One entry of the task queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TaskDescriptor {
    ComputeDeploy(ComputeDeployTask),
    ApiWireUp(ApiWireUpTask),
    AssetSync(AssetSyncTask),
}

impl TaskDescriptor {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::ComputeDeploy(_) => TaskKind::ComputeDeploy,
            Self::ApiWireUp(_) => TaskKind::ApiWireUp,
            Self::AssetSync(_) => TaskKind::AssetSync,
        }
    }

    pub fn is_disabled(&self) -> bool {
        match self {
            Self::ComputeDeploy(t) => t.disabled,
            Self::ApiWireUp(t) => t.disabled,
            Self::AssetSync(t) => t.disabled,
        }
    }

    /// Number of units of work left in the worklist.
    pub fn remaining(&self) -> usize {
        match self {
            Self::ComputeDeploy(t) => t.functions.len(),
            Self::ApiWireUp(t) => t.endpoints.len() + t.aliases.len(),
            Self::AssetSync(t) => t.files.len(),
        }
    }

    /// Returns `true` once the worklist is empty.
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns `true` for tasks that must never be queued or persisted:
    /// disabled ones and ones with nothing left to do.
    pub fn is_noop(&self) -> bool {
        self.is_disabled() || self.is_complete()
    }

    /// Short description of the next unit of work, for logs.
    pub fn next_unit(&self) -> Option<String> {
        match self {
            Self::ComputeDeploy(t) => t.functions.first().map(|f| f.function_name.clone()),
            Self::ApiWireUp(t) => t
                .endpoints
                .first()
                .map(|e| format!("{} {}", e.method, e.path))
                .or_else(|| {
                    t.aliases
                        .first()
                        .map(|a| format!("alias {}:{}", a.function_name, a.alias))
                }),
            Self::AssetSync(t) => t.files.first().cloned(),
        }
    }

    /// Returns a copy with the front unit of work removed.
    ///
    /// The original descriptor is left untouched so that a failed step never
    /// leaves a visibly shrunk worklist behind.
    pub fn without_front(&self) -> Self {
        let mut next = self.clone();
        match &mut next {
            Self::ComputeDeploy(t) => {
                if !t.functions.is_empty() {
                    t.functions.remove(0);
                }
            },
            Self::ApiWireUp(t) => {
                if !t.endpoints.is_empty() {
                    t.endpoints.remove(0);
                } else if !t.aliases.is_empty() {
                    t.aliases.remove(0);
                }
            },
            Self::AssetSync(t) => {
                if !t.files.is_empty() {
                    t.files.remove(0);
                }
            },
        }
        next
    }
}
