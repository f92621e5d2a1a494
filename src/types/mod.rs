//! Data model shared by the loader, engine and executors.

pub mod context;
pub mod document;
pub mod record;
pub mod task;

pub use context::{DeployedApiSummary, InvocationContext, RunContext};
pub use document::{
    ApiFilter, DeploymentDocument, HistoryConfig, IncludeFilter, NotificationConfig, TaskFilters,
};
pub use record::ContinuationRecord;
pub use task::{
    AliasSpec, ApiWireUpTask, AssetSyncTask, ComputeDeployTask, EndpointSpec, FunctionSpec,
    TaskDescriptor, TaskKind,
};
