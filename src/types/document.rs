//! The declarative deployment document shipped at the archive root.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::task::TaskDescriptor;

/// Top-level deployment document.
///
/// # Examples
///
/// ```
/// use lambduh::DeploymentDocument;
///
/// let doc: DeploymentDocument = serde_json::from_str(r#"{
///     "applicationName": "shop",
///     "tasks": [],
///     "history": {"noHistory": true}
/// }"#).unwrap();
/// assert_eq!(doc.application_name, "shop");
/// assert!(doc.no_history());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDocument {
    pub application_name: String,

    #[serde(default)]
    pub tasks: Vec<TaskDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_filters: Option<TaskFilters>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sns_notifications: Option<NotificationConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryConfig>,
}

impl DeploymentDocument {
    /// Returns `true` when the run must not keep a copy of its archive.
    pub fn no_history(&self) -> bool {
        self.history.as_ref().is_some_and(|h| h.no_history)
    }
}

/// Include/exclude filters applied once at run start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<IncludeFilter>,

    /// Accepted for compatibility and ignored; see the loader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Value>,
}

/// Restricts the run to a subset of functions and endpoints.
///
/// A kind without an entry is left unfiltered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeFilter {
    /// Function names to keep in compute-deploy tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lambda: Option<Vec<String>>,

    /// Endpoint selectors to keep in API wire-up tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_gateway: Option<Vec<ApiFilter>>,
}

/// Selects endpoints by path or by target function, optionally narrowed
/// to one HTTP method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl ApiFilter {
    /// Selector matching every endpoint that targets `function_name`.
    pub fn for_function(function_name: impl Into<String>) -> Self {
        Self {
            function_name: Some(function_name.into()),
            ..Self::default()
        }
    }
}

/// Where lifecycle notifications go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    pub topic_arn: String,

    /// `UTC` or a fixed offset such as `+02:00` for formatted timestamps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    #[serde(default)]
    pub no_history: bool,
}
