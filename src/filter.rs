//! Include filters.
//!
//! An include filter narrows a run to named functions and endpoints:
//!
//! - `lambda: [names]` keeps only those functions in compute-deploy tasks.
//! - `apiGateway: [selectors]` keeps only endpoints matched by at least one
//!   selector, by path or by target function, optionally restricted to one
//!   method. Matches are de-duplicated on `(path, method)` and sorted by path.
//! - When `lambda` is given without `apiGateway`, an `apiGateway` selector
//!   per function name is derived so endpoints follow their functions.
//!
//! Asset-sync tasks are never filtered. Filtering is idempotent.

use std::collections::HashSet;

use crate::types::document::{ApiFilter, IncludeFilter};
use crate::types::task::{EndpointSpec, TaskDescriptor};

/// Fills in the derived `apiGateway` selectors.
///
/// # Examples
///
/// ```
/// use lambduh::filter::effective_include;
/// use lambduh::{ApiFilter, IncludeFilter};
///
/// let include = IncludeFilter { lambda: Some(vec!["foo".to_string()]), api_gateway: None };
/// let effective = effective_include(&include);
/// assert_eq!(effective.api_gateway, Some(vec![ApiFilter::for_function("foo")]));
/// ```
pub fn effective_include(include: &IncludeFilter) -> IncludeFilter {
    let mut effective = include.clone();
    if effective.api_gateway.is_none() {
        if let Some(names) = &include.lambda {
            effective.api_gateway = Some(names.iter().map(ApiFilter::for_function).collect());
        }
    }
    effective
}

/// Applies an include filter to every task. Tasks left empty are returned
/// as-is; dropping them is the caller's job.
pub fn apply_include(tasks: Vec<TaskDescriptor>, include: &IncludeFilter) -> Vec<TaskDescriptor> {
    let include = effective_include(include);
    tasks
        .into_iter()
        .map(|task| filter_task(task, &include))
        .collect()
}

fn filter_task(task: TaskDescriptor, include: &IncludeFilter) -> TaskDescriptor {
    match task {
        TaskDescriptor::ComputeDeploy(mut t) => {
            if let Some(names) = &include.lambda {
                t.functions.retain(|f| names.contains(&f.function_name));
            }
            TaskDescriptor::ComputeDeploy(t)
        },
        TaskDescriptor::ApiWireUp(mut t) => {
            if let Some(selectors) = &include.api_gateway {
                t.endpoints = select_endpoints(std::mem::take(&mut t.endpoints), selectors);
            }
            TaskDescriptor::ApiWireUp(t)
        },
        other @ TaskDescriptor::AssetSync(_) => other,
    }
}

fn select_endpoints(endpoints: Vec<EndpointSpec>, selectors: &[ApiFilter]) -> Vec<EndpointSpec> {
    let mut seen = HashSet::new();
    let mut selected: Vec<EndpointSpec> = endpoints
        .into_iter()
        .filter(|endpoint| selectors.iter().any(|s| matches(s, endpoint)))
        .filter(|endpoint| seen.insert((endpoint.path.clone(), endpoint.method.to_ascii_uppercase())))
        .collect();
    selected.sort_by(|a, b| a.path.cmp(&b.path));
    selected
}

/// Path and function selectors are alternatives; the method, when present,
/// applies to both.
fn matches(selector: &ApiFilter, endpoint: &EndpointSpec) -> bool {
    let method_ok = selector
        .method
        .as_deref()
        .map_or(true, |m| m.eq_ignore_ascii_case(&endpoint.method));
    let path_hit = selector.path.as_deref() == Some(endpoint.path.as_str());
    let function_hit = selector.function_name.as_deref() == Some(endpoint.function_name.as_str());
    method_ok && (path_hit || function_hit)
}
