//! Property-based tests for the loader, the include filter and the
//! continuation queue.
//!
//! - **Ordering**: loader output is grouped by kind with document order kept
//!   inside each group.
//! - **Filter idempotence**: applying an include filter twice equals
//!   applying it once.
//! - **Monotonic index**: successful persists number records 0, 1, 2, ...
//!   with keys whose lexical order matches their numeric order.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;

use lambduh::filter::apply_include;
use lambduh::loader::order_tasks;
use lambduh::queue::ContinuationQueue;
use lambduh::store::InMemoryObjectStore;
use lambduh::trigger::StorageEventRecord;
use lambduh::{
    ApiFilter, ContinuationRecord, IncludeFilter, InvocationContext, RunContext, TaskDescriptor,
    TaskKind,
};

// ─── Arbitrary Strategies ───────────────────────────────────────────────────

fn arb_kind() -> impl Strategy<Value = TaskKind> {
    prop::sample::select(TaskKind::ALL.to_vec())
}

/// A one-unit task whose unit name carries its document position.
fn task(kind: TaskKind, position: usize) -> TaskDescriptor {
    let name = format!("unit{position}");
    let value = match kind {
        TaskKind::ComputeDeploy => json!({
            "type": "computeDeploy",
            "functions": [{"functionName": name, "zipPath": "f.zip"}]
        }),
        TaskKind::ApiWireUp => json!({
            "type": "apiWireUp", "apiName": "api",
            "endpoints": [{"path": "/", "method": "GET", "functionName": name}]
        }),
        TaskKind::AssetSync => json!({
            "type": "assetSync", "source": "public", "bucket": "site", "files": [name]
        }),
    };
    serde_json::from_value(value).unwrap()
}

fn position(task: &TaskDescriptor) -> usize {
    let name = match task {
        TaskDescriptor::ComputeDeploy(t) => &t.functions[0].function_name,
        TaskDescriptor::ApiWireUp(t) => &t.endpoints[0].function_name,
        TaskDescriptor::AssetSync(t) => &t.files[0],
    };
    name.trim_start_matches("unit").parse().unwrap()
}

fn arb_api_task() -> impl Strategy<Value = TaskDescriptor> {
    prop::collection::vec(
        (
            prop::sample::select(vec!["/a", "/b", "/c"]),
            prop::sample::select(vec!["GET", "get", "POST"]),
            prop::sample::select(vec!["foo", "bar", "baz"]),
        ),
        0..8,
    )
    .prop_map(|endpoints| {
        let endpoints: Vec<_> = endpoints
            .into_iter()
            .map(|(path, method, function)| {
                json!({"path": path, "method": method, "functionName": function})
            })
            .collect();
        serde_json::from_value(json!({
            "type": "apiWireUp", "apiName": "api", "endpoints": endpoints
        }))
        .unwrap()
    })
}

fn arb_compute_task() -> impl Strategy<Value = TaskDescriptor> {
    prop::collection::vec(prop::sample::select(vec!["foo", "bar", "baz"]), 0..5).prop_map(
        |names| {
            let functions: Vec<_> = names
                .into_iter()
                .map(|name| json!({"functionName": name, "zipPath": format!("{name}.zip")}))
                .collect();
            serde_json::from_value(json!({"type": "computeDeploy", "functions": functions}))
                .unwrap()
        },
    )
}

/// Compute, API and asset tasks in any order.
fn arb_mixed_task() -> impl Strategy<Value = TaskDescriptor> {
    prop_oneof![
        arb_compute_task(),
        arb_api_task(),
        arb_kind().prop_map(|kind| task(kind, 0)),
    ]
}

fn arb_selector() -> impl Strategy<Value = ApiFilter> {
    (
        proptest::option::of(prop::sample::select(vec!["/a", "/b", "/z"])),
        proptest::option::of(prop::sample::select(vec!["foo", "bar", "qux"])),
        proptest::option::of(prop::sample::select(vec!["GET", "post"])),
    )
        .prop_map(|(path, function_name, method)| ApiFilter {
            path: path.map(str::to_string),
            function_name: function_name.map(str::to_string),
            method: method.map(str::to_string),
        })
}

fn arb_include() -> impl Strategy<Value = IncludeFilter> {
    (
        proptest::option::of(prop::collection::vec(
            prop::sample::select(vec!["foo".to_string(), "bar".to_string()]),
            0..3,
        )),
        proptest::option::of(prop::collection::vec(arb_selector(), 0..4)),
    )
        .prop_map(|(lambda, api_gateway)| IncludeFilter {
            lambda,
            api_gateway,
        })
}

// ─── Property Tests ─────────────────────────────────────────────────────────

proptest! {
    /// Every compute task precedes every API task, which precedes every
    /// asset task; inside a group the document order survives.
    #[test]
    fn loader_order_is_grouped_and_stable(kinds in prop::collection::vec(arb_kind(), 0..24)) {
        let tasks: Vec<TaskDescriptor> =
            kinds.iter().enumerate().map(|(i, kind)| task(*kind, i)).collect();
        let ordered = order_tasks(tasks);

        prop_assert_eq!(ordered.len(), kinds.len());
        for pair in ordered.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.kind() <= b.kind());
            if a.kind() == b.kind() {
                prop_assert!(position(a) < position(b));
            }
        }
    }

    /// Filtering a filtered list changes nothing, including the API
    /// selectors derived from a lambda filter.
    #[test]
    fn include_filter_is_idempotent(
        tasks in prop::collection::vec(arb_mixed_task(), 0..6),
        include in arb_include(),
    ) {
        let once = apply_include(tasks, &include);
        let twice = apply_include(once.clone(), &include);
        prop_assert_eq!(once, twice);
    }

    /// Persisted records are numbered consecutively from zero and their keys
    /// sort in the same order.
    #[test]
    fn invocation_index_is_monotonic(persists in 1usize..40) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let store = Arc::new(InMemoryObjectStore::new());
            let queue = ContinuationQueue::new(store, "lambduh.txt", 1000);
            let start = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
            let mut record = ContinuationRecord::new(
                StorageEventRecord::object_created("deploys", "shop.zip"),
                RunContext::new(
                    "shop",
                    vec![task(TaskKind::AssetSync, 0)],
                    start,
                    &InvocationContext::default(),
                ),
            );

            let mut keys = Vec::new();
            for expected in 0..persists {
                let location = queue.persist("deploys", &mut record).await.unwrap();
                assert_eq!(record.run().invocation_index, expected as i64);
                keys.push(location.key);
            }
            let mut sorted = keys.clone();
            sorted.sort();
            assert_eq!(sorted, keys);
        });
    }
}
