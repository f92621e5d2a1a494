//! Lambda entry point for Lambduh.
//!
//! Subscribe the function to `ObjectCreated` events on the deployment
//! bucket for archive keys (`.zip`, `.tar`, `.tar.gz`, `.tgz`) and for the
//! continuation marker extension. Each invocation performs one deployment
//! step and writes the marker that triggers the next one.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use lambda_runtime::{service_fn, Error, LambdaEvent};
use lambduh::logging::init_tracing;
use lambduh::notify::SnsNotifier;
use lambduh::store::s3::S3ObjectStore;
use lambduh::trigger::StorageEvent;
use lambduh::{Engine, EngineConfig, InvocationContext};
use serde_json::Value;

async fn handler(engine: &Engine, event: LambdaEvent<StorageEvent>) -> Result<Value, Error> {
    let (payload, context) = event.into_parts();
    let invocation = InvocationContext::from_function_arn(
        &context.invoked_function_arn,
        remaining_seconds(context.deadline),
    );
    let outcomes = engine.handle(payload, invocation).await?;
    Ok(serde_json::to_value(outcomes)?)
}

/// Seconds until `deadline_ms` (epoch millis). Measured at the start of the
/// invocation this is the configured function timeout.
fn remaining_seconds(deadline_ms: u64) -> u64 {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    deadline_ms.saturating_sub(now_ms).div_ceil(1000)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = EngineConfig::load()?;
    init_tracing(&config.log);

    let store = Arc::new(S3ObjectStore::from_env().await);
    let notifier = Arc::new(SnsNotifier::from_env().await);
    let engine = Engine::new(config, store).with_notifier(notifier);
    tracing::info!(?engine, "lambduh ready");

    let engine = Arc::new(engine);
    lambda_runtime::run(service_fn(move |event| {
        let engine = Arc::clone(&engine);
        async move { handler(&engine, event).await }
    }))
    .await
}
