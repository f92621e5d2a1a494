//! Lifecycle notifications.
//!
//! Messages are built by pure functions from the run context so they can be
//! tested without a transport. Delivery goes through a [`Notifier`]; the
//! engine treats every delivery as fire-and-forget and only logs failures.

#[cfg(feature = "sns")]
pub mod sns;

use std::error::Error as StdError;
use std::fmt::Write as _;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use thiserror::Error;
use tracing::warn;

use crate::constants::SERVICE_NAME;
use crate::types::context::RunContext;
use crate::types::document::NotificationConfig;

#[cfg(feature = "sns")]
pub use sns::SnsNotifier;

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },
}

/// Delivers notifications to the topic named in the deployment document.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(
        &self,
        config: &NotificationConfig,
        notification: &Notification,
    ) -> Result<(), NotifyError>;
}

/// Drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn publish(
        &self,
        _config: &NotificationConfig,
        _notification: &Notification,
    ) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Subject shared by all messages of a run.
pub fn subject(application_name: &str, start_time: DateTime<Utc>, time_zone: Option<&str>) -> String {
    format!(
        "{SERVICE_NAME} deployment: {application_name} at {}",
        format_timestamp(start_time, time_zone)
    )
}

/// Run start: task and unit counts per kind.
pub fn start_message(run: &RunContext) -> Notification {
    let mut body = format!("Deployment of {} started.\n", run.application_name);
    let counts = run.task_counts();
    if counts.is_empty() {
        body.push_str("No tasks to run.\n");
    } else {
        body.push_str("Tasks:\n");
        for (kind, (tasks, units)) in counts {
            let _ = writeln!(body, "  {kind}: {tasks} task(s), {units} unit(s)");
        }
    }
    Notification {
        subject: subject(&run.application_name, run.start_time, time_zone(run)),
        body,
    }
}

/// Run completion: elapsed time, invocations used and deployed endpoints.
pub fn completion_message(run: &RunContext, now: DateTime<Utc>) -> Notification {
    let mut body = format!(
        "Deployment of {} completed in {} over {} invocation(s).\n",
        run.application_name,
        format_elapsed(run.elapsed(now)),
        run.invocation_count()
    );
    if !run.deployed_api_summaries.is_empty() {
        body.push_str("Endpoints:\n");
        for api in &run.deployed_api_summaries {
            let _ = writeln!(body, "  {} ({}): {}", api.api_name, api.stage_name, api.url());
        }
    }
    Notification {
        subject: subject(&run.application_name, run.start_time, time_zone(run)),
        body,
    }
}

/// Failed invocation: the error chain and the key whose re-delivery retries
/// the step.
///
/// `run` is `None` when the failure happened before a run context existed.
pub fn error_message(
    run: Option<&RunContext>,
    error: &(dyn StdError + 'static),
    trigger_key: &str,
) -> Notification {
    let subject = match run {
        Some(run) => format!(
            "{} failed",
            subject(&run.application_name, run.start_time, time_zone(run))
        ),
        None => format!("{SERVICE_NAME} deployment failed"),
    };

    let mut body = String::from("Deployment step failed.\n");
    let _ = writeln!(body, "Error: {error}");
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = writeln!(body, "Caused by: {cause}");
        source = cause.source();
    }
    let _ = writeln!(body, "Trigger: {trigger_key}");
    if let Some(run) = run {
        let _ = writeln!(
            body,
            "Remaining tasks: {}, invocation index: {}",
            run.tasks.len(),
            run.invocation_index
        );
    }
    Notification { subject, body }
}

fn time_zone(run: &RunContext) -> Option<&str> {
    run.notification_config
        .as_ref()
        .and_then(|c| c.time_zone.as_deref())
}

/// Formats `time` in `time_zone`, which is `UTC` or a fixed offset such as
/// `+02:00`. Anything else is rendered in UTC.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use lambduh::notify::format_timestamp;
///
/// let t = Utc.with_ymd_and_hms(2024, 3, 1, 22, 30, 0).unwrap();
/// assert_eq!(format_timestamp(t, None), "2024-03-01 22:30:00 UTC");
/// assert_eq!(format_timestamp(t, Some("+02:00")), "2024-03-02 00:30:00 +02:00");
/// ```
pub fn format_timestamp(time: DateTime<Utc>, time_zone: Option<&str>) -> String {
    match parse_offset(time_zone) {
        Some(offset) => time
            .with_timezone(&offset)
            .format("%Y-%m-%d %H:%M:%S %:z")
            .to_string(),
        None => time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    }
}

/// `None` means UTC.
fn parse_offset(time_zone: Option<&str>) -> Option<FixedOffset> {
    let zone = time_zone?.trim();
    if zone.is_empty() || zone.eq_ignore_ascii_case("utc") || zone == "Z" {
        return None;
    }
    match FixedOffset::from_str(zone) {
        Ok(offset) => Some(offset),
        Err(_) => {
            warn!(time_zone = zone, "unsupported time zone, using UTC");
            None
        },
    }
}

/// Human-readable duration such as `1h 02m 03s`. Negative durations
/// render as zero.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}
