//! Amazon SNS notifier.
//!
//! ```rust,no_run
//! use lambduh::notify::SnsNotifier;
//!
//! # async fn example() {
//! let notifier = SnsNotifier::from_env().await;
//! # }
//! ```

use async_trait::async_trait;
use aws_sdk_sns::Client;

use super::{Notification, Notifier, NotifyError};
use crate::constants::MAX_SUBJECT_LENGTH;
use crate::types::document::NotificationConfig;

#[derive(Debug, Clone)]
pub struct SnsNotifier {
    client: Client,
}

impl SnsNotifier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a notifier using the standard AWS SDK config chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn publish(
        &self,
        config: &NotificationConfig,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        self.client
            .publish()
            .topic_arn(&config.topic_arn)
            .subject(truncate_subject(&notification.subject))
            .message(&notification.body)
            .send()
            .await
            .map_err(|e| NotifyError::Publish {
                topic: config.topic_arn.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}

/// SNS rejects subjects longer than 100 characters.
fn truncate_subject(subject: &str) -> String {
    subject.chars().take(MAX_SUBJECT_LENGTH).collect()
}
