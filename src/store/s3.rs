//! Amazon S3 object store.
//!
//! [`S3ObjectStore`] maps the [`ObjectStore`] operations to `GetObject`,
//! `PutObject`, `CopyObject`, `ListObjectsV2` and `DeleteObjects`. It holds
//! no state besides the client.
//!
//! # Usage
//!
//! ```rust,no_run
//! use lambduh::store::s3::S3ObjectStore;
//!
//! # async fn example() {
//! // From environment (standard AWS config chain):
//! let store = S3ObjectStore::from_env().await;
//!
//! // With pre-built client:
//! let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
//! let store = S3ObjectStore::new(aws_sdk_s3::Client::new(&config));
//! # }
//! ```

use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;

use super::{ListPage, ObjectError, ObjectLocation, ObjectStore};

/// Error codes S3 uses to ask callers to back off.
const THROTTLE_CODES: &[&str] = &["SlowDown", "RequestLimitExceeded", "ThrottlingException"];

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a store using the standard AWS SDK config chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Maps an AWS SDK error to an [`ObjectError`], recognising throttling.
fn map_sdk_error<E>(err: SdkError<E>, target: &str) -> ObjectError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if let Some(code) = err.code() {
        if THROTTLE_CODES.contains(&code) {
            return ObjectError::Throttled {
                message: format!("{code} on {target}"),
            };
        }
    }
    ObjectError::Backend {
        message: format!("S3 error for {target}: {err}"),
        source: Some(Box::new(err)),
    }
}

/// `CopySource` value: bucket and URL-encoded key, keeping separators.
fn copy_source(from: &ObjectLocation) -> String {
    let key = from
        .key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", from.bucket, key)
}

// ---------------------------------------------------------------------------
// ObjectStore implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, ObjectError> {
        let output = match self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|service| service.is_no_such_key())
                {
                    return Err(ObjectError::NotFound {
                        bucket: location.bucket.clone(),
                        key: location.key.clone(),
                    });
                }
                return Err(map_sdk_error(err, &location.to_string()));
            },
        };

        let body = output.body.collect().await.map_err(|e| ObjectError::Backend {
            message: format!("failed to read body of {location}: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(body.into_bytes().to_vec())
    }

    async fn put(
        &self,
        location: &ObjectLocation,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), ObjectError> {
        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(ByteStream::from(data))
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &location.to_string()))?;
        Ok(())
    }

    async fn copy(&self, from: &ObjectLocation, to: &ObjectLocation) -> Result<(), ObjectError> {
        self.client
            .copy_object()
            .copy_source(copy_source(from))
            .bucket(&to.bucket)
            .key(&to.key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &to.to_string()))?;
        Ok(())
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, ObjectError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &format!("s3://{bucket}/{prefix}")))?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();
        let next = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        Ok(ListPage { keys, next })
    }

    async fn delete_many(&self, bucket: &str, keys: &[String]) -> Result<usize, ObjectError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ObjectError::Backend {
                message: format!("invalid delete request: {e}"),
                source: Some(Box::new(e)),
            })?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| ObjectError::Backend {
                message: format!("invalid delete request: {e}"),
                source: Some(Box::new(e)),
            })?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &format!("s3://{bucket}")))?;

        let failed = output.errors();
        if let Some(first) = failed.first() {
            tracing::warn!(
                bucket,
                failed = failed.len(),
                key = first.key().unwrap_or_default(),
                code = first.code().unwrap_or_default(),
                "some objects could not be deleted"
            );
        }
        Ok(keys.len().saturating_sub(failed.len()))
    }
}
