//! Object storage abstraction.
//!
//! [`ObjectStore`] is the minimal set of object operations the orchestrator
//! needs: whole-object get/put, server-side copy, paginated prefix listing
//! and batched deletes. It is a dumb byte store; key layout and record
//! encoding belong to [`ContinuationQueue`](crate::queue::ContinuationQueue).
//!
//! # Backends
//!
//! - [`InMemoryObjectStore`](memory::InMemoryObjectStore) -- `DashMap`-backed
//!   store for tests and local runs.
//! - [`S3ObjectStore`](s3::S3ObjectStore) -- Amazon S3, behind the `s3`
//!   feature flag.

pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::fmt;

use async_trait::async_trait;

pub use memory::InMemoryObjectStore;

/// Bucket and key of one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Last path segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Keys in lexical order.
    pub keys: Vec<String>,
    /// Token for the next page; `None` when the listing is exhausted.
    pub next: Option<String>,
}

/// Errors from raw object operations.
///
/// # Examples
///
/// ```
/// use lambduh::store::ObjectError;
///
/// let err = ObjectError::Throttled { message: "SlowDown".to_string() };
/// assert!(err.is_transient());
///
/// let err = ObjectError::NotFound { bucket: "b".to_string(), key: "k".to_string() };
/// assert!(err.to_string().contains("s3://b/k"));
/// assert!(!err.is_transient());
/// ```
#[derive(Debug)]
pub enum ObjectError {
    /// The object does not exist.
    NotFound {
        bucket: String,
        key: String,
    },

    /// The provider asked the caller to slow down; safe to retry.
    Throttled {
        message: String,
    },

    /// Any other provider or I/O failure.
    Backend {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ObjectError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Returns `true` for failures worth a bounded local retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { bucket, key } => write!(f, "object not found: s3://{bucket}/{key}"),
            Self::Throttled { message } => write!(f, "request throttled: {message}"),
            Self::Backend { message, .. } => write!(f, "object store error: {message}"),
        }
    }
}

impl std::error::Error for ObjectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend {
                source: Some(src), ..
            } => Some(src.as_ref()),
            _ => None,
        }
    }
}

/// Object storage operations used by the orchestrator.
///
/// Implementations must be `Send + Sync`; the engine shares one store
/// between the continuation queue, the archive extractor and executors.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads a whole object.
    ///
    /// # Errors
    ///
    /// [`ObjectError::NotFound`] if the object does not exist.
    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, ObjectError>;

    /// Writes a whole object, replacing any existing one.
    async fn put(
        &self,
        location: &ObjectLocation,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), ObjectError>;

    /// Copies an object server-side.
    async fn copy(&self, from: &ObjectLocation, to: &ObjectLocation) -> Result<(), ObjectError>;

    /// Lists one page of keys under `prefix`, starting after `continuation`.
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, ObjectError>;

    /// Deletes a batch of keys, returning how many were deleted. Missing
    /// keys are not an error. Callers keep batches within the provider's
    /// per-request limit.
    async fn delete_many(&self, bucket: &str, keys: &[String]) -> Result<usize, ObjectError>;
}
