//! In-memory object store.
//!
//! [`InMemoryObjectStore`] keeps objects in a `DashMap` keyed by
//! `(bucket, key)`. Listing is lexical and paginated like S3 so that cleanup
//! paths are exercised in tests with small pages.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ListPage, ObjectError, ObjectLocation, ObjectStore};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: Option<String>,
}

/// Thread-safe in-memory [`ObjectStore`].
///
/// # Examples
///
/// ```
/// use lambduh::store::{InMemoryObjectStore, ObjectLocation, ObjectStore};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let store = InMemoryObjectStore::new();
/// let location = ObjectLocation::new("site", "index.html");
/// store.put(&location, b"<html/>".to_vec(), Some("text/html")).await.unwrap();
/// assert_eq!(store.get(&location).await.unwrap(), b"<html/>");
/// assert_eq!(store.content_type(&location).as_deref(), Some("text/html"));
/// # });
/// ```
#[derive(Debug)]
pub struct InMemoryObjectStore {
    objects: DashMap<(String, String), StoredObject>,
    page_size: usize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            page_size: 1000,
        }
    }

    /// Sets the maximum number of keys returned per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, location: &ObjectLocation) -> bool {
        self.objects
            .contains_key(&(location.bucket.clone(), location.key.clone()))
    }

    /// All keys in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == bucket)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn content_type(&self, location: &ObjectLocation) -> Option<String> {
        self.objects
            .get(&(location.bucket.clone(), location.key.clone()))
            .and_then(|entry| entry.value().content_type.clone())
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, ObjectError> {
        self.objects
            .get(&(location.bucket.clone(), location.key.clone()))
            .map(|entry| entry.value().data.clone())
            .ok_or_else(|| ObjectError::NotFound {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
            })
    }

    async fn put(
        &self,
        location: &ObjectLocation,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), ObjectError> {
        self.objects.insert(
            (location.bucket.clone(), location.key.clone()),
            StoredObject {
                data,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn copy(&self, from: &ObjectLocation, to: &ObjectLocation) -> Result<(), ObjectError> {
        let object = self
            .objects
            .get(&(from.bucket.clone(), from.key.clone()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ObjectError::NotFound {
                bucket: from.bucket.clone(),
                key: from.key.clone(),
            })?;
        self.objects
            .insert((to.bucket.clone(), to.key.clone()), object);
        Ok(())
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, ObjectError> {
        let matching: Vec<String> = self
            .keys(bucket)
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| continuation.as_deref().map_or(true, |after| key.as_str() > after))
            .collect();

        let truncated = matching.len() > self.page_size;
        let keys: Vec<String> = matching.into_iter().take(self.page_size).collect();
        let next = if truncated { keys.last().cloned() } else { None };
        Ok(ListPage { keys, next })
    }

    async fn delete_many(&self, bucket: &str, keys: &[String]) -> Result<usize, ObjectError> {
        Ok(keys
            .iter()
            .filter(|key| {
                self.objects
                    .remove(&(bucket.to_string(), (*key).clone()))
                    .is_some()
            })
            .count())
    }
}
