//! In-process [`ObjectStore`] holding one bucket in memory.
//!
//! Content tags are the MD5 of the stored body, like a single-part S3
//! upload, so plans computed against it behave exactly like plans against
//! a real bucket. Listing is paginated with a configurable page size.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use site_sync_models::{ObjectSource, RemoteObject, UploadParams, UploadTask};

use crate::{BucketInfo, ListPage, MAX_DELETE_BATCH, ObjectStore, StorageError, WebsiteConfig};

/// Default listing page size (matches S3).
const DEFAULT_PAGE_SIZE: usize = 1000;

/// One object held by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object body.
    pub body: Vec<u8>,
    /// Content tag (unquoted).
    pub etag: String,
    /// `Content-Type` it was written with.
    pub content_type: String,
    /// Headers it was written with.
    pub params: UploadParams,
}

#[derive(Debug, Default)]
struct State {
    exists: bool,
    region: Option<String>,
    website: Option<WebsiteConfig>,
    objects: BTreeMap<String, StoredObject>,
    failing_keys: BTreeSet<String>,
    fail_listing: bool,
    puts: u64,
    delete_batches: Vec<usize>,
}

/// In-memory bucket.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store whose bucket does not exist yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Creates a store whose bucket already exists in `region`.
    #[must_use]
    pub fn existing(region: &str) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            state.exists = true;
            state.region = Some(region.to_string());
        }
        store
    }

    /// Sets the listing page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `body` under `key` directly, bypassing [`ObjectStore`].
    pub fn insert(&self, key: &str, body: &[u8]) {
        let mut state = self.lock();
        state.exists = true;
        state.objects.insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                etag: format!("{:x}", md5::compute(body)),
                content_type: site_sync_models::OCTET_STREAM.to_string(),
                params: UploadParams::default(),
            },
        );
    }

    /// Stores an object with an arbitrary content tag.
    pub fn insert_with_etag(&self, key: &str, body: &[u8], etag: &str) {
        self.insert(key, body);
        if let Some(object) = self.lock().objects.get_mut(key) {
            object.etag = etag.to_string();
        }
    }

    /// Makes every subsequent write to `key` fail.
    pub fn fail_uploads_for(&self, key: &str) {
        self.lock().failing_keys.insert(key.to_string());
    }

    /// Makes every subsequent listing request fail.
    pub fn fail_listing(&self) {
        self.lock().fail_listing = true;
    }

    /// Returns a copy of the object stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.lock().objects.get(key).cloned()
    }

    /// All stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// Whether the bucket exists.
    #[must_use]
    pub fn bucket_exists(&self) -> bool {
        self.lock().exists
    }

    /// Last website configuration applied.
    #[must_use]
    pub fn website(&self) -> Option<WebsiteConfig> {
        self.lock().website.clone()
    }

    /// Number of successful object writes.
    #[must_use]
    pub fn put_count(&self) -> u64 {
        self.lock().puts
    }

    /// Sizes of the delete batches received, in order.
    #[must_use]
    pub fn delete_batches(&self) -> Vec<usize> {
        self.lock().delete_batches.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn probe_bucket(&self, _bucket: &str) -> Result<BucketInfo, StorageError> {
        let state = self.lock();
        Ok(BucketInfo {
            exists: state.exists,
            region: state.region.clone(),
        })
    }

    async fn create_bucket(
        &self,
        _bucket: &str,
        region: Option<&str>,
        _acl: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.exists = true;
        state.region = region.map(str::to_string);
        Ok(())
    }

    async fn put_website(&self, _bucket: &str, website: &WebsiteConfig) -> Result<(), StorageError> {
        self.lock().website = Some(website.clone());
        Ok(())
    }

    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        let state = self.lock();
        if state.fail_listing {
            return Err(StorageError::List {
                bucket: bucket.to_string(),
                source: "listing disabled".into(),
            });
        }

        // The continuation token is the last key of the previous page.
        let objects: Vec<RemoteObject> = state
            .objects
            .iter()
            .filter(|(key, _)| continuation_token.is_none_or(|token| key.as_str() > token))
            .take(self.page_size)
            .map(|(key, object)| RemoteObject {
                key: key.clone(),
                fingerprint: object.etag.clone(),
            })
            .collect();

        let next_continuation_token = objects
            .last()
            .filter(|last| {
                state
                    .objects
                    .range::<str, _>((
                        std::ops::Bound::Excluded(last.key.as_str()),
                        std::ops::Bound::Unbounded,
                    ))
                    .next()
                    .is_some()
            })
            .map(|last| last.key.clone());

        Ok(ListPage {
            objects,
            next_continuation_token,
        })
    }

    async fn put_object(&self, bucket: &str, task: &UploadTask) -> Result<(), StorageError> {
        if self.lock().failing_keys.contains(&task.key) {
            return Err(StorageError::Upload {
                bucket: bucket.to_string(),
                key: task.key.clone(),
                source: "injected failure".into(),
            });
        }

        let body = match &task.source {
            ObjectSource::File(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| StorageError::Io {
                        key: task.key.clone(),
                        source,
                    })?
            }
            ObjectSource::Inline(bytes) => bytes.clone(),
        };

        let mut state = self.lock();
        let etag = format!("{:x}", md5::compute(&body));
        state.objects.insert(
            task.key.clone(),
            StoredObject {
                body,
                etag,
                content_type: task.content_type.clone(),
                params: task.params.clone(),
            },
        );
        state.puts += 1;
        drop(state);
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError> {
        if keys.len() > MAX_DELETE_BATCH {
            return Err(StorageError::Delete {
                bucket: bucket.to_string(),
                count: keys.len(),
                source: format!("batch exceeds {MAX_DELETE_BATCH} keys").into(),
            });
        }

        let mut state = self.lock();
        for key in keys {
            state.objects.remove(key);
        }
        state.delete_batches.push(keys.len());
        drop(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn paginates_in_key_order() {
        let store = MemoryStore::existing("us-east-1").with_page_size(2);
        for key in ["c", "a", "e", "b", "d"] {
            store.insert(key, key.as_bytes());
        }

        let first = store.list_page("site", None).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        assert_eq!(first.next_continuation_token.as_deref(), Some("b"));

        let second = store.list_page("site", Some("b")).await.unwrap();
        assert_eq!(second.objects[0].key, "c");

        let last = store.list_page("site", Some("d")).await.unwrap();
        assert_eq!(last.objects.len(), 1);
        assert_eq!(last.next_continuation_token, None);
    }

    #[tokio::test]
    async fn tags_are_md5_of_body() {
        let store = MemoryStore::existing("us-east-1");
        store.insert("a.html", b"hi");
        let page = store.list_page("site", None).await.unwrap();
        assert_eq!(page.objects[0].fingerprint, "49f68a5c8493ec2c0bf489821c21fc3b");
    }

    #[tokio::test]
    async fn rejects_oversized_delete_batches() {
        let store = MemoryStore::existing("us-east-1");
        let keys: Vec<String> = (0..=MAX_DELETE_BATCH).map(|i| i.to_string()).collect();
        assert!(store.delete_objects("site", &keys).await.is_err());
    }
}
