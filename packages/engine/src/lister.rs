//! Complete remote state listing.

use site_sync_models::RemoteObject;
use site_sync_storage::{ObjectStore, StorageError};

/// Lists every object in `bucket`, following continuation tokens until the
/// last page.
///
/// Callers only ever see the full listing; a failure on any page fails the
/// whole call, since deletion decisions depend on a complete baseline.
///
/// # Errors
///
/// Returns the [`StorageError`] of the first failing page.
pub async fn list_all(store: &dyn ObjectStore, bucket: &str) -> Result<Vec<RemoteObject>, StorageError> {
    log::info!("Listing s3://{bucket}");

    let mut objects = Vec::new();
    let mut continuation_token: Option<String> = None;
    let mut pages = 0u64;

    loop {
        let page = store
            .list_page(bucket, continuation_token.as_deref())
            .await?;
        pages += 1;
        objects.extend(page.objects);

        match page.next_continuation_token {
            Some(token) => continuation_token = Some(token),
            None => break,
        }
    }

    log::info!("  found {} objects ({pages} page(s))", objects.len());
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use site_sync_storage::memory::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn follows_every_page() {
        let store = MemoryStore::existing("us-east-1").with_page_size(3);
        for i in 0..10 {
            store.insert(&format!("k{i:02}"), b"x");
        }

        let objects = list_all(&store, "site").await.unwrap();
        let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys.len(), 10);
        assert_eq!(keys.first(), Some(&"k00"));
        assert_eq!(keys.last(), Some(&"k09"));
    }

    #[tokio::test]
    async fn empty_bucket_lists_nothing() {
        let store = MemoryStore::existing("us-east-1");
        assert!(list_all(&store, "site").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn page_failure_fails_listing() {
        let store = MemoryStore::existing("us-east-1");
        store.insert("a", b"a");
        store.fail_listing();
        assert!(matches!(
            list_all(&store, "site").await,
            Err(StorageError::List { .. })
        ));
    }
}
