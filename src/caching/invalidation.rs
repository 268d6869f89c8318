//! # Cache Invalidation Module
//!
//! Pattern invalidation over a cursor-based scan. The scan is driven from the
//! start cursor until the store reports the terminal cursor; keys from every
//! page are accumulated (deduplicated, since a scan may return a key more
//! than once) and then deleted in a single pipelined batch.

use std::collections::BTreeSet;

use super::{CacheResult, CacheStore, SCAN_START};
use tracing::debug;

/// Walk a full `SCAN ... MATCH pattern` and return every distinct matching key
pub async fn collect_matching_keys(
    store: &dyn CacheStore,
    pattern: &str,
    count: usize,
) -> CacheResult<Vec<String>> {
    let mut cursor = SCAN_START;
    let mut keys = BTreeSet::new();
    let mut pages = 0usize;

    loop {
        let page = store.scan(cursor, pattern, count).await?;
        pages += 1;
        keys.extend(page.keys);
        cursor = page.cursor;

        if cursor == SCAN_START {
            break;
        }
    }

    debug!(pattern, pages, keys = keys.len(), "Completed cache scan");
    Ok(keys.into_iter().collect())
}

/// Scan for `pattern` and delete everything found in one batch.
/// Returns the number of keys that existed at deletion time.
pub async fn delete_matching(store: &dyn CacheStore, pattern: &str, count: usize) -> CacheResult<usize> {
    let keys = collect_matching_keys(store, pattern, count).await?;

    if keys.is_empty() {
        debug!("No cache keys found for pattern: {}", pattern);
        return Ok(0);
    }

    store.delete_many(&keys).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::{CacheError, ScanPage};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Store that replays scripted scan pages and records deletions
    struct ScriptedStore {
        pages: Mutex<Vec<ScanPage>>,
        deleted: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedStore {
        fn new(pages: Vec<ScanPage>) -> Self {
            let mut pages = pages;
            pages.reverse();
            Self {
                pages: Mutex::new(pages),
                deleted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CacheStore for ScriptedStore {
        async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn set_ex(&self, _key: &str, _value: &[u8], _ttl: Duration) -> CacheResult<()> {
            Ok(())
        }

        async fn delete(&self, _key: &str) -> CacheResult<bool> {
            Ok(false)
        }

        async fn scan(&self, _cursor: u64, _pattern: &str, _count: usize) -> CacheResult<ScanPage> {
            self.pages.lock().pop().ok_or(CacheError::Store {
                message: "scan called past terminal cursor".to_string(),
            })
        }

        async fn delete_many(&self, keys: &[String]) -> CacheResult<usize> {
            self.deleted.lock().push(keys.to_vec());
            Ok(keys.len())
        }

        async fn health_check(&self) -> CacheResult<bool> {
            Ok(true)
        }
    }

    fn page(cursor: u64, keys: &[&str]) -> ScanPage {
        ScanPage {
            cursor,
            keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_duplicates_across_pages_are_deleted_once() {
        let store = ScriptedStore::new(vec![
            page(17, &["plantTypes:page:1", "plantTypes:page:2"]),
            page(9, &[]),
            page(0, &["plantTypes:page:2", "plantTypes:page:3"]),
        ]);

        let removed = delete_matching(&store, "plantTypes:page:*", 100).await.unwrap();

        assert_eq!(removed, 3);
        let batches = store.deleted.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0],
            vec!["plantTypes:page:1", "plantTypes:page:2", "plantTypes:page:3"]
        );
    }

    #[tokio::test]
    async fn test_empty_scan_deletes_nothing() {
        let store = ScriptedStore::new(vec![page(0, &[])]);

        let removed = delete_matching(&store, "devices:*", 100).await.unwrap();

        assert_eq!(removed, 0);
        assert!(store.deleted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_scan_error_propagates() {
        let store = ScriptedStore::new(vec![page(5, &["plant:1"])]);

        let result = collect_matching_keys(&store, "plant:*", 100).await;
        assert!(matches!(result, Err(CacheError::Store { .. })));
    }
}
