use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use super::{validate_collection_name, PlanStore, StoreError};
use crate::model::{ExecutionRecord, Page};
use crate::search::RecordQuery;

/// Process-local store, used for tests and `backend = "memory"`.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Vec<ExecutionRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_collection<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&[ExecutionRecord]) -> T,
    ) -> Result<T, StoreError> {
        validate_collection_name(collection)?;
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        collections
            .get(collection)
            .map(|records| f(records))
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))
    }
}

fn newest_first(a: &ExecutionRecord, b: &ExecutionRecord) -> std::cmp::Ordering {
    b.timestamp.total_cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id))
}

impl PlanStore for MemoryStore {
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        Ok(collections.keys().cloned().collect())
    }

    fn fetch_page(&self, collection: &str, query: &RecordQuery) -> Result<Page<ExecutionRecord>, StoreError> {
        self.with_collection(collection, |records| {
            let mut matching: Vec<&ExecutionRecord> = records.iter().filter(|r| query.matches(r)).collect();
            matching.sort_by(|a, b| newest_first(a, b));

            let total = matching.len() as u64;
            let offset = usize::try_from(query.pagination.offset()).unwrap_or(usize::MAX);
            let items = matching
                .into_iter()
                .skip(offset)
                .take(query.pagination.size as usize)
                .cloned()
                .collect();
            Page::new(items, total, query.pagination.page, query.pagination.size)
        })
    }

    fn fetch_by_id(&self, collection: &str, id: &str) -> Result<ExecutionRecord, StoreError> {
        self.with_collection(collection, |records| records.iter().find(|r| r.id == id).cloned())?
            .ok_or_else(|| StoreError::RecordNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    fn fetch_all_for_stats(&self, collection: &str) -> Result<Vec<ExecutionRecord>, StoreError> {
        self.with_collection(collection, |records| {
            let mut all = records.to_vec();
            all.sort_by(newest_first);
            all
        })
    }

    fn insert_records(&self, collection: &str, records: &[ExecutionRecord]) -> Result<usize, StoreError> {
        validate_collection_name(collection)?;
        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        let stored = collections.entry(collection.to_string()).or_default();

        for record in records {
            match stored.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }

        debug!("Stored {} records in memory collection {}", records.len(), collection);
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::record;
    use crate::model::ExecutionStatus;
    use crate::search::{build_query, SearchFilters};

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let records: Vec<ExecutionRecord> = (0..5)
            .map(|i| {
                let mut r = record(&format!("r{}", i), ExecutionStatus::Success, 10.0 * i as f64);
                r.timestamp = i as f64;
                r
            })
            .collect();
        store.insert_records("runs", &records).unwrap();
        store
    }

    #[test]
    fn test_pages_are_newest_first() {
        let store = seeded();
        let query = build_query(&SearchFilters::default(), 1, 2).unwrap();
        let page = store.fetch_page("runs", &query).unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.pages, 3);
        let ids: Vec<&str> = page.items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r4", "r3"]);

        let query = build_query(&SearchFilters::default(), 3, 2).unwrap();
        assert_eq!(store.fetch_page("runs", &query).unwrap().items.len(), 1);
    }

    #[test]
    fn test_filtered_page() {
        let store = seeded();
        let filters = SearchFilters {
            min_execution_time: Some(15.0),
            max_execution_time: Some(35.0),
            ..SearchFilters::default()
        };
        let page = store.fetch_page("runs", &build_query(&filters, 1, 20).unwrap()).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].id, "r3");
    }

    #[test]
    fn test_missing_collection_and_record() {
        let store = seeded();
        assert!(matches!(
            store.fetch_all_for_stats("nope"),
            Err(StoreError::CollectionNotFound(_))
        ));
        assert!(matches!(
            store.fetch_by_id("runs", "r9"),
            Err(StoreError::RecordNotFound { .. })
        ));
        assert_eq!(store.fetch_by_id("runs", "r2").unwrap().execution_time_ms, 20.0);
    }

    #[test]
    fn test_insert_replaces_by_id() {
        let store = seeded();
        let replacement = record("r1", ExecutionStatus::Error, 0.0);
        store.insert_records("runs", &[replacement]).unwrap();

        assert_eq!(store.fetch_all_for_stats("runs").unwrap().len(), 5);
        assert_eq!(store.fetch_by_id("runs", "r1").unwrap().status, ExecutionStatus::Error);
        assert_eq!(store.list_collections().unwrap(), vec!["runs".to_string()]);
    }
}
