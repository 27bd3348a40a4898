// Seeding a collection from exported execution records (JSON or JSON lines).
pub mod json;

use std::path::Path;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{PlanStore, StoreError};
use crate::model::ExecutionRecord;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing error at {location}: {source}")]
    Parsing {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("record '{id}' in {location}: {reason}")]
    InvalidRecord {
        location: String,
        id: String,
        reason: String,
    },

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub trait FileIngestor: Send + Sync {
    fn read_records(&self, path: &Path) -> Result<Vec<ExecutionRecord>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestManager {
    json_ingestor: json::JsonIngestor,
    json_lines_ingestor: json::JsonLinesIngestor,
}

impl IngestManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn ingestor_for(&self, path: &Path) -> Result<&dyn FileIngestor, IngestError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| IngestError::UnsupportedFileType("No extension".to_string()))?;

        match extension.to_lowercase().as_str() {
            "json" => Ok(&self.json_ingestor),
            "jsonl" | "ndjson" => Ok(&self.json_lines_ingestor),
            _ => Err(IngestError::UnsupportedFileType(extension.to_string())),
        }
    }

    /// Loads a file into `collection`, returning how many records were stored.
    pub fn ingest_file<S: PlanStore + ?Sized>(
        &self,
        path: &Path,
        collection: &str,
        store: &S,
    ) -> Result<usize, IngestError> {
        let mut records = self.ingestor_for(path)?.read_records(path)?;
        if records.is_empty() {
            warn!("No records found in {}", path.display());
            return Ok(0);
        }

        records.iter_mut().for_each(fill_missing);
        if let Some(record) = records.iter().find(|r| !has_usable_time(r)) {
            return Err(IngestError::InvalidRecord {
                location: path.display().to_string(),
                id: record.id.clone(),
                reason: format!("execution_time_ms must be a non-negative number, got {}", record.execution_time_ms),
            });
        }
        let stored = store.insert_records(collection, &records)?;
        info!("Imported {} records from {} into {}", stored, path.display(), collection);
        Ok(stored)
    }
}

// Exports from older capture runs may lack ids and save times.
fn fill_missing(record: &mut ExecutionRecord) {
    if record.id.is_empty() {
        record.id = Uuid::new_v4().simple().to_string();
    }
    if record.timestamp <= 0.0 || !record.timestamp.is_finite() {
        let now = Utc::now();
        record.timestamp = now.timestamp_millis() as f64 / 1000.0;
        if record.save_time.is_none() {
            record.save_time = Some(now.format("%Y-%m-%d %H:%M:%S").to_string());
        }
    }
}

fn has_usable_time(record: &ExecutionRecord) -> bool {
    record.execution_time_ms.is_finite() && record.execution_time_ms >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use std::io::Write;

    #[test]
    fn test_unsupported_extension() {
        let manager = IngestManager::new();
        let store = MemoryStore::new();
        let err = manager
            .ingest_file(Path::new("records.csv"), "runs", &store)
            .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFileType(ext) if ext == "csv"));
    }

    #[test]
    fn test_import_fills_ids_and_timestamps() {
        let mut file = tempfile::Builder::new().suffix(".jsonl").tempfile().unwrap();
        writeln!(file, r#"{{"sql_content": "SELECT 1", "status": "success", "execution_time_ms": 3.5}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"_id": "fixed", "status": "error", "timestamp": 1700000000.5}}"#).unwrap();

        let store = MemoryStore::new();
        let stored = IngestManager::new().ingest_file(file.path(), "runs", &store).unwrap();
        assert_eq!(stored, 2);

        let records = store.fetch_all_for_stats("runs").unwrap();
        let generated = records.iter().find(|r| r.id != "fixed").unwrap();
        assert_eq!(generated.id.len(), 32);
        assert!(generated.timestamp > 1_700_000_000.0);
        assert!(generated.save_time.is_some());

        let fixed = store.fetch_by_id("runs", "fixed").unwrap();
        assert_eq!(fixed.timestamp, 1_700_000_000.5);
        assert!(fixed.save_time.is_none());
    }

    #[test]
    fn test_negative_time_rejects_the_file() {
        let mut file = tempfile::Builder::new().suffix(".jsonl").tempfile().unwrap();
        writeln!(file, r#"{{"_id": "ok", "status": "success", "execution_time_ms": 4.0}}"#).unwrap();
        writeln!(file, r#"{{"_id": "bad", "status": "success", "execution_time_ms": -3.0}}"#).unwrap();

        let store = MemoryStore::new();
        let err = IngestManager::new().ingest_file(file.path(), "runs", &store).unwrap_err();

        assert!(matches!(err, IngestError::InvalidRecord { ref id, .. } if id == "bad"));
        assert!(store.list_collections().unwrap().is_empty());
    }
}
