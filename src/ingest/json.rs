use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::ingest::{FileIngestor, IngestError};
use crate::model::ExecutionRecord;
use crate::util::json::{from_reader_unbounded, from_str_unbounded};

/// A JSON document holding either one record or an array of them.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonIngestor;

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<ExecutionRecord>),
    One(Box<ExecutionRecord>),
}

impl FileIngestor for JsonIngestor {
    fn read_records(&self, path: &Path) -> Result<Vec<ExecutionRecord>, IngestError> {
        let reader = BufReader::new(File::open(path)?);
        let parsed: OneOrMany = from_reader_unbounded(reader).map_err(|source| IngestError::Parsing {
            location: path.display().to_string(),
            source,
        })?;

        let records = match parsed {
            OneOrMany::Many(records) => records,
            OneOrMany::One(record) => vec![*record],
        };
        debug!("Read {} records from {}", records.len(), path.display());
        Ok(records)
    }
}

/// One record per line; blank lines are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLinesIngestor;

impl FileIngestor for JsonLinesIngestor {
    fn read_records(&self, path: &Path) -> Result<Vec<ExecutionRecord>, IngestError> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = from_str_unbounded(&line).map_err(|source| IngestError::Parsing {
                location: format!("{}:{}", path.display(), index + 1),
                source,
            })?;
            records.push(record);
        }

        debug!("Read {} records from {}", records.len(), path.display());
        Ok(records)
    }
}
