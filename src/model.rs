use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Outcome of a recorded run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Strict parse used for user supplied filters; stored values go through serde instead.
impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(ExecutionStatus::Success),
            "error" => Ok(ExecutionStatus::Error),
            "unknown" => Ok(ExecutionStatus::Unknown),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// One recorded SQL run as captured by the ingestion process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub sql_content: String,
    /// Raw result rows of the EXPLAIN run, one of which carries the "QUERY PLAN".
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub row_count: u64,
    #[serde(default)]
    pub execution_time_ms: f64,
    /// Capture time of the query itself, in seconds.
    #[serde(default)]
    pub execution_time: f64,
    /// Unix timestamp (seconds) when the record was saved.
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_time: Option<String>,
}

impl ExecutionRecord {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Execution time usable in timing aggregates.
    ///
    /// Only successful runs with a finite, non-negative time qualify; failed
    /// and unknown runs carry a placeholder zero that must not skew averages.
    pub fn timed_execution_ms(&self) -> Option<f64> {
        if self.is_success() && self.execution_time_ms.is_finite() && self.execution_time_ms >= 0.0 {
            Some(self.execution_time_ms)
        } else {
            None
        }
    }

    /// Row count usable in aggregates; same runs as [`Self::timed_execution_ms`].
    pub fn counted_rows(&self) -> Option<u64> {
        self.timed_execution_ms().map(|_| self.row_count)
    }
}

/// Paginated list response.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, page: u32, size: u32) -> Self {
        let pages = if size == 0 { 0 } else { total.div_ceil(u64::from(size)) };
        Self {
            items,
            total,
            page,
            size,
            pages,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Builds a record with a one-node plan, handy across test modules.
    pub(crate) fn record(id: &str, status: ExecutionStatus, execution_time_ms: f64) -> ExecutionRecord {
        ExecutionRecord {
            id: id.to_string(),
            file_name: format!("{}.sql", id),
            file_path: format!("/queries/{}.sql", id),
            sql_content: format!("SELECT * FROM t_{}", id),
            data: vec![json!({
                "QUERY PLAN": [{
                    "Plan": {"Node Type": "Seq Scan", "Actual Total Time": execution_time_ms, "Actual Rows": 10}
                }]
            })],
            status,
            error: None,
            row_count: 10,
            execution_time_ms,
            execution_time: 0.0,
            timestamp: 0.0,
            save_time: None,
        }
    }

    #[test]
    fn test_status_unknown_string_decodes_as_unknown() {
        let status: ExecutionStatus = serde_json::from_value(json!("timeout")).unwrap();
        assert_eq!(status, ExecutionStatus::Unknown);
    }

    #[test]
    fn test_status_from_str_is_strict() {
        assert_eq!("SUCCESS".parse::<ExecutionStatus>(), Ok(ExecutionStatus::Success));
        assert!("timeout".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn test_record_accepts_mongo_style_id() {
        let record: ExecutionRecord = serde_json::from_value(json!({
            "_id": "abc",
            "status": "success",
            "execution_time_ms": 12.5
        }))
        .unwrap();

        assert_eq!(record.id, "abc");
        assert_eq!(record.timed_execution_ms(), Some(12.5));
        assert_eq!(serde_json::to_value(&record).unwrap()["_id"], "abc");
    }

    #[test]
    fn test_failed_record_is_not_timed() {
        let failed = record("f", ExecutionStatus::Error, 0.0);
        assert_eq!(failed.timed_execution_ms(), None);
        assert_eq!(failed.counted_rows(), None);
    }

    #[test]
    fn test_success_with_corrupt_time_is_not_counted() {
        for time in [-3.0, f64::NAN, f64::INFINITY] {
            let corrupt = record("c", ExecutionStatus::Success, time);
            assert_eq!(corrupt.timed_execution_ms(), None);
            assert_eq!(corrupt.counted_rows(), None);
        }
    }

    #[test]
    fn test_page_count_rounds_up() {
        let page: Page<u8> = Page::new(vec![], 41, 1, 20);
        assert_eq!(page.pages, 3);
    }
}
