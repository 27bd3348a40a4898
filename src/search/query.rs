use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ExecutionRecord, ExecutionStatus};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("min_execution_time ({min}) is greater than max_execution_time ({max})")]
    InvalidFilterRange { min: f64, max: f64 },

    #[error("invalid value for {field}: {reason}")]
    InvalidFilterValue { field: &'static str, reason: String },

    #[error("page and size must be at least 1 (got page {page}, size {size})")]
    InvalidPagination { page: u32, size: u32 },
}

/// Filter criteria as received from a search request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    pub q: Option<String>,
    pub status: Option<String>,
    pub min_execution_time: Option<f64>,
    pub max_execution_time: Option<f64>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub size: u32,
}

impl Pagination {
    pub fn new(page: u32, size: u32) -> Result<Self, QueryError> {
        if page == 0 || size == 0 {
            return Err(QueryError::InvalidPagination { page, size });
        }
        Ok(Self { page, size })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.size)
    }
}

/// Validated filter; text needles are trimmed and lower-cased.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub text: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub min_execution_time: Option<f64>,
    pub max_execution_time: Option<f64>,
    pub file_name: Option<String>,
}

impl RecordFilter {
    /// In-memory evaluation; every present criterion must hold.
    pub fn matches(&self, record: &ExecutionRecord) -> bool {
        if let Some(text) = &self.text {
            let in_sql = record.sql_content.to_lowercase().contains(text.as_str());
            let in_file = record.file_name.to_lowercase().contains(text.as_str());
            if !in_sql && !in_file {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(min) = self.min_execution_time {
            if record.execution_time_ms < min {
                return false;
            }
        }
        if let Some(max) = self.max_execution_time {
            if record.execution_time_ms > max {
                return false;
            }
        }
        if let Some(file_name) = &self.file_name {
            if !record.file_name.to_lowercase().contains(file_name.as_str()) {
                return false;
            }
        }
        true
    }
}

/// What the data-access layer receives for list and search views.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub filter: RecordFilter,
    pub pagination: Pagination,
}

impl RecordQuery {
    pub fn unfiltered(pagination: Pagination) -> Self {
        Self {
            filter: RecordFilter::default(),
            pagination,
        }
    }

    pub fn matches(&self, record: &ExecutionRecord) -> bool {
        self.filter.matches(record)
    }
}

/// Validates search criteria and turns them into a store query.
///
/// Absent (or blank) fields impose no constraint; everything present is
/// combined with AND. Bounds are inclusive.
pub fn build_query(filters: &SearchFilters, page: u32, size: u32) -> Result<RecordQuery, QueryError> {
    let status = match non_blank(filters.status.as_deref()) {
        Some(status) => Some(status.parse::<ExecutionStatus>().map_err(|reason| {
            QueryError::InvalidFilterValue {
                field: "status",
                reason,
            }
        })?),
        None => None,
    };

    let min = checked_bound("min_execution_time", filters.min_execution_time)?;
    let max = checked_bound("max_execution_time", filters.max_execution_time)?;
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(QueryError::InvalidFilterRange { min, max });
        }
    }

    let pagination = Pagination::new(page, size)?;

    Ok(RecordQuery {
        filter: RecordFilter {
            text: non_blank(filters.q.as_deref()).map(str::to_lowercase),
            status,
            min_execution_time: min,
            max_execution_time: max,
            file_name: non_blank(filters.file_name.as_deref()).map(str::to_lowercase),
        },
        pagination,
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn checked_bound(field: &'static str, value: Option<f64>) -> Result<Option<f64>, QueryError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(QueryError::InvalidFilterValue {
            field,
            reason: format!("{} is not a non-negative number of milliseconds", v),
        }),
        other => Ok(other),
    }
}
