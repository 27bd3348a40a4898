// Search and list views share one query shape: a validated filter plus pagination.
pub mod query;

pub use query::{build_query, Pagination, QueryError, RecordFilter, RecordQuery, SearchFilters};
