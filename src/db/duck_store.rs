use duckdb::types::Value;
use duckdb::{params, params_from_iter, Row};
use r2d2::{Pool, PooledConnection};
use tracing::{debug, info};

use super::db_pool::DuckDBConnectionManager;
use super::{validate_collection_name, PlanStore, StoreError};
use crate::model::{ExecutionRecord, ExecutionStatus, Page};
use crate::search::{RecordFilter, RecordQuery};
use crate::util::json::from_str_unbounded;

const COLUMNS: &str = "id, file_name, file_path, sql_content, data, status, error, row_count, \
                       execution_time_ms, execution_time, \"timestamp\", save_time";

const ORDER: &str = "ORDER BY \"timestamp\" DESC, id ASC";

/// DuckDB-backed store: one table per collection, plan payloads kept as JSON text.
pub struct DuckStore {
    pool: Pool<DuckDBConnectionManager>,
}

// Column values as read, before the JSON payload is decoded.
struct StoredRow {
    id: String,
    file_name: String,
    file_path: String,
    sql_content: String,
    data: String,
    status: String,
    error: Option<String>,
    row_count: i64,
    execution_time_ms: f64,
    execution_time: f64,
    timestamp: f64,
    save_time: Option<String>,
}

impl StoredRow {
    fn read(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            file_name: row.get(1)?,
            file_path: row.get(2)?,
            sql_content: row.get(3)?,
            data: row.get(4)?,
            status: row.get(5)?,
            error: row.get(6)?,
            row_count: row.get(7)?,
            execution_time_ms: row.get(8)?,
            execution_time: row.get(9)?,
            timestamp: row.get(10)?,
            save_time: row.get(11)?,
        })
    }

    fn into_record(self) -> Result<ExecutionRecord, StoreError> {
        Ok(ExecutionRecord {
            id: self.id,
            file_name: self.file_name,
            file_path: self.file_path,
            sql_content: self.sql_content,
            data: from_str_unbounded(&self.data)?,
            // Anything unrecognised decodes as unknown, same as the JSON path.
            status: self.status.parse().unwrap_or(ExecutionStatus::Unknown),
            error: self.error,
            row_count: u64::try_from(self.row_count).unwrap_or(0),
            execution_time_ms: self.execution_time_ms,
            execution_time: self.execution_time,
            timestamp: self.timestamp,
            save_time: self.save_time,
        })
    }
}

impl DuckStore {
    pub fn open(connection_string: &str, pool_size: u32) -> Result<Self, StoreError> {
        let manager = DuckDBConnectionManager::new(connection_string)?;
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::open(super::db_pool::IN_MEMORY, 1)
    }

    fn conn(&self) -> Result<PooledConnection<DuckDBConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }

    fn collection_exists(&self, conn: &duckdb::Connection, collection: &str) -> Result<bool, StoreError> {
        let count: i64 = conn.query_row(
            "SELECT count(*) FROM information_schema.tables WHERE table_schema = 'main' AND table_name = ?",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Validates the name and checks the table exists; returns it quoted for SQL.
    fn resolve(&self, conn: &duckdb::Connection, collection: &str) -> Result<String, StoreError> {
        validate_collection_name(collection)?;
        if !self.collection_exists(conn, collection)? {
            return Err(StoreError::CollectionNotFound(collection.to_string()));
        }
        Ok(format!("\"{}\"", collection))
    }

    fn query_records(
        conn: &duckdb::Connection,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), StoredRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(StoredRow::into_record).collect()
    }
}

/// Translates a filter into a parameterised WHERE clause (empty when unfiltered).
fn where_clause(filter: &RecordFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(text) = &filter.text {
        conditions.push("(contains(lower(sql_content), ?) OR contains(lower(file_name), ?))");
        values.push(Value::Text(text.clone()));
        values.push(Value::Text(text.clone()));
    }
    if let Some(status) = filter.status {
        conditions.push("status = ?");
        values.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(min) = filter.min_execution_time {
        conditions.push("execution_time_ms >= ?");
        values.push(Value::Double(min));
    }
    if let Some(max) = filter.max_execution_time {
        conditions.push("execution_time_ms <= ?");
        values.push(Value::Double(max));
    }
    if let Some(file_name) = &filter.file_name {
        conditions.push("contains(lower(file_name), ?)");
        values.push(Value::Text(file_name.clone()));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", conditions.join(" AND ")), values)
    }
}

impl PlanStore for DuckStore {
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'main' ORDER BY table_name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn fetch_page(&self, collection: &str, query: &RecordQuery) -> Result<Page<ExecutionRecord>, StoreError> {
        let conn = self.conn()?;
        let table = self.resolve(&conn, collection)?;
        let (filter_sql, mut values) = where_clause(&query.filter);

        let count_sql = format!("SELECT count(*) FROM {} {}", table, filter_sql);
        let total: i64 = conn.query_row(&count_sql, params_from_iter(values.iter()), |row| row.get(0))?;

        let page_sql = format!(
            "SELECT {} FROM {} {} {} LIMIT ? OFFSET ?",
            COLUMNS, table, filter_sql, ORDER
        );
        values.push(Value::BigInt(i64::from(query.pagination.size)));
        values.push(Value::BigInt(i64::try_from(query.pagination.offset()).unwrap_or(i64::MAX)));
        let items = Self::query_records(&conn, &page_sql, &values)?;

        debug!(
            "Fetched {} of {} records from {} (page {})",
            items.len(),
            total,
            collection,
            query.pagination.page
        );
        Ok(Page::new(
            items,
            u64::try_from(total).unwrap_or(0),
            query.pagination.page,
            query.pagination.size,
        ))
    }

    fn fetch_by_id(&self, collection: &str, id: &str) -> Result<ExecutionRecord, StoreError> {
        let conn = self.conn()?;
        let table = self.resolve(&conn, collection)?;
        let sql = format!("SELECT {} FROM {} WHERE id = ?", COLUMNS, table);

        match conn.query_row(&sql, params![id], StoredRow::read) {
            Ok(row) => row.into_record(),
            Err(duckdb::Error::QueryReturnedNoRows) => Err(StoreError::RecordNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn fetch_all_for_stats(&self, collection: &str) -> Result<Vec<ExecutionRecord>, StoreError> {
        let conn = self.conn()?;
        let table = self.resolve(&conn, collection)?;
        let sql = format!("SELECT {} FROM {} {}", COLUMNS, table, ORDER);
        Self::query_records(&conn, &sql, &[])
    }

    fn insert_records(&self, collection: &str, records: &[ExecutionRecord]) -> Result<usize, StoreError> {
        validate_collection_name(collection)?;
        let mut conn = self.conn()?;

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                id VARCHAR PRIMARY KEY,
                file_name VARCHAR NOT NULL,
                file_path VARCHAR NOT NULL,
                sql_content VARCHAR NOT NULL,
                data VARCHAR NOT NULL,
                status VARCHAR NOT NULL,
                error VARCHAR,
                row_count BIGINT NOT NULL,
                execution_time_ms DOUBLE NOT NULL,
                execution_time DOUBLE NOT NULL,
                \"timestamp\" DOUBLE NOT NULL,
                save_time VARCHAR
            )",
            collection
        ))?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO \"{}\" ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                collection, COLUMNS
            ))?;
            for record in records {
                let data = serde_json::to_string(&record.data)?;
                stmt.execute(params![
                    record.id,
                    record.file_name,
                    record.file_path,
                    record.sql_content,
                    data,
                    record.status.as_str(),
                    record.error,
                    i64::try_from(record.row_count).unwrap_or(i64::MAX),
                    record.execution_time_ms,
                    record.execution_time,
                    record.timestamp,
                    record.save_time,
                ])?;
            }
        }
        tx.commit()?;

        info!("Inserted {} records into collection {}", records.len(), collection);
        Ok(records.len())
    }
}
