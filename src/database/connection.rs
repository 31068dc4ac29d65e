use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{Map, Value};
use sqlx::mysql::{MySql, MySqlRow, MySqlTransactionManager};
use sqlx::pool::PoolConnection;
use sqlx::{Column, Either, Row as _, TransactionManager, TypeInfo};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::database::manager::DatabaseError;
use crate::database::statement::BoundValue;

/// One result row, columns in select order
pub type Row = Map<String, Value>;

/// Everything a single executed statement produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementOutcome {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    pub last_insert_id: u64,
}

impl StatementOutcome {
    pub fn rows(rows: Vec<Row>) -> Self {
        Self { rows, ..Default::default() }
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self { rows_affected, ..Default::default() }
    }

    pub fn inserted(last_insert_id: u64) -> Self {
        Self { rows: Vec::new(), rows_affected: 1, last_insert_id }
    }
}

/// A single database connection, held for the duration of one request and
/// shared by every DAO that request builds.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run a positional statement with its bound values
    async fn run(&self, sql: &str, values: &[BoundValue]) -> Result<StatementOutcome, sqlx::Error>;

    async fn begin(&self) -> Result<(), sqlx::Error>;

    async fn commit(&self) -> Result<(), sqlx::Error>;

    async fn rollback(&self) -> Result<(), sqlx::Error>;
}

/// Hands out one [`Connection`] per request
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn Connection>, DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError>;
}

/// A pooled MySQL connection checked out for one request
pub struct MysqlConnection {
    inner: Mutex<PoolConnection<MySql>>,
    log_queries: bool,
    slow_query_threshold: Option<Duration>,
}

impl MysqlConnection {
    pub fn new(
        connection: PoolConnection<MySql>,
        log_queries: bool,
        slow_query_threshold: Option<Duration>,
    ) -> Self {
        Self {
            inner: Mutex::new(connection),
            log_queries,
            slow_query_threshold,
        }
    }
}

impl Drop for MysqlConnection {
    fn drop(&mut self) {
        // An open transaction is rolled back before the pool hands the
        // connection to another request
        MySqlTransactionManager::start_rollback(&mut **self.inner.get_mut());
    }
}

#[async_trait]
impl Connection for MysqlConnection {
    async fn run(&self, sql: &str, values: &[BoundValue]) -> Result<StatementOutcome, sqlx::Error> {
        if self.log_queries {
            debug!(sql, params = values.len(), "executing statement");
        }
        let started = Instant::now();

        let mut query = sqlx::query(sql);
        for value in values {
            query = match value {
                BoundValue::Int(i) => query.bind(*i),
                BoundValue::Null => query.bind(None::<String>),
                BoundValue::Str(s) => query.bind(s.clone()),
            };
        }

        let mut conn = self.inner.lock().await;
        let mut outcome = StatementOutcome::default();
        {
            let mut stream = query.fetch_many(&mut **conn);
            while let Some(item) = stream.try_next().await? {
                match item {
                    Either::Left(result) => {
                        outcome.rows_affected += result.rows_affected();
                        if result.last_insert_id() != 0 {
                            outcome.last_insert_id = result.last_insert_id();
                        }
                    }
                    Either::Right(row) => outcome.rows.push(row_to_json(&row)),
                }
            }
        }

        if let Some(threshold) = self.slow_query_threshold {
            let elapsed = started.elapsed();
            if elapsed > threshold {
                warn!(sql, elapsed_ms = elapsed.as_millis() as u64, "slow query");
            }
        }

        Ok(outcome)
    }

    async fn begin(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.inner.lock().await;
        MySqlTransactionManager::begin(&mut **conn).await
    }

    async fn commit(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.inner.lock().await;
        MySqlTransactionManager::commit(&mut **conn).await
    }

    async fn rollback(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.inner.lock().await;
        MySqlTransactionManager::rollback(&mut **conn).await
    }
}

fn row_to_json(row: &MySqlRow) -> Row {
    let mut map = Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), column_value(row, index));
    }
    map
}

fn column_value(row: &MySqlRow, index: usize) -> Value {
    let type_name = row.column(index).type_info().name().to_ascii_uppercase();
    let integer = ["TINYINT", "SMALLINT", "MEDIUMINT", "INT", "BIGINT"]
        .iter()
        .any(|t| type_name.starts_with(t));

    let decoded: Result<Option<Value>, sqlx::Error> = match type_name.as_str() {
        t if integer && t.ends_with("UNSIGNED") => row
            .try_get::<Option<u64>, _>(index)
            .map(|v| v.map(Value::from)),
        _ if integer => row
            .try_get::<Option<i64>, _>(index)
            .map(|v| v.map(Value::from)),
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .map(|v| v.map(Value::Bool)),
        "FLOAT" | "DOUBLE" => row.try_get::<Option<f64>, _>(index).map(|v| {
            v.map(|f| {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            })
        }),
        // Prices keep their exact decimal text
        "DECIMAL" => row
            .try_get::<Option<rust_decimal::Decimal>, _>(index)
            .map(|v| v.map(|d| Value::String(d.to_string()))),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .map(|v| v.map(|d| Value::String(d.format("%Y-%m-%d %H:%M:%S").to_string()))),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .map(|v| v.map(|d| Value::String(d.to_string()))),
        "JSON" => row.try_get::<Option<Value>, _>(index),
        _ => row
            .try_get::<Option<String>, _>(index)
            .map(|v| v.map(Value::String)),
    };

    match decoded {
        Ok(Some(value)) => value,
        Ok(None) => Value::Null,
        Err(_) => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}
