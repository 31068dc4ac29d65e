//! Table-level data access.
//!
//! A [`Dao`] owns one [`QueryBuilder`] and one [`DatabaseService`] bound to a
//! table and its key column. Each verb builds a fresh [`QuerySpec`], renders it
//! and hands the SQL plus its parameters to `persist`. The subtype DAOs in this
//! module wrap a `Dao` for the product, product option and user tables.

pub mod product;
pub mod product_option;
pub mod user;

pub use product::{Book, BookDao, Dvd, DvdDao, Furniture, FurnitureDao, ProductDao, ProductKind, TypedProductDao};
pub use product_option::ProductOptionDao;
pub use user::UserDao;

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::database::connection::{Connection, Row};
use crate::database::query_builder::{
    BuildError, Condition, Extras, Pagination, QueryBuilder, QuerySpec, QueryType,
};
use crate::database::service::{ColumnMapping, DatabaseService, Parameters, PersistenceError};

#[derive(Debug, Error)]
pub enum DaoError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("{0}")]
    InvalidArgument(String),
}

/// Result of a read: rows, or an explicit empty marker.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Rows(Vec<Row>),
    NoData,
}

impl ReadOutcome {
    fn from_rows(rows: Vec<Row>) -> Self {
        if rows.is_empty() {
            ReadOutcome::NoData
        } else {
            ReadOutcome::Rows(rows)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ReadOutcome::NoData)
    }

    pub fn rows(&self) -> &[Row] {
        match self {
            ReadOutcome::Rows(rows) => rows,
            ReadOutcome::NoData => &[],
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self {
            ReadOutcome::Rows(rows) => rows,
            ReadOutcome::NoData => Vec::new(),
        }
    }

    /// Wire form: an array of row objects, or `["no data"]`
    pub fn to_json(&self) -> Value {
        match self {
            ReadOutcome::Rows(rows) => {
                Value::Array(rows.iter().cloned().map(Value::Object).collect())
            }
            ReadOutcome::NoData => Value::Array(vec![Value::String("no data".to_string())]),
        }
    }
}

/// What a select reads: columns, filters, the values those filters reference,
/// paging and ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub selectors: Vec<String>,
    pub conditions: Vec<Condition>,
    /// Named values for `:name` references inside literal conditions
    pub parameters: Map<String, Value>,
    pub pagination: Pagination,
    pub extras: Extras,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filtered(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            ..Default::default()
        }
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn order_by(mut self, orderby: impl Into<String>) -> Self {
        self.extras.orderby = Some(orderby.into());
        self
    }

    /// Condition-referenced values plus `:offset`/`:limit` when paging
    fn bound_parameters(&self) -> Map<String, Value> {
        let mut parameters = DatabaseService::build_query_parameters(&self.conditions, &self.parameters);
        parameters.extend(self.pagination.parameters());
        parameters
    }
}

pub struct Dao {
    service: DatabaseService,
    builder: QueryBuilder,
    table: String,
    table_id: String,
}

impl Dao {
    pub fn new(connection: Arc<dyn Connection>, table: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self {
            service: DatabaseService::new(connection),
            builder: QueryBuilder::new(),
            table: table.into(),
            table_id: table_id.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.table
    }

    pub fn schema_id(&self) -> &str {
        &self.table_id
    }

    pub fn service(&self) -> &DatabaseService {
        &self.service
    }

    pub fn last_id(&self) -> Result<u64, DaoError> {
        Ok(self.service.last_id()?)
    }

    /// Insert one row; the new id when exactly one row was written, else 0
    pub async fn create(&mut self, fields: Map<String, Value>) -> Result<u64, DaoError> {
        let sql = self
            .builder
            .build_query(QuerySpec {
                fields: fields.clone(),
                ..QuerySpec::new(QueryType::Insert, self.table.as_str())
            })
            .insert_query()?;

        let parameters = DatabaseService::build_insert_query_parameters(&fields, &Map::new());
        self.service.persist(&sql, Parameters::Named(parameters)).await?;

        if self.service.num_rows() == 1 {
            self.last_id()
        } else {
            Ok(0)
        }
    }

    pub async fn read(&mut self, selection: Selection) -> Result<ReadOutcome, DaoError> {
        let sql = self
            .builder
            .build_query(QuerySpec {
                selectors: selection.selectors.clone(),
                conditions: selection.conditions.clone(),
                params: selection.pagination.clone(),
                extras: selection.extras.clone(),
                ..QuerySpec::new(QueryType::Select, self.table.as_str())
            })
            .select_query()?;

        self.service
            .persist(&sql, Parameters::Named(selection.bound_parameters()))
            .await?;
        Ok(ReadOutcome::from_rows(self.service.results()))
    }

    /// Select joined across extra tables; joins are `(table, on)` pairs applied
    /// in order.
    pub async fn read_joined(
        &mut self,
        selection: Selection,
        joins: &[(&str, &str)],
    ) -> Result<Vec<Row>, DaoError> {
        self.builder.build_query(QuerySpec {
            selectors: selection.selectors.clone(),
            conditions: selection.conditions.clone(),
            params: selection.pagination.clone(),
            extras: selection.extras.clone(),
            ..QuerySpec::new(QueryType::Select, self.table.as_str())
        });
        for (table, on) in joins {
            self.builder.inner_join(table, on);
        }
        let sql = self.builder.select_query()?;

        self.service
            .persist(&sql, Parameters::Named(selection.bound_parameters()))
            .await?;
        Ok(self.service.results())
    }

    /// Update the row whose key column equals `key_value`. True only when
    /// exactly one row matched.
    pub async fn update(
        &mut self,
        fields: &Map<String, Value>,
        mapping: &ColumnMapping,
        key_value: &Value,
    ) -> Result<bool, DaoError> {
        let sql = self
            .builder
            .build_query(QuerySpec {
                fields: mapping.apply(fields),
                primary_key: self.table_id.clone(),
                ..QuerySpec::new(QueryType::Update, self.table.as_str())
            })
            .update_query()?;

        let parameters =
            DatabaseService::build_update_query_parameters(fields, mapping, &self.table_id, key_value);
        self.service.persist(&sql, Parameters::Named(parameters)).await?;
        Ok(self.service.num_rows() == 1)
    }

    /// All-or-nothing: true only when every condition deleted a row
    pub async fn delete(&mut self, conditions: Vec<Condition>) -> Result<bool, DaoError> {
        let expected = conditions.len() as u64;
        let sql = self
            .builder
            .build_query(QuerySpec {
                conditions,
                ..QuerySpec::new(QueryType::Delete, self.table.as_str())
            })
            .delete_query()?;

        let values = DatabaseService::build_delete_query_parameters(&self.builder.spec().conditions);
        self.service.persist(&sql, Parameters::Positional(values)).await?;

        let deleted = self.service.num_rows();
        if deleted != expected {
            debug!(table = %self.table, expected, deleted, "delete count mismatch");
        }
        Ok(deleted == expected)
    }

    pub async fn delete_by_ids(&mut self, ids: &[Value]) -> Result<bool, DaoError> {
        let conditions = ids
            .iter()
            .map(|id| Condition::equals(self.table_id.as_str(), id.clone()))
            .collect();
        self.delete(conditions).await
    }

    /// Caller-supplied SQL with every parameter bound by name
    pub async fn raw_query(&mut self, sql: &str, parameters: &Map<String, Value>) -> Result<ReadOutcome, DaoError> {
        let sql = self
            .builder
            .build_query(QuerySpec {
                raw: sql.to_string(),
                ..QuerySpec::new(QueryType::Raw, self.table.as_str())
            })
            .raw_query()?;

        let parameters = DatabaseService::build_query_parameters(&[], parameters);
        self.service.persist(&sql, Parameters::Named(parameters)).await?;
        Ok(ReadOutcome::from_rows(self.service.results()))
    }

    pub async fn find_where(
        &mut self,
        conditions: Vec<Condition>,
        parameters: Map<String, Value>,
    ) -> Result<ReadOutcome, DaoError> {
        self.read(Selection::filtered(conditions).with_parameters(parameters))
            .await
    }

    /// First row whose columns equal every given value
    pub async fn find_by_exact(&mut self, fields: &Map<String, Value>) -> Result<Option<Row>, DaoError> {
        let sql = self
            .builder
            .build_query(QuerySpec {
                selectors: fields.keys().cloned().collect(),
                ..QuerySpec::new(QueryType::Search, self.table.as_str())
            })
            .exact_search_query()?;

        self.service
            .persist(&sql, Parameters::Named(fields.clone()))
            .await?;
        Ok(self.service.result())
    }

    /// Rows where any term matches: `LIKE '%term%'`, or `=` when `exact`
    pub async fn search(&mut self, terms: &Map<String, Value>, exact: bool) -> Result<Vec<Row>, DaoError> {
        self.builder.build_query(QuerySpec {
            selectors: terms.keys().cloned().collect(),
            is_search: !exact,
            ..QuerySpec::new(QueryType::Search, self.table.as_str())
        });
        let (sql, parameters) = if exact {
            (self.builder.search_query_exact()?, Parameters::Named(terms.clone()))
        } else {
            (self.builder.search_query()?, Parameters::Search(terms.clone()))
        };

        self.service.persist(&sql, parameters).await?;
        if self.service.num_rows() >= 1 {
            Ok(self.service.results())
        } else {
            Ok(Vec::new())
        }
    }

    pub async fn begin(&self) -> Result<(), DaoError> {
        Ok(self.service.begin().await?)
    }

    pub async fn commit(&self) -> Result<(), DaoError> {
        Ok(self.service.commit().await?)
    }

    pub async fn rollback(&self) -> Result<(), DaoError> {
        Ok(self.service.rollback().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connection::StatementOutcome;
    use crate::database::statement::BoundValue;
    use crate::testing::ScriptedConnection;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_returns_new_id_for_single_insert() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::inserted(12));
        let mut dao = Dao::new(conn.clone(), "products", "id");

        let id = dao
            .create(map(json!({"sku": "A1", "product_name": "Dune"})))
            .await
            .unwrap();

        assert_eq!(id, 12);
        assert_eq!(
            conn.executed_sql(),
            vec!["INSERT INTO products (sku, product_name) VALUES (?, ?)"]
        );
    }

    #[tokio::test]
    async fn create_returns_zero_when_nothing_was_written() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::affected(0));
        let mut dao = Dao::new(conn, "products", "id");
        assert_eq!(dao.create(map(json!({"sku": "A1"}))).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn read_distinguishes_rows_from_no_data() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::rows(vec![map(json!({"id": 1}))]));
        conn.push(StatementOutcome::default());
        let mut dao = Dao::new(conn.clone(), "products", "id");

        let found = dao
            .read(
                Selection::filtered(vec![Condition::literal("price > :price")])
                    .with_parameters(map(json!({":price": 10})))
                    .with_pagination(Pagination::page(5, 0)),
            )
            .await
            .unwrap();
        assert_eq!(found.rows().len(), 1);

        let empty = dao.read(Selection::all()).await.unwrap();
        assert_eq!(empty, ReadOutcome::NoData);
        assert_eq!(empty.to_json(), json!(["no data"]));

        let executed = conn.executed();
        assert_eq!(
            executed[0].sql,
            "SELECT * FROM products WHERE price > ? LIMIT ?, ?"
        );
        assert_eq!(
            executed[0].values,
            vec![BoundValue::Int(10), BoundValue::Int(0), BoundValue::Int(5)]
        );
    }

    #[tokio::test]
    async fn read_binds_qualified_match_conditions() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::rows(vec![map(json!({"id": 4}))]));
        let mut dao = Dao::new(conn.clone(), "products", "id");

        let outcome = dao
            .read(Selection::filtered(vec![Condition::equals("products.id", 4)]))
            .await
            .unwrap();

        assert_eq!(outcome.rows().len(), 1);
        let executed = conn.executed();
        assert_eq!(executed[0].sql, "SELECT * FROM products WHERE products.id = ?");
        assert_eq!(executed[0].values, vec![BoundValue::Int(4)]);
    }

    #[tokio::test]
    async fn read_failure_is_an_error_not_a_row() {
        let conn = ScriptedConnection::new();
        conn.push_error("table products doesn't exist");
        let mut dao = Dao::new(conn, "products", "id");
        let err = dao.read(Selection::all()).await.unwrap_err();
        assert!(matches!(err, DaoError::Persistence(_)));
    }

    #[tokio::test]
    async fn update_injects_key_and_requires_one_row() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::affected(1));
        conn.push(StatementOutcome::affected(0));
        let mut dao = Dao::new(conn.clone(), "users", "id");
        let mapping = ColumnMapping::new([("fullName", "name")]);

        assert!(dao
            .update(&map(json!({"fullName": "Ada"})), &mapping, &json!(3))
            .await
            .unwrap());
        assert!(!dao
            .update(&map(json!({"fullName": "Ada"})), &mapping, &json!(4))
            .await
            .unwrap());

        let executed = conn.executed();
        assert_eq!(executed[0].sql, "UPDATE users SET name = ? WHERE id = ? LIMIT 1");
        assert_eq!(
            executed[0].values,
            vec![BoundValue::Str("Ada".into()), BoundValue::Int(3)]
        );
    }

    #[tokio::test]
    async fn delete_by_ids_is_all_or_nothing() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::affected(2));
        conn.push(StatementOutcome::affected(3));
        let mut dao = Dao::new(conn.clone(), "products", "id");
        let ids = [json!(1), json!(2), json!(3)];

        assert!(!dao.delete_by_ids(&ids).await.unwrap());
        assert!(dao.delete_by_ids(&ids).await.unwrap());

        let executed = conn.executed();
        assert_eq!(executed[0].sql, "DELETE FROM products WHERE id IN (?,?,?)");
        assert_eq!(executed[0].values.len(), 3);
    }

    #[tokio::test]
    async fn delete_without_ids_is_a_build_error() {
        let conn = ScriptedConnection::new();
        let mut dao = Dao::new(conn.clone(), "products", "id");
        let err = dao.delete_by_ids(&[]).await.unwrap_err();
        assert!(matches!(err, DaoError::Build(BuildError::EmptyConditions)));
        assert!(conn.executed().is_empty());
    }

    #[tokio::test]
    async fn find_by_exact_returns_first_row() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::rows(vec![map(json!({"id": 7, "email": "a@b.co"}))]));
        let mut dao = Dao::new(conn.clone(), "users", "id");

        let row = dao
            .find_by_exact(&map(json!({"email": "a@b.co"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["id"], json!(7));
        assert_eq!(conn.executed_sql(), vec!["SELECT * FROM users WHERE email = ?"]);
    }

    #[tokio::test]
    async fn search_wraps_terms_unless_exact() {
        let conn = ScriptedConnection::new();
        let mut dao = Dao::new(conn.clone(), "products", "id");
        let terms = map(json!({"sku": "BK"}));

        assert!(dao.search(&terms, false).await.unwrap().is_empty());
        dao.search(&terms, true).await.unwrap();

        let executed = conn.executed();
        assert_eq!(executed[0].sql, "SELECT * FROM products WHERE sku LIKE ?");
        assert_eq!(executed[0].values, vec![BoundValue::Str("%BK%".into())]);
        assert_eq!(executed[1].sql, "SELECT * FROM products WHERE sku = ?");
        assert_eq!(executed[1].values, vec![BoundValue::Str("BK".into())]);
    }

    #[tokio::test]
    async fn raw_query_binds_all_parameters() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::rows(vec![map(json!({"n": 2}))]));
        let mut dao = Dao::new(conn.clone(), "products", "id");

        let outcome = dao
            .raw_query(
                "SELECT COUNT(*) AS n FROM products WHERE category_id = :category",
                &map(json!({"category": 1})),
            )
            .await
            .unwrap();
        assert_eq!(outcome.rows()[0]["n"], json!(2));
        assert_eq!(conn.executed()[0].values, vec![BoundValue::Int(1)]);
    }
}
