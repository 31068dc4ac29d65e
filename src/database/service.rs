//! Statement execution for the DAO layer.
//!
//! [`DatabaseService::persist`] is the only entry point DAOs use to run SQL: it
//! prepares the statement, binds parameters according to their [`Parameters`]
//! variant and executes it. Row counts, result rows and the last insert id stay
//! readable on the service until the next `persist`.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::database::connection::{Connection, Row, StatementOutcome};
use crate::database::query_builder::Condition;
use crate::database::statement::{BindError, BoundValue, ParamType, PreparedStatement};

static NAMED_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r":(\w+)").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceKind {
    Prepare,
    Bind,
    /// Unique, foreign key, not-null or check constraint violated
    Constraint,
    /// Pool, socket or TLS failure
    Connection,
    Driver,
    NoStatement,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Data persistence error: {message}")]
pub struct PersistenceError {
    pub kind: PersistenceKind,
    pub message: String,
}

impl PersistenceError {
    pub fn new(kind: PersistenceKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    fn no_statement() -> Self {
        Self::new(PersistenceKind::NoStatement, "no statement has been prepared")
    }
}

impl From<BindError> for PersistenceError {
    fn from(err: BindError) -> Self {
        let kind = match err {
            BindError::MixedPlaceholders => PersistenceKind::Prepare,
            _ => PersistenceKind::Bind,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::Database(db) => match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::NotNullViolation
                | sqlx::error::ErrorKind::CheckViolation => PersistenceKind::Constraint,
                _ => PersistenceKind::Driver,
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => PersistenceKind::Connection,
            _ => PersistenceKind::Driver,
        };
        Self::new(kind, err.to_string())
    }
}

/// Parameters for one `persist` call, tagged with how they bind
#[derive(Debug, Clone, PartialEq)]
pub enum Parameters {
    /// `:key = value`
    Named(Map<String, Value>),
    /// `:key = '%value%'` for LIKE searches
    Search(Map<String, Value>),
    /// 1-based `?` values for delete-by-IN-list
    Positional(Vec<Value>),
}

impl Parameters {
    pub fn none() -> Self {
        Parameters::Named(Map::new())
    }
}

/// Explicit mapping from caller-side keys to column names.
///
/// Keys without an entry map to themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    renames: Vec<(String, String)>,
}

impl ColumnMapping {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn new<K, C>(pairs: impl IntoIterator<Item = (K, C)>) -> Self
    where
        K: Into<String>,
        C: Into<String>,
    {
        Self {
            renames: pairs.into_iter().map(|(k, c)| (k.into(), c.into())).collect(),
        }
    }

    pub fn column_for<'a>(&'a self, key: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(from, _)| from == key)
            .map(|(_, column)| column.as_str())
            .unwrap_or(key)
    }

    /// Rename every key, keeping order
    pub fn apply(&self, fields: &Map<String, Value>) -> Map<String, Value> {
        fields
            .iter()
            .map(|(key, value)| (self.column_for(key).to_string(), value.clone()))
            .collect()
    }
}

pub struct DatabaseService {
    connection: Arc<dyn Connection>,
    statement: Option<PreparedStatement>,
    outcome: Option<StatementOutcome>,
    cursor: usize,
}

impl DatabaseService {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            statement: None,
            outcome: None,
            cursor: 0,
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Compile `sql`, replacing any previous statement and its results
    pub fn prepare(&mut self, sql: &str) -> Result<&mut Self, PersistenceError> {
        let statement = PreparedStatement::parse(sql)
            .map_err(|e| PersistenceError::new(PersistenceKind::Prepare, e.to_string()))?;
        self.statement = Some(statement);
        self.outcome = None;
        self.cursor = 0;
        Ok(self)
    }

    /// Classify a scalar for binding
    pub fn bind(value: &Value) -> Result<ParamType, BindError> {
        BoundValue::from_json(value).map(|v| v.param_type())
    }

    pub fn bind_parameters(
        &mut self,
        fields: &Map<String, Value>,
        is_search: bool,
    ) -> Result<&mut Self, PersistenceError> {
        if is_search {
            self.bind_search_values(fields)?;
        } else {
            self.bind_values(fields)?;
        }
        Ok(self)
    }

    pub fn bind_mass_delete_parameters(&mut self, values: &[Value]) -> Result<&mut Self, PersistenceError> {
        let statement = self.statement.as_mut().ok_or_else(PersistenceError::no_statement)?;
        for (index, value) in values.iter().enumerate() {
            statement.bind_position(index + 1, BoundValue::from_json(value)?)?;
        }
        Ok(self)
    }

    fn bind_values(&mut self, fields: &Map<String, Value>) -> Result<(), PersistenceError> {
        let statement = self.statement.as_mut().ok_or_else(PersistenceError::no_statement)?;
        for (key, value) in fields {
            if !statement.bind_named(key, BoundValue::from_json(value)?) {
                debug!(parameter = %key, "statement does not reference parameter");
            }
        }
        Ok(())
    }

    fn bind_search_values(&mut self, fields: &Map<String, Value>) -> Result<(), PersistenceError> {
        let statement = self.statement.as_mut().ok_or_else(PersistenceError::no_statement)?;
        for (key, value) in fields {
            let pattern = format!("%{}%", search_text(value)?);
            if !statement.bind_named(key, BoundValue::Str(pattern)) {
                debug!(parameter = %key, "statement does not reference parameter");
            }
        }
        Ok(())
    }

    pub async fn execute(&mut self) -> Result<(), PersistenceError> {
        let statement = self.statement.as_ref().ok_or_else(PersistenceError::no_statement)?;
        let values = statement.bound_values()?;
        let outcome = self.connection.run(statement.sql(), &values).await?;
        self.outcome = Some(outcome);
        self.cursor = 0;
        Ok(())
    }

    /// Rows returned by a select, or rows affected by any other statement
    pub fn num_rows(&self) -> u64 {
        match &self.outcome {
            Some(outcome) if !outcome.rows.is_empty() => outcome.rows.len() as u64,
            Some(outcome) => outcome.rows_affected,
            None => 0,
        }
    }

    /// Next unread row
    pub fn result(&mut self) -> Option<Row> {
        let row = self.outcome.as_ref()?.rows.get(self.cursor).cloned();
        if row.is_some() {
            self.cursor += 1;
        }
        row
    }

    /// All unread rows
    pub fn results(&mut self) -> Vec<Row> {
        match &self.outcome {
            Some(outcome) => {
                let rows = outcome.rows.get(self.cursor..).unwrap_or_default().to_vec();
                self.cursor = outcome.rows.len();
                rows
            }
            None => Vec::new(),
        }
    }

    /// Auto-increment id generated by the last executed insert
    pub fn last_id(&self) -> Result<u64, PersistenceError> {
        self.outcome
            .as_ref()
            .map(|outcome| outcome.last_insert_id)
            .ok_or_else(PersistenceError::no_statement)
    }

    pub async fn persist(&mut self, sql: &str, parameters: Parameters) -> Result<(), PersistenceError> {
        self.prepare(sql)?;
        match &parameters {
            Parameters::Positional(values) => {
                self.bind_mass_delete_parameters(values)?;
            }
            Parameters::Named(fields) => {
                self.bind_parameters(fields, false)?;
            }
            Parameters::Search(fields) => {
                self.bind_parameters(fields, true)?;
            }
        }
        self.execute().await
    }

    pub async fn begin(&self) -> Result<(), PersistenceError> {
        Ok(self.connection.begin().await?)
    }

    pub async fn commit(&self) -> Result<(), PersistenceError> {
        Ok(self.connection.commit().await?)
    }

    pub async fn rollback(&self) -> Result<(), PersistenceError> {
        Ok(self.connection.rollback().await?)
    }

    /// Insert values are the fields themselves; `parameters` wins on clashes
    pub fn build_insert_query_parameters(
        conditions: &Map<String, Value>,
        parameters: &Map<String, Value>,
    ) -> Map<String, Value> {
        let mut merged = conditions.clone();
        for (key, value) in parameters {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Column-named update values plus the key the WHERE clause filters on
    pub fn build_update_query_parameters(
        fields: &Map<String, Value>,
        mapping: &ColumnMapping,
        key_column: &str,
        key_value: &Value,
    ) -> Map<String, Value> {
        let mut parameters = mapping.apply(fields);
        parameters.insert(key_column.to_string(), key_value.clone());
        parameters
    }

    /// Values of structured conditions, in order, for `IN (?,?,...)`
    pub fn build_delete_query_parameters(conditions: &[Condition]) -> Vec<Value> {
        conditions
            .iter()
            .filter_map(|condition| condition.value().cloned())
            .collect()
    }

    /// Keep only the parameters the conditions reference as `:name`. With no
    /// conditions every parameter is passed through.
    pub fn build_query_parameters(
        conditions: &[Condition],
        parameters: &Map<String, Value>,
    ) -> Map<String, Value> {
        if conditions.is_empty() {
            return parameters.clone();
        }

        let lookup = |name: &str| {
            parameters
                .get(name)
                .or_else(|| parameters.get(&format!(":{}", name)))
                .cloned()
        };

        let mut selected = Map::new();
        for condition in conditions {
            match condition {
                Condition::Literal(fragment) => {
                    for capture in NAMED_PARAM.captures_iter(fragment) {
                        let name = &capture[1];
                        if let Some(value) = lookup(name) {
                            selected.insert(name.to_string(), value);
                        }
                    }
                }
                Condition::Match { field: Some(field), value, .. } => {
                    let name = field.replace('.', "_");
                    let value = lookup(&name)
                        .or_else(|| lookup(field))
                        .unwrap_or_else(|| value.clone());
                    selected.insert(name, value);
                }
                Condition::Match { field: None, .. } => {}
            }
        }
        selected
    }
}

fn search_text(value: &Value) -> Result<String, BindError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(true) => Ok("1".to_string()),
        Value::Bool(false) => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::Array(_) => Err(BindError::UnsupportedType("array")),
        Value::Object(_) => Err(BindError::UnsupportedType("object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedConnection;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn persist_binds_named_parameters_in_statement_order() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::affected(1));
        let mut service = DatabaseService::new(conn.clone());

        service
            .persist(
                "UPDATE products SET sku = :sku WHERE id = :id LIMIT 1",
                Parameters::Named(map(json!({":id": 5, "sku": "X1", "unused": 1}))),
            )
            .await
            .unwrap();

        let executed = conn.executed();
        assert_eq!(executed[0].sql, "UPDATE products SET sku = ? WHERE id = ? LIMIT 1");
        assert_eq!(
            executed[0].values,
            vec![BoundValue::Str("X1".into()), BoundValue::Int(5)]
        );
        assert_eq!(service.num_rows(), 1);
    }

    #[tokio::test]
    async fn search_parameters_are_wrapped() {
        let conn = ScriptedConnection::new();
        let mut service = DatabaseService::new(conn.clone());
        service
            .persist(
                "SELECT * FROM products WHERE sku LIKE :sku",
                Parameters::Search(map(json!({"sku": "BK"}))),
            )
            .await
            .unwrap();
        assert_eq!(conn.executed()[0].values, vec![BoundValue::Str("%BK%".into())]);
    }

    #[tokio::test]
    async fn mass_delete_binds_positionally() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::affected(2));
        let mut service = DatabaseService::new(conn.clone());
        service
            .persist(
                "DELETE FROM products WHERE id IN (?,?)",
                Parameters::Positional(vec![json!(3), json!("4")]),
            )
            .await
            .unwrap();
        assert_eq!(
            conn.executed()[0].values,
            vec![BoundValue::Int(3), BoundValue::Str("4".into())]
        );
        assert_eq!(service.num_rows(), 2);
    }

    #[tokio::test]
    async fn unsupported_values_fail_before_execution() {
        let conn = ScriptedConnection::new();
        let mut service = DatabaseService::new(conn.clone());
        let err = service
            .persist(
                "INSERT INTO t (a) VALUES (:a)",
                Parameters::Named(map(json!({"a": [1, 2]}))),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, PersistenceKind::Bind);
        assert!(conn.executed().is_empty());
    }

    #[tokio::test]
    async fn unbound_placeholder_is_a_bind_error() {
        let conn = ScriptedConnection::new();
        let mut service = DatabaseService::new(conn.clone());
        let err = service
            .persist("SELECT * FROM t WHERE a = :a", Parameters::none())
            .await
            .unwrap_err();
        assert_eq!(err.kind, PersistenceKind::Bind);
        assert!(err.message.contains(":a"));
    }

    #[tokio::test]
    async fn driver_failures_are_wrapped() {
        let conn = ScriptedConnection::new();
        conn.push_error("server has gone away");
        let mut service = DatabaseService::new(conn.clone());
        let err = service.persist("SELECT 1", Parameters::none()).await.unwrap_err();
        assert_eq!(err.kind, PersistenceKind::Driver);
        assert!(err.to_string().starts_with("Data persistence error"));
        assert!(err.message.contains("server has gone away"));
    }

    #[tokio::test]
    async fn result_and_results_share_a_cursor() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::rows(vec![
            map(json!({"id": 1})),
            map(json!({"id": 2})),
            map(json!({"id": 3})),
        ]));
        let mut service = DatabaseService::new(conn);
        service.persist("SELECT id FROM t", Parameters::none()).await.unwrap();

        assert_eq!(service.num_rows(), 3);
        assert_eq!(service.result(), Some(map(json!({"id": 1}))));
        assert_eq!(service.results().len(), 2);
        assert_eq!(service.result(), None);
    }

    #[tokio::test]
    async fn last_id_requires_an_executed_statement() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::inserted(41));
        let mut service = DatabaseService::new(conn);
        assert_eq!(service.last_id().unwrap_err().kind, PersistenceKind::NoStatement);

        service
            .persist(
                "INSERT INTO t (a) VALUES (:a)",
                Parameters::Named(map(json!({"a": 1}))),
            )
            .await
            .unwrap();
        assert_eq!(service.last_id().unwrap(), 41);
    }

    #[test]
    fn bind_classifies_scalars() {
        assert_eq!(DatabaseService::bind(&json!(false)).unwrap(), ParamType::Int);
        assert_eq!(DatabaseService::bind(&json!(null)).unwrap(), ParamType::Null);
        assert_eq!(DatabaseService::bind(&json!("a")).unwrap(), ParamType::Str);
        assert!(DatabaseService::bind(&json!({"a": 1})).is_err());
    }

    #[test]
    fn update_parameters_use_explicit_mapping() {
        let mapping = ColumnMapping::new([("name", "product_name")]);
        let params = DatabaseService::build_update_query_parameters(
            &map(json!({"sku": "A", "name": "Dune"})),
            &mapping,
            "id",
            &json!(9),
        );
        assert_eq!(params, map(json!({"sku": "A", "product_name": "Dune", "id": 9})));
    }

    #[test]
    fn query_parameters_follow_condition_references() {
        let params = map(json!({":price": 10, "sku": "A", "other": 1}));
        let conditions = vec![
            Condition::literal("price > :price"),
            Condition::literal("sku = :sku"),
        ];
        let selected = DatabaseService::build_query_parameters(&conditions, &params);
        assert_eq!(selected, map(json!({"price": 10, "sku": "A"})));

        let all = DatabaseService::build_query_parameters(&[], &params);
        assert_eq!(all, params);
    }

    #[test]
    fn qualified_match_fields_bind_under_underscored_names() {
        let conditions = vec![Condition::equals("products.id", 4)];
        let selected = DatabaseService::build_query_parameters(&conditions, &Map::new());
        assert_eq!(selected, map(json!({"products_id": 4})));

        let overridden =
            DatabaseService::build_query_parameters(&conditions, &map(json!({"products.id": 9})));
        assert_eq!(overridden, map(json!({"products_id": 9})));
    }

    #[test]
    fn delete_and_insert_parameters() {
        let conditions = vec![Condition::equals("id", 1), Condition::equals("id", 2)];
        assert_eq!(
            DatabaseService::build_delete_query_parameters(&conditions),
            vec![json!(1), json!(2)]
        );

        let merged = DatabaseService::build_insert_query_parameters(
            &map(json!({"a": 1, "b": 2})),
            &map(json!({"b": 3})),
        );
        assert_eq!(merged, map(json!({"a": 1, "b": 3})));
    }
}
