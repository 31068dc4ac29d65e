//! SQL text generation from an abstract query description.
//!
//! A [`QuerySpec`] names the table, statement type and the pieces each statement
//! needs. [`QueryBuilder`] holds one spec at a time and renders it through one of
//! its terminal `*_query` methods. Nothing here touches the database; values are
//! always left as `:name` or `?` placeholders for the
//! [`DatabaseService`](crate::database::service::DatabaseService) to bind.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised by the terminal builder methods
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("query type is not set")]
    MissingType,

    #[error("expected a {expected} query, spec is {actual}")]
    TypeMismatch { expected: QueryType, actual: QueryType },

    #[error("{0} query requires at least one field")]
    EmptyFields(QueryType),

    #[error("update on {0} has no columns left to set")]
    EmptySetList(String),

    #[error("search query requires at least one selector")]
    MissingSelectors,

    #[error("delete query requires at least one condition")]
    EmptyConditions,

    #[error("first delete condition does not name a field")]
    MissingConditionField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Insert,
    Select,
    Update,
    Delete,
    Raw,
    Search,
    Join,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Insert => "insert",
            QueryType::Select => "select",
            QueryType::Update => "update",
            QueryType::Delete => "delete",
            QueryType::Raw => "raw",
            QueryType::Search => "search",
            QueryType::Join => "join",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a spec's `conditions` list.
///
/// Literal fragments are spliced into the WHERE clause as written. Structured
/// matches are used by delete-by-IN-list and render as `field op :name` in a
/// select, where `name` is the field with dots replaced by underscores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Literal(String),
    Match {
        #[serde(default)]
        field: Option<String>,
        #[serde(default = "default_operator")]
        operator: String,
        #[serde(default)]
        value: Value,
    },
}

fn default_operator() -> String {
    "=".to_string()
}

impl Condition {
    pub fn literal(fragment: impl Into<String>) -> Self {
        Condition::Literal(fragment.into())
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Match {
            field: Some(field.into()),
            operator: default_operator(),
            value: value.into(),
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Condition::Literal(_) => None,
            Condition::Match { field, .. } => field.as_deref(),
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Condition::Literal(_) => None,
            Condition::Match { value, .. } => Some(value),
        }
    }

    /// Named placeholder a structured match binds to. Qualified columns
    /// (`products.id`) become `products_id`.
    pub fn placeholder(&self) -> Option<String> {
        self.field().map(|field| field.replace('.', "_"))
    }

    fn to_sql(&self) -> String {
        match (self, self.placeholder()) {
            (Condition::Literal(fragment), _) => fragment.clone(),
            (Condition::Match { field: Some(field), operator, .. }, Some(name)) => {
                format!("{} {} :{}", field, operator, name)
            }
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Extras {
    pub orderby: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub fn page(limit: i64, offset: i64) -> Self {
        Self { limit: Some(limit), offset: Some(offset) }
    }

    /// Whether `LIMIT :offset, :limit` is appended. An offset of `-1` disables it.
    pub fn is_active(&self) -> bool {
        self.limit.is_some() && self.offset != Some(-1)
    }

    /// Named values matching the `:offset` and `:limit` placeholders
    pub fn parameters(&self) -> Map<String, Value> {
        let mut params = Map::new();
        if let (true, Some(limit)) = (self.is_active(), self.limit) {
            params.insert("offset".to_string(), Value::from(self.offset.unwrap_or(0)));
            params.insert("limit".to_string(), Value::from(limit));
        }
        params
    }
}

/// Abstract description of one SQL statement.
///
/// Every key has a default, so callers fill in only what their statement needs
/// and spread `..Default::default()` over the rest. Deserializing from JSON
/// ignores unknown keys the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySpec {
    pub table: String,
    #[serde(rename = "type")]
    pub kind: Option<QueryType>,
    #[serde(deserialize_with = "selectors_from_list_or_map")]
    pub selectors: Vec<String>,
    pub conditions: Vec<Condition>,
    pub fields: Map<String, Value>,
    /// Column excluded from an update's SET list and used in its WHERE clause.
    /// Empty means `id`.
    pub primary_key: String,
    /// When false an update carries no WHERE clause at all.
    pub has_primary_key_filter: bool,
    pub extras: Extras,
    pub params: Pagination,
    pub raw: String,
    #[serde(rename = "isSearch")]
    pub is_search: bool,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            table: String::new(),
            kind: None,
            selectors: Vec::new(),
            conditions: Vec::new(),
            fields: Map::new(),
            primary_key: String::new(),
            has_primary_key_filter: true,
            extras: Extras::default(),
            params: Pagination::default(),
            raw: String::new(),
            is_search: true,
        }
    }
}

impl QuerySpec {
    pub fn new(kind: QueryType, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kind: Some(kind),
            ..Default::default()
        }
    }

    fn key_column(&self) -> &str {
        if self.primary_key.is_empty() {
            "id"
        } else {
            &self.primary_key
        }
    }
}

/// Selectors arrive either as a list of column names or as a column→value map;
/// only the names matter for SQL generation.
fn selectors_from_list_or_map<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(serde::de::Error::custom(format!(
                    "selector must be a string, got {}",
                    other
                ))),
            })
            .collect(),
        Value::Object(map) => Ok(map.into_iter().map(|(k, _)| k).collect()),
        Value::String(s) => Ok(vec![s]),
        other => Err(serde::de::Error::custom(format!(
            "selectors must be a list or a map, got {}",
            other
        ))),
    }
}

/// Renders SQL text from the most recently built [`QuerySpec`]
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    key: QuerySpec,
    joins: Vec<String>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current spec. Joins from a previous build are discarded.
    pub fn build_query(&mut self, spec: QuerySpec) -> &mut Self {
        self.key = spec;
        self.joins.clear();
        self
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.key
    }

    pub fn inner_join(&mut self, table: &str, on_condition: &str) -> &mut Self {
        self.joins.push(format!("INNER JOIN {} ON {}", table, on_condition));
        self
    }

    fn expect_type(&self, expected: QueryType) -> Result<(), BuildError> {
        match self.key.kind {
            None => Err(BuildError::MissingType),
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(BuildError::TypeMismatch { expected, actual }),
        }
    }

    pub fn insert_query(&self) -> Result<String, BuildError> {
        self.expect_type(QueryType::Insert)?;
        if self.key.fields.is_empty() {
            return Err(BuildError::EmptyFields(QueryType::Insert));
        }

        let columns: Vec<&str> = self.key.fields.keys().map(String::as_str).collect();
        Ok(format!(
            "INSERT INTO {} ({}) VALUES (:{})",
            self.key.table,
            columns.join(", "),
            columns.join(", :")
        ))
    }

    /// Also accepts a `join` spec; the join clauses themselves come from
    /// [`inner_join`](Self::inner_join).
    pub fn select_query(&self) -> Result<String, BuildError> {
        if self.key.kind != Some(QueryType::Join) {
            self.expect_type(QueryType::Select)?;
        }

        let selectors = if self.key.selectors.is_empty() {
            "*".to_string()
        } else {
            self.key.selectors.join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", selectors, self.key.table);
        self.push_conditions(&mut sql);
        self.push_order_by(&mut sql);
        self.push_pagination(&mut sql);
        Ok(sql)
    }

    pub fn update_query(&self) -> Result<String, BuildError> {
        self.expect_type(QueryType::Update)?;
        if self.key.fields.is_empty() {
            return Err(BuildError::EmptyFields(QueryType::Update));
        }

        let key_column = self.key.key_column();
        let assignments: Vec<String> = self
            .key
            .fields
            .keys()
            .filter(|field| field.as_str() != key_column)
            .map(|field| format!("{} = :{}", field, field))
            .collect();

        if assignments.is_empty() {
            return Err(BuildError::EmptySetList(self.key.table.clone()));
        }

        let mut sql = format!("UPDATE {} SET {}", self.key.table, assignments.join(", "));
        if self.key.has_primary_key_filter {
            sql.push_str(&format!(" WHERE {} = :{} LIMIT 1", key_column, key_column));
        }
        Ok(sql)
    }

    /// `DELETE ... WHERE <field> IN (?,?,...)` with one positional placeholder
    /// per condition. Every condition is assumed to target the first one's field.
    pub fn delete_query(&self) -> Result<String, BuildError> {
        self.expect_type(QueryType::Delete)?;
        let first = self.key.conditions.first().ok_or(BuildError::EmptyConditions)?;
        let field = first.field().ok_or(BuildError::MissingConditionField)?;

        let placeholders = vec!["?"; self.key.conditions.len()].join(",");
        Ok(format!(
            "DELETE FROM {} WHERE {} IN ({})",
            self.key.table, field, placeholders
        ))
    }

    /// OR-joined search over the selectors: `LIKE` when `isSearch` is set,
    /// `=` otherwise.
    pub fn search_query(&self) -> Result<String, BuildError> {
        let operator = if self.key.is_search { "LIKE" } else { "=" };
        self.render_search(operator, " OR ")
    }

    pub fn search_query_exact(&mut self) -> Result<String, BuildError> {
        self.key.is_search = false;
        self.search_query()
    }

    /// AND-joined equality over the selectors, for single-record lookups by
    /// several discriminating fields.
    pub fn exact_search_query(&self) -> Result<String, BuildError> {
        self.render_search("=", " AND ")
    }

    pub fn raw_query(&self) -> Result<String, BuildError> {
        self.expect_type(QueryType::Raw)?;
        Ok(self.key.raw.clone())
    }

    fn render_search(&self, operator: &str, glue: &str) -> Result<String, BuildError> {
        self.expect_type(QueryType::Search)?;
        if self.key.selectors.is_empty() {
            return Err(BuildError::MissingSelectors);
        }

        let predicates: Vec<String> = self
            .key
            .selectors
            .iter()
            .map(|selector| format!("{} {} :{}", selector, operator, selector))
            .collect();

        let mut sql = format!(
            "SELECT * FROM {} WHERE {}",
            self.key.table,
            predicates.join(glue)
        );
        self.push_order_by(&mut sql);
        self.push_pagination(&mut sql);
        Ok(sql)
    }

    fn push_conditions(&self, sql: &mut String) {
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        let fragments: Vec<String> = self
            .key
            .conditions
            .iter()
            .map(Condition::to_sql)
            .filter(|fragment| !fragment.is_empty())
            .collect();

        if !fragments.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&fragments.join(" AND "));
        }
    }

    fn push_order_by(&self, sql: &mut String) {
        if let Some(order) = self.key.extras.orderby.as_deref().filter(|o| !o.is_empty()) {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
    }

    fn push_pagination(&self, sql: &mut String) {
        if self.key.params.is_active() {
            sql.push_str(" LIMIT :offset, :limit");
        }
    }
}
