pub mod connection;
pub mod dao;
pub mod manager;
pub mod models;
pub mod query_builder;
pub mod service;
pub mod statement;

pub use connection::{Connection, ConnectionSource, Row, StatementOutcome};
pub use dao::{Dao, DaoError, ReadOutcome, Selection};
pub use manager::{DatabaseError, DatabaseManager};
pub use query_builder::{BuildError, Condition, QueryBuilder, QuerySpec, QueryType};
pub use service::{ColumnMapping, DatabaseService, Parameters, PersistenceError, PersistenceKind};
