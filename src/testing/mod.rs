//! In-memory stand-ins for the database, shared by unit and integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::database::connection::{Connection, ConnectionSource, StatementOutcome};
use crate::database::manager::DatabaseError;
use crate::database::statement::BoundValue;

/// A statement as it reached the connection
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub values: Vec<BoundValue>,
}

/// Replays queued outcomes in order and records every statement it receives.
/// Once the queue is empty each statement yields an empty outcome.
#[derive(Debug, Default)]
pub struct ScriptedConnection {
    outcomes: Mutex<VecDeque<Result<StatementOutcome, String>>>,
    executed: Mutex<Vec<ExecutedStatement>>,
    transactions: Mutex<Vec<&'static str>>,
}

impl ScriptedConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, outcome: StatementOutcome) -> &Self {
        lock(&self.outcomes).push_back(Ok(outcome));
        self
    }

    /// Queue a driver failure for the next statement
    pub fn push_error(&self, message: impl Into<String>) -> &Self {
        lock(&self.outcomes).push_back(Err(message.into()));
        self
    }

    pub fn executed(&self) -> Vec<ExecutedStatement> {
        lock(&self.executed).clone()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        lock(&self.executed).iter().map(|s| s.sql.clone()).collect()
    }

    /// `begin`, `commit` and `rollback` calls in order
    pub fn transactions(&self) -> Vec<&'static str> {
        lock(&self.transactions).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn run(&self, sql: &str, values: &[BoundValue]) -> Result<StatementOutcome, sqlx::Error> {
        lock(&self.executed).push(ExecutedStatement {
            sql: sql.to_string(),
            values: values.to_vec(),
        });
        match lock(&self.outcomes).pop_front() {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(sqlx::Error::Protocol(message)),
            None => Ok(StatementOutcome::default()),
        }
    }

    async fn begin(&self) -> Result<(), sqlx::Error> {
        lock(&self.transactions).push("begin");
        Ok(())
    }

    async fn commit(&self) -> Result<(), sqlx::Error> {
        lock(&self.transactions).push("commit");
        Ok(())
    }

    async fn rollback(&self) -> Result<(), sqlx::Error> {
        lock(&self.transactions).push("rollback");
        Ok(())
    }
}

/// Hands the same scripted connection to every request
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    connection: Arc<ScriptedConnection>,
}

impl ScriptedSource {
    pub fn new(connection: Arc<ScriptedConnection>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Arc<ScriptedConnection> {
        &self.connection
    }
}

#[async_trait]
impl ConnectionSource for ScriptedSource {
    async fn acquire(&self) -> Result<Arc<dyn Connection>, DatabaseError> {
        Ok(self.connection.clone())
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
