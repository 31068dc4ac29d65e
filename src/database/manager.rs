use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::database::connection::{Connection, ConnectionSource, MysqlConnection};

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Owns the MySQL pool and checks out one connection per request
#[derive(Clone)]
pub struct DatabaseManager {
    pool: MySqlPool,
    log_queries: bool,
    slow_query_threshold: Option<Duration>,
}

impl DatabaseManager {
    /// Build the pool without connecting; the first request opens the first
    /// connection.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let connection_string = Self::build_connection_string(config)?;

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect_lazy(&connection_string)?;

        info!(
            host = %config.host,
            database = %config.name,
            max_connections = config.max_connections,
            "Created database pool"
        );

        Ok(Self {
            pool,
            log_queries: config.enable_query_logging,
            slow_query_threshold: config
                .enable_slow_query_warning
                .then(|| Duration::from_millis(config.slow_query_threshold_ms)),
        })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn build_connection_string(config: &DatabaseConfig) -> Result<String, DatabaseError> {
        if let Some(raw) = config.url.as_deref() {
            let url = url::Url::parse(raw).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
            if url.scheme() != "mysql" {
                return Err(DatabaseError::InvalidDatabaseUrl);
            }
            return Ok(url.into());
        }

        if config.host.is_empty() {
            return Err(DatabaseError::ConfigMissing("DB_HOST"));
        }
        if config.name.is_empty() {
            return Err(DatabaseError::ConfigMissing("DB_NAME"));
        }
        if config.user.is_empty() {
            return Err(DatabaseError::ConfigMissing("DB_USER"));
        }

        let mut url = url::Url::parse(&format!("mysql://{}", config.host))
            .map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        url.set_username(&config.user)
            .map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if !config.password.is_empty() {
            url.set_password(Some(&config.password))
                .map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        }
        url.set_path(&format!("/{}", config.name));
        Ok(url.into())
    }

    /// Close the pool (e.g., on shutdown)
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}

#[async_trait]
impl ConnectionSource for DatabaseManager {
    async fn acquire(&self) -> Result<Arc<dyn Connection>, DatabaseError> {
        let connection = self.pool.acquire().await?;
        Ok(Arc::new(MysqlConnection::new(
            connection,
            self.log_queries,
            self.slow_query_threshold,
        )))
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
