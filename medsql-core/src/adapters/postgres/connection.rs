//! PostgreSQL connection pool management and validation.
//!
//! # Security Features
//! - Validates connection string format and parameters
//! - Enforces connection limits to prevent resource exhaustion
//! - Sets appropriate timeouts for every pooled session

use super::{ConnectionConfig, PostgresAdapter};
use crate::{Result, error::MedSqlError, error::redact_database_url};
use sqlx::PgPool;
use std::time::Duration;
use percent_encoding::percent_decode_str;
use url::Url;

/// Longest identifier PostgreSQL accepts without truncation.
const MAX_IDENTIFIER_LENGTH: usize = 63;

impl PostgresAdapter {
    /// Creates a new PostgreSQL adapter with connection pooling.
    ///
    /// The pool connects lazily, so this succeeds even when the server is
    /// down; the first request reports the connection failure instead.
    ///
    /// # Errors
    /// Returns error if the connection string is malformed or its
    /// parameters fail validation.
    pub async fn new(connection_string: &str) -> Result<Self> {
        let config = Self::parse_connection_config(connection_string)?;
        let pool = Self::create_connection_pool(connection_string, &config).await?;
        Ok(Self { pool, config })
    }

    /// Creates a new PostgreSQL adapter with custom configuration.
    ///
    /// # Errors
    /// Returns error if the configuration or the connection string is invalid.
    pub async fn with_config(connection_string: &str, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        Self::validate_connection_string(connection_string)?;
        let pool = Self::create_connection_pool(connection_string, &config).await?;
        Ok(Self { pool, config })
    }

    /// Parses connection string to extract configuration parameters.
    ///
    /// Recognized query parameters: `connect_timeout` (seconds),
    /// `statement_timeout` (milliseconds) and `pool_max_conns`.
    ///
    /// # Errors
    /// Returns error if connection string is malformed or contains unsafe parameters
    pub fn parse_connection_config(connection_string: &str) -> Result<ConnectionConfig> {
        Self::validate_connection_string(connection_string)?;

        let url = Url::parse(connection_string).map_err(|e| {
            MedSqlError::configuration(format!(
                "Invalid PostgreSQL connection string format: {}",
                e
            ))
        })?;

        let mut config = ConnectionConfig::new(url.host_str().unwrap_or("localhost").to_string());

        match url.port() {
            Some(0) => {
                return Err(MedSqlError::configuration(
                    "Invalid port number: must be greater than 0",
                ));
            }
            Some(port) => config = config.with_port(port),
            None => config = config.with_port(5432),
        }

        let database = decode_component(url.path().trim_start_matches('/'));
        if !database.is_empty() {
            validate_identifier("Database name", &database)?;
            config = config.with_database(database);
        }

        let username = decode_component(url.username());
        if !username.is_empty() {
            validate_identifier("Username", &username)?;
            config = config.with_username(username);
        }

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "connect_timeout" => {
                    if let Ok(timeout_secs) = value.parse::<u64>()
                        && timeout_secs > 0
                        && timeout_secs <= 300
                    {
                        config.connect_timeout = Duration::from_secs(timeout_secs);
                    }
                }
                "statement_timeout" => {
                    if let Ok(timeout_ms) = value.parse::<u64>()
                        && timeout_ms > 0
                        && timeout_ms <= 300_000
                    {
                        config = config.with_query_timeout(Duration::from_millis(timeout_ms));
                    }
                }
                "pool_max_conns" => {
                    if let Ok(max_conns) = value.parse::<u32>()
                        && max_conns > 0
                        && max_conns <= 100
                    {
                        config = config.with_max_connections(max_conns);
                    }
                }
                _ => {}
            }
        }

        config.validate()?;

        Ok(config)
    }

    /// Creates a connection pool with session settings applied to every connection.
    ///
    /// # Connection Pool Configuration
    /// - Max connections: Configurable (default: 10, max: 100)
    /// - Min connections: Configurable (default: 2)
    /// - Acquire timeout: `connect_timeout` (default: 30s)
    /// - Idle timeout: Configurable (default: 10 minutes)
    /// - Max lifetime: Configurable (default: 1 hour)
    /// - Session settings: statement and lock timeouts, idle-in-transaction
    ///   timeout, application name, UTC timezone
    pub(crate) async fn create_connection_pool(
        connection_string: &str,
        config: &ConnectionConfig,
    ) -> Result<PgPool> {
        use sqlx::Executor;

        Self::validate_connection_string(connection_string)?;

        let query_timeout_ms = config.query_timeout.as_millis();

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections.min(100))
            .min_connections(config.min_idle_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    conn.execute(
                        format!("SET statement_timeout = '{}ms'", query_timeout_ms).as_str(),
                    )
                    .await?;

                    conn.execute("SET lock_timeout = '30s'").await?;

                    // A crashed handler must not hold row locks indefinitely
                    conn.execute("SET idle_in_transaction_session_timeout = '60s'")
                        .await?;

                    let app_name = format!("medsql-{}", env!("CARGO_PKG_VERSION"));
                    conn.execute(format!("SET application_name = '{}'", app_name).as_str())
                        .await?;

                    conn.execute("SET timezone = 'UTC'").await?;

                    Ok(())
                })
            })
            .connect_lazy(connection_string)
            .map_err(|e| {
                MedSqlError::connection_context(
                    format!(
                        "Failed to create PostgreSQL connection pool to {}",
                        redact_database_url(connection_string)
                    ),
                    e,
                )
            })?;

        tracing::debug!(
            "Created PostgreSQL pool for {} (max {} connections)",
            config,
            config.max_connections
        );

        Ok(pool)
    }

    /// Validates connection string format and security requirements.
    ///
    /// # Errors
    /// Returns error if connection string is invalid or unsafe
    pub fn validate_connection_string(connection_string: &str) -> Result<()> {
        let url = Url::parse(connection_string).map_err(|e| {
            MedSqlError::configuration(format!(
                "Invalid PostgreSQL connection string format: {}",
                e
            ))
        })?;

        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(MedSqlError::configuration(
                "Connection string must use postgres:// or postgresql:// scheme",
            ));
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(MedSqlError::configuration(
                "Connection string must specify a host",
            ));
        }

        for (key, value) in url.query_pairs() {
            if key == "statement_timeout"
                && let Ok(timeout_ms) = value.parse::<u64>()
                && timeout_ms > 300_000
            {
                return Err(MedSqlError::configuration(
                    "statement_timeout should not exceed 300 seconds for security",
                ));
            }
        }

        Ok(())
    }
}

/// Percent-decodes a URL component, keeping the raw text if it is not UTF-8.
fn decode_component(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8()
        .map_or_else(|_| raw.to_string(), |decoded| decoded.into_owned())
}

/// PostgreSQL accepts any non-NUL character in a quoted identifier, so
/// only the length and NUL bytes are checked.
fn validate_identifier(label: &str, value: &str) -> Result<()> {
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MedSqlError::configuration(format!(
            "{} too long: maximum {} characters",
            label, MAX_IDENTIFIER_LENGTH
        )));
    }
    if value.contains('\0') {
        return Err(MedSqlError::configuration(format!(
            "{} contains a NUL character",
            label
        )));
    }
    Ok(())
}
