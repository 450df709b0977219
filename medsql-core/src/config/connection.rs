//! Database connection configuration.
//!
//! This module provides the `ConnectionConfig` struct for configuring
//! the pooled hospital database connection.

use crate::error::MedSqlError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the database connection pool.
///
/// # Security
/// This struct intentionally does NOT store passwords or credentials.
/// Credentials travel in the connection URL or in
/// [`Credentials`](crate::security::Credentials) and are never logged or serialized.
///
/// # Example
/// ```rust
/// use medsql_core::ConnectionConfig;
///
/// let config = ConnectionConfig::new("localhost".to_string())
///     .with_port(5432)
///     .with_database("hospital".to_string())
///     .with_username("clinic_app".to_string());
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host address
    pub host: String,
    /// Optional port number
    pub port: Option<u16>,
    /// Optional database name
    pub database: Option<String>,
    /// Optional username (password handled separately)
    pub username: Option<String>,
    /// Pool acquire timeout
    pub connect_timeout: Duration,
    /// Per-statement timeout applied to every session
    pub query_timeout: Duration,
    /// Maximum number of connections in pool
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_idle_connections: u32,
    /// Idle connections older than this are closed
    pub idle_timeout: Duration,
    /// Connections older than this are recycled
    pub max_lifetime: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            database: None,
            username: None,
            connect_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(30),
            max_connections: 10,
            min_idle_connections: 2,
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(3600),
        }
    }
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ConnectionConfig({}{}{})",
            self.host,
            self.port.map_or_else(String::new, |p| format!(":{}", p)),
            self.database
                .as_ref()
                .map_or_else(String::new, |db| format!("/{}", db))
        )
        // Intentionally omit username and never include credentials
    }
}

impl ConnectionConfig {
    /// Validates connection configuration parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> crate::Result<()> {
        if self.host.is_empty() {
            return Err(MedSqlError::configuration("host cannot be empty"));
        }

        if let Some(port) = self.port
            && port == 0
        {
            return Err(MedSqlError::configuration("port must be greater than 0"));
        }

        if self.max_connections == 0 {
            return Err(MedSqlError::configuration(
                "max_connections must be greater than 0",
            ));
        }

        if self.max_connections > 100 {
            return Err(MedSqlError::configuration(
                "max_connections should not exceed 100 for safety",
            ));
        }

        if self.min_idle_connections > self.max_connections {
            return Err(MedSqlError::configuration(
                "min_idle_connections cannot exceed max_connections",
            ));
        }

        if self.connect_timeout.as_secs() == 0 {
            return Err(MedSqlError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.query_timeout.as_millis() == 0 {
            return Err(MedSqlError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        if self.max_lifetime < self.idle_timeout {
            return Err(MedSqlError::configuration(
                "max_lifetime must not be shorter than idle_timeout",
            ));
        }

        Ok(())
    }

    /// Creates a new connection config with safe defaults.
    pub fn new(host: String) -> Self {
        Self {
            host,
            ..Default::default()
        }
    }

    /// Builder method to set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Builder method to set database.
    pub fn with_database(mut self, database: String) -> Self {
        self.database = Some(database);
        self
    }

    /// Builder method to set username.
    pub fn with_username(mut self, username: String) -> Self {
        self.username = Some(username);
        self
    }

    /// Builder method to set the per-statement timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Builder method to set the pool size. Min idle is clamped to it.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self.min_idle_connections = self.min_idle_connections.min(max_connections);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_default() {
        let config = ConnectionConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, None);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_idle_connections, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connection_config_validation() {
        let config = ConnectionConfig {
            host: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConnectionConfig {
            port: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConnectionConfig {
            max_connections: 101,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConnectionConfig {
            max_connections: 1,
            min_idle_connections: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConnectionConfig {
            idle_timeout: Duration::from_secs(7200),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_config_builder() {
        let config = ConnectionConfig::new("db.hospital.internal".to_string())
            .with_port(5433)
            .with_database("hospital".to_string())
            .with_username("clinic_app".to_string())
            .with_query_timeout(Duration::from_secs(5))
            .with_max_connections(4);

        assert_eq!(config.host, "db.hospital.internal");
        assert_eq!(config.port, Some(5433));
        assert_eq!(config.database, Some("hospital".to_string()));
        assert_eq!(config.username, Some("clinic_app".to_string()));
        assert_eq!(config.query_timeout, Duration::from_secs(5));
        assert_eq!(config.max_connections, 4);
    }

    #[test]
    fn test_connection_config_display_no_credentials() {
        let config = ConnectionConfig::new("example.com".to_string())
            .with_port(5432)
            .with_database("hospital".to_string())
            .with_username("testuser".to_string());

        let display = format!("{}", config);

        assert!(display.contains("example.com"));
        assert!(display.contains("5432"));
        assert!(display.contains("hospital"));
        assert!(!display.contains("testuser"));
    }
}
