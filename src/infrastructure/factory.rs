//! Storage factory for runtime backend selection.
//!
//! # Environment Variables
//!
//! - `STORAGE_MODE`: `in_memory` (default) | `sqlite`
//! - `DATABASE_URL`: `SQLite` connection URL (required when `STORAGE_MODE=sqlite`)
//! - `DATABASE_MAX_CONNECTIONS`: pool size, default 5
//!
//! # Example
//!
//! ```ignore
//! use infrastructure::factory::{StorageConfig, StorageFactory};
//!
//! let config = StorageConfig::from_env()?;
//! let orders = StorageFactory::new(config).create().await?;
//! let found = Repository::new(orders).get_by_id(1).await?;
//! ```

use std::env;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use super::{InMemoryStorage, SqliteStorage, Storage};
use crate::domain::Order;

/// Pool size used when `DATABASE_MAX_CONNECTIONS` is not set.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

// =============================================================================
// Configuration Types
// =============================================================================

/// Backend holding the order rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Process-local map. Contents are lost on exit.
    #[default]
    InMemory,
    /// `SQLite` database reached through `DATABASE_URL`.
    Sqlite,
}

impl FromStr for StorageMode {
    type Err = ConfigurationError;

    /// Parses a storage mode from a string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidStorageMode` if the string is not recognized.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            _ => Err(ConfigurationError::InvalidStorageMode(value.to_string())),
        }
    }
}

/// Configuration for [`StorageFactory`].
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub storage_mode: StorageMode,
    /// `SQLite` URL, required when `storage_mode` is `Sqlite`.
    pub database_url: Option<String>,
    /// Upper bound on pooled connections. Ignored for in-memory URLs.
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::default(),
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl StorageConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> StorageConfigBuilder {
        StorageConfigBuilder::default()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if:
    /// - `STORAGE_MODE` contains an invalid value
    /// - `DATABASE_MAX_CONNECTIONS` is not a positive integer
    /// - `DATABASE_URL` is missing when `STORAGE_MODE=sqlite`
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let storage_mode = match env::var("STORAGE_MODE") {
            Ok(value) => value.parse()?,
            Err(env::VarError::NotPresent) => StorageMode::default(),
            Err(env::VarError::NotUnicode(_)) => {
                return Err(ConfigurationError::InvalidStorageMode(
                    "<non-UTF-8 value>".to_string(),
                ));
            }
        };

        let database_url = env::var("DATABASE_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(value) => parse_max_connections(&value)?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };

        let config = Self {
            storage_mode,
            database_url,
            max_connections,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the URL is missing for `SQLite` or the
    /// pool size is zero.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.storage_mode == StorageMode::Sqlite && self.database_url.is_none() {
            return Err(ConfigurationError::MissingDatabaseUrl);
        }

        if self.max_connections == 0 {
            return Err(ConfigurationError::InvalidMaxConnections("0".to_string()));
        }

        Ok(())
    }
}

fn parse_max_connections(value: &str) -> Result<u32, ConfigurationError> {
    match value.trim().parse::<u32>() {
        Ok(0) | Err(_) => Err(ConfigurationError::InvalidMaxConnections(
            value.to_string(),
        )),
        Ok(n) => Ok(n),
    }
}

/// Builder for `StorageConfig`.
///
/// # Example
///
/// ```ignore
/// let config = StorageConfig::builder()
///     .storage_mode(StorageMode::Sqlite)
///     .database_url("sqlite://delivery.db")
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct StorageConfigBuilder {
    storage_mode: StorageMode,
    database_url: Option<String>,
    max_connections: Option<u32>,
}

impl StorageConfigBuilder {
    /// Sets the storage mode.
    #[must_use]
    pub const fn storage_mode(mut self, mode: StorageMode) -> Self {
        self.storage_mode = mode;
        self
    }

    /// Sets the `SQLite` database URL.
    #[must_use]
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Sets the pool size.
    #[must_use]
    pub const fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the configuration is invalid.
    pub fn build(self) -> Result<StorageConfig, ConfigurationError> {
        let config = StorageConfig {
            storage_mode: self.storage_mode,
            database_url: self.database_url,
            max_connections: self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
        };

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while reading storage configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Invalid storage mode value.
    #[error("Invalid storage mode: '{0}'. Expected 'in_memory' or 'sqlite'")]
    InvalidStorageMode(String),

    /// Missing `DATABASE_URL` when storage mode is `SQLite`.
    #[error("DATABASE_URL environment variable is required when STORAGE_MODE=sqlite")]
    MissingDatabaseUrl,

    /// Pool size is not a positive integer.
    #[error("Invalid DATABASE_MAX_CONNECTIONS: '{0}'. Expected a positive integer")]
    InvalidMaxConnections(String),
}

/// Errors that can occur during factory initialization.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    DatabaseConnection(String),
}

// =============================================================================
// Storage Factory
// =============================================================================

/// Creates the order storage selected by [`StorageConfig`].
#[derive(Debug, Clone)]
pub struct StorageFactory {
    config: StorageConfig,
}

impl StorageFactory {
    /// Creates a new storage factory with the given configuration.
    #[must_use]
    pub const fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Creates the order storage, opening the database when needed.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError` if the `SQLite` URL is missing or the database
    /// cannot be opened.
    pub async fn create(&self) -> Result<Arc<dyn Storage<Order>>, FactoryError> {
        match self.config.storage_mode {
            StorageMode::InMemory => Ok(Arc::new(InMemoryStorage::<Order>::new())),
            StorageMode::Sqlite => {
                let database_url = self
                    .config
                    .database_url
                    .as_ref()
                    .ok_or(ConfigurationError::MissingDatabaseUrl)?;

                let storage =
                    SqliteStorage::<Order>::connect(database_url, self.config.max_connections)
                        .await
                        .map_err(|error| FactoryError::DatabaseConnection(error.to_string()))?;
                Ok(Arc::new(storage))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderFilter;
    use rstest::rstest;

    // -------------------------------------------------------------------------
    // StorageMode Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[case("in_memory", StorageMode::InMemory)]
    #[case("inmemory", StorageMode::InMemory)]
    #[case("memory", StorageMode::InMemory)]
    #[case("IN_MEMORY", StorageMode::InMemory)]
    #[case("sqlite", StorageMode::Sqlite)]
    #[case("sqlite3", StorageMode::Sqlite)]
    #[case("SQLite", StorageMode::Sqlite)]
    fn test_storage_mode_from_str_valid(#[case] input: &str, #[case] expected: StorageMode) {
        let result: Result<StorageMode, _> = input.parse();
        assert_eq!(result.unwrap(), expected);
    }

    #[rstest]
    #[case("postgres")]
    #[case("mssql")]
    #[case("")]
    fn test_storage_mode_from_str_invalid(#[case] input: &str) {
        let result: Result<StorageMode, _> = input.parse();
        assert_eq!(
            result.unwrap_err(),
            ConfigurationError::InvalidStorageMode(input.to_string())
        );
    }

    #[rstest]
    fn test_storage_mode_default() {
        assert_eq!(StorageMode::default(), StorageMode::InMemory);
    }

    // -------------------------------------------------------------------------
    // StorageConfig Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_storage_config_default_is_valid() {
        let config = StorageConfig::default();
        assert_eq!(config.storage_mode, StorageMode::InMemory);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    fn test_builder_sqlite_without_url() {
        let result = StorageConfig::builder()
            .storage_mode(StorageMode::Sqlite)
            .build();
        assert_eq!(result.unwrap_err(), ConfigurationError::MissingDatabaseUrl);
    }

    #[rstest]
    fn test_builder_sqlite_with_url() {
        let config = StorageConfig::builder()
            .storage_mode(StorageMode::Sqlite)
            .database_url("sqlite://delivery.db")
            .max_connections(8)
            .build()
            .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("sqlite://delivery.db"));
        assert_eq!(config.max_connections, 8);
    }

    #[rstest]
    fn test_builder_rejects_zero_connections() {
        let result = StorageConfig::builder().max_connections(0).build();
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidMaxConnections(_))
        ));
    }

    #[rstest]
    #[case("5", Ok(5))]
    #[case(" 12 ", Ok(12))]
    #[case("0", Err(ConfigurationError::InvalidMaxConnections("0".to_string())))]
    #[case("many", Err(ConfigurationError::InvalidMaxConnections("many".to_string())))]
    fn test_parse_max_connections(
        #[case] input: &str,
        #[case] expected: Result<u32, ConfigurationError>,
    ) {
        assert_eq!(parse_max_connections(input), expected);
    }

    #[rstest]
    fn test_configuration_error_display() {
        assert_eq!(
            ConfigurationError::MissingDatabaseUrl.to_string(),
            "DATABASE_URL environment variable is required when STORAGE_MODE=sqlite"
        );
        assert_eq!(
            FactoryError::DatabaseConnection("refused".to_string()).to_string(),
            "Database connection error: refused"
        );
    }

    // -------------------------------------------------------------------------
    // StorageFactory Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[case(StorageConfig::default())]
    #[case(StorageConfig::builder().storage_mode(StorageMode::Sqlite).database_url("sqlite::memory:").build().unwrap())]
    #[tokio::test]
    async fn test_factory_creates_functional_storage(#[case] config: StorageConfig) {
        let storage = StorageFactory::new(config).create().await.unwrap();

        assert_eq!(storage.count(&OrderFilter::all()).await.unwrap(), 0);
        assert_eq!(storage.find_by_id(1).await.unwrap(), None);
    }

    #[rstest]
    #[tokio::test]
    async fn test_factory_reports_unreachable_database() {
        let config = StorageConfig {
            storage_mode: StorageMode::Sqlite,
            database_url: Some("sqlite:///nonexistent-directory/nested/delivery.db".to_string()),
            max_connections: 1,
        };

        let result = StorageFactory::new(config).create().await;

        assert!(matches!(result, Err(FactoryError::DatabaseConnection(_))));
    }
}
