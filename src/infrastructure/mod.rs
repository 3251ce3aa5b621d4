//! Infrastructure module for persistence.
//!
//! This module contains the generic repository, its storage backends,
//! backend selection from configuration, and bootstrap seeding.

pub mod factory;
pub mod in_memory;
pub mod repository;
pub mod seed;
pub mod sqlite;

pub use factory::{
    ConfigurationError, FactoryError, StorageConfig, StorageConfigBuilder, StorageFactory,
    StorageMode,
};
pub use in_memory::InMemoryStorage;
pub use repository::{Committed, PendingChange, Repository, RepositoryError, Storage};
pub use seed::{SEED_ORDER_COUNT, seed_drafts, seed_orders};
pub use sqlite::{SqlEntity, SqliteStorage};
