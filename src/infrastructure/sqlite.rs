//! `SQLite` storage backend.
//!
//! Rows are stored in one table per entity. Timestamps are stored as
//! `INTEGER` microseconds since the Unix epoch. Every `DateTime<Utc>` fits,
//! and SQL comparison is numeric, so window filters agree with the
//! in-memory backend across the whole calendar range.
//!
//! # Table Schema
//!
//! ```sql
//! CREATE TABLE orders (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     weight REAL NOT NULL,
//!     city_district TEXT NOT NULL,
//!     delivery_time INTEGER NOT NULL,
//!     created_at INTEGER NOT NULL
//! );
//! CREATE INDEX idx_orders_city_district ON orders(city_district);
//! CREATE INDEX idx_orders_delivery_time ON orders(delivery_time);
//! ```

use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::domain::{Entity, EntityId, NewOrder, Order, OrderChanges, OrderFilter};
use crate::infrastructure::{Committed, PendingChange, RepositoryError, Storage};

// =============================================================================
// Helper Functions
// =============================================================================

#[allow(clippy::needless_pass_by_value)]
fn database_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::DatabaseError(error.to_string())
}

/// Encodes a timestamp as microseconds since the Unix epoch, truncating
/// any sub-microsecond part.
#[must_use]
pub fn encode_timestamp(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_micros()
}

/// Encodes the lower bound of a range: the first whole microsecond not
/// earlier than `timestamp`.
#[must_use]
pub fn encode_lower_bound(timestamp: DateTime<Utc>) -> i64 {
    let micros = encode_timestamp(timestamp);
    if timestamp.timestamp_subsec_nanos() % 1_000 == 0 {
        micros
    } else {
        micros.saturating_add(1)
    }
}

/// Decodes a timestamp column written by [`encode_timestamp`].
///
/// # Errors
///
/// Returns `sqlx::Error::ColumnDecode` if the value is outside the
/// representable range.
pub fn decode_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    let micros: i64 = row.try_get(column)?;
    DateTime::from_timestamp_micros(micros).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("{micros} microseconds is out of range").into(),
    })
}

/// Returns true for URLs that open a private in-memory database.
fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

// =============================================================================
// SQL Mapping
// =============================================================================

/// Emits `WHERE` before the first clause and `AND` before the rest.
pub struct Conditions<'b, 'args> {
    builder: &'b mut QueryBuilder<'args, Sqlite>,
    first: bool,
}

impl<'b, 'args> Conditions<'b, 'args> {
    pub fn new(builder: &'b mut QueryBuilder<'args, Sqlite>) -> Self {
        Self {
            builder,
            first: true,
        }
    }

    /// Starts a clause and returns the builder for binding its operand.
    pub fn clause(&mut self, sql: &str) -> &mut QueryBuilder<'args, Sqlite> {
        self.builder.push(if self.first { " WHERE " } else { " AND " });
        self.first = false;
        self.builder.push(sql)
    }
}

/// Table mapping for an entity stored by [`SqliteStorage`].
pub trait SqlEntity: Entity {
    /// Table name.
    const TABLE: &'static str;
    /// Column list selected and returned by every statement.
    const COLUMNS: &'static str;
    /// Idempotent DDL run when the storage is opened.
    const SCHEMA: &'static [&'static str];

    /// Decodes one row selected with [`Self::COLUMNS`].
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` if a column is missing or malformed.
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error>;

    /// Pushes `(columns) VALUES (binds)` for a new row.
    fn push_insert(
        builder: &mut QueryBuilder<'_, Sqlite>,
        created_at: DateTime<Utc>,
        draft: &Self::Draft,
    );

    /// Pushes `column = bind` pairs. Returns false if nothing was pushed.
    fn push_assignments(builder: &mut QueryBuilder<'_, Sqlite>, changes: &Self::Changes) -> bool;

    /// Pushes the `WHERE` clause for the filter, if any clause is set.
    fn push_conditions(builder: &mut QueryBuilder<'_, Sqlite>, filter: &Self::Filter);
}

impl SqlEntity for Order {
    const TABLE: &'static str = "orders";
    const COLUMNS: &'static str = "id, weight, city_district, delivery_time, created_at";
    const SCHEMA: &'static [&'static str] = &[
        "CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            weight REAL NOT NULL,
            city_district TEXT NOT NULL,
            delivery_time INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_orders_city_district ON orders(city_district)",
        "CREATE INDEX IF NOT EXISTS idx_orders_delivery_time ON orders(delivery_time)",
    ];

    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            weight: row.try_get("weight")?,
            city_district: row.try_get("city_district")?,
            delivery_time: decode_timestamp(row, "delivery_time")?,
            created_at: decode_timestamp(row, "created_at")?,
        })
    }

    fn push_insert(
        builder: &mut QueryBuilder<'_, Sqlite>,
        created_at: DateTime<Utc>,
        draft: &NewOrder,
    ) {
        builder.push("(weight, city_district, delivery_time, created_at) VALUES (");
        let mut values = builder.separated(", ");
        values.push_bind(draft.weight);
        values.push_bind(draft.city_district.clone());
        values.push_bind(encode_timestamp(draft.delivery_time));
        values.push_bind(encode_timestamp(created_at));
        values.push_unseparated(")");
    }

    fn push_assignments(builder: &mut QueryBuilder<'_, Sqlite>, changes: &OrderChanges) -> bool {
        let mut assignments = builder.separated(", ");
        if let Some(weight) = changes.weight {
            assignments.push("weight = ");
            assignments.push_bind_unseparated(weight);
        }
        if let Some(district) = &changes.city_district {
            assignments.push("city_district = ");
            assignments.push_bind_unseparated(district.clone());
        }
        if let Some(delivery_time) = changes.delivery_time {
            assignments.push("delivery_time = ");
            assignments.push_bind_unseparated(encode_timestamp(delivery_time));
        }
        !changes.is_empty()
    }

    fn push_conditions(builder: &mut QueryBuilder<'_, Sqlite>, filter: &OrderFilter) {
        let mut conditions = Conditions::new(builder);
        if let Some(id) = filter.id {
            conditions.clause("id = ").push_bind(id);
        }
        if let Some(district) = &filter.city_district {
            conditions.clause("city_district = ").push_bind(district.clone());
        }
        if let Some(window) = filter.delivery_window {
            conditions
                .clause("delivery_time >= ")
                .push_bind(encode_lower_bound(window.start));
            conditions
                .clause("delivery_time <= ")
                .push_bind(encode_timestamp(window.end));
        }
    }
}

// =============================================================================
// SQLite Storage
// =============================================================================

/// [`Storage`] backed by an `SQLite` connection pool.
///
/// # Example
///
/// ```ignore
/// let storage = SqliteStorage::<Order>::connect("sqlite://orders.db", 5).await?;
/// let found = storage.find_by_id(1).await?;
/// ```
#[derive(Debug, Clone)]
pub struct SqliteStorage<E> {
    pool: SqlitePool,
    entity: PhantomData<fn() -> E>,
}

impl<E: SqlEntity> SqliteStorage<E> {
    /// Opens a pool for `url` and creates the schema if it is missing.
    ///
    /// In-memory URLs are pinned to a single long-lived connection, since
    /// every new connection would see its own empty database.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DatabaseError` if the URL is invalid, the
    /// database cannot be opened, or the schema cannot be created.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(database_error)?
            .create_if_missing(true);

        let pool_options = if is_memory_url(url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(database_error)?;

        let storage = Self::new(pool);
        storage.ensure_schema().await?;
        Ok(storage)
    }

    /// Wraps an existing pool. The schema is not touched.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            entity: PhantomData,
        }
    }

    /// Runs the entity's DDL statements.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DatabaseError` if a statement fails.
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        for statement in E::SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(database_error)?;
        }
        tracing::debug!(table = E::TABLE, "Schema ensured");
        Ok(())
    }

    fn select(filter: &E::Filter) -> QueryBuilder<'static, Sqlite> {
        let mut builder =
            QueryBuilder::new(format!("SELECT {} FROM {}", E::COLUMNS, E::TABLE));
        E::push_conditions(&mut builder, filter);
        builder
    }

    fn decode_rows(rows: &[SqliteRow]) -> Result<Vec<E>, RepositoryError> {
        rows.iter()
            .map(|row| E::from_row(row).map_err(database_error))
            .collect()
    }

    async fn apply(
        connection: &mut sqlx::SqliteConnection,
        change: PendingChange<E>,
        committed: &mut Committed<E>,
    ) -> Result<(), RepositoryError> {
        match change {
            PendingChange::Create(draft) => {
                let mut builder = QueryBuilder::new(format!("INSERT INTO {} ", E::TABLE));
                E::push_insert(&mut builder, Utc::now(), &draft);
                builder.push(" RETURNING ").push(E::COLUMNS);
                let row = builder
                    .build()
                    .fetch_one(&mut *connection)
                    .await
                    .map_err(database_error)?;
                committed
                    .created
                    .push(E::from_row(&row).map_err(database_error)?);
            }
            PendingChange::Update { id, changes } => {
                let mut builder = QueryBuilder::new(format!("UPDATE {} SET ", E::TABLE));
                let row = if E::push_assignments(&mut builder, &changes) {
                    E::push_conditions(&mut builder, &E::identity_filter(id));
                    builder.push(" RETURNING ").push(E::COLUMNS);
                    builder.build().fetch_optional(&mut *connection).await
                } else {
                    let mut select = Self::select(&E::identity_filter(id));
                    select.build().fetch_optional(&mut *connection).await
                }
                .map_err(database_error)?
                .ok_or_else(|| RepositoryError::NotFound(format!("{} {id}", E::NAME)))?;
                committed
                    .updated
                    .push(E::from_row(&row).map_err(database_error)?);
            }
            PendingChange::Delete(filter) => {
                let mut builder = QueryBuilder::new(format!("DELETE FROM {}", E::TABLE));
                E::push_conditions(&mut builder, &filter);
                let result = builder
                    .build()
                    .execute(&mut *connection)
                    .await
                    .map_err(database_error)?;
                committed.deleted += result.rows_affected();
            }
        }
        Ok(())
    }
}

impl<E: SqlEntity> Storage<E> for SqliteStorage<E> {
    fn find_by_id(&self, id: EntityId) -> BoxFuture<'_, Result<Option<E>, RepositoryError>> {
        Box::pin(async move {
            let mut builder = Self::select(&E::identity_filter(id));
            let row = builder
                .build()
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;
            row.map(|row| E::from_row(&row).map_err(database_error))
                .transpose()
        })
    }

    fn find<'a>(
        &'a self,
        filter: &'a E::Filter,
    ) -> BoxFuture<'a, Result<Vec<E>, RepositoryError>> {
        Box::pin(async move {
            let mut builder = Self::select(filter);
            builder.push(" ORDER BY id");
            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)?;
            Self::decode_rows(&rows)
        })
    }

    fn count<'a>(&'a self, filter: &'a E::Filter) -> BoxFuture<'a, Result<u64, RepositoryError>> {
        Box::pin(async move {
            let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", E::TABLE));
            E::push_conditions(&mut builder, filter);
            let row = builder
                .build()
                .fetch_one(&self.pool)
                .await
                .map_err(database_error)?;
            let count: i64 = row.try_get(0).map_err(database_error)?;
            Ok(count.unsigned_abs())
        })
    }

    fn exists<'a>(&'a self, filter: &'a E::Filter) -> BoxFuture<'a, Result<bool, RepositoryError>> {
        Box::pin(async move {
            let mut builder =
                QueryBuilder::new(format!("SELECT EXISTS (SELECT 1 FROM {}", E::TABLE));
            E::push_conditions(&mut builder, filter);
            builder.push(")");
            let row = builder
                .build()
                .fetch_one(&self.pool)
                .await
                .map_err(database_error)?;
            let exists: i64 = row.try_get(0).map_err(database_error)?;
            Ok(exists != 0)
        })
    }

    fn commit(
        &self,
        changes: Vec<PendingChange<E>>,
    ) -> BoxFuture<'_, Result<Committed<E>, RepositoryError>> {
        Box::pin(async move {
            let mut transaction = self.pool.begin().await.map_err(database_error)?;
            let mut committed = Committed::empty();
            for change in changes {
                // Dropping the transaction on error rolls it back.
                Self::apply(&mut *transaction, change, &mut committed).await?;
            }
            transaction.commit().await.map_err(database_error)?;
            Ok(committed)
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
