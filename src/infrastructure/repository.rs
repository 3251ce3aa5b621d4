//! Generic repository over any [`Entity`].
//!
//! The data-access surface is split in two:
//!
//! - [`Storage`]: the shared, object-safe backend. It answers reads and
//!   commits a batch of pending changes atomically.
//! - [`Repository`]: a unit of work scoped to one request. Reads go straight
//!   to the backend; `create`, `update` and `delete` are staged and only
//!   reach the backend on [`Repository::save`].
//!
//! Handlers never see which backend is in use.

use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::domain::{Entity, EntityId};

// =============================================================================
// Repository Error
// =============================================================================

/// Errors that can occur during repository operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// An update targeted a row that does not exist.
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// The storage engine rejected or failed the operation.
    #[error("Database error: {0}")]
    DatabaseError(String),
}

// =============================================================================
// Unit of Work Types
// =============================================================================

/// A staged change waiting for [`Repository::save`].
#[derive(Debug, Clone)]
pub enum PendingChange<E: Entity> {
    /// Insert a new row built from the draft.
    Create(E::Draft),
    /// Overwrite fields of the row with the given id.
    Update { id: EntityId, changes: E::Changes },
    /// Remove every row matching the filter.
    Delete(E::Filter),
}

/// Outcome of a successful commit.
#[derive(Debug, Clone)]
pub struct Committed<E> {
    /// Created rows in staging order, with identity assigned.
    pub created: Vec<E>,
    /// Updated rows in staging order, as stored after the update.
    pub updated: Vec<E>,
    /// Total number of rows removed by delete changes.
    pub deleted: u64,
}

impl<E> Committed<E> {
    /// An empty outcome.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: 0,
        }
    }
}

impl<E> Default for Committed<E> {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Backend holding the rows of one entity type.
///
/// Implementations must be safe to share across concurrent requests. All
/// results are returned in ascending id order.
pub trait Storage<E: Entity>: Send + Sync {
    /// Finds a row by its primary key.
    fn find_by_id(&self, id: EntityId) -> BoxFuture<'_, Result<Option<E>, RepositoryError>>;

    /// Finds every row matching the filter.
    fn find<'a>(&'a self, filter: &'a E::Filter)
    -> BoxFuture<'a, Result<Vec<E>, RepositoryError>>;

    /// Counts rows matching the filter.
    fn count<'a>(&'a self, filter: &'a E::Filter) -> BoxFuture<'a, Result<u64, RepositoryError>>;

    /// Returns true when at least one row matches the filter.
    fn exists<'a>(&'a self, filter: &'a E::Filter) -> BoxFuture<'a, Result<bool, RepositoryError>>;

    /// Applies every change in order as a single atomic unit.
    ///
    /// Creates receive a fresh id and the current UTC time as creation
    /// timestamp. On error nothing from the batch is visible.
    fn commit(
        &self,
        changes: Vec<PendingChange<E>>,
    ) -> BoxFuture<'_, Result<Committed<E>, RepositoryError>>;
}

// =============================================================================
// Repository
// =============================================================================

/// Per-request unit of work over a shared [`Storage`].
pub struct Repository<E: Entity> {
    storage: Arc<dyn Storage<E>>,
    pending: Vec<PendingChange<E>>,
}

impl<E: Entity> Repository<E> {
    /// Opens a unit of work with nothing staged.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage<E>>) -> Self {
        Self {
            storage,
            pending: Vec::new(),
        }
    }

    /// Fetches an entity by id. Absence is not an error.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the backend fails.
    pub async fn get_by_id(&self, id: EntityId) -> Result<Option<E>, RepositoryError> {
        self.storage.find_by_id(id).await
    }

    /// Fetches an entity by id and maps it to the projection `P`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the backend fails.
    pub async fn get_by_id_as<P: From<E>>(
        &self,
        id: EntityId,
    ) -> Result<Option<P>, RepositoryError> {
        Ok(self.get_by_id(id).await?.map(P::from))
    }

    /// Fetches every entity matching the filter.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the backend fails.
    pub async fn get(&self, filter: &E::Filter) -> Result<Vec<E>, RepositoryError> {
        self.storage.find(filter).await
    }

    /// Fetches every entity matching the filter, mapped to the projection `P`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the backend fails.
    pub async fn get_as<P: From<E>>(&self, filter: &E::Filter) -> Result<Vec<P>, RepositoryError> {
        Ok(self.get(filter).await?.into_iter().map(P::from).collect())
    }

    /// Fetches every entity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the backend fails.
    pub async fn get_all(&self) -> Result<Vec<E>, RepositoryError> {
        self.get(&E::Filter::default()).await
    }

    /// Existence check. `None` asks whether the entity set is non-empty.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the backend fails.
    pub async fn any(&self, filter: Option<&E::Filter>) -> Result<bool, RepositoryError> {
        match filter {
            Some(filter) => self.storage.exists(filter).await,
            None => self.storage.exists(&E::Filter::default()).await,
        }
    }

    /// Counts entities, optionally filtered.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the backend fails.
    pub async fn count(&self, filter: Option<&E::Filter>) -> Result<u64, RepositoryError> {
        match filter {
            Some(filter) => self.storage.count(filter).await,
            None => self.storage.count(&E::Filter::default()).await,
        }
    }

    /// Stages a new entity. Identity is assigned by [`Repository::save`].
    pub fn create(&mut self, draft: E::Draft) {
        self.pending.push(PendingChange::Create(draft));
    }

    /// Stages field changes for the entity with the given id.
    pub fn update(&mut self, id: EntityId, changes: E::Changes) {
        self.pending.push(PendingChange::Update { id, changes });
    }

    /// Stages removal of every entity matching the filter.
    pub fn delete(&mut self, filter: E::Filter) {
        self.pending.push(PendingChange::Delete(filter));
    }

    /// Number of staged changes.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Commits every staged change atomically.
    ///
    /// The staging buffer is emptied whether or not the commit succeeds.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if an update targets a missing row,
    /// or `RepositoryError::DatabaseError` if the backend fails. In both
    /// cases none of the staged changes are persisted.
    pub async fn save(&mut self) -> Result<Committed<E>, RepositoryError> {
        let changes = std::mem::take(&mut self.pending);
        if changes.is_empty() {
            return Ok(Committed::empty());
        }
        let staged = changes.len();
        let result = self.storage.commit(changes).await;
        match &result {
            Ok(committed) => tracing::debug!(
                entity = E::NAME,
                staged,
                created = committed.created.len(),
                updated = committed.updated.len(),
                deleted = committed.deleted,
                "Unit of work committed"
            ),
            Err(error) => tracing::warn!(entity = E::NAME, staged, %error, "Unit of work rolled back"),
        }
        result
    }
}

impl<E: Entity> Clone for Repository<E> {
    /// Clones the storage handle. Staged changes are not shared.
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.storage))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewOrder, Order, OrderChanges, OrderFilter};
    use crate::infrastructure::InMemoryStorage;
    use chrono::{Duration, Utc};
    use rstest::{fixture, rstest};

    /// Projection used to exercise the `_as` variants.
    #[derive(Debug, PartialEq)]
    struct DistrictOnly(String);

    impl From<Order> for DistrictOnly {
        fn from(order: Order) -> Self {
            Self(order.city_district)
        }
    }

    fn draft(district: &str, weight: f64) -> NewOrder {
        NewOrder {
            weight,
            city_district: district.to_string(),
            delivery_time: Utc::now() + Duration::hours(1),
        }
    }

    #[fixture]
    fn repository() -> Repository<Order> {
        Repository::new(Arc::new(InMemoryStorage::<Order>::new()))
    }

    #[rstest]
    #[tokio::test]
    async fn test_create_is_staged_until_save(mut repository: Repository<Order>) {
        repository.create(draft("Район 1", 1.0));

        assert_eq!(repository.pending_len(), 1);
        assert!(!repository.any(None).await.unwrap());

        let committed = repository.save().await.unwrap();

        assert_eq!(repository.pending_len(), 0);
        assert_eq!(committed.created.len(), 1);
        assert_ne!(committed.created[0].id, 0);
        assert!(repository.any(None).await.unwrap());
    }

    #[rstest]
    #[tokio::test]
    async fn test_create_assigns_unique_ids_and_creation_time(mut repository: Repository<Order>) {
        let before = crate::domain::to_stored_precision(Utc::now());
        repository.create(draft("A", 1.0));
        repository.create(draft("B", 2.0));

        let committed = repository.save().await.unwrap();

        let first = &committed.created[0];
        let second = &committed.created[1];
        assert_ne!(first.id, second.id);
        assert!(first.created_at >= before);
        assert!(first.created_at <= Utc::now());
    }

    #[rstest]
    #[tokio::test]
    async fn test_update_leaves_identity_and_creation_time(mut repository: Repository<Order>) {
        repository.create(draft("Before", 1.0));
        let original = repository.save().await.unwrap().created.remove(0);

        repository.update(
            original.id,
            OrderChanges {
                city_district: Some("After".to_string()),
                ..OrderChanges::default()
            },
        );
        let updated = repository.save().await.unwrap().updated.remove(0);

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.city_district, "After");
        assert_eq!(updated.weight, original.weight);
        assert_eq!(repository.get_by_id(original.id).await.unwrap(), Some(updated));
    }

    #[rstest]
    #[tokio::test]
    async fn test_delete_of_zero_rows_is_not_an_error(mut repository: Repository<Order>) {
        repository.delete(OrderFilter::all().with_id(404));

        let committed = repository.save().await.unwrap();

        assert_eq!(committed.deleted, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_failed_save_persists_nothing(mut repository: Repository<Order>) {
        repository.create(draft("Staged", 1.0));
        repository.update(999, OrderChanges::default());

        let result = repository.save().await;

        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
        assert_eq!(repository.pending_len(), 0);
        assert_eq!(repository.count(None).await.unwrap(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_projections_map_every_result(mut repository: Repository<Order>) {
        repository.create(draft("Район 0", 1.0));
        repository.create(draft("Район 1", 1.0));
        repository.create(draft("Район 0", 3.0));
        let created = repository.save().await.unwrap().created;

        let filter = OrderFilter::all().with_city_district("Район 0");
        let districts: Vec<DistrictOnly> = repository.get_as(&filter).await.unwrap();
        let single: Option<DistrictOnly> = repository.get_by_id_as(created[1].id).await.unwrap();

        assert_eq!(districts.len(), 2);
        assert!(districts.iter().all(|d| d.0 == "Район 0"));
        assert_eq!(single, Some(DistrictOnly("Район 1".to_string())));
        assert_eq!(repository.count(Some(&filter)).await.unwrap(), 2);
        assert_eq!(repository.get_all().await.unwrap().len(), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn test_save_without_changes_is_a_no_op(mut repository: Repository<Order>) {
        let committed = repository.save().await.unwrap();

        assert!(committed.created.is_empty());
        assert!(committed.updated.is_empty());
        assert_eq!(committed.deleted, 0);
    }

    #[rstest]
    fn test_repository_error_display() {
        let error = RepositoryError::NotFound("order 12".to_string());
        assert_eq!(format!("{error}"), "Entity not found: order 12");

        let error = RepositoryError::DatabaseError("disk I/O error".to_string());
        assert_eq!(format!("{error}"), "Database error: disk I/O error");
    }
}
