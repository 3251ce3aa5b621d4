//! In-memory storage backend.
//!
//! Rows live in a `BTreeMap` keyed by id, so iteration order is id order
//! without an extra sort. The table sits behind `Arc<RwLock<...>>` and a
//! commit builds the next table on a copy before swapping it in, so a
//! failing batch leaves the visible state untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::domain::{Entity, EntityId};
use crate::infrastructure::{Committed, PendingChange, RepositoryError, Storage};

// =============================================================================
// Table
// =============================================================================

#[derive(Debug, Clone)]
struct Table<E> {
    rows: BTreeMap<EntityId, E>,
    next_id: EntityId,
}

impl<E> Table<E> {
    const fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<E: Entity> Table<E> {
    fn apply(
        &mut self,
        change: PendingChange<E>,
        committed: &mut Committed<E>,
    ) -> Result<(), RepositoryError> {
        match change {
            PendingChange::Create(draft) => {
                let id = self.next_id;
                self.next_id += 1;
                let entity = E::materialize(id, Utc::now(), draft);
                self.rows.insert(id, entity.clone());
                committed.created.push(entity);
            }
            PendingChange::Update { id, changes } => {
                let entity = self
                    .rows
                    .get_mut(&id)
                    .ok_or_else(|| RepositoryError::NotFound(format!("{} {id}", E::NAME)))?;
                entity.apply(&changes);
                committed.updated.push(entity.clone());
            }
            PendingChange::Delete(filter) => {
                let before = self.rows.len();
                self.rows.retain(|_, entity| !entity.matches(&filter));
                committed.deleted += (before - self.rows.len()) as u64;
            }
        }
        Ok(())
    }
}

// =============================================================================
// In-Memory Storage
// =============================================================================

/// Process-local [`Storage`] implementation. Contents are lost on exit.
#[derive(Debug, Clone)]
pub struct InMemoryStorage<E> {
    table: Arc<RwLock<Table<E>>>,
}

impl<E: Entity> InMemoryStorage<E> {
    /// Creates an empty store. The first created row gets id 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(Table::new())),
        }
    }
}

impl<E: Entity> Default for InMemoryStorage<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Storage<E> for InMemoryStorage<E> {
    fn find_by_id(&self, id: EntityId) -> BoxFuture<'_, Result<Option<E>, RepositoryError>> {
        Box::pin(async move { Ok(self.table.read().await.rows.get(&id).cloned()) })
    }

    fn find<'a>(
        &'a self,
        filter: &'a E::Filter,
    ) -> BoxFuture<'a, Result<Vec<E>, RepositoryError>> {
        Box::pin(async move {
            let table = self.table.read().await;
            Ok(table
                .rows
                .values()
                .filter(|entity| entity.matches(filter))
                .cloned()
                .collect())
        })
    }

    fn count<'a>(&'a self, filter: &'a E::Filter) -> BoxFuture<'a, Result<u64, RepositoryError>> {
        Box::pin(async move {
            let table = self.table.read().await;
            Ok(table.rows.values().filter(|entity| entity.matches(filter)).count() as u64)
        })
    }

    fn exists<'a>(&'a self, filter: &'a E::Filter) -> BoxFuture<'a, Result<bool, RepositoryError>> {
        Box::pin(async move {
            let table = self.table.read().await;
            Ok(table.rows.values().any(|entity| entity.matches(filter)))
        })
    }

    fn commit(
        &self,
        changes: Vec<PendingChange<E>>,
    ) -> BoxFuture<'_, Result<Committed<E>, RepositoryError>> {
        Box::pin(async move {
            let mut table = self.table.write().await;
            let mut next = table.clone();
            let mut committed = Committed::empty();
            for change in changes {
                next.apply(change, &mut committed)?;
            }
            *table = next;
            drop(table);
            Ok(committed)
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewOrder, Order, OrderChanges, OrderFilter};
    use chrono::{DateTime, Duration, TimeZone};
    use rstest::{fixture, rstest};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_800_000_000, 0).unwrap() + Duration::minutes(minutes)
    }

    fn draft(district: &str, delivery_minutes: i64) -> NewOrder {
        NewOrder {
            weight: 1.5,
            city_district: district.to_string(),
            delivery_time: at(delivery_minutes),
        }
    }

    #[fixture]
    fn storage() -> InMemoryStorage<Order> {
        InMemoryStorage::new()
    }

    #[rstest]
    #[tokio::test]
    async fn test_ids_start_at_one_and_increase(storage: InMemoryStorage<Order>) {
        let committed = storage
            .commit(vec![
                PendingChange::Create(draft("A", 0)),
                PendingChange::Create(draft("B", 0)),
            ])
            .await
            .unwrap();

        let ids: Vec<_> = committed.created.iter().map(|order| order.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_deleted_ids_are_not_reused(storage: InMemoryStorage<Order>) {
        storage
            .commit(vec![PendingChange::Create(draft("A", 0))])
            .await
            .unwrap();
        storage
            .commit(vec![PendingChange::Delete(OrderFilter::all().with_id(1))])
            .await
            .unwrap();

        let committed = storage
            .commit(vec![PendingChange::Create(draft("B", 0))])
            .await
            .unwrap();

        assert_eq!(committed.created[0].id, 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_find_returns_matches_in_id_order(storage: InMemoryStorage<Order>) {
        storage
            .commit(vec![
                PendingChange::Create(draft("Район 1", 0)),
                PendingChange::Create(draft("Район 2", 10)),
                PendingChange::Create(draft("Район 1", 20)),
                PendingChange::Create(draft("Район 1", 90)),
            ])
            .await
            .unwrap();

        let filter = OrderFilter::all()
            .with_city_district("Район 1")
            .with_delivery_window(crate::domain::DeliveryWindow::starting_at(
                at(0),
                Duration::minutes(30),
            ));
        let found = storage.find(&filter).await.unwrap();

        let ids: Vec<_> = found.iter().map(|order| order.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(storage.count(&filter).await.unwrap(), 2);
        assert!(storage.exists(&filter).await.unwrap());
    }

    #[rstest]
    #[tokio::test]
    async fn test_failing_batch_is_rolled_back(storage: InMemoryStorage<Order>) {
        storage
            .commit(vec![PendingChange::Create(draft("Kept", 0))])
            .await
            .unwrap();

        let result = storage
            .commit(vec![
                PendingChange::Delete(OrderFilter::all()),
                PendingChange::Create(draft("Lost", 0)),
                PendingChange::Update {
                    id: 42,
                    changes: OrderChanges::default(),
                },
            ])
            .await;

        assert_eq!(
            result.unwrap_err(),
            RepositoryError::NotFound("order 42".to_string())
        );
        let remaining = storage.find(&OrderFilter::all()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].city_district, "Kept");

        let committed = storage
            .commit(vec![PendingChange::Create(draft("Next", 0))])
            .await
            .unwrap();
        assert_eq!(committed.created[0].id, 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_find_by_id_on_missing_row_is_none(storage: InMemoryStorage<Order>) {
        assert_eq!(storage.find_by_id(1).await.unwrap(), None);
    }
}
