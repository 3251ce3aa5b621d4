//! Bootstrap data for an empty order store.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use super::{Repository, RepositoryError, Storage};
use crate::domain::{NewOrder, Order};

/// Number of orders created on first start.
pub const SEED_ORDER_COUNT: u32 = 400;

/// Gap between consecutive seeded delivery times.
const DELIVERY_SPACING_SECONDS: i64 = 20;

/// Number of distinct seeded districts.
const DISTRICT_COUNT: u32 = 10;

/// Smallest weight a seeded order can have.
const MINIMUM_WEIGHT: f64 = 0.001;

/// Generates `count` order drafts.
///
/// Draft `i` goes to `"Район {i % 10}"` at `now + 20s * i` with a weight in
/// `(0, 10]` rounded to three decimals.
pub fn seed_drafts<R: Rng>(count: u32, now: DateTime<Utc>, rng: &mut R) -> Vec<NewOrder> {
    (0..count)
        .map(|i| NewOrder {
            weight: seed_weight(rng.random_range(0.0..10.0)),
            city_district: format!("Район {}", i % DISTRICT_COUNT),
            delivery_time: now + Duration::seconds(DELIVERY_SPACING_SECONDS * i64::from(i)),
        })
        .collect()
}

fn seed_weight(raw: f64) -> f64 {
    ((raw * 1000.0).round() / 1000.0).max(MINIMUM_WEIGHT)
}

/// Inserts generated orders in one unit of work if the store is empty.
///
/// Returns the number of orders created, zero when the store already had
/// data.
///
/// # Errors
///
/// Returns `RepositoryError` if the store cannot be read or the save fails.
pub async fn seed_orders<R: Rng + Send>(
    storage: Arc<dyn Storage<Order>>,
    count: u32,
    now: DateTime<Utc>,
    mut rng: R,
) -> Result<usize, RepositoryError> {
    let mut repository = Repository::new(storage);

    if repository.any(None).await? {
        tracing::info!("Order store already populated, skipping seed");
        return Ok(0);
    }

    for draft in seed_drafts(count, now, &mut rng) {
        repository.create(draft);
    }
    let created = repository.save().await?.created.len();

    tracing::info!(created, "Seeded order store");
    Ok(created)
}

// =============================================================================
// Tests
// =============================================================================
