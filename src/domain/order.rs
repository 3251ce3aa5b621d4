//! Order domain model.
//!
//! An order is a delivery request: a parcel weight in kilograms, the city
//! district it goes to, and the scheduled delivery time in UTC.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityId, to_stored_precision};

// =============================================================================
// Order
// =============================================================================

/// Persisted delivery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Store-assigned identifier.
    pub id: EntityId,
    /// Parcel weight in kilograms.
    pub weight: f64,
    /// Delivery zone label.
    pub city_district: String,
    /// Scheduled delivery time.
    pub delivery_time: DateTime<Utc>,
    /// Set once when the order is first saved.
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied fields of an order that has not been saved yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    /// Parcel weight in kilograms.
    pub weight: f64,
    /// Delivery zone label.
    pub city_district: String,
    /// Scheduled delivery time.
    pub delivery_time: DateTime<Utc>,
}

/// Field overwrites for an existing order. `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderChanges {
    pub weight: Option<f64>,
    pub city_district: Option<String>,
    pub delivery_time: Option<DateTime<Utc>>,
}

impl OrderChanges {
    /// Change set overwriting every mutable field with the draft's values.
    #[must_use]
    pub fn replace_with(draft: NewOrder) -> Self {
        Self {
            weight: Some(draft.weight),
            city_district: Some(draft.city_district),
            delivery_time: Some(draft.delivery_time),
        }
    }

    /// Returns true when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.weight.is_none() && self.city_district.is_none() && self.delivery_time.is_none()
    }
}

// =============================================================================
// Filters
// =============================================================================

/// Inclusive delivery-time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DeliveryWindow {
    /// Window beginning at `start` and spanning `offset`.
    ///
    /// A negative offset produces a window that contains nothing. An end
    /// beyond the representable range saturates at the nearest bound.
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>, offset: Duration) -> Self {
        let end = start.checked_add_signed(offset).unwrap_or(if offset < Duration::zero() {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });
        Self { start, end }
    }

    /// Returns true when `time` lies within both bounds.
    #[must_use]
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time <= self.end
    }
}

/// Conjunction of optional order predicates. Unset clauses always match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub id: Option<EntityId>,
    pub city_district: Option<String>,
    pub delivery_window: Option<DeliveryWindow>,
}

impl OrderFilter {
    /// Filter matching every order.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to the order with the given id.
    #[must_use]
    pub const fn with_id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    /// Restricts to orders whose district equals `district` exactly.
    #[must_use]
    pub fn with_city_district(mut self, district: impl Into<String>) -> Self {
        self.city_district = Some(district.into());
        self
    }

    /// Restricts to orders delivered within `window`.
    #[must_use]
    pub const fn with_delivery_window(mut self, window: DeliveryWindow) -> Self {
        self.delivery_window = Some(window);
        self
    }

    /// Returns true when no clause is set.
    #[must_use]
    pub const fn is_unrestricted(&self) -> bool {
        self.id.is_none() && self.city_district.is_none() && self.delivery_window.is_none()
    }
}

// =============================================================================
// Entity Implementation
// =============================================================================

impl Entity for Order {
    type Draft = NewOrder;
    type Changes = OrderChanges;
    type Filter = OrderFilter;

    const NAME: &'static str = "order";

    fn id(&self) -> EntityId {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn materialize(id: EntityId, created_at: DateTime<Utc>, draft: NewOrder) -> Self {
        Self {
            id,
            weight: draft.weight,
            city_district: draft.city_district,
            delivery_time: to_stored_precision(draft.delivery_time),
            created_at: to_stored_precision(created_at),
        }
    }

    fn apply(&mut self, changes: &OrderChanges) {
        if let Some(weight) = changes.weight {
            self.weight = weight;
        }
        if let Some(district) = &changes.city_district {
            self.city_district.clone_from(district);
        }
        if let Some(delivery_time) = changes.delivery_time {
            self.delivery_time = to_stored_precision(delivery_time);
        }
    }

    fn matches(&self, filter: &OrderFilter) -> bool {
        filter.id.is_none_or(|id| self.id == id)
            && filter
                .city_district
                .as_deref()
                .is_none_or(|district| self.city_district == district)
            && filter
                .delivery_window
                .is_none_or(|window| window.contains(self.delivery_time))
    }

    fn identity_filter(id: EntityId) -> OrderFilter {
        OrderFilter::all().with_id(id)
    }
}

// =============================================================================
// Tests
// =============================================================================
