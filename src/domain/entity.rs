//! Entity abstraction shared by every storage backend.
//!
//! An entity describes three companion value types:
//!
//! - a **draft**: the caller-supplied fields of a row that does not exist yet
//! - a **change set**: optional per-field overwrites for an existing row
//! - a **filter**: a struct of optional clauses, where an unset clause always
//!   matches
//!
//! Storage backends interpret these values instead of compiled query
//! expressions, so the same filter drives the in-memory map scan and the SQL
//! `WHERE` clause.

use chrono::{DateTime, SubsecRound, Utc};

/// Store-assigned primary key.
pub type EntityId = i64;

/// Fractional-second digits every storage backend keeps.
pub const TIMESTAMP_DIGITS: u16 = 6;

/// Truncates a timestamp to whole microseconds.
#[must_use]
pub fn to_stored_precision(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.trunc_subsecs(TIMESTAMP_DIGITS)
}

/// A persisted record with store-assigned identity and creation timestamp.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Fields supplied by the caller when creating a new record.
    type Draft: Clone + Send + Sync + 'static;
    /// Field overwrites applied by an update.
    type Changes: Clone + Send + Sync + 'static;
    /// Predicate over entity fields. `Default` must match every entity.
    type Filter: Clone + Default + Send + Sync + 'static;

    /// Human-readable entity name used in errors and logs.
    const NAME: &'static str;

    /// Returns the primary key.
    fn id(&self) -> EntityId;

    /// Returns the creation timestamp.
    fn created_at(&self) -> DateTime<Utc>;

    /// Builds the persisted record once the store has assigned identity.
    ///
    /// Timestamps are kept at [`TIMESTAMP_DIGITS`] precision.
    fn materialize(id: EntityId, created_at: DateTime<Utc>, draft: Self::Draft) -> Self;

    /// Applies a change set in place. Identity and creation time are untouched.
    fn apply(&mut self, changes: &Self::Changes);

    /// Returns true when the entity satisfies every set clause of the filter.
    fn matches(&self, filter: &Self::Filter) -> bool;

    /// Filter selecting exactly the entity with the given id.
    fn identity_filter(id: EntityId) -> Self::Filter;
}
