//! Domain module for delivery orders.
//!
//! This module contains the persisted entity model and the filter values
//! the repositories interpret.

pub mod entity;
pub mod order;

pub use entity::{Entity, EntityId, TIMESTAMP_DIGITS, to_stored_precision};
pub use order::{DeliveryWindow, NewOrder, Order, OrderChanges, OrderFilter};
