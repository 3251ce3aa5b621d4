//! Delivery Service Library
//!
//! Order management for a delivery company: a generic repository with a
//! unit of work over in-memory or `SQLite` storage, and an HTTP API that
//! answers every failure with a localized problem description.

pub mod api;
pub mod domain;
pub mod infrastructure;
