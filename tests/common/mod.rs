//! Common test helpers for integration tests.
//!
//! This module provides shared utilities for creating `AppState` instances,
//! stored orders, request contexts and for driving the router.
//!
//! # Note
//!
//! The `#![allow(dead_code)]` attribute is necessary because Rust compiles each
//! integration test file as a separate crate, and not every file uses every
//! helper.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use chrono::{DateTime, Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use delivery_service::api::{AppState, Locale, Localizer, RequestContext, TraceId, create_router};
use delivery_service::domain::{NewOrder, Order};
use delivery_service::infrastructure::{
    InMemoryStorage, Storage, StorageConfig, StorageFactory, StorageMode,
};

// =============================================================================
// AppState Creation Helpers
// =============================================================================

/// Creates a test `AppState` over an empty in-memory store, Russian by default.
pub fn create_test_app_state() -> AppState {
    create_app_state_with(Arc::new(InMemoryStorage::<Order>::new()))
}

/// Creates an `AppState` over the given storage.
pub fn create_app_state_with(storage: Arc<dyn Storage<Order>>) -> AppState {
    AppState::new(storage, Localizer::embedded(Locale::Ru).unwrap())
}

/// Creates an `AppState` over a fresh store of the given kind. `SQLite`
/// stores use a private in-memory database.
pub async fn create_app_state_for(mode: StorageMode) -> AppState {
    let config = StorageConfig::builder()
        .storage_mode(mode)
        .database_url("sqlite::memory:")
        .build()
        .unwrap();
    create_app_state_with(StorageFactory::new(config).create().await.unwrap())
}

/// Builds the context a handler would receive for `instance`.
pub fn request_context(state: &AppState, locale: Locale, instance: &str) -> RequestContext {
    RequestContext::new(
        Arc::clone(&state.localizer),
        locale,
        instance,
        TraceId::new("test-trace"),
    )
}

// =============================================================================
// Order Helpers
// =============================================================================

/// Fixed reference instant far enough ahead to pass validation.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2035, 6, 1, 10, 0, 0).unwrap()
}

/// Stores an order directly, bypassing validation.
pub async fn create_and_save_order(
    state: &AppState,
    weight: f64,
    city_district: &str,
    delivery_time: DateTime<Utc>,
) -> Order {
    let mut repository = state.order_repository();
    repository.create(NewOrder {
        weight,
        city_district: city_district.to_string(),
        delivery_time,
    });
    repository.save().await.unwrap().created.remove(0)
}

/// Stores four orders: two in "Центральный" and two in "Северный", delivered
/// at `base_time()`, +10 min, +45 min and +2 h.
pub async fn create_sample_orders(state: &AppState) -> Vec<Order> {
    let base = base_time();
    let mut orders = Vec::new();
    for (weight, district, minutes) in [
        (1.5, "Центральный", 0),
        (2.0, "Северный", 10),
        (3.25, "Центральный", 45),
        (0.75, "Северный", 120),
    ] {
        let delivery_time = base + Duration::minutes(minutes);
        orders.push(create_and_save_order(state, weight, district, delivery_time).await);
    }
    orders
}

/// Counts the orders currently stored.
pub async fn stored_order_count(state: &AppState) -> u64 {
    state.order_repository().count(None).await.unwrap()
}

// =============================================================================
// Router Helpers
// =============================================================================

/// Response parts collected for assertions.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Sends one request through a freshly built router.
pub async fn send(state: &AppState, request: Request<Body>) -> TestResponse {
    send_to(create_router(state.clone()), request).await
}

pub async fn send_to(router: Router, request: Request<Body>) -> TestResponse {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

/// Builds a JSON request.
pub fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Builds a bodiless request.
pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}
