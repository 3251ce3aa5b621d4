//! Routing definitions for the delivery API.
//!
//! This module defines all API routes and configures the Axum router
//! with handlers, middleware, and state.

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::TraceIdLayer;
use super::state::AppState;

/// Prefix shared by every versioned endpoint.
pub const API_PREFIX: &str = "/api/v1";

/// Absolute path of the order collection.
pub const ORDERS_PATH: &str = "/api/v1/orders";

// =============================================================================
// Router Creation
// =============================================================================

/// Creates the main API router with all routes and middleware.
///
/// Unknown paths and unsupported methods on known paths are both answered
/// with a localized 404 problem.
///
/// # Examples
///
/// ```ignore
/// use delivery_service::api::{AppState, create_router};
///
/// let state = AppState::new(storage, localizer);
/// let router = create_router(state);
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:5000").await?;
/// axum::serve(listener, router).await?;
/// ```
pub fn create_router(state: AppState) -> Router {
    let api_v1 = Router::new()
        .route(
            "/orders",
            get(handlers::list_orders).post(handlers::create_order),
        )
        .route(
            "/orders/{id}",
            get(handlers::get_order)
                .put(handlers::update_order)
                .delete(handlers::delete_order),
        )
        .method_not_allowed_fallback(handlers::route_not_found);

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest(API_PREFIX, api_v1)
        .fallback(handlers::route_not_found)
        .method_not_allowed_fallback(handlers::route_not_found)
        .layer(TraceIdLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer())
        .with_state(state)
}

fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

// =============================================================================
// Tests
// =============================================================================
