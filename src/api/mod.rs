//! HTTP layer for the delivery API.
//!
//! This module contains the request and response shapes, validation,
//! localized problem responses, middleware, handlers and the router.

pub mod dto;
pub mod extract;
pub mod handlers;
pub mod localization;
pub mod middleware;
pub mod problem;
pub mod routes;
pub mod state;
pub mod validation;

pub use dto::{InvalidTimeOffset, OrderDto, OrderFilterQuery, OrderViewModel, TimeOffset};
pub use extract::RequestContext;
pub use handlers::{
    HealthResponse, create_order, delete_order, get_order, health_check, list_orders,
    route_not_found, update_order,
};
pub use localization::{Locale, LocalizationError, Localizer, MessageKey};
pub use middleware::{REQUEST_ID_HEADER, TraceId, TraceIdLayer};
pub use problem::{APPLICATION_PROBLEM_JSON, ApiError, Problem, ProblemDetails, RequestPart};
pub use routes::{API_PREFIX, ORDERS_PATH, create_router};
pub use state::AppState;
pub use validation::{FieldError, Rule, ValidationError, validate_order};
