//! HTTP handlers for the order API.
//!
//! Each handler opens its own unit of work, so staged changes never cross
//! request boundaries. Extractor failures are taken as `Result` values and
//! answered with problem descriptions instead of the framework's plain-text
//! rejections.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderName, StatusCode, header},
};
use chrono::Utc;

use super::dto::{OrderDto, OrderFilterQuery, OrderViewModel};
use super::extract::RequestContext;
use super::problem::{ApiError, Problem, RequestPart};
use super::routes::ORDERS_PATH;
use super::state::AppState;
use super::validation::validate_order;
use crate::domain::{EntityId, OrderChanges, OrderFilter};
use crate::infrastructure::RepositoryError;

// =============================================================================
// Request Helpers
// =============================================================================

/// Parses the `{id}` path segment.
fn parse_order_id(path: Result<Path<String>, PathRejection>) -> Result<EntityId, ApiError> {
    let Path(raw) = path.map_err(|rejection| ApiError::MalformedRequest {
        part: RequestPart::Id,
        reason: rejection.body_text(),
    })?;
    raw.trim()
        .parse::<EntityId>()
        .map_err(|_| ApiError::MalformedRequest {
            part: RequestPart::Id,
            reason: raw,
        })
}

fn read_body(body: Result<Json<OrderViewModel>, JsonRejection>) -> Result<OrderViewModel, ApiError> {
    body.map(|Json(model)| model)
        .map_err(|rejection| ApiError::MalformedRequest {
            part: RequestPart::Body,
            reason: rejection.body_text(),
        })
}

// =============================================================================
// GET /api/v1/orders/{id}
// =============================================================================

/// Returns one order.
///
/// # Response
///
/// - **200 OK**: the order
/// - **400 Bad Request**: the id is not an integer
/// - **404 Not Found**: no order has the id
pub async fn get_order(
    State(state): State<AppState>,
    context: RequestContext,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<OrderDto>, Problem> {
    let id = parse_order_id(path).map_err(|error| context.problem(error))?;

    let order = state
        .order_repository()
        .get_by_id_as::<OrderDto>(id)
        .await
        .map_err(|error| context.problem(error))?
        .ok_or_else(|| context.problem(ApiError::OrderNotFound { id }))?;

    tracing::info!(
        id = order.id,
        city_district = %order.city_district,
        delivery_time = %order.delivery_time,
        weight = order.weight,
        "Return order"
    );
    Ok(Json(order))
}

// =============================================================================
// GET /api/v1/orders
// =============================================================================

/// Lists orders matching the optional district and delivery-window filters.
///
/// # Query Parameters
///
/// - `cityDistrict`: exact district match
/// - `firstDeliveryDateTime`: start of the delivery window
/// - `timeOffset`: window length, default `00:30:00`
pub async fn list_orders(
    State(state): State<AppState>,
    context: RequestContext,
    query: Result<Query<OrderFilterQuery>, QueryRejection>,
) -> Result<Json<Vec<OrderDto>>, Problem> {
    let Query(query) = query.map_err(|rejection| {
        context.problem(ApiError::MalformedRequest {
            part: RequestPart::Query,
            reason: rejection.body_text(),
        })
    })?;

    let orders = state
        .order_repository()
        .get_as::<OrderDto>(&query.to_filter())
        .await
        .map_err(|error| context.problem(error))?;

    tracing::info!(
        city_district = ?query.city_district,
        first_delivery_date_time = ?query.first_delivery_date_time,
        time_offset = %query.time_offset,
        count = orders.len(),
        "Return orders"
    );
    Ok(Json(orders))
}

// =============================================================================
// POST /api/v1/orders
// =============================================================================

/// Creates an order.
///
/// # Response
///
/// - **201 Created**: the stored order, with `Location` pointing at it
/// - **400 Bad Request**: malformed body or failed validation
pub async fn create_order(
    State(state): State<AppState>,
    context: RequestContext,
    body: Result<Json<OrderViewModel>, JsonRejection>,
) -> Result<(StatusCode, [(HeaderName, String); 1], Json<OrderDto>), Problem> {
    let model = read_body(body).map_err(|error| context.problem(error))?;
    let draft = validate_order(&model, Utc::now()).map_err(|error| context.problem(error))?;

    let mut repository = state.order_repository();
    repository.create(draft);
    let order = repository
        .save()
        .await
        .map_err(|error| context.problem(error))?
        .created
        .pop()
        .ok_or_else(|| {
            context.problem(RepositoryError::DatabaseError(
                "insert returned no row".to_string(),
            ))
        })?;

    tracing::info!(
        id = order.id,
        delivery_time = %order.delivery_time,
        city_district = %order.city_district,
        weight = order.weight,
        "Create order"
    );

    let location = format!("{ORDERS_PATH}/{}", order.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(OrderDto::from(order)),
    ))
}

// =============================================================================
// PUT /api/v1/orders/{id}
// =============================================================================

/// Overwrites weight, district and delivery time of an order.
///
/// The id is resolved before the body is read, so an unknown id answers 404
/// even when the body is invalid.
pub async fn update_order(
    State(state): State<AppState>,
    context: RequestContext,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<OrderViewModel>, JsonRejection>,
) -> Result<Json<OrderDto>, Problem> {
    let id = parse_order_id(path).map_err(|error| context.problem(error))?;

    let mut repository = state.order_repository();
    if repository
        .get_by_id(id)
        .await
        .map_err(|error| context.problem(error))?
        .is_none()
    {
        return Err(context.problem(ApiError::OrderNotFound { id }));
    }

    let model = read_body(body).map_err(|error| context.problem(error))?;
    let draft = validate_order(&model, Utc::now()).map_err(|error| context.problem(error))?;

    repository.update(id, OrderChanges::replace_with(draft));
    let order = match repository.save().await {
        Ok(committed) => committed.updated.into_iter().next(),
        // Deleted between the lookup and the save.
        Err(RepositoryError::NotFound(_)) => None,
        Err(error) => return Err(context.problem(error)),
    }
    .ok_or_else(|| context.problem(ApiError::OrderNotFound { id }))?;

    tracing::info!(
        id = order.id,
        delivery_time = %order.delivery_time,
        city_district = %order.city_district,
        weight = order.weight,
        "Update order"
    );
    Ok(Json(OrderDto::from(order)))
}

// =============================================================================
// DELETE /api/v1/orders/{id}
// =============================================================================

/// Deletes an order. Answers 200 with an empty body.
pub async fn delete_order(
    State(state): State<AppState>,
    context: RequestContext,
    path: Result<Path<String>, PathRejection>,
) -> Result<StatusCode, Problem> {
    let id = parse_order_id(path).map_err(|error| context.problem(error))?;
    let filter = OrderFilter::all().with_id(id);

    let mut repository = state.order_repository();
    if !repository
        .any(Some(&filter))
        .await
        .map_err(|error| context.problem(error))?
    {
        return Err(context.problem(ApiError::OrderNotFound { id }));
    }

    repository.delete(filter);
    repository
        .save()
        .await
        .map_err(|error| context.problem(error))?;

    tracing::info!(id, "Delete order");
    Ok(StatusCode::OK)
}

// =============================================================================
// Fallback
// =============================================================================

/// Answers requests that match no route, or a route with another method.
pub async fn route_not_found(context: RequestContext) -> Problem {
    let path = context.instance.clone();
    context.problem(ApiError::RouteNotFound { path })
}

// =============================================================================
// GET /health Handler
// =============================================================================

/// Health check response body.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Health check endpoint.
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// =============================================================================
// Tests
// =============================================================================
