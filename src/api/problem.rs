//! RFC 7807 problem descriptions.
//!
//! Every failed request, whatever produced it, is answered with the same
//! `application/problem+json` shape: `type`, `title`, `status`, `detail`,
//! `instance`, `traceId`, plus `errors` on 400 responses.

use std::collections::BTreeMap;

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::localization::{Locale, Localizer, MessageKey};
use super::validation::ValidationError;
use crate::domain::EntityId;
use crate::infrastructure::RepositoryError;

/// Media type of problem responses.
pub const APPLICATION_PROBLEM_JSON: &str = "application/problem+json";

const BAD_REQUEST_TYPE: &str = "https://tools.ietf.org/html/rfc9110#section-15.5.1";
const NOT_FOUND_TYPE: &str = "https://tools.ietf.org/html/rfc9110#section-15.5.5";
const INTERNAL_ERROR_TYPE: &str = "https://tools.ietf.org/html/rfc9110#section-15.6.1";

// =============================================================================
// Problem Details
// =============================================================================

/// Serialized body of a problem response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// Link describing the error category.
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    /// Request path.
    pub instance: String,
    /// Correlation id, equal to the `x-request-id` response header.
    pub trace_id: String,
    /// Field name to messages. Present on 400 responses only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

/// A problem description together with its HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub status: StatusCode,
    pub details: ProblemDetails,
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, APPLICATION_PROBLEM_JSON)],
            Json(self.details),
        )
            .into_response()
    }
}

// =============================================================================
// API Error
// =============================================================================

/// Part of the request that could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPart {
    Body,
    Query,
    Id,
}

impl RequestPart {
    const fn message_key(self) -> MessageKey {
        match self {
            Self::Body => MessageKey::MalformedBody,
            Self::Query => MessageKey::MalformedQuery,
            Self::Id => MessageKey::MalformedId,
        }
    }

    /// Key under which the failure is listed in `errors`.
    const fn field(self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Query => "query",
            Self::Id => "id",
        }
    }
}

impl std::fmt::Display for RequestPart {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.field())
    }
}

/// Request failures, one variant per problem category.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No order has the requested id.
    #[error("Order {id} not found")]
    OrderNotFound { id: EntityId },

    /// No route matches the request method and path.
    #[error("No route matches {path}")]
    RouteNotFound { path: String },

    /// The write request broke one or more rules.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Body, query or path could not be parsed.
    #[error("Malformed request {part}: {reason}")]
    MalformedRequest { part: RequestPart, reason: String },

    /// The storage backend failed.
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

impl ApiError {
    /// HTTP status the error is answered with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::OrderNotFound { .. } | Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Validation(_) | Self::MalformedRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Shapes the error into a localized problem description.
    ///
    /// Storage internals are not included in the description.
    #[must_use]
    pub fn to_problem(
        &self,
        localizer: &Localizer,
        locale: Locale,
        instance: &str,
        trace_id: &str,
    ) -> Problem {
        let text = |key| localizer.message(locale, key);
        let (problem_type, title, detail, errors) = match self {
            Self::OrderNotFound { id } => (
                NOT_FOUND_TYPE,
                text(MessageKey::NotFoundOrder),
                localizer.format(locale, MessageKey::NotFoundOrderDesc, &[id]),
                None,
            ),
            Self::RouteNotFound { path } => (
                NOT_FOUND_TYPE,
                text(MessageKey::ApiNotFound),
                localizer.format(locale, MessageKey::ApiNotFoundDetail, &[path]),
                None,
            ),
            Self::Validation(validation) => {
                let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for error in &validation.errors {
                    errors
                        .entry(error.field.to_string())
                        .or_default()
                        .push(text(error.rule.message_key()));
                }
                (
                    BAD_REQUEST_TYPE,
                    text(MessageKey::Title400),
                    text(MessageKey::Detail),
                    Some(errors),
                )
            }
            Self::MalformedRequest { part, reason } => {
                let message = localizer.format(locale, part.message_key(), &[reason]);
                (
                    BAD_REQUEST_TYPE,
                    text(MessageKey::Title400),
                    text(MessageKey::Detail),
                    Some(BTreeMap::from([(part.field().to_string(), vec![message])])),
                )
            }
            Self::Storage(_) => (
                INTERNAL_ERROR_TYPE,
                text(MessageKey::Title500),
                text(MessageKey::Detail500),
                None,
            ),
        };

        let status = self.status();
        Problem {
            status,
            details: ProblemDetails {
                problem_type: problem_type.to_string(),
                title,
                status: status.as_u16(),
                detail,
                instance: instance.to_string(),
                trace_id: trace_id.to_string(),
                errors,
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::validation::{FieldError, Rule};
    use http_body_util::BodyExt;
    use rstest::{fixture, rstest};

    #[fixture]
    fn localizer() -> Localizer {
        Localizer::embedded(Locale::Ru).unwrap()
    }

    fn shape(error: &ApiError, localizer: &Localizer, locale: Locale) -> ProblemDetails {
        error
            .to_problem(localizer, locale, "/api/v1/orders/999999", "trace-1")
            .details
    }

    #[rstest]
    fn test_order_not_found_names_the_id(localizer: Localizer) {
        let details = shape(&ApiError::OrderNotFound { id: 999_999 }, &localizer, Locale::En);

        assert_eq!(details.problem_type, NOT_FOUND_TYPE);
        assert_eq!(details.status, 404);
        assert_eq!(details.title, "Order not found");
        assert_eq!(details.detail, "Order with id 999999 does not exist");
        assert_eq!(details.instance, "/api/v1/orders/999999");
        assert_eq!(details.trace_id, "trace-1");
        assert_eq!(details.errors, None);
    }

    #[rstest]
    fn test_route_not_found_names_the_path(localizer: Localizer) {
        let error = ApiError::RouteNotFound {
            path: "/api/v1/missing".to_string(),
        };

        let details = shape(&error, &localizer, Locale::Ru);

        assert_eq!(details.status, 404);
        assert_eq!(details.title, "Ресурс не найден");
        assert_eq!(details.detail, "Не найден обработчик для пути /api/v1/missing");
    }

    #[rstest]
    fn test_validation_lists_messages_per_field(localizer: Localizer) {
        let error = ApiError::from(ValidationError::new(vec![
            FieldError::new("weight", Rule::WeightGreaterThanZero),
            FieldError::new("deliveryTime", Rule::DeliveryTimeInFuture),
        ]));

        let details = shape(&error, &localizer, Locale::En);

        assert_eq!(details.problem_type, BAD_REQUEST_TYPE);
        assert_eq!(details.status, 400);
        assert_eq!(details.title, "One or more validation errors occurred.");
        let errors = details.errors.unwrap();
        assert_eq!(errors["weight"], vec!["Weight must be greater than 0."]);
        assert_eq!(
            errors["deliveryTime"],
            vec!["Delivery time must be in the future."]
        );
    }

    #[rstest]
    fn test_malformed_id_is_a_bad_request(localizer: Localizer) {
        let error = ApiError::MalformedRequest {
            part: RequestPart::Id,
            reason: "abc".to_string(),
        };

        let details = shape(&error, &localizer, Locale::En);

        assert_eq!(details.status, 400);
        assert_eq!(
            details.errors.unwrap()["id"],
            vec!["The value 'abc' is not a valid order id."]
        );
    }

    #[rstest]
    fn test_storage_failures_hide_internals(localizer: Localizer) {
        let error = ApiError::from(RepositoryError::DatabaseError("disk I/O error".to_string()));

        let details = shape(&error, &localizer, Locale::En);

        assert_eq!(details.problem_type, INTERNAL_ERROR_TYPE);
        assert_eq!(details.status, 500);
        assert!(!details.detail.contains("disk"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_problem_response_uses_problem_media_type(localizer: Localizer) {
        let problem = ApiError::OrderNotFound { id: 5 }.to_problem(
            &localizer,
            Locale::En,
            "/api/v1/orders/5",
            "abc",
        );

        let response = problem.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            APPLICATION_PROBLEM_JSON
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["type"], NOT_FOUND_TYPE);
        assert_eq!(json["traceId"], "abc");
        assert_eq!(json["instance"], "/api/v1/orders/5");
        assert!(json.get("errors").is_none());
    }
}
