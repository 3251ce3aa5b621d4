//! Per-request context extractor.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequestParts, OriginalUri, Query};
use axum::http::header;
use axum::http::request::Parts;
use serde::Deserialize;

use super::localization::{Locale, Localizer};
use super::middleware::TraceId;
use super::problem::{ApiError, Problem};
use super::state::AppState;

/// Culture overrides accepted on any request.
#[derive(Debug, Default, Deserialize)]
struct CultureQuery {
    culture: Option<String>,
    #[serde(rename = "ui-culture")]
    ui_culture: Option<String>,
}

/// Negotiated culture, request path and trace id of the current request.
///
/// Every handler takes one so failures can be shaped into localized
/// problem descriptions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub locale: Locale,
    /// Path of the request as received, before any routing prefix is stripped.
    pub instance: String,
    pub trace_id: TraceId,
    localizer: Arc<Localizer>,
}

impl RequestContext {
    #[must_use]
    pub fn new(
        localizer: Arc<Localizer>,
        locale: Locale,
        instance: impl Into<String>,
        trace_id: TraceId,
    ) -> Self {
        Self {
            locale,
            instance: instance.into(),
            trace_id,
            localizer,
        }
    }

    /// Shapes a failure into the problem description sent to the client.
    pub fn problem(&self, error: impl Into<ApiError>) -> Problem {
        let error = error.into();
        match &error {
            ApiError::Storage(cause) => tracing::error!(
                trace_id = %self.trace_id,
                instance = %self.instance,
                error = %cause,
                "Storage failure"
            ),
            other => tracing::info!(
                trace_id = %self.trace_id,
                instance = %self.instance,
                status = other.status().as_u16(),
                error = %other,
                "Request rejected"
            ),
        }
        error.to_problem(
            &self.localizer,
            self.locale,
            &self.instance,
            self.trace_id.as_str(),
        )
    }
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cultures = Query::<CultureQuery>::try_from_uri(&parts.uri)
            .map(|Query(cultures)| cultures)
            .unwrap_or_default();
        let accept_language = parts
            .headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok());

        let locale = state.localizer.negotiate(
            cultures.culture.as_deref(),
            cultures.ui_culture.as_deref(),
            accept_language,
        );

        let instance = parts
            .extensions
            .get::<OriginalUri>()
            .map_or_else(|| parts.uri.path(), |original| original.0.path())
            .to_string();

        let trace_id = parts
            .extensions
            .get::<TraceId>()
            .cloned()
            .or_else(|| TraceId::from_headers(&parts.headers))
            .unwrap_or_else(TraceId::generate);

        Ok(Self::new(
            Arc::clone(&state.localizer),
            locale,
            instance,
            trace_id,
        ))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Order;
    use crate::infrastructure::InMemoryStorage;
    use axum::http::Request;
    use rstest::{fixture, rstest};

    #[fixture]
    fn state() -> AppState {
        AppState::new(
            Arc::new(InMemoryStorage::<Order>::new()),
            Localizer::embedded(Locale::Ru).unwrap(),
        )
    }

    async fn extract(state: &AppState, request: Request<()>) -> RequestContext {
        let (mut parts, ()) = request.into_parts();
        RequestContext::from_request_parts(&mut parts, state)
            .await
            .unwrap()
    }

    #[rstest]
    #[tokio::test]
    async fn test_query_culture_wins_over_header(state: AppState) {
        let request = Request::builder()
            .uri("/api/v1/orders/1?culture=en")
            .header(header::ACCEPT_LANGUAGE, "ru-RU")
            .body(())
            .unwrap();

        let context = extract(&state, request).await;

        assert_eq!(context.locale, Locale::En);
        assert_eq!(context.instance, "/api/v1/orders/1");
    }

    #[rstest]
    #[tokio::test]
    async fn test_accept_language_is_used_without_query(state: AppState) {
        let request = Request::builder()
            .uri("/api/v1/orders")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .body(())
            .unwrap();

        assert_eq!(extract(&state, request).await.locale, Locale::En);
    }

    #[rstest]
    #[tokio::test]
    async fn test_default_culture_and_generated_trace_id(state: AppState) {
        let request = Request::builder().uri("/missing").body(()).unwrap();

        let context = extract(&state, request).await;

        assert_eq!(context.locale, Locale::Ru);
        assert!(uuid::Uuid::parse_str(context.trace_id.as_str()).is_ok());
    }

    #[rstest]
    #[tokio::test]
    async fn test_trace_id_comes_from_the_request_header(state: AppState) {
        let request = Request::builder()
            .uri("/api/v1/orders")
            .header("x-request-id", "req-7")
            .body(())
            .unwrap();

        assert_eq!(extract(&state, request).await.trace_id.as_str(), "req-7");
    }
}
