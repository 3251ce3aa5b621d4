//! Write-request validation.
//!
//! Every rule is checked and every failure is reported; nothing short
//! circuits. Messages are resolved later, in the request culture.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::dto::OrderViewModel;
use super::localization::MessageKey;
use crate::domain::NewOrder;

/// A rule an order write request must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// `weight > 0`.
    WeightGreaterThanZero,
    /// `deliveryTime` later than the time of the request.
    DeliveryTimeInFuture,
    /// `cityDistrict` is not empty.
    CityDistrictNotEmpty,
}

impl Rule {
    #[must_use]
    pub const fn message_key(self) -> MessageKey {
        match self {
            Self::WeightGreaterThanZero => MessageKey::WeightGreaterThanZero,
            Self::DeliveryTimeInFuture => MessageKey::DeliveryTimeInFuture,
            Self::CityDistrictNotEmpty => MessageKey::CityDistrictNotEmpty,
        }
    }
}

/// One failed rule on one request field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Wire name of the field (camelCase).
    pub field: &'static str,
    pub rule: Rule,
}

impl FieldError {
    #[must_use]
    pub const fn new(field: &'static str, rule: Rule) -> Self {
        Self { field, rule }
    }
}

/// Every rule the request failed, in field order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed on {} field(s)", .errors.len())]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    #[must_use]
    pub const fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }
}

/// Checks an order write request against `now` and returns the draft.
///
/// # Errors
///
/// Returns `ValidationError` listing every failed rule.
pub fn validate_order(
    model: &OrderViewModel,
    now: DateTime<Utc>,
) -> Result<NewOrder, ValidationError> {
    let checks = [
        (model.weight > 0.0, FieldError::new("weight", Rule::WeightGreaterThanZero)),
        (
            !model.city_district.is_empty(),
            FieldError::new("cityDistrict", Rule::CityDistrictNotEmpty),
        ),
        (
            model.delivery_time > now,
            FieldError::new("deliveryTime", Rule::DeliveryTimeInFuture),
        ),
    ];

    let errors: Vec<FieldError> = checks
        .into_iter()
        .filter_map(|(passed, error)| (!passed).then_some(error))
        .collect();

    if errors.is_empty() {
        Ok(NewOrder {
            weight: model.weight,
            city_district: model.city_district.clone(),
            delivery_time: model.delivery_time,
        })
    } else {
        Err(ValidationError::new(errors))
    }
}

// =============================================================================
// Tests
// =============================================================================
