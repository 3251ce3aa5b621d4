//! Data Transfer Objects for API requests and responses.
//!
//! Field names on the wire are camelCase. Timestamps are written as RFC 3339
//! UTC and read either as RFC 3339 or as a bare `YYYY-MM-DDTHH:MM:SS[.f]`
//! local form, which is taken to be UTC.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use thiserror::Error;

use crate::domain::{DeliveryWindow, EntityId, Order, OrderFilter};

// =============================================================================
// Timestamp Parsing
// =============================================================================

/// Parses an RFC 3339 timestamp, or a timestamp without offset taken as UTC.
fn parse_utc_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn utc_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_utc_timestamp(&text)
        .ok_or_else(|| de::Error::custom(format!("invalid date-time '{text}'")))
}

fn optional_utc_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(text) if text.trim().is_empty() => Ok(None),
        Some(text) => parse_utc_timestamp(&text)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid date-time '{text}'"))),
    }
}

// =============================================================================
// Order DTOs
// =============================================================================

/// Write request body for create and update.
///
/// Missing fields take their unset values (`0`, empty string, minimum
/// timestamp) so they fail validation instead of deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderViewModel {
    /// Parcel weight in kilograms.
    pub weight: f64,
    pub city_district: String,
    /// Scheduled delivery time, UTC.
    #[serde(deserialize_with = "utc_timestamp")]
    pub delivery_time: DateTime<Utc>,
}

impl Default for OrderViewModel {
    fn default() -> Self {
        Self {
            weight: 0.0,
            city_district: String::new(),
            delivery_time: DateTime::<Utc>::MIN_UTC,
        }
    }
}

/// Read-only projection of an order returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub id: EntityId,
    pub created_at: DateTime<Utc>,
    pub weight: f64,
    pub city_district: String,
    pub delivery_time: DateTime<Utc>,
}

impl From<Order> for OrderDto {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            created_at: order.created_at,
            weight: order.weight,
            city_district: order.city_district,
            delivery_time: order.delivery_time,
        }
    }
}

// =============================================================================
// Time Offset
// =============================================================================

/// Error for a `timeOffset` value that is not a time span.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time span '{0}', expected [-][d.]hh:mm[:ss[.fffffff]]")]
pub struct InvalidTimeOffset(pub String);

/// Length of the delivery window, written `[-][d.]hh:mm[:ss[.fffffff]]`.
///
/// A bare integer is a number of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOffset(pub Duration);

impl TimeOffset {
    /// Window length used when the query does not set one.
    pub const DEFAULT_MINUTES: i64 = 30;

    #[must_use]
    pub const fn duration(self) -> Duration {
        self.0
    }
}

impl Default for TimeOffset {
    fn default() -> Self {
        Self(Duration::minutes(Self::DEFAULT_MINUTES))
    }
}

fn bounded(value: &str, limit: i64) -> Option<i64> {
    if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    value.parse::<i64>().ok().filter(|&number| number < limit)
}

fn fraction_nanos(digits: &str) -> Option<i64> {
    if digits.is_empty() || digits.len() > 7 || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{digits:0<9}");
    padded.parse().ok()
}

impl FromStr for TimeOffset {
    type Err = InvalidTimeOffset;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTimeOffset(text.to_string());
        let trimmed = text.trim();
        let (negative, body) = trimmed
            .strip_prefix('-')
            .map_or((false, trimmed), |rest| (true, rest));

        let span = if body.contains(':') {
            let (days, clock) = match (body.find('.'), body.find(':')) {
                (Some(dot), Some(colon)) if dot < colon => (&body[..dot], &body[dot + 1..]),
                _ => ("0", body),
            };
            let days = bounded(days, 10_675_199).ok_or_else(invalid)?;

            let mut parts = clock.split(':');
            let hours = parts.next().and_then(|part| bounded(part, 24)).ok_or_else(invalid)?;
            let minutes = parts.next().and_then(|part| bounded(part, 60)).ok_or_else(invalid)?;
            let (seconds, nanos) = match parts.next() {
                None => (0, 0),
                Some(part) => {
                    let (whole, fraction) = part.split_once('.').unwrap_or((part, ""));
                    let seconds = bounded(whole, 60).ok_or_else(invalid)?;
                    let nanos = if fraction.is_empty() && !part.contains('.') {
                        0
                    } else {
                        fraction_nanos(fraction).ok_or_else(invalid)?
                    };
                    (seconds, nanos)
                }
            };
            if parts.next().is_some() {
                return Err(invalid());
            }

            Duration::days(days)
                + Duration::hours(hours)
                + Duration::minutes(minutes)
                + Duration::seconds(seconds)
                + Duration::nanoseconds(nanos)
        } else {
            Duration::days(bounded(body, 10_675_199).ok_or_else(invalid)?)
        };

        Ok(Self(if negative { -span } else { span }))
    }
}

impl fmt::Display for TimeOffset {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let span: TimeDelta = self.0;
        let sign = if span < TimeDelta::zero() { "-" } else { "" };
        let span = span.abs();
        let days = span.num_days();
        let hours = span.num_hours() % 24;
        let minutes = span.num_minutes() % 60;
        let seconds = span.num_seconds() % 60;
        let nanos = span.subsec_nanos();

        formatter.write_str(sign)?;
        if days > 0 {
            write!(formatter, "{days}.")?;
        }
        write!(formatter, "{hours:02}:{minutes:02}:{seconds:02}")?;
        if nanos > 0 {
            write!(formatter, ".{:07}", nanos / 100)?;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for TimeOffset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

// =============================================================================
// Filter Query
// =============================================================================

/// Query string of `GET /orders`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilterQuery {
    /// Exact district match. Empty means no district filter.
    #[serde(default)]
    pub city_district: Option<String>,
    /// Start of the delivery window.
    #[serde(default, deserialize_with = "optional_utc_timestamp")]
    pub first_delivery_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_offset: TimeOffset,
}

impl OrderFilterQuery {
    /// Builds the repository filter. Unset query values leave their clause open.
    #[must_use]
    pub fn to_filter(&self) -> OrderFilter {
        let mut filter = OrderFilter::all();
        if let Some(district) = self
            .city_district
            .as_deref()
            .filter(|district| !district.is_empty())
        {
            filter = filter.with_city_district(district);
        }
        if let Some(start) = self.first_delivery_date_time {
            filter = filter
                .with_delivery_window(DeliveryWindow::starting_at(start, self.time_offset.duration()));
        }
        filter
    }
}

// =============================================================================
// Tests
// =============================================================================
