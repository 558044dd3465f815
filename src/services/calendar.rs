//! Calendar-service collaborator boundary.
//
// Everything the engine knows about the remote calendar lives here: the wire
// shapes of calendars and events, the error classification used by the retry
// policy, and the `CalendarService` trait the composer drives.

use crate::calendar::ErrorKind;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Failure reported by the calendar service, classified for retry decisions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Rate limited by calendar service: {0}")]
    RateLimited(String),
    #[error("Calendar service error (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    #[error("Calendar service request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Calendar service unreachable: {0}")]
    Unreachable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Authentication failed: {0}")]
    Unauthorized(String),
    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Unexpected response from calendar service: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Rate limits, 5xx, timeouts and unreachable hosts may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::RateLimited(_)
                | ServiceError::Server { .. }
                | ServiceError::Timeout(_)
                | ServiceError::Unreachable(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_transient() {
            ErrorKind::TransientServiceError
        } else {
            ErrorKind::PermanentServiceError
        }
    }

    /// Classify a non-success HTTP response using the Google error envelope
    /// (`{"error": {"code", "message", "errors": [{"reason"}]}}`) when present.
    pub fn from_status(status: u16, body: &str) -> Self {
        let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
        let message = envelope
            .as_ref()
            .map(|e| e.error.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.trim().to_string());
        let rate_limited_reason = envelope.as_ref().is_some_and(|e| {
            e.error
                .errors
                .iter()
                .any(|d| d.reason == "rateLimitExceeded" || d.reason == "userRateLimitExceeded")
        });

        match status {
            429 => ServiceError::RateLimited(message),
            403 if rate_limited_reason => ServiceError::RateLimited(message),
            500..=599 => ServiceError::Server { status, message },
            401 => ServiceError::Unauthorized(message),
            403 => ServiceError::PermissionDenied(message),
            404 | 410 => ServiceError::NotFound(message),
            _ => ServiceError::Rejected { status, message },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

/// An entry of the user's calendar list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarInfo {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl CalendarInfo {
    pub fn new(id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            primary: false,
            color_id: None,
            background_color: None,
            time_zone: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.summary
    }
}

/// Body of a calendar creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCalendar {
    pub summary: String,
    pub time_zone: String,
}

/// Start or end of an event: timed events carry `dateTime`, all-day events `date`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    pub fn timed(date_time: DateTime<FixedOffset>, time_zone: impl Into<String>) -> Self {
        Self { date_time: Some(date_time), date: None, time_zone: Some(time_zone.into()) }
    }

    /// Timed value keeping the wall-clock offset and the IANA zone name
    pub fn zoned(date_time: DateTime<Tz>) -> Self {
        let tz = date_time.timezone();
        Self::timed(date_time.with_timezone(&date_time.offset().fix()), tz.name())
    }
}

impl fmt::Display for EventDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.date_time, &self.date) {
            (Some(dt), _) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S %:z")),
            (None, Some(d)) => write!(f, "{} (all day)", d),
            (None, None) => write!(f, "unscheduled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderMethod {
    Email,
    Popup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderOverride {
    pub method: ReminderMethod,
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminders {
    pub use_default: bool,
    #[serde(default)]
    pub overrides: Vec<ReminderOverride>,
}

/// Body of an event creation request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventDateTime,
    pub end: EventDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recurrence: Vec<String>,
    pub reminders: Reminders,
}

/// Partial update of an existing event; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
}

impl EventPatch {
    pub fn color(color_id: impl Into<String>) -> Self {
        Self { color_id: Some(color_id.into()), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// An event as returned by the calendar service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recurrence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl RemoteEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }

    pub fn display_summary(&self) -> &str {
        if self.summary.is_empty() {
            "No Summary"
        } else {
            &self.summary
        }
    }
}

/// Keyword and/or time-window filter for an event search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    pub text: Option<String>,
    pub time_min: Option<DateTime<Utc>>,
    pub time_max: Option<DateTime<Utc>>,
}

/// Operations consumed from the remote calendar service.
///
/// None of these calls is idempotent from the service's point of view; callers
/// that need idempotence (color sync) compare before they write.
#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn list_calendars(&self) -> Result<Vec<CalendarInfo>, ServiceError>;

    async fn get_calendar(&self, calendar_id: &str) -> Result<CalendarInfo, ServiceError>;

    async fn create_calendar(&self, calendar: &NewCalendar) -> Result<CalendarInfo, ServiceError>;

    async fn create_event(
        &self,
        calendar_id: &str,
        event: &EventPayload,
    ) -> Result<RemoteEvent, ServiceError>;

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<RemoteEvent, ServiceError>;

    async fn search_events(
        &self,
        calendar_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<RemoteEvent>, ServiceError>;

    async fn list_events(&self, calendar_id: &str) -> Result<Vec<RemoteEvent>, ServiceError>;
}
