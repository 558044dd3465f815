//! Event composition and color-synchronization engine.
//!
//! Raw input flows through [`validate_interval`] into an [`EventDraft`], is
//! optionally expanded by the recurrence, template or CSV producers, and is
//! finally handed to the [`EventComposer`], the only component that talks to
//! the calendar service.

mod calendar_import;
mod calendar_types;
mod calendar_validation;
mod color_sync;
mod composer;
mod recurrence;
mod templates;

pub use calendar_import::*;
pub use calendar_types::*;
pub use calendar_validation::*;
pub use color_sync::*;
pub use composer::*;
pub use recurrence::*;
pub use templates::*;

use crate::services::ServiceError;
use std::fmt;

/// Stable codes for every failure and warning the engine reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidFormat,
    InvalidInterval,
    TemplateNotFound,
    RecurrenceCapReached,
    IncompletePolicy,
    TransientServiceError,
    PermanentServiceError,
    PartialBatchFailure,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidFormat => "INVALID_FORMAT",
            ErrorKind::InvalidInterval => "INVALID_INTERVAL",
            ErrorKind::TemplateNotFound => "TEMPLATE_NOT_FOUND",
            ErrorKind::RecurrenceCapReached => "RECURRENCE_CAP_REACHED",
            ErrorKind::IncompletePolicy => "INCOMPLETE_POLICY",
            ErrorKind::TransientServiceError => "TRANSIENT_SERVICE_ERROR",
            ErrorKind::PermanentServiceError => "PERMANENT_SERVICE_ERROR",
            ErrorKind::PartialBatchFailure => "PARTIAL_BATCH_FAILURE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The input field a validation error points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputField {
    Summary,
    StartDate,
    StartTime,
    EndDate,
    EndTime,
    Slot,
    Entry,
    Duration,
    Color,
    RecurrenceFrequency,
    RecurrenceInterval,
    RecurrenceCount,
    RecurrenceUntil,
    SearchFrom,
    SearchTo,
}

impl InputField {
    pub fn label(&self) -> &'static str {
        match self {
            InputField::Summary => "Summary",
            InputField::StartDate => "Start Date",
            InputField::StartTime => "Start Time",
            InputField::EndDate => "End Date",
            InputField::EndTime => "End Time",
            InputField::Slot => "Slot",
            InputField::Entry => "Event Entry",
            InputField::Duration => "Duration",
            InputField::Color => "Color",
            InputField::RecurrenceFrequency => "Recurrence Frequency",
            InputField::RecurrenceInterval => "Recurrence Interval",
            InputField::RecurrenceCount => "Recurrence Count",
            InputField::RecurrenceUntil => "Recurrence Until",
            InputField::SearchFrom => "From Date",
            InputField::SearchTo => "To Date",
        }
    }
}

impl fmt::Display for InputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Custom error type for calendar operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    #[error("Invalid {field}: {reason}")]
    InvalidFormat { field: InputField, reason: String },
    #[error("End {end} must be after start {start}")]
    InvalidInterval { start: String, end: String },
    #[error("Template '{0}' not found")]
    TemplateNotFound(String),
    #[error("Calendar '{0}' not found")]
    CalendarNotFound(String),
    #[error("Calendar name '{name}' matches {count} calendars; use the calendar id instead")]
    AmbiguousCalendar { name: String, count: usize },
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl CalendarError {
    pub fn invalid_format(field: InputField, reason: impl Into<String>) -> Self {
        CalendarError::InvalidFormat { field, reason: reason.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CalendarError::InvalidFormat { .. } => ErrorKind::InvalidFormat,
            CalendarError::InvalidInterval { .. } => ErrorKind::InvalidInterval,
            CalendarError::TemplateNotFound(_) => ErrorKind::TemplateNotFound,
            CalendarError::CalendarNotFound(_) | CalendarError::AmbiguousCalendar { .. } => {
                ErrorKind::PermanentServiceError
            }
            CalendarError::Service(e) => e.kind(),
        }
    }

    /// The field the error is about, when it is a field-level validation error
    pub fn field(&self) -> Option<InputField> {
        match self {
            CalendarError::InvalidFormat { field, .. } => Some(*field),
            _ => None,
        }
    }

    pub(crate) fn is_unreachable(&self) -> bool {
        matches!(self, CalendarError::Service(ServiceError::Unreachable(_)))
    }
}

/// Non-fatal conditions surfaced alongside a successful result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    RecurrenceCapReached { cap: usize },
    IncompletePolicy { calendar: String, reason: PolicyGap },
}

impl Warning {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Warning::RecurrenceCapReached { .. } => ErrorKind::RecurrenceCapReached,
            Warning::IncompletePolicy { .. } => ErrorKind::IncompletePolicy,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::RecurrenceCapReached { cap } => {
                write!(f, "{}: recurrence stopped at the safety cap of {} occurrences", self.kind(), cap)
            }
            Warning::IncompletePolicy { calendar, reason } => {
                write!(f, "{}: calendar '{}' skipped ({})", self.kind(), calendar, reason)
            }
        }
    }
}
