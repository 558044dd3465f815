//! Typed event records shared by every producer and the composer.

use super::calendar_validation::validate_summary;
use super::recurrence::RecurrenceSpec;
use super::CalendarError;
use chrono::{DateTime, Duration};
use chrono_tz::Tz;

/// A validated, localized start/end pair with `end > start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTimeInterval {
    start: DateTime<Tz>,
    end: DateTime<Tz>,
}

impl EventTimeInterval {
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> Result<Self, CalendarError> {
        if end <= start {
            return Err(CalendarError::InvalidInterval {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Tz> {
        self.start
    }

    pub fn end(&self) -> DateTime<Tz> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn timezone(&self) -> Tz {
        self.start.timezone()
    }
}

/// A fully-specified, not-yet-submitted event record.
///
/// Drafts are built once by a producer (validator, template resolver, CSV
/// pipeline, recurrence expander) and consumed by the composer.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    summary: String,
    interval: EventTimeInterval,
    description: Option<String>,
    color_id: Option<String>,
    calendar_id: Option<String>,
    recurrence: Option<RecurrenceSpec>,
}

impl EventDraft {
    pub fn new(summary: &str, interval: EventTimeInterval) -> Result<Self, CalendarError> {
        Ok(Self {
            summary: validate_summary(summary)?,
            interval,
            description: None,
            color_id: None,
            calendar_id: None,
            recurrence: None,
        })
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn with_color(mut self, color_id: Option<String>) -> Self {
        self.color_id = color_id.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_calendar(mut self, calendar_id: Option<String>) -> Self {
        self.calendar_id = calendar_id.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_recurrence(mut self, recurrence: Option<RecurrenceSpec>) -> Self {
        self.recurrence = recurrence;
        self
    }

    /// Same event moved to another time slot, used for materialized occurrences
    pub(crate) fn rescheduled(&self, interval: EventTimeInterval) -> Self {
        Self { interval, recurrence: None, ..self.clone() }
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn interval(&self) -> &EventTimeInterval {
        &self.interval
    }

    pub fn start(&self) -> DateTime<Tz> {
        self.interval.start()
    }

    pub fn end(&self) -> DateTime<Tz> {
        self.interval.end()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn color_id(&self) -> Option<&str> {
        self.color_id.as_deref()
    }

    pub fn calendar_id(&self) -> Option<&str> {
        self.calendar_id.as_deref()
    }

    pub fn recurrence(&self) -> Option<&RecurrenceSpec> {
        self.recurrence.as_ref()
    }
}

/// User overrides layered on top of a template; present fields win
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialEventDraft {
    pub summary: Option<String>,
    pub start: Option<DateTime<Tz>>,
    pub end: Option<DateTime<Tz>>,
    pub description: Option<String>,
    pub color_id: Option<String>,
    pub calendar_id: Option<String>,
    pub recurrence: Option<RecurrenceSpec>,
}

impl PartialEventDraft {
    pub fn starting_at(start: DateTime<Tz>) -> Self {
        Self { start: Some(start), ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::InputField;
    use chrono::TimeZone;
    use chrono_tz::America::Chicago;

    fn at(h: u32) -> DateTime<Tz> {
        Chicago.with_ymd_and_hms(2024, 6, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_interval_requires_end_after_start() {
        assert!(EventTimeInterval::new(at(10), at(11)).is_ok());
        assert!(matches!(
            EventTimeInterval::new(at(10), at(10)),
            Err(CalendarError::InvalidInterval { .. })
        ));
        assert!(matches!(
            EventTimeInterval::new(at(11), at(10)),
            Err(CalendarError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn test_draft_rejects_blank_summary() {
        let interval = EventTimeInterval::new(at(10), at(11)).unwrap();
        let err = EventDraft::new("   ", interval).unwrap_err();
        assert_eq!(err.field(), Some(InputField::Summary));
    }

    #[test]
    fn test_draft_drops_blank_optional_fields() {
        let interval = EventTimeInterval::new(at(10), at(11)).unwrap();
        let draft = EventDraft::new(" Standup ", interval)
            .unwrap()
            .with_description(Some("  ".to_string()))
            .with_calendar(Some("work@example.com".to_string()));
        assert_eq!(draft.summary(), "Standup");
        assert_eq!(draft.description(), None);
        assert_eq!(draft.calendar_id(), Some("work@example.com"));
    }
}
