//! Validation functions for calendar event input.
//
// Dates are `YYYY-MM-DD`, times `HH:MM:SS`. Naive values are localized in the
// configured default timezone before any comparison.

use super::calendar_types::{EventDraft, EventTimeInterval};
use super::{CalendarError, InputField};
use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is a valid regex"));
static TIME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):[0-5]\d:[0-5]\d$").expect("time pattern is a valid regex")
});

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(field: InputField, value: &str) -> Result<NaiveDate, CalendarError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CalendarError::invalid_format(field, "missing value"));
    }
    if !DATE_PATTERN.is_match(value) {
        return Err(CalendarError::invalid_format(
            field,
            format!("'{}' is not in YYYY-MM-DD format", value),
        ));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        CalendarError::invalid_format(field, format!("'{}' is not a calendar date", value))
    })
}

/// Parse an `HH:MM:SS` time of day
pub fn parse_time(field: InputField, value: &str) -> Result<NaiveTime, CalendarError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CalendarError::invalid_format(field, "missing value"));
    }
    if !TIME_PATTERN.is_match(value) {
        return Err(CalendarError::invalid_format(
            field,
            format!("'{}' is not in HH:MM:SS format", value),
        ));
    }
    NaiveTime::parse_from_str(value, "%H:%M:%S").map_err(|_| {
        CalendarError::invalid_format(field, format!("'{}' is not a time of day", value))
    })
}

/// Attach the timezone to a wall-clock time.
///
/// Ambiguous times (the repeated hour when clocks fall back) resolve to the
/// earlier instant. Times inside a spring-forward gap do not exist and are
/// rejected.
pub fn localize(
    field: InputField,
    naive: NaiveDateTime,
    tz: Tz,
) -> Result<DateTime<Tz>, CalendarError> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => {
            debug!("{} is ambiguous in {}, using the earlier instant", naive, tz);
            Ok(earliest)
        }
        LocalResult::None => Err(CalendarError::invalid_format(
            field,
            format!("{} does not exist in {} (daylight saving gap)", naive, tz),
        )),
    }
}

/// Parse and localize one date/time pair
pub fn parse_date_time(
    date_field: InputField,
    time_field: InputField,
    date: &str,
    time: &str,
    tz: Tz,
) -> Result<DateTime<Tz>, CalendarError> {
    let date = parse_date(date_field, date)?;
    let time = parse_time(time_field, time)?;
    localize(time_field, date.and_time(time), tz)
}

/// Validate raw start/end strings into a localized interval with `end > start`
pub fn validate_interval(
    start_date: &str,
    start_time: &str,
    end_date: &str,
    end_time: &str,
    tz: Tz,
) -> Result<EventTimeInterval, CalendarError> {
    let start =
        parse_date_time(InputField::StartDate, InputField::StartTime, start_date, start_time, tz)?;
    let end = parse_date_time(InputField::EndDate, InputField::EndTime, end_date, end_time, tz)?;
    EventTimeInterval::new(start, end)
}

/// Validate a summary: trimmed, non-empty
pub fn validate_summary(summary: &str) -> Result<String, CalendarError> {
    let trimmed = summary.trim();
    if trimmed.is_empty() {
        return Err(CalendarError::invalid_format(InputField::Summary, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Parse a slot of the form `START_DATE START_TIME END_DATE END_TIME`
pub fn parse_slot(slot: &str, tz: Tz) -> Result<EventTimeInterval, CalendarError> {
    let parts: Vec<&str> = slot.split_whitespace().collect();
    match parts.as_slice() {
        [start_date, start_time, end_date, end_time] => {
            validate_interval(start_date, start_time, end_date, end_time, tz)
        }
        _ => Err(CalendarError::invalid_format(
            InputField::Slot,
            format!(
                "'{}' must be 'YYYY-MM-DD HH:MM:SS YYYY-MM-DD HH:MM:SS'",
                slot.trim()
            ),
        )),
    }
}

/// Parse an event entry of the form `SUMMARY|START_DATE START_TIME END_DATE END_TIME`
pub fn parse_event_entry(entry: &str, tz: Tz) -> Result<EventDraft, CalendarError> {
    let Some((summary, slot)) = entry.split_once('|') else {
        return Err(CalendarError::invalid_format(
            InputField::Entry,
            format!(
                "'{}' must be 'SUMMARY|YYYY-MM-DD HH:MM:SS YYYY-MM-DD HH:MM:SS'",
                entry.trim()
            ),
        ));
    };
    let summary = validate_summary(summary)?;
    EventDraft::new(&summary, parse_slot(slot, tz)?)
}

/// Turn an inclusive day range into UTC bounds: `from` at the start of its
/// day, `to` at the start of the following day.
pub fn validate_date_range(
    from: Option<&str>,
    to: Option<&str>,
    tz: Tz,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), CalendarError> {
    let from = from.map(|d| parse_date(InputField::SearchFrom, d)).transpose()?;
    let to = to.map(|d| parse_date(InputField::SearchTo, d)).transpose()?;

    if let (Some(from), Some(to)) = (from, to) {
        if to < from {
            return Err(CalendarError::InvalidInterval {
                start: from.to_string(),
                end: to.to_string(),
            });
        }
    }

    let time_min = from
        .map(|d| start_of_day(InputField::SearchFrom, d, tz))
        .transpose()?;
    let time_max = to
        .map(|d| {
            d.checked_add_days(Days::new(1))
                .ok_or_else(|| CalendarError::invalid_format(InputField::SearchTo, "out of range"))
                .and_then(|next| start_of_day(InputField::SearchTo, next, tz))
        })
        .transpose()?;
    Ok((time_min, time_max))
}

fn start_of_day(field: InputField, date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, CalendarError> {
    let midnight = date.and_time(NaiveTime::MIN);
    // Some zones skip midnight on DST days; the first valid instant of the day follows an hour later.
    let local = localize(field, midnight, tz)
        .or_else(|_| localize(field, midnight + chrono::Duration::hours(1), tz))?;
    Ok(local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::America::Chicago;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn test_valid_interval_matches_input() {
        let interval =
            validate_interval("2024-06-01", "10:00:00", "2024-06-01", "11:30:00", Chicago).unwrap();
        assert_eq!(interval.start().to_rfc3339(), "2024-06-01T10:00:00-05:00");
        assert_eq!(interval.end().to_rfc3339(), "2024-06-01T11:30:00-05:00");
        assert_eq!(interval.duration(), chrono::Duration::minutes(90));
    }

    #[test]
    fn test_interval_may_span_days() {
        let interval =
            validate_interval("2024-12-31", "23:00:00", "2025-01-01", "01:00:00", Chicago).unwrap();
        assert_eq!(interval.duration(), chrono::Duration::hours(2));
    }

    #[test_case("2024-06-01", "10:00:00", "2024-06-01", "10:00:00" ; "zero length")]
    #[test_case("2024-06-01", "10:00:00", "2024-06-01", "09:59:59" ; "end before start")]
    #[test_case("2024-06-02", "00:00:00", "2024-06-01", "23:00:00" ; "end on earlier day")]
    fn test_end_not_after_start_is_invalid_interval(sd: &str, st: &str, ed: &str, et: &str) {
        let err = validate_interval(sd, st, ed, et, Chicago).unwrap_err();
        assert!(matches!(err, CalendarError::InvalidInterval { .. }), "{:?}", err);
    }

    #[test_case("2024/06/01", "10:00:00", InputField::StartDate ; "slashes in date")]
    #[test_case("2024-6-1", "10:00:00", InputField::StartDate ; "unpadded date")]
    #[test_case("2024-02-30", "10:00:00", InputField::StartDate ; "impossible day")]
    #[test_case("2024-13-01", "10:00:00", InputField::StartDate ; "impossible month")]
    #[test_case("", "10:00:00", InputField::StartDate ; "missing date")]
    #[test_case("2024-06-01", "10:00", InputField::StartTime ; "time without seconds")]
    #[test_case("2024-06-01", "24:00:00", InputField::StartTime ; "hour out of range")]
    #[test_case("2024-06-01", "10:60:00", InputField::StartTime ; "minute out of range")]
    #[test_case("2024-06-01", "7pm", InputField::StartTime ; "free text time")]
    fn test_malformed_start_reports_field(date: &str, time: &str, field: InputField) {
        let err = validate_interval(date, time, "2024-06-02", "10:00:00", Chicago).unwrap_err();
        assert_eq!(err.field(), Some(field));
        assert_eq!(err.kind(), crate::calendar::ErrorKind::InvalidFormat);
    }

    #[test]
    fn test_malformed_end_reports_end_field() {
        let err = validate_interval("2024-06-01", "10:00:00", "2024-06-01", "1100", Chicago)
            .unwrap_err();
        assert_eq!(err.field(), Some(InputField::EndTime));
    }

    #[test]
    fn test_dst_gap_is_rejected() {
        // 2024-03-10 02:30 does not exist in Chicago
        let err = validate_interval("2024-03-10", "02:30:00", "2024-03-10", "04:00:00", Chicago)
            .unwrap_err();
        assert_eq!(err.field(), Some(InputField::StartTime));
    }

    #[test]
    fn test_ambiguous_time_uses_earlier_instant() {
        // 2024-11-03 01:30 happens twice in Chicago; CDT (-05:00) comes first
        let interval =
            validate_interval("2024-11-03", "01:30:00", "2024-11-03", "03:00:00", Chicago).unwrap();
        assert_eq!(interval.start().to_rfc3339(), "2024-11-03T01:30:00-05:00");
    }

    #[test]
    fn test_parse_slot() {
        let interval = parse_slot("2024-06-01 10:00:00 2024-06-01 13:00:00", Chicago).unwrap();
        assert_eq!(interval.start().hour(), 10);
        let err = parse_slot("2024-06-01 10:00:00", Chicago).unwrap_err();
        assert_eq!(err.field(), Some(InputField::Slot));
    }

    #[test]
    fn test_event_entry_carries_its_own_summary_and_times() {
        let draft =
            parse_event_entry(" Twins vs Yankees | 2024-06-01 10:00:00 2024-06-01 13:00:00", Chicago)
                .unwrap();
        assert_eq!(draft.summary(), "Twins vs Yankees");
        assert_eq!(draft.start().to_rfc3339(), "2024-06-01T10:00:00-05:00");
        assert_eq!(draft.end().to_rfc3339(), "2024-06-01T13:00:00-05:00");
    }

    #[test_case("Twins vs Yankees 2024-06-01 10:00:00 2024-06-01 13:00:00", Some(InputField::Entry) ; "missing separator")]
    #[test_case(" |2024-06-01 10:00:00 2024-06-01 13:00:00", Some(InputField::Summary) ; "blank summary")]
    #[test_case("Game|2024-06-01 10:00:00", Some(InputField::Slot) ; "incomplete slot")]
    #[test_case("Game|2024-06-01 13:00:00 2024-06-01 10:00:00", None ; "reversed times")]
    fn test_bad_event_entry(entry: &str, field: Option<InputField>) {
        let err = parse_event_entry(entry, Chicago).unwrap_err();
        assert_eq!(err.field(), field);
    }

    #[test]
    fn test_validate_summary() {
        assert_eq!(validate_summary("  Standup ").unwrap(), "Standup");
        assert!(validate_summary("   ").is_err());
    }

    #[test]
    fn test_date_range_is_inclusive_of_whole_days() {
        let (min, max) =
            validate_date_range(Some("2024-06-01"), Some("2024-06-02"), Chicago).unwrap();
        assert_eq!(min.unwrap().to_rfc3339(), "2024-06-01T05:00:00+00:00");
        assert_eq!(max.unwrap().to_rfc3339(), "2024-06-03T05:00:00+00:00");
    }

    #[test]
    fn test_date_range_rejects_reversed_bounds() {
        let err = validate_date_range(Some("2024-06-02"), Some("2024-06-01"), Chicago).unwrap_err();
        assert!(matches!(err, CalendarError::InvalidInterval { .. }));
        assert_eq!(validate_date_range(None, None, Chicago).unwrap(), (None, None));
    }
}
