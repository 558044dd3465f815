//! Recurrence rules and their expansion.
//!
//! A [`RecurrenceSpec`] is either handed to the calendar service verbatim as an
//! RRULE ([`RecurrenceStrategy::Native`]) or expanded locally into discrete
//! occurrences ([`RecurrenceStrategy::Materialized`]).

use super::calendar_types::{EventDraft, EventTimeInterval};
use super::{CalendarError, InputField, Warning};
use chrono::{
    DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use log::warn;
use std::fmt;
use std::str::FromStr;

/// Hard limit on locally expanded occurrences of an open-ended rule
pub const DEFAULT_RECURRENCE_CAP: usize = 730;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_rrule(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_rrule())
    }
}

impl FromStr for Frequency {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            other => Err(CalendarError::invalid_format(
                InputField::RecurrenceFrequency,
                format!("unknown frequency '{}'", other),
            )),
        }
    }
}

/// How a recurrence ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// Exactly this many occurrences, the first included
    Count(u32),
    /// Occurrences starting on or before this local date
    Until(NaiveDate),
    /// Open-ended; bounded only by the expansion cap
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceSpec {
    frequency: Frequency,
    interval: u32,
    terminator: Terminator,
}

impl RecurrenceSpec {
    pub fn new(
        frequency: Frequency,
        interval: u32,
        terminator: Terminator,
    ) -> Result<Self, CalendarError> {
        if interval == 0 {
            return Err(CalendarError::invalid_format(
                InputField::RecurrenceInterval,
                "interval must be a positive integer",
            ));
        }
        if terminator == Terminator::Count(0) {
            return Err(CalendarError::invalid_format(
                InputField::RecurrenceCount,
                "count must be a positive integer",
            ));
        }
        Ok(Self { frequency, interval, terminator })
    }

    /// Build a spec from optional command-line style parts.
    /// At most one of `count` and `until` may be given.
    pub fn from_parts(
        frequency: Frequency,
        interval: Option<u32>,
        count: Option<u32>,
        until: Option<NaiveDate>,
    ) -> Result<Self, CalendarError> {
        let terminator = match (count, until) {
            (Some(_), Some(_)) => {
                return Err(CalendarError::invalid_format(
                    InputField::RecurrenceUntil,
                    "use either a count or an until date, not both",
                ))
            }
            (Some(n), None) => Terminator::Count(n),
            (None, Some(date)) => Terminator::Until(date),
            (None, None) => Terminator::Never,
        };
        Self::new(frequency, interval.unwrap_or(1), terminator)
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn terminator(&self) -> Terminator {
        self.terminator
    }

    /// Render as an RFC 5545 RRULE line.
    ///
    /// `UNTIL` is the last second of the until-date in `tz`, expressed in UTC.
    pub fn to_rrule(&self, tz: Tz) -> String {
        let mut rule = format!("RRULE:FREQ={}", self.frequency.as_rrule());
        if self.interval > 1 {
            rule.push_str(&format!(";INTERVAL={}", self.interval));
        }
        match self.terminator {
            Terminator::Count(n) => rule.push_str(&format!(";COUNT={}", n)),
            Terminator::Until(date) => {
                let until = end_of_day_utc(date, tz);
                rule.push_str(&format!(";UNTIL={}", until.format("%Y%m%dT%H%M%SZ")));
            }
            Terminator::Never => {}
        }
        rule
    }

    /// Parse an RRULE line produced by [`RecurrenceSpec::to_rrule`] (or by the
    /// calendar service). Unsupported parts such as `BYDAY` are rejected.
    pub fn parse_rrule(rule: &str, tz: Tz) -> Result<Self, CalendarError> {
        let body = rule.trim();
        let body = body.strip_prefix("RRULE:").unwrap_or(body);
        let invalid = |reason: String| CalendarError::invalid_format(InputField::RecurrenceInterval, reason);

        let mut frequency = None;
        let mut interval = None;
        let mut count = None;
        let mut until = None;
        for part in body.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| invalid(format!("malformed rule part '{}'", part)))?;
            match key {
                "FREQ" => frequency = Some(value.parse::<Frequency>()?),
                "INTERVAL" => {
                    interval = Some(
                        value
                            .parse::<u32>()
                            .map_err(|_| invalid(format!("bad INTERVAL '{}'", value)))?,
                    )
                }
                "COUNT" => {
                    count = Some(value.parse::<u32>().map_err(|_| {
                        CalendarError::invalid_format(
                            InputField::RecurrenceCount,
                            format!("bad COUNT '{}'", value),
                        )
                    })?)
                }
                "UNTIL" => until = Some(parse_until(value, tz)?),
                other => return Err(invalid(format!("unsupported rule part '{}'", other))),
            }
        }
        let frequency = frequency.ok_or_else(|| invalid("rule has no FREQ".to_string()))?;
        Self::from_parts(frequency, interval, count, until)
    }
}

impl fmt::Display for RecurrenceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "every {} x {}", self.interval, self.frequency)?;
        match self.terminator {
            Terminator::Count(n) => write!(f, ", {} times", n),
            Terminator::Until(date) => write!(f, ", until {}", date),
            Terminator::Never => write!(f, ", indefinitely"),
        }
    }
}

fn end_of_day_utc(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let last_second = date.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN));
    match tz.from_local_datetime(&last_second).latest() {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&last_second),
    }
}

fn parse_until(value: &str, tz: Tz) -> Result<NaiveDate, CalendarError> {
    let bad = || {
        CalendarError::invalid_format(InputField::RecurrenceUntil, format!("bad UNTIL '{}'", value))
    };
    if let Some(utc) = value.strip_suffix('Z') {
        let instant = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").map_err(|_| bad())?;
        return Ok(Utc.from_utc_datetime(&instant).with_timezone(&tz).date_naive());
    }
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map(|dt| dt.date()))
        .map_err(|_| bad())
}

/// Number of days in `month` (1-12) of `year`
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Move `date` forward by `months`, clamping the day to the last valid day of
/// the target month (Jan 31 + 1 month = Feb 28/29).
pub fn add_months_clamped(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    let zero_based = date.month0() as i64 + months as i64;
    let year = i32::try_from(date.year() as i64 + zero_based.div_euclid(12)).ok()?;
    let month = zero_based.rem_euclid(12) as u32 + 1;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Wall-clock time `steps` frequency units after `start`.
///
/// Each occurrence is computed from the anchor rather than from the previous
/// occurrence, so clamping never accumulates: Jan 31 monthly gives Feb 29
/// then Mar 31.
pub fn advance(start: NaiveDateTime, frequency: Frequency, steps: u32) -> Option<NaiveDateTime> {
    let date = match frequency {
        Frequency::Daily => start.date().checked_add_days(Days::new(steps as u64))?,
        Frequency::Weekly => start.date().checked_add_days(Days::new(steps as u64 * 7))?,
        Frequency::Monthly => add_months_clamped(start.date(), steps)?,
        Frequency::Yearly => add_months_clamped(start.date(), steps.checked_mul(12)?)?,
    };
    Some(date.and_time(start.time()))
}

/// Lazy sequence of occurrences of a recurring event.
///
/// Every occurrence keeps the first instance's local wall-clock start and its
/// duration. A start that falls in a daylight-saving gap moves one hour later.
#[derive(Debug, Clone)]
pub struct Occurrences {
    first: EventTimeInterval,
    anchor: NaiveDateTime,
    duration: Duration,
    spec: RecurrenceSpec,
    cap: usize,
    produced: usize,
    cap_reached: bool,
    done: bool,
}

impl Occurrences {
    pub fn new(spec: RecurrenceSpec, first: EventTimeInterval, cap: usize) -> Self {
        Self {
            first,
            anchor: first.start().naive_local(),
            duration: first.duration(),
            spec,
            cap,
            produced: 0,
            cap_reached: false,
            done: false,
        }
    }

    /// True once iteration stopped at the cap while more occurrences remained
    pub fn cap_reached(&self) -> bool {
        self.cap_reached
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    fn finish(&mut self) -> Option<EventTimeInterval> {
        self.done = true;
        None
    }
}

impl Iterator for Occurrences {
    type Item = EventTimeInterval;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Terminator::Count(n) = self.spec.terminator {
            if self.produced >= n as usize {
                return self.finish();
            }
        }

        let steps = match u32::try_from(self.produced)
            .ok()
            .and_then(|k| k.checked_mul(self.spec.interval))
        {
            Some(steps) => steps,
            None => return self.finish(),
        };
        let Some(candidate) = advance(self.anchor, self.spec.frequency, steps) else {
            return self.finish();
        };
        if let Terminator::Until(until) = self.spec.terminator {
            if candidate.date() > until {
                return self.finish();
            }
        }
        if self.spec.terminator == Terminator::Never && self.produced >= self.cap {
            self.cap_reached = true;
            return self.finish();
        }

        let occurrence = if self.produced == 0 {
            self.first
        } else {
            let tz = self.first.timezone();
            let start = tz
                .from_local_datetime(&candidate)
                .earliest()
                .or_else(|| tz.from_local_datetime(&(candidate + Duration::hours(1))).earliest());
            match start.and_then(|s| EventTimeInterval::new(s, s + self.duration).ok()) {
                Some(interval) => interval,
                None => return self.finish(),
            }
        };
        self.produced += 1;
        Some(occurrence)
    }
}

/// Which side expands a recurrence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecurrenceStrategy {
    /// Send the rule to the calendar service as an RRULE
    #[default]
    Native,
    /// Expand locally into individual events; open-ended rules stop after `cap`
    Materialized { cap: usize },
}

#[derive(Debug, Clone)]
pub enum RecurrenceResult {
    Native { first: EventTimeInterval, spec: RecurrenceSpec },
    Materialized(Occurrences),
}

impl RecurrenceResult {
    /// Turn the result into drafts cloned from `template`.
    ///
    /// Native mode yields one draft carrying the rule; materialized mode
    /// yields one draft per occurrence plus a cap warning when expansion was
    /// cut short.
    pub fn into_drafts(self, template: &EventDraft) -> (Vec<EventDraft>, Option<Warning>) {
        match self {
            RecurrenceResult::Native { first, spec } => {
                (vec![template.rescheduled(first).with_recurrence(Some(spec))], None)
            }
            RecurrenceResult::Materialized(mut occurrences) => {
                let drafts: Vec<EventDraft> =
                    occurrences.by_ref().map(|interval| template.rescheduled(interval)).collect();
                let warning = occurrences.cap_reached().then(|| {
                    let warning = Warning::RecurrenceCapReached { cap: occurrences.cap() };
                    warn!("{}", warning);
                    warning
                });
                (drafts, warning)
            }
        }
    }
}

/// Expand `spec` starting at `first` according to `strategy`
pub fn expand(
    strategy: RecurrenceStrategy,
    spec: RecurrenceSpec,
    first: EventTimeInterval,
) -> Result<RecurrenceResult, CalendarError> {
    if let Terminator::Until(until) = spec.terminator() {
        let first_date = first.start().date_naive();
        if until < first_date {
            return Err(CalendarError::invalid_format(
                InputField::RecurrenceUntil,
                format!("until date {} is before the first occurrence on {}", until, first_date),
            ));
        }
    }
    Ok(match strategy {
        RecurrenceStrategy::Native => RecurrenceResult::Native { first, spec },
        RecurrenceStrategy::Materialized { cap } => {
            RecurrenceResult::Materialized(Occurrences::new(spec, first, cap))
        }
    })
}
