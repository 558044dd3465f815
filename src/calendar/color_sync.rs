//! Calendar color policy and event color reconciliation.
//!
//! Planning is pure: [`plan_color_sync`] compares each event's color id with
//! the one the policy assigns to its calendar and lists the updates needed.
//! The composer executes the plan and turns the results into a [`SyncReport`].

use super::{CalendarError, ErrorKind, InputField, Warning};
use crate::services::{CalendarInfo, RemoteEvent};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

static HEX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#?[0-9a-fA-F]{6}$").expect("hex pattern is a valid regex"));

/// `#rrggbb`, normalized to lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HexColor(String);

impl HexColor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for HexColor {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !HEX_PATTERN.is_match(s) {
            return Err(CalendarError::invalid_format(
                InputField::Color,
                format!("'{}' is not a #rrggbb color", s),
            ));
        }
        Ok(HexColor(format!("#{}", s.trim_start_matches('#').to_ascii_lowercase())))
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a calendar has no usable color id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyGap {
    NoDeclaredColor,
    UnmappedColor(HexColor),
}

impl fmt::Display for PolicyGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyGap::NoDeclaredColor => write!(f, "no color declared for this calendar"),
            PolicyGap::UnmappedColor(hex) => write!(f, "color {} has no color id mapping", hex),
        }
    }
}

/// Calendar (id or name) to hex color, and hex color to provider color id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarColorPolicy {
    calendars: BTreeMap<String, HexColor>,
    color_ids: BTreeMap<HexColor, String>,
}

impl CalendarColorPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_calendar(mut self, calendar: impl Into<String>, color: HexColor) -> Self {
        self.calendars.insert(calendar.into(), color);
        self
    }

    pub fn with_color_id(mut self, color: HexColor, color_id: impl Into<String>) -> Self {
        self.color_ids.insert(color, color_id.into());
        self
    }

    /// Build from raw string maps, rejecting malformed hex colors
    pub fn from_maps(
        calendars: &BTreeMap<String, String>,
        color_ids: &BTreeMap<String, String>,
    ) -> Result<Self, CalendarError> {
        let mut policy = Self::new();
        for (calendar, hex) in calendars {
            policy = policy.with_calendar(calendar.trim(), hex.parse()?);
        }
        for (hex, color_id) in color_ids {
            policy = policy.with_color_id(hex.parse()?, color_id.trim());
        }
        Ok(policy)
    }

    /// Declared color of a calendar, looked up by id first and then by name
    pub fn declared_color(&self, calendar: &CalendarInfo) -> Option<&HexColor> {
        self.calendars
            .get(&calendar.id)
            .or_else(|| self.calendars.get(calendar.name()))
    }

    pub fn color_id_for(&self, color: &HexColor) -> Option<&str> {
        self.color_ids.get(color).map(String::as_str)
    }

    /// The color id every event of `calendar` should carry
    pub fn resolve(&self, calendar: &CalendarInfo) -> Result<&str, PolicyGap> {
        let color = self.declared_color(calendar).ok_or(PolicyGap::NoDeclaredColor)?;
        self.color_id_for(color)
            .ok_or_else(|| PolicyGap::UnmappedColor(color.clone()))
    }

    /// Calendar keys as written in the configuration
    pub fn calendar_keys(&self) -> impl Iterator<Item = &str> {
        self.calendars.keys().map(String::as_str)
    }

    /// Configured calendars whose color has no id mapping
    pub fn incomplete_calendars(&self) -> Vec<Warning> {
        self.calendars
            .iter()
            .filter(|(_, color)| !self.color_ids.contains_key(*color))
            .map(|(calendar, color)| Warning::IncompletePolicy {
                calendar: calendar.clone(),
                reason: PolicyGap::UnmappedColor(color.clone()),
            })
            .collect()
    }
}

/// One `set_color(event_id, color_id)` action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorUpdate {
    pub event_id: String,
    pub summary: String,
    pub current: Option<String>,
    pub color_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPlan {
    Skipped {
        calendar_id: String,
        warning: Warning,
    },
    Planned {
        calendar_id: String,
        color_id: String,
        /// Events to recolor, ordered by event id
        updates: Vec<ColorUpdate>,
        /// Ids of events already carrying the right color, ordered
        already_correct: Vec<String>,
    },
}

impl SyncPlan {
    pub fn calendar_id(&self) -> &str {
        match self {
            SyncPlan::Skipped { calendar_id, .. } | SyncPlan::Planned { calendar_id, .. } => {
                calendar_id
            }
        }
    }

    pub fn updates(&self) -> &[ColorUpdate] {
        match self {
            SyncPlan::Skipped { .. } => &[],
            SyncPlan::Planned { updates, .. } => updates,
        }
    }
}

/// Compare every live event of `calendar` with the color its policy assigns.
/// Cancelled events and events without an id are ignored.
pub fn plan_color_sync(
    calendar: &CalendarInfo,
    policy: &CalendarColorPolicy,
    events: &[RemoteEvent],
) -> SyncPlan {
    let color_id = match policy.resolve(calendar) {
        Ok(color_id) => color_id.to_string(),
        Err(reason) => {
            return SyncPlan::Skipped {
                calendar_id: calendar.id.clone(),
                warning: Warning::IncompletePolicy { calendar: calendar.name().to_string(), reason },
            }
        }
    };

    let mut updates = Vec::new();
    let mut already_correct = Vec::new();
    for event in events.iter().filter(|e| !e.is_cancelled() && !e.id.is_empty()) {
        if event.color_id.as_deref() == Some(color_id.as_str()) {
            already_correct.push(event.id.clone());
        } else {
            updates.push(ColorUpdate {
                event_id: event.id.clone(),
                summary: event.display_summary().to_string(),
                current: event.color_id.clone(),
                color_id: color_id.clone(),
            });
        }
    }
    updates.sort_by(|a, b| a.event_id.cmp(&b.event_id));
    already_correct.sort();

    SyncPlan::Planned { calendar_id: calendar.id.clone(), color_id, updates, already_correct }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSyncOutcome {
    Updated,
    AlreadyCorrect,
    Failed(CalendarError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSyncResult {
    pub event_id: String,
    pub outcome: EventSyncOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Skipped(Warning),
    /// Per-event outcomes ordered by event id
    Completed(Vec<EventSyncResult>),
}

/// Outcome of synchronizing one calendar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub calendar_id: String,
    pub status: SyncStatus,
    pub cancelled: bool,
    /// Planned updates never attempted because of cancellation
    pub not_started: usize,
}

impl SyncReport {
    pub fn skipped(calendar_id: impl Into<String>, warning: Warning) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            status: SyncStatus::Skipped(warning),
            cancelled: false,
            not_started: 0,
        }
    }

    fn results(&self) -> &[EventSyncResult] {
        match &self.status {
            SyncStatus::Skipped(_) => &[],
            SyncStatus::Completed(results) => results,
        }
    }

    fn count(&self, pred: impl Fn(&EventSyncOutcome) -> bool) -> usize {
        self.results().iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, EventSyncOutcome::Updated))
    }

    pub fn already_correct(&self) -> usize {
        self.count(|o| matches!(o, EventSyncOutcome::AlreadyCorrect))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, EventSyncOutcome::Failed(_)))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, SyncStatus::Skipped(_))
    }

    /// `INCOMPLETE_POLICY` for a skipped calendar, `PARTIAL_BATCH_FAILURE`
    /// when any event failed
    pub fn kind(&self) -> Option<ErrorKind> {
        match &self.status {
            SyncStatus::Skipped(warning) => Some(warning.kind()),
            SyncStatus::Completed(_) if self.failed() > 0 => Some(ErrorKind::PartialBatchFailure),
            SyncStatus::Completed(_) => None,
        }
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            SyncStatus::Skipped(warning) => write!(f, "{}: {}", self.calendar_id, warning),
            SyncStatus::Completed(_) => {
                write!(
                    f,
                    "{}: {} updated, {} already correct, {} failed",
                    self.calendar_id,
                    self.updated(),
                    self.already_correct(),
                    self.failed()
                )?;
                if self.cancelled {
                    write!(f, " (cancelled, {} not started)", self.not_started)?;
                }
                Ok(())
            }
        }
    }
}
