//! In-memory calendar service shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::TimeZone;
use chrono_tz::{America::Chicago, Tz};
use gcal_manager::calendar::{
    validate_interval, CalendarColorPolicy, ComposerSettings, EventComposer, EventDraft,
    RetryPolicy,
};
use gcal_manager::services::{
    CalendarInfo, CalendarService, EventPatch, EventPayload, EventQuery, NewCalendar, RemoteEvent,
    ServiceError,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct State {
    calendars: Vec<CalendarInfo>,
    events: BTreeMap<String, Vec<RemoteEvent>>,
    calls: Vec<String>,
    queued: HashMap<&'static str, VecDeque<ServiceError>>,
    always: HashMap<&'static str, ServiceError>,
    failing_summaries: HashMap<String, ServiceError>,
    failing_updates: HashMap<String, ServiceError>,
    next_id: usize,
}

/// Records every call and fails on request
#[derive(Default)]
pub struct MockCalendarService {
    state: Mutex<State>,
    cancel_on_create: Mutex<Option<CancellationToken>>,
}

impl MockCalendarService {
    pub fn with_calendars(calendars: Vec<CalendarInfo>) -> Self {
        let service = Self::default();
        service.state.lock().unwrap().calendars = calendars;
        service
    }

    pub fn add_event(&self, calendar_id: &str, id: &str, summary: &str, color_id: Option<&str>) {
        let event = RemoteEvent {
            id: id.to_string(),
            summary: summary.to_string(),
            description: None,
            start: None,
            end: None,
            color_id: color_id.map(str::to_string),
            html_link: None,
            recurrence: Vec::new(),
            status: Some("confirmed".to_string()),
        };
        self.push_event(calendar_id, event);
    }

    pub fn push_event(&self, calendar_id: &str, event: RemoteEvent) {
        let mut state = self.state.lock().unwrap();
        state.events.entry(calendar_id.to_string()).or_default().push(event);
    }

    /// Fail the next call of `operation` with each of `errors` in turn
    pub fn queue_failures(&self, operation: &'static str, errors: Vec<ServiceError>) {
        self.state.lock().unwrap().queued.entry(operation).or_default().extend(errors);
    }

    /// Fail every call of `operation`
    pub fn fail_always(&self, operation: &'static str, error: ServiceError) {
        self.state.lock().unwrap().always.insert(operation, error);
    }

    pub fn fail_summary(&self, summary: &str, error: ServiceError) {
        self.state.lock().unwrap().failing_summaries.insert(summary.to_string(), error);
    }

    pub fn fail_update(&self, event_id: &str, error: ServiceError) {
        self.state.lock().unwrap().failing_updates.insert(event_id.to_string(), error);
    }

    /// Cancel `token` as soon as the first event creation starts
    pub fn cancel_on_first_create(&self, token: CancellationToken) {
        *self.cancel_on_create.lock().unwrap() = Some(token);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| c.split(' ').next() == Some(operation)).count()
    }

    pub fn events(&self, calendar_id: &str) -> Vec<RemoteEvent> {
        self.state.lock().unwrap().events.get(calendar_id).cloned().unwrap_or_default()
    }

    fn enter(&self, operation: &'static str, detail: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{} {}", operation, detail));
        if let Some(error) = state.always.get(operation) {
            return Err(error.clone());
        }
        match state.queued.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CalendarService for MockCalendarService {
    async fn list_calendars(&self) -> Result<Vec<CalendarInfo>, ServiceError> {
        self.enter("list_calendars", "")?;
        Ok(self.state.lock().unwrap().calendars.clone())
    }

    async fn get_calendar(&self, calendar_id: &str) -> Result<CalendarInfo, ServiceError> {
        self.enter("get_calendar", calendar_id)?;
        let state = self.state.lock().unwrap();
        state
            .calendars
            .iter()
            .find(|c| c.id == calendar_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(calendar_id.to_string()))
    }

    async fn create_calendar(&self, calendar: &NewCalendar) -> Result<CalendarInfo, ServiceError> {
        self.enter("create_calendar", &calendar.summary)?;
        let mut state = self.state.lock().unwrap();
        let id = format!("{}@group.calendar.test", calendar.summary.to_lowercase().replace(' ', "-"));
        let info = CalendarInfo {
            time_zone: Some(calendar.time_zone.clone()),
            ..CalendarInfo::new(id, calendar.summary.clone())
        };
        state.calendars.push(info.clone());
        Ok(info)
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        event: &EventPayload,
    ) -> Result<RemoteEvent, ServiceError> {
        let token = self.cancel_on_create.lock().unwrap().take();
        if let Some(token) = token {
            token.cancel();
        }
        self.enter("create_event", &event.summary)?;
        tokio::time::sleep(Duration::from_millis(1)).await;

        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.failing_summaries.get(&event.summary) {
            return Err(error.clone());
        }
        state.next_id += 1;
        let id = format!("evt{:03}", state.next_id);
        let created = RemoteEvent {
            id: id.clone(),
            summary: event.summary.clone(),
            description: event.description.clone(),
            start: Some(event.start.clone()),
            end: Some(event.end.clone()),
            color_id: event.color_id.clone(),
            html_link: Some(format!("https://calendar.test/event/{}", id)),
            recurrence: event.recurrence.clone(),
            status: Some("confirmed".to_string()),
        };
        state.events.entry(calendar_id.to_string()).or_default().push(created.clone());
        Ok(created)
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<RemoteEvent, ServiceError> {
        self.enter("update_event", event_id)?;
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.failing_updates.get(event_id) {
            return Err(error.clone());
        }
        let event = state
            .events
            .get_mut(calendar_id)
            .and_then(|events| events.iter_mut().find(|e| e.id == event_id))
            .ok_or_else(|| ServiceError::NotFound(event_id.to_string()))?;
        if let Some(summary) = &patch.summary {
            event.summary = summary.clone();
        }
        if let Some(description) = &patch.description {
            event.description = Some(description.clone());
        }
        if let Some(start) = &patch.start {
            event.start = Some(start.clone());
        }
        if let Some(end) = &patch.end {
            event.end = Some(end.clone());
        }
        if let Some(color_id) = &patch.color_id {
            event.color_id = Some(color_id.clone());
        }
        Ok(event.clone())
    }

    async fn search_events(
        &self,
        calendar_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<RemoteEvent>, ServiceError> {
        self.enter("search_events", calendar_id)?;
        let text = query.text.clone().unwrap_or_default().to_lowercase();
        Ok(self
            .events(calendar_id)
            .into_iter()
            .filter(|e| e.summary.to_lowercase().contains(&text))
            .collect())
    }

    async fn list_events(&self, calendar_id: &str) -> Result<Vec<RemoteEvent>, ServiceError> {
        self.enter("list_events", calendar_id)?;
        Ok(self.events(calendar_id))
    }
}

pub fn calendar(id: &str, name: &str) -> CalendarInfo {
    CalendarInfo::new(id, name)
}

pub fn primary(id: &str, name: &str) -> CalendarInfo {
    CalendarInfo { primary: true, ..CalendarInfo::new(id, name) }
}

/// Composer settings with near-zero backoff
pub fn fast_settings(workers: usize) -> ComposerSettings {
    ComposerSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            timeout: Duration::from_secs(5),
        },
        workers,
        ..ComposerSettings::default()
    }
}

pub fn composer(
    service: Arc<MockCalendarService>,
    policy: CalendarColorPolicy,
    workers: usize,
) -> EventComposer {
    EventComposer::new(service, fast_settings(workers), policy)
}

pub const TZ: Tz = Chicago;

pub fn draft(summary: &str, day: u32) -> EventDraft {
    let date = format!("2024-06-{:02}", day);
    let interval = validate_interval(&date, "10:00:00", &date, "11:00:00", TZ).unwrap();
    EventDraft::new(summary, interval).unwrap()
}

pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> chrono::DateTime<Tz> {
    TZ.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}
