//! Event composer: the single path from drafts to the calendar service.
//
// Every service call goes through `with_retry`, which applies the per-call
// timeout and retries transient failures with exponential backoff. Batches run
// on a bounded pool, check the cancellation token before each item, and are
// reported in input order.

use super::calendar_types::EventDraft;
use super::color_sync::{
    plan_color_sync, CalendarColorPolicy, EventSyncOutcome, EventSyncResult, PolicyGap,
    SyncPlan, SyncReport, SyncStatus,
};
use super::{CalendarError, ErrorKind, Warning};
use crate::services::{
    CalendarInfo, CalendarService, EventDateTime, EventPatch, EventPayload, EventQuery,
    NewCalendar, ReminderMethod, ReminderOverride, Reminders, RemoteEvent, ServiceError,
};
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CALENDAR: &str = "primary";

/// Bounded exponential backoff for transient service failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Limit on a single call, retries not included
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based): `initial * 2^(attempt-1)`, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Run `call` until it succeeds, fails permanently, or runs out of attempts
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout(policy.timeout)),
        };
        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    operation, attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    error!("{} failed after {} attempts: {}", operation, attempt, e);
                } else {
                    debug!("{} failed permanently: {}", operation, e);
                }
                return Err(e);
            }
        }
    }
}

/// Find a calendar by id, by `primary`, or by exact name.
/// Names must be unique; an ambiguous name is an error.
pub fn find_calendar(
    calendars: &[CalendarInfo],
    reference: &str,
) -> Result<CalendarInfo, CalendarError> {
    let reference = reference.trim();
    if let Some(calendar) = calendars.iter().find(|c| c.id == reference) {
        return Ok(calendar.clone());
    }
    if reference == DEFAULT_CALENDAR {
        if let Some(calendar) = calendars.iter().find(|c| c.primary) {
            return Ok(calendar.clone());
        }
    }
    let matches: Vec<&CalendarInfo> = calendars.iter().filter(|c| c.name() == reference).collect();
    match matches.as_slice() {
        [calendar] => Ok((*calendar).clone()),
        [] => Err(CalendarError::CalendarNotFound(reference.to_string())),
        _ => Err(CalendarError::AmbiguousCalendar {
            name: reference.to_string(),
            count: matches.len(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposerSettings {
    pub default_calendar: String,
    pub timezone: Tz,
    pub retry: RetryPolicy,
    /// Concurrent service calls per batch
    pub workers: usize,
    pub reminders: Vec<ReminderOverride>,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            default_calendar: DEFAULT_CALENDAR.to_string(),
            timezone: chrono_tz::America::Chicago,
            retry: RetryPolicy::default(),
            workers: 4,
            reminders: default_reminders(),
        }
    }
}

pub fn default_reminders() -> Vec<ReminderOverride> {
    vec![
        ReminderOverride { method: ReminderMethod::Email, minutes: 30 },
        ReminderOverride { method: ReminderMethod::Popup, minutes: 10 },
    ]
}

/// A created event and the calendar it landed in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedEvent {
    pub calendar_id: String,
    pub event: RemoteEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome<T> {
    /// Position in the input batch
    pub index: usize,
    pub label: String,
    pub result: Result<T, CalendarError>,
}

/// Per-item results of a batch, ordered by input position
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport<T> {
    pub outcomes: Vec<ItemOutcome<T>>,
    pub cancelled: bool,
    pub not_started: usize,
}

impl<T> BatchReport<T> {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// `PARTIAL_BATCH_FAILURE` when any attempted item failed
    pub fn kind(&self) -> Option<ErrorKind> {
        (self.failed() > 0).then_some(ErrorKind::PartialBatchFailure)
    }

    /// The shared error when every attempted item found the service unreachable
    fn total_outage(&self) -> Option<CalendarError> {
        let mut errors = self.outcomes.iter().map(|o| o.result.as_ref().err());
        let first = errors.next()??;
        if first.is_unreachable() && errors.all(|e| e.is_some_and(CalendarError::is_unreachable)) {
            Some(first.clone())
        } else {
            None
        }
    }
}

/// A calendar's own color id next to the one the policy expects for its events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorInspection {
    pub calendar: CalendarInfo,
    pub expected: Result<String, PolicyGap>,
}

pub struct EventComposer {
    service: Arc<dyn CalendarService>,
    settings: ComposerSettings,
    policy: CalendarColorPolicy,
}

impl EventComposer {
    pub fn new(
        service: Arc<dyn CalendarService>,
        settings: ComposerSettings,
        policy: CalendarColorPolicy,
    ) -> Self {
        Self { service, settings, policy }
    }

    pub fn settings(&self) -> &ComposerSettings {
        &self.settings
    }

    pub fn policy(&self) -> &CalendarColorPolicy {
        &self.policy
    }

    pub async fn list_calendars(&self) -> Result<Vec<CalendarInfo>, CalendarError> {
        let calendars =
            with_retry(&self.settings.retry, "list calendars", || self.service.list_calendars())
                .await?;
        debug!("Found {} calendars", calendars.len());
        Ok(calendars)
    }

    pub async fn resolve_calendar(&self, reference: &str) -> Result<CalendarInfo, CalendarError> {
        let calendars = self.list_calendars().await?;
        find_calendar(&calendars, reference)
    }

    pub async fn create_calendar(&self, name: &str) -> Result<CalendarInfo, CalendarError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CalendarError::invalid_format(
                super::InputField::Summary,
                "calendar name must not be empty",
            ));
        }
        let request = NewCalendar {
            summary: name.to_string(),
            time_zone: self.settings.timezone.name().to_string(),
        };
        let calendar = with_retry(&self.settings.retry, "create calendar", || {
            self.service.create_calendar(&request)
        })
        .await?;
        info!("Calendar '{}' created with id {}", calendar.name(), calendar.id);
        Ok(calendar)
    }

    /// Translate a draft into the service's event body
    pub fn build_payload(&self, draft: &EventDraft, calendar: &CalendarInfo) -> EventPayload {
        let tz = draft.interval().timezone();
        let color_id = match draft.color_id() {
            Some(color_id) => Some(color_id.to_string()),
            None => match self.policy.resolve(calendar) {
                Ok(color_id) => Some(color_id.to_string()),
                Err(reason) => {
                    warn!(
                        "{}",
                        Warning::IncompletePolicy { calendar: calendar.name().to_string(), reason }
                    );
                    None
                }
            },
        };
        EventPayload {
            summary: draft.summary().to_string(),
            description: draft.description().map(str::to_string),
            start: EventDateTime::zoned(draft.start()),
            end: EventDateTime::zoned(draft.end()),
            color_id,
            recurrence: draft.recurrence().map(|r| vec![r.to_rrule(tz)]).unwrap_or_default(),
            reminders: Reminders { use_default: false, overrides: self.settings.reminders.clone() },
        }
    }

    /// Create one event in the draft's calendar, or the default calendar
    pub async fn submit(&self, draft: &EventDraft) -> Result<SubmittedEvent, CalendarError> {
        let reference = draft.calendar_id().unwrap_or(&self.settings.default_calendar);
        let calendar = self.resolve_calendar(reference).await?;
        self.submit_to(&calendar, draft).await
    }

    pub async fn submit_to(
        &self,
        calendar: &CalendarInfo,
        draft: &EventDraft,
    ) -> Result<SubmittedEvent, CalendarError> {
        let payload = self.build_payload(draft, calendar);
        debug!("Creating event '{}' in {}", draft.summary(), calendar.id);
        let event = with_retry(&self.settings.retry, "create event", || {
            self.service.create_event(&calendar.id, &payload)
        })
        .await?;
        info!("Event '{}' created in '{}'", draft.summary(), calendar.name());
        Ok(SubmittedEvent { calendar_id: calendar.id.clone(), event })
    }

    /// Submit many drafts on the worker pool.
    ///
    /// Individual failures are reported per item. Only a service that is
    /// unreachable for every attempted item turns into an `Err`.
    pub async fn submit_batch(
        &self,
        drafts: Vec<EventDraft>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport<SubmittedEvent>, CalendarError> {
        if drafts.is_empty() {
            return Ok(BatchReport { outcomes: Vec::new(), cancelled: false, not_started: 0 });
        }
        let calendars = self.list_calendars().await?;
        let items: Vec<(Result<CalendarInfo, CalendarError>, EventDraft)> = drafts
            .into_iter()
            .map(|draft| {
                let reference = draft.calendar_id().unwrap_or(&self.settings.default_calendar);
                (find_calendar(&calendars, reference), draft)
            })
            .collect();

        let report = self
            .run_batch(items, cancel, |index, (calendar, draft)| async move {
                let label = draft.summary().to_string();
                let result = match calendar {
                    Ok(calendar) => self.submit_to(&calendar, &draft).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = &result {
                    warn!("Event '{}' failed: {}", label, e);
                }
                ItemOutcome { index, label, result }
            })
            .await;

        if let Some(outage) = report.total_outage() {
            error!("Calendar service unreachable for every event in the batch");
            return Err(outage);
        }
        info!(
            "Batch finished: {} created, {} failed, {} not started",
            report.succeeded(),
            report.failed(),
            report.not_started
        );
        Ok(report)
    }

    async fn run_batch<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        cancel: &CancellationToken,
        run: F,
    ) -> BatchReport<T>
    where
        F: Fn(usize, I) -> Fut,
        Fut: Future<Output = ItemOutcome<T>>,
    {
        let total = items.len();
        let run = &run;
        let mut outcomes: Vec<ItemOutcome<T>> = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| async move {
                if cancel.is_cancelled() {
                    None
                } else {
                    Some(run(index, item).await)
                }
            })
            .buffer_unordered(self.settings.workers.max(1))
            .filter_map(|outcome| async move { outcome })
            .collect()
            .await;
        outcomes.sort_by_key(|o| o.index);

        let not_started = total - outcomes.len();
        if not_started > 0 {
            warn!("Batch cancelled: {} of {} items not started", not_started, total);
        }
        BatchReport { outcomes, cancelled: not_started > 0, not_started }
    }

    /// Patch an event; fields absent from `patch` are left as they are
    pub async fn update_event(
        &self,
        calendar: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<RemoteEvent, CalendarError> {
        let calendar = self.resolve_calendar(calendar).await?;
        let event = with_retry(&self.settings.retry, "update event", || {
            self.service.update_event(&calendar.id, event_id, patch)
        })
        .await?;
        info!("Event {} updated in '{}'", event_id, calendar.name());
        Ok(event)
    }

    pub async fn search_events(
        &self,
        calendar: &str,
        query: &EventQuery,
    ) -> Result<Vec<RemoteEvent>, CalendarError> {
        let calendar = self.resolve_calendar(calendar).await?;
        let events = with_retry(&self.settings.retry, "search events", || {
            self.service.search_events(&calendar.id, query)
        })
        .await?;
        info!("Found {} events in '{}'", events.len(), calendar.name());
        Ok(events)
    }

    pub async fn list_events(&self, calendar: &str) -> Result<Vec<RemoteEvent>, CalendarError> {
        let calendar = self.resolve_calendar(calendar).await?;
        self.fetch_events(&calendar).await
    }

    async fn fetch_events(&self, calendar: &CalendarInfo) -> Result<Vec<RemoteEvent>, CalendarError> {
        let events = with_retry(&self.settings.retry, "list events", || {
            self.service.list_events(&calendar.id)
        })
        .await?;
        Ok(events)
    }

    pub async fn inspect_color(&self, calendar: &str) -> Result<ColorInspection, CalendarError> {
        let listed = self.resolve_calendar(calendar).await?;
        let calendar = with_retry(&self.settings.retry, "get calendar", || {
            self.service.get_calendar(&listed.id)
        })
        .await?;
        let expected = self.policy.resolve(&calendar).map(str::to_string);
        Ok(ColorInspection { calendar, expected })
    }

    /// Work out which events of a calendar need a new color, without writing
    pub async fn plan_calendar_sync(&self, calendar: &str) -> Result<SyncPlan, CalendarError> {
        let calendar = self.resolve_calendar(calendar).await?;
        self.plan_for(&calendar).await
    }

    async fn plan_for(&self, calendar: &CalendarInfo) -> Result<SyncPlan, CalendarError> {
        if let Err(reason) = self.policy.resolve(calendar) {
            return Ok(SyncPlan::Skipped {
                calendar_id: calendar.id.clone(),
                warning: Warning::IncompletePolicy { calendar: calendar.name().to_string(), reason },
            });
        }
        let events = self.fetch_events(calendar).await?;
        Ok(plan_color_sync(calendar, &self.policy, &events))
    }

    pub async fn sync_calendar(
        &self,
        calendar: &str,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, CalendarError> {
        let plan = self.plan_calendar_sync(calendar).await?;
        self.execute_sync(plan, cancel).await
    }

    /// Reconcile colors of already-fetched events of `calendar`
    pub async fn sync_events(
        &self,
        calendar: &CalendarInfo,
        events: &[RemoteEvent],
        cancel: &CancellationToken,
    ) -> Result<SyncReport, CalendarError> {
        let plan = plan_color_sync(calendar, &self.policy, events);
        self.execute_sync(plan, cancel).await
    }

    /// Apply a plan. Each update is independent; failures are reported per
    /// event.
    pub async fn execute_sync(
        &self,
        plan: SyncPlan,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, CalendarError> {
        let (calendar_id, updates, already_correct) = match plan {
            SyncPlan::Skipped { calendar_id, warning } => {
                warn!("{}", warning);
                return Ok(SyncReport::skipped(calendar_id, warning));
            }
            SyncPlan::Planned { calendar_id, updates, already_correct, .. } => {
                (calendar_id, updates, already_correct)
            }
        };

        let calendar_ref = calendar_id.as_str();
        let report = self
            .run_batch(updates, cancel, |index, update| async move {
                let patch = EventPatch::color(update.color_id.clone());
                let result = with_retry(&self.settings.retry, "update event color", || {
                    self.service.update_event(calendar_ref, &update.event_id, &patch)
                })
                .await
                .map(|_| ())
                .map_err(CalendarError::from);
                match &result {
                    Ok(()) => info!("Updated color for event: {}", update.summary),
                    Err(e) => warn!("Failed to update color for event {}: {}", update.summary, e),
                }
                ItemOutcome { index, label: update.event_id, result }
            })
            .await;

        if let Some(outage) = report.total_outage() {
            error!("Calendar service unreachable while syncing {}", calendar_id);
            return Err(outage);
        }

        let mut results: Vec<EventSyncResult> = already_correct
            .into_iter()
            .map(|event_id| EventSyncResult { event_id, outcome: EventSyncOutcome::AlreadyCorrect })
            .chain(report.outcomes.into_iter().map(|o| EventSyncResult {
                event_id: o.label,
                outcome: match o.result {
                    Ok(()) => EventSyncOutcome::Updated,
                    Err(e) => EventSyncOutcome::Failed(e),
                },
            }))
            .collect();
        results.sort_by(|a, b| a.event_id.cmp(&b.event_id));

        let report = SyncReport {
            calendar_id,
            status: SyncStatus::Completed(results),
            cancelled: report.cancelled,
            not_started: report.not_started,
        };
        info!("Finished syncing colors. {}", report);
        Ok(report)
    }

    /// Sync every calendar named in the color policy. A failure on one
    /// calendar is reported for that calendar only.
    pub async fn sync_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<(String, Result<SyncReport, CalendarError>)>, CalendarError> {
        let calendars = self.list_calendars().await?;
        let mut seen = BTreeSet::new();
        let mut reports = Vec::new();
        for key in self.policy.calendar_keys() {
            if cancel.is_cancelled() {
                warn!("Sync cancelled before calendar '{}'", key);
                break;
            }
            let result = match find_calendar(&calendars, key) {
                Ok(calendar) if !seen.insert(calendar.id.clone()) => continue,
                Ok(calendar) => match self.plan_for(&calendar).await {
                    Ok(plan) => self.execute_sync(plan, cancel).await,
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                error!("Color sync failed for '{}': {}", key, e);
            }
            reports.push((key.to_string(), result));
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn calendar(id: &str, name: &str, primary: bool) -> CalendarInfo {
        CalendarInfo { primary, ..CalendarInfo::new(id, name) }
    }

    #[test_case(1, 500 ; "first retry")]
    #[test_case(2, 1000 ; "second retry")]
    #[test_case(3, 2000 ; "third retry")]
    #[test_case(10, 8000 ; "capped")]
    fn test_backoff_doubles_until_cap(attempt: u32, millis: u64) {
        assert_eq!(RetryPolicy::default().backoff(attempt), Duration::from_millis(millis));
    }

    #[test]
    fn test_find_calendar_by_id_primary_and_name() {
        let calendars = vec![
            calendar("me@example.com", "Me", true),
            calendar("twins@group", "Twins", false),
        ];
        assert_eq!(find_calendar(&calendars, "twins@group").unwrap().name(), "Twins");
        assert_eq!(find_calendar(&calendars, "primary").unwrap().id, "me@example.com");
        assert_eq!(find_calendar(&calendars, "Twins").unwrap().id, "twins@group");
        assert_eq!(
            find_calendar(&calendars, "Vikings"),
            Err(CalendarError::CalendarNotFound("Vikings".to_string()))
        );
    }

    #[test]
    fn test_shared_name_is_ambiguous_but_id_works() {
        let calendars = vec![calendar("a@group", "Games", false), calendar("b@group", "Games", false)];
        assert_eq!(
            find_calendar(&calendars, "Games"),
            Err(CalendarError::AmbiguousCalendar { name: "Games".to_string(), count: 2 })
        );
        assert_eq!(find_calendar(&calendars, "b@group").unwrap().id, "b@group");
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_on_permanent_error() {
        let policy = RetryPolicy { initial_backoff: Duration::from_millis(1), ..RetryPolicy::default() };
        let mut calls = 0;
        let result: Result<(), _> = with_retry(&policy, "test", || {
            calls += 1;
            async { Err(ServiceError::NotFound("gone".into())) }
        })
        .await;
        assert_eq!(result, Err(ServiceError::NotFound("gone".into())));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_with_retry_times_out_slow_calls() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            timeout: Duration::from_millis(10),
        };
        let mut calls = 0;
        let result: Result<(), _> = with_retry(&policy, "slow", || {
            calls += 1;
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err, ServiceError::Timeout(Duration::from_millis(10)));
        assert_eq!(err.to_string(), "Calendar service request timed out after 10ms");
        assert_eq!(calls, 2);
    }
}
