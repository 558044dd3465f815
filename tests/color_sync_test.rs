mod support;

use gcal_manager::calendar::{
    CalendarColorPolicy, CalendarError, ErrorKind, EventSyncOutcome, HexColor, PolicyGap,
    SyncPlan, SyncStatus, Warning,
};
use gcal_manager::services::{RemoteEvent, ServiceError};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use support::*;
use tokio_util::sync::CancellationToken;

const TWINS: &str = "twins@group.calendar.test";
const VIKINGS: &str = "vikings@group.calendar.test";

fn hex(s: &str) -> HexColor {
    s.parse().unwrap()
}

fn policy() -> CalendarColorPolicy {
    CalendarColorPolicy::new()
        .with_calendar("Twins", hex("#002B5C"))
        .with_calendar("Vikings", hex("#4F2683"))
        .with_calendar("Wild", hex("#154734"))
        .with_color_id(hex("#002b5c"), "9")
        .with_color_id(hex("#154734"), "10")
}

fn service() -> Arc<MockCalendarService> {
    let service = Arc::new(MockCalendarService::with_calendars(vec![
        primary("me@example.com", "Me"),
        calendar(TWINS, "Twins"),
        calendar(VIKINGS, "Vikings"),
    ]));
    service.add_event(TWINS, "a1", "Twins vs Yankees", None);
    service.add_event(TWINS, "a2", "Twins vs Tigers", Some("9"));
    service.add_event(TWINS, "a3", "Twins at Royals", Some("3"));
    service.add_event(VIKINGS, "v1", "Vikings vs Packers", None);
    service
}

#[tokio::test]
async fn test_sync_recolors_only_mismatched_events() {
    let service = service();
    let composer = composer(service.clone(), policy(), 2);

    let report = composer.sync_calendar("Twins", &CancellationToken::new()).await.unwrap();
    assert_eq!(report.calendar_id, TWINS);
    assert_eq!(report.updated(), 2);
    assert_eq!(report.already_correct(), 1);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.kind(), None);
    assert_eq!(service.count("update_event"), 2);
    assert!(service.events(TWINS).iter().all(|e| e.color_id.as_deref() == Some("9")));
}

#[tokio::test]
async fn test_second_sync_is_a_no_op() {
    let service = service();
    let composer = composer(service.clone(), policy(), 2);
    let cancel = CancellationToken::new();

    composer.sync_calendar("Twins", &cancel).await.unwrap();
    let updates_after_first = service.count("update_event");

    let second = composer.sync_calendar(TWINS, &cancel).await.unwrap();
    assert_eq!(second.updated(), 0);
    assert_eq!(second.already_correct(), 3);
    assert_eq!(service.count("update_event"), updates_after_first);
}

#[tokio::test]
async fn test_cancelled_events_are_left_alone() {
    let service = service();
    service.push_event(
        TWINS,
        RemoteEvent {
            id: "a0".to_string(),
            summary: "Postponed".to_string(),
            description: None,
            start: None,
            end: None,
            color_id: None,
            html_link: None,
            recurrence: Vec::new(),
            status: Some("cancelled".to_string()),
        },
    );
    let composer = composer(service.clone(), policy(), 1);

    let plan = composer.plan_calendar_sync("Twins").await.unwrap();
    let ids: Vec<&str> = plan.updates().iter().map(|u| u.event_id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a3"]);
}

#[tokio::test]
async fn test_plan_does_not_write() {
    let service = service();
    let composer = composer(service.clone(), policy(), 1);
    let plan = composer.plan_calendar_sync("Twins").await.unwrap();
    match plan {
        SyncPlan::Planned { color_id, updates, already_correct, .. } => {
            assert_eq!(color_id, "9");
            assert_eq!(updates[1].current.as_deref(), Some("3"));
            assert_eq!(already_correct, vec!["a2".to_string()]);
        }
        other => panic!("unexpected plan: {:?}", other),
    }
    assert_eq!(service.count("update_event"), 0);
}

#[tokio::test]
async fn test_unmapped_calendar_is_skipped_with_warning() {
    let service = service();
    let composer = composer(service.clone(), policy(), 1);

    let report = composer.sync_calendar("Vikings", &CancellationToken::new()).await.unwrap();
    assert!(report.is_skipped());
    assert_eq!(report.kind(), Some(ErrorKind::IncompletePolicy));
    assert_eq!(
        report.status,
        SyncStatus::Skipped(Warning::IncompletePolicy {
            calendar: "Vikings".to_string(),
            reason: PolicyGap::UnmappedColor(hex("#4f2683")),
        })
    );
    assert_eq!(service.count("list_events"), 0);
    assert_eq!(service.events(VIKINGS)[0].color_id, None);
}

#[tokio::test]
async fn test_failed_update_is_reported_per_event() {
    let service = service();
    service.fail_update("a3", ServiceError::PermissionDenied("read-only event".into()));
    let composer = composer(service.clone(), policy(), 2);

    let report = composer.sync_calendar("Twins", &CancellationToken::new()).await.unwrap();
    assert_eq!(report.updated(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.kind(), Some(ErrorKind::PartialBatchFailure));
    let SyncStatus::Completed(results) = &report.status else {
        panic!("sync was skipped");
    };
    let ids: Vec<&str> = results.iter().map(|r| r.event_id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2", "a3"]);
    assert!(matches!(results[2].outcome, EventSyncOutcome::Failed(_)));
}

#[tokio::test]
async fn test_sync_all_isolates_each_calendar() {
    let service = service();
    let composer = composer(service.clone(), policy(), 2);

    let reports = composer.sync_all(&CancellationToken::new()).await.unwrap();
    let keys: Vec<&str> = reports.iter().map(|(key, _)| key.as_str()).collect();
    assert_eq!(keys, vec!["Twins", "Vikings", "Wild"]);

    let twins = reports[0].1.as_ref().unwrap();
    assert_eq!(twins.updated(), 2);
    assert!(reports[1].1.as_ref().unwrap().is_skipped());
    assert_eq!(reports[2].1, Err(CalendarError::CalendarNotFound("Wild".to_string())));
}

#[tokio::test]
async fn test_sync_events_reconciles_given_events() {
    let service = service();
    let composer = composer(service.clone(), policy(), 1);
    let events = service.events(TWINS);

    let report = composer
        .sync_events(&calendar(TWINS, "Twins"), &events, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.updated(), 2);
    assert_eq!(service.count("list_events"), 0);
}

#[tokio::test]
async fn test_inspect_color_reports_expected_id() {
    let service = service();
    let composer = composer(service.clone(), policy(), 1);

    let twins = composer.inspect_color("Twins").await.unwrap();
    assert_eq!(twins.calendar.id, TWINS);
    assert_eq!(twins.expected, Ok("9".to_string()));

    let me = composer.inspect_color("primary").await.unwrap();
    assert_eq!(me.expected, Err(PolicyGap::NoDeclaredColor));
}
