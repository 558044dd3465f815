use chrono::TimeZone;
use chrono_tz::America::Chicago;
use gcal_manager::calendar::{
    validate_interval, CalendarColorPolicy, ComposerSettings, EventComposer, EventDraft,
    RetryPolicy,
};
use gcal_manager::services::{
    CalendarService, EventDateTime, EventPayload, EventQuery, GoogleCalendarService,
    GoogleCredentials, Reminders, ServiceError,
};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials(server: &MockServer) -> GoogleCredentials {
    GoogleCredentials {
        client_id: "client".to_string(),
        client_secret: SecretString::from("secret".to_string()),
        access_token: SecretString::from("old-token".to_string()),
        refresh_token: SecretString::from("refresh-token".to_string()),
        token_uri: format!("{}/token", server.uri()),
    }
}

fn google(server: &MockServer) -> GoogleCalendarService {
    let base = Url::parse(&format!("{}/calendar/v3", server.uri())).unwrap();
    GoogleCalendarService::new(credentials(server), base)
}

fn payload() -> EventPayload {
    let start = Chicago.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
    let end = Chicago.with_ymd_and_hms(2024, 6, 1, 13, 0, 0).unwrap();
    EventPayload {
        summary: "Twins vs Yankees".to_string(),
        description: None,
        start: EventDateTime::zoned(start),
        end: EventDateTime::zoned(end),
        color_id: Some("9".to_string()),
        recurrence: Vec::new(),
        reminders: Reminders { use_default: false, overrides: Vec::new() },
    }
}

#[tokio::test]
async fn test_list_calendars_follows_page_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "twins@group.v.calendar.google.com", "summary": "Twins"}]
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "me@example.com", "summary": "Me", "primary": true, "colorId": "14"}],
            "nextPageToken": "p2"
        })))
        .mount(&server)
        .await;

    let calendars = google(&server).list_calendars().await.unwrap();
    let ids: Vec<&str> = calendars.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["me@example.com", "twins@group.v.calendar.google.com"]);
    assert!(calendars[0].primary);
    assert_eq!(calendars[0].color_id.as_deref(), Some("14"));
}

#[tokio::test]
async fn test_create_event_posts_google_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .and(header("authorization", "Bearer old-token"))
        .and(body_partial_json(json!({
            "summary": "Twins vs Yankees",
            "colorId": "9",
            "start": {"dateTime": "2024-06-01T10:00:00-05:00", "timeZone": "America/Chicago"},
            "reminders": {"useDefault": false}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "evt1",
            "summary": "Twins vs Yankees",
            "colorId": "9",
            "htmlLink": "https://www.google.com/calendar/event?eid=evt1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let event = google(&server).create_event("primary", &payload()).await.unwrap();
    assert_eq!(event.id, "evt1");
    assert_eq!(
        event.html_link.as_deref(),
        Some("https://www.google.com/calendar/event?eid=evt1")
    );
}

#[tokio::test]
async fn test_expired_token_is_refreshed_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "new-token", "expires_in": 3599})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList"))
        .and(header("authorization", "Bearer old-token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList"))
        .and(header("authorization", "Bearer new-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(2)
        .mount(&server)
        .await;

    let service = google(&server);
    assert!(service.list_calendars().await.unwrap().is_empty());
    // the refreshed token is kept for later calls
    assert!(service.list_calendars().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_refresh_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = google(&server).list_calendars().await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)), "{:?}", err);
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList/busy"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList/quota"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "Rate Limit Exceeded",
                      "errors": [{"reason": "rateLimitExceeded"}]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "Not Found", "errors": [{"reason": "notFound"}]}
        })))
        .mount(&server)
        .await;

    let service = google(&server);
    assert!(service.get_calendar("busy").await.unwrap_err().is_transient());
    assert!(service.get_calendar("quota").await.unwrap_err().is_transient());
    assert_eq!(
        service.get_calendar("gone").await.unwrap_err(),
        ServiceError::NotFound("Not Found".to_string())
    );
}

#[tokio::test]
async fn test_search_sends_text_and_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .and(query_param("q", "Twins"))
        .and(query_param("singleEvents", "true"))
        .and(query_param("orderBy", "startTime"))
        .and(query_param("timeMin", "2024-06-01T05:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "evt1", "summary": "Twins vs Yankees"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = EventQuery {
        text: Some(" Twins ".to_string()),
        time_min: Some(chrono::Utc.with_ymd_and_hms(2024, 6, 1, 5, 0, 0).unwrap()),
        time_max: None,
    };
    let events = google(&server).search_events("primary", &query).await.unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_composer_retries_server_errors_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "me@example.com", "summary": "Me", "primary": true}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/calendar/v3/calendars/me@example.com/events"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/calendar/v3/calendars/me@example.com/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "evt9"})))
        .expect(1)
        .mount(&server)
        .await;

    let settings = ComposerSettings {
        retry: RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            ..RetryPolicy::default()
        },
        ..ComposerSettings::default()
    };
    let composer =
        EventComposer::new(Arc::new(google(&server)), settings, CalendarColorPolicy::new());
    let interval =
        validate_interval("2024-06-01", "10:00:00", "2024-06-01", "11:00:00", Chicago).unwrap();
    let created = composer.submit(&EventDraft::new("Dentist", interval).unwrap()).await.unwrap();
    assert_eq!(created.event.id, "evt9");
    assert_eq!(created.calendar_id, "me@example.com");
}
