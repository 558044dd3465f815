//! Google Calendar v3 REST client.
//
// Requests carry a bearer access token. A 401 triggers one refresh-token grant
// against the token endpoint and a single replay of the request.

use super::calendar::{
    CalendarInfo, CalendarService, EventPatch, EventPayload, EventQuery, NewCalendar,
    RemoteEvent, ServiceError,
};
use async_trait::async_trait;
use chrono::SecondsFormat;
use log::{debug, info};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth client and token material for an already-authorized account
#[derive(Debug, Clone)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct GoogleCalendarService {
    http: Client,
    base_url: Url,
    credentials: GoogleCredentials,
    access_token: RwLock<SecretString>,
}

impl GoogleCalendarService {
    pub fn new(credentials: GoogleCredentials, base_url: Url) -> Self {
        let access_token = RwLock::new(credentials.access_token.clone());
        Self { http: Client::new(), base_url, credentials, access_token }
    }

    /// Append percent-encoded path segments to the base URL
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| ServiceError::Rejected {
                status: 0,
                message: format!("{} cannot be used as a base URL", self.base_url),
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    /// Send a request built by `build` with the current access token and
    /// decode the JSON response.
    async fn send<T, F>(&self, build: F) -> Result<T, ServiceError>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.access_token.read().await.expose_secret().to_string();
        let mut response = build(&token).send().await.map_err(transport_error)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Access token rejected, refreshing");
            let token = self.refresh().await?;
            response = build(&token).send().await.map_err(transport_error)?;
        }

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(ServiceError::from_status(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|e| ServiceError::Decode(e.to_string()))
    }

    async fn refresh(&self) -> Result<String, ServiceError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.expose_secret()),
            ("refresh_token", self.credentials.refresh_token.expose_secret()),
        ];
        let response = self
            .http
            .post(&self.credentials.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(match ServiceError::from_status(status.as_u16(), &body) {
                e if e.is_transient() => e,
                _ => ServiceError::Unauthorized(format!("token refresh failed: {}", body.trim())),
            });
        }
        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| ServiceError::Decode(e.to_string()))?;
        *self.access_token.write().await = SecretString::from(token.access_token.clone());
        info!("Access token refreshed");
        Ok(token.access_token)
    }

    /// GET every page of a list endpoint
    async fn list_all<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, ServiceError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page: ListPage<T> = self
                .send(|token| {
                    let request = self.http.get(url.clone()).bearer_auth(token).query(query);
                    match &page_token {
                        Some(page_token) => request.query(&[("pageToken", page_token)]),
                        None => request,
                    }
                })
                .await?;
            items.extend(page.items);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        Ok(items)
    }
}

fn transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_decode() {
        ServiceError::Decode(e.to_string())
    } else {
        ServiceError::Unreachable(e.to_string())
    }
}

#[async_trait]
impl CalendarService for GoogleCalendarService {
    async fn list_calendars(&self) -> Result<Vec<CalendarInfo>, ServiceError> {
        let url = self.endpoint(&["users", "me", "calendarList"])?;
        self.list_all(url, &[]).await
    }

    async fn get_calendar(&self, calendar_id: &str) -> Result<CalendarInfo, ServiceError> {
        let url = self.endpoint(&["users", "me", "calendarList", calendar_id])?;
        self.send(|token| self.http.get(url.clone()).bearer_auth(token)).await
    }

    async fn create_calendar(&self, calendar: &NewCalendar) -> Result<CalendarInfo, ServiceError> {
        let url = self.endpoint(&["calendars"])?;
        self.send(|token| self.http.post(url.clone()).bearer_auth(token).json(calendar))
            .await
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        event: &EventPayload,
    ) -> Result<RemoteEvent, ServiceError> {
        let url = self.endpoint(&["calendars", calendar_id, "events"])?;
        debug!("POST {}", url);
        self.send(|token| self.http.post(url.clone()).bearer_auth(token).json(event))
            .await
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<RemoteEvent, ServiceError> {
        let url = self.endpoint(&["calendars", calendar_id, "events", event_id])?;
        debug!("PATCH {}", url);
        self.send(|token| self.http.patch(url.clone()).bearer_auth(token).json(patch))
            .await
    }

    async fn search_events(
        &self,
        calendar_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<RemoteEvent>, ServiceError> {
        let url = self.endpoint(&["calendars", calendar_id, "events"])?;
        let mut params = vec![
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(text) = query.text.as_deref().filter(|t| !t.trim().is_empty()) {
            params.push(("q", text.trim().to_string()));
        }
        if let Some(min) = query.time_min {
            params.push(("timeMin", min.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(max) = query.time_max {
            params.push(("timeMax", max.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        self.list_all(url, &params).await
    }

    async fn list_events(&self, calendar_id: &str) -> Result<Vec<RemoteEvent>, ServiceError> {
        let url = self.endpoint(&["calendars", calendar_id, "events"])?;
        self.list_all(url, &[]).await
    }
}
