use std::sync::Arc;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::BackendOptions;
use crate::model::{Bookmark, SupportedWebsite, TrackedItem};
use crate::session::SessionProvider;

#[cfg(test)]
pub mod fake;
pub mod wire;

use self::wire::{
    into_items, BookmarkRecord, ItemRecord, LoginRequest, RegisterRequest, SubmitPayload,
    SubmitResponse, UserResponse, WebsiteRecord,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("backend returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("backend rejected the session credentials")]
    Unauthorized,
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("invalid record from backend: {0}")]
    InvalidRecord(String),
    #[error("login succeeded but no access token was returned")]
    MissingToken,
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub email: String,
}

/// Everything the dashboard needs from the scraper backend.
pub trait Backend: Send + Sync {
    fn fetch_items(&self) -> ClientResult<Vec<TrackedItem>>;
    fn fetch_bookmarks(&self) -> ClientResult<Vec<Bookmark>>;
    fn fetch_supported_websites(&self) -> ClientResult<Vec<SupportedWebsite>>;
    /// Asks the backend to re-scrape every tracked site.
    fn refresh(&self) -> ClientResult<String>;
    /// Sends the full edited list and returns the backend's confirmed list.
    fn submit(&self, items: &[TrackedItem]) -> ClientResult<Vec<TrackedItem>>;
    /// Returns the access token on success.
    fn login(&self, credentials: &Credentials) -> ClientResult<String>;
    fn register(&self, registration: &Registration) -> ClientResult<String>;
}

pub struct HttpBackend {
    http: Client,
    base_url: String,
    session: Arc<dyn SessionProvider>,
}

impl HttpBackend {
    pub fn new(options: &BackendOptions, session: Arc<dyn SessionProvider>) -> ClientResult<Self> {
        let base_url = options.base_url.trim_end_matches('/').to_string();
        let http = Client::builder()
            .timeout(options.timeout())
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(|source| ClientError::Transport {
                url: base_url.clone(),
                source,
            })?;
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        endpoint(&self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let response = self
            .authorized(self.http.get(&url))
            .send()
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;
        decode(url, response)
    }

    fn post_json<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");
        let response = self
            .authorized(self.http.post(&url).json(body))
            .send()
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;
        decode(url, response)
    }
}

impl Backend for HttpBackend {
    fn fetch_items(&self) -> ClientResult<Vec<TrackedItem>> {
        let records: Vec<ItemRecord> = self.get_json("get_data")?;
        into_items(records)
    }

    fn fetch_bookmarks(&self) -> ClientResult<Vec<Bookmark>> {
        let records: Vec<BookmarkRecord> = self.get_json("get_bookmarks_data")?;
        Ok(records.into_iter().map(Bookmark::from).collect())
    }

    fn fetch_supported_websites(&self) -> ClientResult<Vec<SupportedWebsite>> {
        let records: Vec<WebsiteRecord> = self.get_json("get_supported_websites")?;
        Ok(records.into_iter().map(SupportedWebsite::from).collect())
    }

    fn refresh(&self) -> ClientResult<String> {
        let value: serde_json::Value = self.get_json("refresh_data")?;
        Ok(message_text(&value))
    }

    fn submit(&self, items: &[TrackedItem]) -> ClientResult<Vec<TrackedItem>> {
        let payload = SubmitPayload::from_items(items);
        let response: SubmitResponse = self.post_json("", &payload)?;
        tracing::info!(message = %response.message, "backend confirmed list update");
        into_items(response.confirmation)
    }

    fn login(&self, credentials: &Credentials) -> ClientResult<String> {
        let request = LoginRequest {
            username: &credentials.username,
            password: &credentials.password,
        };
        let response: UserResponse = self.post_json("login", &request)?;
        response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(ClientError::MissingToken)
    }

    fn register(&self, registration: &Registration) -> ClientResult<String> {
        let request = RegisterRequest {
            username: &registration.username,
            password: &registration.password,
            email: &registration.email,
        };
        let response: UserResponse = self.post_json("register", &request)?;
        Ok(response.message)
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn decode<T: DeserializeOwned>(url: String, response: Response) -> ClientResult<T> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ClientError::Unauthorized);
    }
    let body = response.text().map_err(|source| ClientError::Transport {
        url: url.clone(),
        source,
    })?;
    if !status.is_success() {
        return Err(ClientError::Status {
            url,
            status,
            body: truncate_body(&body),
        });
    }
    serde_json::from_str(&body).map_err(|err| ClientError::Decode {
        url,
        message: err.to_string(),
    })
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = body.trim();
    if trimmed.chars().count() <= LIMIT {
        trimmed.to_string()
    } else {
        let mut out: String = trimmed.chars().take(LIMIT).collect();
        out.push('…');
        out
    }
}

/// `/refresh_data` answers with either a bare JSON string or an object
/// carrying a `message` field.
fn message_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|message| message.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoints_join_without_double_slashes() {
        assert_eq!(
            endpoint("http://localhost:8000/", "/get_data"),
            "http://localhost:8000/get_data"
        );
        assert_eq!(endpoint("http://localhost:8000", ""), "http://localhost:8000/");
    }

    #[test]
    fn refresh_message_accepts_string_or_object() {
        assert_eq!(message_text(&json!("Refreshed 12 records")), "Refreshed 12 records");
        assert_eq!(message_text(&json!({"message": "ok"})), "ok");
        assert_eq!(message_text(&json!(3)), "3");
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(500);
        let truncated = truncate_body(&body);
        assert_eq!(truncated.chars().count(), 201);
        assert!(truncated.ends_with('…'));
    }
}
