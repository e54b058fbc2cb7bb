//! Authenticated HTTP client for the chat backend
//!
//! Wraps reqwest::Client with bearer-token injection, `{ok, ...}` envelope
//! handling, and credential invalidation on 401/403.

use anyhow::Context;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::auth::{self, SharedStore};
use crate::config::Config;
use crate::models::{User, UserId};

/// Errors from REST calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 401/403. Stored credentials have already been cleared.
    #[error("authentication failed (HTTP {status}): {message}. Run 'ieum-cli login'.")]
    Auth { status: u16, message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Rejected locally, nothing was sent.
    #[error("{0}")]
    Validation(String),

    /// 2xx response whose envelope says `ok: false` or lacks the payload.
    #[error("server rejected request: {0}")]
    Envelope(String),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("not logged in. Run 'ieum-cli login' first.")]
    NotLoggedIn,
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Auth { status, .. } | ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth { .. })
    }
}

/// Client for the REST API. Cheap to clone.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    store: SharedStore,
}

impl ChatClient {
    pub fn new(base_url: &str, store: SharedStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
        }
    }

    /// Load config from disk and build a client backed by it.
    pub fn from_config() -> anyhow::Result<Self> {
        let config = Config::load().context("Failed to load config")?;
        let base_url = config.api_url().to_string();
        Ok(Self::new(&base_url, auth::shared(config)))
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<String> {
        self.store.lock().unwrap_or_else(|e| e.into_inner()).token()
    }

    pub fn current_user(&self) -> Option<User> {
        self.store.lock().unwrap_or_else(|e| e.into_inner()).user()
    }

    /// Id of the logged-in user, from the cached profile.
    pub fn current_user_id(&self) -> Result<UserId, ApiError> {
        self.current_user().map(|u| u.id).ok_or(ApiError::NotLoggedIn)
    }

    /// GET `path` and return the envelope body.
    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.send(Method::GET, path, None::<&Value>).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, ApiError> {
        self.send(Method::POST, path, body).await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, ApiError> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send(Method::DELETE, path, None::<&Value>).await
    }

    /// POST a multipart form (file uploads). Content-Type is left to reqwest.
    pub async fn post_multipart(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<Value, ApiError> {
        let url = self.url(path);
        tracing::debug!("POST (multipart) {}", url);

        let req = self.authorize(self.http.post(&url)).multipart(form);
        let resp = req.send().await?;
        self.handle_response(resp, &url).await
    }

    /// Plain HTTP client, for requests to third-party URLs (presigned uploads).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, ApiError> {
        let url = self.url(path);
        tracing::debug!("{} {}", method, url);

        let mut req = self.authorize(self.http.request(method, &url));
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        self.handle_response(resp, &url).await
    }

    async fn handle_response(
        &self,
        resp: reqwest::Response,
        url: &str,
    ) -> Result<Value, ApiError> {
        let status = resp.status();
        let text = resp.text().await?;
        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        match check_envelope(status, body) {
            Err(err @ ApiError::Auth { .. }) => {
                tracing::warn!("Auth failure for {}, clearing stored credentials", url);
                self.invalidate_credentials();
                Err(err)
            }
            other => other,
        }
    }

    /// Drop the stored token and cached profile.
    pub fn invalidate_credentials(&self) {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = store.clear_credentials() {
            tracing::error!("Failed to clear credentials: {:#}", e);
        }
    }
}

/// Classify a response by status and `{ok, error}` envelope.
fn check_envelope(status: StatusCode, body: Value) -> Result<Value, ApiError> {
    let message = || {
        body.get("error")
            .and_then(|e| e.as_str())
            .map(String::from)
            .or_else(|| body.as_str().map(String::from))
            .unwrap_or_else(|| "Request failed".to_string())
    };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Auth {
            status: status.as_u16(),
            message: message(),
        });
    }
    if !status.is_success() {
        return Err(ApiError::Http {
            status: status.as_u16(),
            message: message(),
        });
    }
    if body.get("ok").and_then(|ok| ok.as_bool()) == Some(false) {
        return Err(ApiError::Envelope(message()));
    }
    Ok(body)
}

/// Take `key` out of an envelope body and deserialize it.
pub fn field<T: DeserializeOwned>(body: &mut Value, key: &str) -> Result<T, ApiError> {
    match body.get_mut(key).map(Value::take) {
        Some(Value::Null) | None => Err(ApiError::Envelope(format!(
            "response is missing '{}'",
            key
        ))),
        Some(v) => Ok(serde_json::from_value(v)?),
    }
}

/// Like `field`, but a missing or null key yields `T::default()`.
pub fn field_or_default<T: DeserializeOwned + Default>(
    body: &mut Value,
    key: &str,
) -> Result<T, ApiError> {
    match body.get_mut(key).map(Value::take) {
        Some(Value::Null) | None => Ok(T::default()),
        Some(v) => Ok(serde_json::from_value(v)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryStore;
    use crate::auth::CredentialStore;
    use serde_json::json;

    #[test]
    fn test_envelope_ok() {
        let body = check_envelope(StatusCode::OK, json!({"ok": true, "rooms": []})).unwrap();
        assert!(body["rooms"].is_array());
    }

    #[test]
    fn test_envelope_ok_false_is_error() {
        let err = check_envelope(StatusCode::OK, json!({"ok": false, "error": "nope"})).unwrap_err();
        assert!(matches!(err, ApiError::Envelope(ref m) if m == "nope"));
    }

    #[test]
    fn test_auth_statuses() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let err = check_envelope(status, json!({"error": "expired"})).unwrap_err();
            assert!(err.is_auth());
            assert_eq!(err.status(), Some(status.as_u16()));
        }
    }

    #[test]
    fn test_http_error_message_fallback() {
        let err = check_envelope(StatusCode::NOT_FOUND, Value::Null).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Request failed"));

        let err = check_envelope(StatusCode::BAD_GATEWAY, Value::String("upstream".into()))
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP 502: upstream");
    }

    #[test]
    fn test_field_extraction() {
        let mut body = json!({"ok": true, "suggestions": ["yes", "no"], "room": null});
        let s: Vec<String> = field(&mut body, "suggestions").unwrap();
        assert_eq!(s, vec!["yes", "no"]);
        assert!(field::<Value>(&mut body, "room").is_err());
        let missing: Vec<String> = field_or_default(&mut body, "rooms").unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_invalidate_credentials_clears_store() {
        let user: User = serde_json::from_str(r#"{"id":1,"name":"Choi"}"#).unwrap();
        let store = auth::shared(MemoryStore::with_session("tok", user));
        let client = ChatClient::new("http://localhost:4000/api/", store.clone());
        assert_eq!(client.base_url(), "http://localhost:4000/api");
        assert_eq!(client.current_user_id().unwrap(), 1);

        client.invalidate_credentials();
        assert!(store.lock().unwrap().token().is_none());
        assert!(matches!(client.current_user_id(), Err(ApiError::NotLoggedIn)));
    }
}
