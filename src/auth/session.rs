//! Email/password session lifecycle against the backend

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use super::store::{token_expiry, CredentialStore, SharedStore};
use crate::api::client::{field, ApiError, ChatClient};
use crate::models::User;

/// Sign-up form. Only name, email and password are required by the backend.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_special: Option<bool>,
}

impl Registration {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() || self.password.is_empty()
        {
            return Err(ApiError::Validation(
                "Name, email and password are required".into(),
            ));
        }
        Ok(())
    }
}

/// Create an account and start a session with it.
pub async fn register_data(client: &ChatClient, form: &Registration) -> Result<User> {
    form.validate()?;
    let body = client.post("/auth/register", Some(form)).await?;
    store_session(client.store(), body)
}

/// Log in and persist the token and profile.
pub async fn login_data(client: &ChatClient, email: &str, password: &str) -> Result<User> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::Validation("Email and password are required".into()).into());
    }
    let body = client
        .post(
            "/auth/login",
            Some(&json!({ "email": email.trim(), "password": password })),
        )
        .await?;
    store_session(client.store(), body)
}

/// Take `{token, user}` from an auth response and persist it.
fn store_session(store: &SharedStore, mut body: Value) -> Result<User> {
    let token: String = field(&mut body, "token")?;
    let user: User = field(&mut body, "user")?;
    store
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .set_session(token, user.clone())
        .context("Failed to save session")?;
    tracing::info!("Session started for user {}", user.id);
    Ok(user)
}

/// End the session. Local credentials are cleared even if the server call fails.
pub async fn logout_data(client: &ChatClient) -> Result<()> {
    if client.token().is_some() {
        if let Err(e) = client.post("/auth/logout", None::<&Value>).await {
            tracing::warn!("Server logout failed: {}", e);
        }
    }
    client
        .store()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clear_credentials()
        .context("Failed to clear credentials")
}

/// Snapshot of the stored session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub has_token: bool,
    /// JWT `exp` claim, when the token carries one
    pub expires_at: Option<DateTime<Utc>>,
    pub user: Option<User>,
}

impl SessionStatus {
    pub fn read(store: &dyn CredentialStore) -> Self {
        let token = store.token();
        Self {
            has_token: token.is_some(),
            expires_at: token.as_deref().and_then(token_expiry),
            user: store.user(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |exp| exp <= now)
    }
}

pub fn status_data(client: &ChatClient) -> SessionStatus {
    let store = client.store().lock().unwrap_or_else(|e| e.into_inner());
    SessionStatus::read(&*store)
}
