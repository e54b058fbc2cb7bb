//! Current-user profile, settings and push registration

use serde_json::json;

use super::client::{field, ApiError, ChatClient};
use crate::models::{SettingUpdate, User, UserSetting};

/// Fetch the logged-in user from the backend.
pub async fn fetch_me(client: &ChatClient) -> Result<User, ApiError> {
    let mut body = client.get("/auth/me").await?;
    field(&mut body, "user")
}

/// Save settings and refresh the cached profile with the result.
pub async fn update_settings(
    client: &ChatClient,
    update: &SettingUpdate,
) -> Result<UserSetting, ApiError> {
    if update.is_empty() {
        return Err(ApiError::Validation("No settings to update".into()));
    }

    let mut body = client.patch("/users/me/settings", update).await?;

    // Older backends answer with `{ok: true}` only; fall back to applying locally.
    let cached = client.current_user();
    let setting: UserSetting = match field(&mut body, "setting") {
        Ok(s) => s,
        Err(ApiError::Envelope(_)) => {
            let mut s = cached
                .as_ref()
                .and_then(|u| u.setting.clone())
                .unwrap_or_default();
            s.apply(update);
            s
        }
        Err(e) => return Err(e),
    };

    if let Some(mut user) = cached {
        user.setting = Some(setting.clone());
        let mut store = client.store().lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = store.set_user(user) {
            tracing::warn!("Failed to cache updated profile: {:#}", e);
        }
    }

    Ok(setting)
}

/// Register a device push token. Failures are logged and never raised.
pub async fn register_push_token(client: &ChatClient, token: &str) {
    match client
        .post("/users/push-token", Some(&json!({ "token": token })))
        .await
    {
        Ok(_) => tracing::info!("Push token registered"),
        Err(e) => tracing::error!("Failed to update push token: {}", e),
    }
}
