//! Credential storage and token inspection

use anyhow::Result;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

use crate::models::{User, UserId};

/// Store for the session token and cached profile.
///
/// Implementations must survive process restarts if they back a real
/// session (see `Config`).
pub trait CredentialStore: Send {
    fn token(&self) -> Option<String>;
    fn user(&self) -> Option<User>;
    fn set_session(&mut self, token: String, user: User) -> Result<()>;
    fn set_user(&mut self, user: User) -> Result<()>;
    fn clear_credentials(&mut self) -> Result<()>;

    fn user_id(&self) -> Option<UserId> {
        self.user().map(|u| u.id)
    }
}

/// Shared handle to a credential store.
pub type SharedStore = Arc<Mutex<dyn CredentialStore>>;

/// Wrap a store for sharing between the API client and callers.
pub fn shared<S: CredentialStore + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// In-memory credential store
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    token: Option<String>,
    user: Option<User>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_session(token: &str, user: User) -> Self {
        Self {
            token: Some(token.to_string()),
            user: Some(user),
        }
    }
}

#[cfg(test)]
impl CredentialStore for MemoryStore {
    fn token(&self) -> Option<String> {
        self.token.clone()
    }

    fn user(&self) -> Option<User> {
        self.user.clone()
    }

    fn set_session(&mut self, token: String, user: User) -> Result<()> {
        self.token = Some(token);
        self.user = Some(user);
        Ok(())
    }

    fn set_user(&mut self, user: User) -> Result<()> {
        self.user = Some(user);
        Ok(())
    }

    fn clear_credentials(&mut self) -> Result<()> {
        self.token = None;
        self.user = None;
        Ok(())
    }
}

/// Read the `exp` claim of a JWT without verifying it.
///
/// Returns `None` for opaque tokens or tokens without an expiry.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_with(claims: &str) -> String {
        let enc = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        format!(
            "{}.{}.sig",
            enc.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
            enc.encode(claims)
        )
    }

    #[test]
    fn test_token_expiry_reads_exp_claim() {
        let token = jwt_with(r#"{"userId":3,"exp":1700000000}"#);
        let exp = token_expiry(&token).unwrap();
        assert_eq!(exp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_token_expiry_opaque_token() {
        assert!(token_expiry("not-a-jwt").is_none());
        assert!(token_expiry(&jwt_with(r#"{"userId":3}"#)).is_none());
    }

    #[test]
    fn test_memory_store_clear() {
        let user: User = serde_json::from_str(r#"{"id":9,"name":"Park"}"#).unwrap();
        let mut store = MemoryStore::with_session("tok", user);
        assert_eq!(store.user_id(), Some(9));

        store.clear_credentials().unwrap();
        assert!(store.token().is_none());
        assert!(store.user().is_none());
    }
}
