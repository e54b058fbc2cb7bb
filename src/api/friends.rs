//! Friend list and user search

use serde_json::json;

use super::client::{field_or_default, ApiError, ChatClient};
use crate::models::{Friend, User, UserId};

/// Shortest query the search endpoint accepts.
const MIN_QUERY_CHARS: usize = 2;

pub async fn list_friends(client: &ChatClient) -> Result<Vec<Friend>, ApiError> {
    let mut body = client.get("/friends").await?;
    field_or_default(&mut body, "friends")
}

/// Check a search query before it goes on the wire.
pub fn validate_query(query: &str) -> Result<&str, ApiError> {
    let query = query.trim();
    if query.chars().count() < MIN_QUERY_CHARS {
        return Err(ApiError::Validation(format!(
            "Search query must be at least {} characters",
            MIN_QUERY_CHARS
        )));
    }
    Ok(query)
}

pub async fn search_users(client: &ChatClient, query: &str) -> Result<Vec<User>, ApiError> {
    let query = validate_query(query)?;
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    let mut body = client
        .get(&format!("/friends/search?query={}", encoded))
        .await?;
    field_or_default(&mut body, "users")
}

pub async fn add_friend(client: &ChatClient, friend_id: UserId) -> Result<(), ApiError> {
    client
        .post("/friends", Some(&json!({ "friendId": friend_id })))
        .await?;
    Ok(())
}

pub async fn remove_friend(client: &ChatClient, friend_id: UserId) -> Result<(), ApiError> {
    client.delete(&format!("/friends/{}", friend_id)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_query_rejected_before_dispatch() {
        assert!(matches!(validate_query(""), Err(ApiError::Validation(_))));
        assert!(matches!(validate_query("  a "), Err(ApiError::Validation(_))));
        // Two Hangul syllables are two characters, not six bytes.
        assert_eq!(validate_query(" 민수 ").unwrap(), "민수");
    }

    #[tokio::test]
    async fn test_search_never_dispatches_invalid_query() {
        // The base URL is unroutable: reaching the network would yield a Network error.
        let store = crate::auth::shared(crate::auth::store::MemoryStore::default());
        let client = ChatClient::new("http://127.0.0.1:9", store);
        let err = search_users(&client, "x").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
