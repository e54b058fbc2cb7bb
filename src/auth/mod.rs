//! Authentication for the Ieum backend
//!
//! Email/password login yields a bearer token, which is stored together
//! with the user's profile in a `CredentialStore`.

pub mod session;
pub mod store;

use anyhow::Result;
use chrono::Utc;

pub use session::Registration;
pub use store::{shared, CredentialStore, SharedStore};

use crate::api::client::ChatClient;

/// Create an account and log in with it
pub async fn register(form: &Registration) -> Result<()> {
    let client = ChatClient::from_config()?;
    let user = session::register_data(&client, form).await?;
    println!("Registered and logged in as {} <{}>.", user.name, user.email);
    Ok(())
}

pub async fn login(email: &str, password: &str) -> Result<()> {
    let client = ChatClient::from_config()?;
    let user = session::login_data(&client, email, password).await?;
    println!("Logged in as {} (id {}).", user.display_name(), user.id);
    Ok(())
}

pub async fn logout() -> Result<()> {
    let client = ChatClient::from_config()?;
    session::logout_data(&client).await?;
    println!("Logged out.");
    Ok(())
}

/// Print the stored session state
pub async fn status() -> Result<()> {
    let client = ChatClient::from_config()?;
    let status = session::status_data(&client);

    println!("API:         {}", client.base_url());
    match (status.has_token, status.expires_at) {
        (false, _) => println!("Token:       none"),
        (true, Some(exp)) if status.is_expired(Utc::now()) => {
            println!("Token:       expired");
            println!("  expires_at: {}", exp);
        }
        (true, Some(exp)) => {
            println!("Token:       valid");
            println!("  expires_at: {}", exp);
        }
        (true, None) => println!("Token:       present"),
    }
    match status.user {
        Some(ref user) => println!("User:        {} (id {})", user.display_name(), user.id),
        None => println!("User:        none"),
    }

    if !status.has_token {
        println!("\nRun 'ieum-cli login' to authenticate.");
    }
    Ok(())
}
