//! REST API module for the chat backend

pub mod auth;
pub mod client;
pub mod conversations;
pub mod messages;
pub mod users;

pub use client::{ApiClient, ApiError};

use anyhow::{Context, Result};

/// Log in and print a confirmation.
pub async fn login(email: &str, password: &str) -> Result<()> {
    let client = ApiClient::new()?;
    let user = auth::login(&client, email, password).await?;
    println!("Logged in as {} <{}>", user.username, user.email);
    Ok(())
}

/// Register a new account and print a confirmation.
pub async fn register(username: &str, email: &str, password: &str, confirm: &str) -> Result<()> {
    let client = ApiClient::new()?;
    let user = auth::register(&client, username, email, password, confirm).await?;
    println!("Registered and logged in as {} <{}>", user.username, user.email);
    Ok(())
}

/// Clear stored credentials.
pub async fn logout() -> Result<()> {
    let client = ApiClient::new()?;
    auth::logout(&client).await?;
    println!("Logged out.");
    Ok(())
}

/// Show stored credential state without a network call.
pub async fn status() -> Result<()> {
    let client = ApiClient::new()?;
    match (client.username(), client.access_token()) {
        (Some(name), Some(_)) => {
            println!("Logged in as {} (server: {})", name, client.base_url());
        }
        (None, Some(_)) => println!("Token stored, identity unknown. Try 'chat-cli whoami'."),
        _ => println!("Not logged in."),
    }
    Ok(())
}

/// Validate the token against the server and print the profile.
pub async fn whoami() -> Result<()> {
    let client = ApiClient::new()?;
    let user = auth::me(&client).await?;
    println!("{} <{}> (id: {})", user.username, user.email, user.id);
    Ok(())
}

/// Update profile fields.
pub async fn profile(
    username: Option<&str>,
    email: Option<&str>,
    current_password: Option<&str>,
    new_password: Option<&str>,
) -> Result<()> {
    let client = ApiClient::new()?;
    let user = auth::update_profile(&client, username, email, current_password, new_password).await?;
    println!("Profile updated: {} <{}>", user.username, user.email);
    Ok(())
}

/// List conversations with last-message previews.
pub async fn list_conversations() -> Result<()> {
    let client = ApiClient::new()?;
    let chats = conversations::list(&client).await?;

    println!("\nConversations:");
    println!("{:-<60}", "");

    if chats.is_empty() {
        println!("  (no conversations)");
        return Ok(());
    }

    for chat in &chats {
        println!("{}", chat.name);
        println!("  Conversation: {}", chat.conversation_id);
        if let Some(at) = chat.last_message_at {
            println!("  Last: {}", at.to_rfc3339());
        }
        if let Some(ref preview) = chat.last_message {
            if !preview.trim().is_empty() {
                println!("  [{}]: {}", chat.name, truncate(preview.trim(), 80));
            }
        }
        println!();
    }

    Ok(())
}

/// Start (or resume) the conversation with a peer user and print its tail.
pub async fn start_chat(peer_user_id: &str) -> Result<()> {
    use crate::realtime::ConnectionManager;
    use crate::sync::session::Session;

    let client = ApiClient::new()?;
    let own_id = client.user_id().ok_or(ApiError::NotLoggedIn)?;

    let conn = ConnectionManager::new(client.base_url());
    let mut session = Session::new(own_id.clone());
    session
        .select_conversation(&client, &conn, peer_user_id)
        .await?;

    let chat = session
        .active()
        .context("No active conversation after selection")?;
    println!("Conversation with {}: {}", chat.name, chat.conversation_id);

    let msgs = session.sync.messages();
    for msg in msgs.iter().skip(msgs.len().saturating_sub(10)) {
        let who = if msg.sender_id == own_id {
            "you"
        } else {
            msg.sender_id.as_str()
        };
        println!("[{}] {}: {}", msg.created_at.to_rfc3339(), who, msg.content);
    }

    println!(
        "\nReply with 'chat-cli send --to {} <message>' or open the TUI.",
        chat.conversation_id
    );
    Ok(())
}

/// Print one page of a conversation's history, oldest first.
pub async fn read_messages(conversation_id: &str, page: u32, limit: u32) -> Result<()> {
    let client = ApiClient::new()?;
    let own_id = client.user_id().unwrap_or_default();

    let mut page_data = messages::fetch_page(&client, conversation_id, page, limit).await?;
    if page_data.messages.is_empty() {
        println!("(no messages)");
        return Ok(());
    }

    page_data.messages.sort_by_key(|m| m.created_at);
    for msg in &page_data.messages {
        let who = if msg.sender_id == own_id {
            "you"
        } else {
            msg.sender_id.as_str()
        };
        println!("[{}] {}: {}", msg.created_at.to_rfc3339(), who, msg.content);
    }

    if let Some(ref meta) = page_data.pagination {
        println!("\n(page {} of {}, {} total)", meta.page, meta.pages, meta.total);
    }

    Ok(())
}

/// List all registered users.
pub async fn list_users() -> Result<()> {
    let client = ApiClient::new()?;
    let users = users::list(&client).await?;

    if users.is_empty() {
        println!("(no users)");
        return Ok(());
    }
    for user in &users {
        println!(
            "{} (id: {}){}",
            user.username,
            user.id,
            if user.is_active { "" } else { " [inactive]" }
        );
    }
    Ok(())
}

/// Print the ids of currently online users.
pub async fn list_online() -> Result<()> {
    let client = ApiClient::new()?;
    let ids = users::online_ids(&client).await?;

    if ids.is_empty() {
        println!("(nobody online)");
    } else {
        for id in &ids {
            println!("{}", id);
        }
    }
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let end = text
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max.saturating_sub(3))
        .last()
        .unwrap_or(0);
    format!("{}...", &text[..end])
}
