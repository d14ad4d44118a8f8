//! Authentication endpoints (login, register, refresh handled in client)

use anyhow::{Context, Result};
use serde::Deserialize;

use super::client::{ApiClient, ApiError};
use crate::models::{AuthData, AuthUser};

/// `GET /auth/me` response: some backend versions wrap the user, others
/// return it bare.
#[derive(Debug, Deserialize)]
struct MeData {
    user: Option<AuthUser>,
    #[serde(flatten)]
    bare: Option<AuthUser>,
}

/// Log in and persist tokens + identity.
pub async fn login(client: &ApiClient, email: &str, password: &str) -> Result<AuthUser> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::Validation("Email and password are required".into()).into());
    }

    let body = serde_json::json!({ "email": email, "password": password });
    let resp: super::client::ApiResponse<AuthData> = client.post("/auth/login", &body).await?;
    let data = resp.into_data()?;

    let user = data.user.context("Login response missing user")?;
    client.store_tokens(data.access_token, data.refresh_token)?;
    client.store_identity(user.id.clone(), user.username.clone())?;
    tracing::info!("Logged in as {}", user.username);
    Ok(user)
}

/// Register a new account and persist tokens + identity.
///
/// Password confirmation is checked here, before any network call.
pub async fn register(
    client: &ApiClient,
    username: &str,
    email: &str,
    password: &str,
    confirm: &str,
) -> Result<AuthUser> {
    if username.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::Validation("Username, email and password are required".into()).into());
    }
    if password != confirm {
        return Err(ApiError::Validation("Passwords do not match".into()).into());
    }

    let body = serde_json::json!({
        "username": username,
        "email": email,
        "password": password,
    });
    let resp: super::client::ApiResponse<AuthData> = client.post("/auth/register", &body).await?;
    let data = resp.into_data()?;

    let user = data.user.context("Register response missing user")?;
    client.store_tokens(data.access_token, data.refresh_token)?;
    client.store_identity(user.id.clone(), user.username.clone())?;
    tracing::info!("Registered as {}", user.username);
    Ok(user)
}

/// Validate the stored token against `GET /auth/me`.
pub async fn me(client: &ApiClient) -> Result<AuthUser> {
    let resp: super::client::ApiResponse<MeData> = client.get("/auth/me").await?;
    let data = resp.into_data()?;
    data.user
        .or(data.bare)
        .context("User data not found in response")
}

/// `PUT /auth/profile` with only the provided fields.
pub async fn update_profile(
    client: &ApiClient,
    username: Option<&str>,
    email: Option<&str>,
    current_password: Option<&str>,
    new_password: Option<&str>,
) -> Result<AuthUser> {
    let mut body = serde_json::Map::new();
    if let Some(v) = username {
        body.insert("username".into(), v.into());
    }
    if let Some(v) = email {
        body.insert("email".into(), v.into());
    }
    if let Some(v) = current_password {
        body.insert("currentPassword".into(), v.into());
    }
    if let Some(v) = new_password {
        body.insert("newPassword".into(), v.into());
    }
    if body.is_empty() {
        return Err(ApiError::Validation("Nothing to update".into()).into());
    }

    let resp: super::client::ApiResponse<MeData> = client
        .put("/auth/profile", &serde_json::Value::Object(body))
        .await?;
    let data = resp.into_data()?;
    let user = data
        .user
        .or(data.bare)
        .context("Profile response missing user")?;
    client.store_identity(user.id.clone(), user.username.clone())?;
    Ok(user)
}

/// Forget stored credentials. Best-effort server-side logout first.
pub async fn logout(client: &ApiClient) -> Result<()> {
    if client.access_token().is_some() {
        let resp: Result<super::client::ApiResponse<serde_json::Value>> =
            client.post("/auth/logout", &serde_json::json!({})).await;
        if let Err(e) = resp {
            tracing::debug!("Server-side logout failed (ignored): {:#}", e);
        }
    }
    client.clear_credentials()?;
    tracing::info!("Logged out");
    Ok(())
}
