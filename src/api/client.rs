//! Authenticated HTTP client for the chat REST API
//!
//! Wraps reqwest::Client with bearer token injection and one transparent
//! refresh-and-retry on 401.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Mutex;

use crate::config::{Config, TokenStore};
use crate::models::{AuthData, Pagination};

/// Errors callers may need to branch on.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not logged in. Run 'chat-cli login' first.")]
    NotLoggedIn,
    #[error("Session expired. Run 'chat-cli login' again.")]
    SessionExpired,
    #[error("HTTP {status} for {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },
    #[error("{0}")]
    Validation(String),
}

/// Envelope every REST endpoint responds with.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
    pub pagination: Option<Pagination>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the `data` field, erroring with the server message if absent.
    pub fn into_data(self) -> Result<T> {
        self.data.with_context(|| {
            format!(
                "Missing data in response: {}",
                self.message.unwrap_or_else(|| "(no message)".to_string())
            )
        })
    }
}

/// Authenticated client. Bearer token is attached when present, so the same
/// client serves both anonymous (login/register) and authenticated calls.
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    config: Mutex<Config>,
}

impl ApiClient {
    /// Load config and build the client.
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        Ok(Self {
            base: config.server_url(),
            http: reqwest::Client::new(),
            config: Mutex::new(config),
        })
    }

    /// Id of the logged-in user, if any.
    pub fn user_id(&self) -> Option<String> {
        self.config.lock().unwrap().user_id.clone()
    }

    /// Username of the logged-in user, if any.
    pub fn username(&self) -> Option<String> {
        self.config.lock().unwrap().username.clone()
    }

    /// Current bearer token, if any. An expired token is still returned;
    /// the first 401 it earns goes through the refresh path.
    pub fn access_token(&self) -> Option<String> {
        let stored = self.config.lock().unwrap().get_access_token()?;
        if stored.is_expired() {
            tracing::debug!("Stored access token is expired, expecting a refresh on first 401");
        }
        Some(stored.token)
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Persist new tokens (after login/register/refresh).
    pub fn store_tokens(&self, access: String, refresh: String) -> Result<()> {
        let mut config = self.config.lock().unwrap();
        config.set_access_token(access, None);
        config.set_refresh_token(refresh);
        config.save()
    }

    /// Persist the logged-in identity alongside the tokens.
    pub fn store_identity(&self, user_id: String, username: String) -> Result<()> {
        let mut config = self.config.lock().unwrap();
        config.set_identity(user_id, username);
        config.save()
    }

    /// Drop all credentials (logout or unrecoverable auth failure).
    pub fn clear_credentials(&self) -> Result<()> {
        let mut config = self.config.lock().unwrap();
        config.clear_tokens();
        config.save()
    }

    /// GET `{base}{path}` and parse the envelope.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>> {
        self.request(reqwest::Method::GET, path, None).await
    }

    /// POST `{base}{path}` with a JSON body and parse the envelope.
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<ApiResponse<T>> {
        self.request(reqwest::Method::POST, path, Some(body)).await
    }

    /// PUT `{base}{path}` with a JSON body and parse the envelope.
    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<ApiResponse<T>> {
        self.request(reqwest::Method::PUT, path, Some(body)).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse<T>> {
        let url = format!("{}{}", self.base, path);

        let resp = self.send_once(method.clone(), &url, body).await?;

        if resp.status() != reqwest::StatusCode::UNAUTHORIZED {
            return parse_response(resp, &url).await;
        }

        // One transparent refresh, then a single retry. If the refresh
        // itself fails, credentials are cleared and the caller must
        // re-authenticate.
        tracing::debug!("401 for {}, attempting token refresh", url);
        if !self.refresh_tokens().await? {
            self.clear_credentials()?;
            return Err(ApiError::SessionExpired.into());
        }

        let retry = self.send_once(method, &url, body).await?;
        if retry.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.clear_credentials()?;
            return Err(ApiError::SessionExpired.into());
        }
        parse_response(retry, &url).await
    }

    async fn send_once(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        tracing::debug!("{} {}", method, url);

        let mut req = self.http.request(method, url);
        if let Some(token) = self.access_token() {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        req.send()
            .await
            .with_context(|| format!("Request to {} failed", url))
    }

    /// Exchange the stored refresh token for fresh tokens. Returns false
    /// when no refresh token is stored.
    async fn refresh_tokens(&self) -> Result<bool> {
        let refresh = match self.config.lock().unwrap().get_refresh_token() {
            Some(t) => t,
            None => return Ok(false),
        };

        let url = format!("{}/auth/refresh", self.base);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "refreshToken": refresh }))
            .send()
            .await
            .with_context(|| format!("Refresh request to {} failed", url))?;

        if !resp.status().is_success() {
            tracing::debug!("Token refresh rejected: {}", resp.status());
            return Ok(false);
        }

        let envelope: ApiResponse<AuthData> =
            resp.json().await.context("Failed to parse refresh response")?;
        let data = envelope.into_data()?;
        self.store_tokens(data.access_token, data.refresh_token)?;
        tracing::info!("Access token refreshed");
        Ok(true)
    }
}

/// Check the HTTP status and parse the envelope, returning a clear error on
/// failure.
async fn parse_response<T: DeserializeOwned>(
    resp: reqwest::Response,
    url: &str,
) -> Result<ApiResponse<T>> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Http {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        }
        .into());
    }

    resp.json()
        .await
        .with_context(|| format!("Failed to parse response from {}", url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_with_data_and_pagination() {
        let json = r#"{
            "success": true,
            "message": "ok",
            "data": {"value": 1},
            "pagination": {"page": 2, "limit": 50, "total": 150, "pages": 3}
        }"#;
        let resp: ApiResponse<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert!(resp.success);
        let meta = resp.pagination.as_ref().unwrap();
        assert_eq!(meta.page, 2);
        assert_eq!(meta.pages, 3);
        assert_eq!(resp.into_data().unwrap()["value"], 1);
    }

    #[test]
    fn test_envelope_missing_data_surfaces_server_message() {
        let json = r#"{"success": false, "message": "Invalid credentials"}"#;
        let resp: ApiResponse<serde_json::Value> = serde_json::from_str(json).unwrap();
        let err = resp.into_data().unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid credentials"));
    }

    #[test]
    fn test_envelope_defaults_are_lenient() {
        // Bare `{"data": ...}` responses still parse.
        let resp: ApiResponse<Vec<u32>> = serde_json::from_str(r#"{"data": [1, 2]}"#).unwrap();
        assert_eq!(resp.into_data().unwrap(), vec![1, 2]);
    }
}
