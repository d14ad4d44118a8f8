//! Configuration and credential storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default REST base URL when none is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000/api";

/// Stored access token with optional expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub expires_at: Option<u64>,
}

impl StoredToken {
    pub fn new(token: String, expires_in_secs: Option<u64>) -> Self {
        let expires_at = expires_in_secs.map(|secs| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs()
                + secs
        });

        Self { token, expires_at }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap()
                    .as_secs();
                // Consider expired if less than 60 seconds remaining
                now + 60 >= exp
            }
            None => false,
        }
    }
}

/// Token store trait for different storage backends
pub trait TokenStore {
    fn get_access_token(&self) -> Option<StoredToken>;
    fn set_access_token(&mut self, token: String, expires_in: Option<u64>);
    fn get_refresh_token(&self) -> Option<String>;
    fn set_refresh_token(&mut self, token: String);
    fn clear_tokens(&mut self);
}

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Stored access token (bearer header on every REST request)
    pub access_token: Option<StoredToken>,
    /// Stored refresh token (used once on a 401, see api::client)
    pub refresh_token: Option<String>,
    /// Cached id of the logged-in user
    pub user_id: Option<String>,
    /// Cached username of the logged-in user
    pub username: Option<String>,
    /// REST base URL override
    pub server_url: Option<String>,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "chat-cli", "chat-cli")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// REST base URL (configured override or localhost default).
    pub fn server_url(&self) -> String {
        self.server_url
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
    }

    pub fn set_identity(&mut self, user_id: String, username: String) {
        self.user_id = Some(user_id);
        self.username = Some(username);
    }
}

impl TokenStore for Config {
    fn get_access_token(&self) -> Option<StoredToken> {
        self.access_token.clone()
    }

    fn set_access_token(&mut self, token: String, expires_in: Option<u64>) {
        self.access_token = Some(StoredToken::new(token, expires_in));
    }

    fn get_refresh_token(&self) -> Option<String> {
        self.refresh_token.clone()
    }

    fn set_refresh_token(&mut self, token: String) {
        self.refresh_token = Some(token);
    }

    fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.user_id = None;
        self.username = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_without_expiry_never_expires() {
        let t = StoredToken::new("tok".into(), None);
        assert!(!t.is_expired());
    }

    #[test]
    fn test_token_expiry_slack() {
        // Expires in 30s: inside the 60s slack window, treated as expired.
        let t = StoredToken::new("tok".into(), Some(30));
        assert!(t.is_expired());

        let t = StoredToken::new("tok".into(), Some(3600));
        assert!(!t.is_expired());
    }

    #[test]
    fn test_clear_tokens_drops_identity() {
        let mut cfg = Config::default();
        cfg.set_access_token("a".into(), Some(3600));
        cfg.set_refresh_token("r".into());
        cfg.set_identity("u1".into(), "alice".into());

        cfg.clear_tokens();
        assert!(cfg.get_access_token().is_none());
        assert!(cfg.get_refresh_token().is_none());
        assert!(cfg.user_id.is_none());
    }
}
