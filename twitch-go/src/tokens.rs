//! The persisted OAuth token pair.

use crate::error::{Error, Result};
use oauth2::{AccessToken, RefreshToken};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An access/refresh token pair as returned by the Twitch token endpoint.
///
/// Whatever else the provider returns (`expires_in`, `scope`, `token_type`, ...) rides along in
/// `extra` untouched, so a saved file contains exactly what the provider sent. There is no
/// expiry tracking: a token is good until Twitch says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    access_token: AccessToken,
    refresh_token: RefreshToken,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenSet {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: AccessToken::new(access_token.into()),
            refresh_token: RefreshToken::new(refresh_token.into()),
            extra: serde_json::Map::new(),
        }
    }

    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &RefreshToken {
        &self.refresh_token
    }

    /// Provider fields other than the two tokens.
    pub fn extra(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.extra
    }
}

/// Loads and saves the single [`TokenSet`] record.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Option<TokenSet>> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::token_store(
                    format!("read token file {}", self.path.display()),
                    e,
                ));
            }
        };
        let tokens = serde_json::from_str(&json).map_err(|e| {
            Error::Authorization(format!(
                "token file {} is malformed ({e}); delete it and re-run to authorize again",
                self.path.display()
            ))
        })?;
        tracing::debug!(path = %self.path.display(), "loaded stored tokens");
        Ok(Some(tokens))
    }

    /// Replaces the stored record with `tokens`.
    ///
    /// The new contents are written next to the token file and renamed over it, so the file is
    /// always either the old record or the new one.
    pub async fn save(&self, tokens: &TokenSet) -> Result<()> {
        let json = serde_json::to_string_pretty(tokens).map_err(|e| {
            Error::Authorization(format!("could not encode tokens for {}: {e}", self.path.display()))
        })?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::token_store(format!("create {}", dir.display()), e))?;
        }

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        tokio::fs::write(&staging, json)
            .await
            .map_err(|e| Error::token_store(format!("write {}", staging.display()), e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| Error::token_store(format!("replace {}", self.path.display()), e))?;

        tracing::debug!(path = %self.path.display(), "saved tokens");
        Ok(())
    }
}
