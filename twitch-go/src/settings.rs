//! Process-wide settings: Twitch app credentials, API endpoints and the OBS connection.
//!
//! [`Settings`] is built exactly once at startup and then only ever handed out by reference.
//! Nothing below this module reads the environment on its own.

use crate::error::{Error, Result};
use oauth2::{ClientId, ClientSecret, RedirectUrl};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_BASE: &str = "https://api.twitch.tv/helix";
pub const OAUTH_BASE: &str = "https://id.twitch.tv/oauth2";

const DEFAULT_OBS_HOST: &str = "localhost";
const DEFAULT_OBS_PORT: u16 = 4455;

/// Twitch application credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub redirect_uri: RedirectUrl,
}

/// Base URLs for the Helix API and the OAuth endpoints.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub api_base: String,
    pub oauth_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: API_BASE.to_string(),
            oauth_base: OAUTH_BASE.to_string(),
        }
    }
}

/// Where to find obs-websocket.
#[derive(Clone)]
pub struct ObsConnection {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl std::fmt::Debug for ObsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub endpoints: Endpoints,
    pub obs: ObsConnection,
    /// Applies to every Twitch request, including token exchange.
    pub http_timeout: Duration,
    /// Applies to one whole OBS operation: connect, handshake, request, response.
    pub obs_timeout: Duration,
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, treating empty values as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| {
                Error::Configuration(format!("Missing required environment variable: {key}"))
            })
        };

        let client_id = ClientId::new(require("TWITCH_CLIENT_ID")?);
        let client_secret = ClientSecret::new(require("TWITCH_CLIENT_SECRET")?);
        let redirect_uri = RedirectUrl::new(require("TWITCH_REDIRECT_URI")?).map_err(|e| {
            Error::Configuration(format!("TWITCH_REDIRECT_URI is not a valid URL: {e}"))
        })?;

        let port = match get("OBS_WS_PORT") {
            Some(port) => port.trim().parse().map_err(|_| {
                Error::Configuration(format!("OBS_WS_PORT is not a valid port number: {port}"))
            })?,
            None => DEFAULT_OBS_PORT,
        };

        Ok(Self {
            credentials: Credentials {
                client_id,
                client_secret,
                redirect_uri,
            },
            endpoints: Endpoints::default(),
            obs: ObsConnection {
                host: get("OBS_WS_HOST").unwrap_or_else(|| DEFAULT_OBS_HOST.to_string()),
                port,
                password: get("OBS_WS_PASSWORD"),
            },
            http_timeout: Duration::from_secs(10),
            obs_timeout: Duration::from_secs(5),
        })
    }

    /// The OBS connection, provided it is complete enough to be used.
    pub fn controller(&self) -> Result<&ObsConnection> {
        if self.obs.password.is_none() {
            return Err(Error::Configuration("OBS_WS_PASSWORD not set".to_string()));
        }
        Ok(&self.obs)
    }
}

/// Files that make up the application directory (`~/.twitch-go` by default).
#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.twitch-go`.
    pub fn default_root() -> Result<Self> {
        let home = home::home_dir().ok_or_else(|| {
            Error::Configuration("home directory not found: set HOME or pass --home".to_string())
        })?;
        Ok(Self::new(home.join(".twitch-go")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn env_file(&self) -> PathBuf {
        self.root.join(".env")
    }

    pub fn token_file(&self) -> PathBuf {
        self.root.join("tokens.json")
    }
}
