//! Error taxonomy for the go-live flow.
//!
//! Every failure the orchestration can hit is one [`Error`] variant, and every variant maps to an
//! [`ErrorKind`] so callers (and the state machine in [`crate::go_live`]) can reason about the
//! category of a failure without matching on message text.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing credentials, unknown preset, unreadable config.
    #[error("{0}")]
    Configuration(String),

    /// The token endpoint refused an authorization code or refresh token.
    #[error("Twitch authorization failed: {0}")]
    Authorization(String),

    /// The metadata API answered 401 for the access token we presented.
    #[error("Twitch rejected the access token for {endpoint}")]
    AuthRejected { endpoint: String },

    #[error("game category not found on Twitch: {category:?} (fix the preset's game.category)")]
    CategoryNotFound { category: String },

    #[error("{0}")]
    Upstream(String),

    #[error("{context}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("OBS is not reachable: {0}")]
    ControllerUnavailable(String),

    #[error("OBS is not reachable: {context}")]
    Websocket {
        context: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("OBS refused {request} (code {code}): {}", .comment.as_deref().unwrap_or("no comment"))]
    ControllerRejected {
        request: String,
        code: u16,
        comment: Option<String>,
    },

    #[error("aborted by user")]
    Aborted,

    /// Reading or writing the token file failed.
    #[error("{context} (if this persists, delete the token file and re-run to authorize again)")]
    TokenStore {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to interact with the terminal")]
    Interaction(#[source] std::io::Error),
}

/// The category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Authorization,
    AuthRejected,
    NotFound,
    Upstream,
    ControllerUnavailable,
    ControllerRejected,
    Aborted,
    Interaction,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) | Error::Io { .. } => ErrorKind::Configuration,
            Error::Authorization(_) | Error::TokenStore { .. } => ErrorKind::Authorization,
            Error::AuthRejected { .. } => ErrorKind::AuthRejected,
            Error::CategoryNotFound { .. } => ErrorKind::NotFound,
            Error::Upstream(_) | Error::Http { .. } => ErrorKind::Upstream,
            Error::ControllerUnavailable(_) | Error::Websocket { .. } => {
                ErrorKind::ControllerUnavailable
            }
            Error::ControllerRejected { .. } => ErrorKind::ControllerRejected,
            Error::Aborted => ErrorKind::Aborted,
            Error::Interaction(_) => ErrorKind::Interaction,
        }
    }

    /// Whether this failure means "the access token is no good", which is the only signal that
    /// warrants a token refresh.
    pub fn is_auth_rejected(&self) -> bool {
        self.kind() == ErrorKind::AuthRejected
    }

    pub(crate) fn token_store(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::TokenStore {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}
