//! Take a Twitch channel live in one step.
//!
//! `twitch-go <preset>` updates the channel's title, category and tags from a named preset in
//! `config.yaml`, then tells OBS to start streaming if it isn't already. The pieces:
//!
//! - [`oauth`] and [`tokens`] keep a valid Twitch token pair on disk, refreshing when Twitch
//!   rejects the access token.
//! - [`twitch_api`] is the small slice of Helix we need.
//! - [`obs`] drives OBS over obs-websocket.
//! - [`go_live`] sequences all of the above.

pub mod config;
pub mod error;
pub mod go_live;
pub mod interaction;
pub mod oauth;
pub mod obs;
pub mod settings;
pub mod tokens;
pub mod twitch_api;

pub use error::{Error, ErrorKind, Result};

/// The HTTP client shared by the token manager and the Helix client.
pub fn http_client(settings: &settings::Settings) -> Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .timeout(settings.http_timeout)
        // SSRF no thank you.
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|source| Error::Http {
            context: "build HTTP client".to_string(),
            source,
        })
}
