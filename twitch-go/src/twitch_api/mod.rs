//! Twitch Helix client for the channel metadata we manage.
//!
//! Going live needs three calls:
//!
//! 1. `GET /users` with no arguments returns the user the token belongs to; its `id` doubles as
//!    the broadcaster id.
//! 2. `GET /games?name=` maps a human-readable category name to the id Helix wants. The first
//!    match wins.
//! 3. `PATCH /channels?broadcaster_id=` overwrites title, category and tags.
//!
//! Every response is classified: 2xx is success, 401 is [`Error::AuthRejected`] (the caller may
//! refresh and retry), anything else is [`Error::Upstream`].
//!
//! [`Error::AuthRejected`]: crate::error::Error::AuthRejected
//! [`Error::Upstream`]: crate::error::Error::Upstream

use crate::error::Result;
use oauth2::AccessToken;

pub mod client;
pub mod types;

pub use client::TwitchClient;
pub use types::{ChannelUpdate, Game, HelixList, User};

/// The remote broadcast-metadata API, as the go-live flow sees it.
#[allow(async_fn_in_trait)]
pub trait MetadataApi {
    /// The id of the account `token` belongs to.
    async fn resolve_account_id(&self, token: &AccessToken) -> Result<String>;

    /// The category id for `name`.
    async fn resolve_category_id(&self, token: &AccessToken, name: &str) -> Result<String>;

    async fn patch_metadata(
        &self,
        token: &AccessToken,
        account_id: &str,
        update: &ChannelUpdate<'_>,
    ) -> Result<()>;
}
