//! HTTP implementation of [`MetadataApi`].

use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::twitch_api::MetadataApi;
use crate::twitch_api::types::{ChannelUpdate, Game, HelixList, User};
use http::{Method, StatusCode};
use oauth2::{AccessToken, ClientId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

/// Client for the Twitch Helix API.
///
/// Holds no token of its own: every call takes the access token to use, which is what lets
/// [`crate::oauth::TokenManager::with_retry`] swap in a refreshed token between attempts.
#[derive(Debug, Clone)]
pub struct TwitchClient<'a> {
    client_id: &'a ClientId,
    api_base: &'a str,
    client: reqwest::Client,
}

impl<'a> TwitchClient<'a> {
    pub fn new(settings: &'a Settings, client: reqwest::Client) -> Self {
        Self {
            client_id: &settings.credentials.client_id,
            api_base: &settings.endpoints.api_base,
            client,
        }
    }

    /// Makes an authenticated request to Helix and classifies the response status.
    #[instrument(skip(self, token, json_body), level = tracing::Level::TRACE)]
    async fn make_authenticated_request(
        &self,
        method: Method,
        endpoint: &str,
        token: &AccessToken,
        query_params: &[(&str, &str)],
        json_body: Option<&impl Serialize>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/{endpoint}", self.api_base);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(token.secret())
            .header("Client-Id", self.client_id.as_str());

        if !query_params.is_empty() {
            request = request.query(query_params);
        }

        if let Some(body) = json_body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|source| Error::Http {
            context: format!("send {method} request to Twitch API: {url}"),
            source,
        })?;

        let status_code = response.status();
        if status_code == StatusCode::UNAUTHORIZED {
            return Err(Error::AuthRejected {
                endpoint: format!("{method} {url}"),
            });
        }
        if !status_code.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(Error::Upstream(format!(
                "Twitch API {method} {url} failed with status {status_code}: {error_text}"
            )));
        }

        Ok(response)
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        token: &AccessToken,
        query_params: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let response = self
            .make_authenticated_request(Method::GET, endpoint, token, query_params, None::<&()>)
            .await?;

        let list: HelixList<T> = response.json().await.map_err(|source| Error::Http {
            context: format!("parse Twitch {endpoint} response as JSON"),
            source,
        })?;

        Ok(list.data)
    }
}

impl MetadataApi for TwitchClient<'_> {
    #[instrument(skip(self, token), ret)]
    async fn resolve_account_id(&self, token: &AccessToken) -> Result<String> {
        let users: Vec<User> = self.get_list("users", token, &[]).await?;
        let user = users.into_iter().next().ok_or_else(|| {
            Error::Upstream("Twitch returned no user for this access token".to_string())
        })?;

        tracing::debug!(login = user.login, "resolved broadcaster");
        Ok(user.id)
    }

    #[instrument(skip(self, token), ret)]
    async fn resolve_category_id(&self, token: &AccessToken, name: &str) -> Result<String> {
        let games: Vec<Game> = self.get_list("games", token, &[("name", name)]).await?;

        tracing::debug!(returned_items = games.len(), "fetched categories");

        games
            .into_iter()
            .next()
            .map(|game| game.id)
            .ok_or_else(|| Error::CategoryNotFound {
                category: name.to_string(),
            })
    }

    #[instrument(skip(self, token), ret)]
    async fn patch_metadata(
        &self,
        token: &AccessToken,
        account_id: &str,
        update: &ChannelUpdate<'_>,
    ) -> Result<()> {
        let _response = self
            .make_authenticated_request(
                Method::PATCH,
                "channels",
                token,
                &[("broadcaster_id", account_id)],
                Some(update),
            )
            .await?;

        tracing::debug!(broadcaster_id = account_id, "updated channel information");
        Ok(())
    }
}
