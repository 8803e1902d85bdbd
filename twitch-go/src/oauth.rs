//! OAuth 2.0 token lifecycle for the Twitch API.
//!
//! This module owns everything about getting and keeping a usable [`TokenSet`]: the one-time
//! authorization-code grant, refreshing on demand, and running API calls under the bounded
//! refresh-and-retry policy of [`TokenManager::with_retry`].

use crate::error::{Error, Result};
use crate::interaction::Interaction;
use crate::settings::{Credentials, Endpoints, Settings};
use crate::tokens::{TokenSet, TokenStore};
use oauth2::basic::BasicClient;
use oauth2::url::Url;
use oauth2::{AuthUrl, AuthorizationCode, CsrfToken, Scope};
use std::ops::AsyncFnMut;

/// The only scope we need: updating the channel's title, category and tags.
pub const SCOPES: &str = "channel:manage:broadcast";

/// Obtains, refreshes and persists the Twitch token pair.
#[derive(Debug)]
pub struct TokenManager<'a> {
    credentials: &'a Credentials,
    endpoints: &'a Endpoints,
    store: TokenStore,
    http: reqwest::Client,
}

impl<'a> TokenManager<'a> {
    pub fn new(settings: &'a Settings, store: TokenStore, http: reqwest::Client) -> Self {
        Self {
            credentials: &settings.credentials,
            endpoints: &settings.endpoints,
            store,
            http,
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Builds the URL the user visits to approve the application, along with the `state` value
    /// the redirect must carry back.
    pub fn authorize_url(&self) -> Result<(Url, CsrfToken)> {
        let auth_url = AuthUrl::new(format!("{}/authorize", self.endpoints.oauth_base))
            .map_err(|e| Error::Configuration(format!("invalid OAuth base URL: {e}")))?;
        let client = BasicClient::new(self.credentials.client_id.clone())
            .set_auth_uri(auth_url)
            .set_redirect_uri(self.credentials.redirect_uri.clone());

        Ok(client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(SCOPES.to_string()))
            .url())
    }

    /// Returns the stored tokens, or walks the user through the authorization-code grant if
    /// there are none yet.
    pub async fn acquire(&self, interaction: &mut impl Interaction) -> Result<TokenSet> {
        if let Some(tokens) = self.store.load().await? {
            return Ok(tokens);
        }

        let (url, csrf) = self.authorize_url()?;
        tracing::info!(url = %url, "asking user to follow OAuth flow");
        interaction.show_authorization_url(&url);
        let pasted = interaction.ask("Paste ?code= value (or the whole redirect URL)", "")?;
        let code = parse_authorization_response(&pasted, &csrf)?;

        let tokens = self.exchange_code(code).await?;
        self.store.save(&tokens).await?;
        interaction.notify("✓ Twitch authorization saved");
        Ok(tokens)
    }

    /// Exchanges `current`'s refresh token for a fresh pair and persists it.
    ///
    /// On failure the stored tokens are left exactly as they were. A rejected refresh token is
    /// not recovered from here; the user has to authorize again.
    pub async fn refresh(&self, current: &TokenSet) -> Result<TokenSet> {
        tracing::debug!("attempting to refresh OAuth token");
        let tokens = self
            .request_tokens(
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", current.refresh_token().secret().as_str()),
                ],
                "refresh token",
            )
            .await
            .map_err(|e| match e {
                Error::Authorization(msg) => {
                    tracing::warn!(error = %msg, "OAuth refresh token rejected");
                    Error::Authorization(format!(
                        "{msg}; delete {} and re-run to authorize again",
                        self.store.path().display()
                    ))
                }
                e => e,
            })?;

        self.store.save(&tokens).await?;
        tracing::debug!("successfully refreshed OAuth token");
        Ok(tokens)
    }

    /// Runs `operation` with `tokens`, refreshing and retrying exactly once if Twitch rejects the
    /// access token.
    ///
    /// A successful refresh replaces `*tokens`. Failures other than a token rejection propagate
    /// immediately, and so does whatever the retry returns, rejection or not.
    pub async fn with_retry<T>(
        &self,
        tokens: &mut TokenSet,
        mut operation: impl AsyncFnMut(&TokenSet) -> Result<T>,
    ) -> Result<T> {
        match operation(&*tokens).await {
            Err(e) if e.is_auth_rejected() => {
                tracing::info!(error = %e, "access token rejected, refreshing once");
                *tokens = self.refresh(tokens).await?;
                operation(&*tokens).await
            }
            result => result,
        }
    }

    async fn exchange_code(&self, code: AuthorizationCode) -> Result<TokenSet> {
        self.request_tokens(
            &[
                ("grant_type", "authorization_code"),
                ("code", code.secret().as_str()),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ],
            "authorization code",
        )
        .await
    }

    async fn request_tokens(&self, grant: &[(&str, &str)], what: &str) -> Result<TokenSet> {
        let url = format!("{}/token", self.endpoints.oauth_base);
        let mut form = vec![
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.secret().as_str()),
        ];
        form.extend_from_slice(grant);

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|source| Error::Http {
                context: format!("exchange {what} with {url}"),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            // only a 4xx says anything about the code or refresh token itself
            return Err(if status.is_client_error() {
                Error::Authorization(format!("{what} rejected with status {status}: {body}"))
            } else {
                Error::Upstream(format!(
                    "Twitch token endpoint {url} failed with status {status}: {body}"
                ))
            });
        }

        response
            .json::<TokenSet>()
            .await
            .map_err(|e| Error::Authorization(format!("malformed token response for {what}: {e}")))
    }
}

/// Extracts the authorization code from what the user pasted.
///
/// Accepts the bare code, the `?code=...` query string, or the whole redirect URL. If a `state`
/// comes along it has to match the one we issued.
pub fn parse_authorization_response(pasted: &str, csrf: &CsrfToken) -> Result<AuthorizationCode> {
    let pasted = pasted.trim();
    if pasted.is_empty() {
        return Err(Error::Authorization(
            "no authorization code entered".to_string(),
        ));
    }

    let query = match Url::parse(pasted) {
        Ok(url) => url.query().unwrap_or("").to_string(),
        Err(_) if pasted.contains('=') => pasted
            .split_once('?')
            .map_or(pasted, |(_, query)| query)
            .to_string(),
        Err(_) => return Ok(AuthorizationCode::new(pasted.to_string())),
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        match &*k {
            "code" => code = Some(v.into_owned()),
            "state" => state = Some(v.into_owned()),
            "error" => error = Some(v.into_owned()),
            "error_description" => error_description = Some(v.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(Error::Authorization(format!(
            "Twitch returned {error}: {}",
            error_description.as_deref().unwrap_or("no description")
        )));
    }
    if state.is_some_and(|state| state != *csrf.secret()) {
        return Err(Error::Authorization(
            "the redirect's state does not match this authorization attempt".to_string(),
        ));
    }
    code.filter(|c| !c.is_empty())
        .map(AuthorizationCode::new)
        .ok_or_else(|| Error::Authorization("no authorization code found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::interaction::scripted::Script;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(oauth_base: &str) -> Settings {
        let mut settings = Settings::from_lookup(|key| {
            let value = match key {
                "TWITCH_CLIENT_ID" => Some("cid"),
                "TWITCH_CLIENT_SECRET" => Some("csecret"),
                "TWITCH_REDIRECT_URI" => Some("http://localhost"),
                _ => None,
            };
            value.map(str::to_string)
        })
        .unwrap();
        settings.endpoints.oauth_base = oauth_base.to_string();
        settings
    }

    fn token_response(access: &str, refresh: &str) -> serde_json::Value {
        json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": 14124,
            "scope": [SCOPES],
            "token_type": "bearer",
        })
    }

    async fn mount_refresh(server: &MockServer, response: ResponseTemplate, times: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(response)
            .expect(times)
            .mount(server)
            .await;
    }

    #[test]
    fn authorize_url_carries_client_and_scope() {
        let settings = settings("https://id.twitch.tv/oauth2");
        let dir = tempfile::tempdir().unwrap();
        let manager = TokenManager::new(
            &settings,
            TokenStore::new(dir.path().join("tokens.json")),
            reqwest::Client::new(),
        );

        let (url, csrf) = manager.authorize_url().unwrap();
        assert_eq!(url.path(), "/oauth2/authorize");
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "cid");
        assert_eq!(params["redirect_uri"], "http://localhost");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], SCOPES);
        assert_eq!(&params["state"], csrf.secret());
    }

    #[test]
    fn pasted_codes() {
        let csrf = CsrfToken::new("s1".to_string());

        let code = parse_authorization_response("  abc123 \n", &csrf).unwrap();
        assert_eq!(code.secret(), "abc123");

        let code =
            parse_authorization_response("?code=abc123&scope=channel%3Amanage%3Abroadcast", &csrf)
                .unwrap();
        assert_eq!(code.secret(), "abc123");

        let code = parse_authorization_response(
            "http://localhost/?code=abc123&scope=channel%3Amanage%3Abroadcast&state=s1",
            &csrf,
        )
        .unwrap();
        assert_eq!(code.secret(), "abc123");
    }

    #[test]
    fn pasted_redirects_that_are_not_usable() {
        let csrf = CsrfToken::new("s1".to_string());
        for pasted in [
            "",
            "http://localhost/?code=abc123&state=someone-else",
            "http://localhost/?error=access_denied&error_description=The+user+denied+you+access",
            "http://localhost/?scope=channel%3Amanage%3Abroadcast",
        ] {
            let err = parse_authorization_response(pasted, &csrf).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Authorization, "{pasted}: {err}");
        }
    }

    #[tokio::test]
    async fn acquire_prefers_stored_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let settings = settings(&server.uri());
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        store.save(&TokenSet::new("stored", "stored-rt")).await.unwrap();

        let manager = TokenManager::new(&settings, store, reqwest::Client::new());
        let mut script = Script::default();
        let tokens = manager.acquire(&mut script).await.unwrap();
        assert_eq!(tokens.access_token().secret(), "stored");
        assert!(script.authorization_urls.is_empty());
        assert!(script.asked.is_empty());
    }

    #[tokio::test]
    async fn acquire_runs_the_code_grant_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc123"))
            .and(body_string_contains("client_secret=csecret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_response("at", "rt")))
            .expect(1)
            .mount(&server)
            .await;

        let settings = settings(&server.uri());
        let dir = tempfile::tempdir().unwrap();
        let manager = TokenManager::new(
            &settings,
            TokenStore::new(dir.path().join("tokens.json")),
            reqwest::Client::new(),
        );

        let mut script = Script::default().answer("abc123");
        let tokens = manager.acquire(&mut script).await.unwrap();
        assert_eq!(tokens.access_token().secret(), "at");
        assert_eq!(script.authorization_urls.len(), 1);

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(manager.store().path()).unwrap())
                .unwrap();
        assert_eq!(on_disk, token_response("at", "rt"));

        // second run finds the saved tokens
        let mut script = Script::default();
        manager.acquire(&mut script).await.unwrap();
        assert!(script.authorization_urls.is_empty());
    }

    #[tokio::test]
    async fn rejected_code_is_an_authorization_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"status": 400, "message": "Invalid authorization code"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let settings = settings(&server.uri());
        let dir = tempfile::tempdir().unwrap();
        let manager = TokenManager::new(
            &settings,
            TokenStore::new(dir.path().join("tokens.json")),
            reqwest::Client::new(),
        );

        let mut script = Script::default().answer("stale");
        let err = manager.acquire(&mut script).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(err.to_string().contains("Invalid authorization code"), "{err}");
        assert!(!manager.store().path().exists());
    }

    #[tokio::test]
    async fn refresh_replaces_the_stored_record() {
        let server = MockServer::start().await;
        mount_refresh(
            &server,
            ResponseTemplate::new(200).set_body_json(token_response("at-2", "rt-2")),
            1,
        )
        .await;

        let settings = settings(&server.uri());
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        let old: TokenSet = serde_json::from_value(json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "only_in_old": "x",
        }))
        .unwrap();
        store.save(&old).await.unwrap();

        let manager = TokenManager::new(&settings, store, reqwest::Client::new());
        let fresh = manager.refresh(&old).await.unwrap();
        assert_eq!(fresh.access_token().secret(), "at-2");

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(manager.store().path()).unwrap())
                .unwrap();
        assert_eq!(on_disk, token_response("at-2", "rt-2"));

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("refresh_token=rt-1"), "{body}");
    }

    #[tokio::test]
    async fn failed_refresh_leaves_the_file_alone() {
        let server = MockServer::start().await;
        mount_refresh(
            &server,
            ResponseTemplate::new(400)
                .set_body_json(json!({"status": 400, "message": "Invalid refresh token"})),
            1,
        )
        .await;

        let settings = settings(&server.uri());
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        let old = TokenSet::new("at-1", "revoked");
        store.save(&old).await.unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let manager = TokenManager::new(&settings, store, reqwest::Client::new());
        let err = manager.refresh(&old).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(err.to_string().contains("re-run to authorize again"), "{err}");

        assert_eq!(std::fs::read(manager.store().path()).unwrap(), before);
    }

    #[tokio::test]
    async fn token_endpoint_outage_is_not_a_rejection() {
        let server = MockServer::start().await;
        mount_refresh(
            &server,
            ResponseTemplate::new(503).set_body_string("try later"),
            1,
        )
        .await;

        let settings = settings(&server.uri());
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        let old = TokenSet::new("at-1", "rt-1");
        store.save(&old).await.unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let manager = TokenManager::new(&settings, store, reqwest::Client::new());
        let err = manager.refresh(&old).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        let message = err.to_string();
        assert!(message.contains("503"), "{message}");
        assert!(message.contains("try later"), "{message}");
        assert!(!message.contains("authorize again"), "{message}");

        assert_eq!(std::fs::read(manager.store().path()).unwrap(), before);
    }

    #[tokio::test]
    async fn one_rejection_means_one_refresh_and_one_retry() {
        let server = MockServer::start().await;
        mount_refresh(
            &server,
            ResponseTemplate::new(200).set_body_json(token_response("at-2", "rt-2")),
            1,
        )
        .await;

        let settings = settings(&server.uri());
        let dir = tempfile::tempdir().unwrap();
        let manager = TokenManager::new(
            &settings,
            TokenStore::new(dir.path().join("tokens.json")),
            reqwest::Client::new(),
        );

        let mut tokens = TokenSet::new("at-1", "rt-1");
        let mut seen = Vec::new();
        let result = manager
            .with_retry(&mut tokens, async |t: &TokenSet| {
                seen.push(t.access_token().secret().clone());
                if t.access_token().secret() == "at-1" {
                    Err(Error::AuthRejected {
                        endpoint: "GET /users".into(),
                    })
                } else {
                    Ok("account-1")
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "account-1");
        assert_eq!(seen, ["at-1", "at-2"]);
        assert_eq!(tokens.access_token().secret(), "at-2");
    }

    #[tokio::test]
    async fn second_rejection_propagates() {
        let server = MockServer::start().await;
        mount_refresh(
            &server,
            ResponseTemplate::new(200).set_body_json(token_response("at-2", "rt-2")),
            1,
        )
        .await;

        let settings = settings(&server.uri());
        let dir = tempfile::tempdir().unwrap();
        let manager = TokenManager::new(
            &settings,
            TokenStore::new(dir.path().join("tokens.json")),
            reqwest::Client::new(),
        );

        let mut tokens = TokenSet::new("at-1", "rt-1");
        let mut calls = 0;
        let err = manager
            .with_retry(&mut tokens, async |_: &TokenSet| {
                calls += 1;
                Err::<(), _>(Error::AuthRejected {
                    endpoint: "GET /users".into(),
                })
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthRejected);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let server = MockServer::start().await;
        mount_refresh(&server, ResponseTemplate::new(200), 0).await;

        let settings = settings(&server.uri());
        let dir = tempfile::tempdir().unwrap();
        let manager = TokenManager::new(
            &settings,
            TokenStore::new(dir.path().join("tokens.json")),
            reqwest::Client::new(),
        );

        let mut tokens = TokenSet::new("at-1", "rt-1");
        let mut calls = 0;
        let err = manager
            .with_retry(&mut tokens, async |_: &TokenSet| {
                calls += 1;
                Err::<(), _>(Error::CategoryNotFound {
                    category: "VALORANT".into(),
                })
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(calls, 1);
        assert_eq!(tokens.access_token().secret(), "at-1");
    }

    #[tokio::test]
    async fn rejected_refresh_during_retry_is_not_retried_further() {
        let server = MockServer::start().await;
        mount_refresh(
            &server,
            ResponseTemplate::new(400)
                .set_body_json(json!({"status": 400, "message": "Invalid refresh token"})),
            1,
        )
        .await;

        let settings = settings(&server.uri());
        let dir = tempfile::tempdir().unwrap();
        let manager = TokenManager::new(
            &settings,
            TokenStore::new(dir.path().join("tokens.json")),
            reqwest::Client::new(),
        );

        let mut tokens = TokenSet::new("at-1", "rt-1");
        let mut calls = 0;
        let err = manager
            .with_retry(&mut tokens, async |_: &TokenSet| {
                calls += 1;
                Err::<(), _>(Error::AuthRejected {
                    endpoint: "GET /users".into(),
                })
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(calls, 1);
        assert_eq!(tokens.access_token().secret(), "at-1");
    }
}
