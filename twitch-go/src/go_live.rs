//! The go-live state machine.
//!
//! ```text
//! Idle -> AuthResolving -> MetadataUpdating -> [BroadcastStarting] -> Done
//!              \                  \                    \
//!               `------------------`--------------------`--> Failed(kind)
//! ```
//!
//! Channel metadata is always written before the stream is started. Writing metadata twice is
//! harmless, while starting a stream is not something we can take back, so a failure on the OBS
//! side leaves the (already updated) metadata in place and is reported as partial completion.

use crate::config::Preset;
use crate::error::{Error, ErrorKind, Result};
use crate::interaction::Interaction;
use crate::oauth::TokenManager;
use crate::obs::BroadcastController;
use crate::tokens::TokenSet;
use crate::twitch_api::{ChannelUpdate, MetadataApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoLiveState {
    Idle,
    AuthResolving,
    MetadataUpdating,
    BroadcastStarting,
    Done,
    Failed(ErrorKind),
}

/// What was (or was about to be) written to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoLiveRequest {
    pub preset_key: String,
    pub title: String,
    /// Collected for the record; nothing is sent anywhere with it.
    pub notification: String,
    pub category_id: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// `defaults.obs.auto_start` is off.
    Disabled,
    AlreadyLive,
    Started,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoLiveReport {
    pub request: GoLiveRequest,
    pub broadcast: BroadcastOutcome,
}

#[derive(Debug, Clone, Copy)]
pub struct GoLiveOptions {
    /// Ask before touching the channel.
    pub confirm: bool,
    /// Start streaming in OBS after the metadata update.
    pub auto_start: bool,
}

impl Default for GoLiveOptions {
    fn default() -> Self {
        Self {
            confirm: true,
            auto_start: true,
        }
    }
}

/// One go-live run. Construct, [`run`](GoLive::run) once, then inspect.
pub struct GoLive<'a, M, B> {
    tokens: &'a TokenManager<'a>,
    metadata: &'a M,
    controller: &'a B,
    options: GoLiveOptions,
    state: GoLiveState,
    history: Vec<GoLiveState>,
    metadata_updated: bool,
}

impl<'a, M, B> GoLive<'a, M, B>
where
    M: MetadataApi,
    B: BroadcastController,
{
    pub fn new(
        tokens: &'a TokenManager<'a>,
        metadata: &'a M,
        controller: &'a B,
        options: GoLiveOptions,
    ) -> Self {
        Self {
            tokens,
            metadata,
            controller,
            options,
            state: GoLiveState::Idle,
            history: vec![GoLiveState::Idle],
            metadata_updated: false,
        }
    }

    pub fn state(&self) -> GoLiveState {
        self.state
    }

    /// Every state this run has been in, starting with `Idle`.
    pub fn history(&self) -> &[GoLiveState] {
        &self.history
    }

    /// Whether the channel metadata was written, which stays true even if the run later fails.
    pub fn metadata_updated(&self) -> bool {
        self.metadata_updated
    }

    /// Takes the channel live with `preset`, ending in either `Done` or `Failed`.
    pub async fn run(
        &mut self,
        preset: &Preset,
        interaction: &mut impl Interaction,
    ) -> Result<GoLiveReport> {
        let result = self.drive(preset, interaction).await;
        match &result {
            Ok(report) => {
                tracing::info!(preset = preset.key, broadcast = ?report.broadcast, "went live");
                self.transition(GoLiveState::Done);
            }
            Err(e) => {
                tracing::warn!(
                    preset = preset.key,
                    metadata_updated = self.metadata_updated,
                    error = %e,
                    "go-live failed"
                );
                self.transition(GoLiveState::Failed(e.kind()));
            }
        }
        result
    }

    async fn drive(
        &mut self,
        preset: &Preset,
        interaction: &mut impl Interaction,
    ) -> Result<GoLiveReport> {
        let manager = self.tokens;
        let metadata = self.metadata;

        self.transition(GoLiveState::AuthResolving);
        let mut tokens = manager.acquire(interaction).await?;
        let account_id = manager
            .with_retry(&mut tokens, async |t: &TokenSet| {
                metadata.resolve_account_id(t.access_token()).await
            })
            .await?;

        self.transition(GoLiveState::MetadataUpdating);
        let title = interaction.ask("Default title", &preset.defaults.title)?;
        let notification = interaction.ask(
            "Go-live notification (stored only)",
            &preset.defaults.go_live_notification,
        )?;
        if !preset.tags.is_empty() {
            interaction.notify(&format!("\nTags:\n{}", preset.tags.join(", ")));
        }
        if self.options.confirm && !interaction.confirm("Proceed?")? {
            return Err(Error::Aborted);
        }

        let category = preset.game.category.as_str();
        let title_ref = title.as_str();
        let account = account_id.as_str();
        let tags = preset.tags.as_slice();
        let category_id = manager
            .with_retry(&mut tokens, async |t: &TokenSet| {
                let category_id = metadata
                    .resolve_category_id(t.access_token(), category)
                    .await?;
                let update = ChannelUpdate::new(title_ref, &category_id, tags);
                metadata
                    .patch_metadata(t.access_token(), account, &update)
                    .await?;
                Ok(category_id)
            })
            .await?;
        self.metadata_updated = true;
        interaction.notify("✓ Twitch metadata updated");

        let broadcast = if self.options.auto_start {
            self.transition(GoLiveState::BroadcastStarting);
            self.start_broadcast(interaction).await?
        } else {
            tracing::debug!("auto_start disabled, leaving OBS alone");
            BroadcastOutcome::Disabled
        };
        interaction.notify("✓ Go live complete");

        Ok(GoLiveReport {
            request: GoLiveRequest {
                preset_key: preset.key.clone(),
                title,
                notification,
                category_id,
                tags: preset.tags.clone(),
            },
            broadcast,
        })
    }

    async fn start_broadcast(
        &self,
        interaction: &mut impl Interaction,
    ) -> Result<BroadcastOutcome> {
        if self.controller.query_status().await?.active {
            interaction.notify("OBS is already streaming");
            return Ok(BroadcastOutcome::AlreadyLive);
        }
        self.controller.start().await?;
        interaction.notify("✓ OBS stream started");
        Ok(BroadcastOutcome::Started)
    }

    fn transition(&mut self, next: GoLiveState) {
        tracing::debug!(from = ?self.state, to = ?next, "go-live transition");
        self.state = next;
        self.history.push(next);
    }
}
