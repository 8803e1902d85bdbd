//! `config.yaml`: global defaults plus the named go-live presets.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    /// Presets in the order they appear in the file.
    #[serde(default)]
    pub presets: IndexMap<String, Preset>,
}

fn default_version() -> u32 {
    1
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub obs: ObsDefaults,
    #[serde(default)]
    pub prompts: PromptDefaults,
    pub intro: Option<String>,
    pub rig: Option<String>,
    pub about: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObsDefaults {
    /// Start streaming in OBS once the Twitch metadata is updated.
    #[serde(default = "enabled")]
    pub auto_start: bool,
}

impl Default for ObsDefaults {
    fn default() -> Self {
        Self { auto_start: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptDefaults {
    /// Ask "Proceed?" before touching the channel.
    #[serde(default = "enabled")]
    pub confirm: bool,
}

impl Default for PromptDefaults {
    fn default() -> Self {
        Self { confirm: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Preset {
    /// Filled in from the map key after parsing.
    #[serde(skip)]
    pub key: String,
    pub game: Game,
    pub defaults: PresetDefaults,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Game {
    /// Display name, used only for listings.
    pub name: String,
    /// The category name as Twitch knows it, resolved to an id at go-live time.
    pub category: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresetDefaults {
    pub title: String,
    #[serde(default)]
    pub go_live_notification: String,
}

/// Which block(s) `twitch-go intro` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntroSection {
    All,
    Intro,
    Rig,
    About,
}

impl AppConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let yaml = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::io(format!("read config file {}", path.display()), e)
        })?;
        Self::from_yaml(&yaml).map_err(|e| match e {
            Error::Configuration(msg) => {
                Error::Configuration(format!("{}: {msg}", path.display()))
            }
            e => e,
        })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: AppConfig = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Configuration(format!("invalid config: {e}")))?;
        for (key, preset) in &mut config.presets {
            preset.key.clone_from(key);
        }
        Ok(config)
    }

    pub fn preset(&self, key: &str) -> Result<&Preset> {
        self.presets
            .get(key)
            .ok_or_else(|| Error::Configuration(format!("Unknown preset: {key}")))
    }

    /// Renders the requested intro block(s), or a hint on how to configure them.
    pub fn intro(&self, section: IntroSection) -> String {
        let block = |text: &Option<String>| {
            text.as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        };
        let single = |text: &Option<String>, field: &str| {
            block(text).unwrap_or_else(|| {
                format!(
                    "No {field} information configured. \
                     Add a '{field}' field under 'defaults' in your config.yaml"
                )
            })
        };

        match section {
            IntroSection::Intro => single(&self.defaults.intro, "intro"),
            IntroSection::Rig => single(&self.defaults.rig, "rig"),
            IntroSection::About => single(&self.defaults.about, "about"),
            IntroSection::All => {
                let parts: Vec<String> = [
                    &self.defaults.intro,
                    &self.defaults.rig,
                    &self.defaults.about,
                ]
                .into_iter()
                .filter_map(block)
                .collect();
                if parts.is_empty() {
                    "No intro information configured. Add 'intro', 'rig', and/or 'about' \
                     fields under 'defaults' in your config.yaml"
                        .to_string()
                } else {
                    parts.join("\n\n")
                }
            }
        }
    }
}
