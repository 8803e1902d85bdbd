use clap::{Parser, Subcommand};
use eyre::{Context, bail};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use twitch_go::config::{AppConfig, IntroSection};
use twitch_go::go_live::{GoLive, GoLiveOptions};
use twitch_go::interaction::Terminal;
use twitch_go::oauth::TokenManager;
use twitch_go::obs::{self, ObsClient};
use twitch_go::settings::{AppPaths, Settings};
use twitch_go::tokens::TokenStore;
use twitch_go::twitch_api::TwitchClient;

/// Go live on Twitch using a preset.
#[derive(Debug, Parser)]
#[command(name = "twitch-go", version, disable_help_subcommand = true)]
struct Cli {
    /// Application directory holding config.yaml, .env and tokens.json.
    #[arg(long, env = "TWITCH_GO_HOME", global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stop OBS streaming.
    Stop,

    /// Show rig/streaming setup info (all sections by default).
    Intro {
        #[arg(long, conflicts_with_all = ["intro_only", "about_only"])]
        rig_only: bool,
        #[arg(long, conflicts_with = "about_only")]
        intro_only: bool,
        #[arg(long)]
        about_only: bool,
    },

    /// Go live using a preset from config.yaml.
    #[command(external_subcommand)]
    Preset(Vec<String>),
}

const USAGE: &str = "
Usage:
  twitch-go <preset>              Go live using a preset
  twitch-go stop                  Stop OBS streaming
  twitch-go intro                 Show rig/streaming setup info (all sections)
  twitch-go intro --rig-only      Show only rig information
  twitch-go intro --intro-only    Show only intro message
  twitch-go intro --about-only    Show only about section

Presets:";

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    let paths = match cli.home {
        Some(root) => AppPaths::new(root),
        None => AppPaths::default_root()?,
    };
    load_env_file(&paths)?;

    match cli.command {
        None => print_usage(&paths).await,
        Some(Command::Intro {
            rig_only,
            intro_only,
            about_only,
        }) => {
            let section = if rig_only {
                IntroSection::Rig
            } else if intro_only {
                IntroSection::Intro
            } else if about_only {
                IntroSection::About
            } else {
                IntroSection::All
            };
            let config = AppConfig::load(&paths.config_file()).await?;
            println!("{}", config.intro(section));
            Ok(())
        }
        Some(Command::Stop) => stop().await,
        Some(Command::Preset(args)) => {
            let [key] = args.as_slice() else {
                bail!("expected a single preset name, got: {}", args.join(" "));
            };
            go_live(&paths, key).await
        }
    }
}

/// Loads `<home>/.env` without overriding variables already set in the environment.
fn load_env_file(paths: &AppPaths) -> eyre::Result<()> {
    let env_file = paths.env_file();
    if !env_file.exists() {
        tracing::warn!(
            path = %env_file.display(),
            "env file not found, relying on OS environment variables"
        );
        return Ok(());
    }
    dotenvy::from_path(&env_file)
        .wrap_err_with(|| format!("load environment from {}", env_file.display()))
}

async fn print_usage(paths: &AppPaths) -> eyre::Result<()> {
    println!("{USAGE}");
    let config = AppConfig::load(&paths.config_file()).await?;
    for (key, preset) in &config.presets {
        println!("  {key:<10} -> {}", preset.game.name);
    }
    Ok(())
}

async fn stop() -> eyre::Result<()> {
    let settings = Settings::from_env()?;
    let obs = ObsClient::new(settings.controller()?, settings.obs_timeout);
    if obs::stop_if_live(&obs).await? {
        println!("✓ OBS stream stopped");
    } else {
        println!("OBS stream is not running");
    }
    Ok(())
}

async fn go_live(paths: &AppPaths, key: &str) -> eyre::Result<()> {
    let config = AppConfig::load(&paths.config_file()).await?;
    let preset = config.preset(key)?;
    let settings = Settings::from_env()?;

    let options = GoLiveOptions {
        confirm: config.defaults.prompts.confirm,
        auto_start: config.defaults.obs.auto_start,
    };
    if options.auto_start {
        // fail before anything is written to the channel
        settings.controller()?;
    }

    let http = twitch_go::http_client(&settings)?;
    let manager = TokenManager::new(&settings, TokenStore::new(paths.token_file()), http.clone());
    let twitch = TwitchClient::new(&settings, http);
    let obs = ObsClient::new(&settings.obs, settings.obs_timeout);

    let mut terminal = Terminal::stdio();
    let mut go_live = GoLive::new(&manager, &twitch, &obs, options);
    match go_live.run(preset, &mut terminal).await {
        Ok(_) => Ok(()),
        Err(e) if go_live.metadata_updated() => Err(eyre::Report::new(e)
            .wrap_err("Twitch metadata was updated, but OBS streaming was not started")),
        Err(e) => Err(e.into()),
    }
}
