//! `s2t` — front-end for the `spotify_to_tidal` sync tool.
//!
//! Persists non-secret settings per user, keeps secrets in the platform
//! keyring, and runs the external tool with a per-run ephemeral config,
//! streaming its output to stdout.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use s2t::command::{SyncAction, build_args};
use s2t::coordinator::{
    Coordinator, DEFAULT_MODULE, DEFAULT_PYTHON, Event, LaunchSpec, RunOutcome,
};
use s2t::credentials::{CredentialOverrides, Credentials, write_ephemeral_config};
use s2t::exit_codes;
use s2t::secrets::{KeyringStore, SPOTIFY_CLIENT_SECRET, SecretStore, TIDAL_PASSWORD};
use s2t::settings::{Settings, default_settings_path, load_settings, save_settings};

/// Fixed short interval for draining the output queue.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(
    name = "s2t",
    version,
    about = "Front-end for the spotify_to_tidal sync tool"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync one Spotify playlist URL to TIDAL.
    Sync {
        /// Spotify playlist URL.
        playlist_url: String,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Sync liked/favorite tracks.
    Favorites {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Sync all playlists on the account.
    Playlists {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Run a custom subcommand of the external tool.
    Custom {
        /// Subcommand token; defaults to the `default_subcommand` setting.
        subcommand: Option<String>,
        /// Optional playlist URL passed as the next argument.
        playlist_url: Option<String>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Show or change persisted settings.
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// Manage keyring-stored secrets.
    Secret {
        #[command(subcommand)]
        command: SecretCommand,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Extra flags passed through to the external tool (shell-quoted).
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    flags: String,

    /// Python interpreter used to run the external module.
    #[arg(long, default_value = DEFAULT_PYTHON)]
    python: String,

    /// Module name of the external tool.
    #[arg(long, default_value = DEFAULT_MODULE)]
    module: String,

    /// Spotify client secret for this run, bypassing the secret store.
    #[arg(long)]
    client_secret: Option<String>,

    /// TIDAL password for this run, bypassing the secret store.
    #[arg(long)]
    tidal_password: Option<String>,

    /// Settings file path (defaults to the per-user location).
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print the settings document and its path.
    Show {
        #[arg(long)]
        settings: Option<PathBuf>,
    },
    /// Set one settings key and save the whole document.
    Set {
        key: String,
        value: String,
        #[arg(long)]
        settings: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SecretCommand {
    /// Store a secret read from stdin (avoids secrets in the process list).
    Set {
        /// `spotify_client_secret` or `tidal_password`.
        name: String,
    },
    /// Remove both secrets from the keyring.
    Clear,
}

fn main() {
    s2t::logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Sync { playlist_url, run } => cmd_run(
            SyncAction::Playlist { url: playlist_url },
            &run,
        ),
        Command::Favorites { run } => cmd_run(SyncAction::Favorites, &run),
        Command::Playlists { run } => cmd_run(SyncAction::AllPlaylists, &run),
        Command::Custom {
            subcommand,
            playlist_url,
            run,
        } => {
            let settings = load_settings(&settings_path(run.settings.as_ref())?);
            let subcommand = subcommand.unwrap_or(settings.default_subcommand);
            cmd_run(
                SyncAction::Custom {
                    subcommand,
                    playlist: playlist_url,
                },
                &run,
            )
        }
        Command::Settings { command } => cmd_settings(command),
        Command::Secret { command } => cmd_secret(command),
    }
}

fn settings_path(explicit: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.clone());
    }
    default_settings_path().context("no per-user config directory on this platform")
}

fn cmd_run(action: SyncAction, run: &RunArgs) -> Result<i32> {
    let path = settings_path(run.settings.as_ref())?;
    let mut settings = load_settings(&path);
    let store = KeyringStore;
    let overrides = CredentialOverrides {
        client_secret: run.client_secret.clone(),
        tidal_password: run.tidal_password.clone(),
    };

    // Validation happens entirely before anything touches disk or spawns.
    let credentials = Credentials::resolve(&settings, &store, &overrides)?;
    let args = build_args(&action, &run.flags)?;

    remember_playlist(&path, &mut settings, &action);

    let config = write_ephemeral_config(&credentials)?;
    let spec = LaunchSpec::for_module(&run.python, &run.module, args);
    println!("> Running: {}", spec.command_line());
    println!("> Using config: {}", config.config_path().display());

    let coordinator = Coordinator::new();
    coordinator.start(spec, config)?;

    let outcome = loop {
        let mut finished = None;
        for event in coordinator.poll() {
            match event {
                Event::Line(line) => println!("{line}"),
                Event::Finished(outcome) => finished = Some(outcome),
            }
        }
        if let Some(outcome) = finished {
            break outcome;
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(match outcome {
        RunOutcome::Succeeded => {
            println!("done (exit code 0)");
            exit_codes::OK
        }
        RunOutcome::Cancelled => {
            println!("run cancelled");
            exit_codes::CANCELLED
        }
        RunOutcome::Failed { message, .. } => {
            println!("{message}");
            exit_codes::SYNC_FAILED
        }
    })
}

/// Persist the playlist URL as the default for the next run. Best-effort:
/// a failed save never blocks the sync itself.
fn remember_playlist(path: &std::path::Path, settings: &mut Settings, action: &SyncAction) {
    let url = match action {
        SyncAction::Playlist { url } => url,
        SyncAction::Custom {
            playlist: Some(url),
            ..
        } => url,
        _ => return,
    };
    if settings.last_playlist_url == *url {
        return;
    }
    settings.last_playlist_url = url.clone();
    if let Err(err) = save_settings(path, settings) {
        warn!(err = %err, "could not persist last playlist url");
    }
}

fn cmd_settings(command: SettingsCommand) -> Result<i32> {
    match command {
        SettingsCommand::Show { settings } => {
            let path = settings_path(settings.as_ref())?;
            let settings = load_settings(&path);
            println!("# {}", path.display());
            println!(
                "{}",
                serde_json::to_string_pretty(&settings).context("serialize settings")?
            );
            Ok(exit_codes::OK)
        }
        SettingsCommand::Set {
            key,
            value,
            settings,
        } => {
            let path = settings_path(settings.as_ref())?;
            let mut current = load_settings(&path);
            set_settings_key(&mut current, &key, value)?;
            save_settings(&path, &current)?;
            Ok(exit_codes::OK)
        }
    }
}

fn set_settings_key(settings: &mut Settings, key: &str, value: String) -> Result<()> {
    match key {
        "spotify_client_id" => settings.spotify_client_id = value,
        "spotify_username" => settings.spotify_username = value,
        "spotify_redirect_uri" => settings.spotify_redirect_uri = value,
        "tidal_username" => settings.tidal_username = value,
        "last_playlist_url" => settings.last_playlist_url = value,
        "default_subcommand" => settings.default_subcommand = value,
        other => bail!(
            "unknown settings key `{other}` (expected one of: spotify_client_id, \
             spotify_username, spotify_redirect_uri, tidal_username, last_playlist_url, \
             default_subcommand)"
        ),
    }
    Ok(())
}

fn cmd_secret(command: SecretCommand) -> Result<i32> {
    let store = KeyringStore;
    match command {
        SecretCommand::Set { name } => {
            if name != SPOTIFY_CLIENT_SECRET && name != TIDAL_PASSWORD {
                bail!(
                    "unknown secret `{name}` (expected `{SPOTIFY_CLIENT_SECRET}` or \
                     `{TIDAL_PASSWORD}`)"
                );
            }
            let mut value = String::new();
            std::io::stdin()
                .read_line(&mut value)
                .context("read secret from stdin")?;
            let value = value.trim_end_matches(['\r', '\n']);
            if store.set(&name, value) {
                println!("secret `{name}` stored");
            } else {
                // Unavailable store degrades, it does not fail the command.
                eprintln!("warning: secret store unavailable, `{name}` was not stored");
            }
            Ok(exit_codes::OK)
        }
        SecretCommand::Clear => {
            let ok = store.delete(SPOTIFY_CLIENT_SECRET) & store.delete(TIDAL_PASSWORD);
            if ok {
                println!("secrets cleared");
            } else {
                eprintln!("warning: secret store unavailable, nothing to clear");
            }
            Ok(exit_codes::OK)
        }
    }
}
