//! Argument construction for the external `spotify_to_tidal` tool.
//!
//! Pure string-in, list-out logic: each high-level action maps to a fixed
//! leading subcommand token, optionally followed by a user-supplied
//! argument, followed by the tokenized extra-flags string.

use anyhow::{Result, bail};

use crate::settings::DEFAULT_SUBCOMMAND;

/// High-level sync action selected by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Sync one Spotify playlist by URL.
    Playlist { url: String },
    /// Sync liked/favorite tracks.
    Favorites,
    /// Sync all playlists on the account.
    AllPlaylists,
    /// User-chosen subcommand, with an optional playlist argument.
    Custom {
        subcommand: String,
        playlist: Option<String>,
    },
}

/// Build the ordered argument list for the external tool.
///
/// Validation errors (an empty playlist URL for [`SyncAction::Playlist`])
/// surface here, before any process is spawned.
///
/// The `favorites` and `playlists` tokens vary across external-tool
/// versions; `Custom` is the escape hatch when the installed CLI disagrees.
pub fn build_args(action: &SyncAction, extra_flags: &str) -> Result<Vec<String>> {
    let mut args = match action {
        SyncAction::Playlist { url } => {
            let url = url.trim();
            if url.is_empty() {
                bail!("playlist URL is required for the sync action");
            }
            vec!["sync".to_string(), url.to_string()]
        }
        SyncAction::Favorites => vec!["favorites".to_string()],
        SyncAction::AllPlaylists => vec!["playlists".to_string()],
        SyncAction::Custom {
            subcommand,
            playlist,
        } => {
            let subcommand = subcommand.trim();
            let mut args = vec![if subcommand.is_empty() {
                DEFAULT_SUBCOMMAND.to_string()
            } else {
                subcommand.to_string()
            }];
            if let Some(playlist) = playlist {
                let playlist = playlist.trim();
                if !playlist.is_empty() {
                    args.push(playlist.to_string());
                }
            }
            args
        }
    };
    args.extend(split_flags(extra_flags));
    Ok(args)
}

/// Tokenize an extra-flags string, respecting shell-style quoting.
///
/// Malformed quoting falls back to naive whitespace splitting; this is a
/// best-effort, non-fatal parse.
pub fn split_flags(flags: &str) -> Vec<String> {
    let flags = flags.trim();
    if flags.is_empty() {
        return Vec::new();
    }
    shlex::split(flags).unwrap_or_else(|| flags.split_whitespace().map(str::to_string).collect())
}
