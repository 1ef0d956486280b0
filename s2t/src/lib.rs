//! Headless front-end core for the `spotify_to_tidal` CLI.
//!
//! This crate wraps the external `spotify_to_tidal` tool: it persists
//! non-secret settings, keeps secrets in the platform keyring, builds the
//! argument list for a selected sync action, materializes an ephemeral
//! clear-text credentials document per run, and coordinates the child
//! process while streaming its output line-by-line through a queue.
//!
//! The architecture separates:
//!
//! - **[`command`]**: Pure argument construction. No I/O, fully testable
//!   in isolation.
//! - **[`settings`], [`secrets`], [`credentials`]**: Persistence and
//!   credential resolution. Degrade rather than fail when the backing
//!   stores are unavailable.
//! - **[`coordinator`]**: The one piece of process machinery — spawn,
//!   stream, cancel, clean up.
//!
//! The CLI binary is the sole built-in caller of the coordinator's
//! `start`/`cancel`/`poll` contract; a GUI embedding would consume the
//! same API.

pub mod command;
pub mod coordinator;
pub mod credentials;
pub mod exit_codes;
pub mod logging;
pub mod secrets;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
