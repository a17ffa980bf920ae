//! Configuration for the game link client.
//!
//! Settings persist to disk as a RON file and can be overridden from the
//! command line via clap. Unknown or missing fields fall back to defaults so
//! older and newer config files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, NetworkConfig};
pub use error::ConfigError;
