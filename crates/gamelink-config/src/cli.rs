//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Game link client command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "gamelink", about = "Persistent TCP game client")]
pub struct CliArgs {
    /// Server host name or address.
    #[arg(long)]
    pub host: Option<String>,

    /// Server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Connect attempts before giving up.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Seconds of connected time between heartbeat pings.
    #[arg(long)]
    pub heartbeat_interval: Option<f32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref host) = args.host {
            self.network.host = host.clone();
        }
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(retries) = args.max_retries {
            self.network.max_retries = retries;
        }
        if let Some(secs) = args.heartbeat_interval {
            self.network.heartbeat_interval_secs = secs;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
