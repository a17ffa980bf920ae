//! The `gamelink` binary: connect to a game server and keep the link alive.

use std::time::Duration;

use clap::Parser;
use gamelink_app::game_loop::GameLoop;
use gamelink_app::platform::PlatformDirs;
use gamelink_app::session::Session;
use gamelink_config::{CliArgs, Config};

fn main() {
    let args = CliArgs::parse();

    let dirs = match &args.config {
        Some(root) => Ok(PlatformDirs::resolve_with_root(root)),
        None => PlatformDirs::resolve(),
    };
    let dirs = match dirs.and_then(|dirs| dirs.create_dirs().map(|()| dirs)) {
        Ok(dirs) => dirs,
        Err(e) => {
            eprintln!("Failed to initialize platform directories: {e}");
            std::process::exit(1);
        }
    };

    let mut config = match Config::load_or_create(&dirs.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config, using defaults: {e}");
            Config::default()
        }
    };
    config.apply_cli_overrides(&args);

    gamelink_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    tracing::info!(
        host = %config.network.host,
        port = config.network.port,
        config_dir = %dirs.config_dir.display(),
        "gamelink starting"
    );

    let mut session = Session::start(&config, Duration::from_secs(1));
    let mut game_loop = GameLoop::new();
    while !session.gave_up() {
        game_loop.tick(|dt| session.step(dt));
        std::thread::sleep(game_loop.until_next_step());
    }

    session.shutdown();
    tracing::info!(frames = game_loop.frame_count(), "gamelink stopped");
}
