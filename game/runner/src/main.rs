//! Game server process: loads configuration, wires the scheduler and the
//! plugin manager into a `gamesrv::GameServer`, and runs the tick loop until
//! killed.

use aether::config::ServerConfig;
use aether::logging;
use clap::Parser;
use fulcrum::Scheduler;
use gamesrv::GameServer;
use plugins::PluginManager;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "gamerunner", author = "Bush Hammer Industries", version, about = "Runs a game server instance")]
struct Args {
    #[arg(long, default_value = "server.toml")]
    config: String,

    /// Print the default configuration as TOML and exit.
    #[arg(long)]
    generate_config: bool,
}

fn main() {
    let args = Args::parse();

    if args.generate_config {
        let toml = serdeconv::to_toml_string(&ServerConfig::default()).expect("failed to render default config");
        println!("{toml}");
        return;
    }

    let log = logging::init();

    let config = match ServerConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            slog::warn!(log, "failed to load config, using defaults"; "path" => &args.config, "error" => %e);
            ServerConfig::default()
        }
    };

    let scheduler = Scheduler::new();
    let server = GameServer::new(config.game.tick_rate, scheduler, &log);
    let plugins = PluginManager::new(&log);

    if let Err(e) = plugins.initialize_all() {
        slog::error!(log, "plugin initialization failed"; "error" => %e);
    }
    if let Err(e) = plugins.activate_all() {
        slog::error!(log, "plugin activation failed"; "error" => %e);
    }

    if !server.start() {
        slog::error!(log, "failed to start game server");
        return;
    }
    slog::info!(log, "game server started"; "tick_rate" => config.game.tick_rate, "max_instances" => config.game.max_instances);

    // Plugin updates run on their own slow cadence here, independent of the
    // tick loop's scheduler, which runs on its dedicated thread.
    loop {
        thread::sleep(Duration::from_secs(5));
        plugins.update_all(5.0);
        let stats = server.stats();
        slog::info!(
            log,
            "tick stats";
            "tick" => stats.last_tick.tick_number,
            "players" => stats.active_players,
            "instances" => stats.active_instances,
            "budget_utilization" => stats.last_tick.budget_utilization,
        );
    }
}
