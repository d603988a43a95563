//! Writes a default `ServerConfig` TOML file.

use aether::config::ServerConfig;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "gen_config", author = "Bush Hammer Industries", version, about = "Generates a default server config file")]
struct Args {
    /// Path to the config file to write.
    out: String,
}

fn main() {
    let args = Args::parse();
    let config = ServerConfig::default();
    serdeconv::to_toml_file(&config, &args.out).expect("failed to write config file");
    println!("Wrote default configuration to {}", args.out);
}
