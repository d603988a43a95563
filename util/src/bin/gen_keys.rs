//! Generates a random hex-encoded HMAC signing key for `auth.signing_key`.

use clap::Parser;
use rand::RngCore;
use std::fs;

#[derive(Parser, Debug)]
#[command(name = "gen_keys", author = "Bush Hammer Industries", version, about = "Generates a signing key")]
struct Args {
    /// Key length in bytes.
    #[arg(long, default_value_t = 32)]
    length: usize,

    /// Write the key to this file instead of stdout.
    #[arg(long)]
    out: Option<String>,
}

fn main() {
    let args = Args::parse();

    let mut key = vec![0u8; args.length];
    rand::thread_rng().fill_bytes(&mut key);
    let hex_key = aether::encoding::hex_encode(&key);

    match args.out {
        Some(path) => {
            fs::write(&path, &hex_key).expect("failed to write key file");
            println!("Wrote {} byte key to {}", args.length, path);
        }
        None => println!("{hex_key}"),
    }
}
