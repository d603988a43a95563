//! Configuration surface, mirroring `game/core/src/config.rs`'s
//! `serdeconv`-backed TOML structs: one struct per top-level table, a
//! `Default` impl giving every field a sane value, and a `load` that reads a
//! TOML file into the struct.

use crate::error::{Error, ErrorKind, Result};
use serde_derive::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub signing_key: String,
    pub access_token_expiry_seconds: u64,
    pub refresh_token_expiry_seconds: u64,
    pub jwt_algorithm: String,
    pub rsa_private_key_pem: Option<String>,
    pub rsa_public_key_pem: Option<String>,
    pub rate_limit_max_attempts: u32,
    pub rate_limit_window_seconds: u64,
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> AuthConfig {
        AuthConfig {
            signing_key: String::from("change-me-in-production"),
            access_token_expiry_seconds: 900,
            refresh_token_expiry_seconds: 604_800,
            jwt_algorithm: String::from("HS256"),
            rsa_private_key_pem: None,
            rsa_public_key_pem: None,
            rate_limit_max_attempts: 5,
            rate_limit_window_seconds: 60,
            min_password_length: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub tcp_port: u16,
    pub websocket_port: u16,
    pub auth_timeout_seconds: u64,
    pub rate_limit_capacity: u32,
    pub rate_limit_refill_rate: u32,
    pub max_connections: u32,
    pub idle_timeout_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> GatewayConfig {
        GatewayConfig {
            tcp_port: 28_100,
            websocket_port: 28_101,
            auth_timeout_seconds: 30,
            rate_limit_capacity: 100,
            rate_limit_refill_rate: 20,
            max_connections: 4_096,
            idle_timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub tick_rate: u32,
    pub max_instances: u32,
}

impl Default for GameConfig {
    fn default() -> GameConfig {
        GameConfig {
            tick_rate: 20,
            max_instances: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    pub game: GameConfig,
}

impl ServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ServerConfig> {
        serdeconv::from_toml_file(path)
            .map_err(|e| Error::new(ErrorKind::InvalidArgument, format!("loading config: {e}")))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        serdeconv::to_toml_file(self, path)
            .map_err(|e| Error::new(ErrorKind::InvalidArgument, format!("saving config: {e}")))
    }
}
