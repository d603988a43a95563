#![feature(proc_macro_hygiene, decl_macro)]
//! HTTP front door for `authsvc`: register/login/refresh/logout/validate
//! over JSON, grounded in `services/authenticator/src/main.rs`'s
//! `rocket::ignite()` + `State<T>` wiring.

use aether::config::ServerConfig;
use aether::logging;
use authsvc::{AuthService, AuthServiceConfig, InMemoryCredentialStore, InMemoryRefreshTokenStore, TokenIssuer};
use clap::Parser;
use rocket::{post, routes, State};
use rocket_contrib::json::Json;
use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "authd", author = "Bush Hammer Industries", version, about = "Runs the authentication service")]
struct Args {
    #[arg(long, default_value = "server.toml")]
    config: String,
}

#[derive(Deserialize)]
struct RegisterRequest {
    identifier: String,
    address: String,
    secret: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    user_id: u64,
    identifier: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    identifier: String,
    secret: String,
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Deserialize)]
struct LogoutRequest {
    refresh_token: String,
}

#[derive(Deserialize)]
struct ValidateRequest {
    access_token: String,
}

#[derive(Serialize)]
struct TokenPairResponse {
    access: String,
    refresh: String,
    access_ttl: u64,
    refresh_ttl: u64,
}

#[derive(Serialize)]
#[serde(tag = "result", content = "data")]
enum ApiResult<T> {
    Ok(T),
    Error { kind: String, message: String },
}

impl<T> From<aether::Result<T>> for ApiResult<T> {
    fn from(result: aether::Result<T>) -> Self {
        match result {
            Ok(value) => ApiResult::Ok(value),
            Err(e) => ApiResult::Error {
                kind: e.kind.to_string(),
                message: e.message,
            },
        }
    }
}

fn to_pair_response(pair: authsvc::TokenPair) -> TokenPairResponse {
    TokenPairResponse {
        access: pair.access,
        refresh: pair.refresh,
        access_ttl: pair.access_ttl,
        refresh_ttl: pair.refresh_ttl,
    }
}

#[post("/register", data = "<req>", format = "json")]
fn register(auth: State<AuthService>, req: Json<RegisterRequest>) -> Json<ApiResult<RegisterResponse>> {
    let result = auth
        .register(&req.identifier, &req.address, &req.secret)
        .map(|record| RegisterResponse {
            user_id: record.id,
            identifier: record.identifier,
        });
    Json(result.into())
}

#[post("/login", data = "<req>", format = "json")]
fn login(auth: State<AuthService>, req: Json<LoginRequest>, peer: PeerAddress) -> Json<ApiResult<TokenPairResponse>> {
    let result = auth.login(&req.identifier, &req.secret, &peer.0).map(to_pair_response);
    Json(result.into())
}

#[post("/refresh", data = "<req>", format = "json")]
fn refresh(auth: State<AuthService>, req: Json<RefreshRequest>) -> Json<ApiResult<TokenPairResponse>> {
    let result = auth.refresh(&req.refresh_token).map(to_pair_response);
    Json(result.into())
}

#[post("/logout", data = "<req>", format = "json")]
fn logout(auth: State<AuthService>, req: Json<LogoutRequest>) -> Json<ApiResult<()>> {
    Json(auth.logout(&req.refresh_token).into())
}

#[post("/validate", data = "<req>", format = "json")]
fn validate(auth: State<AuthService>, req: Json<ValidateRequest>) -> Json<ApiResult<authsvc::Claims>> {
    Json(auth.validate_access(&req.access_token).into())
}

/// Extracted from the connecting socket address; used only to key the
/// login-attempt rate limiter.
struct PeerAddress(String);

impl<'a, 'r> rocket::request::FromRequest<'a, 'r> for PeerAddress {
    type Error = std::convert::Infallible;

    fn from_request(request: &'a rocket::Request<'r>) -> rocket::request::Outcome<Self, Self::Error> {
        let addr = request
            .client_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        rocket::Outcome::Success(PeerAddress(addr))
    }
}

fn main() {
    let args = Args::parse();
    let log = logging::init();

    let config = match ServerConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            slog::warn!(log, "failed to load config, using defaults"; "path" => &args.config, "error" => %e);
            ServerConfig::default()
        }
    };

    let credentials = Arc::new(InMemoryCredentialStore::new());
    let refresh_tokens = Arc::new(InMemoryRefreshTokenStore::new());
    let issuer = TokenIssuer::hmac(config.auth.signing_key.as_bytes().to_vec(), None);
    let service_config = AuthServiceConfig {
        access_token_ttl: config.auth.access_token_expiry_seconds,
        refresh_token_ttl: config.auth.refresh_token_expiry_seconds,
        min_password_length: config.auth.min_password_length,
        rate_limit_max_attempts: config.auth.rate_limit_max_attempts,
        rate_limit_window_seconds: config.auth.rate_limit_window_seconds,
    };
    let auth_service = AuthService::new(credentials, refresh_tokens, issuer, service_config, &log);

    slog::info!(log, "starting authd");

    rocket::ignite()
        .mount("/auth", routes![register, login, refresh, logout, validate])
        .manage(auth_service)
        .launch();
}
