//! User/refresh-token/claims data model, serde-derived the way
//! `services/authenticator/src/core.rs` derives `UserInfo`/`Ban`/`Note`.

use serde_derive::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum UserStatus {
    Active,
    Suspended,
    Deleted,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: u64,
    pub identifier: String,
    pub address: String,
    pub password_hash: String,
    pub salt: String,
    pub status: UserStatus,
    pub roles: Vec<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub token: String,
    pub user_id: u64,
    pub expires_at: u64,
    pub revoked: bool,
}

/// Decoded bearer-token claims (JWT payload: `sub`, `usr`, `roles`,
/// `jti`, `iat`, `exp`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub usr: String,
    pub roles: Vec<String>,
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
}

/// Result of a successful login or refresh: a fresh access/refresh pair and
/// their TTLs in seconds.
#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    pub access_ttl: u64,
    pub refresh_ttl: u64,
}
