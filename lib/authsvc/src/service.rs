//! Authentication service: orchestrates the rate limiter, stores, token
//! issuer, and validator behind register/login/refresh/logout/validate/
//! revoke/cleanup. A struct holding its collaborators plus a logger, with
//! one method per externally visible operation and `slog` call sites at
//! each branch.

use crate::model::{RefreshTokenRecord, TokenPair, UserRecord, UserStatus};
use crate::store::{CredentialStore, RefreshTokenStore};
use crate::token::TokenIssuer;
use aether::ratelimit::SlidingWindowLimiter;
use aether::{crypto, time, validator, Error, ErrorKind, Result};
use slog::Logger;
use std::sync::Arc;

pub struct AuthServiceConfig {
    pub access_token_ttl: u64,
    pub refresh_token_ttl: u64,
    pub min_password_length: usize,
    pub rate_limit_max_attempts: u32,
    pub rate_limit_window_seconds: u64,
}

pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    issuer: TokenIssuer,
    login_limiter: SlidingWindowLimiter,
    config: AuthServiceConfig,
    log: Logger,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        issuer: TokenIssuer,
        config: AuthServiceConfig,
        log: &Logger,
    ) -> Self {
        let login_limiter = SlidingWindowLimiter::new(
            config.rate_limit_max_attempts,
            std::time::Duration::from_secs(config.rate_limit_window_seconds),
        );
        AuthService {
            credentials,
            refresh_tokens,
            issuer,
            login_limiter,
            config,
            log: log.new(slog::o!("component" => "authsvc")),
        }
    }

    fn hash_secret(secret: &str, salt: &str) -> String {
        let mut input = Vec::with_capacity(salt.len() + secret.len());
        input.extend_from_slice(salt.as_bytes());
        input.extend_from_slice(secret.as_bytes());
        aether::encoding::hex_encode(&crypto::sha256(&input))
    }

    /// Validate all three inputs, check uniqueness, hash with a fresh salt,
    /// and persist.
    pub fn register(&self, identifier: &str, address: &str, secret: &str) -> Result<UserRecord> {
        let (valid, reason) = validator::validate_identifier(identifier);
        if !valid {
            return Err(Error::new(ErrorKind::InvalidUsername, reason));
        }
        let (valid, reason) = validator::validate_address(address);
        if !valid {
            return Err(Error::new(ErrorKind::InvalidEmail, reason));
        }
        let (valid, reason) = validator::validate_secret(secret, self.config.min_password_length);
        if !valid {
            return Err(Error::new(ErrorKind::WeakPassword, reason));
        }

        if self.credentials.find_by_identifier(identifier).is_some() {
            return Err(Error::new(ErrorKind::UserAlreadyExists, "identifier already taken"));
        }
        if self.credentials.find_by_address(address).is_some() {
            return Err(Error::new(ErrorKind::UserAlreadyExists, "address already taken"));
        }

        let salt = crypto::random_hex(16);
        let password_hash = Self::hash_secret(secret, &salt);
        let record = self.credentials.create(identifier, address, &password_hash, &salt)?;

        slog::info!(self.log, "user registered"; "user_id" => record.id, "identifier" => identifier);
        Ok(record)
    }

    /// Consume the sliding-window quota, verify credentials in constant
    /// time, issue a fresh access/refresh pair, and reset the quota.
    pub fn login(&self, identifier: &str, secret: &str, peer_address: &str) -> Result<TokenPair> {
        if !self.login_limiter.allow(peer_address) {
            slog::warn!(self.log, "login rate limited"; "peer" => peer_address);
            return Err(Error::new(ErrorKind::RateLimitExceeded, "too many login attempts"));
        }

        let user = match self.credentials.find_by_identifier(identifier) {
            Some(user) if user.status == UserStatus::Active => user,
            _ => {
                slog::info!(self.log, "login failed"; "reason" => "invalid credentials", "identifier" => identifier);
                return Err(Error::new(ErrorKind::InvalidCredentials, "invalid identifier or secret"));
            }
        };

        let expected_hash = Self::hash_secret(secret, &user.salt);
        if !crypto::constant_time_eq(expected_hash.as_bytes(), user.password_hash.as_bytes()) {
            slog::info!(self.log, "login failed"; "reason" => "invalid credentials", "identifier" => identifier);
            return Err(Error::new(ErrorKind::InvalidCredentials, "invalid identifier or secret"));
        }

        let pair = self.issue_pair(&user)?;
        self.login_limiter.reset(peer_address);
        slog::info!(self.log, "login succeeded"; "user_id" => user.id, "identifier" => identifier);
        Ok(pair)
    }

    fn issue_pair(&self, user: &UserRecord) -> Result<TokenPair> {
        let access = self.issuer.issue_access(
            &user.id.to_string(),
            &user.identifier,
            &user.roles,
            self.config.access_token_ttl,
        )?;
        let refresh = self.issuer.issue_refresh();
        let now = time::timestamp_secs();
        self.refresh_tokens.store(RefreshTokenRecord {
            token: refresh.clone(),
            user_id: user.id,
            expires_at: now + self.config.refresh_token_ttl,
            revoked: false,
        })?;

        Ok(TokenPair {
            access,
            refresh,
            access_ttl: self.config.access_token_ttl,
            refresh_ttl: self.config.refresh_token_ttl,
        })
    }

    /// Rotate a refresh token: revoke the presented one, issue a new pair.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let record = self
            .refresh_tokens
            .find(refresh_token)
            .ok_or_else(|| Error::new(ErrorKind::InvalidToken, "refresh token not found"))?;

        if record.revoked {
            return Err(Error::new(ErrorKind::TokenRevoked, "refresh token has been revoked"));
        }
        let now = time::timestamp_secs();
        if now > record.expires_at {
            return Err(Error::new(ErrorKind::RefreshTokenExpired, "refresh token has expired"));
        }

        let user = self
            .credentials
            .find_by_id(record.user_id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "user not found"))?;

        self.refresh_tokens.revoke(refresh_token)?;
        let pair = self.issue_pair(&user)?;
        slog::info!(self.log, "refresh rotated"; "user_id" => user.id);
        Ok(pair)
    }

    /// Revoke every refresh token belonging to the owner of `refresh_token`
    /// (all-device logout).
    pub fn logout(&self, refresh_token: &str) -> Result<()> {
        let record = self
            .refresh_tokens
            .find(refresh_token)
            .ok_or_else(|| Error::new(ErrorKind::InvalidToken, "refresh token not found"))?;
        self.refresh_tokens.revoke_all_for_user(record.user_id)?;
        slog::info!(self.log, "logout"; "user_id" => record.user_id);
        Ok(())
    }

    /// Delegates to the token issuer's verify, including the revocation
    /// check.
    pub fn validate_access(&self, access_token: &str) -> Result<crate::model::Claims> {
        self.issuer.verify(access_token)
    }

    /// Validate the token; succeed idempotently if it's already expired or
    /// revoked; otherwise add `(jti, exp)` to the revocation set.
    pub fn revoke_access(&self, access_token: &str) -> Result<()> {
        let claims = match self.issuer.verify(access_token) {
            Ok(claims) => claims,
            Err(e) if e.kind == ErrorKind::TokenExpired || e.kind == ErrorKind::TokenRevoked => return Ok(()),
            Err(e) => return Err(e),
        };

        let revocation_set = self
            .issuer
            .revocation_set()
            .ok_or_else(|| Error::new(ErrorKind::InvalidToken, "no revocation set wired in"))?;
        let now = time::timestamp_secs();
        revocation_set.revoke(&claims.jti, claims.exp, now);
        Ok(())
    }

    /// Sweep expired revocation entries and expired refresh tokens; return
    /// the total removed.
    pub fn cleanup_revocations(&self) -> usize {
        let now = time::timestamp_secs();
        let revoked = match self.issuer.revocation_set() {
            Some(set) => {
                let before = set.len();
                set.cleanup(now);
                before - set.len()
            }
            None => 0,
        };
        let expired_refresh = self.refresh_tokens.remove_expired(now);
        revoked + expired_refresh
    }
}
