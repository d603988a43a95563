//! Gateway server: the composition point wiring the session
//! manager, route table, token-bucket limiter, and authentication service
//! into `handleConnect`/`handleDisconnect`/`handleMessage` plus the
//! reserved-opcode handler and migration/cleanup operations.

use crate::route::{is_reserved, RouteTable};
use crate::session::SessionManager;
use aether::frame::Frame;
use aether::ratelimit::TokenBucketLimiter;
use aether::{Error, ErrorKind, Result, SessionId};
use authsvc::AuthService;
use slog::Logger;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Reserved opcodes the gateway handles itself.
pub mod opcode {
    pub const AUTHENTICATE: u16 = 0x0001;
    pub const AUTH_RESULT: u16 = 0x0002;
    pub const SERVER_TRANSFER: u16 = 0x0010;
    pub const MIGRATION_ACK: u16 = 0x0011;
    pub const PING: u16 = 0x00FE;
    pub const PONG: u16 = 0x00FF;
}

/// What the network layer should do in response to an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayAction {
    Forward { service: String },
    Reply { opcode: u16, payload: Vec<u8> },
    Drop { reason: String },
}

fn drop_with(reason: impl Into<String>) -> GatewayAction {
    GatewayAction::Drop { reason: reason.into() }
}

#[derive(Default, Debug)]
pub struct GatewayMetrics {
    pub routed: u64,
    pub dropped: u64,
    pub auth_successes: u64,
    pub auth_failures: u64,
    pub rate_hits: u64,
}

struct Counters {
    routed: AtomicU64,
    dropped: AtomicU64,
    auth_successes: AtomicU64,
    auth_failures: AtomicU64,
    rate_hits: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Counters {
            routed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            auth_successes: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            rate_hits: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> GatewayMetrics {
        GatewayMetrics {
            routed: self.routed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            auth_successes: self.auth_successes.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            rate_hits: self.rate_hits.load(Ordering::Relaxed),
        }
    }
}

pub struct GatewayServer {
    running: AtomicBool,
    sessions: SessionManager,
    routes: RouteTable,
    rate_limiter: TokenBucketLimiter,
    auth: Arc<AuthService>,
    counters: Counters,
    idle_timeout: u64,
    auth_timeout: u64,
    log: Logger,
}

impl GatewayServer {
    pub fn new(
        max_sessions: usize,
        rate_limit_capacity: u32,
        rate_limit_refill_rate: u32,
        idle_timeout: u64,
        auth_timeout: u64,
        auth: Arc<AuthService>,
        log: &Logger,
    ) -> Self {
        GatewayServer {
            running: AtomicBool::new(false),
            sessions: SessionManager::new(max_sessions),
            routes: RouteTable::new(),
            rate_limiter: TokenBucketLimiter::new(rate_limit_capacity, rate_limit_refill_rate),
            auth,
            counters: Counters::new(),
            idle_timeout,
            auth_timeout,
            log: log.new(slog::o!("component" => "gateway")),
        }
    }

    pub fn start(&self) -> bool {
        !self.running.swap(true, Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn metrics(&self) -> GatewayMetrics {
        self.counters.snapshot()
    }

    pub fn handle_connect(&self, id: SessionId, peer_address: &str, now: u64) -> Result<()> {
        if !self.is_running() {
            return Err(Error::new(ErrorKind::GatewayNotStarted, "gateway is not running"));
        }
        if !self.sessions.create_session(id, peer_address, now) {
            return Err(Error::new(
                ErrorKind::ConnectionLimitReached,
                "capacity reached or duplicate session id",
            ));
        }
        Ok(())
    }

    pub fn handle_disconnect(&self, id: SessionId) {
        if let Some(session) = self.sessions.get(id) {
            self.rate_limiter.remove(&session.peer_address);
        }
        self.sessions.remove_session(id);
    }

    pub fn handle_message(&self, id: SessionId, opcode: u16, payload: &[u8], now: u64) -> Result<GatewayAction> {
        if !self.is_running() {
            return Err(Error::new(ErrorKind::GatewayNotStarted, "gateway is not running"));
        }

        let session = self
            .sessions
            .get(id)
            .ok_or_else(|| Error::new(ErrorKind::SessionNotFound, "no session for this id"))?;

        if !self.rate_limiter.consume(&session.peer_address, 1) {
            self.counters.rate_hits.fetch_add(1, Ordering::Relaxed);
            return Err(Error::new(ErrorKind::GatewayRateLimited, "message rate limit exceeded"));
        }

        self.sessions.touch_session(id, now);

        if is_reserved(opcode) {
            return Ok(self.handle_reserved(id, opcode, payload, now));
        }

        let route = match self.routes.resolve(opcode) {
            Some(route) => route,
            None => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                return Ok(drop_with("no route for opcode"));
            }
        };

        if route.requires_auth && session.state != crate::session::SessionState::Authenticated {
            return Err(Error::new(ErrorKind::ClientNotAuthenticated, "route requires authentication"));
        }

        self.counters.routed.fetch_add(1, Ordering::Relaxed);
        Ok(GatewayAction::Forward { service: route.service })
    }

    fn handle_reserved(&self, id: SessionId, opcode: u16, payload: &[u8], now: u64) -> GatewayAction {
        match opcode {
            opcode::AUTHENTICATE => self.handle_authenticate(id, payload, now),
            opcode::MIGRATION_ACK => {
                if self.sessions.complete_migration(id) {
                    drop_with("migration ack processed")
                } else {
                    drop_with("not in migration state")
                }
            }
            opcode::PONG => drop_with("pong received, activity already touched"),
            // AuthResult, ServerTransfer, Ping are server->client only.
            _ => drop_with("unknown gateway opcode"),
        }
    }

    fn handle_authenticate(&self, id: SessionId, payload: &[u8], now: u64) -> GatewayAction {
        let session = match self.sessions.get(id) {
            Some(s) => s,
            None => return drop_with("session vanished before authenticate"),
        };
        if session.state != crate::session::SessionState::Unauthenticated {
            return drop_with("already past unauthenticated state");
        }

        let token = match std::str::from_utf8(payload) {
            Ok(token) => token,
            Err(_) => {
                self.counters.auth_failures.fetch_add(1, Ordering::Relaxed);
                return GatewayAction::Reply {
                    opcode: opcode::AUTH_RESULT,
                    payload: vec![0x01],
                };
            }
        };

        match self.auth.validate_access(token) {
            Ok(claims) => {
                let user_id: u64 = claims.sub.parse().unwrap_or(0);
                self.sessions.authenticate_session(id, claims, user_id, now);
                self.counters.auth_successes.fetch_add(1, Ordering::Relaxed);
                slog::info!(self.log, "authenticated"; "session" => id.0, "user_id" => user_id);
                GatewayAction::Reply {
                    opcode: opcode::AUTH_RESULT,
                    payload: vec![0x00],
                }
            }
            Err(e) => {
                self.counters.auth_failures.fetch_add(1, Ordering::Relaxed);
                slog::info!(self.log, "authentication failed"; "session" => id.0, "reason" => e.message.clone());
                GatewayAction::Reply {
                    opcode: opcode::AUTH_RESULT,
                    payload: vec![0x01],
                }
            }
        }
    }

    /// Moves the session to Migrating; the network layer is expected to
    /// deliver a `ServerTransfer` frame carrying `service`.
    pub fn initiate_server_transfer(&self, id: SessionId, service: &str) -> Result<Frame> {
        if !self.sessions.begin_migration(id, service) {
            return Err(Error::new(ErrorKind::MigrationFailed, "session is not in Authenticated state"));
        }
        Ok(Frame::new(opcode::SERVER_TRANSFER, service.as_bytes().to_vec()))
    }

    pub fn cleanup_idle_sessions(&self, now: u64) -> Vec<SessionId> {
        let idle = self.sessions.find_idle_sessions(self.idle_timeout, now);
        for id in &idle {
            self.handle_disconnect(*id);
        }
        idle
    }

    pub fn cleanup_expired_auth(&self, now: u64) -> Vec<SessionId> {
        let expired = self.sessions.find_expired_auth_sessions(self.auth_timeout, now);
        for id in &expired {
            self.handle_disconnect(*id);
        }
        expired
    }
}
