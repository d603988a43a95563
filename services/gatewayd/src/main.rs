//! TCP front door for the gateway state machine: accepts connections with
//! `mio`, decodes/encodes wire frames, and drives `gateway::GatewayServer`.
//! Routing decisions that resolve to `GatewayAction::Forward` are logged;
//! handing the payload to the target game-server instance happens over
//! whatever service mesh transport a deployment wires in, which is out of
//! scope here.

use aether::config::ServerConfig;
use aether::frame::{Frame, HEADER_LEN};
use aether::logging;
use aether::SessionId;
use authsvc::{AuthService, AuthServiceConfig, InMemoryCredentialStore, InMemoryRefreshTokenStore, TokenIssuer};
use clap::Parser;
use gateway::{GatewayAction, GatewayServer};
use hashbrown::HashMap;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "gatewayd", author = "Bush Hammer Industries", version, about = "Runs the client-facing gateway")]
struct Args {
    /// Path to the server configuration TOML file.
    #[arg(long, default_value = "server.toml")]
    config: String,
}

struct Connection {
    stream: TcpStream,
    session_id: SessionId,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    closing: bool,
}

const SERVER_TOKEN: Token = Token(0);
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(3);

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

    let auth = Arc::new(build_auth_service(&config, &log));
    let gateway = Arc::new(GatewayServer::new(
        config.gateway.max_connections as usize,
        config.gateway.rate_limit_capacity,
        config.gateway.rate_limit_refill_rate,
        config.gateway.idle_timeout_seconds,
        config.gateway.auth_timeout_seconds,
        auth,
        &log,
    ));
    gateway.start();

    let addr = format!("0.0.0.0:{}", config.gateway.tcp_port).parse().expect("invalid bind address");
    let mut listener = TcpListener::bind(addr).expect("failed to bind gateway listener");

    let mut poll = Poll::new().expect("failed to create poll");
    poll.registry()
        .register(&mut listener, SERVER_TOKEN, Interest::READABLE)
        .expect("failed to register listener");

    let mut events = Events::with_capacity(1024);
    let mut connections: HashMap<Token, Connection> = HashMap::new();
    let mut next_token = 1usize;
    let started_at = Instant::now();
    let mut last_housekeeping = started_at;

    slog::info!(log, "gatewayd listening"; "port" => config.gateway.tcp_port);

    loop {
        poll.poll(&mut events, Some(Duration::from_millis(100))).expect("poll failed");

        for event in events.iter() {
            match event.token() {
                SERVER_TOKEN => accept_loop(&listener, &mut poll, &mut connections, &mut next_token, &gateway, &log),
                token => {
                    if event.is_readable() {
                        handle_readable(token, &mut connections, &gateway, &log);
                    }
                    if event.is_writable() {
                        handle_writable(token, &mut connections);
                    }
                }
            }
        }

        connections.retain(|token, conn| {
            let keep = !conn.closing || !conn.write_buf.is_empty();
            if !keep {
                let _ = poll.registry().deregister(&mut conn.stream);
                gateway.handle_disconnect(conn.session_id);
                slog::debug!(log, "connection closed"; "token" => token.0);
            }
            keep
        });

        let now = Instant::now();
        if now.duration_since(last_housekeeping) >= HOUSEKEEPING_INTERVAL {
            last_housekeeping = now;
            let elapsed = aether::time::timestamp_secs();
            let idle = gateway.cleanup_idle_sessions(elapsed);
            let timed_out = gateway.cleanup_expired_auth(elapsed);
            if !idle.is_empty() || !timed_out.is_empty() {
                slog::debug!(log, "session housekeeping"; "idle" => idle.len(), "auth_timeout" => timed_out.len());
            }
        }
    }
}

fn build_auth_service(config: &ServerConfig, log: &slog::Logger) -> AuthService {
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
    AuthService::new(credentials, refresh_tokens, issuer, service_config, log)
}

fn accept_loop(
    listener: &TcpListener,
    poll: &mut Poll,
    connections: &mut HashMap<Token, Connection>,
    next_token: &mut usize,
    gateway: &Arc<GatewayServer>,
    log: &slog::Logger,
) {
    loop {
        match listener.accept() {
            Ok((mut stream, peer)) => {
                let token = Token(*next_token);
                *next_token += 1;
                let session_id = SessionId::from(token.0 as u64);

                if gateway.handle_connect(session_id, &peer.to_string(), aether::time::timestamp_secs()).is_err() {
                    slog::warn!(log, "connection rejected"; "peer" => %peer);
                    continue;
                }

                poll.registry()
                    .register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)
                    .expect("failed to register connection");

                connections.insert(
                    token,
                    Connection {
                        stream,
                        session_id,
                        read_buf: Vec::new(),
                        write_buf: Vec::new(),
                        closing: false,
                    },
                );
                slog::debug!(log, "connection accepted"; "peer" => %peer, "token" => token.0);
            }
            Err(e) if e.kind() == IoErrorKind::WouldBlock => break,
            Err(e) => {
                slog::warn!(log, "accept failed"; "error" => %e);
                break;
            }
        }
    }
}

fn handle_readable(token: Token, connections: &mut HashMap<Token, Connection>, gateway: &Arc<GatewayServer>, log: &slog::Logger) {
    let Some(conn) = connections.get_mut(&token) else { return };
    let mut chunk = [0u8; 4096];

    loop {
        match conn.stream.read(&mut chunk) {
            Ok(0) => {
                conn.closing = true;
                break;
            }
            Ok(n) => conn.read_buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == IoErrorKind::WouldBlock => break,
            Err(_) => {
                conn.closing = true;
                break;
            }
        }
    }

    while conn.read_buf.len() >= HEADER_LEN {
        match Frame::decode(&conn.read_buf) {
            Ok(frame) => {
                let consumed = HEADER_LEN + frame.payload.len();
                conn.read_buf.drain(..consumed);
                dispatch_frame(conn, frame, gateway, log);
            }
            Err(_) => break,
        }
    }
}

fn dispatch_frame(conn: &mut Connection, frame: Frame, gateway: &Arc<GatewayServer>, log: &slog::Logger) {
    let now = aether::time::timestamp_secs();
    match gateway.handle_message(conn.session_id, frame.opcode, &frame.payload, now) {
        Ok(GatewayAction::Reply { opcode, payload }) => {
            conn.write_buf.extend_from_slice(&Frame::new(opcode, payload).encode());
        }
        Ok(GatewayAction::Forward { service }) => {
            slog::debug!(log, "frame routed"; "session" => conn.session_id.0, "service" => %service, "opcode" => frame.opcode);
        }
        Ok(GatewayAction::Drop { reason }) => {
            slog::debug!(log, "frame dropped"; "session" => conn.session_id.0, "reason" => %reason);
        }
        Err(e) => {
            slog::warn!(log, "message handling failed"; "session" => conn.session_id.0, "error" => %e);
        }
    }
}

fn handle_writable(token: Token, connections: &mut HashMap<Token, Connection>) {
    let Some(conn) = connections.get_mut(&token) else { return };
    if conn.write_buf.is_empty() {
        return;
    }

    match conn.stream.write(&conn.write_buf) {
        Ok(n) => {
            conn.write_buf.drain(..n);
        }
        Err(e) if e.kind() == IoErrorKind::WouldBlock => {}
        Err(_) => conn.closing = true,
    }
}
