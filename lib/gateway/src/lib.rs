//! Gateway: route table, per-connection session state machine, and the
//! composition point (`GatewayServer`) that wires both together with the
//! authentication service and a token-bucket rate limiter.

pub mod route;
pub mod server;
pub mod session;

pub use route::{is_reserved, RouteEntry, RouteTable};
pub use server::{opcode, GatewayAction, GatewayMetrics, GatewayServer};
pub use session::{ClientSession, SessionManager, SessionState};
