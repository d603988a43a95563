//! Game server shell: the map-instance registry and the composition point
//! (`GameServer`) wrapping `fulcrum`'s tick loop and scheduler with the
//! player↔entity mapping.

pub mod instance;
pub mod server;

pub use instance::{Instance, InstanceId, InstanceManager};
pub use server::{GameServer, GameServerStats, PlayerSession};
