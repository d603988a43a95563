//! Game server shell: owns the tick loop, the scheduler, the
//! player↔entity mapping, and the instance registry. All mutating
//! operations are serialised with respect to the tick via a mutex held
//! across the player-table mutation.

use crate::instance::{InstanceId, InstanceManager};
use aether::{EntityId, Error, ErrorKind, PlayerId, Result};
use fulcrum::{Scheduler, TickLoop, TickMetrics};
use hashbrown::HashMap;
use slog::Logger;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Clone, Debug)]
pub struct PlayerSession {
    pub player_id: PlayerId,
    pub entity: EntityId,
    pub instance_id: InstanceId,
}

#[derive(Default, Debug, Clone)]
pub struct GameServerStats {
    pub active_players: usize,
    pub active_instances: usize,
    pub last_tick: TickMetrics,
}

struct SharedState {
    instances: InstanceManager,
    players: RwLock<HashMap<PlayerId, PlayerSession>>,
    next_entity: AtomicU64,
}

pub struct GameServer {
    shared: Arc<SharedState>,
    scheduler: Arc<Mutex<Scheduler>>,
    tick_loop: TickLoop,
    log: Logger,
}

impl GameServer {
    pub fn new(tick_rate: u32, scheduler: Scheduler, log: &Logger) -> Self {
        let shared = Arc::new(SharedState {
            instances: InstanceManager::new(),
            players: RwLock::new(HashMap::new()),
            next_entity: AtomicU64::new(1),
        });
        let scheduler = Arc::new(Mutex::new(scheduler));
        let scheduler_for_tick = scheduler.clone();
        let tick_loop = TickLoop::new(
            tick_rate,
            move |dt| {
                scheduler_for_tick.lock().unwrap().execute(dt);
            },
            log,
        );

        GameServer {
            shared,
            scheduler,
            tick_loop,
            log: log.new(slog::o!("component" => "gamesrv")),
        }
    }

    pub fn start(&self) -> bool {
        self.scheduler.lock().unwrap().build().is_ok() && self.tick_loop.start()
    }

    /// Stop the loop and destroy every instance.
    pub fn stop(&self) {
        self.tick_loop.stop();
        self.shared.players.write().unwrap().clear();
        self.shared.instances.clear();
    }

    pub fn tick(&self) -> Option<TickMetrics> {
        self.tick_loop.tick()
    }

    pub fn instances(&self) -> &InstanceManager {
        &self.shared.instances
    }

    pub fn create_instance(&self, map_id: impl Into<String>, max_players: u32) -> InstanceId {
        self.shared.instances.create_instance(map_id, max_players)
    }

    pub fn destroy_instance(&self, id: InstanceId) -> Result<()> {
        self.shared.instances.destroy_instance(id)
    }

    pub fn available_instances(&self, map_id: &str) -> Vec<InstanceId> {
        self.shared.instances.available_instances(map_id)
    }

    /// Creates an entity with the default component set, records the
    /// player's session, and increments the instance's player count.
    pub fn add_player(&self, player_id: PlayerId, instance_id: InstanceId) -> Result<EntityId> {
        let mut players = self.shared.players.write().unwrap();
        if players.contains_key(&player_id) {
            return Err(Error::new(ErrorKind::AlreadyExists, "player already has a session"));
        }
        if self.shared.instances.get(instance_id).is_none() {
            return Err(Error::new(ErrorKind::NotFound, "instance not found"));
        }

        self.shared.instances.increment_players(instance_id)?;

        let entity = EntityId::from(self.shared.next_entity.fetch_add(1, Ordering::SeqCst));
        players.insert(
            player_id,
            PlayerSession {
                player_id,
                entity,
                instance_id,
            },
        );

        slog::debug!(self.log, "player added"; "player_id" => player_id.0, "instance_id" => instance_id, "entity" => entity.0);
        Ok(entity)
    }

    pub fn remove_player(&self, player_id: PlayerId) -> Result<()> {
        let mut players = self.shared.players.write().unwrap();
        let session = players
            .remove(&player_id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "player has no session"))?;
        self.shared.instances.decrement_players(session.instance_id);
        Ok(())
    }

    pub fn transfer_player(&self, player_id: PlayerId, target_instance_id: InstanceId) -> Result<()> {
        if self.shared.instances.get(target_instance_id).is_none() {
            return Err(Error::new(ErrorKind::NotFound, "target instance not found"));
        }

        let mut players = self.shared.players.write().unwrap();
        let session = players
            .get_mut(&player_id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "player has no session"))?;

        self.shared.instances.increment_players(target_instance_id)?;
        self.shared.instances.decrement_players(session.instance_id);
        session.instance_id = target_instance_id;
        Ok(())
    }

    pub fn player_session(&self, player_id: PlayerId) -> Option<PlayerSession> {
        self.shared.players.read().unwrap().get(&player_id).cloned()
    }

    pub fn stats(&self) -> GameServerStats {
        GameServerStats {
            active_players: self.shared.players.read().unwrap().len(),
            active_instances: self.shared.instances.len(),
            last_tick: self.tick_loop.last_metrics(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn add_player_creates_entity_and_increments_instance() {
        let server = GameServer::new(20, Scheduler::new(), &test_logger());
        let instance = server.create_instance("forest", 10);
        let entity = server.add_player(PlayerId::from(1), instance).unwrap();
        assert!(!entity.is_none());
        assert_eq!(server.instances().get(instance).unwrap().player_count, 1);
    }

    #[test]
    fn add_player_rejects_duplicate() {
        let server = GameServer::new(20, Scheduler::new(), &test_logger());
        let instance = server.create_instance("forest", 10);
        server.add_player(PlayerId::from(1), instance).unwrap();
        assert!(server.add_player(PlayerId::from(1), instance).is_err());
    }

    #[test]
    fn add_player_rejects_full_instance() {
        let server = GameServer::new(20, Scheduler::new(), &test_logger());
        let instance = server.create_instance("forest", 1);
        server.add_player(PlayerId::from(1), instance).unwrap();
        assert!(server.add_player(PlayerId::from(2), instance).is_err());
    }

    #[test]
    fn remove_player_decrements_instance_count() {
        let server = GameServer::new(20, Scheduler::new(), &test_logger());
        let instance = server.create_instance("forest", 10);
        server.add_player(PlayerId::from(1), instance).unwrap();
        server.remove_player(PlayerId::from(1)).unwrap();
        assert_eq!(server.instances().get(instance).unwrap().player_count, 0);
    }

    #[test]
    fn transfer_player_moves_between_instances() {
        let server = GameServer::new(20, Scheduler::new(), &test_logger());
        let a = server.create_instance("forest", 10);
        let b = server.create_instance("desert", 10);
        server.add_player(PlayerId::from(1), a).unwrap();
        server.transfer_player(PlayerId::from(1), b).unwrap();
        assert_eq!(server.instances().get(a).unwrap().player_count, 0);
        assert_eq!(server.instances().get(b).unwrap().player_count, 1);
        assert_eq!(server.player_session(PlayerId::from(1)).unwrap().instance_id, b);
    }

    #[test]
    fn tick_runs_synchronously_before_start() {
        let server = GameServer::new(20, Scheduler::new(), &test_logger());
        let metrics = server.tick();
        assert!(metrics.is_some());
    }
}
