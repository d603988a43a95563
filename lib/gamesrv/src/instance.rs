//! Map-instance registry backing the game server shell.

use aether::{Error, ErrorKind, Result};
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

pub type InstanceId = u64;

#[derive(Clone, Debug)]
pub struct Instance {
    pub id: InstanceId,
    pub map_id: String,
    pub max_players: u32,
    pub player_count: u32,
}

pub struct InstanceManager {
    next_id: AtomicU64,
    instances: RwLock<HashMap<InstanceId, Instance>>,
}

impl InstanceManager {
    pub fn new() -> Self {
        InstanceManager {
            next_id: AtomicU64::new(1),
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn create_instance(&self, map_id: impl Into<String>, max_players: u32) -> InstanceId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.instances.write().unwrap().insert(
            id,
            Instance {
                id,
                map_id: map_id.into(),
                max_players,
                player_count: 0,
            },
        );
        id
    }

    /// Fails if the instance still has players.
    pub fn destroy_instance(&self, id: InstanceId) -> Result<()> {
        let mut instances = self.instances.write().unwrap();
        match instances.get(&id) {
            Some(instance) if instance.player_count > 0 => {
                Err(Error::new(ErrorKind::InvalidArgument, "instance still has players"))
            }
            Some(_) => {
                instances.remove(&id);
                Ok(())
            }
            None => Err(Error::new(ErrorKind::NotFound, "instance not found")),
        }
    }

    pub fn get(&self, id: InstanceId) -> Option<Instance> {
        self.instances.read().unwrap().get(&id).cloned()
    }

    pub fn increment_players(&self, id: InstanceId) -> Result<()> {
        let mut instances = self.instances.write().unwrap();
        let instance = instances
            .get_mut(&id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "instance not found"))?;
        if instance.player_count >= instance.max_players {
            return Err(Error::new(ErrorKind::InvalidArgument, "instance is full"));
        }
        instance.player_count += 1;
        Ok(())
    }

    pub fn decrement_players(&self, id: InstanceId) {
        if let Some(instance) = self.instances.write().unwrap().get_mut(&id) {
            instance.player_count = instance.player_count.saturating_sub(1);
        }
    }

    /// Instances for `map_id` with at least one free slot.
    pub fn available_instances(&self, map_id: &str) -> Vec<InstanceId> {
        self.instances
            .read()
            .unwrap()
            .values()
            .filter(|instance| instance.map_id == map_id && instance.player_count < instance.max_players)
            .map(|instance| instance.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.instances.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unconditionally drops every instance, ignoring player counts. Used
    /// when the game server shell stops.
    pub fn clear(&self) {
        self.instances.write().unwrap().clear();
    }
}

impl Default for InstanceManager {
    fn default() -> Self {
        Self::new()
    }
}
