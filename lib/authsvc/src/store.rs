//! Credential store and refresh-token store: trait-based interfaces plus
//! in-memory reference implementations. Lookups are exact-match, `create`
//! assigns a unique id >= 1, `revoke` flips a flag rather than deleting.
//! The store is behind a trait so the authentication service doesn't depend
//! on the storage being in-memory.

use crate::model::{RefreshTokenRecord, UserRecord, UserStatus};
use aether::{Error, ErrorKind, Result};
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

pub trait CredentialStore: Send + Sync {
    fn find_by_id(&self, id: u64) -> Option<UserRecord>;
    fn find_by_identifier(&self, identifier: &str) -> Option<UserRecord>;
    fn find_by_address(&self, address: &str) -> Option<UserRecord>;
    fn create(&self, identifier: &str, address: &str, password_hash: &str, salt: &str) -> Result<UserRecord>;
    fn update(&self, record: UserRecord) -> Result<()>;
}

pub trait RefreshTokenStore: Send + Sync {
    fn store(&self, record: RefreshTokenRecord) -> Result<()>;
    fn find(&self, token: &str) -> Option<RefreshTokenRecord>;
    fn revoke(&self, token: &str) -> Result<()>;
    fn revoke_all_for_user(&self, user_id: u64) -> Result<()>;
    fn remove_expired(&self, now: u64) -> usize;
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    next_id: AtomicU64,
    users: RwLock<HashMap<u64, UserRecord>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        InMemoryCredentialStore {
            next_id: AtomicU64::new(1),
            users: RwLock::new(HashMap::new()),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn find_by_id(&self, id: u64) -> Option<UserRecord> {
        self.users.read().unwrap().get(&id).cloned()
    }

    fn find_by_identifier(&self, identifier: &str) -> Option<UserRecord> {
        self.users
            .read()
            .unwrap()
            .values()
            .find(|u| u.identifier == identifier)
            .cloned()
    }

    fn find_by_address(&self, address: &str) -> Option<UserRecord> {
        self.users
            .read()
            .unwrap()
            .values()
            .find(|u| u.address == address)
            .cloned()
    }

    fn create(&self, identifier: &str, address: &str, password_hash: &str, salt: &str) -> Result<UserRecord> {
        let now = aether::time::timestamp_secs();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = UserRecord {
            id,
            identifier: identifier.to_string(),
            address: address.to_string(),
            password_hash: password_hash.to_string(),
            salt: salt.to_string(),
            status: UserStatus::Active,
            roles: vec!["player".to_string()],
            created_at: now,
            updated_at: now,
        };
        self.users.write().unwrap().insert(id, record.clone());
        Ok(record)
    }

    fn update(&self, record: UserRecord) -> Result<()> {
        let mut users = self.users.write().unwrap();
        if !users.contains_key(&record.id) {
            return Err(Error::new(ErrorKind::NotFound, "user record not found"));
        }
        users.insert(record.id, record);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    tokens: RwLock<HashMap<String, RefreshTokenRecord>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        InMemoryRefreshTokenStore {
            tokens: RwLock::new(HashMap::new()),
        }
    }
}

impl RefreshTokenStore for InMemoryRefreshTokenStore {
    fn store(&self, record: RefreshTokenRecord) -> Result<()> {
        self.tokens.write().unwrap().insert(record.token.clone(), record);
        Ok(())
    }

    fn find(&self, token: &str) -> Option<RefreshTokenRecord> {
        self.tokens.read().unwrap().get(token).cloned()
    }

    fn revoke(&self, token: &str) -> Result<()> {
        let mut tokens = self.tokens.write().unwrap();
        match tokens.get_mut(token) {
            Some(record) => {
                record.revoked = true;
                Ok(())
            }
            None => Err(Error::new(ErrorKind::NotFound, "refresh token not found")),
        }
    }

    fn revoke_all_for_user(&self, user_id: u64) -> Result<()> {
        let mut tokens = self.tokens.write().unwrap();
        for record in tokens.values_mut().filter(|r| r.user_id == user_id) {
            record.revoked = true;
        }
        Ok(())
    }

    fn remove_expired(&self, now: u64) -> usize {
        let mut tokens = self.tokens.write().unwrap();
        let before = tokens.len();
        tokens.retain(|_, record| record.expires_at > now);
        before - tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_increasing_ids() {
        let store = InMemoryCredentialStore::new();
        let a = store.create("alice", "a@b.co", "h", "s").unwrap();
        let b = store.create("bob", "b@b.co", "h", "s").unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[test]
    fn find_by_identifier_is_exact_match() {
        let store = InMemoryCredentialStore::new();
        store.create("alice", "a@b.co", "h", "s").unwrap();
        assert!(store.find_by_identifier("alice").is_some());
        assert!(store.find_by_identifier("Alice").is_none());
    }

    #[test]
    fn update_rejects_unknown_user() {
        let store = InMemoryCredentialStore::new();
        let ghost = UserRecord {
            id: 999,
            identifier: "x".into(),
            address: "x@x.co".into(),
            password_hash: "h".into(),
            salt: "s".into(),
            status: UserStatus::Active,
            roles: vec![],
            created_at: 0,
            updated_at: 0,
        };
        assert!(store.update(ghost).is_err());
    }

    #[test]
    fn revoke_sets_flag_without_deleting() {
        let store = InMemoryRefreshTokenStore::new();
        store
            .store(RefreshTokenRecord {
                token: "tok".into(),
                user_id: 1,
                expires_at: 1_000,
                revoked: false,
            })
            .unwrap();
        store.revoke("tok").unwrap();
        let record = store.find("tok").unwrap();
        assert!(record.revoked);
    }

    #[test]
    fn revoke_all_for_user_covers_every_token() {
        let store = InMemoryRefreshTokenStore::new();
        for i in 0..3 {
            store
                .store(RefreshTokenRecord {
                    token: format!("tok-{i}"),
                    user_id: 1,
                    expires_at: 1_000,
                    revoked: false,
                })
                .unwrap();
        }
        store.revoke_all_for_user(1).unwrap();
        for i in 0..3 {
            assert!(store.find(&format!("tok-{i}")).unwrap().revoked);
        }
    }

    #[test]
    fn remove_expired_drops_past_expiry_only() {
        let store = InMemoryRefreshTokenStore::new();
        store
            .store(RefreshTokenRecord {
                token: "old".into(),
                user_id: 1,
                expires_at: 100,
                revoked: false,
            })
            .unwrap();
        store
            .store(RefreshTokenRecord {
                token: "new".into(),
                user_id: 1,
                expires_at: 10_000,
                revoked: false,
            })
            .unwrap();
        let removed = store.remove_expired(500);
        assert_eq!(removed, 1);
        assert!(store.find("old").is_none());
        assert!(store.find("new").is_some());
    }
}
