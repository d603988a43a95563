//! TTL-indexed revocation set, used to blacklist token `jti`s ahead of
//! their natural expiry (logout, password change, admin action). Mirrors
//! `original_source/include/cgs/service/token_blacklist.hpp`'s insert/check/
//! cleanup shape, with Rust's reader-writer lock standing in for the
//! original's manual shared-mutex.

use hashbrown::HashMap;
use std::sync::RwLock;

/// Many-reader, single-writer set of revoked token identifiers, each with its
/// own expiry. Entries past expiry are treated as absent by `is_revoked` and
/// are also opportunistically swept whenever a write (`revoke`) takes place.
pub struct RevocationSet {
    entries: RwLock<HashMap<String, u64>>,
}

impl RevocationSet {
    pub fn new() -> Self {
        RevocationSet {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Mark `jti` as revoked until `expires_at` (unix seconds). Also sweeps
    /// every entry that has already expired, so the set can't grow without
    /// bound under steady revoke traffic.
    pub fn revoke(&self, jti: &str, expires_at: u64, now: u64) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(jti.to_string(), expires_at);
        entries.retain(|_, &mut exp| exp > now);
    }

    /// Whether `jti` is currently revoked, i.e. present and not yet expired.
    pub fn is_revoked(&self, jti: &str, now: u64) -> bool {
        let entries = self.entries.read().unwrap();
        match entries.get(jti) {
            Some(&exp) => exp > now,
            None => false,
        }
    }

    /// Drop every entry whose expiry has passed. Safe to call on an idle
    /// timer; a no-op under a read-only workload.
    pub fn cleanup(&self, now: u64) {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|_, &mut exp| exp > now);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RevocationSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoked_token_is_reported_revoked() {
        let set = RevocationSet::new();
        set.revoke("jti-1", 1_000, 500);
        assert!(set.is_revoked("jti-1", 600));
    }

    #[test]
    fn expired_revocation_is_not_revoked() {
        let set = RevocationSet::new();
        set.revoke("jti-1", 1_000, 500);
        assert!(!set.is_revoked("jti-1", 1_500));
    }

    #[test]
    fn unknown_jti_is_not_revoked() {
        let set = RevocationSet::new();
        assert!(!set.is_revoked("never-seen", 0));
    }

    #[test]
    fn cleanup_drops_expired_entries() {
        let set = RevocationSet::new();
        set.revoke("jti-1", 1_000, 500);
        set.revoke("jti-2", 2_000, 500);
        set.cleanup(1_500);
        assert_eq!(set.len(), 1);
        assert!(set.is_revoked("jti-2", 1_500));
    }

    #[test]
    fn revoke_sweeps_expired_entries_inline() {
        let set = RevocationSet::new();
        set.revoke("jti-1", 1_000, 500);
        set.revoke("jti-2", 2_000, 1_500);
        assert_eq!(set.len(), 1);
    }
}
