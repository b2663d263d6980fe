//! Per-user flattened permission-codename cache.
//!
//! Grounded on `examples/original_source/tests/unit/test_permissions.py`'s
//! `_cache`/`invalidate_cache` contract: a process-wide cache keyed by user
//! id, invalidated either for one user or wholesale.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use uuid::Uuid;

/// The wildcard codename super-admins carry, matched literally by every
/// permission check below (mirrors the `"*" in perms` checks in
/// `inventory_auth.py`/`service_auth.py`).
pub const WILDCARD: &str = "*";

#[derive(Default)]
pub struct PermissionCache {
    entries: RwLock<HashMap<Uuid, HashSet<String>>>,
}

impl PermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &Uuid) -> Option<HashSet<String>> {
        self.entries.read().get(user_id).cloned()
    }

    pub fn put(&self, user_id: Uuid, perms: HashSet<String>) {
        self.entries.write().insert(user_id, perms);
    }

    /// Drop one user's cached permissions (e.g. after a role change).
    pub fn invalidate(&self, user_id: &Uuid) {
        self.entries.write().remove(user_id);
    }

    /// Drop every cached user (e.g. after a role's permission list changes).
    pub fn invalidate_all(&self) {
        self.entries.write().clear();
    }

    pub fn contains(&self, user_id: &Uuid) -> bool {
        self.entries.read().contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = PermissionCache::new();
        let id = Uuid::new_v4();
        let perms: HashSet<String> = ["services.view".to_string()].into_iter().collect();
        cache.put(id, perms.clone());
        assert_eq!(cache.get(&id), Some(perms));
    }

    #[test]
    fn invalidate_single_user_removes_only_that_entry() {
        let cache = PermissionCache::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        cache.put(a, HashSet::new());
        cache.put(b, HashSet::new());
        cache.invalidate(&a);
        assert!(!cache.contains(&a));
        assert!(cache.contains(&b));
    }

    #[test]
    fn invalidate_all_clears_cache() {
        let cache = PermissionCache::new();
        cache.put(Uuid::new_v4(), HashSet::new());
        cache.put(Uuid::new_v4(), HashSet::new());
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}
