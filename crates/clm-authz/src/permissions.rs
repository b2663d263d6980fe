//! Flattening a user's roles into a permission-codename set, with caching.
//!
//! Grounded on `examples/original_source/app/permissions.py` (via
//! `tests/unit/test_permissions.py`): a user's permissions are the union of
//! their roles' `permission_codenames`, and the `super-admin` role carries
//! the wildcard on top of (not instead of) its explicit codenames.

use std::collections::HashSet;

use uuid::Uuid;

use clm_domain::model::{Role, User};
use clm_store::Store;

use crate::cache::{PermissionCache, WILDCARD};

/// Compute (or return cached) the flattened permission set for a user.
pub fn get_user_permissions(store: &Store, cache: &PermissionCache, user_id: Uuid) -> HashSet<String> {
    if let Some(cached) = cache.get(&user_id) {
        return cached;
    }

    let perms = compute_user_permissions(store, user_id);
    cache.put(user_id, perms.clone());
    perms
}

fn compute_user_permissions(store: &Store, user_id: Uuid) -> HashSet<String> {
    let Some(user) = store.users.get(&user_id) else {
        return HashSet::new();
    };
    let mut perms = HashSet::new();
    for role_id in &user.role_ids {
        let Some(role) = store.roles.get(role_id) else {
            continue;
        };
        perms.extend(role.permission_codenames.iter().cloned());
        if role.name == User::SUPER_ADMIN_ROLE {
            perms.insert(WILDCARD.to_string());
        }
    }
    perms
}

/// Single-codename check, going through the cache.
pub fn has_permission(store: &Store, cache: &PermissionCache, user_id: Uuid, codename: &str) -> bool {
    let perms = get_user_permissions(store, cache, user_id);
    perms.contains(WILDCARD) || perms.contains(codename)
}

/// Idempotent seed of the built-in `super-admin` system role plus every
/// registered `Permission` codename onto it. Safe to call on every startup.
pub fn seed_super_admin_role(store: &Store) -> clm_domain::Result<Role> {
    if let Some(existing) = store
        .roles
        .list()
        .into_iter()
        .find(|r| r.name == User::SUPER_ADMIN_ROLE)
    {
        return Ok(existing);
    }
    let codenames: Vec<String> = store
        .permissions
        .list()
        .into_iter()
        .map(|p| p.codename)
        .collect();
    let role = Role {
        id: Uuid::new_v4(),
        name: User::SUPER_ADMIN_ROLE.to_string(),
        description: "Full access to every resource".to_string(),
        is_system: true,
        permission_codenames: codenames,
    };
    store.roles.insert(role.id, role.clone())?;
    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clm_domain::model::Permission;

    fn user_with_roles(store: &Store, role_ids: Vec<Uuid>) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            password_hash: "x".into(),
            email: "alice@example.com".into(),
            display_name: "Alice".into(),
            is_active: true,
            ssh_public_key: None,
            ssh_private_key: None,
            totp_secret_encrypted: None,
            mfa_enabled: false,
            backup_codes: vec![],
            role_ids,
            created_at: chrono::Utc::now(),
            invite_accepted_at: None,
        };
        store.users.insert(user.id, user.clone()).unwrap();
        user.id
    }

    #[test]
    fn user_without_roles_has_no_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let cache = PermissionCache::new();
        let id = user_with_roles(&store, vec![]);
        assert!(get_user_permissions(&store, &cache, id).is_empty());
    }

    #[test]
    fn nonexistent_user_has_no_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let cache = PermissionCache::new();
        assert!(!has_permission(&store, &cache, Uuid::new_v4(), "services.view"));
    }

    #[test]
    fn role_permissions_are_unioned() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let cache = PermissionCache::new();
        let role_a = Role {
            id: Uuid::new_v4(),
            name: "viewer".into(),
            description: String::new(),
            is_system: false,
            permission_codenames: vec!["services.view".into()],
        };
        let role_b = Role {
            id: Uuid::new_v4(),
            name: "deployer".into(),
            description: String::new(),
            is_system: false,
            permission_codenames: vec!["services.deploy".into()],
        };
        store.roles.insert(role_a.id, role_a.clone()).unwrap();
        store.roles.insert(role_b.id, role_b.clone()).unwrap();
        let id = user_with_roles(&store, vec![role_a.id, role_b.id]);

        let perms = get_user_permissions(&store, &cache, id);
        assert!(perms.contains("services.view"));
        assert!(perms.contains("services.deploy"));
    }

    #[test]
    fn super_admin_role_grants_wildcard() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let cache = PermissionCache::new();
        store
            .permissions
            .insert(
                Uuid::new_v4(),
                Permission {
                    id: Uuid::new_v4(),
                    codename: "services.view".into(),
                    category: "services".into(),
                    label: "View services".into(),
                    description: String::new(),
                },
            )
            .unwrap();
        let role = seed_super_admin_role(&store).unwrap();
        let id = user_with_roles(&store, vec![role.id]);

        assert!(has_permission(&store, &cache, id, "anything.at.all"));
    }

    #[test]
    fn cache_hit_on_second_call_returns_same_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let cache = PermissionCache::new();
        let id = user_with_roles(&store, vec![]);
        let a = get_user_permissions(&store, &cache, id);
        let b = get_user_permissions(&store, &cache, id);
        assert_eq!(a, b);
        assert!(cache.contains(&id));
    }
}
