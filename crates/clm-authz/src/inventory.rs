//! Inventory object/type permission resolution — the 5-layer cascade from
//! `examples/original_source/app/inventory_auth.py`:
//!   1. Wildcard
//!   2. Per-object ACL deny
//!   3. Per-object ACL allow
//!   4. Tag-based permission
//!   5. Service delegation (for `service`-typed objects) / role-based
//!      type permission otherwise

use uuid::Uuid;

use clm_domain::model::AclEffect;
use clm_store::Store;

use crate::cache::{PermissionCache, WILDCARD};
use crate::permissions::get_user_permissions;
use crate::service::check_service_permission;

/// Legacy service permission suffixes mapped onto `services.*` RBAC
/// codenames, preserved verbatim from `inventory_auth.py`'s
/// `_LEGACY_SERVICE_PERM_MAP` for the non-object-specific check.
fn legacy_service_perm(suffix: &str) -> Option<&'static str> {
    match suffix {
        "view" => Some("services.view"),
        "deploy" => Some("services.deploy"),
        "stop" => Some("services.stop"),
        "config" => Some("services.config.view"),
        "files" => Some("services.files.view"),
        "edit" => Some("services.config.edit"),
        _ => None,
    }
}

/// Object-specific permission check (e.g. can this user `view` or `deploy`
/// this particular inventory row).
pub fn check_inventory_permission(
    store: &Store,
    cache: &PermissionCache,
    user_id: Uuid,
    object_id: Uuid,
    permission_suffix: &str,
) -> bool {
    let perms = get_user_permissions(store, cache, user_id);
    if perms.contains(WILDCARD) {
        return true;
    }

    let Some(obj) = store.inventory_objects.get(&object_id) else {
        return false;
    };
    let Some(inv_type) = store.inventory_types.get(&obj.type_id) else {
        return false;
    };

    let full_perm = format!("inventory.{}.{}", inv_type.slug, permission_suffix);

    let Some(user) = store.users.get(&user_id) else {
        return false;
    };
    if user.role_ids.is_empty() {
        return perms.contains(&full_perm);
    }

    let deny = store.object_acls.list().into_iter().any(|acl| {
        acl.object_id == object_id
            && user.role_ids.contains(&acl.role_id)
            && acl.permission == permission_suffix
            && acl.effect == AclEffect::Deny
    });
    if deny {
        return false;
    }

    let allow = store.object_acls.list().into_iter().any(|acl| {
        acl.object_id == object_id
            && user.role_ids.contains(&acl.role_id)
            && acl.permission == permission_suffix
            && acl.effect == AclEffect::Allow
    });
    if allow {
        return true;
    }

    let tag_allow = store.tag_permissions.list().into_iter().any(|tp| {
        obj.tag_ids.contains(&tp.tag_id)
            && user.role_ids.contains(&tp.role_id)
            && tp.permission == permission_suffix
    });
    if tag_allow {
        return true;
    }

    if inv_type.slug == "service" {
        let service_name = obj
            .data
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if !service_name.is_empty() {
            return check_service_permission(store, cache, user_id, service_name, permission_suffix);
        }
    }

    perms.contains(&full_perm)
}

/// Type-level (not object-specific) permission check, used when no object
/// id is in scope yet — e.g. listing a whole inventory type.
pub fn check_type_permission(
    store: &Store,
    cache: &PermissionCache,
    user_id: Uuid,
    type_slug: &str,
    permission_suffix: &str,
) -> bool {
    let perms = get_user_permissions(store, cache, user_id);
    if perms.contains(WILDCARD) {
        return true;
    }
    let full_perm = format!("inventory.{type_slug}.{permission_suffix}");
    if perms.contains(&full_perm) {
        return true;
    }
    if type_slug == "service" {
        if let Some(legacy) = legacy_service_perm(permission_suffix) {
            if perms.contains(legacy) {
                return true;
            }
        }
    }
    false
}
