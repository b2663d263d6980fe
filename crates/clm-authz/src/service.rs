//! Service-level permission resolution with fallback to global RBAC.
//!
//! Grounded on `examples/original_source/app/service_auth.py`: a service
//! with no `ServiceAcl` rows at all defers to the user's global
//! `services.*` permission; once any row exists for that service, only a
//! role's own `ServiceAcl` entries (an exact permission match, or the
//! `"full"` wildcard) grant access — global RBAC no longer applies.

use uuid::Uuid;

use clm_store::Store;

use crate::cache::{PermissionCache, WILDCARD};
use crate::permissions::get_user_permissions;

const SERVICE_PERMISSIONS: [&str; 4] = ["view", "deploy", "stop", "config"];

fn global_perm(suffix: &str) -> String {
    match suffix {
        "view" => "services.view".to_string(),
        "deploy" => "services.deploy".to_string(),
        "stop" => "services.stop".to_string(),
        "config" => "services.config.view".to_string(),
        other => format!("services.{other}"),
    }
}

pub fn check_service_permission(
    store: &Store,
    cache: &PermissionCache,
    user_id: Uuid,
    service_name: &str,
    permission_suffix: &str,
) -> bool {
    let perms = get_user_permissions(store, cache, user_id);
    if perms.contains(WILDCARD) {
        return true;
    }

    let acls = store.service_acls.list();
    let acl_exists = acls.iter().any(|a| a.service_name == service_name);
    if !acl_exists {
        return perms.contains(&global_perm(permission_suffix));
    }

    let Some(user) = store.users.get(&user_id) else {
        return false;
    };
    if user.role_ids.is_empty() {
        return false;
    }

    let exact = acls.iter().any(|a| {
        a.service_name == service_name
            && user.role_ids.contains(&a.role_id)
            && a.permission == permission_suffix
    });
    if exact {
        return true;
    }

    acls.iter().any(|a| {
        a.service_name == service_name && user.role_ids.contains(&a.role_id) && a.permission == "full"
    })
}

/// The set of `view`/`deploy`/`stop`/`config` permissions a user holds for
/// one service.
pub fn get_user_service_permissions(
    store: &Store,
    cache: &PermissionCache,
    user_id: Uuid,
    service_name: &str,
) -> Vec<&'static str> {
    SERVICE_PERMISSIONS
        .into_iter()
        .filter(|suffix| check_service_permission(store, cache, user_id, service_name, suffix))
        .collect()
}

/// Narrow a list of service names down to the ones this user may view.
pub fn filter_services_for_user(
    store: &Store,
    cache: &PermissionCache,
    user_id: Uuid,
    service_names: &[String],
) -> Vec<String> {
    service_names
        .iter()
        .filter(|name| check_service_permission(store, cache, user_id, name, "view"))
        .cloned()
        .collect()
}

/// Maps a script name to the service permission level it requires — stop
/// scripts need `stop`, everything else is treated as a deployment action.
pub fn check_service_script_permission(
    store: &Store,
    cache: &PermissionCache,
    user_id: Uuid,
    service_name: &str,
    script_name: &str,
) -> bool {
    const STOP_SCRIPTS: [&str; 4] = ["stop", "stopinstances", "kill", "killall"];
    let permission = if STOP_SCRIPTS.contains(&script_name.to_lowercase().as_str()) {
        "stop"
    } else {
        "deploy"
    };
    check_service_permission(store, cache, user_id, service_name, permission)
}
