//! Credential-scoped access filtering.
//!
//! Grounded on `examples/original_source/app/credential_access.py`:
//! `CredentialAccessRule` rows are opt-in per role — if a role has none,
//! the existing permission system decides instead (backwards compatible).
//! Once rules exist for a role, at least one must match both the
//! credential's type and its scope (`all`, `instance`, `service`, or
//! `tag`).

use std::collections::HashSet;

use uuid::Uuid;

use clm_domain::model::{CredentialAccessRule, CredentialScopeType};
use clm_store::Store;

use crate::cache::{PermissionCache, WILDCARD};
use crate::permissions::get_user_permissions;

fn rule_matches_type(rule: &CredentialAccessRule, cred_type: &str) -> bool {
    match &rule.credential_type {
        None => true,
        Some(t) => t == cred_type,
    }
}

fn tag_names_for(store: &Store, tag_ids: &[Uuid]) -> HashSet<String> {
    store
        .inventory_tags
        .list()
        .into_iter()
        .filter(|t| tag_ids.contains(&t.id))
        .map(|t| t.name)
        .collect()
}

/// Returns true if `user` may view `credential_object_id` (an inventory
/// row whose `data.credential_type` and tags are consulted for scope
/// matching).
pub fn user_can_view_credential(
    store: &Store,
    cache: &PermissionCache,
    user_id: Uuid,
    credential_object_id: Uuid,
) -> bool {
    let perms = get_user_permissions(store, cache, user_id);
    if perms.contains(WILDCARD) {
        return true;
    }
    let Some(user) = store.users.get(&user_id) else {
        return false;
    };
    if user.role_ids.is_empty() {
        return false;
    }

    let rules: Vec<CredentialAccessRule> = store
        .credential_access_rules
        .list()
        .into_iter()
        .filter(|r| user.role_ids.contains(&r.role_id))
        .collect();
    if rules.is_empty() {
        // No rules for this user's roles — defer to the caller's existing
        // inventory permission check (same contract as the original).
        return true;
    }

    let Some(obj) = store.inventory_objects.get(&credential_object_id) else {
        return false;
    };
    let cred_type = obj
        .data
        .get("credential_type")
        .and_then(|v| v.as_str())
        .unwrap_or("password");
    let tag_names = tag_names_for(store, &obj.tag_ids);
    let instance_hostnames: HashSet<&str> = tag_names
        .iter()
        .filter_map(|t| t.strip_prefix("instance:"))
        .collect();
    let service_names: HashSet<&str> = tag_names
        .iter()
        .filter_map(|t| t.strip_prefix("svc:"))
        .collect();

    for rule in &rules {
        if !rule_matches_type(rule, cred_type) {
            continue;
        }
        let matched = match rule.scope_type {
            CredentialScopeType::All => true,
            CredentialScopeType::Instance => rule
                .scope_value
                .as_deref()
                .is_some_and(|v| instance_hostnames.contains(v)),
            CredentialScopeType::Service => rule
                .scope_value
                .as_deref()
                .is_some_and(|v| service_names.contains(v)),
            CredentialScopeType::Tag => rule
                .scope_value
                .as_deref()
                .is_some_and(|v| tag_names.contains(v)),
        };
        if matched {
            return true;
        }
    }

    let _ = clm_store::audit::log_action(
        &store.audit_log,
        Some(user_id),
        Some(user.username.clone()),
        "credential.access_denied",
        Some(format!("credential/{credential_object_id}")),
        Some(serde_json::json!({"credential_type": cred_type})),
        None,
    );
    false
}

/// One entry from a service's `service_outputs.yaml`, as surfaced to the
/// portal. Only the fields access filtering needs.
#[derive(Debug, Clone)]
pub struct PortalOutput {
    pub output_type: String,
    pub credential_type: String,
    pub require_personal_key: bool,
}

/// Filter `service_outputs.yaml` entries for a service/instance context.
/// Unlike [`user_can_view_credential`] there is no backing inventory
/// object — scope is matched directly against `service_name`/`hostname`.
pub fn filter_portal_credentials(
    store: &Store,
    cache: &PermissionCache,
    user_id: Uuid,
    outputs: Vec<PortalOutput>,
    service_name: &str,
    hostname: &str,
) -> Vec<PortalOutput> {
    let perms = get_user_permissions(store, cache, user_id);
    if perms.contains(WILDCARD) {
        return outputs;
    }
    let Some(user) = store.users.get(&user_id) else {
        return outputs
            .into_iter()
            .filter(|o| o.output_type != "credential")
            .collect();
    };
    if user.role_ids.is_empty() {
        return outputs
            .into_iter()
            .filter(|o| o.output_type != "credential")
            .collect();
    }

    let rules: Vec<CredentialAccessRule> = store
        .credential_access_rules
        .list()
        .into_iter()
        .filter(|r| user.role_ids.contains(&r.role_id))
        .collect();
    if rules.is_empty() {
        return outputs;
    }

    let mut result = Vec::new();
    for output in outputs {
        if output.output_type != "credential" {
            result.push(output);
            continue;
        }
        let allowed = rules.iter().any(|rule| {
            if !rule_matches_type(rule, &output.credential_type) {
                return false;
            }
            match rule.scope_type {
                CredentialScopeType::All => true,
                CredentialScopeType::Instance => {
                    rule.scope_value.as_deref() == Some(hostname)
                }
                CredentialScopeType::Service => {
                    rule.scope_value.as_deref() == Some(service_name)
                }
                CredentialScopeType::Tag => matches!(
                    rule.scope_value.as_deref(),
                    Some(v) if v == format!("instance:{hostname}") || v == format!("svc:{service_name}")
                ),
            }
        });
        if allowed {
            result.push(output);
        }
    }
    result
}

/// True if any matching rule for this user requires a personal SSH key to
/// unlock the credential.
pub fn check_personal_key_required(
    store: &Store,
    user_id: Uuid,
    cred_type: &str,
    service_name: &str,
    hostname: &str,
) -> bool {
    let Some(user) = store.users.get(&user_id) else {
        return false;
    };
    if user.role_ids.is_empty() {
        return false;
    }
    store
        .credential_access_rules
        .list()
        .into_iter()
        .filter(|r| user.role_ids.contains(&r.role_id) && r.require_personal_key)
        .any(|rule| {
            if !rule_matches_type(&rule, cred_type) {
                return false;
            }
            match rule.scope_type {
                CredentialScopeType::All => true,
                CredentialScopeType::Instance => rule.scope_value.as_deref() == Some(hostname),
                CredentialScopeType::Service => rule.scope_value.as_deref() == Some(service_name),
                CredentialScopeType::Tag => false,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clm_domain::model::{InventoryObject, InventoryTag, InventoryType, Role, User};

    fn seed_user(store: &Store, role_ids: Vec<Uuid>) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            username: "dave".into(),
            password_hash: "x".into(),
            email: "dave@example.com".into(),
            display_name: "Dave".into(),
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

    fn seed_credential_object(store: &Store, cred_type: &str, tag_ids: Vec<Uuid>) -> Uuid {
        let type_id = Uuid::new_v4();
        store
            .inventory_types
            .insert(
                type_id,
                InventoryType {
                    id: type_id,
                    slug: "credential".into(),
                    label: "Credential".into(),
                    icon: String::new(),
                    config_hash: String::new(),
                    fields_schema: serde_json::json!({}),
                },
            )
            .unwrap();
        let obj = InventoryObject {
            id: Uuid::new_v4(),
            type_id,
            data: serde_json::json!({"credential_type": cred_type}),
            search_text: String::new(),
            tag_ids,
            created_at: chrono::Utc::now(),
        };
        store.inventory_objects.insert(obj.id, obj.clone()).unwrap();
        obj.id
    }

    #[test]
    fn no_rules_for_role_defers_to_existing_checks() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let cache = PermissionCache::new();
        let role = Role {
            id: Uuid::new_v4(),
            name: "plain".into(),
            description: String::new(),
            is_system: false,
            permission_codenames: vec![],
        };
        store.roles.insert(role.id, role.clone()).unwrap();
        let user_id = seed_user(&store, vec![role.id]);
        let cred_id = seed_credential_object(&store, "password", vec![]);

        assert!(user_can_view_credential(&store, &cache, user_id, cred_id));
    }

    #[test]
    fn scope_tag_rule_matches_instance_tag() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let cache = PermissionCache::new();
        let role = Role {
            id: Uuid::new_v4(),
            name: "scoped".into(),
            description: String::new(),
            is_system: false,
            permission_codenames: vec![],
        };
        store.roles.insert(role.id, role.clone()).unwrap();
        let user_id = seed_user(&store, vec![role.id]);

        let tag_id = Uuid::new_v4();
        store
            .inventory_tags
            .insert(
                tag_id,
                InventoryTag {
                    id: tag_id,
                    name: "instance:db-01".into(),
                },
            )
            .unwrap();
        let cred_id = seed_credential_object(&store, "ssh_key", vec![tag_id]);

        store
            .credential_access_rules
            .insert(
                Uuid::new_v4(),
                CredentialAccessRule {
                    role_id: role.id,
                    credential_type: Some("ssh_key".into()),
                    scope_type: CredentialScopeType::Instance,
                    scope_value: Some("db-01".into()),
                    require_personal_key: false,
                },
            )
            .unwrap();

        assert!(user_can_view_credential(&store, &cache, user_id, cred_id));
    }

    #[test]
    fn unmatched_rule_denies_access() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let cache = PermissionCache::new();
        let role = Role {
            id: Uuid::new_v4(),
            name: "scoped".into(),
            description: String::new(),
            is_system: false,
            permission_codenames: vec![],
        };
        store.roles.insert(role.id, role.clone()).unwrap();
        let user_id = seed_user(&store, vec![role.id]);
        let cred_id = seed_credential_object(&store, "password", vec![]);

        store
            .credential_access_rules
            .insert(
                Uuid::new_v4(),
                CredentialAccessRule {
                    role_id: role.id,
                    credential_type: Some("password".into()),
                    scope_type: CredentialScopeType::Service,
                    scope_value: Some("other-service".into()),
                    require_personal_key: false,
                },
            )
            .unwrap();

        assert!(!user_can_view_credential(&store, &cache, user_id, cred_id));
    }
}
