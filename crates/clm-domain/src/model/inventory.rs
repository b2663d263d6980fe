use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inventory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryType {
    pub id: Uuid,
    pub slug: String,
    pub label: String,
    pub icon: String,
    pub config_hash: String,
    pub fields_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryObject {
    pub id: Uuid,
    pub type_id: Uuid,
    pub data: serde_json::Value,
    pub search_text: String,
    pub tag_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl InventoryObject {
    /// Tag-encoded metadata for the personal-instance TTL poller, following
    /// `pi-ttl:<hours>` / `pi-user:<name>` / `pi-service:<slug>` conventions
    /// (SPEC_FULL.md §4.5, grounded on `personal_instance_cleanup.py`).
    pub fn data_tags(&self) -> Vec<String> {
        self.data
            .get("vultr_tags")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryTag {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclEffect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectAcl {
    pub object_id: Uuid,
    pub role_id: Uuid,
    pub permission: String,
    pub effect: AclEffect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagPermission {
    pub tag_id: Uuid,
    pub role_id: Uuid,
    pub permission: String,
}

/// `permission == "full"` supersedes a single `permission` match (see
/// `clm-authz`'s service resolution, grounded on `service_auth.py`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAcl {
    pub service_name: String,
    pub role_id: Uuid,
    pub permission: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialScopeType {
    All,
    Instance,
    Service,
    Tag,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialAccessRule {
    pub role_id: Uuid,
    /// `None` means "any credential type" (the original's `"*"`).
    pub credential_type: Option<String>,
    pub scope_type: CredentialScopeType,
    pub scope_value: Option<String>,
    pub require_personal_key: bool,
}
