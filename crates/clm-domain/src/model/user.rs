use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// User / Role / Permission
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub display_name: String,
    pub is_active: bool,
    pub ssh_public_key: Option<String>,
    pub ssh_private_key: Option<String>,
    pub totp_secret_encrypted: Option<String>,
    pub mfa_enabled: bool,
    pub backup_codes: Vec<String>,
    pub role_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub invite_accepted_at: Option<DateTime<Utc>>,
}

impl User {
    /// The special system role grants the wildcard `*` permission.
    pub const SUPER_ADMIN_ROLE: &'static str = "super-admin";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// System roles (`super-admin`) are immutable: no rename, no delete.
    pub is_system: bool,
    pub permission_codenames: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub codename: String,
    pub category: String,
    pub label: String,
    pub description: String,
}

/// A pending invitation. Token minting/verification lives outside the core
/// (spec.md §1 treats auth token minting as an external collaborator); this
/// type only captures the storage shape the Store needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    pub token: String,
    pub email: String,
    pub inviter_user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Invite {
    pub const TTL_HOURS: i64 = 72;

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > chrono::Duration::hours(Self::TTL_HOURS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordReset {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}
