use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AuditLog / AppMetadata / DriftReport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Append-only audit trail entry. Every mutating HTTP operation writes
/// exactly one of these in the same store transaction (TESTABLE PROPERTY 10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub action: String,
    pub resource: Option<String>,
    pub details: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Process-wide opaque key/value store (plan cache, OS catalogue cache,
/// signing key, notification settings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadataEntry {
    pub key: String,
    pub value: serde_json::Value,
}

pub const METADATA_KEY_SIGNING_KEY: &str = "signing_key";
pub const METADATA_KEY_PLANS_CACHE: &str = "plans_cache";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftSummary {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub summary: DriftSummary,
    pub details: serde_json::Value,
}
