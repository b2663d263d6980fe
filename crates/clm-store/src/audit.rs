//! Append-only audit trail. Grounded on
//! `examples/original_source/app/audit.py`'s one-line `log_action` helper —
//! kept as a thin wrapper rather than expanded.

use chrono::Utc;
use uuid::Uuid;

use clm_domain::model::AuditLog;
use clm_domain::Result;

use crate::table::Table;

pub fn log_action(
    table: &Table<AuditLog>,
    user_id: Option<Uuid>,
    username: Option<String>,
    action: impl Into<String>,
    resource: Option<String>,
    details: Option<serde_json::Value>,
    ip_address: Option<String>,
) -> Result<AuditLog> {
    let entry = AuditLog {
        id: Uuid::new_v4(),
        user_id,
        username,
        action: action.into(),
        resource,
        details,
        ip_address,
        created_at: Utc::now(),
    };
    table.insert(entry.id, entry.clone())?;
    Ok(entry)
}
