use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Blueprint
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintServiceEntry {
    pub name: String,
    #[serde(default)]
    pub inputs: HashMap<String, String>,
}

/// An ordered list of services to deploy as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: Uuid,
    pub name: String,
    pub services: Vec<BlueprintServiceEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlueprintDeploymentStatus {
    Pending,
    Running,
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintDeployment {
    pub id: Uuid,
    pub blueprint_id: Uuid,
    pub status: BlueprintDeploymentStatus,
    pub progress: HashMap<String, StepStatus>,
    pub job_ids: Vec<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub deployed_by: Option<Uuid>,
}

impl BlueprintDeployment {
    pub fn new(blueprint_id: Uuid, deployed_by: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            blueprint_id,
            status: BlueprintDeploymentStatus::Pending,
            progress: HashMap::new(),
            job_ids: Vec::new(),
            started_at: None,
            finished_at: None,
            deployed_by,
        }
    }
}
