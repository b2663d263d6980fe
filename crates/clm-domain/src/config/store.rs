use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for all JSON/JSONL-backed entity tables.
    #[serde(default = "d_data_dir")]
    pub data_dir: String,
    /// Root directory containing per-service YAML configs
    /// (`instance.yaml`, `config.yaml`, `personal.yaml`, `service_outputs.yaml`).
    #[serde(default = "d_services_dir")]
    pub services_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: d_data_dir(),
            services_dir: d_services_dir(),
        }
    }
}

fn d_data_dir() -> String {
    "./data".into()
}
fn d_services_dir() -> String {
    "./services".into()
}
