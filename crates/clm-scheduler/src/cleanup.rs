//! Personal-instance TTL cleanup (the one true in-process system task;
//! every other named routine is a thin subprocess dispatch).
//!
//! Grounded 1:1 on `examples/original_source/app/personal_instance_cleanup.py`:
//! the `pi-ttl:<hours>` / `pi-user:<name>` / `pi-service:<slug>` tag
//! contract, the `personal.yaml` `destroy_script` override with its
//! `realpath`-under-services-root guard, and delegating dedup to the Job
//! Runner's own `has_running_destroy_job` scan.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;

use clm_jobs::JobRunner;
use clm_store::Store;

struct ExpiredHost {
    hostname: String,
    service: String,
    owner: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PersonalConfig {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    destroy_script: Option<String>,
}

fn service_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_-]{0,62}[a-z0-9]$").unwrap())
}

/// `service_name` is sourced from an attacker-influenced inventory tag, so
/// it's validated against a slug pattern and the resolved path is checked
/// to stay under `services_dir` before anything is opened.
fn load_personal_config(services_dir: &Path, service_name: &str) -> Option<PersonalConfig> {
    if !service_name_pattern().is_match(service_name) {
        tracing::warn!(service = %service_name, "invalid service name in personal-instance tag");
        return None;
    }
    let config_path = services_dir.join(service_name).join("personal.yaml");
    let real_path = std::fs::canonicalize(&config_path).ok()?;
    let real_services_dir = std::fs::canonicalize(services_dir).ok()?;
    if !real_path.starts_with(&real_services_dir) {
        tracing::warn!(service = %service_name, "path traversal blocked for personal.yaml");
        return None;
    }
    let raw = std::fs::read_to_string(&real_path).ok()?;
    let config: PersonalConfig = serde_yaml::from_str(&raw).ok()?;
    if !config.enabled {
        return None;
    }
    Some(config)
}

fn find_expired_hosts(store: &Store) -> Vec<ExpiredHost> {
    let Some(server_type) = store.inventory_types.list().into_iter().find(|t| t.slug == "server") else {
        return Vec::new();
    };
    let now = Utc::now();
    let mut expired = Vec::new();

    for obj in store.inventory_objects.list() {
        if obj.type_id != server_type.id {
            continue;
        }
        let tags = obj.data_tags();
        if !tags.iter().any(|t| t == "personal-instance") {
            continue;
        }

        let mut ttl_hours: Option<i64> = None;
        let mut owner = None;
        let mut service = None;
        for tag in &tags {
            if let Some(rest) = tag.strip_prefix("pi-ttl:") {
                ttl_hours = rest.parse().ok();
            } else if let Some(rest) = tag.strip_prefix("pi-user:") {
                owner = Some(rest.to_string());
            } else if let Some(rest) = tag.strip_prefix("pi-service:") {
                service = Some(rest.to_string());
            }
        }

        // TTL of 0 or absent means "never expire".
        let Some(ttl_hours) = ttl_hours.filter(|h| *h > 0) else {
            continue;
        };
        let Some(service) = service else {
            continue;
        };

        let expires_at = obj.created_at + chrono::Duration::hours(ttl_hours);
        if now < expires_at {
            continue;
        }

        let hostname = obj.data.get("hostname").and_then(|v| v.as_str()).unwrap_or("").to_string();
        if hostname.is_empty() {
            continue;
        }

        expired.push(ExpiredHost { hostname, service, owner });
    }

    expired
}

/// Scan inventory for expired personal instances and trigger a destroy job
/// for each. Returns the hostnames that were queued for destruction.
pub fn check_and_cleanup_expired(store: &Store, runner: &JobRunner, services_dir: &Path) -> Vec<String> {
    let expired = find_expired_hosts(store);
    if expired.is_empty() {
        return Vec::new();
    }

    let mut destroyed = Vec::new();
    for host in expired {
        if runner.has_running_destroy_job(&host.hostname) {
            tracing::debug!(hostname = %host.hostname, "destroy job already running, skipping");
            continue;
        }

        let mut destroy_script = "destroy".to_string();
        if let Some(config) = load_personal_config(services_dir, &host.service) {
            if let Some(ds) = config.destroy_script {
                destroy_script = ds.trim_end_matches(".sh").to_string();
            }
        }

        tracing::info!(
            hostname = %host.hostname,
            service = %host.service,
            owner = host.owner.as_deref().unwrap_or("?"),
            "destroying expired personal instance"
        );

        let mut inputs = HashMap::new();
        inputs.insert("hostname".to_string(), host.hostname.clone());
        match runner.run_script(&host.service, &destroy_script, inputs, None, Some("system:ttl-cleanup".to_string())) {
            Ok(_) => destroyed.push(host.hostname),
            Err(e) => tracing::warn!(hostname = %host.hostname, error = %e, "failed to trigger destroy"),
        }
    }

    destroyed
}
