mod auth;
mod email;
mod jobs;
mod scheduler;
mod server;
mod store;

pub use auth::*;
pub use email::*;
pub use jobs::*;
pub use scheduler::*;
pub use server::*;
pub use store::*;

use std::fmt;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. An empty
    /// vec means everything looks good. Errors must block startup; warnings
    /// are logged and otherwise ignored.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }

        if self.store.data_dir.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.data_dir".into(),
                message: "data_dir must not be empty".into(),
            });
        }
        if self.store.services_dir.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.services_dir".into(),
                message: "services_dir must not be empty".into(),
            });
        }

        if self.jobs.max_output_chars == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "jobs.max_output_chars".into(),
                message: "max_output_chars must be greater than 0".into(),
            });
        }
        if self.jobs.timeout_sec == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "jobs.timeout_sec".into(),
                message: "timeout_sec of 0 means jobs never time out".into(),
            });
        }

        if self.scheduler.tick_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "scheduler.tick_secs".into(),
                message: "tick_secs must be greater than 0".into(),
            });
        }

        let smtp_configured = !self.email.smtp.host.is_empty();
        let http_configured =
            !self.email.http_api.api_key.is_empty() && !self.email.http_api.sender_email.is_empty();
        if !smtp_configured && !http_configured {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "email".into(),
                message: "no email backend configured; send() will log and return false".into(),
            });
        }
        if http_configured
            && !self.email.http_api.url.starts_with("http://")
            && !self.email.http_api.url.starts_with("https://")
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "email.http_api.url".into(),
                message: format!(
                    "url must start with http:// or https:// (got \"{}\")",
                    self.email.http_api.url
                ),
            });
        }

        errors
    }

    pub fn has_errors(errors: &[ConfigError]) -> bool {
        errors.iter().any(|e| e.severity == ConfigSeverity::Error)
    }
}
