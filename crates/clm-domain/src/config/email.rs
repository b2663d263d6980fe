use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Email
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Backend selection is implicit: an SMTP host configured selects SMTP;
/// otherwise an HTTP API key + sender selects the HTTP backend; neither
/// configured means `send()` logs a warning and returns `false`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmailConfig {
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub http_api: HttpApiEmailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "d_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "d_true")]
    pub use_tls: bool,
    #[serde(default)]
    pub sender_email: String,
    #[serde(default = "d_sender_name")]
    pub sender_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HttpApiEmailConfig {
    #[serde(default = "d_http_api_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub sender_email: String,
    #[serde(default = "d_sender_name")]
    pub sender_name: String,
}

fn d_smtp_port() -> u16 {
    587
}
fn d_true() -> bool {
    true
}
fn d_sender_name() -> String {
    "CloudLab Manager".into()
}
fn d_http_api_url() -> String {
    "https://send.api.sendamatic.net/send".into()
}
