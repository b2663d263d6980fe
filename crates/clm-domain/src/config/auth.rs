use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Auth / Admin
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable holding the bearer token required on protected
    /// routes. Unset means the dev-mode fallback: all requests pass.
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
    /// Environment variable holding the admin-only bearer token.
    #[serde(default = "d_admin_token_env")]
    pub admin_token_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_token_env: d_api_token_env(),
            admin_token_env: d_admin_token_env(),
        }
    }
}

fn d_api_token_env() -> String {
    "CLM_API_TOKEN".into()
}
fn d_admin_token_env() -> String {
    "CLM_ADMIN_TOKEN".into()
}
