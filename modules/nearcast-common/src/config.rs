use std::env;
use std::path::PathBuf;

use crate::error::NearcastError;

/// Application configuration loaded from environment variables.
/// Contains only endpoints and secrets; map tuning lives in the TOML `FileConfig`.
#[derive(Debug, Clone)]
pub struct Config {
    // Backend
    pub api_url: String,
    pub api_token: Option<String>,

    // Tuning file
    pub config_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables (and `.env`, if present).
    pub fn from_env() -> Result<Self, NearcastError> {
        dotenvy::dotenv().ok();

        let api_url = required_env("NEARCAST_API_URL")?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_token: env::var("NEARCAST_API_TOKEN").ok().filter(|t| !t.is_empty()),
            config_path: env::var("NEARCAST_CONFIG").ok().map(PathBuf::from),
        })
    }

    /// Log the loaded config without leaking the token.
    pub fn log_redacted(&self) {
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => {
                    let head: String = v.chars().take(4).collect();
                    format!("{head}...({} chars)", v.len())
                }
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  NEARCAST_API_URL: {}", self.api_url);
        tracing::info!("  NEARCAST_API_TOKEN: {}", preview_opt(&self.api_token));
        tracing::info!(
            "  NEARCAST_CONFIG: {}",
            self.config_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<defaults>".to_string())
        );
    }
}

fn required_env(key: &str) -> Result<String, NearcastError> {
    env::var(key).map_err(|_| NearcastError::Config(format!("{key} environment variable is required")))
}
