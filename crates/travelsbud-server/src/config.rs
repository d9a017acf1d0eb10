use std::path::PathBuf;

use anyhow::{Context, bail};

use travelsbud_core::FcmPushGateway;

const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Process settings, read from the environment (and `.env` when present).
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub blob_dir: PathBuf,
    pub public_url: String,
    pub fcm: Option<FcmConfig>,
}

pub struct FcmConfig {
    pub server_key: String,
    pub endpoint: String,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = std::env::var("TRAVELSBUD_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("TRAVELSBUD_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        let port = var_or("TRAVELSBUD_PORT", "3000")
            .parse()
            .context("TRAVELSBUD_PORT must be a port number")?;

        let fcm = std::env::var("TRAVELSBUD_FCM_SERVER_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .map(|server_key| FcmConfig {
                server_key,
                endpoint: var_or("TRAVELSBUD_FCM_ENDPOINT", FcmPushGateway::DEFAULT_ENDPOINT),
            });

        Ok(Self {
            host: var_or("TRAVELSBUD_HOST", "0.0.0.0"),
            port,
            db_path: var_or("TRAVELSBUD_DB_PATH", "travelsbud.db").into(),
            jwt_secret,
            blob_dir: var_or("TRAVELSBUD_BLOB_DIR", "./blobs").into(),
            public_url: var_or("TRAVELSBUD_PUBLIC_URL", "http://localhost:3000"),
            fcm,
        })
    }
}
