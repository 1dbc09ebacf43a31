use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Service configuration, read from the environment (after `dotenv`).
/// Field names map to upper-cased variables: `PORT`, `MAX_UPLOAD_MIB`,
/// `AGE_SWEEP_INTERVAL_SECS`, `AGE_THRESHOLD_SECS`,
/// `FULL_SWEEP_INTERVAL_SECS`, `UPLOADS_DIR`, `REVERSED_DIR`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_mib")]
    pub max_upload_mib: u64,
    #[serde(default = "default_age_sweep_interval_secs")]
    pub age_sweep_interval_secs: u64,
    #[serde(default = "default_age_threshold_secs")]
    pub age_threshold_secs: u64,
    #[serde(default = "default_full_sweep_interval_secs")]
    pub full_sweep_interval_secs: u64,
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    #[serde(default = "default_reversed_dir")]
    pub reversed_dir: PathBuf,
}

fn default_port() -> u16 {
    3000
}

fn default_max_upload_mib() -> u64 {
    500
}

fn default_age_sweep_interval_secs() -> u64 {
    60 * 60
}

fn default_age_threshold_secs() -> u64 {
    24 * 60 * 60
}

fn default_full_sweep_interval_secs() -> u64 {
    10 * 60
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_reversed_dir() -> PathBuf {
    PathBuf::from("./reversed_videos")
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        envy::from_env().context("failed to read service configuration from environment")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config: ServiceConfig = envy::from_iter(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_upload_mib, 500);
        assert_eq!(config.age_sweep_interval_secs, 3_600);
        assert_eq!(config.age_threshold_secs, 86_400);
        assert_eq!(config.full_sweep_interval_secs, 600);
        assert_eq!(config.uploads_dir, PathBuf::from("./uploads"));
        assert_eq!(config.reversed_dir, PathBuf::from("./reversed_videos"));
    }

    #[test]
    fn environment_overrides_take_precedence() {
        let vars = vec![
            ("PORT".to_string(), "8080".to_string()),
            ("MAX_UPLOAD_MIB".to_string(), "32".to_string()),
            ("FULL_SWEEP_INTERVAL_SECS".to_string(), "45".to_string()),
        ];
        let config: ServiceConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_upload_mib, 32);
        assert_eq!(config.full_sweep_interval_secs, 45);
        assert_eq!(config.age_threshold_secs, 86_400);
    }
}
