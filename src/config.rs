use std::{path::{Path, PathBuf}, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::retention_service::RetentionPolicy;

pub const DEFAULT_STACK_DIR: &str = "/opt/pi-stack";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {0} does not exist")]
    ConfigMissing(PathBuf),
    #[error("configuration field `{0}` is missing or empty")]
    ConfigFieldMissing(&'static str),
    #[error("configuration file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("could not read configuration: {0}")]
    IOError(#[from] std::io::Error),
    #[error("invalid value {value:?} for {name}")]
    InvalidSetting { name: &'static str, value: String },
}

///
/// The JSON document written at deployment time. Only the storage
/// root is consumed, every other field is ignored.
///
#[derive(Debug, Deserialize)]
pub struct Config {
    pub external_drive: Option<String>,
}

impl Config {
    ///
    /// Reads the config at `path` and returns the external storage root
    ///
    pub fn load(path: &Path) -> Result<PathBuf> {
        if !path.exists() {
            return Err(ConfigError::ConfigMissing(path.to_path_buf()));
        }
        let config: Config = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        config.storage_root()
    }

    fn storage_root(&self) -> Result<PathBuf> {
        match self.external_drive.as_deref().map(str::trim) {
            Some(root) if !root.is_empty() => Ok(PathBuf::from(root)),
            _ => Err(ConfigError::ConfigFieldMissing("external_drive")),
        }
    }
}

///
/// The run context handed to every component. Resolved once at startup
/// from the storage root and environment overrides.
///
#[derive(Debug, Clone)]
pub struct Settings {
    pub storage_root: PathBuf,
    pub retention: RetentionPolicy,
    pub config_path: PathBuf,
    pub compose_file: PathBuf,
    pub secrets_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub upload_uid: u32,
    pub upload_gid: u32,
    pub volume_name: String,
    pub db_service: String,
    pub db_name: String,
    pub db_user: String,
    pub tunnel_credentials_dir: Option<PathBuf>,
    pub helper_image: String,
    pub restore_grace: Duration,
}

impl Settings {
    pub fn from_env(storage_root: PathBuf, config_path: PathBuf) -> Result<Self> {
        Self::resolve(storage_root, config_path, |key| std::env::var(key).ok())
    }

    ///
    /// Builds the settings with `lookup` standing in for the process environment
    ///
    pub fn resolve(
        storage_root: PathBuf,
        config_path: PathBuf,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let defaults = RetentionPolicy::default();
        let retention = RetentionPolicy {
            daily: parse_var(&lookup, "DAILY_RETENTION")?.unwrap_or(defaults.daily),
            weekly: parse_var(&lookup, "WEEKLY_RETENTION")?.unwrap_or(defaults.weekly),
            monthly: parse_var(&lookup, "MONTHLY_RETENTION")?.unwrap_or(defaults.monthly),
        };

        let stack_dir = stack_dir(&lookup);
        let upload_dir = lookup("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| storage_root.join("immich").join("upload"));
        let tunnel_credentials_dir = lookup("TUNNEL_CREDENTIALS_DIR")
            .map(PathBuf::from)
            .or_else(|| lookup("HOME").map(|home| PathBuf::from(home).join(".cloudflared")));
        let grace_secs: u64 = parse_var(&lookup, "RESTORE_GRACE_SECS")?.unwrap_or(10);
        let upload_uid = parse_var(&lookup, "UPLOAD_UID")?.unwrap_or(1000);
        let upload_gid = parse_var(&lookup, "UPLOAD_GID")?.unwrap_or(upload_uid);

        Ok(Self {
            retention,
            config_path,
            compose_file: stack_dir.join(COMPOSE_FILE_NAME),
            secrets_dir: stack_dir.join("secrets"),
            upload_dir,
            upload_uid,
            upload_gid,
            volume_name: lookup("PORTAINER_VOLUME").unwrap_or_else(|| "portainer_data".to_string()),
            db_service: lookup("DB_SERVICE").unwrap_or_else(|| "database".to_string()),
            db_name: lookup("DB_NAME").unwrap_or_else(|| "immich".to_string()),
            db_user: lookup("DB_USER").unwrap_or_else(|| "postgres".to_string()),
            tunnel_credentials_dir,
            helper_image: lookup("HELPER_IMAGE").unwrap_or_else(|| "alpine:latest".to_string()),
            restore_grace: Duration::from_secs(grace_secs),
            storage_root,
        })
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.storage_root.join("backups")
    }
}

///
/// The directory holding the compose file, live config and secrets
///
pub fn stack_dir(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup("PI_STACK_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STACK_DIR))
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidSetting { name, value }),
    }
}
