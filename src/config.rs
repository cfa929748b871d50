//! Configuration for the SSS object storage server

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Root directory for object data (blobs + multipart staging)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Path to the SQLite metadata database. Defaults to `{data_dir}/sss.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Region reported in SigV4 scopes and bucket-location responses
    #[serde(default = "default_region")]
    pub region: String,

    /// Admin access key id (bypasses per-bucket grants)
    #[serde(default)]
    pub admin_access_key_id: Option<String>,

    /// Admin secret access key
    #[serde(default)]
    pub admin_secret_access_key: Option<String>,

    /// Maximum size of a finished object in bytes (single PUT or merged multipart)
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,

    /// Maximum size of a single request body in bytes (PUT object or one part)
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
}

// Default value functions for serde
fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:9000".parse().unwrap()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_object_size() -> u64 {
    5 * 1024 * 1024 * 1024 // 5GB
}

fn default_max_upload_size() -> u64 {
    1024 * 1024 * 1024 // 1GB per request body
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            data_dir: default_data_dir(),
            db_path: None,
            region: default_region(),
            admin_access_key_id: None,
            admin_secret_access_key: None,
            max_object_size: default_max_object_size(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// The process-wide admin identity from configuration.
#[derive(Debug, Clone)]
pub struct AdminIdentity {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("SSS_LISTEN_ADDR") {
            if let Ok(parsed) = addr.parse() {
                config.listen_addr = parsed;
            }
        }

        if let Ok(dir) = std::env::var("SSS_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("SSS_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Ok(region) = std::env::var("SSS_REGION") {
            config.region = region;
        }

        if let Ok(key) = std::env::var("SSS_ADMIN_ACCESS_KEY_ID") {
            config.admin_access_key_id = Some(key);
        }

        if let Ok(secret) = std::env::var("SSS_ADMIN_SECRET_ACCESS_KEY") {
            config.admin_secret_access_key = Some(secret);
        }

        if let Ok(size) = std::env::var("SSS_MAX_OBJECT_SIZE") {
            if let Ok(parsed) = size.parse() {
                config.max_object_size = parsed;
            }
        }

        if let Ok(size) = std::env::var("SSS_MAX_UPLOAD_SIZE") {
            if let Ok(parsed) = size.parse() {
                config.max_upload_size = parsed;
            }
        }

        config
    }

    /// Load configuration from file if one is found, otherwise from environment.
    /// Environment variables override file values either way.
    pub fn load() -> Self {
        // Explicit config file first
        if let Ok(path) = std::env::var("SSS_CONFIG") {
            if let Ok(config) = Self::from_file(&path) {
                return config.merged_with_env();
            }
        }

        // Default config file locations
        for path in &["sss.toml", "/etc/sss/config.toml"] {
            if std::path::Path::new(path).exists() {
                if let Ok(config) = Self::from_file(path) {
                    return config.merged_with_env();
                }
            }
        }

        // Fall back to environment variables
        Self::from_env()
    }

    /// Overlay environment variables on top of file-loaded values.
    fn merged_with_env(mut self) -> Self {
        let env = Self::from_env();
        let defaults = Self::default();

        if env.listen_addr != defaults.listen_addr {
            self.listen_addr = env.listen_addr;
        }
        if env.data_dir != defaults.data_dir {
            self.data_dir = env.data_dir;
        }
        if env.db_path.is_some() {
            self.db_path = env.db_path;
        }
        if env.region != defaults.region {
            self.region = env.region;
        }
        if env.admin_access_key_id.is_some() {
            self.admin_access_key_id = env.admin_access_key_id;
        }
        if env.admin_secret_access_key.is_some() {
            self.admin_secret_access_key = env.admin_secret_access_key;
        }
        if env.max_object_size != defaults.max_object_size {
            self.max_object_size = env.max_object_size;
        }
        if env.max_upload_size != defaults.max_upload_size {
            self.max_upload_size = env.max_upload_size;
        }
        self
    }

    /// Resolved path to the SQLite metadata database.
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("sss.db"))
    }

    /// The admin identity, if both halves of the key pair are configured.
    pub fn admin_identity(&self) -> Option<AdminIdentity> {
        match (&self.admin_access_key_id, &self.admin_secret_access_key) {
            (Some(id), Some(secret)) => Some(AdminIdentity {
                access_key_id: id.clone(),
                secret_access_key: secret.clone(),
            }),
            _ => None,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
