//! gcsfs configuration management
//!
//! One `GcsfsConfig` is built at startup (from YAML or programmatically),
//! validated, and shared by `Arc` with every component that needs it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SCHEME: &str = "gs";
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
pub const DEFAULT_DOMAIN: &str = "storage.googleapis.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcsfsConfig {
    pub project_id: String,
    /// Bucket name. When empty it is derived from a `gs.<bucket>` scheme.
    pub bucket_name: String,
    /// Scheme the wrapper is registered under, e.g. `gs` or `public`.
    pub scheme: String,
    /// JSON file holding an HMAC key pair for the S3 interop API.
    pub credential_path: Option<PathBuf>,
    pub cache_enabled: bool,
    pub endpoint: String,
    pub region: String,
    /// Use `https://` in external URLs.
    pub https: bool,
    pub domain: String,
    /// Site base URL under which not-yet-generated derivatives are served.
    pub base_url: String,
    pub database_url: String,
    pub cache: CacheConfig,
    pub lock: LockConfig,
}

impl Default for GcsfsConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            bucket_name: String::new(),
            scheme: DEFAULT_SCHEME.to_string(),
            credential_path: None,
            cache_enabled: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            region: "auto".to_string(),
            https: true,
            domain: DEFAULT_DOMAIN.to_string(),
            base_url: String::new(),
            database_url: default_database_url(),
            cache: CacheConfig::default(),
            lock: LockConfig::default(),
        }
    }
}

/// Fast in-process cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: u64,
    /// Entries never expire when unset; invalidation is explicit.
    pub ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            ttl_secs: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Cache-population lock tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lifetime of a population lock; it expires on its own after this.
    pub acquire_timeout_ms: u64,
    /// Upper bound on a single wait for somebody else's lock.
    pub wait_timeout_ms: u64,
    /// Wait-then-retry cycles before reading the durable store directly.
    pub max_retries: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 1_000,
            wait_timeout_ms: 5_000,
            max_retries: 8,
        }
    }
}

impl LockConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// HMAC key pair as downloaded from the bucket service console.
#[derive(Clone, Serialize, Deserialize)]
pub struct HmacCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for HmacCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn default_database_url() -> String {
    let path = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("gcsfs")
        .join("metadata.db");
    format!("sqlite://{}?mode=rwc", path.display())
}

/// Bucket encoded in a scheme of the form `gs.<bucket>`; `+` stands for `-`.
pub fn bucket_from_scheme(scheme: &str) -> Option<String> {
    let (_, bucket) = scheme.split_once('.')?;
    let bucket = bucket.replace('+', "-");
    (!bucket.is_empty()).then_some(bucket)
}

impl GcsfsConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_default_path() -> Result<Self, ConfigError> {
        let possible_paths = ["gcsfs.yml", "gcsfs.yaml", "/etc/gcsfs/config.yml"];
        for path in &possible_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }
        Err(ConfigError::Invalid(format!(
            "no configuration found, tried {}",
            possible_paths.join(", ")
        )))
    }

    /// Effective bucket: the configured name, else the one encoded in the scheme.
    pub fn bucket(&self) -> Option<String> {
        if !self.bucket_name.is_empty() {
            return Some(self.bucket_name.clone());
        }
        bucket_from_scheme(&self.scheme)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheme.is_empty() || self.scheme.contains("://") {
            return Err(ConfigError::Invalid(format!("bad scheme `{}`", self.scheme)));
        }
        if self.bucket().is_none() {
            return Err(ConfigError::Invalid(
                "bucket_name is empty and the scheme does not encode one".into(),
            ));
        }
        if self.lock.acquire_timeout_ms == 0 || self.lock.wait_timeout_ms == 0 {
            return Err(ConfigError::Invalid("lock timeouts must be non-zero".into()));
        }
        match &self.credential_path {
            Some(path) if !path.exists() => Err(ConfigError::Invalid(format!(
                "credential file {} does not exist",
                path.display()
            ))),
            _ => Ok(()),
        }
    }

    pub fn load_credentials(&self) -> Result<Option<HmacCredentials>, ConfigError> {
        let Some(path) = &self.credential_path else {
            return Ok(None);
        };
        let content = std::fs::read_to_string(path)?;
        let creds = serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(Some(creds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_bucket_from_scheme() {
        assert_eq!(bucket_from_scheme("gs.my+bucket").as_deref(), Some("my-bucket"));
        assert_eq!(bucket_from_scheme("gs.a.b").as_deref(), Some("a.b"));
        assert_eq!(bucket_from_scheme("gs"), None);
        assert_eq!(bucket_from_scheme("gs."), None);
    }

    #[test]
    fn test_yaml_defaults_and_validation() {
        let config: GcsfsConfig = serde_yaml::from_str(
            "project_id: demo\nbucket_name: assets\nlock:\n  wait_timeout_ms: 200\n",
        )
        .unwrap();
        assert_eq!(config.bucket().as_deref(), Some("assets"));
        assert!(config.cache_enabled);
        assert_eq!(config.lock.acquire_timeout_ms, 1_000);
        assert_eq!(config.lock.wait_timeout(), Duration::from_millis(200));
        config.validate().unwrap();

        let derived = GcsfsConfig {
            scheme: "gs.site+files".into(),
            ..Default::default()
        };
        assert_eq!(derived.bucket().as_deref(), Some("site-files"));

        assert!(GcsfsConfig::default().validate().is_err());
    }

    #[test]
    fn test_load_credentials() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"access_key_id":"GOOG1E","secret_access_key":"s3cr3t"}}"#).unwrap();
        let config = GcsfsConfig {
            bucket_name: "b".into(),
            credential_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        config.validate().unwrap();
        let creds = config.load_credentials().unwrap().unwrap();
        assert_eq!(creds.access_key_id, "GOOG1E");
        assert!(!format!("{creds:?}").contains("s3cr3t"));
    }
}
