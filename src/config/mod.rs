use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Request signing scheme used against the S3-compatible API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureVersion {
    /// Legacy AWS Signature Version 2 (HMAC-SHA1)
    V2,
    /// AWS Signature Version 4 (HMAC-SHA256)
    #[default]
    V4,
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("insufficient s3 configuration information: {field} is not set")]
    Missing { field: &'static str },
}

/// Connection parameters for an S3-compatible bucket
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Bucket name
    #[serde(default)]
    pub bucket: String,

    /// Endpoint host (and optional port), without scheme
    #[serde(default)]
    pub endpoint: String,

    /// Access key ID
    #[serde(default)]
    pub access_key: String,

    /// Secret access key
    #[serde(default)]
    pub secret_key: String,

    /// Talk plain HTTP instead of HTTPS
    #[serde(default)]
    pub insecure: bool,

    /// Signing scheme (default: v4)
    #[serde(default)]
    pub signature_version: SignatureVersion,

    /// Request SSE-S3 server side encryption on writes
    #[serde(default)]
    pub sse_encryption: bool,

    /// Region used in the V4 credential scope (default: us-east-1)
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Config {
    /// Create a configuration with the required fields set and defaults elsewhere
    pub fn new(
        bucket: impl Into<String>,
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            insecure: false,
            signature_version: SignatureVersion::V4,
            sse_encryption: false,
            region: default_region(),
        }
    }

    /// Check that every required field is set.
    ///
    /// Only presence is checked; the endpoint format is validated when the
    /// client is built.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let required = [
            ("bucket", &self.bucket),
            ("endpoint", &self.endpoint),
            ("access key", &self.access_key),
            ("secret key", &self.secret_key),
        ];

        for (field, value) in required {
            if value.is_empty() {
                return Err(ConfigError::Missing { field });
            }
        }
        Ok(())
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load configuration from environment variables
///
/// - S3_BUCKET
/// - S3_ENDPOINT
/// - S3_ACCESS_KEY
/// - S3_SECRET_KEY
/// - S3_INSECURE (true/1)
/// - S3_SIGNATURE_VERSION2 (true/1)
/// - S3_SSE_ENCRYPTION (true/1)
/// - S3_REGION (optional, defaults to us-east-1)
///
/// Unset variables are left empty; call [`Config::validate`] afterwards.
pub fn load_from_env() -> Result<Config> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let var = |name: &str| std::env::var(name).unwrap_or_default();

    let mut config = Config::new(
        var("S3_BUCKET"),
        var("S3_ENDPOINT"),
        var("S3_ACCESS_KEY"),
        var("S3_SECRET_KEY"),
    );

    config.insecure = env_flag("S3_INSECURE")?;
    config.sse_encryption = env_flag("S3_SSE_ENCRYPTION")?;
    if env_flag("S3_SIGNATURE_VERSION2")? {
        config.signature_version = SignatureVersion::V2;
    }

    if let Ok(region) = std::env::var("S3_REGION") {
        if !region.is_empty() {
            config.region = region;
        }
    }

    Ok(config)
}

/// Load configuration from file or environment
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    match config_path {
        Some(path) => load_from_yaml(path),
        None => load_from_env(),
    }
}

fn env_flag(name: &str) -> Result<bool> {
    match std::env::var(name) {
        Ok(v) => parse_flag(&v).with_context(|| format!("Invalid boolean in {}", name)),
        Err(_) => Ok(false),
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        other => anyhow::bail!("expected true/false, got '{}'", other),
    }
}
