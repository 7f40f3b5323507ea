use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;

use crate::api_auth::{ConfigError, DigestEncoding, HashAlgorithm};

/// Environment variable consulted when the config file carries no secret.
pub const SECRET_ENV_VAR: &str = "SIGNED_REQUESTS_SECRET";

/// Longest accepted identifier lifetime: one year.
pub const MAX_EXPIRY_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    /// `hourly`, `daily`, anything else never rotates
    pub rotation: String,
    /// Emit one `AUTH_VERDICT` line per verified request
    pub enable_verdict_trace: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "signed_requests.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            enable_verdict_trace: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

/// Signed-request authentication settings.
///
/// Immutable once handed to the gate; shared read-only across requests.
#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret. Mandatory.
    pub secret: Option<String>,
    /// Derives `X-{header}-Signature` and `X-{header}-UUID`
    pub header: String,
    /// Seconds a request identifier stays valid
    pub expiry: u64,
    pub digest: DigestEncoding,
    pub hash: HashAlgorithm,
    pub nonce_prefix: String,
    /// Literal prefix in front of the encoded digest, e.g. `sha1=`
    pub signature_prefix: String,
    #[serde(alias = "is_uuid_required")]
    pub identifier_required: bool,
    pub debug_bypass: bool,
    /// Upper bound on bytes read from a request body
    pub max_body_bytes: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            header: "auth".to_string(),
            expiry: 300,
            digest: DigestEncoding::Base64,
            hash: HashAlgorithm::Sha256,
            nonce_prefix: "nonce".to_string(),
            signature_prefix: String::new(),
            identifier_required: true,
            debug_bypass: false,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("header", &self.header)
            .field("expiry", &self.expiry)
            .field("digest", &self.digest)
            .field("hash", &self.hash)
            .field("nonce_prefix", &self.nonce_prefix)
            .field("signature_prefix", &self.signature_prefix)
            .field("identifier_required", &self.identifier_required)
            .field("debug_bypass", &self.debug_bypass)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl AuthConfig {
    /// Config with the given secret and every other field at its default.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            ..Self::default()
        }
    }

    /// Secret bytes, or `MissingSecret` when unset or empty.
    pub fn secret_bytes(&self) -> Result<&[u8], ConfigError> {
        match self.secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(secret.as_bytes()),
            _ => Err(ConfigError::MissingSecret),
        }
    }

    pub fn signature_header(&self) -> Result<HeaderName, ConfigError> {
        self.derive_header("signature")
    }

    pub fn identifier_header(&self) -> Result<HeaderName, ConfigError> {
        self.derive_header("uuid")
    }

    fn derive_header(&self, suffix: &str) -> Result<HeaderName, ConfigError> {
        let name = format!("x-{}-{}", self.header.to_ascii_lowercase(), suffix);
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ConfigError::InvalidHeaderName(self.header.clone()))
    }

    /// Check every field that can make the configuration unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.secret_bytes()?;
        if self.expiry == 0 || self.expiry > MAX_EXPIRY_SECS {
            return Err(ConfigError::InvalidExpiry);
        }
        if self.header.is_empty() {
            return Err(ConfigError::InvalidHeaderName(self.header.clone()));
        }
        self.signature_header()?;
        self.identifier_header()?;
        Ok(())
    }

    /// Fill a missing secret from [`SECRET_ENV_VAR`].
    pub fn with_env_overrides(mut self) -> Self {
        if self.secret.is_none() {
            self.secret = std::env::var(SECRET_ENV_VAR).ok();
        }
        self
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Read {
            path: config_path.clone(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: AppConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.auth = config.auth.with_env_overrides();
        config.auth.validate()?;
        Ok(config)
    }
}
