use std::{fmt, net::SocketAddr, time::Duration};

use poolgate_auth::{
    AwsCredentials, CognitoClientConfig, CredentialSource, PoolSettings, ProvisioningConfig,
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Region used when neither the config file nor `REGION` names one.
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// User pool, app client and API access settings
    #[serde(default)]
    pub cognito: CognitoSettings,
    /// Create-and-activate pipeline behavior
    #[serde(default)]
    pub provisioning: ProvisioningSettings,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Cognito validation
        if self.cognito.request_timeout_ms == 0 {
            return Err("cognito.request_timeout_ms must be > 0".into());
        }
        if let Some(endpoint) = self.cognito.endpoint() {
            let url = Url::parse(endpoint)
                .map_err(|e| format!("cognito.endpoint is not a valid URL: {e}"))?;
            if url.host_str().is_none() {
                return Err("cognito.endpoint must include a host".into());
            }
        }
        let has_key = self.cognito.access_key_id.is_some();
        let has_secret = self.cognito.secret_access_key.is_some();
        if has_key != has_secret {
            return Err(
                "cognito.access_key_id and cognito.secret_access_key must be set together".into(),
            );
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// =============================================================================
// Cognito
// =============================================================================

/// Cognito user pool settings.
///
/// Identifiers left empty are sent to Cognito as empty strings; the server
/// starts anyway and logs a warning.
#[derive(Clone, Serialize, Deserialize)]
pub struct CognitoSettings {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub user_pool_id: String,
    #[serde(default)]
    pub client_id: String,
    /// Empty for app clients without a secret.
    #[serde(default)]
    pub client_secret: String,
    /// Endpoint override, e.g. a local emulator.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Static keys. When unset the default AWS credential chain is used.
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    /// Send requests unsigned. Only local emulators accept them.
    #[serde(default)]
    pub unsigned: bool,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for CognitoSettings {
    fn default() -> Self {
        Self {
            region: String::new(),
            user_pool_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            endpoint: None,
            request_timeout_ms: default_request_timeout_ms(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            unsigned: false,
        }
    }
}

impl CognitoSettings {
    /// Configured region, or [`DEFAULT_REGION`] when empty.
    pub fn effective_region(&self) -> &str {
        if self.region.is_empty() {
            DEFAULT_REGION
        } else {
            &self.region
        }
    }

    /// Endpoint override, treating an empty string as unset.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().filter(|e| !e.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Names of the identifier fields that are empty.
    pub fn missing_identifiers(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.region.is_empty() {
            missing.push("region");
        }
        if self.user_pool_id.is_empty() {
            missing.push("user_pool_id");
        }
        if self.client_id.is_empty() {
            missing.push("client_id");
        }
        missing
    }

    /// Static keys from config, else unsigned when asked for, else the
    /// default AWS credential chain (environment, profiles, web identity,
    /// ECS and EC2 roles).
    pub async fn credential_source(&self) -> CredentialSource {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                let credentials = AwsCredentials::new(key.clone(), secret.clone());
                CredentialSource::Static(
                    match self.session_token.as_deref().filter(|t| !t.is_empty()) {
                        Some(token) => credentials.with_session_token(token),
                        None => credentials,
                    },
                )
            }
            _ if self.unsigned => CredentialSource::Unsigned,
            _ => CredentialSource::default_chain(self.effective_region()).await,
        }
    }

    /// Builds the Cognito client configuration.
    pub async fn to_client_config(&self) -> Result<CognitoClientConfig, String> {
        let mut client_config = CognitoClientConfig::new(self.effective_region())
            .with_request_timeout(self.request_timeout())
            .with_credentials(self.credential_source().await);
        if let Some(endpoint) = self.endpoint() {
            let url = Url::parse(endpoint)
                .map_err(|e| format!("cognito.endpoint is not a valid URL: {e}"))?;
            client_config = client_config.with_endpoint(url);
        }
        Ok(client_config)
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings::new(&self.user_pool_id, &self.client_id, &self.client_secret)
    }
}

impl fmt::Debug for CognitoSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |set: bool| if set { "[redacted]" } else { "" };
        f.debug_struct("CognitoSettings")
            .field("region", &self.region)
            .field("user_pool_id", &self.user_pool_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(!self.client_secret.is_empty()))
            .field("endpoint", &self.endpoint)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &redacted(self.secret_access_key.is_some()),
            )
            .field("session_token", &redacted(self.session_token.is_some()))
            .field("unsigned", &self.unsigned)
            .finish()
    }
}

// =============================================================================
// Provisioning
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    /// Delete a created user whose activation failed.
    #[serde(default = "default_rollback_on_failure")]
    pub rollback_on_failure: bool,
    /// Send `MessageAction=SUPPRESS` on user creation.
    #[serde(default)]
    pub suppress_invitation: bool,
}

fn default_rollback_on_failure() -> bool {
    true
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            rollback_on_failure: default_rollback_on_failure(),
            suppress_invitation: false,
        }
    }
}

impl ProvisioningSettings {
    pub fn to_provisioning_config(&self) -> ProvisioningConfig {
        ProvisioningConfig::new()
            .with_rollback_on_failure(self.rollback_on_failure)
            .with_suppress_invitation(self.suppress_invitation)
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::env;
    use std::path::PathBuf;

    /// Unprefixed variables that fill empty `cognito` fields.
    const LEGACY_VARS: [&str; 4] = ["REGION", "USER_POOL_ID", "CLIENT_ID", "CLIENT_SECRET"];

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or("poolgate.toml"));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., POOLGATE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("POOLGATE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let mut merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        apply_legacy_env(&mut merged);
        // Validate
        merged.validate()?;
        Ok(merged)
    }

    fn apply_legacy_env(cfg: &mut AppConfig) {
        let cognito = &mut cfg.cognito;
        let fields = [
            &mut cognito.region,
            &mut cognito.user_pool_id,
            &mut cognito.client_id,
            &mut cognito.client_secret,
        ];
        for (field, var) in fields.into_iter().zip(LEGACY_VARS) {
            if field.is_empty()
                && let Ok(value) = env::var(var)
            {
                *field = value;
            }
        }
    }
}
