//! Where signing credentials come from.
//!
//! [`CredentialSource::default_chain`] resolves credentials the way AWS SDKs
//! do: environment variables, shared `~/.aws` profiles, web identity tokens
//! (IRSA), and ECS or EC2 instance roles. Resolved credentials are cached
//! until shortly before they expire.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use aws_config::Region;
use aws_config::default_provider::credentials::DefaultCredentialsChain;
use aws_credential_types::Credentials;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};

use super::IdpError;
use super::sigv4::AwsCredentials;

/// Refresh cached credentials this long before they expire.
const EXPIRY_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Source of SigV4 signing credentials.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Send requests unsigned (local emulators).
    Unsigned,
    /// Fixed credentials.
    Static(AwsCredentials),
    /// A credentials provider, usually the default chain.
    Provider(SharedCredentialsProvider),
}

impl CredentialSource {
    /// Builds the default AWS credential chain for `region`.
    pub async fn default_chain(region: &str) -> Self {
        let chain = DefaultCredentialsChain::builder()
            .region(Region::new(region.to_string()))
            .build()
            .await;
        Self::Provider(SharedCredentialsProvider::new(chain))
    }

    /// Wraps any credentials provider.
    #[must_use]
    pub fn provider(provider: impl ProvideCredentials + 'static) -> Self {
        Self::Provider(SharedCredentialsProvider::new(provider))
    }

    /// Returns `true` unless requests are sent unsigned.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        !matches!(self, Self::Unsigned)
    }

    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unsigned => "unsigned",
            Self::Static(_) => "static",
            Self::Provider(_) => "provider_chain",
        }
    }
}

/// Resolves and caches credentials from a [`CredentialSource`].
#[derive(Debug)]
pub(crate) struct CredentialResolver {
    source: CredentialSource,
    cached: Mutex<Option<Credentials>>,
}

impl CredentialResolver {
    pub(crate) fn new(source: CredentialSource) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    pub(crate) fn source(&self) -> &CredentialSource {
        &self.source
    }

    /// Credentials to sign the next request with, or `None` when unsigned.
    pub(crate) async fn resolve(&self) -> Result<Option<AwsCredentials>, IdpError> {
        let provider = match &self.source {
            CredentialSource::Unsigned => return Ok(None),
            CredentialSource::Static(credentials) => return Ok(Some(credentials.clone())),
            CredentialSource::Provider(provider) => provider,
        };

        if let Some(credentials) = self.cached_if_fresh() {
            return Ok(Some(to_signing(&credentials)));
        }

        let credentials = provider.provide_credentials().await.map_err(|e| {
            let message = match std::error::Error::source(&e) {
                Some(source) => format!("{e}: {source}"),
                None => e.to_string(),
            };
            tracing::warn!(error = %message, "Failed to resolve AWS credentials");
            IdpError::Credentials(message)
        })?;
        let signing = to_signing(&credentials);
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some(credentials);
        }
        Ok(Some(signing))
    }

    fn cached_if_fresh(&self) -> Option<Credentials> {
        let cached = self.cached.lock().ok()?;
        let credentials = cached.as_ref()?;
        match credentials.expiry() {
            None => Some(credentials.clone()),
            Some(expiry) => {
                let fresh = expiry
                    .duration_since(SystemTime::now())
                    .is_ok_and(|left| left > EXPIRY_BUFFER);
                fresh.then(|| credentials.clone())
            }
        }
    }
}

fn to_signing(credentials: &Credentials) -> AwsCredentials {
    let signing = AwsCredentials::new(
        credentials.access_key_id(),
        credentials.secret_access_key(),
    );
    match credentials.session_token() {
        Some(token) => signing.with_session_token(token),
        None => signing,
    }
}
