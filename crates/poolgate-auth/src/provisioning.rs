//! User provisioning with immediate activation.
//!
//! [`UserProvisioner`] creates a user with a temporary password and then
//! walks it through the admin auth flow so the account is usable right away,
//! without an email verification round-trip:
//!
//! 1. **Secret hash** - derived once per request from username and app client
//! 2. **Create user** - `AdminCreateUser`, user lands in `FORCE_CHANGE_PASSWORD`
//! 3. **Initiate auth** - `AdminInitiateAuth` returns `NEW_PASSWORD_REQUIRED` and a session
//! 4. **Respond to challenge** - `AdminRespondToAuthChallenge` sets the permanent password
//!
//! Each stage short-circuits on failure. A user created in step 2 that fails
//! to activate is deleted again when rollback is enabled.
//!
//! # Example
//!
//! ```ignore
//! use poolgate_auth::provisioning::{PoolSettings, ProvisioningConfig, UserProvisioner};
//!
//! let provisioner = UserProvisioner::new(provider, pool, ProvisioningConfig::default());
//! let request = ProvisioningRequest::from_slice(br#"{"username":"alice","password":"Passw0rd!"}"#)?;
//! let user = provisioner.provision(&request).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::provider::{
    CreateUserInput, IdentityProvider, IdpError, InitiateAuthInput, NEW_PASSWORD_REQUIRED,
    RespondToChallengeInput,
};
use crate::secret_hash::secret_hash_for_client;

/// User pool and app client identifiers.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PoolSettings {
    pub user_pool_id: String,
    pub client_id: String,
    /// App client secret. Empty for clients without a secret.
    pub client_secret: String,
}

impl PoolSettings {
    /// Creates pool settings.
    #[must_use]
    pub fn new(
        user_pool_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            user_pool_id: user_pool_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for PoolSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSettings")
            .field("user_pool_id", &self.user_pool_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

/// Configuration for user provisioning.
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    /// Whether to delete a created user whose activation failed.
    /// Default: `true`
    pub rollback_on_failure: bool,

    /// Whether to suppress the invitation message on user creation.
    /// Default: `false`
    pub suppress_invitation: bool,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            rollback_on_failure: true,
            suppress_invitation: false,
        }
    }
}

impl ProvisioningConfig {
    /// Creates a new provisioning configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether failed activations are rolled back.
    #[must_use]
    pub fn with_rollback_on_failure(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled;
        self
    }

    /// Sets whether the invitation message is suppressed.
    #[must_use]
    pub fn with_suppress_invitation(mut self, enabled: bool) -> Self {
        self.suppress_invitation = enabled;
        self
    }
}

/// Body of a provisioning request.
///
/// No validation beyond JSON shape is done; the provider enforces its own
/// username and password policy.
#[derive(Clone, Deserialize)]
pub struct ProvisioningRequest {
    pub username: String,
    /// Used as both the temporary and the permanent password.
    pub password: String,
}

impl ProvisioningRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Decodes a request from a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::InvalidRequest`] if the body is not a JSON
    /// object with string `username` and `password` members.
    pub fn from_slice(body: &[u8]) -> Result<Self, ProvisioningError> {
        serde_json::from_slice(body).map_err(|e| ProvisioningError::InvalidRequest(e.to_string()))
    }
}

impl fmt::Debug for ProvisioningRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningRequest")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Pipeline stage, used for logging and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStage {
    Decode,
    CreateUser,
    InitiateAuth,
    RespondToChallenge,
}

impl fmt::Display for ProvisioningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode => write!(f, "decode"),
            Self::CreateUser => write!(f, "create_user"),
            Self::InitiateAuth => write!(f, "initiate_auth"),
            Self::RespondToChallenge => write!(f, "respond_to_challenge"),
        }
    }
}

/// Errors that can occur during user provisioning.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    /// The request body could not be decoded.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The provider refused to create the user.
    #[error("Create user failed: {0}")]
    CreateUser(#[source] IdpError),

    /// The provider refused to start the auth flow.
    #[error("Initiate auth failed: {0}")]
    InitiateAuth(#[source] IdpError),

    /// The provider refused the challenge response.
    #[error("Respond to auth challenge failed: {0}")]
    RespondToChallenge(#[source] IdpError),

    /// The provider issued a challenge other than `NEW_PASSWORD_REQUIRED`.
    #[error("Unexpected auth challenge: {0}")]
    UnexpectedChallenge(String),

    /// `NEW_PASSWORD_REQUIRED` was issued without a session.
    #[error("Auth challenge is missing a session")]
    MissingSession,
}

impl ProvisioningError {
    /// Returns the stage that failed.
    #[must_use]
    pub fn stage(&self) -> ProvisioningStage {
        match self {
            Self::InvalidRequest(_) => ProvisioningStage::Decode,
            Self::CreateUser(_) => ProvisioningStage::CreateUser,
            Self::InitiateAuth(_) | Self::UnexpectedChallenge(_) | Self::MissingSession => {
                ProvisioningStage::InitiateAuth
            }
            Self::RespondToChallenge(_) => ProvisioningStage::RespondToChallenge,
        }
    }

    /// Returns the underlying provider error, if any.
    #[must_use]
    pub fn provider_error(&self) -> Option<&IdpError> {
        match self {
            Self::CreateUser(e) | Self::InitiateAuth(e) | Self::RespondToChallenge(e) => Some(e),
            _ => None,
        }
    }
}

/// How a provisioned user became usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The forced password-change challenge was answered.
    ChallengeCompleted,
    /// The provider authenticated the user without issuing a challenge.
    AlreadyAuthenticated,
}

/// Result of a successful provisioning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedUser {
    pub username: String,
    pub activation: Activation,
}

/// Creates and activates users against an [`IdentityProvider`].
pub struct UserProvisioner {
    provider: Arc<dyn IdentityProvider>,
    pool: PoolSettings,
    config: ProvisioningConfig,
}

impl UserProvisioner {
    /// Creates a provisioner.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        pool: PoolSettings,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            provider,
            pool,
            config,
        }
    }

    /// Returns the pool settings.
    #[must_use]
    pub fn pool(&self) -> &PoolSettings {
        &self.pool
    }

    /// Creates the user and completes the forced password change.
    ///
    /// # Errors
    ///
    /// Returns the first failing stage's error. Later stages are not run.
    pub async fn provision(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<ProvisionedUser, ProvisioningError> {
        let secret_hash = secret_hash_for_client(
            &request.username,
            &self.pool.client_id,
            &self.pool.client_secret,
        );

        self.provider
            .admin_create_user(&CreateUserInput {
                user_pool_id: self.pool.user_pool_id.clone(),
                username: request.username.clone(),
                temporary_password: request.password.clone(),
                suppress_invitation: self.config.suppress_invitation,
            })
            .await
            .map_err(ProvisioningError::CreateUser)
            .inspect_err(|e| log_failure(&request.username, e))?;

        tracing::debug!(username = %request.username, "User created");

        match self.activate(request, secret_hash).await {
            Ok(activation) => {
                tracing::info!(
                    username = %request.username,
                    activation = ?activation,
                    "User provisioned"
                );
                Ok(ProvisionedUser {
                    username: request.username.clone(),
                    activation,
                })
            }
            Err(e) => {
                log_failure(&request.username, &e);
                if self.config.rollback_on_failure {
                    self.rollback(&request.username).await;
                }
                Err(e)
            }
        }
    }

    async fn activate(
        &self,
        request: &ProvisioningRequest,
        secret_hash: Option<String>,
    ) -> Result<Activation, ProvisioningError> {
        let challenge = self
            .provider
            .admin_initiate_auth(&InitiateAuthInput {
                user_pool_id: self.pool.user_pool_id.clone(),
                client_id: self.pool.client_id.clone(),
                username: request.username.clone(),
                password: request.password.clone(),
                secret_hash: secret_hash.clone(),
            })
            .await
            .map_err(ProvisioningError::InitiateAuth)?;

        if !challenge.is_new_password_required() {
            return match challenge.challenge_name {
                Some(name) => Err(ProvisioningError::UnexpectedChallenge(name)),
                None if challenge.authenticated => Ok(Activation::AlreadyAuthenticated),
                None => Err(ProvisioningError::UnexpectedChallenge(
                    "no challenge and no authentication result".to_string(),
                )),
            };
        }

        let session = challenge
            .session
            .ok_or(ProvisioningError::MissingSession)?;

        self.provider
            .admin_respond_to_auth_challenge(&RespondToChallengeInput {
                user_pool_id: self.pool.user_pool_id.clone(),
                client_id: self.pool.client_id.clone(),
                challenge_name: NEW_PASSWORD_REQUIRED.to_string(),
                username: request.username.clone(),
                new_password: request.password.clone(),
                secret_hash,
                session,
            })
            .await
            .map_err(ProvisioningError::RespondToChallenge)?;

        Ok(Activation::ChallengeCompleted)
    }

    async fn rollback(&self, username: &str) {
        match self
            .provider
            .admin_delete_user(&self.pool.user_pool_id, username)
            .await
        {
            Ok(()) => tracing::info!(username, "Rolled back partially provisioned user"),
            Err(e) => tracing::warn!(
                username,
                error = %e,
                "Failed to roll back partially provisioned user"
            ),
        }
    }
}

fn log_failure(username: &str, err: &ProvisioningError) {
    let code = err.provider_error().and_then(IdpError::code).unwrap_or("");
    tracing::warn!(
        username,
        stage = %err.stage(),
        code,
        error = %err,
        "User provisioning failed"
    );
}
