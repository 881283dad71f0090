//! Identity provider abstraction.
//!
//! The provisioning pipeline talks to the user pool through the
//! [`IdentityProvider`] trait. [`CognitoClient`] is the production
//! implementation; tests plug in recording doubles.

pub mod cognito;
pub mod credentials;
pub mod error;
pub mod sigv4;

use std::fmt;

use async_trait::async_trait;

pub use cognito::{CognitoClient, CognitoClientConfig};
pub use credentials::CredentialSource;
pub use error::IdpError;
pub use sigv4::AwsCredentials;

/// Auth flow used to authenticate on the user's behalf from a trusted backend.
pub const ADMIN_USER_PASSWORD_AUTH: &str = "ADMIN_USER_PASSWORD_AUTH";

/// Challenge issued for users created with a temporary password.
pub const NEW_PASSWORD_REQUIRED: &str = "NEW_PASSWORD_REQUIRED";

/// Input for creating a user with a temporary password.
#[derive(Clone, PartialEq, Eq)]
pub struct CreateUserInput {
    pub user_pool_id: String,
    pub username: String,
    pub temporary_password: String,
    /// Suppress the invitation message Cognito would otherwise send.
    pub suppress_invitation: bool,
}

/// Input for starting the admin username/password auth flow.
#[derive(Clone, PartialEq, Eq)]
pub struct InitiateAuthInput {
    pub user_pool_id: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
    /// `SECRET_HASH` auth parameter; omitted for clients without a secret.
    pub secret_hash: Option<String>,
}

/// Input for answering an auth challenge.
#[derive(Clone, PartialEq, Eq)]
pub struct RespondToChallengeInput {
    pub user_pool_id: String,
    pub client_id: String,
    pub challenge_name: String,
    pub username: String,
    pub new_password: String,
    pub secret_hash: Option<String>,
    /// Session returned by the initiate call that issued the challenge.
    pub session: String,
}

/// Outcome of an initiate-auth call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Name of the challenge the user must satisfy, if any.
    pub challenge_name: Option<String>,
    /// Opaque session to pass back with the challenge response.
    pub session: Option<String>,
    /// `true` when the provider completed authentication without a challenge.
    pub authenticated: bool,
}

impl AuthChallenge {
    /// Returns `true` if this is the forced password-change challenge.
    #[must_use]
    pub fn is_new_password_required(&self) -> bool {
        self.challenge_name.as_deref() == Some(NEW_PASSWORD_REQUIRED)
    }
}

/// Admin operations on a user pool.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates a user in `FORCE_CHANGE_PASSWORD` status.
    async fn admin_create_user(&self, input: &CreateUserInput) -> Result<(), IdpError>;

    /// Starts the `ADMIN_USER_PASSWORD_AUTH` flow.
    async fn admin_initiate_auth(&self, input: &InitiateAuthInput)
    -> Result<AuthChallenge, IdpError>;

    /// Answers a challenge issued by [`admin_initiate_auth`](Self::admin_initiate_auth).
    async fn admin_respond_to_auth_challenge(
        &self,
        input: &RespondToChallengeInput,
    ) -> Result<(), IdpError>;

    /// Deletes a user. Used to roll back a half-provisioned account.
    async fn admin_delete_user(&self, user_pool_id: &str, username: &str) -> Result<(), IdpError>;
}

const REDACTED: &str = "[redacted]";

impl fmt::Debug for CreateUserInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUserInput")
            .field("user_pool_id", &self.user_pool_id)
            .field("username", &self.username)
            .field("temporary_password", &REDACTED)
            .field("suppress_invitation", &self.suppress_invitation)
            .finish()
    }
}

impl fmt::Debug for InitiateAuthInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitiateAuthInput")
            .field("user_pool_id", &self.user_pool_id)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &REDACTED)
            .field("secret_hash", &self.secret_hash.as_ref().map(|_| REDACTED))
            .finish()
    }
}

impl fmt::Debug for RespondToChallengeInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RespondToChallengeInput")
            .field("user_pool_id", &self.user_pool_id)
            .field("client_id", &self.client_id)
            .field("challenge_name", &self.challenge_name)
            .field("username", &self.username)
            .field("new_password", &REDACTED)
            .field("secret_hash", &self.secret_hash.as_ref().map(|_| REDACTED))
            .field("session", &REDACTED)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_password_required() {
        let challenge = AuthChallenge {
            challenge_name: Some(NEW_PASSWORD_REQUIRED.to_string()),
            session: Some("session".to_string()),
            authenticated: false,
        };
        assert!(challenge.is_new_password_required());

        let challenge = AuthChallenge {
            challenge_name: Some("SMS_MFA".to_string()),
            ..Default::default()
        };
        assert!(!challenge.is_new_password_required());
        assert!(!AuthChallenge::default().is_new_password_required());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let input = RespondToChallengeInput {
            user_pool_id: "pool".to_string(),
            client_id: "client".to_string(),
            challenge_name: NEW_PASSWORD_REQUIRED.to_string(),
            username: "alice".to_string(),
            new_password: "Sup3rSecret!".to_string(),
            secret_hash: Some("hash-value".to_string()),
            session: "session-token".to_string(),
        };

        let debug = format!("{input:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("Sup3rSecret!"));
        assert!(!debug.contains("hash-value"));
        assert!(!debug.contains("session-token"));
    }
}
