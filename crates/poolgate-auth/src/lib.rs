//! # poolgate-auth
//!
//! User provisioning against an AWS Cognito user pool.
//!
//! This crate provides:
//! - Client secret hash computation for Cognito app clients
//! - An [`IdentityProvider`] trait over the admin user pool API
//! - A SigV4-signing Cognito client implementing it, with credentials from
//!   the default AWS provider chain
//! - The provisioning pipeline that creates a user and completes the forced
//!   password change so the account is immediately usable
//!
//! ## Modules
//!
//! - [`secret_hash`] - `SECRET_HASH` derivation
//! - [`provider`] - Identity provider trait, Cognito client and request signing
//! - [`provisioning`] - Create-and-activate pipeline with rollback

pub mod provider;
pub mod provisioning;
pub mod secret_hash;

pub use provider::{
    AuthChallenge, AwsCredentials, CognitoClient, CognitoClientConfig, CreateUserInput,
    CredentialSource, IdentityProvider, IdpError, InitiateAuthInput, RespondToChallengeInput,
};
pub use provisioning::{
    Activation, PoolSettings, ProvisionedUser, ProvisioningConfig, ProvisioningError,
    ProvisioningRequest, ProvisioningStage, UserProvisioner,
};
pub use secret_hash::compute_secret_hash;

/// Type alias for provisioning results.
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;
