//! Cognito user pool admin API client.
//!
//! Speaks the AWS JSON 1.1 protocol: every call is a `POST /` with the
//! operation named in the `X-Amz-Target` header and PascalCase JSON members
//! in the body. Requests are signed with SigV4 using credentials from the
//! configured [`CredentialSource`]; [`CredentialSource::Unsigned`] sends them
//! unsigned, which local emulators accept.
//!
//! # Example
//!
//! ```ignore
//! use poolgate_auth::provider::{CognitoClient, CognitoClientConfig, CredentialSource};
//!
//! let config = CognitoClientConfig::new("eu-west-1")
//!     .with_credentials(CredentialSource::default_chain("eu-west-1").await);
//! let client = CognitoClient::new(config)?;
//! ```
//!
//! # References
//!
//! - [Amazon Cognito user pools API reference](https://docs.aws.amazon.com/cognito-user-identity-pools/latest/APIReference/Welcome.html)

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use super::credentials::{CredentialResolver, CredentialSource};
use super::sigv4::{self, SigningRequest};
use super::{
    ADMIN_USER_PASSWORD_AUTH, AuthChallenge, CreateUserInput, IdentityProvider, IdpError,
    InitiateAuthInput, RespondToChallengeInput,
};

const SERVICE: &str = "cognito-idp";
const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";
const AMZ_JSON: &str = "application/x-amz-json-1.1";

/// Configuration for [`CognitoClient`].
#[derive(Debug, Clone)]
pub struct CognitoClientConfig {
    /// AWS region of the user pool, e.g. `eu-west-1`.
    pub region: String,

    /// Endpoint override. Defaults to `https://cognito-idp.{region}.amazonaws.com/`.
    pub endpoint: Option<Url>,

    /// Per-request timeout (default: 10 seconds).
    pub request_timeout: Duration,

    /// Where signing credentials come from (default: unsigned).
    pub credentials: CredentialSource,
}

impl CognitoClientConfig {
    /// Creates a configuration for `region` with default settings.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint: None,
            request_timeout: Duration::from_secs(10),
            credentials: CredentialSource::Unsigned,
        }
    }

    /// Sets an endpoint override.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the signing credential source.
    #[must_use]
    pub fn with_credentials(mut self, credentials: CredentialSource) -> Self {
        self.credentials = credentials;
        self
    }

    /// Returns the endpoint calls are sent to.
    pub fn resolved_endpoint(&self) -> Result<Url, url::ParseError> {
        match &self.endpoint {
            Some(endpoint) => Ok(endpoint.clone()),
            None => Url::parse(&format!("https://{SERVICE}.{}.amazonaws.com/", self.region)),
        }
    }
}

/// [`IdentityProvider`] backed by the Cognito admin API.
pub struct CognitoClient {
    http_client: reqwest::Client,
    endpoint: Url,
    host: String,
    region: String,
    credentials: CredentialResolver,
}

impl CognitoClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be built or the HTTP client
    /// cannot be created.
    pub fn new(config: CognitoClientConfig) -> Result<Self, IdpError> {
        let endpoint = config
            .resolved_endpoint()
            .map_err(|e| IdpError::Encode(format!("invalid endpoint: {e}")))?;
        let host = host_header(&endpoint)
            .ok_or_else(|| IdpError::Encode(format!("endpoint has no host: {endpoint}")))?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http_client,
            endpoint,
            host,
            region: config.region,
            credentials: CredentialResolver::new(config.credentials),
        })
    }

    /// Returns the endpoint this client sends calls to.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns where signing credentials come from.
    #[must_use]
    pub fn credential_source(&self) -> &CredentialSource {
        self.credentials.source()
    }

    async fn call<B: Serialize>(&self, operation: &str, body: &B) -> Result<Vec<u8>, IdpError> {
        let payload = serde_json::to_vec(body).map_err(|e| IdpError::Encode(e.to_string()))?;
        let target = format!("{TARGET_PREFIX}.{operation}");

        let mut request = self
            .http_client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, AMZ_JSON)
            .header("x-amz-target", &target);

        if let Some(credentials) = self.credentials.resolve().await? {
            let signed = sigv4::sign(
                &SigningRequest {
                    method: "POST",
                    host: &self.host,
                    path: self.endpoint.path(),
                    headers: &[("content-type", AMZ_JSON), ("x-amz-target", target.as_str())],
                    payload: &payload,
                },
                &credentials,
                &self.region,
                SERVICE,
                OffsetDateTime::now_utc(),
            );
            request = request
                .header("x-amz-date", signed.amz_date)
                .header(AUTHORIZATION, signed.authorization);
            if let Some(token) = signed.security_token {
                request = request.header("x-amz-security-token", token);
            }
        }

        let response = request.body(payload).send().await.map_err(|e| {
            tracing::warn!(operation, error = %e, "Cognito request failed");
            IdpError::Network(e.to_string())
        })?;

        let status = response.status();
        let error_type = response
            .headers()
            .get("x-amzn-errortype")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?;

        if !status.is_success() {
            let err = parse_error(status.as_u16(), error_type.as_deref(), &body);
            tracing::debug!(operation, status = status.as_u16(), error = %err, "Cognito returned an error");
            return Err(err);
        }

        Ok(body.to_vec())
    }
}

#[async_trait]
impl IdentityProvider for CognitoClient {
    async fn admin_create_user(&self, input: &CreateUserInput) -> Result<(), IdpError> {
        let body = AdminCreateUserRequest {
            user_pool_id: &input.user_pool_id,
            username: &input.username,
            temporary_password: &input.temporary_password,
            message_action: input.suppress_invitation.then_some("SUPPRESS"),
        };
        self.call("AdminCreateUser", &body).await?;
        Ok(())
    }

    async fn admin_initiate_auth(
        &self,
        input: &InitiateAuthInput,
    ) -> Result<AuthChallenge, IdpError> {
        let mut auth_parameters = BTreeMap::new();
        auth_parameters.insert("USERNAME", input.username.as_str());
        auth_parameters.insert("PASSWORD", input.password.as_str());
        if let Some(hash) = &input.secret_hash {
            auth_parameters.insert("SECRET_HASH", hash.as_str());
        }

        let body = AdminInitiateAuthRequest {
            user_pool_id: &input.user_pool_id,
            client_id: &input.client_id,
            auth_flow: ADMIN_USER_PASSWORD_AUTH,
            auth_parameters,
        };
        let raw = self.call("AdminInitiateAuth", &body).await?;

        let response: AdminInitiateAuthResponse = serde_json::from_slice(&raw)
            .map_err(|e| IdpError::InvalidResponse(e.to_string()))?;

        Ok(AuthChallenge {
            challenge_name: response.challenge_name,
            session: response.session,
            authenticated: response.authentication_result.is_some(),
        })
    }

    async fn admin_respond_to_auth_challenge(
        &self,
        input: &RespondToChallengeInput,
    ) -> Result<(), IdpError> {
        let mut challenge_responses = BTreeMap::new();
        challenge_responses.insert("USERNAME", input.username.as_str());
        challenge_responses.insert("NEW_PASSWORD", input.new_password.as_str());
        if let Some(hash) = &input.secret_hash {
            challenge_responses.insert("SECRET_HASH", hash.as_str());
        }

        let body = AdminRespondToAuthChallengeRequest {
            user_pool_id: &input.user_pool_id,
            client_id: &input.client_id,
            challenge_name: &input.challenge_name,
            challenge_responses,
            session: &input.session,
        };
        let raw = self.call("AdminRespondToAuthChallenge", &body).await?;

        // The password is set once this call succeeds; a follow-up challenge
        // (MFA setup, for example) does not undo activation.
        if let Ok(response) = serde_json::from_slice::<AdminInitiateAuthResponse>(&raw)
            && let Some(next) = response.challenge_name
        {
            tracing::debug!(challenge = %next, "Cognito issued a follow-up challenge");
        }

        Ok(())
    }

    async fn admin_delete_user(&self, user_pool_id: &str, username: &str) -> Result<(), IdpError> {
        let body = AdminDeleteUserRequest {
            user_pool_id,
            username,
        };
        self.call("AdminDeleteUser", &body).await?;
        Ok(())
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AdminCreateUserRequest<'a> {
    user_pool_id: &'a str,
    username: &'a str,
    temporary_password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_action: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AdminInitiateAuthRequest<'a> {
    user_pool_id: &'a str,
    client_id: &'a str,
    auth_flow: &'a str,
    auth_parameters: BTreeMap<&'a str, &'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AdminRespondToAuthChallengeRequest<'a> {
    user_pool_id: &'a str,
    client_id: &'a str,
    challenge_name: &'a str,
    challenge_responses: BTreeMap<&'a str, &'a str>,
    session: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AdminDeleteUserRequest<'a> {
    user_pool_id: &'a str,
    username: &'a str,
}

/// Shared shape of the initiate and respond responses.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AdminInitiateAuthResponse {
    #[serde(default)]
    challenge_name: Option<String>,
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    authentication_result: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// Builds an [`IdpError::Service`] from a non-2xx Cognito response.
///
/// The code comes from the body's `__type` or, failing that, the
/// `x-amzn-ErrorType` header. Namespace prefixes (`ns#Code`) and header
/// suffixes (`Code:uri`) are stripped.
fn parse_error(status: u16, error_type_header: Option<&str>, body: &[u8]) -> IdpError {
    let parsed: Option<ErrorBody> = serde_json::from_slice(body).ok();

    let raw_code = parsed
        .as_ref()
        .and_then(|b| b.error_type.clone())
        .or_else(|| error_type_header.map(str::to_owned));

    let code = raw_code
        .as_deref()
        .map(normalize_error_code)
        .filter(|c| !c.is_empty())
        .unwrap_or("UnknownError")
        .to_string();

    let message = parsed
        .and_then(|b| b.message)
        .unwrap_or_else(|| format!("HTTP status {status}"));

    IdpError::service(code, message, status)
}

fn normalize_error_code(raw: &str) -> &str {
    let code = raw.rsplit('#').next().unwrap_or(raw);
    code.split(':').next().unwrap_or(code).trim()
}

/// `host[:port]` as reqwest will send it; default ports are omitted.
fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        let config = CognitoClientConfig::new("eu-west-1");
        assert_eq!(
            config.resolved_endpoint().unwrap().as_str(),
            "https://cognito-idp.eu-west-1.amazonaws.com/"
        );
    }

    #[test]
    fn test_endpoint_override() {
        let endpoint = Url::parse("http://localhost:9229/").unwrap();
        let config = CognitoClientConfig::new("eu-west-1").with_endpoint(endpoint.clone());
        assert_eq!(config.resolved_endpoint().unwrap(), endpoint);
    }

    #[test]
    fn test_host_header() {
        let url = Url::parse("https://cognito-idp.eu-west-1.amazonaws.com/").unwrap();
        assert_eq!(
            host_header(&url).as_deref(),
            Some("cognito-idp.eu-west-1.amazonaws.com")
        );

        let url = Url::parse("http://127.0.0.1:9229/").unwrap();
        assert_eq!(host_header(&url).as_deref(), Some("127.0.0.1:9229"));

        let url = Url::parse("https://example.com:443/").unwrap();
        assert_eq!(host_header(&url).as_deref(), Some("example.com"));
    }

    #[test]
    fn test_parse_error_from_body() {
        let body = br#"{"__type":"UsernameExistsException","message":"User account already exists"}"#;
        let err = parse_error(400, None, body);

        assert_eq!(err.code(), Some("UsernameExistsException"));
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "UsernameExistsException: User account already exists"
        );
    }

    #[test]
    fn test_parse_error_strips_namespace() {
        let body = br#"{"__type":"com.amazonaws.cognito#InvalidPasswordException","Message":"Password too short"}"#;
        let err = parse_error(400, None, body);

        assert_eq!(err.code(), Some("InvalidPasswordException"));
        assert!(err.to_string().contains("Password too short"));
    }

    #[test]
    fn test_parse_error_falls_back_to_header() {
        let err = parse_error(
            400,
            Some("NotAuthorizedException:http://internal.amazon.com/coral/"),
            b"not json",
        );
        assert_eq!(err.code(), Some("NotAuthorizedException"));
        assert!(err.to_string().contains("HTTP status 400"));
    }

    #[test]
    fn test_parse_error_unknown() {
        let err = parse_error(503, None, b"");
        assert_eq!(err.code(), Some("UnknownError"));
        assert!(err.is_external_error());
    }

    #[test]
    fn test_create_user_request_shape() {
        let body = AdminCreateUserRequest {
            user_pool_id: "pool",
            username: "alice",
            temporary_password: "Passw0rd!",
            message_action: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "UserPoolId": "pool",
                "Username": "alice",
                "TemporaryPassword": "Passw0rd!"
            })
        );

        let body = AdminCreateUserRequest {
            message_action: Some("SUPPRESS"),
            ..body
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["MessageAction"], "SUPPRESS");
    }
}
