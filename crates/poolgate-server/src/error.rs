//! HTTP error type for the provisioning endpoint.

use axum::{
    Json,
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use poolgate_auth::{IdpError, ProvisioningError};
use serde_json::json;

/// Errors returned by the HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed body or input the provider rejected (400).
    #[error("{0}")]
    BadRequest(String),

    /// Username or alias already taken (409).
    #[error("{0}")]
    Conflict(String),

    /// Provider refused the credentials or secret hash (401).
    #[error("{0}")]
    Unauthorized(String),

    /// No route matches the path (404).
    #[error("{0}")]
    NotFound(String),

    /// The route exists but not for this method (405).
    #[error("{0}")]
    MethodNotAllowed(String),

    /// Body over `server.body_limit_bytes` (413).
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Provider throttled the call (429).
    #[error("{0}")]
    TooManyRequests(String),

    /// Provider failed, was unreachable or answered unexpectedly (502).
    #[error("{0}")]
    BadGateway(String),

    /// Generic internal error (500).
    #[error("{0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::Unauthorized(msg)
            | Self::NotFound(msg)
            | Self::MethodNotAllowed(msg)
            | Self::PayloadTooLarge(msg)
            | Self::TooManyRequests(msg)
            | Self::BadGateway(msg)
            | Self::InternalError(msg) => msg,
        }
    }
}

impl From<ProvisioningError> for ApiError {
    fn from(err: ProvisioningError) -> Self {
        let message = err.to_string();
        match &err {
            ProvisioningError::InvalidRequest(_) => Self::BadRequest(message),
            ProvisioningError::UnexpectedChallenge(_) | ProvisioningError::MissingSession => {
                Self::BadGateway(message)
            }
            ProvisioningError::CreateUser(e)
            | ProvisioningError::InitiateAuth(e)
            | ProvisioningError::RespondToChallenge(e) => from_provider(e, message),
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        let message = rejection.body_text();
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(message)
        } else {
            Self::BadRequest(message)
        }
    }
}

fn from_provider(err: &IdpError, message: String) -> ApiError {
    if err.is_conflict() {
        ApiError::Conflict(message)
    } else if err.is_not_authorized() {
        ApiError::Unauthorized(message)
    } else if err.is_throttled() {
        ApiError::TooManyRequests(message)
    } else if err.is_client_error() {
        ApiError::BadRequest(message)
    } else if matches!(err, IdpError::Encode(_) | IdpError::Credentials(_)) {
        ApiError::InternalError(message)
    } else {
        ApiError::BadGateway(message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({ "error-message": self.message() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(code: &str, status: u16) -> IdpError {
        IdpError::service(code, "provider says no", status)
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ProvisioningError::InvalidRequest("expected value".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ProvisioningError::CreateUser(service("UsernameExistsException", 400)),
                StatusCode::CONFLICT,
            ),
            (
                ProvisioningError::CreateUser(service("AliasExistsException", 400)),
                StatusCode::CONFLICT,
            ),
            (
                ProvisioningError::CreateUser(service("InvalidPasswordException", 400)),
                StatusCode::BAD_REQUEST,
            ),
            (
                ProvisioningError::InitiateAuth(service("NotAuthorizedException", 400)),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ProvisioningError::InitiateAuth(service("TooManyRequestsException", 400)),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ProvisioningError::RespondToChallenge(service("LimitExceededException", 400)),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ProvisioningError::RespondToChallenge(service("InternalErrorException", 500)),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ProvisioningError::CreateUser(IdpError::Network("timed out".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ProvisioningError::InitiateAuth(IdpError::InvalidResponse("eof".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ProvisioningError::CreateUser(IdpError::Encode("bad".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ProvisioningError::CreateUser(IdpError::Credentials("not loaded".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ProvisioningError::UnexpectedChallenge("SMS_MFA".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (ProvisioningError::MissingSession, StatusCode::BAD_GATEWAY),
        ];

        for (err, expected) in cases {
            let label = err.to_string();
            assert_eq!(ApiError::from(err).status(), expected, "{label}");
        }
    }

    #[tokio::test]
    async fn test_error_body_has_single_member() {
        let response = ApiError::Conflict("taken".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error-message": "taken" }));
    }

    #[test]
    fn test_routing_errors_have_own_status() {
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::MethodNotAllowed("x".into()).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ApiError::PayloadTooLarge("x".into()).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_message_keeps_stage_and_code() {
        let err: ApiError =
            ProvisioningError::CreateUser(service("UsernameExistsException", 400)).into();
        assert_eq!(
            err.message(),
            "Create user failed: UsernameExistsException: provider says no"
        );
    }
}
