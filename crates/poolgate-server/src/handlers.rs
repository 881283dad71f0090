use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
};
use poolgate_auth::ProvisioningRequest;
use serde::Serialize;

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Serialize)]
struct HealthResponse<'a> {
    status: &'a str,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

impl MessageResponse {
    pub const fn success() -> Self {
        Self { message: "success" }
    }
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn readyz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ready" }))
}

// Placeholder: no OIDC authorization logic behind this route.
pub async fn authorize() -> Json<MessageResponse> {
    Json(MessageResponse::success())
}

// Placeholder: no token issuance behind this route.
pub async fn token() -> Json<MessageResponse> {
    Json(MessageResponse::success())
}

/// `POST /user`: create a user and complete the forced password change.
///
/// The body is read as raw bytes so that any content type is accepted and
/// every decode failure, including an oversized body, renders through
/// [`ApiError`].
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let body = body.inspect_err(|e| {
        tracing::debug!(error = %e, "Failed to read provisioning request body");
    })?;
    let request = ProvisioningRequest::from_slice(&body).inspect_err(|e| {
        tracing::debug!(error = %e, "Rejected provisioning request body");
    })?;

    state.provisioner.provision(&request).await?;

    Ok(Json(MessageResponse::success()))
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}

pub async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError::MethodNotAllowed(format!("Method {method} not allowed for {}", uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    #[test]
    fn test_stub_handlers_return_success() {
        assert_eq!(block_on(authorize()).0.message, "success");
        assert_eq!(block_on(token()).0.message, "success");
    }

    #[test]
    fn test_fallback_messages() {
        let uri: Uri = "/missing?x=1".parse().unwrap();
        let err = block_on(not_found(uri.clone()));
        assert_eq!(err.message(), "No route for /missing");

        let err = block_on(method_not_allowed(Method::DELETE, uri));
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(err.message(), "Method DELETE not allowed for /missing");
    }

    #[test]
    fn test_success_body_shape() {
        let body = serde_json::to_value(MessageResponse::success()).unwrap();
        assert_eq!(body, serde_json::json!({ "message": "success" }));
    }
}
