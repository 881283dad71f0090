//! AWS Signature Version 4 request signing.
//!
//! Only what the Cognito JSON API needs is covered: a single-segment path,
//! no query string, and a fully buffered payload.
//!
//! # References
//!
//! - [Create a signed AWS API request](https://docs.aws.amazon.com/IAM/latest/UserGuide/create-signed-request.html)

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use time::{OffsetDateTime, UtcOffset};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Static AWS credentials used to sign requests.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Present for temporary (STS) credentials.
    pub session_token: Option<String>,
}

impl AwsCredentials {
    /// Creates long-term credentials.
    #[must_use]
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attaches a session token.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[redacted]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// The request parts covered by the signature.
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    /// `host[:port]` exactly as sent in the `Host` header.
    pub host: &'a str,
    pub path: &'a str,
    /// Additional headers to sign, excluding `host`, `x-amz-date` and
    /// `x-amz-security-token`, which are added here.
    pub headers: &'a [(&'a str, &'a str)],
    pub payload: &'a [u8],
}

/// Headers to attach to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaders {
    /// Value for `x-amz-date`.
    pub amz_date: String,
    /// Value for `authorization`.
    pub authorization: String,
    /// Value for `x-amz-security-token`, when signing with temporary credentials.
    pub security_token: Option<String>,
}

/// Signs a request for `service` in `region` at time `now`.
#[must_use]
pub fn sign(
    request: &SigningRequest<'_>,
    credentials: &AwsCredentials,
    region: &str,
    service: &str,
    now: OffsetDateTime,
) -> SignatureHeaders {
    let now = now.to_offset(UtcOffset::UTC);
    let amz_date = format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    );
    let date = &amz_date[..8];

    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    headers.push(("host".to_string(), request.host.to_string()));
    headers.push(("x-amz-date".to_string(), amz_date.clone()));
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort();

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        request.method,
        request.path,
        canonical_headers,
        signed_headers,
        hex::encode(Sha256::digest(request.payload))
    );

    let scope = format!("{date}/{region}/{service}/aws4_request");
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let signing_key = derive_signing_key(&credentials.secret_access_key, date, region, service);
    let signature = hex::encode(hmac(&signing_key, string_to_sign.as_bytes()));

    SignatureHeaders {
        authorization: format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        ),
        amz_date,
        security_token: credentials.session_token.clone(),
    }
}

/// Derives the per-day, per-region, per-service signing key.
#[must_use]
pub fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const EXAMPLE_SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    #[test]
    fn test_derive_signing_key_documented_vector() {
        let key = derive_signing_key(EXAMPLE_SECRET, "20120215", "us-east-1", "iam");
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_sign_get_vanilla() {
        let credentials = AwsCredentials::new("AKIDEXAMPLE", EXAMPLE_SECRET);
        let request = SigningRequest {
            method: "GET",
            host: "example.amazonaws.com",
            path: "/",
            headers: &[],
            payload: b"",
        };

        let signed = sign(
            &request,
            &credentials,
            "us-east-1",
            "service",
            datetime!(2015-08-30 12:36:00 UTC),
        );

        assert_eq!(signed.amz_date, "20150830T123600Z");
        assert_eq!(
            signed.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
        assert_eq!(signed.security_token, None);
    }

    #[test]
    fn test_sign_includes_extra_headers_and_session_token() {
        let credentials =
            AwsCredentials::new("AKIDEXAMPLE", EXAMPLE_SECRET).with_session_token("token-123");
        let request = SigningRequest {
            method: "POST",
            host: "cognito-idp.eu-west-1.amazonaws.com",
            path: "/",
            headers: &[
                ("X-Amz-Target", "AWSCognitoIdentityProviderService.AdminCreateUser"),
                ("Content-Type", "application/x-amz-json-1.1"),
            ],
            payload: br#"{"UserPoolId":"pool"}"#,
        };

        let signed = sign(
            &request,
            &credentials,
            "eu-west-1",
            "cognito-idp",
            datetime!(2024-01-02 03:04:05 UTC),
        );

        assert_eq!(signed.amz_date, "20240102T030405Z");
        assert!(signed.authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240102/eu-west-1/cognito-idp/aws4_request, "
        ));
        assert!(signed.authorization.contains(
            "SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target, "
        ));
        assert_eq!(signed.security_token.as_deref(), Some("token-123"));
    }

    #[test]
    fn test_sign_normalizes_time_to_utc() {
        let credentials = AwsCredentials::new("AKIDEXAMPLE", EXAMPLE_SECRET);
        let request = SigningRequest {
            method: "GET",
            host: "example.amazonaws.com",
            path: "/",
            headers: &[],
            payload: b"",
        };

        let utc = sign(
            &request,
            &credentials,
            "us-east-1",
            "service",
            datetime!(2015-08-30 12:36:00 UTC),
        );
        let shifted = sign(
            &request,
            &credentials,
            "us-east-1",
            "service",
            datetime!(2015-08-30 14:36:00 +2),
        );
        assert_eq!(utc, shifted);
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let credentials =
            AwsCredentials::new("AKIDEXAMPLE", EXAMPLE_SECRET).with_session_token("token-123");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("AKIDEXAMPLE"));
        assert!(!debug.contains(EXAMPLE_SECRET));
        assert!(!debug.contains("token-123"));
    }
}
