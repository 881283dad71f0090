//! Client secret hash for Cognito app clients.
//!
//! When an app client is configured with a client secret, Cognito requires a
//! `SECRET_HASH` parameter on every auth call made on behalf of a user. The
//! value binds the request to the username and the app client:
//!
//! ```text
//! SECRET_HASH = Base64( HMAC_SHA256( key = client_secret, message = username || client_id ) )
//! ```
//!
//! # Example
//!
//! ```
//! use poolgate_auth::secret_hash::compute_secret_hash;
//!
//! let hash = compute_secret_hash("alice", "client-id", "client-secret");
//! assert_eq!(hash.len(), 44);
//! assert_eq!(hash, compute_secret_hash("alice", "client-id", "client-secret"));
//! ```
//!
//! # References
//!
//! - [Computing secret hash values](https://docs.aws.amazon.com/cognito/latest/developerguide/signing-up-users-in-your-app.html#cognito-user-pools-computing-secret-hash)

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the Cognito secret hash for a username and app client.
///
/// The message is the username immediately followed by the client id, with
/// no delimiter. The output uses the standard base64 alphabet with padding,
/// which is what Cognito compares against.
#[must_use]
pub fn compute_secret_hash(username: &str, client_id: &str, client_secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(client_secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(username.as_bytes());
    mac.update(client_id.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Computes the secret hash only when the app client has a secret.
///
/// Cognito rejects `SECRET_HASH` for app clients without a secret, so an
/// empty `client_secret` yields `None` and the parameter is left out.
#[must_use]
pub fn secret_hash_for_client(
    username: &str,
    client_id: &str,
    client_secret: &str,
) -> Option<String> {
    if client_secret.is_empty() {
        None
    } else {
        Some(compute_secret_hash(username, client_id, client_secret))
    }
}
