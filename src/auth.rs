use crate::schemas::UserId;
use actix_web::{http::header::HeaderValue, HttpRequest};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{env, num::ParseIntError};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, PartialEq)]
pub enum AuthorizationLevel {
    /// The backing service itself, authenticated with the shared API token.
    Service,
    /// An end user holding a signed session token.
    User(UserId),
}

/// A session token issued by `POST /sessions`. The signature is an
/// HMAC-SHA256 over `user_id` and `issued_at`, keyed with the SHA-256 of
/// the service API token, and hex-encoded.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SessionToken {
    pub user_id: UserId,
    pub issued_at: i64,
    pub signature: String,
}

/// Resolves the request's `Authorization` header to an authorization level.
///
/// The header carries either the raw service token or a JSON session token.
/// Returns `None` when the header is missing, unparsable, or carries a bad
/// signature.
pub fn check_authorization_level(request: &HttpRequest) -> Option<AuthorizationLevel> {
    let authorization = request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?;
    let api_token = env::var("API_TOKEN").ok()?;
    if authorization == api_token {
        return Some(AuthorizationLevel::Service);
    }
    let token: SessionToken = serde_json::from_str(authorization).ok()?;
    verify_session_token(&token, &api_token)
}

/// Checks a session token's signature against the service token.
pub fn verify_session_token(token: &SessionToken, api_token: &str) -> Option<AuthorizationLevel> {
    let provided = token
        .signature
        .chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|pair| u8::from_str_radix(&String::from_iter(pair), 16))
        .collect::<Result<Vec<u8>, ParseIntError>>()
        .ok()?;
    let computed = sign_session(&token.user_id, token.issued_at, api_token);
    if computed == provided {
        Some(AuthorizationLevel::User(token.user_id.clone()))
    } else {
        None
    }
}

/// Signs a new session token for `user_id`.
pub fn issue_session_token(user_id: &UserId, issued_at: i64, api_token: &str) -> SessionToken {
    let signature = sign_session(user_id, issued_at, api_token)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();
    SessionToken {
        user_id: user_id.clone(),
        issued_at,
        signature,
    }
}

fn sign_session(user_id: &str, issued_at: i64, api_token: &str) -> Vec<u8> {
    let mut sha256_hasher = Sha256::new();
    sha256_hasher.update(api_token.as_bytes());
    let key = sha256_hasher.finalize();

    let mut hmac_hasher = HmacSha256::new_from_slice(&key).unwrap();
    hmac_hasher.update(format!("{user_id}\n{issued_at}").as_bytes());
    hmac_hasher.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_verify() {
        let user = "user1".to_string();
        let token = issue_session_token(&user, 1_727_800_000, "secret-token");
        assert_eq!(
            verify_session_token(&token, "secret-token"),
            Some(AuthorizationLevel::User(user))
        );
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let user = "user1".to_string();
        let mut token = issue_session_token(&user, 1_727_800_000, "secret-token");
        token.user_id = "user2".to_string();
        assert_eq!(verify_session_token(&token, "secret-token"), None);
    }

    #[test]
    fn tokens_signed_with_another_key_are_rejected() {
        let user = "user1".to_string();
        let token = issue_session_token(&user, 1_727_800_000, "secret-token");
        assert_eq!(verify_session_token(&token, "other-token"), None);
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        let token = SessionToken {
            user_id: "user1".to_string(),
            issued_at: 1_727_800_000,
            signature: "not-hex".to_string(),
        };
        assert_eq!(verify_session_token(&token, "secret-token"), None);
    }
}
