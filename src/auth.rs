//! Two-tier token authentication.
//!
//! Remote clients present `Authorization: Bearer <client token>`. The desktop
//! host presents its own token in [`HOST_TOKEN_HEADER`]. A successful check
//! produces an [`Actor`] that only ever carries a SHA-256 hash of the token,
//! so nothing downstream (audit log, approval list) can leak the secret.

use axum::http::{HeaderMap, header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::ApiError;

pub const HOST_TOKEN_HEADER: &str = "x-openwork-host-token";
pub const CLIENT_ID_HEADER: &str = "x-openwork-client-id";

/// Which credential a route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTier {
    None,
    Client,
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Host,
    Remote,
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub kind: ActorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub token_hash: String,
}

impl Actor {
    /// Actor used for requests on the unauthenticated tier.
    pub fn anonymous() -> Self {
        Self {
            kind: ActorKind::Remote,
            client_id: None,
            token_hash: String::new(),
        }
    }
}

/// One-way hash of a credential, hex encoded.
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

fn tokens_match(provided: &str, expected: &SecretString) -> bool {
    bool::from(
        provided
            .as_bytes()
            .ct_eq(expected.expose_secret().as_bytes()),
    )
}

/// Holds the shared client and host tokens and checks request headers
/// against them.
pub struct Authenticator {
    client_token: SecretString,
    host_token: SecretString,
}

impl Authenticator {
    pub fn new(client_token: SecretString, host_token: SecretString) -> Self {
        Self {
            client_token,
            host_token,
        }
    }

    pub fn authenticate(&self, tier: AuthTier, headers: &HeaderMap) -> Result<Actor, ApiError> {
        match tier {
            AuthTier::None => Ok(Actor::anonymous()),
            AuthTier::Client => self.verify_client(headers),
            AuthTier::Host => self.verify_host(headers),
        }
    }

    fn verify_client(&self, headers: &HeaderMap) -> Result<Actor, ApiError> {
        let raw = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        let token = raw
            .strip_prefix("Bearer ")
            .or_else(|| raw.strip_prefix("bearer "))
            .ok_or(ApiError::Unauthorized)?
            .trim();
        if token.is_empty() {
            return Err(ApiError::TokenRequired(
                "Bearer token is empty".to_string(),
            ));
        }
        if !tokens_match(token, &self.client_token) {
            return Err(ApiError::Unauthorized);
        }

        // A client-tier call that also carries a valid host token came from
        // the desktop host itself.
        let kind = match host_header(headers) {
            Some(host) if tokens_match(host, &self.host_token) => ActorKind::Host,
            _ => ActorKind::Remote,
        };

        Ok(Actor {
            kind,
            client_id: client_id(headers),
            token_hash: hash_token(token),
        })
    }

    fn verify_host(&self, headers: &HeaderMap) -> Result<Actor, ApiError> {
        let token = host_header(headers).ok_or(ApiError::Unauthorized)?;
        if token.is_empty() {
            return Err(ApiError::TokenRequired("Host token is empty".to_string()));
        }
        if !tokens_match(token, &self.host_token) {
            return Err(ApiError::Unauthorized);
        }
        Ok(Actor {
            kind: ActorKind::Host,
            client_id: client_id(headers),
            token_hash: hash_token(token),
        })
    }
}

fn host_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(HOST_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

fn client_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.chars().take(128).collect())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn authenticator() -> Authenticator {
        Authenticator::new(
            SecretString::from("client-secret"),
            SecretString::from("host-secret"),
        )
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn client_tier_accepts_matching_bearer() {
        let actor = authenticator()
            .authenticate(
                AuthTier::Client,
                &headers(&[
                    ("authorization", "Bearer client-secret"),
                    ("x-openwork-client-id", "phone"),
                ]),
            )
            .unwrap();
        assert_eq!(actor.kind, ActorKind::Remote);
        assert_eq!(actor.client_id.as_deref(), Some("phone"));
        assert_eq!(actor.token_hash, hash_token("client-secret"));
        assert!(!actor.token_hash.contains("client-secret"));
    }

    #[test]
    fn client_tier_rejects_wrong_or_missing_token() {
        let auth = authenticator();
        let err = auth
            .authenticate(
                AuthTier::Client,
                &headers(&[("authorization", "Bearer nope")]),
            )
            .unwrap_err();
        assert_eq!(err.code().as_str(), "unauthorized");

        let err = auth
            .authenticate(AuthTier::Client, &HeaderMap::new())
            .unwrap_err();
        assert_eq!(err.code().as_str(), "unauthorized");

        // The host token is not a client token.
        let err = auth
            .authenticate(
                AuthTier::Client,
                &headers(&[("authorization", "Bearer host-secret")]),
            )
            .unwrap_err();
        assert_eq!(err.code().as_str(), "unauthorized");
    }

    #[test]
    fn empty_bearer_is_token_required() {
        let err = authenticator()
            .authenticate(AuthTier::Client, &headers(&[("authorization", "Bearer  ")]))
            .unwrap_err();
        assert_eq!(err.code().as_str(), "token_required");
    }

    #[test]
    fn host_tier_requires_host_header() {
        let auth = authenticator();
        let err = auth
            .authenticate(
                AuthTier::Host,
                &headers(&[("authorization", "Bearer client-secret")]),
            )
            .unwrap_err();
        assert_eq!(err.code().as_str(), "unauthorized");

        let actor = auth
            .authenticate(
                AuthTier::Host,
                &headers(&[("x-openwork-host-token", "host-secret")]),
            )
            .unwrap();
        assert_eq!(actor.kind, ActorKind::Host);
    }

    #[test]
    fn client_call_from_host_is_marked_host() {
        let actor = authenticator()
            .authenticate(
                AuthTier::Client,
                &headers(&[
                    ("authorization", "Bearer client-secret"),
                    ("x-openwork-host-token", "host-secret"),
                ]),
            )
            .unwrap();
        assert_eq!(actor.kind, ActorKind::Host);
    }
}
