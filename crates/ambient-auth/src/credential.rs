//! Caller credential extraction.
//!
//! The API server never acts as itself on behalf of a caller: every request
//! carries a bearer credential that becomes a caller-scoped store.

use std::fmt;

use axum::http::HeaderMap;
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;

use crate::errors::AuthError;

/// Header set by an authenticating proxy in front of the API.
pub const FORWARDED_ACCESS_TOKEN: &str = "x-forwarded-access-token";
/// Forwarded user name.
pub const FORWARDED_USER: &str = "x-forwarded-user";
/// Forwarded groups, comma separated.
pub const FORWARDED_GROUPS: &str = "x-forwarded-groups";

/// The caller's credential plus forwarded identity context.
#[derive(Clone, PartialEq, Eq)]
pub struct CallerCredential {
    /// Bearer token forwarded to the cluster and the content service.
    pub token: String,
    /// `X-Forwarded-User`, recorded as identity context.
    pub forwarded_user: Option<String>,
    /// `X-Forwarded-Groups`, recorded as identity context.
    pub forwarded_groups: Vec<String>,
}

impl fmt::Debug for CallerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerCredential")
            .field("token", &"<redacted>")
            .field("forwarded_user", &self.forwarded_user)
            .field("forwarded_groups", &self.forwarded_groups)
            .finish()
    }
}

impl CallerCredential {
    /// Read `Authorization: Bearer`, falling back to `X-Forwarded-Access-Token`.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AuthError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let token = header(axum::http::header::AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or_else(|| header(FORWARDED_ACCESS_TOKEN))
            .ok_or(AuthError::Unauthenticated)?;
        let forwarded_groups = header(FORWARDED_GROUPS)
            .map(|groups| {
                groups
                    .split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            token: token.to_string(),
            forwarded_user: header(FORWARDED_USER).map(String::from),
            forwarded_groups,
        })
    }

    /// Service account `(namespace, name)` named by the token's subject.
    pub fn service_account(&self) -> Option<(String, String)> {
        service_account_subject(&self.token)
    }
}

#[derive(Deserialize)]
struct SubjectClaims {
    sub: String,
}

/// Subject of a service-account JWT, without verifying it.
///
/// Only used to attribute activity (access-key last-used); the cluster
/// verifies the token on every real call.
pub fn service_account_subject(token: &str) -> Option<(String, String)> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    let data = jsonwebtoken::decode::<SubjectClaims>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    let rest = data.claims.sub.strip_prefix("system:serviceaccount:")?;
    let (namespace, name) = rest.split_once(':')?;
    Some((namespace.to_string(), name.to_string()))
}
