//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::MemberEmail;

use crate::error::ApiError;

/// Header carrying the caller's identity, set by the gateway.
pub const USER_EMAIL_HEADER: &str = "X-User-Email";

/// Caller identity taken from the `X-User-Email` header.
///
/// Rejects the request with 400 when the header is absent, blank or not
/// valid UTF-8.
#[derive(Debug, Clone)]
pub struct RequesterEmail(pub MemberEmail);

impl<S: Send + Sync> FromRequestParts<S> for RequesterEmail {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let email = parts
            .headers
            .get(USER_EMAIL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(MemberEmail::new)
            .filter(|email| !email.is_blank())
            .ok_or(ApiError::MissingHeader(USER_EMAIL_HEADER))?;
        Ok(RequesterEmail(email))
    }
}
