use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

/// Opaque author token read from the `X-Author-Token` header, if present.
/// Presence alone proves nothing — callers still verify it against the
/// room's stored token via `services::identity_service::is_author_token`.
#[derive(Debug, Clone, Default)]
pub struct AuthorToken(pub Option<String>);

impl<S> FromRequestParts<S> for AuthorToken
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(AuthorToken(
            parts
                .headers
                .get("x-author-token")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        ))
    }
}

/// Guest device identifier read from the `X-Device-Id` header, if present.
#[derive(Debug, Clone, Default)]
pub struct GuestDevice(pub Option<String>);

impl<S> FromRequestParts<S> for GuestDevice
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(GuestDevice(
            parts
                .headers
                .get("x-device-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        ))
    }
}

/// Result of resolving a request's principal against a specific room
/// (spec §4.A `Authorize`). The author path wins over the guest path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorized {
    Unauthorized,
    Author,
    Guest,
}

impl Authorized {
    pub fn is_authorized(self) -> bool {
        !matches!(self, Authorized::Unauthorized)
    }

    pub fn is_author(self) -> bool {
        matches!(self, Authorized::Author)
    }
}
