use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::PgPool;
use std::net::IpAddr;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::{
    config::MailerConfig,
    error::ApiError,
    middleware::RouteLimiters,
    services::Mailer,
    utils::validation::is_valid_email,
};

static SHARE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{32,128}$").expect("static regex"));

/// Invite Flow (spec §4.J). Gate order: email shape, UUID shape, four
/// independent rate-limit bins, room existence, then share-link
/// reconstruction and the outbound send.
pub struct InviteService {
    db: PgPool,
    mailer: Arc<dyn Mailer>,
    limiters: Arc<RouteLimiters>,
    frontend_origin: String,
    allow_localhost_origins: bool,
}

impl InviteService {
    pub fn new(
        db: PgPool,
        mailer: Arc<dyn Mailer>,
        limiters: Arc<RouteLimiters>,
        mailer_config: &MailerConfig,
    ) -> Self {
        Self {
            db,
            mailer,
            limiters,
            frontend_origin: mailer_config.frontend_origin.trim_end_matches('/').to_string(),
            allow_localhost_origins: mailer_config.allow_localhost_origins,
        }
    }

    fn allowed_origins(&self) -> Vec<String> {
        let mut origins = vec![self.frontend_origin.clone()];
        if self.allow_localhost_origins {
            origins.push("http://localhost:3000".to_string());
            origins.push("http://127.0.0.1:3000".to_string());
        }
        origins
    }

    /// Reconstructs the canonical share URL for `room`, validating a
    /// client-supplied link against the origin allow-list, path shape, and
    /// fragment shape if present (spec §4.J round-trip rule).
    fn canonical_share_url(&self, room: Uuid, share_link: Option<&str>) -> Result<String, ApiError> {
        let Some(share_link) = share_link else {
            return Ok(format!("{}/room/{}", self.frontend_origin, room));
        };

        let parsed = Url::parse(share_link)
            .map_err(|_| ApiError::BadInput("invalid share link".into()))?;

        if parsed.query().is_some() {
            return Err(ApiError::BadInput("share link must not carry a query string".into()));
        }

        let origin = parsed.origin().ascii_serialization();
        if !self.allowed_origins().iter().any(|allowed| allowed == &origin) {
            return Err(ApiError::BadInput("share link origin is not allowed".into()));
        }

        let expected_path = format!("/room/{room}");
        if parsed.path() != expected_path {
            return Err(ApiError::BadInput("share link path does not match room".into()));
        }

        let fragment = match parsed.fragment() {
            None => None,
            Some(fragment) => {
                let mut pairs = fragment.split('&').filter(|s| !s.is_empty());
                let Some(first) = pairs.next() else {
                    return Ok(format!("{origin}{expected_path}"));
                };
                if pairs.next().is_some() {
                    return Err(ApiError::BadInput("share link fragment must carry a single key".into()));
                }

                let Some(("key", value)) = first.split_once('=') else {
                    return Err(ApiError::BadInput("share link fragment must be key=<value>".into()));
                };

                if !SHARE_KEY_RE.is_match(value) {
                    return Err(ApiError::BadInput("share link key does not match the expected shape".into()));
                }

                Some(format!("key={value}"))
            }
        };

        Ok(match fragment {
            Some(fragment) => format!("{origin}{expected_path}#{fragment}"),
            None => format!("{origin}{expected_path}"),
        })
    }

    /// `POST /invite`.
    pub async fn send_invite(
        &self,
        ip: IpAddr,
        room: Uuid,
        recipient_email: &str,
        share_link: Option<&str>,
    ) -> Result<(), ApiError> {
        if !is_valid_email(recipient_email) {
            return Err(ApiError::BadInput("invalid recipient email".into()));
        }

        self.limiters.check_invite(ip, room, recipient_email).await?;

        let room_name: Option<(String,)> = sqlx::query_as("SELECT name FROM rooms WHERE id = $1")
            .bind(room)
            .fetch_optional(&self.db)
            .await?;

        let Some((room_name,)) = room_name else {
            return Err(ApiError::NotFound("room not found".into()));
        };

        let url = self.canonical_share_url(room, share_link)?;

        self.mailer
            .send_invite(recipient_email, &room_name, &url)
            .await
            .map_err(|err| {
                tracing::error!("invite send failed for room {room}: {err:?}");
                ApiError::Internal
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_stub(origin: &str, allow_localhost: bool) -> (String, bool) {
        (origin.trim_end_matches('/').to_string(), allow_localhost)
    }

    struct TestGate {
        frontend_origin: String,
        allow_localhost_origins: bool,
    }

    impl TestGate {
        fn allowed_origins(&self) -> Vec<String> {
            let mut origins = vec![self.frontend_origin.clone()];
            if self.allow_localhost_origins {
                origins.push("http://localhost:3000".to_string());
            }
            origins
        }
    }

    #[test]
    fn share_key_regex_matches_expected_shape() {
        assert!(SHARE_KEY_RE.is_match(&"a".repeat(32)));
        assert!(SHARE_KEY_RE.is_match(&"a".repeat(128)));
        assert!(!SHARE_KEY_RE.is_match(&"a".repeat(31)));
        assert!(!SHARE_KEY_RE.is_match(&"a".repeat(129)));
        assert!(!SHARE_KEY_RE.is_match("not valid chars!!"));
    }

    #[test]
    fn origin_allowlist_includes_localhost_only_when_enabled() {
        let (origin, allow_localhost) = service_stub("https://safeshare.co", true);
        let gate = TestGate {
            frontend_origin: origin,
            allow_localhost_origins: allow_localhost,
        };
        assert!(gate.allowed_origins().contains(&"http://localhost:3000".to_string()));

        let (origin, allow_localhost) = service_stub("https://safeshare.co", false);
        let gate = TestGate {
            frontend_origin: origin,
            allow_localhost_origins: allow_localhost,
        };
        assert!(!gate.allowed_origins().contains(&"http://localhost:3000".to_string()));
    }
}
