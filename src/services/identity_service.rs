use sqlx::PgPool;
use uuid::Uuid;

use crate::extractors::auth::Authorized;

/// Resolves the two principals from spec §4.A: the author (opaque token
/// bound to a room) and the guest (device string present in that room's
/// presence table).
pub struct IdentityService {
    db: PgPool,
}

impl IdentityService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// `IsAuthorToken(room, token)`: constant-time comparison against the
    /// stored author token. False for malformed room ids, missing rows, or
    /// mismatch — never an error, so write-gates can call this unconditionally.
    pub async fn is_author_token(&self, room: Uuid, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }

        let row: Option<(String,)> =
            sqlx::query_as("SELECT author_token FROM room_secrets WHERE room_id = $1")
                .bind(room)
                .fetch_optional(&self.db)
                .await
                .unwrap_or(None);

        match row {
            Some((stored,)) => constant_time_eq(stored.as_bytes(), token.as_bytes()),
            None => false,
        }
    }

    /// `Authorize(room, token, device) → {unauthorized | author | guest}`.
    /// The author path wins; otherwise succeeds iff a presence row exists.
    pub async fn authorize(
        &self,
        room: Uuid,
        token: Option<&str>,
        device: Option<&str>,
    ) -> Authorized {
        if let Some(token) = token {
            if self.is_author_token(room, token).await {
                return Authorized::Author;
            }
        }

        if let Some(device) = device {
            let exists: Option<(i32,)> = sqlx::query_as(
                "SELECT 1 FROM room_presence WHERE room_id = $1 AND device = $2",
            )
            .bind(room)
            .bind(device)
            .fetch_optional(&self.db)
            .await
            .unwrap_or(None);

            if exists.is_some() {
                return Authorized::Guest;
            }
        }

        Authorized::Unauthorized
    }
}

/// Constant-time byte comparison, the same pattern the reference backend
/// uses for its CSRF double-submit check, reused here for author tokens.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }

    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_and_differs() {
        assert!(constant_time_eq(b"secret-token", b"secret-token"));
        assert!(!constant_time_eq(b"secret-token", b"other-token-"));
        assert!(!constant_time_eq(b"short", b"shorter-still"));
        assert!(constant_time_eq(b"", b""));
    }
}
