use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    models::AccessEvent,
    services::{GeoProvider, NullGeoProvider},
};

const DEDUP_TTL: Duration = Duration::from_secs(3);

static OS_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"Windows NT 10\.0").unwrap(), "Windows 10"),
        (Regex::new(r"Windows NT 11\.0").unwrap(), "Windows 11"),
        (Regex::new(r"Mac OS X").unwrap(), "macOS"),
        (Regex::new(r"Android").unwrap(), "Android"),
        (Regex::new(r"iPhone|iPad|iPod").unwrap(), "iOS"),
        (Regex::new(r"Linux").unwrap(), "Linux"),
    ]
});

static BROWSER_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    // Order matters: Edge and Chrome both carry "Safari" in their UA string,
    // so the more specific token must be checked first (spec §4.K).
    vec![
        (Regex::new(r"Edg/").unwrap(), "Edge"),
        (Regex::new(r"Chrome/").unwrap(), "Chrome"),
        (Regex::new(r"Safari/").unwrap(), "Safari"),
        (Regex::new(r"Firefox/").unwrap(), "Firefox"),
        (Regex::new(r"OPR/|Opera").unwrap(), "Opera"),
    ]
});

fn parse_os(user_agent: &str) -> Option<&'static str> {
    OS_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(user_agent))
        .map(|(_, name)| *name)
}

fn parse_browser(user_agent: &str) -> Option<&'static str> {
    BROWSER_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(user_agent))
        .map(|(_, name)| *name)
}

static MOBILE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Mobile|Android|iPhone").unwrap());
static TABLET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Tablet|iPad").unwrap());

fn parse_device_type(user_agent: &str) -> &'static str {
    if MOBILE_RE.is_match(user_agent) {
        "Mobile"
    } else if TABLET_RE.is_match(user_agent) {
        "Tablet"
    } else {
        "Desktop"
    }
}

/// Access Log & Dedup (spec §4.K). Errors from the insert are logged and
/// swallowed: an access log is an observability side effect, never load
/// bearing for the request it's attached to.
pub struct AccessLogService {
    db: PgPool,
    geo: Arc<dyn GeoProvider>,
    dedup: Mutex<HashMap<(Uuid, &'static str, String), Instant>>,
}

impl AccessLogService {
    pub fn new(db: PgPool, geo: Arc<dyn GeoProvider>) -> Self {
        Self {
            db,
            geo,
            dedup: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_null_geo(db: PgPool) -> Self {
        Self::new(db, Arc::new(NullGeoProvider))
    }

    async fn should_log(&self, room: Uuid, event: AccessEvent, device: &str) -> bool {
        let key = (room, event.as_str(), device.to_string());
        let mut dedup = self.dedup.lock().await;
        let now = Instant::now();
        dedup.retain(|_, seen_at| now.duration_since(*seen_at) < DEDUP_TTL);

        if dedup.contains_key(&key) {
            return false;
        }
        dedup.insert(key, now);
        true
    }

    /// `LogAccess(room, event, req, session?, device?, guestNumber?)`.
    #[allow(clippy::too_many_arguments)]
    pub async fn log(
        &self,
        room: Uuid,
        event: AccessEvent,
        ip: IpAddr,
        user_agent: Option<&str>,
        session: Option<&str>,
        device: Option<&str>,
    ) {
        let dedup_key = device.unwrap_or("").to_string();
        if !self.should_log(room, event, &dedup_key).await {
            return;
        }

        let ip_string = ip.to_string();
        let geo = self.geo.locate(&ip_string).await;
        let user_agent = user_agent.unwrap_or("");
        let browser = parse_browser(user_agent);
        let os = parse_os(user_agent);
        let device_type = parse_device_type(user_agent);

        let result = sqlx::query(
            r#"
            INSERT INTO access_logs
                (id, room_id, event_type, device, session, ip, user_agent, browser, os,
                 device_type, country, city, region, postal_code, timezone, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(room)
        .bind(event.as_str())
        .bind(device)
        .bind(session)
        .bind(ip_string)
        .bind(user_agent)
        .bind(browser)
        .bind(os)
        .bind(device_type)
        .bind(geo.country)
        .bind(geo.city)
        .bind(geo.region)
        .bind(geo.postal_code)
        .bind(geo.timezone)
        .execute(&self.db)
        .await;

        if let Err(err) = result {
            tracing::warn!("failed to write access log for room {room}: {err:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
    const SAFARI_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 11.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36 Edg/120.0";
    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    #[test]
    fn chrome_on_windows_10_is_parsed_correctly() {
        assert_eq!(parse_browser(CHROME_WINDOWS), Some("Chrome"));
        assert_eq!(parse_os(CHROME_WINDOWS), Some("Windows 10"));
        assert_eq!(parse_device_type(CHROME_WINDOWS), "Desktop");
    }

    #[test]
    fn edge_is_preferred_over_chrome_token() {
        assert_eq!(parse_browser(EDGE_WINDOWS), Some("Edge"));
        assert_eq!(parse_os(EDGE_WINDOWS), Some("Windows 11"));
    }

    #[test]
    fn safari_on_macos_is_parsed_correctly() {
        assert_eq!(parse_browser(SAFARI_MAC), Some("Safari"));
        assert_eq!(parse_os(SAFARI_MAC), Some("macOS"));
    }

    #[test]
    fn iphone_is_mobile_and_ios() {
        assert_eq!(parse_os(IPHONE), Some("iOS"));
        assert_eq!(parse_device_type(IPHONE), "Mobile");
    }

    #[tokio::test]
    async fn dedup_suppresses_repeat_within_ttl() {
        let dedup = Mutex::new(HashMap::new());
        let service = AccessLogServiceTestHarness { dedup };
        let room = Uuid::new_v4();

        assert!(service.should_log(room, AccessEvent::RoomAccess, "device-1").await);
        assert!(!service.should_log(room, AccessEvent::RoomAccess, "device-1").await);
        assert!(service.should_log(room, AccessEvent::RoomAccess, "device-2").await);
    }

    struct AccessLogServiceTestHarness {
        dedup: Mutex<HashMap<(Uuid, &'static str, String), Instant>>,
    }

    impl AccessLogServiceTestHarness {
        async fn should_log(&self, room: Uuid, event: AccessEvent, device: &str) -> bool {
            let key = (room, event.as_str(), device.to_string());
            let mut dedup = self.dedup.lock().await;
            let now = Instant::now();
            dedup.retain(|_, seen_at| now.duration_since(*seen_at) < DEDUP_TTL);

            if dedup.contains_key(&key) {
                return false;
            }
            dedup.insert(key, now);
            true
        }
    }
}
