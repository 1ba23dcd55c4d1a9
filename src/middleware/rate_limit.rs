use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{
    collections::HashMap,
    hash::Hash,
    net::IpAddr,
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{config::RateLimitConfig, error::ApiError};

/// A rate limiter keyed by an arbitrary, hashable bucket key.
///
/// Generalizes the teacher's `PerIpRateLimiter`/`PerUserRateLimiter` pair
/// (previously near-identical structs differing only in key type) into one
/// type parameterized over the key. Each unique key gets its own token
/// bucket; idle buckets are evicted lazily by a background sweep.
#[derive(Clone)]
pub struct KeyedRateLimiter<K: Eq + Hash + Clone + Send + Sync + 'static> {
    buckets: Arc<RwLock<HashMap<K, Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>>>,
    quota: Quota,
    window: Duration,
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> KeyedRateLimiter<K> {
    pub fn new(max: u32, window: Duration) -> Self {
        let quota = Quota::with_period(window / max.max(1))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::new(1).unwrap()))
            .allow_burst(NonZeroU32::new(max.max(1)).unwrap());

        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            quota,
            window,
        }
    }

    /// Check whether `key` is within its rate limit, returning the number of
    /// seconds until retry is possible on failure (spec §7 `Retry-After`).
    pub async fn check(&self, key: K) -> Result<(), u64> {
        {
            let buckets = self.buckets.read().await;
            if let Some(limiter) = buckets.get(&key) {
                return limiter.check().map_err(|not_until| {
                    not_until
                        .wait_time_from(DefaultClock::default().now())
                        .as_secs()
                        .max(1)
                });
            }
        }

        let mut buckets = self.buckets.write().await;
        let limiter = buckets
            .entry(key)
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)));

        limiter.check().map_err(|not_until| {
            not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1)
        })
    }

    /// Remove buckets whose tokens have fully replenished (idle since the
    /// last full window elapsed).
    pub async fn cleanup(&self) {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|_key, limiter| limiter.check().is_err());
        let removed = before - buckets.len();
        if removed > 0 {
            tracing::debug!("rate limiter cleanup: removed {removed} idle buckets");
        }
    }

    pub fn spawn_cleanup_task(self) -> tokio::task::JoinHandle<()> {
        let interval = self.window.max(Duration::from_secs(60));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.cleanup().await;
            }
        })
    }
}

pub type IpRateLimiter = KeyedRateLimiter<IpAddr>;
pub type StringRateLimiter = KeyedRateLimiter<String>;
pub type IpRoomRateLimiter = KeyedRateLimiter<(IpAddr, Uuid)>;

/// Extract the client IP following spec §4.K's trust-proxy rules: first
/// element of `X-Forwarded-For`, else `X-Real-IP`, else the connection's
/// peer address, else loopback.
pub fn extract_client_ip(headers: &axum::http::HeaderMap, peer: Option<IpAddr>) -> IpAddr {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return normalize(ip);
            }
        }
    }

    if let Some(xri) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if let Ok(ip) = xri.trim().parse::<IpAddr>() {
            return normalize(ip);
        }
    }

    peer.map(normalize)
        .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST))
}

/// Normalize an IPv6-mapped IPv4 address down to its IPv4 form.
fn normalize(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
        other => other,
    }
}

/// One token bucket per route class in spec §4.D's table, plus the invite
/// flow's additional compound bins (per-recipient, per-(ip,room), and a
/// minimum inter-request interval).
pub struct RouteLimiters {
    pub global: IpRateLimiter,
    pub upload: IpRateLimiter,
    pub presign: IpRateLimiter,
    pub download: IpRateLimiter,
    pub room_access: IpRateLimiter,
    pub heartbeat: IpRateLimiter,
    pub activity: IpRateLimiter,
    pub delete: IpRateLimiter,
    pub admin: IpRateLimiter,
    pub invite_ip: IpRateLimiter,
    pub invite_recipient: StringRateLimiter,
    pub invite_ip_room: IpRoomRateLimiter,
    invite_last_sent: Mutex<HashMap<String, std::time::Instant>>,
    invite_min_interval: Duration,
}

impl RouteLimiters {
    pub fn from_config(cfg: &RateLimitConfig) -> Self {
        Self {
            global: IpRateLimiter::new(cfg.global_max, cfg.global_window),
            upload: IpRateLimiter::new(cfg.upload_max, cfg.upload_window),
            presign: IpRateLimiter::new(cfg.presign_max, cfg.presign_window),
            download: IpRateLimiter::new(cfg.download_max, cfg.download_window),
            room_access: IpRateLimiter::new(cfg.room_access_max, cfg.room_access_window),
            heartbeat: IpRateLimiter::new(cfg.heartbeat_max, cfg.heartbeat_window),
            activity: IpRateLimiter::new(cfg.activity_max, cfg.activity_window),
            delete: IpRateLimiter::new(cfg.delete_max, cfg.delete_window),
            admin: IpRateLimiter::new(cfg.admin_max, cfg.admin_window),
            invite_ip: IpRateLimiter::new(cfg.invite_max, cfg.invite_window),
            invite_recipient: StringRateLimiter::new(
                cfg.invite_per_recipient_max,
                cfg.invite_per_recipient_window,
            ),
            invite_ip_room: IpRoomRateLimiter::new(
                cfg.invite_per_ip_room_max,
                cfg.invite_per_ip_room_window,
            ),
            invite_last_sent: Mutex::new(HashMap::new()),
            invite_min_interval: cfg.invite_min_interval,
        }
    }

    /// Applied before all per-route checks (spec §4.D: "global ... applied
    /// before per-route").
    pub async fn check_global(&self, ip: IpAddr) -> Result<(), ApiError> {
        to_api_error(self.global.check(ip).await)
    }

    pub async fn check_upload(&self, ip: IpAddr) -> Result<(), ApiError> {
        to_api_error(self.upload.check(ip).await)
    }

    pub async fn check_presign(&self, ip: IpAddr) -> Result<(), ApiError> {
        to_api_error(self.presign.check(ip).await)
    }

    pub async fn check_download(&self, ip: IpAddr) -> Result<(), ApiError> {
        to_api_error(self.download.check(ip).await)
    }

    pub async fn check_room_access(&self, ip: IpAddr) -> Result<(), ApiError> {
        to_api_error(self.room_access.check(ip).await)
    }

    pub async fn check_heartbeat(&self, ip: IpAddr) -> Result<(), ApiError> {
        to_api_error(self.heartbeat.check(ip).await)
    }

    pub async fn check_activity(&self, ip: IpAddr) -> Result<(), ApiError> {
        to_api_error(self.activity.check(ip).await)
    }

    pub async fn check_delete(&self, ip: IpAddr) -> Result<(), ApiError> {
        to_api_error(self.delete.check(ip).await)
    }

    pub async fn check_admin(&self, ip: IpAddr) -> Result<(), ApiError> {
        to_api_error(self.admin.check(ip).await)
    }

    /// All four invite gates from spec §4.J, consumed *before* the outbound
    /// send so a looping/timeout client cannot burn a recipient's quota for
    /// free.
    pub async fn check_invite(
        &self,
        ip: IpAddr,
        room: Uuid,
        recipient: &str,
    ) -> Result<(), ApiError> {
        to_api_error(self.invite_ip.check(ip).await)?;
        to_api_error(self.invite_recipient.check(recipient.to_string()).await)?;
        to_api_error(self.invite_ip_room.check((ip, room)).await)?;

        let mut last_sent = self.invite_last_sent.lock().await;
        let now = std::time::Instant::now();
        if let Some(prev) = last_sent.get(recipient) {
            let elapsed = now.duration_since(*prev);
            if elapsed < self.invite_min_interval {
                return Err(ApiError::RateLimited {
                    retry_after_secs: (self.invite_min_interval - elapsed).as_secs().max(1),
                });
            }
        }
        last_sent.insert(recipient.to_string(), now);
        Ok(())
    }

    pub fn spawn_cleanup_tasks(self: Arc<Self>) {
        self.global.clone().spawn_cleanup_task();
        self.upload.clone().spawn_cleanup_task();
        self.presign.clone().spawn_cleanup_task();
        self.download.clone().spawn_cleanup_task();
        self.room_access.clone().spawn_cleanup_task();
        self.heartbeat.clone().spawn_cleanup_task();
        self.activity.clone().spawn_cleanup_task();
        self.delete.clone().spawn_cleanup_task();
        self.admin.clone().spawn_cleanup_task();
        self.invite_ip.clone().spawn_cleanup_task();
        self.invite_recipient.clone().spawn_cleanup_task();
        self.invite_ip_room.clone().spawn_cleanup_task();
    }
}

fn to_api_error(result: Result<(), u64>) -> Result<(), ApiError> {
    result.map_err(|retry_after_secs| ApiError::RateLimited { retry_after_secs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_burst_then_rejects() {
        let limiter = IpRateLimiter::new(2, Duration::from_secs(60));
        let ip = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1));

        assert!(limiter.check(ip).await.is_ok());
        assert!(limiter.check(ip).await.is_ok());
        assert!(limiter.check(ip).await.is_err());
    }

    #[tokio::test]
    async fn buckets_are_independent_per_key() {
        let limiter = IpRateLimiter::new(1, Duration::from_secs(60));
        let a = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 2));

        assert!(limiter.check(a).await.is_ok());
        assert!(limiter.check(b).await.is_ok());
        assert!(limiter.check(a).await.is_err());
    }

    #[test]
    fn xff_resolves_to_first_entry() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 5.6.7.8, 9.10.11.12".parse().unwrap());
        let ip = extract_client_ip(&headers, None);
        assert_eq!(ip, IpAddr::V4(std::net::Ipv4Addr::new(1, 2, 3, 4)));
    }

    #[tokio::test]
    async fn invite_min_interval_rejects_rapid_resend() {
        let limiters = RouteLimiters::from_config(&RateLimitConfig {
            global_window: Duration::from_secs(900),
            global_max: 300,
            upload_window: Duration::from_secs(900),
            upload_max: 30,
            presign_window: Duration::from_secs(60),
            presign_max: 12,
            download_window: Duration::from_secs(900),
            download_max: 80,
            room_access_window: Duration::from_secs(60),
            room_access_max: 4,
            heartbeat_window: Duration::from_secs(60),
            heartbeat_max: 12,
            activity_window: Duration::from_secs(60),
            activity_max: 60,
            delete_window: Duration::from_secs(60),
            delete_max: 8,
            invite_window: Duration::from_secs(600),
            invite_max: 6,
            invite_per_recipient_window: Duration::from_secs(3600),
            invite_per_recipient_max: 3,
            invite_per_ip_room_window: Duration::from_secs(1800),
            invite_per_ip_room_max: 3,
            invite_min_interval: Duration::from_secs(8),
            admin_window: Duration::from_secs(60),
            admin_max: 20,
        });

        let ip = IpAddr::V4(std::net::Ipv4Addr::new(1, 1, 1, 1));
        let room = Uuid::new_v4();

        assert!(limiters.check_invite(ip, room, "a@example.com").await.is_ok());
        assert!(limiters.check_invite(ip, room, "a@example.com").await.is_err());
    }
}
