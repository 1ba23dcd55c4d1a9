use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::OverloadConfig;

/// Process-health sampling, externalized per spec §9's strategy so a
/// multi-node deployment can inject a shared implementation instead of the
/// single-node `/proc` reader.
#[async_trait::async_trait]
pub trait HealthSampler: Send + Sync {
    async fn sample(&self) -> HealthSample;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HealthSample {
    pub resident_mb: u64,
    pub free_system_mb: u64,
    pub load_per_cpu: f64,
}

/// Reads `/proc/self/status`, `/proc/meminfo`, and `/proc/loadavg` directly
/// rather than pulling in a system-info crate the teacher has no analog for;
/// these three files cover exactly the three ceilings spec §4.D names.
pub struct ProcHealthSampler {
    cpu_count: f64,
}

impl ProcHealthSampler {
    pub fn new() -> Self {
        Self {
            cpu_count: (std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1) as f64)
                .max(1.0),
        }
    }
}

impl Default for ProcHealthSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HealthSampler for ProcHealthSampler {
    async fn sample(&self) -> HealthSample {
        let resident_mb = read_resident_mb().await.unwrap_or(0);
        let free_system_mb = read_free_system_mb().await.unwrap_or(u64::MAX);
        let load1 = read_load1().await.unwrap_or(0.0);

        HealthSample {
            resident_mb,
            free_system_mb,
            load_per_cpu: load1 / self.cpu_count,
        }
    }
}

async fn read_resident_mb() -> Option<u64> {
    let status = tokio::fs::read_to_string("/proc/self/status").await.ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest.trim().split_whitespace().next()?.parse().ok()?;
            return Some(kb / 1024);
        }
    }
    None
}

async fn read_free_system_mb() -> Option<u64> {
    let meminfo = tokio::fs::read_to_string("/proc/meminfo").await.ok()?;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb: u64 = rest.trim().split_whitespace().next()?.parse().ok()?;
            return Some(kb / 1024);
        }
    }
    None
}

async fn read_load1() -> Option<f64> {
    let loadavg = tokio::fs::read_to_string("/proc/loadavg").await.ok()?;
    loadavg.split_whitespace().next()?.parse().ok()
}

/// Samples process health at most once per `sample_interval` and serves the
/// cached reading to every caller in between, so hot routes never block on
/// `/proc` reads.
pub struct OverloadGuard {
    sampler: Box<dyn HealthSampler>,
    config: OverloadConfig,
    last_sample_at: Mutex<Option<Instant>>,
    overloaded: AtomicBool,
    cached_load_millis: AtomicU64,
}

impl OverloadGuard {
    pub fn new(sampler: Box<dyn HealthSampler>, config: OverloadConfig) -> Self {
        Self {
            sampler,
            config,
            last_sample_at: Mutex::new(None),
            overloaded: AtomicBool::new(false),
            cached_load_millis: AtomicU64::new(0),
        }
    }

    /// Refresh the cached sample if `sample_interval` has elapsed, then
    /// report whether the process is currently shedding heavy routes.
    pub async fn refresh_and_check(&self) -> bool {
        let mut last = self.last_sample_at.lock().await;
        let due = last.map(|t| t.elapsed() >= self.config.sample_interval).unwrap_or(true);

        if due {
            let sample = self.sampler.sample().await;
            let overloaded = sample.resident_mb > self.config.max_resident_mb
                || sample.free_system_mb < self.config.min_free_system_mb
                || sample.load_per_cpu > self.config.max_load_per_cpu;

            self.overloaded.store(overloaded, Ordering::Relaxed);
            self.cached_load_millis
                .store((sample.load_per_cpu * 1000.0) as u64, Ordering::Relaxed);
            *last = Some(Instant::now());
        }

        self.overloaded.load(Ordering::Relaxed)
    }

    /// Cheap, non-blocking read of the last computed verdict — used by
    /// routes that must not wait on the refresh lock (light routes never
    /// call this at all per spec §4.D).
    pub fn is_overloaded(&self) -> bool {
        self.overloaded.load(Ordering::Relaxed)
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.config.sample_interval.as_secs().max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSampler(HealthSample);

    #[async_trait::async_trait]
    impl HealthSampler for FixedSampler {
        async fn sample(&self) -> HealthSample {
            self.0
        }
    }

    #[tokio::test]
    async fn trips_when_resident_memory_exceeds_ceiling() {
        let guard = OverloadGuard::new(
            Box::new(FixedSampler(HealthSample {
                resident_mb: 2048,
                free_system_mb: 4096,
                load_per_cpu: 0.1,
            })),
            OverloadConfig {
                sample_interval: Duration::from_secs(3),
                max_resident_mb: 1536,
                min_free_system_mb: 128,
                max_load_per_cpu: 2.0,
            },
        );

        assert!(guard.refresh_and_check().await);
    }

    #[tokio::test]
    async fn stays_healthy_within_ceilings() {
        let guard = OverloadGuard::new(
            Box::new(FixedSampler(HealthSample {
                resident_mb: 256,
                free_system_mb: 4096,
                load_per_cpu: 0.2,
            })),
            OverloadConfig {
                sample_interval: Duration::from_secs(3),
                max_resident_mb: 1536,
                min_free_system_mb: 128,
                max_load_per_cpu: 2.0,
            },
        );

        assert!(!guard.refresh_and_check().await);
    }
}
