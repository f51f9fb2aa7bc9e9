use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sql_gate_core::config::Limits;

#[derive(Clone)]
pub(super) struct RateLimiter {
    cfg: RateLimitConfig,
    buckets: Arc<tokio::sync::Mutex<HashMap<IpAddr, RateLimitBucket>>>,
}

#[derive(Clone, Copy)]
struct RateLimitConfig {
    enabled: bool,
    refill_per_sec: f64,
    capacity: f64,
    max_ips: usize,
}

#[derive(Clone, Copy)]
struct RateLimitBucket {
    tokens: f64,
    last: Instant,
    last_seen: Instant,
}

impl RateLimiter {
    /// Disabled when `max_requests_per_ip_per_sec` is 0.
    pub(super) fn new(limits: &Limits) -> Self {
        let cfg = RateLimitConfig {
            enabled: limits.max_requests_per_ip_per_sec > 0,
            refill_per_sec: f64::from(limits.max_requests_per_ip_per_sec),
            capacity: f64::from(limits.max_requests_burst_per_ip),
            max_ips: limits.max_rate_limit_ips as usize,
        };
        Self {
            cfg,
            buckets: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    pub(super) async fn allow(&self, ip: Option<IpAddr>) -> bool {
        if !self.cfg.enabled {
            return true;
        }
        let Some(ip) = ip else {
            return true;
        };

        const MAX_BUCKETS_BEFORE_PRUNE: usize = 4096;
        const BUCKET_TTL: Duration = Duration::from_secs(10 * 60);

        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;

        if buckets.len() > MAX_BUCKETS_BEFORE_PRUNE {
            buckets.retain(|_, bucket| now.duration_since(bucket.last_seen) <= BUCKET_TTL);
        }

        if self.cfg.max_ips > 0 && buckets.len() >= self.cfg.max_ips && !buckets.contains_key(&ip) {
            buckets.retain(|_, bucket| now.duration_since(bucket.last_seen) <= BUCKET_TTL);
            if buckets.len() >= self.cfg.max_ips {
                if let Some((&victim, _)) =
                    buckets.iter().min_by_key(|(_, bucket)| bucket.last_seen)
                {
                    buckets.remove(&victim);
                } else {
                    return false;
                }
            }
        }

        let bucket = buckets.entry(ip).or_insert(RateLimitBucket {
            tokens: self.cfg.capacity,
            last: now,
            last_seen: now,
        });
        bucket.last_seen = now;

        let elapsed = now.duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.cfg.refill_per_sec).min(self.cfg.capacity);
        bucket.last = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
