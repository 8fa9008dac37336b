//! Per-bucket command rate limiting.
//!
//! A [`CooldownMapping`] hands out `rate` uses per `per` window to each
//! bucket (a user, a channel, or everyone). The window opens on the first
//! use after the previous one expired.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What a cooldown is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketType {
    /// One bucket per nick.
    User,
    /// One bucket per channel (private messages bucket per nick).
    Channel,
    /// A single bucket shared by everyone.
    Global,
}

impl BucketType {
    /// Bucket key for a message from `nick`, in `channel` if it was not private.
    pub fn key(&self, nick: &str, channel: Option<&str>) -> String {
        match self {
            BucketType::User => nick.to_lowercase(),
            BucketType::Channel => channel.unwrap_or(nick).to_lowercase(),
            BucketType::Global => String::new(),
        }
    }
}

/// Rate and window of a cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    pub rate: u32,
    pub per: Duration,
    pub bucket: BucketType,
}

impl Cooldown {
    pub const fn new(rate: u32, per_secs: u64, bucket: BucketType) -> Self {
        Self {
            rate,
            per: Duration::from_secs(per_secs),
            bucket,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: u32,
    window: Instant,
}

/// Buckets for one cooldown definition.
#[derive(Debug)]
pub struct CooldownMapping {
    cooldown: Cooldown,
    buckets: HashMap<String, Bucket>,
}

impl CooldownMapping {
    pub fn new(cooldown: Cooldown) -> Self {
        Self {
            cooldown,
            buckets: HashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Cooldown {
        self.cooldown
    }

    /// Consume one use from `key`'s bucket at `now`.
    ///
    /// Returns `Some(retry_after)` when the bucket is exhausted; the use is
    /// not counted in that case.
    pub fn update_rate_limit(&mut self, key: &str, now: Instant) -> Option<Duration> {
        let Cooldown { rate, per, .. } = self.cooldown;
        if rate == 0 {
            return None;
        }
        self.prune(now);

        let bucket = self.buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: rate,
            window: now,
        });
        if now.saturating_duration_since(bucket.window) >= per {
            bucket.tokens = rate;
        }
        if bucket.tokens == rate {
            bucket.window = now;
        }
        if bucket.tokens == 0 {
            return Some(per.saturating_sub(now.saturating_duration_since(bucket.window)));
        }
        bucket.tokens -= 1;
        None
    }

    /// Forget buckets whose window has long expired so the map stays small.
    fn prune(&mut self, now: Instant) {
        if self.buckets.len() < 1024 {
            return;
        }
        let per = self.cooldown.per;
        self.buckets
            .retain(|_, b| now.saturating_duration_since(b.window) < per);
    }
}

/// Human phrasing of a retry delay, as used in the "Slow down" reply.
pub fn describe_retry(retry_after: Duration) -> String {
    let total = retry_after.as_secs_f64();
    let (m, s) = ((total / 60.0).floor(), total % 60.0);
    let (h, m) = ((m / 60.0).floor(), m % 60.0);
    if h == 0.0 && m == 0.0 {
        format!("`{:.2} seconds`", s)
    } else if h == 0.0 {
        format!("`{} minutes and {} seconds`", m as u64, s as u64)
    } else {
        format!("`{} hours, {} minutes and {} seconds`", h as u64, m as u64, s as u64)
    }
}
