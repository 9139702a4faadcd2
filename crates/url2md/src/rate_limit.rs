//! Per-host fetch spacing
//!
//! Each host owns a slot holding the earliest instant the next fetch may
//! start. Callers reserve the slot under a short per-host lock and sleep
//! outside of it, so waiters are released in reservation order and hosts
//! never contend with each other. A waiter dropped before its grant hands
//! the slot back if nobody reserved after it.

use crate::config::Config;
use crate::error::ConvertError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
struct HostSlot {
    next_free: Option<Instant>,
}

/// Enforces a minimum interval between fetches to the same host
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    min_interval: Duration,
    max_wait: Option<Duration>,
    hosts: Mutex<HashMap<String, Arc<Mutex<HostSlot>>>>,
}

impl RateLimiter {
    /// Create a limiter with the given spacing
    pub fn new(min_interval: Duration) -> Self {
        Self {
            enabled: true,
            min_interval,
            max_wait: None,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// A limiter that never waits
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Duration::ZERO)
        }
    }

    /// Build from the rate limit settings of a [`Config`]
    pub fn from_config(config: &Config) -> Self {
        let limiter = Self::new(config.rate_limit_min_interval);
        let limiter = match config.rate_limit_max_wait {
            Some(max_wait) => limiter.with_max_wait(max_wait),
            None => limiter,
        };
        Self {
            enabled: config.rate_limit_enabled,
            ..limiter
        }
    }

    /// Fail acquisitions that would wait longer than `max_wait`
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Whether acquisitions can ever wait
    pub fn is_active(&self) -> bool {
        self.enabled && !self.min_interval.is_zero()
    }

    /// Wait until a fetch to `host` is allowed
    pub async fn acquire(&self, host: &str) -> Result<(), ConvertError> {
        if !self.is_active() {
            return Ok(());
        }

        let slot = self.slot(host);
        let reservation = {
            let mut state = slot.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let grant_at = state.next_free.map_or(now, |next| next.max(now));

            if let Some(max_wait) = self.max_wait {
                if grant_at.duration_since(now) > max_wait {
                    return Err(ConvertError::RateLimitTimeout {
                        host: host.to_string(),
                        max_wait,
                    });
                }
            }

            let reserved = grant_at + self.min_interval;
            let previous = state.next_free.replace(reserved);
            Reservation {
                slot: Arc::clone(&slot),
                previous,
                reserved,
                grant_at,
                granted: false,
            }
        };
        reservation.wait(host).await;
        Ok(())
    }

    fn slot(&self, host: &str) -> Arc<Mutex<HostSlot>> {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(hosts.entry(host.to_string()).or_default())
    }
}

/// A reserved slot, released back to the host if dropped before its grant
struct Reservation {
    slot: Arc<Mutex<HostSlot>>,
    previous: Option<Instant>,
    reserved: Instant,
    grant_at: Instant,
    granted: bool,
}

impl Reservation {
    async fn wait(mut self, host: &str) {
        let wait = self.grant_at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!(host, wait_ms = wait.as_millis() as u64, "Rate limited");
            tokio::time::sleep_until(self.grant_at).await;
        }
        self.granted = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        let mut state = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        // Later reservations were spaced after this one; leave them alone
        if state.next_free == Some(self.reserved) {
            state.next_free = self.previous;
        }
    }
}
