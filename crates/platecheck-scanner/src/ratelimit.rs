//! Token-bucket rate limiting, process-wide and per client.

use platecheck_core::RateLimitConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A bucket of `capacity` permits, refilled by one every `refill_every`.
///
/// Starts full. Refill is computed from elapsed time when the bucket is
/// touched, so no background task is needed.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_every: Duration,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    #[must_use]
    pub fn new(capacity: u32, refill_every: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            refill_every: refill_every.max(Duration::from_millis(1)),
            state: Mutex::new(BucketState {
                tokens: capacity.max(1),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take a permit if one is available.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        self.refill(&mut state, Instant::now());
        if state.tokens > 0 {
            state.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Wait until a permit is available and take it.
    ///
    /// Waiters are not served in FIFO order.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.lock();
                let now = Instant::now();
                self.refill(&mut state, now);
                if state.tokens > 0 {
                    state.tokens -= 1;
                    return;
                }
                self.refill_every
                    .saturating_sub(now.saturating_duration_since(state.last_refill))
            };
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Permits currently available.
    #[must_use]
    pub fn available(&self) -> u32 {
        let mut state = self.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    /// Maximum number of permits.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        let periods = elapsed.as_nanos() / self.refill_every.as_nanos();
        if periods == 0 {
            return;
        }

        let missing = self.capacity - state.tokens;
        if periods >= u128::from(missing) {
            state.tokens = self.capacity;
            state.last_refill = now;
        } else {
            // periods < missing <= u32::MAX
            let periods = u32::try_from(periods).unwrap_or(missing);
            state.tokens += periods;
            state.last_refill += self.refill_every * periods;
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-client token buckets keyed by client identity.
///
/// Entries idle longer than the TTL are removed by [`evict_idle`]. The map
/// never holds more than `max_clients` entries; adding a client to a full
/// map evicts the least recently used one.
///
/// [`evict_idle`]: ClientRateLimiter::evict_idle
#[derive(Debug)]
pub struct ClientRateLimiter {
    capacity: u32,
    refill_every: Duration,
    idle_ttl: Duration,
    max_clients: usize,
    clients: Mutex<HashMap<String, ClientEntry>>,
}

#[derive(Debug)]
struct ClientEntry {
    bucket: Arc<TokenBucket>,
    last_seen: Instant,
}

impl ClientRateLimiter {
    /// Create an empty limiter.
    #[must_use]
    pub fn new(capacity: u32, refill_every: Duration, idle_ttl: Duration, max_clients: usize) -> Self {
        Self {
            capacity,
            refill_every,
            idle_ttl,
            max_clients: max_clients.max(1),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Create a limiter from the `rate_limit` config section.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.client_capacity,
            Duration::from_millis(config.client_refill_ms),
            Duration::from_secs(config.client_idle_ttl_secs),
            config.max_tracked_clients,
        )
    }

    /// Wait for a permit for `key`.
    pub async fn acquire(&self, key: &str) {
        self.bucket_for(key).acquire().await;
    }

    /// Take a permit for `key` if one is available.
    pub fn try_acquire(&self, key: &str) -> bool {
        self.bucket_for(key).try_acquire()
    }

    /// Remove clients idle longer than the TTL; returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) < self.idle_ttl);
        before - clients.len()
    }

    /// Number of clients currently tracked.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    /// Run [`evict_idle`](Self::evict_idle) every `every` on a tokio task.
    ///
    /// The task stops once the limiter is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(limiter) = weak.upgrade() else {
                    break;
                };
                let evicted = limiter.evict_idle();
                if evicted > 0 {
                    tracing::debug!(
                        evicted,
                        remaining = limiter.tracked_clients(),
                        "evicted idle rate-limit entries"
                    );
                }
            }
        })
    }

    fn bucket_for(&self, key: &str) -> Arc<TokenBucket> {
        let now = Instant::now();
        let mut clients = self.lock();

        if let Some(entry) = clients.get_mut(key) {
            entry.last_seen = now;
            return Arc::clone(&entry.bucket);
        }

        if clients.len() >= self.max_clients {
            let oldest = clients
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                clients.remove(&oldest);
                tracing::trace!(client = %oldest, "evicted least recently used client");
            }
        }

        let bucket = Arc::new(TokenBucket::new(self.capacity, self.refill_every));
        clients.insert(
            key.to_string(),
            ClientEntry {
                bucket: Arc::clone(&bucket),
                last_seen: now,
            },
        );
        bucket
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientEntry>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
