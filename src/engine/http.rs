// ── Auraluxe Engine: HTTP Retry Classification & Circuit Breaker ──────────
//
// Shared utilities used by the inference providers and the embedding client.
//
// Features:
//   • Exponential backoff with ±25% jitter (base 1s, max 30s) for 5xx/transport
//   • Rate limits (429) are NOT retried here; the cascade moves on instead
//   • Respects `Retry-After` header when classifying a 429
//   • Circuit breaker: 5 consecutive failures → fail fast for 60s

use crate::atoms::traits::ProviderError;
use crate::engine::types::truncate_utf8;
use log::warn;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

// ── Constants ──────────────────────────────────────────────────────────────

/// Default maximum number of same-provider retries per request.
pub const MAX_RETRIES: u32 = 2;

/// Initial retry delay in milliseconds (doubles each attempt).
const INITIAL_RETRY_DELAY_MS: u64 = 1_000;

/// Maximum retry delay cap in milliseconds (30 seconds).
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Bytes of an error body kept in error messages.
pub const ERROR_BODY_LIMIT: usize = 200;

// ── Retryable status detection ─────────────────────────────────────────────

/// Transient server-side statuses worth retrying against the same provider.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504 | 529)
}

/// Map a non-success HTTP response to a typed provider error.
pub fn classify_status(status: u16, body: &str, retry_after_secs: Option<u64>) -> ProviderError {
    let message = format!("API error {}: {}", status, truncate_utf8(body, ERROR_BODY_LIMIT));
    match status {
        401 | 403 => ProviderError::Auth(message),
        429 => ProviderError::RateLimited { message, retry_after_secs },
        _ => ProviderError::Api { status, message },
    }
}

// ── Backoff delay ──────────────────────────────────────────────────────────

/// Sleep with exponential backoff + ±25% jitter. Returns the delay for logging.
pub async fn retry_delay(attempt: u32) -> Duration {
    let base_ms = INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt.min(8));
    let delay = Duration::from_millis(apply_jitter(base_ms.min(MAX_RETRY_DELAY_MS)));
    tokio::time::sleep(delay).await;
    delay
}

/// Apply ±25% jitter to prevent thundering-herd effects.
fn apply_jitter(base_ms: u64) -> u64 {
    let jitter_range = (base_ms / 4) as i64;
    if jitter_range == 0 {
        return base_ms.max(100);
    }
    let offset = (rand_jitter() % (2 * jitter_range + 1)) - jitter_range;
    (base_ms as i64 + offset).max(100) as u64
}

/// Jitter source using system clock nanos.
fn rand_jitter() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as i64
}

// ── Retry-After header parsing ─────────────────────────────────────────────

/// Parse Retry-After header value (integer seconds only).
pub fn parse_retry_after(header_value: &str) -> Option<u64> {
    header_value.trim().parse::<u64>().ok()
}

// ── Circuit Breaker ────────────────────────────────────────────────────────

/// Trips after N consecutive failures, then rejects requests for a cooldown
/// period before letting a probe through.
///
/// States:
///   Closed   — normal operation, requests pass through
///   Open     — rejecting requests (cooldown active)
///   HalfOpen — cooldown expired, one probe request allowed
pub struct CircuitBreaker {
    consecutive_failures: AtomicU32,
    /// Epoch seconds when the circuit was tripped open.
    tripped_at: AtomicU64,
    threshold: u32,
    cooldown_secs: u64,
}

impl CircuitBreaker {
    pub const fn new(threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            tripped_at: AtomicU64::new(0),
            threshold,
            cooldown_secs,
        }
    }

    /// `Ok(())` if a request may proceed, `Err(message)` while open.
    pub fn check(&self) -> Result<(), String> {
        let failures = self.consecutive_failures.load(Ordering::Relaxed);
        if failures < self.threshold {
            return Ok(());
        }

        let tripped = self.tripped_at.load(Ordering::Relaxed);
        let now = epoch_secs();
        let elapsed = now.saturating_sub(tripped);

        if elapsed < self.cooldown_secs {
            Err(format!(
                "Circuit breaker open: {} consecutive failures, cooling down for {}s",
                failures,
                self.cooldown_secs - elapsed
            ))
        } else {
            Ok(())
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.tripped_at.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        let prev = self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        if prev + 1 >= self.threshold {
            self.tripped_at.store(epoch_secs(), Ordering::Relaxed);
            warn!(
                "[circuit-breaker] Tripped after {} consecutive failures — cooling down {}s",
                prev + 1,
                self.cooldown_secs
            );
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, 60)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
