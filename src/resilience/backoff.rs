//! Exponential backoff delays.

use std::time::Duration;

use rand::Rng;

use crate::resilience::retries::RetryPolicy;

/// Share of the delay added as random jitter, in percent.
const JITTER_PERCENT: u64 = 10;

/// Delay to wait after failed attempt number `attempt` (1-based).
///
/// `base * 2^(attempt-1)`, capped at `max`, plus up to 10% jitter so that
/// clients failing together do not retry in lockstep. Attempt 0 never waits.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    let capped = policy
        .base_delay_ms
        .saturating_mul(factor)
        .min(policy.max_delay_ms);

    let jitter_max = capped.saturating_mul(JITTER_PERCENT) / 100;
    let jitter = match jitter_max {
        0 => 0,
        max => rand::thread_rng().gen_range(0..max),
    };

    Duration::from_millis(capped.saturating_add(jitter))
}
