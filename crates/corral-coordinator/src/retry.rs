// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential backoff for failed batch attempts.

use corral_config::model::RetryConfig;

/// Decision for a failed processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Re-run the same frozen batch after this delay.
    Retry { delay_ms: i64 },
    /// The retry budget is spent; abandon the batch.
    Abandon,
}

/// Backoff delay before retry number `retry_count + 1`.
///
/// `initial_delay_ms * multiplier^retry_count`, capped at `max_delay_ms`.
/// With defaults this yields 2000, 4000, 8000, 16000, 32000, 64000.
pub fn compute_delay(cfg: &RetryConfig, retry_count: u32) -> i64 {
    let delay = cfg.initial_delay_ms as f64 * cfg.backoff_multiplier.powf(f64::from(retry_count));
    if delay >= cfg.max_delay_ms as f64 {
        cfg.max_delay_ms
    } else {
        delay as i64
    }
}

/// Decide what to do after a failed attempt.
///
/// `retry_count` is the number of retries already consumed for the current
/// batch; once it reaches `max_retries` the batch is abandoned. The caller
/// increments the count when it acts on [`FailureAction::Retry`].
pub fn on_failure(cfg: &RetryConfig, retry_count: u32) -> FailureAction {
    if retry_count >= cfg.max_retries {
        FailureAction::Abandon
    } else {
        FailureAction::Retry {
            delay_ms: compute_delay(cfg, retry_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_curve() {
        let cfg = RetryConfig::default();
        let delays: Vec<i64> = (0..6).map(|n| compute_delay(&cfg, n)).collect();
        assert_eq!(delays, vec![2_000, 4_000, 8_000, 16_000, 32_000, 64_000]);
    }

    #[test]
    fn delay_is_capped_at_max() {
        let cfg = RetryConfig::default();
        assert_eq!(compute_delay(&cfg, 10), 64_000);
        assert_eq!(compute_delay(&cfg, 30), 64_000);
    }

    #[test]
    fn retries_then_abandons_at_budget() {
        let cfg = RetryConfig::default();
        for n in 0..cfg.max_retries {
            assert!(matches!(on_failure(&cfg, n), FailureAction::Retry { .. }));
        }
        assert_eq!(on_failure(&cfg, cfg.max_retries), FailureAction::Abandon);
    }

    #[test]
    fn first_retry_uses_initial_delay() {
        let cfg = RetryConfig::default();
        assert_eq!(
            on_failure(&cfg, 0),
            FailureAction::Retry { delay_ms: 2_000 }
        );
    }

    #[test]
    fn huge_retry_count_does_not_overflow() {
        let cfg = RetryConfig::default();
        // multiplier^count overflows f64 into infinity; the cap must hold.
        assert_eq!(compute_delay(&cfg, u32::MAX), cfg.max_delay_ms);
    }
}
