//! Pure retry-scheduling decision (spec §4.5, property P7), kept separate
//! from queue/storage I/O so the backoff math is independently testable —
//! mirrors the teacher's style of isolating pricing/threshold arithmetic
//! into small free functions (same shape as `wdp-chain::gas::bump_gas_params`).

use std::time::Duration;

use wdp_config::RetryConfig;
use wdp_types::ErrorKind;

/// What the DLQ handler should do with one escalated message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Republish to the original upstream queue after `delay`, with the
    /// request(s)' `tryCount` incremented.
    Retry { delay: Duration },
    /// Permanently mark the underlying request(s) FAILED; no further retry.
    Fail,
}

/// Decides whether an escalated message should be retried and, if so, after
/// how long — `delay = min(maxDelay, initial * multiplier^(attempts - 1))`
/// (spec §4.5), capped at `max_retry_attempts` (or the smaller
/// `unknown_max_retry_attempts` bound for UNKNOWN-kind failures).
///
/// `kind.is_retryable()` already encodes which kinds the DLQ handler ever
/// retries (spec §7's taxonomy: only NETWORK and UNKNOWN); everything else —
/// VALIDATION, AUTH, NOT_FOUND, BUSINESS, NONCE, GAS_PRICE, BLOCKCHAIN — is
/// non-recoverable by the time it reaches the DLQ and fails immediately.
pub fn decide(kind: ErrorKind, attempts: u32, cfg: &RetryConfig) -> Decision {
    if !kind.is_retryable() {
        return Decision::Fail;
    }

    let max_attempts = if kind == ErrorKind::Unknown {
        cfg.unknown_max_retry_attempts
    } else {
        cfg.max_retry_attempts
    };
    if attempts >= max_attempts {
        return Decision::Fail;
    }

    let exponent = attempts.saturating_sub(1) as i32;
    let delay_ms = cfg.initial_retry_delay_ms as f64 * cfg.retry_backoff_multiplier.powi(exponent);
    let delay_ms = (delay_ms as u64).min(cfg.max_retry_delay_ms);
    Decision::Retry {
        delay: Duration::from_millis(delay_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RetryConfig {
        RetryConfig {
            max_retry_attempts: 5,
            initial_retry_delay_ms: 60_000,
            max_retry_delay_ms: 6 * 60 * 60 * 1_000,
            retry_backoff_multiplier: 2.0,
            unknown_max_retry_attempts: 2,
        }
    }

    #[test]
    fn non_retryable_kinds_fail_immediately() {
        assert_eq!(decide(ErrorKind::Validation, 1, &cfg()), Decision::Fail);
        assert_eq!(decide(ErrorKind::Business, 1, &cfg()), Decision::Fail);
        assert_eq!(decide(ErrorKind::Blockchain, 1, &cfg()), Decision::Fail);
    }

    #[test]
    fn network_failures_back_off_exponentially() {
        assert_eq!(
            decide(ErrorKind::Network, 1, &cfg()),
            Decision::Retry {
                delay: Duration::from_secs(60)
            }
        );
        assert_eq!(
            decide(ErrorKind::Network, 2, &cfg()),
            Decision::Retry {
                delay: Duration::from_secs(120)
            }
        );
        assert_eq!(
            decide(ErrorKind::Network, 3, &cfg()),
            Decision::Retry {
                delay: Duration::from_secs(240)
            }
        );
    }

    #[test]
    fn network_failures_escalate_past_max_attempts() {
        assert_eq!(decide(ErrorKind::Network, 5, &cfg()), Decision::Fail);
    }

    #[test]
    fn unknown_kind_uses_smaller_attempt_bound() {
        assert!(matches!(
            decide(ErrorKind::Unknown, 1, &cfg()),
            Decision::Retry { .. }
        ));
        assert_eq!(decide(ErrorKind::Unknown, 2, &cfg()), Decision::Fail);
    }

    #[test]
    fn delay_is_capped_at_max_retry_delay() {
        let mut c = cfg();
        c.max_retry_attempts = 20;
        let decision = decide(ErrorKind::Network, 10, &c);
        assert_eq!(
            decision,
            Decision::Retry {
                delay: Duration::from_millis(c.max_retry_delay_ms)
            }
        );
    }
}
