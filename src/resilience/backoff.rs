//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Delay to wait after a failed attempt.
///
/// `attempt` is zero-based: the delay after the first failed call is
/// `next_delay(cfg, 0)`. The result is
/// `min(initial_delay * multiplier^attempt, max_delay) + uniform(0, jitter_max)`.
pub fn next_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
    let jitter = if cfg.jitter_max_ms > 0 {
        rand::thread_rng().gen_range(0..=cfg.jitter_max_ms)
    } else {
        0
    };
    Duration::from_millis(base_delay_ms(cfg, attempt).saturating_add(jitter))
}

/// Jitter-free part of [`next_delay`].
pub fn base_delay_ms(cfg: &RetryConfig, attempt: u32) -> u64 {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let exponential = cfg.initial_delay_ms as f64 * cfg.backoff_multiplier.powi(exponent);

    // NaN or negative factors collapse to the initial delay.
    if exponential.is_nan() || exponential < 0.0 {
        return cfg.initial_delay_ms.min(cfg.max_delay_ms);
    }

    exponential.min(cfg.max_delay_ms as f64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RetryConfig {
        RetryConfig {
            max_attempts: 6,
            initial_delay_ms: 100,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
            jitter_max_ms: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_delay_within_bounds() {
        let cfg = cfg();
        for attempt in 0..cfg.max_attempts {
            let base = (100.0 * 2f64.powi(attempt as i32)) as u64;
            let cap = cfg.max_delay_ms + cfg.jitter_max_ms;
            for _ in 0..200 {
                let delay = next_delay(&cfg, attempt).as_millis() as u64;
                assert!(delay <= cap, "attempt {attempt}: {delay} above cap");
                if base <= cfg.max_delay_ms {
                    assert!(delay >= base, "attempt {attempt}: {delay} below {base}");
                    assert!(delay <= base + cfg.jitter_max_ms);
                }
            }
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let cfg = cfg();
        assert_eq!(base_delay_ms(&cfg, 0), 100);
        assert_eq!(base_delay_ms(&cfg, 3), 800);
        assert_eq!(base_delay_ms(&cfg, 10), 2_000);
        assert_eq!(base_delay_ms(&cfg, u32::MAX), 2_000);
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let cfg = RetryConfig {
            jitter_max_ms: 0,
            ..cfg()
        };
        assert_eq!(next_delay(&cfg, 2), Duration::from_millis(400));
    }
}
