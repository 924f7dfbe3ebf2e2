use std::time::Duration;

/// The downstream HTTP retry policy pinned by the spec: 3 total attempts,
/// `0.3s` base wait, `urllib3`-style `backoff_factor * 2^(attempt - 1)`
/// growth (no jitter). This yields `0.3s, 0.6s, 1.2s` across the 3 retries
/// that follow an initial failed attempt.
pub const SERVICE_CLIENT_INITIAL_WAIT_MS: u64 = 300;
pub const SERVICE_CLIENT_MAX_RETRIES: usize = 3;

/// Get an iterator of [`Duration`]s to sleep between retry attempts, using
/// the gateway's pinned service-client backoff policy. Bounded to
/// [`SERVICE_CLIENT_MAX_RETRIES`] items so a persistently-failing downstream
/// is retried up to 3 times, not forever.
pub fn service_client_backoff_iter() -> impl Iterator<Item = Duration> {
    iter_with_initial_wait_ms(SERVICE_CLIENT_INITIAL_WAIT_MS).take(SERVICE_CLIENT_MAX_RETRIES)
}

/// A general-purpose exponential backoff iterator, doubling each time,
/// starting from `initial_wait_ms`. Never overflows.
pub fn iter_with_initial_wait_ms(
    initial_wait_ms: u64,
) -> impl Iterator<Item = Duration> {
    (0u32..).map(move |index| {
        let factor = 2u64.saturating_pow(index);
        let wait_ms = initial_wait_ms.saturating_mul(factor);
        Duration::from_millis(wait_ms)
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn matches_spec_sequence() {
        let durations =
            service_client_backoff_iter().take(3).collect::<Vec<_>>();
        assert_eq!(
            durations,
            vec![
                Duration::from_millis(300),
                Duration::from_millis(600),
                Duration::from_millis(1200),
            ]
        );
    }

    #[test]
    fn no_integer_overflow() {
        let mut durations = iter_with_initial_wait_ms(SERVICE_CLIENT_INITIAL_WAIT_MS);
        for _ in 0..200 {
            durations.next();
        }
    }

    #[test]
    fn service_client_iter_is_bounded_to_max_retries() {
        assert_eq!(
            service_client_backoff_iter().count(),
            SERVICE_CLIENT_MAX_RETRIES
        );
    }
}
