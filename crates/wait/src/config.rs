use std::time::Duration;

pub const TIMEOUT_ENV: &str = "SETTLE_WAIT_TIMEOUT_SECS";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
pub const WATCH_BACKOFF_MAX_ENV: &str = "SETTLE_WATCH_BACKOFF_MAX_SECS";
pub const DEFAULT_WATCH_BACKOFF_MAX: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaiterConfig {
    /// Upper bound on every wait; `None` leaves the deadline to the caller's context.
    pub timeout: Option<Duration>,
    /// Cap on the delay before reopening a watch stream that ended.
    pub watch_backoff_max: Duration,
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self { timeout: Some(DEFAULT_TIMEOUT), watch_backoff_max: DEFAULT_WATCH_BACKOFF_MAX }
    }
}

impl WaiterConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout), ..Self::default() }
    }

    /// Read `SETTLE_WAIT_TIMEOUT_SECS` (`0` disables the waiter-level timeout) and
    /// `SETTLE_WATCH_BACKOFF_MAX_SECS`.
    pub fn from_env() -> Self {
        Self {
            timeout: parse_timeout(std::env::var(TIMEOUT_ENV).ok().as_deref()),
            watch_backoff_max: parse_backoff_max(std::env::var(WATCH_BACKOFF_MAX_ENV).ok().as_deref()),
        }
    }
}

fn parse_timeout(raw: Option<&str>) -> Option<Duration> {
    match raw.and_then(|s| s.trim().parse::<u64>().ok()) {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => Some(DEFAULT_TIMEOUT),
    }
}

fn parse_backoff_max(raw: Option<&str>) -> Duration {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_WATCH_BACKOFF_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timeout_values() {
        assert_eq!(parse_timeout(Some("30")), Some(Duration::from_secs(30)));
        assert_eq!(parse_timeout(Some(" 5 ")), Some(Duration::from_secs(5)));
        assert_eq!(parse_timeout(Some("0")), None);
        assert_eq!(parse_timeout(Some("soon")), Some(DEFAULT_TIMEOUT));
        assert_eq!(parse_timeout(None), Some(DEFAULT_TIMEOUT));
    }

    #[test]
    fn parses_backoff_cap() {
        assert_eq!(parse_backoff_max(Some("5")), Duration::from_secs(5));
        assert_eq!(parse_backoff_max(Some("0")), DEFAULT_WATCH_BACKOFF_MAX);
        assert_eq!(parse_backoff_max(Some("later")), DEFAULT_WATCH_BACKOFF_MAX);
        assert_eq!(parse_backoff_max(None), DEFAULT_WATCH_BACKOFF_MAX);
    }

    #[test]
    fn with_timeout_keeps_default_backoff() {
        let cfg = WaiterConfig::with_timeout(Duration::from_secs(1));
        assert_eq!(cfg.timeout, Some(Duration::from_secs(1)));
        assert_eq!(cfg.watch_backoff_max, DEFAULT_WATCH_BACKOFF_MAX);
    }
}
