//! Environment-variable configuration, in the corpus's `env::var(...)`
//! idiom rather than a CLI flag parser.

use std::env;
use std::time::Duration;

/// Process-wide configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Process TTL: if set, the process begins shutdown this long after
    /// startup regardless of signals. `None` disables it.
    pub ttl: Option<Duration>,
    /// How often to log a statistics snapshot for every open namespace.
    /// `None` disables the background logger.
    pub stats_interval: Option<Duration>,
}

impl Config {
    /// Reads configuration from the environment, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Self {
        Config {
            host: env::var("GEARLOCK_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("GEARLOCK_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            ttl: parse_secs_env("GEARLOCK_TTL_SECS"),
            stats_interval: parse_secs_env("GEARLOCK_STATS_INTERVAL_SECS"),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses an optional non-zero seconds value out of an environment
/// variable. Unset or `0` both mean "disabled".
fn parse_secs_env(key: &str) -> Option<Duration> {
    let raw = env::var(key).ok()?;
    let secs: u64 = raw.parse().ok()?;
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_unset_both_disable_the_ttl() {
        assert_eq!(parse_secs_env("WARDEN_TEST_UNSET_TTL_VAR"), None);
        std::env::set_var("WARDEN_TEST_ZERO_TTL_VAR", "0");
        assert_eq!(parse_secs_env("WARDEN_TEST_ZERO_TTL_VAR"), None);
        std::env::remove_var("WARDEN_TEST_ZERO_TTL_VAR");
    }

    #[test]
    fn positive_value_parses_to_a_duration() {
        std::env::set_var("WARDEN_TEST_POSITIVE_TTL_VAR", "45");
        assert_eq!(
            parse_secs_env("WARDEN_TEST_POSITIVE_TTL_VAR"),
            Some(Duration::from_secs(45))
        );
        std::env::remove_var("WARDEN_TEST_POSITIVE_TTL_VAR");
    }
}
