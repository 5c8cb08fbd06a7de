// crates/core/src/config.rs
//! Timing knobs for the client, with environment overrides.

use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(10);

/// Request timeout as a multiple of the poll interval when not set explicitly.
const TIMEOUT_POLL_MULTIPLE: u32 = 5;

pub const ENV_POLL_INTERVAL_MS: &str = "STEMSMITH_POLL_INTERVAL_MS";
pub const ENV_HEALTH_INTERVAL_MS: &str = "STEMSMITH_HEALTH_INTERVAL_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "STEMSMITH_REQUEST_TIMEOUT_MS";
pub const ENV_ENDPOINT: &str = "STEMSMITH_ENDPOINT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub poll_interval: Duration,
    pub health_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }
}

impl ClientConfig {
    /// Defaults, with the request timeout derived from `poll_interval`.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            health_interval: DEFAULT_HEALTH_INTERVAL,
            request_timeout: poll_interval * TIMEOUT_POLL_MULTIPLE,
        }
    }

    /// Defaults overridden by `STEMSMITH_*_MS` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ClientConfig::from_env`], reading variables through `lookup`.
    /// Unparseable or zero values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |key: &str| {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
                _ => {
                    tracing::warn!(key, value = %raw, "ignoring invalid duration override");
                    None
                }
            }
        };

        let mut config =
            Self::with_poll_interval(millis(ENV_POLL_INTERVAL_MS).unwrap_or(DEFAULT_POLL_INTERVAL));
        if let Some(d) = millis(ENV_HEALTH_INTERVAL_MS) {
            config.health_interval = d;
        }
        if let Some(d) = millis(ENV_REQUEST_TIMEOUT_MS) {
            config.request_timeout = d;
        }
        config
    }
}

/// Pick the endpoint to use.
///
/// Priority:
/// 1. explicit value (CLI flag)
/// 2. `STEMSMITH_ENDPOINT`
/// 3. the persisted last-used value (already defaulted by the store)
pub fn resolve_endpoint(explicit: Option<&str>, env: Option<String>, persisted: String) -> String {
    let present = |e: &String| !e.trim().is_empty();
    explicit
        .map(str::to_string)
        .filter(present)
        .or(env.filter(present))
        .unwrap_or(persisted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.health_interval, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_timeout_follows_poll_interval() {
        let config = ClientConfig::from_lookup(lookup(&[(ENV_POLL_INTERVAL_MS, "500")]));
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_explicit_overrides_and_bad_values() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_POLL_INTERVAL_MS, "zero"),
            (ENV_HEALTH_INTERVAL_MS, "0"),
            (ENV_REQUEST_TIMEOUT_MS, "30000"),
        ]));
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.health_interval, DEFAULT_HEALTH_INTERVAL);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_resolve_endpoint_precedence() {
        let persisted = || "http://saved:1".to_string();
        assert_eq!(
            resolve_endpoint(Some("http://flag:1"), Some("http://env:1".into()), persisted()),
            "http://flag:1"
        );
        assert_eq!(
            resolve_endpoint(None, Some("http://env:1".into()), persisted()),
            "http://env:1"
        );
        assert_eq!(resolve_endpoint(None, None, persisted()), "http://saved:1");
        assert_eq!(resolve_endpoint(None, Some(" ".into()), persisted()), "http://saved:1");
    }

    #[test]
    fn test_blank_flag_falls_through_to_env() {
        assert_eq!(
            resolve_endpoint(Some(""), Some("http://env:1".into()), "http://saved:1".into()),
            "http://env:1"
        );
        assert_eq!(
            resolve_endpoint(Some("  "), None, "http://saved:1".into()),
            "http://saved:1"
        );
    }
}
