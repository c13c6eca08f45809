//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::registry::ActuatorPolicy;

/// Port control panels connect to by default.
pub const DEFAULT_PORT: u16 = 10025;

/// Greenhouse server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the TCP listener binds to
    pub listen_addr: SocketAddr,
    /// How often sensor readings are broadcast
    pub publish_interval: Duration,
    /// Lines buffered per session before it counts as too slow
    pub outbound_queue: usize,
    /// Handling of commands that name unknown nodes or actuators
    pub actuator_policy: ActuatorPolicy,
    /// JSON layout file; the built-in layout is used when unset
    pub layout_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            publish_interval: Duration::from_millis(1000),
            outbound_queue: 256,
            actuator_policy: ActuatorPolicy::default(),
            layout_path: None,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    ///
    /// Recognized keys: `GREENHOUSE_LISTEN_ADDR`,
    /// `GREENHOUSE_PUBLISH_INTERVAL_MS`, `GREENHOUSE_OUTBOUND_QUEUE`,
    /// `GREENHOUSE_ACTUATOR_POLICY` (`create` or `reject`) and
    /// `GREENHOUSE_LAYOUT`. Missing or empty keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(addr) = get("GREENHOUSE_LISTEN_ADDR") {
            config.listen_addr = parse("GREENHOUSE_LISTEN_ADDR", &addr)?;
        }

        if let Some(ms) = get("GREENHOUSE_PUBLISH_INTERVAL_MS") {
            let ms: u64 = parse("GREENHOUSE_PUBLISH_INTERVAL_MS", &ms)?;
            if ms == 0 {
                return Err(Error::Config(
                    "GREENHOUSE_PUBLISH_INTERVAL_MS must be positive".to_string(),
                ));
            }
            config.publish_interval = Duration::from_millis(ms);
        }

        if let Some(size) = get("GREENHOUSE_OUTBOUND_QUEUE") {
            let size: usize = parse("GREENHOUSE_OUTBOUND_QUEUE", &size)?;
            if size == 0 {
                return Err(Error::Config(
                    "GREENHOUSE_OUTBOUND_QUEUE must be positive".to_string(),
                ));
            }
            config.outbound_queue = size;
        }

        if let Some(policy) = get("GREENHOUSE_ACTUATOR_POLICY") {
            config.actuator_policy = policy.parse()?;
        }

        config.layout_path = get("GREENHOUSE_LAYOUT").map(PathBuf::from);

        Ok(config)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{key}={value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.listen_addr.port(), DEFAULT_PORT);
        assert_eq!(config.publish_interval, Duration::from_secs(1));
        assert_eq!(config.actuator_policy, ActuatorPolicy::CreateMissing);
    }

    #[test]
    fn reads_every_key() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("GREENHOUSE_LISTEN_ADDR", "127.0.0.1:4000"),
            ("GREENHOUSE_PUBLISH_INTERVAL_MS", "250"),
            ("GREENHOUSE_OUTBOUND_QUEUE", "8"),
            ("GREENHOUSE_ACTUATOR_POLICY", "reject"),
            ("GREENHOUSE_LAYOUT", "/etc/greenhouse/layout.json"),
        ]))
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:4000".parse().unwrap());
        assert_eq!(config.publish_interval, Duration::from_millis(250));
        assert_eq!(config.outbound_queue, 8);
        assert_eq!(config.actuator_policy, ActuatorPolicy::RejectUnknown);
        assert_eq!(
            config.layout_path,
            Some(PathBuf::from("/etc/greenhouse/layout.json"))
        );
    }

    #[test]
    fn empty_values_keep_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("GREENHOUSE_LISTEN_ADDR", ""),
            ("GREENHOUSE_LAYOUT", "  "),
        ]))
        .unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for (key, value) in [
            ("GREENHOUSE_LISTEN_ADDR", "not-an-addr"),
            ("GREENHOUSE_PUBLISH_INTERVAL_MS", "soon"),
            ("GREENHOUSE_PUBLISH_INTERVAL_MS", "0"),
            ("GREENHOUSE_OUTBOUND_QUEUE", "0"),
            ("GREENHOUSE_ACTUATOR_POLICY", "sometimes"),
        ] {
            let result = ServerConfig::from_lookup(lookup(&[(key, value)]));
            assert!(
                matches!(result, Err(Error::Config(_))),
                "{key}={value} should be rejected"
            );
        }
    }
}
