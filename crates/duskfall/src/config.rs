//! Server configuration.

use std::time::Duration;

use duskfall_lobby::QueueConfig;
use duskfall_session::{SessionConfig, role_deck};
use serde::{Deserialize, Serialize};

use crate::DuskfallError;

/// Everything needed to start a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    pub queue: QueueConfig,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9000".to_string(),
            queue: QueueConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads overrides from the process environment:
    ///
    /// | variable | field |
    /// |----------|-------|
    /// | `DUSKFALL_BIND` | `bind_addr` |
    /// | `DUSKFALL_QUEUE_CAPACITY` | `queue.capacity` |
    /// | `DUSKFALL_GRACE_SECS` | `session.grace_period` |
    /// | `DUSKFALL_PHASE_TIMEOUT_SECS` | `session.phase_timeout` (0 disables) |
    ///
    /// # Errors
    /// Returns [`DuskfallError::Config`] for unparsable or unsupported
    /// values.
    pub fn from_env() -> Result<Self, DuskfallError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), with an arbitrary source.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DuskfallError> {
        let mut config = Self::default();

        if let Some(addr) = lookup("DUSKFALL_BIND") {
            config.bind_addr = addr;
        }
        if let Some(capacity) = parse(&lookup, "DUSKFALL_QUEUE_CAPACITY")? {
            config.queue.capacity = capacity;
        }
        if let Some(secs) = parse(&lookup, "DUSKFALL_GRACE_SECS")? {
            config.session.grace_period = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&lookup, "DUSKFALL_PHASE_TIMEOUT_SECS")? {
            config.session.phase_timeout =
                (secs > 0).then(|| Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects combinations the server cannot run.
    ///
    /// # Errors
    /// Returns [`DuskfallError::Config`] if the queue capacity has no role
    /// mix or the session inbox has no room.
    pub fn validate(&self) -> Result<(), DuskfallError> {
        self.queue
            .clone()
            .validated()
            .map_err(|e| DuskfallError::Config(e.to_string()))?;
        role_deck(self.queue.capacity)
            .map_err(|e| DuskfallError::Config(e.to_string()))?;
        if self.session.inbox_size == 0 {
            return Err(DuskfallError::Config(
                "session inbox size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, DuskfallError>
where
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse().map_err(|e| {
                DuskfallError::Config(format!("{key}={raw:?}: {e}"))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.queue.capacity, 4);
        assert_eq!(config.session.grace_period, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("DUSKFALL_BIND", "127.0.0.1:7000"),
            ("DUSKFALL_GRACE_SECS", "1"),
            ("DUSKFALL_PHASE_TIMEOUT_SECS", "90"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:7000");
        assert_eq!(config.session.grace_period, Duration::from_secs(1));
        assert_eq!(config.session.phase_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_from_lookup_zero_timeout_disables_deadline() {
        let config =
            ServerConfig::from_lookup(lookup(&[("DUSKFALL_PHASE_TIMEOUT_SECS", "0")]))
                .unwrap();
        assert_eq!(config.session.phase_timeout, None);
    }

    #[test]
    fn test_from_lookup_garbage_number_rejected() {
        let result =
            ServerConfig::from_lookup(lookup(&[("DUSKFALL_GRACE_SECS", "soon")]));
        assert!(matches!(result, Err(DuskfallError::Config(msg)) if msg.contains("DUSKFALL_GRACE_SECS")));
    }

    #[test]
    fn test_from_lookup_unsupported_capacity_rejected() {
        let result =
            ServerConfig::from_lookup(lookup(&[("DUSKFALL_QUEUE_CAPACITY", "6")]));
        assert!(matches!(result, Err(DuskfallError::Config(_))));
    }
}
