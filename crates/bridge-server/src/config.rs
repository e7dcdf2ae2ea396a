use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bridge_relay::RelayConfig;
use bridge_relay::config::{DEFAULT_MAX_ATTACHMENT_BYTES, DEFAULT_REQUEST_TIMEOUT};

const DEFAULT_DB_PATH: &str = "messages.db";
const DEFAULT_MAX_CONCURRENT_EVENTS: usize = 32;

/// Process configuration read from `BRIDGE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub db_path: PathBuf,
    pub static_fanout: Option<PathBuf>,
    pub max_attachment_bytes: u64,
    pub request_timeout: Duration,
    pub max_concurrent_events: usize,
    pub relay_bots: bool,
    pub retention_days: Option<u32>,
    pub register_commands: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let Some(bot_token) = var("BRIDGE_BOT_TOKEN") else {
            bail!("BRIDGE_BOT_TOKEN is not set");
        };

        Ok(Self {
            bot_token: bot_token.trim().to_string(),
            db_path: var("BRIDGE_DB_PATH")
                .unwrap_or_else(|| DEFAULT_DB_PATH.into())
                .into(),
            static_fanout: var("BRIDGE_STATIC_FANOUT").map(PathBuf::from),
            max_attachment_bytes: parse_or(
                var("BRIDGE_MAX_ATTACHMENT_BYTES"),
                "BRIDGE_MAX_ATTACHMENT_BYTES",
                DEFAULT_MAX_ATTACHMENT_BYTES,
            )?,
            request_timeout: Duration::from_secs(parse_or(
                var("BRIDGE_REQUEST_TIMEOUT_SECS"),
                "BRIDGE_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT.as_secs(),
            )?),
            max_concurrent_events: parse_or(
                var("BRIDGE_MAX_CONCURRENT_EVENTS"),
                "BRIDGE_MAX_CONCURRENT_EVENTS",
                DEFAULT_MAX_CONCURRENT_EVENTS,
            )?,
            relay_bots: parse_or(var("BRIDGE_RELAY_BOTS"), "BRIDGE_RELAY_BOTS", false)?,
            retention_days: var("BRIDGE_CORRELATION_RETENTION_DAYS")
                .map(|v| parse(&v, "BRIDGE_CORRELATION_RETENTION_DAYS"))
                .transpose()?,
            register_commands: parse_or(
                var("BRIDGE_REGISTER_COMMANDS"),
                "BRIDGE_REGISTER_COMMANDS",
                true,
            )?,
        })
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            max_attachment_bytes: self.max_attachment_bytes,
            request_timeout: self.request_timeout,
            ignore_bots: !self.relay_bots,
            ..RelayConfig::default()
        }
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.map_or(Ok(default), |v| parse(&v, key))
}

fn parse<T>(value: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {key}: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("BRIDGE_BOT_TOKEN", "secret")]).unwrap();
        assert_eq!(config.bot_token, "secret");
        assert_eq!(config.db_path, PathBuf::from("messages.db"));
        assert!(config.static_fanout.is_none());
        assert_eq!(config.max_attachment_bytes, 10 * 1024 * 1024);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_concurrent_events, 32);
        assert!(!config.relay_bots);
        assert!(config.retention_days.is_none());
        assert!(config.register_commands);
        assert!(config.relay_config().ignore_bots);
    }

    #[test]
    fn token_is_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("BRIDGE_BOT_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("BRIDGE_BOT_TOKEN", "secret"),
            ("BRIDGE_DB_PATH", "/data/bridge.db"),
            ("BRIDGE_STATIC_FANOUT", "fanout.json"),
            ("BRIDGE_MAX_ATTACHMENT_BYTES", "1024"),
            ("BRIDGE_REQUEST_TIMEOUT_SECS", "5"),
            ("BRIDGE_MAX_CONCURRENT_EVENTS", "4"),
            ("BRIDGE_RELAY_BOTS", "true"),
            ("BRIDGE_CORRELATION_RETENTION_DAYS", "90"),
            ("BRIDGE_REGISTER_COMMANDS", "false"),
        ])
        .unwrap();

        assert_eq!(config.static_fanout, Some(PathBuf::from("fanout.json")));
        assert_eq!(config.retention_days, Some(90));
        assert!(!config.register_commands);

        let relay = config.relay_config();
        assert_eq!(relay.max_attachment_bytes, 1024);
        assert_eq!(relay.request_timeout, Duration::from_secs(5));
        assert!(!relay.ignore_bots);
    }

    #[test]
    fn malformed_number_names_the_variable() {
        let err = load(&[
            ("BRIDGE_BOT_TOKEN", "secret"),
            ("BRIDGE_MAX_CONCURRENT_EVENTS", "many"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("BRIDGE_MAX_CONCURRENT_EVENTS"));
    }
}
