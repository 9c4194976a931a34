use serde::Deserialize;
use std::time::Duration;
use std::{env, fs, path::Path};

use crate::core::delivery::DeliveryStrategyKind;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NodeConfig {
    /// Identifier recorded on every subscription opened by this node.
    pub node_id: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node-1".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeliveryConfig {
    pub strategy: DeliveryStrategyKind,
    /// Unacked deliveries a subscriber may hold before it stops accepting.
    pub max_unacked_per_subscription: usize,
    pub worker_threads: usize,
    pub idle_poll_ms: u64,
}

impl DeliveryConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            strategy: DeliveryStrategyKind::SlowestSubscriber,
            max_unacked_per_subscription: 1000,
            worker_threads: 4,
            idle_poll_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetainedConfig {
    /// Retained deliveries awaiting an ack, per subscription channel.
    pub max_tracked_acks_per_subscription: usize,
}

impl Default for RetainedConfig {
    fn default() -> Self {
        Self {
            max_tracked_acks_per_subscription: 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PublisherConfig {
    /// Flow channel identifier used when the transport has no remote address.
    pub default_channel_identifier: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            default_channel_identifier: "mqtt-unknown".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub thread_ids: bool,
    pub thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            thread_ids: true,
            thread_names: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub delivery: DeliveryConfig,
    pub retained: RetainedConfig,
    pub publisher: PublisherConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads the file named by `TIDEMQ_CONFIG`, or the defaults when unset.
    pub fn from_env_or_default() -> Result<Self, anyhow::Error> {
        match env::var("TIDEMQ_CONFIG") {
            Ok(path) => load_config(path),
            Err(_) => Ok(Config::default()),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, anyhow::Error> {
    let raw: String = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&raw)?;
    Ok(config)
}
