//! Configuration management for the RTP media server
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Smallest MTU that still fits a fixed RTP header plus one byte of payload
const MIN_MTU: usize = 13;

/// Media engine configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Maximum transmission unit used to size RTP receive buffers
    pub mtu: usize,
    /// Collect per-filter processing statistics in each factory
    pub statistics_enabled: bool,
    /// Enable RTCP on call leg sessions
    pub rtcp_enabled: bool,
    /// Packetization time for encoders, in milliseconds
    pub ptime_ms: u32,
    /// Upper bound of packets drained from one session per tick
    pub max_packets_per_tick: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            mtu: 1440,
            statistics_enabled: true,
            rtcp_enabled: false,
            ptime_ms: 20,
            max_packets_per_tick: 64,
        }
    }
}

/// Scheduling class of a ticker thread
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TickerPriority {
    /// Plain sleeping between ticks
    Normal,
    /// Sleep, then spin through the last part of each wait
    High,
    /// Like `High` with a longer spin window
    Realtime,
}

/// How a ticker is driven
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TickerMode {
    /// Dedicated OS thread per ticker
    Threaded,
    /// No thread, the owner calls `tick()`
    Manual,
}

/// Ticker configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TickerConfig {
    /// Tick interval in milliseconds
    pub interval_ms: u64,
    /// Scheduling class
    pub priority: TickerPriority,
    /// Threaded or manually driven
    pub mode: TickerMode,
}

impl Default for TickerConfig {
    fn default() -> Self {
        TickerConfig {
            interval_ms: 10,
            priority: TickerPriority::Normal,
            mode: TickerMode::Threaded,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MediaServerConfig {
    pub engine: EngineConfig,
    pub ticker: TickerConfig,
    pub log_level: Option<String>,
}

impl Default for MediaServerConfig {
    fn default() -> Self {
        MediaServerConfig {
            engine: EngineConfig::default(),
            ticker: TickerConfig::default(),
            log_level: Some("info".to_string()),
        }
    }
}

impl MediaServerConfig {
    /// Load configuration from environment variables (`RMS_` prefix, `__` between sections)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_environment(Self::environment())
    }

    /// Load configuration from an explicit environment source
    pub fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        let defaults = MediaServerConfig::default();

        let config: MediaServerConfig = Config::builder()
            .set_default("engine.mtu", defaults.engine.mtu as u64)?
            .set_default("engine.statistics_enabled", defaults.engine.statistics_enabled)?
            .set_default("engine.rtcp_enabled", defaults.engine.rtcp_enabled)?
            .set_default("engine.ptime_ms", defaults.engine.ptime_ms as u64)?
            .set_default(
                "engine.max_packets_per_tick",
                defaults.engine.max_packets_per_tick as u64,
            )?
            .set_default("ticker.interval_ms", defaults.ticker.interval_ms)?
            .set_default("ticker.priority", "normal")?
            .set_default("ticker.mode", "threaded")?
            .set_default("log_level", "info")?
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// The environment source used by `from_env`
    pub fn environment() -> Environment {
        Environment::with_prefix("RMS")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Reject values the media engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticker.interval_ms == 0 {
            return Err(ConfigError::Message(
                "ticker.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.engine.ptime_ms == 0 {
            return Err(ConfigError::Message(
                "engine.ptime_ms must be greater than zero".to_string(),
            ));
        }
        if self.engine.max_packets_per_tick == 0 {
            return Err(ConfigError::Message(
                "engine.max_packets_per_tick must be greater than zero".to_string(),
            ));
        }
        if self.engine.mtu < MIN_MTU {
            return Err(ConfigError::Message(format!(
                "engine.mtu {} is below the minimum of {}",
                self.engine.mtu, MIN_MTU
            )));
        }
        Ok(())
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn environment(vars: &[(&str, &str)]) -> Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MediaServerConfig::environment().source(Some(source))
    }

    #[test]
    fn test_config_defaults() {
        let config = MediaServerConfig::from_environment(environment(&[])).unwrap();
        assert_eq!(config, MediaServerConfig::default());
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_environment_overrides() {
        let config = MediaServerConfig::from_environment(environment(&[
            ("RMS_ENGINE__MTU", "1200"),
            ("RMS_ENGINE__RTCP_ENABLED", "true"),
            ("RMS_TICKER__INTERVAL_MS", "20"),
            ("RMS_TICKER__PRIORITY", "realtime"),
            ("RMS_TICKER__MODE", "manual"),
            ("RMS_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.engine.mtu, 1200);
        assert!(config.engine.rtcp_enabled);
        assert_eq!(config.ticker.interval_ms, 20);
        assert_eq!(config.ticker.priority, TickerPriority::Realtime);
        assert_eq!(config.ticker.mode, TickerMode::Manual);
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = MediaServerConfig::from_environment(environment(&[(
            "RMS_TICKER__INTERVAL_MS",
            "0",
        )]));
        assert!(result.is_err());
    }

    #[test]
    fn test_tiny_mtu_rejected() {
        let mut config = MediaServerConfig::default();
        config.engine.mtu = 12;
        assert!(config.validate().is_err());
    }
}
