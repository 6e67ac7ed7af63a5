use anyhow::{Context, Result};
use std::time::Duration;

use crate::audio::QueueSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Cola
    pub default_volume: u8,
    pub stay_time: Duration,
    pub pruning: bool,
    pub max_queue_size: usize,
    pub max_stream_failures: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID is not set")?
                .trim()
                .parse()
                .context("APPLICATION_ID must be a number")?,
            guild_id: var("GUILD_ID").and_then(|s| s.trim().parse().ok()),

            // Cola
            default_volume: match var("DEFAULT_VOLUME") {
                Some(val) => val.trim().parse().context("DEFAULT_VOLUME must be 0-100")?,
                None => defaults.default_volume,
            },
            stay_time: match var("STAY_TIME") {
                Some(val) => parse_stay_time(&val)?,
                None => defaults.stay_time,
            },
            pruning: match var("PRUNING") {
                Some(val) => val.trim().parse().context("PRUNING must be true or false")?,
                None => defaults.pruning,
            },
            max_queue_size: match var("MAX_QUEUE_SIZE") {
                Some(val) => val.trim().parse().context("MAX_QUEUE_SIZE must be a number")?,
                None => defaults.max_queue_size,
            },
            max_stream_failures: match var("MAX_STREAM_FAILURES") {
                Some(val) => val.trim().parse().context("MAX_STREAM_FAILURES must be a number")?,
                None => defaults.max_stream_failures,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 100
    /// - Queue size and stream failure cap must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 100 {
            anyhow::bail!("Default volume must be between 0 and 100, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_stream_failures == 0 {
            anyhow::bail!("Max stream failures must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the bot token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Queue: {}% vol, stay {}, max {} songs, {} stream failures\n  \
            Pruning: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            humantime::format_duration(self.stay_time),
            self.max_queue_size,
            self.max_stream_failures,
            self.pruning
        )
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            default_volume: self.default_volume,
            stay_time: self.stay_time,
            pruning: self.pruning,
            max_queue_size: self.max_queue_size,
            max_stream_failures: self.max_stream_failures,
        }
    }
}

/// `STAY_TIME` en segundos (`30`) o en formato humano (`1m 30s`)
fn parse_stay_time(value: &str) -> Result<Duration> {
    let value = value.trim();
    match value.parse::<u64>() {
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => humantime::parse_duration(value).with_context(|| format!("invalid STAY_TIME: {value}")),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        let queue = QueueSettings::default();
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: queue.default_volume,
            stay_time: queue.stay_time,
            pruning: queue.pruning,
            max_queue_size: queue.max_queue_size,
            max_stream_failures: queue.max_stream_failures,
        }
    }
}
