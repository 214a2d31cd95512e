use marquee_core::BookingRules;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub booking: BookingRules,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

fn default_max_connections() -> u32 { 10 }
fn default_acquire_timeout() -> u64 { 3 }

#[derive(Debug, Deserialize, Clone)]
pub struct SweeperConfig {
    #[serde(default = "default_sweep_interval")]
    pub interval_seconds: u64,
}

fn default_sweep_interval() -> u64 { 60 }

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_seconds: default_sweep_interval() }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `MARQUEE__DATABASE__URL=postgres://...` overrides database.url
            .add_source(config::Environment::with_prefix("MARQUEE").separator("__"))
            .build()?;

        let cfg: Config = s.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        self.booking.validate().map_err(config::ConfigError::Message)?;
        if self.sweeper.interval_seconds == 0 {
            return Err(config::ConfigError::Message(
                "sweeper.interval_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
