use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::rl::RLConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub rl: RLConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// JSON file with open/high/low/close/volume columns
    #[serde(default = "default_data_path")]
    pub path: PathBuf,
    /// Bars per state window
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Trailing bars kept and normalized
    #[serde(default = "default_data_points")]
    pub data_points: usize,
}

fn default_data_path() -> PathBuf {
    PathBuf::from("./data/EURUSD_D1.json")
}

fn default_lookback() -> usize {
    20
}

fn default_data_points() -> usize {
    2000
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
            lookback: default_lookback(),
            data_points: default_data_points(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Also write logs to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("data.lookback", 20)?
            .set_default("data.data_points", 2000)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TRADER_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TRADER_RL__DDPG__TAU, etc.)
            .add_source(
                Environment::with_prefix("TRADER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.data.lookback == 0 {
            errors.push("data.lookback must be positive".to_string());
        }
        if self.data.data_points < self.data.lookback {
            errors.push("data.data_points must be at least data.lookback".to_string());
        }
        if self.rl.encoder.input_size != crate::rl::BAR_FEATURES {
            errors.push(format!(
                "rl.encoder.input_size must be {} (one OHLCV bar)",
                crate::rl::BAR_FEATURES
            ));
        }
        if let Err(e) = self.rl.validate() {
            errors.push(e.to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    #[test]
    fn test_default_config_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.data.lookback, 20);
        assert_eq!(config.rl.ddpg.tau, 0.001);
    }

    #[test]
    fn test_load_from_toml() {
        let dir = temp_dir().join(format!("ddpg_trader_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("default.toml"),
            "[data]\nlookback = 12\n\n[rl.ddpg]\ntau = 0.05\ntarget_sync = \"every_learn_step\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&dir).unwrap();
        assert_eq!(config.data.lookback, 12);
        assert_eq!(config.rl.ddpg.tau, 0.05);
        assert_eq!(config.rl.ddpg.target_sync, crate::rl::TargetSync::EveryLearnStep);
        // untouched sections keep their defaults
        assert_eq!(config.rl.replay.batch_size, 1000);
    }

    #[test]
    fn test_validate_collects_errors() {
        let mut config = AppConfig::default();
        config.data.lookback = 0;
        config.rl.ddpg.tau = 2.0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_validate_rejects_negative_grad_clip() {
        let mut config = AppConfig::default();
        config.rl.encoder.grad_clip = -0.5;

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("grad_clip")));
    }
}
