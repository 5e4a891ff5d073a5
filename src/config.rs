//! Configuration management with validation and defaults
//!
//! Every section has a `Default`, so a TOML file only needs the keys it
//! overrides.

use crate::bingo::round::RoundSettings;
use crate::errors::{BingoResult, ConfigurationError};
use crate::ledger::types::Money;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Largest configurable amount in whole units; keeps every table total in range.
pub const MAX_WHOLE_AMOUNT: u64 = 1_000_000_000;

/// Hall configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BingoConfig {
    pub game: GameConfig,
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
}

/// Round rules
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Stake tiers in whole currency units
    pub stake_tiers: Vec<u64>,
    pub min_players: usize,
    pub max_players_per_table: usize,
    pub countdown_seconds: u64,
    pub draw_interval_ms: u64,
    pub cards_per_player: u8,
    /// House share of the Active stakes, in basis points
    pub commission_bps: u32,
    /// Admit players as soon as their stake is debited
    pub auto_verify: bool,
    pub auto_mark_default: bool,
    pub settlement_retry_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            stake_tiers: vec![10, 20],
            min_players: 5,
            max_players_per_table: 200,
            countdown_seconds: 60,
            draw_interval_ms: 4_000,
            cards_per_player: 2,
            commission_bps: 3_000,
            auto_verify: false,
            auto_mark_default: false,
            settlement_retry_ms: 2_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBackend {
    Memory,
    RocksDb,
}

/// Money movement rules and where wallets live
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    /// Smallest withdrawal, in whole currency units
    pub min_withdrawal: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::RocksDb,
            min_withdrawal: 50,
        }
    }
}

/// Storage configuration with optimization settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    pub max_write_buffer_number: usize,
    pub target_file_size_mb: usize,
    pub compression_type: CompressionType,
    /// Whether to clear database on startup (testing only!)
    pub clear_on_start: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Snappy,
    Lz4,
    Zstd,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_directory: "./DB/bingohall".to_string(),
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            compression_type: CompressionType::Lz4,
            clear_on_start: false,
        }
    }
}

/// HTTP server settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub allowed_origins: Vec<String>,
    /// Overridden by `BINGOHALL_ADMIN_KEY` when set
    pub admin_api_key: Option<String>,
    pub event_channel_capacity: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            allowed_origins: vec!["*".to_string()],
            admin_api_key: None,
            event_channel_capacity: 1024,
        }
    }
}

/// Monitoring and metrics configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    pub log_level: LogLevel,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            log_level: LogLevel::Info,
        }
    }
}

impl BingoConfig {
    /// Production deployment with persistent wallets
    pub fn production() -> Self {
        Self {
            storage: StorageConfig {
                write_buffer_size_mb: 128,
                max_write_buffer_number: 6,
                target_file_size_mb: 128,
                ..Default::default()
            },
            api: ApiConfig {
                allowed_origins: vec![],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// In-memory wallets and short timers, for local runs and tests
    pub fn testing() -> Self {
        Self {
            game: GameConfig {
                min_players: 2,
                countdown_seconds: 5,
                draw_interval_ms: 250,
                auto_verify: true,
                ..Default::default()
            },
            ledger: LedgerConfig {
                backend: LedgerBackend::Memory,
                ..Default::default()
            },
            storage: StorageConfig {
                clear_on_start: true,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> BingoResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigurationError::LoadFailed(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> BingoResult<Self> {
        let config: BingoConfig = toml::from_str(raw)?;
        config
            .validate()
            .map_err(|e| ConfigurationError::ValidationFailed(e.to_string()))?;
        Ok(config)
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let game = &self.game;
        if game.stake_tiers.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "at least one stake tier".to_string(),
            ));
        }
        if game.stake_tiers.contains(&0) {
            return Err(ConfigValidationError::InvalidValue(
                "stake tiers must be > 0".to_string(),
            ));
        }
        if game.stake_tiers.iter().any(|t| *t > MAX_WHOLE_AMOUNT) {
            return Err(ConfigValidationError::InvalidValue(format!(
                "stake tiers must be <= {}",
                MAX_WHOLE_AMOUNT
            )));
        }
        if self.ledger.min_withdrawal > MAX_WHOLE_AMOUNT {
            return Err(ConfigValidationError::InvalidValue(format!(
                "min_withdrawal must be <= {}",
                MAX_WHOLE_AMOUNT
            )));
        }
        if game.min_players == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "min_players must be > 0".to_string(),
            ));
        }
        if game.max_players_per_table < game.min_players {
            return Err(ConfigValidationError::LogicalInconsistency(
                "max_players_per_table is below min_players".to_string(),
            ));
        }
        if game.cards_per_player == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "cards_per_player must be > 0".to_string(),
            ));
        }
        if game.draw_interval_ms == 0 || game.settlement_retry_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "draw and retry intervals must be > 0".to_string(),
            ));
        }
        if game.commission_bps > 10_000 {
            return Err(ConfigValidationError::InvalidValue(
                "commission_bps must be <= 10000".to_string(),
            ));
        }
        if self.api.event_channel_capacity == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "event_channel_capacity must be > 0".to_string(),
            ));
        }
        if self.ledger.backend == LedgerBackend::RocksDb && self.storage.data_directory.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "storage.data_directory for the rocks_db ledger".to_string(),
            ));
        }
        Ok(())
    }

    pub fn stake_tiers(&self) -> Vec<Money> {
        self.game.stake_tiers.iter().map(|t| Money::whole(*t)).collect()
    }

    pub fn min_withdrawal(&self) -> Money {
        Money::whole(self.ledger.min_withdrawal)
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.game.countdown_seconds)
    }

    pub fn draw_interval(&self) -> Duration {
        Duration::from_millis(self.game.draw_interval_ms)
    }

    pub fn settlement_retry(&self) -> Duration {
        Duration::from_millis(self.game.settlement_retry_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn round_settings(&self) -> RoundSettings {
        RoundSettings {
            min_players: self.game.min_players,
            max_players: self.game.max_players_per_table,
            countdown: self.countdown(),
            draw_interval: self.draw_interval(),
            cards_per_player: self.game.cards_per_player,
            commission_bps: self.game.commission_bps,
            auto_mark_default: self.game.auto_mark_default,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, Error)]
pub enum ConfigValidationError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("Configuration logical inconsistency: {0}")]
    LogicalInconsistency(String),
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BingoConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(BingoConfig::production().validate().is_ok());
        assert!(BingoConfig::testing().validate().is_ok());
    }

    #[test]
    fn test_invalid_config_validation() {
        let mut config = BingoConfig::default();
        config.game.commission_bps = 12_000;
        assert!(config.validate().is_err());

        let mut config = BingoConfig::default();
        config.game.max_players_per_table = 3;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::LogicalInconsistency(_))
        ));
    }

    #[test]
    fn test_oversized_amounts_rejected() {
        let mut config = BingoConfig::default();
        config.game.stake_tiers = vec![10, u64::MAX];
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue(_))
        ));

        config.game.stake_tiers = vec![MAX_WHOLE_AMOUNT];
        assert!(config.validate().is_ok());
        assert_eq!(config.stake_tiers(), vec![Money::whole(MAX_WHOLE_AMOUNT)]);

        let mut config = BingoConfig::default();
        config.ledger.min_withdrawal = u64::MAX / 10;
        assert!(config.validate().is_err());

        assert!(BingoConfig::from_toml("[game]\nstake_tiers = [184467440737095517]").is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BingoConfig::from_toml(
            r#"
            [game]
            stake_tiers = [10, 20, 50]
            countdown_seconds = 30

            [ledger]
            backend = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.stake_tiers(), vec![Money::whole(10), Money::whole(20), Money::whole(50)]);
        assert_eq!(config.countdown(), Duration::from_secs(30));
        assert_eq!(config.draw_interval(), Duration::from_secs(4));
        assert_eq!(config.ledger.backend, LedgerBackend::Memory);
        assert_eq!(config.min_withdrawal(), Money::whole(50));
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert!(BingoConfig::from_toml("[game]\nstake_tiers = []").is_err());
        assert!(BingoConfig::from_toml("[game\n").is_err());
    }

    #[test]
    fn test_round_settings_follow_game_section() {
        let settings = BingoConfig::default().round_settings();
        assert_eq!(settings.min_players, 5);
        assert_eq!(settings.max_players, 200);
        assert_eq!(settings.cards_per_player, 2);
        assert_eq!(settings.commission_bps, 3_000);
        assert!(!settings.auto_mark_default);
    }
}
