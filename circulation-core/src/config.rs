//! Configuration for the circulation engine

use serde::{Deserialize, Serialize};

/// Circulation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Reservation configuration
    pub reservation: ReservationConfig,

    /// Per-book coordination configuration
    pub coordinator: CoordinatorConfig,

    /// Expiration sweep configuration
    pub sweep: SweepConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "circulation-core".to_string(),
            reservation: ReservationConfig::default(),
            coordinator: CoordinatorConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

/// Reservation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationConfig {
    /// Days a pending reservation is held before it expires
    pub hold_days: i64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self { hold_days: 7 }
    }
}

/// Per-book coordination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How long an operation may wait for a book's lock before failing
    pub acquire_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 5_000,
        }
    }
}

/// Expiration sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Run the periodic sweep task
    pub enabled: bool,

    /// Seconds between sweep runs (default: once per day)
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 86_400,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(days) = std::env::var("CIRCULATION_HOLD_DAYS") {
            config.reservation.hold_days = days
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid CIRCULATION_HOLD_DAYS: {}", e)))?;
        }

        if let Ok(ms) = std::env::var("CIRCULATION_LOCK_TIMEOUT_MS") {
            config.coordinator.acquire_timeout_ms = ms.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid CIRCULATION_LOCK_TIMEOUT_MS: {}", e))
            })?;
        }

        if let Ok(secs) = std::env::var("CIRCULATION_SWEEP_INTERVAL_SECS") {
            config.sweep.interval_secs = secs.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid CIRCULATION_SWEEP_INTERVAL_SECS: {}", e))
            })?;
        }

        Ok(config)
    }
}
