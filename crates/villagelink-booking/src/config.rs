//! # Booking Configuration
//!
//! Configuration management for the booking engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     VILLAGELINK_DEVICE_ID=bus-17                                       │
//! │     VILLAGELINK_OFFLINE_KINDS=ticket,parcel                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/villagelink/booking.toml (Linux)                         │
//! │     ~/Library/Application Support/com.villagelink.app/booking.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     300s credential window, tickets queue offline, 10% platform fee    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # booking.toml
//! [device]
//! id = "bus-17"
//! name = "Rampur Jeep 2"
//!
//! [fares]
//! platform_fee_bps = 1000   # 10% kept by the platform at validation
//! reward_bps = 100          # 1% of each booking back as coins
//!
//! [fares.add_on_fees]       # paise, once per booking
//! livestock = 1000
//! insurance = 100
//!
//! [credential]
//! window_secs = 300
//! near_expiry_secs = 30
//!
//! [queue]
//! offline_kinds = ["ticket"]
//! max_attempts = 8
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use villagelink_core::validation::validate_bps;
use villagelink_core::{
    AddOnFees, Bps, CredentialWindow, DistanceSubsidy, NoSubsidy, RecordKind, SubsidyPolicy,
};

use crate::error::{BookingError, BookingResult};

// =============================================================================
// Device
// =============================================================================

/// Identity of this device and where its data lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique identifier for this device.
    #[serde(default = "generate_device_id")]
    pub id: String,

    /// Human-readable device name.
    #[serde(default = "default_device_name")]
    pub name: String,

    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

fn generate_device_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_device_name() -> String {
    "VillageLink Device".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: generate_device_id(),
            name: default_device_name(),
            database_path: None,
        }
    }
}

// =============================================================================
// Fares
// =============================================================================

/// Fee, reward and add-on settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareSettings {
    /// Platform share withheld from driver earnings, in basis points.
    #[serde(default = "default_platform_fee_bps")]
    pub platform_fee_bps: u32,

    /// Share of each booking returned to the passenger as coins.
    #[serde(default = "default_reward_bps")]
    pub reward_bps: u32,

    /// Once-per-booking add-on fees.
    #[serde(default)]
    pub add_on_fees: AddOnFees,

    /// Distance-based subsidy. `None` disables subsidies.
    #[serde(default)]
    pub subsidy: Option<DistanceSubsidy>,
}

fn default_platform_fee_bps() -> u32 {
    1000
}
fn default_reward_bps() -> u32 {
    100
}

impl Default for FareSettings {
    fn default() -> Self {
        FareSettings {
            platform_fee_bps: default_platform_fee_bps(),
            reward_bps: default_reward_bps(),
            add_on_fees: AddOnFees::default(),
            subsidy: None,
        }
    }
}

// =============================================================================
// Credential
// =============================================================================

/// Rotating QR credential settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSettings {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Length of the near-expiry phase at the end of the window.
    #[serde(default = "default_near_expiry_secs")]
    pub near_expiry_secs: u64,

    /// HMAC key shared by passenger and conductor devices.
    #[serde(default = "default_signing_key")]
    pub signing_key: String,
}

fn default_window_secs() -> u64 {
    300
}
fn default_near_expiry_secs() -> u64 {
    30
}
fn default_signing_key() -> String {
    "villagelink-dev-signing-key".to_string()
}

impl Default for CredentialSettings {
    fn default() -> Self {
        CredentialSettings {
            window_secs: default_window_secs(),
            near_expiry_secs: default_near_expiry_secs(),
            signing_key: default_signing_key(),
        }
    }
}

// =============================================================================
// Offline Queue
// =============================================================================

/// Offline queue replay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Record kinds whose cash bookings may be queued while offline.
    #[serde(default = "default_offline_kinds")]
    pub offline_kinds: Vec<RecordKind>,

    /// Failed replays before an entry is parked.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_offline_kinds() -> Vec<RecordKind> {
    vec![RecordKind::Ticket]
}
fn default_max_attempts() -> u32 {
    8
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            offline_kinds: default_offline_kinds(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Payment
// =============================================================================

/// Online payment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSettings {
    /// How long the foreground waits for the gateway.
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,

    /// How long an unclaimed provisional order id stays reserved.
    #[serde(default = "default_reservation_ttl")]
    pub reservation_ttl_secs: u64,
}

fn default_gateway_timeout() -> u64 {
    30
}
fn default_reservation_ttl() -> u64 {
    900
}

impl Default for PaymentSettings {
    fn default() -> Self {
        PaymentSettings {
            gateway_timeout_secs: default_gateway_timeout(),
            reservation_ttl_secs: default_reservation_ttl(),
        }
    }
}

// =============================================================================
// Validation & Polling
// =============================================================================

/// Conductor-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Accept hand-typed codes in addition to scanned payloads.
    #[serde(default = "default_true")]
    pub allow_manual_entry: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ValidationSettings {
    fn default() -> Self {
        ValidationSettings {
            allow_manual_entry: true,
        }
    }
}

/// Read-side refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    15
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            interval_secs: default_poll_interval(),
        }
    }
}

// =============================================================================
// Main Booking Configuration
// =============================================================================

/// Complete booking engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub fares: FareSettings,

    #[serde(default)]
    pub credential: CredentialSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub payment: PaymentSettings,

    #[serde(default)]
    pub validation: ValidationSettings,

    #[serde(default)]
    pub poll: PollSettings,
}

impl BookingConfig {
    /// Creates a config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (booking.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> BookingResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading booking config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load booking config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> BookingResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| BookingError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Booking config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> BookingResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(BookingError::Config("device.id must not be empty".into()));
        }

        validate_bps("fares.platform_fee_bps", self.fares.platform_fee_bps)?;
        validate_bps("fares.reward_bps", self.fares.reward_bps)?;

        if self.credential.window_secs == 0 {
            return Err(BookingError::Config(
                "credential.window_secs must be greater than 0".into(),
            ));
        }
        if self.credential.near_expiry_secs >= self.credential.window_secs {
            return Err(BookingError::Config(
                "credential.near_expiry_secs must be shorter than the window".into(),
            ));
        }
        if self.credential.signing_key.is_empty() {
            return Err(BookingError::Config(
                "credential.signing_key must not be empty".into(),
            ));
        }

        if self.queue.max_attempts == 0 {
            return Err(BookingError::Config(
                "queue.max_attempts must be greater than 0".into(),
            ));
        }
        if self.queue.initial_backoff_ms == 0 {
            return Err(BookingError::Config(
                "queue.initial_backoff_ms must be greater than 0".into(),
            ));
        }

        if self.payment.gateway_timeout_secs == 0 {
            return Err(BookingError::Config(
                "payment.gateway_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.payment.reservation_ttl_secs < self.payment.gateway_timeout_secs {
            return Err(BookingError::Config(
                "payment.reservation_ttl_secs must cover the gateway timeout".into(),
            ));
        }

        if self.poll.interval_secs == 0 {
            return Err(BookingError::Config(
                "poll.interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("VILLAGELINK_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(path) = std::env::var("VILLAGELINK_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.device.database_path = Some(PathBuf::from(path));
        }

        if let Ok(key) = std::env::var("VILLAGELINK_SIGNING_KEY") {
            self.credential.signing_key = key;
        }

        if let Ok(bps) = std::env::var("VILLAGELINK_PLATFORM_FEE_BPS") {
            match bps.parse::<u32>() {
                Ok(b) => self.fares.platform_fee_bps = b,
                Err(_) => warn!(value = %bps, "Ignoring unparseable platform fee"),
            }
        }

        if let Ok(secs) = std::env::var("VILLAGELINK_CREDENTIAL_WINDOW_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.credential.window_secs = s;
            }
        }

        if let Ok(kinds) = std::env::var("VILLAGELINK_OFFLINE_KINDS") {
            let parsed: Vec<RecordKind> = kinds
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .filter_map(|k| {
                    let kind = RecordKind::ALL
                        .into_iter()
                        .find(|c| c.as_str().eq_ignore_ascii_case(k));
                    if kind.is_none() {
                        warn!(kind = %k, "Unknown record kind in environment");
                    }
                    kind
                })
                .collect();
            debug!(?parsed, "Overriding offline kinds from environment");
            self.queue.offline_kinds = parsed;
        }

        if let Ok(flag) = std::env::var("VILLAGELINK_MANUAL_ENTRY") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.validation.allow_manual_entry = true,
                "0" | "false" | "no" => self.validation.allow_manual_entry = false,
                _ => warn!(value = %flag, "Unknown manual entry flag in environment"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "villagelink", "app")
            .map(|dirs| dirs.config_dir().join("booking.toml"))
    }

    /// Returns the database path, falling back to the platform data directory.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.device.database_path.clone().or_else(|| {
            directories::ProjectDirs::from("com", "villagelink", "app")
                .map(|dirs| dirs.data_dir().join("booking.db"))
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn platform_fee(&self) -> Bps {
        Bps::new(self.fares.platform_fee_bps)
    }

    pub fn reward_rate(&self) -> Bps {
        Bps::new(self.fares.reward_bps)
    }

    pub fn credential_window(&self) -> CredentialWindow {
        CredentialWindow::from_secs(self.credential.window_secs, self.credential.near_expiry_secs)
    }

    /// Whether cash bookings of `kind` may be queued while offline.
    pub fn is_queueable(&self, kind: RecordKind) -> bool {
        self.queue.offline_kinds.contains(&kind)
    }

    /// The subsidy policy described by `[fares.subsidy]`.
    pub fn subsidy_policy(&self) -> Arc<dyn SubsidyPolicy> {
        match &self.fares.subsidy {
            Some(subsidy) => Arc::new(subsidy.clone()),
            None => Arc::new(NoSubsidy),
        }
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.payment.gateway_timeout_secs)
    }

    pub fn reservation_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.payment.reservation_ttl_secs as i64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.queue.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.queue.max_backoff_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use villagelink_core::Money;

    #[test]
    fn test_default_config() {
        let config = BookingConfig::default();
        assert!(!config.device.id.is_empty());
        assert_eq!(config.credential.window_secs, 300);
        assert_eq!(config.credential.near_expiry_secs, 30);
        assert!(config.is_queueable(RecordKind::Ticket));
        assert!(!config.is_queueable(RecordKind::Rental));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = BookingConfig::default();

        config.fares.platform_fee_bps = 10_001;
        assert!(config.validate().is_err());
        config.fares.platform_fee_bps = 1000;

        config.credential.near_expiry_secs = 300;
        assert!(config.validate().is_err());
        config.credential.near_expiry_secs = 30;

        config.queue.max_attempts = 0;
        assert!(config.validate().is_err());
        config.queue.max_attempts = 3;

        config.payment.reservation_ttl_secs = 5;
        assert!(config.validate().is_err());
        config.payment.reservation_ttl_secs = 900;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BookingConfig = toml::from_str(
            r#"
            [device]
            id = "bus-17"

            [fares.add_on_fees]
            insurance = 100

            [queue]
            offline_kinds = ["ticket", "parcel"]
            "#,
        )
        .unwrap();

        assert_eq!(config.device.id, "bus-17");
        assert_eq!(config.fares.add_on_fees.insurance, Money::from_paise(100));
        assert_eq!(config.fares.platform_fee_bps, 1000);
        assert!(config.is_queueable(RecordKind::Parcel));
        assert_eq!(config.queue.max_attempts, 8);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = BookingConfig::default();
        config.device.id = "bus-17".into();
        config.fares.subsidy = Some(DistanceSubsidy {
            min_distance_m: 5_000,
            amount: Money::from_rupees(5),
            active_hours_utc: None,
        });

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: BookingConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.device.id, "bus-17");
        assert_eq!(parsed.fares.subsidy, config.fares.subsidy);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("villagelink-{}.toml", Uuid::new_v4()));
        let mut config = BookingConfig::default();
        config.device.id = "conductor-3".into();
        config.validation.allow_manual_entry = false;
        config.save(Some(path.clone())).unwrap();

        let loaded = BookingConfig::load(Some(path.clone())).unwrap();
        assert!(!loaded.validation.allow_manual_entry);
        let _ = std::fs::remove_file(path);
    }
}
