//! Application configuration loaded from environment variables.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// Wrapped SOL mint.
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
/// USDC mint.
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
/// USDT mint.
pub const USDT_MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Monitoring ===
    /// Instruments to watch, in scan order (comma separated).
    #[serde(
        default = "default_instruments",
        deserialize_with = "comma_separated"
    )]
    pub monitored_instruments: Vec<String>,

    /// Venues to poll, in scan order (comma separated).
    #[serde(default = "default_venues", deserialize_with = "comma_separated")]
    pub venues: Vec<String>,

    /// Seconds between successful polls of one venue.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: f64,

    /// Milliseconds between scan cycles.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,

    /// Quotes older than this are ignored by the scanner.
    #[serde(default = "default_staleness")]
    pub price_staleness_seconds: u64,

    /// History ring capacity per (venue, pair).
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    // === Feed health ===
    /// Consecutive failures before a venue's circuit opens.
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,

    /// Seconds a venue stays suspended once its circuit opens.
    #[serde(default = "default_circuit_cooldown")]
    pub circuit_cooldown_seconds: u64,

    /// Upper bound on failure backoff.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_seconds: u64,

    /// Deadline for a single venue poll.
    #[serde(default = "default_venue_timeout")]
    pub venue_timeout_ms: u64,

    /// Outbound request rate per venue.
    #[serde(default = "default_requests_per_second")]
    pub venue_requests_per_second: u32,

    // === Trading Parameters ===
    /// Minimum spread, in percent, worth acting on.
    #[serde(default = "default_min_profit")]
    pub min_profit_threshold_pct: Decimal,

    /// Slippage tolerance per hop in basis points (0-1000).
    #[serde(default = "default_slippage")]
    pub max_slippage_bps: u16,

    /// Largest position, in instrument units.
    #[serde(default = "default_max_position")]
    pub max_position_size: Decimal,

    /// Position size as a multiple of estimated profit.
    #[serde(default = "default_sizing_multiple")]
    pub sizing_multiple: Decimal,

    /// Decimal places of an instrument's base unit.
    #[serde(default = "default_decimals")]
    pub instrument_decimals: u32,

    /// Pipelines allowed in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_executions: usize,

    /// Deadline for a single backend submission.
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_ms: u64,

    // === Operation Modes ===
    /// Simulation mode (no real orders).
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Settlement backend endpoint for live mode.
    #[serde(default)]
    pub settlement_url: Option<String>,

    /// Optional Redis URL for the shared price cache.
    #[serde(default)]
    pub redis_url: Option<String>,

    // === Venue endpoints ===
    /// Jupiter quote API base URL.
    #[serde(default = "default_jupiter_url")]
    pub jupiter_api_url: String,

    /// Raydium API base URL.
    #[serde(default = "default_raydium_url")]
    pub raydium_api_url: String,

    /// Meteora API base URL.
    #[serde(default = "default_meteora_url")]
    pub meteora_api_url: String,

    // === Server Configuration ===
    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Log output format: "text" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn comma_separated<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(split_list(&raw))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_instruments() -> Vec<String> {
    vec![
        SOL_MINT.to_string(),
        USDC_MINT.to_string(),
        USDT_MINT.to_string(),
    ]
}

fn default_venues() -> Vec<String> {
    vec![
        "jupiter".to_string(),
        "raydium".to_string(),
        "meteora".to_string(),
    ]
}

fn default_poll_interval() -> f64 {
    0.1
}

fn default_scan_interval() -> u64 {
    100
}

fn default_staleness() -> u64 {
    10
}

fn default_history_capacity() -> usize {
    100
}

fn default_max_failures() -> u32 {
    5
}

fn default_circuit_cooldown() -> u64 {
    30
}

fn default_max_backoff() -> u64 {
    30
}

fn default_venue_timeout() -> u64 {
    5000
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_min_profit() -> Decimal {
    Decimal::new(5, 1) // 0.5%
}

fn default_slippage() -> u16 {
    50
}

fn default_max_position() -> Decimal {
    Decimal::ONE
}

fn default_sizing_multiple() -> Decimal {
    Decimal::TEN
}

fn default_decimals() -> u32 {
    9
}

fn default_max_concurrent() -> usize {
    5
}

fn default_submit_timeout() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_jupiter_url() -> String {
    "https://quote-api.jup.ag/v6".to_string()
}

fn default_raydium_url() -> String {
    "https://api.raydium.io/v2".to_string()
}

fn default_meteora_url() -> String {
    "https://dlmm-api.meteora.ag".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitored_instruments: default_instruments(),
            venues: default_venues(),
            poll_interval_seconds: default_poll_interval(),
            scan_interval_ms: default_scan_interval(),
            price_staleness_seconds: default_staleness(),
            history_capacity: default_history_capacity(),
            max_consecutive_failures: default_max_failures(),
            circuit_cooldown_seconds: default_circuit_cooldown(),
            max_backoff_seconds: default_max_backoff(),
            venue_timeout_ms: default_venue_timeout(),
            venue_requests_per_second: default_requests_per_second(),
            min_profit_threshold_pct: default_min_profit(),
            max_slippage_bps: default_slippage(),
            max_position_size: default_max_position(),
            sizing_multiple: default_sizing_multiple(),
            instrument_decimals: default_decimals(),
            max_concurrent_executions: default_max_concurrent(),
            submit_timeout_ms: default_submit_timeout(),
            dry_run: true,
            settlement_url: None,
            redis_url: None,
            jupiter_api_url: default_jupiter_url(),
            raydium_api_url: default_raydium_url(),
            meteora_api_url: default_meteora_url(),
            port: default_port(),
            rust_log: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitored_instruments.len() < 2 {
            return Err(ConfigError::new(
                "MONITORED_INSTRUMENTS",
                "at least two instruments are required",
            ));
        }

        for (i, instrument) in self.monitored_instruments.iter().enumerate() {
            if instrument.contains('-') {
                return Err(ConfigError::new(
                    "MONITORED_INSTRUMENTS",
                    format!("{instrument} contains the pair separator '-'"),
                ));
            }
            if self.monitored_instruments[..i].contains(instrument) {
                return Err(ConfigError::new(
                    "MONITORED_INSTRUMENTS",
                    format!("{instrument} is listed twice"),
                ));
            }
        }

        if self.venues.is_empty() {
            return Err(ConfigError::new("VENUES", "at least one venue is required"));
        }

        if self.max_slippage_bps > 1000 {
            return Err(ConfigError::new(
                "MAX_SLIPPAGE_BPS",
                "must be between 0 and 1000",
            ));
        }

        if self.max_position_size <= Decimal::ZERO {
            return Err(ConfigError::new("MAX_POSITION_SIZE", "must be positive"));
        }

        if self.sizing_multiple <= Decimal::ZERO {
            return Err(ConfigError::new("SIZING_MULTIPLE", "must be positive"));
        }

        if self.min_profit_threshold_pct < Decimal::ZERO {
            return Err(ConfigError::new(
                "MIN_PROFIT_THRESHOLD_PCT",
                "must not be negative",
            ));
        }

        if self.max_concurrent_executions == 0 {
            return Err(ConfigError::new(
                "MAX_CONCURRENT_EXECUTIONS",
                "must be at least 1",
            ));
        }

        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::new(
                "MAX_CONSECUTIVE_FAILURES",
                "must be at least 1",
            ));
        }

        if !(self.poll_interval_seconds.is_finite() && self.poll_interval_seconds > 0.0) {
            return Err(ConfigError::new(
                "POLL_INTERVAL_SECONDS",
                "must be a positive number",
            ));
        }
        Duration::try_from_secs_f64(self.poll_interval_seconds)
            .map_err(|e| ConfigError::new("POLL_INTERVAL_SECONDS", e.to_string()))?;

        if self.history_capacity == 0 {
            return Err(ConfigError::new("HISTORY_CAPACITY", "must be at least 1"));
        }

        if self.venue_requests_per_second == 0 {
            return Err(ConfigError::new(
                "VENUE_REQUESTS_PER_SECOND",
                "must be at least 1",
            ));
        }

        if self.instrument_decimals > 18 {
            return Err(ConfigError::new("INSTRUMENT_DECIMALS", "must be at most 18"));
        }

        for (field, value) in [
            ("JUPITER_API_URL", &self.jupiter_api_url),
            ("RAYDIUM_API_URL", &self.raydium_api_url),
            ("METEORA_API_URL", &self.meteora_api_url),
        ] {
            url::Url::parse(value).map_err(|e| ConfigError::new(field, e.to_string()))?;
        }

        match (&self.settlement_url, self.dry_run) {
            (Some(settlement), _) => {
                url::Url::parse(settlement)
                    .map_err(|e| ConfigError::new("SETTLEMENT_URL", e.to_string()))?;
            }
            (None, false) => {
                return Err(ConfigError::new(
                    "SETTLEMENT_URL",
                    "is required when DRY_RUN is false",
                ));
            }
            (None, true) => {}
        }

        if !matches!(self.log_format.as_str(), "json" | "text") {
            return Err(ConfigError::new("LOG_FORMAT", "must be \"json\" or \"text\""));
        }

        Ok(())
    }

    /// Successful-poll sleep.
    ///
    /// Falls back to the default when the value is not a representable duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval_seconds)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_poll_interval()))
    }

    /// Scan loop sleep.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    /// Staleness bound applied by the scanner.
    pub fn price_staleness(&self) -> Duration {
        Duration::from_secs(self.price_staleness_seconds)
    }

    /// Circuit breaker cooldown.
    pub fn circuit_cooldown(&self) -> Duration {
        Duration::from_secs(self.circuit_cooldown_seconds)
    }

    /// Venue poll deadline.
    pub fn venue_timeout(&self) -> Duration {
        Duration::from_millis(self.venue_timeout_ms)
    }

    /// Backend submission deadline.
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    /// Check if log output should be JSON.
    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}
