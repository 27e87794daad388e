//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `lumen.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use lumen_app::executor::ExecutorSettings;
use lumen_app::orchestrator::OrchestratorSettings;
use lumen_app::resilience::retry::RetryPolicy;
use lumen_app::timer_manager::TimerSettings;
use lumen_domain::zone::ZoneConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    /// Manual-override duration inputs.
    pub timers: TimersConfig,
    /// Outbound call admission, retries and timeouts.
    pub executor: ExecutorConfig,
    pub orchestrator: OrchestratorConfig,
    /// Alarm-anchor integration.
    pub anchor: AnchorConfig,
    pub zones: Vec<ZoneConfig>,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimersConfig {
    pub day_minutes: f64,
    pub night_minutes: f64,
    pub environmental_boost_factor: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub max_concurrency: usize,
    pub rate_limit_max_events: usize,
    pub rate_limit_window_secs: u64,
    /// Total attempts per outbound call, including the first.
    pub retry_attempts: u32,
    pub retry_backoff_ms: Vec<u64>,
    pub apply_timeout_ms: u64,
    pub manual_flag_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Key of the persisted snapshot.
    pub installation_id: String,
    pub save_debounce_ms: u64,
    pub watchdog_interval_secs: u64,
    pub button_brightness_step: i32,
    pub button_color_temp_step: i32,
    pub transition_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    pub enabled: bool,
}

impl Config {
    /// Load configuration from `lumen.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("lumen.toml")?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("LUMEN_HOST") {
            self.server.host = val;
        }
        if let Some(port) = var("LUMEN_PORT").and_then(|val| val.parse().ok()) {
            self.server.port = port;
        }
        if let Some(val) = var("LUMEN_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Some(val) = var("LUMEN_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = var("LUMEN_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.executor.max_concurrency == 0 {
            return Err(ConfigError::Validation(
                "executor.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.executor.retry_attempts == 0 {
            return Err(ConfigError::Validation(
                "executor.retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.executor.rate_limit_max_events == 0 {
            return Err(ConfigError::Validation(
                "executor.rate_limit_max_events must be at least 1".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for zone in &self.zones {
            if !seen.insert(&zone.id) {
                return Err(ConfigError::Validation(format!(
                    "zone {} is declared twice",
                    zone.id
                )));
            }
            zone.validate()
                .map_err(|err| ConfigError::Validation(format!("zone {}: {err}", zone.id)))?;
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    #[must_use]
    pub fn timer_settings(&self) -> TimerSettings {
        TimerSettings {
            day_minutes: self.timers.day_minutes,
            night_minutes: self.timers.night_minutes,
            environmental_boost_factor: self.timers.environmental_boost_factor,
        }
    }

    #[must_use]
    pub fn executor_settings(&self) -> ExecutorSettings {
        let executor = &self.executor;
        let backoff = if executor.retry_backoff_ms.is_empty() {
            RetryPolicy::default().backoff
        } else {
            executor
                .retry_backoff_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect()
        };
        ExecutorSettings {
            max_concurrency: executor.max_concurrency,
            rate_limit_max_events: executor.rate_limit_max_events,
            rate_limit_window: Duration::from_secs(executor.rate_limit_window_secs),
            retry: RetryPolicy {
                attempts: executor.retry_attempts,
                backoff,
                ..RetryPolicy::default()
            },
            apply_timeout: Duration::from_millis(executor.apply_timeout_ms),
            manual_flag_timeout: Duration::from_millis(executor.manual_flag_timeout_ms),
        }
    }

    #[must_use]
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        let orchestrator = &self.orchestrator;
        OrchestratorSettings {
            save_debounce: Duration::from_millis(orchestrator.save_debounce_ms),
            transition: Duration::from_secs(orchestrator.transition_secs),
            button_brightness_step: orchestrator.button_brightness_step,
            button_color_temp_step: orchestrator.button_color_temp_step,
            anchor_enabled: self.anchor.enabled,
        }
    }

    #[must_use]
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.orchestrator.watchdog_interval_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:lumen.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "lumen=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for TimersConfig {
    fn default() -> Self {
        let settings = TimerSettings::default();
        Self {
            day_minutes: settings.day_minutes,
            night_minutes: settings.night_minutes,
            environmental_boost_factor: settings.environmental_boost_factor,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            rate_limit_max_events: 60,
            rate_limit_window_secs: 60,
            retry_attempts: 3,
            retry_backoff_ms: vec![500, 1000],
            apply_timeout_ms: 5000,
            manual_flag_timeout_ms: 2000,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            installation_id: "default".to_string(),
            save_debounce_ms: 500,
            watchdog_interval_secs: 300,
            button_brightness_step: 10,
            button_color_temp_step: 500,
            transition_secs: 1,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.url, "sqlite:lumen.db?mode=rwc");
        assert_eq!(config.orchestrator.installation_id, "default");
        assert!(!config.anchor.enabled);
        assert!(config.zones.is_empty());
    }

    #[test]
    fn should_match_runtime_defaults_when_file_is_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.timer_settings(), TimerSettings::default());
        assert_eq!(config.executor_settings().retry, RetryPolicy::default());
        assert_eq!(config.orchestrator_settings(), OrchestratorSettings::default());
        assert_eq!(config.watchdog_interval(), Duration::from_secs(300));
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [server]
            host = '127.0.0.1'
            port = 9090

            [database]
            url = 'sqlite:test.db'

            [logging]
            filter = 'debug'

            [timers]
            day_minutes = 30.0
            night_minutes = 90.0
            environmental_boost_factor = 2.0

            [executor]
            max_concurrency = 2
            retry_attempts = 5
            retry_backoff_ms = [100, 200, 400]
            apply_timeout_ms = 1500

            [orchestrator]
            installation_id = 'home'
            save_debounce_ms = 250
            button_brightness_step = 5

            [anchor]
            enabled = true

            [[zones]]
            id = 'office'
            controller = 'switch.office'
            lights = ['light.desk', 'light.ceiling']
            multiplier = 1.5
            environmental_boost = true

            [[zones]]
            id = 'bedroom'
            controller = 'switch.bedroom'
            enabled = false
            sunrise_offset_minutes = -15
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:9090");
        assert_eq!(config.database_url(), "sqlite:test.db");
        assert_eq!(config.logging.filter, "debug");
        assert!((config.timer_settings().day_minutes - 30.0).abs() < f64::EPSILON);

        let executor = config.executor_settings();
        assert_eq!(executor.max_concurrency, 2);
        assert_eq!(executor.retry.attempts, 5);
        assert_eq!(executor.retry.backoff.len(), 3);
        assert_eq!(executor.apply_timeout, Duration::from_millis(1500));
        assert_eq!(executor.manual_flag_timeout, Duration::from_secs(2));

        let orchestrator = config.orchestrator_settings();
        assert_eq!(config.orchestrator.installation_id, "home");
        assert_eq!(orchestrator.save_debounce, Duration::from_millis(250));
        assert_eq!(orchestrator.button_brightness_step, 5);
        assert!(orchestrator.anchor_enabled);

        assert_eq!(config.zones.len(), 2);
        assert_eq!(config.zones[0].lights.len(), 2);
        assert!(config.zones[0].environmental_boost);
        assert!(config.zones[0].enabled);
        assert!(!config.zones[1].enabled);
        assert_eq!(config.zones[1].sunrise_offset_minutes, -15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn should_report_parse_error_when_toml_is_invalid() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }

    #[test]
    fn should_report_parse_error_when_zone_id_is_empty() {
        let toml = "
            [[zones]]
            id = ''
            controller = 'switch.office'
        ";
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn should_reject_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_executor_limits_when_zero() {
        let mut config = Config::default();
        config.executor.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.executor.retry_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.executor.rate_limit_max_events = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zones_when_declared_twice() {
        let toml = "
            [[zones]]
            id = 'office'
            controller = 'switch.office'

            [[zones]]
            id = 'office'
            controller = 'switch.other'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("office"));
    }

    #[test]
    fn should_reject_zone_when_multiplier_is_negative() {
        let toml = "
            [[zones]]
            id = 'office'
            controller = 'switch.office'
            multiplier = -1.0
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_override_bind_address_when_env_is_set() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[("LUMEN_BIND", "127.0.0.1:8080")]));
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn should_ignore_port_override_when_not_a_number() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[("LUMEN_PORT", "http")]));
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn should_prefer_rust_log_when_both_filters_are_set() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[
            ("LUMEN_LOG", "lumen=debug"),
            ("RUST_LOG", "trace"),
            ("LUMEN_DATABASE_URL", "sqlite::memory:"),
        ]));
        assert_eq!(config.logging.filter, "trace");
        assert_eq!(config.database_url(), "sqlite::memory:");
    }
}
