// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Configuration of the RUM event-processing core
#[derive(Debug, Clone, PartialEq)]
pub struct RumConfig {
    /// RUM application id stamped on every record
    pub application_id: String,
    /// Percentage of sessions kept, in [0, 100]
    pub session_sample_rate: f32,
    /// Whether events received without a foreground view open a background view
    pub background_events_tracking: bool,
    /// Whether frustration signals are computed on actions
    pub track_frustrations: bool,
    /// Idle time after which a session expires
    pub session_inactivity: Duration,
    /// Age after which a session is renewed regardless of activity
    pub session_max_duration: Duration,
    /// Idle time after which an action is closed
    pub action_inactivity: Duration,
    /// Age after which an action is closed regardless of activity
    pub action_max_duration: Duration,
    /// Idle time of the monitor after which a keep-alive event is injected
    pub keep_alive: Duration,
    /// Seed for the session sampling draw, for deterministic replays
    pub sampling_seed: Option<u64>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

pub const DEFAULT_SESSION_INACTIVITY: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_SESSION_MAX_DURATION: Duration = Duration::from_secs(4 * 60 * 60);
pub const DEFAULT_ACTION_INACTIVITY: Duration = Duration::from_millis(100);
pub const DEFAULT_ACTION_MAX_DURATION: Duration = Duration::from_secs(5);
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(5 * 60);

impl Default for RumConfig {
    fn default() -> Self {
        Self {
            application_id: String::new(),
            session_sample_rate: 100.0,
            background_events_tracking: false,
            track_frustrations: true,
            session_inactivity: DEFAULT_SESSION_INACTIVITY,
            session_max_duration: DEFAULT_SESSION_MAX_DURATION,
            action_inactivity: DEFAULT_ACTION_INACTIVITY,
            action_max_duration: DEFAULT_ACTION_MAX_DURATION,
            keep_alive: DEFAULT_KEEP_ALIVE,
            sampling_seed: None,
            log_level: "info".to_string(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(None),
    }
}

fn parse_bool_var(name: &'static str, default: bool) -> bool {
    env::var(name)
        .map(|val| match val.trim().to_lowercase().as_str() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => default,
        })
        .unwrap_or(default)
}

impl RumConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let application_id = env::var("DD_RUM_APPLICATION_ID").unwrap_or_default();
        let session_sample_rate = parse_var::<f32>("DD_RUM_SESSION_SAMPLE_RATE")?
            .unwrap_or(defaults.session_sample_rate);
        let background_events_tracking = parse_bool_var(
            "DD_RUM_BACKGROUND_EVENTS",
            defaults.background_events_tracking,
        );
        let track_frustrations =
            parse_bool_var("DD_RUM_TRACK_FRUSTRATIONS", defaults.track_frustrations);
        let session_inactivity = parse_var::<u64>("DD_RUM_SESSION_INACTIVITY_SECS")?
            .map_or(defaults.session_inactivity, Duration::from_secs);
        let session_max_duration = parse_var::<u64>("DD_RUM_SESSION_MAX_DURATION_SECS")?
            .map_or(defaults.session_max_duration, Duration::from_secs);
        let sampling_seed = parse_var::<u64>("DD_RUM_SAMPLING_SEED")?;
        let log_level = env::var("DD_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            application_id,
            session_sample_rate,
            background_events_tracking,
            track_frustrations,
            session_inactivity,
            session_max_duration,
            sampling_seed,
            log_level,
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "DD_RUM_APPLICATION_ID cannot be empty".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.session_sample_rate) {
            return Err(ConfigError::Invalid(format!(
                "Session sample rate {} must be between 0 and 100",
                self.session_sample_rate
            )));
        }

        let timeouts = [
            ("session inactivity", self.session_inactivity),
            ("session max duration", self.session_max_duration),
            ("action inactivity", self.action_inactivity),
            ("action max duration", self.action_max_duration),
            ("keep alive", self.keep_alive),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

/// Converts a duration to nanoseconds, saturating on overflow.
#[must_use]
pub fn duration_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn valid() -> RumConfig {
        RumConfig {
            application_id: "app-id".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_requires_application_id() {
        assert!(RumConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = RumConfig::default();
        assert_eq!(config.session_sample_rate, 100.0);
        assert!(!config.background_events_tracking);
        assert!(config.track_frustrations);
        assert_eq!(config.session_inactivity, Duration::from_secs(900));
        assert_eq!(config.session_max_duration, Duration::from_secs(14_400));
        assert_eq!(config.action_inactivity, Duration::from_millis(100));
        assert_eq!(config.action_max_duration, Duration::from_secs(5));
        assert_eq!(config.keep_alive, Duration::from_secs(300));
    }

    #[test]
    fn test_validate_sample_rate_range() {
        for rate in [-0.1, 100.1, f32::NAN] {
            let config = RumConfig {
                session_sample_rate: rate,
                ..valid()
            };
            assert!(config.validate().is_err(), "rate {rate} should be invalid");
        }
        for rate in [0.0, 42.5, 100.0] {
            let config = RumConfig {
                session_sample_rate: rate,
                ..valid()
            };
            assert!(config.validate().is_ok(), "rate {rate} should be valid");
        }
    }

    #[test]
    fn test_validate_zero_timeouts() {
        let config = RumConfig {
            session_inactivity: Duration::ZERO,
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = RumConfig {
            action_max_duration: Duration::ZERO,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = RumConfig {
            log_level: "verbose".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_nanos() {
        assert_eq!(duration_nanos(Duration::from_millis(100)), 100_000_000);
        assert_eq!(duration_nanos(Duration::MAX), i64::MAX);
    }

    const ENV_VARS: [&str; 8] = [
        "DD_RUM_APPLICATION_ID",
        "DD_RUM_SESSION_SAMPLE_RATE",
        "DD_RUM_BACKGROUND_EVENTS",
        "DD_RUM_TRACK_FRUSTRATIONS",
        "DD_RUM_SESSION_INACTIVITY_SECS",
        "DD_RUM_SESSION_MAX_DURATION_SECS",
        "DD_RUM_SAMPLING_SEED",
        "DD_LOG_LEVEL",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_reads_variables() {
        clear_env();
        env::set_var("DD_RUM_APPLICATION_ID", "from-env");
        env::set_var("DD_RUM_SESSION_SAMPLE_RATE", "25.5");
        env::set_var("DD_RUM_BACKGROUND_EVENTS", "true");
        env::set_var("DD_RUM_TRACK_FRUSTRATIONS", "0");
        env::set_var("DD_RUM_SESSION_INACTIVITY_SECS", "60");
        env::set_var("DD_RUM_SESSION_MAX_DURATION_SECS", "600");
        env::set_var("DD_RUM_SAMPLING_SEED", "42");
        env::set_var("DD_LOG_LEVEL", "DEBUG");

        let config = RumConfig::from_env().unwrap();
        assert_eq!(config.application_id, "from-env");
        assert!((config.session_sample_rate - 25.5).abs() < f32::EPSILON);
        assert!(config.background_events_tracking);
        assert!(!config.track_frustrations);
        assert_eq!(config.session_inactivity, Duration::from_secs(60));
        assert_eq!(config.session_max_duration, Duration::from_secs(600));
        assert_eq!(config.sampling_seed, Some(42));
        assert_eq!(config.log_level, "debug");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unparsable_value() {
        clear_env();
        env::set_var("DD_RUM_APPLICATION_ID", "from-env");
        env::set_var("DD_RUM_SESSION_SAMPLE_RATE", "half");

        let error = RumConfig::from_env().unwrap_err();
        assert_eq!(
            error.to_string(),
            "Invalid value 'half' for DD_RUM_SESSION_SAMPLE_RATE"
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_requires_application_id() {
        clear_env();
        assert!(RumConfig::from_env().is_err());
    }
}
