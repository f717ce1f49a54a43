//! Reloader configuration types.
//!
//! Per Iron Lotus Framework: Configuration is validated at load time (Poka-Yoke),
//! with sensible defaults and clear error messages. Every field defaults to the
//! paths of the stock Fluent Bit container image, so an empty file (or no file
//! at all) yields a working setup.

use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ReloadError, Result};

/// Default managed binary.
pub const DEFAULT_BINARY_PATH: &str = "/fluent-bit/bin/fluent-bit";

/// Default configuration file handed to the managed binary.
pub const DEFAULT_CONFIG_PATH: &str = "/fluent-bit/etc/fluent-bit.conf";

/// Default directory watched for configuration changes.
pub const DEFAULT_WATCH_DIR: &str = "/fluent-bit/config";

/// Reloader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloaderConfig {
    /// Path to the managed binary.
    #[serde(default = "default_binary_path")]
    pub binary_path: PathBuf,

    /// Configuration file passed to the binary as `-c <config_path>`.
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Directory watched (non-recursively) for creation events.
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    /// Optional file name a creation event must carry to qualify.
    ///
    /// Unset by default: any creation event qualifies.
    #[serde(default)]
    pub marker: Option<String>,

    /// Restart policy applied after the child exits.
    #[serde(default)]
    pub restart: RestartPolicy,
}

fn default_binary_path() -> PathBuf {
    PathBuf::from(DEFAULT_BINARY_PATH)
}

fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from(DEFAULT_WATCH_DIR)
}

impl Default for ReloaderConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            config_path: default_config_path(),
            watch_dir: default_watch_dir(),
            marker: None,
            restart: RestartPolicy::default(),
        }
    }
}

impl ReloaderConfig {
    /// Creates a configuration for the given binary, config file and watch directory.
    #[must_use]
    pub fn new(
        binary_path: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        watch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            binary_path: binary_path.into(),
            config_path: config_path.into(),
            watch_dir: watch_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the restart policy.
    #[must_use]
    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    /// Sets the marker file name.
    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    /// Arguments passed to the managed binary.
    #[must_use]
    pub fn child_args(&self) -> [&OsStr; 2] {
        [OsStr::new("-c"), self.config_path.as_os_str()]
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.binary_path.as_os_str().is_empty() {
            return Err(ReloadError::config("binary_path cannot be empty"));
        }
        if self.config_path.as_os_str().is_empty() {
            return Err(ReloadError::config("config_path cannot be empty"));
        }
        if self.watch_dir.as_os_str().is_empty() {
            return Err(ReloadError::config("watch_dir cannot be empty"));
        }
        if let Some(marker) = &self.marker {
            if marker.is_empty() || marker.contains('/') {
                return Err(ReloadError::config(
                    "marker must be a bare, non-empty file name",
                ));
            }
        }
        self.restart.validate()
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    /// Returns an error if the text cannot be parsed or fails validation.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ReloadError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReloadError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }
}

// =============================================================================
// RestartPolicy
// =============================================================================

/// Delay policy between a child exit and its relaunch.
///
/// There is no retry limit: the child is always relaunched. `Immediate`
/// relaunches on the very next loop iteration, which spins hard if the
/// binary crash-loops. `Backoff` counts consecutive unintended exits; the
/// count drops back to one once a child has stayed up for `reset_after`, and
/// a config-change kill clears it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Relaunch without delay.
    #[default]
    Immediate,
    /// Capped exponential delay between consecutive failures.
    Backoff(BackoffConfig),
}

impl RestartPolicy {
    /// Returns the delay before the next launch after `failures` consecutive
    /// unintended exits.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        match self {
            Self::Immediate => Duration::ZERO,
            Self::Backoff(config) => config.delay_for(failures),
        }
    }

    /// Returns the failure count after an unintended exit of a child that
    /// ran for `uptime`.
    ///
    /// Under [`RestartPolicy::Backoff`] a child that stayed up for at least
    /// `reset_after` counts as the first failure again.
    #[must_use]
    pub fn next_failures(&self, failures: u32, uptime: Duration) -> u32 {
        match self {
            Self::Backoff(config) if uptime >= config.reset_after => 1,
            _ => failures.saturating_add(1),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Immediate => Ok(()),
            Self::Backoff(config) => config.validate(),
        }
    }
}

/// Backoff configuration for restart delays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    #[serde(default = "default_initial_delay", with = "duration_str")]
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    #[serde(default = "default_max_delay", with = "duration_str")]
    pub max_delay: Duration,
    /// Growth factor per consecutive failure.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Uptime after which a child is considered healthy and the failure
    /// count starts over.
    #[serde(default = "default_reset_after", with = "duration_str")]
    pub reset_after: Duration,
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300) // 5 minutes
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_reset_after() -> Duration {
    Duration::from_secs(600)
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            reset_after: default_reset_after(),
        }
    }
}

impl BackoffConfig {
    /// Creates a new backoff config with builder pattern.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the max delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the healthy uptime that resets the failure count.
    #[must_use]
    pub const fn with_reset_after(mut self, uptime: Duration) -> Self {
        self.reset_after = uptime;
        self
    }

    /// Sets the multiplier.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Calculates delay for the given failure count (exponential backoff).
    ///
    /// Zero failures means no delay.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        // powi saturates to infinity for large exponents.
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    fn validate(&self) -> Result<()> {
        if !(self.multiplier >= 1.0 && self.multiplier.is_finite()) {
            return Err(ReloadError::config(
                "backoff multiplier must be a finite value >= 1.0",
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(ReloadError::config(
                "backoff initial_delay cannot exceed max_delay",
            ));
        }
        Ok(())
    }
}

/// Serde adapter for humantime duration strings ("500ms", "5m").
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults_match_fluent_bit_image() {
        let config = ReloaderConfig::default();
        assert_eq!(config.binary_path, PathBuf::from("/fluent-bit/bin/fluent-bit"));
        assert_eq!(
            config.config_path,
            PathBuf::from("/fluent-bit/etc/fluent-bit.conf")
        );
        assert_eq!(config.watch_dir, PathBuf::from("/fluent-bit/config"));
        assert_eq!(config.restart, RestartPolicy::Immediate);
        assert!(config.marker.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = ReloaderConfig::parse("").unwrap();
        assert_eq!(config, ReloaderConfig::default());
    }

    #[test]
    fn test_child_args() {
        let config = ReloaderConfig::new("/bin/agent", "/etc/agent.conf", "/etc/agent.d");
        assert_eq!(
            config.child_args(),
            [OsStr::new("-c"), OsStr::new("/etc/agent.conf")]
        );
    }

    #[test]
    fn test_parse_backoff_policy() {
        let config = ReloaderConfig::parse(
            r#"
            binary_path = "/opt/agent"
            marker = "..data"

            [restart]
            policy = "backoff"
            initial_delay = "250ms"
            max_delay = "10s"
            multiplier = 3.0
            "#,
        )
        .unwrap();

        assert_eq!(config.binary_path, PathBuf::from("/opt/agent"));
        assert_eq!(config.watch_dir, PathBuf::from(DEFAULT_WATCH_DIR));
        assert_eq!(config.marker.as_deref(), Some("..data"));
        assert_eq!(
            config.restart,
            RestartPolicy::Backoff(BackoffConfig {
                initial_delay: Duration::from_millis(250),
                max_delay: Duration::from_secs(10),
                multiplier: 3.0,
                reset_after: Duration::from_secs(600),
            })
        );
    }

    #[test]
    fn test_backoff_fields_default() {
        let config = ReloaderConfig::parse("[restart]\npolicy = \"backoff\"\n").unwrap();
        assert_eq!(config.restart, RestartPolicy::Backoff(BackoffConfig::default()));
    }

    #[test]
    fn test_validate_rejects_empty_paths() {
        let mut config = ReloaderConfig::default();
        config.binary_path = PathBuf::new();
        assert!(config.validate().is_err());

        let mut config = ReloaderConfig::default();
        config.watch_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_marker() {
        assert!(ReloaderConfig::default().with_marker("").validate().is_err());
        assert!(ReloaderConfig::default().with_marker("a/b").validate().is_err());
        assert!(ReloaderConfig::default().with_marker("..data").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_backoff() {
        let shrinking = BackoffConfig::new().with_multiplier(0.5);
        assert!(
            ReloaderConfig::default()
                .with_restart(RestartPolicy::Backoff(shrinking))
                .validate()
                .is_err()
        );

        let inverted = BackoffConfig::new()
            .with_initial_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(1));
        assert!(
            ReloaderConfig::default()
                .with_restart(RestartPolicy::Backoff(inverted))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_parse_rejects_garbage_duration() {
        let result =
            ReloaderConfig::parse("[restart]\npolicy = \"backoff\"\ninitial_delay = \"soon\"\n");
        assert!(matches!(result, Err(ReloadError::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ReloaderConfig::load("/nonexistent/reloader.toml");
        assert!(matches!(result, Err(ReloadError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reloader.toml");
        std::fs::write(&path, "watch_dir = \"/etc/agent.d\"\n").unwrap();

        let config = ReloaderConfig::load(&path).unwrap();
        assert_eq!(config.watch_dir, PathBuf::from("/etc/agent.d"));
    }

    #[test]
    fn test_immediate_has_no_delay() {
        for failures in [0, 1, 10, u32::MAX] {
            assert_eq!(RestartPolicy::Immediate.delay_for(failures), Duration::ZERO);
        }
    }

    #[test]
    fn test_backoff_delay_growth() {
        let backoff = BackoffConfig::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1));

        assert_eq!(backoff.delay_for(0), Duration::ZERO);
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(10), Duration::from_secs(1));
    }

    #[test]
    fn test_healthy_uptime_resets_failures() {
        let policy = RestartPolicy::Backoff(
            BackoffConfig::new().with_reset_after(Duration::from_secs(60)),
        );
        assert_eq!(policy.next_failures(7, Duration::from_secs(5)), 8);
        assert_eq!(policy.next_failures(7, Duration::from_secs(60)), 1);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));

        assert_eq!(RestartPolicy::Immediate.next_failures(7, Duration::MAX), 8);
        assert_eq!(policy.next_failures(u32::MAX, Duration::ZERO), u32::MAX);
    }

    #[test]
    fn test_parse_reset_after() {
        let config = ReloaderConfig::parse(
            "[restart]\npolicy = \"backoff\"\nreset_after = \"1h\"\n",
        )
        .unwrap();
        match config.restart {
            RestartPolicy::Backoff(backoff) => {
                assert_eq!(backoff.reset_after, Duration::from_secs(3600));
            }
            RestartPolicy::Immediate => panic!("expected backoff"),
        }
    }

    #[test]
    fn test_zero_initial_delay_survives_exponent_overflow() {
        let backoff = BackoffConfig::new()
            .with_initial_delay(Duration::ZERO)
            .with_max_delay(Duration::from_secs(300));
        assert!(backoff.validate().is_ok());

        for failures in [1, 1025, 2000, u32::MAX] {
            assert_eq!(backoff.delay_for(failures), Duration::ZERO);
        }
    }

    #[test]
    fn test_exponent_overflow_clamps_to_max() {
        let backoff = BackoffConfig::new().with_max_delay(Duration::from_secs(300));
        assert_eq!(backoff.delay_for(1025), Duration::from_secs(300));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(300));
    }

    proptest! {
        #[test]
        fn prop_backoff_never_exceeds_max(failures in 0u32..=u32::MAX, max_ms in 1u64..600_000) {
            let backoff = BackoffConfig::new()
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(max_ms));
            prop_assert!(backoff.delay_for(failures) <= Duration::from_millis(max_ms));
        }

        #[test]
        fn prop_backoff_is_monotonic(failures in 0u32..u32::MAX, initial_ms in 0u64..10_000) {
            let backoff = BackoffConfig::new()
                .with_initial_delay(Duration::from_millis(initial_ms))
                .with_max_delay(Duration::from_secs(300));
            prop_assert!(backoff.delay_for(failures) <= backoff.delay_for(failures + 1));
        }

        #[test]
        fn prop_zero_initial_delay_never_waits(failures in 0u32..=u32::MAX) {
            let backoff = BackoffConfig::new()
                .with_initial_delay(Duration::ZERO)
                .with_max_delay(Duration::from_secs(300));
            prop_assert_eq!(backoff.delay_for(failures), Duration::ZERO);
        }
    }
}
