//! Viewer configuration
//!
//! Centralized knobs for the draw thread, scroll coordinator, event pool,
//! bitmap cache and surface. Configuration can be loaded from a JSON file,
//! overridden from environment variables, or created programmatically.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Draw thread settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How long the draw thread waits for a snapshot before re-checking shutdown
    pub poll_interval_ms: u64,
    /// How long the draw call waits for a processed frame before synthesizing one
    pub draw_take_timeout_ms: u64,
    /// Upper bound on a single page decode before a placeholder is used
    pub decode_timeout_ms: u64,
    /// Consecutive faulted iterations that switch the scheduler to degraded mode
    pub max_consecutive_faults: u32,
    /// Leave degraded mode automatically after this quiet period.
    /// `None` keeps it until the surface resets it.
    pub degraded_auto_reset_ms: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            draw_take_timeout_ms: 1,
            decode_timeout_ms: 500,
            max_consecutive_faults: 3,
            degraded_auto_reset_ms: None,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn draw_take_timeout(&self) -> Duration {
        Duration::from_millis(self.draw_take_timeout_ms)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }

    pub fn degraded_auto_reset(&self) -> Option<Duration> {
        self.degraded_auto_reset_ms.map(Duration::from_millis)
    }
}

/// Scroll coordinator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Maximum time the scroll thread sleeps between mailbox checks
    pub poll_interval_ms: u64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 100 }
    }
}

impl ScrollConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Draw event pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of pooled draw event slots
    pub slots: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { slots: 4 }
    }
}

/// Bitmap cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Memory budget for decoded bitmaps in megabytes
    pub memory_limit_mb: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { memory_limit_mb: 128 }
    }
}

impl CacheConfig {
    /// Memory budget in bytes
    pub fn memory_limit(&self) -> usize {
        self.memory_limit_mb * 1024 * 1024
    }
}

/// Surface (view) settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Poll interval of `wait_for_initialization`
    pub init_wait_interval_ms: u64,
    /// Duration of an animated page scroll
    pub page_scroll_duration_ms: u64,
    /// Fling deceleration in pixels per second squared
    pub fling_deceleration: f32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self { init_wait_interval_ms: 1000, page_scroll_duration_ms: 250, fling_deceleration: 2000.0 }
    }
}

impl SurfaceConfig {
    pub fn init_wait_interval(&self) -> Duration {
        Duration::from_millis(self.init_wait_interval_ms)
    }

    pub fn page_scroll_duration(&self) -> Duration {
        Duration::from_millis(self.page_scroll_duration_ms)
    }
}

/// Configuration for the whole viewer core.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub scheduler: SchedulerConfig,
    pub scroll: ScrollConfig,
    pub pool: PoolConfig,
    pub cache: CacheConfig,
    pub surface: SurfaceConfig,
}

impl ViewerConfig {
    /// Sets the number of pooled draw events.
    pub fn with_pool_slots(mut self, slots: usize) -> Self {
        self.pool.slots = slots;
        self
    }

    /// Sets the decode timeout in milliseconds.
    pub fn with_decode_timeout_ms(mut self, ms: u64) -> Self {
        self.scheduler.decode_timeout_ms = ms;
        self
    }

    /// Sets the fault threshold for degraded mode.
    pub fn with_max_consecutive_faults(mut self, faults: u32) -> Self {
        self.scheduler.max_consecutive_faults = faults;
        self
    }

    /// Sets the bitmap cache budget in megabytes.
    pub fn with_cache_mb(mut self, mb: usize) -> Self {
        self.cache.memory_limit_mb = mb;
        self
    }

    /// Returns the default configuration file location for the current platform.
    ///
    /// - macOS: ~/Library/Application Support/leafview/viewer.json
    /// - Linux: ~/.config/leafview/viewer.json
    /// - Windows: %APPDATA%\leafview\viewer.json
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("leafview").join("viewer.json")
        } else {
            PathBuf::from("leafview.json")
        }
    }

    /// Loads the file at [`default_path`](Self::default_path) if it exists,
    /// then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let config = if path.exists() { Self::from_file(&path)? } else { Self::default() };
        config.apply_env()
    }

    /// Loads configuration from environment variables on top of the defaults.
    ///
    /// Environment variables:
    /// - `LEAFVIEW_POOL_SLOTS`: pooled draw events (default: 4)
    /// - `LEAFVIEW_DECODE_TIMEOUT_MS`: decode timeout (default: 500)
    /// - `LEAFVIEW_MAX_CONSECUTIVE_FAULTS`: degraded-mode threshold (default: 3)
    /// - `LEAFVIEW_CACHE_MB`: bitmap cache budget (default: 128)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Applies environment overrides to this configuration.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Some(slots) = env_value::<usize>("LEAFVIEW_POOL_SLOTS")? {
            self.pool.slots = slots;
        }
        if let Some(ms) = env_value::<u64>("LEAFVIEW_DECODE_TIMEOUT_MS")? {
            self.scheduler.decode_timeout_ms = ms;
        }
        if let Some(faults) = env_value::<u32>("LEAFVIEW_MAX_CONSECUTIVE_FAULTS")? {
            self.scheduler.max_consecutive_faults = faults;
        }
        if let Some(mb) = env_value::<usize>("LEAFVIEW_CACHE_MB")? {
            self.cache.memory_limit_mb = mb;
        }
        self.validate()
    }

    /// Loads configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }

    /// Parses configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()
    }

    /// Saves configuration to a JSON file, creating parent directories.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject values the viewer cannot run with
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.pool.slots == 0 {
            return Err(ConfigError::InvalidValue("pool.slots".to_string()));
        }
        if self.scheduler.max_consecutive_faults == 0 {
            return Err(ConfigError::InvalidValue("scheduler.max_consecutive_faults".to_string()));
        }
        let deceleration = self.surface.fling_deceleration;
        if deceleration.is_nan() || deceleration <= 0.0 {
            return Err(ConfigError::InvalidValue("surface.fling_deceleration".to_string()));
        }
        Ok(self)
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ENV_VARS: &[&str] = &[
        "LEAFVIEW_POOL_SLOTS",
        "LEAFVIEW_DECODE_TIMEOUT_MS",
        "LEAFVIEW_MAX_CONSECUTIVE_FAULTS",
        "LEAFVIEW_CACHE_MB",
    ];

    #[test]
    fn test_default_config() {
        let config = ViewerConfig::default();
        assert_eq!(config.pool.slots, 4);
        assert_eq!(config.scheduler.max_consecutive_faults, 3);
        assert_eq!(config.scheduler.degraded_auto_reset(), None);
        assert_eq!(config.scheduler.draw_take_timeout(), Duration::from_millis(1));
        assert_eq!(config.cache.memory_limit(), 128 * 1024 * 1024);
        assert_eq!(config.surface.init_wait_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_builder_methods() {
        let config = ViewerConfig::default()
            .with_pool_slots(8)
            .with_decode_timeout_ms(50)
            .with_max_consecutive_faults(5)
            .with_cache_mb(16);

        assert_eq!(config.pool.slots, 8);
        assert_eq!(config.scheduler.decode_timeout(), Duration::from_millis(50));
        assert_eq!(config.scheduler.max_consecutive_faults, 5);
        assert_eq!(config.cache.memory_limit_mb, 16);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(ENV_VARS);

        env::set_var("LEAFVIEW_POOL_SLOTS", "2");
        env::set_var("LEAFVIEW_DECODE_TIMEOUT_MS", "75");
        env::set_var("LEAFVIEW_MAX_CONSECUTIVE_FAULTS", "6");
        env::set_var("LEAFVIEW_CACHE_MB", "32");

        let config = ViewerConfig::from_env().unwrap();
        assert_eq!(config.pool.slots, 2);
        assert_eq!(config.scheduler.decode_timeout_ms, 75);
        assert_eq!(config.scheduler.max_consecutive_faults, 6);
        assert_eq!(config.cache.memory_limit_mb, 32);
    }

    #[test]
    #[serial]
    fn test_from_env_partial() {
        let _guard = EnvGuard::new(ENV_VARS);

        for name in ENV_VARS {
            env::remove_var(name);
        }
        env::set_var("LEAFVIEW_CACHE_MB", "64");

        let config = ViewerConfig::from_env().unwrap();
        assert_eq!(config.cache.memory_limit_mb, 64);
        assert_eq!(config.pool.slots, 4); // default
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&["LEAFVIEW_POOL_SLOTS"]);

        env::set_var("LEAFVIEW_POOL_SLOTS", "several");
        let result = ViewerConfig::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidValue(key)) if key == "LEAFVIEW_POOL_SLOTS"));
    }

    // Helper to save and restore environment variables
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_from_json_partial() {
        let json = r#"{ "pool": { "slots": 6 }, "scheduler": { "degraded_auto_reset_ms": 2000 } }"#;

        let config = ViewerConfig::from_json(json).unwrap();
        assert_eq!(config.pool.slots, 6);
        assert_eq!(config.scheduler.degraded_auto_reset(), Some(Duration::from_secs(2)));
        assert_eq!(config.scheduler.decode_timeout_ms, 500); // default
    }

    #[test]
    fn test_from_json_rejects_zero_slots() {
        let json = r#"{ "pool": { "slots": 0 } }"#;
        assert!(matches!(ViewerConfig::from_json(json), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(ViewerConfig::from_json("{ pool"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_file_save_and_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("viewer.json");

        let config = ViewerConfig::default().with_pool_slots(3).with_cache_mb(8);
        config.save_to_file(&path).unwrap();

        let loaded = ViewerConfig::from_file(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_from_file_missing() {
        let temp = tempfile::tempdir().unwrap();
        let result = ViewerConfig::from_file(temp.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
