use pkg_constants::lease::{
    DEFAULT_BASE_LIFETIME_SECS, DEFAULT_GC_INTERVAL_SECS, DEFAULT_MAX_CONCURRENT_LEASES,
    DEFAULT_MAX_CREATIONS_PER_HOUR, DEFAULT_MAX_EXTENSION_SECS,
};
use pkg_types::config::ServerConfigFile;
use pkg_types::validate::parse_duration;
use std::time::Duration;

/// Process-wide engine limits. Read once at startup, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_concurrent_leases: u32,
    /// 0 = unlimited.
    pub max_creations_per_hour: u32,
    /// 0 = leases never expire.
    pub base_lifetime: Duration,
    pub max_extension: Duration,
    pub gc_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_leases: DEFAULT_MAX_CONCURRENT_LEASES,
            max_creations_per_hour: DEFAULT_MAX_CREATIONS_PER_HOUR,
            base_lifetime: Duration::from_secs(DEFAULT_BASE_LIFETIME_SECS),
            max_extension: Duration::from_secs(DEFAULT_MAX_EXTENSION_SECS),
            gc_interval: Duration::from_secs(DEFAULT_GC_INTERVAL_SECS),
        }
    }
}

impl EngineConfig {
    /// Build from the config file, falling back to defaults for absent keys.
    pub fn from_file(file: &ServerConfigFile) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let duration_or = |raw: &Option<String>, key: &str, default: Duration| match raw {
            Some(raw) => parse_duration(raw).map_err(|e| anyhow::anyhow!("{}: {}", key, e)),
            None => Ok(default),
        };

        let config = Self {
            max_concurrent_leases: file
                .max_concurrent_leases
                .unwrap_or(defaults.max_concurrent_leases),
            max_creations_per_hour: file
                .max_creations_per_hour
                .unwrap_or(defaults.max_creations_per_hour),
            base_lifetime: duration_or(&file.base_lifetime, "base-lifetime", defaults.base_lifetime)?,
            max_extension: duration_or(&file.max_extension, "max-extension", defaults.max_extension)?,
            gc_interval: duration_or(&file.gc_interval, "gc-interval", defaults.gc_interval)?,
        };
        if config.gc_interval.is_zero() {
            anyhow::bail!("gc-interval must be positive");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_is_empty() {
        let cfg = EngineConfig::from_file(&ServerConfigFile::default()).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.base_lifetime, Duration::from_secs(7200));
        assert_eq!(cfg.gc_interval, Duration::from_secs(120));
    }

    #[test]
    fn file_values_override_defaults() {
        let file = ServerConfigFile {
            max_concurrent_leases: Some(3),
            max_creations_per_hour: Some(10),
            base_lifetime: Some("0s".to_string()),
            max_extension: Some("1h30m".to_string()),
            ..Default::default()
        };
        let cfg = EngineConfig::from_file(&file).unwrap();
        assert_eq!(cfg.max_concurrent_leases, 3);
        assert_eq!(cfg.max_creations_per_hour, 10);
        assert!(cfg.base_lifetime.is_zero());
        assert_eq!(cfg.max_extension, Duration::from_secs(5400));
    }

    #[test]
    fn rejects_bad_durations() {
        let file = ServerConfigFile {
            gc_interval: Some("0s".to_string()),
            ..Default::default()
        };
        assert!(EngineConfig::from_file(&file).is_err());

        let file = ServerConfigFile {
            base_lifetime: Some("two hours".to_string()),
            ..Default::default()
        };
        let err = EngineConfig::from_file(&file).unwrap_err().to_string();
        assert!(err.starts_with("base-lifetime"));
    }
}
