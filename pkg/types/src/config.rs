use serde::{Deserialize, Serialize};

/// Server configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// port: 7443
/// data-dir: /var/lib/leasehold/data
/// token: my-secret-token
/// max-concurrent-leases: 3
/// max-creations-per-hour: 10
/// base-lifetime: 2h
/// max-extension: 2h
/// gc-interval: 2m
/// provider:
///   kind: local
///   regions: [ams, fra]
///   retry-attempts: 5
///   retry-backoff: 5s
/// notifier:
///   attachments-dir: /var/lib/leasehold/logs
/// ```
///
/// Durations use the `1h30m10s` syntax; `base-lifetime: 0s` disables expiry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfigFile {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, alias = "data-dir")]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, alias = "ephemeral-store")]
    pub ephemeral_store: Option<bool>,
    #[serde(default, alias = "max-concurrent-leases")]
    pub max_concurrent_leases: Option<u32>,
    #[serde(default, alias = "max-creations-per-hour")]
    pub max_creations_per_hour: Option<u32>,
    #[serde(default, alias = "base-lifetime")]
    pub base_lifetime: Option<String>,
    #[serde(default, alias = "max-extension")]
    pub max_extension: Option<String>,
    #[serde(default, alias = "gc-interval")]
    pub gc_interval: Option<String>,
    #[serde(default)]
    pub provider: ProviderConfigFile,
    #[serde(default)]
    pub notifier: Option<NotifierConfigFile>,
}

/// `provider:` section of the server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfigFile {
    /// Provider implementation. Only `local` ships in-tree.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default, alias = "boot-delay")]
    pub boot_delay: Option<String>,
    #[serde(default, alias = "retry-attempts")]
    pub retry_attempts: Option<u32>,
    #[serde(default, alias = "retry-backoff")]
    pub retry_backoff: Option<String>,
}

/// `notifier:` section of the server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifierConfigFile {
    /// Directory where deletion log archives are written.
    #[serde(default, alias = "attachments-dir")]
    pub attachments_dir: Option<String>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to read config {}: {}", path, e)),
    };
    let config: T = serde_yaml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path, e))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kebab_case_keys() {
        let yaml = r#"
port: 8000
max-concurrent-leases: 4
max-creations-per-hour: 12
base-lifetime: 2h
ephemeral-store: true
provider:
  kind: local
  regions: [ams, fra]
  retry-attempts: 3
notifier:
  attachments-dir: /tmp/logs
"#;
        let cfg: ServerConfigFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.port, Some(8000));
        assert_eq!(cfg.max_concurrent_leases, Some(4));
        assert_eq!(cfg.max_creations_per_hour, Some(12));
        assert_eq!(cfg.base_lifetime.as_deref(), Some("2h"));
        assert_eq!(cfg.ephemeral_store, Some(true));
        assert_eq!(cfg.provider.regions, vec!["ams", "fra"]);
        assert_eq!(cfg.provider.retry_attempts, Some(3));
        assert_eq!(
            cfg.notifier.and_then(|n| n.attachments_dir).as_deref(),
            Some("/tmp/logs")
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg: ServerConfigFile =
            load_config_file("/nonexistent/leasehold/config.yaml").unwrap();
        assert!(cfg.port.is_none());
        assert!(cfg.notifier.is_none());
    }
}
