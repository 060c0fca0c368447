use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::error::Result;

/// Full daemon configuration, mirroring every key group of the wire spec.
///
/// Loaded from `vmca.toml`; any field absent from the file falls back to
/// its documented default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub debugging: DebuggingConfig,
    pub policy: PolicyConfig,
    pub timing: TimingConfig,
    pub concurrency: ConcurrencyConfig,
    pub rpc: RpcConfig,
    pub platform: PlatformConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debugging: DebuggingConfig::default(),
            policy: PolicyConfig::default(),
            timing: TimingConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            rpc: RpcConfig::default(),
            platform: PlatformConfig::default(),
        }
    }
}

impl Config {
    /// Loads config from `path`. A missing file is not an error: it logs a
    /// warning and falls back to `Config::default()`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&text)?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggingConfig {
    /// error | info | debug
    pub debug_level: String,
    pub log_file: Option<String>,
}

impl Default for DebuggingConfig {
    fn default() -> Self {
        Self {
            debug_level: "info".to_string(),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub spare_cpu: f64,
    pub spare_memory: f64,
    pub spare_cpu_pct: f64,
    pub spare_memory_pct: f64,
    pub weight_mem: f64,
    pub weight_cpu: f64,
    pub max_migrations_per_host: u32,
    pub disabled_hosts: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            spare_cpu: 0.0,
            spare_memory: 0.0,
            spare_cpu_pct: 0.0,
            spare_memory_pct: 0.0,
            weight_mem: 1.0,
            weight_cpu: 1.0,
            max_migrations_per_host: 2,
            disabled_hosts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub migration_plan_frequency: u64,
    pub defragger_frequency: u64,
    pub stable_time: u64,
    pub monitorization_validity: u64,
    pub cooldown_migration: u64,
    pub max_migration_time: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            migration_plan_frequency: 10,
            defragger_frequency: 10,
            stable_time: 600,
            monitorization_validity: 10,
            cooldown_migration: 10,
            max_migration_time: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub max_simultaneous_migrations: u32,
    pub enable_migration: bool,
    pub enable_defragger: bool,
    pub consider_vms_stable_on_startup: bool,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_simultaneous_migrations: 1,
            enable_migration: false,
            enable_defragger: true,
            consider_vms_stable_on_startup: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub rpc_host: String,
    pub rpc_port: u16,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            rpc_host: "localhost".to_string(),
            rpc_port: 9999,
        }
    }
}

/// Credentials and lockable id lists for a future real hypervisor adapter.
/// Consumed today only by `FakeDeployment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub locked_templates: Vec<i64>,
    pub locked_users: Vec<i64>,
    pub locked_groups: Vec<i64>,
    pub locked_vms: Vec<i64>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            locked_templates: Vec::new(),
            locked_users: Vec::new(),
            locked_groups: Vec::new(),
            locked_vms: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.concurrency.max_simultaneous_migrations, 1);
        assert_eq!(cfg.policy.max_migrations_per_host, 2);
        assert_eq!(cfg.timing.stable_time, 600);
        assert_eq!(cfg.rpc.rpc_port, 9999);
        assert!(!cfg.concurrency.enable_migration);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/vmca.toml")).unwrap();
        assert_eq!(cfg.rpc.rpc_host, "localhost");
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let text = r#"
            [policy]
            weight_cpu = 2.0
        "#;
        let cfg: Config = toml::from_str(text).unwrap();
        assert_eq!(cfg.policy.weight_cpu, 2.0);
        assert_eq!(cfg.policy.weight_mem, 1.0);
    }
}
