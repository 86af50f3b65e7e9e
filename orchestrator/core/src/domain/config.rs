// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Engine Configuration Types
//
// Defines the configuration schema for a KAiro engine instance:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Resource pool limits
// - Scheduler dispatch and health penalties
// - Classifier thresholds and health discounts
// - Health window thresholds
// - Per-complexity resource budgets

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::classifier::{ClassifierConfig, Complexity};
use crate::domain::health::HealthThresholds;
use crate::domain::resource_pool::PoolLimits;
use crate::domain::task::ResourceRequirement;

pub const API_VERSION: &str = "kairo.dev/v1";
pub const KIND: &str = "EngineConfig";

/// Top-level Kubernetes-style engine configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfigManifest {
    /// API version (must be "kairo.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "EngineConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: EngineConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Engine configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfigSpec {
    #[serde(default)]
    pub pool: PoolLimits,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub health: HealthThresholds,

    #[serde(default)]
    pub budgets: ResourceBudgets,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fallback tick for the dispatch loop. Submissions and releases also
    /// wake the loop directly.
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,

    /// Priority points subtracted at submission for a Degraded agent
    #[serde(default = "default_degraded_priority_penalty")]
    pub degraded_priority_penalty: u8,

    /// Priority points subtracted at submission for a Failing agent
    #[serde(default = "default_failing_priority_penalty")]
    pub failing_priority_penalty: u8,

    /// Capacity of the engine event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: default_dispatch_interval_ms(),
            degraded_priority_penalty: default_degraded_priority_penalty(),
            failing_priority_penalty: default_failing_priority_penalty(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Resource requirement attached to a task by its classified complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBudgets {
    #[serde(default = "default_low_budget")]
    pub low: ResourceRequirement,
    #[serde(default = "default_medium_budget")]
    pub medium: ResourceRequirement,
    #[serde(default = "default_high_budget")]
    pub high: ResourceRequirement,
}

impl ResourceBudgets {
    pub fn for_complexity(&self, complexity: Complexity) -> ResourceRequirement {
        match complexity {
            Complexity::Low => self.low,
            Complexity::Medium => self.medium,
            Complexity::High => self.high,
        }
    }
}

impl Default for ResourceBudgets {
    fn default() -> Self {
        Self {
            low: default_low_budget(),
            medium: default_medium_budget(),
            high: default_high_budget(),
        }
    }
}

const MIB: u64 = 1024 * 1024;

fn default_low_budget() -> ResourceRequirement {
    ResourceRequirement::new(64 * MIB, 10)
}

fn default_medium_budget() -> ResourceRequirement {
    ResourceRequirement::new(256 * MIB, 25)
}

fn default_high_budget() -> ResourceRequirement {
    ResourceRequirement::new(512 * MIB, 50)
}

fn default_dispatch_interval_ms() -> u64 {
    50
}

fn default_degraded_priority_penalty() -> u8 {
    1
}

fn default_failing_priority_penalty() -> u8 {
    2
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for EngineConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "kairo-engine".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: EngineConfigSpec::default(),
        }
    }
}

impl EngineConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. KAIRO_CONFIG_PATH environment variable
    /// 2. ./kairo-config.yaml (working directory)
    /// 3. ~/.kairo/config.yaml (user home)
    /// 4. /etc/kairo/config.yaml (system, Unix) or C:\ProgramData\Kairo\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|p| p.exists())
    }

    /// Every location `discover_config` checks, in order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(path) = std::env::var("KAIRO_CONFIG_PATH") {
            paths.push(PathBuf::from(path));
        }

        paths.push(PathBuf::from("./kairo-config.yaml"));

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".kairo").join("config.yaml"));
        }

        #[cfg(unix)]
        paths.push(PathBuf::from("/etc/kairo/config.yaml"));
        #[cfg(windows)]
        paths.push(PathBuf::from("C:\\ProgramData\\Kairo\\config.yaml"));

        paths
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("KAIRO_MAX_CONCURRENT_TASKS") {
            match val.trim().parse::<u32>() {
                Ok(n) => {
                    tracing::info!("Environment override: KAIRO_MAX_CONCURRENT_TASKS={}", n);
                    self.spec.pool.max_concurrent_tasks = n;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for KAIRO_MAX_CONCURRENT_TASKS: '{}'. Expected an integer. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("KAIRO_DISPATCH_INTERVAL_MS") {
            match val.trim().parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Environment override: KAIRO_DISPATCH_INTERVAL_MS={}", ms);
                    self.spec.scheduler.dispatch_interval_ms = ms;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for KAIRO_DISPATCH_INTERVAL_MS: '{}'. Expected milliseconds. Ignoring.",
                    val
                ),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let pool = &self.spec.pool;
        if pool.max_concurrent_tasks == 0 {
            anyhow::bail!("spec.pool.max_concurrent_tasks must be at least 1");
        }
        if pool.max_cpu_percent == 0 || pool.max_memory_bytes == 0 {
            anyhow::bail!("spec.pool limits must be greater than zero");
        }

        for (name, budget) in [
            ("low", self.spec.budgets.low),
            ("medium", self.spec.budgets.medium),
            ("high", self.spec.budgets.high),
        ] {
            if !pool.can_ever_fit(&budget) {
                anyhow::bail!(
                    "spec.budgets.{} ({} bytes, {}% cpu) exceeds pool limits ({} bytes, {}% cpu)",
                    name,
                    budget.memory_bytes,
                    budget.cpu_percent,
                    pool.max_memory_bytes,
                    pool.max_cpu_percent
                );
            }
        }

        if self.spec.scheduler.dispatch_interval_ms == 0 {
            anyhow::bail!("spec.scheduler.dispatch_interval_ms must be greater than zero");
        }
        if self.spec.scheduler.event_capacity == 0 {
            anyhow::bail!("spec.scheduler.event_capacity must be greater than zero");
        }

        let classifier = &self.spec.classifier;
        for (name, discount) in [
            ("degraded_discount", classifier.degraded_discount),
            ("failing_discount", classifier.failing_discount),
        ] {
            if !(discount > 0.0 && discount <= 1.0) {
                anyhow::bail!("spec.classifier.{} must be in (0, 1], got {}", name, discount);
            }
        }
        if classifier.admission_threshold < 0.0 {
            anyhow::bail!("spec.classifier.admission_threshold cannot be negative");
        }
        if classifier.decisive_threshold < classifier.admission_threshold {
            anyhow::bail!(
                "spec.classifier.decisive_threshold ({}) must not be below admission_threshold ({})",
                classifier.decisive_threshold,
                classifier.admission_threshold
            );
        }
        if classifier.fallback_confidence > 100 {
            anyhow::bail!("spec.classifier.fallback_confidence must be at most 100");
        }

        let health = &self.spec.health;
        if health.window_size == 0 {
            anyhow::bail!("spec.health.window_size must be at least 1");
        }
        if health.min_observations > health.window_size {
            anyhow::bail!(
                "spec.health.min_observations ({}) cannot exceed window_size ({})",
                health.min_observations,
                health.window_size
            );
        }
        if health.failing_success_rate > health.degraded_success_rate {
            anyhow::bail!("spec.health.failing_success_rate cannot exceed degraded_success_rate");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentKind;

    #[test]
    fn test_default_manifest() {
        let manifest = EngineConfigManifest::default();
        assert_eq!(manifest.api_version, "kairo.dev/v1");
        assert_eq!(manifest.kind, "EngineConfig");
        assert_eq!(manifest.spec.pool.max_concurrent_tasks, 4);
        assert_eq!(manifest.spec.classifier.default_agent, AgentKind::Research);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
apiVersion: kairo.dev/v1
kind: EngineConfig
metadata:
  name: test-engine
spec:
  pool:
    max_concurrent_tasks: 2
  classifier:
    default_agent: analysis
  budgets:
    high:
      memory_bytes: 1048576
      cpu_percent: 40
"#;
        let manifest = EngineConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "test-engine");
        assert_eq!(manifest.spec.pool.max_concurrent_tasks, 2);
        assert_eq!(manifest.spec.pool.max_cpu_percent, 100);
        assert_eq!(manifest.spec.classifier.default_agent, AgentKind::Analysis);
        assert_eq!(manifest.spec.classifier.admission_threshold, 2.0);
        assert_eq!(manifest.spec.budgets.high, ResourceRequirement::new(1048576, 40));
        assert_eq!(manifest.spec.budgets.low, ResourceRequirement::new(64 * MIB, 10));
        assert_eq!(manifest.spec.scheduler.dispatch_interval_ms, 50);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kairo-config.yaml");

        let mut manifest = EngineConfigManifest::default();
        manifest.metadata.name = "roundtrip".to_string();
        manifest.spec.pool.max_concurrent_tasks = 7;
        manifest.to_yaml_file(&path).unwrap();

        let loaded = EngineConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "roundtrip");
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(EngineConfigManifest::load_or_default(Some(missing)).is_err());
    }

    #[test]
    fn test_budget_for_complexity() {
        let budgets = ResourceBudgets::default();
        assert_eq!(budgets.for_complexity(Complexity::Low), budgets.low);
        assert_eq!(budgets.for_complexity(Complexity::Medium), budgets.medium);
        assert_eq!(budgets.for_complexity(Complexity::High), budgets.high);
    }

    #[test]
    fn test_validation() {
        let mut manifest = EngineConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "WrongKind".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.pool.max_concurrent_tasks = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.pool.max_concurrent_tasks = 4;

        // A budget larger than the pool could never be admitted.
        manifest.spec.budgets.high.cpu_percent = 150;
        assert!(manifest.validate().is_err());
        manifest.spec.budgets.high.cpu_percent = 50;

        manifest.spec.classifier.failing_discount = 0.0;
        assert!(manifest.validate().is_err());
        manifest.spec.classifier.failing_discount = 0.6;

        manifest.spec.classifier.decisive_threshold = 1.0;
        assert!(manifest.validate().is_err());
        manifest.spec.classifier.decisive_threshold = 5.0;

        manifest.spec.health.min_observations = 50;
        assert!(manifest.validate().is_err());
        manifest.spec.health.min_observations = 5;

        assert!(manifest.validate().is_ok());
    }
}
