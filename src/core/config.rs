//! Engine configuration.
//!
//! Loaded from YAML with environment-variable overrides layered on top,
//! and a per-user default data directory resolved with `dirs`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, VigilError};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding persisted state (`stores/`, `runs/`, `metrics/`).
    /// Defaults to a per-user data directory.
    pub data_dir: PathBuf,
    /// Memory Store / Embedding Oracle settings.
    pub memory: MemoryConfig,
    /// File Walker settings.
    pub walker: WalkerConfig,
    /// Orchestrator / recursive-improvement settings.
    pub orchestrator: OrchestratorConfig,
    /// Code Connector scoring settings.
    pub connector: ConnectorConfig,
    /// Fix generation / approval settings.
    pub fixes: FixConfig,
    /// Safety Envelope limits.
    pub safety: SafetyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            memory: MemoryConfig::default(),
            walker: WalkerConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            connector: ConnectorConfig::default(),
            fixes: FixConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("vigil"))
        .unwrap_or_else(|| PathBuf::from(".vigil"))
}

/// Memory Store and Embedding Oracle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Path to a local fastembed model cache directory. `None` uses the
    /// library default (downloaded/cached on first use); when the model
    /// can't be initialized, the oracle degrades to keyword search.
    pub embedding_model_path: Option<PathBuf>,
    /// Wall-clock budget for a single `search` call. Exceeding it returns
    /// `partial=true` results rather than an error.
    pub search_timeout_ms: u64,
    /// Quality threshold `Q` below which a stale, rarely-used pattern is
    /// pruned.
    pub prune_quality_threshold: f64,
    /// Days since `last_used_at` after which a pattern is eligible for
    /// pruning (subject also to `prune_quality_threshold`).
    pub prune_stale_days: i64,
    /// Maximum number of Pattern Records a single language store may
    /// hold. `store()` rejects a new (not-yet-present) pattern id with
    /// `MemoryFull` once this is reached; overwriting an existing id is
    /// always allowed.
    pub max_patterns_per_language: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embedding_model_path: None,
            search_timeout_ms: 2_000,
            prune_quality_threshold: 0.2,
            prune_stale_days: 90,
            max_patterns_per_language: 50_000,
        }
    }
}

/// File Walker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkerConfig {
    /// Number of files per analysis batch.
    pub batch_size: usize,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self { batch_size: 50 }
    }
}

/// Orchestrator / recursive-improvement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Default recursion depth for `analyze --git-diff`/self-improvement
    /// passes.
    pub max_depth: u32,
    /// Absolute hard cap on `max_depth`, never exceedable via config or
    /// CLI flag.
    pub max_depth_hard_cap: u32,
    /// Size of the CPU-bound analyzer worker pool. Defaults to
    /// `min(available_parallelism, 8)`.
    pub max_workers: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_depth_hard_cap: 10,
            max_workers: default_max_workers(),
        }
    }
}

fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(4)
}

/// Code Connector (C7) scoring configuration. Weights should sum to 1.0;
/// this is validated as a warning, not enforced by renormalization (see
/// `DESIGN.md`, Open Question (a)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Weight of semantic (keyword/doc/name) overlap. Valid range `[0,1]`.
    pub semantic_weight: f64,
    /// Weight of structural compatibility. Valid range `[0,1]`.
    pub structural_weight: f64,
    /// Weight of shared-dependency alignment. Valid range `[0,1]`.
    pub dependency_weight: f64,
    /// Weight of "need" signals (stubs, TODOs, unresolved imports).
    /// Valid range `[0,1]`.
    pub need_weight: f64,
    /// Minimum composite score for a connection suggestion to be
    /// returned.
    pub confidence_threshold: f64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.30,
            structural_weight: 0.25,
            dependency_weight: 0.25,
            need_weight: 0.20,
            confidence_threshold: 0.3,
        }
    }
}

impl ConnectorConfig {
    /// Log a warning if the four weights don't sum to ~1.0. Called at
    /// config-load time; never mutates the configured weights.
    pub fn validate(&self) {
        let sum =
            self.semantic_weight + self.structural_weight + self.dependency_weight + self.need_weight;
        if (sum - 1.0).abs() > 0.01 {
            tracing::warn!(sum, "connector scoring weights do not sum to 1.0");
        }
    }
}

/// Fix Generator / Approval / Defense-in-Depth configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixConfig {
    /// Minimum safety score for a Fix Proposal to be eligible for
    /// `auto_safe`.
    pub auto_safe_threshold: f64,
    /// Categories eligible for `auto_safe` classification.
    pub auto_safe_categories: Vec<String>,
    /// CI fast-path opt-out: skip the sandbox gate for already
    /// `auto_safe` proposals. Defense-in-depth still runs the pattern and
    /// metadata gates. Default `false` per spec §9(b).
    pub skip_sandbox_for_auto_safe: bool,
    /// Command used by the sandbox gate to verify the modified project
    /// still builds. `None` skips the build check (parse-check only).
    pub sandbox_build_command: Option<String>,
    /// Short-timeout smoke-test command run after a successful build.
    pub sandbox_smoke_command: Option<String>,
    /// Wall-clock seconds the sandbox gate allows `sandbox_build_command`
    /// and `sandbox_smoke_command` each before declaring a timeout.
    pub sandbox_timeout_seconds: u64,
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            auto_safe_threshold: 0.9,
            auto_safe_categories: vec![
                "remove_unused_import".to_string(),
                "simple_formatting".to_string(),
                "trivially_dead_code".to_string(),
            ],
            skip_sandbox_for_auto_safe: false,
            sandbox_build_command: None,
            sandbox_smoke_command: None,
            sandbox_timeout_seconds: 30,
        }
    }
}

/// Safety Envelope limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Maximum recursive-improvement depth.
    pub max_recursion_depth: u32,
    /// Maximum wall-clock seconds for any single outward operation.
    pub max_operation_seconds: u64,
    /// Maximum concurrent outward operations.
    pub max_concurrent_ops: usize,
    /// Path to an emergency-stop flag file. When present, all active
    /// operations stop at their next cooperative checkpoint.
    pub emergency_stop_file: Option<PathBuf>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: 10,
            max_operation_seconds: 300,
            max_concurrent_ops: 5,
            emergency_stop_file: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file, falling back to defaults for
    /// any field the file doesn't set, then apply `VIGIL_*` environment
    /// overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&text)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.connector.validate();
        Ok(config)
    }

    /// Persist this configuration as YAML, creating parent directories
    /// as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("VIGIL_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("VIGIL_EMBEDDING_MODEL_PATH") {
            self.memory.embedding_model_path = Some(PathBuf::from(path));
        }
        if let Ok(depth) = std::env::var("VIGIL_MAX_RECURSION_DEPTH") {
            if let Ok(value) = depth.parse() {
                self.safety.max_recursion_depth = value;
            }
        }
        if let Ok(seconds) = std::env::var("VIGIL_MAX_OPERATION_SECONDS") {
            if let Ok(value) = seconds.parse() {
                self.safety.max_operation_seconds = value;
            }
        }
        if let Ok(stop_file) = std::env::var("VIGIL_EMERGENCY_STOP_FILE") {
            self.safety.emergency_stop_file = Some(PathBuf::from(stop_file));
        }
        if let Ok(workers) = std::env::var("VIGIL_MAX_WORKERS") {
            if let Ok(value) = workers.parse() {
                self.orchestrator.max_workers = value;
            }
        }
        if let Ok(command) = std::env::var("VIGIL_SANDBOX_BUILD_COMMAND") {
            self.fixes.sandbox_build_command = Some(command);
        }
        if let Ok(command) = std::env::var("VIGIL_SANDBOX_SMOKE_COMMAND") {
            self.fixes.sandbox_smoke_command = Some(command);
        }
    }

    /// Validate cross-field invariants, returning a descriptive error on
    /// violation (e.g. a CLI-supplied `--max-depth` above the hard cap).
    pub fn validate_recursion_depth(&self, requested: u32) -> Result<u32> {
        if requested > self.orchestrator.max_depth_hard_cap {
            return Err(VigilError::limit_exceeded(
                "max_depth",
                u64::from(requested),
                u64::from(self.orchestrator.max_depth_hard_cap),
            ));
        }
        Ok(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_yaml() {
        let config = EngineConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let reloaded: EngineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(reloaded.walker.batch_size, config.walker.batch_size);
    }

    #[test]
    fn requested_depth_above_hard_cap_errors() {
        let config = EngineConfig::default();
        assert!(config.validate_recursion_depth(11).is_err());
        assert!(config.validate_recursion_depth(3).is_ok());
    }
}
