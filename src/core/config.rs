//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DrnError, Result};
use crate::core::paths::resolve_absolute_path;

/// Full engine configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub ensemble: EnsembleConfig,
    pub ml: MlConfig,
    pub tuner: TunerConfig,
    pub scheduler: SchedulerConfig,
    pub auth: AuthConfig,
    pub paths: PathsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            ensemble: EnsembleConfig::default(),
            ml: MlConfig::default(),
            tuner: TunerConfig::default(),
            scheduler: SchedulerConfig::default(),
            auth: AuthConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

/// Outcome store location and retention policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    /// Soft retention cap; the store evicts the oldest rows once exceeded.
    pub max_rows: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathsConfig::default().history_db,
            max_rows: 1_000_000,
        }
    }
}

/// Initial ensemble weights (default 0.6 / 0.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnsembleConfig {
    pub heuristic_weight_init: f64,
    pub ml_weight_init: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            heuristic_weight_init: 0.6,
            ml_weight_init: 0.4,
        }
    }
}

/// Online ML scorer hyperparameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MlConfig {
    pub learning_rate: f64,
    pub l2_lambda: f64,
    pub max_outcomes_per_update: usize,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            l2_lambda: 1e-3,
            max_outcomes_per_update: 200,
        }
    }
}

/// Weight tuner batch size (default 100 most recent outcomes).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TunerConfig {
    pub max_outcomes_per_tune: usize,
    pub min_outcomes_required: usize,
    pub smoothing_factor: f64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            max_outcomes_per_tune: 100,
            min_outcomes_required: 5,
            smoothing_factor: 0.7,
        }
    }
}

/// Background scheduler behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

/// Optional shared-secret gate for mutating CLI/transport operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    pub api_key: Option<String>,
}

/// Resolved filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub history_db: PathBuf,
    pub event_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[DRN-CONFIG] WARNING: HOME not set, falling back to /var/lib/drn for data paths"
                );
                PathBuf::from("/var/lib/drn")
            },
            PathBuf::from,
        );
        let (cfg, data) = if home_dir == Path::new("/var/lib/drn") {
            (PathBuf::from("/etc/drn/config.toml"), home_dir)
        } else {
            (
                home_dir.join(".config").join("drn").join("config.toml"),
                home_dir.join(".local").join("share").join("drn"),
            )
        };
        Self {
            config_file: resolve_absolute_path(&cfg),
            history_db: resolve_absolute_path(&data.join("outcomes.sqlite3")),
            event_log: resolve_absolute_path(&data.join("events.jsonl")),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Resolution order for config file path:
    /// 1. Explicit `path` argument (from `--config` CLI flag)
    /// 2. `DRN_CONFIG` environment variable
    /// 3. Default path (`~/.config/drn/config.toml`)
    ///
    /// Missing config file is not an error when loading from the default
    /// path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_config = if path.is_none() {
            env::var_os("DRN_CONFIG").map(PathBuf::from)
        } else {
            None
        };

        let path_buf = resolve_absolute_path(&path.map_or_else(
            || env_config.clone().unwrap_or_else(Self::default_path),
            Path::to_path_buf,
        ));
        let is_explicit_path = path.is_some() || env_config.is_some();

        let system_config = PathBuf::from("/etc/drn/config.toml");
        let (effective_path, is_system_fallback) =
            if !is_explicit_path && !path_buf.exists() && system_config.exists() {
                (system_config, true)
            } else {
                (path_buf, false)
            };

        let mut cfg = if effective_path.exists() {
            let raw = fs::read_to_string(&effective_path).map_err(|source| DrnError::Io {
                path: effective_path.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            if is_system_fallback {
                eprintln!(
                    "[DRN-CONFIG] using system config at {}",
                    effective_path.display()
                );
            }
            parsed
        } else if is_explicit_path {
            return Err(DrnError::MissingConfig {
                path: effective_path,
            });
        } else {
            Self::default()
        };

        cfg.paths.config_file = effective_path;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(raw) = env_var("HISTORY_DB_PATH") {
            self.store.db_path = PathBuf::from(raw);
        }
        set_env_bool("ENABLE_TUNING", &mut self.scheduler.enabled)?;
        set_env_u64("TUNING_INTERVAL_SEC", &mut self.scheduler.interval_secs)?;

        // HEURISTIC_WEIGHT_INIT / ML_WEIGHT_INIT are applied together: if
        // they don't sum to 1 the defaults are used instead (silently —
        // this is an env misconfiguration, not a hard error).
        if let (Some(h_raw), Some(m_raw)) =
            (env_var("HEURISTIC_WEIGHT_INIT"), env_var("ML_WEIGHT_INIT"))
        {
            match (h_raw.parse::<f64>(), m_raw.parse::<f64>()) {
                (Ok(h), Ok(m)) if (h + m - 1.0).abs() < 1e-9 && h >= 0.0 && m >= 0.0 => {
                    self.ensemble.heuristic_weight_init = h;
                    self.ensemble.ml_weight_init = m;
                }
                _ => {
                    eprintln!(
                        "[DRN-CONFIG] WARNING: HEURISTIC_WEIGHT_INIT/ML_WEIGHT_INIT invalid or \
                         do not sum to 1 ({h_raw:?}, {m_raw:?}); keeping defaults"
                    );
                }
            }
        }

        if let Some(raw) = env_var("API_AUTH_KEY") {
            self.auth.api_key = Some(raw);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let sum = self.ensemble.heuristic_weight_init + self.ensemble.ml_weight_init;
        if (sum - 1.0).abs() > 1e-6
            || self.ensemble.heuristic_weight_init < 0.0
            || self.ensemble.ml_weight_init < 0.0
        {
            return Err(DrnError::InvalidConfig {
                details: format!(
                    "ensemble.heuristic_weight_init + ensemble.ml_weight_init must equal 1.0, \
                     got {sum}"
                ),
            });
        }
        if self.scheduler.interval_secs == 0 {
            return Err(DrnError::InvalidConfig {
                details: "scheduler.interval_secs must be > 0".to_string(),
            });
        }
        if self.tuner.max_outcomes_per_tune == 0 {
            return Err(DrnError::InvalidConfig {
                details: "tuner.max_outcomes_per_tune must be > 0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.tuner.smoothing_factor) {
            return Err(DrnError::InvalidConfig {
                details: "tuner.smoothing_factor must be in [0,1]".to_string(),
            });
        }
        Ok(())
    }

    /// Deterministic hash of the effective config for logging/telemetry.
    ///
    /// FNV-1a, so the fingerprint is stable across Rust releases (unlike
    /// `DefaultHasher`, whose seed may vary).
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(DrnError::ConfigParse {
                    context: "env",
                    details: format!("{name}={raw:?}: expected a boolean"),
                });
            }
        };
    }
    Ok(())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| DrnError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}
