use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::message::{AFTER_WEIGHT, BEFORE_WEIGHT, DEFAULT_WEIGHT};

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FidgetConfig {
    pub queue: QueueConfig,
    pub weights: WeightPresets,
}

impl FidgetConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied and the result validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: FidgetConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Try to load from path; if the file is missing or invalid, return
    /// defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({:#}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Reject preset weights the queue would refuse to build messages with.
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("default", self.weights.default),
            ("before", self.weights.before),
            ("after", self.weights.after),
        ] {
            if w == 0 {
                bail!("weights.{} must be greater than zero", name);
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FIDGET_SEED") {
            match v.parse() {
                Ok(n) => self.queue.seed = Some(n),
                Err(_) => tracing::warn!("Ignoring unparseable FIDGET_SEED value: {}", v),
            }
        }
        if let Ok(v) = std::env::var("FIDGET_SELECTION") {
            match v.to_ascii_lowercase().as_str() {
                "weighted" => self.queue.selection = SelectionPolicy::Weighted,
                "ordered" => self.queue.selection = SelectionPolicy::Ordered,
                other => tracing::warn!("Ignoring unknown FIDGET_SELECTION value: {}", other),
            }
        }
        if let Ok(v) = std::env::var("FIDGET_DEBUG") {
            self.queue.debug = matches!(v.as_str(), "1" | "true" | "yes" | "on");
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// RNG seed for reproducible draws. `None` seeds from OS entropy.
    pub seed: Option<u64>,
    pub selection: SelectionPolicy,
    /// Log every candidate's eligibility and every draw at debug level.
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Draw one winner with probability proportional to weight.
    #[default]
    Weighted,
    /// Highest weight wins; ties go to the earliest queued message.
    Ordered,
}

/// Weights used by the preset fidget constructors on the daemon.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeightPresets {
    pub default: u32,
    pub before: u32,
    pub after: u32,
}

impl Default for WeightPresets {
    fn default() -> Self {
        Self {
            default: DEFAULT_WEIGHT,
            before: BEFORE_WEIGHT,
            after: AFTER_WEIGHT,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
