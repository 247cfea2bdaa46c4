//! Worker configuration.
//!
//! Sources, in order of precedence (last wins):
//! 1. defaults
//! 2. JSON file named by `SKYHOOK_WORKER_CONFIG`
//! 3. `SKYHOOK_MODE`, `SKYHOOK_TRANSFORM`, `SKYHOOK_LANES` (`auto` = one lane per spare core)

use std::env;
use std::fs;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{env as env_keys, DEFAULT_LANE_CAP, DEFAULT_TRANSFORM};
use crate::pipeline::PipelineProfile;
use crate::types::{Result, WorkerError};

/// Which protocol the worker speaks on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerMode {
    /// Per-key `init/job/finish` stream.
    Job,
    /// Sideband RPC driving an operator.
    Operator,
}

/// Job handler used in `job` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    PerFrame,
    Accumulate,
}

/// Operator used in `operator` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    PerFrame,
    AllItems,
    Pipelined,
}

impl FromStr for WorkerMode {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "job" => Ok(WorkerMode::Job),
            "operator" => Ok(WorkerMode::Operator),
            other => Err(WorkerError::Config(format!("unknown mode {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub mode: WorkerMode,
    pub handler: HandlerKind,
    pub operator: OperatorKind,
    /// Registry name of the transform.
    pub transform: String,
    pub pipeline: PipelineProfile,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mode: WorkerMode::Job,
            handler: HandlerKind::PerFrame,
            operator: OperatorKind::PerFrame,
            transform: DEFAULT_TRANSFORM.to_string(),
            pipeline: PipelineProfile::default(),
        }
    }
}

impl WorkerConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: WorkerConfig =
            serde_json::from_str(s).map_err(|e| WorkerError::Config(format!("invalid config: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults, then the optional config file, then env overrides.
    pub fn from_env() -> Result<Self> {
        let mut cfg = match env::var(env_keys::CONFIG_PATH) {
            Ok(path) => {
                let text = fs::read_to_string(&path)
                    .map_err(|e| WorkerError::Config(format!("cannot read {}: {}", path, e)))?;
                debug!(path = %path, "loaded worker config file");
                serde_json::from_str(&text).map_err(|e| WorkerError::Config(format!("invalid config {}: {}", path, e)))?
            }
            Err(_) => WorkerConfig::default(),
        };

        cfg.apply_overrides(|key| env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `SKYHOOK_*` overrides through `lookup` (the process env in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup(env_keys::MODE) {
            self.mode = mode.parse()?;
        }
        if let Some(transform) = lookup(env_keys::TRANSFORM) {
            self.transform = transform;
        }
        if let Some(lanes) = lookup(env_keys::LANES) {
            if lanes == "auto" {
                self.pipeline.lanes = PipelineProfile::dynamic(DEFAULT_LANE_CAP).lanes;
                return Ok(());
            }
            self.pipeline.lanes = lanes
                .parse()
                .map_err(|_| WorkerError::Config(format!("{} must be a positive integer, got {:?}", env_keys::LANES, lanes)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.transform.is_empty() {
            return Err(WorkerError::Config("transform name is empty".to_string()));
        }
        self.pipeline.validate()
    }
}
