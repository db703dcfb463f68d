//! Per-page transform stages.
//!
//! Every stage takes bytes and returns bytes, so stages chain freely and
//! any stage can be disabled by configuration without the rest of the
//! pipeline noticing — a disabled stage is a pass-through. Stage failures
//! carry the stage name so a failing page can be traced to the exact step
//! that rejected it.
//!
//! The default chain mirrors a scan-cleanup pipeline: palette shrinking
//! (background detection + k-means recoloring), `pngquant` quantization,
//! and `optipng` size optimization. The two external tools are invoked as
//! subprocesses and are both optional.

mod palette;
mod tools;

pub use palette::{PaletteShrink, ShrinkConfig};
pub use tools::{Optimize, OptimizeConfig, Quantize, QuantizeConfig};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// A transform stage failure, tagged with the stage that produced it
#[derive(Debug, Error)]
#[error("stage '{stage}' failed: {reason}")]
pub struct TransformError {
    pub stage: &'static str,
    pub reason: String,
}

impl TransformError {
    pub fn new(stage: &'static str, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

/// One step of the per-page pipeline: bytes in, bytes out
pub trait TransformStage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Disabled stages are skipped entirely by the chain
    fn enabled(&self) -> bool {
        true
    }

    fn apply(&self, input: Vec<u8>) -> Result<Vec<u8>, TransformError>;
}

/// Configuration for the default stage chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub shrink: ShrinkConfig,
    #[serde(default)]
    pub quantize: QuantizeConfig,
    #[serde(default)]
    pub optimize: OptimizeConfig,
}

/// The configured stage list, applied in order
pub struct TransformChain {
    stages: Vec<Box<dyn TransformStage>>,
}

impl TransformChain {
    /// Build the default chain: shrink, quantize, optimize
    #[must_use]
    pub fn from_config(config: &TransformConfig) -> Self {
        Self::new(vec![
            Box::new(PaletteShrink::new(config.shrink.clone())),
            Box::new(Quantize::new(config.quantize.clone())),
            Box::new(Optimize::new(config.optimize.clone())),
        ])
    }

    #[must_use]
    pub fn new(stages: Vec<Box<dyn TransformStage>>) -> Self {
        Self { stages }
    }

    /// Run the payload through every enabled stage
    pub fn apply(&self, input: Vec<u8>) -> Result<Vec<u8>, TransformError> {
        let mut bytes = input;
        for stage in &self.stages {
            if !stage.enabled() {
                debug!(stage = stage.name(), "stage disabled, passing through");
                continue;
            }
            let before = bytes.len();
            bytes = stage.apply(bytes)?;
            debug!(
                stage = stage.name(),
                bytes_in = before,
                bytes_out = bytes.len(),
                "stage applied"
            );
        }
        Ok(bytes)
    }
}
