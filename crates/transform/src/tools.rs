//! External-tool stages: `pngquant` and `optipng`.
//!
//! Both tools already do their jobs better than a reimplementation would,
//! so these stages shell out, with the tool path configurable. `pngquant`
//! is driven over stdin/stdout; `optipng` only works on files, so that
//! stage round-trips through a temporary directory.

use crate::{TransformError, TransformStage};
use serde::{Deserialize, Serialize};
use std::io::Write as _;
use std::process::{Command, Output, Stdio};

/// `pngquant` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantizeConfig {
    pub enable: bool,
    /// Speed/quality trade-off (1 = slowest/best, 11 = fastest)
    pub speed: u32,
    /// Upper bound of the acceptable quality range (0-100)
    pub max_quality: u32,
    pub path: String,
}

impl Default for QuantizeConfig {
    fn default() -> Self {
        Self {
            enable: true,
            speed: 3,
            max_quality: 100,
            path: "pngquant".to_string(),
        }
    }
}

/// Color quantization via `pngquant`
pub struct Quantize {
    config: QuantizeConfig,
}

impl Quantize {
    #[must_use]
    pub fn new(config: QuantizeConfig) -> Self {
        Self { config }
    }
}

impl TransformStage for Quantize {
    fn name(&self) -> &'static str {
        "quantize"
    }

    fn enabled(&self) -> bool {
        self.config.enable
    }

    fn apply(&self, input: Vec<u8>) -> Result<Vec<u8>, TransformError> {
        let mut child = Command::new(&self.config.path)
            .arg(format!("--speed={}", self.config.speed))
            .arg(format!("--quality=0-{}", self.config.max_quality))
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                TransformError::new("quantize", format!("failed to run {}: {e}", self.config.path))
            })?;

        // pngquant reads the whole PNG before writing anything, so writing
        // all input up front cannot deadlock against its stdout
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&input)
                .map_err(|e| TransformError::new("quantize", format!("stdin write failed: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| TransformError::new("quantize", e.to_string()))?;
        check_status("quantize", &output)?;
        Ok(output.stdout)
    }
}

/// `optipng` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeConfig {
    pub enable: bool,
    pub path: String,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            enable: true,
            path: "optipng".to_string(),
        }
    }
}

/// Lossless size optimization via `optipng`
pub struct Optimize {
    config: OptimizeConfig,
}

impl Optimize {
    #[must_use]
    pub fn new(config: OptimizeConfig) -> Self {
        Self { config }
    }
}

impl TransformStage for Optimize {
    fn name(&self) -> &'static str {
        "optimize"
    }

    fn enabled(&self) -> bool {
        self.config.enable
    }

    fn apply(&self, input: Vec<u8>) -> Result<Vec<u8>, TransformError> {
        let dir = tempfile::tempdir()
            .map_err(|e| TransformError::new("optimize", format!("tempdir failed: {e}")))?;
        let in_path = dir.path().join("in.png");
        let out_path = dir.path().join("out.png");
        std::fs::write(&in_path, &input)
            .map_err(|e| TransformError::new("optimize", e.to_string()))?;

        let output = Command::new(&self.config.path)
            .arg(format!("-out={}", out_path.display()))
            .arg("--")
            .arg(&in_path)
            .output()
            .map_err(|e| {
                TransformError::new("optimize", format!("failed to run {}: {e}", self.config.path))
            })?;
        check_status("optimize", &output)?;

        std::fs::read(&out_path).map_err(|e| TransformError::new("optimize", e.to_string()))
    }
}

fn check_status(stage: &'static str, output: &Output) -> Result<(), TransformError> {
    if output.status.success() {
        Ok(())
    } else {
        Err(TransformError::new(
            stage,
            format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ))
    }
}
