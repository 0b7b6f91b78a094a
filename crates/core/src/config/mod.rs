use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CodecError, Result};

/// Crate version, exposed for callers that record which codec produced a table.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Smoothing window, in unique onsets, used when none is configured.
pub const DEFAULT_WINDOW_WIDTH: usize = 5;
pub const DEFAULT_TIME_TOLERANCE: f64 = 1e-6;

/// How the loudness signal is split into local and residual components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionStrategy {
    /// Residual is a moving average across consecutive unique onsets.
    #[default]
    Onsetwise,
    /// Residual is the piece-wide mean onset loudness.
    Constant,
}

/// Configuration injected into the performance codec at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub strategy: DecompositionStrategy,
    /// Width of the smoothing window, counted in unique onsets.
    pub window_width: usize,
    /// Allowed cumulative rounding drift of the time codec, in seconds per beat.
    pub time_tolerance: f64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            strategy: DecompositionStrategy::default(),
            window_width: DEFAULT_WINDOW_WIDTH,
            time_tolerance: DEFAULT_TIME_TOLERANCE,
        }
    }
}

impl CodecConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file from a caller supplied path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks the window width and time tolerance.
    pub fn validate(&self) -> Result<()> {
        validate_window_width(self.window_width)?;
        if !self.time_tolerance.is_finite() || self.time_tolerance <= 0.0 {
            return Err(CodecError::configuration(format!(
                "time tolerance must be a positive number, got {}",
                self.time_tolerance
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_window_width(width: usize) -> Result<()> {
    if width == 0 || width % 2 == 0 {
        return Err(CodecError::configuration(format!(
            "smoothing window width must be an odd positive integer, got {width}"
        )));
    }
    Ok(())
}
