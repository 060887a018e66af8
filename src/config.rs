use serde::{Deserialize, Serialize};

use crate::{Result, VisualizerError};

/// Number of frequency bins handed to effects when nothing else is asked for.
pub const DEFAULT_BUFFER_LENGTH: usize = 1024;

/// Options fixed for the lifetime of a [`crate::Visualizer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisualizerConfig {
    /// Length of the sample buffer passed to every effect.
    pub buffer_length: usize,
    /// `crossOrigin` applied to media elements the visualizer creates.
    pub cross_origin: Option<String>,
    /// Pause the loop while the page is hidden.
    pub pause_when_hidden: bool,
    /// Console log level used by the wasm start hook.
    pub log_level: String,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            buffer_length: DEFAULT_BUFFER_LENGTH,
            cross_origin: Some("anonymous".to_owned()),
            pause_when_hidden: true,
            log_level: "info".to_owned(),
        }
    }
}

impl VisualizerConfig {
    pub fn with_buffer_length(buffer_length: usize) -> Self {
        Self {
            buffer_length,
            ..Self::default()
        }
    }

    /// Parses a JSON options object; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_length == 0 {
            return Err(VisualizerError::Config(
                "buffer length must be at least 1".into(),
            ));
        }
        if self.log_level.parse::<log::Level>().is_err() {
            return Err(VisualizerError::Config(format!(
                "unknown log level `{}`",
                self.log_level
            )));
        }
        Ok(())
    }

    pub fn level(&self) -> log::Level {
        self.log_level.parse().unwrap_or(log::Level::Info)
    }
}
