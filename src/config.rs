//! Viewer configuration, stored as TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{StoryError, StoryResult};
use crate::timer::Millis;
use crate::version::{DEFAULT_PROGRESS_NAMESPACE, DEFAULT_UNLOCK_KEY};

/// Fixed auto-advance pacing presets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoAdvanceDelay {
    Fast,
    #[default]
    Normal,
    Slow,
}

impl AutoAdvanceDelay {
    pub const ALL: [AutoAdvanceDelay; 3] = [
        AutoAdvanceDelay::Fast,
        AutoAdvanceDelay::Normal,
        AutoAdvanceDelay::Slow,
    ];

    pub fn as_millis(self) -> Millis {
        match self {
            AutoAdvanceDelay::Fast => 1_500,
            AutoAdvanceDelay::Normal => 3_000,
            AutoAdvanceDelay::Slow => 5_000,
        }
    }

    /// Preset with exactly this delay, if any.
    pub fn from_millis(millis: Millis) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_millis() == millis)
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fast" => Some(AutoAdvanceDelay::Fast),
            "normal" => Some(AutoAdvanceDelay::Normal),
            "slow" => Some(AutoAdvanceDelay::Slow),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    pub reveal_interval_ms: Millis,
    pub auto_advance: bool,
    pub auto_advance_delay: AutoAdvanceDelay,
    pub namespace: String,
    pub unlock_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_path: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            reveal_interval_ms: 30,
            auto_advance: false,
            auto_advance_delay: AutoAdvanceDelay::Normal,
            namespace: DEFAULT_PROGRESS_NAMESPACE.to_string(),
            unlock_key: DEFAULT_UNLOCK_KEY.to_string(),
            content_path: None,
        }
    }
}

impl ViewerConfig {
    /// Loads the config, falling back to defaults when the file is absent.
    pub fn load_from(path: &Path) -> StoryResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .map_err(|err| StoryError::Config(format!("cannot read '{}': {err}", path.display())))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(input: &str) -> StoryResult<Self> {
        let config: Self =
            toml::from_str(input).map_err(|err| StoryError::Config(err.to_string()))?;
        Ok(config.normalized())
    }

    pub fn save_to(&self, path: &Path) -> StoryResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| StoryError::Config(err.to_string()))?;
            }
        }
        let payload =
            toml::to_string_pretty(self).map_err(|err| StoryError::Config(err.to_string()))?;
        fs::write(path, payload).map_err(|err| StoryError::Config(err.to_string()))
    }

    /// Reveal interval the engine actually uses; never zero.
    pub fn reveal_interval(&self) -> Millis {
        self.reveal_interval_ms.max(1)
    }

    fn normalized(mut self) -> Self {
        if self.reveal_interval_ms == 0 {
            warn!("reveal_interval_ms must be positive, using 1");
            self.reveal_interval_ms = 1;
        }
        self
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
