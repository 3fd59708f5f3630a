use serde::{Deserialize, Serialize};

/// Configuration from board.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub edit: EditConfig,
    #[serde(default)]
    pub drag: DragConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub canvas: CanvasConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Non-archived tasks allowed per space (checked before any local apply)
    #[serde(default = "default_max_tasks_per_space")]
    pub max_tasks_per_space: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_tasks_per_space: default_max_tasks_per_space(),
        }
    }
}

/// What happens to a debounced edit when its view goes away
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeardownPolicy {
    #[default]
    Flush,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditConfig {
    /// Quiet period after the last keystroke before an edit is sent
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub on_teardown: TeardownPolicy,
}

impl Default for EditConfig {
    fn default() -> Self {
        EditConfig {
            debounce_ms: default_debounce_ms(),
            on_teardown: TeardownPolicy::Flush,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragConfig {
    /// Minimum interval between applied hover frames
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

impl Default for DragConfig {
    fn default() -> Self {
        DragConfig {
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Days an archived task is kept before `purge` deletes it
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// Offset applied to a duplicated card so it does not cover the original
    #[serde(default = "default_duplicate_offset")]
    pub duplicate_offset: f64,
    /// Number of z-index values above which `normalize` is suggested
    #[serde(default = "default_normalize_threshold")]
    pub normalize_threshold: u64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        CanvasConfig {
            duplicate_offset: default_duplicate_offset(),
            normalize_threshold: default_normalize_threshold(),
        }
    }
}

fn default_max_tasks_per_space() -> usize {
    50
}

fn default_debounce_ms() -> u64 {
    750
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_retention_days() -> u32 {
    30
}

fn default_duplicate_offset() -> f64 {
    20.0
}

fn default_normalize_threshold() -> u64 {
    10_000
}
