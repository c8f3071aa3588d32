//! Tunables of the follow pipeline.
//!
//! Every field has a default, so an empty file (or no file at all) yields a working
//! configuration: track the single largest `person`, hold the last position for 100 missed frames,
//! capture 640x480 RGB frames into heap buffers.

use crate::tracker::DEFAULT_DROPOUT_THRESHOLD;
use crate::{
    BufferProvider, DetectionSelector, Error, HeapProvider, IdleStrategy, PixelFormat,
    PoolProvider, Result, Tracker,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TARGET_CLASS: &str = "person";
const DEFAULT_MAX_CANDIDATES: usize = 1;
const DEFAULT_FRAME_WIDTH: u32 = 640;
const DEFAULT_FRAME_HEIGHT: u32 = 480;
const DEFAULT_POOL_BLOCKS: usize = 4;
const DEFAULT_IDLE_MS: u64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FollowConfig {
    /// Class name of the subject to follow.
    pub target_class: String,
    /// Detections kept per frame after ranking.
    pub max_candidates: usize,
    /// Consecutive missed frames that hold the last position before decaying to center.
    pub dropout_threshold: usize,
    pub frame: FrameConfig,
    pub buffer: BufferConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferKind {
    #[default]
    Heap,
    Pool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferConfig {
    pub kind: BufferKind,
    /// Number of frame sized blocks when `kind = "pool"`.
    pub pool_blocks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleKind {
    Spin,
    Yield,
    #[default]
    Sleep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// What the tracking loop does when no frame has been published yet.
    pub idle: IdleKind,
    /// Sleep length when `idle = "sleep"`.
    pub idle_ms: u64,
    /// Stop after this many processed frames.
    pub max_frames: Option<u64>,
    /// Skip a frame that was already processed instead of running inference on it again.
    pub skip_stale: bool,
    /// Hold each capture until the tracking loop has taken the previous frame, so a finite
    /// source has every frame processed exactly once. Requires `skip_stale`.
    pub lockstep: bool,
}

impl Default for FollowConfig {
    fn default() -> Self {
        FollowConfig {
            target_class: DEFAULT_TARGET_CLASS.to_string(),
            max_candidates: DEFAULT_MAX_CANDIDATES,
            dropout_threshold: DEFAULT_DROPOUT_THRESHOLD,
            frame: FrameConfig::default(),
            buffer: BufferConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        FrameConfig {
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
            format: PixelFormat::Rgb888,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            kind: BufferKind::Heap,
            pool_blocks: DEFAULT_POOL_BLOCKS,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            idle: IdleKind::Sleep,
            idle_ms: DEFAULT_IDLE_MS,
            max_frames: None,
            skip_stale: false,
            lockstep: false,
        }
    }
}

impl FollowConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: FollowConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_class.trim().is_empty() {
            return Err(Error::config("target_class must not be empty"));
        }
        if self.max_candidates == 0 {
            return Err(Error::config("max_candidates must be at least 1"));
        }
        if self.frame.width == 0 || self.frame.height == 0 {
            return Err(Error::config(format!(
                "frame size must be non-zero, got {}x{}",
                self.frame.width, self.frame.height
            )));
        }
        if self.buffer.kind == BufferKind::Pool && self.buffer.pool_blocks < 2 {
            return Err(Error::config(
                "pool_blocks must be at least 2: one for the published frame, one for the capture in flight",
            ));
        }
        if self.pipeline.lockstep && !self.pipeline.skip_stale {
            return Err(Error::config("lockstep requires skip_stale"));
        }
        Ok(())
    }

    /// Returns the byte size of one configured frame
    pub fn frame_size(&self) -> usize {
        self.frame.format.frame_size(self.frame.width, self.frame.height)
    }

    /// Build the configured buffer provider
    pub fn buffer_provider(&self) -> Arc<dyn BufferProvider> {
        match self.buffer.kind {
            BufferKind::Heap => Arc::new(HeapProvider::new()),
            BufferKind::Pool => Arc::new(PoolProvider::new(
                self.buffer.pool_blocks,
                self.frame_size(),
            )),
        }
    }

    /// Build the configured detection selector
    pub fn selector(&self) -> Result<DetectionSelector> {
        DetectionSelector::new(self.target_class.clone(), self.max_candidates)
    }

    /// Build an uninitialized tracker
    pub fn tracker(&self) -> Tracker {
        Tracker::new(self.dropout_threshold)
    }

    /// Returns the configured idle strategy of the tracking loop
    pub fn idle_strategy(&self) -> IdleStrategy {
        match self.pipeline.idle {
            IdleKind::Spin => IdleStrategy::Spin,
            IdleKind::Yield => IdleStrategy::Yield,
            IdleKind::Sleep => IdleStrategy::Sleep(Duration::from_millis(self.pipeline.idle_ms)),
        }
    }
}
