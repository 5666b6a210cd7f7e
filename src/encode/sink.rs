use std::path::PathBuf;

use crate::foundation::core::{Fps, FrameIndex, Resolution};
use crate::foundation::error::{OneoffError, OneoffResult};
use crate::render::Frame;

/// Configuration provided to a [`FrameSink`] before the first frame.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub size: Resolution,
    pub fps: Fps,
    /// Audio file muxed into the output as-is.
    pub audio: Option<PathBuf>,
    /// Output length cap in seconds, set when the render duration was overridden.
    pub duration_limit: Option<f64>,
}

impl SinkConfig {
    pub fn validate(&self) -> OneoffResult<()> {
        self.size.validate()?;
        if self.fps.num == 0 || self.fps.den == 0 {
            return Err(OneoffError::validation("sink fps must be non-zero"));
        }
        Ok(())
    }
}

/// Consumes rendered frames in timeline order.
///
/// `push_frame` is called with strictly increasing `FrameIndex` values.
pub trait FrameSink {
    /// Called once before any frames are pushed.
    fn begin(&mut self, cfg: SinkConfig) -> OneoffResult<()>;
    /// Push one RGB24 frame.
    fn push_frame(&mut self, idx: FrameIndex, frame: &Frame) -> OneoffResult<()>;
    /// Called once after the last frame.
    fn end(&mut self) -> OneoffResult<()>;
    /// Called instead of `end` when rendering fails after `begin`. Partial output is discarded.
    fn abort(&mut self) {}
}

/// Sink that keeps every frame in memory; used by tests.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(FrameIndex, Frame)>,
    finished: bool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration captured by `begin`.
    pub fn config(&self) -> Option<&SinkConfig> {
        self.cfg.as_ref()
    }

    pub fn frames(&self) -> &[(FrameIndex, Frame)] {
        &self.frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> OneoffResult<()> {
        cfg.validate()?;
        self.cfg = Some(cfg);
        self.frames.clear();
        self.finished = false;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &Frame) -> OneoffResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| OneoffError::validation("in-memory sink not started"))?;
        check_frame(cfg, self.frames.last().map(|(i, _)| *i), idx, frame)?;
        self.frames.push((idx, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> OneoffResult<()> {
        self.finished = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.frames.clear();
        self.cfg = None;
    }
}

/// Enforce frame order and frame size.
pub(crate) fn check_frame(
    cfg: &SinkConfig,
    last: Option<FrameIndex>,
    idx: FrameIndex,
    frame: &Frame,
) -> OneoffResult<()> {
    if let Some(last) = last
        && idx <= last
    {
        return Err(OneoffError::validation(format!(
            "frame {} pushed after frame {}",
            idx.0, last.0
        )));
    }
    if frame.size() != cfg.size {
        return Err(OneoffError::validation(format!(
            "frame size mismatch: got {}x{}, expected {}x{}",
            frame.width, frame.height, cfg.size.width, cfg.size.height
        )));
    }
    Ok(())
}
