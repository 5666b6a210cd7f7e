use crate::foundation::core::Resolution;
use crate::foundation::error::{OneoffError, OneoffResult};
use crate::layer::chroma::normalize_greens;
use crate::layer::video::{ClipReader, source_time};
use crate::render::{Frame, KEY_GREEN};
use crate::timeline::dispatch::active_clip;
use crate::timeline::manifest::TimelineElement;

/// Foreground video clips (layer 0) of a timeline job.
#[derive(Debug)]
pub struct ForegroundLayer {
    clips: Vec<TimelineElement>,
    reader: ClipReader,
    canvas: Resolution,
}

impl ForegroundLayer {
    /// `clips` must be sorted by start time.
    pub fn new(clips: Vec<TimelineElement>, canvas: Resolution) -> Self {
        Self {
            clips,
            reader: ClipReader::new(),
            canvas,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    /// The foreground at output time `t`; key green wherever no clip plays.
    ///
    /// A clip frame that ffmpeg cannot fully deliver is replaced by key green. A failing
    /// ffmpeg or ffprobe process is fatal.
    pub fn frame_at(&mut self, t: f64) -> OneoffResult<Frame> {
        let Some(clip) = active_clip(&self.clips, t) else {
            return Ok(Frame::solid(self.canvas, KEY_GREEN));
        };
        let Some(path) = clip.path.as_deref() else {
            tracing::warn!(clip = %clip.id, "foreground clip has no path");
            return Ok(Frame::solid(self.canvas, KEY_GREEN));
        };

        let info = self.reader.info(path)?;
        let at = source_time(t, clip.start, info.duration);
        match self.reader.frame_at(path, at, self.canvas) {
            Ok(mut frame) => {
                let changed = normalize_greens(&mut frame, &clip.greenscreen());
                tracing::trace!(clip = %clip.id, t, source = at, changed, "foreground frame");
                Ok(frame)
            }
            Err(OneoffError::Validation(msg)) => {
                tracing::warn!(clip = %clip.id, t, error = %msg, "foreground frame unavailable; using key color");
                Ok(Frame::solid(self.canvas, KEY_GREEN))
            }
            Err(err) => Err(err),
        }
    }
}
