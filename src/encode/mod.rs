//! Encoding sinks. Frames go out as raw RGB24; the container is ffmpeg's job.

pub mod ffmpeg;
pub mod sink;

pub use ffmpeg::{FfmpegSink, FfmpegSinkOpts};
pub use sink::{FrameSink, InMemorySink, SinkConfig};
