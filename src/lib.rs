//! Oneoff renders audio-reactive GLSL shaders to video.
//!
//! An audio file is analyzed once into per-frame spectrum and waveform data, packed into a
//! small texture each frame, and fed to fragment programs rendered offscreen with `wgpu`.
//! Shaders are scheduled by a timeline (a single shader, a cycling plan produced by the
//! selection policy, or an editor manifest), blended by transition programs where segments
//! overlap, optionally keyed under a greenscreen video layer, and streamed as raw frames into
//! `ffmpeg`, which encodes the video and muxes the original audio.
//!
//! - Plan and run a job with [`RenderJob`] and [`run_job`]
//! - Or build a [`RenderContext`] yourself and stream into any [`FrameSink`]
#![forbid(unsafe_code)]

pub mod assets;
pub mod audio;
pub mod config;
pub mod encode;
pub mod foundation;
pub mod gpu;
pub mod job;
pub mod layer;
pub mod render;
pub mod select;
pub mod shader;
pub mod timeline;

pub use crate::config::Config;
pub use crate::encode::{FfmpegSink, FfmpegSinkOpts, FrameSink, InMemorySink, SinkConfig};
pub use crate::foundation::core::{Fps, FrameIndex, Resolution};
pub use crate::foundation::error::{OneoffError, OneoffResult};
pub use crate::job::{
    BatchReport, JobKind, JobPlan, RenderContext, RenderJob, RenderStats, Scene, plan_job,
    run_batch, run_job,
};
pub use crate::render::{CompiledShader, Frame};
pub use crate::timeline::{Manifest, OverlapTimeline};
