use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::assets::media::probe_media;
use crate::audio::analysis::AudioAnalysis;
use crate::audio::texture::{AudioFrame, pack_audio_texture};
use crate::config::Config;
use crate::encode::{FfmpegSink, FfmpegSinkOpts, FrameSink, SinkConfig};
use crate::foundation::core::{Fps, FrameIndex, Resolution};
use crate::foundation::error::{OneoffError, OneoffResult};
use crate::gpu::GpuContext;
use crate::gpu::texture::upload_audio;
use crate::job::scene::Scene;
use crate::render::{Frame, FrameInputs, FrameRenderer};
use crate::timeline::Manifest;
use crate::timeline::manifest::sanitize_stem;

/// Frames between progress log lines.
pub const PROGRESS_EVERY: u64 = 30;

/// What a job renders.
#[derive(Clone, Debug)]
pub enum JobKind {
    /// One shader file for the whole duration.
    Single(PathBuf),
    /// Shaders discovered in the configured directory, cycled by the selection policy.
    Cycling,
    /// An editor-produced manifest.
    Timeline(Box<Manifest>),
}

/// One audio file rendered to one output video.
#[derive(Clone, Debug)]
pub struct RenderJob {
    pub audio: PathBuf,
    pub output: PathBuf,
    pub kind: JobKind,
}

impl RenderJob {
    /// The job `render` runs: single or cycling per `shader_settings.multi_shader`.
    pub fn from_config(cfg: &Config) -> Self {
        let kind = if cfg.shader_settings.multi_shader {
            JobKind::Cycling
        } else {
            JobKind::Single(cfg.input.shader_file.clone())
        };
        Self {
            audio: cfg.input.audio_file.clone(),
            output: cfg.output.video_file.clone(),
            kind,
        }
    }

    pub fn shader(
        shader: impl Into<PathBuf>,
        audio: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            audio: audio.into(),
            output: output.into(),
            kind: JobKind::Single(shader.into()),
        }
    }

    /// Load and validate a manifest. Without `output` the video lands in `output.directory`,
    /// named after the project.
    pub fn timeline(cfg: &Config, manifest_path: &Path, output: Option<PathBuf>) -> OneoffResult<Self> {
        let manifest = Manifest::load(manifest_path)?;
        manifest.validate()?;
        let output = output.unwrap_or_else(|| {
            cfg.output
                .directory
                .join(format!("{}.mp4", manifest.output_stem(manifest_path)))
        });
        Ok(Self {
            audio: manifest.audio.path.clone(),
            output,
            kind: JobKind::Timeline(Box::new(manifest)),
        })
    }

    /// Label used in logs.
    pub fn mode(&self) -> &'static str {
        match self.kind {
            JobKind::Single(_) => "single",
            JobKind::Cycling => "cycling",
            JobKind::Timeline(_) => "timeline",
        }
    }
}

/// Canvas, rate and length of one job.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JobPlan {
    pub size: Resolution,
    pub fps: Fps,
    pub duration: f64,
    /// Set when a configured cutoff shortened the render; the encoder then caps its output.
    pub duration_limit: Option<f64>,
}

impl JobPlan {
    pub fn total_frames(&self) -> u64 {
        self.fps.frames_in(self.duration)
    }
}

/// Decide canvas, frame rate and duration before anything is decoded.
pub fn plan_job(cfg: &Config, job: &RenderJob) -> OneoffResult<JobPlan> {
    let (size, fps, natural) = match &job.kind {
        JobKind::Timeline(m) => (m.resolution, m.fps()?, m.timeline.duration),
        _ => (
            cfg.output.resolution,
            cfg.output.fps()?,
            probe_media(&job.audio)?.require_duration()?,
        ),
    };
    let (duration, duration_limit) = match cfg.duration_override.cutoff_secs() {
        Some(cutoff) => {
            let d = cutoff.min(natural);
            tracing::info!(cutoff, natural, duration = d, "duration override active");
            (d, Some(d))
        }
        None => (natural, None),
    };
    let plan = JobPlan {
        size,
        fps,
        duration,
        duration_limit,
    };
    if plan.total_frames() == 0 {
        return Err(OneoffError::validation(format!(
            "duration {duration:.3}s yields no frames at {} fps",
            fps.as_f64()
        )));
    }
    Ok(plan)
}

/// Range render statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderStats {
    pub frames: u64,
    pub transition_frames: u64,
    /// Frames with no background segment.
    pub empty_frames: u64,
    pub elapsed: Duration,
}

/// GPU state, audio analysis and scene for one job. Built per job and never reused.
pub struct RenderContext {
    gpu: GpuContext,
    renderer: FrameRenderer,
    analysis: AudioAnalysis,
    scene: Scene,
    show_progress: bool,
}

impl RenderContext {
    pub fn new(
        gpu: GpuContext,
        analysis: AudioAnalysis,
        scene: Scene,
        size: Resolution,
    ) -> OneoffResult<Self> {
        let renderer = FrameRenderer::new(&gpu, size)?;
        Ok(Self {
            gpu,
            renderer,
            analysis,
            scene,
            show_progress: true,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn total_frames(&self) -> u64 {
        self.analysis.total_frames() as u64
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Render frame `idx`. The audio texture lives only for this call.
    pub fn render_frame(&mut self, idx: FrameIndex) -> OneoffResult<(Frame, &'static str)> {
        if idx.0 >= self.total_frames() {
            return Err(OneoffError::validation(format!(
                "frame {} is past the last frame {}",
                idx.0,
                self.total_frames().saturating_sub(1)
            )));
        }
        let t = self.analysis.fps().frame_time(idx);
        let packed = pack_audio_texture(&AudioFrame::from_analysis(&self.analysis, idx));
        let audio = upload_audio(&self.gpu, &packed)?;
        let inputs = FrameInputs {
            time: t as f32,
            resolution: self.renderer.size(),
            audio: &audio,
        };
        self.scene.render(&self.gpu, &self.renderer, t, &inputs)
    }

    /// Render every frame in order into `sink`.
    ///
    /// If any frame fails, the sink is aborted instead of finished so no truncated output is
    /// left behind.
    #[tracing::instrument(skip_all, fields(frames = self.total_frames()))]
    pub fn render_to(&mut self, sink: &mut dyn FrameSink, cfg: SinkConfig) -> OneoffResult<RenderStats> {
        let started = Instant::now();
        let mut stats = RenderStats::default();

        sink.begin(cfg)?;
        if let Err(err) = self.render_frames(sink, started, &mut stats) {
            tracing::error!(frame = stats.frames, error = %err, "render failed; discarding output");
            sink.abort();
            return Err(err);
        }
        sink.end()?;

        stats.elapsed = started.elapsed();
        if let Some(usage) = self.scene.usage() {
            usage.log();
        }
        tracing::info!(
            frames = stats.frames,
            transition_frames = stats.transition_frames,
            empty_frames = stats.empty_frames,
            elapsed_secs = stats.elapsed.as_secs_f64(),
            "render finished"
        );
        Ok(stats)
    }

    fn render_frames(
        &mut self,
        sink: &mut dyn FrameSink,
        started: Instant,
        stats: &mut RenderStats,
    ) -> OneoffResult<()> {
        let total = self.total_frames();
        for i in 0..total {
            let idx = FrameIndex(i);
            let (frame, label) = self.render_frame(idx)?;
            sink.push_frame(idx, &frame)?;

            stats.frames += 1;
            match label {
                "transition" => stats.transition_frames += 1,
                "idle" | "gap" => stats.empty_frames += 1,
                _ => {}
            }
            if self.show_progress && (i + 1) % PROGRESS_EVERY == 0 {
                let done = (i + 1) as f64;
                let percent = 100.0 * done / total as f64;
                let rate = done / started.elapsed().as_secs_f64().max(1e-9);
                tracing::info!(
                    frame = i + 1,
                    total,
                    "rendering {percent:.1}% at {rate:.1} fps ({label})"
                );
            }
        }
        Ok(())
    }
}

/// Build the job's render context.
pub fn prepare(cfg: &Config, job: &RenderJob, plan: &JobPlan) -> OneoffResult<RenderContext> {
    let analysis = AudioAnalysis::from_file(&job.audio, plan.duration, plan.fps)?;
    let gpu = GpuContext::new()?;
    tracing::info!(adapter = %gpu.adapter_name(), mode = job.mode(), "gpu ready");

    let settings = &cfg.shader_settings;
    let scene = match &job.kind {
        JobKind::Single(path) => Scene::single_file(&gpu, settings, path, plan.size, plan.duration)?,
        JobKind::Cycling => {
            Scene::cycling(&gpu, settings, plan.size, plan.duration, &mut rand::rng())?
        }
        JobKind::Timeline(manifest) => Scene::timeline(&gpu, settings, manifest, plan.size)?,
    };
    Ok(RenderContext::new(gpu, analysis, scene, plan.size)?.with_progress(cfg.debug.show_progress))
}

/// Render `job` into `sink`.
pub fn render_job_into(
    cfg: &Config,
    job: &RenderJob,
    sink: &mut dyn FrameSink,
) -> OneoffResult<RenderStats> {
    let plan = plan_job(cfg, job)?;
    tracing::info!(
        mode = job.mode(),
        audio = %job.audio.display(),
        width = plan.size.width,
        height = plan.size.height,
        fps = plan.fps.as_f64(),
        duration = plan.duration,
        frames = plan.total_frames(),
        "starting job"
    );
    let mut ctx = prepare(cfg, job, &plan)?;
    ctx.render_to(
        sink,
        SinkConfig {
            size: plan.size,
            fps: plan.fps,
            audio: Some(job.audio.clone()),
            duration_limit: plan.duration_limit,
        },
    )
}

/// Render `job` and encode it to `job.output` with ffmpeg.
pub fn run_job(cfg: &Config, job: &RenderJob) -> OneoffResult<RenderStats> {
    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(&job.output, &cfg.rendering));
    let stats = render_job_into(cfg, job, &mut sink)?;
    tracing::info!(out = %job.output.display(), "job complete");
    Ok(stats)
}

/// Output path for an audio file in batch mode.
pub fn batch_output_path(dir: &Path, audio: &Path) -> PathBuf {
    let stem = audio
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .replace([' ', '-'], "_");
    dir.join(format!("{}.mp4", sanitize_stem(&stem)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_picks_mode_from_multi_shader() {
        let mut cfg = Config::default();
        let job = RenderJob::from_config(&cfg);
        assert!(matches!(job.kind, JobKind::Single(ref p) if p == Path::new("Shaders/default.glsl")));
        assert_eq!(job.mode(), "single");
        cfg.shader_settings.multi_shader = true;
        assert_eq!(RenderJob::from_config(&cfg).mode(), "cycling");
    }

    #[test]
    fn missing_audio_fails_planning() {
        let cfg = Config::default();
        let job = RenderJob::shader("a.glsl", "/nonexistent/in.mp3", "out.mp4");
        let err = plan_job(&cfg, &job).unwrap_err();
        assert!(matches!(err, OneoffError::MissingResource { .. }));
    }

    #[test]
    fn timeline_plan_uses_manifest_and_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("song.mp3");
        std::fs::write(&audio, b"not really audio").unwrap();
        let manifest = dir.path().join("project.json");
        std::fs::write(
            &manifest,
            r#"{
                "version": 1,
                "audio": {"path": "song.mp3"},
                "resolution": {"width": 640, "height": 360},
                "frame_rate": 24,
                "timeline": {"duration": 20.0, "elements": [
                    {"id": "a", "type": "shader", "name": "a", "layer": 1,
                     "startTime": 0, "endTime": 20, "path": "song.mp3"}
                ]}
            }"#,
        )
        .unwrap();

        let mut cfg = Config::default();
        let job = RenderJob::timeline(&cfg, &manifest, None).unwrap();
        assert_eq!(job.output, Path::new("Output_Video/project.mp4"));
        let plan = plan_job(&cfg, &job).unwrap();
        assert_eq!(plan.total_frames(), 480);
        assert_eq!(plan.duration_limit, None);

        cfg.duration_override.enabled = true;
        cfg.duration_override.cutoff_time = "0:05".to_string();
        let plan = plan_job(&cfg, &job).unwrap();
        assert_eq!(plan.duration, 5.0);
        assert_eq!(plan.duration_limit, Some(5.0));
        assert_eq!(plan.total_frames(), 120);
    }

    #[test]
    fn batch_names_replace_spaces_and_dashes() {
        let out = batch_output_path(Path::new("Output_Video"), Path::new("in/My Song - Live.mp3"));
        assert_eq!(out, Path::new("Output_Video/My_Song___Live.mp4"));
    }
}
