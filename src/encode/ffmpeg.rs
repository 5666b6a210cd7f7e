use std::ffi::OsString;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};

use anyhow::Context as _;

use crate::assets::media::is_tool_on_path;
use crate::config::RenderingConfig;
use crate::encode::sink::{FrameSink, SinkConfig, check_frame};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{OneoffError, OneoffResult};
use crate::render::Frame;

/// Options for [`FfmpegSink`] output.
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    pub out_path: PathBuf,
    pub crf: u32,
    pub preset: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl FfmpegSinkOpts {
    pub fn new(out_path: impl Into<PathBuf>, rendering: &RenderingConfig) -> Self {
        Self {
            out_path: out_path.into(),
            crf: rendering.quality.crf,
            preset: rendering.quality.preset.clone(),
            audio_codec: rendering.audio.codec.clone(),
            audio_bitrate: rendering.audio.bitrate.clone(),
        }
    }
}

/// Streams RGB24 frames into the system `ffmpeg`, which encodes H.264 and muxes the audio.
///
/// ffmpeg writes to a staging file next to the output. It is renamed into place only when the
/// encode succeeds; an aborted, failed or dropped sink removes it.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,
    staged: Option<PathBuf>,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
}

impl FfmpegSink {
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            staged: None,
            child: None,
            stdin: None,
            stderr_drain: None,
            cfg: None,
            last_idx: None,
        }
    }

    /// Close stdin, wait for ffmpeg and collect its stderr.
    fn wait_child(&mut self) -> OneoffResult<(ExitStatus, Vec<u8>)> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| OneoffError::validation("ffmpeg sink not started"))?;
        let status = child
            .wait()
            .context("failed to wait for ffmpeg to finish")?;
        let stderr = self.join_stderr()?;
        self.cfg = None;
        Ok((status, stderr))
    }

    fn join_stderr(&mut self) -> OneoffResult<Vec<u8>> {
        match self.stderr_drain.take() {
            Some(handle) => Ok(handle
                .join()
                .map_err(|_| OneoffError::validation("ffmpeg stderr drain thread panicked"))?
                .context("ffmpeg stderr read failed")?),
            None => Ok(Vec::new()),
        }
    }

    fn remove_staged(&mut self) {
        if let Some(path) = self.staged.take()
            && path.exists()
            && let Err(err) = std::fs::remove_file(&path)
        {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove partial output");
        }
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.child.is_some() || self.staged.is_some() {
            self.abort();
        }
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> OneoffResult<()> {
        cfg.validate()?;
        ensure_parent_dir(&self.opts.out_path)?;
        if let Some(audio) = &cfg.audio
            && !audio.is_file()
        {
            return Err(OneoffError::missing("audio file", audio));
        }
        if !is_tool_on_path("ffmpeg") {
            return Err(OneoffError::validation(
                "ffmpeg is required for encoding, but was not found on PATH",
            ));
        }

        let staged = staging_path(&self.opts.out_path);
        let mut child = Command::new("ffmpeg")
            .args(encoder_args(&self.opts, &cfg, &staged))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OneoffError::validation(format!("failed to spawn ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| OneoffError::validation("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| OneoffError::validation("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        tracing::debug!(out = %self.opts.out_path.display(), staged = %staged.display(), "ffmpeg encoder started");
        self.staged = Some(staged);
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &Frame) -> OneoffResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| OneoffError::validation("ffmpeg sink not started"))?;
        check_frame(cfg, self.last_idx, idx, frame)?;
        self.last_idx = Some(idx);

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(OneoffError::validation("ffmpeg sink is already finalized"));
        };
        if let Err(e) = stdin.write_all(&frame.data) {
            // A closed pipe means ffmpeg already quit; its exit status and stderr say why.
            let exited = self.wait_child();
            self.remove_staged();
            return Err(match exited {
                Ok((status, stderr)) if !status.success() => {
                    OneoffError::external("ffmpeg", status, &stderr)
                }
                _ => OneoffError::validation(format!(
                    "failed to write frame {} to ffmpeg: {e}",
                    idx.0
                )),
            });
        }
        Ok(())
    }

    fn end(&mut self) -> OneoffResult<()> {
        let (status, stderr) = match self.wait_child() {
            Ok(done) => done,
            Err(err) => {
                self.remove_staged();
                return Err(err);
            }
        };
        if !status.success() {
            self.remove_staged();
            return Err(OneoffError::external("ffmpeg", status, &stderr));
        }
        if let Some(staged) = self.staged.take() {
            if let Err(err) = std::fs::rename(&staged, &self.opts.out_path) {
                self.staged = Some(staged);
                self.remove_staged();
                return Err(anyhow::Error::new(err)
                    .context(format!(
                        "failed to move encoded video to '{}'",
                        self.opts.out_path.display()
                    ))
                    .into());
            }
        }
        tracing::info!(out = %self.opts.out_path.display(), "encoded video");
        Ok(())
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill() {
                tracing::debug!(error = %err, "ffmpeg already exited");
            }
            if let Err(err) = child.wait() {
                tracing::warn!(error = %err, "failed to reap ffmpeg");
            }
        }
        if let Err(err) = self.join_stderr() {
            tracing::debug!(error = %err, "ffmpeg stderr lost on abort");
        }
        self.cfg = None;
        self.remove_staged();
        tracing::warn!(out = %self.opts.out_path.display(), "encode aborted; partial output removed");
    }
}

/// Staging file ffmpeg writes to: `<stem>.partial.<ext>` beside the output.
pub fn staging_path(out: &Path) -> PathBuf {
    let stem = out
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match out.extension() {
        Some(ext) => format!("{stem}.partial.{}", ext.to_string_lossy()),
        None => format!("{stem}.partial"),
    };
    out.with_file_name(name)
}

/// Full ffmpeg argument list for one encode.
pub fn encoder_args(opts: &FfmpegSinkOpts, cfg: &SinkConfig, out: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-y",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "-s",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(format!("{}x{}", cfg.size.width, cfg.size.height).into());
    args.push("-r".into());
    args.push(cfg.fps.ffmpeg_arg().into());
    args.push("-i".into());
    args.push("pipe:0".into());
    if let Some(audio) = &cfg.audio {
        args.push("-i".into());
        args.push(audio.as_os_str().to_owned());
    }
    for a in ["-c:v", "libx264", "-crf"] {
        args.push(a.into());
    }
    args.push(opts.crf.to_string().into());
    args.push("-preset".into());
    args.push(opts.preset.clone().into());
    args.push("-pix_fmt".into());
    args.push("yuv420p".into());
    if cfg.audio.is_some() {
        args.push("-c:a".into());
        args.push(opts.audio_codec.clone().into());
        args.push("-b:a".into());
        args.push(opts.audio_bitrate.clone().into());
        args.push("-shortest".into());
    } else {
        args.push("-an".into());
    }
    if let Some(limit) = cfg.duration_limit {
        args.push("-t".into());
        args.push(format!("{limit:.3}").into());
    }
    args.push(out.as_os_str().to_owned());
    args
}

pub fn ensure_parent_dir(path: &Path) -> OneoffResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("failed to create output directory '{}'", parent.display())
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::foundation::core::{Fps, Resolution};

    fn cfg(audio: Option<&str>, limit: Option<f64>) -> SinkConfig {
        SinkConfig {
            size: Resolution {
                width: 640,
                height: 360,
            },
            fps: Fps::new(30, 1).unwrap(),
            audio: audio.map(PathBuf::from),
            duration_limit: limit,
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn args_mux_audio_with_configured_quality() {
        let opts = FfmpegSinkOpts::new("out/x.mp4", &Config::default().rendering);
        let args = strings(encoder_args(&opts, &cfg(Some("in.mp3"), None), &opts.out_path));
        let joined = args.join(" ");
        assert!(joined.starts_with("-y -loglevel error -f rawvideo -pix_fmt rgb24 -s 640x360 -r 30/1 -i pipe:0 -i in.mp3"));
        assert!(joined.contains("-c:v libx264 -crf 18 -preset medium -pix_fmt yuv420p"));
        assert!(joined.contains("-c:a aac -b:a 192k -shortest"));
        assert!(!args.contains(&"-t".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out/x.mp4"));
    }

    #[test]
    fn duration_limit_adds_t() {
        let opts = FfmpegSinkOpts::new("x.mp4", &Config::default().rendering);
        let args = strings(encoder_args(&opts, &cfg(Some("in.mp3"), Some(42.5)), &opts.out_path));
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "42.500");
    }

    #[test]
    fn staging_path_keeps_the_container_extension() {
        assert_eq!(
            staging_path(Path::new("out/song.mp4")),
            PathBuf::from("out/song.partial.mp4")
        );
        assert_eq!(staging_path(Path::new("bare")), PathBuf::from("bare.partial"));
    }

    fn small() -> SinkConfig {
        SinkConfig {
            size: Resolution {
                width: 16,
                height: 16,
            },
            fps: Fps::new(30, 1).unwrap(),
            audio: None,
            duration_limit: None,
        }
    }

    #[test]
    fn dropped_sink_leaves_no_output_behind() {
        if !is_tool_on_path("ffmpeg") {
            eprintln!("skipping: ffmpeg not on PATH");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("song.mp4");
        let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(&out, &Config::default().rendering));
        sink.begin(small()).unwrap();
        sink.push_frame(FrameIndex(0), &Frame::black(small().size))
            .unwrap();
        drop(sink);
        assert!(!out.exists());
        assert!(!staging_path(&out).exists());
    }

    #[test]
    fn aborted_sink_leaves_no_output_behind() {
        if !is_tool_on_path("ffmpeg") {
            eprintln!("skipping: ffmpeg not on PATH");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("song.mp4");
        let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(&out, &Config::default().rendering));
        sink.begin(small()).unwrap();
        for i in 0..3 {
            sink.push_frame(FrameIndex(i), &Frame::black(small().size))
                .unwrap();
        }
        sink.abort();
        assert!(!out.exists());
        assert!(!staging_path(&out).exists());
        assert!(sink.end().is_err());
    }

    #[test]
    fn finished_encode_lands_only_at_the_output_path() {
        if !is_tool_on_path("ffmpeg") {
            eprintln!("skipping: ffmpeg not on PATH");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("song.mp4");
        let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(&out, &Config::default().rendering));
        sink.begin(small()).unwrap();
        for i in 0..3 {
            sink.push_frame(FrameIndex(i), &Frame::black(small().size))
                .unwrap();
        }
        match sink.end() {
            Ok(()) => assert!(out.is_file()),
            // An ffmpeg build without libx264 fails the encode; nothing may be left either way.
            Err(err) => {
                assert!(matches!(err, OneoffError::ExternalTool { .. }), "{err}");
                assert!(!out.exists());
            }
        }
        assert!(!staging_path(&out).exists());
    }

    #[test]
    fn silent_output_drops_audio_args() {
        let opts = FfmpegSinkOpts::new("x.mp4", &Config::default().rendering);
        let args = strings(encoder_args(&opts, &cfg(None, None), &opts.out_path));
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-shortest".to_string()));
    }
}
