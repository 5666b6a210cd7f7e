use oneoff_render::audio::analysis::AudioAnalysis;
use oneoff_render::audio::texture::{AudioFrame, pack_audio_texture};
use oneoff_render::gpu::GpuContext;
use oneoff_render::gpu::texture::upload_audio;
use oneoff_render::render::{FrameInputs, FrameRenderer, TransitionCompositor};
use oneoff_render::{
    CompiledShader, Fps, Frame, FrameIndex, FrameSink, InMemorySink, OneoffError, OneoffResult,
    RenderContext, Resolution, Scene, SinkConfig,
};

const SIZE: Resolution = Resolution {
    width: 64,
    height: 36,
};

const BLACK: &str = "#version 330
out vec4 fragColor;
void main() {
    fragColor = vec4(0.0, 0.0, 0.0, 1.0);
}
";

fn gpu() -> Option<GpuContext> {
    match GpuContext::new() {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            eprintln!("skipping: no gpu adapter ({err})");
            None
        }
    }
}

fn silence(seconds: f64, fps: Fps) -> AudioAnalysis {
    let rate = 22_050u32;
    let samples = vec![0.0f32; (seconds * f64::from(rate)) as usize];
    AudioAnalysis::from_samples(&samples, rate, seconds, fps).unwrap()
}

fn solid(rgb: [f32; 3]) -> String {
    format!(
        "#version 330
out vec4 fragColor;
void main() {{
    fragColor = vec4({:.3}, {:.3}, {:.3}, 1.0);
}}
",
        rgb[0], rgb[1], rgb[2]
    )
}

fn near(a: u8, b: u8) -> bool {
    a.abs_diff(b) <= 1
}

#[test]
fn ten_seconds_of_black_is_300_black_frames() {
    let Some(ctx) = gpu() else { return };
    let fps = Fps::new(30, 1).unwrap();
    let shader = CompiledShader::from_source(&ctx, "black.glsl", BLACK).unwrap();
    let scene = Scene::single(&ctx, shader, 10.0).unwrap();
    let mut job = RenderContext::new(ctx, silence(10.0, fps), scene, SIZE)
        .unwrap()
        .with_progress(false);

    let mut sink = InMemorySink::new();
    let stats = job
        .render_to(
            &mut sink,
            SinkConfig {
                size: SIZE,
                fps,
                audio: None,
                duration_limit: None,
            },
        )
        .unwrap();

    assert_eq!(stats.frames, 300);
    assert_eq!(stats.transition_frames, 0);
    assert!(sink.is_finished());
    assert_eq!(sink.frames().len(), 300);
    for (i, (idx, frame)) in sink.frames().iter().enumerate() {
        assert_eq!(idx.0, i as u64);
        assert_eq!(frame.data.len(), 64 * 36 * 3);
        assert!(frame.is_solid([0, 0, 0]), "frame {i} is not black");
    }
}

/// Accepts frames until `fail_at`, then errors; records how the render loop closed it.
#[derive(Default)]
struct FlakySink {
    fail_at: u64,
    pushed: u64,
    ended: bool,
    aborted: bool,
}

impl FrameSink for FlakySink {
    fn begin(&mut self, _cfg: SinkConfig) -> OneoffResult<()> {
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, _frame: &Frame) -> OneoffResult<()> {
        if idx.0 == self.fail_at {
            return Err(OneoffError::validation("disk full"));
        }
        self.pushed += 1;
        Ok(())
    }

    fn end(&mut self) -> OneoffResult<()> {
        self.ended = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}

#[test]
fn failed_frame_aborts_the_sink_instead_of_finishing_it() {
    let Some(ctx) = gpu() else { return };
    let fps = Fps::new(30, 1).unwrap();
    let shader = CompiledShader::from_source(&ctx, "black.glsl", BLACK).unwrap();
    let scene = Scene::single(&ctx, shader, 1.0).unwrap();
    let mut job = RenderContext::new(ctx, silence(1.0, fps), scene, SIZE)
        .unwrap()
        .with_progress(false);

    let mut sink = FlakySink {
        fail_at: 5,
        ..Default::default()
    };
    let err = job
        .render_to(
            &mut sink,
            SinkConfig {
                size: SIZE,
                fps,
                audio: None,
                duration_limit: None,
            },
        )
        .unwrap_err();
    assert!(err.to_string().contains("disk full"), "{err}");
    assert_eq!(sink.pushed, 5);
    assert!(sink.aborted);
    assert!(!sink.ended);
}

#[test]
fn audio_channel_carries_the_waveform_rows() {
    let Some(ctx) = gpu() else { return };
    let fps = Fps::new(30, 1).unwrap();
    let analysis = silence(1.0, fps);
    let src = "#version 330
uniform sampler2D iChannel0;
uniform vec2 iResolution;
out vec4 fragColor;
void main() {
    float wave = texture(iChannel0, vec2(0.5, 0.75)).r;
    float spec = texture(iChannel0, vec2(0.5, 0.001)).r;
    fragColor = vec4(wave, spec, 0.0, 1.0);
}
";
    let mut shader = CompiledShader::from_source(&ctx, "audio.glsl", src).unwrap();
    let renderer = FrameRenderer::new(&ctx, SIZE).unwrap();
    let packed = pack_audio_texture(&AudioFrame::from_analysis(&analysis, FrameIndex(3)));
    let audio = upload_audio(&ctx, &packed).unwrap();
    let inputs = FrameInputs {
        time: 0.1,
        resolution: SIZE,
        audio: &audio,
    };
    let frame = renderer.render_shader(&ctx, &mut shader, &inputs).unwrap();
    let px = &frame.data[0..3];
    assert!(near(px[0], 128), "waveform of silence should sit at mid-gray, got {px:?}");
    assert_eq!(px[1], 0);
}

#[test]
fn readback_is_upright() {
    let Some(ctx) = gpu() else { return };
    let fps = Fps::new(30, 1).unwrap();
    let analysis = silence(1.0, fps);
    let src = "#version 330
uniform vec2 iResolution;
out vec4 fragColor;
void main() {
    fragColor = vec4(gl_FragCoord.y / iResolution.y, 0.0, 0.0, 1.0);
}
";
    let mut shader = CompiledShader::from_source(&ctx, "ramp.glsl", src).unwrap();
    let renderer = FrameRenderer::new(&ctx, SIZE).unwrap();
    let packed = pack_audio_texture(&AudioFrame::from_analysis(&analysis, FrameIndex(0)));
    let audio = upload_audio(&ctx, &packed).unwrap();
    let inputs = FrameInputs {
        time: 0.0,
        resolution: SIZE,
        audio: &audio,
    };
    let frame = renderer.render_shader(&ctx, &mut shader, &inputs).unwrap();
    let top = frame.data[0];
    let bottom = frame.data[frame.data.len() - 3];
    assert!(top > 240, "top row should be bright, got {top}");
    assert!(bottom < 15, "bottom row should be dark, got {bottom}");
}

#[test]
fn crossfade_blends_halfway() {
    let Some(ctx) = gpu() else { return };
    let fps = Fps::new(30, 1).unwrap();
    let analysis = silence(1.0, fps);
    let mut red = CompiledShader::from_source(&ctx, "red.glsl", &solid([1.0, 0.0, 0.0])).unwrap();
    let mut blue =
        CompiledShader::from_source(&ctx, "blue.glsl", &solid([0.0, 0.0, 1.0])).unwrap();
    let mut compositor = TransitionCompositor::new(&ctx).unwrap();
    let renderer = FrameRenderer::new(&ctx, SIZE).unwrap();
    let packed = pack_audio_texture(&AudioFrame::from_analysis(&analysis, FrameIndex(0)));
    let audio = upload_audio(&ctx, &packed).unwrap();
    let inputs = FrameInputs {
        time: 0.0,
        resolution: SIZE,
        audio: &audio,
    };

    let frame = renderer
        .render_transition(
            &ctx,
            &mut red,
            Some(&mut blue),
            &mut compositor,
            Some("not-compiled.glsl"),
            0.5,
            &inputs,
        )
        .unwrap();
    for px in frame.pixels() {
        assert!(near(px[0], 128) || near(px[0], 127), "{px:?}");
        assert_eq!(px[1], 0);
        assert!(near(px[2], 128) || near(px[2], 127), "{px:?}");
    }

    let start = renderer
        .render_transition(&ctx, &mut red, Some(&mut blue), &mut compositor, None, 0.0, &inputs)
        .unwrap();
    assert!(start.is_solid([255, 0, 0]));
}

#[test]
fn feedback_buffer_accumulates_one_frame_late() {
    let Some(ctx) = gpu() else { return };
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("glow.glsl");
    std::fs::write(
        &main,
        "#version 330
uniform sampler2D iChannel1;
uniform vec2 iResolution;
out vec4 fragColor;
void main() {
    fragColor = texture(iChannel1, gl_FragCoord.xy / iResolution);
}
",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("glow.buffer.A.glsl"),
        "#version 330
uniform sampler2D iChannel1;
uniform vec2 iResolution;
out vec4 fragColor;
void main() {
    vec4 prev = texture(iChannel1, gl_FragCoord.xy / iResolution);
    fragColor = vec4(min(prev.r + 0.25, 1.0), 0.0, 0.0, 1.0);
}
",
    )
    .unwrap();

    let dirs = oneoff_render::shader::resources::ResourceDirs {
        textures: dir.path().join("Textures"),
        cubemaps: dir.path().join("Cubemaps"),
    };
    let mut shader = CompiledShader::load(&ctx, &main, None, &dirs, SIZE).unwrap();
    assert_eq!(shader.buffers().len(), 1);

    let fps = Fps::new(30, 1).unwrap();
    let analysis = silence(1.0, fps);
    let renderer = FrameRenderer::new(&ctx, SIZE).unwrap();
    let mut reds = Vec::new();
    for i in 0..3 {
        let packed = pack_audio_texture(&AudioFrame::from_analysis(&analysis, FrameIndex(i)));
        let audio = upload_audio(&ctx, &packed).unwrap();
        let inputs = FrameInputs {
            time: i as f32 / 30.0,
            resolution: SIZE,
            audio: &audio,
        };
        let frame = renderer.render_shader(&ctx, &mut shader, &inputs).unwrap();
        reds.push(frame.data[0]);
    }
    assert!(near(reds[0], 64), "{reds:?}");
    assert!(near(reds[1], 128), "{reds:?}");
    assert!(near(reds[2], 191), "{reds:?}");
}
