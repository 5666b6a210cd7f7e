use std::collections::HashMap;
use std::path::Path;

use rand::Rng;

use crate::config::ShaderSettings;
use crate::foundation::core::Resolution;
use crate::foundation::error::{OneoffError, OneoffResult};
use crate::gpu::GpuContext;
use crate::layer::ForegroundLayer;
use crate::render::{CompiledShader, Frame, FrameInputs, FrameRenderer, TransitionCompositor};
use crate::select::{ShaderCycler, TransitionCycler};
use crate::shader::metadata::{ShaderMetadataIndex, load_transition_metadata};
use crate::shader::resources::{
    ResourceDirs, discover_shaders, discover_transitions, resolve_transition_file,
};
use crate::timeline::auto::{CycleTransitions, plan_cycle};
use crate::timeline::manifest::{BACKGROUND_LAYER, ElementKind, FOREGROUND_LAYER, Manifest};
use crate::timeline::{FrameState, OverlapTimeline, TimelineElement};

/// Selection state kept for the end-of-job usage report.
#[derive(Debug)]
pub struct SelectionUsage {
    pub shaders: ShaderCycler,
    pub transitions: Option<TransitionCycler>,
}

impl SelectionUsage {
    pub fn log(&self) {
        for (name, count) in self.shaders.usage() {
            tracing::info!(shader = %name, count, "shader usage");
        }
        if let Some(t) = &self.transitions {
            for (name, count) in t.usage().filter(|(_, c)| *c > 0) {
                tracing::info!(transition = %name, count, "transition usage");
            }
            tracing::info!(
                total = t.total_used(),
                unique = t.unique_used(),
                available = t.len(),
                "transition totals"
            );
        }
    }
}

/// Everything the background layer draws over time, plus the optional foreground.
#[derive(Debug)]
pub struct Scene {
    shaders: Vec<CompiledShader>,
    /// Timeline element id -> index into `shaders`.
    by_element: HashMap<String, usize>,
    timeline: OverlapTimeline,
    compositor: TransitionCompositor,
    foreground: Option<ForegroundLayer>,
    usage: Option<SelectionUsage>,
}

impl Scene {
    /// One shader covering `[0, duration)`.
    pub fn single(ctx: &GpuContext, shader: CompiledShader, duration: f64) -> OneoffResult<Self> {
        let element = TimelineElement::new("main", ElementKind::Shader, 0.0, duration)
            .with_name(shader.name());
        Ok(Self {
            by_element: HashMap::from([(element.id.clone(), 0)]),
            timeline: OverlapTimeline::from_sequential(&[element]),
            shaders: vec![shader],
            compositor: TransitionCompositor::new(ctx)?,
            foreground: None,
            usage: None,
        })
    }

    /// Compile `path` with its metadata and wrap it as a single-shader scene.
    pub fn single_file(
        ctx: &GpuContext,
        settings: &ShaderSettings,
        path: &Path,
        size: Resolution,
        duration: f64,
    ) -> OneoffResult<Self> {
        let metadata = ShaderMetadataIndex::load(&settings.metadata_file);
        let shader =
            CompiledShader::load(ctx, path, metadata.for_shader(path), &dirs(settings), size)?;
        tracing::info!(shader = %shader.name(), buffers = shader.buffers().len(), "compiled shader");
        Self::single(ctx, shader, duration)
    }

    /// Compile every discovered shader and plan a cycling timeline over the survivors.
    pub fn cycling(
        ctx: &GpuContext,
        settings: &ShaderSettings,
        size: Resolution,
        duration: f64,
        rng: &mut impl Rng,
    ) -> OneoffResult<Self> {
        let metadata = ShaderMetadataIndex::load(&settings.metadata_file);
        let dirs = dirs(settings);

        let mut shaders = Vec::new();
        for path in discover_shaders(&settings.shaders_dir)? {
            match CompiledShader::load(ctx, &path, metadata.for_shader(&path), &dirs, size) {
                Ok(shader) => {
                    tracing::info!(shader = %shader.name(), buffers = shader.buffers().len(), "compiled shader");
                    shaders.push(shader);
                }
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(shader = %path.display(), error = %err, "shader excluded");
                }
                Err(err) => return Err(err),
            }
        }
        if shaders.is_empty() {
            return Err(OneoffError::validation(format!(
                "no shader in '{}' compiled",
                settings.shaders_dir.display()
            )));
        }
        let names: Vec<String> = shaders.iter().map(|s| s.name().to_string()).collect();
        let mut shader_cycler = ShaderCycler::new(names, &settings.randomization)?;

        let mut compositor = TransitionCompositor::new(ctx)?;
        let mut transition_cycler = None;
        if settings.transitions.enabled {
            let records = load_transition_metadata(&settings.transitions.config_file);
            for path in discover_transitions(&settings.transitions.folder)? {
                let record = file_name(&path).and_then(|n| records.get(n));
                if let Err(err) = compositor.add_file(ctx, &path, record) {
                    tracing::warn!(transition = %path.display(), error = %err, "transition excluded");
                }
            }
            if compositor.is_empty() {
                tracing::warn!("no transitions compiled; cycling without transitions");
            } else {
                let cycler = TransitionCycler::new(
                    &compositor.names(),
                    &records,
                    settings.transitions.randomization.history_size,
                );
                tracing::info!(
                    compiled = compositor.len(),
                    groups = ?cycler.score_summary(),
                    "transitions ready"
                );
                transition_cycler = Some(cycler);
            }
        }

        let plan = plan_cycle(
            duration,
            &mut shader_cycler,
            transition_cycler
                .as_mut()
                .map(|cycler| CycleTransitions {
                    cycler,
                    duration: settings.transitions.duration,
                }),
            rng,
        );
        let timeline = OverlapTimeline::from_sequential(&plan);

        let mut by_element = HashMap::new();
        for el in timeline.elements() {
            let idx = shaders
                .iter()
                .position(|s| s.name() == el.name)
                .ok_or_else(|| OneoffError::validation(format!("planned unknown shader '{}'", el.name)))?;
            by_element.insert(el.id.clone(), idx);
        }
        tracing::info!(
            segments = timeline.elements().len(),
            transitions = timeline.pairs().count(),
            "cycling timeline planned"
        );

        Ok(Self {
            shaders,
            by_element,
            timeline,
            compositor,
            foreground: None,
            usage: Some(SelectionUsage {
                shaders: shader_cycler,
                transitions: transition_cycler,
            }),
        })
    }

    /// Compile a manifest's shader elements, its referenced transitions and its foreground clips.
    pub fn timeline(
        ctx: &GpuContext,
        settings: &ShaderSettings,
        manifest: &Manifest,
        size: Resolution,
    ) -> OneoffResult<Self> {
        let metadata = ShaderMetadataIndex::load(&settings.metadata_file);
        let dirs = dirs(settings);

        let timeline = OverlapTimeline::from_sequential(&manifest.layer(BACKGROUND_LAYER));
        let mut shaders = Vec::with_capacity(timeline.elements().len());
        let mut by_element = HashMap::new();
        for el in timeline.elements() {
            let path = el.path.as_deref().ok_or_else(|| {
                OneoffError::validation(format!("shader element '{}' has no path", el.id))
            })?;
            let shader = CompiledShader::load(ctx, path, metadata.for_shader(path), &dirs, size)?;
            tracing::info!(element = %el.id, shader = %shader.name(), start = el.start, end = el.end, "compiled element");
            by_element.insert(el.id.clone(), shaders.len());
            shaders.push(shader);
        }

        let mut compositor = TransitionCompositor::new(ctx)?;
        let records = load_transition_metadata(&settings.transitions.config_file);
        for name in timeline.transition_names() {
            let Some(path) = resolve_transition_file(&settings.transitions.folder, name) else {
                tracing::warn!(transition = %name, "transition file not found; using cross-fade");
                continue;
            };
            let record = file_name(&path).and_then(|n| records.get(n));
            if let Err(err) = compositor.add_file(ctx, &path, record) {
                tracing::warn!(transition = %name, error = %err, "transition failed to compile; using cross-fade");
            }
        }

        let clips: Vec<TimelineElement> = manifest
            .layer(FOREGROUND_LAYER)
            .into_iter()
            .filter(|e| e.kind == ElementKind::Video)
            .collect();
        let foreground = (!clips.is_empty()).then(|| {
            tracing::info!(clips = clips.len(), "foreground layer enabled");
            ForegroundLayer::new(clips, size)
        });

        Ok(Self {
            shaders,
            by_element,
            timeline,
            compositor,
            foreground,
            usage: None,
        })
    }

    pub fn shaders(&self) -> &[CompiledShader] {
        &self.shaders
    }

    pub fn overlap_timeline(&self) -> &OverlapTimeline {
        &self.timeline
    }

    pub fn usage(&self) -> Option<&SelectionUsage> {
        self.usage.as_ref()
    }

    pub fn has_foreground(&self) -> bool {
        self.foreground.is_some()
    }

    /// Render the background at `t`, then key the foreground over it when there is one.
    ///
    /// Returns the frame and the label of the background state.
    pub fn render(
        &mut self,
        ctx: &GpuContext,
        renderer: &FrameRenderer,
        t: f64,
        inputs: &FrameInputs<'_>,
    ) -> OneoffResult<(Frame, &'static str)> {
        let Self {
            shaders,
            by_element,
            timeline,
            compositor,
            foreground,
            ..
        } = self;
        let state = timeline.state_at(t);
        let label = state.label();
        let background = match state {
            FrameState::Element(el) => {
                let i = index_of(by_element, el)?;
                renderer.render_shader(ctx, &mut shaders[i], inputs)?
            }
            FrameState::Transition {
                from,
                to,
                progress,
                transition,
            } => {
                let (a, b) = (index_of(by_element, from)?, index_of(by_element, to)?);
                if a == b {
                    renderer.render_transition(
                        ctx,
                        &mut shaders[a],
                        None,
                        compositor,
                        transition,
                        progress,
                        inputs,
                    )?
                } else {
                    let [from, to] = shaders
                        .get_disjoint_mut([a, b])
                        .map_err(|e| OneoffError::validation(e.to_string()))?;
                    renderer.render_transition(
                        ctx,
                        from,
                        Some(to),
                        compositor,
                        transition,
                        progress,
                        inputs,
                    )?
                }
            }
            FrameState::Idle | FrameState::Gap => Frame::black(renderer.size()),
        };

        let frame = match foreground {
            Some(fg) => crate::layer::key_over(&fg.frame_at(t)?, &background)?,
            None => background,
        };
        Ok((frame, label))
    }
}

fn index_of(by_element: &HashMap<String, usize>, el: &TimelineElement) -> OneoffResult<usize> {
    by_element
        .get(&el.id)
        .copied()
        .ok_or_else(|| OneoffError::validation(format!("no shader compiled for element '{}'", el.id)))
}

fn dirs(settings: &ShaderSettings) -> ResourceDirs {
    ResourceDirs {
        textures: settings.textures_dir.clone(),
        cubemaps: settings.cubemaps_dir.clone(),
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}
