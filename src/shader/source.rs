use std::collections::BTreeMap;

use naga::front::glsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::foundation::error::{OneoffError, OneoffResult};

/// Binding slot of the uniform block inside group 0.
pub const UNIFORM_BLOCK_BINDING: u32 = 0;
/// Name of the generated uniform block.
const BLOCK_NAME: &str = "ShaderInputs";
/// Fragment entry point of every program.
pub const FRAGMENT_ENTRY: &str = "main";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Dimensionality of a sampler channel.
pub enum ChannelKind {
    D2,
    Cube,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// One `uniform sampler2D|samplerCube` declaration split into texture and sampler bindings.
pub struct ChannelBinding {
    pub name: String,
    pub kind: ChannelKind,
    pub texture_binding: u32,
    pub sampler_binding: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    UInt,
    Bool,
    /// Matrices, arrays and other members the renderer never writes.
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Byte offset and kind of one member of the uniform block.
pub struct UniformSlot {
    pub offset: u32,
    pub kind: UniformKind,
}

#[derive(Clone, Copy, Debug, PartialEq)]
/// Value written into a uniform slot.
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Int(i32),
}

impl UniformValue {
    fn components(self) -> Vec<f32> {
        match self {
            Self::Float(v) => vec![v],
            Self::Vec2(v) => v.to_vec(),
            Self::Vec3(v) => v.to_vec(),
            Self::Vec4(v) => v.to_vec(),
            Self::Int(v) => vec![v as f32],
        }
    }

    /// Encode for a slot of `kind`, coercing between scalar and vector widths.
    ///
    /// A `Vec2` written into a `vec3` slot gets `z = 1.0`, which is the pixel aspect in
    /// `iResolution`. Missing components are otherwise zero. Returns `None` for
    /// [`UniformKind::Other`].
    pub fn encode_for(self, kind: UniformKind) -> Option<Vec<u8>> {
        let comps = self.components();
        let first = comps.first().copied().unwrap_or(0.0);
        let floats = |n: usize| -> Vec<u8> {
            (0..n)
                .map(|i| match comps.get(i) {
                    Some(v) => *v,
                    None if n == 3 && i == 2 && comps.len() == 2 => 1.0,
                    None => 0.0,
                })
                .flat_map(f32::to_le_bytes)
                .collect()
        };
        match kind {
            UniformKind::Float => Some(first.to_le_bytes().to_vec()),
            UniformKind::Vec2 => Some(floats(2)),
            UniformKind::Vec3 => Some(floats(3)),
            UniformKind::Vec4 => Some(floats(4)),
            UniformKind::Int => {
                let v = match self {
                    Self::Int(v) => v,
                    _ => first.round() as i32,
                };
                Some(v.to_le_bytes().to_vec())
            }
            UniformKind::UInt => Some((first.max(0.0).round() as u32).to_le_bytes().to_vec()),
            UniformKind::Bool => Some(u32::from(first != 0.0).to_le_bytes().to_vec()),
            UniformKind::Other => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
/// What a compiled program exposes to the renderer.
pub struct ProgramInterface {
    uniforms: BTreeMap<String, UniformSlot>,
    block_size: u64,
    channels: Vec<ChannelBinding>,
    defaults: Vec<(String, UniformValue)>,
}

impl ProgramInterface {
    /// Look up a uniform by name. Programs that never declare a uniform get `None`.
    pub fn uniform(&self, name: &str) -> Option<UniformSlot> {
        self.uniforms.get(name).copied()
    }

    /// Size in bytes of the uniform block, 0 when the program declares no plain uniforms.
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn channels(&self) -> &[ChannelBinding] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelBinding> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Initial values taken from `uniform T name = value;` declarations.
    pub fn defaults(&self) -> &[(String, UniformValue)] {
        &self.defaults
    }
}

/// CPU copy of a program's uniform block.
#[derive(Clone, Debug)]
pub struct UniformBlock {
    bytes: Vec<u8>,
}

impl UniformBlock {
    /// A zeroed block with the program's declared defaults applied.
    pub fn new(iface: &ProgramInterface) -> Self {
        let mut block = Self {
            bytes: vec![0; iface.block_size as usize],
        };
        for (name, value) in &iface.defaults {
            block.set(iface, name, *value);
        }
        block
    }

    /// Write `value` when the program declares `name`; returns whether it was written.
    pub fn set(&mut self, iface: &ProgramInterface, name: &str, value: UniformValue) -> bool {
        let Some(slot) = iface.uniform(name) else {
            return false;
        };
        let Some(encoded) = value.encode_for(slot.kind) else {
            return false;
        };
        let start = slot.offset as usize;
        let end = start + encoded.len();
        if end > self.bytes.len() {
            return false;
        }
        self.bytes[start..end].copy_from_slice(&encoded);
        true
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Result of rewriting a GL-style fragment program into a bindable form.
#[derive(Clone, Debug)]
pub struct AdaptedSource {
    pub glsl: String,
    pub channels: Vec<ChannelBinding>,
    pub defaults: Vec<(String, UniformValue)>,
}

/// Rewrite a single-stage GL fragment program for the naga GLSL frontend.
///
/// Plain uniforms move into one std140 block at binding 0, each sampler becomes a
/// texture/sampler pair reachable under its original name, and the color output gets
/// `location = 0`.
pub fn adapt_fragment_source(source: &str) -> OneoffResult<AdaptedSource> {
    let mut body: Vec<String> = Vec::new();
    let mut members: Vec<String> = Vec::new();
    let mut channels: Vec<ChannelBinding> = Vec::new();
    let mut defaults = Vec::new();
    let mut has_output = false;

    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#version")
            || trimmed.starts_with("#extension")
            || trimmed.starts_with("precision ")
        {
            continue;
        }
        if trimmed.starts_with("uniform ") && !line.contains('{') {
            let mut kept = String::new();
            let stmts: Vec<&str> = line.split(';').collect();
            let last = stmts.len() - 1;
            for (i, stmt) in stmts.iter().enumerate() {
                let stmt_trimmed = stmt.trim();
                if let Some(decl) = stmt_trimmed.strip_prefix("uniform ") {
                    adapt_uniform(decl, &mut members, &mut channels, &mut defaults, &mut kept)?;
                } else if !stmt_trimmed.is_empty() {
                    kept.push_str(stmt);
                    if i < last {
                        kept.push(';');
                    }
                }
            }
            body.push(kept);
            continue;
        }
        if !has_output
            && trimmed.starts_with("out ")
            && trimmed.trim_end().ends_with(';')
            && !trimmed.contains('(')
        {
            has_output = true;
            body.push(format!("layout(location = 0) {trimmed}"));
            continue;
        }
        body.push(rewrite_legacy_calls(line));
    }

    let mut out = String::from("#version 450\n");
    if !members.is_empty() {
        out.push_str(&format!(
            "layout(set = 0, binding = {UNIFORM_BLOCK_BINDING}, std140) uniform {BLOCK_NAME} {{\n"
        ));
        for m in &members {
            out.push_str("    ");
            out.push_str(m);
            out.push_str(";\n");
        }
        out.push_str("};\n");
    }
    if !has_output && source.contains("gl_FragColor") {
        out.push_str("layout(location = 0) out vec4 oneoff_FragColor;\n");
        out.push_str("#define gl_FragColor oneoff_FragColor\n");
    }
    for line in body {
        out.push_str(&line);
        out.push('\n');
    }

    Ok(AdaptedSource {
        glsl: out,
        channels,
        defaults,
    })
}

/// `texture2D(..)` and `textureCube(..)` are type names under `#version 450`.
fn rewrite_legacy_calls(line: &str) -> String {
    line.replace("texture2DLod(", "textureLod(")
        .replace("textureCubeLod(", "textureLod(")
        .replace("texture2D(", "texture(")
        .replace("textureCube(", "texture(")
}

fn adapt_uniform(
    decl: &str,
    members: &mut Vec<String>,
    channels: &mut Vec<ChannelBinding>,
    defaults: &mut Vec<(String, UniformValue)>,
    kept: &mut String,
) -> OneoffResult<()> {
    let mut words = decl
        .split_whitespace()
        .filter(|w| !matches!(*w, "highp" | "mediump" | "lowp"));
    let ty = words.next().unwrap_or_default().to_string();
    let rest = words.collect::<Vec<_>>().join(" ");

    for declarator in split_top_level(&rest, ',') {
        let (name_part, init) = match declarator.split_once('=') {
            Some((n, v)) => (n.trim(), Some(v.trim())),
            None => (declarator.trim(), None),
        };
        if name_part.is_empty() {
            continue;
        }
        match ty.as_str() {
            "sampler2D" | "samplerCube" => {
                let kind = if ty == "sampler2D" {
                    ChannelKind::D2
                } else {
                    ChannelKind::Cube
                };
                let index = channels.len() as u32;
                let binding = ChannelBinding {
                    name: name_part.to_string(),
                    kind,
                    texture_binding: 1 + 2 * index,
                    sampler_binding: 2 + 2 * index,
                };
                if !kept.is_empty() && !kept.ends_with('\n') {
                    kept.push('\n');
                }
                let (tex_ty, combined) = match kind {
                    ChannelKind::D2 => ("texture2D", "sampler2D"),
                    ChannelKind::Cube => ("textureCube", "samplerCube"),
                };
                kept.push_str(&format!(
                    "layout(set = 0, binding = {}) uniform {tex_ty} {name}_tex;\n\
                     layout(set = 0, binding = {}) uniform sampler {name}_smp;\n\
                     #define {name} {combined}({name}_tex, {name}_smp)\n",
                    binding.texture_binding,
                    binding.sampler_binding,
                    name = binding.name,
                ));
                channels.push(binding);
            }
            t if t.starts_with("sampler") || t.starts_with("image") => {
                return Err(OneoffError::compile(
                    name_part,
                    format!("unsupported opaque uniform type '{t}'"),
                ));
            }
            _ => {
                members.push(format!("{ty} {name_part}"));
                if let Some(value) = init.and_then(|v| parse_default(&ty, v)) {
                    defaults.push((name_part.to_string(), value));
                }
            }
        }
    }
    Ok(())
}

fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Parse a literal or `vecN(...)` initializer.
fn parse_default(ty: &str, expr: &str) -> Option<UniformValue> {
    let number = |s: &str| -> Option<f32> {
        let s = s.trim().trim_end_matches(['f', 'F', 'u', 'U']);
        match s {
            "true" => Some(1.0),
            "false" => Some(0.0),
            _ => s.parse::<f32>().ok(),
        }
    };
    match ty {
        "float" => number(expr).map(UniformValue::Float),
        "int" | "uint" | "bool" => number(expr).map(|v| UniformValue::Int(v as i32)),
        "vec2" | "vec3" | "vec4" => {
            let n = match ty {
                "vec2" => 2,
                "vec3" => 3,
                _ => 4,
            };
            let inner = expr.trim().strip_prefix(ty)?.trim();
            let inner = inner.strip_prefix('(')?.strip_suffix(')')?;
            let args: Vec<f32> = inner
                .split(',')
                .map(number)
                .collect::<Option<Vec<_>>>()?;
            let comps: Vec<f32> = match args.len() {
                1 => vec![args[0]; n],
                len if len == n => args,
                _ => return None,
            };
            Some(match n {
                2 => UniformValue::Vec2([comps[0], comps[1]]),
                3 => UniformValue::Vec3([comps[0], comps[1], comps[2]]),
                _ => UniformValue::Vec4([comps[0], comps[1], comps[2], comps[3]]),
            })
        }
        _ => None,
    }
}

/// A fragment program parsed and validated on the CPU, ready for GPU module creation.
#[derive(Debug)]
pub struct ParsedProgram {
    pub name: String,
    pub module: naga::Module,
    pub interface: ProgramInterface,
}

/// Adapt, parse and validate a fragment program.
pub fn parse_fragment_program(name: &str, source: &str) -> OneoffResult<ParsedProgram> {
    let adapted = adapt_fragment_source(source)?;
    let mut frontend = glsl::Frontend::default();
    let module = frontend
        .parse(&glsl::Options::from(naga::ShaderStage::Fragment), &adapted.glsl)
        .map_err(|e| OneoffError::compile(name, e.emit_to_string(&adapted.glsl)))?;

    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|e| OneoffError::compile(name, e.emit_to_string(&adapted.glsl)))?;

    if !module
        .entry_points
        .iter()
        .any(|ep| ep.name == FRAGMENT_ENTRY && ep.stage == naga::ShaderStage::Fragment)
    {
        return Err(OneoffError::compile(name, "no fragment entry point 'main'"));
    }

    let (uniforms, block_size) = reflect_uniform_block(&module);
    let interface = ProgramInterface {
        uniforms,
        block_size,
        channels: adapted.channels,
        defaults: adapted.defaults,
    };
    tracing::debug!(
        program = name,
        uniforms = interface.uniforms.len(),
        channels = interface.channels.len(),
        "parsed fragment program"
    );
    Ok(ParsedProgram {
        name: name.to_string(),
        module,
        interface,
    })
}

fn reflect_uniform_block(module: &naga::Module) -> (BTreeMap<String, UniformSlot>, u64) {
    let mut uniforms = BTreeMap::new();
    for (_, var) in module.global_variables.iter() {
        if var.space != naga::AddressSpace::Uniform {
            continue;
        }
        let naga::TypeInner::Struct { members, span } = &module.types[var.ty].inner else {
            continue;
        };
        for member in members {
            let Some(name) = &member.name else {
                continue;
            };
            let kind = uniform_kind(&module.types[member.ty].inner);
            uniforms.insert(
                name.clone(),
                UniformSlot {
                    offset: member.offset,
                    kind,
                },
            );
        }
        return (uniforms, u64::from(*span));
    }
    (uniforms, 0)
}

fn uniform_kind(inner: &naga::TypeInner) -> UniformKind {
    use naga::{ScalarKind, TypeInner, VectorSize};
    match inner {
        TypeInner::Scalar(s) => match s.kind {
            ScalarKind::Float => UniformKind::Float,
            ScalarKind::Sint => UniformKind::Int,
            ScalarKind::Uint => UniformKind::UInt,
            ScalarKind::Bool => UniformKind::Bool,
            _ => UniformKind::Other,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => match size {
            VectorSize::Bi => UniformKind::Vec2,
            VectorSize::Tri => UniformKind::Vec3,
            VectorSize::Quad => UniformKind::Vec4,
        },
        _ => UniformKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHADERTOY_STYLE: &str = "#version 330 core
precision highp float;
uniform float iTime;
uniform vec3 iResolution;
uniform sampler2D iChannel0;
out vec4 fragColor;
void main() {
    vec2 uv = gl_FragCoord.xy / iResolution.xy;
    float level = texture(iChannel0, vec2(uv.x, 0.0)).r;
    fragColor = vec4(vec3(level * abs(sin(iTime))), 1.0);
}
";

    #[test]
    fn adapter_moves_uniforms_into_block_and_splits_samplers() {
        let a = adapt_fragment_source(SHADERTOY_STYLE).unwrap();
        assert!(a.glsl.starts_with("#version 450\n"));
        assert!(!a.glsl.contains("#version 330"));
        assert!(!a.glsl.contains("precision"));
        assert!(a.glsl.contains("uniform ShaderInputs {"));
        assert!(a.glsl.contains("    float iTime;\n"));
        assert!(a.glsl.contains("uniform texture2D iChannel0_tex;"));
        assert!(a.glsl.contains("#define iChannel0 sampler2D(iChannel0_tex, iChannel0_smp)"));
        assert!(a.glsl.contains("layout(location = 0) out vec4 fragColor;"));
        assert_eq!(
            a.channels,
            vec![ChannelBinding {
                name: "iChannel0".into(),
                kind: ChannelKind::D2,
                texture_binding: 1,
                sampler_binding: 2,
            }]
        );
    }

    #[test]
    fn legacy_texture_calls_become_texture() {
        let src = "uniform sampler2D tex;\nvoid main() { gl_FragColor = texture2D(tex, vec2(0.5)); }\n";
        let a = adapt_fragment_source(src).unwrap();
        assert!(a.glsl.contains("gl_FragColor = texture(tex, vec2(0.5));"));
        assert!(a.glsl.contains("uniform texture2D tex_tex;"));
    }

    #[test]
    fn adapter_handles_several_statements_and_defaults() {
        let src = "uniform float speed = 1.5, scale; uniform vec2 dir = vec2(1.0, 0.0);\n\
                   uniform samplerCube sky; uniform sampler2D from;\n\
                   out vec4 c;\nvoid main() { c = vec4(0.0); }\n";
        let a = adapt_fragment_source(src).unwrap();
        assert!(a.glsl.contains("    float speed;\n"));
        assert!(a.glsl.contains("    float scale;\n"));
        assert!(a.glsl.contains("    vec2 dir;\n"));
        assert_eq!(
            a.defaults,
            vec![
                ("speed".to_string(), UniformValue::Float(1.5)),
                ("dir".to_string(), UniformValue::Vec2([1.0, 0.0])),
            ]
        );
        assert_eq!(a.channels.len(), 2);
        assert_eq!(a.channels[0].kind, ChannelKind::Cube);
        assert_eq!(a.channels[1].texture_binding, 3);
        assert_eq!(a.channels[1].sampler_binding, 4);
        assert!(a.glsl.contains("uniform textureCube sky_tex;"));
    }

    #[test]
    fn adapter_declares_output_for_legacy_frag_color() {
        let a = adapt_fragment_source("void main() { gl_FragColor = vec4(1.0); }").unwrap();
        assert!(a.glsl.contains("#define gl_FragColor oneoff_FragColor"));
    }

    #[test]
    fn unsupported_sampler_types_are_compile_errors() {
        let err = adapt_fragment_source("uniform sampler3D vol;").unwrap_err();
        assert!(matches!(err, OneoffError::Compile { .. }));
    }

    #[test]
    fn parsed_program_reflects_std140_offsets() {
        let p = parse_fragment_program("viz.glsl", SHADERTOY_STYLE).unwrap();
        let time = p.interface.uniform("iTime").unwrap();
        assert_eq!(time, UniformSlot { offset: 0, kind: UniformKind::Float });
        let res = p.interface.uniform("iResolution").unwrap();
        assert_eq!(res.offset, 16);
        assert_eq!(res.kind, UniformKind::Vec3);
        assert!(p.interface.block_size() >= 28);
        assert!(p.interface.uniform("iMouse").is_none());
        assert_eq!(p.interface.channels().len(), 1);
    }

    #[test]
    fn program_without_uniforms_has_empty_block() {
        let p = parse_fragment_program(
            "black.glsl",
            "#version 330\nout vec4 c;\nvoid main() { c = vec4(0.0, 0.0, 0.0, 1.0); }\n",
        )
        .unwrap();
        assert_eq!(p.interface.block_size(), 0);
        assert!(p.interface.channels().is_empty());
    }

    #[test]
    fn syntax_errors_name_the_program() {
        let err = parse_fragment_program(
            "broken.glsl",
            "out vec4 c;\nvoid main() { c = vec4(0.0) }\n",
        )
        .unwrap_err();
        match err {
            OneoffError::Compile { name, .. } => assert_eq!(name, "broken.glsl"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn vec2_into_vec3_slot_gets_unit_z() {
        let bytes = UniformValue::Vec2([640.0, 360.0])
            .encode_for(UniformKind::Vec3)
            .unwrap();
        let z = f32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        assert_eq!(bytes.len(), 12);
        assert_eq!(z, 1.0);
        assert!(UniformValue::Float(1.0).encode_for(UniformKind::Other).is_none());
    }

    #[test]
    fn uniform_block_applies_defaults_and_skips_unknown_names() {
        let p = parse_fragment_program(
            "t.glsl",
            "uniform float progress; uniform float strength = 0.25;\n\
             out vec4 c;\nvoid main() { c = vec4(progress * strength); }\n",
        )
        .unwrap();
        let mut block = UniformBlock::new(&p.interface);
        let off = p.interface.uniform("strength").unwrap().offset as usize;
        let read = |b: &UniformBlock, o: usize| {
            let s = &b.as_bytes()[o..o + 4];
            f32::from_le_bytes([s[0], s[1], s[2], s[3]])
        };
        assert_eq!(read(&block, off), 0.25);
        assert!(block.set(&p.interface, "progress", UniformValue::Float(0.5)));
        assert!(!block.set(&p.interface, "missing", UniformValue::Float(1.0)));
        let poff = p.interface.uniform("progress").unwrap().offset as usize;
        assert_eq!(read(&block, poff), 0.5);
    }
}
