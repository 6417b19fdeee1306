//! Shader Registry
//!
//! Every draw goes through a [`Program`]: one WGSL file per [`ProgramKind`],
//! compiled once, linked into a render pipeline per [`ProgramKey`]. Source,
//! compile and link failures are logged with the program name and stage;
//! the resulting program is invalid and passes skip it.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};

use super::layouts::BindGroupLayouts;
use super::model::Vertex;
use super::shader_loader::{create_shader_module, load_program_source};
use super::targets::{
    BRDF_LUT_FORMAT, DEPTH_FORMAT, GBUFFER_FORMATS, HDR_FORMAT, LDR_FORMAT, SHADOW_FORMAT, SSAO_FORMAT,
};
use crate::error::{ProgramStage, RenderError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    ShadowDirectional,
    ShadowPoint,
    GeometryColor,
    GeometryTexture,
    GeometryPbr,
    ForwardColor,
    ForwardTexture,
    ForwardPbr,
    Skybox,
    EquirectToCube,
    Irradiance,
    Prefilter,
    BrdfLut,
    Ssao,
    SsaoBlur,
    DeferredLighting,
    Reflections,
    MotionBlur,
    BloomExtract,
    BloomBlur,
    ToneMap,
    Fxaa,
    Present,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 23] = [
        ProgramKind::ShadowDirectional,
        ProgramKind::ShadowPoint,
        ProgramKind::GeometryColor,
        ProgramKind::GeometryTexture,
        ProgramKind::GeometryPbr,
        ProgramKind::ForwardColor,
        ProgramKind::ForwardTexture,
        ProgramKind::ForwardPbr,
        ProgramKind::Skybox,
        ProgramKind::EquirectToCube,
        ProgramKind::Irradiance,
        ProgramKind::Prefilter,
        ProgramKind::BrdfLut,
        ProgramKind::Ssao,
        ProgramKind::SsaoBlur,
        ProgramKind::DeferredLighting,
        ProgramKind::Reflections,
        ProgramKind::MotionBlur,
        ProgramKind::BloomExtract,
        ProgramKind::BloomBlur,
        ProgramKind::ToneMap,
        ProgramKind::Fxaa,
        ProgramKind::Present,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProgramKind::ShadowDirectional => "shadow_directional",
            ProgramKind::ShadowPoint => "shadow_point",
            ProgramKind::GeometryColor => "geometry_color",
            ProgramKind::GeometryTexture => "geometry_texture",
            ProgramKind::GeometryPbr => "geometry_pbr",
            ProgramKind::ForwardColor => "forward_color",
            ProgramKind::ForwardTexture => "forward_texture",
            ProgramKind::ForwardPbr => "forward_pbr",
            ProgramKind::Skybox => "skybox",
            ProgramKind::EquirectToCube => "equirect_to_cube",
            ProgramKind::Irradiance => "irradiance",
            ProgramKind::Prefilter => "prefilter",
            ProgramKind::BrdfLut => "brdf_lut",
            ProgramKind::Ssao => "ssao",
            ProgramKind::SsaoBlur => "ssao_blur",
            ProgramKind::DeferredLighting => "deferred_lighting",
            ProgramKind::Reflections => "reflections",
            ProgramKind::MotionBlur => "motion_blur",
            ProgramKind::BloomExtract => "bloom_extract",
            ProgramKind::BloomBlur => "bloom_blur",
            ProgramKind::ToneMap => "tone_map",
            ProgramKind::Fxaa => "fxaa",
            ProgramKind::Present => "present",
        }
    }

    /// WGSL file under the shader root.
    pub fn file_name(self) -> String {
        format!("{}.wgsl", self.name())
    }

    /// Programs that draw scene meshes and take the [`Vertex`] buffer.
    pub fn uses_mesh(self) -> bool {
        matches!(
            self,
            ProgramKind::ShadowDirectional
                | ProgramKind::ShadowPoint
                | ProgramKind::GeometryColor
                | ProgramKind::GeometryTexture
                | ProgramKind::GeometryPbr
                | ProgramKind::ForwardColor
                | ProgramKind::ForwardTexture
                | ProgramKind::ForwardPbr
        )
    }

    pub fn is_forward(self) -> bool {
        matches!(
            self,
            ProgramKind::ForwardColor | ProgramKind::ForwardTexture | ProgramKind::ForwardPbr
        )
    }

    /// The directional shadow pass is depth only.
    pub fn has_fragment(self) -> bool {
        self != ProgramKind::ShadowDirectional
    }

    fn bind_group_layouts(self, layouts: &BindGroupLayouts) -> Vec<&wgpu::BindGroupLayout> {
        use ProgramKind::*;
        let pass_group = match self {
            ShadowDirectional | ShadowPoint => return vec![&layouts.camera, &layouts.frame],
            BrdfLut => return Vec::new(),
            EquirectToCube => {
                return vec![&layouts.camera, &layouts.frame, &layouts.empty, &layouts.env_equirect];
            }
            Irradiance | Prefilter => {
                return vec![&layouts.camera, &layouts.frame, &layouts.empty, &layouts.env_cube];
            }
            GeometryColor | ForwardColor => &layouts.material_color,
            GeometryTexture | ForwardTexture => &layouts.material_texture,
            GeometryPbr | ForwardPbr => &layouts.material_pbr,
            Skybox => &layouts.skybox,
            Ssao => &layouts.ssao,
            DeferredLighting => &layouts.lighting,
            Reflections => &layouts.reflections,
            MotionBlur => &layouts.post_depth,
            ToneMap => &layouts.post_bloom,
            SsaoBlur | BloomExtract | BloomBlur | Fxaa | Present => &layouts.post,
        };
        vec![&layouts.camera, &layouts.frame, &layouts.lights, pass_group]
    }

    fn color_formats(self, output_format: wgpu::TextureFormat) -> Vec<wgpu::TextureFormat> {
        use ProgramKind::*;
        match self {
            ShadowDirectional | ShadowPoint => Vec::new(),
            GeometryColor | GeometryTexture | GeometryPbr => GBUFFER_FORMATS.to_vec(),
            BrdfLut => vec![BRDF_LUT_FORMAT],
            Ssao | SsaoBlur => vec![SSAO_FORMAT],
            ToneMap | Fxaa => vec![LDR_FORMAT],
            Present => vec![output_format],
            _ => vec![HDR_FORMAT],
        }
    }

    fn depth_stencil(self, variant: BlendVariant) -> Option<wgpu::DepthStencilState> {
        use ProgramKind::*;
        let state = |format, depth_write_enabled, depth_compare, bias| wgpu::DepthStencilState {
            format,
            depth_write_enabled,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias,
        };
        match self {
            ShadowDirectional => Some(state(
                SHADOW_FORMAT,
                true,
                wgpu::CompareFunction::Less,
                wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                },
            )),
            ShadowPoint => Some(state(SHADOW_FORMAT, true, wgpu::CompareFunction::Less, Default::default())),
            GeometryColor | GeometryTexture | GeometryPbr => {
                Some(state(DEPTH_FORMAT, true, wgpu::CompareFunction::Less, Default::default()))
            }
            ForwardColor | ForwardTexture | ForwardPbr => Some(state(
                DEPTH_FORMAT,
                variant == BlendVariant::Opaque,
                wgpu::CompareFunction::LessEqual,
                Default::default(),
            )),
            Skybox => Some(state(DEPTH_FORMAT, false, wgpu::CompareFunction::LessEqual, Default::default())),
            _ => None,
        }
    }

    fn cull_mode(self) -> Option<wgpu::Face> {
        match self {
            ProgramKind::ShadowDirectional
            | ProgramKind::GeometryColor
            | ProgramKind::GeometryTexture
            | ProgramKind::GeometryPbr => Some(wgpu::Face::Back),
            // cube captures flip Y, forward draws include two-sided glass
            _ => None,
        }
    }
}

/// Color blending applied by forward programs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendVariant {
    #[default]
    Opaque,
    AlphaBlend,
    Additive,
}

impl BlendVariant {
    fn state(self) -> Option<wgpu::BlendState> {
        match self {
            BlendVariant::Opaque => None,
            BlendVariant::AlphaBlend => Some(wgpu::BlendState::ALPHA_BLENDING),
            BlendVariant::Additive => Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Zero,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    pub kind: ProgramKind,
    pub variant: BlendVariant,
}

impl ProgramKey {
    pub fn new(kind: ProgramKind) -> Self {
        Self {
            kind,
            variant: BlendVariant::Opaque,
        }
    }

    /// Blending only exists for forward programs; other kinds ignore it.
    pub fn with_variant(kind: ProgramKind, variant: BlendVariant) -> Self {
        let variant = if kind.is_forward() { variant } else { BlendVariant::Opaque };
        Self { kind, variant }
    }
}

impl From<ProgramKind> for ProgramKey {
    fn from(kind: ProgramKind) -> Self {
        Self::new(kind)
    }
}

/// Build-once cache. `constructed` counts how many values were ever built,
/// so repeated lookups can be checked to construct nothing.
pub struct ProgramCache<K, V> {
    entries: HashMap<K, V>,
    constructed: usize,
}

impl<K: Eq + Hash + Copy, V> Default for ProgramCache<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            constructed: 0,
        }
    }
}

impl<K: Eq + Hash + Copy, V> ProgramCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, key: K, create: impl FnOnce(K) -> V) -> &V {
        let constructed = &mut self.constructed;
        self.entries.entry(key).or_insert_with(|| {
            *constructed += 1;
            create(key)
        })
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn constructed(&self) -> usize {
        self.constructed
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A linked pipeline, or the record of a failed attempt.
pub struct Program {
    key: ProgramKey,
    pipeline: Option<wgpu::RenderPipeline>,
}

impl Program {
    pub fn key(&self) -> ProgramKey {
        self.key
    }

    pub fn is_valid(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn pipeline(&self) -> Option<&wgpu::RenderPipeline> {
        self.pipeline.as_ref()
    }
}

pub struct ShaderRegistry {
    root: PathBuf,
    output_format: wgpu::TextureFormat,
    modules: ProgramCache<ProgramKind, Option<wgpu::ShaderModule>>,
    programs: ProgramCache<ProgramKey, Program>,
}

impl ShaderRegistry {
    pub fn new(root: impl Into<PathBuf>, output_format: wgpu::TextureFormat) -> Self {
        let root = root.into();
        log::info!("[ShaderRegistry] shader root {}", root.display());
        Self {
            root,
            output_format,
            modules: ProgramCache::new(),
            programs: ProgramCache::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compile and link `key` if it has not been attempted yet. Returns
    /// whether a valid program exists afterwards.
    pub fn ensure(&mut self, device: &wgpu::Device, layouts: &BindGroupLayouts, key: impl Into<ProgramKey>) -> bool {
        let key = key.into();
        if let Some(program) = self.programs.get(&key) {
            return program.is_valid();
        }
        let root = &self.root;
        let module = self
            .modules
            .get_or_create(key.kind, |kind| compile_module(device, root, kind))
            .clone();
        let output_format = self.output_format;
        self.programs
            .get_or_create(key, |key| match &module {
                Some(module) => build_program(device, layouts, output_format, key, module),
                None => Program { key, pipeline: None },
            })
            .is_valid()
    }

    pub fn program(&self, key: impl Into<ProgramKey>) -> Option<&Program> {
        self.programs.get(&key.into())
    }

    /// The pipeline for `key`, if it was ensured and linked.
    pub fn get(&self, key: impl Into<ProgramKey>) -> Option<&wgpu::RenderPipeline> {
        self.program(key).and_then(Program::pipeline)
    }

    /// Pipelines built so far, including failed attempts.
    pub fn constructed_count(&self) -> usize {
        self.programs.constructed()
    }

    pub fn invalid_count(&self) -> usize {
        self.programs.values().filter(|p| !p.is_valid()).count()
    }

    /// Drop every module and pipeline so the next `ensure` rereads sources.
    pub fn reload(&mut self) {
        log::info!("[ShaderRegistry] reloading {} programs", self.programs.len());
        self.modules.clear();
        self.programs.clear();
    }
}

fn report(kind: ProgramKind, stage: ProgramStage, message: impl Into<String>) {
    let err = RenderError::Program {
        program: kind.name(),
        stage,
        message: message.into(),
    };
    log::error!("[ShaderRegistry] {err}");
}

/// Error filters captured around module creation and pipeline linking.
/// Backend translation failures surface as `Internal`, not `Validation`.
const ERROR_FILTERS: [wgpu::ErrorFilter; 3] = [
    wgpu::ErrorFilter::OutOfMemory,
    wgpu::ErrorFilter::Internal,
    wgpu::ErrorFilter::Validation,
];

fn push_error_scopes(device: &wgpu::Device) {
    for filter in ERROR_FILTERS {
        device.push_error_scope(filter);
    }
}

/// Pop every scope pushed by [`push_error_scopes`], innermost first.
fn pop_error_scopes(device: &wgpu::Device) -> Vec<wgpu::Error> {
    ERROR_FILTERS
        .iter()
        .filter_map(|_| pollster::block_on(device.pop_error_scope()))
        .collect()
}

fn compile_module(device: &wgpu::Device, root: &Path, kind: ProgramKind) -> Option<wgpu::ShaderModule> {
    let source = match load_program_source(root, &kind.file_name()) {
        Ok(source) => source,
        Err(err) => {
            report(kind, ProgramStage::Source, err.to_string());
            return None;
        }
    };

    push_error_scopes(device);
    let module = create_shader_module(device, kind.name(), &source);
    let info = pollster::block_on(module.get_compilation_info());
    let scope_errors = pop_error_scopes(device);

    let errors: Vec<String> = info
        .messages
        .iter()
        .filter(|m| m.message_type == wgpu::CompilationMessageType::Error)
        .map(|m| match &m.location {
            Some(loc) => format!("{}:{}: {}", loc.line_number, loc.line_position, m.message),
            None => m.message.clone(),
        })
        .collect();
    if !errors.is_empty() {
        report(kind, ProgramStage::Compile, errors.join("; "));
        return None;
    }
    if !scope_errors.is_empty() {
        for err in &scope_errors {
            report(kind, ProgramStage::Compile, err.to_string());
        }
        return None;
    }
    log::debug!("[ShaderRegistry] compiled {}", kind.name());
    Some(module)
}

/// Link one pipeline. A free function so the registry can call it while
/// holding a borrow of its module cache.
fn build_program(
    device: &wgpu::Device,
    layouts: &BindGroupLayouts,
    output_format: wgpu::TextureFormat,
    key: ProgramKey,
    module: &wgpu::ShaderModule,
) -> Program {
    let kind = key.kind;
    let label = kind.name();

    push_error_scopes(device);

    let groups = kind.bind_group_layouts(layouts);
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &groups,
        push_constant_ranges: &[],
    });

    let blend = key.variant.state();
    let targets: Vec<Option<wgpu::ColorTargetState>> = kind
        .color_formats(output_format)
        .into_iter()
        .map(|format| {
            Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
        .collect();
    let vertex_buffers = if kind.uses_mesh() { vec![Vertex::layout()] } else { Vec::new() };

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &vertex_buffers,
            compilation_options: Default::default(),
        },
        fragment: kind.has_fragment().then(|| wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &targets,
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: kind.cull_mode(),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: kind.depth_stencil(key.variant),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    let errors = pop_error_scopes(device);
    if !errors.is_empty() {
        for err in &errors {
            report(kind, ProgramStage::Link, err.to_string());
        }
        return Program { key, pipeline: None };
    }
    log::debug!("[ShaderRegistry] linked {label} ({:?})", key.variant);
    Program {
        key,
        pipeline: Some(pipeline),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_constructs_once() {
        let mut cache: ProgramCache<u32, String> = ProgramCache::new();
        for _ in 0..3 {
            cache.get_or_create(7, |k| format!("program {k}"));
        }
        cache.get_or_create(8, |k| format!("program {k}"));
        assert_eq!(cache.constructed(), 2);
        assert_eq!(cache.get(&7).map(String::as_str), Some("program 7"));
    }

    #[test]
    fn test_cache_clear_forces_rebuild() {
        let mut cache: ProgramCache<u32, u32> = ProgramCache::new();
        cache.get_or_create(1, |k| k);
        cache.clear();
        assert!(cache.is_empty());
        cache.get_or_create(1, |k| k);
        assert_eq!(cache.constructed(), 2);
    }

    #[test]
    fn test_variant_only_applies_to_forward() {
        let key = ProgramKey::with_variant(ProgramKind::GeometryPbr, BlendVariant::Additive);
        assert_eq!(key.variant, BlendVariant::Opaque);
        let key = ProgramKey::with_variant(ProgramKind::ForwardPbr, BlendVariant::Additive);
        assert_eq!(key.variant, BlendVariant::Additive);
    }

    #[test]
    fn test_program_files_are_unique() {
        let mut names: Vec<_> = ProgramKind::ALL.iter().map(|k| k.file_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ProgramKind::ALL.len());
    }

    #[test]
    fn test_geometry_writes_every_gbuffer_target() {
        let formats = ProgramKind::GeometryTexture.color_formats(wgpu::TextureFormat::Bgra8Unorm);
        assert_eq!(formats, GBUFFER_FORMATS.to_vec());
        assert!(ProgramKind::ShadowDirectional.color_formats(LDR_FORMAT).is_empty());
    }

    #[test]
    fn test_translucent_forward_does_not_write_depth() {
        let opaque = ProgramKind::ForwardColor.depth_stencil(BlendVariant::Opaque).unwrap();
        let blended = ProgramKind::ForwardColor.depth_stencil(BlendVariant::AlphaBlend).unwrap();
        assert!(opaque.depth_write_enabled);
        assert!(!blended.depth_write_enabled);
    }
}
