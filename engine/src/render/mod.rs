//! Render Module
//!
//! The multi-pass renderer: GPU resource handles, models and materials, the
//! shader registry, per-frame planning, the pass chain and the environment
//! precompute stage, all driven by [`Renderer`].

pub mod cube_capture;
pub mod environment;
pub mod frame_plan;
pub mod gpu_context;
pub mod layouts;
pub mod lights;
pub mod material;
pub mod model;
pub mod passes;
pub mod profiler;
pub mod renderer;
pub mod resources;
pub mod shader_loader;
pub mod shader_registry;
pub mod targets;
pub mod uniforms;

pub use environment::{EnvironmentStage, IblMaps, ResourceStats, SkyIbl};
pub use frame_plan::{FramePlan, FrameStats, PassKind, SkippedRenderable};
pub use gpu_context::{GpuContext, GpuContextConfig};
pub use lights::{GpuLight, LightingUniforms, select_closest_point_lights};
pub use material::{
    BlendMode, ColorMaterial, Material, MaterialFamily, MaterialKind, MaterialPass, PbrMaterial,
    TextureMaterial,
};
pub use model::{Model, Vertex};
pub use profiler::{GpuProfiler, PassTiming};
pub use renderer::Renderer;
pub use resources::{Cubemap, Texture, TextureData};
pub use shader_loader::{ShaderSource, load_program_source, load_shader_file};
pub use shader_registry::{ProgramKey, ProgramKind, ShaderRegistry};
