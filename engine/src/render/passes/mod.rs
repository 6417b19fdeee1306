//! Frame Passes
//!
//! Each pass struct implements [`FramePass`] for one or more [`PassKind`]s.
//! The [`PassManager`] walks the plan's pass list in order and hands every
//! kind to the pass that owns it. Passes never own the shared frame targets;
//! they keep only the bind groups they build over them, rebuilt on resize.

pub mod forward;
pub mod geometry;
pub mod lighting;
pub mod post;
pub mod shadow;
pub mod skybox;
pub mod ssao;

use std::collections::HashMap;

use super::frame_plan::{DrawItem, FramePlan, FrameStats, PassKind};
use super::layouts::{BindGroupLayouts, CameraBindings};
use super::material::MaterialPass;
use super::profiler::GpuProfiler;
use super::shader_registry::{ProgramKey, ShaderRegistry};
use super::targets::{FrameTargets, ShadowTargets};
use crate::config::FrameSettings;
use crate::scene::{Entity, EntityId};

pub use forward::ForwardPass;
pub use geometry::GeometryPass;
pub use lighting::{LightingPass, ReflectionsPass};
pub use post::PostPass;
pub use shadow::{ShadowPass, CAMERA_SLOTS, DIRECTIONAL_SHADOW_SLOT, MAIN_CAMERA_SLOT};
pub use skybox::SkyboxPass;
pub use ssao::SsaoPass;

/// Device state shared by every pass.
pub struct RenderContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub layouts: &'a BindGroupLayouts,
    pub registry: &'a ShaderRegistry,
    pub settings: &'a FrameSettings,
}

/// Groups 0..2 as bound for the main view.
pub struct SceneBindings<'a> {
    pub camera: &'a CameraBindings,
    pub frame: &'a wgpu::BindGroup,
    /// Lights with the sky (or placeholder) IBL maps
    pub lights: &'a wgpu::BindGroup,
    /// Lights with a reflective object's own IBL maps
    pub reflective_lights: &'a HashMap<EntityId, wgpu::BindGroup>,
    pub empty: &'a wgpu::BindGroup,
}

impl SceneBindings<'_> {
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>, camera_slot: u32, lights: &wgpu::BindGroup) {
        self.camera.bind(pass, camera_slot);
        pass.set_bind_group(1, self.frame, &[]);
        pass.set_bind_group(2, lights, &[]);
    }

    /// Camera and frame only, for programs that leave group 2 out.
    pub fn bind_camera(&self, pass: &mut wgpu::RenderPass<'_>, camera_slot: u32) {
        self.camera.bind(pass, camera_slot);
        pass.set_bind_group(1, self.frame, &[]);
    }

    pub fn lights_for(&self, entity: EntityId) -> &wgpu::BindGroup {
        self.reflective_lights.get(&entity).unwrap_or(self.lights)
    }
}

/// Per-frame state handed from pass to pass.
pub struct FrameContext<'a> {
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub plan: &'a FramePlan,
    pub renderables: &'a [&'a Entity],
    pub scene: SceneBindings<'a>,
    pub targets: &'a FrameTargets,
    pub shadows: &'a ShadowTargets,
    pub skybox: Option<&'a wgpu::BindGroup>,
    pub output: &'a wgpu::TextureView,
    pub profiler: &'a mut GpuProfiler,
    pub stats: &'a mut FrameStats,
    /// Index into `targets.hdr` holding the latest scene color
    pub scene_color: usize,
    /// Index into `targets.ldr` holding the latest display color
    pub display: usize,
}

pub trait FramePass {
    fn name(&self) -> &'static str;

    /// Pass kinds this pass encodes.
    fn kinds(&self) -> &'static [PassKind];

    /// Programs `kind` will look up this frame.
    fn programs(&self, kind: PassKind, plan: &FramePlan, renderables: &[&Entity]) -> Vec<ProgramKey>;

    /// Rebuild bind groups over freshly allocated targets.
    fn resize(&mut self, _ctx: &RenderContext, _targets: &FrameTargets, _shadows: &ShadowTargets) {}

    fn encode(&self, kind: PassKind, ctx: &RenderContext, frame: &mut FrameContext);
}

/// Dispatches plan pass kinds to their [`FramePass`].
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn FramePass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass(&mut self, pass: Box<dyn FramePass>) {
        self.passes.push(pass);
    }

    fn owner(&self, kind: PassKind) -> Option<&dyn FramePass> {
        self.passes.iter().find(|p| p.kinds().contains(&kind)).map(|p| p.as_ref())
    }

    /// Every program the plan needs, deduplicated, in pass order.
    pub fn required_programs(&self, plan: &FramePlan, renderables: &[&Entity]) -> Vec<ProgramKey> {
        let mut keys = Vec::new();
        for &kind in &plan.passes {
            let Some(pass) = self.owner(kind) else { continue };
            for key in pass.programs(kind, plan, renderables) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    pub fn resize(&mut self, ctx: &RenderContext, targets: &FrameTargets, shadows: &ShadowTargets) {
        for pass in &mut self.passes {
            pass.resize(ctx, targets, shadows);
        }
    }

    pub fn run(&self, ctx: &RenderContext, frame: &mut FrameContext) {
        let plan = frame.plan;
        for &kind in &plan.passes {
            match self.owner(kind) {
                Some(pass) => pass.encode(kind, ctx, frame),
                None => log::warn!("[PassManager] no pass registered for {kind}"),
            }
        }
    }

    pub fn list_passes(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }
}

pub fn color_attachment(
    view: &wgpu::TextureView,
    clear: Option<wgpu::Color>,
) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        depth_slice: None,
        resolve_target: None,
        ops: wgpu::Operations {
            load: clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
            store: wgpu::StoreOp::Store,
        },
    })
}

pub fn depth_attachment(view: &wgpu::TextureView, clear: bool) -> Option<wgpu::RenderPassDepthStencilAttachment<'_>> {
    Some(wgpu::RenderPassDepthStencilAttachment {
        view,
        depth_ops: Some(wgpu::Operations {
            load: if clear { wgpu::LoadOp::Clear(1.0) } else { wgpu::LoadOp::Load },
            store: wgpu::StoreOp::Store,
        }),
        stencil_ops: None,
    })
}

/// Open a render pass, attaching timestamp writes when profiling.
pub fn begin<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    profiler: &mut GpuProfiler,
    kind: PassKind,
    label: &str,
    colors: &[Option<wgpu::RenderPassColorAttachment<'_>>],
    depth: Option<wgpu::RenderPassDepthStencilAttachment<'_>>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: colors,
        depth_stencil_attachment: depth,
        timestamp_writes: profiler.timestamp_writes(kind),
        occlusion_query_set: None,
    })
}

/// Look up a ready pipeline, counting a skip when it is missing or invalid.
pub fn pipeline<'r>(
    registry: &'r ShaderRegistry,
    key: impl Into<ProgramKey>,
    stats: &mut FrameStats,
) -> Option<&'r wgpu::RenderPipeline> {
    let key = key.into();
    let pipeline = registry.get(key);
    if pipeline.is_none() {
        log::trace!("[Passes] {:?} unavailable, skipping", key.kind);
        stats.skipped_draws += 1;
    }
    pipeline
}

/// Draw a full-screen triangle with `group` at index 3.
pub fn draw_fullscreen(
    pass: &mut wgpu::RenderPass<'_>,
    pipeline: &wgpu::RenderPipeline,
    scene: &SceneBindings,
    group: &wgpu::BindGroup,
) -> u32 {
    pass.set_pipeline(pipeline);
    scene.bind(pass, MAIN_CAMERA_SLOT, scene.lights);
    pass.set_bind_group(3, group, &[]);
    pass.draw(0..3, 0..1);
    1
}

/// Material-bound draw of one renderable. Returns the draw calls recorded.
pub fn draw_material(pass: &mut wgpu::RenderPass<'_>, entity: &Entity, item: &DrawItem) -> u32 {
    let Some(render) = entity.render() else { return 0 };
    let (Some(model), Some(material)) = (&render.model, &render.material) else {
        return 0;
    };
    if !material.bind(pass) {
        log::trace!("[Passes] '{}' material not uploaded", entity.name);
        return 0;
    }
    model.draw(pass, item.object)
}

/// Program keys of the materials behind `items`.
pub fn material_programs(items: &[DrawItem], renderables: &[&Entity], pass: MaterialPass) -> Vec<ProgramKey> {
    let mut keys = Vec::new();
    for item in items {
        let material = renderables
            .get(item.renderable)
            .and_then(|e| e.render())
            .and_then(|r| r.material.as_ref());
        if let Some(key) = material.map(|m| m.program_key(pass)) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawCounts {
    pub draws: u32,
    /// Items whose program was unavailable
    pub skipped: u32,
}

/// Draw `items` with their materials' programs for `material_pass`. Each
/// item binds the lights group of its own entity, so reflective objects
/// pick up their own environment maps.
pub fn draw_items(
    pass: &mut wgpu::RenderPass<'_>,
    registry: &ShaderRegistry,
    scene: &SceneBindings,
    renderables: &[&Entity],
    items: &[DrawItem],
    material_pass: MaterialPass,
    camera_slot: u32,
) -> DrawCounts {
    let mut counts = DrawCounts::default();
    let mut bound = None;
    for item in items {
        let Some(entity) = renderables.get(item.renderable) else { continue };
        let Some(material) = entity.render().and_then(|r| r.material.as_ref()) else {
            continue;
        };
        let key = material.program_key(material_pass);
        let Some(pipeline) = registry.get(key) else {
            counts.skipped += 1;
            continue;
        };
        if bound != Some(key) {
            pass.set_pipeline(pipeline);
            bound = Some(key);
        }
        scene.bind(pass, camera_slot, scene.lights_for(item.entity));
        counts.draws += draw_material(pass, entity, item);
    }
    counts
}

/// Geometry-only draw of one renderable, used by depth-only programs.
pub fn draw_depth(pass: &mut wgpu::RenderPass<'_>, entity: &Entity, item: &DrawItem) -> u32 {
    entity
        .render()
        .and_then(|render| render.model.as_ref())
        .map_or(0, |model| model.draw(pass, item.object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::frame_plan::FramePlan;

    struct Recorder {
        kinds: &'static [PassKind],
    }

    impl FramePass for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn kinds(&self) -> &'static [PassKind] {
            self.kinds
        }

        fn programs(&self, kind: PassKind, _plan: &FramePlan, _renderables: &[&Entity]) -> Vec<ProgramKey> {
            match kind {
                PassKind::ToneMap => vec![crate::render::shader_registry::ProgramKind::ToneMap.into()],
                _ => vec![crate::render::shader_registry::ProgramKind::Present.into()],
            }
        }

        fn encode(&self, _kind: PassKind, _ctx: &RenderContext, _frame: &mut FrameContext) {}
    }

    #[test]
    fn test_required_programs_follow_plan_and_dedupe() {
        let mut manager = PassManager::new();
        manager.add_pass(Box::new(Recorder {
            kinds: &[PassKind::ToneMap, PassKind::Fxaa, PassKind::Present],
        }));
        let plan = FramePlan {
            passes: vec![PassKind::ToneMap, PassKind::Fxaa, PassKind::Present],
            ..Default::default()
        };
        let keys = manager.required_programs(&plan, &[]);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].kind, crate::render::shader_registry::ProgramKind::ToneMap);
        assert_eq!(manager.list_passes(), vec!["recorder"]);
    }

    #[test]
    fn test_unowned_kinds_need_no_programs() {
        let manager = PassManager::new();
        let plan = FramePlan {
            passes: vec![PassKind::Geometry],
            ..Default::default()
        };
        assert!(manager.required_programs(&plan, &[]).is_empty());
    }
}
