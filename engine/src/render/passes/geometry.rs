//! Geometry Pass
//!
//! Fills the G-buffer: position (alpha = shading model), normal, albedo
//! (alpha = specular or roughness) and emission. Texels no geometry touched
//! keep a zero position alpha, which the lighting pass treats as sky.

use super::{begin, color_attachment, depth_attachment, draw_items, material_programs, FrameContext, FramePass, RenderContext, MAIN_CAMERA_SLOT};
use crate::render::frame_plan::{FramePlan, PassKind};
use crate::render::material::MaterialPass;
use crate::render::shader_registry::ProgramKey;
use crate::scene::Entity;

#[derive(Default)]
pub struct GeometryPass;

impl FramePass for GeometryPass {
    fn name(&self) -> &'static str {
        "geometry"
    }

    fn kinds(&self) -> &'static [PassKind] {
        &[PassKind::Geometry]
    }

    fn programs(&self, _kind: PassKind, plan: &FramePlan, renderables: &[&Entity]) -> Vec<ProgramKey> {
        material_programs(&plan.geometry, renderables, MaterialPass::Deferred)
    }

    fn encode(&self, kind: PassKind, ctx: &RenderContext, frame: &mut FrameContext) {
        let Some(depth) = frame.targets.depth_view() else {
            log::error!("[GeometryPass] G-buffer has no depth attachment");
            return;
        };
        let colors: Vec<_> = frame
            .targets
            .gbuffer
            .colors
            .iter()
            .map(|texture| color_attachment(&texture.view, Some(wgpu::Color::TRANSPARENT)))
            .collect();

        let mut pass = begin(
            frame.encoder,
            frame.profiler,
            kind,
            "Geometry Pass",
            &colors,
            depth_attachment(depth, true),
        );
        let counts = draw_items(
            &mut pass,
            ctx.registry,
            &frame.scene,
            frame.renderables,
            &frame.plan.geometry,
            MaterialPass::Deferred,
            MAIN_CAMERA_SLOT,
        );
        frame.stats.draw_calls += counts.draws;
        frame.stats.skipped_draws += counts.skipped;
    }
}
