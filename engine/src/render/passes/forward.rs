//! Forward Passes
//!
//! `ForwardOpaque` lights solid objects directly. On the forward path it
//! owns the scene color and depth clears; on the deferred path it only draws
//! reflective solids on top of the lit G-buffer. `Blend` draws transparent
//! and additive objects farthest first without writing depth.

use super::{begin, color_attachment, depth_attachment, draw_items, material_programs, FrameContext, FramePass, RenderContext, MAIN_CAMERA_SLOT};
use crate::render::frame_plan::{FramePlan, PassKind};
use crate::render::material::MaterialPass;
use crate::render::shader_registry::ProgramKey;
use crate::scene::Entity;

#[derive(Default)]
pub struct ForwardPass;

impl FramePass for ForwardPass {
    fn name(&self) -> &'static str {
        "forward"
    }

    fn kinds(&self) -> &'static [PassKind] {
        &[PassKind::ForwardOpaque, PassKind::Blend]
    }

    fn programs(&self, kind: PassKind, plan: &FramePlan, renderables: &[&Entity]) -> Vec<ProgramKey> {
        let items = match kind {
            PassKind::ForwardOpaque => &plan.forward,
            _ => &plan.blend,
        };
        material_programs(items, renderables, MaterialPass::Forward)
    }

    fn encode(&self, kind: PassKind, ctx: &RenderContext, frame: &mut FrameContext) {
        let Some(depth) = frame.targets.depth_view() else {
            log::error!("[ForwardPass] no depth target");
            return;
        };
        // the forward path has no lighting pass to clear the scene color
        let owns_clear = kind == PassKind::ForwardOpaque && !ctx.settings.deferred();
        if owns_clear {
            frame.scene_color = 0;
        }
        let Some(color) = frame.targets.hdr[frame.scene_color].color(0) else { return };
        let (items, label) = match kind {
            PassKind::ForwardOpaque => (&frame.plan.forward, "Forward Opaque Pass"),
            _ => (&frame.plan.blend, "Blend Pass"),
        };

        let mut pass = begin(
            frame.encoder,
            frame.profiler,
            kind,
            label,
            &[color_attachment(&color.view, owns_clear.then_some(wgpu::Color::BLACK))],
            depth_attachment(depth, owns_clear),
        );
        let counts = draw_items(
            &mut pass,
            ctx.registry,
            &frame.scene,
            frame.renderables,
            items,
            MaterialPass::Forward,
            MAIN_CAMERA_SLOT,
        );
        frame.stats.draw_calls += counts.draws;
        frame.stats.skipped_draws += counts.skipped;
    }
}
