//! Skybox Pass
//!
//! Draws a unit cube around the camera at the far plane. The vertex shader
//! builds the cube from the vertex index, so no mesh is bound. Depth test is
//! LessEqual against the scene depth, so the sky only fills empty texels.

use super::{begin, color_attachment, depth_attachment, pipeline, FrameContext, FramePass, RenderContext, SceneBindings, MAIN_CAMERA_SLOT};
use crate::render::frame_plan::{FramePlan, PassKind};
use crate::render::shader_registry::{ProgramKey, ProgramKind};
use crate::scene::Entity;

/// Vertices of the index-generated cube.
pub const SKYBOX_VERTICES: u32 = 36;

/// Record the skybox draw into an open pass.
pub fn draw_skybox(
    pass: &mut wgpu::RenderPass<'_>,
    pipeline: &wgpu::RenderPipeline,
    scene: &SceneBindings,
    camera_slot: u32,
    skybox: &wgpu::BindGroup,
) -> u32 {
    pass.set_pipeline(pipeline);
    scene.bind(pass, camera_slot, scene.lights);
    pass.set_bind_group(3, skybox, &[]);
    pass.draw(0..SKYBOX_VERTICES, 0..1);
    1
}

#[derive(Default)]
pub struct SkyboxPass;

impl FramePass for SkyboxPass {
    fn name(&self) -> &'static str {
        "skybox"
    }

    fn kinds(&self) -> &'static [PassKind] {
        &[PassKind::Skybox]
    }

    fn programs(&self, _kind: PassKind, _plan: &FramePlan, _renderables: &[&Entity]) -> Vec<ProgramKey> {
        vec![ProgramKind::Skybox.into()]
    }

    fn encode(&self, kind: PassKind, ctx: &RenderContext, frame: &mut FrameContext) {
        let Some(skybox) = frame.skybox else {
            log::warn!("[SkyboxPass] planned without a skybox bind group");
            return;
        };
        let (Some(color), Some(depth)) = (frame.targets.hdr[frame.scene_color].color(0), frame.targets.depth_view())
        else {
            return;
        };
        let Some(pipeline) = pipeline(ctx.registry, ProgramKind::Skybox, frame.stats) else {
            return;
        };
        let mut pass = begin(
            frame.encoder,
            frame.profiler,
            kind,
            "Skybox Pass",
            &[color_attachment(&color.view, None)],
            depth_attachment(depth, false),
        );
        frame.stats.draw_calls += draw_skybox(&mut pass, pipeline, &frame.scene, MAIN_CAMERA_SLOT, skybox);
    }
}
