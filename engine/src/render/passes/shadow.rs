//! Shadow Pass
//!
//! Renders shadow casters into the directional depth map and, for every
//! point light granted a shadow slot, into the six faces of its cube map.
//! Point faces store linear distance divided by the point far plane.

use glam::{Mat4, Vec3};

use super::{begin, depth_attachment, draw_depth, pipeline, FrameContext, FramePass, RenderContext};
use crate::config::FrameSettings;
use crate::render::cube_capture::{cube_face_view, cube_projection};
use crate::render::frame_plan::{FramePlan, PassKind};
use crate::render::lights::MAX_POINT_SHADOWS;
use crate::render::shader_registry::{ProgramKey, ProgramKind};
use crate::render::uniforms::CameraUniforms;
use crate::scene::Entity;

pub const MAIN_CAMERA_SLOT: u32 = 0;
pub const DIRECTIONAL_SHADOW_SLOT: u32 = 1;
const FIRST_POINT_FACE_SLOT: u32 = 2;

/// Camera slots in the main camera buffer: main view, directional light,
/// then six faces per point shadow.
pub const CAMERA_SLOTS: u32 = FIRST_POINT_FACE_SLOT + MAX_POINT_SHADOWS as u32 * 6;

const POINT_SHADOW_NEAR: f32 = 0.05;

pub fn point_face_slot(shadow: usize, face: usize) -> u32 {
    FIRST_POINT_FACE_SLOT + (shadow * 6 + face) as u32
}

/// Camera blocks the shadow pass renders from this frame, keyed by slot.
pub fn shadow_cameras(plan: &FramePlan, settings: &FrameSettings) -> Vec<(u32, CameraUniforms)> {
    let tunables = &settings.tunables.shadow;
    let mut cameras = Vec::new();
    if plan.directional_shadow {
        let light_space = Mat4::from_cols_array_2d(&plan.lights.uniforms.light_space);
        cameras.push((
            DIRECTIONAL_SHADOW_SLOT,
            CameraUniforms::new(light_space, Mat4::IDENTITY, light_space, Vec3::ZERO, tunables.near, tunables.far),
        ));
    }
    let proj = cube_projection(POINT_SHADOW_NEAR, tunables.point_far);
    for (shadow, &record) in plan.lights.point_shadows.iter().enumerate() {
        let Some(light) = plan.lights.records.get(record) else { continue };
        let eye = light.world_position();
        for face in 0..6 {
            let view = cube_face_view(eye, face);
            cameras.push((
                point_face_slot(shadow, face),
                CameraUniforms::new(view, proj, proj * view, eye, POINT_SHADOW_NEAR, tunables.point_far),
            ));
        }
    }
    cameras
}

#[derive(Default)]
pub struct ShadowPass;

impl FramePass for ShadowPass {
    fn name(&self) -> &'static str {
        "shadow"
    }

    fn kinds(&self) -> &'static [PassKind] {
        &[PassKind::Shadow]
    }

    fn programs(&self, _kind: PassKind, plan: &FramePlan, _renderables: &[&Entity]) -> Vec<ProgramKey> {
        let mut keys = Vec::new();
        if plan.directional_shadow {
            keys.push(ProgramKind::ShadowDirectional.into());
        }
        if !plan.lights.point_shadows.is_empty() {
            keys.push(ProgramKind::ShadowPoint.into());
        }
        keys
    }

    fn encode(&self, kind: PassKind, ctx: &RenderContext, frame: &mut FrameContext) {
        let plan = frame.plan;

        if plan.directional_shadow {
            if let Some(pipeline) = pipeline(ctx.registry, ProgramKind::ShadowDirectional, frame.stats) {
                let mut pass = begin(
                    frame.encoder,
                    frame.profiler,
                    kind,
                    "Directional Shadow Pass",
                    &[],
                    depth_attachment(&frame.shadows.directional.view, true),
                );
                pass.set_pipeline(pipeline);
                frame.scene.bind_camera(&mut pass, DIRECTIONAL_SHADOW_SLOT);
                for item in &plan.shadow_casters {
                    if let Some(entity) = frame.renderables.get(item.renderable) {
                        frame.stats.draw_calls += draw_depth(&mut pass, entity, item);
                    }
                }
            }
        }

        if plan.lights.point_shadows.is_empty() {
            return;
        }
        let Some(pipeline) = pipeline(ctx.registry, ProgramKind::ShadowPoint, frame.stats) else {
            return;
        };
        for shadow in 0..plan.lights.point_shadows.len() {
            let Some(cube) = frame.shadows.point.get(shadow) else { break };
            for face in 0..6 {
                let Some(view) = cube.face_view(face, 0) else { continue };
                let mut pass = begin(
                    frame.encoder,
                    frame.profiler,
                    kind,
                    "Point Shadow Pass",
                    &[],
                    depth_attachment(view, true),
                );
                pass.set_pipeline(pipeline);
                frame.scene.bind_camera(&mut pass, point_face_slot(shadow, face));
                for item in &plan.shadow_casters {
                    if let Some(entity) = frame.renderables.get(item.renderable) {
                        frame.stats.draw_calls += draw_depth(&mut pass, entity, item);
                    }
                }
            }
        }
    }
}
