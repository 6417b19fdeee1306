//! Frame Plan
//!
//! Everything the renderer decides before touching the GPU: which
//! renderables are drawable, how they split into solid and blended sets,
//! the back-to-front blend order, shadow casters, the uploaded light set
//! and the ordered pass list. Building a plan needs no device, so frame
//! behavior is testable without an adapter.

use std::fmt;

use glam::Vec3;

use super::lights::LightUpload;
use super::uniforms::ObjectData;
use crate::config::{FrameSettings, RenderOption};
use crate::scene::{Entity, EntityId};

/// Frame passes in execution order. The derived `Ord` is that order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassKind {
    Shadow,
    Geometry,
    Ssao,
    SsaoBlur,
    Lighting,
    Reflections,
    ForwardOpaque,
    Skybox,
    Blend,
    MotionBlur,
    BloomExtract,
    BloomBlur,
    ToneMap,
    Fxaa,
    Present,
}

impl PassKind {
    pub const ALL: [PassKind; 15] = [
        PassKind::Shadow,
        PassKind::Geometry,
        PassKind::Ssao,
        PassKind::SsaoBlur,
        PassKind::Lighting,
        PassKind::Reflections,
        PassKind::ForwardOpaque,
        PassKind::Skybox,
        PassKind::Blend,
        PassKind::MotionBlur,
        PassKind::BloomExtract,
        PassKind::BloomBlur,
        PassKind::ToneMap,
        PassKind::Fxaa,
        PassKind::Present,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PassKind::Shadow => "shadow",
            PassKind::Geometry => "geometry",
            PassKind::Ssao => "ssao",
            PassKind::SsaoBlur => "ssao_blur",
            PassKind::Lighting => "lighting",
            PassKind::Reflections => "reflections",
            PassKind::ForwardOpaque => "forward_opaque",
            PassKind::Skybox => "skybox",
            PassKind::Blend => "blend",
            PassKind::MotionBlur => "motion_blur",
            PassKind::BloomExtract => "bloom_extract",
            PassKind::BloomBlur => "bloom_blur",
            PassKind::ToneMap => "tone_map",
            PassKind::Fxaa => "fxaa",
            PassKind::Present => "present",
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A renderable left out of the frame and why.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedRenderable {
    pub entity: EntityId,
    pub name: String,
    pub missing: &'static str,
}

/// One drawable renderable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawItem {
    pub entity: EntityId,
    /// Index into the renderables slice the plan was built from
    pub renderable: usize,
    /// Slot in the per-object storage array, used as the instance index
    pub object: u32,
    /// Distance from the camera to the object's origin
    pub distance: f32,
}

#[derive(Clone, Debug, Default)]
pub struct FramePlan {
    pub passes: Vec<PassKind>,
    /// Every drawable renderable, in object slot order
    pub objects: Vec<DrawItem>,
    /// Opaque and cutout objects, input order
    pub solid: Vec<DrawItem>,
    /// Solid objects written into the G-buffer (deferred path)
    pub geometry: Vec<DrawItem>,
    /// Solid objects lit directly: everything on the forward path, and
    /// reflective objects (which carry their own environment maps) on the
    /// deferred path
    pub forward: Vec<DrawItem>,
    /// Transparent and additive objects, farthest first
    pub blend: Vec<DrawItem>,
    pub shadow_casters: Vec<DrawItem>,
    pub lights: LightUpload,
    pub skipped: Vec<SkippedRenderable>,
    /// The directional light renders into the shadow map this frame
    pub directional_shadow: bool,
    /// Shadow maps the lighting shaders are allowed to read
    pub shadow_maps_sampled: u32,
}

impl FramePlan {
    pub fn build(
        settings: &FrameSettings,
        camera_position: Vec3,
        renderables: &[&Entity],
        lights: &[&Entity],
        directional: Option<&Entity>,
        skybox: bool,
    ) -> Self {
        let mut plan = FramePlan {
            lights: LightUpload::build(settings, camera_position, lights, directional),
            ..Default::default()
        };

        for (index, entity) in renderables.iter().enumerate() {
            let Some(render) = entity.render() else {
                plan.skip(entity, "render component");
                continue;
            };
            let (Some(_), Some(material)) = (&render.model, &render.material) else {
                plan.skip(entity, if render.model.is_none() { "model" } else { "material" });
                continue;
            };
            let item = DrawItem {
                entity: entity.id(),
                renderable: index,
                object: plan.objects.len() as u32,
                distance: entity.world_position().distance(camera_position),
            };
            plan.objects.push(item);
            if material.is_blended() {
                plan.blend.push(item);
            } else {
                plan.solid.push(item);
                if settings.deferred() && !render.reflective {
                    plan.geometry.push(item);
                } else {
                    plan.forward.push(item);
                }
                if material.casts_shadows {
                    plan.shadow_casters.push(item);
                }
            }
        }
        // painter's order; stable so equal distances keep input order
        plan.blend.sort_by(|a, b| b.distance.total_cmp(&a.distance));

        let shadows = settings.shadows();
        plan.directional_shadow = shadows
            && directional
                .and_then(Entity::light)
                .is_some_and(|light| light.is_directional() && light.casts_shadows);
        if shadows {
            plan.shadow_maps_sampled = plan.directional_shadow as u32 + plan.lights.point_shadows.len() as u32;
        }
        let uniforms = &mut plan.lights.uniforms;
        uniforms.flags[0] = (plan.shadow_maps_sampled > 0) as u32;
        uniforms.ambient[1] = if plan.directional_shadow { 1.0 } else { 0.0 };

        plan.passes = Self::passes(settings, &plan, skybox);
        plan
    }

    fn skip(&mut self, entity: &Entity, missing: &'static str) {
        log::warn!("[FramePlan] skipping '{}' ({}): no {missing}", entity.name, entity.id());
        self.skipped.push(SkippedRenderable {
            entity: entity.id(),
            name: entity.name.clone(),
            missing,
        });
    }

    fn passes(settings: &FrameSettings, plan: &FramePlan, skybox: bool) -> Vec<PassKind> {
        let mut passes = Vec::with_capacity(PassKind::ALL.len());
        if plan.shadow_maps_sampled > 0 {
            passes.push(PassKind::Shadow);
        }
        if settings.deferred() {
            passes.push(PassKind::Geometry);
            if settings.is_enabled(RenderOption::Ssao) {
                passes.extend([PassKind::Ssao, PassKind::SsaoBlur]);
            }
            passes.push(PassKind::Lighting);
            if settings.is_enabled(RenderOption::Ssr) {
                passes.push(PassKind::Reflections);
            }
        }
        if !settings.deferred() || !plan.forward.is_empty() {
            passes.push(PassKind::ForwardOpaque);
        }
        if skybox {
            passes.push(PassKind::Skybox);
        }
        if !plan.blend.is_empty() {
            passes.push(PassKind::Blend);
        }
        if settings.is_enabled(RenderOption::MotionBlur) {
            passes.push(PassKind::MotionBlur);
        }
        if settings.is_enabled(RenderOption::Bloom) {
            passes.push(PassKind::BloomExtract);
            if settings.tunables.bloom.blur_iterations > 0 {
                passes.push(PassKind::BloomBlur);
            }
        }
        passes.push(PassKind::ToneMap);
        if settings.is_enabled(RenderOption::Fxaa) {
            passes.push(PassKind::Fxaa);
        }
        passes.push(PassKind::Present);
        passes
    }

    pub fn runs(&self, pass: PassKind) -> bool {
        self.passes.contains(&pass)
    }

    pub fn blend_order(&self) -> Vec<EntityId> {
        self.blend.iter().map(|item| item.entity).collect()
    }

    /// Per-object storage records, indexed by `DrawItem::object`.
    pub fn object_data(&self, renderables: &[&Entity]) -> Vec<ObjectData> {
        self.objects
            .iter()
            .map(|item| {
                renderables.get(item.renderable).map_or_else(
                    || ObjectData::new(glam::Mat4::IDENTITY, false),
                    |entity| ObjectData::new(entity.world(), entity.is_reflective()),
                )
            })
            .collect()
    }
}

/// What the last frame did, for tests and diagnostics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub frame: u64,
    pub passes: Vec<PassKind>,
    pub draw_calls: u32,
    pub skipped: Vec<SkippedRenderable>,
    pub shadow_map_reads: u32,
    pub point_lights_uploaded: usize,
    pub spot_lights_uploaded: usize,
    pub uploaded_lights: Vec<EntityId>,
    pub blend_order: Vec<EntityId>,
    /// Draws and passes dropped because their program is invalid
    pub skipped_draws: u32,
}

impl FrameStats {
    pub fn from_plan(frame: u64, plan: &FramePlan) -> Self {
        Self {
            frame,
            passes: plan.passes.clone(),
            draw_calls: 0,
            skipped: plan.skipped.clone(),
            shadow_map_reads: plan.shadow_maps_sampled,
            point_lights_uploaded: plan.lights.point_count,
            spot_lights_uploaded: plan.lights.spot_count,
            uploaded_lights: plan.lights.entities.clone(),
            blend_order: plan.blend_order(),
            skipped_draws: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;
    use crate::config::RenderSettings;
    use crate::render::material::{BlendMode, Material};
    use crate::render::model::Model;
    use crate::scene::{LightComponent, RenderComponent, Transform};

    fn renderable(id: u32, name: &str, at: Vec3, blend: BlendMode) -> Entity {
        let mut entity = Entity::new(name)
            .with_transform(Transform::from_translation(at))
            .with_render(RenderComponent::new(
                Model::cube(1.0),
                Material::color(name, Vec4::ONE).with_blend(blend),
            ));
        entity.set_id(EntityId(id));
        entity
    }

    #[test]
    fn test_pass_list_is_strictly_ordered() {
        let mut settings = RenderSettings::default();
        for option in crate::config::RenderOption::ALL {
            settings.enable(option);
        }
        let sun = Entity::new("sun")
            .with_transform(Transform::default())
            .with_light(LightComponent::directional(Vec3::new(1.0, -2.0, -1.0), Vec3::ONE));
        let glass = renderable(1, "glass", Vec3::Z, BlendMode::Transparent);
        let plan = FramePlan::build(&settings.apply(), Vec3::ZERO, &[&glass], &[], Some(&sun), true);

        assert!(plan.passes.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(plan.passes.first(), Some(&PassKind::Shadow));
        assert_eq!(plan.passes.last(), Some(&PassKind::Present));
        assert!(!plan.runs(PassKind::ForwardOpaque));
    }

    #[test]
    fn test_forward_path_has_no_gbuffer_passes() {
        let mut settings = RenderSettings::default();
        settings.disable(RenderOption::Deferred);
        let plan = FramePlan::build(&settings.apply(), Vec3::ZERO, &[], &[], None, false);
        assert!(plan.runs(PassKind::ForwardOpaque));
        for pass in [PassKind::Geometry, PassKind::Ssao, PassKind::Lighting, PassKind::Reflections] {
            assert!(!plan.runs(pass), "{pass} should not run");
        }
        assert!(!plan.runs(PassKind::Blend));
    }

    #[test]
    fn test_incomplete_renderables_are_skipped() {
        let mut broken = Entity::new("broken")
            .with_transform(Transform::default())
            .with_render(RenderComponent {
                model: None,
                material: Some(Material::color("m", Vec4::ONE)),
                reflective: false,
            });
        broken.set_id(EntityId(4));
        let ok = renderable(5, "ok", Vec3::ZERO, BlendMode::Opaque);

        let plan = FramePlan::build(&FrameSettings::default(), Vec3::ZERO, &[&broken, &ok], &[], None, false);
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].entity, EntityId(4));
        assert_eq!(plan.skipped[0].missing, "model");
        assert_eq!(plan.objects.len(), 1);
        assert_eq!(plan.solid[0].renderable, 1);
        assert_eq!(plan.solid[0].object, 0);
    }

    #[test]
    fn test_blend_sorted_back_to_front() {
        let near = renderable(1, "near", Vec3::new(0.0, 0.0, -1.0), BlendMode::Transparent);
        let far = renderable(2, "far", Vec3::new(0.0, 0.0, -9.0), BlendMode::Additive);
        let mid = renderable(3, "mid", Vec3::new(0.0, 0.0, -4.0), BlendMode::Transparent);
        let wall = renderable(4, "wall", Vec3::new(0.0, 0.0, -20.0), BlendMode::Opaque);

        let plan = FramePlan::build(
            &FrameSettings::default(),
            Vec3::ZERO,
            &[&near, &far, &mid, &wall],
            &[],
            None,
            false,
        );
        assert_eq!(plan.blend_order(), vec![EntityId(2), EntityId(3), EntityId(1)]);
        assert_eq!(plan.solid.len(), 1);
        assert_eq!(plan.shadow_casters.len(), 1);
    }

    #[test]
    fn test_reflective_solids_are_lit_forward_on_deferred_path() {
        let mut mirror = Entity::new("mirror")
            .with_transform(Transform::default())
            .with_render(RenderComponent::new(Model::uv_sphere(1.0, 8, 8), Material::color("m", Vec4::ONE)).reflective());
        mirror.set_id(EntityId(1));
        let floor = renderable(2, "floor", Vec3::ZERO, BlendMode::Opaque);

        let plan = FramePlan::build(&FrameSettings::default(), Vec3::ZERO, &[&mirror, &floor], &[], None, false);
        assert_eq!(plan.geometry.iter().map(|i| i.entity).collect::<Vec<_>>(), vec![EntityId(2)]);
        assert_eq!(plan.forward.iter().map(|i| i.entity).collect::<Vec<_>>(), vec![EntityId(1)]);
        assert!(plan.runs(PassKind::Geometry));
        assert!(plan.runs(PassKind::ForwardOpaque));
    }

    #[test]
    fn test_shadows_disabled_reads_no_shadow_maps() {
        let mut settings = RenderSettings::default();
        settings.disable(RenderOption::Shadows);
        let sun = Entity::new("sun")
            .with_transform(Transform::default())
            .with_light(LightComponent::directional(Vec3::new(1.0, -2.0, -1.0), Vec3::ONE));
        let plan = FramePlan::build(&settings.apply(), Vec3::ZERO, &[], &[], Some(&sun), false);

        assert_eq!(plan.shadow_maps_sampled, 0);
        assert!(!plan.directional_shadow);
        assert!(!plan.runs(PassKind::Shadow));
        assert!(!plan.lights.uniforms.shadows_enabled());
        assert!(plan.lights.has_directional());
    }
}
