//! Frame Plan Tests - Pass Selection, Light Upload and Draw Ordering
//!
//! Tests for the CPU side of a frame: which passes run for a settings
//! snapshot, which lights reach the GPU, and how renderables are split.

use glam::{Vec3, Vec4};
use lumen_engine::config::{RenderOption, RenderSettings};
use lumen_engine::render::frame_plan::{FramePlan, PassKind};
use lumen_engine::render::lights::{LightUpload, MAX_POINT_SHADOWS};
use lumen_engine::render::{select_closest_point_lights, BlendMode, Material, Model};
use lumen_engine::scene::{Attenuation, Entity, LightComponent, RenderComponent, Transform};

fn solid(name: &str, position: Vec3) -> Entity {
    Entity::new(name)
        .with_transform(Transform::from_translation(position))
        .with_render(RenderComponent::new(Model::cube(1.0), Material::color(name, Vec4::ONE)))
}

fn transparent(name: &str, position: Vec3) -> Entity {
    let material = Material::color(name, Vec4::new(1.0, 1.0, 1.0, 0.5)).with_blend(BlendMode::Transparent);
    Entity::new(name)
        .with_transform(Transform::from_translation(position))
        .with_render(RenderComponent::new(Model::cube(1.0), material))
}

fn point_light(position: Vec3, shadows: bool) -> Entity {
    Entity::new("point")
        .with_transform(Transform::from_translation(position))
        .with_light(LightComponent::point(Vec3::ONE, Attenuation::default()).with_shadows(shadows))
}

fn sun() -> Entity {
    Entity::new("sun").with_light(LightComponent::directional(Vec3::new(-0.3, -1.0, -0.2), Vec3::ONE))
}

// ============================================================================
// Pass Selection
// ============================================================================

#[test]
fn test_deferred_pass_order() {
    let mut settings = RenderSettings::default();
    settings.enable(RenderOption::Ssr);
    settings.enable(RenderOption::MotionBlur);
    let frame = settings.apply();
    let sun = sun();
    let a = solid("a", Vec3::ZERO);
    let glass = transparent("glass", Vec3::X);

    let plan = FramePlan::build(&frame, Vec3::Z * 5.0, &[&a, &glass], &[], Some(&sun), true);
    assert_eq!(
        plan.passes,
        vec![
            PassKind::Shadow,
            PassKind::Geometry,
            PassKind::Ssao,
            PassKind::SsaoBlur,
            PassKind::Lighting,
            PassKind::Reflections,
            PassKind::Skybox,
            PassKind::Blend,
            PassKind::MotionBlur,
            PassKind::BloomExtract,
            PassKind::BloomBlur,
            PassKind::ToneMap,
            PassKind::Fxaa,
            PassKind::Present,
        ]
    );
}

#[test]
fn test_forward_path_skips_gbuffer_passes() {
    let mut settings = RenderSettings::default();
    settings.disable(RenderOption::Deferred);
    let frame = settings.apply();
    let a = solid("a", Vec3::ZERO);

    let plan = FramePlan::build(&frame, Vec3::ZERO, &[&a], &[], None, false);
    assert!(plan.runs(PassKind::ForwardOpaque));
    for pass in [PassKind::Geometry, PassKind::Ssao, PassKind::Lighting, PassKind::Reflections] {
        assert!(!plan.runs(pass), "{pass} ran on the forward path");
    }
    assert!(!plan.runs(PassKind::Skybox));
    assert_eq!(plan.passes.last(), Some(&PassKind::Present));
}

#[test]
fn test_no_shadow_pass_without_casters_or_lighting() {
    let mut settings = RenderSettings::default();
    settings.disable(RenderOption::Lighting);
    let frame = settings.apply();
    let sun = sun();
    let lamp = point_light(Vec3::Y, true);

    let plan = FramePlan::build(&frame, Vec3::ZERO, &[], &[&lamp], Some(&sun), false);
    assert!(!plan.runs(PassKind::Shadow));
    assert_eq!(plan.shadow_maps_sampled, 0);
    assert!(plan.lights.records.is_empty());
}

#[test]
fn test_reflective_solids_draw_forward_in_deferred() {
    let frame = RenderSettings::default().apply();
    let plain = solid("plain", Vec3::ZERO);
    let mirror = Entity::new("mirror")
        .with_transform(Transform::default())
        .with_render(RenderComponent::new(Model::cube(1.0), Material::color("mirror", Vec4::ONE)).reflective());

    let plan = FramePlan::build(&frame, Vec3::ZERO, &[&plain, &mirror], &[], None, false);
    assert_eq!(plan.geometry.len(), 1);
    assert_eq!(plan.forward.len(), 1);
    assert_eq!(plan.forward[0].renderable, 1);
    assert!(plan.runs(PassKind::ForwardOpaque));
}

// ============================================================================
// Incomplete Renderables
// ============================================================================

#[test]
fn test_missing_model_is_skipped_not_fatal() {
    let frame = RenderSettings::default().apply();
    let mut broken = solid("broken", Vec3::ZERO);
    if let Some(render) = broken.render_mut() {
        render.model = None;
    }
    let fine = solid("fine", Vec3::X);

    let plan = FramePlan::build(&frame, Vec3::ZERO, &[&broken, &fine], &[], None, false);
    assert_eq!(plan.objects.len(), 1);
    assert_eq!(plan.skipped.len(), 1);
    assert_eq!(plan.skipped[0].name, "broken");
    assert_eq!(plan.skipped[0].missing, "model");
}

// ============================================================================
// Blend Ordering
// ============================================================================

#[test]
fn test_blend_items_are_back_to_front() {
    let frame = RenderSettings::default().apply();
    let near = transparent("near", Vec3::new(0.0, 0.0, 1.0));
    let far = transparent("far", Vec3::new(0.0, 0.0, -10.0));
    let middle = transparent("middle", Vec3::new(0.0, 0.0, -3.0));

    let plan = FramePlan::build(&frame, Vec3::new(0.0, 0.0, 5.0), &[&near, &far, &middle], &[], None, false);
    let names: Vec<_> = plan
        .blend
        .iter()
        .map(|item| [&near, &far, &middle][item.renderable].name.as_str())
        .collect();
    assert_eq!(names, ["far", "middle", "near"]);
    assert!(plan.blend.iter().all(|item| !plan.solid.contains(item)));
}

// ============================================================================
// Light Upload
// ============================================================================

#[test]
fn test_only_closest_point_lights_are_uploaded() {
    let mut settings = RenderSettings::default();
    settings.tunables.lighting.max_point_lights = 2;
    let frame = settings.apply();
    let lights: Vec<Entity> = [10.0, 1.0, 5.0, 2.0]
        .iter()
        .map(|x| point_light(Vec3::new(*x, 0.0, 0.0), false))
        .collect();
    let refs: Vec<&Entity> = lights.iter().collect();

    let upload = LightUpload::build(&frame, Vec3::ZERO, &refs, None);
    assert_eq!(upload.point_count, 2);
    let xs: Vec<f32> = upload.records.iter().map(|r| r.position[0]).collect();
    assert_eq!(xs, vec![1.0, 2.0]);
    assert_eq!(upload.uniforms.counts[3], 2);
}

#[test]
fn test_point_shadow_slots_are_capped() {
    let frame = RenderSettings::default().apply();
    let lights: Vec<Entity> = (0..MAX_POINT_SHADOWS + 2)
        .map(|i| point_light(Vec3::new(i as f32, 0.0, 0.0), true))
        .collect();
    let refs: Vec<&Entity> = lights.iter().collect();

    let upload = LightUpload::build(&frame, Vec3::ZERO, &refs, None);
    assert_eq!(upload.point_shadows.len(), MAX_POINT_SHADOWS);
    let unslotted = upload.records.iter().filter(|r| r.direction[3] < 0.0).count();
    assert_eq!(unslotted, 2);
}

#[test]
fn test_spot_lights_follow_point_lights() {
    let frame = RenderSettings::default().apply();
    let spot = Entity::new("spot")
        .with_transform(Transform::from_translation(Vec3::Y * 3.0))
        .with_light(LightComponent::spot(Vec3::NEG_Y, Vec3::ONE, 0.2, 0.4));
    let point = point_light(Vec3::X, false);

    let upload = LightUpload::build(&frame, Vec3::ZERO, &[&spot, &point], None);
    assert_eq!(upload.spot_count, 1);
    assert_eq!(upload.records[0].position[3], 1.0);
    assert_eq!(upload.records[1].position[3], 2.0);
}

#[test]
fn test_select_closest_keeps_ties_in_order() {
    let positions = [Vec3::X, Vec3::NEG_X, Vec3::Y * 0.5, Vec3::Z];
    assert_eq!(select_closest_point_lights(Vec3::ZERO, &positions, 3), vec![2, 0, 1]);
    assert!(select_closest_point_lights(Vec3::ZERO, &positions, 0).is_empty());
}
