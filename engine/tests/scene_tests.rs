//! Scene Tests - Entities, Transforms and the Snapshot
//!
//! Tests for capability-tagged entities, the snapshot queries the renderer
//! relies on, and matrix decomposition.

use approx::assert_relative_eq;
use glam::{Mat4, Quat, Vec3, Vec4};
use lumen_engine::render::{Material, Model};
use lumen_engine::scene::{
    CameraComponent, Capability, Entity, LightComponent, RenderComponent, SceneSnapshot, Transform,
};

fn cube_entity(name: &str, position: Vec3) -> Entity {
    Entity::new(name)
        .with_transform(Transform::from_translation(position))
        .with_render(RenderComponent::new(Model::cube(1.0), Material::color(name, Vec4::ONE)))
}

// ============================================================================
// Entity Capabilities
// ============================================================================

#[test]
fn test_capabilities_follow_components() {
    let mut entity = cube_entity("crate", Vec3::ZERO);
    assert!(entity.capabilities().has(Capability::Transform));
    assert!(entity.capabilities().has(Capability::Render));
    assert!(!entity.capabilities().has(Capability::Light));

    entity.detach_render();
    assert!(!entity.capabilities().has(Capability::Render));
    assert!(entity.render().is_none());
}

#[test]
fn test_entity_without_transform_sits_at_origin() {
    let entity = Entity::new("loose");
    assert_eq!(entity.world(), Mat4::IDENTITY);
    assert_eq!(entity.world_position(), Vec3::ZERO);
}

// ============================================================================
// Snapshot Queries
// ============================================================================

#[test]
fn test_snapshot_partitions_entities() {
    let mut scene = SceneSnapshot::new();
    scene.insert(cube_entity("a", Vec3::ZERO));
    let reflective = scene.insert(
        Entity::new("mirror")
            .with_transform(Transform::default())
            .with_render(RenderComponent::new(Model::uv_sphere(1.0, 16, 8), Material::color("m", Vec4::ONE)).reflective()),
    );
    scene.insert(
        Entity::new("lamp")
            .with_transform(Transform::from_translation(Vec3::Y))
            .with_light(LightComponent::point(Vec3::ONE, Default::default())),
    );
    let camera = scene.insert(
        Entity::new("camera")
            .with_transform(Transform::default())
            .with_camera(CameraComponent::new(1.0, 1.0, 0.1, 100.0)),
    );

    assert_eq!(scene.renderables().len(), 2);
    assert_eq!(scene.lights().len(), 1);
    assert_eq!(scene.reflective().iter().map(|e| e.id()).collect::<Vec<_>>(), vec![reflective]);
    assert!(scene.set_main_camera(camera));
    assert_eq!(scene.main_camera().map(Entity::id), Some(camera));
}

#[test]
fn test_main_camera_requires_camera_component() {
    let mut scene = SceneSnapshot::new();
    let id = scene.insert(cube_entity("not a camera", Vec3::ZERO));
    assert!(!scene.set_main_camera(id));
    assert!(scene.main_camera().is_none());
}

// ============================================================================
// Transform Decomposition
// ============================================================================

#[test]
fn test_decompose_recovers_trs() {
    let rotation = Quat::from_rotation_y(0.7) * Quat::from_rotation_x(-0.3);
    let mut transform = Transform::from_trs(Vec3::new(1.0, -2.0, 3.0), rotation, Vec3::new(2.0, 0.5, 1.5));
    let decomposed = transform.decompose().unwrap();

    assert_relative_eq!(decomposed.translation.x, 1.0, epsilon = 1e-5);
    assert_relative_eq!(decomposed.translation.y, -2.0, epsilon = 1e-5);
    assert_relative_eq!(decomposed.translation.z, 3.0, epsilon = 1e-5);
    assert_relative_eq!(decomposed.scale.x, 2.0, epsilon = 1e-4);
    assert_relative_eq!(decomposed.scale.y, 0.5, epsilon = 1e-4);
    assert_relative_eq!(decomposed.scale.z, 1.5, epsilon = 1e-4);
    assert_relative_eq!(decomposed.rotation.dot(rotation).abs(), 1.0, epsilon = 1e-4);
}

#[test]
fn test_recompose_matches_local_matrix() {
    let mut transform = Transform::from_trs(Vec3::new(4.0, 0.0, -1.0), Quat::from_rotation_z(1.1), Vec3::splat(3.0));
    let local = transform.local();
    let recomposed = transform.decompose().unwrap().recompose();
    for (a, b) in local.to_cols_array().iter().zip(recomposed.to_cols_array().iter()) {
        assert_relative_eq!(a, b, epsilon = 1e-4);
    }
}

#[test]
fn test_singular_matrix_does_not_decompose() {
    let mut transform = Transform::from_matrix(Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)));
    assert!(transform.decompose().is_none());
    assert!(transform.decomposed().is_none());
}
