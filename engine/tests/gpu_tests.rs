//! GPU Tests - Headless Renderer Behaviour
//!
//! Drive a `Renderer` on a headless context. Every test returns early when
//! the machine has no usable adapter (software fallback included).

use std::path::{Path, PathBuf};

use glam::{Vec3, Vec4};
use lumen_engine::config::{RenderOption, RenderSettings};
use lumen_engine::render::gpu_context::HEADLESS_FORMAT;
use lumen_engine::render::{
    BlendMode, GpuContext, GpuContextConfig, Material, Model, PassKind, PbrMaterial, Renderer, Texture, TextureData,
    TextureMaterial,
};
use lumen_engine::{LoggingConfig, init_logging};
use lumen_engine::scene::{
    Attenuation, CameraComponent, Entity, LightComponent, RenderComponent, SceneSnapshot, Transform,
};

fn headless() -> Option<GpuContext> {
    init_logging(LoggingConfig::for_tests());
    let config = GpuContextConfig {
        timestamps: false,
        headless_size: (64, 64),
        ..Default::default()
    };
    match GpuContext::headless(config) {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

fn shader_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders")
}

fn small_settings() -> RenderSettings {
    let mut settings = RenderSettings::default();
    settings.tunables.environment.skybox_size = 32;
    settings.tunables.environment.capture_size = 16;
    settings.tunables.environment.irradiance_size = 8;
    settings.tunables.environment.prefilter_size = 16;
    settings.tunables.environment.brdf_lut_size = 32;
    settings
}

fn renderer(ctx: &GpuContext) -> Renderer {
    Renderer::new(ctx, small_settings(), shader_root())
}

fn all_options_renderer(ctx: &GpuContext, shader_root: PathBuf) -> Renderer {
    let mut settings = small_settings();
    for option in RenderOption::ALL {
        settings.enable(option);
    }
    Renderer::new(ctx, settings, shader_root)
}

/// Copy the shader tree so a test can break one file without touching the
/// real one.
fn copy_shaders(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_shaders(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), target).unwrap();
        }
    }
}

fn output(ctx: &GpuContext) -> wgpu::TextureView {
    let (width, height) = ctx.dimensions();
    ctx.device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Test Output"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: HEADLESS_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn gradient_equirect(ctx: &GpuContext) -> Texture {
    let (width, height) = (16, 8);
    let texels: Vec<f32> = (0..width * height)
        .flat_map(|i| {
            let y = (i / width) as f32 / height as f32;
            [y, 0.5, 1.0 - y, 1.0]
        })
        .collect();
    let data = TextureData::rgba32f("Test Equirect", width, height, &texels);
    Texture::from_data(&ctx.device, &ctx.queue, &data).unwrap()
}

fn scene() -> SceneSnapshot {
    let mut scene = SceneSnapshot::new();
    scene.insert(
        Entity::new("floor")
            .with_transform(Transform::from_translation(Vec3::NEG_Y))
            .with_render(RenderComponent::new(Model::plane(10.0), Material::color("floor", Vec4::ONE))),
    );
    let camera = scene.insert(
        Entity::new("camera")
            .with_transform(Transform::from_translation(Vec3::new(0.0, 1.0, 5.0)))
            .with_camera(CameraComponent::new(1.0, 1.0, 0.1, 100.0)),
    );
    scene.set_main_camera(camera);
    let sun = scene.insert(
        Entity::new("sun").with_light(LightComponent::directional(Vec3::new(-0.2, -1.0, -0.3), Vec3::ONE)),
    );
    scene.set_directional_light(sun);
    scene
}

/// One of everything: textured, PBR, transparent and reflective objects lit
/// by the sun and two shadowed point lights.
fn full_scene() -> SceneSnapshot {
    let mut scene = scene();
    let checker = TextureData::rgba8(
        "checker",
        2,
        2,
        vec![255, 255, 255, 255, 40, 40, 40, 255, 40, 40, 40, 255, 255, 255, 255, 255],
    );
    let textured = TextureMaterial {
        diffuse: Some(checker),
        ..Default::default()
    };
    scene.insert(
        Entity::new("crate")
            .with_transform(Transform::from_translation(Vec3::new(-1.5, 0.0, 0.0)))
            .with_render(RenderComponent::new(Model::cube(1.0), Material::textured("crate", textured))),
    );
    let metal = PbrMaterial {
        metallic_factor: 1.0,
        roughness_factor: 0.3,
        ..Default::default()
    };
    scene.insert(
        Entity::new("ball")
            .with_transform(Transform::from_translation(Vec3::new(1.5, 0.0, 0.0)))
            .with_render(RenderComponent::new(Model::uv_sphere(0.5, 16, 8), Material::pbr("ball", metal))),
    );
    scene.insert(
        Entity::new("glass")
            .with_transform(Transform::from_translation(Vec3::new(0.0, 0.0, 1.5)))
            .with_render(RenderComponent::new(
                Model::cube(0.5),
                Material::color("glass", Vec4::new(0.6, 0.8, 1.0, 0.4)).with_blend(BlendMode::Transparent),
            )),
    );
    scene.insert(
        Entity::new("mirror")
            .with_transform(Transform::default())
            .with_render(RenderComponent::new(Model::uv_sphere(0.5, 16, 8), Material::color("mirror", Vec4::ONE)).reflective()),
    );
    for (name, x) in [("lamp_left", -2.0), ("lamp_right", 2.0)] {
        scene.insert(
            Entity::new(name)
                .with_transform(Transform::from_translation(Vec3::new(x, 2.0, 1.0)))
                .with_light(LightComponent::point(Vec3::ONE, Attenuation::default()).with_shadows(true)),
        );
    }
    scene
}

// ============================================================================
// Environment Stage
// ============================================================================

#[test]
fn test_equirect_converts_to_six_face_cube() {
    let Some(ctx) = headless() else { return };
    let mut renderer = renderer(&ctx);
    let equirect = gradient_equirect(&ctx);

    let cube = renderer.convert_equi_to_cube(&ctx, equirect);
    assert_eq!(cube.face_count(), 6);
    assert_eq!(cube.size(), 32);
    assert_eq!(renderer.environment().stats().cubemaps_allocated, 1);
}

#[test]
fn test_bake_without_reflective_objects_allocates_nothing() {
    let Some(ctx) = headless() else { return };
    let mut renderer = renderer(&ctx);
    let mut scene = scene();
    renderer.load_scene(&ctx, &mut scene);

    renderer.render_environment_maps(&ctx, &scene.renderables(), &scene.lights(), scene.directional_light(), None);
    let stats = renderer.environment().stats();
    assert_eq!(stats.cubemaps_allocated, 0);
    assert_eq!(stats.captures, 0);
    assert!(renderer.environment().maps().is_empty());
}

#[test]
fn test_bake_produces_maps_for_each_reflective_object() {
    let Some(ctx) = headless() else { return };
    let mut renderer = renderer(&ctx);
    let mut scene = scene();
    let mirror = scene.insert(
        Entity::new("mirror")
            .with_transform(Transform::default())
            .with_render(RenderComponent::new(Model::uv_sphere(1.0, 16, 8), Material::color("mirror", Vec4::ONE)).reflective()),
    );
    renderer.load_scene(&ctx, &mut scene);

    renderer.render_environment_maps(&ctx, &scene.renderables(), &scene.lights(), scene.directional_light(), None);
    let environment = renderer.environment();
    assert_eq!(environment.maps().len(), 1);
    let maps = environment.get(mirror).unwrap();
    assert_eq!(maps.environment.size(), 16);
    assert_eq!(maps.irradiance.size(), 8);
    assert_eq!(maps.prefilter.mip_levels(), 5);
    assert_eq!(environment.stats().brdf_luts, 1);
}

// ============================================================================
// Frame Rendering
// ============================================================================

#[test]
fn test_renderable_without_model_is_skipped() {
    let Some(ctx) = headless() else { return };
    let mut renderer = renderer(&ctx);
    let mut scene = scene();
    let mut hollow = RenderComponent::new(Model::cube(1.0), Material::color("hollow", Vec4::ONE));
    hollow.model = None;
    scene.insert(Entity::new("hollow").with_transform(Transform::default()).with_render(hollow));
    renderer.load_scene(&ctx, &mut scene);

    let target = output(&ctx);
    let Some(camera) = scene.main_camera() else { panic!("scene has a camera") };
    renderer.render(&ctx, &target, &scene.renderables(), &scene.lights(), camera, scene.directional_light(), None);

    let stats = renderer.last_frame_stats();
    assert_eq!(stats.skipped.len(), 1);
    assert_eq!(stats.skipped[0].name, "hollow");
    assert!(stats.draw_calls > 0);
}

#[test]
fn test_missing_camera_aborts_the_frame() {
    let Some(ctx) = headless() else { return };
    let mut renderer = renderer(&ctx);
    let mut scene = scene();
    renderer.load_scene(&ctx, &mut scene);

    let target = output(&ctx);
    let renderables = scene.renderables();
    let not_a_camera = renderables[0];
    renderer.render(&ctx, &target, &renderables, &scene.lights(), not_a_camera, None, None);

    assert!(renderer.last_frame_stats().passes.is_empty());
    assert_eq!(renderer.last_frame_stats().draw_calls, 0);
}

#[test]
fn test_skybox_pass_runs_only_with_a_skybox() {
    let Some(ctx) = headless() else { return };
    let mut renderer = renderer(&ctx);
    let mut scene = scene();
    renderer.load_scene(&ctx, &mut scene);
    let target = output(&ctx);
    let Some(camera) = scene.main_camera() else { panic!("scene has a camera") };

    renderer.render(&ctx, &target, &scene.renderables(), &scene.lights(), camera, scene.directional_light(), None);
    assert!(!renderer.last_frame_stats().passes.contains(&lumen_engine::render::PassKind::Skybox));

    let equirect = gradient_equirect(&ctx);
    let sky = renderer.convert_equi_to_cube(&ctx, equirect);
    renderer.render(&ctx, &target, &scene.renderables(), &scene.lights(), camera, scene.directional_light(), Some(&sky));
    let stats = renderer.last_frame_stats();
    assert!(stats.passes.contains(&lumen_engine::render::PassKind::Skybox));
    assert_eq!(stats.frame, 1);
}

#[test]
fn test_camera_without_transform_aborts_the_frame() {
    let Some(ctx) = headless() else { return };
    let mut renderer = renderer(&ctx);
    let mut scene = scene();
    renderer.load_scene(&ctx, &mut scene);

    let target = output(&ctx);
    let unplaced = Entity::new("unplaced").with_camera(CameraComponent::new(1.0, 1.0, 0.1, 100.0));
    renderer.render(&ctx, &target, &scene.renderables(), &scene.lights(), &unplaced, None, None);

    assert!(renderer.last_frame_stats().passes.is_empty());
    assert_eq!(renderer.last_frame_stats().draw_calls, 0);
}

// ============================================================================
// Full Feature Set
// ============================================================================

#[test]
fn test_every_option_renders_without_invalid_programs() {
    let Some(ctx) = headless() else { return };
    let mut renderer = all_options_renderer(&ctx, shader_root());
    let mut scene = full_scene();
    renderer.load_scene(&ctx, &mut scene);
    let equirect = gradient_equirect(&ctx);
    let sky = renderer.convert_equi_to_cube(&ctx, equirect);
    renderer.render_environment_maps(&ctx, &scene.renderables(), &scene.lights(), scene.directional_light(), Some(&sky));

    let target = output(&ctx);
    let Some(camera) = scene.main_camera() else { panic!("scene has a camera") };
    // the second frame has a previous view-projection for motion blur
    for _ in 0..2 {
        renderer.render(&ctx, &target, &scene.renderables(), &scene.lights(), camera, scene.directional_light(), Some(&sky));
    }

    let stats = renderer.last_frame_stats();
    assert_eq!(renderer.registry().invalid_count(), 0);
    assert_eq!(stats.skipped_draws, 0);
    for pass in [PassKind::Geometry, PassKind::Ssao, PassKind::Reflections, PassKind::MotionBlur, PassKind::Fxaa] {
        assert!(stats.passes.contains(&pass), "{pass:?} did not run");
    }
    assert_eq!(ctx.uncaptured_error_count(), 0);
}

#[test]
fn test_broken_post_shader_leaves_the_frame_running() {
    let Some(ctx) = headless() else { return };
    let root = std::env::temp_dir().join(format!("lumen_broken_fxaa_{}", std::process::id()));
    copy_shaders(&shader_root(), &root);
    std::fs::write(root.join("fxaa.wgsl"), "@fragment fn fs_main() -> @location(0) vec4<f32> { return undefined; }")
        .unwrap();

    let mut renderer = all_options_renderer(&ctx, root.clone());
    let mut scene = scene();
    renderer.load_scene(&ctx, &mut scene);
    let target = output(&ctx);
    let Some(camera) = scene.main_camera() else { panic!("scene has a camera") };
    renderer.render(&ctx, &target, &scene.renderables(), &scene.lights(), camera, scene.directional_light(), None);

    let stats = renderer.last_frame_stats();
    assert_eq!(renderer.registry().invalid_count(), 1);
    assert!(stats.passes.contains(&PassKind::Present));
    assert!(stats.draw_calls > 0);
    assert_eq!(ctx.uncaptured_error_count(), 0);
    std::fs::remove_dir_all(&root).ok();
}
