//! Lumen Viewer - Interactive Scene Viewer
//!
//! Opens a window, builds a small demo scene from primitives, bakes the
//! environment maps once and renders every frame with the full pass chain.
//!
//! Run with: `cargo run --bin lumen_viewer -- [sky.hdr] [--settings render.json]`
//!
//! Controls:
//! - WASD: Move camera
//! - Q/E: Move down/up
//! - Arrow keys or right mouse drag: Look around
//! - 1-9: Toggle Lighting, Shadows, Bloom, FXAA, Motion Blur, Deferred, SSAO, SSR, PBR
//! - B: Re-bake environment maps
//! - R: Reload shaders from disk
//! - P: Print the current settings as JSON
//! - ESC: Exit

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use glam::{Quat, Vec3, Vec4};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use lumen_engine::config::{RenderOption, RenderSettings};
use lumen_engine::render::{
    BlendMode, Cubemap, GpuContext, GpuContextConfig, Material, Model, PbrMaterial, Renderer, Texture, TextureData,
};
use lumen_engine::scene::{
    Attenuation, CameraComponent, Entity, EntityId, LightComponent, RenderComponent, SceneSnapshot, Transform,
};
use lumen_engine::{LoggingConfig, init_logging};

const MOVE_SPEED: f32 = 4.0;
const LOOK_SPEED: f32 = 1.5;

// ============================================================================
// COMMAND LINE
// ============================================================================

#[derive(Debug, Default)]
struct Args {
    sky: Option<PathBuf>,
    settings: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = Args::default();
        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            if arg == "--settings" {
                args.settings = iter.next().map(PathBuf::from);
            } else {
                args.sky = Some(PathBuf::from(arg));
            }
        }
        args
    }
}

// ============================================================================
// DEMO SCENE
// ============================================================================

fn solid_color(rgb: Vec3) -> Material {
    Material::color("color", rgb.extend(1.0))
}

fn pbr(albedo: Vec3, metallic: f32, roughness: f32) -> Material {
    Material::pbr(
        "pbr",
        PbrMaterial {
            albedo_factor: albedo.extend(1.0),
            metallic_factor: metallic,
            roughness_factor: roughness,
            ..Default::default()
        },
    )
}

fn renderable(name: &str, transform: Transform, model: Model, material: Material) -> Entity {
    Entity::new(name)
        .with_transform(transform)
        .with_render(RenderComponent::new(model, material))
}

fn build_scene(aspect: f32) -> (SceneSnapshot, EntityId) {
    let mut scene = SceneSnapshot::new();

    scene.insert(renderable(
        "floor",
        Transform::default(),
        Model::plane(30.0),
        pbr(Vec3::splat(0.6), 0.0, 0.8),
    ));
    for (i, roughness) in [0.1, 0.35, 0.6, 0.9].iter().enumerate() {
        let x = i as f32 * 2.5 - 3.75;
        scene.insert(renderable(
            "pbr sphere",
            Transform::from_translation(Vec3::new(x, 1.0, -3.0)),
            Model::uv_sphere(0.8, 32, 16),
            pbr(Vec3::new(0.9, 0.6, 0.2), 1.0, *roughness),
        ));
    }
    scene.insert(renderable(
        "crate",
        Transform::from_trs(Vec3::new(-4.0, 0.75, 1.0), Quat::from_rotation_y(0.5), Vec3::ONE),
        Model::cube(1.5),
        solid_color(Vec3::new(0.3, 0.5, 0.8)),
    ));
    scene.insert(
        Entity::new("mirror ball")
            .with_transform(Transform::from_translation(Vec3::new(0.0, 1.2, 1.5)))
            .with_render(
                RenderComponent::new(Model::uv_sphere(1.0, 48, 24), pbr(Vec3::splat(0.95), 1.0, 0.05)).reflective(),
            ),
    );
    scene.insert(renderable(
        "glass",
        Transform::from_translation(Vec3::new(3.5, 1.0, 1.0)),
        Model::cube(1.2),
        Material::color("glass", Vec4::new(0.4, 0.8, 0.9, 0.35)).with_blend(BlendMode::Transparent),
    ));

    let sun = scene.insert(
        Entity::new("sun").with_light(LightComponent::directional(Vec3::new(-0.4, -1.0, -0.3), Vec3::splat(0.9))),
    );
    scene.set_directional_light(sun);
    for (position, color) in [
        (Vec3::new(-2.0, 2.0, 2.0), Vec3::new(1.0, 0.4, 0.3)),
        (Vec3::new(2.5, 1.5, -1.0), Vec3::new(0.3, 0.6, 1.0)),
    ] {
        scene.insert(
            Entity::new("point light")
                .with_transform(Transform::from_translation(position))
                .with_light(LightComponent::point(color * 3.0, Attenuation::default()).with_shadows(true)),
        );
    }
    scene.insert(
        Entity::new("spot light")
            .with_transform(Transform::from_translation(Vec3::new(0.0, 5.0, 4.0)))
            .with_light(LightComponent::spot(
                Vec3::new(0.0, -1.0, -0.6),
                Vec3::splat(4.0),
                0.25,
                0.4,
            )),
    );

    let camera = scene.insert(
        Entity::new("camera")
            .with_transform(Transform::from_translation(Vec3::new(0.0, 2.0, 8.0)))
            .with_camera(CameraComponent::new(60f32.to_radians(), aspect, 0.1, 200.0)),
    );
    scene.set_main_camera(camera);
    (scene, camera)
}

/// Vertical gradient used when no sky image is given.
fn procedural_sky() -> TextureData {
    let (width, height) = (64u32, 32u32);
    let zenith = Vec3::new(0.25, 0.45, 0.9);
    let horizon = Vec3::new(0.9, 0.85, 0.75);
    let ground = Vec3::new(0.2, 0.18, 0.15);
    let mut texels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        let v = y as f32 / (height - 1) as f32;
        let color = if v < 0.5 {
            horizon.lerp(zenith, 1.0 - v * 2.0)
        } else {
            horizon.lerp(ground, (v - 0.5) * 2.0)
        };
        for _ in 0..width {
            texels.extend_from_slice(&[color.x, color.y, color.z, 1.0]);
        }
    }
    TextureData::rgba32f("Procedural Sky", width, height, &texels)
}

fn load_sky(path: &Path) -> Option<TextureData> {
    match image::open(path) {
        Ok(image) => {
            let image = image.to_rgba32f();
            let (width, height) = image.dimensions();
            log::info!("[Viewer] loaded sky {} ({width}x{height})", path.display());
            Some(TextureData::rgba32f(path.display().to_string(), width, height, image.as_raw()))
        }
        Err(err) => {
            log::error!("[Viewer] failed to load sky {}: {err}", path.display());
            None
        }
    }
}

// ============================================================================
// APPLICATION
// ============================================================================

#[derive(Default)]
struct Movement {
    forward: bool,
    backward: bool,
    left: bool,
    right: bool,
    up: bool,
    down: bool,
    look_left: bool,
    look_right: bool,
    look_up: bool,
    look_down: bool,
}

struct Viewer {
    ctx: GpuContext,
    renderer: Renderer,
    scene: SceneSnapshot,
    camera: EntityId,
    skybox: Option<Cubemap>,
}

impl Viewer {
    fn new(window: Arc<Window>, args: &Args) -> lumen_engine::Result<Self> {
        let size = window.inner_size();
        let ctx = GpuContext::new(window, GpuContextConfig::default())?;
        let settings = match &args.settings {
            Some(path) => RenderSettings::from_json_file(path).unwrap_or_else(|err| {
                log::error!("[Viewer] {err}; using default settings");
                RenderSettings::default()
            }),
            None => RenderSettings::default(),
        };
        let shader_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders");
        let mut renderer = Renderer::new(&ctx, settings, shader_root);

        let aspect = size.width.max(1) as f32 / size.height.max(1) as f32;
        let (mut scene, camera) = build_scene(aspect);
        renderer.load_scene(&ctx, &mut scene);

        let sky = args.sky.as_deref().and_then(load_sky).unwrap_or_else(procedural_sky);
        let skybox = match Texture::from_data(&ctx.device, &ctx.queue, &sky) {
            Ok(equirect) => Some(renderer.convert_equi_to_cube(&ctx, equirect)),
            Err(err) => {
                log::error!("[Viewer] sky upload failed: {err}");
                None
            }
        };

        let mut viewer = Self {
            ctx,
            renderer,
            scene,
            camera,
            skybox,
        };
        viewer.bake();
        Ok(viewer)
    }

    fn bake(&mut self) {
        let started = Instant::now();
        self.renderer.render_environment_maps(
            &self.ctx,
            &self.scene.renderables(),
            &self.scene.lights(),
            self.scene.directional_light(),
            self.skybox.as_ref(),
        );
        let stats = self.renderer.environment().stats();
        log::info!(
            "[Viewer] environment baked in {:.1} ms ({} captures, {} cubemaps)",
            started.elapsed().as_secs_f64() * 1000.0,
            stats.captures,
            stats.cubemaps_allocated
        );
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.ctx.resize(size.width, size.height);
        self.renderer.resize(&self.ctx, size.width, size.height);
        if let Some(camera) = self.scene.get_mut(self.camera).and_then(Entity::camera_mut) {
            camera.set_aspect(size.width as f32 / size.height as f32);
        }
    }

    fn update(&mut self, movement: &Movement, dt: f32) {
        let Some(entity) = self.scene.get_mut(self.camera) else { return };
        let world = entity.world();
        let Some(camera) = entity.camera_mut() else { return };

        let axis = |positive: bool, negative: bool| positive as i32 as f32 - negative as i32 as f32;
        camera.set_yaw_pitch(
            camera.yaw() - axis(movement.look_right, movement.look_left) * LOOK_SPEED * dt,
            camera.pitch() - axis(movement.look_down, movement.look_up) * LOOK_SPEED * dt,
        );
        let forward = camera.forward(&world);
        let right = camera.right(&world);
        let step = (forward * axis(movement.forward, movement.backward)
            + right * axis(movement.right, movement.left)
            + Vec3::Y * axis(movement.up, movement.down))
            * MOVE_SPEED
            * dt;
        if step == Vec3::ZERO {
            return;
        }
        if let Some(transform) = entity.transform_mut() {
            let moved = glam::Mat4::from_translation(step) * transform.local();
            transform.set_local(moved);
            transform.set_world(moved);
        }
    }

    fn render(&mut self) -> bool {
        let frame = match self.ctx.acquire_frame() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.ctx.reconfigure();
                return true;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("[Viewer] surface out of memory");
                return false;
            }
            Err(err) => {
                log::warn!("[Viewer] dropped frame: {err}");
                return true;
            }
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let Some(camera) = self.scene.get(self.camera) else {
            log::error!("[Viewer] camera entity disappeared");
            return false;
        };
        self.renderer.render(
            &self.ctx,
            &view,
            &self.scene.renderables(),
            &self.scene.lights(),
            camera,
            self.scene.directional_light(),
            self.skybox.as_ref(),
        );
        frame.present();
        true
    }

    /// Mouse look, in pixels of cursor travel.
    fn look(&mut self, dx: f32, dy: f32) {
        if let Some(camera) = self.scene.get_mut(self.camera).and_then(|e| e.camera_mut()) {
            camera.rotate(dx, dy);
        }
    }

    fn toggle(&mut self, option: RenderOption) {
        let settings = self.renderer.settings_mut();
        settings.toggle(option);
        log::info!(
            "[Viewer] {option}: {}",
            if settings.is_enabled(option) { "on" } else { "off" }
        );
    }
}

struct ViewerApp {
    args: Args,
    window: Option<Arc<Window>>,
    viewer: Option<Viewer>,
    movement: Movement,
    /// Last cursor position while the right button is held
    drag: Option<(f64, f64)>,
    looking: bool,
    last_frame: Instant,
    last_report: Instant,
    frames: u32,
}

impl ViewerApp {
    fn new(args: Args) -> Self {
        Self {
            args,
            window: None,
            viewer: None,
            movement: Movement::default(),
            drag: None,
            looking: false,
            last_frame: Instant::now(),
            last_report: Instant::now(),
            frames: 0,
        }
    }

    fn handle_key(&mut self, key: KeyCode, pressed: bool) {
        let m = &mut self.movement;
        match key {
            KeyCode::KeyW => m.forward = pressed,
            KeyCode::KeyS => m.backward = pressed,
            KeyCode::KeyA => m.left = pressed,
            KeyCode::KeyD => m.right = pressed,
            KeyCode::KeyE => m.up = pressed,
            KeyCode::KeyQ => m.down = pressed,
            KeyCode::ArrowLeft => m.look_left = pressed,
            KeyCode::ArrowRight => m.look_right = pressed,
            KeyCode::ArrowUp => m.look_up = pressed,
            KeyCode::ArrowDown => m.look_down = pressed,
            _ => {}
        }
        if !pressed {
            return;
        }
        let Some(viewer) = self.viewer.as_mut() else { return };
        let digits = [
            KeyCode::Digit1,
            KeyCode::Digit2,
            KeyCode::Digit3,
            KeyCode::Digit4,
            KeyCode::Digit5,
            KeyCode::Digit6,
            KeyCode::Digit7,
            KeyCode::Digit8,
            KeyCode::Digit9,
        ];
        if let Some(index) = digits.iter().position(|d| *d == key) {
            viewer.toggle(RenderOption::ALL[index]);
            return;
        }
        match key {
            KeyCode::KeyB => viewer.bake(),
            KeyCode::KeyR => viewer.renderer.reload_shaders(),
            KeyCode::KeyP => match viewer.renderer.settings().to_json_string() {
                Ok(json) => println!("{json}"),
                Err(err) => log::error!("[Viewer] {err}"),
            },
            _ => {}
        }
    }

    fn report(&mut self, now: Instant) {
        self.frames += 1;
        let elapsed = now.duration_since(self.last_report).as_secs_f32();
        if elapsed < 1.0 {
            return;
        }
        if let Some(viewer) = &self.viewer {
            let stats = viewer.renderer.last_frame_stats();
            log::info!(
                "[Viewer] {:.0} fps, {} passes, {} draws",
                self.frames as f32 / elapsed,
                stats.passes.len(),
                stats.draw_calls
            );
            for timing in viewer.renderer.gpu_timings() {
                log::debug!("[Viewer]   {}: {:.3} ms", timing.pass, timing.milliseconds);
            }
        }
        self.frames = 0;
        self.last_report = now;
    }
}

// ============================================================================
// APPLICATION HANDLER
// ============================================================================

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = WindowAttributes::default()
            .with_title("Lumen Viewer")
            .with_inner_size(PhysicalSize::new(1280, 720));
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("[Viewer] failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };
        match Viewer::new(Arc::clone(&window), &self.args) {
            Ok(viewer) => self.viewer = Some(viewer),
            Err(err) => {
                log::error!("[Viewer] {err}");
                event_loop.exit();
                return;
            }
        }
        self.window = Some(window);
        self.last_frame = Instant::now();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if key == KeyCode::Escape && event.state == ElementState::Pressed {
                        event_loop.exit();
                        return;
                    }
                    self.handle_key(key, event.state == ElementState::Pressed);
                }
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => {
                self.looking = state == ElementState::Pressed;
                self.drag = None;
            }

            WindowEvent::CursorMoved { position, .. } => {
                if !self.looking {
                    return;
                }
                if let (Some((x, y)), Some(viewer)) = (self.drag, self.viewer.as_mut()) {
                    viewer.look((position.x - x) as f32, (position.y - y) as f32);
                }
                self.drag = Some((position.x, position.y));
            }

            WindowEvent::Resized(size) => {
                if let Some(viewer) = self.viewer.as_mut() {
                    viewer.resize(size);
                }
            }

            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = now.duration_since(self.last_frame).as_secs_f32();
                self.last_frame = now;
                if let Some(viewer) = self.viewer.as_mut() {
                    viewer.update(&self.movement, dt);
                    if !viewer.render() {
                        event_loop.exit();
                        return;
                    }
                }
                self.report(now);
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

// ============================================================================
// MAIN
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::default());

    println!("Lumen Viewer");
    println!("  WASD/QE: move, arrows or right drag: look");
    println!("  1-9: toggle render options, B: re-bake, R: reload shaders, P: print settings");
    println!("  ESC: exit");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut app = ViewerApp::new(Args::parse());
    event_loop.run_app(&mut app)?;
    Ok(())
}
