//! Renderer
//!
//! Owns every GPU object that outlives a frame: bind group layouts, the
//! shader registry, camera/frame/light bindings, shadow and frame targets,
//! the pass list and the environment stage. The application owns the scene
//! and hands the renderer borrowed entity lists each frame.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut renderer = Renderer::new(&ctx, RenderSettings::default(), "shaders");
//! renderer.load_scene(&ctx, &mut scene);
//! renderer.render_environment_maps(&ctx, &renderables, &lights, sun, Some(&skybox));
//!
//! let frame = ctx.acquire_frame()?;
//! let view = frame.texture.create_view(&Default::default());
//! renderer.render(&ctx, &view, &renderables, &lights, camera, sun, Some(&skybox));
//! frame.present();
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use glam::Mat4;

use super::environment::{skybox_bind_group, BakeInput, EnvironmentContext, EnvironmentStage, IblFallback};
use super::frame_plan::{FramePlan, FrameStats};
use super::gpu_context::GpuContext;
use super::layouts::{BindGroupLayouts, CameraBindings, FrameBindings, LightBindings};
use super::passes::shadow::shadow_cameras;
use super::passes::{
    FrameContext, ForwardPass, GeometryPass, LightingPass, PassManager, PostPass, ReflectionsPass, RenderContext,
    SceneBindings, ShadowPass, SkyboxPass, SsaoPass, CAMERA_SLOTS, MAIN_CAMERA_SLOT,
};
use super::profiler::{GpuProfiler, PassTiming};
use super::resources::{Cubemap, FramebufferLimits, ResourceId, Texture};
use super::shader_registry::ShaderRegistry;
use super::targets::{FrameTargets, ShadowTargets};
use super::uniforms::{CameraUniforms, FrameUniforms};
use crate::config::{FrameSettings, RenderSettings};
use crate::error::RenderError;
use crate::scene::{CameraComponent, CapabilitySet, Entity, EntityId, SceneSnapshot};

const INITIAL_OBJECT_CAPACITY: usize = 256;

pub struct Renderer {
    settings: RenderSettings,
    /// Snapshot the last frame (or resize) ran with
    frame_settings: FrameSettings,
    layouts: BindGroupLayouts,
    registry: ShaderRegistry,
    camera: CameraBindings,
    frame: FrameBindings,
    lights: LightBindings,
    empty: wgpu::BindGroup,
    /// Lights group with the sky IBL (or fallback) maps
    lights_group: wgpu::BindGroup,
    /// Lights groups with each reflective object's own maps
    reflective_lights: HashMap<EntityId, wgpu::BindGroup>,
    shadows: ShadowTargets,
    targets: FrameTargets,
    limits: FramebufferLimits,
    passes: PassManager,
    environment: EnvironmentStage,
    fallback: IblFallback,
    skybox: Option<(ResourceId, wgpu::BindGroup)>,
    profiler: GpuProfiler,
    prev_view_proj: Option<Mat4>,
    frame_index: u64,
    started: Instant,
    last_time: f32,
    stats: FrameStats,
}

impl Renderer {
    pub fn new(ctx: &GpuContext, mut settings: RenderSettings, shader_root: impl Into<PathBuf>) -> Self {
        let device = &ctx.device;
        let queue = &ctx.queue;
        let frame_settings = settings.apply();
        let (width, height) = ctx.dimensions();

        let layouts = BindGroupLayouts::new(device);
        let registry = ShaderRegistry::new(shader_root, ctx.format());
        let camera = CameraBindings::new(device, &layouts, "Main", CAMERA_SLOTS, INITIAL_OBJECT_CAPACITY);
        let frame = FrameBindings::new(
            device,
            &layouts,
            &FrameUniforms::new(&frame_settings, width, height, 0.0, 0.0, 0),
        );
        let lights = LightBindings::new(device);
        let empty = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Empty Bind Group"),
            layout: &layouts.empty,
            entries: &[],
        });
        let shadows = ShadowTargets::new(device, frame_settings.tunables.shadow.map_size);
        let limits = FramebufferLimits::from_device(&device.limits());
        let targets = FrameTargets::new(device, width, height, &limits);
        let fallback = IblFallback::new(device, queue);
        let lights_group = lights.bind_group(
            device,
            &layouts,
            "Lights Bind Group",
            &shadows.light_views(
                &fallback.irradiance.cube_view,
                &fallback.prefilter.cube_view,
                &fallback.brdf_lut.view,
            ),
        );
        let environment = EnvironmentStage::new(device, queue, &layouts, &frame_settings);

        let mut passes = PassManager::new();
        passes.add_pass(Box::new(ShadowPass));
        passes.add_pass(Box::new(GeometryPass));
        passes.add_pass(Box::new(SsaoPass::new(device, queue)));
        passes.add_pass(Box::new(LightingPass::new(device, queue)));
        passes.add_pass(Box::new(ReflectionsPass::new(device)));
        passes.add_pass(Box::new(ForwardPass));
        passes.add_pass(Box::new(SkyboxPass));
        passes.add_pass(Box::new(PostPass::new(device)));
        passes.resize(
            &RenderContext {
                device,
                queue,
                layouts: &layouts,
                registry: &registry,
                settings: &frame_settings,
            },
            &targets,
            &shadows,
        );
        log::info!(
            "[Renderer] {}x{}, passes: {}",
            width,
            height,
            passes.list_passes().join(", ")
        );

        Self {
            settings,
            frame_settings,
            layouts,
            registry,
            camera,
            frame,
            lights,
            empty,
            lights_group,
            reflective_lights: HashMap::new(),
            shadows,
            targets,
            limits,
            passes,
            environment,
            fallback,
            skybox: None,
            profiler: GpuProfiler::new(device, queue, ctx.timestamps_supported()),
            prev_view_proj: None,
            frame_index: 0,
            started: Instant::now(),
            last_time: 0.0,
            stats: FrameStats::default(),
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Live settings. Edits take effect at the start of the next frame.
    pub fn settings_mut(&mut self) -> &mut RenderSettings {
        &mut self.settings
    }

    pub fn last_frame_stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Most recent per-pass GPU timings. Empty without timestamp support.
    pub fn gpu_timings(&self) -> &[PassTiming] {
        self.profiler.timings()
    }

    pub fn environment(&self) -> &EnvironmentStage {
        &self.environment
    }

    pub fn registry(&self) -> &ShaderRegistry {
        &self.registry
    }

    pub fn targets(&self) -> &FrameTargets {
        &self.targets
    }

    /// Drop compiled programs so edited shader files are picked up.
    pub fn reload_shaders(&mut self) {
        self.registry.reload();
    }

    /// Upload every model and material in `scene` and forget state baked
    /// for the previous scene.
    pub fn load_scene(&mut self, ctx: &GpuContext, scene: &mut SceneSnapshot) {
        let mut uploaded = 0;
        for entity in scene.entities_mut() {
            let Some(render) = entity.render_mut() else { continue };
            if let Some(model) = render.model.as_mut() {
                model.upload(&ctx.device);
            }
            if let Some(material) = render.material.as_mut() {
                material.upload(&ctx.device, &ctx.queue, &self.layouts);
            }
            uploaded += 1;
        }
        self.environment.invalidate();
        self.skybox = None;
        self.prev_view_proj = None;
        self.rebuild_light_groups(&ctx.device);
        log::info!("[Renderer] loaded scene: {} renderables uploaded", uploaded);
    }

    /// Project an equirectangular image onto a skybox cubemap.
    pub fn convert_equi_to_cube(&mut self, ctx: &GpuContext, equirect: Texture) -> Cubemap {
        let size = self.settings.tunables.environment.skybox_size;
        self.environment
            .convert_equi_to_cube(&ctx.device, &ctx.queue, &self.layouts, &mut self.registry, equirect, size)
    }

    /// Bake image-based lighting for the reflective renderables. Call once
    /// after `load_scene`; the maps stay valid until the next load.
    pub fn render_environment_maps(
        &mut self,
        ctx: &GpuContext,
        renderables: &[&Entity],
        lights: &[&Entity],
        directional: Option<&Entity>,
        skybox: Option<&Cubemap>,
    ) {
        let settings = self.settings.apply();
        self.environment.bake(
            EnvironmentContext {
                device: &ctx.device,
                queue: &ctx.queue,
                layouts: &self.layouts,
                registry: &mut self.registry,
                lights: &self.lights,
                shadows: &self.shadows,
                fallback: &self.fallback,
                settings: &settings,
            },
            &BakeInput {
                renderables,
                lights,
                directional,
                skybox,
            },
        );
        self.rebuild_light_groups(&ctx.device);
    }

    /// Reallocate the frame targets at the new size.
    pub fn resize(&mut self, ctx: &GpuContext, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if self.targets.size() == (width, height) {
            return;
        }
        log::info!("[Renderer] resizing frame targets to {width}x{height}");
        self.targets = FrameTargets::new(&ctx.device, width, height, &self.limits);
        self.rebuild_pass_groups(ctx);
    }

    fn rebuild_pass_groups(&mut self, ctx: &GpuContext) {
        self.passes.resize(
            &RenderContext {
                device: &ctx.device,
                queue: &ctx.queue,
                layouts: &self.layouts,
                registry: &self.registry,
                settings: &self.frame_settings,
            },
            &self.targets,
            &self.shadows,
        );
    }

    /// Rebuild group 2 for the main view and for each reflective object that
    /// has baked maps.
    fn rebuild_light_groups(&mut self, device: &wgpu::Device) {
        let fallback = &self.fallback;
        let brdf_lut = self.environment.brdf_lut().map_or(&fallback.brdf_lut.view, |lut| &lut.view);
        let (irradiance, prefilter) = match self.environment.sky() {
            Some(sky) => (&sky.irradiance.cube_view, &sky.prefilter.cube_view),
            None => (&fallback.irradiance.cube_view, &fallback.prefilter.cube_view),
        };
        self.lights_group = self.lights.bind_group(
            device,
            &self.layouts,
            "Lights Bind Group",
            &self.shadows.light_views(irradiance, prefilter, brdf_lut),
        );

        self.reflective_lights.clear();
        for (&entity, maps) in self.environment.maps() {
            let group = self.lights.bind_group(
                device,
                &self.layouts,
                "Reflective Lights Bind Group",
                &self
                    .shadows
                    .light_views(&maps.irradiance.cube_view, &maps.prefilter.cube_view, brdf_lut),
            );
            self.reflective_lights.insert(entity, group);
        }
    }

    fn skybox_group(&mut self, device: &wgpu::Device, skybox: Option<&Cubemap>) -> bool {
        let Some(cube) = skybox else { return false };
        if self.skybox.as_ref().is_none_or(|(id, _)| *id != cube.id()) {
            self.skybox = Some((cube.id(), skybox_bind_group(device, &self.layouts, cube)));
        }
        true
    }

    /// Render one frame of `renderables` as seen from `main_camera` into
    /// `output`.
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &mut self,
        ctx: &GpuContext,
        output: &wgpu::TextureView,
        renderables: &[&Entity],
        lights: &[&Entity],
        main_camera: &Entity,
        directional: Option<&Entity>,
        skybox: Option<&Cubemap>,
    ) {
        let camera = match viewing_camera(main_camera) {
            Ok(camera) => camera,
            Err(err) => {
                log::error!("[Renderer] frame aborted: {err}");
                return;
            }
        };
        let settings = self.settings.apply();
        self.frame_settings = settings.clone();

        let (width, height) = ctx.dimensions();
        if self.targets.size() != (width.max(1), height.max(1)) {
            self.resize(ctx, width, height);
        }
        let map_size = settings.tunables.shadow.map_size;
        if self.shadows.size() != map_size {
            log::info!("[Renderer] shadow map size changed to {map_size}");
            self.shadows = ShadowTargets::new(&ctx.device, map_size);
            self.rebuild_light_groups(&ctx.device);
            self.rebuild_pass_groups(ctx);
        }

        let world = main_camera.world();
        let eye = main_camera.world_position();
        let view = camera.view_matrix(&world);
        let proj = camera.projection();
        let view_proj = proj * view;
        let prev_view_proj = self.prev_view_proj.unwrap_or(view_proj);

        let plan = FramePlan::build(&settings, eye, renderables, lights, directional, skybox.is_some());
        let mut stats = FrameStats::from_plan(self.frame_index, &plan);

        let queue = &ctx.queue;
        self.camera.write_slot(
            queue,
            MAIN_CAMERA_SLOT,
            &CameraUniforms::new(view, proj, prev_view_proj, eye, camera.near, camera.far),
        );
        for (slot, uniforms) in shadow_cameras(&plan, &settings) {
            self.camera.write_slot(queue, slot, &uniforms);
        }
        self.camera
            .write_objects(&ctx.device, queue, &self.layouts, &plan.object_data(renderables));

        let time = self.started.elapsed().as_secs_f32();
        let delta = time - self.last_time;
        self.last_time = time;
        self.frame.uniforms.write(
            queue,
            &FrameUniforms::new(&settings, width, height, time, delta, self.frame_index),
        );

        let mut light_header = plan.lights.uniforms;
        light_header.flags[2] = self.environment.sky().is_some() as u32;
        self.lights.lights.write(queue, &plan.lights.records);
        self.lights.header.write(queue, &light_header);

        for key in self.passes.required_programs(&plan, renderables) {
            self.registry.ensure(&ctx.device, &self.layouts, key);
        }
        let has_skybox = self.skybox_group(&ctx.device, skybox);

        self.profiler.begin_frame();
        let mut encoder = ctx.create_encoder("Frame Encoder");
        {
            let render_ctx = RenderContext {
                device: &ctx.device,
                queue,
                layouts: &self.layouts,
                registry: &self.registry,
                settings: &settings,
            };
            let mut frame = FrameContext {
                encoder: &mut encoder,
                plan: &plan,
                renderables,
                scene: SceneBindings {
                    camera: &self.camera,
                    frame: &self.frame.bind_group,
                    lights: &self.lights_group,
                    reflective_lights: &self.reflective_lights,
                    empty: &self.empty,
                },
                targets: &self.targets,
                shadows: &self.shadows,
                skybox: if has_skybox { self.skybox.as_ref().map(|(_, group)| group) } else { None },
                output,
                profiler: &mut self.profiler,
                stats: &mut stats,
                scene_color: 0,
                display: 0,
            };
            self.passes.run(&render_ctx, &mut frame);
        }
        self.profiler.resolve(&mut encoder);
        ctx.submit(encoder);
        self.profiler.after_submit();
        self.profiler.poll(&ctx.device);

        if stats.skipped_draws > 0 {
            log::debug!("[Renderer] frame {}: {} draws skipped", self.frame_index, stats.skipped_draws);
        }
        self.prev_view_proj = Some(view_proj);
        self.frame_index += 1;
        self.stats = stats;
    }
}

/// The camera component of an entity that can view the scene. Placement
/// comes from its transform, so both must be attached.
fn viewing_camera(entity: &Entity) -> Result<&CameraComponent, RenderError> {
    let missing = |missing| RenderError::MissingComponent { entity: entity.id(), missing };
    if !entity.capabilities().contains(CapabilitySet::CAMERA) {
        return Err(missing(if entity.transform().is_none() { "transform" } else { "camera" }));
    }
    entity.camera().ok_or_else(|| missing("camera"))
}
