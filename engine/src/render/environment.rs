//! Environment Precompute
//!
//! Image-based lighting baked once per scene load:
//!
//! - a BRDF integration lookup texture, shared by every reflective surface
//! - the skybox convolved into a sky irradiance and prefiltered map, which
//!   deferred PBR samples for non-reflective surfaces
//! - for each reflective renderable, a cube capture of its surroundings
//!   (itself left out of the renderable list) convolved the same way
//!
//! A scene without reflective renderables bakes nothing at all.
//!
//! # Usage
//!
//! ```rust,ignore
//! let skybox = renderer.convert_equi_to_cube(&ctx, equirect_texture);
//! renderer.render_environment_maps(&ctx, &renderables, &lights, sun, Some(&skybox));
//! ```

use std::collections::HashMap;

use glam::Vec3;

use super::cube_capture::cube_face_matrices;
use super::frame_plan::FramePlan;
use super::layouts::{BindGroupLayouts, CameraBindings, FrameBindings, LightBindings};
use super::material::MaterialPass;
use super::passes::skybox::{draw_skybox, SKYBOX_VERTICES};
use super::passes::{color_attachment, depth_attachment, draw_items, material_programs, SceneBindings};
use super::resources::texture::nearest_sampler;
use super::resources::{Cubemap, Renderbuffer, Texture, UniformBuffer};
use super::shader_registry::{ProgramKey, ProgramKind, ShaderRegistry};
use super::targets::{ShadowTargets, BRDF_LUT_FORMAT, DEPTH_FORMAT, HDR_FORMAT};
use super::uniforms::{CameraUniforms, EnvParams, FrameUniforms};
use crate::config::{FrameSettings, RenderOption};
use crate::scene::{Entity, EntityId};

const IRRADIANCE_SAMPLE_DELTA: u32 = 40;
const PREFILTER_SAMPLES: u32 = 512;

/// Diffuse and specular IBL maps of one reflective surface.
#[derive(Debug)]
pub struct IblMaps {
    /// Raw capture of the surroundings
    pub environment: Cubemap,
    pub irradiance: Cubemap,
    /// Mip `i` is prefiltered for roughness `i / (mips - 1)`
    pub prefilter: Cubemap,
}

/// The skybox convolved for deferred PBR.
#[derive(Debug)]
pub struct SkyIbl {
    pub irradiance: Cubemap,
    pub prefilter: Cubemap,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceStats {
    /// Cube render targets created by this stage, conversions included
    pub cubemaps_allocated: u32,
    pub captures: u32,
    pub brdf_luts: u32,
}

/// 1x1 stand-ins bound in group 2 until real IBL maps exist.
pub struct IblFallback {
    pub irradiance: Cubemap,
    pub prefilter: Cubemap,
    pub brdf_lut: Texture,
}

impl IblFallback {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self {
            irradiance: Cubemap::new(device, "Fallback Irradiance", 1, HDR_FORMAT, 1),
            prefilter: Cubemap::new(device, "Fallback Prefilter", 1, HDR_FORMAT, 1),
            brdf_lut: Texture::placeholder(device, queue, [0, 0, 0, 255], "Fallback BRDF LUT"),
        }
    }
}

/// Renderer-owned state the stage borrows while baking.
pub struct EnvironmentContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub layouts: &'a BindGroupLayouts,
    pub registry: &'a mut ShaderRegistry,
    pub lights: &'a LightBindings,
    pub shadows: &'a ShadowTargets,
    pub fallback: &'a IblFallback,
    pub settings: &'a FrameSettings,
}

/// Scene input of one bake.
pub struct BakeInput<'a> {
    pub renderables: &'a [&'a Entity],
    pub lights: &'a [&'a Entity],
    pub directional: Option<&'a Entity>,
    pub skybox: Option<&'a Cubemap>,
}

pub struct EnvironmentStage {
    /// Six faces around the origin, for conversions and convolutions
    origin_camera: CameraBindings,
    /// Six faces around the reflective object being captured
    capture_camera: CameraBindings,
    frame: FrameBindings,
    empty: wgpu::BindGroup,
    convert_params: UniformBuffer<EnvParams>,
    irradiance_params: UniformBuffer<EnvParams>,
    prefilter_params: Vec<UniformBuffer<EnvParams>>,
    equirect_sampler: wgpu::Sampler,
    brdf_lut: Option<Texture>,
    sky: Option<SkyIbl>,
    maps: HashMap<EntityId, IblMaps>,
    stats: ResourceStats,
}

impl EnvironmentStage {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, layouts: &BindGroupLayouts, settings: &FrameSettings) -> Self {
        let origin_camera = CameraBindings::new(device, layouts, "Environment Origin", 6, 1);
        let env = &settings.tunables.environment;
        for (face, (view, view_proj)) in cube_face_matrices(Vec3::ZERO, env.capture_near, env.capture_far)
            .into_iter()
            .enumerate()
        {
            let proj = view_proj * view.inverse();
            origin_camera.write_slot(
                queue,
                face as u32,
                &CameraUniforms::new(view, proj, view_proj, Vec3::ZERO, env.capture_near, env.capture_far),
            );
        }
        let capture_size = env.capture_size;
        Self {
            origin_camera,
            capture_camera: CameraBindings::new(device, layouts, "Environment Capture", 6, 64),
            frame: FrameBindings::new(
                device,
                layouts,
                &FrameUniforms::new(settings, capture_size, capture_size, 0.0, 0.0, 0),
            ),
            empty: device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Environment Empty Bind Group"),
                layout: &layouts.empty,
                entries: &[],
            }),
            convert_params: UniformBuffer::new(device, "Equirect Params", &EnvParams::default()),
            irradiance_params: UniformBuffer::new(device, "Irradiance Params", &EnvParams::default()),
            prefilter_params: Vec::new(),
            equirect_sampler: nearest_sampler(device, "Equirect"),
            brdf_lut: None,
            sky: None,
            maps: HashMap::new(),
            stats: ResourceStats::default(),
        }
    }

    pub fn maps(&self) -> &HashMap<EntityId, IblMaps> {
        &self.maps
    }

    pub fn get(&self, entity: EntityId) -> Option<&IblMaps> {
        self.maps.get(&entity)
    }

    pub fn sky(&self) -> Option<&SkyIbl> {
        self.sky.as_ref()
    }

    pub fn brdf_lut(&self) -> Option<&Texture> {
        self.brdf_lut.as_ref()
    }

    pub fn stats(&self) -> ResourceStats {
        self.stats
    }

    /// Drop every baked map. Reflective surfaces render with fallback IBL
    /// until the next bake.
    pub fn invalidate(&mut self) {
        if !self.maps.is_empty() || self.sky.is_some() {
            log::info!("[Environment] invalidating {} IBL map sets", self.maps.len());
        }
        self.maps.clear();
        self.sky = None;
    }

    fn allocate_cube(&mut self, device: &wgpu::Device, label: &str, size: u32, mips: u32) -> Cubemap {
        self.stats.cubemaps_allocated += 1;
        Cubemap::new(device, label, size, HDR_FORMAT, mips)
    }

    /// Bake IBL maps for every reflective renderable in `input`.
    pub fn bake(&mut self, ctx: EnvironmentContext, input: &BakeInput) {
        let reflective: Vec<&Entity> = input
            .renderables
            .iter()
            .copied()
            .filter(|e| e.is_reflective() && e.render().is_some_and(|r| r.is_complete()))
            .collect();
        self.invalidate();
        if reflective.is_empty() {
            log::debug!("[Environment] no reflective renderables, nothing to bake");
            return;
        }
        log::info!("[Environment] baking {} reflective renderables", reflective.len());

        let EnvironmentContext {
            device,
            queue,
            layouts,
            registry,
            lights,
            shadows,
            fallback,
            settings,
        } = ctx;
        let env = settings.tunables.environment.clone();
        let capture_settings = settings
            .with(RenderOption::Deferred, false)
            .with(RenderOption::Shadows, false);
        self.frame.uniforms.write(
            queue,
            &FrameUniforms::new(&capture_settings, env.capture_size, env.capture_size, 0.0, 0.0, 0),
        );

        for kind in [ProgramKind::BrdfLut, ProgramKind::Irradiance, ProgramKind::Prefilter, ProgramKind::Skybox] {
            registry.ensure(device, layouts, kind);
        }
        self.write_convolution_params(device, queue, &env);

        if self.brdf_lut.is_none() {
            self.brdf_lut = self.render_brdf_lut(device, queue, registry, env.brdf_lut_size);
        }

        if let Some(skybox) = input.skybox {
            let irradiance = self.allocate_cube(device, "Sky Irradiance", env.irradiance_size, 1);
            let prefilter = self.allocate_cube(device, "Sky Prefilter", env.prefilter_size, env.prefilter_mips);
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Sky IBL Encoder"),
            });
            self.convolve(device, layouts, registry, &mut encoder, skybox, &irradiance, &prefilter);
            queue.submit(std::iter::once(encoder.finish()));
            self.sky = Some(SkyIbl { irradiance, prefilter });
        }

        let skybox_group = input.skybox.map(|cube| skybox_bind_group(device, layouts, cube));
        let depth = Renderbuffer::depth(device, "Capture Depth", env.capture_size, env.capture_size, DEPTH_FORMAT);

        for target in reflective {
            let others: Vec<&Entity> = input
                .renderables
                .iter()
                .copied()
                .filter(|e| e.id() != target.id())
                .collect();
            let eye = target.world_position();
            let plan = FramePlan::build(&capture_settings, eye, &others, input.lights, input.directional, input.skybox.is_some());

            let mut keys: Vec<ProgramKey> = material_programs(&plan.forward, &others, MaterialPass::Forward);
            keys.extend(material_programs(&plan.blend, &others, MaterialPass::Forward));
            for key in keys {
                registry.ensure(device, layouts, key);
            }

            let mut uniforms = plan.lights.uniforms;
            uniforms.flags[2] = self.sky.is_some() as u32;
            lights.lights.write(queue, &plan.lights.records);
            lights.header.write(queue, &uniforms);
            self.capture_camera.write_objects(device, queue, layouts, &plan.object_data(&others));
            for (face, (view, view_proj)) in cube_face_matrices(eye, env.capture_near, env.capture_far)
                .into_iter()
                .enumerate()
            {
                let proj = view_proj * view.inverse();
                self.capture_camera.write_slot(
                    queue,
                    face as u32,
                    &CameraUniforms::new(view, proj, view_proj, eye, env.capture_near, env.capture_far),
                );
            }

            let environment = self.allocate_cube(device, &format!("{} Environment", target.name), env.capture_size, 1);
            let (irradiance_view, prefilter_view) = match &self.sky {
                Some(sky) => (&sky.irradiance.cube_view, &sky.prefilter.cube_view),
                None => (&fallback.irradiance.cube_view, &fallback.prefilter.cube_view),
            };
            let brdf_view = self.brdf_lut.as_ref().map_or(&fallback.brdf_lut.view, |t| &t.view);
            let capture_lights = lights.bind_group(
                device,
                layouts,
                "Capture Lights Bind Group",
                &shadows.light_views(irradiance_view, prefilter_view, brdf_view),
            );
            let no_reflective_lights = HashMap::new();
            let scene = SceneBindings {
                camera: &self.capture_camera,
                frame: &self.frame.bind_group,
                lights: &capture_lights,
                reflective_lights: &no_reflective_lights,
                empty: &self.empty,
            };

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Environment Capture Encoder"),
            });
            let skybox_pipeline = registry.get(ProgramKind::Skybox);
            for face in 0..6 {
                let Some(face_view) = environment.face_view(face, 0) else { continue };
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Environment Capture Pass"),
                    color_attachments: &[color_attachment(face_view, Some(wgpu::Color::BLACK))],
                    depth_stencil_attachment: depth_attachment(&depth.view, true),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                let slot = face as u32;
                draw_items(&mut pass, registry, &scene, &others, &plan.forward, MaterialPass::Forward, slot);
                if let (Some(pipeline), Some(group)) = (skybox_pipeline, &skybox_group) {
                    draw_skybox(&mut pass, pipeline, &scene, slot, group);
                }
                draw_items(&mut pass, registry, &scene, &others, &plan.blend, MaterialPass::Forward, slot);
            }

            let irradiance = self.allocate_cube(device, &format!("{} Irradiance", target.name), env.irradiance_size, 1);
            let prefilter = self.allocate_cube(
                device,
                &format!("{} Prefilter", target.name),
                env.prefilter_size,
                env.prefilter_mips,
            );
            self.convolve(device, layouts, registry, &mut encoder, &environment, &irradiance, &prefilter);
            queue.submit(std::iter::once(encoder.finish()));

            self.stats.captures += 1;
            self.maps.insert(
                target.id(),
                IblMaps {
                    environment,
                    irradiance,
                    prefilter,
                },
            );
        }
        log::info!(
            "[Environment] baked {} map sets, {} cube targets so far",
            self.maps.len(),
            self.stats.cubemaps_allocated
        );
    }

    fn write_convolution_params(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, env: &crate::config::EnvironmentTunables) {
        self.irradiance_params.write(
            queue,
            &EnvParams {
                roughness: 0.0,
                source_size: env.capture_size as f32,
                sample_count: IRRADIANCE_SAMPLE_DELTA,
                _pad: 0,
            },
        );
        let mips = env.prefilter_mips.max(1);
        while self.prefilter_params.len() < mips as usize {
            let label = format!("Prefilter Params {}", self.prefilter_params.len());
            self.prefilter_params.push(UniformBuffer::new(device, &label, &EnvParams::default()));
        }
        for (mip, params) in self.prefilter_params.iter().enumerate().take(mips as usize) {
            let roughness = if mips > 1 { mip as f32 / (mips - 1) as f32 } else { 0.0 };
            params.write(
                queue,
                &EnvParams {
                    roughness,
                    source_size: env.capture_size as f32,
                    sample_count: PREFILTER_SAMPLES,
                    _pad: 0,
                },
            );
        }
    }

    fn render_brdf_lut(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        registry: &ShaderRegistry,
        size: u32,
    ) -> Option<Texture> {
        let Some(pipeline) = registry.get(ProgramKind::BrdfLut) else {
            log::error!("[Environment] BRDF LUT program unavailable, PBR specular will be wrong");
            return None;
        };
        let lut = Texture::render_target(device, "BRDF LUT", size, size, BRDF_LUT_FORMAT);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("BRDF LUT Encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("BRDF LUT Pass"),
                color_attachments: &[color_attachment(&lut.view, Some(wgpu::Color::BLACK))],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.draw(0..3, 0..1);
        }
        queue.submit(std::iter::once(encoder.finish()));
        self.stats.brdf_luts += 1;
        log::debug!("[Environment] BRDF LUT {size}x{size}");
        Some(lut)
    }

    /// Render `program` into every face of `target` mip `mip`, sampling
    /// `group` as the cube or equirect source.
    fn render_faces(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        group: &wgpu::BindGroup,
        target: &Cubemap,
        mip: u32,
        label: &str,
    ) {
        for face in 0..6 {
            let Some(view) = target.face_view(face, mip) else { continue };
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[color_attachment(view, Some(wgpu::Color::BLACK))],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            self.origin_camera.bind(&mut pass, face as u32);
            pass.set_bind_group(1, &self.frame.bind_group, &[]);
            pass.set_bind_group(2, &self.empty, &[]);
            pass.set_bind_group(3, group, &[]);
            pass.draw(0..SKYBOX_VERTICES, 0..1);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn convolve(
        &self,
        device: &wgpu::Device,
        layouts: &BindGroupLayouts,
        registry: &ShaderRegistry,
        encoder: &mut wgpu::CommandEncoder,
        source: &Cubemap,
        irradiance: &Cubemap,
        prefilter: &Cubemap,
    ) {
        let cube_group = |params: &UniformBuffer<EnvParams>, label: &str| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &layouts.env_cube,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params.binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&source.cube_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&source.sampler),
                    },
                ],
            })
        };

        match registry.get(ProgramKind::Irradiance) {
            Some(pipeline) => {
                let group = cube_group(&self.irradiance_params, "Irradiance Bind Group");
                self.render_faces(encoder, pipeline, &group, irradiance, 0, "Irradiance Pass");
            }
            None => log::error!("[Environment] irradiance program unavailable"),
        }
        match registry.get(ProgramKind::Prefilter) {
            Some(pipeline) => {
                for mip in 0..prefilter.mip_levels() {
                    let Some(params) = self.prefilter_params.get(mip as usize) else { break };
                    let group = cube_group(params, "Prefilter Bind Group");
                    self.render_faces(encoder, pipeline, &group, prefilter, mip, "Prefilter Pass");
                }
            }
            None => log::error!("[Environment] prefilter program unavailable"),
        }
    }

    /// Project an equirectangular texture onto a new cubemap of `size`. The
    /// source texture is consumed and released once the GPU work is queued.
    pub fn convert_equi_to_cube(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &BindGroupLayouts,
        registry: &mut ShaderRegistry,
        equirect: Texture,
        size: u32,
    ) -> Cubemap {
        registry.ensure(device, layouts, ProgramKind::EquirectToCube);
        let cube = self.allocate_cube(device, "Skybox", size, 1);
        let Some(pipeline) = registry.get(ProgramKind::EquirectToCube) else {
            log::error!("[Environment] equirect conversion unavailable, skybox stays black");
            return cube;
        };

        self.convert_params.write(
            queue,
            &EnvParams {
                roughness: 0.0,
                source_size: equirect.width() as f32,
                sample_count: 0,
                _pad: 0,
            },
        );
        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Equirect Bind Group"),
            layout: &layouts.env_equirect,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.convert_params.binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&equirect.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.equirect_sampler),
                },
            ],
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Equirect To Cube Encoder"),
        });
        self.render_faces(&mut encoder, pipeline, &group, &cube, 0, "Equirect To Cube Pass");
        queue.submit(std::iter::once(encoder.finish()));
        log::info!(
            "[Environment] converted {}x{} equirect to {size}x{size} cubemap",
            equirect.width(),
            equirect.height()
        );
        drop(equirect);
        cube
    }
}

/// Group 3 of the skybox program over `cube`.
pub fn skybox_bind_group(device: &wgpu::Device, layouts: &BindGroupLayouts, cube: &Cubemap) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Skybox Bind Group"),
        layout: &layouts.skybox,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&cube.cube_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&cube.sampler),
            },
        ],
    })
}
