//! Deferred Lighting and Screen-Space Reflections
//!
//! Lighting resolves the G-buffer into HDR target A. Reflections ray-march
//! the lit image along reflected view rays and write target B, which then
//! becomes the scene color.

use super::{begin, color_attachment, draw_fullscreen, pipeline, FrameContext, FramePass, RenderContext};
use crate::render::frame_plan::{FramePlan, PassKind};
use crate::render::resources::texture::clamp_sampler;
use crate::render::resources::Texture;
use crate::render::shader_registry::{ProgramKey, ProgramKind};
use crate::render::targets::{gbuffer, FrameTargets, ShadowTargets};
use crate::scene::Entity;

fn texture_view(texture: &Texture) -> wgpu::BindingResource<'_> {
    wgpu::BindingResource::TextureView(&texture.view)
}

struct LightingGroups {
    with_ssao: wgpu::BindGroup,
    /// Binds a white occlusion texture for frames without SSAO
    without_ssao: wgpu::BindGroup,
}

pub struct LightingPass {
    no_occlusion: Texture,
    sampler: wgpu::Sampler,
    groups: Option<LightingGroups>,
}

impl LightingPass {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self {
            no_occlusion: Texture::placeholder(device, queue, [255; 4], "No Occlusion"),
            sampler: clamp_sampler(device, "Deferred Lighting"),
            groups: None,
        }
    }

    fn group(&self, ctx: &RenderContext, targets: &FrameTargets, occlusion: &Texture, label: &str) -> Option<wgpu::BindGroup> {
        let mut entries = Vec::with_capacity(6);
        for slot in [gbuffer::POSITION, gbuffer::NORMAL, gbuffer::ALBEDO, gbuffer::EMISSION] {
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: texture_view(targets.gbuffer.color(slot)?),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: 4,
            resource: texture_view(occlusion),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: 5,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });
        Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &ctx.layouts.lighting,
            entries: &entries,
        }))
    }
}

impl FramePass for LightingPass {
    fn name(&self) -> &'static str {
        "lighting"
    }

    fn kinds(&self) -> &'static [PassKind] {
        &[PassKind::Lighting]
    }

    fn programs(&self, _kind: PassKind, _plan: &FramePlan, _renderables: &[&Entity]) -> Vec<ProgramKey> {
        vec![ProgramKind::DeferredLighting.into()]
    }

    fn resize(&mut self, ctx: &RenderContext, targets: &FrameTargets, _shadows: &ShadowTargets) {
        let with_ssao = targets
            .ssao_blur
            .color(0)
            .and_then(|ssao| self.group(ctx, targets, ssao, "Deferred Lighting Bind Group"));
        let without_ssao = self.group(ctx, targets, &self.no_occlusion, "Deferred Lighting Bind Group (no SSAO)");
        self.groups = match (with_ssao, without_ssao) {
            (Some(with_ssao), Some(without_ssao)) => Some(LightingGroups { with_ssao, without_ssao }),
            _ => {
                log::error!("[LightingPass] G-buffer incomplete, lighting disabled until next resize");
                None
            }
        };
    }

    fn encode(&self, kind: PassKind, ctx: &RenderContext, frame: &mut FrameContext) {
        let Some(groups) = &self.groups else { return };
        let Some(output) = frame.targets.hdr[0].color(0) else { return };
        let Some(pipeline) = pipeline(ctx.registry, ProgramKind::DeferredLighting, frame.stats) else {
            return;
        };
        let group = if frame.plan.runs(PassKind::SsaoBlur) {
            &groups.with_ssao
        } else {
            &groups.without_ssao
        };
        let mut pass = begin(
            frame.encoder,
            frame.profiler,
            kind,
            "Deferred Lighting Pass",
            &[color_attachment(&output.view, Some(wgpu::Color::BLACK))],
            None,
        );
        frame.stats.draw_calls += draw_fullscreen(&mut pass, pipeline, &frame.scene, group);
        frame.scene_color = 0;
    }
}

pub struct ReflectionsPass {
    sampler: wgpu::Sampler,
    group: Option<wgpu::BindGroup>,
}

impl ReflectionsPass {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            sampler: clamp_sampler(device, "Reflections"),
            group: None,
        }
    }
}

impl FramePass for ReflectionsPass {
    fn name(&self) -> &'static str {
        "reflections"
    }

    fn kinds(&self) -> &'static [PassKind] {
        &[PassKind::Reflections]
    }

    fn programs(&self, _kind: PassKind, _plan: &FramePlan, _renderables: &[&Entity]) -> Vec<ProgramKey> {
        vec![ProgramKind::Reflections.into()]
    }

    fn resize(&mut self, ctx: &RenderContext, targets: &FrameTargets, _shadows: &ShadowTargets) {
        let inputs = (
            targets.gbuffer.color(gbuffer::POSITION),
            targets.gbuffer.color(gbuffer::NORMAL),
            targets.gbuffer.color(gbuffer::ALBEDO),
            targets.hdr[0].color(0),
        );
        let (Some(position), Some(normal), Some(albedo), Some(lit)) = inputs else {
            log::error!("[ReflectionsPass] targets incomplete, reflections disabled until next resize");
            self.group = None;
            return;
        };
        self.group = Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Reflections Bind Group"),
            layout: &ctx.layouts.reflections,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: texture_view(position) },
                wgpu::BindGroupEntry { binding: 1, resource: texture_view(normal) },
                wgpu::BindGroupEntry { binding: 2, resource: texture_view(albedo) },
                wgpu::BindGroupEntry { binding: 3, resource: texture_view(lit) },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        }));
    }

    fn encode(&self, kind: PassKind, ctx: &RenderContext, frame: &mut FrameContext) {
        let Some(group) = &self.group else { return };
        let Some(output) = frame.targets.hdr[1].color(0) else { return };
        let Some(pipeline) = pipeline(ctx.registry, ProgramKind::Reflections, frame.stats) else {
            return;
        };
        let mut pass = begin(
            frame.encoder,
            frame.profiler,
            kind,
            "Reflections Pass",
            &[color_attachment(&output.view, Some(wgpu::Color::BLACK))],
            None,
        );
        frame.stats.draw_calls += draw_fullscreen(&mut pass, pipeline, &frame.scene, group);
        frame.scene_color = 1;
    }
}
