//! SSAO Pass
//!
//! Hemisphere occlusion sampled from G-buffer positions and normals, then a
//! 4x4 box blur that hides the tiled rotation noise.

use super::{begin, color_attachment, draw_fullscreen, pipeline, FrameContext, FramePass, RenderContext};
use crate::render::frame_plan::{FramePlan, PassKind};
use crate::render::resources::texture::repeat_sampler;
use crate::render::resources::{Texture, TextureData, UniformBuffer};
use crate::render::shader_registry::{ProgramKey, ProgramKind};
use crate::render::targets::{gbuffer, FrameTargets, ShadowTargets};
use crate::render::uniforms::{ssao_noise_pixels, PassParams, SsaoKernel, SSAO_NOISE_SIZE};
use crate::scene::Entity;

const KERNEL_SEED: u64 = 0x55a0;
const NOISE_SEED: u64 = 0x0a55;

fn view(texture: &Texture) -> wgpu::BindingResource<'_> {
    wgpu::BindingResource::TextureView(&texture.view)
}

struct SsaoGroups {
    ssao: wgpu::BindGroup,
    blur: wgpu::BindGroup,
}

pub struct SsaoPass {
    kernel: UniformBuffer<SsaoKernel>,
    noise: Texture,
    blur_params: UniformBuffer<PassParams>,
    sampler: wgpu::Sampler,
    groups: Option<SsaoGroups>,
}

impl SsaoPass {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let noise = TextureData::rgba8("SSAO Noise", SSAO_NOISE_SIZE, SSAO_NOISE_SIZE, ssao_noise_pixels(NOISE_SEED));
        Self {
            kernel: UniformBuffer::new(device, "SSAO Kernel", &SsaoKernel::generate(KERNEL_SEED)),
            noise: Texture::from_data_or_placeholder(device, queue, &noise, [128, 128, 0, 255]),
            blur_params: UniformBuffer::new(device, "SSAO Blur Params", &PassParams::default()),
            sampler: repeat_sampler(device, "SSAO"),
            groups: None,
        }
    }
}

impl FramePass for SsaoPass {
    fn name(&self) -> &'static str {
        "ssao"
    }

    fn kinds(&self) -> &'static [PassKind] {
        &[PassKind::Ssao, PassKind::SsaoBlur]
    }

    fn programs(&self, kind: PassKind, _plan: &FramePlan, _renderables: &[&Entity]) -> Vec<ProgramKey> {
        match kind {
            PassKind::Ssao => vec![ProgramKind::Ssao.into()],
            _ => vec![ProgramKind::SsaoBlur.into()],
        }
    }

    fn resize(&mut self, ctx: &RenderContext, targets: &FrameTargets, _shadows: &ShadowTargets) {
        let (Some(position), Some(normal), Some(ssao)) = (
            targets.gbuffer.color(gbuffer::POSITION),
            targets.gbuffer.color(gbuffer::NORMAL),
            targets.ssao.color(0),
        ) else {
            log::error!("[SsaoPass] targets incomplete, SSAO disabled until next resize");
            self.groups = None;
            return;
        };
        let (width, height) = targets.size();
        self.blur_params.write(ctx.queue, &PassParams::new([1.0, 1.0], width, height));

        let ssao_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSAO Bind Group"),
            layout: &ctx.layouts.ssao,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: view(position) },
                wgpu::BindGroupEntry { binding: 1, resource: view(normal) },
                wgpu::BindGroupEntry { binding: 2, resource: view(&self.noise) },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry { binding: 4, resource: self.kernel.binding() },
            ],
        });
        let blur_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSAO Blur Bind Group"),
            layout: &ctx.layouts.post,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: view(ssao) },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&ssao.sampler),
                },
                wgpu::BindGroupEntry { binding: 2, resource: self.blur_params.binding() },
            ],
        });
        self.groups = Some(SsaoGroups {
            ssao: ssao_group,
            blur: blur_group,
        });
    }

    fn encode(&self, kind: PassKind, ctx: &RenderContext, frame: &mut FrameContext) {
        let Some(groups) = &self.groups else { return };
        let (program, group, target, label) = match kind {
            PassKind::Ssao => (ProgramKind::Ssao, &groups.ssao, &frame.targets.ssao, "SSAO Pass"),
            _ => (ProgramKind::SsaoBlur, &groups.blur, &frame.targets.ssao_blur, "SSAO Blur Pass"),
        };
        let Some(output) = target.color(0) else { return };
        let Some(pipeline) = pipeline(ctx.registry, program, frame.stats) else {
            return;
        };
        let mut pass = begin(
            frame.encoder,
            frame.profiler,
            kind,
            label,
            &[color_attachment(&output.view, Some(wgpu::Color::WHITE))],
            None,
        );
        frame.stats.draw_calls += draw_fullscreen(&mut pass, pipeline, &frame.scene, group);
    }
}
