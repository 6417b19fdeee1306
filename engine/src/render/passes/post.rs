//! Post-Processing Chain
//!
//! Motion blur, bloom (bright-pass extract plus separable Gaussian blur),
//! tone mapping, FXAA and the final blit to the output. Every step is a
//! full-screen triangle; ping-pong targets are tracked in the frame context
//! so disabled steps leave the chain intact.

use super::{begin, color_attachment, draw_fullscreen, pipeline, FrameContext, FramePass, RenderContext};
use crate::render::frame_plan::{FramePlan, PassKind};
use crate::render::resources::texture::clamp_sampler;
use crate::render::resources::{Framebuffer, UniformBuffer};
use crate::render::shader_registry::{ProgramKey, ProgramKind};
use crate::render::targets::{FrameTargets, ShadowTargets};
use crate::render::uniforms::PassParams;
use crate::scene::Entity;

fn program(kind: PassKind) -> Option<ProgramKind> {
    match kind {
        PassKind::MotionBlur => Some(ProgramKind::MotionBlur),
        PassKind::BloomExtract => Some(ProgramKind::BloomExtract),
        PassKind::BloomBlur => Some(ProgramKind::BloomBlur),
        PassKind::ToneMap => Some(ProgramKind::ToneMap),
        PassKind::Fxaa => Some(ProgramKind::Fxaa),
        PassKind::Present => Some(ProgramKind::Present),
        _ => None,
    }
}

fn view(framebuffer: &Framebuffer) -> Option<&wgpu::TextureView> {
    framebuffer.color(0).map(|texture| &texture.view)
}

/// Bind groups indexed by the HDR or LDR target they read.
struct PostGroups {
    motion_blur: [wgpu::BindGroup; 2],
    bloom_extract: [wgpu::BindGroup; 2],
    bloom_horizontal: wgpu::BindGroup,
    bloom_vertical: wgpu::BindGroup,
    tone_map: [wgpu::BindGroup; 2],
    fxaa: wgpu::BindGroup,
    present: [wgpu::BindGroup; 2],
}

pub struct PostPass {
    sampler: wgpu::Sampler,
    screen_params: UniformBuffer<PassParams>,
    horizontal_params: UniformBuffer<PassParams>,
    vertical_params: UniformBuffer<PassParams>,
    groups: Option<PostGroups>,
}

impl PostPass {
    const KINDS: &'static [PassKind] = &[
        PassKind::MotionBlur,
        PassKind::BloomExtract,
        PassKind::BloomBlur,
        PassKind::ToneMap,
        PassKind::Fxaa,
        PassKind::Present,
    ];

    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            sampler: clamp_sampler(device, "Post"),
            screen_params: UniformBuffer::new(device, "Post Screen Params", &PassParams::default()),
            horizontal_params: UniformBuffer::new(device, "Bloom Horizontal Params", &PassParams::default()),
            vertical_params: UniformBuffer::new(device, "Bloom Vertical Params", &PassParams::default()),
            groups: None,
        }
    }

    fn group(
        &self,
        ctx: &RenderContext,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        source: &wgpu::TextureView,
        params: &UniformBuffer<PassParams>,
        extra: Option<&wgpu::TextureView>,
    ) -> wgpu::BindGroup {
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(source),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: params.binding(),
            },
        ];
        if let Some(extra) = extra {
            entries.push(wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(extra),
            });
        }
        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        })
    }

    fn build_groups(&self, ctx: &RenderContext, targets: &FrameTargets) -> Option<PostGroups> {
        let hdr = [view(&targets.hdr[0])?, view(&targets.hdr[1])?];
        let ldr = [view(&targets.ldr[0])?, view(&targets.ldr[1])?];
        let bloom = [view(&targets.bloom[0])?, view(&targets.bloom[1])?];
        let depth = targets.depth_view()?;
        let layouts = ctx.layouts;
        let screen = &self.screen_params;

        Some(PostGroups {
            motion_blur: std::array::from_fn(|i| {
                self.group(ctx, "Motion Blur Bind Group", &layouts.post_depth, hdr[i], screen, Some(depth))
            }),
            bloom_extract: std::array::from_fn(|i| {
                self.group(ctx, "Bloom Extract Bind Group", &layouts.post, hdr[i], screen, None)
            }),
            bloom_horizontal: self.group(
                ctx,
                "Bloom Horizontal Bind Group",
                &layouts.post,
                bloom[0],
                &self.horizontal_params,
                None,
            ),
            bloom_vertical: self.group(
                ctx,
                "Bloom Vertical Bind Group",
                &layouts.post,
                bloom[1],
                &self.vertical_params,
                None,
            ),
            tone_map: std::array::from_fn(|i| {
                self.group(ctx, "Tone Map Bind Group", &layouts.post_bloom, hdr[i], screen, Some(bloom[0]))
            }),
            fxaa: self.group(ctx, "FXAA Bind Group", &layouts.post, ldr[0], screen, None),
            present: std::array::from_fn(|i| self.group(ctx, "Present Bind Group", &layouts.post, ldr[i], screen, None)),
        })
    }

    fn fullscreen(
        &self,
        kind: PassKind,
        ctx: &RenderContext,
        frame: &mut FrameContext,
        group: &wgpu::BindGroup,
        target: &wgpu::TextureView,
        label: &str,
    ) -> bool {
        let Some(program) = program(kind) else { return false };
        let Some(pipeline) = pipeline(ctx.registry, program, frame.stats) else {
            return false;
        };
        let mut pass = begin(
            frame.encoder,
            frame.profiler,
            kind,
            label,
            &[color_attachment(target, Some(wgpu::Color::BLACK))],
            None,
        );
        frame.stats.draw_calls += draw_fullscreen(&mut pass, pipeline, &frame.scene, group);
        true
    }
}

impl FramePass for PostPass {
    fn name(&self) -> &'static str {
        "post"
    }

    fn kinds(&self) -> &'static [PassKind] {
        Self::KINDS
    }

    fn programs(&self, kind: PassKind, _plan: &FramePlan, _renderables: &[&Entity]) -> Vec<ProgramKey> {
        program(kind).map(ProgramKey::from).into_iter().collect()
    }

    fn resize(&mut self, ctx: &RenderContext, targets: &FrameTargets, _shadows: &ShadowTargets) {
        let (width, height) = targets.size();
        let (bloom_width, bloom_height) = targets.bloom[0].size();
        self.screen_params.write(ctx.queue, &PassParams::new([0.0, 0.0], width, height));
        self.horizontal_params
            .write(ctx.queue, &PassParams::new([1.0, 0.0], bloom_width, bloom_height));
        self.vertical_params
            .write(ctx.queue, &PassParams::new([0.0, 1.0], bloom_width, bloom_height));

        self.groups = self.build_groups(ctx, targets);
        if self.groups.is_none() {
            log::error!("[PostPass] targets incomplete, post-processing disabled until next resize");
        }
    }

    fn encode(&self, kind: PassKind, ctx: &RenderContext, frame: &mut FrameContext) {
        let Some(groups) = &self.groups else { return };
        let targets = frame.targets;
        let current = frame.scene_color.min(1);

        match kind {
            PassKind::MotionBlur => {
                let next = 1 - current;
                let Some(target) = view(&targets.hdr[next]) else { return };
                if self.fullscreen(kind, ctx, frame, &groups.motion_blur[current], target, "Motion Blur Pass") {
                    frame.scene_color = next;
                }
            }
            PassKind::BloomExtract => {
                let Some(target) = view(&targets.bloom[0]) else { return };
                self.fullscreen(kind, ctx, frame, &groups.bloom_extract[current], target, "Bloom Extract Pass");
            }
            PassKind::BloomBlur => {
                let (Some(a), Some(b)) = (view(&targets.bloom[0]), view(&targets.bloom[1])) else {
                    return;
                };
                for _ in 0..ctx.settings.tunables.bloom.blur_iterations {
                    if !self.fullscreen(kind, ctx, frame, &groups.bloom_horizontal, b, "Bloom Blur Horizontal") {
                        return;
                    }
                    self.fullscreen(kind, ctx, frame, &groups.bloom_vertical, a, "Bloom Blur Vertical");
                }
            }
            PassKind::ToneMap => {
                let Some(target) = view(&targets.ldr[0]) else { return };
                if self.fullscreen(kind, ctx, frame, &groups.tone_map[current], target, "Tone Map Pass") {
                    frame.display = 0;
                }
            }
            PassKind::Fxaa => {
                let Some(target) = view(&targets.ldr[1]) else { return };
                if self.fullscreen(kind, ctx, frame, &groups.fxaa, target, "FXAA Pass") {
                    frame.display = 1;
                }
            }
            PassKind::Present => {
                let output = frame.output;
                self.fullscreen(kind, ctx, frame, &groups.present[frame.display.min(1)], output, "Present Pass");
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_post_kind_has_a_program() {
        for kind in PostPass::KINDS {
            assert!(program(*kind).is_some(), "{kind}");
        }
        assert!(program(PassKind::Lighting).is_none());
    }
}
