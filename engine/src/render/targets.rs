//! Render Targets
//!
//! Screen-sized framebuffers used by the frame pipeline and the shadow map
//! storage. All of it is sized at construction and reallocated on resize.

use super::resources::{Cubemap, Framebuffer, FramebufferLayout, FramebufferLimits, Renderbuffer};
use super::layouts::LightViews;
use super::lights::MAX_POINT_SHADOWS;

pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const LDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const SSAO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;
pub const BRDF_LUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;

/// G-buffer attachment order.
pub mod gbuffer {
    /// xyz world position, w shading model
    pub const POSITION: usize = 0;
    /// xyz world normal, w ambient occlusion
    pub const NORMAL: usize = 1;
    /// rgb albedo, a specular intensity or metallic
    pub const ALBEDO: usize = 2;
    /// rgb emission, a shininess or roughness
    pub const EMISSION: usize = 3;
}

pub const GBUFFER_FORMATS: [wgpu::TextureFormat; 4] = [
    wgpu::TextureFormat::Rgba16Float,
    wgpu::TextureFormat::Rgba16Float,
    wgpu::TextureFormat::Rgba8Unorm,
    wgpu::TextureFormat::Rgba16Float,
];

/// Bloom runs at half resolution.
pub fn bloom_size(width: u32, height: u32) -> (u32, u32) {
    ((width / 2).max(1), (height / 2).max(1))
}

pub struct FrameTargets {
    pub gbuffer: Framebuffer,
    /// Lit scene color, ping-ponged between passes
    pub hdr: [Framebuffer; 2],
    pub ssao: Framebuffer,
    pub ssao_blur: Framebuffer,
    pub bloom: [Framebuffer; 2],
    /// Tone-mapped color, ping-ponged for FXAA
    pub ldr: [Framebuffer; 2],
    width: u32,
    height: u32,
}

fn gbuffer_layout(width: u32, height: u32) -> FramebufferLayout {
    GBUFFER_FORMATS
        .iter()
        .fold(FramebufferLayout::new("G-Buffer", width, height), |layout, format| {
            layout.with_color(*format)
        })
        .with_depth(DEPTH_FORMAT)
}

fn color_layout(name: &str, width: u32, height: u32, format: wgpu::TextureFormat) -> FramebufferLayout {
    FramebufferLayout::new(name, width, height).with_color(format)
}

impl FrameTargets {
    /// Every framebuffer layout, in allocation order.
    pub fn layouts(width: u32, height: u32) -> Vec<FramebufferLayout> {
        let (bw, bh) = bloom_size(width, height);
        vec![
            gbuffer_layout(width, height),
            color_layout("HDR A", width, height, HDR_FORMAT),
            color_layout("HDR B", width, height, HDR_FORMAT),
            color_layout("SSAO", width, height, SSAO_FORMAT),
            color_layout("SSAO Blur", width, height, SSAO_FORMAT),
            color_layout("Bloom A", bw, bh, HDR_FORMAT),
            color_layout("Bloom B", bw, bh, HDR_FORMAT),
            color_layout("LDR A", width, height, LDR_FORMAT),
            color_layout("LDR B", width, height, LDR_FORMAT),
        ]
    }

    pub fn new(device: &wgpu::Device, width: u32, height: u32, limits: &FramebufferLimits) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let (bw, bh) = bloom_size(width, height);
        let fb = |layout: FramebufferLayout| Framebuffer::new(device, &layout, limits);

        let targets = Self {
            gbuffer: fb(gbuffer_layout(width, height)),
            hdr: [
                fb(color_layout("HDR A", width, height, HDR_FORMAT)),
                fb(color_layout("HDR B", width, height, HDR_FORMAT)),
            ],
            ssao: fb(color_layout("SSAO", width, height, SSAO_FORMAT)),
            ssao_blur: fb(color_layout("SSAO Blur", width, height, SSAO_FORMAT)),
            bloom: [
                fb(color_layout("Bloom A", bw, bh, HDR_FORMAT)),
                fb(color_layout("Bloom B", bw, bh, HDR_FORMAT)),
            ],
            ldr: [
                fb(color_layout("LDR A", width, height, LDR_FORMAT)),
                fb(color_layout("LDR B", width, height, LDR_FORMAT)),
            ],
            width,
            height,
        };
        log::info!("[FrameTargets] allocated {width}x{height}");
        targets
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Depth shared by geometry, forward, skybox and blend passes.
    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.gbuffer.depth_view()
    }
}

/// Directional shadow map plus the point light cube maps.
pub struct ShadowTargets {
    pub directional: Renderbuffer,
    pub point: [Cubemap; MAX_POINT_SHADOWS],
    size: u32,
}

impl ShadowTargets {
    pub fn new(device: &wgpu::Device, size: u32) -> Self {
        let point_size = point_shadow_size(size);
        let point = std::array::from_fn(|i| {
            Cubemap::new(device, &format!("Point Shadow {i}"), point_size, SHADOW_FORMAT, 1)
        });
        log::debug!("[ShadowTargets] directional {size}, {MAX_POINT_SHADOWS} cubes of {point_size}");
        Self {
            directional: Renderbuffer::depth(device, "Directional Shadow", size, size, SHADOW_FORMAT),
            point,
            size,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Group 2 views with these shadow maps and the given IBL maps.
    pub fn light_views<'a>(
        &'a self,
        irradiance: &'a wgpu::TextureView,
        prefilter: &'a wgpu::TextureView,
        brdf_lut: &'a wgpu::TextureView,
    ) -> LightViews<'a> {
        LightViews {
            directional_shadow: &self.directional.view,
            point_shadows: std::array::from_fn(|i| &self.point[i].cube_view),
            irradiance,
            prefilter,
            brdf_lut,
        }
    }
}

/// Point light cube faces use half the directional resolution.
pub fn point_shadow_size(map_size: u32) -> u32 {
    (map_size / 2).max(64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_layouts_complete_on_default_limits() {
        let limits = FramebufferLimits::default();
        for layout in FrameTargets::layouts(1920, 1080) {
            layout.validate(&limits).unwrap();
        }
    }

    #[test]
    fn test_gbuffer_fits_sample_budget() {
        let bytes = crate::render::resources::bytes_per_sample(&GBUFFER_FORMATS).unwrap();
        assert!(bytes <= wgpu::Limits::default().max_color_attachment_bytes_per_sample);
    }

    #[test]
    fn test_bloom_is_half_size() {
        assert_eq!(bloom_size(1920, 1080), (960, 540));
        assert_eq!(bloom_size(1, 1), (1, 1));
    }
}
