//! Framebuffers
//!
//! A framebuffer is a named group of color render targets plus an optional
//! depth [`Renderbuffer`]. Completeness is checked explicitly against the
//! device limits after construction. An incomplete framebuffer is logged
//! with its name and still returned; drawing into it is best effort.

use super::texture::Texture;
use super::ResourceId;
use crate::error::{RenderError, Result};

/// Device limits relevant to framebuffer completeness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramebufferLimits {
    pub max_color_attachments: u32,
    pub max_color_attachment_bytes_per_sample: u32,
    pub max_dimension: u32,
}

impl FramebufferLimits {
    pub fn from_device(limits: &wgpu::Limits) -> Self {
        Self {
            max_color_attachments: limits.max_color_attachments,
            max_color_attachment_bytes_per_sample: limits.max_color_attachment_bytes_per_sample,
            max_dimension: limits.max_texture_dimension_2d,
        }
    }
}

impl Default for FramebufferLimits {
    fn default() -> Self {
        Self::from_device(&wgpu::Limits::default())
    }
}

/// Storage a set of color formats needs per sample, following the render
/// target packing rules (each target aligned to its component size).
pub fn bytes_per_sample(formats: &[wgpu::TextureFormat]) -> Option<u32> {
    let mut total = 0u32;
    for format in formats {
        let cost = format.target_pixel_byte_cost()?;
        let align = format.target_component_alignment()?;
        total = total.next_multiple_of(align) + cost;
    }
    Some(total)
}

/// Description of a framebuffer, checkable without a device.
#[derive(Clone, Debug, PartialEq)]
pub struct FramebufferLayout {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub color_formats: Vec<wgpu::TextureFormat>,
    pub depth_format: Option<wgpu::TextureFormat>,
}

impl FramebufferLayout {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            color_formats: Vec::new(),
            depth_format: None,
        }
    }

    pub fn with_color(mut self, format: wgpu::TextureFormat) -> Self {
        self.color_formats.push(format);
        self
    }

    pub fn with_depth(mut self, format: wgpu::TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }

    /// Check completeness against `limits`.
    pub fn validate(&self, limits: &FramebufferLimits) -> Result<()> {
        let incomplete = |reason: String| RenderError::IncompleteFramebuffer {
            name: self.name.clone(),
            reason,
        };

        if self.color_formats.is_empty() && self.depth_format.is_none() {
            return Err(incomplete("no attachments".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(incomplete(format!("zero extent {}x{}", self.width, self.height)));
        }
        if self.width > limits.max_dimension || self.height > limits.max_dimension {
            return Err(incomplete(format!(
                "{}x{} exceeds max dimension {}",
                self.width, self.height, limits.max_dimension
            )));
        }
        if self.color_formats.len() as u32 > limits.max_color_attachments {
            return Err(incomplete(format!(
                "{} color attachments, device allows {}",
                self.color_formats.len(),
                limits.max_color_attachments
            )));
        }
        for format in &self.color_formats {
            if format.is_depth_stencil_format() {
                return Err(incomplete(format!("{format:?} used as a color attachment")));
            }
        }
        let bytes = bytes_per_sample(&self.color_formats)
            .ok_or_else(|| incomplete("color format is not renderable".into()))?;
        if bytes > limits.max_color_attachment_bytes_per_sample {
            return Err(incomplete(format!(
                "{bytes} bytes per sample, device allows {}",
                limits.max_color_attachment_bytes_per_sample
            )));
        }
        if let Some(depth) = self.depth_format {
            if !depth.is_depth_stencil_format() {
                return Err(incomplete(format!("{depth:?} is not a depth format")));
            }
        }
        Ok(())
    }
}

/// Depth-only attachment.
pub struct Renderbuffer {
    id: ResourceId,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    format: wgpu::TextureFormat,
}

impl Renderbuffer {
    pub fn depth(device: &wgpu::Device, label: &str, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            id: ResourceId::next(),
            texture,
            view,
            format,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

pub struct Framebuffer {
    id: ResourceId,
    name: String,
    pub colors: Vec<Texture>,
    pub depth: Option<Renderbuffer>,
    width: u32,
    height: u32,
    complete: bool,
}

impl Framebuffer {
    /// Allocate every attachment in `layout`. Incompleteness is logged, not
    /// returned.
    pub fn new(device: &wgpu::Device, layout: &FramebufferLayout, limits: &FramebufferLimits) -> Self {
        let complete = match layout.validate(limits) {
            Ok(()) => true,
            Err(err) => {
                log::error!("[Framebuffer] {err}");
                false
            }
        };

        let colors = layout
            .color_formats
            .iter()
            .enumerate()
            .map(|(i, format)| {
                Texture::render_target(
                    device,
                    &format!("{} Color {i}", layout.name),
                    layout.width,
                    layout.height,
                    *format,
                )
            })
            .collect();
        let depth = layout.depth_format.map(|format| {
            Renderbuffer::depth(
                device,
                &format!("{} Depth", layout.name),
                layout.width,
                layout.height,
                format,
            )
        });

        log::debug!(
            "[Framebuffer] '{}' {}x{} ({} color, depth: {})",
            layout.name,
            layout.width,
            layout.height,
            layout.color_formats.len(),
            layout.depth_format.is_some()
        );

        Self {
            id: ResourceId::next(),
            name: layout.name.clone(),
            colors,
            depth,
            width: layout.width,
            height: layout.height,
            complete,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn color(&self, index: usize) -> Option<&Texture> {
        self.colors.get(index)
    }

    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.depth.as_ref().map(|d| &d.view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::TextureFormat as F;

    #[test]
    fn test_empty_framebuffer_is_incomplete() {
        let layout = FramebufferLayout::new("Empty", 64, 64);
        let err = layout.validate(&FramebufferLimits::default()).unwrap_err();
        assert!(err.to_string().contains("Empty"));
    }

    #[test]
    fn test_too_many_attachments() {
        let mut layout = FramebufferLayout::new("Wide", 64, 64);
        for _ in 0..9 {
            layout = layout.with_color(F::R8Unorm);
        }
        assert!(layout.validate(&FramebufferLimits::default()).is_err());
    }

    #[test]
    fn test_color_depth_mixup() {
        let layout = FramebufferLayout::new("Mixed", 64, 64).with_color(F::Depth32Float);
        assert!(layout.validate(&FramebufferLimits::default()).is_err());
        let layout = FramebufferLayout::new("Mixed", 64, 64)
            .with_color(F::Rgba8Unorm)
            .with_depth(F::Rgba8Unorm);
        assert!(layout.validate(&FramebufferLimits::default()).is_err());
    }

    #[test]
    fn test_bytes_per_sample_budget() {
        let limits = FramebufferLimits {
            max_color_attachment_bytes_per_sample: 8,
            ..FramebufferLimits::default()
        };
        let layout = FramebufferLayout::new("Fat", 64, 64)
            .with_color(F::Rgba16Float)
            .with_color(F::Rgba16Float);
        assert!(layout.validate(&limits).is_err());
    }

    #[test]
    fn test_depth_only_is_complete() {
        let layout = FramebufferLayout::new("Shadow", 1024, 1024).with_depth(F::Depth32Float);
        assert!(layout.validate(&FramebufferLimits::default()).is_ok());
    }
}
