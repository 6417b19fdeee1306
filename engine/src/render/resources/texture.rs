//! Textures and Cubemaps
//!
//! [`TextureData`] is CPU-side pixel data handed over by an asset loader.
//! It is validated before upload; invalid data never reaches the GPU.

use super::ResourceId;
use crate::error::{RenderError, Result};

/// Pixel layouts accepted from asset loaders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    /// HDR data such as equirectangular environment maps
    Rgba32Float,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8Unorm | PixelFormat::Rgba8UnormSrgb => 4,
            PixelFormat::Rgba32Float => 16,
        }
    }

    pub fn wgpu_format(self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            PixelFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            PixelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        }
    }

    /// Rgba32Float is not filterable without an optional device feature.
    pub fn filterable(self) -> bool {
        !matches!(self, PixelFormat::Rgba32Float)
    }
}

/// Decoded pixels, tightly packed rows, top row first.
#[derive(Clone, Debug)]
pub struct TextureData {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub fn rgba8(label: impl Into<String>, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format: PixelFormat::Rgba8Unorm,
            pixels,
        }
    }

    pub fn rgba8_srgb(label: impl Into<String>, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            format: PixelFormat::Rgba8UnormSrgb,
            ..Self::rgba8(label, width, height, pixels)
        }
    }

    pub fn rgba32f(label: impl Into<String>, width: u32, height: u32, texels: &[f32]) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format: PixelFormat::Rgba32Float,
            pixels: bytemuck::cast_slice(texels).to_vec(),
        }
    }

    /// A single pixel of one color.
    pub fn solid(label: impl Into<String>, rgba: [u8; 4]) -> Self {
        Self::rgba8(label, 1, 1, rgba.to_vec())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| RenderError::InvalidTextureData {
            label: self.label.clone(),
            reason,
        };
        if self.width == 0 || self.height == 0 {
            return Err(invalid(format!("zero extent {}x{}", self.width, self.height)));
        }
        let expected = self.width as usize * self.height as usize * self.format.bytes_per_pixel();
        if self.pixels.len() != expected {
            return Err(invalid(format!(
                "expected {expected} bytes for {}x{} {:?}, got {}",
                self.width,
                self.height,
                self.format,
                self.pixels.len()
            )));
        }
        Ok(())
    }
}

/// A 2D texture with its default view and sampler.
pub struct Texture {
    id: ResourceId,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    width: u32,
    height: u32,
    mip_levels: u32,
    format: wgpu::TextureFormat,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

impl Texture {
    /// Validate and upload decoded pixels.
    pub fn from_data(device: &wgpu::Device, queue: &wgpu::Queue, data: &TextureData) -> Result<Self> {
        data.validate()?;

        let size = wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        };
        let format = data.format.wgpu_format();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&data.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(data.width * data.format.bytes_per_pixel() as u32),
                rows_per_image: Some(data.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = if data.format.filterable() {
            repeat_sampler(device, &data.label)
        } else {
            nearest_sampler(device, &data.label)
        };

        Ok(Self {
            id: ResourceId::next(),
            texture,
            view,
            sampler,
            width: data.width,
            height: data.height,
            mip_levels: 1,
            format,
        })
    }

    /// Upload `data`, falling back to a 1x1 `fallback` color when the data is
    /// invalid. The failure is logged with the texture label.
    pub fn from_data_or_placeholder(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        data: &TextureData,
        fallback: [u8; 4],
    ) -> Self {
        match Self::from_data(device, queue, data) {
            Ok(texture) => texture,
            Err(err) => {
                log::error!("[Texture] {err}; using placeholder");
                Self::placeholder(device, queue, fallback, &data.label)
            }
        }
    }

    /// 1x1 texture of a single color, bound where a material slot is empty.
    pub fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue, rgba: [u8; 4], label: &str) -> Self {
        let data = TextureData::solid(format!("{label} (placeholder)"), rgba);
        let size = wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&data.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = repeat_sampler(device, label);
        Self {
            id: ResourceId::next(),
            texture,
            view,
            sampler,
            width: 1,
            height: 1,
            mip_levels: 1,
            format: wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    /// A texture that passes can render into and later sample.
    pub fn render_target(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
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
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = clamp_sampler(device, label);
        Self {
            id: ResourceId::next(),
            texture,
            view,
            sampler,
            width: width.max(1),
            height: height.max(1),
            mip_levels: 1,
            format,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

/// Six-layer cube texture with a cube view and a 2D view per face per mip.
pub struct Cubemap {
    id: ResourceId,
    pub texture: wgpu::Texture,
    pub cube_view: wgpu::TextureView,
    face_views: Vec<[wgpu::TextureView; 6]>,
    pub sampler: wgpu::Sampler,
    size: u32,
    format: wgpu::TextureFormat,
}

impl std::fmt::Debug for Cubemap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cubemap")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("mip_levels", &self.face_views.len())
            .field("format", &self.format)
            .finish()
    }
}

impl Cubemap {
    pub const FACES: u32 = 6;

    /// Create a renderable cubemap with `mip_levels` mips per face.
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        size: u32,
        format: wgpu::TextureFormat,
        mip_levels: u32,
    ) -> Self {
        let size = size.max(1);
        let max_mips = 32 - size.leading_zeros();
        let mip_levels = mip_levels.clamp(1, max_mips);

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: Self::FACES,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        let cube_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&format!("{label} Cube View")),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            array_layer_count: Some(Self::FACES),
            ..Default::default()
        });

        let face_views = (0..mip_levels)
            .map(|mip| {
                std::array::from_fn(|face| {
                    texture.create_view(&wgpu::TextureViewDescriptor {
                        label: Some(&format!("{label} Face {face} Mip {mip}")),
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        base_mip_level: mip,
                        mip_level_count: Some(1),
                        base_array_layer: face as u32,
                        array_layer_count: Some(1),
                        ..Default::default()
                    })
                })
            })
            .collect();

        let filter = if format.is_depth_stencil_format() {
            wgpu::FilterMode::Nearest
        } else {
            wgpu::FilterMode::Linear
        };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{label} Sampler")),
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: filter,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        Self {
            id: ResourceId::next(),
            texture,
            cube_view,
            face_views,
            sampler,
            size,
            format,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn mip_levels(&self) -> u32 {
        self.face_views.len() as u32
    }

    /// Edge length of `mip`.
    pub fn mip_size(&self, mip: u32) -> u32 {
        (self.size >> mip).max(1)
    }

    pub fn face_count(&self) -> u32 {
        Self::FACES
    }

    pub fn face_view(&self, face: usize, mip: u32) -> Option<&wgpu::TextureView> {
        self.face_views.get(mip as usize).and_then(|views| views.get(face))
    }
}

pub(crate) fn repeat_sampler(device: &wgpu::Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(&format!("{label} Sampler")),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

pub(crate) fn clamp_sampler(device: &wgpu::Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(&format!("{label} Sampler")),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

pub(crate) fn nearest_sampler(device: &wgpu::Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(&format!("{label} Sampler")),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_rgba8() {
        let data = TextureData::rgba8("ok", 2, 2, vec![0; 16]);
        assert!(data.validate().is_ok());
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let data = TextureData::rgba8("short", 4, 4, vec![0; 10]);
        let err = data.validate().unwrap_err();
        assert!(err.to_string().contains("short"));
    }

    #[test]
    fn test_zero_extent_is_rejected() {
        let data = TextureData::rgba32f("empty", 0, 4, &[]);
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_float_pixels_are_sixteen_bytes() {
        let data = TextureData::rgba32f("hdr", 2, 1, &[1.0; 8]);
        assert_eq!(data.pixels.len(), 32);
        assert!(data.validate().is_ok());
        assert!(!data.format.filterable());
    }
}
