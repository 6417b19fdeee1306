//! Uniform Structs for GPU Shaders
//!
//! GPU-compatible uniform and storage records. Every struct here must match
//! its WGSL declaration in `shaders/common/` exactly; sizes are checked at
//! compile time.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use rand::{Rng, SeedableRng};

use crate::config::{FrameSettings, RenderOption, SSAO_KERNEL_SIZE};

/// Dynamic-offset stride between camera slots in the group 0 buffer.
pub const CAMERA_SLOT_STRIDE: u64 = 512;

/// Camera block (group 0, binding 0).
///
/// Layout (352 bytes):
///   offset   0: view_proj      (mat4x4<f32>)
///   offset  64: inv_view_proj  (mat4x4<f32>)
///   offset 128: prev_view_proj (mat4x4<f32>)
///   offset 192: view           (mat4x4<f32>)
///   offset 256: proj           (mat4x4<f32>)
///   offset 320: position       (vec4<f32>, w = near)
///   offset 336: clip           (vec4<f32>, x = far, y = aspect)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub prev_view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub position: [f32; 4],
    pub clip: [f32; 4],
}

static_assertions::assert_eq_size!(CameraUniforms, [u8; 352]);
static_assertions::const_assert!(std::mem::size_of::<CameraUniforms>() as u64 <= CAMERA_SLOT_STRIDE);

impl Default for CameraUniforms {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO, 0.1, 100.0)
    }
}

impl CameraUniforms {
    pub fn new(view: Mat4, proj: Mat4, prev_view_proj: Mat4, position: Vec3, near: f32, far: f32) -> Self {
        let view_proj = proj * view;
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            prev_view_proj: prev_view_proj.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            position: [position.x, position.y, position.z, near],
            clip: [far, 1.0, 0.0, 0.0],
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view_proj)
    }
}

/// Per-object record in the group 0 storage array, indexed by instance.
///
/// Layout (144 bytes): model (mat4), normal matrix (mat4), params (vec4,
/// x = reflective flag).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ObjectData {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
    pub params: [f32; 4],
}

static_assertions::assert_eq_size!(ObjectData, [u8; 144]);

impl ObjectData {
    pub fn new(model: Mat4, reflective: bool) -> Self {
        let normal = model.inverse().transpose();
        Self {
            model: model.to_cols_array_2d(),
            normal: normal.to_cols_array_2d(),
            params: [if reflective { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
        }
    }
}

/// Per-frame scalars (group 1). All tunables consumed by passes live here.
///
/// Layout (160 bytes): ten vec4 rows, see field comments.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct FrameUniforms {
    /// width, height, 1/width, 1/height
    pub screen: [f32; 4],
    /// time, delta time, frame index, 0
    pub time: [f32; 4],
    /// radius, bias, power, samples used
    pub ssao: [f32; 4],
    /// step size, max steps, fresnel exponent, max delta
    pub ssr: [f32; 4],
    /// threshold, intensity, enabled, 0
    pub bloom: [f32; 4],
    /// gamma, exposure, 0, 0
    pub tone_map: [f32; 4],
    /// samples, velocity scale, enabled, 0
    pub motion_blur: [f32; 4],
    /// span max, reduce min, reduce mul, 0
    pub fxaa: [f32; 4],
    /// bias, point far, map size, 0
    pub shadow: [f32; 4],
    /// option bits, 0, 0, 0
    pub flags: [u32; 4],
}

static_assertions::assert_eq_size!(FrameUniforms, [u8; 160]);

impl FrameUniforms {
    pub fn new(settings: &FrameSettings, width: u32, height: u32, time: f32, delta: f32, frame: u64) -> Self {
        let t = &settings.tunables;
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        let mut option_bits = 0u32;
        for (i, option) in RenderOption::ALL.iter().enumerate() {
            if settings.is_enabled(*option) {
                option_bits |= 1 << i;
            }
        }
        Self {
            screen: [w, h, 1.0 / w, 1.0 / h],
            time: [time, delta, frame as f32, 0.0],
            ssao: [t.ssao.radius, t.ssao.bias, t.ssao.power, t.ssao.samples_used as f32],
            ssr: [
                t.ssr.step_size,
                t.ssr.max_steps as f32,
                t.ssr.fresnel_exponent,
                t.ssr.max_delta,
            ],
            bloom: [
                t.bloom.threshold,
                t.bloom.intensity,
                enabled(settings, RenderOption::Bloom),
                0.0,
            ],
            tone_map: [t.tone_map.gamma, t.tone_map.exposure, 0.0, 0.0],
            motion_blur: [
                t.motion_blur.samples as f32,
                t.motion_blur.velocity_scale,
                enabled(settings, RenderOption::MotionBlur),
                0.0,
            ],
            fxaa: [t.fxaa.span_max, t.fxaa.reduce_min, t.fxaa.reduce_mul, 0.0],
            shadow: [t.shadow.bias, t.shadow.point_far, t.shadow.map_size as f32, 0.0],
            flags: [option_bits, 0, 0, 0],
        }
    }
}

fn enabled(settings: &FrameSettings, option: RenderOption) -> f32 {
    if settings.is_enabled(option) { 1.0 } else { 0.0 }
}

/// Shading model tag written to the G-buffer position alpha.
pub const SHADING_PHONG: u32 = 1;
pub const SHADING_PBR: u32 = 2;

/// Material block (group 3, binding 0 of every material layout).
///
/// Layout (96 bytes):
///   offset  0: base_color (vec4<f32>, a = opacity)
///   offset 16: emission   (vec4<f32>)
///   offset 32: specular   (vec4<f32>, w = shininess)
///   offset 48: pbr        (vec4<f32>, metallic / roughness / ao / reflectivity)
///   offset 64: extra      (vec4<f32>, x = alpha cutoff, y = height scale)
///   offset 80: flags      (vec4<u32>, blend mode / texture mask / shading model / 0)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialParams {
    pub base_color: [f32; 4],
    pub emission: [f32; 4],
    pub specular: [f32; 4],
    pub pbr: [f32; 4],
    pub extra: [f32; 4],
    pub flags: [u32; 4],
}

static_assertions::assert_eq_size!(MaterialParams, [u8; 96]);

/// Parameters for single-input full-screen passes (group 3, binding 2).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct PassParams {
    /// Blur direction in texels
    pub direction: [f32; 2],
    /// 1 / source size
    pub texel: [f32; 2],
}

static_assertions::assert_eq_size!(PassParams, [u8; 16]);

impl PassParams {
    pub fn new(direction: [f32; 2], source_width: u32, source_height: u32) -> Self {
        Self {
            direction,
            texel: [1.0 / source_width.max(1) as f32, 1.0 / source_height.max(1) as f32],
        }
    }
}

/// Parameters for cubemap conversion and convolution passes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct EnvParams {
    pub roughness: f32,
    /// Edge length of the source cube face
    pub source_size: f32,
    pub sample_count: u32,
    pub _pad: u32,
}

static_assertions::assert_eq_size!(EnvParams, [u8; 16]);

/// Hemisphere sample kernel for SSAO (group 3).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SsaoKernel {
    pub samples: [[f32; 4]; SSAO_KERNEL_SIZE],
}

static_assertions::const_assert_eq!(std::mem::size_of::<SsaoKernel>(), SSAO_KERNEL_SIZE * 16);

impl SsaoKernel {
    /// Tangent-space hemisphere samples (+Z up), denser near the origin.
    pub fn generate(seed: u64) -> Self {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut samples = [[0.0; 4]; SSAO_KERNEL_SIZE];
        for (i, sample) in samples.iter_mut().enumerate() {
            let dir = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(0.0..1.0),
            )
            .normalize_or(Vec3::Z);
            let t = i as f32 / SSAO_KERNEL_SIZE as f32;
            let scale = 0.1 + 0.9 * t * t;
            let v = dir * rng.gen_range(0.0..1.0f32) * scale;
            *sample = [v.x, v.y, v.z, 0.0];
        }
        Self { samples }
    }
}

/// Edge length of the tiled SSAO rotation noise texture.
pub const SSAO_NOISE_SIZE: u32 = 4;

/// Random tangent-plane rotation vectors encoded as RGBA8.
pub fn ssao_noise_pixels(seed: u64) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let count = (SSAO_NOISE_SIZE * SSAO_NOISE_SIZE) as usize;
    let mut pixels = Vec::with_capacity(count * 4);
    for _ in 0..count {
        let x: f32 = rng.gen_range(-1.0..1.0);
        let y: f32 = rng.gen_range(-1.0..1.0);
        pixels.push(((x * 0.5 + 0.5) * 255.0) as u8);
        pixels.push(((y * 0.5 + 0.5) * 255.0) as u8);
        pixels.push(0);
        pixels.push(255);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderSettings;

    #[test]
    fn test_kernel_is_in_hemisphere() {
        let kernel = SsaoKernel::generate(7);
        for s in kernel.samples.iter() {
            let v = Vec3::new(s[0], s[1], s[2]);
            assert!(v.z >= 0.0);
            assert!(v.length() <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn test_kernel_is_deterministic() {
        assert_eq!(SsaoKernel::generate(3).samples, SsaoKernel::generate(3).samples);
    }

    #[test]
    fn test_frame_uniforms_pack_options() {
        let mut settings = RenderSettings::default();
        settings.disable(RenderOption::Bloom);
        let frame = FrameUniforms::new(&settings.apply(), 800, 600, 0.0, 0.016, 1);
        assert_eq!(frame.bloom[2], 0.0);
        assert_eq!(frame.screen[0], 800.0);
        let deferred_bit = RenderOption::ALL
            .iter()
            .position(|o| *o == RenderOption::Deferred)
            .unwrap();
        assert_ne!(frame.flags[0] & (1 << deferred_bit), 0);
    }

    #[test]
    fn test_noise_size() {
        assert_eq!(ssao_noise_pixels(1).len(), 64);
    }
}
