//! Numeric Tunables
//!
//! Every value here is consumed per frame by the pass it names. All groups
//! deserialize with per-field defaults so a settings file only needs the
//! values it changes.

use serde::{Deserialize, Serialize};

/// Number of hemisphere samples generated for the SSAO kernel.
pub const SSAO_KERNEL_SIZE: usize = 64;

/// Upper bound for configurable bloom blur iterations.
pub const MAX_BLOOM_ITERATIONS: u32 = 16;

/// Upper bound for motion blur samples.
pub const MAX_MOTION_BLUR_SAMPLES: u32 = 32;

/// Capacity of the point light portion of the light storage buffer.
pub const MAX_POINT_LIGHTS: usize = 48;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub shadow: ShadowTunables,
    pub ssao: SsaoTunables,
    pub ssr: SsrTunables,
    pub bloom: BloomTunables,
    pub tone_map: ToneMapTunables,
    pub motion_blur: MotionBlurTunables,
    pub fxaa: FxaaTunables,
    pub lighting: LightingTunables,
    pub environment: EnvironmentTunables,
}

impl Tunables {
    /// Pull every value into its valid range.
    pub fn clamp(&mut self) {
        self.ssao.samples_used = self.ssao.samples_used.clamp(1, SSAO_KERNEL_SIZE as u32);
        self.bloom.blur_iterations = self.bloom.blur_iterations.min(MAX_BLOOM_ITERATIONS);
        self.motion_blur.samples = self.motion_blur.samples.clamp(1, MAX_MOTION_BLUR_SAMPLES);
        self.ssr.max_steps = self.ssr.max_steps.max(1);
        self.shadow.map_size = self.shadow.map_size.clamp(64, 8192);
        self.tone_map.gamma = self.tone_map.gamma.max(0.01);
        if self.shadow.far <= self.shadow.near {
            self.shadow.far = self.shadow.near + 1.0;
        }
        self.environment.prefilter_mips = self.environment.prefilter_mips.clamp(1, 8);
        self.lighting.max_point_lights = self.lighting.max_point_lights.min(MAX_POINT_LIGHTS);
    }
}

/// Shadow map projection parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowTunables {
    /// Near plane of the directional light's orthographic box
    pub near: f32,
    /// Far plane of the directional light's orthographic box
    pub far: f32,
    /// Half extent of the orthographic box
    pub projection_size: f32,
    /// Distance the directional light "eye" is pulled back along its direction
    pub light_offset: f32,
    /// Resolution of the directional map and of each point-light cube face
    pub map_size: u32,
    /// Far plane of point-light cube shadows
    pub point_far: f32,
    /// Depth comparison bias
    pub bias: f32,
}

impl Default for ShadowTunables {
    fn default() -> Self {
        Self {
            near: 1.0,
            far: 60.0,
            projection_size: 20.0,
            light_offset: 20.0,
            map_size: 2048,
            point_far: 25.0,
            bias: 0.005,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaoTunables {
    /// Samples actually taken per pixel, at most [`SSAO_KERNEL_SIZE`]
    pub samples_used: u32,
    pub radius: f32,
    pub bias: f32,
    pub power: f32,
}

impl Default for SsaoTunables {
    fn default() -> Self {
        Self {
            samples_used: 32,
            radius: 0.5,
            bias: 0.025,
            power: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsrTunables {
    pub step_size: f32,
    pub max_steps: u32,
    pub fresnel_exponent: f32,
    pub max_delta: f32,
}

impl Default for SsrTunables {
    fn default() -> Self {
        Self {
            step_size: 0.1,
            max_steps: 64,
            fresnel_exponent: 3.0,
            max_delta: 0.4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomTunables {
    /// Luminance above which pixels feed the bloom
    pub threshold: f32,
    /// Number of separable Gaussian blur passes (each is horizontal + vertical)
    pub blur_iterations: u32,
    pub intensity: f32,
}

impl Default for BloomTunables {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            blur_iterations: 5,
            intensity: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneMapTunables {
    pub gamma: f32,
    pub exposure: f32,
}

impl Default for ToneMapTunables {
    fn default() -> Self {
        Self {
            gamma: 2.2,
            exposure: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionBlurTunables {
    pub samples: u32,
    pub velocity_scale: f32,
}

impl Default for MotionBlurTunables {
    fn default() -> Self {
        Self {
            samples: 8,
            velocity_scale: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxaaTunables {
    pub span_max: f32,
    pub reduce_min: f32,
    pub reduce_mul: f32,
}

impl Default for FxaaTunables {
    fn default() -> Self {
        Self {
            span_max: 8.0,
            reduce_min: 1.0 / 128.0,
            reduce_mul: 1.0 / 8.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingTunables {
    /// Only this many point lights (closest to the camera) are uploaded
    pub max_point_lights: usize,
    /// Ambient term used when no directional light is present
    pub ambient_floor: f32,
}

impl Default for LightingTunables {
    fn default() -> Self {
        Self {
            max_point_lights: 16,
            ambient_floor: 0.03,
        }
    }
}

/// Sizes used by the environment precompute stage and skybox conversion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentTunables {
    pub capture_size: u32,
    pub irradiance_size: u32,
    pub prefilter_size: u32,
    pub prefilter_mips: u32,
    pub brdf_lut_size: u32,
    pub skybox_size: u32,
    pub capture_near: f32,
    pub capture_far: f32,
}

impl Default for EnvironmentTunables {
    fn default() -> Self {
        Self {
            capture_size: 128,
            irradiance_size: 32,
            prefilter_size: 128,
            prefilter_mips: 5,
            brdf_lut_size: 512,
            skybox_size: 512,
            capture_near: 0.1,
            capture_far: 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_already_clamped() {
        let mut tunables = Tunables::default();
        tunables.clamp();
        assert_eq!(tunables, Tunables::default());
    }

    #[test]
    fn test_ssao_samples_clamped_to_kernel() {
        let mut tunables = Tunables::default();
        tunables.ssao.samples_used = 500;
        tunables.clamp();
        assert_eq!(tunables.ssao.samples_used, SSAO_KERNEL_SIZE as u32);
    }

    #[test]
    fn test_partial_json_keeps_other_defaults() {
        let tunables: Tunables =
            serde_json::from_str(r#"{ "bloom": { "blur_iterations": 3 } }"#).unwrap();
        assert_eq!(tunables.bloom.blur_iterations, 3);
        assert_eq!(tunables.bloom.threshold, BloomTunables::default().threshold);
        assert_eq!(tunables.shadow, ShadowTunables::default());
    }

    #[test]
    fn test_inverted_shadow_planes_repaired() {
        let mut tunables = Tunables::default();
        tunables.shadow.near = 10.0;
        tunables.shadow.far = 5.0;
        tunables.clamp();
        assert!(tunables.shadow.far > tunables.shadow.near);
    }
}
