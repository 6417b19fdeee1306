//! Config Module
//!
//! Runtime render options and numeric tunables. Settings are edited freely
//! between frames; the renderer takes one sanitized [`FrameSettings`] snapshot
//! at the start of every frame.

pub mod render_settings;
pub mod tunables;

pub use render_settings::{FrameSettings, RenderOption, RenderOptions, RenderSettings};
pub use tunables::{
    BloomTunables, EnvironmentTunables, FxaaTunables, LightingTunables, MotionBlurTunables,
    ShadowTunables, SsaoTunables, SsrTunables, ToneMapTunables, Tunables, MAX_POINT_LIGHTS,
    SSAO_KERNEL_SIZE,
};
