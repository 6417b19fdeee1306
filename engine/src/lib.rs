//! Lumen Engine Library
//!
//! A multi-pass wgpu renderer: shadow maps, forward and deferred shading,
//! image-based lighting baked per reflective object, SSAO, screen-space
//! reflections and a post-processing chain (motion blur, bloom, tone
//! mapping, FXAA).
//!
//! # Modules
//!
//! - [`scene`] - Entities, components and the per-frame scene snapshot
//! - [`render`] - GPU resources, shader registry, frame passes and the [`Renderer`]
//! - [`config`] - Render options and tunables, loadable from JSON
//! - [`logging`] - `env_logger` setup for binaries and tests
//! - [`error`] - [`RenderError`] and the crate `Result` alias
//!
//! # Example
//!
//! ```ignore
//! use lumen_engine::{GpuContext, GpuContextConfig, Renderer, RenderSettings};
//!
//! let ctx = GpuContext::new(window, GpuContextConfig::default())?;
//! let mut renderer = Renderer::new(&ctx, RenderSettings::default(), "shaders");
//! renderer.load_scene(&ctx, &mut scene);
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod render;
pub mod scene;

pub use config::{FrameSettings, RenderOption, RenderSettings, Tunables};
pub use error::{RenderError, Result};
pub use logging::{LoggingConfig, init_logging};
pub use render::*;
pub use scene::{Entity, EntityId, SceneSnapshot};
