//! GPU Context
//!
//! Owns the device, queue and (for windowed use) the surface. Headless
//! contexts have no surface and are used by tests and offline bakes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use winit::window::Window;

use crate::error::{RenderError, Result};

/// Format used for headless output.
pub const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Configuration for GPU context creation
#[derive(Clone, Debug)]
pub struct GpuContextConfig {
    /// Use VSync (true = capped to monitor refresh, false = uncapped FPS)
    pub vsync: bool,
    /// Prefer high-performance GPU
    pub high_performance: bool,
    /// Request timestamp queries when the adapter has them
    pub timestamps: bool,
    /// Output size of a headless context
    pub headless_size: (u32, u32),
}

impl Default for GpuContextConfig {
    fn default() -> Self {
        Self {
            vsync: false,
            high_performance: true,
            timestamps: cfg!(debug_assertions),
            headless_size: (256, 256),
        }
    }
}

pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    surface: Option<wgpu::Surface<'static>>,
    surface_config: wgpu::SurfaceConfiguration,
    timestamps: bool,
    adapter_info: wgpu::AdapterInfo,
    uncaptured_errors: Arc<AtomicU32>,
}

impl GpuContext {
    /// Create a context presenting to `window`.
    pub fn new(window: Arc<Window>, config: GpuContextConfig) -> Result<Self> {
        let size = window.inner_size();
        let instance = create_instance();
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|e| RenderError::SurfaceCreation(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: power_preference(&config),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| RenderError::AdapterUnavailable(e.to_string()))?;

        let (device, queue, timestamps) = request_device(&adapter, &config)?;
        let uncaptured_errors = log_uncaptured_errors(&device);

        let caps = surface.get_capabilities(&adapter);
        // gamma is applied by the tone map pass, so prefer a linear format
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| RenderError::SurfaceCreation("surface reports no formats".into()))?;

        let present_mode = if config.vsync {
            wgpu::PresentMode::AutoVsync
        } else if caps.present_modes.contains(&wgpu::PresentMode::Immediate) {
            wgpu::PresentMode::Immediate
        } else if caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
            wgpu::PresentMode::Mailbox
        } else {
            wgpu::PresentMode::AutoVsync
        };

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let adapter_info = adapter.get_info();
        log::info!(
            "[GpuContext] {} ({:?}), surface {:?} {}x{}",
            adapter_info.name,
            adapter_info.backend,
            format,
            surface_config.width,
            surface_config.height
        );

        Ok(Self {
            device,
            queue,
            surface: Some(surface),
            surface_config,
            timestamps,
            adapter_info,
            uncaptured_errors,
        })
    }

    /// Create a context without a window. Falls back to a software adapter
    /// when no hardware adapter is available.
    pub fn headless(config: GpuContextConfig) -> Result<Self> {
        let instance = create_instance();
        let hardware = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: power_preference(&config),
            compatible_surface: None,
            force_fallback_adapter: false,
        }));
        let adapter = match hardware {
            Ok(adapter) => adapter,
            Err(err) => {
                log::debug!("[GpuContext] no hardware adapter ({err}), trying fallback");
                pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::LowPower,
                    compatible_surface: None,
                    force_fallback_adapter: true,
                }))
                .map_err(|e| RenderError::AdapterUnavailable(e.to_string()))?
            }
        };

        let (device, queue, timestamps) = request_device(&adapter, &config)?;
        let uncaptured_errors = log_uncaptured_errors(&device);
        let (width, height) = config.headless_size;
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: HEADLESS_FORMAT,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        let adapter_info = adapter.get_info();
        log::info!(
            "[GpuContext] headless on {} ({:?}) {}x{}",
            adapter_info.name,
            adapter_info.backend,
            surface_config.width,
            surface_config.height
        );

        Ok(Self {
            device,
            queue,
            surface: None,
            surface_config,
            timestamps,
            adapter_info,
            uncaptured_errors,
        })
    }

    /// Handle window resize
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.surface_config);
        }
    }

    /// Get current output dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    /// Get output format
    pub fn format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    pub fn is_headless(&self) -> bool {
        self.surface.is_none()
    }

    pub fn timestamps_supported(&self) -> bool {
        self.timestamps
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Device errors raised outside any error scope since creation.
    pub fn uncaptured_error_count(&self) -> u32 {
        self.uncaptured_errors.load(Ordering::Relaxed)
    }

    /// Next surface texture. Headless contexts have none.
    pub fn acquire_frame(&self) -> std::result::Result<wgpu::SurfaceTexture, wgpu::SurfaceError> {
        match &self.surface {
            Some(surface) => surface.get_current_texture(),
            None => Err(wgpu::SurfaceError::Lost),
        }
    }

    /// Reconfigure after `SurfaceError::Lost` or `Outdated`.
    pub fn reconfigure(&self) {
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.surface_config);
        }
    }

    pub fn create_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    pub fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

/// Replace wgpu's panicking default handler: errors that escape the
/// registry's error scopes are logged and counted.
fn log_uncaptured_errors(device: &wgpu::Device) -> Arc<AtomicU32> {
    let count = Arc::new(AtomicU32::new(0));
    let handler_count = Arc::clone(&count);
    device.on_uncaptured_error(Arc::new(move |err: wgpu::Error| {
        handler_count.fetch_add(1, Ordering::Relaxed);
        log::error!("[GpuContext] uncaptured device error: {err}");
    }));
    count
}

fn power_preference(config: &GpuContextConfig) -> wgpu::PowerPreference {
    if config.high_performance {
        wgpu::PowerPreference::HighPerformance
    } else {
        wgpu::PowerPreference::LowPower
    }
}

fn request_device(
    adapter: &wgpu::Adapter,
    config: &GpuContextConfig,
) -> Result<(wgpu::Device, wgpu::Queue, bool)> {
    let timestamps = config.timestamps && adapter.features().contains(wgpu::Features::TIMESTAMP_QUERY);
    let required_features = if timestamps {
        wgpu::Features::TIMESTAMP_QUERY
    } else {
        wgpu::Features::empty()
    };
    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("Lumen Device"),
        required_features,
        required_limits: wgpu::Limits::default(),
        memory_hints: wgpu::MemoryHints::Performance,
        ..Default::default()
    }))
    .map_err(|e| RenderError::DeviceCreation(e.to_string()))?;
    Ok((device, queue, timestamps))
}
