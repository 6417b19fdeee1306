//! Bind Group Layouts
//!
//! Fixed binding slots shared by every program:
//!   group 0: camera block (dynamic offset) + per-object storage array
//!   group 1: per-frame scalars and tunables
//!   group 2: light storage array, light header, shadow maps, IBL maps
//!   group 3: pass or material specific
//!
//! Shadow passes and cubemap conversions bind [`BindGroupLayouts::empty`]
//! at index 2 because they write textures that group 2 samples.

use super::lights::{GpuLight, LightingUniforms, LIGHT_BUFFER_CAPACITY, MAX_POINT_SHADOWS};
use super::resources::{StorageBuffer, UniformBuffer};
use super::uniforms::{CameraUniforms, FrameUniforms, ObjectData, CAMERA_SLOT_STRIDE};

const VS_FS: wgpu::ShaderStages = wgpu::ShaderStages::VERTEX_FRAGMENT;
const FS: wgpu::ShaderStages = wgpu::ShaderStages::FRAGMENT;

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages, dynamic: bool, size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: wgpu::BufferSize::new(size),
        },
        count: None,
    }
}

fn storage_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(
    binding: u32,
    view_dimension: wgpu::TextureViewDimension,
    sample_type: wgpu::TextureSampleType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: FS,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn float_2d(binding: u32) -> wgpu::BindGroupLayoutEntry {
    texture_entry(
        binding,
        wgpu::TextureViewDimension::D2,
        wgpu::TextureSampleType::Float { filterable: true },
    )
}

fn float_cube(binding: u32) -> wgpu::BindGroupLayoutEntry {
    texture_entry(
        binding,
        wgpu::TextureViewDimension::Cube,
        wgpu::TextureSampleType::Float { filterable: true },
    )
}

fn sampler_entry(binding: u32, ty: wgpu::SamplerBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: FS,
        ty: wgpu::BindingType::Sampler(ty),
        count: None,
    }
}

fn layout(device: &wgpu::Device, label: &str, entries: &[wgpu::BindGroupLayoutEntry]) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries,
    })
}

/// Expected entries of the camera layout, shared with the WGSL in
/// `common/camera.wgsl`.
pub fn camera_entries() -> [wgpu::BindGroupLayoutEntry; 2] {
    [
        uniform_entry(0, VS_FS, true, std::mem::size_of::<CameraUniforms>() as u64),
        storage_entry(1, VS_FS),
    ]
}

/// The depth buffer read back by post-processing. Bound as unfilterable
/// float rather than `Depth` so the shader can `textureLoad` it without a
/// comparison sampler, which GLSL backends require for depth textures.
pub fn scene_depth_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    texture_entry(
        binding,
        wgpu::TextureViewDimension::D2,
        wgpu::TextureSampleType::Float { filterable: false },
    )
}

pub fn lights_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = vec![
        storage_entry(0, FS),
        uniform_entry(1, FS, false, std::mem::size_of::<LightingUniforms>() as u64),
        texture_entry(2, wgpu::TextureViewDimension::D2, wgpu::TextureSampleType::Depth),
    ];
    for i in 0..MAX_POINT_SHADOWS as u32 {
        entries.push(texture_entry(
            3 + i,
            wgpu::TextureViewDimension::Cube,
            wgpu::TextureSampleType::Depth,
        ));
    }
    entries.extend([
        sampler_entry(7, wgpu::SamplerBindingType::Comparison),
        float_cube(8),
        float_cube(9),
        float_2d(10),
        sampler_entry(11, wgpu::SamplerBindingType::Filtering),
    ]);
    entries
}

pub struct BindGroupLayouts {
    pub camera: wgpu::BindGroupLayout,
    pub frame: wgpu::BindGroupLayout,
    pub lights: wgpu::BindGroupLayout,
    pub empty: wgpu::BindGroupLayout,
    pub material_color: wgpu::BindGroupLayout,
    pub material_texture: wgpu::BindGroupLayout,
    pub material_pbr: wgpu::BindGroupLayout,
    pub skybox: wgpu::BindGroupLayout,
    pub env_equirect: wgpu::BindGroupLayout,
    pub env_cube: wgpu::BindGroupLayout,
    pub ssao: wgpu::BindGroupLayout,
    pub lighting: wgpu::BindGroupLayout,
    pub reflections: wgpu::BindGroupLayout,
    pub post: wgpu::BindGroupLayout,
    pub post_depth: wgpu::BindGroupLayout,
    pub post_bloom: wgpu::BindGroupLayout,
}

impl BindGroupLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let filtering = wgpu::SamplerBindingType::Filtering;
        let material_size = std::mem::size_of::<super::uniforms::MaterialParams>() as u64;
        let env_size = std::mem::size_of::<super::uniforms::EnvParams>() as u64;
        let pass_size = std::mem::size_of::<super::uniforms::PassParams>() as u64;
        let kernel_size = std::mem::size_of::<super::uniforms::SsaoKernel>() as u64;

        let mut texture_material = vec![uniform_entry(0, VS_FS, false, material_size)];
        texture_material.extend((1..=6).map(float_2d));
        texture_material.push(sampler_entry(7, filtering));

        let mut pbr_material = vec![uniform_entry(0, VS_FS, false, material_size)];
        pbr_material.extend((1..=5).map(float_2d));
        pbr_material.push(sampler_entry(6, filtering));

        let post = [
            float_2d(0),
            sampler_entry(1, filtering),
            uniform_entry(2, FS, false, pass_size),
        ];

        Self {
            camera: layout(device, "Camera Layout", &camera_entries()),
            frame: layout(
                device,
                "Frame Layout",
                &[uniform_entry(0, VS_FS, false, std::mem::size_of::<FrameUniforms>() as u64)],
            ),
            lights: layout(device, "Lights Layout", &lights_entries()),
            empty: layout(device, "Empty Layout", &[]),
            material_color: layout(
                device,
                "Color Material Layout",
                &[uniform_entry(0, VS_FS, false, material_size)],
            ),
            material_texture: layout(device, "Texture Material Layout", &texture_material),
            material_pbr: layout(device, "PBR Material Layout", &pbr_material),
            skybox: layout(device, "Skybox Layout", &[float_cube(0), sampler_entry(1, filtering)]),
            env_equirect: layout(
                device,
                "Equirect Source Layout",
                &[
                    uniform_entry(0, FS, false, env_size),
                    texture_entry(
                        1,
                        wgpu::TextureViewDimension::D2,
                        wgpu::TextureSampleType::Float { filterable: false },
                    ),
                    sampler_entry(2, wgpu::SamplerBindingType::NonFiltering),
                ],
            ),
            env_cube: layout(
                device,
                "Cube Source Layout",
                &[
                    uniform_entry(0, FS, false, env_size),
                    float_cube(1),
                    sampler_entry(2, filtering),
                ],
            ),
            ssao: layout(
                device,
                "SSAO Layout",
                &[
                    float_2d(0),
                    float_2d(1),
                    float_2d(2),
                    sampler_entry(3, filtering),
                    uniform_entry(4, FS, false, kernel_size),
                ],
            ),
            lighting: layout(
                device,
                "Deferred Lighting Layout",
                &[
                    float_2d(0),
                    float_2d(1),
                    float_2d(2),
                    float_2d(3),
                    float_2d(4),
                    sampler_entry(5, filtering),
                ],
            ),
            reflections: layout(
                device,
                "Reflections Layout",
                &[
                    float_2d(0),
                    float_2d(1),
                    float_2d(2),
                    float_2d(3),
                    sampler_entry(4, filtering),
                ],
            ),
            post: layout(device, "Post Layout", &post),
            post_depth: layout(
                device,
                "Post Depth Layout",
                &[
                    post[0],
                    post[1],
                    post[2],
                    scene_depth_entry(3),
                ],
            ),
            post_bloom: layout(device, "Post Bloom Layout", &[post[0], post[1], post[2], float_2d(3)]),
        }
    }
}

/// Group 0: camera slots addressed by dynamic offset plus the object array.
pub struct CameraBindings {
    buffer: wgpu::Buffer,
    slots: u32,
    objects: StorageBuffer<ObjectData>,
    bind_group: wgpu::BindGroup,
    label: String,
}

impl CameraBindings {
    pub fn new(device: &wgpu::Device, layouts: &BindGroupLayouts, label: &str, slots: u32, objects: usize) -> Self {
        let slots = slots.max(1);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} Camera Slots")),
            size: CAMERA_SLOT_STRIDE * slots as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let objects = StorageBuffer::new(device, &format!("{label} Objects"), objects);
        let bind_group = Self::create_bind_group(device, layouts, label, &buffer, &objects);
        Self {
            buffer,
            slots,
            objects,
            bind_group,
            label: label.to_string(),
        }
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layouts: &BindGroupLayouts,
        label: &str,
        buffer: &wgpu::Buffer,
        objects: &StorageBuffer<ObjectData>,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label} Camera Bind Group")),
            layout: &layouts.camera,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(std::mem::size_of::<CameraUniforms>() as u64),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: objects.binding(),
                },
            ],
        })
    }

    pub fn slots(&self) -> u32 {
        self.slots
    }

    /// Dynamic offset of `slot`.
    pub fn offset(&self, slot: u32) -> u32 {
        (slot.min(self.slots - 1) as u64 * CAMERA_SLOT_STRIDE) as u32
    }

    pub fn write_slot(&self, queue: &wgpu::Queue, slot: u32, camera: &CameraUniforms) {
        if slot >= self.slots {
            log::error!("[CameraBindings] slot {slot} out of range ({})", self.slots);
            return;
        }
        queue.write_buffer(&self.buffer, slot as u64 * CAMERA_SLOT_STRIDE, bytemuck::bytes_of(camera));
    }

    /// Upload per-object data, growing the array when needed.
    pub fn write_objects(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, layouts: &BindGroupLayouts, objects: &[ObjectData]) {
        if objects.len() > self.objects.capacity() {
            let capacity = objects.len().next_power_of_two();
            log::debug!("[CameraBindings] growing object array to {capacity}");
            self.objects = StorageBuffer::new(device, &format!("{} Objects", self.label), capacity);
            self.bind_group = Self::create_bind_group(device, layouts, &self.label, &self.buffer, &self.objects);
        }
        self.objects.write(queue, objects);
    }

    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>, slot: u32) {
        pass.set_bind_group(0, &self.bind_group, &[self.offset(slot)]);
    }
}

/// Group 1: the per-frame scalar block.
pub struct FrameBindings {
    pub uniforms: UniformBuffer<FrameUniforms>,
    pub bind_group: wgpu::BindGroup,
}

impl FrameBindings {
    pub fn new(device: &wgpu::Device, layouts: &BindGroupLayouts, initial: &FrameUniforms) -> Self {
        let uniforms = UniformBuffer::new(device, "Frame Uniforms", initial);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &layouts.frame,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.binding(),
            }],
        });
        Self { uniforms, bind_group }
    }
}

/// Views bound in group 2 besides the light buffers.
pub struct LightViews<'a> {
    pub directional_shadow: &'a wgpu::TextureView,
    pub point_shadows: [&'a wgpu::TextureView; MAX_POINT_SHADOWS],
    pub irradiance: &'a wgpu::TextureView,
    pub prefilter: &'a wgpu::TextureView,
    pub brdf_lut: &'a wgpu::TextureView,
}

/// Group 2 buffers. Bind groups are built per IBL source (the sky, or one
/// reflective object) and rebuilt when shadow or IBL textures change.
pub struct LightBindings {
    pub lights: StorageBuffer<GpuLight>,
    pub header: UniformBuffer<LightingUniforms>,
    pub shadow_sampler: wgpu::Sampler,
    pub env_sampler: wgpu::Sampler,
}

impl LightBindings {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            lights: StorageBuffer::new(device, "Light Storage", LIGHT_BUFFER_CAPACITY),
            header: UniformBuffer::new(device, "Lighting Uniforms", &LightingUniforms::default()),
            shadow_sampler: device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("Shadow Comparison Sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                mipmap_filter: wgpu::FilterMode::Nearest,
                compare: Some(wgpu::CompareFunction::LessEqual),
                ..Default::default()
            }),
            env_sampler: device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("Environment Sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                mipmap_filter: wgpu::FilterMode::Linear,
                ..Default::default()
            }),
        }
    }

    pub fn bind_group(&self, device: &wgpu::Device, layouts: &BindGroupLayouts, label: &str, views: &LightViews<'_>) -> wgpu::BindGroup {
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: self.lights.binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: self.header.binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(views.directional_shadow),
            },
        ];
        for (i, view) in views.point_shadows.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 3 + i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        entries.extend([
            wgpu::BindGroupEntry {
                binding: 7,
                resource: wgpu::BindingResource::Sampler(&self.shadow_sampler),
            },
            wgpu::BindGroupEntry {
                binding: 8,
                resource: wgpu::BindingResource::TextureView(views.irradiance),
            },
            wgpu::BindGroupEntry {
                binding: 9,
                resource: wgpu::BindingResource::TextureView(views.prefilter),
            },
            wgpu::BindGroupEntry {
                binding: 10,
                resource: wgpu::BindingResource::TextureView(views.brdf_lut),
            },
            wgpu::BindGroupEntry {
                binding: 11,
                resource: wgpu::BindingResource::Sampler(&self.env_sampler),
            },
        ]);
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &layouts.lights,
            entries: &entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_block_fits_slot() {
        assert!(std::mem::size_of::<CameraUniforms>() as u64 <= CAMERA_SLOT_STRIDE);
        assert_eq!(CAMERA_SLOT_STRIDE % 256, 0);
    }

    #[test]
    fn test_lights_layout_bindings_are_dense() {
        let bindings: Vec<u32> = lights_entries().iter().map(|e| e.binding).collect();
        assert_eq!(bindings, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_scene_depth_is_unfilterable_float() {
        match scene_depth_entry(3).ty {
            wgpu::BindingType::Texture { sample_type, view_dimension, .. } => {
                assert_eq!(sample_type, wgpu::TextureSampleType::Float { filterable: false });
                assert_eq!(view_dimension, wgpu::TextureViewDimension::D2);
            }
            _ => panic!("scene depth binding must be a texture"),
        }
    }

    #[test]
    fn test_camera_uses_dynamic_offset() {
        match camera_entries()[0].ty {
            wgpu::BindingType::Buffer { has_dynamic_offset, .. } => assert!(has_dynamic_offset),
            _ => panic!("camera binding must be a buffer"),
        }
    }
}
