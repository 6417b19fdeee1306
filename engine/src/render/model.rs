//! Models
//!
//! CPU-side vertex and index data handed over by an asset loader, uploaded
//! to a [`VertexArray`] when the scene is loaded.

use std::f32::consts::PI;

use bytemuck::{Pod, Zeroable};

use super::resources::VertexArray;

/// Mesh vertex. Layout (48 bytes):
///   offset  0: position (vec3<f32>)
///   offset 12: normal   (vec3<f32>)
///   offset 24: uv       (vec2<f32>)
///   offset 32: tangent  (vec4<f32>, w = bitangent sign)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 4],
}

static_assertions::assert_eq_size!(Vertex, [u8; 48]);

impl Vertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2,
        3 => Float32x4,
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Index range drawn with one call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Submesh {
    pub first_index: u32,
    pub index_count: u32,
}

pub struct Model {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<Submesh>,
    gpu: Option<VertexArray>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("vertices", &self.vertices.len())
            .field("indices", &self.indices.len())
            .field("submeshes", &self.submeshes)
            .field("uploaded", &self.gpu.is_some())
            .finish()
    }
}

impl Model {
    /// A model with a single submesh covering every index.
    pub fn new(name: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let submeshes = vec![Submesh {
            first_index: 0,
            index_count: indices.len() as u32,
        }];
        Self::with_submeshes(name, vertices, indices, submeshes)
    }

    pub fn with_submeshes(
        name: impl Into<String>,
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
        submeshes: Vec<Submesh>,
    ) -> Self {
        Self {
            name: name.into(),
            vertices,
            indices,
            submeshes,
            gpu: None,
        }
    }

    /// Create GPU buffers. Empty models stay un-uploaded and draw nothing.
    pub fn upload(&mut self, device: &wgpu::Device) {
        if self.vertices.is_empty() || self.indices.is_empty() {
            log::warn!("[Model] '{}' has no geometry, not uploading", self.name);
            return;
        }
        self.gpu = Some(VertexArray::new(device, &self.name, &self.vertices, &self.indices));
    }

    pub fn is_uploaded(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn vertex_array(&self) -> Option<&VertexArray> {
        self.gpu.as_ref()
    }

    /// Issue one indexed draw per submesh for object `instance`. Returns the
    /// number of draw calls recorded.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, instance: u32) -> u32 {
        let Some(gpu) = &self.gpu else {
            return 0;
        };
        gpu.bind(pass);
        let mut calls = 0;
        for submesh in &self.submeshes {
            let end = (submesh.first_index + submesh.index_count).min(gpu.index_count());
            if submesh.first_index >= end {
                continue;
            }
            pass.draw_indexed(submesh.first_index..end, 0, instance..instance + 1);
            calls += 1;
        }
        calls
    }

    /// Axis-aligned cube centered at the origin.
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        // (normal, tangent, up) per face
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, tangent, up) in faces {
            let n = glam::Vec3::from(normal);
            let t = glam::Vec3::from(tangent);
            let u = glam::Vec3::from(up);
            let base = vertices.len() as u32;
            for (du, dv, uv) in [
                (-1.0, -1.0, [0.0, 1.0]),
                (1.0, -1.0, [1.0, 1.0]),
                (1.0, 1.0, [1.0, 0.0]),
                (-1.0, 1.0, [0.0, 0.0]),
            ] {
                let p = (n + t * du + u * dv) * h;
                vertices.push(Vertex {
                    position: p.to_array(),
                    normal,
                    uv,
                    tangent: [tangent[0], tangent[1], tangent[2], 1.0],
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new("Cube", vertices, indices)
    }

    /// Square in the XZ plane facing +Y.
    pub fn plane(size: f32) -> Self {
        let h = size * 0.5;
        let tiles = size.max(1.0);
        let corners = [
            ([-h, 0.0, h], [0.0, tiles]),
            ([h, 0.0, h], [tiles, tiles]),
            ([h, 0.0, -h], [tiles, 0.0]),
            ([-h, 0.0, -h], [0.0, 0.0]),
        ];
        let vertices = corners
            .iter()
            .map(|(position, uv)| Vertex {
                position: *position,
                normal: [0.0, 1.0, 0.0],
                uv: *uv,
                tangent: [1.0, 0.0, 0.0, 1.0],
            })
            .collect();
        Self::new("Plane", vertices, vec![0, 1, 2, 0, 2, 3])
    }

    /// Latitude/longitude sphere.
    pub fn uv_sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let theta = v * PI;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let phi = u * 2.0 * PI;
                let normal = glam::Vec3::new(theta.sin() * phi.cos(), theta.cos(), -theta.sin() * phi.sin());
                let tangent = glam::Vec3::new(-phi.sin(), 0.0, -phi.cos());
                vertices.push(Vertex {
                    position: (normal * radius).to_array(),
                    normal: normal.to_array(),
                    uv: [u, v],
                    tangent: [tangent.x, tangent.y, tangent.z, 1.0],
                });
            }
        }

        let stride = segments + 1;
        let mut indices = Vec::with_capacity((segments * rings * 6) as usize);
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        Self::new("Sphere", vertices, indices)
    }
}
