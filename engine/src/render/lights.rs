//! Light Upload
//!
//! Converts scene lights into the fixed-layout records of the group 2
//! light storage buffer. Only the N point lights closest to the camera are
//! uploaded each frame; ties keep their input order.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::config::{FrameSettings, ShadowTunables};
use crate::scene::{Entity, EntityId, LightComponent, LightKind};

/// Spot lights beyond this count are dropped (in input order).
pub const MAX_SPOT_LIGHTS: usize = 16;

/// Point lights that can own a cube shadow map in one frame.
pub const MAX_POINT_SHADOWS: usize = 4;

/// Capacity of the light storage buffer.
pub const LIGHT_BUFFER_CAPACITY: usize = crate::config::MAX_POINT_LIGHTS + MAX_SPOT_LIGHTS;

pub const LIGHT_KIND_DIRECTIONAL: f32 = 0.0;
pub const LIGHT_KIND_POINT: f32 = 1.0;
pub const LIGHT_KIND_SPOT: f32 = 2.0;

/// GPU-side light record.
///
/// Layout (96 bytes):
///   offset  0: position  (vec4<f32>, w = kind)
///   offset 16: direction (vec4<f32>, w = point shadow slot or -1)
///   offset 32: ambient   (vec4<f32>, w = constant attenuation)
///   offset 48: diffuse   (vec4<f32>, w = linear attenuation)
///   offset 64: specular  (vec4<f32>, w = quadratic attenuation)
///   offset 80: cutoff    (vec2<f32>, inner / outer cosine)
///   offset 88: _padding  (vec2<f32>)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    pub position: [f32; 4],
    pub direction: [f32; 4],
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub cutoff: [f32; 2],
    pub _padding: [f32; 2],
}

const _: () = {
    assert!(
        std::mem::size_of::<GpuLight>() == 96,
        "GpuLight must be exactly 96 bytes for GPU compatibility"
    );
};

impl GpuLight {
    /// Record for a point or spot light at `position`. Directional lights go
    /// through [`LightingUniforms`] instead.
    pub fn from_component(light: &LightComponent, position: Vec3, shadow_slot: Option<usize>) -> Self {
        let slot = shadow_slot.map_or(-1.0, |s| s as f32);
        let (kind, direction, attenuation, cutoff) = match light.kind {
            LightKind::Directional { direction } => {
                (LIGHT_KIND_DIRECTIONAL, direction, Default::default(), [1.0, 1.0])
            }
            LightKind::Point { attenuation } => (LIGHT_KIND_POINT, Vec3::ZERO, attenuation, [1.0, 1.0]),
            LightKind::Spot {
                direction,
                attenuation,
                inner_cutoff,
                outer_cutoff,
            } => (LIGHT_KIND_SPOT, direction, attenuation, [inner_cutoff, outer_cutoff]),
        };
        Self {
            position: [position.x, position.y, position.z, kind],
            direction: [direction.x, direction.y, direction.z, slot],
            ambient: light.ambient.extend(attenuation.constant).to_array(),
            diffuse: light.diffuse.extend(attenuation.linear).to_array(),
            specular: light.specular.extend(attenuation.quadratic).to_array(),
            cutoff,
            _padding: [0.0; 2],
        }
    }

    pub fn world_position(&self) -> Vec3 {
        Vec3::new(self.position[0], self.position[1], self.position[2])
    }
}

/// Header block (group 2, binding 1).
///
/// Layout (240 bytes):
///   offset   0: dir_direction (vec4<f32>, w = 1 when a directional light exists)
///   offset  16: dir_ambient   (vec4<f32>)
///   offset  32: dir_diffuse   (vec4<f32>)
///   offset  48: dir_specular  (vec4<f32>)
///   offset  64: light_space   (mat4x4<f32>)
///   offset 128: point_shadows (array<vec4<f32>, 4>, xyz position, w = 1 if used)
///   offset 192: counts        (vec4<u32>, points / spots / point shadows / total)
///   offset 208: flags         (vec4<u32>, shadows / lighting / ibl / pbr)
///   offset 224: ambient       (vec4<f32>, x = ambient floor, y = 1 when the
///                              directional shadow map holds valid depth)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct LightingUniforms {
    pub dir_direction: [f32; 4],
    pub dir_ambient: [f32; 4],
    pub dir_diffuse: [f32; 4],
    pub dir_specular: [f32; 4],
    pub light_space: [[f32; 4]; 4],
    pub point_shadows: [[f32; 4]; MAX_POINT_SHADOWS],
    pub counts: [u32; 4],
    pub flags: [u32; 4],
    pub ambient: [f32; 4],
}

static_assertions::assert_eq_size!(LightingUniforms, [u8; 240]);

impl Default for LightingUniforms {
    fn default() -> Self {
        let mut uniforms = Self::zeroed();
        uniforms.light_space = Mat4::IDENTITY.to_cols_array_2d();
        uniforms
    }
}

impl LightingUniforms {
    pub fn shadows_enabled(&self) -> bool {
        self.flags[0] != 0
    }
}

/// Indices of the `n` positions closest to `camera`, nearest first. Equal
/// distances keep their input order.
pub fn select_closest_point_lights(camera: Vec3, positions: &[Vec3], n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..positions.len()).collect();
    // sort_by is stable, so ties keep input order
    order.sort_by(|a, b| {
        let da = positions[*a].distance_squared(camera);
        let db = positions[*b].distance_squared(camera);
        da.total_cmp(&db)
    });
    order.truncate(n);
    order
}

/// Orthographic light-space matrix for the directional shadow map.
pub fn directional_light_space(direction: Vec3, tunables: &ShadowTunables) -> Mat4 {
    let dir = direction.normalize_or(Vec3::NEG_Y);
    let eye = -dir * tunables.light_offset;
    let up = if dir.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let view = Mat4::look_at_rh(eye, Vec3::ZERO, up);
    let s = tunables.projection_size;
    let proj = Mat4::orthographic_rh(-s, s, -s, s, tunables.near, tunables.far);
    proj * view
}

/// The exact set of light records uploaded for one frame.
#[derive(Clone, Debug, Default)]
pub struct LightUpload {
    /// Point lights (closest first) followed by spot lights
    pub records: Vec<GpuLight>,
    /// Entity of each record, same order
    pub entities: Vec<EntityId>,
    pub point_count: usize,
    pub spot_count: usize,
    /// Point lights that get a cube shadow map, by record index
    pub point_shadows: Vec<usize>,
    pub uniforms: LightingUniforms,
}

impl LightUpload {
    /// Select and pack lights. `lights` are entities with a light component
    /// and a transform; directional lights among them are ignored (the
    /// directional light is passed separately).
    pub fn build(
        settings: &FrameSettings,
        camera: Vec3,
        lights: &[&Entity],
        directional: Option<&Entity>,
    ) -> Self {
        let mut upload = Self::default();
        let lighting = settings.lighting();
        let shadows = settings.shadows();

        if lighting {
            let points: Vec<(&Entity, &LightComponent)> = lights
                .iter()
                .filter_map(|e| e.light().filter(|l| l.is_point()).map(|l| (*e, l)))
                .collect();
            let positions: Vec<Vec3> = points.iter().map(|(e, _)| e.world_position()).collect();
            let max_points = settings.tunables.lighting.max_point_lights;
            let selected = select_closest_point_lights(camera, &positions, max_points);
            if points.len() > selected.len() {
                log::trace!(
                    "[Lights] {} point lights, uploading closest {}",
                    points.len(),
                    selected.len()
                );
            }

            for index in selected {
                let (entity, light) = points[index];
                let slot = (shadows && light.casts_shadows && upload.point_shadows.len() < MAX_POINT_SHADOWS)
                    .then(|| upload.point_shadows.len());
                if let Some(slot) = slot {
                    upload.point_shadows.push(upload.records.len());
                    upload.uniforms.point_shadows[slot] = positions[index].extend(1.0).to_array();
                }
                upload.records.push(GpuLight::from_component(light, positions[index], slot));
                upload.entities.push(entity.id());
            }
            upload.point_count = upload.records.len();

            for entity in lights {
                let Some(light) = entity.light().filter(|l| l.is_spot()) else {
                    continue;
                };
                if upload.spot_count == MAX_SPOT_LIGHTS {
                    log::warn!("[Lights] more than {MAX_SPOT_LIGHTS} spot lights, dropping the rest");
                    break;
                }
                upload.records.push(GpuLight::from_component(light, entity.world_position(), None));
                upload.entities.push(entity.id());
                upload.spot_count += 1;
            }
        }

        let u = &mut upload.uniforms;
        if let Some(light) = directional.and_then(Entity::light).filter(|_| lighting) {
            if let LightKind::Directional { direction } = light.kind {
                u.dir_direction = direction.extend(1.0).to_array();
                u.dir_ambient = light.ambient.extend(0.0).to_array();
                u.dir_diffuse = light.diffuse.extend(0.0).to_array();
                u.dir_specular = light.specular.extend(0.0).to_array();
                u.light_space = directional_light_space(direction, &settings.tunables.shadow).to_cols_array_2d();
            }
        }
        u.counts = [
            upload.point_count as u32,
            upload.spot_count as u32,
            upload.point_shadows.len() as u32,
            upload.records.len() as u32,
        ];
        u.flags = [
            shadows as u32,
            lighting as u32,
            0,
            settings.is_enabled(crate::config::RenderOption::Pbr) as u32,
        ];
        u.ambient = [settings.tunables.lighting.ambient_floor, 0.0, 0.0, 0.0];
        upload
    }

    pub fn has_directional(&self) -> bool {
        self.uniforms.dir_direction[3] != 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_light_size() {
        assert_eq!(std::mem::size_of::<GpuLight>(), 96);
        assert_eq!(std::mem::align_of::<GpuLight>(), 4);
    }

    #[test]
    fn test_closest_selection_and_ties() {
        let positions = [
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 3.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 3.0),
        ];
        assert_eq!(select_closest_point_lights(Vec3::ZERO, &positions, 4), vec![1, 3, 2, 4]);
        assert_eq!(select_closest_point_lights(Vec3::ZERO, &positions, 10).len(), 5);
        assert!(select_closest_point_lights(Vec3::ZERO, &positions, 0).is_empty());
    }

    #[test]
    fn test_attenuation_packed_in_w() {
        let light = LightComponent::point(Vec3::ONE, crate::scene::Attenuation {
            constant: 1.0,
            linear: 0.5,
            quadratic: 0.25,
        });
        let record = GpuLight::from_component(&light, Vec3::new(1.0, 2.0, 3.0), Some(2));
        assert_eq!(record.ambient[3], 1.0);
        assert_eq!(record.diffuse[3], 0.5);
        assert_eq!(record.specular[3], 0.25);
        assert_eq!(record.direction[3], 2.0);
        assert_eq!(record.position[3], LIGHT_KIND_POINT);
    }

    #[test]
    fn test_light_space_maps_origin_inside_clip() {
        let m = directional_light_space(Vec3::new(1.0, -2.0, -1.0), &ShadowTunables::default());
        let clip = m.project_point3(Vec3::ZERO);
        assert!(clip.x.abs() <= 1.0 && clip.y.abs() <= 1.0);
        assert!((0.0..=1.0).contains(&clip.z));
    }
}
