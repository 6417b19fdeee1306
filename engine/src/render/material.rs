//! Materials
//!
//! A material is one of three families (flat color, classic textured, PBR)
//! plus a blend mode and a shadow flag. Every material of a family shares
//! the family's program for a given pass; only its parameter block and
//! textures differ. Texture data arrives decoded from the asset loader and
//! is uploaded in [`Material::upload`]; the material owns the resulting GPU
//! textures and drops them with itself.

use glam::{Vec3, Vec4};

use super::layouts::BindGroupLayouts;
use super::resources::texture::repeat_sampler;
use super::resources::{Texture, TextureData, UniformBuffer};
use super::shader_registry::{BlendVariant, ProgramKey, ProgramKind};
use super::uniforms::{MaterialParams, SHADING_PBR, SHADING_PHONG};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    Opaque,
    /// Opaque with fragments below the alpha cutoff discarded
    Cutout,
    Transparent,
    Additive,
}

impl BlendMode {
    /// Drawn in the blend pass after all solid geometry.
    pub fn is_blended(self) -> bool {
        matches!(self, BlendMode::Transparent | BlendMode::Additive)
    }

    fn index(self) -> u32 {
        match self {
            BlendMode::Opaque => 0,
            BlendMode::Cutout => 1,
            BlendMode::Transparent => 2,
            BlendMode::Additive => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaterialFamily {
    Color,
    Textured,
    Pbr,
}

/// Which draw a material is asked to take part in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaterialPass {
    /// Depth only, for shadow maps
    Simple,
    /// Lit directly into the HDR target
    Forward,
    /// Written into the G-buffer
    Deferred,
}

#[derive(Clone, Debug)]
pub struct ColorMaterial {
    pub color: Vec4,
    pub emission: Vec3,
    pub specular: Vec3,
    pub shininess: f32,
}

impl Default for ColorMaterial {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            emission: Vec3::ZERO,
            specular: Vec3::splat(0.5),
            shininess: 32.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TextureMaterial {
    pub diffuse: Option<TextureData>,
    pub specular: Option<TextureData>,
    pub normal: Option<TextureData>,
    pub emission: Option<TextureData>,
    pub height: Option<TextureData>,
    pub reflection: Option<TextureData>,
    pub tint: Vec4,
    pub shininess: f32,
    pub height_scale: f32,
    /// Mix factor for the baked environment on reflective objects
    pub reflectivity: f32,
}

impl Default for TextureMaterial {
    fn default() -> Self {
        Self {
            diffuse: None,
            specular: None,
            normal: None,
            emission: None,
            height: None,
            reflection: None,
            tint: Vec4::ONE,
            shininess: 32.0,
            height_scale: 0.05,
            reflectivity: 0.0,
        }
    }
}

impl TextureMaterial {
    fn slots(&self) -> [(&'static str, Option<&TextureData>, [u8; 4]); 6] {
        [
            ("diffuse", self.diffuse.as_ref(), WHITE),
            ("specular", self.specular.as_ref(), WHITE),
            ("normal", self.normal.as_ref(), FLAT_NORMAL),
            ("emission", self.emission.as_ref(), BLACK),
            ("height", self.height.as_ref(), BLACK),
            ("reflection", self.reflection.as_ref(), BLACK),
        ]
    }
}

#[derive(Clone, Debug)]
pub struct PbrMaterial {
    pub albedo: Option<TextureData>,
    pub normal: Option<TextureData>,
    pub metallic: Option<TextureData>,
    pub roughness: Option<TextureData>,
    pub ao: Option<TextureData>,
    pub albedo_factor: Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub ao_factor: f32,
    pub emission: Vec3,
}

impl Default for PbrMaterial {
    fn default() -> Self {
        Self {
            albedo: None,
            normal: None,
            metallic: None,
            roughness: None,
            ao: None,
            albedo_factor: Vec4::ONE,
            metallic_factor: 0.0,
            roughness_factor: 0.5,
            ao_factor: 1.0,
            emission: Vec3::ZERO,
        }
    }
}

impl PbrMaterial {
    fn slots(&self) -> [(&'static str, Option<&TextureData>, [u8; 4]); 5] {
        [
            ("albedo", self.albedo.as_ref(), WHITE),
            ("normal", self.normal.as_ref(), FLAT_NORMAL),
            ("metallic", self.metallic.as_ref(), WHITE),
            ("roughness", self.roughness.as_ref(), WHITE),
            ("ao", self.ao.as_ref(), WHITE),
        ]
    }
}

const WHITE: [u8; 4] = [255, 255, 255, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];
const FLAT_NORMAL: [u8; 4] = [128, 128, 255, 255];

#[derive(Clone, Debug)]
pub enum MaterialKind {
    Color(ColorMaterial),
    Textured(TextureMaterial),
    Pbr(PbrMaterial),
}

/// GPU side of an uploaded material.
struct MaterialGpu {
    /// Slot textures in binding order; placeholders fill empty slots
    textures: Vec<Texture>,
    params: UniformBuffer<MaterialParams>,
    bind_group: wgpu::BindGroup,
}

pub struct Material {
    pub name: String,
    pub kind: MaterialKind,
    pub blend: BlendMode,
    pub casts_shadows: bool,
    pub alpha_cutoff: f32,
    gpu: Option<MaterialGpu>,
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("name", &self.name)
            .field("family", &self.family())
            .field("blend", &self.blend)
            .field("casts_shadows", &self.casts_shadows)
            .field("uploaded", &self.gpu.is_some())
            .finish()
    }
}

impl Material {
    pub fn new(name: impl Into<String>, kind: MaterialKind) -> Self {
        Self {
            name: name.into(),
            kind,
            blend: BlendMode::Opaque,
            casts_shadows: true,
            alpha_cutoff: 0.5,
            gpu: None,
        }
    }

    pub fn color(name: impl Into<String>, color: Vec4) -> Self {
        Self::new(
            name,
            MaterialKind::Color(ColorMaterial {
                color,
                ..Default::default()
            }),
        )
    }

    pub fn textured(name: impl Into<String>, material: TextureMaterial) -> Self {
        Self::new(name, MaterialKind::Textured(material))
    }

    pub fn pbr(name: impl Into<String>, material: PbrMaterial) -> Self {
        Self::new(name, MaterialKind::Pbr(material))
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_shadows(mut self, casts_shadows: bool) -> Self {
        self.casts_shadows = casts_shadows;
        self
    }

    pub fn family(&self) -> MaterialFamily {
        match self.kind {
            MaterialKind::Color(_) => MaterialFamily::Color,
            MaterialKind::Textured(_) => MaterialFamily::Textured,
            MaterialKind::Pbr(_) => MaterialFamily::Pbr,
        }
    }

    /// The shared program this material's family uses for `pass`.
    pub fn program(&self, pass: MaterialPass) -> ProgramKind {
        use MaterialFamily::*;
        match (pass, self.family()) {
            (MaterialPass::Simple, _) => ProgramKind::ShadowDirectional,
            (MaterialPass::Forward, Color) => ProgramKind::ForwardColor,
            (MaterialPass::Forward, Textured) => ProgramKind::ForwardTexture,
            (MaterialPass::Forward, Pbr) => ProgramKind::ForwardPbr,
            (MaterialPass::Deferred, Color) => ProgramKind::GeometryColor,
            (MaterialPass::Deferred, Textured) => ProgramKind::GeometryTexture,
            (MaterialPass::Deferred, Pbr) => ProgramKind::GeometryPbr,
        }
    }

    pub fn blend_variant(&self) -> BlendVariant {
        match self.blend {
            BlendMode::Opaque | BlendMode::Cutout => BlendVariant::Opaque,
            BlendMode::Transparent => BlendVariant::AlphaBlend,
            BlendMode::Additive => BlendVariant::Additive,
        }
    }

    pub fn program_key(&self, pass: MaterialPass) -> ProgramKey {
        ProgramKey::with_variant(self.program(pass), self.blend_variant())
    }

    pub fn is_blended(&self) -> bool {
        self.blend.is_blended()
    }

    /// Pack the parameter block. Bit `i` of `flags.y` is set when texture
    /// slot `i` holds real data rather than a placeholder.
    pub fn params(&self) -> MaterialParams {
        let mut params = MaterialParams {
            base_color: [1.0; 4],
            emission: [0.0; 4],
            specular: [0.5, 0.5, 0.5, 32.0],
            pbr: [0.0, 0.5, 1.0, 0.0],
            extra: [self.alpha_cutoff, 0.0, 0.0, 0.0],
            flags: [self.blend.index(), 0, SHADING_PHONG, 0],
        };
        match &self.kind {
            MaterialKind::Color(m) => {
                params.base_color = m.color.to_array();
                params.emission = m.emission.extend(0.0).to_array();
                params.specular = m.specular.extend(m.shininess).to_array();
            }
            MaterialKind::Textured(m) => {
                params.base_color = m.tint.to_array();
                params.specular = [1.0, 1.0, 1.0, m.shininess];
                params.pbr[3] = m.reflectivity;
                params.extra[1] = m.height_scale;
                params.flags[1] = texture_mask(m.slots().iter().map(|s| s.1.is_some()));
            }
            MaterialKind::Pbr(m) => {
                params.base_color = m.albedo_factor.to_array();
                params.emission = m.emission.extend(0.0).to_array();
                params.pbr = [m.metallic_factor, m.roughness_factor, m.ao_factor, 0.0];
                params.flags[1] = texture_mask(m.slots().iter().map(|s| s.1.is_some()));
                params.flags[2] = SHADING_PBR;
            }
        }
        params
    }

    /// Create the parameter buffer, slot textures and bind group. Invalid
    /// texture data is logged and replaced by the slot's placeholder.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, layouts: &BindGroupLayouts) {
        let params = UniformBuffer::new(device, &format!("{} Params", self.name), &self.params());

        let slots: Vec<(&'static str, Option<&TextureData>, [u8; 4])> = match &self.kind {
            MaterialKind::Color(_) => Vec::new(),
            MaterialKind::Textured(m) => m.slots().to_vec(),
            MaterialKind::Pbr(m) => m.slots().to_vec(),
        };
        let textures: Vec<Texture> = slots
            .iter()
            .map(|(slot, data, fallback)| {
                let label = format!("{} {slot}", self.name);
                match data {
                    Some(data) if !data.format.filterable() => {
                        log::error!(
                            "[Material] '{label}': {:?} cannot be filtered; using placeholder",
                            data.format
                        );
                        Texture::placeholder(device, queue, *fallback, &label)
                    }
                    Some(data) => Texture::from_data_or_placeholder(device, queue, data, *fallback),
                    None => Texture::placeholder(device, queue, *fallback, &label),
                }
            })
            .collect();

        let layout = match self.family() {
            MaterialFamily::Color => &layouts.material_color,
            MaterialFamily::Textured => &layouts.material_texture,
            MaterialFamily::Pbr => &layouts.material_pbr,
        };
        let sampler = repeat_sampler(device, &self.name);
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: params.binding(),
        }];
        for (i, texture) in textures.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + i as u32,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
        }
        if !textures.is_empty() {
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + textures.len() as u32,
                resource: wgpu::BindingResource::Sampler(&sampler),
            });
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Bind Group", self.name)),
            layout,
            entries: &entries,
        });

        log::debug!(
            "[Material] uploaded '{}' ({:?}, {} textures)",
            self.name,
            self.family(),
            textures.len()
        );
        self.gpu = Some(MaterialGpu {
            textures,
            params,
            bind_group,
        });
    }

    pub fn is_uploaded(&self) -> bool {
        self.gpu.is_some()
    }

    /// GPU textures owned by this material, in binding order.
    pub fn textures(&self) -> &[Texture] {
        self.gpu.as_ref().map_or(&[], |gpu| gpu.textures.as_slice())
    }

    /// Push edited parameters to the GPU.
    pub fn write_params(&self, queue: &wgpu::Queue) {
        if let Some(gpu) = &self.gpu {
            gpu.params.write(queue, &self.params());
        }
    }

    /// Bind the material at group 3. Returns false if it was never uploaded.
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) -> bool {
        match &self.gpu {
            Some(gpu) => {
                pass.set_bind_group(3, &gpu.bind_group, &[]);
                true
            }
            None => false,
        }
    }
}

fn texture_mask(present: impl Iterator<Item = bool>) -> u32 {
    present
        .enumerate()
        .filter(|(_, p)| *p)
        .fold(0, |mask, (i, _)| mask | (1 << i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_program_table() {
        let color = Material::color("c", Vec4::ONE);
        let tex = Material::textured("t", TextureMaterial::default());
        let pbr = Material::pbr("p", PbrMaterial::default());

        assert_eq!(color.program(MaterialPass::Deferred), ProgramKind::GeometryColor);
        assert_eq!(tex.program(MaterialPass::Forward), ProgramKind::ForwardTexture);
        assert_eq!(pbr.program(MaterialPass::Deferred), ProgramKind::GeometryPbr);
        for m in [&color, &tex, &pbr] {
            assert_eq!(m.program(MaterialPass::Simple), ProgramKind::ShadowDirectional);
        }
    }

    #[test]
    fn test_same_family_shares_program() {
        let a = Material::color("a", Vec4::X);
        let b = Material::color("b", Vec4::Y).with_blend(BlendMode::Transparent);
        assert_eq!(a.program(MaterialPass::Forward), b.program(MaterialPass::Forward));
        assert_ne!(
            a.program_key(MaterialPass::Forward),
            b.program_key(MaterialPass::Forward)
        );
    }

    #[test]
    fn test_cutout_is_solid() {
        let m = Material::color("leaf", Vec4::ONE).with_blend(BlendMode::Cutout);
        assert!(!m.is_blended());
        assert_eq!(m.blend_variant(), BlendVariant::Opaque);
        assert_eq!(m.params().flags[0], 1);
    }

    #[test]
    fn test_texture_mask_marks_present_slots() {
        let material = Material::textured(
            "brick",
            TextureMaterial {
                diffuse: Some(TextureData::solid("d", WHITE)),
                normal: Some(TextureData::solid("n", FLAT_NORMAL)),
                ..Default::default()
            },
        );
        assert_eq!(material.params().flags[1], 0b101);
        assert_eq!(material.params().flags[2], SHADING_PHONG);
    }

    #[test]
    fn test_pbr_params() {
        let material = Material::pbr(
            "gold",
            PbrMaterial {
                metallic_factor: 1.0,
                roughness_factor: 0.2,
                ..Default::default()
            },
        );
        let params = material.params();
        assert_eq!(params.pbr[0], 1.0);
        assert_eq!(params.pbr[1], 0.2);
        assert_eq!(params.flags[2], SHADING_PBR);
        assert_eq!(params.flags[1], 0);
    }
}
