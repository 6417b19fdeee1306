//! Entities and the render component.

use std::fmt;

use super::camera::CameraComponent;
use super::capability::{Capability, CapabilitySet};
use super::light::LightComponent;
use super::transform::Transform;
use crate::render::material::Material;
use crate::render::model::Model;

/// Stable identifier assigned by the [`SceneSnapshot`](super::SceneSnapshot).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Drawable data of an entity. Either half may be missing; the frame
/// pipeline skips such components with a warning.
#[derive(Debug, Default)]
pub struct RenderComponent {
    pub model: Option<Model>,
    pub material: Option<Material>,
    /// Receives baked environment maps
    pub reflective: bool,
}

impl RenderComponent {
    pub fn new(model: Model, material: Material) -> Self {
        Self {
            model: Some(model),
            material: Some(material),
            reflective: false,
        }
    }

    pub fn reflective(mut self) -> Self {
        self.reflective = true;
        self
    }

    pub fn is_complete(&self) -> bool {
        self.model.is_some() && self.material.is_some()
    }
}

/// A scene node. Components are attached through `with_*` / `attach_*` so
/// the capability set always matches the components present.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    pub name: String,
    capabilities: CapabilitySet,
    transform: Option<Transform>,
    render: Option<RenderComponent>,
    light: Option<LightComponent>,
    camera: Option<CameraComponent>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId(u32::MAX),
            name: name.into(),
            capabilities: CapabilitySet::EMPTY,
            transform: None,
            render: None,
            light: None,
            camera: None,
        }
    }

    pub(crate) fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    #[inline]
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.attach_transform(transform);
        self
    }

    pub fn with_render(mut self, render: RenderComponent) -> Self {
        self.attach_render(render);
        self
    }

    pub fn with_light(mut self, light: LightComponent) -> Self {
        self.attach_light(light);
        self
    }

    pub fn with_camera(mut self, camera: CameraComponent) -> Self {
        self.attach_camera(camera);
        self
    }

    pub fn attach_transform(&mut self, transform: Transform) {
        self.transform = Some(transform);
        self.capabilities.insert(Capability::Transform);
    }

    pub fn attach_render(&mut self, render: RenderComponent) {
        self.render = Some(render);
        self.capabilities.insert(Capability::Render);
    }

    pub fn attach_light(&mut self, light: LightComponent) {
        self.light = Some(light);
        self.capabilities.insert(Capability::Light);
    }

    pub fn attach_camera(&mut self, camera: CameraComponent) {
        self.camera = Some(camera);
        self.capabilities.insert(Capability::Camera);
    }

    pub fn detach_render(&mut self) -> Option<RenderComponent> {
        self.capabilities.remove(Capability::Render);
        self.render.take()
    }

    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    pub fn transform_mut(&mut self) -> Option<&mut Transform> {
        self.transform.as_mut()
    }

    pub fn render(&self) -> Option<&RenderComponent> {
        self.render.as_ref()
    }

    pub fn render_mut(&mut self) -> Option<&mut RenderComponent> {
        self.render.as_mut()
    }

    pub fn light(&self) -> Option<&LightComponent> {
        self.light.as_ref()
    }

    pub fn light_mut(&mut self) -> Option<&mut LightComponent> {
        self.light.as_mut()
    }

    pub fn camera(&self) -> Option<&CameraComponent> {
        self.camera.as_ref()
    }

    pub fn camera_mut(&mut self) -> Option<&mut CameraComponent> {
        self.camera.as_mut()
    }

    /// World matrix, identity for entities without a transform.
    pub fn world(&self) -> glam::Mat4 {
        self.transform
            .as_ref()
            .map(Transform::world)
            .unwrap_or(glam::Mat4::IDENTITY)
    }

    pub fn world_position(&self) -> glam::Vec3 {
        self.world().w_axis.truncate()
    }

    pub fn is_reflective(&self) -> bool {
        self.render.as_ref().is_some_and(|r| r.reflective)
    }
}
