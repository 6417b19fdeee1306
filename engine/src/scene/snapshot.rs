//! Scene Snapshot
//!
//! The ordered entity list handed to the renderer each frame, plus the
//! main camera and directional light assignments.

use super::capability::{Capability, CapabilitySet};
use super::entity::{Entity, EntityId};

#[derive(Debug, Default)]
pub struct SceneSnapshot {
    entities: Vec<Entity>,
    next_id: u32,
    main_camera: Option<EntityId>,
    directional_light: Option<EntityId>,
}

impl SceneSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity and assign its id.
    pub fn insert(&mut self, mut entity: Entity) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        entity.set_id(id);
        self.entities.push(entity);
        id
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.iter_mut()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id() == id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id() == id)
    }

    /// Entities whose capability set contains every capability in `mask`,
    /// in insertion order.
    pub fn query(&self, mask: CapabilitySet) -> impl Iterator<Item = &Entity> {
        self.entities
            .iter()
            .filter(move |e| e.capabilities().contains(mask))
    }

    pub fn renderables(&self) -> Vec<&Entity> {
        self.query(CapabilitySet::RENDERABLE).collect()
    }

    pub fn lights(&self) -> Vec<&Entity> {
        self.query(CapabilitySet::LIGHT).collect()
    }

    pub fn cameras(&self) -> Vec<&Entity> {
        self.query(CapabilitySet::CAMERA).collect()
    }

    pub fn reflective(&self) -> Vec<&Entity> {
        self.query(CapabilitySet::RENDERABLE)
            .filter(|e| e.is_reflective())
            .collect()
    }

    /// Assign the main camera. Rejected (previous value kept) unless the
    /// entity has both a camera and a transform.
    pub fn set_main_camera(&mut self, id: EntityId) -> bool {
        let accepted = self
            .get(id)
            .is_some_and(|e| e.capabilities().contains(CapabilitySet::CAMERA));
        if accepted {
            self.main_camera = Some(id);
        } else {
            log::error!(
                "[SceneSnapshot] entity {id} has no {} + {} component; keeping main camera {:?}",
                Capability::Camera,
                Capability::Transform,
                self.main_camera
            );
        }
        accepted
    }

    /// Assign the directional light. Rejected unless the entity carries a
    /// directional light component.
    pub fn set_directional_light(&mut self, id: EntityId) -> bool {
        let accepted = self
            .get(id)
            .and_then(Entity::light)
            .is_some_and(|l| l.is_directional());
        if accepted {
            self.directional_light = Some(id);
        } else {
            log::error!(
                "[SceneSnapshot] entity {id} has no directional {} component; keeping {:?}",
                Capability::Light,
                self.directional_light
            );
        }
        accepted
    }

    pub fn main_camera(&self) -> Option<&Entity> {
        self.main_camera.and_then(|id| self.get(id))
    }

    pub fn directional_light(&self) -> Option<&Entity> {
        self.directional_light.and_then(|id| self.get(id))
    }

    pub fn main_camera_mut(&mut self) -> Option<&mut Entity> {
        let id = self.main_camera?;
        self.get_mut(id)
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.main_camera = None;
        self.directional_light = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{CameraComponent, LightComponent, Transform};
    use glam::Vec3;

    fn scene() -> (SceneSnapshot, EntityId, EntityId, EntityId) {
        let mut scene = SceneSnapshot::new();
        let camera = scene.insert(
            Entity::new("camera")
                .with_transform(Transform::default())
                .with_camera(CameraComponent::default()),
        );
        let sun = scene.insert(
            Entity::new("sun")
                .with_transform(Transform::default())
                .with_light(LightComponent::directional(Vec3::NEG_Y, Vec3::ONE)),
        );
        let empty = scene.insert(Entity::new("empty").with_transform(Transform::default()));
        (scene, camera, sun, empty)
    }

    #[test]
    fn test_query_by_mask() {
        let (scene, camera, sun, _) = scene();
        assert_eq!(scene.cameras().iter().map(|e| e.id()).collect::<Vec<_>>(), vec![camera]);
        assert_eq!(scene.lights().iter().map(|e| e.id()).collect::<Vec<_>>(), vec![sun]);
        assert!(scene.renderables().is_empty());
        assert_eq!(scene.query(Capability::Transform.into()).count(), 3);
    }

    #[test]
    fn test_rejected_camera_keeps_previous() {
        let (mut scene, camera, sun, empty) = scene();
        assert!(scene.set_main_camera(camera));
        assert!(!scene.set_main_camera(empty));
        assert!(!scene.set_main_camera(sun));
        assert_eq!(scene.main_camera().map(Entity::id), Some(camera));
    }

    #[test]
    fn test_rejected_directional_light() {
        let (mut scene, camera, sun, _) = scene();
        assert!(!scene.set_directional_light(camera));
        assert!(scene.directional_light().is_none());
        assert!(scene.set_directional_light(sun));
        assert_eq!(scene.directional_light().map(Entity::id), Some(sun));
    }
}
