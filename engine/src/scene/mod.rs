//! Scene Module
//!
//! The data model the renderer consumes: entities with capability-tagged
//! components and the per-frame [`SceneSnapshot`]. The renderer reads world
//! transforms and never mutates them.

pub mod camera;
pub mod capability;
pub mod entity;
pub mod light;
pub mod snapshot;
pub mod transform;

pub use camera::CameraComponent;
pub use capability::{Capability, CapabilitySet};
pub use entity::{Entity, EntityId, RenderComponent};
pub use light::{Attenuation, LightComponent, LightKind};
pub use snapshot::SceneSnapshot;
pub use transform::{Decomposed, Transform};
