//! Capability Sets
//!
//! Each entity advertises the components it carries through a small typed
//! flag set. Scene queries are subset tests: a query mask matches an entity
//! when every capability in the mask is present on the entity.

use std::fmt;

/// A component kind an entity can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Transform,
    Render,
    Light,
    Camera,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Transform,
        Capability::Render,
        Capability::Light,
        Capability::Camera,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            Capability::Transform => "transform",
            Capability::Render => "render",
            Capability::Light => "light",
            Capability::Camera => "camera",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-width set of [`Capability`] values.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const EMPTY: Self = Self(0);

    /// Mask selecting entities that can be drawn.
    pub const RENDERABLE: Self = Self::of(&[Capability::Transform, Capability::Render]);
    /// Mask selecting lights. Directional lights still carry a transform.
    pub const LIGHT: Self = Self::of(&[Capability::Transform, Capability::Light]);
    /// Mask selecting cameras.
    pub const CAMERA: Self = Self::of(&[Capability::Transform, Capability::Camera]);

    pub const fn of(capabilities: &[Capability]) -> Self {
        let mut bits = 0u8;
        let mut i = 0;
        while i < capabilities.len() {
            bits |= capabilities[i].bit();
            i += 1;
        }
        Self(bits)
    }

    #[inline]
    pub const fn has(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// True when every capability in `mask` is also in `self`.
    #[inline]
    pub const fn contains(self, mask: CapabilitySet) -> bool {
        self.0 & mask.0 == mask.0
    }

    /// True when the two sets share at least one capability.
    #[inline]
    pub const fn intersects(self, other: CapabilitySet) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.bit();
    }

    #[inline]
    pub fn remove(&mut self, capability: Capability) {
        self.0 &= !capability.bit();
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.has(*c))
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl From<Capability> for CapabilitySet {
    fn from(capability: Capability) -> Self {
        Self(capability.bit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subset_query() {
        let entity = CapabilitySet::of(&[Capability::Transform, Capability::Render]);
        assert!(entity.contains(CapabilitySet::RENDERABLE));
        assert!(entity.contains(Capability::Render.into()));
        assert!(!entity.contains(CapabilitySet::LIGHT));
        // Intersection is not enough for a match
        assert!(entity.intersects(CapabilitySet::LIGHT));
    }

    #[test]
    fn test_empty_mask_matches_everything() {
        assert!(CapabilitySet::EMPTY.contains(CapabilitySet::EMPTY));
        assert!(CapabilitySet::RENDERABLE.contains(CapabilitySet::EMPTY));
    }

    #[test]
    fn test_insert_remove() {
        let mut set = CapabilitySet::EMPTY;
        set.insert(Capability::Camera);
        set.insert(Capability::Transform);
        assert!(set.contains(CapabilitySet::CAMERA));
        set.remove(Capability::Camera);
        assert!(!set.has(Capability::Camera));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Capability::Transform]);
    }
}
