//! Light Component
//!
//! Attenuation and cutoff data only exist on the variants that use them.

use glam::Vec3;

/// Distance attenuation `1 / (constant + linear * d + quadratic * d^2)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

impl Default for Attenuation {
    /// Roughly a 50 unit range.
    fn default() -> Self {
        Self {
            constant: 1.0,
            linear: 0.09,
            quadratic: 0.032,
        }
    }
}

impl Attenuation {
    pub fn factor(&self, distance: f32) -> f32 {
        1.0 / (self.constant + self.linear * distance + self.quadratic * distance * distance)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    Directional {
        direction: Vec3,
    },
    Point {
        attenuation: Attenuation,
    },
    Spot {
        direction: Vec3,
        attenuation: Attenuation,
        /// Cosine of the inner cone half-angle
        inner_cutoff: f32,
        /// Cosine of the outer cone half-angle
        outer_cutoff: f32,
    },
}

#[derive(Clone, Debug)]
pub struct LightComponent {
    pub kind: LightKind,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub casts_shadows: bool,
}

impl LightComponent {
    pub fn directional(direction: Vec3, color: Vec3) -> Self {
        Self {
            kind: LightKind::Directional {
                direction: direction.normalize_or_zero(),
            },
            ambient: color * 0.1,
            diffuse: color,
            specular: color,
            casts_shadows: true,
        }
    }

    pub fn point(color: Vec3, attenuation: Attenuation) -> Self {
        Self {
            kind: LightKind::Point { attenuation },
            ambient: color * 0.05,
            diffuse: color,
            specular: color,
            casts_shadows: false,
        }
    }

    /// `inner` and `outer` are cone half-angles in radians.
    pub fn spot(direction: Vec3, color: Vec3, inner: f32, outer: f32) -> Self {
        Self {
            kind: LightKind::Spot {
                direction: direction.normalize_or_zero(),
                attenuation: Attenuation::default(),
                inner_cutoff: inner.cos(),
                outer_cutoff: outer.max(inner).cos(),
            },
            ambient: Vec3::ZERO,
            diffuse: color,
            specular: color,
            casts_shadows: false,
        }
    }

    pub fn with_shadows(mut self, casts_shadows: bool) -> Self {
        self.casts_shadows = casts_shadows;
        self
    }

    pub fn is_directional(&self) -> bool {
        matches!(self.kind, LightKind::Directional { .. })
    }

    pub fn is_point(&self) -> bool {
        matches!(self.kind, LightKind::Point { .. })
    }

    pub fn is_spot(&self) -> bool {
        matches!(self.kind, LightKind::Spot { .. })
    }

    pub fn direction(&self) -> Option<Vec3> {
        match self.kind {
            LightKind::Directional { direction } | LightKind::Spot { direction, .. } => {
                Some(direction)
            }
            LightKind::Point { .. } => None,
        }
    }

    pub fn attenuation(&self) -> Option<Attenuation> {
        match self.kind {
            LightKind::Point { attenuation } | LightKind::Spot { attenuation, .. } => {
                Some(attenuation)
            }
            LightKind::Directional { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_has_no_attenuation() {
        let light = LightComponent::directional(Vec3::new(1.0, -2.0, -1.0), Vec3::ONE);
        assert!(light.attenuation().is_none());
        let dir = light.direction().unwrap();
        assert!((dir.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_spot_cutoffs_are_cosines() {
        let light = LightComponent::spot(Vec3::NEG_Y, Vec3::ONE, 0.2, 0.3);
        match light.kind {
            LightKind::Spot {
                inner_cutoff,
                outer_cutoff,
                ..
            } => {
                assert!((inner_cutoff - 0.2f32.cos()).abs() < 1e-6);
                assert!(outer_cutoff < inner_cutoff);
            }
            _ => panic!("expected spot light"),
        }
    }

    #[test]
    fn test_attenuation_falls_off() {
        let a = Attenuation::default();
        assert_eq!(a.factor(0.0), 1.0);
        assert!(a.factor(10.0) < a.factor(1.0));
    }
}
