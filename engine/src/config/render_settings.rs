//! Render Options and Settings
//!
//! `RenderOptions` is a typed flag set over [`RenderOption`]. `RenderSettings`
//! pairs it with the numeric [`Tunables`] and enforces the dependency rule
//! that SSAO, SSR and PBR only exist on the deferred path.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::tunables::Tunables;
use crate::error::{RenderError, Result};

/// A single toggleable render feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderOption {
    Lighting,
    Shadows,
    Bloom,
    Fxaa,
    MotionBlur,
    Deferred,
    Ssao,
    Ssr,
    Pbr,
}

impl RenderOption {
    pub const ALL: [RenderOption; 9] = [
        RenderOption::Lighting,
        RenderOption::Shadows,
        RenderOption::Bloom,
        RenderOption::Fxaa,
        RenderOption::MotionBlur,
        RenderOption::Deferred,
        RenderOption::Ssao,
        RenderOption::Ssr,
        RenderOption::Pbr,
    ];

    /// Options that have no meaning without the deferred G-buffer.
    pub const DEFERRED_ONLY: [RenderOption; 3] =
        [RenderOption::Ssao, RenderOption::Ssr, RenderOption::Pbr];

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub fn name(self) -> &'static str {
        match self {
            RenderOption::Lighting => "Lighting",
            RenderOption::Shadows => "Shadows",
            RenderOption::Bloom => "Bloom",
            RenderOption::Fxaa => "FXAA",
            RenderOption::MotionBlur => "Motion Blur",
            RenderOption::Deferred => "Deferred",
            RenderOption::Ssao => "SSAO",
            RenderOption::Ssr => "SSR",
            RenderOption::Pbr => "PBR",
        }
    }
}

impl fmt::Display for RenderOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-width set of enabled [`RenderOption`]s.
///
/// Serialized as a list of option names so settings files stay readable.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<RenderOption>", into = "Vec<RenderOption>")]
pub struct RenderOptions(u16);

impl RenderOptions {
    pub const NONE: Self = Self(0);

    pub fn from_options(options: &[RenderOption]) -> Self {
        let mut set = Self::NONE;
        for option in options {
            set.insert(*option);
        }
        set
    }

    #[inline]
    pub const fn contains(self, option: RenderOption) -> bool {
        self.0 & option.bit() != 0
    }

    #[inline]
    pub fn insert(&mut self, option: RenderOption) {
        self.0 |= option.bit();
    }

    #[inline]
    pub fn remove(&mut self, option: RenderOption) {
        self.0 &= !option.bit();
    }

    #[inline]
    pub fn set(&mut self, option: RenderOption, enabled: bool) {
        if enabled {
            self.insert(option);
        } else {
            self.remove(option);
        }
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = RenderOption> {
        RenderOption::ALL.into_iter().filter(move |o| self.contains(*o))
    }
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl From<Vec<RenderOption>> for RenderOptions {
    fn from(options: Vec<RenderOption>) -> Self {
        Self::from_options(&options)
    }
}

impl From<RenderOptions> for Vec<RenderOption> {
    fn from(options: RenderOptions) -> Self {
        options.iter().collect()
    }
}

/// User-facing render configuration, editable at any time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub options: RenderOptions,
    pub tunables: Tunables,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            options: RenderOptions::from_options(&[
                RenderOption::Lighting,
                RenderOption::Shadows,
                RenderOption::Bloom,
                RenderOption::Fxaa,
                RenderOption::Deferred,
                RenderOption::Ssao,
                RenderOption::Pbr,
            ]),
            tunables: Tunables::default(),
        }
    }
}

impl RenderSettings {
    /// Parse settings from a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut settings: RenderSettings = serde_json::from_str(json)?;
        settings.sanitize();
        Ok(settings)
    }

    /// Load settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| RenderError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn enable(&mut self, option: RenderOption) {
        self.options.insert(option);
    }

    pub fn disable(&mut self, option: RenderOption) {
        self.options.remove(option);
    }

    pub fn toggle(&mut self, option: RenderOption) {
        let enabled = self.options.contains(option);
        self.options.set(option, !enabled);
    }

    pub fn is_enabled(&self, option: RenderOption) -> bool {
        self.options.contains(option)
    }

    /// Enforce option dependencies and clamp tunables into their valid ranges.
    fn sanitize(&mut self) {
        if !self.options.contains(RenderOption::Deferred) {
            for option in RenderOption::DEFERRED_ONLY {
                if self.options.contains(option) {
                    log::debug!("[RenderSettings] {option} requires Deferred; disabling");
                    self.options.remove(option);
                }
            }
        }
        self.tunables.clamp();
    }

    /// Sanitize in place and take the snapshot used for one frame.
    pub fn apply(&mut self) -> FrameSettings {
        self.sanitize();
        FrameSettings {
            options: self.options,
            tunables: self.tunables.clone(),
        }
    }
}

/// Immutable per-frame view of the settings. Every pass reads this, never
/// the live [`RenderSettings`].
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSettings {
    options: RenderOptions,
    pub tunables: Tunables,
}

impl FrameSettings {
    pub fn is_enabled(&self, option: RenderOption) -> bool {
        self.options.contains(option)
    }

    pub fn options(&self) -> RenderOptions {
        self.options
    }

    pub fn deferred(&self) -> bool {
        self.is_enabled(RenderOption::Deferred)
    }

    pub fn lighting(&self) -> bool {
        self.is_enabled(RenderOption::Lighting)
    }

    pub fn shadows(&self) -> bool {
        self.is_enabled(RenderOption::Shadows) && self.lighting()
    }

    /// Copy of this snapshot with `option` switched and dependencies
    /// re-applied.
    pub fn with(&self, option: RenderOption, enabled: bool) -> FrameSettings {
        let mut settings = RenderSettings {
            options: self.options,
            tunables: self.tunables.clone(),
        };
        settings.options.set(option, enabled);
        settings.apply()
    }
}

impl Default for FrameSettings {
    fn default() -> Self {
        RenderSettings::default().apply()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabling_deferred_forces_dependents_off() {
        let mut settings = RenderSettings::default();
        assert!(settings.is_enabled(RenderOption::Ssao));

        settings.enable(RenderOption::Ssr);
        settings.disable(RenderOption::Deferred);
        let frame = settings.apply();

        for option in RenderOption::DEFERRED_ONLY {
            assert!(!frame.is_enabled(option), "{option} should be off");
            assert!(!settings.is_enabled(option), "{option} should stay off");
        }
    }

    #[test]
    fn test_dependents_survive_while_deferred_is_on() {
        let mut settings = RenderSettings::default();
        settings.enable(RenderOption::Ssr);
        let frame = settings.apply();
        assert!(frame.is_enabled(RenderOption::Ssao));
        assert!(frame.is_enabled(RenderOption::Ssr));
        assert!(frame.is_enabled(RenderOption::Pbr));
    }

    #[test]
    fn test_edits_after_apply_do_not_touch_snapshot() {
        let mut settings = RenderSettings::default();
        let frame = settings.apply();
        settings.disable(RenderOption::Bloom);
        assert!(frame.is_enabled(RenderOption::Bloom));
        assert!(!settings.apply().is_enabled(RenderOption::Bloom));
    }

    #[test]
    fn test_toggle() {
        let mut settings = RenderSettings::default();
        settings.toggle(RenderOption::MotionBlur);
        assert!(settings.is_enabled(RenderOption::MotionBlur));
        settings.toggle(RenderOption::MotionBlur);
        assert!(!settings.is_enabled(RenderOption::MotionBlur));
    }

    #[test]
    fn test_shadows_require_lighting() {
        let mut settings = RenderSettings::default();
        settings.disable(RenderOption::Lighting);
        assert!(!settings.apply().shadows());
    }

    #[test]
    fn test_derived_snapshot_drops_deferred_dependents() {
        let frame = RenderSettings::default().apply();
        let forward = frame.with(RenderOption::Deferred, false);
        assert!(!forward.deferred());
        assert!(!forward.is_enabled(RenderOption::Ssao));
        assert!(frame.deferred());
    }

    #[test]
    fn test_options_serialize_as_names() {
        let options = RenderOptions::from_options(&[RenderOption::Bloom, RenderOption::Fxaa]);
        let json = serde_json::to_string(&options).unwrap();
        assert_eq!(json, r#"["Bloom","Fxaa"]"#);
        let back: RenderOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
    }

    #[test]
    fn test_json_loading_sanitizes() {
        let json = r#"{ "options": ["Ssao", "Pbr", "Lighting"] }"#;
        let settings = RenderSettings::from_json_str(json).unwrap();
        assert!(settings.is_enabled(RenderOption::Lighting));
        assert!(!settings.is_enabled(RenderOption::Ssao));
        assert!(!settings.is_enabled(RenderOption::Pbr));
        assert_eq!(settings.tunables, Tunables::default());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(RenderSettings::from_json_str("{ options: ").is_err());
    }
}
