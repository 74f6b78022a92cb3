//! Persisted per-unit state.
//!
//! A [`PatchState`] maps unit names to the [`PropertyBag`] each unit produced
//! with `save_state`. It is written as one TOML document:
//!
//! ```toml
//! [lead_env]
//! attack = 0.01
//! sustain = 0.5
//!
//! [scanner]
//! rate = 0.5
//! sync = "quarter"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use patchwire_core::{ProcessingUnit, PropertyBag};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths::ensure_dir;

/// Saved state of every unit in a patch, keyed by unit name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchState {
    units: BTreeMap<String, PropertyBag>,
}

impl PatchState {
    /// Creates an empty state document.
    pub fn new() -> Self {
        Self::default()
    }

    /// State stored for `unit`.
    pub fn get(&self, unit: &str) -> Option<&PropertyBag> {
        self.units.get(unit)
    }

    /// Stores state for `unit`, returning what it replaced.
    pub fn insert(&mut self, unit: impl Into<String>, state: PropertyBag) -> Option<PropertyBag> {
        self.units.insert(unit.into(), state)
    }

    /// Removes the state stored for `unit`.
    pub fn remove(&mut self, unit: &str) -> Option<PropertyBag> {
        self.units.remove(unit)
    }

    /// Number of units with stored state.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// True if no unit has stored state.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Unit names and their state, in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyBag)> {
        self.units.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Records the current state of `unit` under `name`.
    pub fn capture(&mut self, name: impl Into<String>, unit: &dyn ProcessingUnit) {
        let name = name.into();
        let state = unit.save_state();
        tracing::debug!(unit = %name, keys = state.len(), "state captured");
        self.units.insert(name, state);
    }

    /// Restores the state stored under `name` into `unit`.
    ///
    /// Returns `false` if nothing is stored for that name. Call before the
    /// unit resumes processing.
    pub fn restore(&self, name: &str, unit: &mut dyn ProcessingUnit) -> Result<bool, ConfigError> {
        let Some(state) = self.units.get(name) else {
            return Ok(false);
        };
        unit.load_state(state)
            .map_err(|e| ConfigError::unit(name, e))?;
        tracing::debug!(unit = %name, keys = state.len(), "state restored");
        Ok(true)
    }

    /// Load state from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Convert the state to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load state from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let state = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), units = state.len(), "state loaded");
        Ok(state)
    }

    /// Like [`load`](Self::load), but a missing file gives an empty state.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no saved state");
            return Ok(Self::new());
        }
        Self::load(path)
    }

    /// Save state to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        tracing::info!(path = %path.display(), units = self.len(), "state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwire_core::PropertyValue;
    use patchwire_units::UnitKind;

    #[test]
    fn bags_survive_toml() {
        let mut state = PatchState::new();
        let point = PropertyValue::List(vec![PropertyValue::Float(0.0), PropertyValue::Float(1.0)]);
        state.insert(
            "scan",
            PropertyBag::new()
                .with("rate", 0.25_f64)
                .with("sync", "eighth")
                .with("curve", PropertyValue::List(vec![point])),
        );
        let text = state.to_toml().unwrap();
        assert_eq!(PatchState::from_toml(&text).unwrap(), state);
    }

    #[test]
    fn capture_then_restore() {
        let mut env = UnitKind::Envelope.build_default().unwrap();
        env.load_state(&PropertyBag::new().with("release", 1.5_f64)).unwrap();

        let mut state = PatchState::new();
        state.capture("env", env.as_ref());

        let mut fresh = UnitKind::Envelope.build_default().unwrap();
        assert!(state.restore("env", fresh.as_mut()).unwrap());
        assert_eq!(fresh.save_state().get_f64("release"), Some(1.5));
        assert!(!state.restore("missing", fresh.as_mut()).unwrap());
    }

    #[test]
    fn restore_error_names_unit() {
        let mut state = PatchState::new();
        state.insert("env", PropertyBag::new().with("attack", "fast"));
        let mut env = UnitKind::Envelope.build_default().unwrap();
        let err = state.restore("env", env.as_mut()).unwrap_err();
        assert!(matches!(err, ConfigError::Unit { ref unit, .. } if unit == "env"));
    }
}
