//! Parameter descriptors.
//!
//! Every unit describes its parameters with a [`ParamDescriptor`]: display
//! metadata, the declared `[min, max]` range, a stable [`ParamId`], and the
//! parameter's [`ModulationKind`]. The modulation kind is part of the
//! parameter's identity, not something inferred from its range: time-like
//! parameters (attack, release, rate) modulate multiplicatively in octaves,
//! level-like parameters (amount, mix, level) modulate additively.
//!
//! # Example
//!
//! ```rust
//! use patchwire_core::{ParamDescriptor, ParamId, ModulationKind};
//!
//! let attack = ParamDescriptor::time_seconds("Attack", "Atk", 0.001, 5.0, 0.01)
//!     .with_id(ParamId(100), "env_attack");
//! assert!(matches!(attack.modulation, ModulationKind::Multiplicative { .. }));
//! assert_eq!(attack.clamp(10.0), 5.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::modulation::ModulationPolicy;
use crate::{Error, Result};

/// Default octave span for time-like parameters.
pub const DEFAULT_TIME_SPAN_OCTAVES: f32 = 2.0;

/// Default octave span for rate-like parameters.
pub const DEFAULT_RATE_SPAN_OCTAVES: f32 = 4.0;

/// Stable parameter identifier.
///
/// Once assigned, a `ParamId` must never change for a given parameter: it
/// is what persisted state and routing declarations refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamId(pub u32);

/// How a control-voltage sample moves a parameter under the relative policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ModulationKind {
    /// `base * 2^((cv - 0.5) * span_octaves)`, for rates and times.
    Multiplicative {
        /// Total octave span covered by the full CV range.
        span_octaves: f32,
    },
    /// `base + (cv - 0.5) * range`, for levels and amounts.
    Additive {
        /// Total offset covered by the full CV range, in parameter units.
        range: f32,
    },
}

/// Display scaling for UI normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamScale {
    /// Equal resolution across the range.
    #[default]
    Linear,
    /// More resolution at low values. Requires `min > 0`.
    Logarithmic,
}

/// Unit type for parameter display and formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamUnit {
    /// Seconds, for envelope stages and long times.
    Seconds,
    /// Milliseconds, for short times.
    Milliseconds,
    /// Hertz, for rates and frequencies.
    Hertz,
    /// Decibels.
    Decibels,
    /// Percentage.
    Percent,
    /// Dimensionless.
    None,
}

impl ParamUnit {
    /// Returns the unit suffix string for display.
    pub const fn suffix(&self) -> &'static str {
        match self {
            ParamUnit::Seconds => " s",
            ParamUnit::Milliseconds => " ms",
            ParamUnit::Hertz => " Hz",
            ParamUnit::Decibels => " dB",
            ParamUnit::Percent => "%",
            ParamUnit::None => "",
        }
    }
}

/// Describes a single parameter's metadata, range, and modulation behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDescriptor {
    /// Full parameter name for display.
    pub name: &'static str,
    /// Short name for narrow displays, max 8 characters.
    pub short_name: &'static str,
    /// Unit type for formatting.
    pub unit: ParamUnit,
    /// Minimum value.
    pub min: f32,
    /// Maximum value.
    pub max: f32,
    /// Initial base value.
    pub default: f32,
    /// Stable numeric ID.
    pub id: ParamId,
    /// Stable string ID used by configuration files, e.g. `"attack"`.
    pub string_id: &'static str,
    /// UI normalization curve.
    pub scale: ParamScale,
    /// Relative-policy behavior.
    pub modulation: ModulationKind,
    /// Policy used when a binding does not override it.
    pub policy: ModulationPolicy,
}

impl ParamDescriptor {
    /// Time parameter in seconds, modulated multiplicatively over two octaves.
    pub fn time_seconds(
        name: &'static str,
        short_name: &'static str,
        min: f32,
        max: f32,
        default: f32,
    ) -> Self {
        Self {
            name,
            short_name,
            unit: ParamUnit::Seconds,
            min,
            max,
            default,
            id: ParamId(0),
            string_id: "",
            scale: ParamScale::Logarithmic,
            modulation: ModulationKind::Multiplicative {
                span_octaves: DEFAULT_TIME_SPAN_OCTAVES,
            },
            policy: ModulationPolicy::Relative,
        }
    }

    /// Rate parameter in Hz, modulated multiplicatively over four octaves.
    pub fn rate_hz(min: f32, max: f32, default: f32) -> Self {
        Self {
            name: "Rate",
            short_name: "Rate",
            unit: ParamUnit::Hertz,
            min,
            max,
            default,
            id: ParamId(0),
            string_id: "",
            scale: ParamScale::Logarithmic,
            modulation: ModulationKind::Multiplicative {
                span_octaves: DEFAULT_RATE_SPAN_OCTAVES,
            },
            policy: ModulationPolicy::Relative,
        }
    }

    /// Level parameter, modulated additively across its full range.
    pub fn level(
        name: &'static str,
        short_name: &'static str,
        min: f32,
        max: f32,
        default: f32,
    ) -> Self {
        Self {
            name,
            short_name,
            unit: ParamUnit::None,
            min,
            max,
            default,
            id: ParamId(0),
            string_id: "",
            scale: ParamScale::Linear,
            modulation: ModulationKind::Additive { range: max - min },
            policy: ModulationPolicy::Relative,
        }
    }

    /// Sets the stable parameter ID and string ID.
    pub const fn with_id(mut self, id: ParamId, string_id: &'static str) -> Self {
        self.id = id;
        self.string_id = string_id;
        self
    }

    /// Sets the display unit.
    pub const fn with_unit(mut self, unit: ParamUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Sets the modulation kind.
    pub const fn with_modulation(mut self, modulation: ModulationKind) -> Self {
        self.modulation = modulation;
        self
    }

    /// Sets the default policy.
    pub const fn with_policy(mut self, policy: ModulationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Checks range and modulation constants.
    ///
    /// Called once when a unit is built; a descriptor that fails here never
    /// reaches the block path.
    pub fn validate(&self) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min >= self.max {
            return Err(Error::InvalidRange {
                name: self.name.to_string(),
                min: self.min,
                max: self.max,
            });
        }
        if !(self.min..=self.max).contains(&self.default) {
            return Err(Error::invalid_modulation(
                self.name,
                format!("default {} outside [{}, {}]", self.default, self.min, self.max),
            ));
        }
        match self.modulation {
            ModulationKind::Multiplicative { span_octaves } => {
                if !(span_octaves.is_finite() && span_octaves > 0.0) {
                    return Err(Error::invalid_modulation(
                        self.name,
                        format!("octave span must be positive, got {span_octaves}"),
                    ));
                }
                if self.min <= 0.0 {
                    return Err(Error::invalid_modulation(
                        self.name,
                        "multiplicative parameters need a positive minimum",
                    ));
                }
            }
            ModulationKind::Additive { range } => {
                if !(range.is_finite() && range > 0.0) {
                    return Err(Error::invalid_modulation(
                        self.name,
                        format!("additive range must be positive, got {range}"),
                    ));
                }
            }
        }
        if self.scale == ParamScale::Logarithmic && self.min <= 0.0 {
            return Err(Error::invalid_modulation(
                self.name,
                "logarithmic scale needs a positive minimum",
            ));
        }
        Ok(())
    }

    /// Clamps a value to this parameter's range. NaN maps to `min`.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() || value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    /// Maps a plain value to `[0, 1]` for display.
    pub fn normalize(&self, value: f32) -> f32 {
        let value = self.clamp(value);
        match self.scale {
            ParamScale::Linear => (value - self.min) / (self.max - self.min),
            ParamScale::Logarithmic => libm::logf(value / self.min) / libm::logf(self.max / self.min),
        }
    }

    /// Inverse of [`normalize`](Self::normalize).
    pub fn denormalize(&self, normalized: f32) -> f32 {
        let n = normalized.clamp(0.0, 1.0);
        match self.scale {
            ParamScale::Linear => self.min + n * (self.max - self.min),
            ParamScale::Logarithmic => self.min * libm::powf(self.max / self.min, n),
        }
    }

    /// Formats a value with its unit suffix.
    pub fn format(&self, value: f32) -> String {
        format!("{:.4}{}", value, self.unit.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_defaults_to_multiplicative() {
        let d = ParamDescriptor::time_seconds("Release", "Rel", 0.001, 10.0, 0.2);
        assert_eq!(
            d.modulation,
            ModulationKind::Multiplicative { span_octaves: 2.0 }
        );
        assert_eq!(d.policy, ModulationPolicy::Relative);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn level_defaults_to_full_range_additive() {
        let d = ParamDescriptor::level("Level", "Lvl", -1.0, 1.0, 0.0);
        assert_eq!(d.modulation, ModulationKind::Additive { range: 2.0 });
        assert!(d.validate().is_ok());
    }

    #[test]
    fn inverted_range_rejected() {
        let d = ParamDescriptor::level("Bad", "Bad", 1.0, 0.0, 0.5);
        assert!(matches!(d.validate(), Err(Error::InvalidRange { .. })));
    }

    #[test]
    fn multiplicative_needs_positive_min() {
        let d = ParamDescriptor::level("Time", "T", 0.0, 1.0, 0.5)
            .with_modulation(ModulationKind::Multiplicative { span_octaves: 2.0 });
        assert!(matches!(d.validate(), Err(Error::InvalidModulation { .. })));
    }

    #[test]
    fn zero_span_rejected() {
        let d = ParamDescriptor::time_seconds("A", "A", 0.001, 1.0, 0.1)
            .with_modulation(ModulationKind::Multiplicative { span_octaves: 0.0 });
        assert!(d.validate().is_err());
    }

    #[test]
    fn default_outside_range_rejected() {
        let d = ParamDescriptor::level("L", "L", 0.0, 1.0, 2.0);
        assert!(d.validate().is_err());
    }

    #[test]
    fn clamp_handles_nan() {
        let d = ParamDescriptor::level("L", "L", 0.0, 1.0, 0.5);
        assert_eq!(d.clamp(f32::NAN), 0.0);
        assert_eq!(d.clamp(3.0), 1.0);
    }

    #[test]
    fn log_normalize_round_trip_endpoints() {
        let d = ParamDescriptor::rate_hz(0.1, 100.0, 1.0);
        assert!((d.normalize(0.1)).abs() < 1e-6);
        assert!((d.normalize(100.0) - 1.0).abs() < 1e-6);
        assert!((d.denormalize(0.0) - 0.1).abs() < 1e-6);
        assert!((d.denormalize(1.0) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn format_uses_suffix() {
        let d = ParamDescriptor::time_seconds("A", "A", 0.001, 1.0, 0.1);
        assert_eq!(d.format(0.5), "0.5000 s");
    }
}
