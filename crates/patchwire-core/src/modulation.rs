//! Modulation value resolution.
//!
//! A parameter's effective value each block is either its slow `base` value
//! (nothing patched into its CV) or a blend of `base` and the incoming CV
//! sample:
//!
//! | Policy | Kind | Result |
//! |--------|------|--------|
//! | Absolute | any | `lerp(min, max, clamp01(cv))` |
//! | Relative | Multiplicative | `clamp(base * 2^((cv - 0.5) * span), min, max)` |
//! | Relative | Additive | `clamp(base + (cv - 0.5) * range, min, max)` |
//!
//! Under the relative policy the CV midpoint `0.5` always reproduces `base`
//! exactly: the exponent (or offset) is exactly zero there.

use serde::{Deserialize, Serialize};

use crate::param_info::{ModulationKind, ParamDescriptor};

/// CV midpoint: the relative policy's neutral value.
pub const CV_CENTER: f32 = 0.5;

/// How a connected CV combines with a parameter's base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModulationPolicy {
    /// CV offsets (or scales) the base value around the midpoint.
    #[default]
    Relative,
    /// CV spans the parameter's full declared range; base is ignored.
    Absolute,
}

/// Resolves one parameter value.
///
/// `cv` is `None` when the parameter's CV input is unconnected. Pure and
/// allocation-free; safe to call per sample.
///
/// # Example
///
/// ```rust
/// use patchwire_core::{ParamDescriptor, ModulationPolicy, modulate};
///
/// let attack = ParamDescriptor::time_seconds("Attack", "Atk", 0.001, 5.0, 0.01);
///
/// // Unconnected: base passes through.
/// assert_eq!(modulate(0.01, None, ModulationPolicy::Relative, &attack), 0.01);
///
/// // Relative, two-octave span, CV at 0.75: up half an octave.
/// let v = modulate(0.01, Some(0.75), ModulationPolicy::Relative, &attack);
/// assert!((v - 0.01 * 2f32.sqrt()).abs() < 1e-6);
///
/// // Absolute: CV covers the declared range.
/// assert_eq!(modulate(0.01, Some(1.0), ModulationPolicy::Absolute, &attack), 5.0);
/// ```
#[inline]
pub fn modulate(base: f32, cv: Option<f32>, policy: ModulationPolicy, desc: &ParamDescriptor) -> f32 {
    let Some(cv) = cv else {
        return base;
    };
    let cv = clamp01(cv);
    match policy {
        ModulationPolicy::Absolute => lerp(desc.min, desc.max, cv),
        ModulationPolicy::Relative => {
            let offset = cv - CV_CENTER;
            let value = match desc.modulation {
                ModulationKind::Multiplicative { span_octaves } => {
                    base * libm::exp2f(offset * span_octaves)
                }
                ModulationKind::Additive { range } => base + offset * range,
            };
            desc.clamp(value)
        }
    }
}

/// Clamp to `[0, 1]`; NaN maps to the midpoint so a broken CV source is neutral.
#[inline]
pub fn clamp01(value: f32) -> f32 {
    if value.is_nan() {
        CV_CENTER
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Linear interpolation from `a` (t = 0) to `b` (t = 1).
///
/// Exact at both endpoints.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    if t >= 1.0 {
        b
    } else {
        a + (b - a) * t
    }
}

/// Per-parameter modulation state held by a unit.
///
/// Owns the parameter's base value and remembers the last resolved value for
/// live-value inspection.
#[derive(Debug, Clone)]
pub struct ModulatedParam {
    desc: ParamDescriptor,
    policy: ModulationPolicy,
    base: f32,
    value: f32,
}

impl ModulatedParam {
    /// Creates a parameter at its default value, using the descriptor's policy.
    pub fn new(desc: ParamDescriptor) -> Self {
        let base = desc.clamp(desc.default);
        Self {
            desc,
            policy: desc.policy,
            base,
            value: base,
        }
    }

    /// Descriptor of this parameter.
    pub fn descriptor(&self) -> &ParamDescriptor {
        &self.desc
    }

    /// Active policy.
    pub fn policy(&self) -> ModulationPolicy {
        self.policy
    }

    /// Overrides the policy (from a binding declaration).
    pub fn set_policy(&mut self, policy: ModulationPolicy) {
        self.policy = policy;
    }

    /// Current base value.
    pub fn base(&self) -> f32 {
        self.base
    }

    /// Sets the base value, clamped to the declared range.
    pub fn set_base(&mut self, value: f32) {
        self.base = self.desc.clamp(value);
    }

    /// Most recently resolved value.
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Resolves against a CV sample (or `None` when unconnected) and remembers the result.
    #[inline]
    pub fn resolve(&mut self, cv: Option<f32>) -> f32 {
        self.value = modulate(self.base, cv, self.policy, &self.desc);
        self.value
    }
}
