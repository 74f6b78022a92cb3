//! Declaration validation.
//!
//! Checks everything about a [`UnitDeclaration`] that can be checked from
//! names alone: the unit kind, channel role names, policy names, binding
//! targets, and initial parameter values. Problems are collected rather than
//! reported one at a time. Shape checks that need the runtime (bus sizes,
//! binding addresses, duplicate bindings) happen when the descriptor is built.
//!
//! # Example
//!
//! ```rust
//! use patchwire_config::validation::{parse_channel, parse_policy};
//! use patchwire_core::{ChannelRole, ModulationPolicy, Polarity};
//!
//! let spec = parse_channel("main", "cv/bipolar")?;
//! assert_eq!(spec.role, ChannelRole::ControlVoltage);
//! assert_eq!(spec.polarity, Polarity::Bipolar);
//! assert_eq!(parse_policy("attack", "absolute")?, ModulationPolicy::Absolute);
//! # Ok::<(), patchwire_config::ValidationError>(())
//! ```

use patchwire_core::{ChannelRole, ChannelSpec, ModulationPolicy, Polarity};
use patchwire_units::UnitKind;
use thiserror::Error;

use crate::declaration::UnitDeclaration;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Unknown unit kind.
    #[error("unknown unit kind: {0}")]
    UnknownKind(String),

    /// Unknown channel role or polarity.
    #[error("unknown channel '{channel}' on bus '{bus}'")]
    UnknownChannel {
        /// Name of the bus.
        bus: String,
        /// The unrecognized channel entry.
        channel: String,
    },

    /// Unknown modulation policy.
    #[error("unknown policy '{policy}' for '{param}'")]
    UnknownPolicy {
        /// Binding target name.
        param: String,
        /// The unrecognized policy.
        policy: String,
    },

    /// Name that is neither a parameter nor a virtual target of the unit.
    #[error("unknown parameter '{param}' for unit kind '{kind}'")]
    UnknownParameter {
        /// Unit kind.
        kind: String,
        /// Name of the unrecognized parameter.
        param: String,
    },

    /// Initial value out of range.
    #[error("parameter '{param}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Name of the parameter.
        param: String,
        /// The value that was out of range.
        value: f64,
        /// Minimum allowed value.
        min: f32,
        /// Maximum allowed value.
        max: f32,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const ROLES: [ChannelRole; 5] = [
    ChannelRole::Signal,
    ChannelRole::Gate,
    ChannelRole::ControlVoltage,
    ChannelRole::Raw,
    ChannelRole::FrameRef,
];

/// Parses a channel entry: a role name, optionally followed by `/unipolar`
/// or `/bipolar` to override the role's default polarity.
pub fn parse_channel(bus: &str, entry: &str) -> ValidationResult<ChannelSpec> {
    let unknown = || ValidationError::UnknownChannel {
        bus: bus.to_string(),
        channel: entry.to_string(),
    };
    let (role, polarity) = match entry.split_once('/') {
        Some((role, polarity)) => (role.trim(), Some(polarity.trim())),
        None => (entry.trim(), None),
    };
    let role = ROLES
        .into_iter()
        .find(|r| r.as_str().eq_ignore_ascii_case(role))
        .ok_or_else(unknown)?;
    let spec = ChannelSpec::new(role);
    match polarity.map(str::to_ascii_lowercase).as_deref() {
        None => Ok(spec),
        Some("unipolar") => Ok(spec.with_polarity(Polarity::Unipolar)),
        Some("bipolar") => Ok(spec.with_polarity(Polarity::Bipolar)),
        Some(_) => Err(unknown()),
    }
}

/// Parses a policy name.
pub fn parse_policy(param: &str, policy: &str) -> ValidationResult<ModulationPolicy> {
    match policy.to_ascii_lowercase().as_str() {
        "relative" => Ok(ModulationPolicy::Relative),
        "absolute" => Ok(ModulationPolicy::Absolute),
        _ => Err(ValidationError::UnknownPolicy {
            param: param.to_string(),
            policy: policy.to_string(),
        }),
    }
}

/// Parses a unit kind name.
pub fn parse_kind(kind: &str) -> ValidationResult<UnitKind> {
    UnitKind::from_name(kind).ok_or_else(|| ValidationError::UnknownKind(kind.to_string()))
}

/// Whether `name` is a parameter string id or a virtual target of `kind`.
pub fn is_routable(kind: UnitKind, name: &str) -> bool {
    kind.params().iter().any(|p| p.string_id == name) || kind.virtual_targets().contains(&name)
}

/// Validates everything a declaration names, collecting every problem.
///
/// Returns the parsed unit kind on success.
pub fn validate_declaration(decl: &UnitDeclaration) -> ValidationResult<UnitKind> {
    let kind = parse_kind(decl.kind_name())?;
    let mut errors = Vec::new();

    for bus in decl.inputs.iter().chain(&decl.outputs) {
        for channel in &bus.channels {
            if let Err(e) = parse_channel(&bus.name, channel) {
                errors.push(e);
            }
        }
    }

    for binding in &decl.bindings {
        if !is_routable(kind, &binding.param) {
            errors.push(ValidationError::UnknownParameter {
                kind: kind.name().to_string(),
                param: binding.param.clone(),
            });
        }
        if let Some(policy) = &binding.policy
            && let Err(e) = parse_policy(&binding.param, policy)
        {
            errors.push(e);
        }
    }

    let params = kind.params();
    for (name, &value) in &decl.params {
        match params.iter().find(|p| p.string_id == name.as_str()) {
            Some(p) if !(value >= f64::from(p.min) && value <= f64::from(p.max)) => {
                errors.push(ValidationError::OutOfRange {
                    param: name.clone(),
                    value,
                    min: p.min,
                    max: p.max,
                });
            }
            Some(_) => {}
            None => errors.push(ValidationError::UnknownParameter {
                kind: kind.name().to_string(),
                param: name.clone(),
            }),
        }
    }

    match errors.len() {
        0 => Ok(kind),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}
