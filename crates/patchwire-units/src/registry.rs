//! Lookup of reference units by name.
//!
//! Configuration files and the CLI refer to units by a lowercase kind name.
//! [`UnitKind`] maps that name to the unit's parameter declarations, its
//! routable virtual targets, its default shape, and a constructor.
//!
//! # Example
//!
//! ```rust
//! use patchwire_units::UnitKind;
//!
//! let kind = UnitKind::from_name("scanner").unwrap();
//! let unit = kind.build_default()?;
//! assert_eq!(unit.descriptor().name(), "scanner");
//! assert!(kind.virtual_targets().contains(&"position"));
//! # Ok::<(), patchwire_core::Error>(())
//! ```

use std::fmt;

use patchwire_core::{ParamDescriptor, ProcessingUnit, Result, UnitDescriptor};
use serde::{Deserialize, Serialize};

use crate::envelope::{self, EnvelopeUnit};
use crate::follower::{self, SensorFollower};
use crate::scanner::{self, CurveScanner};

/// Built-in unit kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Gate-driven ADSR envelope.
    Envelope,
    /// Playhead over a breakpoint curve.
    Scanner,
    /// Smoothed external sensor.
    Follower,
}

impl UnitKind {
    /// Every kind, in display order.
    pub const ALL: [UnitKind; 3] = [UnitKind::Envelope, UnitKind::Scanner, UnitKind::Follower];

    /// Lowercase identifier used in configuration.
    pub const fn name(&self) -> &'static str {
        match self {
            UnitKind::Envelope => "envelope",
            UnitKind::Scanner => "scanner",
            UnitKind::Follower => "follower",
        }
    }

    /// One-line description.
    pub const fn description(&self) -> &'static str {
        match self {
            UnitKind::Envelope => "Attack-decay-sustain-release contour driven by a gate",
            UnitKind::Scanner => "Curve playhead under CV, manual, or free-running control",
            UnitKind::Follower => "Worker-polled sensor with smoothing and gain",
        }
    }

    /// Parses an identifier, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    /// Parameter declarations.
    pub fn params(&self) -> Vec<ParamDescriptor> {
        match self {
            UnitKind::Envelope => envelope::params(),
            UnitKind::Scanner => scanner::params(),
            UnitKind::Follower => follower::params(),
        }
    }

    /// Names that may be routed without a backing parameter.
    pub fn virtual_targets(&self) -> &'static [&'static str] {
        match self {
            UnitKind::Scanner => &[scanner::POSITION],
            UnitKind::Envelope | UnitKind::Follower => &[],
        }
    }

    /// Default bus layout and routing.
    pub fn default_descriptor(&self) -> Result<UnitDescriptor> {
        match self {
            UnitKind::Envelope => envelope::default_descriptor(),
            UnitKind::Scanner => scanner::default_descriptor(),
            UnitKind::Follower => follower::default_descriptor(),
        }
    }

    /// Builds a unit of this kind with a validated shape.
    pub fn build(&self, descriptor: UnitDescriptor) -> Result<Box<dyn ProcessingUnit>> {
        Ok(match self {
            UnitKind::Envelope => Box::new(EnvelopeUnit::from_descriptor(descriptor)?),
            UnitKind::Scanner => Box::new(CurveScanner::from_descriptor(descriptor)?),
            UnitKind::Follower => Box::new(SensorFollower::from_descriptor(descriptor)?),
        })
    }

    /// Builds a unit of this kind with its default shape.
    pub fn build_default(&self) -> Result<Box<dyn ProcessingUnit>> {
        self.build(self.default_descriptor()?)
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in UnitKind::ALL {
            assert_eq!(UnitKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(UnitKind::from_name("ENVELOPE"), Some(UnitKind::Envelope));
        assert_eq!(UnitKind::from_name("reverb"), None);
    }

    #[test]
    fn default_descriptors_are_valid() {
        for kind in UnitKind::ALL {
            let desc = kind.default_descriptor().unwrap();
            assert_eq!(desc.name(), kind.name());
            assert_eq!(desc.params().len(), kind.params().len());
            for name in kind.virtual_targets() {
                assert!(desc.router().target(name).is_some());
            }
        }
    }

    #[test]
    fn every_kind_builds() {
        for kind in UnitKind::ALL {
            let unit = kind.build_default().unwrap();
            for param in kind.params() {
                assert_eq!(unit.live_value(param.id), Some(param.default));
            }
        }
    }

    #[test]
    fn string_ids_are_unique_across_a_kind() {
        for kind in UnitKind::ALL {
            let params = kind.params();
            for (i, p) in params.iter().enumerate() {
                assert!(!p.string_id.is_empty());
                assert!(params[..i].iter().all(|q| q.string_id != p.string_id));
                assert!(!kind.virtual_targets().contains(&p.string_id));
            }
        }
    }
}
