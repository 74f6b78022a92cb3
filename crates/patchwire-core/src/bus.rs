//! Bus and channel model.
//!
//! A unit declares its inputs and outputs as an ordered list of buses. Each
//! bus is a fixed-length list of channels, and each channel carries a semantic
//! [`ChannelRole`]. Channel counts never change after construction, so a
//! `(bus, channel)` pair validated by [`BusSet::address`] stays valid for the
//! unit's lifetime.
//!
//! Channels of all buses are laid out back to back: the absolute index of
//! channel `c` on bus `b` is the sum of the channel counts of buses `0..b`
//! plus `c`. Blocks are indexed by absolute channel.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum channels per bus.
pub const MAX_BUS_CHANNELS: usize = 64;

/// Semantic role of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    /// Audio-rate signal.
    Signal,
    /// Gate or trigger.
    Gate,
    /// Control voltage driving a parameter.
    #[serde(rename = "cv")]
    ControlVoltage,
    /// Raw scalar with no implied range.
    Raw,
    /// Reference into an externally owned frame (video, sensor image).
    FrameRef,
}

impl ChannelRole {
    /// Default polarity for this role.
    ///
    /// Signals and raw scalars are bipolar; gates, CV, and frame references
    /// are unipolar. Declarations may override this per channel.
    pub const fn default_polarity(self) -> Polarity {
        match self {
            ChannelRole::Signal | ChannelRole::Raw => Polarity::Bipolar,
            ChannelRole::Gate | ChannelRole::ControlVoltage | ChannelRole::FrameRef => {
                Polarity::Unipolar
            }
        }
    }

    /// Lower-case name used in declarations.
    pub const fn as_str(self) -> &'static str {
        match self {
            ChannelRole::Signal => "signal",
            ChannelRole::Gate => "gate",
            ChannelRole::ControlVoltage => "cv",
            ChannelRole::Raw => "raw",
            ChannelRole::FrameRef => "frame_ref",
        }
    }
}

/// Value convention of a channel.
///
/// There is deliberately no automatic detection: a bipolar `-1.0` and a
/// unipolar `0.0` both mean "bottom of range", and a sign test cannot tell
/// them apart. The polarity must be declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Values in `[0, 1]`.
    #[default]
    Unipolar,
    /// Values in `[-1, 1]`.
    Bipolar,
}

/// Maps a sample to the normalized `[0, 1]` CV range under an explicit polarity.
///
/// NaN maps to the midpoint, the neutral value for relative modulation.
///
/// # Example
///
/// ```rust
/// use patchwire_core::{Polarity, normalize_cv};
///
/// assert_eq!(normalize_cv(0.0, Polarity::Bipolar), 0.5);
/// assert_eq!(normalize_cv(-1.0, Polarity::Bipolar), 0.0);
/// assert_eq!(normalize_cv(0.0, Polarity::Unipolar), 0.0);
/// assert_eq!(normalize_cv(1.7, Polarity::Unipolar), 1.0);
/// ```
#[inline]
pub fn normalize_cv(sample: f32, polarity: Polarity) -> f32 {
    let unipolar = match polarity {
        Polarity::Unipolar => sample,
        Polarity::Bipolar => (sample + 1.0) * 0.5,
    };
    crate::modulation::clamp01(unipolar)
}

/// One channel of a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelSpec {
    /// Semantic role.
    pub role: ChannelRole,
    /// Value convention.
    pub polarity: Polarity,
}

impl ChannelSpec {
    /// A channel with the role's default polarity.
    pub const fn new(role: ChannelRole) -> Self {
        Self {
            role,
            polarity: role.default_polarity(),
        }
    }

    /// Overrides the polarity.
    pub const fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }
}

impl From<ChannelRole> for ChannelSpec {
    fn from(role: ChannelRole) -> Self {
        Self::new(role)
    }
}

/// A named, fixed-length group of channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusLayout {
    name: String,
    channels: Vec<ChannelSpec>,
}

impl BusLayout {
    /// Declares a bus from its channel specs.
    ///
    /// Shape is checked when the bus is added to a [`BusSet`].
    pub fn new<I, C>(name: impl Into<String>, channels: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ChannelSpec>,
    {
        Self {
            name: name.into(),
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }

    /// Declares a bus of `count` channels sharing one role.
    pub fn uniform(name: impl Into<String>, role: ChannelRole, count: usize) -> Self {
        Self::new(name, core::iter::repeat_n(role, count))
    }

    /// Bus name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if the bus has no channels (never valid in a [`BusSet`]).
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Spec of the given channel, if in range.
    pub fn channel(&self, index: usize) -> Option<&ChannelSpec> {
        self.channels.get(index)
    }

    /// Iterates over channel specs in order.
    pub fn channels(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.channels.iter()
    }

    fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(Error::EmptyBus {
                bus: self.name.clone(),
            });
        }
        if self.channels.len() > MAX_BUS_CHANNELS {
            return Err(Error::TooManyChannels {
                bus: self.name.clone(),
                count: self.channels.len(),
                max: MAX_BUS_CHANNELS,
            });
        }
        Ok(())
    }
}

/// Resolved location of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelAddress {
    /// Bus index within the set.
    pub bus: usize,
    /// Channel index within the bus.
    pub channel: usize,
    /// Absolute channel index across all buses.
    pub absolute: usize,
}

/// Ordered set of buses on one side (inputs or outputs) of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BusSet {
    buses: Vec<BusLayout>,
    offsets: Vec<usize>,
    total: usize,
}

impl BusSet {
    /// Validates and lays out the given buses.
    ///
    /// Fails if any bus is empty or wider than [`MAX_BUS_CHANNELS`].
    pub fn new(buses: Vec<BusLayout>) -> Result<Self> {
        let mut offsets = Vec::with_capacity(buses.len());
        let mut total = 0;
        for bus in &buses {
            bus.validate()?;
            offsets.push(total);
            total += bus.len();
        }
        Ok(Self {
            buses,
            offsets,
            total,
        })
    }

    /// A set with no buses (for units without inputs or outputs).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of buses.
    pub fn len(&self) -> usize {
        self.buses.len()
    }

    /// Returns `true` if no buses are declared.
    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    /// Total channel count across all buses.
    pub fn total_channels(&self) -> usize {
        self.total
    }

    /// Bus at the given index.
    pub fn bus(&self, index: usize) -> Option<&BusLayout> {
        self.buses.get(index)
    }

    /// Iterates over buses in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &BusLayout> {
        self.buses.iter()
    }

    /// Finds a bus index by name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.buses.iter().position(|b| b.name == name)
    }

    /// Resolves `(bus, channel)` to a full address, or `None` if out of range.
    #[inline]
    pub fn address(&self, bus: usize, channel: usize) -> Option<ChannelAddress> {
        let layout = self.buses.get(bus)?;
        if channel >= layout.len() {
            return None;
        }
        Some(ChannelAddress {
            bus,
            channel,
            absolute: self.offsets[bus] + channel,
        })
    }

    /// Like [`address`](Self::address) but reports why resolution failed.
    pub fn checked_address(&self, bus: usize, channel: usize) -> Result<ChannelAddress> {
        let layout = self.buses.get(bus).ok_or(Error::UnknownBus(bus))?;
        self.address(bus, channel)
            .ok_or_else(|| Error::ChannelOutOfRange {
                bus: layout.name.clone(),
                channel,
                count: layout.len(),
            })
    }

    /// Inverse of [`address`](Self::address): absolute index to `(bus, channel)`.
    pub fn locate(&self, absolute: usize) -> Option<ChannelAddress> {
        if absolute >= self.total {
            return None;
        }
        // Offsets are sorted; last offset <= absolute wins.
        let bus = self.offsets.partition_point(|&o| o <= absolute) - 1;
        Some(ChannelAddress {
            bus,
            channel: absolute - self.offsets[bus],
            absolute,
        })
    }

    /// Channel spec at an absolute index.
    pub fn spec(&self, absolute: usize) -> Option<&ChannelSpec> {
        let addr = self.locate(absolute)?;
        self.buses[addr.bus].channel(addr.channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_buses() -> BusSet {
        BusSet::new(vec![
            BusLayout::new(
                "main",
                [ChannelRole::Signal, ChannelRole::Signal, ChannelRole::Gate],
            ),
            BusLayout::uniform("mod", ChannelRole::ControlVoltage, 4),
        ])
        .unwrap()
    }

    #[test]
    fn absolute_indices_follow_declaration_order() {
        let set = two_buses();
        assert_eq!(set.total_channels(), 7);
        assert_eq!(set.address(0, 0).unwrap().absolute, 0);
        assert_eq!(set.address(0, 2).unwrap().absolute, 2);
        assert_eq!(set.address(1, 0).unwrap().absolute, 3);
        assert_eq!(set.address(1, 3).unwrap().absolute, 6);
    }

    #[test]
    fn out_of_range_addresses_are_none() {
        let set = two_buses();
        assert!(set.address(0, 3).is_none());
        assert!(set.address(2, 0).is_none());
        assert!(matches!(set.checked_address(2, 0), Err(Error::UnknownBus(2))));
        assert!(matches!(
            set.checked_address(1, 4),
            Err(Error::ChannelOutOfRange { channel: 4, count: 4, .. })
        ));
    }

    #[test]
    fn locate_inverts_address() {
        let set = two_buses();
        for abs in 0..set.total_channels() {
            let addr = set.locate(abs).unwrap();
            assert_eq!(set.address(addr.bus, addr.channel), Some(addr));
        }
        assert!(set.locate(7).is_none());
    }

    #[test]
    fn empty_bus_rejected() {
        let err = BusSet::new(vec![BusLayout::uniform("nothing", ChannelRole::Raw, 0)]);
        assert!(matches!(err, Err(Error::EmptyBus { .. })));
    }

    #[test]
    fn oversized_bus_rejected() {
        let err = BusSet::new(vec![BusLayout::uniform(
            "wide",
            ChannelRole::Signal,
            MAX_BUS_CHANNELS + 1,
        )]);
        assert!(matches!(err, Err(Error::TooManyChannels { .. })));
    }

    #[test]
    fn polarity_defaults_and_override() {
        assert_eq!(ChannelSpec::new(ChannelRole::Signal).polarity, Polarity::Bipolar);
        assert_eq!(ChannelSpec::new(ChannelRole::Gate).polarity, Polarity::Unipolar);
        let spec = ChannelSpec::new(ChannelRole::ControlVoltage).with_polarity(Polarity::Bipolar);
        assert_eq!(spec.polarity, Polarity::Bipolar);
    }

    #[test]
    fn normalize_is_explicit_about_polarity() {
        // Same normalized result, different raw inputs: no sign-based guessing.
        assert_eq!(normalize_cv(-1.0, Polarity::Bipolar), 0.0);
        assert_eq!(normalize_cv(0.0, Polarity::Unipolar), 0.0);
        assert_eq!(normalize_cv(0.0, Polarity::Bipolar), 0.5);
        assert_eq!(normalize_cv(f32::NAN, Polarity::Unipolar), 0.5);
        assert_eq!(normalize_cv(f32::NAN, Polarity::Bipolar), 0.5);
    }

    #[test]
    fn find_by_name() {
        let set = two_buses();
        assert_eq!(set.find("mod"), Some(1));
        assert_eq!(set.find("missing"), None);
    }
}
