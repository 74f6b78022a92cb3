//! Modulation routing.
//!
//! A [`ModulationRouter`] maps each modulation target of a unit to the input
//! channel its live CV is read from. Targets are either real parameters
//! (identified by [`ParamId`]) or virtual modulation targets with no backing
//! value (identified by a dense [`VirtualId`]). Names are only used while
//! building; at runtime every lookup is by index or by sorted id.
//!
//! The router holds no connectivity state. Whether a binding currently has a
//! cable attached is asked of the owning graph through [`Connectivity`].
//!
//! # Example
//!
//! ```rust
//! use patchwire_core::{
//!     BusLayout, BusSet, ChannelRole, ConnectionSet, ParamId, RouterBuilder,
//! };
//!
//! let inputs = BusSet::new(vec![
//!     BusLayout::uniform("main", ChannelRole::Signal, 2),
//!     BusLayout::uniform("mod", ChannelRole::ControlVoltage, 2),
//! ])?;
//!
//! let mut builder = RouterBuilder::new(&inputs);
//! let attack = builder.bind_param("attack", ParamId(1), 1, 0)?;
//! let wobble = builder.bind_virtual("wobble", 1, 1)?;
//! let router = builder.build();
//!
//! assert_eq!(router.resolve(attack).unwrap().absolute, 2);
//! assert_eq!(router.resolve(wobble).unwrap().absolute, 3);
//!
//! let mut graph = ConnectionSet::new(inputs.total_channels());
//! graph.connect(3);
//! assert!(!router.is_connected(attack, &graph));
//! assert!(router.is_connected(wobble, &graph));
//! # Ok::<(), patchwire_core::Error>(())
//! ```

use crate::block::ProcessContext;
use crate::bus::{BusSet, ChannelAddress, Polarity, normalize_cv};
use crate::modulation::ModulationPolicy;
use crate::param_info::ParamId;
use crate::{Error, Result};

/// Dense index of a virtual modulation target within one router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualId(u16);

impl VirtualId {
    /// Raw index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Anything CV can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamTarget {
    /// A parameter with a persistent base value.
    Real(ParamId),
    /// A modulation-only target with no stored value.
    Virtual(VirtualId),
}

/// One routing entry: where a target's live CV is read from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterBinding {
    /// Configuration-time name.
    pub name: String,
    /// Routed target.
    pub target: ParamTarget,
    /// Input channel carrying the CV.
    pub address: ChannelAddress,
    /// Value convention of that channel.
    pub polarity: Polarity,
    /// Policy override; `None` keeps the parameter's own default.
    pub policy: Option<ModulationPolicy>,
}

/// Answers whether an input channel of a unit currently has a connection.
///
/// Implemented by the owning graph. The router never caches the answer.
pub trait Connectivity {
    /// Whether the input at this absolute channel index is connected.
    fn is_input_connected(&self, absolute: usize) -> bool;
}

impl<T: Connectivity + ?Sized> Connectivity for &T {
    fn is_input_connected(&self, absolute: usize) -> bool {
        (**self).is_input_connected(absolute)
    }
}

/// Fixed bitset of connected input channels.
///
/// A graph typically builds one per unit whenever cables change and publishes
/// it through a [`SnapshotSwap`](crate::SnapshotSwap).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionSet {
    bits: Vec<u64>,
    channels: usize,
}

impl ConnectionSet {
    /// All `channels` inputs disconnected.
    pub fn new(channels: usize) -> Self {
        Self {
            bits: vec![0; channels.div_ceil(64)],
            channels,
        }
    }

    /// Builds a set with the listed channels connected.
    pub fn with_connected(channels: usize, connected: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::new(channels);
        for ch in connected {
            set.connect(ch);
        }
        set
    }

    /// Number of channels covered.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Marks a channel connected. Out-of-range indices are ignored.
    pub fn connect(&mut self, absolute: usize) {
        self.set(absolute, true);
    }

    /// Marks a channel disconnected.
    pub fn disconnect(&mut self, absolute: usize) {
        self.set(absolute, false);
    }

    /// Sets a channel's state.
    pub fn set(&mut self, absolute: usize, connected: bool) {
        if absolute >= self.channels {
            return;
        }
        let (word, bit) = (absolute / 64, absolute % 64);
        if connected {
            self.bits[word] |= 1 << bit;
        } else {
            self.bits[word] &= !(1 << bit);
        }
    }

    /// Number of connected channels.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}

impl Connectivity for ConnectionSet {
    #[inline]
    fn is_input_connected(&self, absolute: usize) -> bool {
        if absolute >= self.channels {
            return false;
        }
        self.bits[absolute / 64] & (1 << (absolute % 64)) != 0
    }
}

/// Builds a [`ModulationRouter`] against a unit's input buses.
///
/// Every address is validated against the buses here, and every duplicate
/// name or target is rejected here, so a built router can never fail.
#[derive(Debug)]
pub struct RouterBuilder<'a> {
    inputs: &'a BusSet,
    bindings: Vec<ParameterBinding>,
}

impl<'a> RouterBuilder<'a> {
    /// Starts an empty routing table for the given input buses.
    pub fn new(inputs: &'a BusSet) -> Self {
        Self {
            inputs,
            bindings: Vec::new(),
        }
    }

    fn check_unique(&self, name: &str, target: Option<ParamTarget>) -> Result<()> {
        let clash = self
            .bindings
            .iter()
            .any(|b| b.name == name || Some(b.target) == target);
        if clash {
            return Err(Error::DuplicateBinding(name.to_string()));
        }
        Ok(())
    }

    fn push(&mut self, name: &str, target: ParamTarget, bus: usize, channel: usize) -> Result<()> {
        let address = self.inputs.checked_address(bus, channel)?;
        let polarity = self
            .inputs
            .bus(bus)
            .and_then(|b| b.channel(channel))
            .map(|spec| spec.polarity)
            .unwrap_or_default();
        self.bindings.push(ParameterBinding {
            name: name.to_string(),
            target,
            address,
            polarity,
            policy: None,
        });
        Ok(())
    }

    /// Routes a real parameter's CV to `(bus, channel)`.
    pub fn bind_param(
        &mut self,
        name: &str,
        id: ParamId,
        bus: usize,
        channel: usize,
    ) -> Result<ParamTarget> {
        let target = ParamTarget::Real(id);
        self.check_unique(name, Some(target))?;
        self.push(name, target, bus, channel)?;
        Ok(target)
    }

    /// Declares a virtual target routed to `(bus, channel)`.
    pub fn bind_virtual(&mut self, name: &str, bus: usize, channel: usize) -> Result<ParamTarget> {
        self.check_unique(name, None)?;
        let virtual_count = self
            .bindings
            .iter()
            .filter(|b| matches!(b.target, ParamTarget::Virtual(_)))
            .count();
        let index = u16::try_from(virtual_count).map_err(|_| {
            Error::invalid_modulation(name, "too many virtual targets on one unit")
        })?;
        let target = ParamTarget::Virtual(VirtualId(index));
        self.push(name, target, bus, channel)?;
        Ok(target)
    }

    /// Overrides the policy of an already-bound target.
    pub fn set_policy(&mut self, name: &str, policy: ModulationPolicy) -> Result<()> {
        let binding = self
            .bindings
            .iter_mut()
            .find(|b| b.name == name)
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))?;
        binding.policy = Some(policy);
        Ok(())
    }

    /// Finishes the table.
    pub fn build(self) -> ModulationRouter {
        let mut real: Vec<(ParamId, usize)> = Vec::new();
        let mut virtuals: Vec<usize> = Vec::new();
        for (slot, binding) in self.bindings.iter().enumerate() {
            match binding.target {
                ParamTarget::Real(id) => real.push((id, slot)),
                ParamTarget::Virtual(v) => {
                    debug_assert_eq!(v.index(), virtuals.len());
                    virtuals.push(slot);
                }
            }
        }
        real.sort_unstable_by_key(|&(id, _)| id);
        tracing::debug!(
            real = real.len(),
            virtual_targets = virtuals.len(),
            "modulation router built"
        );
        ModulationRouter {
            bindings: self.bindings,
            real,
            virtuals,
        }
    }
}

/// Read-only routing table of one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModulationRouter {
    bindings: Vec<ParameterBinding>,
    /// Sorted by id for binary search.
    real: Vec<(ParamId, usize)>,
    /// Indexed by `VirtualId`.
    virtuals: Vec<usize>,
}

impl ModulationRouter {
    /// A router with no bindings.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if nothing is routed.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterates bindings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ParameterBinding> {
        self.bindings.iter()
    }

    /// Binding for a target.
    #[inline]
    pub fn binding(&self, target: ParamTarget) -> Option<&ParameterBinding> {
        let slot = match target {
            ParamTarget::Real(id) => {
                let pos = self.real.binary_search_by_key(&id, |&(id, _)| id).ok()?;
                self.real[pos].1
            }
            ParamTarget::Virtual(v) => *self.virtuals.get(v.index())?,
        };
        self.bindings.get(slot)
    }

    /// Where a target's CV is read from, or `None` if it is not routed.
    #[inline]
    pub fn resolve(&self, target: ParamTarget) -> Option<ChannelAddress> {
        self.binding(target).map(|b| b.address)
    }

    /// Whether the target's CV input is currently connected in the graph.
    #[inline]
    pub fn is_connected(&self, target: ParamTarget, graph: &dyn Connectivity) -> bool {
        self.resolve(target)
            .is_some_and(|addr| graph.is_input_connected(addr.absolute))
    }

    /// Normalized CV for a target at one frame, `None` when unrouted or unconnected.
    #[inline]
    pub fn cv(&self, target: ParamTarget, ctx: &ProcessContext<'_>, frame: usize) -> Option<f32> {
        let binding = self.binding(target)?;
        if !ctx.connectivity().is_input_connected(binding.address.absolute) {
            return None;
        }
        Some(normalize_cv(
            ctx.input_sample(binding.address.absolute, frame),
            binding.polarity,
        ))
    }

    /// Looks a target up by its configuration name. Not for the block path.
    pub fn target(&self, name: &str) -> Option<ParamTarget> {
        self.bindings.iter().find(|b| b.name == name).map(|b| b.target)
    }
}
