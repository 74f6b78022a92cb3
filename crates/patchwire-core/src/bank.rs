//! Per-unit parameter state.
//!
//! [`ParamBank`] holds one [`ModulatedParam`] per declared parameter, applies
//! the binding's policy override once at construction, and on each block
//! resolves every parameter against its routed CV and publishes the results
//! to a [`LiveValues`] table.

use crate::block::ProcessContext;
use crate::live::LiveValues;
use crate::modulation::ModulatedParam;
use crate::param_info::{ParamDescriptor, ParamId};
use crate::property::PropertyBag;
use crate::router::{ModulationRouter, ParamTarget};
use crate::unit::UnitDescriptor;
use crate::{Error, Result};

/// Base values, resolved values, and live-value cells for one unit.
#[derive(Debug, Clone)]
pub struct ParamBank {
    params: Vec<ModulatedParam>,
    live: LiveValues,
}

impl ParamBank {
    /// Builds parameters at their defaults, applying binding policy overrides.
    pub fn new(params: &[ParamDescriptor], router: &ModulationRouter) -> Self {
        let params: Vec<ModulatedParam> = params
            .iter()
            .map(|desc| {
                let mut param = ModulatedParam::new(*desc);
                if let Some(policy) = router
                    .binding(ParamTarget::Real(desc.id))
                    .and_then(|b| b.policy)
                {
                    param.set_policy(policy);
                }
                param
            })
            .collect();
        let live = LiveValues::new(params.iter().map(|p| (p.descriptor().id, p.value())));
        Self { params, live }
    }

    /// Builds from a unit descriptor.
    pub fn for_unit(descriptor: &UnitDescriptor) -> Self {
        Self::new(descriptor.params(), descriptor.router())
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` if the unit has no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Slot of a parameter id.
    pub fn slot(&self, id: ParamId) -> Option<usize> {
        self.params.iter().position(|p| p.descriptor().id == id)
    }

    /// Parameter by slot.
    pub fn get(&self, slot: usize) -> Option<&ModulatedParam> {
        self.params.get(slot)
    }

    /// Base value by id.
    pub fn base(&self, id: ParamId) -> Option<f32> {
        self.slot(id).map(|slot| self.params[slot].base())
    }

    /// Sets a base value by id, clamped to its range.
    pub fn set_base(&mut self, id: ParamId, value: f32) -> Result<()> {
        let slot = self
            .slot(id)
            .ok_or_else(|| Error::UnknownParameter(format!("#{}", id.0)))?;
        self.params[slot].set_base(value);
        Ok(())
    }

    /// Last resolved value by slot (`0.0` for an unknown slot).
    #[inline]
    pub fn value(&self, slot: usize) -> f32 {
        self.params.get(slot).map_or(0.0, ModulatedParam::value)
    }

    /// Handle for UI inspection.
    pub fn live(&self) -> LiveValues {
        self.live.clone()
    }

    /// Latest resolved value by id.
    pub fn live_value(&self, id: ParamId) -> Option<f32> {
        self.live.get(id)
    }

    /// Resolves every parameter at the block's first frame.
    ///
    /// Real-time safe.
    #[inline]
    pub fn resolve_block(&mut self, router: &ModulationRouter, ctx: &ProcessContext<'_>) {
        for slot in 0..self.params.len() {
            self.resolve_at(slot, router, ctx, 0);
        }
    }

    /// Resolves one parameter at a given frame, for sample-accurate units.
    #[inline]
    pub fn resolve_at(
        &mut self,
        slot: usize,
        router: &ModulationRouter,
        ctx: &ProcessContext<'_>,
        frame: usize,
    ) -> f32 {
        let Some(param) = self.params.get_mut(slot) else {
            return 0.0;
        };
        let cv = router.cv(ParamTarget::Real(param.descriptor().id), ctx, frame);
        let value = param.resolve(cv);
        self.live.store(slot, value);
        value
    }

    /// Writes base values under their string ids.
    pub fn save_into(&self, bag: &mut PropertyBag) {
        for param in &self.params {
            let desc = param.descriptor();
            if !desc.string_id.is_empty() {
                bag.set(desc.string_id, param.base());
            }
        }
    }

    /// Parses every base value present in `bag` without touching the bank.
    ///
    /// Fails on the first key with the wrong type, leaving nothing staged.
    pub fn stage(&self, bag: &PropertyBag) -> Result<StagedBases> {
        let mut staged = Vec::new();
        for (slot, param) in self.params.iter().enumerate() {
            let key = param.descriptor().string_id;
            if key.is_empty() || !bag.contains(key) {
                continue;
            }
            staged.push((slot, bag.require_f64(key)? as f32));
        }
        Ok(StagedBases(staged))
    }

    /// Applies values produced by [`stage`](Self::stage).
    pub fn apply(&mut self, staged: StagedBases) {
        for (slot, value) in staged.0 {
            if let Some(param) = self.params.get_mut(slot) {
                param.set_base(value);
            }
        }
    }

    /// Restores base values present in `bag`. Missing keys keep their current value.
    ///
    /// All or nothing: a bad key leaves every base value unchanged.
    pub fn load_from(&mut self, bag: &PropertyBag) -> Result<()> {
        let staged = self.stage(bag)?;
        self.apply(staged);
        Ok(())
    }
}

/// Base values parsed from a property bag, not yet applied.
#[derive(Debug, Clone, Default)]
pub struct StagedBases(Vec<(usize, f32)>);

impl StagedBases {
    /// Number of staged values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the bag held none of the bank's keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::AudioBlock;
    use crate::bus::{BusLayout, BusSet, ChannelRole};
    use crate::modulation::ModulationPolicy;
    use crate::router::{ConnectionSet, RouterBuilder};
    use crate::transport::Transport;

    fn setup() -> (BusSet, ModulationRouter, Vec<ParamDescriptor>) {
        let inputs = BusSet::new(vec![BusLayout::uniform("cv", ChannelRole::ControlVoltage, 2)]).unwrap();
        let params = vec![
            ParamDescriptor::time_seconds("Attack", "Atk", 0.001, 5.0, 0.01).with_id(ParamId(1), "attack"),
            ParamDescriptor::level("Level", "Lvl", 0.0, 1.0, 0.5).with_id(ParamId(2), "level"),
        ];
        let mut builder = RouterBuilder::new(&inputs);
        builder.bind_param("attack", ParamId(1), 0, 0).unwrap();
        builder.bind_param("level", ParamId(2), 0, 1).unwrap();
        builder.set_policy("level", ModulationPolicy::Absolute).unwrap();
        let router = builder.build();
        (inputs, router, params)
    }

    #[test]
    fn policy_override_applied() {
        let (_, router, params) = setup();
        let bank = ParamBank::new(&params, &router);
        assert_eq!(bank.get(1).unwrap().policy(), ModulationPolicy::Absolute);
        assert_eq!(bank.get(0).unwrap().policy(), ModulationPolicy::Relative);
    }

    #[test]
    fn resolves_only_connected_inputs() {
        let (inputs, router, params) = setup();
        let mut bank = ParamBank::new(&params, &router);
        let mut block = AudioBlock::for_buses(&inputs, 4);
        block.fill_channel(0, 0.75);
        block.fill_channel(1, 0.2);
        let mut out = AudioBlock::new(0, 4);
        let transport = Transport::default();
        let graph = ConnectionSet::with_connected(2, [0]);
        let ctx = ProcessContext::new(&block, &mut out, 4, 48000.0, &transport, &graph);

        bank.resolve_block(&router, &ctx);
        assert!((bank.value(0) - 0.01 * 2f32.sqrt()).abs() < 1e-6);
        assert_eq!(bank.value(1), 0.5);
        assert_eq!(bank.live_value(ParamId(2)), Some(0.5));
        assert!((bank.live().get(ParamId(1)).unwrap() - 0.014142).abs() < 1e-5);
    }

    #[test]
    fn state_round_trip_through_bag() {
        let (_, router, params) = setup();
        let mut bank = ParamBank::new(&params, &router);
        bank.set_base(ParamId(1), 0.2).unwrap();
        let mut bag = PropertyBag::new();
        bank.save_into(&mut bag);

        let mut restored = ParamBank::new(&params, &router);
        restored.load_from(&bag).unwrap();
        assert!((restored.base(ParamId(1)).unwrap() - 0.2).abs() < 1e-7);
        assert!(restored.set_base(ParamId(99), 1.0).is_err());
    }

    #[test]
    fn bad_key_leaves_bank_untouched() {
        let (_, router, params) = setup();
        let mut bank = ParamBank::new(&params, &router);
        let bag = PropertyBag::new()
            .with("attack", 0.5_f64)
            .with("level", "loud");

        assert!(matches!(bank.load_from(&bag), Err(Error::InvalidState { .. })));
        assert!((bank.base(ParamId(1)).unwrap() - 0.01).abs() < 1e-7);
        assert_eq!(bank.base(ParamId(2)), Some(0.5));
    }
}
