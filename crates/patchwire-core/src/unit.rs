//! The processing-unit contract.
//!
//! Every unit declares, once at construction, its input and output buses,
//! its parameters, and where each parameter's CV is routed
//! ([`UnitDescriptor`]). The shape never changes afterwards. The external
//! scheduler then calls [`ProcessingUnit::prepare`] once and
//! [`ProcessingUnit::process`] once per block.
//!
//! A block invocation follows the same order in every unit: resolve
//! modulated parameters (usually through a [`ParamBank`](crate::ParamBank)),
//! run the unit's own per-sample algorithm, write outputs, and hand anything
//! else off through channels or snapshots without blocking.

use crate::block::ProcessContext;
use crate::bus::BusSet;
use crate::param_info::{ParamDescriptor, ParamId};
use crate::property::PropertyBag;
use crate::router::{Connectivity, ModulationRouter, ParamTarget};
use crate::{Error, Result};

/// Fixed shape of a unit.
#[derive(Debug, Clone)]
pub struct UnitDescriptor {
    name: String,
    inputs: BusSet,
    outputs: BusSet,
    params: Vec<ParamDescriptor>,
    router: ModulationRouter,
}

impl UnitDescriptor {
    /// Validates and assembles a unit shape.
    ///
    /// Fails if a parameter descriptor is invalid, two parameters share an id
    /// or string id, or a real-parameter binding names an undeclared parameter.
    pub fn new(
        name: impl Into<String>,
        inputs: BusSet,
        outputs: BusSet,
        params: Vec<ParamDescriptor>,
        router: ModulationRouter,
    ) -> Result<Self> {
        let name = name.into();
        for (i, param) in params.iter().enumerate() {
            param.validate()?;
            let clash = params[..i].iter().any(|other| {
                other.id == param.id
                    || (!param.string_id.is_empty() && other.string_id == param.string_id)
            });
            if clash {
                return Err(Error::DuplicateParameter(param.name.to_string()));
            }
        }
        for binding in router.iter() {
            if let ParamTarget::Real(id) = binding.target {
                if !params.iter().any(|p| p.id == id) {
                    return Err(Error::UnknownParameter(binding.name.clone()));
                }
            }
        }
        tracing::debug!(
            unit = %name,
            inputs = inputs.total_channels(),
            outputs = outputs.total_channels(),
            params = params.len(),
            bindings = router.len(),
            "unit declared"
        );
        Ok(Self {
            name,
            inputs,
            outputs,
            params,
            router,
        })
    }

    /// Unit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input buses.
    pub fn inputs(&self) -> &BusSet {
        &self.inputs
    }

    /// Output buses.
    pub fn outputs(&self) -> &BusSet {
        &self.outputs
    }

    /// Parameter descriptors in declaration order.
    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    /// Routing table.
    pub fn router(&self) -> &ModulationRouter {
        &self.router
    }

    /// Descriptor by stable id.
    pub fn param(&self, id: ParamId) -> Option<&ParamDescriptor> {
        self.params.iter().find(|p| p.id == id)
    }

    /// Descriptor by string id. Configuration-time only.
    pub fn find_param(&self, string_id: &str) -> Option<&ParamDescriptor> {
        self.params.iter().find(|p| p.string_id == string_id)
    }
}

/// Interface every processing unit implements.
///
/// `process` runs on the real-time thread: it must not block, lock, allocate,
/// or log. Everything else is called from non-real-time code.
pub trait ProcessingUnit: Send {
    /// Fixed shape of this unit.
    fn descriptor(&self) -> &UnitDescriptor;

    /// One-time setup before the first block. Allocates whatever the block
    /// path needs for blocks of up to `max_block_size` frames.
    fn prepare(&mut self, sample_rate: f32, max_block_size: usize);

    /// Processes one block.
    ///
    /// A unit that has not been prepared writes silence.
    fn process(&mut self, ctx: &mut ProcessContext<'_>);

    /// Clears internal state (phases, envelopes) without touching parameters.
    fn reset(&mut self) {}

    /// Most recently resolved value of a parameter, for inspection.
    fn live_value(&self, id: ParamId) -> Option<f32>;

    /// Whether a target's CV input is connected in `graph`.
    fn is_connected(&self, target: ParamTarget, graph: &dyn Connectivity) -> bool {
        self.descriptor().router().is_connected(target, graph)
    }

    /// Extra state for the persistence collaborator.
    fn save_state(&self) -> PropertyBag {
        PropertyBag::new()
    }

    /// Restores state produced by [`save_state`](Self::save_state).
    ///
    /// Called before the unit resumes processing. A unit that keeps shared
    /// state publishes one fresh snapshot built from `state`.
    fn load_state(&mut self, state: &PropertyBag) -> Result<()> {
        let _ = state;
        Ok(())
    }
}
