//! Unit declaration file format.

use std::collections::BTreeMap;
use std::path::Path;

use patchwire_core::{
    BusLayout, BusSet, ChannelSpec, ModulationPolicy, ParamTarget, ProcessingUnit, PropertyBag,
    RouterBuilder, UnitDescriptor,
};
use patchwire_units::UnitKind;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths::ensure_dir;
use crate::validation::{parse_channel, parse_policy, validate_declaration};

/// One bus: a name and its channel entries in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusDeclaration {
    /// Bus name.
    pub name: String,
    /// Channel roles, e.g. `"gate"`, `"cv"`, `"signal/unipolar"`.
    pub channels: Vec<String>,
}

impl BusDeclaration {
    /// Creates a bus declaration.
    pub fn new<I, S>(name: impl Into<String>, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }
}

/// Routes one parameter or virtual target to an input channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BindingDeclaration {
    /// Parameter string id or virtual target name.
    pub param: String,
    /// Input bus index.
    pub bus: usize,
    /// Channel within the bus.
    pub channel: usize,
    /// `"relative"` or `"absolute"`; omitted keeps the parameter's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

impl BindingDeclaration {
    /// Creates a binding with the parameter's default policy.
    pub fn new(param: impl Into<String>, bus: usize, channel: usize) -> Self {
        Self {
            param: param.into(),
            bus,
            channel,
            policy: None,
        }
    }

    /// Overrides the policy.
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }
}

/// Declaration of one unit: its kind, buses, routing, and initial values.
///
/// # TOML Format
///
/// ```toml
/// name = "lead_env"
/// kind = "envelope"
/// sample_rate = 48000
/// max_block_size = 256
///
/// [[inputs]]
/// name = "main"
/// channels = ["gate", "cv", "cv", "cv"]
///
/// [[outputs]]
/// name = "out"
/// channels = ["cv"]
///
/// [[bindings]]
/// param = "attack"
/// bus = 0
/// channel = 1
/// policy = "relative"
///
/// [params]
/// sustain = 0.5
/// ```
///
/// `kind` defaults to `name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitDeclaration {
    /// Unit name.
    pub name: String,

    /// Unit kind; falls back to `name` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Sample rate hint for offline hosts.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Largest block the host will request.
    #[serde(default = "default_max_block_size")]
    pub max_block_size: usize,

    /// Input buses in declaration order.
    #[serde(default)]
    pub inputs: Vec<BusDeclaration>,

    /// Output buses in declaration order.
    #[serde(default)]
    pub outputs: Vec<BusDeclaration>,

    /// CV routing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<BindingDeclaration>,

    /// Initial base values by parameter string id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, f64>,
}

fn default_sample_rate() -> u32 {
    48000
}

fn default_max_block_size() -> usize {
    256
}

impl UnitDeclaration {
    /// Creates an empty declaration of `kind`.
    pub fn new(name: impl Into<String>, kind: UnitKind) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind.name().to_string()),
            sample_rate: default_sample_rate(),
            max_block_size: default_max_block_size(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            bindings: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    /// Declaration matching a kind's default shape and routing.
    pub fn default_for(kind: UnitKind) -> Result<Self, ConfigError> {
        let desc = kind
            .default_descriptor()
            .map_err(|e| ConfigError::unit(kind.name(), e))?;
        let mut decl = Self::new(kind.name(), kind);
        decl.inputs = buses_of(desc.inputs());
        decl.outputs = buses_of(desc.outputs());
        decl.bindings = desc
            .router()
            .iter()
            .map(|b| BindingDeclaration {
                param: b.name.clone(),
                bus: b.address.bus,
                channel: b.address.channel,
                policy: b.policy.map(|p| policy_name(p).to_string()),
            })
            .collect();
        Ok(decl)
    }

    /// Adds an input bus.
    pub fn with_input(mut self, bus: BusDeclaration) -> Self {
        self.inputs.push(bus);
        self
    }

    /// Adds an output bus.
    pub fn with_output(mut self, bus: BusDeclaration) -> Self {
        self.outputs.push(bus);
        self
    }

    /// Adds a binding.
    pub fn with_binding(mut self, binding: BindingDeclaration) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Sets an initial base value.
    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Declared kind name.
    pub fn kind_name(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.name)
    }

    /// Load a declaration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let decl = Self::from_toml(&content)?;
        tracing::debug!(unit = %decl.name, path = %path.display(), "declaration loaded");
        Ok(decl)
    }

    /// Load a declaration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut decl: Self = toml::from_str(toml_str)?;
        if decl.kind.is_none() {
            decl.kind = Some(decl.name.clone());
        }
        Ok(decl)
    }

    /// Save the declaration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the declaration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks every name in the declaration. Returns the unit kind.
    pub fn validate(&self) -> Result<UnitKind, ConfigError> {
        Ok(validate_declaration(self)?)
    }

    /// Validates and builds the runtime shape.
    ///
    /// Name-level problems are reported together as a validation error; shape
    /// problems (empty or oversized buses, bad binding addresses, duplicate
    /// bindings) come back from the runtime as [`ConfigError::Unit`].
    pub fn descriptor(&self) -> Result<(UnitKind, UnitDescriptor), ConfigError> {
        let kind = self.validate()?;
        let unit_err = |e: patchwire_core::Error| ConfigError::unit(&self.name, e);

        let inputs = bus_set(&self.inputs).map_err(unit_err)?;
        let outputs = bus_set(&self.outputs).map_err(unit_err)?;

        let params = kind.params();
        let mut routes = RouterBuilder::new(&inputs);
        for binding in &self.bindings {
            let bound = match params.iter().find(|p| p.string_id == binding.param) {
                Some(p) => routes.bind_param(&binding.param, p.id, binding.bus, binding.channel),
                None => routes.bind_virtual(&binding.param, binding.bus, binding.channel),
            };
            bound.map_err(unit_err)?;
            if let Some(policy) = &binding.policy {
                let policy = parse_policy(&binding.param, policy)?;
                routes.set_policy(&binding.param, policy).map_err(unit_err)?;
            }
        }
        let router = routes.build();

        let desc = UnitDescriptor::new(&self.name, inputs, outputs, params, router)
            .map_err(unit_err)?;
        let virtuals = desc
            .router()
            .iter()
            .filter(|b| matches!(b.target, ParamTarget::Virtual(_)))
            .count();
        tracing::debug!(
            unit = %self.name,
            kind = %kind,
            bindings = desc.router().len(),
            virtuals,
            "declaration validated"
        );
        Ok((kind, desc))
    }

    /// Initial base values as a state bag.
    pub fn initial_state(&self) -> PropertyBag {
        let mut bag = PropertyBag::new();
        for (name, &value) in &self.params {
            bag.set(name.clone(), value);
        }
        bag
    }

    /// Validates, builds the unit, and applies initial values.
    pub fn build(&self) -> Result<Box<dyn ProcessingUnit>, ConfigError> {
        let (kind, desc) = self.descriptor()?;
        let mut unit = kind.build(desc).map_err(|e| ConfigError::unit(&self.name, e))?;
        unit.load_state(&self.initial_state())
            .map_err(|e| ConfigError::unit(&self.name, e))?;
        tracing::info!(unit = %self.name, kind = %kind, "unit built");
        Ok(unit)
    }
}

fn bus_set(buses: &[BusDeclaration]) -> patchwire_core::Result<BusSet> {
    let layouts = buses
        .iter()
        .map(|bus| {
            // names were checked by validation; an unparsable entry cannot reach here
            let specs: Vec<ChannelSpec> = bus
                .channels
                .iter()
                .filter_map(|ch| parse_channel(&bus.name, ch).ok())
                .collect();
            BusLayout::new(bus.name.clone(), specs)
        })
        .collect();
    BusSet::new(layouts)
}

fn buses_of(set: &BusSet) -> Vec<BusDeclaration> {
    set.iter()
        .map(|bus| {
            BusDeclaration::new(
                bus.name(),
                bus.channels().map(|spec| {
                    if spec.polarity == spec.role.default_polarity() {
                        spec.role.as_str().to_string()
                    } else {
                        format!("{}/{}", spec.role.as_str(), polarity_name(spec))
                    }
                }),
            )
        })
        .collect()
}

fn polarity_name(spec: &ChannelSpec) -> &'static str {
    match spec.polarity {
        patchwire_core::Polarity::Unipolar => "unipolar",
        patchwire_core::Polarity::Bipolar => "bipolar",
    }
}

fn policy_name(policy: ModulationPolicy) -> &'static str {
    match policy {
        ModulationPolicy::Relative => "relative",
        ModulationPolicy::Absolute => "absolute",
    }
}
