//! Gate-driven ADSR envelope unit.
//!
//! Exponential attack-decay-sustain-release contour whose four parameters are
//! all routable. Stage times are time-like and modulate in octaves, so a CV
//! at 0.75 on a 10 ms attack gives about 14.1 ms; sustain is a level and
//! modulates additively.
//!
//! Default shape:
//!
//! | Bus    | Channels                                          |
//! |--------|---------------------------------------------------|
//! | `main` | gate, attack cv, decay cv, sustain cv, release cv |
//! | `out`  | envelope cv                                       |

use libm::expf;
use patchwire_core::{
    BusLayout, BusSet, ChannelRole, ParamBank, ParamDescriptor, ParamId, Polarity, ProcessContext,
    ProcessingUnit, PropertyBag, Result, RouterBuilder, UnitDescriptor, normalize_cv,
};

/// Attack time in seconds.
pub const ATTACK: ParamId = ParamId(100);
/// Decay time in seconds.
pub const DECAY: ParamId = ParamId(101);
/// Sustain level.
pub const SUSTAIN: ParamId = ParamId(102);
/// Release time in seconds.
pub const RELEASE: ParamId = ParamId(103);

/// Gate samples whose normalized value is above this count as high.
///
/// A unipolar gate opens above 0.5, a bipolar gate above 0.0.
pub const GATE_THRESHOLD: f32 = 0.5;

/// Attack aims past full scale so it reaches 1.0 in finite time.
const ATTACK_TARGET: f32 = 1.2;
/// Distance at which decay and release snap to their target.
const SETTLE: f32 = 1e-4;

/// Parameter declarations in slot order.
pub fn params() -> Vec<ParamDescriptor> {
    vec![
        ParamDescriptor::time_seconds("Attack", "Atk", 0.001, 5.0, 0.01).with_id(ATTACK, "attack"),
        ParamDescriptor::time_seconds("Decay", "Dec", 0.001, 10.0, 0.2).with_id(DECAY, "decay"),
        ParamDescriptor::level("Sustain", "Sus", 0.0, 1.0, 0.7).with_id(SUSTAIN, "sustain"),
        ParamDescriptor::time_seconds("Release", "Rel", 0.001, 10.0, 0.3)
            .with_id(RELEASE, "release"),
    ]
}

/// Builds the default envelope shape.
pub fn default_descriptor() -> Result<UnitDescriptor> {
    let inputs = BusSet::new(vec![BusLayout::new(
        "main",
        [
            ChannelRole::Gate,
            ChannelRole::ControlVoltage,
            ChannelRole::ControlVoltage,
            ChannelRole::ControlVoltage,
            ChannelRole::ControlVoltage,
        ],
    )])?;
    let outputs = BusSet::new(vec![BusLayout::uniform("out", ChannelRole::ControlVoltage, 1)])?;
    let mut routes = RouterBuilder::new(&inputs);
    routes.bind_param("attack", ATTACK, 0, 1)?;
    routes.bind_param("decay", DECAY, 0, 2)?;
    routes.bind_param("sustain", SUSTAIN, 0, 3)?;
    routes.bind_param("release", RELEASE, 0, 4)?;
    let router = routes.build();
    UnitDescriptor::new("envelope", inputs, outputs, params(), router)
}

/// Envelope stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Stage {
    /// Output is zero.
    #[default]
    Idle,
    /// Rising toward full scale.
    Attack,
    /// Falling toward the sustain level.
    Decay,
    /// Holding the sustain level while the gate is high.
    Sustain,
    /// Falling to zero after the gate closed.
    Release,
}

/// One-pole coefficient reaching ~63% of the way in `seconds`.
#[inline]
fn coefficient(seconds: f32, sample_rate: f32) -> f32 {
    expf(-1.0 / (seconds * sample_rate).max(1.0))
}

#[derive(Debug, Clone, Copy, Default)]
struct Contour {
    stage: Stage,
    level: f32,
    attack: f32,
    decay: f32,
    release: f32,
    sustain: f32,
}

impl Contour {
    #[inline]
    fn gate(&mut self, high: bool) {
        if high {
            // level is kept so retriggers do not click
            self.stage = Stage::Attack;
        } else if self.stage != Stage::Idle {
            self.stage = Stage::Release;
        }
    }

    #[inline]
    fn step(&mut self) -> f32 {
        match self.stage {
            Stage::Idle => self.level = 0.0,
            Stage::Attack => {
                self.level = ATTACK_TARGET + (self.level - ATTACK_TARGET) * self.attack;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.level = self.sustain + (self.level - self.sustain) * self.decay;
                if (self.level - self.sustain).abs() < SETTLE {
                    self.level = self.sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => self.level = self.sustain,
            Stage::Release => {
                self.level *= self.release;
                if self.level < SETTLE {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }
}

/// ADSR envelope driven by a gate channel.
///
/// # Example
///
/// ```rust
/// use patchwire_core::{BlockRunner, ProcessingUnit};
/// use patchwire_units::envelope::{EnvelopeUnit, Stage};
///
/// let mut env = EnvelopeUnit::new()?;
/// let mut runner = BlockRunner::new(&mut env, 48000.0, 64);
/// runner.inputs_mut().fill_channel(0, 1.0);
/// runner.set_connected([0]);
/// runner.run(&mut env, 64);
/// assert_eq!(env.stage(), Stage::Attack);
/// assert!(runner.outputs().channel(0)[63] > 0.0);
/// # Ok::<(), patchwire_core::Error>(())
/// ```
#[derive(Debug)]
pub struct EnvelopeUnit {
    descriptor: UnitDescriptor,
    bank: ParamBank,
    slots: [usize; 4],
    /// Absolute index and declared polarity of the gate input.
    gate: Option<(usize, Polarity)>,
    gate_high: bool,
    contour: Contour,
    /// Times the current coefficients were computed from.
    times: [f32; 3],
    sample_rate: f32,
    prepared: bool,
}

impl EnvelopeUnit {
    /// Envelope with the default shape.
    pub fn new() -> Result<Self> {
        Self::from_descriptor(default_descriptor()?)
    }

    /// Envelope with a custom bus layout and routing.
    ///
    /// The gate is read from the first input channel whose role is
    /// [`ChannelRole::Gate`], under that channel's declared polarity; without
    /// one the envelope stays idle.
    pub fn from_descriptor(descriptor: UnitDescriptor) -> Result<Self> {
        let bank = ParamBank::for_unit(&descriptor);
        let mut slots = [0; 4];
        for (slot, (id, name)) in slots.iter_mut().zip([
            (ATTACK, "attack"),
            (DECAY, "decay"),
            (SUSTAIN, "sustain"),
            (RELEASE, "release"),
        ]) {
            *slot = bank
                .slot(id)
                .ok_or_else(|| patchwire_core::Error::UnknownParameter(name.to_string()))?;
        }
        let inputs = descriptor.inputs();
        let gate = (0..inputs.total_channels()).find_map(|ch| {
            inputs
                .spec(ch)
                .filter(|spec| spec.role == ChannelRole::Gate)
                .map(|spec| (ch, spec.polarity))
        });
        Ok(Self {
            descriptor,
            bank,
            slots,
            gate,
            gate_high: false,
            contour: Contour::default(),
            times: [0.0; 3],
            sample_rate: 0.0,
            prepared: false,
        })
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.contour.stage
    }

    /// Current output level without advancing.
    pub fn level(&self) -> f32 {
        self.contour.level
    }

    /// Whether the envelope is producing output.
    pub fn is_active(&self) -> bool {
        self.contour.stage != Stage::Idle
    }

    /// Parameter state, for editing base values.
    pub fn params_mut(&mut self) -> &mut ParamBank {
        &mut self.bank
    }

    fn update_coefficients(&mut self) {
        let [attack, decay, sustain, release] = self.slots.map(|slot| self.bank.value(slot));
        self.contour.sustain = sustain;
        let times = [attack, decay, release];
        if times != self.times {
            self.times = times;
            self.contour.attack = coefficient(attack, self.sample_rate);
            self.contour.decay = coefficient(decay, self.sample_rate);
            self.contour.release = coefficient(release, self.sample_rate);
        }
    }
}

impl ProcessingUnit for EnvelopeUnit {
    fn descriptor(&self) -> &UnitDescriptor {
        &self.descriptor
    }

    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.sample_rate = sample_rate.max(1.0);
        self.times = [0.0; 3];
        self.prepared = true;
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        if !self.prepared {
            ctx.silence_outputs();
            return;
        }
        self.bank.resolve_block(self.descriptor.router(), ctx);
        self.update_coefficients();

        let gate = self
            .gate
            .filter(|&(ch, _)| ctx.connectivity().is_input_connected(ch));
        for i in 0..ctx.frames() {
            let high = gate.is_some_and(|(ch, polarity)| {
                normalize_cv(ctx.input_sample(ch, i), polarity) > GATE_THRESHOLD
            });
            if high != self.gate_high {
                self.gate_high = high;
                self.contour.gate(high);
            }
            let level = self.contour.step();
            if let Some(out) = ctx.output(0) {
                out[i] = level;
            }
        }
    }

    fn reset(&mut self) {
        self.contour.stage = Stage::Idle;
        self.contour.level = 0.0;
        self.gate_high = false;
    }

    fn live_value(&self, id: ParamId) -> Option<f32> {
        self.bank.live_value(id)
    }

    fn save_state(&self) -> PropertyBag {
        let mut bag = PropertyBag::new();
        self.bank.save_into(&mut bag);
        bag
    }

    fn load_state(&mut self, state: &PropertyBag) -> Result<()> {
        self.bank.load_from(state)
    }
}
