//! Curve scanner: a playhead over a published breakpoint curve.
//!
//! The playhead position comes from a [`TimeAuthority`]: the routed
//! `position` CV when patched, otherwise a latched manual drag from the
//! editor, otherwise free-running at the `rate` parameter (or the transport
//! tempo when synced). The curve itself lives in a [`SnapshotSwap`] so the
//! editor can replace it at any time without blocking the block path.
//!
//! Default shape:
//!
//! | Bus   | Channels                                 |
//! |-------|------------------------------------------|
//! | `mod` | position cv, rate cv, amount cv          |
//! | `out` | curve value cv, playhead position cv     |

use std::sync::Arc;

use patchwire_core::{
    BusLayout, BusSet, ChannelRole, Consumer, Error, ManualGesture, NoteDivision, ParamBank,
    ParamDescriptor, ParamId, ParamTarget, PositionAuthority, ProcessContext, ProcessingUnit,
    Producer, PropertyBag, PropertyValue, Result, RouterBuilder, Snapshot, SnapshotSwap,
    TimeAuthority, UnitDescriptor, ring,
};

use crate::curve::{Curve, CurvePoint};

/// Free-running rate in periods per second.
pub const RATE: ParamId = ParamId(200);
/// Output scale.
pub const AMOUNT: ParamId = ParamId(201);

/// Name of the virtual position target.
pub const POSITION: &str = "position";

/// Pending manual gestures the editor may queue between blocks.
const GESTURE_CAPACITY: usize = 64;

/// State key of the curve points.
const CURVE_KEY: &str = "curve";
/// State key of the tempo sync division.
const SYNC_KEY: &str = "sync";

/// Parameter declarations in slot order.
pub fn params() -> Vec<ParamDescriptor> {
    vec![
        ParamDescriptor::rate_hz(0.01, 20.0, 0.5).with_id(RATE, "rate"),
        ParamDescriptor::level("Amount", "Amt", 0.0, 1.0, 1.0).with_id(AMOUNT, "amount"),
    ]
}

/// Builds the default scanner shape.
pub fn default_descriptor() -> Result<UnitDescriptor> {
    let inputs = BusSet::new(vec![BusLayout::uniform("mod", ChannelRole::ControlVoltage, 3)])?;
    let outputs = BusSet::new(vec![BusLayout::uniform("out", ChannelRole::ControlVoltage, 2)])?;
    let mut routes = RouterBuilder::new(&inputs);
    routes.bind_virtual(POSITION, 0, 0)?;
    routes.bind_param("rate", RATE, 0, 1)?;
    routes.bind_param("amount", AMOUNT, 0, 2)?;
    let router = routes.build();
    UnitDescriptor::new("scanner", inputs, outputs, params(), router)
}

/// Non-real-time handle for editing a scanner's curve and dragging its playhead.
#[derive(Debug)]
pub struct ScannerEditor {
    curve: Arc<SnapshotSwap<Curve>>,
    gestures: Producer<ManualGesture>,
}

impl ScannerEditor {
    /// Validates `points` and publishes them as the new curve.
    ///
    /// On failure the previous curve stays published.
    pub fn set_points(&self, points: Vec<CurvePoint>) -> Result<u64> {
        self.curve.try_publish_with(|| Curve::new(points))
    }

    /// Publishes an already built curve.
    pub fn set_curve(&self, curve: Curve) -> u64 {
        self.curve.publish(curve)
    }

    /// Currently published curve.
    pub fn curve(&self) -> Arc<Snapshot<Curve>> {
        self.curve.acquire()
    }

    /// Shared curve slot, for publishing from another editor thread.
    pub fn shared_curve(&self) -> Arc<SnapshotSwap<Curve>> {
        Arc::clone(&self.curve)
    }

    /// Frees curves the block path no longer holds.
    pub fn collect(&self) -> usize {
        self.curve.collect()
    }

    /// Grabs the playhead. Returns `false` if the gesture queue is full.
    pub fn begin_drag(&mut self) -> bool {
        self.gestures.push(ManualGesture::Begin)
    }

    /// Moves a grabbed playhead.
    pub fn drag_to(&mut self, position: f32) -> bool {
        self.gestures.push(ManualGesture::Set(position))
    }

    /// Releases the playhead back to free-running.
    pub fn end_drag(&mut self) -> bool {
        self.gestures.push(ManualGesture::End)
    }

    /// Gestures refused because the queue was full.
    pub fn dropped_gestures(&self) -> u64 {
        self.gestures.dropped()
    }
}

/// Playhead over a breakpoint curve.
#[derive(Debug)]
pub struct CurveScanner {
    descriptor: UnitDescriptor,
    bank: ParamBank,
    rate_slot: usize,
    amount_slot: usize,
    position: Option<ParamTarget>,
    authority: TimeAuthority,
    sync: Option<NoteDivision>,
    curve: Arc<SnapshotSwap<Curve>>,
    gestures: Consumer<ManualGesture>,
    editor: Option<ScannerEditor>,
    curve_version: u64,
    prepared: bool,
}

impl CurveScanner {
    /// Scanner with the default shape over a rising ramp.
    pub fn new() -> Result<Self> {
        Self::from_descriptor(default_descriptor()?)
    }

    /// Scanner with a custom bus layout and routing.
    ///
    /// The playhead reads the virtual `position` target if it is routed;
    /// the first two output channels carry the curve value and the position.
    pub fn from_descriptor(descriptor: UnitDescriptor) -> Result<Self> {
        let bank = ParamBank::for_unit(&descriptor);
        let rate_slot = bank
            .slot(RATE)
            .ok_or_else(|| Error::UnknownParameter("rate".into()))?;
        let amount_slot = bank
            .slot(AMOUNT)
            .ok_or_else(|| Error::UnknownParameter("amount".into()))?;
        let position = descriptor.router().target(POSITION);
        let (producer, gestures) = ring::channel(GESTURE_CAPACITY)?;
        let curve = Arc::new(SnapshotSwap::new(Curve::default()));
        let editor = ScannerEditor {
            curve: Arc::clone(&curve),
            gestures: producer,
        };
        let rate = f64::from(bank.value(rate_slot));
        Ok(Self {
            descriptor,
            bank,
            rate_slot,
            amount_slot,
            position,
            authority: TimeAuthority::new(48000.0, rate),
            sync: None,
            curve,
            gestures,
            editor: Some(editor),
            curve_version: 0,
            prepared: false,
        })
    }

    /// Hands out the editor. Only the first call returns it.
    pub fn take_editor(&mut self) -> Option<ScannerEditor> {
        self.editor.take()
    }

    /// Locks the free-running rate to a note division of the transport tempo.
    ///
    /// `None` returns to the `rate` parameter.
    pub fn set_sync(&mut self, division: Option<NoteDivision>) {
        self.sync = division;
    }

    /// Active tempo sync division.
    pub fn sync(&self) -> Option<NoteDivision> {
        self.sync
    }

    /// Playhead position of the last processed sample.
    pub fn position(&self) -> f64 {
        self.authority.position()
    }

    /// Which source drove the last processed sample.
    pub fn authority(&self) -> PositionAuthority {
        self.authority.authority()
    }

    /// Version of the curve used by the last block.
    pub fn curve_version(&self) -> u64 {
        self.curve_version
    }

    /// Parameter state, for editing base values.
    pub fn params_mut(&mut self) -> &mut ParamBank {
        &mut self.bank
    }
}

impl ProcessingUnit for CurveScanner {
    fn descriptor(&self) -> &UnitDescriptor {
        &self.descriptor
    }

    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.authority.set_sample_rate(sample_rate);
        self.prepared = true;
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        if !self.prepared {
            ctx.silence_outputs();
            return;
        }
        let authority = &mut self.authority;
        self.gestures.drain(|g| authority.apply(g));

        self.bank.resolve_block(self.descriptor.router(), ctx);
        match self.sync {
            Some(division) if ctx.transport().is_playing => {
                self.authority.sync_rate(division, ctx.transport());
            }
            _ => self
                .authority
                .set_rate(f64::from(self.bank.value(self.rate_slot))),
        }
        let amount = self.bank.value(self.amount_slot);

        let curve = self.curve.read();
        self.curve_version = curve.version();
        let router = self.descriptor.router();
        for i in 0..ctx.frames() {
            let cv = self.position.and_then(|target| router.cv(target, ctx, i));
            let position = self.authority.tick(cv) as f32;
            let value = curve.sample(position) * amount;
            if let Some(out) = ctx.output(0) {
                out[i] = value;
            }
            if let Some(out) = ctx.output(1) {
                out[i] = position;
            }
        }
    }

    fn reset(&mut self) {
        self.authority.reset();
    }

    fn live_value(&self, id: ParamId) -> Option<f32> {
        self.bank.live_value(id)
    }

    fn save_state(&self) -> PropertyBag {
        let mut bag = PropertyBag::new();
        self.bank.save_into(&mut bag);
        bag.set(CURVE_KEY, self.curve.acquire().to_property());
        if let Some(division) = self.sync {
            bag.set(SYNC_KEY, division_name(division));
        }
        bag
    }

    fn load_state(&mut self, state: &PropertyBag) -> Result<()> {
        let bases = self.bank.stage(state)?;
        let sync = match state.get(SYNC_KEY) {
            Some(value) => {
                let name = value
                    .as_str()
                    .ok_or_else(|| Error::invalid_state(SYNC_KEY, "expected a division name"))?;
                Some(
                    parse_division(name)
                        .ok_or_else(|| Error::invalid_state(SYNC_KEY, format!("unknown division '{name}'")))?,
                )
            }
            None => None,
        };
        let curve = state
            .get(CURVE_KEY)
            .map(|value| Curve::from_property(CURVE_KEY, value))
            .transpose()?;

        self.bank.apply(bases);
        self.sync = sync;
        if let Some(curve) = curve {
            self.curve.publish(curve);
        }
        Ok(())
    }
}

const DIVISIONS: [(NoteDivision, &str); 9] = [
    (NoteDivision::FourBars, "four_bars"),
    (NoteDivision::Bar, "bar"),
    (NoteDivision::Half, "half"),
    (NoteDivision::Quarter, "quarter"),
    (NoteDivision::Eighth, "eighth"),
    (NoteDivision::Sixteenth, "sixteenth"),
    (NoteDivision::DottedQuarter, "dotted_quarter"),
    (NoteDivision::DottedEighth, "dotted_eighth"),
    (NoteDivision::TripletEighth, "triplet_eighth"),
];

fn division_name(division: NoteDivision) -> &'static str {
    DIVISIONS
        .iter()
        .find(|(d, _)| *d == division)
        .map_or("quarter", |(_, name)| name)
}

/// Parses a snake_case note division name.
pub fn parse_division(name: &str) -> Option<NoteDivision> {
    DIVISIONS
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(d, _)| *d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwire_core::{AudioBlock, ConnectionSet, Transport};

    fn block(
        unit: &mut CurveScanner,
        position_cv: Option<f32>,
        frames: usize,
        sample_rate: f32,
        transport: &Transport,
    ) -> (Vec<f32>, Vec<f32>) {
        let mut inputs = AudioBlock::for_buses(unit.descriptor().inputs(), frames);
        let mut outputs = AudioBlock::for_buses(unit.descriptor().outputs(), frames);
        let mut graph = ConnectionSet::new(3);
        if let Some(cv) = position_cv {
            inputs.fill_channel(0, cv);
            graph.connect(0);
        }
        let mut ctx =
            ProcessContext::new(&inputs, &mut outputs, frames, sample_rate, transport, &graph);
        unit.process(&mut ctx);
        (outputs.channel(0).to_vec(), outputs.channel(1).to_vec())
    }

    fn scanner(sample_rate: f32) -> CurveScanner {
        let mut s = CurveScanner::new().unwrap();
        s.prepare(sample_rate, 64);
        s
    }

    #[test]
    fn free_running_follows_ramp() {
        let mut s = scanner(20.0);
        s.params_mut().set_base(RATE, 1.0).unwrap();
        let (value, position) = block(&mut s, None, 4, 20.0, &Transport::default());
        assert_eq!(s.authority(), PositionAuthority::FreeRunning);
        for (i, (&v, &p)) in value.iter().zip(&position).enumerate() {
            assert!((p - 0.05 * i as f32).abs() < 1e-6);
            assert_eq!(v, p);
        }
    }

    #[test]
    fn cv_drives_playhead() {
        let mut s = scanner(48000.0);
        let (value, _) = block(&mut s, Some(0.25), 16, 48000.0, &Transport::default());
        assert_eq!(s.authority(), PositionAuthority::ExternalCv);
        assert!(value.iter().all(|&v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn drag_latches_until_released() {
        let mut s = scanner(48000.0);
        let mut editor = s.take_editor().unwrap();
        assert!(s.take_editor().is_none());

        editor.begin_drag();
        editor.drag_to(0.8);
        let (value, _) = block(&mut s, None, 8, 48000.0, &Transport::default());
        assert_eq!(s.authority(), PositionAuthority::ManualOverride);
        assert!((value[7] - 0.8).abs() < 1e-6);

        // still latched with no new events
        block(&mut s, None, 8, 48000.0, &Transport::default());
        assert_eq!(s.authority(), PositionAuthority::ManualOverride);

        editor.end_drag();
        block(&mut s, None, 8, 48000.0, &Transport::default());
        assert_eq!(s.authority(), PositionAuthority::FreeRunning);
    }

    #[test]
    fn published_curve_takes_effect_next_block() {
        let mut s = scanner(48000.0);
        let editor = s.take_editor().unwrap();
        let version = editor.set_points(vec![CurvePoint::new(0.0, 0.5)]).unwrap();
        assert_eq!(version, 1);
        let (value, _) = block(&mut s, Some(0.9), 4, 48000.0, &Transport::default());
        assert_eq!(s.curve_version(), 1);
        assert!(value.iter().all(|&v| v == 0.5));
    }

    #[test]
    fn invalid_points_keep_previous_curve() {
        let mut s = scanner(48000.0);
        let editor = s.take_editor().unwrap();
        assert!(editor.set_points(vec![]).is_err());
        assert_eq!(editor.curve().version(), 0);
        let (value, _) = block(&mut s, Some(0.5), 4, 48000.0, &Transport::default());
        assert!((value[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn tempo_sync_overrides_rate_while_playing() {
        let mut s = scanner(48000.0);
        s.set_sync(Some(NoteDivision::Bar));
        let playing = Transport {
            is_playing: true,
            tempo_bpm: 120.0,
            song_position_beats: 0.0,
        };
        block(&mut s, None, 4, 48000.0, &playing);
        assert!((s.authority.rate() - 0.5).abs() < 1e-12);

        s.params_mut().set_base(RATE, 3.0).unwrap();
        block(&mut s, None, 4, 48000.0, &Transport::default());
        assert!((s.authority.rate() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn state_restores_curve_and_sync() {
        let mut s = scanner(48000.0);
        let editor = s.take_editor().unwrap();
        editor
            .set_points(vec![CurvePoint::new(0.0, 1.0), CurvePoint::new(1.0, 0.0)])
            .unwrap();
        s.set_sync(Some(NoteDivision::DottedEighth));
        s.params_mut().set_base(AMOUNT, 0.5).unwrap();
        let bag = s.save_state();

        let mut restored = scanner(48000.0);
        restored.load_state(&bag).unwrap();
        assert_eq!(restored.sync(), Some(NoteDivision::DottedEighth));
        let (value, _) = block(&mut restored, Some(0.0), 1, 48000.0, &Transport::default());
        assert!((value[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn unknown_division_is_rejected() {
        let mut s = scanner(48000.0);
        let bag = PropertyBag::new().with(SYNC_KEY, "whole_note");
        assert!(s.load_state(&bag).is_err());
    }

    #[test]
    fn rejected_state_changes_nothing() {
        let mut s = scanner(48000.0);
        s.set_sync(Some(NoteDivision::Quarter));
        let before = s.save_state();
        let bag = PropertyBag::new()
            .with("amount", 0.25_f64)
            .with(SYNC_KEY, "bogus");

        assert!(s.load_state(&bag).is_err());
        assert_eq!(s.params_mut().base(AMOUNT), Some(1.0));
        assert_eq!(s.sync(), Some(NoteDivision::Quarter));
        assert_eq!(s.save_state(), before);

        let bad_curve = PropertyBag::new()
            .with("amount", 0.25_f64)
            .with(CURVE_KEY, "not a curve");
        assert!(s.load_state(&bad_curve).is_err());
        assert_eq!(s.params_mut().base(AMOUNT), Some(1.0));
    }
}
