//! Sensor follower: smooths readings polled by a background worker.
//!
//! A [`SensorSource`] is polled on a [`Worker`] thread and each good reading
//! is pushed into a bounded ring. The block path takes only the newest
//! reading per block and otherwise holds the last good value, so a slow or
//! failing sensor never stalls processing. Once per block the smoothed output
//! is also pushed into a telemetry ring for display.
//!
//! Default shape:
//!
//! | Bus   | Channels                |
//! |-------|-------------------------|
//! | `mod` | smoothing cv, gain cv   |
//! | `out` | followed value (raw)    |

use std::f32::consts::TAU;
use std::time::Duration;

use libm::{expf, sinf};
use patchwire_core::{
    BusLayout, BusSet, ChannelRole, Consumer, ParamBank, ParamDescriptor, ParamId,
    ProcessContext, ProcessingUnit, Producer, PropertyBag, Result, RouterBuilder, UnitDescriptor,
    Worker, WorkerStatus, WorkerTask, ring,
};
use thiserror::Error;

/// Smoothing time in seconds.
pub const SMOOTHING: ParamId = ParamId(300);
/// Output gain.
pub const GAIN: ParamId = ParamId(301);

/// Readings buffered between blocks.
const READING_CAPACITY: usize = 256;
/// Telemetry values buffered for the display.
const TELEMETRY_CAPACITY: usize = 1024;

/// Parameter declarations in slot order.
pub fn params() -> Vec<ParamDescriptor> {
    vec![
        ParamDescriptor::time_seconds("Smoothing", "Smooth", 0.001, 2.0, 0.05)
            .with_id(SMOOTHING, "smoothing"),
        ParamDescriptor::level("Gain", "Gain", 0.0, 4.0, 1.0).with_id(GAIN, "gain"),
    ]
}

/// Builds the default follower shape.
pub fn default_descriptor() -> Result<UnitDescriptor> {
    let inputs = BusSet::new(vec![BusLayout::uniform("mod", ChannelRole::ControlVoltage, 2)])?;
    let outputs = BusSet::new(vec![BusLayout::uniform("out", ChannelRole::Raw, 1)])?;
    let mut routes = RouterBuilder::new(&inputs);
    routes.bind_param("smoothing", SMOOTHING, 0, 0)?;
    routes.bind_param("gain", GAIN, 0, 1)?;
    let router = routes.build();
    UnitDescriptor::new("follower", inputs, outputs, params(), router)
}

/// Failure reading a sensor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// The device went away.
    #[error("sensor disconnected: {0}")]
    Disconnected(String),
    /// No reading available yet.
    #[error("sensor not ready")]
    NotReady,
    /// The device returned NaN or infinity.
    #[error("sensor returned non-finite value {0}")]
    NonFinite(f32),
}

/// Something that can be polled for a scalar reading.
///
/// Called on a worker thread, so implementations may block.
pub trait SensorSource: Send + 'static {
    /// Takes one reading.
    fn read(&mut self) -> std::result::Result<f32, SensorError>;
}

/// Test tone sensor: a sine of `frequency` Hz sampled at the poll rate.
#[derive(Debug, Clone)]
pub struct SineSensor {
    phase: f32,
    increment: f32,
}

impl SineSensor {
    /// Sine completing `frequency` cycles per `poll_rate` readings per second.
    pub fn new(frequency: f32, poll_rate: f32) -> Self {
        Self {
            phase: 0.0,
            increment: frequency / poll_rate.max(f32::EPSILON),
        }
    }
}

impl SensorSource for SineSensor {
    fn read(&mut self) -> std::result::Result<f32, SensorError> {
        let value = sinf(TAU * self.phase);
        self.phase = (self.phase + self.increment).fract();
        Ok(value)
    }
}

/// Plays back a fixed list of readings, then reports `NotReady` forever.
///
/// `None` entries simulate a disconnect.
#[derive(Debug, Clone)]
pub struct ScriptedSensor {
    readings: std::vec::IntoIter<Option<f32>>,
}

impl ScriptedSensor {
    /// Sensor that yields `readings` in order.
    pub fn new(readings: impl IntoIterator<Item = Option<f32>>) -> Self {
        Self {
            readings: readings.into_iter().collect::<Vec<_>>().into_iter(),
        }
    }
}

impl SensorSource for ScriptedSensor {
    fn read(&mut self) -> std::result::Result<f32, SensorError> {
        match self.readings.next() {
            Some(Some(value)) => Ok(value),
            Some(None) => Err(SensorError::Disconnected("scripted dropout".into())),
            None => Err(SensorError::NotReady),
        }
    }
}

/// Worker task moving readings from a source into the follower's ring.
struct SensorPoll<S> {
    source: S,
    readings: Producer<f32>,
}

impl<S: SensorSource> WorkerTask for SensorPoll<S> {
    type Error = SensorError;

    fn step(&mut self) -> std::result::Result<(), SensorError> {
        let value = self.source.read()?;
        if !value.is_finite() {
            return Err(SensorError::NonFinite(value));
        }
        // a full ring means the block path is behind; the reading is counted as dropped
        self.readings.push(value);
        Ok(())
    }

    fn on_stop(&mut self) {
        tracing::debug!(dropped = self.readings.dropped(), "sensor poll stopped");
    }
}

/// Tracks an external sensor with routable smoothing and gain.
#[derive(Debug)]
pub struct SensorFollower {
    descriptor: UnitDescriptor,
    bank: ParamBank,
    smoothing_slot: usize,
    gain_slot: usize,
    readings: Consumer<f32>,
    pending: Option<Producer<f32>>,
    worker: Option<Worker>,
    telemetry: Producer<f32>,
    display: Option<Consumer<f32>>,
    last_good: f32,
    smoothed: f32,
    sample_rate: f32,
    prepared: bool,
}

impl SensorFollower {
    /// Follower with the default shape and no sensor attached.
    pub fn new() -> Result<Self> {
        Self::from_descriptor(default_descriptor()?)
    }

    /// Follower with a custom bus layout and routing.
    pub fn from_descriptor(descriptor: UnitDescriptor) -> Result<Self> {
        let bank = ParamBank::for_unit(&descriptor);
        let smoothing_slot = bank
            .slot(SMOOTHING)
            .ok_or_else(|| patchwire_core::Error::UnknownParameter("smoothing".into()))?;
        let gain_slot = bank
            .slot(GAIN)
            .ok_or_else(|| patchwire_core::Error::UnknownParameter("gain".into()))?;
        let (pending, readings) = ring::channel(READING_CAPACITY)?;
        let (telemetry, display) = ring::channel(TELEMETRY_CAPACITY)?;
        Ok(Self {
            descriptor,
            bank,
            smoothing_slot,
            gain_slot,
            readings,
            pending: Some(pending),
            worker: None,
            telemetry,
            display: Some(display),
            last_good: 0.0,
            smoothed: 0.0,
            sample_rate: 48000.0,
            prepared: false,
        })
    }

    /// Starts polling `source` every `poll_interval` on a worker thread.
    ///
    /// Replaces any previously attached sensor, stopping its worker first. A
    /// previous worker that panicked or failed to stop is logged and replaced.
    pub fn attach<S: SensorSource>(&mut self, source: S, poll_interval: Duration) -> Result<()> {
        let timeout = poll_interval.saturating_mul(4).max(Duration::from_millis(100));
        if let Err(err) = self.detach(timeout) {
            tracing::warn!(error = %err, "previous sensor worker ended badly");
        }
        let readings = match self.pending.take() {
            Some(producer) => producer,
            None => {
                let (producer, consumer) = ring::channel(READING_CAPACITY)?;
                self.readings = consumer;
                producer
            }
        };
        let name = format!("{}-sensor", self.descriptor.name());
        let worker = Worker::spawn(&name, poll_interval, SensorPoll { source, readings })?;
        tracing::info!(worker = %name, ?poll_interval, "sensor attached");
        self.worker = Some(worker);
        Ok(())
    }

    /// Stops the sensor worker, waiting at most `timeout`.
    ///
    /// The last good value keeps being output afterwards.
    pub fn detach(&mut self, timeout: Duration) -> Result<()> {
        match self.worker.take() {
            Some(worker) => {
                let name = worker.name().to_string();
                worker.shutdown(timeout)?;
                tracing::info!(worker = %name, "sensor detached");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Status of the sensor worker, `None` when detached.
    pub fn worker_status(&self) -> Option<WorkerStatus> {
        self.worker.as_ref().map(Worker::status)
    }

    /// Failed sensor reads since attach.
    pub fn sensor_failures(&self) -> u64 {
        self.worker.as_ref().map_or(0, Worker::failures)
    }

    /// Readings lost because the block path fell behind.
    pub fn dropped_readings(&self) -> u64 {
        self.readings.dropped()
    }

    /// Telemetry values lost because the display fell behind.
    pub fn dropped_telemetry(&self) -> u64 {
        self.telemetry.dropped()
    }

    /// Hands out the telemetry stream. Only the first call returns it.
    pub fn take_telemetry(&mut self) -> Option<Consumer<f32>> {
        self.display.take()
    }

    /// Most recent good reading.
    pub fn last_good(&self) -> f32 {
        self.last_good
    }

    /// Parameter state, for editing base values.
    pub fn params_mut(&mut self) -> &mut ParamBank {
        &mut self.bank
    }
}

impl ProcessingUnit for SensorFollower {
    fn descriptor(&self) -> &UnitDescriptor {
        &self.descriptor
    }

    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.sample_rate = sample_rate.max(1.0);
        self.prepared = true;
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        if !self.prepared {
            ctx.silence_outputs();
            return;
        }
        if let Some(reading) = self.readings.latest() {
            self.last_good = reading;
        }
        self.bank.resolve_block(self.descriptor.router(), ctx);
        let smoothing = self.bank.value(self.smoothing_slot);
        let gain = self.bank.value(self.gain_slot);
        let coeff = expf(-1.0 / (smoothing * self.sample_rate).max(1.0));
        let target = self.last_good * gain;

        for i in 0..ctx.frames() {
            self.smoothed = target + (self.smoothed - target) * coeff;
            if let Some(out) = ctx.output(0) {
                out[i] = self.smoothed;
            }
        }
        self.telemetry.push(self.smoothed);
    }

    fn reset(&mut self) {
        self.smoothed = 0.0;
        self.last_good = 0.0;
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use patchwire_core::{AudioBlock, ConnectionSet, Transport};

    fn block(unit: &mut SensorFollower, frames: usize) -> Vec<f32> {
        let inputs = AudioBlock::for_buses(unit.descriptor().inputs(), frames);
        let mut outputs = AudioBlock::for_buses(unit.descriptor().outputs(), frames);
        let transport = Transport::default();
        let graph = ConnectionSet::new(2);
        let mut ctx = ProcessContext::new(&inputs, &mut outputs, frames, 1000.0, &transport, &graph);
        unit.process(&mut ctx);
        outputs.channel(0).to_vec()
    }

    fn wait_for(unit: &mut SensorFollower, value: f32) -> bool {
        for _ in 0..2000 {
            block(unit, 1);
            if unit.last_good() == value {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn holds_last_good_value_through_dropouts() {
        let mut f = SensorFollower::new().unwrap();
        f.prepare(1000.0, 64);
        f.attach(
            ScriptedSensor::new([Some(0.25), None, None, Some(0.75), None]),
            Duration::from_millis(1),
        )
        .unwrap();
        assert!(wait_for(&mut f, 0.75));
        f.detach(Duration::from_secs(2)).unwrap();
        assert!(f.worker_status().is_none());
        assert_eq!(f.last_good(), 0.75);
        block(&mut f, 8);
        assert_eq!(f.last_good(), 0.75);
    }

    #[test]
    fn smoothing_converges_to_gained_reading() {
        let mut f = SensorFollower::new().unwrap();
        f.prepare(1000.0, 1024);
        f.params_mut().set_base(SMOOTHING, 0.01).unwrap();
        f.params_mut().set_base(GAIN, 2.0).unwrap();
        f.last_good = 0.5;
        let out = block(&mut f, 1000);
        assert!(out[0] < out[999]);
        assert!((out[999] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn telemetry_reports_once_per_block() {
        let mut f = SensorFollower::new().unwrap();
        f.prepare(1000.0, 64);
        let mut display = f.take_telemetry().unwrap();
        assert!(f.take_telemetry().is_none());
        for _ in 0..5 {
            block(&mut f, 16);
        }
        assert_eq!(display.len(), 5);
        assert!(display.latest().is_some());
        assert!(display.is_empty());
    }

    #[test]
    fn non_finite_readings_are_rejected() {
        let (tx, mut rx) = ring::channel(4).unwrap();
        let mut task = SensorPoll {
            source: ScriptedSensor::new([Some(f32::NAN), Some(1.0)]),
            readings: tx,
        };
        let first = task.step();
        assert!(matches!(first, Err(SensorError::NonFinite(v)) if v.is_nan()));
        assert!(rx.is_empty());
        task.step().unwrap();
        assert_eq!(rx.pop(), Some(1.0));
    }

    #[test]
    fn reattach_replaces_worker() {
        let mut f = SensorFollower::new().unwrap();
        f.prepare(1000.0, 64);
        f.attach(ScriptedSensor::new([Some(0.1)]), Duration::from_millis(1))
            .unwrap();
        assert!(wait_for(&mut f, 0.1));
        f.attach(ScriptedSensor::new([Some(0.9)]), Duration::from_millis(1))
            .unwrap();
        assert!(wait_for(&mut f, 0.9));
        f.detach(Duration::from_secs(2)).unwrap();
    }

    struct BrokenSensor;

    impl SensorSource for BrokenSensor {
        fn read(&mut self) -> std::result::Result<f32, SensorError> {
            panic!("sensor driver crashed");
        }
    }

    #[test]
    fn reattach_after_worker_panic() {
        let mut f = SensorFollower::new().unwrap();
        f.prepare(1000.0, 64);
        f.attach(BrokenSensor, Duration::from_millis(1)).unwrap();
        for _ in 0..5000 {
            if f.worker_status() == Some(WorkerStatus::Failed) {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(f.worker_status(), Some(WorkerStatus::Failed));

        f.attach(ScriptedSensor::new([Some(0.7)]), Duration::from_millis(1))
            .unwrap();
        assert!(wait_for(&mut f, 0.7));
        f.detach(Duration::from_secs(2)).unwrap();
    }
}
