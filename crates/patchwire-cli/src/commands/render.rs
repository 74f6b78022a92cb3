//! Offline render command.
//!
//! Drives a declared unit through a [`BlockRunner`] the way a host would,
//! with an editor thread publishing curve snapshots, manual gestures and
//! sensor readings arriving through channels, and optional saved state.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use super::common::{parse_cv, resolve_declaration};
use anyhow::Context;
use clap::Args;
use patchwire_config::{PatchState, UnitDeclaration};
use patchwire_core::{BlockRunner, ChannelRole, ProcessingUnit, UnitDescriptor};
use patchwire_units::{
    Curve, CurvePoint, CurveScanner, EnvelopeUnit, SensorFollower, SineSensor, UnitKind,
    parse_division,
};

#[derive(Args)]
pub struct RenderArgs {
    /// Declaration file, name under the user units directory, or unit kind
    unit: String,

    /// Number of blocks to render
    #[arg(short, long, default_value = "100")]
    blocks: usize,

    /// Frames per block (defaults to the declaration's max block size)
    #[arg(long)]
    block_size: Option<usize>,

    /// Sample rate in Hz (defaults to the declaration's)
    #[arg(short, long)]
    sample_rate: Option<u32>,

    /// Constant input, connected for the whole render (e.g., "1=0.75")
    #[arg(long = "cv", value_name = "CHANNEL=VALUE", value_parser = parse_cv)]
    cvs: Vec<(usize, f32)>,

    /// Play the transport at this tempo
    #[arg(long)]
    tempo: Option<f64>,

    /// Print the last frame of every Nth block (0 prints none)
    #[arg(long, default_value = "10")]
    every: usize,

    /// Restore unit state from this file before rendering and save it after
    #[arg(long)]
    state: Option<PathBuf>,

    /// Envelope: blocks the gate is held high (defaults to half the render)
    #[arg(long)]
    gate_blocks: Option<usize>,

    /// Scanner: drag to this position for the middle third of the render
    #[arg(long)]
    drag: Option<f32>,

    /// Scanner: lock the free-running rate to a note division (e.g., "quarter")
    #[arg(long)]
    sync: Option<String>,

    /// Scanner: curve edits published from an editor thread during the render
    #[arg(long, default_value = "8")]
    edits: usize,

    /// Follower: frequency of the simulated sensor in Hz
    #[arg(long, default_value = "2.0")]
    sensor_hz: f32,
}

/// Running statistics of one output channel.
#[derive(Debug, Clone, Copy)]
struct ChannelStats {
    min: f32,
    max: f32,
    sum: f64,
    count: u64,
    last: f32,
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            sum: 0.0,
            count: 0,
            last: 0.0,
        }
    }
}

impl ChannelStats {
    fn add(&mut self, samples: &[f32]) {
        for &x in samples {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
            self.sum += f64::from(x);
        }
        self.count += samples.len() as u64;
        if let Some(&x) = samples.last() {
            self.last = x;
        }
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// A runner plus what the render has seen so far.
struct Session {
    runner: BlockRunner,
    block_size: usize,
    every: usize,
    stats: Vec<ChannelStats>,
}

impl Session {
    fn new(
        unit: &mut dyn ProcessingUnit,
        args: &RenderArgs,
        decl: &UnitDeclaration,
    ) -> anyhow::Result<Self> {
        let sample_rate = args.sample_rate.unwrap_or(decl.sample_rate) as f32;
        let block_size = args.block_size.unwrap_or(decl.max_block_size).max(1);
        let mut runner = BlockRunner::new(unit, sample_rate, block_size);

        let inputs = runner.inputs_mut().channels();
        for &(channel, value) in &args.cvs {
            if channel >= inputs {
                anyhow::bail!("input channel {channel} out of range ({inputs} channels)");
            }
            runner.inputs_mut().fill_channel(channel, value);
        }
        runner.set_connected(args.cvs.iter().map(|&(channel, _)| channel));

        if let Some(bpm) = args.tempo {
            runner.clock_mut().set_bpm(bpm);
            runner.clock_mut().play();
        }

        let outputs = runner.outputs().channels();
        Ok(Self {
            runner,
            block_size,
            every: args.every,
            stats: vec![ChannelStats::default(); outputs],
        })
    }

    fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / f64::from(self.runner.sample_rate()))
    }

    fn step(&mut self, unit: &mut dyn ProcessingUnit) {
        self.runner.run(unit, self.block_size);
        for (channel, stats) in self.stats.iter_mut().enumerate() {
            stats.add(self.runner.outputs().channel(channel));
        }
    }

    fn report(&self, block: usize, detail: impl FnOnce() -> String) {
        if self.every == 0 || block % self.every != 0 {
            return;
        }
        let values: Vec<String> = self
            .stats
            .iter()
            .map(|stats| format!("{:>9.5}", stats.last))
            .collect();
        println!("  {block:>6}  {}  {}", values.join(" "), detail());
    }

    fn summary(&self, desc: &UnitDescriptor) {
        println!();
        println!(
            "Rendered {} blocks of {} frames at {} Hz",
            self.runner.blocks(),
            self.block_size,
            self.runner.sample_rate()
        );
        for (channel, stats) in self.stats.iter().enumerate() {
            let role = desc
                .outputs()
                .spec(channel)
                .map_or("?", |spec| spec.role.as_str());
            println!(
                "  out[{channel}] {role:6} min {:>9.5}  max {:>9.5}  mean {:>9.5}  last {:>9.5}",
                stats.min,
                stats.max,
                stats.mean(),
                stats.last
            );
        }
    }
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let decl = resolve_declaration(&args.unit)?;
    let (kind, desc) = decl.descriptor()?;
    let saved = match &args.state {
        Some(path) => Some(PatchState::load_or_default(path)?),
        None => None,
    };

    tracing::info!(unit = %decl.name, %kind, blocks = args.blocks, "render started");
    match kind {
        UnitKind::Envelope => {
            let mut unit = EnvelopeUnit::from_descriptor(desc)?;
            restore(&mut unit, &decl, saved.as_ref())?;
            render_envelope(&mut unit, &args, &decl)?;
            persist(&unit, &args, &decl, saved)
        }
        UnitKind::Scanner => {
            let mut unit = CurveScanner::from_descriptor(desc)?;
            restore(&mut unit, &decl, saved.as_ref())?;
            if let Some(name) = &args.sync {
                let division = parse_division(name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown note division: {}", name))?;
                unit.set_sync(Some(division));
            }
            render_scanner(&mut unit, &args, &decl)?;
            persist(&unit, &args, &decl, saved)
        }
        UnitKind::Follower => {
            let mut unit = SensorFollower::from_descriptor(desc)?;
            restore(&mut unit, &decl, saved.as_ref())?;
            render_follower(&mut unit, &args, &decl)?;
            persist(&unit, &args, &decl, saved)
        }
    }
}

/// Initial values from the declaration, then any saved state on top.
fn restore(
    unit: &mut dyn ProcessingUnit,
    decl: &UnitDeclaration,
    saved: Option<&PatchState>,
) -> anyhow::Result<()> {
    unit.load_state(&decl.initial_state())?;
    if let Some(state) = saved
        && state.restore(&decl.name, unit)?
    {
        tracing::info!(unit = %decl.name, "saved state restored");
    }
    Ok(())
}

fn persist(
    unit: &dyn ProcessingUnit,
    args: &RenderArgs,
    decl: &UnitDeclaration,
    saved: Option<PatchState>,
) -> anyhow::Result<()> {
    let (Some(path), Some(mut state)) = (&args.state, saved) else {
        return Ok(());
    };
    state.capture(&decl.name, unit);
    state
        .save(path)
        .with_context(|| format!("failed to save state to '{}'", path.display()))?;
    println!("State saved to {}", path.display());
    Ok(())
}

fn render_envelope(
    unit: &mut EnvelopeUnit,
    args: &RenderArgs,
    decl: &UnitDeclaration,
) -> anyhow::Result<()> {
    let gate = (0..unit.descriptor().inputs().total_channels())
        .find(|&ch| {
            unit.descriptor()
                .inputs()
                .spec(ch)
                .is_some_and(|spec| spec.role == ChannelRole::Gate)
        })
        .ok_or_else(|| anyhow::anyhow!("'{}' declares no gate input", decl.name))?;
    let gate_blocks = args.gate_blocks.unwrap_or(args.blocks / 2);

    let mut session = Session::new(unit, args, decl)?;
    let mut connected: Vec<usize> = args.cvs.iter().map(|&(ch, _)| ch).collect();
    connected.push(gate);
    session.runner.set_connected(connected);

    for block in 0..args.blocks {
        let level = if block < gate_blocks { 1.0 } else { 0.0 };
        session.runner.inputs_mut().fill_channel(gate, level);
        session.step(unit);
        session.report(block, || format!("{:?}", unit.stage()));
    }
    session.summary(unit.descriptor());
    println!("  stage {:?}", unit.stage());
    Ok(())
}

fn render_scanner(
    unit: &mut CurveScanner,
    args: &RenderArgs,
    decl: &UnitDeclaration,
) -> anyhow::Result<()> {
    let mut editor = unit
        .take_editor()
        .ok_or_else(|| anyhow::anyhow!("scanner editor already taken"))?;
    let mut session = Session::new(unit, args, decl)?;
    let pause = session.block_duration();

    // Publishes a sequence of curves while the render runs.
    let done = Arc::new(AtomicBool::new(false));
    let edits = args.edits;
    let curves = {
        let done = Arc::clone(&done);
        let shared = editor.shared_curve();
        thread::Builder::new()
            .name(format!("{}-editor", decl.name))
            .spawn(move || -> patchwire_core::Result<u64> {
                let mut version = 0;
                for i in 0..edits {
                    if done.load(Ordering::Relaxed) {
                        break;
                    }
                    let peak = (i + 1) as f32 / edits as f32;
                    let points = vec![
                        CurvePoint::new(0.0, 0.0),
                        CurvePoint::new(0.5, peak),
                        CurvePoint::new(1.0, 0.0),
                    ];
                    version = shared.try_publish_with(|| Curve::new(points))?;
                    thread::sleep(pause);
                }
                Ok(version)
            })
            .context("failed to spawn editor thread")?
    };

    let drag_start = args.blocks / 3;
    let drag_end = 2 * args.blocks / 3;
    for block in 0..args.blocks {
        if let Some(position) = args.drag {
            if block == drag_start {
                editor.begin_drag();
                editor.drag_to(position);
            } else if block == drag_end {
                editor.end_drag();
            }
        }
        session.step(unit);
        session.report(block, || {
            format!("{:?} v{}", unit.authority(), unit.curve_version())
        });
    }

    done.store(true, Ordering::Relaxed);
    let published = curves
        .join()
        .map_err(|_| anyhow::anyhow!("editor thread panicked"))??;
    let reclaimed = editor.collect();

    session.summary(unit.descriptor());
    println!(
        "  position {:.5}  authority {:?}  curve v{} (editor published v{published}, reclaimed {reclaimed})",
        unit.position(),
        unit.authority(),
        unit.curve_version()
    );
    if editor.dropped_gestures() > 0 {
        tracing::warn!(dropped = editor.dropped_gestures(), "gestures dropped");
    }
    Ok(())
}

fn render_follower(
    unit: &mut SensorFollower,
    args: &RenderArgs,
    decl: &UnitDeclaration,
) -> anyhow::Result<()> {
    let mut telemetry = unit
        .take_telemetry()
        .ok_or_else(|| anyhow::anyhow!("follower telemetry already taken"))?;
    let mut session = Session::new(unit, args, decl)?;
    let pause = session.block_duration();
    let poll = Duration::from_millis(1);
    unit.attach(SineSensor::new(args.sensor_hz, 1000.0), poll)?;

    let mut scratch = vec![0.0; 64];
    let mut received = 0;
    for block in 0..args.blocks {
        session.step(unit);
        received += telemetry.pop_into(&mut scratch);
        session.report(block, || {
            format!("last good {:>8.5}  {:?}", unit.last_good(), unit.worker_status())
        });
        // paced to wall clock so the sensor worker keeps up
        thread::sleep(pause);
    }
    unit.detach(Duration::from_secs(2))?;

    session.summary(unit.descriptor());
    println!(
        "  telemetry {received} received, {} dropped; readings {} dropped; sensor failures {}",
        unit.dropped_telemetry(),
        unit.dropped_readings(),
        unit.sensor_failures()
    );
    Ok(())
}
