//! End-to-end scenarios for patchwire-core.
//!
//! Each test drives the public API the way a unit, a worker, and an editor
//! would, including across real threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use patchwire_core::{
    AudioBlock, BlockRunner, BusLayout, BusSet, ChannelRole, ConnectionSet, ManualGesture,
    ModulationPolicy, ParamBank, ParamDescriptor, ParamId, ParamTarget, PositionAuthority,
    ProcessContext, ProcessingUnit, RouterBuilder, SnapshotSwap, TimeAuthority, Transport,
    UnitDescriptor, Worker, modulate, ring,
};

#[test]
fn scenario_a_relative_attack_time() {
    let attack = ParamDescriptor::time_seconds("Attack", "Atk", 0.001, 5.0, 0.01);
    let v = modulate(0.01, Some(0.75), ModulationPolicy::Relative, &attack);
    assert!((v - 0.01 * 2f32.powf(0.5)).abs() < 1e-7);
    assert!((v - 0.01414).abs() < 1e-5);
}

#[test]
fn scenario_b_burst_overflow() {
    let (mut tx, mut rx) = ring::channel::<char>(4).unwrap();
    for item in ['A', 'B', 'C', 'D', 'E', 'F'] {
        tx.push(item);
    }
    let mut got = Vec::new();
    while let Some(c) = rx.pop() {
        got.push(c);
    }
    assert_eq!(got, vec!['A', 'B', 'C', 'D']);
    assert_eq!(rx.dropped(), 2);
}

#[test]
fn scenario_c_free_running_wrap() {
    // +0.05 per one-frame block.
    let mut auth = TimeAuthority::new(20.0, 1.0);
    auth.set_free_position(0.9);
    assert!((auth.advance(1, None) - 0.95).abs() < 1e-9);
    assert!(auth.advance(1, None).abs() < 1e-9);
    assert_eq!(auth.authority(), PositionAuthority::FreeRunning);
}

#[test]
fn scenario_d_reader_keeps_old_snapshot() {
    let swap = Arc::new(SnapshotSwap::new(vec![(0.0_f32, 0.0_f32), (1.0, 1.0)]));
    let held = swap.acquire();
    let mid_use: f32 = held.iter().map(|&(_, y)| y).sum();

    let writer = Arc::clone(&swap);
    thread::spawn(move || writer.publish(vec![(0.0, 1.0), (0.5, 0.0), (1.0, 1.0)]))
        .join()
        .unwrap();

    let finished: f32 = held.iter().map(|&(_, y)| y).sum();
    assert_eq!(mid_use, finished);
    assert_eq!(held.version(), 0);

    let fresh = swap.acquire();
    assert_eq!(fresh.version(), 1);
    assert_eq!(fresh.len(), 3);

    drop(held);
    drop(fresh);
    assert_eq!(swap.collect(), 1);
}

#[test]
fn cv_overrides_latched_manual_gesture() {
    let (mut gestures_tx, mut gestures_rx) = ring::channel::<ManualGesture>(8).unwrap();
    gestures_tx.push(ManualGesture::Begin);
    gestures_tx.push(ManualGesture::Set(0.2));

    let mut auth = TimeAuthority::new(48000.0, 0.5);
    gestures_rx.drain(|g| auth.apply(g));
    assert!(auth.is_manual_active());

    let p = auth.advance(128, Some(0.6));
    assert_eq!(auth.authority(), PositionAuthority::ExternalCv);
    assert!((p - 0.6).abs() < 1e-6);

    let p = auth.advance(128, None);
    assert_eq!(auth.authority(), PositionAuthority::ManualOverride);
    assert!((p - 0.2).abs() < 1e-6);
}

#[test]
fn spsc_across_threads_preserves_order() {
    const COUNT: u64 = 100_000;
    let (mut tx, mut rx) = ring::channel::<u64>(256).unwrap();

    let producer = thread::spawn(move || {
        let mut next = 0;
        while next < COUNT {
            let burst: Vec<u64> = (next..(next + 7).min(COUNT)).collect();
            let mut sent = 0;
            while sent < burst.len() {
                sent += tx.push_slice(&burst[sent..]);
                thread::yield_now();
            }
            next += burst.len() as u64;
        }
        tx.dropped()
    });

    let mut expected = 0;
    let mut buf = [0u64; 32];
    while expected < COUNT {
        let n = rx.pop_into(&mut buf);
        for &v in &buf[..n] {
            assert_eq!(v, expected);
            expected += 1;
        }
    }
    // Retried bursts count their refused tail as dropped; delivered order is intact.
    let _ = producer.join().unwrap();
}

#[test]
fn full_ring_never_blocks_producer_thread() {
    const PUSHES: u64 = 50_000;
    const CAPACITY: usize = 8;
    let (mut tx, rx) = ring::channel::<u64>(CAPACITY).unwrap();
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);

    // No consumer runs: every push past capacity must return immediately.
    let producer = thread::spawn(move || {
        let accepted = (0..PUSHES).filter(|&i| tx.push(i)).count();
        let _ = done_tx.send(());
        (accepted, tx.dropped())
    });

    assert!(
        done_rx.recv_timeout(Duration::from_secs(10)).is_ok(),
        "producer blocked on a full ring"
    );
    let (accepted, dropped) = producer.join().unwrap();
    assert_eq!(accepted, CAPACITY);
    assert_eq!(dropped, PUSHES - CAPACITY as u64);
    assert_eq!(rx.dropped(), dropped);
    assert_eq!(rx.len(), CAPACITY);
}

#[test]
fn concurrent_publish_never_tears() {
    #[derive(Debug)]
    struct Pair {
        a: u64,
        b: u64,
    }

    let swap = Arc::new(SnapshotSwap::new(Pair { a: 0, b: 0 }));
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let swap = Arc::clone(&swap);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut reads = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    let snap = swap.read();
                    assert_eq!(snap.b, snap.a * 2);
                    assert_eq!(snap.version(), snap.a);
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for i in 1..=2000u64 {
        swap.publish(Pair { a: i, b: i * 2 });
    }
    stop.store(true, Ordering::Relaxed);
    for r in readers {
        assert!(r.join().unwrap() > 0);
    }
    assert_eq!(swap.acquire().a, 2000);
}

#[test]
fn worker_feeds_block_path_through_channel() {
    let (mut tx, mut rx) = ring::channel::<f32>(16).unwrap();
    let mut reading = 0.0_f32;
    let worker = Worker::spawn("sensor", Duration::from_millis(1), move || {
        reading += 0.125;
        tx.push(reading);
        Ok::<(), String>(())
    })
    .unwrap();

    let mut last_good = 0.0;
    for _ in 0..2000 {
        if let Some(v) = rx.latest() {
            last_good = v;
        }
        if last_good >= 0.5 {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
    worker.shutdown(Duration::from_secs(2)).unwrap();
    assert!(last_good >= 0.5);
}

/// Minimal unit: output = input signal scaled by a routed gain, plus a virtual
/// "bias" target that only exists as a route.
struct ScaleUnit {
    descriptor: UnitDescriptor,
    bank: ParamBank,
    bias: ParamTarget,
    prepared: bool,
}

const GAIN: ParamId = ParamId(1);

impl ScaleUnit {
    fn new() -> Self {
        let inputs = BusSet::new(vec![
            BusLayout::uniform("in", ChannelRole::Signal, 1),
            BusLayout::uniform("mod", ChannelRole::ControlVoltage, 2),
        ])
        .unwrap();
        let outputs = BusSet::new(vec![BusLayout::uniform("out", ChannelRole::Signal, 1)]).unwrap();
        let gain = ParamDescriptor::level("Gain", "Gain", 0.0, 2.0, 1.0).with_id(GAIN, "gain");
        let mut routes = RouterBuilder::new(&inputs);
        routes.bind_param("gain", GAIN, 1, 0).unwrap();
        let bias = routes.bind_virtual("bias", 1, 1).unwrap();
        let router = routes.build();
        let descriptor = UnitDescriptor::new("scale", inputs, outputs, vec![gain], router).unwrap();
        let bank = ParamBank::for_unit(&descriptor);
        Self {
            descriptor,
            bank,
            bias,
            prepared: false,
        }
    }
}

impl ProcessingUnit for ScaleUnit {
    fn descriptor(&self) -> &UnitDescriptor {
        &self.descriptor
    }

    fn prepare(&mut self, _sample_rate: f32, _max_block_size: usize) {
        self.prepared = true;
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        if !self.prepared {
            ctx.silence_outputs();
            return;
        }
        self.bank.resolve_block(self.descriptor.router(), ctx);
        let gain = self.bank.value(0);
        let bias = self.descriptor.router().cv(self.bias, ctx, 0).map_or(0.0, |cv| cv - 0.5);
        let frames = ctx.frames();
        for i in 0..frames {
            let x = ctx.input_sample(0, i);
            if let Some(out) = ctx.output(0) {
                out[i] = x * gain + bias;
            }
        }
    }

    fn live_value(&self, id: ParamId) -> Option<f32> {
        self.bank.live_value(id)
    }
}

#[test]
fn unit_contract_through_runner() {
    let mut unit = ScaleUnit::new();
    let mut runner = BlockRunner::new(&mut unit, 48000.0, 64);

    runner.inputs_mut().fill_channel(0, 0.5);
    runner.inputs_mut().fill_channel(1, 1.0); // gain CV at top
    runner.inputs_mut().fill_channel(2, 0.75); // bias CV

    // Nothing patched: gain stays at base, bias contributes nothing.
    assert_eq!(runner.run(&mut unit, 32), 32);
    assert_eq!(&runner.outputs().channel(0)[..32], &[0.5; 32]);
    assert_eq!(unit.live_value(GAIN), Some(1.0));
    assert!(!unit.is_connected(unit.bias, &ConnectionSet::new(3)));

    // Patch both CV inputs: gain 1.0 + 0.5 * 2.0 = 2.0, bias +0.25.
    runner.set_connected([1, 2]);
    runner.run(&mut unit, 32);
    assert_eq!(runner.outputs().channel(0), &[1.25; 32]);
    assert_eq!(unit.live_value(GAIN), Some(2.0));
    assert!(unit.is_connected(ParamTarget::Real(GAIN), &**runner.connections().read()));

    // Oversized request is clamped to the prepared block size.
    assert_eq!(runner.run(&mut unit, 1000), 64);
    assert_eq!(runner.blocks(), 3);
}

#[test]
fn unprepared_unit_writes_silence() {
    let mut unit = ScaleUnit::new();
    let inputs = AudioBlock::for_buses(unit.descriptor().inputs(), 8);
    let mut outputs = AudioBlock::for_buses(unit.descriptor().outputs(), 8);
    outputs.fill_channel(0, 9.0);
    let transport = Transport::default();
    let graph = ConnectionSet::new(3);
    let mut ctx = ProcessContext::new(&inputs, &mut outputs, 8, 48000.0, &transport, &graph);
    unit.process(&mut ctx);
    assert_eq!(outputs.channel(0), &[0.0; 8]);
}
