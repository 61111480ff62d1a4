//! Quantum-processing benchmarks for the graph executor.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use aural_engine::{
    BiquadFilterDesc, ChannelSettings, Connection, DelayDesc, DestinationDesc, FilterKind,
    GainDesc, GraphController, GraphDescription, GraphExecutor, NodeDescription, NodeId,
    OscillatorDesc, Waveform,
};
use aural_registry::ResourceRegistry;

const RATE: f32 = 48_000.0;
const QUANTUM: usize = 128;

fn connect(source: u64, dest: u64) -> Connection {
    Connection {
        source: NodeId(source),
        destination: NodeId(dest),
        source_output_index: 0,
        destination_input_index: 0,
    }
}

/// Eight oscillator → filter → gain voices mixed into the destination.
fn voice_bank() -> GraphExecutor {
    let voices = 8u64;
    let destination = 1000;
    let mut description = GraphDescription {
        destination_node_id: NodeId(destination),
        ..GraphDescription::default()
    };
    description.nodes.insert(
        NodeId(destination),
        NodeDescription::Destination(DestinationDesc { channel_count: 2 }),
    );

    for voice in 0..voices {
        let osc = voice * 10 + 1;
        let filter = voice * 10 + 2;
        let gain = voice * 10 + 3;
        description.nodes.insert(
            NodeId(osc),
            NodeDescription::Oscillator(OscillatorDesc {
                waveform: Waveform::Sawtooth,
                frequency: 110.0 * (voice + 1) as f32,
                detune_cents: 0.0,
                start_frame: Some(0),
                stop_frame: None,
            }),
        );
        description.nodes.insert(
            NodeId(filter),
            NodeDescription::BiquadFilter(BiquadFilterDesc {
                kind: FilterKind::Lowpass,
                frequency: 2_000.0,
                q: 0.707,
                gain_db: 0.0,
                channels: ChannelSettings::default(),
            }),
        );
        description.nodes.insert(
            NodeId(gain),
            NodeDescription::Gain(GainDesc {
                gain: 1.0 / voices as f32,
                channels: ChannelSettings::default(),
            }),
        );
        description.connections.push(connect(osc, filter));
        description.connections.push(connect(filter, gain));
        description.connections.push(connect(gain, destination));
    }

    let registry = ResourceRegistry::new();
    let (_controller, executor) =
        GraphController::create(description, RATE, QUANTUM, &registry).unwrap();
    executor
}

/// Feedback delay loop (delay split into writer/reader entries).
fn feedback_loop() -> GraphExecutor {
    let mut description = GraphDescription {
        destination_node_id: NodeId(4),
        ..GraphDescription::default()
    };
    description.nodes.insert(
        NodeId(1),
        NodeDescription::Oscillator(OscillatorDesc {
            waveform: Waveform::Sine,
            frequency: 440.0,
            detune_cents: 0.0,
            start_frame: Some(0),
            stop_frame: None,
        }),
    );
    description.nodes.insert(
        NodeId(2),
        NodeDescription::Delay(DelayDesc {
            delay_time: 0.25,
            max_delay_time: 1.0,
            channels: ChannelSettings::default(),
        }),
    );
    description.nodes.insert(
        NodeId(3),
        NodeDescription::Gain(GainDesc {
            gain: 0.4,
            channels: ChannelSettings::default(),
        }),
    );
    description.nodes.insert(
        NodeId(4),
        NodeDescription::Destination(DestinationDesc { channel_count: 2 }),
    );
    description.connections.push(connect(1, 2));
    description.connections.push(connect(2, 3));
    description.connections.push(connect(3, 2));
    description.connections.push(connect(2, 4));

    let registry = ResourceRegistry::new();
    let (_controller, executor) =
        GraphController::create(description, RATE, QUANTUM, &registry).unwrap();
    executor
}

fn bench_process_quantum(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_quantum");

    let mut executor = voice_bank();
    let mut frame = 0u64;
    group.bench_function("voice_bank_8", |b| {
        b.iter(|| {
            let out = executor.render_quantum(frame);
            frame += QUANTUM as u64;
            black_box(out.channel(0)[0]);
        });
    });

    let mut executor = feedback_loop();
    let mut frame = 0u64;
    group.bench_function("feedback_delay", |b| {
        b.iter(|| {
            let out = executor.render_quantum(frame);
            frame += QUANTUM as u64;
            black_box(out.channel(0)[0]);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_process_quantum);
criterion_main!(benches);
