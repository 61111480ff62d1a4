//! Offline rendering: description JSON in, WAV out.

use std::path::Path;

use anyhow::{Context, Result, bail};
use aural_engine::{GraphController, GraphDescription};
use aural_registry::{ResourceId, ResourceRegistry, SampleBuffer};

use crate::settings::RenderSettings;

/// A `--buffer id=path.wav` argument.
#[derive(Debug, Clone)]
pub struct BufferArg {
    /// Registry id the buffer is registered under.
    pub id: ResourceId,
    /// Path of the WAV file to load.
    pub path: std::path::PathBuf,
}

impl std::str::FromStr for BufferArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (id, path) = value
            .split_once('=')
            .ok_or_else(|| format!("expected id=path, got `{value}`"))?;
        let id: ResourceId = id
            .parse()
            .map_err(|_| format!("`{id}` is not a numeric resource id"))?;
        Ok(Self {
            id,
            path: path.into(),
        })
    }
}

/// Loads a graph description from a JSON file.
pub fn load_description(path: &Path) -> Result<GraphDescription> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read graph description {}", path.display()))?;
    let description: GraphDescription = serde_json::from_str(&text)
        .with_context(|| format!("cannot parse graph description {}", path.display()))?;
    description
        .validate()
        .with_context(|| format!("invalid graph description {}", path.display()))?;
    Ok(description)
}

/// Loads a WAV file into an immutable sample buffer.
pub fn load_wav_buffer(path: &Path) -> Result<SampleBuffer> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("cannot open WAV file {}", path.display()))?;
    let spec = reader.spec();
    let channel_count = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("corrupt WAV samples")?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / f32::from(i16::MAX);
            match spec.bits_per_sample {
                16 => reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| f32::from(v) * scale))
                    .collect::<Result<_, _>>()
                    .context("corrupt WAV samples")?,
                bits => bail!("unsupported WAV bit depth: {bits}"),
            }
        }
    };

    let frames = interleaved.len() / channel_count;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for (index, &sample) in interleaved.iter().enumerate() {
        channels[index % channel_count].push(sample);
    }
    Ok(SampleBuffer::new(channels, spec.sample_rate as f32))
}

/// Renders a description offline and writes the destination output as a
/// 32-bit float WAV file.
pub fn render_to_wav(
    description: GraphDescription,
    registry: &ResourceRegistry,
    settings: &RenderSettings,
    output_path: &Path,
) -> Result<()> {
    let (_controller, mut executor) = GraphController::create(
        description,
        settings.sample_rate,
        settings.quantum_size,
        registry,
    )?;

    // Channel count comes from the first rendered quantum (the destination
    // always produces its declared count).
    let first = executor.render_quantum(0);
    let channel_count = first.channel_count().max(1);

    let spec = hound::WavSpec {
        channels: channel_count as u16,
        sample_rate: settings.sample_rate as u32,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(output_path, spec)
        .with_context(|| format!("cannot create {}", output_path.display()))?;

    let total_frames = settings.total_frames();
    let quantum = settings.quantum_size as u64;
    let mut frame = 0u64;
    while frame < total_frames {
        let bus = if frame == 0 {
            // Already rendered above to learn the channel count.
            executor.destination_output()
        } else {
            executor.render_quantum(frame)
        };
        let frames_to_write = quantum.min(total_frames - frame) as usize;
        for sample_index in 0..frames_to_write {
            for channel in 0..channel_count {
                let sample = bus
                    .channel(channel)
                    .get(sample_index)
                    .copied()
                    .unwrap_or(0.0);
                writer.write_sample(sample)?;
            }
        }
        frame += quantum;
    }

    writer.finalize().context("cannot finalize WAV file")?;
    tracing::info!(
        "rendered {} frames × {} channels to {}",
        total_frames,
        channel_count,
        output_path.display()
    );
    Ok(())
}

/// Prints a compiled summary of the description.
pub fn inspect(description: &GraphDescription, settings: &RenderSettings) -> Result<()> {
    let registry = ResourceRegistry::new();
    let topology = aural_engine::build_topology(
        description,
        settings.sample_rate,
        settings.quantum_size,
        &registry,
    )?;

    println!(
        "{} nodes, {} connections, {} param connections, {} automations",
        description.nodes.len(),
        description.connections.len(),
        description.param_connections.len(),
        description.param_automations.len()
    );
    println!(
        "{} processing entries ({} beyond the node count from delay splits)",
        topology.entry_count(),
        topology.entry_count() - description.nodes.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aural_engine::{
        Connection, DestinationDesc, NodeDescription, NodeId, OscillatorDesc, Waveform,
    };

    fn tone_description() -> GraphDescription {
        let mut description = GraphDescription {
            destination_node_id: NodeId(2),
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
            NodeDescription::Destination(DestinationDesc { channel_count: 2 }),
        );
        description.connections.push(Connection {
            source: NodeId(1),
            destination: NodeId(2),
            source_output_index: 0,
            destination_input_index: 0,
        });
        description
    }

    #[test]
    fn buffer_arg_parsing() {
        let arg: BufferArg = "3=loop.wav".parse().unwrap();
        assert_eq!(arg.id, 3);
        assert_eq!(arg.path, std::path::PathBuf::from("loop.wav"));

        assert!("loop.wav".parse::<BufferArg>().is_err());
        assert!("x=loop.wav".parse::<BufferArg>().is_err());
    }

    #[test]
    fn description_roundtrips_through_json_file() {
        let description = tone_description();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), serde_json::to_string_pretty(&description).unwrap()).unwrap();

        let loaded = load_description(file.path()).unwrap();
        assert_eq!(loaded, description);
    }

    #[test]
    fn renders_a_tone_to_wav() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tone.wav");
        let settings = RenderSettings {
            sample_rate: 8_000.0,
            quantum_size: 128,
            duration_secs: 0.25,
        };
        let registry = ResourceRegistry::new();
        render_to_wav(tone_description(), &registry, &settings, &out).unwrap();

        let mut reader = hound::WavReader::open(&out).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 8_000);
        assert_eq!(reader.duration(), 2_000);

        let peak = reader
            .samples::<f32>()
            .map(|s| s.unwrap().abs())
            .fold(0.0f32, f32::max);
        assert!(peak > 0.5, "expected audible output, peak {peak}");
    }

    #[test]
    fn wav_buffer_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for frame in 0..4 {
            writer.write_sample(frame as f32).unwrap();
            writer.write_sample(-(frame as f32)).unwrap();
        }
        writer.finalize().unwrap();

        let buffer = load_wav_buffer(&path).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 4);
        assert_eq!(buffer.channel(0), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(buffer.channel(1), &[0.0, -1.0, -2.0, -3.0]);
    }
}
