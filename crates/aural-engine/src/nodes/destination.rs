//! Destination node: final mix capture.

use crate::bus::{AudioBus, MAX_CHANNELS};
use crate::description::DestinationDesc;
use crate::nodes::{RenderContext, connected_input};

/// Captures the final mix at its explicit channel count.
///
/// The mixed input already arrives at the declared count (the compiler
/// pins the destination to explicit/speakers mixing); this node only has
/// to materialize it, producing silence when nothing is connected.
pub struct DestinationNode {
    output: AudioBus,
}

impl DestinationNode {
    /// Builds the node at its declared channel count.
    pub fn new(desc: &DestinationDesc, quantum_size: usize) -> Self {
        let channels = desc.channel_count.clamp(1, MAX_CHANNELS);
        Self {
            output: AudioBus::new(channels, quantum_size),
        }
    }

    pub(crate) fn output(&self) -> &AudioBus {
        &self.output
    }

    pub(crate) fn process(&mut self, _ctx: &RenderContext, inputs: &[AudioBus]) {
        let channels = self.output.channel_capacity();
        self.output.set_channel_count(channels);

        let input = connected_input(inputs, 0);
        for channel in 0..channels {
            let out = self.output.channel_mut(channel);
            match input {
                Some(bus) if channel < bus.channel_count() => {
                    out.copy_from_slice(bus.channel(channel));
                }
                _ => out.fill(0.0),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUANTUM: usize = 8;

    fn ctx() -> RenderContext {
        RenderContext {
            sample_rate: 48_000.0,
            quantum_size: QUANTUM,
            current_frame: 0,
        }
    }

    #[test]
    fn captures_input_channels() {
        let mut input = AudioBus::new(2, QUANTUM);
        input.channel_mut(0).fill(0.1);
        input.channel_mut(1).fill(0.2);

        let mut node = DestinationNode::new(&DestinationDesc { channel_count: 2 }, QUANTUM);
        node.process(&ctx(), &[input]);
        assert!(node.output().channel(0).iter().all(|&s| s == 0.1));
        assert!(node.output().channel(1).iter().all(|&s| s == 0.2));
    }

    #[test]
    fn silent_when_unconnected() {
        let mut node = DestinationNode::new(&DestinationDesc { channel_count: 2 }, QUANTUM);
        node.process(&ctx(), &[]);
        assert_eq!(node.output().channel_count(), 2);
        assert!(node.output().channel(0).iter().all(|&s| s == 0.0));
    }
}
