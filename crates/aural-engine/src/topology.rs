//! Compiled, render-thread-owned execution plan.
//!
//! A [`Topology`] is self-contained: it owns the render-node instances,
//! the dependency-ordered processing entries, the resolved wiring, the
//! pre-allocated mix and parameter scratch buses, per-node channel-mixing
//! settings and per-parameter automation state. The control thread builds
//! one with [`build_topology`](crate::compiler::build_topology) and ships
//! it whole through the update mailbox; the render thread executes
//! [`process_quantum`](Topology::process_quantum) against it without locks
//! or allocation.
//!
//! A delay node inside a feedback cycle appears as *two* processing
//! entries (writer and reader) that reference the same logical node. Entry
//! indices and logical node indices are therefore distinct index spaces;
//! [`ProcessingEntry`] carries the mapping, and parameter state is keyed
//! by the logical node (`param_owner`) so both entries share one owner.

use std::collections::HashMap;

use crate::automation::AutomationState;
use crate::bus::{AudioBus, MAX_CHANNELS};
use crate::description::{
    ChannelCountMode, ChannelInterpretation, NodeDescription, NodeId, NodeKind,
};
use crate::mixing::{computed_channel_count, mix_bus_into};
use crate::nodes::{RenderContext, RenderNode};

/// A connection resolved to processing-entry indices.
#[derive(Clone, Copy, Debug)]
pub struct IndexedConnection {
    /// Entry whose node produces the signal.
    pub source_entry: usize,
    /// Output index on the source node.
    pub source_output: usize,
}

/// Role of one processing-order entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Ordinary node: mix inputs, evaluate params, process.
    Node,
    /// Delay-split writer: consumes the current quantum's input.
    DelayWriter,
    /// Delay-split reader: produces output from previous quanta.
    DelayReader,
}

/// One slot in the processing order.
#[derive(Clone, Copy, Debug)]
pub struct ProcessingEntry {
    /// Entry role.
    pub kind: EntryKind,
    /// Logical node index (into the topology's node list).
    pub node_index: usize,
    /// Logical node that owns this entry's parameter state. Writer and
    /// reader entries of a split delay share the delay's index here.
    pub param_owner: usize,
}

/// Per-node channel mixing settings, resolved from the description.
#[derive(Clone, Copy, Debug)]
pub struct ChannelMixing {
    /// Declared channel count.
    pub count: usize,
    /// Count derivation mode.
    pub mode: ChannelCountMode,
    /// Mixing interpretation.
    pub interpretation: ChannelInterpretation,
}

impl Default for ChannelMixing {
    fn default() -> Self {
        Self {
            count: 1,
            mode: ChannelCountMode::Max,
            interpretation: ChannelInterpretation::Speakers,
        }
    }
}

impl ChannelMixing {
    /// Resolves the mixing settings a node's inputs are mixed with.
    pub fn for_description(desc: &NodeDescription) -> Self {
        match desc {
            NodeDescription::Destination(d) => Self {
                count: d.channel_count.clamp(1, MAX_CHANNELS),
                mode: ChannelCountMode::Explicit,
                interpretation: ChannelInterpretation::Speakers,
            },
            NodeDescription::Gain(d) => Self::from_settings(&d.channels),
            NodeDescription::BiquadFilter(d) => Self::from_settings(&d.channels),
            NodeDescription::StereoPanner(d) => Self::from_settings(&d.channels),
            NodeDescription::Compressor(d) => Self::from_settings(&d.channels),
            NodeDescription::Analyser(d) => Self::from_settings(&d.channels),
            // The delay ring is sized to the declared count at build time,
            // so the mixed input must never exceed it.
            NodeDescription::Delay(d) => Self {
                count: d.channels.count.clamp(1, MAX_CHANNELS),
                mode: ChannelCountMode::ClampedMax,
                interpretation: d.channels.interpretation,
            },
            NodeDescription::ChannelSplitter(d) => Self {
                count: d.outputs.clamp(1, MAX_CHANNELS),
                mode: ChannelCountMode::Explicit,
                interpretation: ChannelInterpretation::Discrete,
            },
            NodeDescription::ChannelMerger(_) => Self {
                count: 1,
                mode: ChannelCountMode::Explicit,
                interpretation: ChannelInterpretation::Speakers,
            },
            NodeDescription::Oscillator(_)
            | NodeDescription::ConstantSource(_)
            | NodeDescription::BufferSource(_)
            | NodeDescription::StreamSource(_) => Self::default(),
        }
    }

    fn from_settings(settings: &crate::description::ChannelSettings) -> Self {
        Self {
            count: settings.count.clamp(1, MAX_CHANNELS),
            mode: settings.mode,
            interpretation: settings.interpretation,
        }
    }
}

/// The render thread's compiled execution plan for one graph description.
pub struct Topology {
    /// Render-node instances, one per logical node, NodeId-ascending.
    pub(crate) nodes: Vec<RenderNode>,
    /// Logical node index → NodeId.
    pub(crate) node_ids: Vec<NodeId>,
    /// Logical node index → type tag.
    pub(crate) node_kinds: Vec<NodeKind>,
    /// NodeId → logical node index.
    pub(crate) node_index_by_id: HashMap<NodeId, usize>,
    /// Processing-order entries (delay splits add two per delay).
    pub(crate) entries: Vec<ProcessingEntry>,
    /// Topologically sorted entry indices.
    pub(crate) order: Vec<usize>,
    /// Entry → input slot → incoming connections.
    pub(crate) inputs: Vec<Vec<Vec<IndexedConnection>>>,
    /// Entry → parameter index → modulation connections.
    pub(crate) param_inputs: Vec<Vec<Vec<IndexedConnection>>>,
    /// Entry → input slot → pre-allocated mix bus.
    pub(crate) input_mix: Vec<Vec<AudioBus>>,
    /// Entry → channel mixing settings.
    pub(crate) mixing: Vec<ChannelMixing>,
    /// Logical node → parameter index → computed-value bus (mono).
    pub(crate) param_buses: Vec<Vec<AudioBus>>,
    /// Logical node → parameter index → automation state.
    pub(crate) automation: Vec<Vec<AutomationState>>,
    /// Entry index of the destination node.
    pub(crate) destination_entry: usize,
    /// Logical node indices of analyser nodes, in NodeId order.
    pub(crate) analyser_nodes: Vec<usize>,
}

impl Topology {
    /// Number of logical nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of processing-order entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// The destination node's output bus for the current quantum.
    pub fn destination_output(&self) -> &AudioBus {
        let entry = self.entries[self.destination_entry];
        self.nodes[entry.node_index].output(0)
    }

    /// Executes one quantum over every entry in processing order.
    ///
    /// For each entry: mix the connected sources into each input slot's
    /// scratch bus, compute each parameter's value (modulation mix +
    /// intrinsic automation, NaN/clamp/k-rate finalization), then invoke
    /// the node — or the specialized writer/reader step for a split delay.
    pub(crate) fn process_quantum(&mut self, ctx: &RenderContext) {
        let Topology {
            nodes,
            entries,
            order,
            inputs,
            param_inputs,
            input_mix,
            mixing,
            param_buses,
            automation,
            ..
        } = self;

        for &entry_index in order.iter() {
            let entry = entries[entry_index];

            // Mix every connected source into this entry's input slots.
            for (slot, connections) in inputs[entry_index].iter().enumerate() {
                let mix_bus = &mut input_mix[entry_index][slot];

                let mut max_input_channels = 0usize;
                for connection in connections {
                    let source = &nodes[entries[connection.source_entry].node_index];
                    let output_index = connection.source_output.min(source.output_count() - 1);
                    max_input_channels =
                        max_input_channels.max(source.output(output_index).channel_count());
                }

                if connections.is_empty() || max_input_channels == 0 {
                    // No source carries channels: the slot collapses to a
                    // silent, channel-less input for this quantum.
                    mix_bus.set_channel_count(0);
                    continue;
                }

                let settings = mixing[entry_index];
                let desired =
                    computed_channel_count(settings.mode, settings.count, max_input_channels)
                        .min(mix_bus.channel_capacity());
                mix_bus.set_channel_count(desired);
                mix_bus.zero();

                for connection in connections {
                    let source = &nodes[entries[connection.source_entry].node_index];
                    let output_index = connection.source_output.min(source.output_count() - 1);
                    mix_bus_into(mix_bus, source.output(output_index), settings.interpretation);
                }
            }

            // Compute each parameter's value for this quantum.
            let owner = entry.param_owner;
            for (param, connections) in param_inputs[entry_index].iter().enumerate() {
                let param_bus = &mut param_buses[owner][param];
                param_bus.set_channel_count(1);
                param_bus.zero();

                for connection in connections {
                    let source = &nodes[entries[connection.source_entry].node_index];
                    let output_index = connection.source_output.min(source.output_count() - 1);
                    mix_bus_into(
                        param_bus,
                        source.output(output_index),
                        ChannelInterpretation::Speakers,
                    );
                }

                let state = &mut automation[owner][param];
                state.accumulate_intrinsic(
                    param_bus.channel_mut(0),
                    ctx.current_frame,
                    ctx.sample_rate,
                );
                state.finalize(param_bus.channel_mut(0));
            }

            // Run the node.
            let node = &mut nodes[entry.node_index];
            match entry.kind {
                EntryKind::Node => {
                    node.process(ctx, &input_mix[entry_index], &param_buses[owner]);
                }
                EntryKind::DelayWriter => node.process_cycle_writer(ctx, &input_mix[entry_index]),
                EntryKind::DelayReader => node.process_cycle_reader(ctx, &param_buses[owner]),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{
        ChannelMergerDesc, ChannelSettings, ChannelSplitterDesc, DelayDesc, DestinationDesc,
        GainDesc,
    };

    #[test]
    fn destination_mixing_is_explicit_speakers() {
        let mixing = ChannelMixing::for_description(&NodeDescription::Destination(
            DestinationDesc { channel_count: 2 },
        ));
        assert_eq!(mixing.count, 2);
        assert_eq!(mixing.mode, ChannelCountMode::Explicit);
        assert_eq!(mixing.interpretation, ChannelInterpretation::Speakers);
    }

    #[test]
    fn gain_mixing_follows_description() {
        let mixing = ChannelMixing::for_description(&NodeDescription::Gain(GainDesc {
            gain: 1.0,
            channels: ChannelSettings {
                count: 4,
                mode: ChannelCountMode::Explicit,
                interpretation: ChannelInterpretation::Discrete,
            },
        }));
        assert_eq!(mixing.count, 4);
        assert_eq!(mixing.mode, ChannelCountMode::Explicit);
        assert_eq!(mixing.interpretation, ChannelInterpretation::Discrete);
    }

    #[test]
    fn delay_mixing_is_clamped_to_declared_count() {
        let mixing = ChannelMixing::for_description(&NodeDescription::Delay(DelayDesc {
            delay_time: 0.1,
            max_delay_time: 1.0,
            channels: ChannelSettings {
                count: 2,
                mode: ChannelCountMode::Max,
                interpretation: ChannelInterpretation::Speakers,
            },
        }));
        assert_eq!(mixing.mode, ChannelCountMode::ClampedMax);
        assert_eq!(mixing.count, 2);
    }

    #[test]
    fn splitter_mixing_is_discrete_explicit() {
        let mixing = ChannelMixing::for_description(&NodeDescription::ChannelSplitter(
            ChannelSplitterDesc { outputs: 4 },
        ));
        assert_eq!(mixing.count, 4);
        assert_eq!(mixing.mode, ChannelCountMode::Explicit);
        assert_eq!(mixing.interpretation, ChannelInterpretation::Discrete);
    }

    #[test]
    fn merger_inputs_are_pinned_mono() {
        let mixing = ChannelMixing::for_description(&NodeDescription::ChannelMerger(
            ChannelMergerDesc { inputs: 4 },
        ));
        assert_eq!(mixing.count, 1);
        assert_eq!(mixing.mode, ChannelCountMode::Explicit);
    }
}
