//! Graph compiler: node instantiation, topology construction, update
//! classification.
//!
//! Compilation is control-thread work. [`build_topology`] turns a
//! description into a self-contained [`Topology`]: instantiate one render
//! node per description entry (resolving resources through the registry,
//! degrading to silence on failure), find cycles (Tarjan SCC over the
//! union of audio and param edges), split every delay node found in a
//! cycle into writer/reader entries, order the resulting DAG with Kahn's
//! algorithm, and resolve all wiring to entry indices with pre-allocated
//! scratch buses.
//!
//! [`classify_update`] is the pure diff that gates which cross-thread
//! update path is legal for a new description.

use std::collections::HashMap;

use aural_registry::ResourceRegistry;

use crate::automation::AutomationState;
use crate::bus::{AudioBus, MAX_CHANNELS};
use crate::description::{GraphDescription, NodeDescription, NodeId, NodeKind};
use crate::nodes::{
    AnalyserNode, BiquadFilterNode, BufferSourceNode, ChannelMergerNode, ChannelSplitterNode,
    CompressorNode, ConstantSourceNode, DelayNode, DestinationNode, GainNode, OscillatorNode,
    RenderNode, StereoPannerNode, StreamSourceNode,
};
use crate::topology::{ChannelMixing, EntryKind, IndexedConnection, ProcessingEntry, Topology};

/// Result of diffing two descriptions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphUpdateKind {
    /// The descriptions are identical.
    None,
    /// Same node set and wiring; only tunable node fields or automation
    /// timelines differ.
    Parameter,
    /// Structural difference: node added/removed/retyped, a resource
    /// reference changed, or any connection changed.
    RebuildRequired,
}

/// Fatal compilation failure.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// A feedback cycle contains no delay node, so it cannot be broken.
    /// This is a caller contract violation, not a recoverable condition.
    #[error("graph contains a feedback cycle with no delay node")]
    UnresolvedCycle,
}

/// Classifies the difference between two node descriptions.
///
/// A changed resource reference is structural: resources are resolved on
/// the control thread at build time, never on the render path.
pub fn classify_node_update(old: &NodeDescription, new: &NodeDescription) -> GraphUpdateKind {
    if old.kind() != new.kind() {
        return GraphUpdateKind::RebuildRequired;
    }
    match (old, new) {
        (NodeDescription::BufferSource(a), NodeDescription::BufferSource(b)) => {
            if a.buffer != b.buffer {
                GraphUpdateKind::RebuildRequired
            } else {
                diff_fields(a == b)
            }
        }
        (NodeDescription::StreamSource(a), NodeDescription::StreamSource(b)) => {
            if a.stream != b.stream {
                GraphUpdateKind::RebuildRequired
            } else {
                diff_fields(a == b)
            }
        }
        (NodeDescription::Oscillator(a), NodeDescription::Oscillator(b)) => diff_fields(a == b),
        (NodeDescription::ConstantSource(a), NodeDescription::ConstantSource(b)) => {
            diff_fields(a == b)
        }
        (NodeDescription::Gain(a), NodeDescription::Gain(b)) => diff_fields(a == b),
        (NodeDescription::Delay(a), NodeDescription::Delay(b)) => diff_fields(a == b),
        (NodeDescription::BiquadFilter(a), NodeDescription::BiquadFilter(b)) => diff_fields(a == b),
        (NodeDescription::StereoPanner(a), NodeDescription::StereoPanner(b)) => diff_fields(a == b),
        (NodeDescription::Compressor(a), NodeDescription::Compressor(b)) => diff_fields(a == b),
        (NodeDescription::Analyser(a), NodeDescription::Analyser(b)) => diff_fields(a == b),
        (NodeDescription::ChannelSplitter(a), NodeDescription::ChannelSplitter(b)) => {
            // The output count shapes the wiring index space.
            if a.outputs != b.outputs {
                GraphUpdateKind::RebuildRequired
            } else {
                GraphUpdateKind::None
            }
        }
        (NodeDescription::ChannelMerger(a), NodeDescription::ChannelMerger(b)) => {
            if a.inputs != b.inputs {
                GraphUpdateKind::RebuildRequired
            } else {
                GraphUpdateKind::None
            }
        }
        (NodeDescription::Destination(a), NodeDescription::Destination(b)) => diff_fields(a == b),
        // Kind equality was checked above; mismatched pairings cannot occur.
        _ => GraphUpdateKind::RebuildRequired,
    }
}

fn diff_fields(equal: bool) -> GraphUpdateKind {
    if equal {
        GraphUpdateKind::None
    } else {
        GraphUpdateKind::Parameter
    }
}

/// Classifies the difference between two description snapshots (spec'd
/// three-way diff: `None` / `Parameter` / `RebuildRequired`).
pub fn classify_update(old: &GraphDescription, new: &GraphDescription) -> GraphUpdateKind {
    if old.destination_node_id != new.destination_node_id {
        return GraphUpdateKind::RebuildRequired;
    }
    if old.nodes.len() != new.nodes.len() {
        return GraphUpdateKind::RebuildRequired;
    }

    let mut any_parameter = false;
    for (node_id, old_node) in &old.nodes {
        let Some(new_node) = new.nodes.get(node_id) else {
            return GraphUpdateKind::RebuildRequired;
        };
        match classify_node_update(old_node, new_node) {
            GraphUpdateKind::RebuildRequired => return GraphUpdateKind::RebuildRequired,
            GraphUpdateKind::Parameter => any_parameter = true,
            GraphUpdateKind::None => {}
        }
    }

    if old.connections != new.connections || old.param_connections != new.param_connections {
        return GraphUpdateKind::RebuildRequired;
    }

    if old.param_automations != new.param_automations {
        any_parameter = true;
    }

    if any_parameter {
        GraphUpdateKind::Parameter
    } else {
        GraphUpdateKind::None
    }
}

/// Instantiates one render node from its description, resolving resource
/// references. Unresolvable resources degrade the node to silence.
#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn make_render_node(
    node_id: NodeId,
    desc: &NodeDescription,
    sample_rate: f32,
    quantum_size: usize,
    registry: &ResourceRegistry,
) -> RenderNode {
    match desc {
        NodeDescription::Oscillator(d) => RenderNode::Oscillator(OscillatorNode::new(d, quantum_size)),
        NodeDescription::ConstantSource(d) => {
            RenderNode::ConstantSource(ConstantSourceNode::new(d, quantum_size))
        }
        NodeDescription::BufferSource(d) => {
            let buffer = d.buffer.and_then(|id| {
                let resolved = registry.buffer(id);
                if resolved.is_none() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "node {:?}: sample buffer {id} not in registry; rendering silence",
                        node_id
                    );
                }
                resolved
            });
            RenderNode::BufferSource(BufferSourceNode::new(d, buffer, quantum_size))
        }
        NodeDescription::StreamSource(d) => {
            let channel_count = d.stream.and_then(|id| {
                let resolved = registry.stream(id).map(|info| info.channel_count);
                if resolved.is_none() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "node {:?}: stream {id} not in registry; rendering silence",
                        node_id
                    );
                }
                resolved
            });
            RenderNode::StreamSource(StreamSourceNode::new(d, channel_count.unwrap_or(1), quantum_size))
        }
        NodeDescription::Gain(_) => RenderNode::Gain(GainNode::new(quantum_size)),
        NodeDescription::Delay(d) => {
            RenderNode::Delay(DelayNode::new(d, sample_rate, quantum_size))
        }
        NodeDescription::BiquadFilter(d) => {
            RenderNode::BiquadFilter(BiquadFilterNode::new(d, quantum_size))
        }
        NodeDescription::StereoPanner(_) => RenderNode::StereoPanner(StereoPannerNode::new(quantum_size)),
        NodeDescription::Compressor(_) => RenderNode::Compressor(CompressorNode::new(quantum_size)),
        NodeDescription::Analyser(d) => RenderNode::Analyser(AnalyserNode::new(d, quantum_size)),
        NodeDescription::ChannelSplitter(d) => {
            RenderNode::ChannelSplitter(ChannelSplitterNode::new(d, quantum_size))
        }
        NodeDescription::ChannelMerger(d) => {
            RenderNode::ChannelMerger(ChannelMergerNode::new(d, quantum_size))
        }
        NodeDescription::Destination(d) => {
            RenderNode::Destination(DestinationNode::new(d, quantum_size))
        }
    }
}

/// Marks every node that participates in a cycle (Tarjan SCC, iterative).
///
/// A node is in a cycle if its strongly connected component has more than
/// one member, or if it has a self-edge.
fn nodes_in_cycles(node_count: usize, edges: &[Vec<usize>]) -> Vec<bool> {
    let mut index = vec![usize::MAX; node_count];
    let mut lowlink = vec![usize::MAX; node_count];
    let mut on_stack = vec![false; node_count];
    let mut scc_stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut in_cycle = vec![false; node_count];

    let mut has_self_edge = vec![false; node_count];
    for (node, neighbors) in edges.iter().enumerate() {
        if neighbors.contains(&node) {
            has_self_edge[node] = true;
        }
    }

    // Explicit DFS stack of (node, next edge offset) frames.
    let mut call_stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..node_count {
        if index[root] != usize::MAX {
            continue;
        }
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        scc_stack.push(root);
        on_stack[root] = true;
        call_stack.push((root, 0));

        let mut component: Vec<usize> = Vec::new();
        while let Some(&(node, edge_offset)) = call_stack.last() {
            if edge_offset < edges[node].len() {
                call_stack.last_mut().expect("frame just read").1 += 1;
                let neighbor = edges[node][edge_offset];
                if index[neighbor] == usize::MAX {
                    index[neighbor] = next_index;
                    lowlink[neighbor] = next_index;
                    next_index += 1;
                    scc_stack.push(neighbor);
                    on_stack[neighbor] = true;
                    call_stack.push((neighbor, 0));
                } else if on_stack[neighbor] {
                    lowlink[node] = lowlink[node].min(index[neighbor]);
                }
                continue;
            }

            call_stack.pop();
            if let Some(&(parent, _)) = call_stack.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[node]);
            }
            if lowlink[node] == index[node] {
                component.clear();
                while let Some(member) = scc_stack.pop() {
                    on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                if component.len() > 1 {
                    for &member in &component {
                        in_cycle[member] = true;
                    }
                }
            }
        }
    }

    for node in 0..node_count {
        if has_self_edge[node] {
            in_cycle[node] = true;
        }
    }

    in_cycle
}

/// Builds a complete, self-contained topology from a description.
///
/// # Errors
///
/// [`CompileError::UnresolvedCycle`] if a cycle survives delay splitting.
pub fn build_topology(
    description: &GraphDescription,
    sample_rate: f32,
    quantum_size: usize,
    registry: &ResourceRegistry,
) -> Result<Topology, CompileError> {
    // Instantiate nodes in NodeId order (BTreeMap iteration) so indices
    // are deterministic for a given snapshot.
    let mut nodes = Vec::with_capacity(description.nodes.len());
    let mut node_ids = Vec::with_capacity(description.nodes.len());
    let mut node_kinds = Vec::with_capacity(description.nodes.len());
    let mut node_index_by_id = HashMap::with_capacity(description.nodes.len());
    let mut analyser_nodes = Vec::new();
    let mut node_descs: Vec<&NodeDescription> = Vec::with_capacity(description.nodes.len());

    for (&node_id, desc) in &description.nodes {
        let node_index = nodes.len();
        node_ids.push(node_id);
        node_kinds.push(desc.kind());
        node_index_by_id.insert(node_id, node_index);
        node_descs.push(desc);
        if desc.kind() == NodeKind::Analyser {
            analyser_nodes.push(node_index);
        }
        nodes.push(make_render_node(node_id, desc, sample_rate, quantum_size, registry));
    }
    let node_count = nodes.len();

    // Cycle detection over the union of audio and param edges between
    // logical nodes.
    let mut real_edges: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for connection in &description.connections {
        if let (Some(&source), Some(&destination)) = (
            node_index_by_id.get(&connection.source),
            node_index_by_id.get(&connection.destination),
        ) {
            real_edges[source].push(destination);
        }
    }
    for connection in &description.param_connections {
        if let (Some(&source), Some(&destination)) = (
            node_index_by_id.get(&connection.source),
            node_index_by_id.get(&connection.destination),
        ) {
            real_edges[source].push(destination);
        }
    }
    let in_cycle = nodes_in_cycles(node_count, &real_edges);

    // Build processing entries, splitting cycle-breaking delays.
    let mut entries: Vec<ProcessingEntry> = Vec::with_capacity(node_count + 2);
    let mut entry_for_node: Vec<Option<usize>> = vec![None; node_count];
    let mut writer_for_node: Vec<Option<usize>> = vec![None; node_count];
    let mut reader_for_node: Vec<Option<usize>> = vec![None; node_count];
    let mut split = vec![false; node_count];

    for node_index in 0..node_count {
        if node_kinds[node_index] == NodeKind::Delay && in_cycle[node_index] {
            split[node_index] = true;
            writer_for_node[node_index] = Some(entries.len());
            entries.push(ProcessingEntry {
                kind: EntryKind::DelayWriter,
                node_index,
                param_owner: node_index,
            });
            reader_for_node[node_index] = Some(entries.len());
            entries.push(ProcessingEntry {
                kind: EntryKind::DelayReader,
                node_index,
                param_owner: node_index,
            });
        } else {
            entry_for_node[node_index] = Some(entries.len());
            entries.push(ProcessingEntry {
                kind: EntryKind::Node,
                node_index,
                param_owner: node_index,
            });
        }
    }
    let entry_count = entries.len();

    // Resolve wiring to entry indices. Audio connections into a split
    // delay land on its writer; its outgoing audio comes from the reader.
    // Param connections land on the reader (the entry that evaluates the
    // delay's parameters).
    let source_entry_for = |node_index: usize| -> usize {
        if split[node_index] {
            reader_for_node[node_index]
        } else {
            entry_for_node[node_index]
        }
        .unwrap_or(0)
    };

    let mut inputs: Vec<Vec<Vec<IndexedConnection>>> = vec![Vec::new(); entry_count];
    let mut param_inputs: Vec<Vec<Vec<IndexedConnection>>> = Vec::with_capacity(entry_count);
    for entry in &entries {
        let param_count = match entry.kind {
            EntryKind::DelayWriter => 0,
            _ => node_descs[entry.node_index].param_count(),
        };
        param_inputs.push(vec![Vec::new(); param_count]);
    }

    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); entry_count];

    for connection in &description.connections {
        let (Some(&source), Some(&destination)) = (
            node_index_by_id.get(&connection.source),
            node_index_by_id.get(&connection.destination),
        ) else {
            continue;
        };
        let source_entry = source_entry_for(source);
        let destination_entry = if split[destination] {
            writer_for_node[destination]
        } else {
            entry_for_node[destination]
        }
        .unwrap_or(0);

        let slots = &mut inputs[destination_entry];
        if slots.len() <= connection.destination_input_index {
            slots.resize(connection.destination_input_index + 1, Vec::new());
        }
        slots[connection.destination_input_index].push(IndexedConnection {
            source_entry,
            source_output: connection.source_output_index,
        });
        edges[source_entry].push(destination_entry);
    }

    for connection in &description.param_connections {
        let (Some(&source), Some(&destination)) = (
            node_index_by_id.get(&connection.source),
            node_index_by_id.get(&connection.destination),
        ) else {
            continue;
        };
        let source_entry = source_entry_for(source);
        let destination_entry = source_entry_for(destination);

        let params = &mut param_inputs[destination_entry];
        if connection.destination_param_index >= params.len() {
            continue;
        }
        params[connection.destination_param_index].push(IndexedConnection {
            source_entry,
            source_output: connection.source_output_index,
        });
        edges[source_entry].push(destination_entry);
    }

    // Kahn's algorithm over the split graph. Anything left unordered is a
    // cycle with no delay in it — a caller contract violation.
    let mut in_degree = vec![0usize; entry_count];
    for targets in &edges {
        for &target in targets {
            in_degree[target] += 1;
        }
    }
    let mut queue: Vec<usize> = (0..entry_count).filter(|&e| in_degree[e] == 0).collect();
    let mut order = Vec::with_capacity(entry_count);
    while let Some(entry_index) = queue.pop() {
        order.push(entry_index);
        for &target in &edges[entry_index] {
            in_degree[target] -= 1;
            if in_degree[target] == 0 {
                queue.push(target);
            }
        }
    }
    if order.len() != entry_count {
        return Err(CompileError::UnresolvedCycle);
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        "compiled topology: {} nodes, {} entries ({} delay splits)",
        node_count,
        entry_count,
        entries.iter().filter(|e| e.kind == EntryKind::DelayWriter).count()
    );

    // Scratch buses and per-entry mixing settings.
    let mut input_mix: Vec<Vec<AudioBus>> = Vec::with_capacity(entry_count);
    let mut mixing = Vec::with_capacity(entry_count);
    for (entry_index, entry) in entries.iter().enumerate() {
        input_mix.push(
            (0..inputs[entry_index].len())
                .map(|_| AudioBus::with_capacity(1, quantum_size, MAX_CHANNELS))
                .collect(),
        );
        mixing.push(ChannelMixing::for_description(node_descs[entry.node_index]));
    }

    // Per-node parameter buses and automation state.
    let mut param_buses: Vec<Vec<AudioBus>> = Vec::with_capacity(node_count);
    let mut automation: Vec<Vec<AutomationState>> = Vec::with_capacity(node_count);
    for desc in &node_descs {
        let param_count = desc.param_count();
        param_buses.push((0..param_count).map(|_| AudioBus::new(1, quantum_size)).collect());
        let mut states = vec![AutomationState::default(); param_count];
        desc.initialize_param_state(&mut |param, intrinsic, min, max| {
            if let Some(state) = states.get_mut(param) {
                state.intrinsic_value = intrinsic;
                state.default_value = intrinsic;
                state.min_value = min;
                state.max_value = max;
            }
        });
        automation.push(states);
    }
    for automation_entry in &description.param_automations {
        let Some(&node_index) = node_index_by_id.get(&automation_entry.destination) else {
            continue;
        };
        let Some(state) = automation[node_index].get_mut(automation_entry.destination_param_index)
        else {
            continue;
        };
        state.replace_from(automation_entry);
    }

    let destination_entry = node_index_by_id
        .get(&description.destination_node_id)
        .map(|&node_index| source_entry_for(node_index))
        .unwrap_or(0);

    Ok(Topology {
        nodes,
        node_ids,
        node_kinds,
        node_index_by_id,
        entries,
        order,
        inputs,
        param_inputs,
        input_mix,
        mixing,
        param_buses,
        automation,
        destination_entry,
        analyser_nodes,
    })
}
