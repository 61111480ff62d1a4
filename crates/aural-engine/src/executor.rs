//! Graph executor: the render-thread handle, its control-thread twin, and
//! the cross-thread update protocol between them.
//!
//! [`GraphController::create`] compiles the initial description and
//! returns the pair. The two handles share nothing but the update
//! mailboxes: the controller owns the current [`GraphDescription`] and
//! publishes compiled topologies / parameter batches; the executor owns
//! the live [`Topology`] and produces one quantum of samples per
//! [`begin_quantum`](GraphExecutor::begin_quantum) /
//! [`ensure_processed`](GraphExecutor::ensure_processed) cycle.
//!
//! Updates install at quantum (or explicit flush) boundaries only, and
//! only when a retired slot is free to park the displaced structure —
//! otherwise the update stays pending (backpressure, logged at a bounded
//! rate). The render thread never blocks, never locks, and never frees a
//! displaced topology; the controller reclaims retired payloads on its
//! own thread.

use std::sync::Arc;

use aural_registry::ResourceRegistry;

use crate::bus::AudioBus;
use crate::compiler::{
    CompileError, GraphUpdateKind, build_topology, classify_update,
};
use crate::description::{GraphDescription, NodeDescription, NodeId, ParamAutomation};
use crate::mailbox::{StallThrottle, UpdateMailbox};
use crate::nodes::{RenderContext, RenderNode};
use crate::topology::{ChannelMixing, Topology};

/// Rejection of an enqueue request.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// The new description is identical to the current one.
    #[error("descriptions are identical; nothing to update")]
    NotAnUpdate,
    /// The parameter path was requested but the diff is structural.
    #[error("update is not parameter-only (classified {0:?})")]
    NotParameterOnly(GraphUpdateKind),
    /// The destination node changed; that is a new engine, not an update.
    #[error("destination node changed; rebuild the engine instead")]
    DestinationChanged,
    /// Compiling the new topology failed.
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// A parameter-only update: per-node description snapshots (aligned with
/// the executor's node indices) plus replacement automation timelines.
pub struct ParameterBatch {
    node_ids: Vec<NodeId>,
    nodes_by_index: Vec<NodeDescription>,
    automations: Vec<ParamAutomation>,
}

/// The two mailboxes shared by a controller/executor pair.
struct Mailboxes {
    topology: UpdateMailbox<Topology>,
    parameters: UpdateMailbox<ParameterBatch>,
}

/// Control-thread handle: owns the description, classifies and publishes
/// updates, reclaims retired structures.
pub struct GraphController {
    description: GraphDescription,
    sample_rate: f32,
    quantum_size: usize,
    mailboxes: Arc<Mailboxes>,
}

/// Render-thread handle: owns the live topology and drives quanta.
pub struct GraphExecutor {
    topology: Arc<Topology>,
    /// Control-side description snapshot, maintained only by the offline
    /// update path (offline contexts drive the executor single-threaded
    /// and never use the mailboxes).
    description: GraphDescription,
    context: RenderContext,
    cache_generation: u64,
    last_processed_generation: u64,
    mailboxes: Arc<Mailboxes>,
    topology_stall: StallThrottle,
    parameter_stall: StallThrottle,
}

impl GraphController {
    /// Compiles `description` and returns the controller/executor pair.
    ///
    /// The executor is `Send`: move it to the render thread and keep the
    /// controller wherever graph edits originate.
    pub fn create(
        description: GraphDescription,
        sample_rate: f32,
        quantum_size: usize,
        registry: &ResourceRegistry,
    ) -> Result<(GraphController, GraphExecutor), CompileError> {
        let topology = build_topology(&description, sample_rate, quantum_size, registry)?;
        let mailboxes = Arc::new(Mailboxes {
            topology: UpdateMailbox::new(),
            parameters: UpdateMailbox::new(),
        });

        let controller = GraphController {
            description: description.clone(),
            sample_rate,
            quantum_size,
            mailboxes: Arc::clone(&mailboxes),
        };
        let executor = GraphExecutor {
            topology: Arc::new(topology),
            description,
            context: RenderContext {
                sample_rate,
                quantum_size,
                current_frame: 0,
            },
            cache_generation: 1,
            last_processed_generation: 0,
            mailboxes,
            topology_stall: StallThrottle::default(),
            parameter_stall: StallThrottle::default(),
        };
        Ok((controller, executor))
    }

    /// The description currently in effect on the control side.
    pub fn description(&self) -> &GraphDescription {
        &self.description
    }

    /// Classifies `new` against the current description.
    pub fn classify_update(&self, new: &GraphDescription) -> GraphUpdateKind {
        classify_update(&self.description, new)
    }

    /// Publishes a structural (or wider-than-parameter) update.
    ///
    /// Compiles a brand-new topology on this thread and installs it in the
    /// pending slot, replacing any unconsumed pending topology. Rejected
    /// outright when the diff is `None` or the destination changed; a
    /// rejected update is a no-op.
    pub fn enqueue_topology_update(
        &mut self,
        description: GraphDescription,
        registry: &ResourceRegistry,
    ) -> Result<(), UpdateError> {
        if description.destination_node_id != self.description.destination_node_id {
            return Err(UpdateError::DestinationChanged);
        }
        if self.classify_update(&description) == GraphUpdateKind::None {
            return Err(UpdateError::NotAnUpdate);
        }

        let topology = build_topology(&description, self.sample_rate, self.quantum_size, registry)?;
        self.mailboxes.topology.publish(topology);
        #[cfg(feature = "tracing")]
        tracing::debug!("queued topology update ({} nodes)", description.nodes.len());
        self.description = description;
        Ok(())
    }

    /// Publishes a parameter-only batch.
    ///
    /// Legal only when the diff classifies as `Parameter`; anything else
    /// is rejected outright and nothing is applied.
    pub fn enqueue_parameter_update(
        &mut self,
        description: GraphDescription,
    ) -> Result<(), UpdateError> {
        match self.classify_update(&description) {
            GraphUpdateKind::Parameter => {}
            GraphUpdateKind::None => return Err(UpdateError::NotAnUpdate),
            kind => return Err(UpdateError::NotParameterOnly(kind)),
        }

        let node_ids: Vec<NodeId> = description.nodes.keys().copied().collect();
        let nodes_by_index: Vec<NodeDescription> = description.nodes.values().cloned().collect();
        let batch = ParameterBatch {
            node_ids,
            nodes_by_index,
            automations: description.param_automations.clone(),
        };
        self.mailboxes.parameters.publish(batch);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "queued parameter batch ({} automations)",
            description.param_automations.len()
        );
        self.description = description;
        Ok(())
    }

    /// Reclaims every retired structure, dropping it on this thread.
    ///
    /// Safe at any time: a structure only becomes visible in a retired
    /// slot after the render thread has switched away from it for good.
    pub fn collect_retired_updates(&self) {
        self.mailboxes.topology.reclaim();
        self.mailboxes.parameters.reclaim();
    }
}

impl Drop for GraphController {
    fn drop(&mut self) {
        self.collect_retired_updates();
    }
}

impl GraphExecutor {
    /// Starts a new quantum: commits pending updates, sets the quantum's
    /// first frame, and invalidates the output cache.
    pub fn begin_quantum(&mut self, current_frame: u64) {
        self.try_commit_pending_topology();
        self.try_commit_pending_parameters();
        self.context.current_frame = current_frame;
        self.cache_generation += 1;
    }

    /// Flush point: commits pending updates without starting a quantum.
    ///
    /// Lets a driver apply edits promptly without rendering (and without
    /// advancing time) just to hit the next quantum boundary.
    pub fn commit_pending_updates(&mut self, current_frame: u64) {
        self.try_commit_pending_topology();
        self.try_commit_pending_parameters();
        self.context.current_frame = current_frame;
    }

    /// Processes the current quantum if it has not been processed yet.
    ///
    /// Idempotent within one quantum: repeated calls after the first are
    /// no-ops, guarded by the generation counter that
    /// [`begin_quantum`](Self::begin_quantum) advances.
    pub fn ensure_processed(&mut self) {
        if self.last_processed_generation == self.cache_generation {
            return;
        }
        let generation = self.cache_generation;
        let context = self.context;
        self.topology_mut().process_quantum(&context);
        self.last_processed_generation = generation;
    }

    /// The destination node's output bus for the current quantum,
    /// processing the graph first if needed.
    pub fn destination_output(&mut self) -> &AudioBus {
        self.ensure_processed();
        self.topology.destination_output()
    }

    /// Convenience: begin the quantum at `current_frame` and return the
    /// destination bus.
    pub fn render_quantum(&mut self, current_frame: u64) -> &AudioBus {
        self.begin_quantum(current_frame);
        self.destination_output()
    }

    /// Engine sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.context.sample_rate
    }

    /// Frames per quantum.
    pub fn quantum_size(&self) -> usize {
        self.context.quantum_size
    }

    /// Absolute frame index of the current quantum's first sample.
    pub fn current_frame(&self) -> u64 {
        self.context.current_frame
    }

    // --- Source scheduling ---

    /// Schedules a source node's start; `None` means the current frame.
    pub fn schedule_source_start(&mut self, node_id: NodeId, start_frame: Option<u64>) {
        let now = self.context.current_frame;
        let Some(&node_index) = self.topology.node_index_by_id.get(&node_id) else {
            return;
        };
        self.topology_mut().nodes[node_index].schedule_start(start_frame, now);
    }

    /// Schedules a source node's stop; `None` means the current frame.
    pub fn schedule_source_stop(&mut self, node_id: NodeId, stop_frame: Option<u64>) {
        let now = self.context.current_frame;
        let Some(&node_index) = self.topology.node_index_by_id.get(&node_id) else {
            return;
        };
        self.topology_mut().nodes[node_index].schedule_stop(stop_frame, now);
    }

    // --- Probe surface ---

    /// Number of analyser nodes in the live topology.
    pub fn analyser_count(&self) -> usize {
        self.topology.analyser_nodes.len()
    }

    /// NodeId of the analyser at `analyser_index`.
    pub fn analyser_node_id(&self, analyser_index: usize) -> Option<NodeId> {
        self.topology
            .analyser_nodes
            .get(analyser_index)
            .map(|&node_index| self.topology.node_ids[node_index])
    }

    /// Copies the analyser's recent time-domain samples into `out`.
    ///
    /// Ensures the current quantum is processed first, so repeated probe
    /// reads within one quantum see identical data.
    pub fn copy_analyser_time_domain(&mut self, analyser_index: usize, out: &mut [f32]) -> bool {
        self.ensure_processed();
        let Some(&node_index) = self.topology.analyser_nodes.get(analyser_index) else {
            return false;
        };
        match &self.topology.nodes[node_index] {
            RenderNode::Analyser(node) => {
                node.copy_time_domain(out);
                true
            }
            _ => false,
        }
    }

    /// Computes the analyser's smoothed frequency spectrum in dB into
    /// `out`.
    pub fn copy_analyser_frequency_db(&mut self, analyser_index: usize, out: &mut [f32]) -> bool {
        self.ensure_processed();
        let Some(&node_index) = self.topology.analyser_nodes.get(analyser_index) else {
            return false;
        };
        match &mut self.topology_mut().nodes[node_index] {
            RenderNode::Analyser(node) => {
                node.copy_frequency_db(out);
                true
            }
            _ => false,
        }
    }

    /// The gain reduction (dB, zero or negative) of a compressor node.
    pub fn compressor_reduction_db(&mut self, node_id: NodeId) -> Option<f32> {
        self.ensure_processed();
        let &node_index = self.topology.node_index_by_id.get(&node_id)?;
        match &self.topology.nodes[node_index] {
            RenderNode::Compressor(node) => Some(node.reduction_db()),
            _ => None,
        }
    }

    // --- Offline updates ---

    /// Applies a description in the non-real-time path.
    ///
    /// Offline rendering contexts own both roles on one thread and never
    /// use the mailboxes: a structural diff rebuilds the topology in
    /// place, a parameter diff applies through the nodes' offline hooks
    /// (preserving DSP state). Frame numbering restarts with the next
    /// quantum in the rebuild case.
    pub fn apply_update_offline(
        &mut self,
        description: GraphDescription,
        registry: &ResourceRegistry,
    ) -> Result<(), CompileError> {
        let kind = classify_update(&self.description, &description);
        match kind {
            GraphUpdateKind::RebuildRequired => {
                let topology = build_topology(
                    &description,
                    self.context.sample_rate,
                    self.context.quantum_size,
                    registry,
                )?;
                self.topology = Arc::new(topology);
            }
            GraphUpdateKind::Parameter | GraphUpdateKind::None => {
                let topology = self.topology_mut();
                for node_index in 0..topology.node_ids.len() {
                    let node_id = topology.node_ids[node_index];
                    if let Some(desc) = description.nodes.get(&node_id) {
                        topology.nodes[node_index].apply_description_offline(desc);
                    }
                }
                refresh_after_parameter_update(
                    topology,
                    |node_id| description.nodes.get(&node_id),
                    &description.param_automations,
                );
            }
        }
        self.description = description;
        self.last_processed_generation = 0;
        Ok(())
    }

    // --- Update commits (render thread) ---

    fn topology_mut(&mut self) -> &mut Topology {
        // The controller never keeps a reference to a published topology,
        // so after take_pending the executor is the sole owner.
        Arc::get_mut(&mut self.topology).expect("render thread uniquely owns the live topology")
    }

    fn try_commit_pending_topology(&mut self) {
        let mailbox = &self.mailboxes.topology;
        if !mailbox.has_pending() {
            return;
        }
        let Some(slot) = mailbox.free_retired_slot() else {
            // Deliberate backpressure: better to delay the edit than to
            // block or free on the render thread.
            if self.topology_stall.should_log() {
                #[cfg(feature = "tracing")]
                tracing::warn!("topology update stalled: all retired slots occupied");
            }
            return;
        };
        let Some(pending) = mailbox.take_pending() else {
            return;
        };

        let old = std::mem::replace(&mut self.topology, pending);
        mailbox.retire(slot, old);
        self.last_processed_generation = 0;
    }

    fn try_commit_pending_parameters(&mut self) {
        let mailbox = &self.mailboxes.parameters;
        if !mailbox.has_pending() {
            return;
        }
        let Some(slot) = mailbox.free_retired_slot() else {
            if self.parameter_stall.should_log() {
                #[cfg(feature = "tracing")]
                tracing::warn!("parameter update stalled: all retired slots occupied");
            }
            return;
        };
        let Some(batch) = mailbox.take_pending() else {
            return;
        };

        let topology = Arc::get_mut(&mut self.topology)
            .expect("render thread uniquely owns the live topology");
        if batch.node_ids == topology.node_ids {
            for (node_index, desc) in batch.nodes_by_index.iter().enumerate() {
                topology.nodes[node_index].apply_description(desc);
            }
            refresh_after_parameter_update(
                topology,
                |node_id| {
                    let index = batch.node_ids.iter().position(|&id| id == node_id)?;
                    batch.nodes_by_index.get(index)
                },
                &batch.automations,
            );
            self.last_processed_generation = 0;
        } else {
            // A topology update changed the node set after this batch was
            // queued; the batch no longer applies.
            #[cfg(feature = "tracing")]
            tracing::warn!("parameter batch dropped: node set changed since it was queued");
        }

        mailbox.retire(slot, batch);
    }
}

/// Re-derives the render-side state a parameter-class update can touch:
/// channel-mixing settings per entry, and per-parameter automation state
/// (segment lists replaced, cursors reset, intrinsics and clamp ranges
/// re-seeded from the node descriptions then overridden by the automation
/// entries).
fn refresh_after_parameter_update<'a>(
    topology: &mut Topology,
    desc_for: impl Fn(NodeId) -> Option<&'a NodeDescription>,
    automations: &[ParamAutomation],
) {
    for entry_index in 0..topology.entries.len() {
        let node_index = topology.entries[entry_index].node_index;
        if let Some(desc) = desc_for(topology.node_ids[node_index]) {
            topology.mixing[entry_index] = ChannelMixing::for_description(desc);
        }
    }

    for node_index in 0..topology.node_ids.len() {
        let Some(desc) = desc_for(topology.node_ids[node_index]) else {
            continue;
        };
        let states = &mut topology.automation[node_index];
        for state in states.iter_mut() {
            state.clear_segments();
        }
        desc.initialize_param_state(&mut |param, intrinsic, min, max| {
            if let Some(state) = states.get_mut(param) {
                state.intrinsic_value = intrinsic;
                state.default_value = intrinsic;
                state.min_value = min;
                state.max_value = max;
            }
        });
    }

    for automation in automations {
        let Some(&node_index) = topology.node_index_by_id.get(&automation.destination) else {
            continue;
        };
        let Some(state) =
            topology.automation[node_index].get_mut(automation.destination_param_index)
        else {
            continue;
        };
        state.replace_from(automation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{
        ChannelCountMode, ChannelInterpretation, ChannelSettings, CompressorDesc, Connection,
        ConstantSourceDesc, DelayDesc, DestinationDesc, GainDesc, OscillatorDesc, Waveform, params,
    };
    use aural_registry::SampleBuffer;

    const RATE: f32 = 1600.0;
    const QUANTUM: usize = 16;

    fn constant(offset: f32) -> NodeDescription {
        NodeDescription::ConstantSource(ConstantSourceDesc {
            offset,
            start_frame: Some(0),
            stop_frame: None,
        })
    }

    fn gain(value: f32) -> NodeDescription {
        NodeDescription::Gain(GainDesc {
            gain: value,
            channels: ChannelSettings::default(),
        })
    }

    fn destination(channel_count: usize) -> NodeDescription {
        NodeDescription::Destination(DestinationDesc { channel_count })
    }

    fn connect(source: u64, dest: u64) -> Connection {
        Connection {
            source: NodeId(source),
            destination: NodeId(dest),
            source_output_index: 0,
            destination_input_index: 0,
        }
    }

    /// constant(1) → gain(2) → destination(3), mono.
    fn chain(offset: f32, gain_value: f32) -> GraphDescription {
        let mut description = GraphDescription {
            destination_node_id: NodeId(3),
            ..GraphDescription::default()
        };
        description.nodes.insert(NodeId(1), constant(offset));
        description.nodes.insert(NodeId(2), gain(gain_value));
        description.nodes.insert(NodeId(3), destination(1));
        description.connections.push(connect(1, 2));
        description.connections.push(connect(2, 3));
        description
    }

    fn create(description: GraphDescription) -> (GraphController, GraphExecutor) {
        let registry = ResourceRegistry::new();
        GraphController::create(description, RATE, QUANTUM, &registry).unwrap()
    }

    #[test]
    fn renders_a_simple_chain() {
        let (_controller, mut executor) = create(chain(1.0, 0.5));
        let out = executor.render_quantum(0);
        assert_eq!(out.channel_count(), 1);
        assert!(out.channel(0).iter().all(|&s| s == 0.5));
    }

    #[test]
    fn ensure_processed_is_idempotent_within_a_quantum() {
        let mut description = chain(1.0, 1.0);
        description.nodes.insert(
            NodeId(1),
            NodeDescription::Oscillator(OscillatorDesc {
                waveform: Waveform::Sine,
                frequency: 100.0,
                detune_cents: 0.0,
                start_frame: Some(0),
                stop_frame: None,
            }),
        );

        let (_c1, mut repeated) = create(description.clone());
        let (_c2, mut reference) = create(description);

        // First executor processes each quantum three times, the reference
        // once; if processing were not idempotent the oscillator phase
        // would run ahead and the streams would diverge.
        let mut repeated_out = Vec::new();
        let mut reference_out = Vec::new();
        for quantum in 0..4u64 {
            let frame = quantum * QUANTUM as u64;

            repeated.begin_quantum(frame);
            repeated.ensure_processed();
            repeated.ensure_processed();
            repeated_out.extend_from_slice(repeated.destination_output().channel(0));

            reference.begin_quantum(frame);
            reference_out.extend_from_slice(reference.destination_output().channel(0));
        }

        assert_eq!(repeated_out, reference_out);
        assert!(repeated_out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn parameter_update_is_atomic_at_quantum_boundaries() {
        let (mut controller, mut executor) = create(chain(1.0, 1.0));

        executor.begin_quantum(0);
        assert!(executor.destination_output().channel(0).iter().all(|&s| s == 1.0));

        // Mid-quantum enqueue must not change already-rendered output.
        controller
            .enqueue_parameter_update(chain(1.0, 0.25))
            .unwrap();
        executor.ensure_processed();
        assert!(executor.destination_output().channel(0).iter().all(|&s| s == 1.0));

        // The next quantum reflects the update in full.
        executor.begin_quantum(QUANTUM as u64);
        assert!(executor.destination_output().channel(0).iter().all(|&s| s == 0.25));
    }

    #[test]
    fn flush_point_commits_without_rendering() {
        let (mut controller, mut executor) = create(chain(1.0, 1.0));
        controller
            .enqueue_parameter_update(chain(1.0, 0.5))
            .unwrap();

        executor.commit_pending_updates(0);
        executor.begin_quantum(0);
        assert!(executor.destination_output().channel(0).iter().all(|&s| s == 0.5));
    }

    #[test]
    fn topology_update_replaces_the_graph() {
        // Start without the gain stage: constant(1) → destination(3).
        let mut initial = GraphDescription {
            destination_node_id: NodeId(3),
            ..GraphDescription::default()
        };
        initial.nodes.insert(NodeId(1), constant(1.0));
        initial.nodes.insert(NodeId(3), destination(1));
        initial.connections.push(connect(1, 3));

        let registry = ResourceRegistry::new();
        let (mut controller, mut executor) =
            GraphController::create(initial, RATE, QUANTUM, &registry).unwrap();

        assert!(executor.render_quantum(0).channel(0).iter().all(|&s| s == 1.0));

        // Insert a gain stage — a structural update.
        controller
            .enqueue_topology_update(chain(1.0, 0.5), &registry)
            .unwrap();
        let out = executor.render_quantum(QUANTUM as u64);
        assert!(out.channel(0).iter().all(|&s| s == 0.5));
    }

    #[test]
    fn rejected_updates_are_noops() {
        let (mut controller, mut executor) = create(chain(1.0, 1.0));
        let registry = ResourceRegistry::new();

        // Identical description: rejected on both paths.
        assert!(matches!(
            controller.enqueue_parameter_update(chain(1.0, 1.0)),
            Err(UpdateError::NotAnUpdate)
        ));
        assert!(matches!(
            controller.enqueue_topology_update(chain(1.0, 1.0), &registry),
            Err(UpdateError::NotAnUpdate)
        ));

        // A rewire is not parameter-only.
        let mut rewired = chain(1.0, 1.0);
        rewired.connections.pop();
        rewired.connections.push(connect(1, 3));
        assert!(matches!(
            controller.enqueue_parameter_update(rewired),
            Err(UpdateError::NotParameterOnly(GraphUpdateKind::RebuildRequired))
        ));

        // A destination change is not an update at all.
        let mut moved = chain(1.0, 1.0);
        moved.destination_node_id = NodeId(2);
        assert!(matches!(
            controller.enqueue_topology_update(moved, &registry),
            Err(UpdateError::DestinationChanged)
        ));

        // Nothing was applied.
        assert!(executor.render_quantum(0).channel(0).iter().all(|&s| s == 1.0));
    }

    #[test]
    fn backpressure_delays_installs_until_retired_slots_free() {
        let (mut controller, mut executor) = create(chain(1.0, 1.0));
        let registry = ResourceRegistry::new();

        // Fill every retired slot: each committed update parks the
        // displaced topology.
        let mut frame = 0u64;
        for step in 0..crate::mailbox::RETIRED_SLOTS {
            let value = 1.0 / (step + 2) as f32;
            controller
                .enqueue_topology_update(chain(1.0, value), &registry)
                .unwrap();
            frame += QUANTUM as u64;
            let out = executor.render_quantum(frame);
            assert!(out.channel(0).iter().all(|&s| (s - value).abs() < 1e-6));
        }

        // One more update cannot install while the retired array is full;
        // the in-use topology keeps rendering untouched.
        controller
            .enqueue_topology_update(chain(1.0, 0.75), &registry)
            .unwrap();
        frame += QUANTUM as u64;
        let stuck = 1.0 / (crate::mailbox::RETIRED_SLOTS + 1) as f32;
        assert!(
            executor
                .render_quantum(frame)
                .channel(0)
                .iter()
                .all(|&s| (s - stuck).abs() < 1e-6)
        );

        // After the control thread reclaims, the queued update installs.
        controller.collect_retired_updates();
        frame += QUANTUM as u64;
        assert!(
            executor
                .render_quantum(frame)
                .channel(0)
                .iter()
                .all(|&s| (s - 0.75).abs() < 1e-6)
        );
    }

    #[test]
    fn feedback_delay_produces_decaying_impulse_train() {
        // buffer(1) → delay(2) → destination(4), with delay → gain(3) →
        // delay closing the feedback loop. One-sample unit impulse input.
        let mut registry = ResourceRegistry::new();
        let impulse = registry.insert_buffer(SampleBuffer::from_mono(vec![1.0], RATE));

        let delay_frames = 2 * QUANTUM; // two quanta
        let mut description = GraphDescription {
            destination_node_id: NodeId(4),
            ..GraphDescription::default()
        };
        description.nodes.insert(
            NodeId(1),
            NodeDescription::BufferSource(crate::description::BufferSourceDesc {
                buffer: Some(impulse),
                playback_rate: 1.0,
                detune_cents: 0.0,
                looping: false,
                loop_start_frame: 0,
                loop_end_frame: 0,
                start_frame: Some(0),
                stop_frame: None,
            }),
        );
        description.nodes.insert(
            NodeId(2),
            NodeDescription::Delay(DelayDesc {
                delay_time: delay_frames as f64 / f64::from(RATE),
                max_delay_time: 1.0,
                channels: ChannelSettings {
                    count: 1,
                    mode: ChannelCountMode::ClampedMax,
                    interpretation: ChannelInterpretation::Speakers,
                },
            }),
        );
        description.nodes.insert(NodeId(3), gain(0.5));
        description.nodes.insert(NodeId(4), destination(1));
        description.connections.push(connect(1, 2));
        description.connections.push(connect(2, 3));
        description.connections.push(connect(3, 2)); // feedback
        description.connections.push(connect(2, 4));

        let (_controller, mut executor) =
            GraphController::create(description, RATE, QUANTUM, &registry).unwrap();

        let quanta = 8 * delay_frames / QUANTUM;
        let mut rendered = Vec::new();
        for quantum in 0..quanta as u64 {
            let out = executor.render_quantum(quantum * QUANTUM as u64);
            rendered.extend_from_slice(out.channel(0));
        }

        // Exponentially decaying impulses spaced by the delay time.
        for trip in 1..=4usize {
            let frame = trip * delay_frames;
            let expected = 0.5f32.powi(trip as i32 - 1);
            assert!(
                (rendered[frame] - expected).abs() < 1e-4,
                "round trip {trip}: expected {expected} at frame {frame}, got {}",
                rendered[frame]
            );
        }
        // Between arrivals the line is silent.
        let energy_elsewhere: f32 = rendered
            .iter()
            .enumerate()
            .filter(|(frame, _)| frame % delay_frames != 0)
            .map(|(_, s)| s.abs())
            .sum();
        assert!(energy_elsewhere < 1e-3, "stray energy {energy_elsewhere}");
    }

    #[test]
    fn source_scheduling_takes_effect() {
        let mut description = chain(1.0, 1.0);
        description.nodes.insert(
            NodeId(1),
            NodeDescription::ConstantSource(ConstantSourceDesc {
                offset: 1.0,
                start_frame: None, // never started
                stop_frame: None,
            }),
        );
        let (_controller, mut executor) = create(description);

        assert!(executor.render_quantum(0).channel(0).iter().all(|&s| s == 0.0));

        executor.schedule_source_start(NodeId(1), Some(QUANTUM as u64));
        assert!(
            executor
                .render_quantum(QUANTUM as u64)
                .channel(0)
                .iter()
                .all(|&s| s == 1.0)
        );

        executor.schedule_source_stop(NodeId(1), Some(2 * QUANTUM as u64));
        assert!(
            executor
                .render_quantum(2 * QUANTUM as u64)
                .channel(0)
                .iter()
                .all(|&s| s == 0.0)
        );
    }

    #[test]
    fn compressor_reduction_readout() {
        let mut description = GraphDescription {
            destination_node_id: NodeId(3),
            ..GraphDescription::default()
        };
        description.nodes.insert(NodeId(1), constant(1.0));
        description.nodes.insert(
            NodeId(2),
            NodeDescription::Compressor(CompressorDesc {
                threshold_db: -24.0,
                knee_db: 0.0,
                ratio: 4.0,
                attack: 0.0,
                release: 0.0,
                channels: ChannelSettings::default(),
            }),
        );
        description.nodes.insert(NodeId(3), destination(1));
        description.connections.push(connect(1, 2));
        description.connections.push(connect(2, 3));

        let (_controller, mut executor) = create(description);
        executor.begin_quantum(0);
        let reduction = executor.compressor_reduction_db(NodeId(2)).unwrap();
        assert!(reduction < -1.0, "expected gain reduction, got {reduction}");

        // Non-compressor nodes have no readout.
        assert!(executor.compressor_reduction_db(NodeId(1)).is_none());
    }

    #[test]
    fn analyser_probe_reads_through_executor() {
        let mut description = GraphDescription {
            destination_node_id: NodeId(3),
            ..GraphDescription::default()
        };
        description.nodes.insert(NodeId(1), constant(0.5));
        description.nodes.insert(
            NodeId(2),
            NodeDescription::Analyser(crate::description::AnalyserDesc {
                fft_size: 32,
                smoothing: 0.0,
                channels: ChannelSettings::default(),
            }),
        );
        description.nodes.insert(NodeId(3), destination(1));
        description.connections.push(connect(1, 2));
        description.connections.push(connect(2, 3));

        let (_controller, mut executor) = create(description);
        executor.begin_quantum(0);

        assert_eq!(executor.analyser_count(), 1);
        assert_eq!(executor.analyser_node_id(0), Some(NodeId(2)));

        let mut time_domain = vec![0.0; 16];
        assert!(executor.copy_analyser_time_domain(0, &mut time_domain));
        assert!(time_domain.iter().all(|&s| s == 0.5));

        let mut spectrum = vec![0.0; 17];
        assert!(executor.copy_analyser_frequency_db(0, &mut spectrum));
        assert!(spectrum.iter().all(|s| s.is_finite()));

        assert!(!executor.copy_analyser_time_domain(5, &mut time_domain));
    }

    #[test]
    fn offline_parameter_update_applies_in_place() {
        let (_controller, mut executor) = create(chain(1.0, 1.0));
        let registry = ResourceRegistry::new();

        executor.begin_quantum(0);
        executor.ensure_processed();

        executor
            .apply_update_offline(chain(1.0, 0.25), &registry)
            .unwrap();
        executor.begin_quantum(QUANTUM as u64);
        assert!(executor.destination_output().channel(0).iter().all(|&s| s == 0.25));
    }

    #[test]
    fn offline_structural_update_rebuilds() {
        let (_controller, mut executor) = create(chain(1.0, 0.5));
        let registry = ResourceRegistry::new();

        // Remove the gain stage entirely.
        let mut rewired = GraphDescription {
            destination_node_id: NodeId(3),
            ..GraphDescription::default()
        };
        rewired.nodes.insert(NodeId(1), constant(1.0));
        rewired.nodes.insert(NodeId(3), destination(1));
        rewired.connections.push(connect(1, 3));

        executor.apply_update_offline(rewired, &registry).unwrap();
        assert!(executor.render_quantum(0).channel(0).iter().all(|&s| s == 1.0));
    }

    #[test]
    fn krate_automation_holds_within_quantum() {
        use crate::description::{AutomationRate, AutomationSegment, SegmentShape};

        let mut description = chain(1.0, 1.0);
        description.param_automations.push(ParamAutomation {
            destination: NodeId(2),
            destination_param_index: params::gain::GAIN,
            intrinsic_value: 1.0,
            default_value: 1.0,
            min_value: 0.0,
            max_value: 2.0,
            rate: AutomationRate::KRate,
            segments: vec![AutomationSegment::new(
                SegmentShape::LinearRamp,
                0.0,
                1.0,
                0.0,
                2.0,
                f64::from(RATE),
            )],
        });

        let (_controller, mut executor) = create(description);
        let out = executor.render_quantum(3 * QUANTUM as u64);
        let first = out.channel(0)[0];
        assert!(
            out.channel(0).iter().all(|&s| s.to_bits() == first.to_bits()),
            "k-rate value must hold bit-identically across the quantum"
        );
        assert!(first > 0.0 && first < 2.0);
    }

    #[test]
    fn executor_moves_to_another_thread() {
        let (_controller, mut executor) = create(chain(1.0, 0.5));
        let handle = std::thread::spawn(move || {
            let out = executor.render_quantum(0);
            out.channel(0)[0]
        });
        assert_eq!(handle.join().unwrap(), 0.5);
    }
}
