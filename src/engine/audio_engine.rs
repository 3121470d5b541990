//! Audio Engine
//!
//! [`Engine`] owns the graph on the control thread and drives an
//! [`AudioRunner`] on the device's audio thread. It moves through
//! `Idle -> Prepared -> Running -> Stopping -> Idle`:
//!
//! - `prepare` binds a device geometry, prepares every processor, moves it
//!   into a runner slot and publishes the first plan.
//! - `start` hands the runner to the device callback.
//! - Every structural edit recompiles off the audio thread and publishes the
//!   new plan through the command queue; the callback adopts it at its next
//!   block boundary.
//! - Superseded plans and removed processors come back through the retire
//!   queue and are dropped here, in [`Engine::collect_garbage`].
//! - `stop` silences the callback, waits for it to return, closes the
//!   device and gives every processor back to its node.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rtrb::Consumer;
use tracing::{debug, error, info, warn};

use crate::dsp::{MidiEvent, Processor};
use crate::graph::{EdgeHandle, Graph, GraphError, Node, NodeId, PortRef};

use super::channels::{
    ControlHandle, EngineChannels, DEFAULT_COMMAND_BUFFER_SIZE, DEFAULT_RETIRE_BUFFER_SIZE,
};
use super::commands::{Retired, RunnerCommand, SlotEntry};
use super::device::{AudioDriver, DeviceCallback, DeviceConfig};
use super::error::EngineError;
use super::runner::{AudioRunner, CallbackSlot, RunnerConfig, RunnerCounters, RunnerStatus};
use super::scheduler::{CompileOptions, Scheduler};

/// Lifecycle state of the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// No device bound, no plan installed.
    Idle,
    /// Processors prepared and a plan installed, device not running.
    Prepared,
    /// The device callback is running the installed plan.
    Running,
    /// Waiting for the last callback to finish.
    Stopping,
}

impl EngineState {
    pub fn name(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Prepared => "prepared",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine capacities and policies.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    /// Runner slot capacity.
    pub max_nodes: usize,
    /// Buffer pool ceiling for one plan.
    pub max_buffers: usize,
    pub command_queue_size: usize,
    pub retire_queue_size: usize,
    pub reuse_buffers: bool,
    pub max_events_per_block: usize,
    /// How long `stop` waits for an in-flight callback.
    pub stop_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_nodes: 256,
            max_buffers: 1024,
            command_queue_size: DEFAULT_COMMAND_BUFFER_SIZE,
            retire_queue_size: DEFAULT_RETIRE_BUFFER_SIZE,
            reuse_buffers: true,
            max_events_per_block: 512,
            stop_timeout: Duration::from_millis(500),
        }
    }
}

/// Counters readable from the control thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineMetrics {
    pub callbacks: u64,
    pub plan_swaps: u64,
    pub dropped_events: u64,
    pub missing_slots: u64,
    pub deferred_commands: u64,
    /// Generation of the last plan sent to the runner.
    pub published_generation: u64,
    /// Generation of the plan the runner last adopted.
    pub active_generation: u64,
    /// Nodes removed from the graph whose processors are still in the runner.
    pub pending_removals: usize,
    /// Superseded plans dropped so far.
    pub retired_plans: u64,
}

/// A processor detach waiting for the runner to move past `after_generation`.
#[derive(Debug)]
struct PendingRemoval {
    slot: usize,
    node: NodeId,
    after_generation: u64,
    sent: bool,
}

/// Everything that exists only while a device geometry is bound.
struct Session {
    config: DeviceConfig,
    control: ControlHandle,
    status: Arc<RunnerStatus>,
    /// The runner, while it is not inside a device callback.
    runner: Option<AudioRunner>,
    /// Where the device callback sends the runner when it is dropped.
    home: Option<Consumer<AudioRunner>>,
    slots: BTreeMap<NodeId, usize>,
    free_slots: Vec<usize>,
    removals: Vec<PendingRemoval>,
    order: Vec<NodeId>,
    seen: RunnerCounters,
}

impl Session {
    /// Applies queued commands right away when the runner is held locally.
    fn pump(&mut self) {
        if let Some(runner) = self.runner.as_mut() {
            runner.drain_commands();
        }
    }
}

/// The host engine: graph, scheduler and real-time runner.
pub struct Engine {
    graph: Graph,
    settings: EngineSettings,
    state: EngineState,
    driver: Box<dyn AudioDriver>,
    session: Option<Session>,
    midi_feed: Option<Consumer<MidiEvent>>,
    next_generation: u64,
    published_generation: u64,
    retired_plans: u64,
}

impl Engine {
    pub fn new(driver: Box<dyn AudioDriver>, settings: EngineSettings) -> Self {
        Self {
            graph: Graph::new(),
            settings,
            state: EngineState::Idle,
            driver,
            session: None,
            midi_feed: None,
            next_generation: 1,
            published_generation: 0,
            retired_plans: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    /// The bound device geometry, if prepared.
    pub fn device_config(&self) -> Option<&DeviceConfig> {
        self.session.as_ref().map(|s| &s.config)
    }

    /// Execution order of the last published plan.
    pub fn execution_order(&self) -> &[NodeId] {
        self.session.as_ref().map(|s| s.order.as_slice()).unwrap_or(&[])
    }

    /// Sets the queue the device MIDI input node reads from. Takes effect at
    /// the next `prepare`.
    pub fn set_midi_feed(&mut self, feed: Consumer<MidiEvent>) {
        self.midi_feed = Some(feed);
    }

    fn require(&self, operation: &'static str, allowed: &[EngineState]) -> Result<(), EngineError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(EngineError::InvalidState {
                operation,
                state: self.state.name(),
            })
        }
    }

    fn transition(&mut self, next: EngineState) {
        info!(from = %self.state, to = %next, "engine state changed");
        self.state = next;
    }

    fn scheduler(&self, config: &DeviceConfig) -> Scheduler {
        Scheduler::new(CompileOptions {
            max_block_size: config.block_size,
            max_buffers: self.settings.max_buffers,
            reuse_buffers: self.settings.reuse_buffers,
            event_capacity: self.settings.max_events_per_block,
        })
    }
}

impl Engine {
    /// Binds a device geometry and installs the first plan.
    ///
    /// Fails with [`EngineError::DeviceConfigUnsupported`] if the geometry
    /// is out of range or the driver cannot run it; the engine stays idle.
    pub fn prepare(&mut self, config: DeviceConfig) -> Result<(), EngineError> {
        self.require("prepare", &[EngineState::Idle])?;

        let unsupported = |reason: String| EngineError::DeviceConfigUnsupported { config, reason };
        config.validate().map_err(unsupported)?;
        self.driver.supports(&config).map_err(unsupported)?;

        let missing = self
            .graph
            .nodes()
            .find(|n| !n.has_processor())
            .and_then(Node::id);
        if let Some(id) = missing {
            return Err(EngineError::MissingProcessor(id));
        }
        if self.graph.len() > self.settings.max_nodes {
            return Err(EngineError::NodeCapacity {
                limit: self.settings.max_nodes,
            });
        }

        let (control, handle) =
            EngineChannels::new(self.settings.command_queue_size, self.settings.retire_queue_size)
                .split();
        let status = Arc::new(RunnerStatus::new());
        let runner = AudioRunner::new(
            RunnerConfig {
                sample_rate: config.sample_rate as f32,
                max_block_size: config.block_size,
                input_channels: config.input_channels,
                output_channels: config.output_channels,
                max_nodes: self.settings.max_nodes,
                event_capacity: self.settings.max_events_per_block,
            },
            Arc::clone(&status),
            handle,
        )
        .with_midi(self.midi_feed.take());

        self.session = Some(Session {
            config,
            control,
            status,
            runner: Some(runner),
            home: None,
            slots: BTreeMap::new(),
            free_slots: (0..self.settings.max_nodes).rev().collect(),
            removals: Vec::new(),
            order: Vec::new(),
            seen: RunnerCounters::default(),
        });
        self.transition(EngineState::Prepared);

        if let Err(e) = self.commit() {
            warn!(error = %e, "initial plan failed to compile");
            self.teardown();
            return Err(e);
        }
        Ok(())
    }

    /// Hands the runner to the device callback.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.require("start", &[EngineState::Prepared])?;
        let session = self.session.as_mut().ok_or(EngineError::RunnerLost)?;
        let runner = session.runner.take().ok_or(EngineError::RunnerLost)?;

        let (mut slot, mut home) = CallbackSlot::new(runner);
        let callback: DeviceCallback =
            Box::new(move |input: &[f32], output: &mut [f32], frames: usize| {
                slot.process(input, output, frames)
            });

        if let Err(e) = self.driver.open(&session.config, callback) {
            session.runner = home.pop().ok();
            if session.runner.is_none() {
                error!("device driver kept the runner after a failed open");
                return Err(EngineError::RunnerLost);
            }
            return Err(e.into());
        }

        info!(driver = self.driver.name(), config = %session.config, "audio device started");
        session.home = Some(home);
        self.transition(EngineState::Running);
        Ok(())
    }

    /// Stops the device, waits for the in-flight callback and returns every
    /// processor to its node.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.require("stop", &[EngineState::Running])?;
        self.transition(EngineState::Stopping);

        let mut closed = Ok(());
        if let Some(session) = self.session.as_mut() {
            session.status.request_stop();
            let deadline = Instant::now() + self.settings.stop_timeout;
            while session.status.in_callback() && Instant::now() < deadline {
                thread::sleep(Duration::from_micros(200));
            }
            if session.status.in_callback() {
                warn!("audio callback still running after stop timeout");
            }

            closed = self.driver.close();
            session.runner = session.home.take().and_then(|mut home| home.pop().ok());
            session.status.clear_stop();
        }

        let recovered = self
            .session
            .as_ref()
            .map(|s| s.runner.is_some())
            .unwrap_or(false);
        self.teardown();

        closed?;
        if !recovered {
            error!("device driver did not return the runner; processors are lost");
            return Err(EngineError::RunnerLost);
        }
        Ok(())
    }

    /// Leaves `Prepared` without starting, releasing every processor.
    pub fn unprepare(&mut self) -> Result<(), EngineError> {
        self.require("unprepare", &[EngineState::Prepared])?;
        self.teardown();
        Ok(())
    }

    /// Stops or unprepares as needed to get back to `Idle`.
    pub fn shutdown(&mut self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Running => self.stop(),
            EngineState::Prepared => self.unprepare(),
            EngineState::Idle | EngineState::Stopping => Ok(()),
        }
    }

    /// Dissolves the session: every processor goes back to its node and is
    /// released, plans are dropped, the engine is `Idle`.
    fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            self.transition(EngineState::Idle);
            return;
        };

        let mut entries = Vec::new();
        if let Some(runner) = session.runner.take() {
            let parts = runner.into_parts();
            entries.extend(parts.entries);
            for command in parts.pending {
                if let RunnerCommand::Install { entry, .. } = command {
                    entries.push(entry);
                }
            }
            self.midi_feed = parts.midi;
        }
        for item in session.control.drain_retired() {
            match item {
                Retired::Plan(_) => self.retired_plans += 1,
                Retired::Node { entry, .. } | Retired::Rejected(entry) => entries.push(entry),
            }
        }

        for entry in entries {
            self.restore(entry);
        }
        self.transition(EngineState::Idle);
    }

    /// Releases a processor and gives it back to its node, if the node is
    /// still in the graph.
    fn restore(&mut self, entry: SlotEntry) {
        let SlotEntry {
            node, mut processor, ..
        } = entry;
        processor.release();
        match self.graph.node_mut(node) {
            Some(target) => target.restore_processor(processor),
            None => debug!(node = %node, "released processor of removed node"),
        }
    }
}

impl Engine {
    /// Adds a node. While prepared or running, its processor is prepared and
    /// installed and a new plan is published.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, EngineError> {
        self.require_editable("add node")?;
        if let Some(session) = &self.session {
            if session.free_slots.is_empty() {
                return Err(EngineError::NodeCapacity {
                    limit: self.settings.max_nodes,
                });
            }
        }
        let has_processor = node.has_processor();
        let id = self.graph.add_node(node)?;
        if !has_processor {
            let _ = self.graph.remove_node(id);
            return Err(EngineError::MissingProcessor(id));
        }
        debug!(node = %id, "node added");
        if let Err(e) = self.commit() {
            let _ = self.graph.remove_node(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Removes a node and its edges. A running processor is detached only
    /// after the audio thread has adopted a plan without it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, EngineError> {
        self.require_editable("remove node")?;
        let node = self.graph.remove_node(id)?;
        debug!(node = %id, "node removed");
        self.commit()?;
        Ok(node)
    }

    /// Connects an output to an input and publishes a new plan. If the new
    /// plan does not compile, the edge is removed again.
    pub fn connect(&mut self, source: PortRef, dest: PortRef) -> Result<EdgeHandle, EngineError> {
        self.require_editable("connect")?;
        let edge = self.graph.connect(source, dest)?;
        if let Err(e) = self.commit() {
            let _ = self.graph.disconnect(source, dest);
            return Err(e);
        }
        debug!(edge = %edge, "connected");
        Ok(edge)
    }

    pub fn disconnect(&mut self, source: PortRef, dest: PortRef) -> Result<(), EngineError> {
        self.require_editable("disconnect")?;
        self.graph.disconnect(source, dest)?;
        debug!(source = %source, dest = %dest, "disconnected");
        self.commit()
    }

    /// Removes every node.
    pub fn clear(&mut self) -> Result<(), EngineError> {
        self.require_editable("clear")?;
        let ids: Vec<NodeId> = self.graph.node_ids().collect();
        for id in ids {
            self.graph.remove_node(id)?;
        }
        self.commit()
    }

    /// Sets a parameter by name. Observed by the audio thread at its next
    /// block; no plan is published.
    pub fn set_parameter(&self, id: NodeId, name: &str, value: f32) -> Result<f32, EngineError> {
        Ok(self.graph.set_parameter(id, name, value)?)
    }

    pub fn parameter(&self, id: NodeId, name: &str) -> Option<f32> {
        self.graph.parameter(id, name)
    }

    pub fn rename_node(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), EngineError> {
        let node = self
            .graph
            .node_mut(id)
            .ok_or(GraphError::UnknownNode(id))?;
        node.set_name(name);
        Ok(())
    }

    fn require_editable(&self, operation: &'static str) -> Result<(), EngineError> {
        self.require(
            operation,
            &[EngineState::Idle, EngineState::Prepared, EngineState::Running],
        )
    }

    /// Recompiles the graph and publishes the result.
    ///
    /// On a compile error nothing is sent and the running plan stays.
    fn commit(&mut self) -> Result<(), EngineError> {
        let Some(config) = self.session.as_ref().map(|s| s.config) else {
            return Ok(());
        };
        let mut plan = self.scheduler(&config).compile(&self.graph)?;

        self.collect_garbage();
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        let added: Vec<NodeId> = self
            .graph
            .node_ids()
            .filter(|id| !session.slots.contains_key(id))
            .collect();
        if added.len() > session.free_slots.len() {
            return Err(EngineError::NodeCapacity {
                limit: self.settings.max_nodes,
            });
        }
        if session.control.command_slots_available() < added.len() + 1 {
            return Err(EngineError::QueueFull);
        }

        let generation = self.next_generation;

        // Nodes that left the graph keep their slot until the runner has
        // adopted this plan.
        let removed: Vec<(NodeId, usize)> = session
            .slots
            .iter()
            .filter(|(id, _)| !self.graph.contains_node(**id))
            .map(|(&id, &slot)| (id, slot))
            .collect();
        for (node, slot) in removed {
            session.slots.remove(&node);
            session.removals.push(PendingRemoval {
                slot,
                node,
                after_generation: generation,
                sent: false,
            });
        }

        for id in added {
            let Some(node) = self.graph.node_mut(id) else {
                continue;
            };
            let Some(mut processor) = node.take_processor() else {
                return Err(EngineError::MissingProcessor(id));
            };
            let Some(slot) = session.free_slots.pop() else {
                node.restore_processor(processor);
                return Err(EngineError::NodeCapacity {
                    limit: self.settings.max_nodes,
                });
            };
            prepare_processor(processor.as_mut(), &config);
            let entry = SlotEntry::new(id, processor, Arc::clone(node.parameters()));
            if let Err(command) = session.control.send_command(RunnerCommand::Install { slot, entry }) {
                session.free_slots.push(slot);
                if let RunnerCommand::Install { entry, .. } = command {
                    node.restore_processor(entry.processor);
                }
                return Err(EngineError::QueueFull);
            }
            session.slots.insert(id, slot);
            debug!(node = %id, slot, "processor installed");
        }

        plan.bind_slots(&session.slots);
        plan.set_generation(generation);
        let order = plan.order();
        let buffers = plan.buffer_count();
        if session
            .control
            .send_command(RunnerCommand::Publish(Box::new(plan)))
            .is_err()
        {
            return Err(EngineError::QueueFull);
        }

        self.next_generation += 1;
        self.published_generation = generation;
        debug!(
            generation,
            graph_generation = self.graph.generation(),
            nodes = order.len(),
            buffers,
            "plan published"
        );
        session.order = order;
        session.pump();
        self.collect_garbage();
        Ok(())
    }
}

impl Engine {
    /// Detaches processors whose removal the audio thread has caught up
    /// with, drops retired plans and releases retired processors.
    ///
    /// Call periodically from the control thread while running.
    pub fn collect_garbage(&mut self) -> EngineMetrics {
        if let Some(session) = self.session.as_mut() {
            session.pump();

            let active = session.status.active_generation();
            for removal in session.removals.iter_mut().filter(|r| !r.sent) {
                if active < removal.after_generation {
                    continue;
                }
                let command = RunnerCommand::Remove { slot: removal.slot };
                if session.control.send_command(command).is_err() {
                    break;
                }
                removal.sent = true;
                debug!(node = %removal.node, slot = removal.slot, "processor detach requested");
            }
            session.pump();

            let mut retired = Vec::new();
            retired.extend(session.control.drain_retired());
            for item in retired {
                match item {
                    Retired::Plan(plan) => {
                        debug!(generation = plan.generation(), "plan retired");
                        self.retired_plans += 1;
                    }
                    Retired::Node { slot, entry } => {
                        session.removals.retain(|r| r.slot != slot);
                        session.free_slots.push(slot);
                        let SlotEntry {
                            node, mut processor, ..
                        } = entry;
                        processor.release();
                        debug!(node = %node, slot, "processor released");
                    }
                    Retired::Rejected(entry) => {
                        error!(node = %entry.node, "runner rejected a processor install");
                        let SlotEntry { mut processor, .. } = entry;
                        processor.release();
                    }
                }
            }

            let counters = session.status.counters();
            let seen = session.seen;
            if counters.dropped_events > seen.dropped_events {
                warn!(
                    dropped = counters.dropped_events - seen.dropped_events,
                    "events dropped on the audio thread"
                );
            }
            if counters.missing_slots > seen.missing_slots {
                warn!(
                    skipped = counters.missing_slots - seen.missing_slots,
                    "plan steps skipped for empty processor slots"
                );
            }
            if counters.deferred_commands > seen.deferred_commands {
                debug!(
                    deferred = counters.deferred_commands - seen.deferred_commands,
                    "runner deferred commands for lack of retire space"
                );
            }
            session.seen = counters;
        }
        self.metrics()
    }

    pub fn metrics(&self) -> EngineMetrics {
        let Some(session) = self.session.as_ref() else {
            return EngineMetrics {
                published_generation: self.published_generation,
                retired_plans: self.retired_plans,
                ..EngineMetrics::default()
            };
        };
        let counters = session.status.counters();
        EngineMetrics {
            callbacks: counters.callbacks,
            plan_swaps: counters.plan_swaps,
            dropped_events: counters.dropped_events,
            missing_slots: counters.missing_slots,
            deferred_commands: counters.deferred_commands,
            published_generation: self.published_generation,
            active_generation: counters.active_generation,
            pending_removals: session.removals.len(),
            retired_plans: self.retired_plans,
        }
    }
}

fn prepare_processor(processor: &mut dyn Processor, config: &DeviceConfig) {
    processor.prepare(config.sample_rate as f32, config.block_size);
    processor.reset();
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "engine shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::test_support::{device_output, ConstantSource, Level, Recorder};
    use crate::engine::device::OfflineDriver;
    use crate::engine::error::CompileError;
    use crate::graph::NodeKind;

    fn node(processor: impl Processor) -> Node {
        Node::new(NodeKind::builtin("test.node"), Box::new(processor))
    }

    fn engine_with(settings: EngineSettings) -> (Engine, OfflineDriver) {
        let driver = OfflineDriver::new();
        (Engine::new(Box::new(driver.clone()), settings), driver)
    }

    fn engine() -> (Engine, OfflineDriver) {
        engine_with(EngineSettings::default())
    }

    fn mono(block: usize) -> DeviceConfig {
        DeviceConfig::new(48_000, block).with_channels(0, 1)
    }

    #[test]
    fn test_prepare_rejects_zero_sample_rate() {
        let (mut engine, _) = engine();
        let err = engine.prepare(DeviceConfig::new(0, 256)).unwrap_err();
        assert!(matches!(err, EngineError::DeviceConfigUnsupported { .. }));
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.device_config().is_none());
    }

    #[test]
    fn test_prepare_rejects_rate_the_device_lacks() {
        let driver = OfflineDriver::new().with_sample_rates(vec![44_100]);
        let mut engine = Engine::new(Box::new(driver), EngineSettings::default());
        let err = engine.prepare(DeviceConfig::new(48_000, 64)).unwrap_err();
        assert!(err.to_string().contains("does not run at 48000 Hz"));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_lifecycle_guards() {
        let (mut engine, _) = engine();
        assert!(matches!(
            engine.start(),
            Err(EngineError::InvalidState { operation: "start", state: "idle" })
        ));
        assert!(engine.stop().is_err());
        engine.prepare(mono(16)).unwrap();
        assert!(matches!(engine.prepare(mono(16)), Err(EngineError::InvalidState { .. })));
    }

    #[test]
    fn test_running_engine_renders_graph() {
        let (mut engine, driver) = engine();
        let source = engine.add_node(node(ConstantSource::new(0.25))).unwrap();
        let out = engine.add_node(node(device_output())).unwrap();
        engine.connect(PortRef::new(source, 0), PortRef::new(out, 0)).unwrap();

        engine.prepare(mono(4)).unwrap();
        assert_eq!(engine.state(), EngineState::Prepared);
        engine.start().unwrap();
        assert_eq!(engine.state(), EngineState::Running);

        assert_eq!(driver.render(2).unwrap(), vec![0.25; 8]);
        let metrics = engine.collect_garbage();
        assert_eq!(metrics.callbacks, 2);
        assert_eq!(metrics.active_generation, metrics.published_generation);
    }

    #[test]
    fn test_edits_while_running_take_effect_next_block() {
        let (mut engine, driver) = engine();
        let a = engine.add_node(node(ConstantSource::new(0.25))).unwrap();
        let out = engine.add_node(node(device_output())).unwrap();
        engine.connect(PortRef::new(a, 0), PortRef::new(out, 0)).unwrap();
        engine.prepare(mono(4)).unwrap();
        engine.start().unwrap();
        assert_eq!(driver.render(1).unwrap(), vec![0.25; 4]);

        let b = engine.add_node(node(ConstantSource::new(0.5))).unwrap();
        engine.connect(PortRef::new(b, 0), PortRef::new(out, 0)).unwrap();
        let published = engine.metrics().published_generation;

        assert_eq!(driver.render(1).unwrap(), vec![0.75; 4]);
        assert_eq!(engine.metrics().active_generation, published);
        assert!(engine.collect_garbage().retired_plans >= 1);
    }

    #[test]
    fn test_parameter_changes_reach_audio_thread() {
        let (mut engine, driver) = engine();
        let level = engine.add_node(node(Level::new())).unwrap();
        let out = engine.add_node(node(device_output())).unwrap();
        engine.connect(PortRef::new(level, 0), PortRef::new(out, 0)).unwrap();
        engine.prepare(mono(2)).unwrap();
        engine.start().unwrap();

        assert_eq!(driver.render(1).unwrap(), vec![0.5; 2]);
        assert_eq!(engine.set_parameter(level, "level", 2.0).unwrap(), 1.0);
        assert_eq!(driver.render(1).unwrap(), vec![1.0; 2]);
        assert!(engine.set_parameter(level, "nope", 0.0).is_err());
    }

    #[test]
    fn test_removal_is_deferred_until_plan_adopted() {
        let (mut engine, driver) = engine();
        let a = engine.add_node(node(ConstantSource::new(0.25))).unwrap();
        let recorder = Recorder::new();
        let released = Arc::clone(&recorder.released);
        let sink = engine.add_node(node(recorder)).unwrap();
        engine.connect(PortRef::new(a, 0), PortRef::new(sink, 0)).unwrap();
        engine.prepare(mono(4)).unwrap();
        engine.start().unwrap();
        driver.render(1).unwrap();

        let removed = engine.remove_node(sink).unwrap();
        assert!(!removed.has_processor());
        assert!(!engine.graph().contains_node(sink));

        // The runner has not seen the new plan, so the processor stays.
        let metrics = engine.collect_garbage();
        assert_eq!(metrics.pending_removals, 1);
        assert!(metrics.active_generation < metrics.published_generation);

        // Adopt the plan, then detach and release.
        driver.render(1).unwrap();
        engine.collect_garbage();
        driver.render(1).unwrap();
        let metrics = engine.collect_garbage();
        assert_eq!(metrics.pending_removals, 0);
        assert!(*released.lock().unwrap());
        assert_eq!(metrics.missing_slots, 0);
    }

    #[test]
    fn test_failed_compile_keeps_running_plan() {
        let (mut engine, driver) = engine_with(EngineSettings {
            max_buffers: 2,
            ..EngineSettings::default()
        });
        let a = engine.add_node(node(ConstantSource::new(0.25))).unwrap();
        let out = engine.add_node(node(device_output())).unwrap();
        engine.connect(PortRef::new(a, 0), PortRef::new(out, 0)).unwrap();
        engine.prepare(mono(4)).unwrap();
        engine.start().unwrap();
        let before = engine.metrics().published_generation;

        let b = engine.add_node(node(ConstantSource::new(0.5))).unwrap();
        let err = engine
            .connect(PortRef::new(b, 0), PortRef::new(out, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Compile(CompileError::OutOfBuffers { limit: 2, .. })
        ));
        // The edge is rolled back and audio is unaffected.
        assert!(!engine
            .graph()
            .contains_edge(PortRef::new(b, 0), PortRef::new(out, 0)));
        assert_eq!(driver.render(1).unwrap(), vec![0.25; 4]);
        assert_eq!(engine.metrics().published_generation, before + 1);
    }

    #[test]
    fn test_stop_returns_processors_and_restarts() {
        let (mut engine, driver) = engine();
        let a = engine.add_node(node(ConstantSource::new(0.25))).unwrap();
        let recorder = Recorder::new();
        let released = Arc::clone(&recorder.released);
        let prepared = Arc::clone(&recorder.prepared);
        let sink = engine.add_node(node(recorder)).unwrap();
        engine.connect(PortRef::new(a, 0), PortRef::new(sink, 0)).unwrap();

        engine.prepare(mono(32)).unwrap();
        assert_eq!(*prepared.lock().unwrap(), Some((48_000.0, 32)));
        engine.start().unwrap();
        driver.render(1).unwrap();
        engine.stop().unwrap();

        assert_eq!(engine.state(), EngineState::Idle);
        assert!(!driver.is_open());
        assert!(*released.lock().unwrap());
        assert!(engine.graph().nodes().all(Node::has_processor));

        engine.prepare(mono(64)).unwrap();
        engine.start().unwrap();
        assert_eq!(driver.render(1).unwrap().len(), 64);
        assert_eq!(*prepared.lock().unwrap(), Some((48_000.0, 64)));
    }

    #[test]
    fn test_unprepare_releases_without_device() {
        let (mut engine, driver) = engine();
        engine.add_node(node(ConstantSource::new(0.1))).unwrap();
        engine.prepare(mono(8)).unwrap();
        engine.unprepare().unwrap();
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(!driver.is_open());
        assert!(engine.graph().nodes().all(Node::has_processor));
    }

    #[test]
    fn test_node_capacity() {
        let (mut engine, _) = engine_with(EngineSettings {
            max_nodes: 1,
            ..EngineSettings::default()
        });
        engine.add_node(node(ConstantSource::new(0.1))).unwrap();
        engine.prepare(mono(8)).unwrap();
        let err = engine.add_node(node(ConstantSource::new(0.2))).unwrap_err();
        assert!(matches!(err, EngineError::NodeCapacity { limit: 1 }));
        assert_eq!(engine.graph().len(), 1);
    }

    #[test]
    fn test_prepare_requires_every_processor() {
        let (mut engine, _) = engine();
        let mut orphan = node(ConstantSource::new(0.1));
        let _ = orphan.take_processor();
        assert!(matches!(
            engine.add_node(orphan),
            Err(EngineError::MissingProcessor(_))
        ));
    }

    #[test]
    fn test_edits_are_plain_graph_edits_while_idle() {
        let (mut engine, _) = engine();
        let a = engine.add_node(node(ConstantSource::new(0.1))).unwrap();
        let b = engine.add_node(node(Recorder::new())).unwrap();
        engine.connect(PortRef::new(a, 0), PortRef::new(b, 0)).unwrap();
        assert!(engine.execution_order().is_empty());
        assert_eq!(engine.metrics().published_generation, 0);

        engine.prepare(mono(8)).unwrap();
        assert_eq!(engine.execution_order(), &[a, b]);
        engine.clear().unwrap();
        assert!(engine.graph().is_empty());
        assert!(engine.execution_order().is_empty());
    }

    #[test]
    fn test_concurrent_rendering_during_edits() {
        let (mut engine, driver) = engine();
        let a = engine.add_node(node(ConstantSource::new(0.25))).unwrap();
        let out = engine.add_node(node(device_output())).unwrap();
        engine.connect(PortRef::new(a, 0), PortRef::new(out, 0)).unwrap();
        engine.prepare(mono(16)).unwrap();
        engine.start().unwrap();

        let render = driver.clone();
        let audio = thread::spawn(move || {
            for _ in 0..200 {
                let block = render.render(1).unwrap();
                // Either the base source alone or with the extra one summed in.
                assert!(block.iter().all(|&s| s == 0.25 || s == 0.75));
            }
        });

        for _ in 0..20 {
            let b = engine.add_node(node(ConstantSource::new(0.5))).unwrap();
            engine.connect(PortRef::new(b, 0), PortRef::new(out, 0)).unwrap();
            engine.collect_garbage();
            engine.remove_node(b).unwrap();
            engine.collect_garbage();
        }
        audio.join().unwrap();

        engine.stop().unwrap();
        let metrics = engine.collect_garbage();
        assert_eq!(metrics.pending_removals, 0);
        assert_eq!(engine.graph().len(), 2);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(EngineState::Stopping.to_string(), "stopping");
        assert_eq!(EngineState::Prepared.name(), "prepared");
    }
}
