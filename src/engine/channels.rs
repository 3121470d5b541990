//! Engine Channels
//!
//! Lock-free communication between the control thread and the audio runner.
//! Uses rtrb ring buffers for SPSC (single-producer, single-consumer) queues:
//! commands flow to the runner and retired objects flow back.

use rtrb::{Consumer, Producer, RingBuffer};

use super::commands::{Retired, RunnerCommand};

/// Default buffer size for the command queue (control -> runner).
pub const DEFAULT_COMMAND_BUFFER_SIZE: usize = 1024;

/// Default buffer size for the retire queue (runner -> control).
pub const DEFAULT_RETIRE_BUFFER_SIZE: usize = 2048;

/// Holds both directions of communication channels.
/// Split into handles for the two threads.
pub struct EngineChannels {
    command_tx: Producer<RunnerCommand>,
    command_rx: Consumer<RunnerCommand>,
    retire_tx: Producer<Retired>,
    retire_rx: Consumer<Retired>,
}

impl EngineChannels {
    /// Create new engine channels with the specified buffer sizes.
    ///
    /// # Arguments
    /// * `command_capacity` - Number of commands the buffer can hold
    /// * `retire_capacity` - Number of retired objects the buffer can hold
    pub fn new(command_capacity: usize, retire_capacity: usize) -> Self {
        let (command_tx, command_rx) = RingBuffer::new(command_capacity.max(1));
        let (retire_tx, retire_rx) = RingBuffer::new(retire_capacity.max(1));

        Self {
            command_tx,
            command_rx,
            retire_tx,
            retire_rx,
        }
    }

    /// Split the channels into control-side and runner-side handles.
    pub fn split(self) -> (ControlHandle, RunnerHandle) {
        let control = ControlHandle {
            command_tx: self.command_tx,
            retire_rx: self.retire_rx,
        };
        let runner = RunnerHandle {
            command_rx: self.command_rx,
            retire_tx: self.retire_tx,
        };
        (control, runner)
    }
}

/// Control-side handle: sends commands, receives retired objects.
pub struct ControlHandle {
    command_tx: Producer<RunnerCommand>,
    retire_rx: Consumer<Retired>,
}

impl ControlHandle {
    /// Send a command to the runner.
    /// Returns Ok(()) if the command was queued, or Err(cmd) if the buffer is full.
    ///
    /// This is a non-blocking operation - it never waits for space.
    pub fn send_command(&mut self, cmd: RunnerCommand) -> Result<(), RunnerCommand> {
        self.command_tx
            .push(cmd)
            .map_err(|rtrb::PushError::Full(cmd)| cmd)
    }

    /// Receive one retired object.
    pub fn recv_retired(&mut self) -> Option<Retired> {
        self.retire_rx.pop().ok()
    }

    /// Drain everything the runner has retired so far.
    pub fn drain_retired(&mut self) -> impl Iterator<Item = Retired> + '_ {
        std::iter::from_fn(|| self.recv_retired())
    }

    /// Check how many commands can still be queued.
    pub fn command_slots_available(&self) -> usize {
        self.command_tx.slots()
    }
}

/// Runner-side handle: receives commands, sends retired objects back.
///
/// IMPORTANT: All methods are real-time safe (non-blocking, no allocations).
pub struct RunnerHandle {
    command_rx: Consumer<RunnerCommand>,
    retire_tx: Producer<Retired>,
}

impl RunnerHandle {
    /// Receive a command, but only while the retire queue has room for
    /// whatever applying it might hand back.
    ///
    /// REAL-TIME SAFE: Non-blocking operation.
    pub fn recv_command(&mut self) -> Option<RunnerCommand> {
        if self.retire_tx.is_full() {
            return None;
        }
        self.command_rx.pop().ok()
    }

    /// Hand an object back to the control thread.
    ///
    /// Returns Err(item) if the retire buffer is full; `recv_command` makes
    /// sure that cannot happen for objects released by a command.
    pub fn retire(&mut self, item: Retired) -> Result<(), Retired> {
        self.retire_tx
            .push(item)
            .map_err(|rtrb::PushError::Full(item)| item)
    }

    /// Check how many commands are waiting.
    pub fn commands_pending(&self) -> usize {
        self.command_rx.slots()
    }

    /// Check how many retired objects can still be queued.
    pub fn retire_slots_available(&self) -> usize {
        self.retire_tx.slots()
    }

    /// Take every remaining command, ignoring retire capacity. Control
    /// thread only, after the runner has stopped.
    pub(crate) fn take_pending(&mut self) -> Vec<RunnerCommand> {
        std::iter::from_fn(|| self.command_rx.pop().ok()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::test_support::ConstantSource;
    use crate::dsp::ParameterBank;
    use crate::engine::commands::SlotEntry;
    use crate::graph::NodeId;
    use std::sync::Arc;

    fn entry(id: u64) -> SlotEntry {
        SlotEntry::new(
            NodeId(id),
            Box::new(ConstantSource::default()),
            Arc::new(ParameterBank::new(&[])),
        )
    }

    #[test]
    fn test_channel_creation() {
        let (control, runner) = EngineChannels::new(64, 32).split();
        assert_eq!(control.command_slots_available(), 64);
        assert_eq!(runner.retire_slots_available(), 32);
    }

    #[test]
    fn test_command_send_receive() {
        let (mut control, mut runner) = EngineChannels::new(64, 64).split();

        assert!(control.send_command(RunnerCommand::Remove { slot: 2 }).is_ok());
        assert_eq!(runner.commands_pending(), 1);
        assert!(matches!(
            runner.recv_command(),
            Some(RunnerCommand::Remove { slot: 2 })
        ));
        assert!(runner.recv_command().is_none());
    }

    #[test]
    fn test_retire_round_trip() {
        let (mut control, mut runner) = EngineChannels::new(4, 4).split();
        runner.retire(Retired::Rejected(entry(1))).unwrap();
        runner
            .retire(Retired::Node {
                slot: 0,
                entry: entry(2),
            })
            .unwrap();

        let retired: Vec<_> = control.drain_retired().collect();
        assert_eq!(retired.len(), 2);
        assert!(matches!(retired[0], Retired::Rejected(ref e) if e.node == NodeId(1)));
        assert!(control.recv_retired().is_none());
    }

    #[test]
    fn test_buffer_full_handling() {
        let (mut control, _runner) = EngineChannels::new(2, 2).split();

        assert!(control.send_command(RunnerCommand::Remove { slot: 0 }).is_ok());
        assert!(control.send_command(RunnerCommand::Remove { slot: 1 }).is_ok());
        assert_eq!(control.command_slots_available(), 0);

        let result = control.send_command(RunnerCommand::Remove { slot: 7 });
        assert!(matches!(result, Err(RunnerCommand::Remove { slot: 7 })));
    }

    #[test]
    fn test_commands_wait_while_retire_queue_is_full() {
        let (mut control, mut runner) = EngineChannels::new(4, 1).split();
        control.send_command(RunnerCommand::Remove { slot: 0 }).unwrap();
        runner.retire(Retired::Rejected(entry(0))).unwrap();

        assert!(runner.recv_command().is_none());
        assert_eq!(runner.commands_pending(), 1);

        control.recv_retired().unwrap();
        assert!(runner.recv_command().is_some());
    }

    #[test]
    fn test_take_pending_ignores_retire_capacity() {
        let (mut control, mut runner) = EngineChannels::new(4, 1).split();
        control.send_command(RunnerCommand::Remove { slot: 0 }).unwrap();
        control.send_command(RunnerCommand::Remove { slot: 1 }).unwrap();
        runner.retire(Retired::Rejected(entry(0))).unwrap();

        assert_eq!(runner.take_pending().len(), 2);
    }

    #[test]
    fn test_handles_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ControlHandle>();
        assert_send::<RunnerHandle>();
    }
}
