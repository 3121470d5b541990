//! Small processors shared by unit tests across the crate.

use std::sync::{Arc, Mutex};

use super::{
    Inputs, IoRole, ModuleCategory, ModuleInfo, ParameterDefinition, PortBuffer, PortDefinition,
    ProcessContext, Processor, SignalType,
};

static TEST_INFO: ModuleInfo = ModuleInfo {
    id: "test.node",
    name: "Test Node",
    category: ModuleCategory::Utility,
    description: "Test processor",
};

/// Writes a constant into its single audio output.
pub struct ConstantSource {
    value: f32,
    ports: Vec<PortDefinition>,
}

impl ConstantSource {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            ports: vec![PortDefinition::output("out", "Out", SignalType::Audio)],
        }
    }
}

impl Default for ConstantSource {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl Processor for ConstantSource {
    fn info(&self) -> &ModuleInfo {
        &TEST_INFO
    }
    fn ports(&self) -> &[PortDefinition] {
        &self.ports
    }
    fn parameters(&self) -> &[ParameterDefinition] {
        &[]
    }
    fn prepare(&mut self, _: f32, _: usize) {}
    fn process(&mut self, _: &Inputs<'_>, outputs: &mut [PortBuffer], _: &[f32], ctx: &ProcessContext) {
        if let Some(out) = outputs[0].signal_mut() {
            out.channel_mut(0)[..ctx.block_size].fill(self.value);
        }
    }
}

/// Copies its audio input to its audio output, optionally as a feedback node.
pub struct Passthrough {
    feedback: bool,
    ports: Vec<PortDefinition>,
}

impl Passthrough {
    pub fn new() -> Self {
        Self {
            feedback: false,
            ports: vec![
                PortDefinition::input("in", "In", SignalType::Audio),
                PortDefinition::output("out", "Out", SignalType::Audio),
            ],
        }
    }

    pub fn feedback() -> Self {
        Self {
            feedback: true,
            ..Self::new()
        }
    }
}

impl Default for Passthrough {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Passthrough {
    fn info(&self) -> &ModuleInfo {
        &TEST_INFO
    }
    fn ports(&self) -> &[PortDefinition] {
        &self.ports
    }
    fn parameters(&self) -> &[ParameterDefinition] {
        &[]
    }
    fn prepare(&mut self, _: f32, _: usize) {}
    fn process(&mut self, inputs: &Inputs<'_>, outputs: &mut [PortBuffer], _: &[f32], ctx: &ProcessContext) {
        let n = ctx.block_size;
        if let (Some(input), Some(out)) = (inputs.signal(0), outputs[0].signal_mut()) {
            out.channel_mut(0)[..n].copy_from_slice(&input.channel(0)[..n]);
        }
    }
    fn is_feedback(&self) -> bool {
        self.feedback
    }
}

/// A node with an arbitrary port list that writes nothing.
pub struct PortsOnly {
    ports: Vec<PortDefinition>,
    parameters: Vec<ParameterDefinition>,
    role: IoRole,
}

impl PortsOnly {
    pub fn new(ports: Vec<PortDefinition>) -> Self {
        Self {
            ports,
            parameters: Vec::new(),
            role: IoRole::None,
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<ParameterDefinition>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_role(mut self, role: IoRole) -> Self {
        self.role = role;
        self
    }
}

impl Processor for PortsOnly {
    fn info(&self) -> &ModuleInfo {
        &TEST_INFO
    }
    fn ports(&self) -> &[PortDefinition] {
        &self.ports
    }
    fn parameters(&self) -> &[ParameterDefinition] {
        &self.parameters
    }
    fn prepare(&mut self, _: f32, _: usize) {}
    fn process(&mut self, _: &Inputs<'_>, _: &mut [PortBuffer], _: &[f32], _: &ProcessContext) {}
    fn io_role(&self) -> IoRole {
        self.role
    }
}

/// Records the first channel of its (summing) audio input and counts calls.
pub struct Recorder {
    ports: Vec<PortDefinition>,
    pub received: Arc<Mutex<Vec<f32>>>,
    pub prepared: Arc<Mutex<Option<(f32, usize)>>>,
    pub released: Arc<Mutex<bool>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            ports: vec![PortDefinition::input("in", "In", SignalType::Audio).summing()],
            received: Arc::new(Mutex::new(Vec::new())),
            prepared: Arc::new(Mutex::new(None)),
            released: Arc::new(Mutex::new(false)),
        }
    }
}

impl Processor for Recorder {
    fn info(&self) -> &ModuleInfo {
        &TEST_INFO
    }
    fn ports(&self) -> &[PortDefinition] {
        &self.ports
    }
    fn parameters(&self) -> &[ParameterDefinition] {
        &[]
    }
    fn prepare(&mut self, sample_rate: f32, max_block_size: usize) {
        *self.prepared.lock().unwrap() = Some((sample_rate, max_block_size));
    }
    fn process(&mut self, inputs: &Inputs<'_>, _: &mut [PortBuffer], _: &[f32], ctx: &ProcessContext) {
        if let Some(input) = inputs.signal(0) {
            let mut received = self.received.lock().unwrap();
            received.clear();
            received.extend_from_slice(&input.channel(0)[..ctx.block_size]);
        }
    }
    fn release(&mut self) {
        *self.released.lock().unwrap() = true;
    }
}

/// Writes its `level` parameter into its audio output.
pub struct Level {
    ports: Vec<PortDefinition>,
    parameters: Vec<ParameterDefinition>,
}

impl Level {
    pub fn new() -> Self {
        Self {
            ports: vec![PortDefinition::output("out", "Out", SignalType::Audio)],
            parameters: vec![ParameterDefinition::normalized("level", "Level", 0.5)],
        }
    }
}

impl Default for Level {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Level {
    fn info(&self) -> &ModuleInfo {
        &TEST_INFO
    }
    fn ports(&self) -> &[PortDefinition] {
        &self.ports
    }
    fn parameters(&self) -> &[ParameterDefinition] {
        &self.parameters
    }
    fn prepare(&mut self, _: f32, _: usize) {}
    fn process(&mut self, _: &Inputs<'_>, outputs: &mut [PortBuffer], params: &[f32], ctx: &ProcessContext) {
        if let Some(out) = outputs[0].signal_mut() {
            out.channel_mut(0)[..ctx.block_size].fill(params[0]);
        }
    }
}

/// A device output endpoint with a stereo summing input.
pub fn device_output() -> PortsOnly {
    PortsOnly::new(vec![PortDefinition::input("in", "In", SignalType::Audio)
        .with_channels(2)
        .summing()])
    .with_role(IoRole::AudioOutput)
}
