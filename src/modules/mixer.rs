//! 2-Channel Summing Mixer module.
//!
//! Combines audio signals with independent level controls per channel.
//! Both channel inputs accept any number of sources; the engine sums them
//! into a mix buffer before the mixer runs.

use crate::dsp::{
    Inputs, ModuleCategory, ModuleInfo, ParameterDefinition, PortBuffer, PortDefinition,
    ProcessContext, Processor, Ramp, SignalType,
};

/// A 2-channel summing mixer.
///
/// # Ports
///
/// **Inputs:**
/// - **Ch 1** (Audio, summing): First channel.
/// - **Ch 2** (Audio, summing): Second channel.
///
/// **Outputs:**
/// - **Out** (Audio): The soft-clipped sum.
///
/// # Parameters
///
/// - **Level 1** (0 to 1): Level for channel 1. Default: 1.0 (unity gain).
/// - **Level 2** (0 to 1): Level for channel 2. Default: 1.0 (unity gain).
pub struct Mixer {
    ports: Vec<PortDefinition>,
    parameters: Vec<ParameterDefinition>,
    level1: Ramp,
    level2: Ramp,
}

impl Mixer {
    /// Creates a new Mixer.
    pub fn new() -> Self {
        Self {
            ports: vec![
                PortDefinition::input("ch1", "Ch 1", SignalType::Audio).summing(),
                PortDefinition::input("ch2", "Ch 2", SignalType::Audio).summing(),
                PortDefinition::output("out", "Out", SignalType::Audio),
            ],
            parameters: vec![
                ParameterDefinition::normalized("level1", "Level 1", 1.0),
                ParameterDefinition::normalized("level2", "Level 2", 1.0),
            ],
            level1: Ramp::new(1.0),
            level2: Ramp::new(1.0),
        }
    }

    const PORT_CH1: usize = 0;
    const PORT_CH2: usize = 1;
    const PORT_OUT: usize = 0;

    const PARAM_LEVEL1: usize = 0;
    const PARAM_LEVEL2: usize = 1;
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Mixer {
    fn info(&self) -> &ModuleInfo {
        static INFO: ModuleInfo = ModuleInfo {
            id: "util.mixer",
            name: "Mixer",
            category: ModuleCategory::Utility,
            description: "2-channel summing mixer",
        };
        &INFO
    }

    fn ports(&self) -> &[PortDefinition] {
        &self.ports
    }

    fn parameters(&self) -> &[ParameterDefinition] {
        &self.parameters
    }

    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.level1.prepare(Ramp::DEFAULT_TIME_MS, sample_rate);
        self.level2.prepare(Ramp::DEFAULT_TIME_MS, sample_rate);
    }

    fn process(
        &mut self,
        inputs: &Inputs<'_>,
        outputs: &mut [PortBuffer],
        params: &[f32],
        context: &ProcessContext,
    ) {
        self.level1.set_target(params[Self::PARAM_LEVEL1]);
        self.level2.set_target(params[Self::PARAM_LEVEL2]);

        let ch1 = inputs.signal(Self::PORT_CH1).map(|buf| buf.channel(0));
        let ch2 = inputs.signal(Self::PORT_CH2).map(|buf| buf.channel(0));
        let Some(output) = outputs[Self::PORT_OUT].signal_mut() else {
            return;
        };

        for (i, sample) in output.channel_mut(0)[..context.block_size].iter_mut().enumerate() {
            let level1 = self.level1.next();
            let level2 = self.level2.next();
            let mixed = ch1.map_or(0.0, |buf| buf[i]) * level1 + ch2.map_or(0.0, |buf| buf[i]) * level2;
            *sample = soft_clip(mixed);
        }
    }

    fn reset(&mut self) {
        self.level1.reset(self.level1.target());
        self.level2.reset(self.level2.target());
    }
}

/// Soft clipping past unity: linear inside [-1, 1], then bends smoothly
/// toward ±1.5.
#[inline]
fn soft_clip(x: f32) -> f32 {
    if x.abs() <= 1.0 {
        x
    } else {
        let over = x.abs() - 1.0;
        x.signum() * (1.0 + 0.5 * (2.0 * over).tanh())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::SignalBuffer;

    fn run(mixer: &mut Mixer, ch1: f32, ch2: f32, params: &[f32]) -> Vec<f32> {
        let make = |value: f32| {
            let mut buf = SignalBuffer::audio(8);
            buf.fill(value);
            PortBuffer::Signal(buf)
        };
        let arena = vec![make(ch1), make(ch2)];
        let bindings = [0, 1];
        let mut outputs = vec![PortBuffer::for_port(SignalType::Audio, 1, 8, 0)];
        mixer.process(
            &Inputs::new(&arena, &bindings),
            &mut outputs,
            params,
            &ProcessContext::new(1000.0, 8),
        );
        outputs[0].signal().unwrap().samples.clone()
    }

    #[test]
    fn test_mixer_info() {
        let mixer = Mixer::new();
        assert_eq!(mixer.info().id, "util.mixer");
        assert_eq!(mixer.info().category, ModuleCategory::Utility);
    }

    #[test]
    fn test_mixer_inputs_accept_several_sources() {
        let mixer = Mixer::new();
        let inputs: Vec<_> = mixer.ports().iter().filter(|p| p.is_input()).collect();
        assert_eq!(inputs.len(), 2);
        assert!(inputs.iter().all(|p| p.summing));
    }

    #[test]
    fn test_mixer_summing() {
        let mut mixer = Mixer::new();
        mixer.prepare(1000.0, 8);
        let out = run(&mut mixer, 0.25, 0.5, &[1.0, 1.0]);
        assert!(out.iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_mixer_silence_when_muted() {
        let mut mixer = Mixer::new();
        mixer.prepare(1000.0, 8);
        mixer.level1.reset(0.0);
        mixer.level2.reset(0.0);
        let out = run(&mut mixer, 0.5, 0.5, &[0.0, 0.0]);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mixer_no_inputs() {
        let mut mixer = Mixer::new();
        mixer.prepare(1000.0, 4);
        let mut outputs = vec![PortBuffer::for_port(SignalType::Audio, 1, 4, 0)];
        mixer.process(&Inputs::empty(), &mut outputs, &[1.0, 1.0], &ProcessContext::new(1000.0, 4));
        assert!(outputs[0].signal().unwrap().samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_soft_clip_bounds() {
        assert_eq!(soft_clip(0.5), 0.5);
        assert_eq!(soft_clip(-1.0), -1.0);
        assert!(soft_clip(1.2) > 1.0 && soft_clip(1.2) < 1.5);
        assert!(soft_clip(100.0) <= 1.5);
        assert_eq!(soft_clip(-3.0), -soft_clip(3.0));
    }
}
