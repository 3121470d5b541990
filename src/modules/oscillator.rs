//! Oscillator modules.
//!
//! This module contains sound source modules that generate audio waveforms.

use std::f32::consts::TAU;

use crate::dsp::{
    Inputs, ModuleCategory, ModuleInfo, ParameterDefinition, PortBuffer, PortDefinition,
    ProcessContext, Processor, SignalType,
};

/// A sine wave oscillator with frequency modulation support.
///
/// # Ports
///
/// - **Add Freq** (Control, Input): added to the base frequency, scaled so
///   that 1.0 is +1000 Hz.
/// - **FM** (Control, Input): scaled by the FM Depth parameter and added to
///   the frequency.
/// - **Out** (Audio, Output): the generated sine wave.
///
/// # Parameters
///
/// - **Frequency** (20-20000 Hz): Base frequency of the oscillator.
/// - **FM Depth** (0-1000 Hz): How much the FM input affects the frequency.
pub struct SineOscillator {
    /// Current phase accumulator (0.0 to 1.0).
    phase: f32,
    sample_rate: f32,
    ports: Vec<PortDefinition>,
    parameters: Vec<ParameterDefinition>,
}

impl SineOscillator {
    /// Creates a new sine oscillator.
    pub fn new() -> Self {
        Self {
            phase: 0.0,
            sample_rate: 44100.0,
            ports: vec![
                PortDefinition::input_with_default("freq_cv", "Add Freq", SignalType::Control, 0.0),
                PortDefinition::input_with_default("fm", "FM", SignalType::Control, 0.0),
                PortDefinition::output("out", "Out", SignalType::Audio),
            ],
            parameters: vec![
                ParameterDefinition::frequency("frequency", "Frequency", 20.0, 20000.0, 440.0),
                ParameterDefinition::new("fm_depth", "FM Depth", 0.0, 1000.0, 0.0, "Hz"),
            ],
        }
    }

    const PORT_FREQ_CV: usize = 0;
    const PORT_FM: usize = 1;
    const PORT_OUT: usize = 0;

    const PARAM_FREQUENCY: usize = 0;
    const PARAM_FM_DEPTH: usize = 1;

    /// CV of 1.0 on the Add Freq input shifts the frequency by this much.
    const CV_SCALE_HZ: f32 = 1000.0;
}

impl Default for SineOscillator {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for SineOscillator {
    fn info(&self) -> &ModuleInfo {
        static INFO: ModuleInfo = ModuleInfo {
            id: "osc.sine",
            name: "Sine Oscillator",
            category: ModuleCategory::Source,
            description: "A pure sine wave oscillator with FM support",
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
        self.sample_rate = sample_rate;
    }

    fn process(
        &mut self,
        inputs: &Inputs<'_>,
        outputs: &mut [PortBuffer],
        params: &[f32],
        context: &ProcessContext,
    ) {
        let base_freq = params[Self::PARAM_FREQUENCY];
        let fm_depth = params[Self::PARAM_FM_DEPTH];

        let freq_cv = inputs.signal(Self::PORT_FREQ_CV).map(|buf| buf.channel(0));
        let fm = inputs.signal(Self::PORT_FM).map(|buf| buf.channel(0));
        let Some(output) = outputs[Self::PORT_OUT].signal_mut() else {
            return;
        };
        let output = output.channel_mut(0);

        for (i, sample) in output[..context.block_size].iter_mut().enumerate() {
            let cv = freq_cv.map_or(0.0, |buf| buf[i]);
            let fm = fm.map_or(0.0, |buf| buf[i]);
            let freq = (base_freq + cv * Self::CV_SCALE_HZ + fm * fm_depth).max(0.0);

            *sample = (self.phase * TAU).sin();

            self.phase = (self.phase + freq / self.sample_rate).fract();
        }
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}
