//! Gain module.
//!
//! Scales an audio signal by a level and an optional control voltage,
//! ramping level changes so parameter edits never click.

use crate::dsp::{
    Inputs, ModuleCategory, ModuleInfo, ParameterDefinition, PortBuffer, PortDefinition,
    ProcessContext, Processor, Ramp, SignalType,
};

/// A gain stage with CV control.
///
/// # Ports
///
/// - **In** (Audio, Input): The signal to scale.
/// - **CV** (Control, Input): Amplitude control, clamped to 0..1. Reads 1.0
///   when unconnected.
/// - **Out** (Audio, Output): The scaled signal.
///
/// # Parameters
///
/// - **Level** (0-1): Base amplitude.
/// - **CV Amount** (0-1): How much the CV input affects the amplitude.
///
/// ```text
/// Output = Input × Level × (1 - CV_Amount + CV × CV_Amount)
/// ```
pub struct Gain {
    ports: Vec<PortDefinition>,
    parameters: Vec<ParameterDefinition>,
    level: Ramp,
    cv_amount: Ramp,
}

impl Gain {
    /// Creates a new gain stage at full level.
    pub fn new() -> Self {
        Self {
            ports: vec![
                PortDefinition::input("in", "In", SignalType::Audio),
                PortDefinition::input_with_default("cv", "CV", SignalType::Control, 1.0),
                PortDefinition::output("out", "Out", SignalType::Audio),
            ],
            parameters: vec![
                ParameterDefinition::normalized("level", "Level", 1.0),
                ParameterDefinition::normalized("cv_amount", "CV Amount", 1.0),
            ],
            level: Ramp::new(1.0),
            cv_amount: Ramp::new(1.0),
        }
    }

    const PORT_IN: usize = 0;
    const PORT_CV: usize = 1;
    const PORT_OUT: usize = 0;

    const PARAM_LEVEL: usize = 0;
    const PARAM_CV_AMOUNT: usize = 1;
}

impl Default for Gain {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Gain {
    fn info(&self) -> &ModuleInfo {
        static INFO: ModuleInfo = ModuleInfo {
            id: "util.gain",
            name: "Gain",
            category: ModuleCategory::Utility,
            description: "Level and CV controlled amplifier",
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
        self.level.prepare(Ramp::DEFAULT_TIME_MS, sample_rate);
        self.cv_amount.prepare(Ramp::DEFAULT_TIME_MS, sample_rate);
    }

    fn process(
        &mut self,
        inputs: &Inputs<'_>,
        outputs: &mut [PortBuffer],
        params: &[f32],
        context: &ProcessContext,
    ) {
        self.level.set_target(params[Self::PARAM_LEVEL]);
        self.cv_amount.set_target(params[Self::PARAM_CV_AMOUNT]);

        let audio_in = inputs.signal(Self::PORT_IN).map(|buf| buf.channel(0));
        let cv_in = inputs.signal(Self::PORT_CV).map(|buf| buf.channel(0));
        let Some(output) = outputs[Self::PORT_OUT].signal_mut() else {
            return;
        };

        for (i, sample) in output.channel_mut(0)[..context.block_size].iter_mut().enumerate() {
            let level = self.level.next();
            let cv_amount = self.cv_amount.next();
            let audio = audio_in.map_or(0.0, |buf| buf[i]);
            let cv = cv_in.map_or(1.0, |buf| buf[i]).clamp(0.0, 1.0);

            *sample = audio * level * (1.0 - cv_amount + cv * cv_amount);
        }
    }

    fn reset(&mut self) {
        self.level.reset(self.level.target());
        self.cv_amount.reset(self.cv_amount.target());
    }
}
