//! Feedback Delay module.
//!
//! A mono delay line with feedback and a one-pole high cut in the
//! feedback path. The node is declared as a feedback node: edges leaving it
//! do not order the schedule, so it may close a loop in the patch and the
//! downstream node reads what it produced one block earlier.

use crate::dsp::{
    Inputs, ModuleCategory, ModuleInfo, ParameterDefinition, PortBuffer, PortDefinition,
    ProcessContext, Processor, Ramp, SignalType,
};

/// Maximum delay time in seconds.
const MAX_DELAY_SECONDS: f32 = 2.0;

/// Ramp time for delay-time changes.
const TIME_RAMP_MS: f32 = 50.0;

/// Mono delay with feedback.
///
/// # Ports
///
/// - **In** (Audio, Input, summing): Signal to delay. Loops back into this
///   input mix with everything else.
/// - **Out** (Audio, Output): Dry/wet mix.
///
/// # Parameters
///
/// - **Time** (1-2000 ms): Delay time.
/// - **Feedback** (0-0.95): Amount of the delayed signal fed back.
/// - **Mix** (0-1): Wet/dry balance.
/// - **High Cut** (100-20000 Hz): Lowpass filter in the feedback path.
pub struct FeedbackDelay {
    sample_rate: f32,
    /// Allocated in `prepare`; empty until then.
    buffer: Vec<f32>,
    write_pos: usize,
    time: Ramp,
    feedback: Ramp,
    mix: Ramp,
    high_cut_state: f32,
    ports: Vec<PortDefinition>,
    parameters: Vec<ParameterDefinition>,
}

impl FeedbackDelay {
    /// Creates a new delay. The delay line is allocated by `prepare`.
    pub fn new() -> Self {
        Self {
            sample_rate: 44100.0,
            buffer: Vec::new(),
            write_pos: 0,
            time: Ramp::new(250.0),
            feedback: Ramp::new(0.4),
            mix: Ramp::new(0.5),
            high_cut_state: 0.0,
            ports: vec![
                PortDefinition::input("in", "In", SignalType::Audio).summing(),
                PortDefinition::output("out", "Out", SignalType::Audio),
            ],
            parameters: vec![
                ParameterDefinition::new("time", "Time", 1.0, 2000.0, 250.0, "ms"),
                ParameterDefinition::new("feedback", "Feedback", 0.0, 0.95, 0.4, ""),
                ParameterDefinition::normalized("mix", "Mix", 0.5),
                ParameterDefinition::frequency("high_cut", "High Cut", 100.0, 20000.0, 8000.0),
            ],
        }
    }

    const PORT_IN: usize = 0;
    const PORT_OUT: usize = 0;

    const PARAM_TIME: usize = 0;
    const PARAM_FEEDBACK: usize = 1;
    const PARAM_MIX: usize = 2;
    const PARAM_HIGH_CUT: usize = 3;

    /// Reads from the delay buffer with linear interpolation.
    #[inline]
    fn read_interpolated(buffer: &[f32], write_pos: usize, delay_samples: f32) -> f32 {
        let size = buffer.len();
        let int_delay = delay_samples as usize;
        let frac = delay_samples - int_delay as f32;

        let pos_1 = (write_pos + size - int_delay % size) % size;
        let pos_2 = (pos_1 + size - 1) % size;

        buffer[pos_1] + frac * (buffer[pos_2] - buffer[pos_1])
    }

    /// One-pole lowpass coefficient.
    #[inline]
    fn lowpass_coeff(cutoff: f32, sample_rate: f32) -> f32 {
        let cutoff = cutoff.clamp(20.0, sample_rate * 0.45);
        let tan = (std::f32::consts::PI * cutoff / sample_rate).tan();
        tan / (1.0 + tan)
    }
}

impl Default for FeedbackDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for FeedbackDelay {
    fn info(&self) -> &ModuleInfo {
        static INFO: ModuleInfo = ModuleInfo {
            id: "fx.delay",
            name: "Feedback Delay",
            category: ModuleCategory::Effect,
            description: "Delay line with feedback; may close a loop in the patch",
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
        let max_samples = ((MAX_DELAY_SECONDS * sample_rate) as usize).max(2);
        if self.buffer.len() != max_samples {
            self.buffer = vec![0.0; max_samples];
            self.write_pos = 0;
        }
        self.time.prepare(TIME_RAMP_MS, sample_rate);
        self.feedback.prepare(Ramp::DEFAULT_TIME_MS, sample_rate);
        self.mix.prepare(Ramp::DEFAULT_TIME_MS, sample_rate);
    }

    fn process(
        &mut self,
        inputs: &Inputs<'_>,
        outputs: &mut [PortBuffer],
        params: &[f32],
        context: &ProcessContext,
    ) {
        self.time.set_target(params[Self::PARAM_TIME]);
        self.feedback.set_target(params[Self::PARAM_FEEDBACK]);
        self.mix.set_target(params[Self::PARAM_MIX]);
        let lp_coeff = Self::lowpass_coeff(params[Self::PARAM_HIGH_CUT], self.sample_rate);

        let input = inputs.signal(Self::PORT_IN).map(|buf| buf.channel(0));
        let Some(output) = outputs[Self::PORT_OUT].signal_mut() else {
            return;
        };
        let output = &mut output.channel_mut(0)[..context.block_size];

        if self.buffer.len() < 2 {
            output.fill(0.0);
            return;
        }
        let max_delay = (self.buffer.len() - 1) as f32;

        for (i, sample) in output.iter_mut().enumerate() {
            let time_ms = self.time.next();
            let feedback = self.feedback.next();
            let mix = self.mix.next();
            let dry = input.map_or(0.0, |buf| buf[i]);

            let delay_samples = (time_ms * 0.001 * self.sample_rate).clamp(1.0, max_delay);
            let wet = Self::read_interpolated(&self.buffer, self.write_pos, delay_samples);

            self.high_cut_state += lp_coeff * (wet - self.high_cut_state);
            self.buffer[self.write_pos] = dry + (self.high_cut_state * feedback).tanh();
            self.write_pos = (self.write_pos + 1) % self.buffer.len();

            *sample = dry * (1.0 - mix) + wet * mix;
        }
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.high_cut_state = 0.0;
        self.time.reset(self.time.target());
        self.feedback.reset(self.feedback.target());
        self.mix.reset(self.mix.target());
    }

    fn release(&mut self) {
        self.buffer = Vec::new();
        self.write_pos = 0;
    }

    fn is_feedback(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::SignalBuffer;

    fn impulse(frames: usize) -> SignalBuffer {
        let mut buf = SignalBuffer::audio(frames);
        buf.samples[0] = 1.0;
        buf
    }

    fn run(delay: &mut FeedbackDelay, input: SignalBuffer, params: &[f32]) -> Vec<f32> {
        let frames = input.frames();
        let arena = vec![PortBuffer::Signal(input)];
        let bindings = [0];
        let mut outputs = vec![PortBuffer::for_port(SignalType::Audio, 1, frames, 0)];
        delay.process(
            &Inputs::new(&arena, &bindings),
            &mut outputs,
            params,
            &ProcessContext::new(delay.sample_rate, frames),
        );
        outputs[0].signal().unwrap().samples.clone()
    }

    #[test]
    fn test_delay_info() {
        let delay = FeedbackDelay::new();
        assert_eq!(delay.info().id, "fx.delay");
        assert_eq!(delay.info().category, ModuleCategory::Effect);
        assert_eq!(delay.parameters().len(), 4);
    }

    #[test]
    fn test_delay_is_feedback_node() {
        assert!(FeedbackDelay::new().is_feedback());
        assert!(FeedbackDelay::new().ports()[0].summing);
    }

    #[test]
    fn test_delay_impulse_arrives_after_delay_time() {
        let mut delay = FeedbackDelay::new();
        // 1000 Hz: 4 ms is four samples.
        delay.prepare(1000.0, 16);
        delay.time.reset(4.0);
        delay.feedback.reset(0.0);
        delay.mix.reset(1.0);
        let out = run(&mut delay, impulse(16), &[4.0, 0.0, 1.0, 20000.0]);

        assert_eq!(out[0], 0.0);
        assert!((out[4] - 1.0).abs() < 1e-6);
        assert!(out[8].abs() < 1e-6);
    }

    #[test]
    fn test_delay_feedback_repeats() {
        let mut delay = FeedbackDelay::new();
        delay.prepare(1000.0, 16);
        delay.time.reset(4.0);
        delay.feedback.reset(0.5);
        delay.mix.reset(1.0);
        let out = run(&mut delay, impulse(16), &[4.0, 0.5, 1.0, 20000.0]);

        assert!(out[4] > 0.5);
        assert!(out[8] > 0.0 && out[8] < out[4]);
    }

    #[test]
    fn test_delay_unprepared_outputs_silence() {
        let mut delay = FeedbackDelay::new();
        let out = run(&mut delay, impulse(8), &[250.0, 0.4, 0.5, 8000.0]);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_delay_reset_and_release() {
        let mut delay = FeedbackDelay::new();
        delay.prepare(1000.0, 16);
        delay.time.reset(4.0);
        run(&mut delay, impulse(2), &[4.0, 0.0, 1.0, 20000.0]);
        delay.reset();
        let out = run(&mut delay, SignalBuffer::audio(16), &[4.0, 0.0, 1.0, 20000.0]);
        assert!(out.iter().all(|&s| s == 0.0));

        delay.release();
        assert!(delay.buffer.is_empty());
    }

    #[test]
    fn test_delay_registry_instantiation() {
        let mut registry = crate::dsp::ModuleRegistry::new();
        registry.register::<FeedbackDelay>();
        let module = registry.create("fx.delay").unwrap();
        assert!(module.is_feedback());
    }
}
