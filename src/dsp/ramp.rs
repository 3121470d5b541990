//! Linear parameter ramps for click-free gain changes.

/// A value that moves linearly toward its target over a fixed time.
///
/// The ramp length is set in `prepare` from the sample rate, so `next`
/// does no division and never allocates.
#[derive(Clone, Debug)]
pub struct Ramp {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
    length: u32,
}

impl Ramp {
    /// Default ramp time in milliseconds.
    pub const DEFAULT_TIME_MS: f32 = 10.0;

    /// Creates a ramp resting at `initial`.
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            step: 0.0,
            remaining: 0,
            length: 1,
        }
    }

    /// Sets the ramp length from a time and a sample rate.
    pub fn prepare(&mut self, time_ms: f32, sample_rate: f32) {
        self.length = ((time_ms * 0.001 * sample_rate).round() as u32).max(1);
    }

    /// Starts moving toward `target`. Repeating the current target is a no-op.
    pub fn set_target(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        self.target = target;
        self.remaining = self.length;
        self.step = (target - self.current) / self.length as f32;
    }

    /// Returns the next value.
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                self.current + self.step
            };
        }
        self.current
    }

    /// Returns true while the value is still moving.
    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    /// Jumps straight to `value`.
    pub fn reset(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.remaining = 0;
    }

    /// The value being approached.
    pub fn target(&self) -> f32 {
        self.target
    }
}

impl Default for Ramp {
    fn default() -> Self {
        Self::new(0.0)
    }
}
