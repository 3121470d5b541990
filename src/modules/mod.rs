//! Modules module
//!
//! Built-in processors: a sine source, gain and mixer utilities, a feedback
//! delay, MIDI conversion and the device endpoints.

pub mod delay;
pub mod gain;
pub mod io;
pub mod midi_note;
pub mod mixer;
pub mod oscillator;

pub use delay::FeedbackDelay;
pub use gain::Gain;
pub use io::{AudioInput, AudioOutput, MidiInput, DEVICE_CHANNELS};
pub use midi_note::{MidiNote, VoicePriority};
pub use mixer::Mixer;
pub use oscillator::SineOscillator;

use crate::dsp::ModuleRegistry;

/// Feature id that unlocks the effect modules.
pub const EFFECTS_FEATURE: &str = "effects";

/// Creates a registry holding every built-in module.
pub fn create_module_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register::<SineOscillator>();
    registry.register::<Gain>();
    registry.register::<Mixer>();
    registry.register::<MidiNote>();
    registry.register::<AudioInput>();
    registry.register::<AudioOutput>();
    registry.register::<MidiInput>();
    registry.register_gated::<FeedbackDelay>(EFFECTS_FEATURE);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::ModuleCategory;

    #[test]
    fn test_registry_holds_builtins() {
        let registry = create_module_registry();
        assert_eq!(registry.len(), 8);
        for id in ["osc.sine", "util.gain", "util.mixer", "midi.note", "fx.delay"] {
            assert!(registry.contains(id), "missing {id}");
        }
        let io = registry
            .list_modules()
            .iter()
            .filter(|info| info.category == ModuleCategory::Io)
            .count();
        assert_eq!(io, 3);
    }

    #[test]
    fn test_delay_is_gated() {
        let registry = create_module_registry();
        assert_eq!(registry.required_feature("fx.delay"), Some(EFFECTS_FEATURE));
        assert_eq!(registry.required_feature("osc.sine"), None);
    }

    #[test]
    fn test_created_modules_match_their_ids() {
        let registry = create_module_registry();
        for info in registry.list_modules() {
            let module = registry.create(info.id).unwrap();
            assert_eq!(module.info().id, info.id);
        }
    }
}
