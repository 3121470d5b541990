//! Connection validation for the processing graph.
//!
//! Signal-kind compatibility and channel-width checks shared by
//! [`Graph::connect`](super::Graph::connect) and the scheduler.

use crate::dsp::{PortDefinition, SignalType};

use super::error::GraphError;

/// Validates whether a connection between two signal kinds is allowed.
///
/// # Connection Rules
///
/// | From → To        | Allowed | Reason                    |
/// |------------------|---------|---------------------------|
/// | Audio → Audio    | ✓       | Same kind                 |
/// | Audio → Control  | ✓       | Audio-rate modulation     |
/// | Control → Audio  | ✓       | Modulator into a mixer    |
/// | Control → Control| ✓       | Same kind                 |
/// | Event → Event    | ✓       | Same kind                 |
/// | Event → Others   | ✗       | Needs a converter node    |
/// | Others → Event   | ✗       | Needs a converter node    |
pub fn validate_connection(from: SignalType, to: SignalType) -> Result<(), GraphError> {
    if from.can_connect_to(to) {
        Ok(())
    } else {
        Err(GraphError::IncompatiblePortKind { from, to })
    }
}

/// Human-readable reason a pairing is rejected.
pub fn incompatibility_reason(from: SignalType, to: SignalType) -> &'static str {
    match (from, to) {
        (a, b) if a.can_connect_to(b) => "compatible",
        (SignalType::Event, _) | (_, SignalType::Event) => "events require a converter node",
        _ => "incompatible signal kinds",
    }
}

/// Checks whether a source's width can feed a destination's width.
///
/// Equal widths map channel to channel; a mono source is broadcast to every
/// destination channel. Event ports carry no channels and always match.
pub fn channels_compatible(source: &PortDefinition, dest: &PortDefinition) -> bool {
    if source.signal_type == SignalType::Event {
        return true;
    }
    source.channels == dest.channels || source.channels == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_kind_connections() {
        assert!(validate_connection(SignalType::Audio, SignalType::Audio).is_ok());
        assert!(validate_connection(SignalType::Control, SignalType::Control).is_ok());
        assert!(validate_connection(SignalType::Event, SignalType::Event).is_ok());
    }

    #[test]
    fn test_audio_control_bidirectional() {
        assert!(validate_connection(SignalType::Audio, SignalType::Control).is_ok());
        assert!(validate_connection(SignalType::Control, SignalType::Audio).is_ok());
    }

    #[test]
    fn test_event_isolation() {
        for other in [SignalType::Audio, SignalType::Control] {
            assert_eq!(
                validate_connection(SignalType::Event, other),
                Err(GraphError::IncompatiblePortKind {
                    from: SignalType::Event,
                    to: other
                })
            );
            assert!(validate_connection(other, SignalType::Event).is_err());
        }
    }

    #[test]
    fn test_error_message_names_converter() {
        let err = validate_connection(SignalType::Event, SignalType::Audio).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot connect Event output to Audio input: events require a converter node"
        );
    }

    #[test]
    fn test_channel_widths() {
        let mono = PortDefinition::output("out", "Out", SignalType::Audio);
        let stereo_out = mono.clone().with_channels(2);
        let stereo_in = PortDefinition::input("in", "In", SignalType::Audio).with_channels(2);
        let mono_in = PortDefinition::input("in", "In", SignalType::Audio);

        assert!(channels_compatible(&mono, &stereo_in));
        assert!(channels_compatible(&stereo_out, &stereo_in));
        assert!(!channels_compatible(&stereo_out, &mono_in));

        let events = PortDefinition::output("ev", "Events", SignalType::Event);
        let events_in = PortDefinition::input("ev", "Events", SignalType::Event);
        assert!(channels_compatible(&events, &events_in));
    }
}
