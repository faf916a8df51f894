//! Fragment → wire event encoding

use crate::agent::Fragment;
use crate::types::WireEvent;

/// Encodes the fragments of one invocation into wire events.
///
/// Text deltas are accumulated so every `message` event carries the full
/// text produced so far. Use a fresh encoder per invocation.
#[derive(Debug, Default)]
pub struct EventEncoder {
    accumulated: String,
}

impl EventEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text accumulated so far
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Encode one fragment. `Done` produces no event.
    pub fn encode(&mut self, fragment: Fragment) -> Option<WireEvent> {
        match fragment {
            Fragment::ContentDelta(delta) => {
                self.accumulated.push_str(&delta);
                Some(WireEvent::message(self.accumulated.clone()))
            }
            Fragment::ToolFragment(raw) => Some(WireEvent::tools(raw)),
            Fragment::Failure(reason) => Some(WireEvent::error(reason)),
            Fragment::Done => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_events_carry_accumulated_text() {
        let mut encoder = EventEncoder::new();
        let contents: Vec<_> = ["H", "e", "llo"]
            .iter()
            .map(|d| {
                encoder
                    .encode(Fragment::ContentDelta(d.to_string()))
                    .and_then(|e| e.content().map(str::to_string))
                    .unwrap()
            })
            .collect();
        assert_eq!(contents, vec!["H", "He", "Hello"]);
    }

    #[test]
    fn test_tool_fragment_passes_raw_payload() {
        let mut encoder = EventEncoder::new();
        encoder.encode(Fragment::ContentDelta("Swapping".to_string()));

        let event = encoder
            .encode(Fragment::ToolFragment("not json".to_string()))
            .unwrap();
        assert_eq!(event.kind(), "tools");
        assert_eq!(event.content(), Some("not json"));
        // Tool fragments don't disturb the text accumulator.
        assert_eq!(encoder.accumulated(), "Swapping");
    }

    #[test]
    fn test_terminal_fragments() {
        let mut encoder = EventEncoder::new();
        assert!(encoder.encode(Fragment::Done).is_none());

        let event = encoder.encode(Fragment::Failure("boom".to_string())).unwrap();
        assert_eq!(event.kind(), "error");
        assert_eq!(event.content(), Some("boom"));
        assert!(event.timestamp().is_some());
    }
}
