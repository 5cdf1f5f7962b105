//! `display_prefs`: the rendering-preference projection. Render tooling
//! asks for this independently of `conversation_context` since it changes
//! far less often and is cheap to recompute from a short tail of events.

use ea_domain::event::{Event, Payload};

/// The most recently merged display-preference string, or `"default"` if
/// the thread has never updated its preferences.
pub fn display_prefs(events: &[Event]) -> String {
    events
        .iter()
        .rev()
        .find_map(|event| match event.payload() {
            Payload::DisplayPreferenceUpdated {
                merged_preferences, ..
            } => Some(merged_preferences),
            _ => None,
        })
        .unwrap_or_else(|| "default".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(event_type: &str, data: serde_json::Value) -> Event {
        Event {
            id: Uuid::new_v4(),
            stream_name: "agent:v0-t1".to_string(),
            event_type: event_type.to_string(),
            position: 0,
            global_position: 0,
            time: Utc::now(),
            data,
            metadata: None,
        }
    }

    #[test]
    fn defaults_when_never_updated() {
        assert_eq!(display_prefs(&[]), "default");
    }

    #[test]
    fn returns_the_most_recent_update() {
        let events = vec![
            event(
                "DisplayPreferenceUpdated",
                json!({"instruction": "be terse", "merged_preferences": "terse", "previous_preferences": "default"}),
            ),
            event(
                "DisplayPreferenceUpdated",
                json!({"instruction": "use markdown", "merged_preferences": "terse, markdown", "previous_preferences": "terse"}),
            ),
        ];
        assert_eq!(display_prefs(&events), "terse, markdown");
    }
}
