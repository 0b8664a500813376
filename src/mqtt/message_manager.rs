use chrono::NaiveDateTime;
use std::borrow::Cow;
use std::fmt;

const PREVIEW_CHARS: usize = 32;

/// A message received from the broker, still carrying its full namespaced topic.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub timestamp: NaiveDateTime,
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = self.value();
        let preview: String = value.chars().take(PREVIEW_CHARS).collect();
        write!(f, "{} - {}: {}", self.timestamp, self.topic, preview)
    }
}

impl InboundMessage {
    pub fn from_topic(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    /// Payload as text; invalid UTF-8 is replaced rather than rejected.
    pub fn value(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_previews_long_payloads() {
        let msg = InboundMessage::from_topic("nuki/presence/devices", "x".repeat(100));
        let rendered = msg.to_string();
        assert!(rendered.ends_with(&format!("nuki/presence/devices: {}", "x".repeat(32))));
    }

    #[test]
    fn short_payloads_render_whole() {
        let msg = InboundMessage::from_topic("nuki/lock/action", "lock");
        assert!(msg.to_string().ends_with("nuki/lock/action: lock"));
        assert_eq!(msg.value(), "lock");
    }
}
