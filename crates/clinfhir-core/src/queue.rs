//! Wire messages exchanged over the bundle handoff channel.

use serde::{Deserialize, Serialize};

use crate::bundle::Bundle;
use crate::error::Result;
use crate::label::SequenceLabel;

/// Payload of the termination sentinel.
pub const END_PAYLOAD: &str = "END";

/// One message on the handoff channel: a labelled serialized bundle, or the
/// termination sentinel `{sequence_label: "0", payload: "END"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub sequence_label: String,
    pub payload: String,
}

impl QueueMessage {
    /// Builds a data message from a labelled bundle.
    pub fn data(label: SequenceLabel, bundle: &Bundle) -> Result<Self> {
        Ok(Self {
            sequence_label: label.to_string(),
            payload: bundle.to_json()?,
        })
    }

    /// The termination sentinel, published exactly once after all data
    /// messages of all patients.
    pub fn end() -> Self {
        Self {
            sequence_label: SequenceLabel::Sentinel.to_string(),
            payload: END_PAYLOAD.to_string(),
        }
    }

    pub fn is_end(&self) -> bool {
        self.payload == END_PAYLOAD
    }

    /// Parses the label of a data message.
    pub fn label(&self) -> Result<SequenceLabel> {
        self.sequence_label.parse()
    }

    /// Deserializes the bundle of a data message.
    pub fn bundle(&self) -> Result<Bundle> {
        Bundle::from_json(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleEntry;
    use crate::resource::{OutputResource, ResourceKind};
    use serde_json::json;

    #[test]
    fn test_end_message() {
        let msg = QueueMessage::end();
        assert!(msg.is_end());
        assert_eq!(msg.sequence_label, "0");
        assert_eq!(msg.payload, "END");
    }

    #[test]
    fn test_data_message_roundtrip() {
        let mut bundle = Bundle::new(2);
        bundle.push(BundleEntry::create(OutputResource::new(
            ResourceKind::Observation,
            json!({"value": 98.6}),
        )));

        let msg = QueueMessage::data(SequenceLabel::fragment(1, 1, 2), &bundle).unwrap();
        assert!(!msg.is_end());
        assert_eq!(msg.sequence_label, "1_1_2");
        assert_eq!(msg.label().unwrap(), SequenceLabel::fragment(1, 1, 2));
        assert_eq!(msg.bundle().unwrap(), bundle);
    }

    #[test]
    fn test_wire_roundtrip() {
        let msg = QueueMessage::end();
        let text = serde_json::to_string(&msg).unwrap();
        let back: QueueMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(msg, back);
    }
}
