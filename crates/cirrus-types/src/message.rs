//! Bus message envelope types.
//!
//! Defines the `BusMessage` envelope that transports deliver to the bus core,
//! along with the string property bag carried alongside the body.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Application and diagnostic properties attached to a message.
///
/// Ordered so that logged and serialized property bags are stable.
pub type MessageProperties = BTreeMap<String, String>;

/// A message travelling over the bus.
///
/// The body is opaque JSON: the bus core routes on `body_type` and never
/// looks inside `body`. Transport-owned fields (`enqueued_at`,
/// `delivery_count`) are stamped when the message is enqueued and updated on
/// redelivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    /// UUIDv7 message ID. Stable across redeliveries of the same message.
    pub id: Uuid,
    /// Set on replies only: the `id` of the request being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// Address replies should be sent to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Queue or topic this message was sent to.
    pub destination: String,
    /// Type tag used for handler routing and logging (e.g. "black_ball_request").
    pub body_type: String,
    /// Flexible JSON body.
    pub body: serde_json::Value,
    /// When the transport accepted the message.
    pub enqueued_at: DateTime<Utc>,
    /// Number of times this message has been delivered (1 on first delivery).
    #[serde(default = "first_delivery")]
    pub delivery_count: u32,
    /// Application and diagnostic properties.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: MessageProperties,
}

fn first_delivery() -> u32 {
    1
}

impl BusMessage {
    /// The reply-to address, or `"<none>"` for log lines.
    pub fn reply_to_or_default(&self) -> &str {
        self.reply_to.as_deref().unwrap_or("<none>")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> BusMessage {
        BusMessage {
            id: Uuid::now_v7(),
            correlation_id: None,
            reply_to: Some("replies.client-1".to_string()),
            destination: "membership".to_string(),
            body_type: "black_ball_request".to_string(),
            body: json!({"prospective_member_name": "Fred Flintstone"}),
            enqueued_at: Utc::now(),
            delivery_count: 1,
            properties: MessageProperties::new(),
        }
    }

    #[test]
    fn test_request_json_omits_empty_optionals() {
        let mut msg = sample();
        msg.reply_to = None;
        let json_str = serde_json::to_string(&msg).unwrap();

        assert!(json_str.contains("\"body_type\":\"black_ball_request\""));
        assert!(!json_str.contains("correlation_id"));
        assert!(!json_str.contains("reply_to"));
        assert!(!json_str.contains("properties"));
    }

    #[test]
    fn test_reply_json_keeps_correlation_id() {
        let mut msg = sample();
        let request_id = Uuid::now_v7();
        msg.correlation_id = Some(request_id);
        msg.properties
            .insert("tenant".to_string(), "bedrock".to_string());

        let json_str = serde_json::to_string(&msg).unwrap();
        let parsed: BusMessage = serde_json::from_str(&json_str).unwrap();

        assert_eq!(parsed.correlation_id, Some(request_id));
        assert_eq!(parsed.properties["tenant"], "bedrock");
        assert!(parsed.correlation_id.is_some());
    }

    #[test]
    fn test_missing_delivery_count_defaults_to_first_delivery() {
        let json_str = r#"{
            "id": "01890a5d-ac96-774b-bcce-b302099a8057",
            "destination": "membership",
            "body_type": "ping",
            "body": null,
            "enqueued_at": "2026-01-01T00:00:00Z"
        }"#;
        let parsed: BusMessage = serde_json::from_str(json_str).unwrap();
        assert_eq!(parsed.delivery_count, 1);
        assert!(parsed.properties.is_empty());
        assert!(parsed.correlation_id.is_none());
    }

    #[test]
    fn test_reply_to_or_default() {
        let mut msg = sample();
        assert_eq!(msg.reply_to_or_default(), "replies.client-1");
        msg.reply_to = None;
        assert_eq!(msg.reply_to_or_default(), "<none>");
    }
}
