use serde::Serialize;
use serde_json::Value;

use crate::{error::FrameError, models::NostrEvent};

/// Event kind of a contact (follow) list
pub const KIND_CONTACT_LIST: u64 = 3;
/// Event kind of a relay list
pub const KIND_RELAY_LIST: u64 = 10002;

/// Subscription filter sent inside a REQ frame
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    /// Filter for the events that carry relay references
    pub fn relay_references(limit: usize) -> Self {
        Filter {
            kinds: vec![KIND_CONTACT_LIST, KIND_RELAY_LIST],
            limit: Some(limit),
            ..Default::default()
        }
    }
}

/// Frames sent from client to relay
#[derive(Debug, Clone)]
pub enum ClientMessage<'a> {
    Req {
        subscription_id: &'a str,
        filter: &'a Filter,
    },
}

impl ClientMessage<'_> {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            ClientMessage::Req {
                subscription_id,
                filter,
            } => serde_json::to_string(&("REQ", subscription_id, filter)),
        }
    }
}

/// Frames received from a relay
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event {
        subscription_id: String,
        event: Box<NostrEvent>,
    },
    /// End of stored events
    Eose { subscription_id: String },
    Notice(String),
    /// A well-formed frame with a discriminant we don't handle
    Unknown(String),
}

impl RelayMessage {
    /// Decode a text frame.
    ///
    /// Only the discriminant is decoded up front, the rest of the frame is
    /// decoded by the matching arm.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let mut frame: Vec<Value> = serde_json::from_str(text)?;
        if frame.len() < 2 {
            return Err(FrameError::TooShort(frame.len(), 2));
        }

        let kind = frame[0]
            .as_str()
            .ok_or(FrameError::MissingDiscriminant)?
            .to_string();

        match kind.as_str() {
            "EVENT" => {
                if frame.len() < 3 {
                    return Err(FrameError::TooShort(frame.len(), 3));
                }
                let event: NostrEvent = serde_json::from_value(frame.swap_remove(2))?;
                Ok(RelayMessage::Event {
                    subscription_id: value_to_string(&frame[1]),
                    event: Box::new(event),
                })
            }
            "EOSE" => Ok(RelayMessage::Eose {
                subscription_id: value_to_string(&frame[1]),
            }),
            "NOTICE" => Ok(RelayMessage::Notice(value_to_string(&frame[1]))),
            _ => Ok(RelayMessage::Unknown(kind)),
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_req_encoding() {
        let filter = Filter::relay_references(100);
        let json = ClientMessage::Req {
            subscription_id: "sub1",
            filter: &filter,
        }
        .to_json()
        .unwrap();

        assert_eq!(json, r#"["REQ","sub1",{"kinds":[3,10002],"limit":100}]"#);
    }

    #[test]
    fn test_parse_event() {
        let text = r#"["EVENT","sub1",{"id":"abc","pubkey":"pk","kind":10002,"tags":[["r","wss://relay.one"]],"content":"","sig":"s","created_at":1700000000}]"#;
        match RelayMessage::parse(text).unwrap() {
            RelayMessage::Event {
                subscription_id,
                event,
            } => {
                assert_eq!(subscription_id, "sub1");
                assert_eq!(event.kind, 10002);
                assert_eq!(event.tags, vec![vec!["r".to_string(), "wss://relay.one".to_string()]]);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_parse_event_with_missing_fields() {
        let text = r#"["EVENT","sub1",{"kind":3,"tags":[["p","pk","wss://hint"]]}]"#;
        let RelayMessage::Event { event, .. } = RelayMessage::parse(text).unwrap() else {
            panic!("expected event");
        };
        assert_eq!(event.kind, 3);
        assert!(event.id.is_empty());
    }

    #[test]
    fn test_parse_eose_and_notice() {
        assert_eq!(
            RelayMessage::parse(r#"["EOSE","sub1"]"#).unwrap(),
            RelayMessage::Eose {
                subscription_id: "sub1".to_string()
            }
        );
        assert_eq!(
            RelayMessage::parse(r#"["NOTICE","rate limited"]"#).unwrap(),
            RelayMessage::Notice("rate limited".to_string())
        );
    }

    #[test]
    fn test_unknown_discriminant_is_not_an_error() {
        assert_eq!(
            RelayMessage::parse(r#"["AUTH","challenge"]"#).unwrap(),
            RelayMessage::Unknown("AUTH".to_string())
        );
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(RelayMessage::parse("not json"), Err(FrameError::Malformed(_))));
        assert!(matches!(RelayMessage::parse(r#"{"a":1}"#), Err(FrameError::Malformed(_))));
        assert!(matches!(RelayMessage::parse(r#"["EOSE"]"#), Err(FrameError::TooShort(1, 2))));
        assert!(matches!(
            RelayMessage::parse(r#"[1,"sub"]"#),
            Err(FrameError::MissingDiscriminant)
        ));
        assert!(matches!(
            RelayMessage::parse(r#"["EVENT","sub"]"#),
            Err(FrameError::TooShort(2, 3))
        ));
        assert!(matches!(
            RelayMessage::parse(r#"["EVENT","sub",{"tags":"nope"}]"#),
            Err(FrameError::Malformed(_))
        ));
    }
}
