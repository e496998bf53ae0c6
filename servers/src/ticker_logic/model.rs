use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Stream,
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<bool>,
}

impl ServerMessage {
    pub fn tick(at: DateTime<Local>) -> Self {
        Self {
            r#type: "tick".to_string(),
            message: Some(Value::String(at.to_rfc3339())),
            error: None,
            ack: None,
        }
    }

    pub fn ack(request: &str) -> Self {
        Self {
            r#type: "ack".to_string(),
            message: Some(Value::String(request.to_string())),
            error: None,
            ack: Some(true),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            r#type: "error".to_string(),
            message: None,
            error: Some(reason.into()),
            ack: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub connections: usize,
    pub streams: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages_parse_by_type() {
        assert_eq!(serde_json::from_str::<ClientMessage>(r#"{"type":"stream"}"#).unwrap(), ClientMessage::Stream);
        assert_eq!(serde_json::from_str::<ClientMessage>(r#"{"type":"cancel"}"#).unwrap(), ClientMessage::Cancel);
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
    }

    #[test]
    fn test_tick_omits_empty_fields() {
        let at = Local::now();
        let json = serde_json::to_value(ServerMessage::tick(at)).unwrap();

        assert_eq!(json["type"], "tick");
        assert_eq!(json["message"], at.to_rfc3339());
        assert!(json.get("error").is_none());
        assert!(json.get("ack").is_none());
    }
}
