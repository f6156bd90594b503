//! Wire shapes exchanged with clients and the backend.
//!
//! Clients send `{"text": "..."}`. The same shape is forwarded to the backend.
//! The bridge itself only ever synthesizes two client-bound shapes, the
//! `info` and `error` notifications; backend replies pass through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;

/// Sent to the client when its backend connection closes.
pub const BACKEND_CLOSED: &str = "backend socket closed";
/// Sent to the client when its backend connection reports an error.
pub const BACKEND_ERROR: &str = "backend socket error";
/// Sent to the client when a backend connection did not open in time.
pub const CONNECT_TIMED_OUT: &str = "backend connect timed out";

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub text: String,
}

/// Client-bound frames produced by the bridge itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Notification {
    Info { message: String },
    Error { message: String },
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Info { message } | Self::Error { message } => message,
        }
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encode)
    }
}

/// Encode a backend-facing request frame.
pub fn encode_request(text: &str) -> Result<String, CodecError> {
    serde_json::to_string(&RequestPayload {
        text: text.to_string(),
    })
    .map_err(CodecError::Encode)
}

pub fn encode_info(message: &str) -> Result<String, CodecError> {
    Notification::info(message).encode()
}

pub fn encode_error(message: &str) -> Result<String, CodecError> {
    Notification::error(message).encode()
}

/// Decode an inbound client frame.
///
/// Any valid JSON is accepted. A missing, null or non-string `text` field
/// becomes the empty string; only unparseable input is rejected.
pub fn decode_client_frame(frame: &str) -> Result<RequestPayload, CodecError> {
    let value: Value = serde_json::from_str(frame).map_err(CodecError::InvalidPayload)?;
    let text = value
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(RequestPayload { text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_request_is_text_object() {
        let json = encode_request("hello").unwrap();
        assert_eq!(json, r#"{"text":"hello"}"#);
    }

    #[test]
    fn encode_request_empty_and_escaped() {
        assert_eq!(encode_request("").unwrap(), r#"{"text":""}"#);
        let json = encode_request("say \"hi\"\n").unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["text"], "say \"hi\"\n");
    }

    #[test]
    fn notifications_carry_type_tag() {
        let info: Value = serde_json::from_str(&encode_info(BACKEND_CLOSED).unwrap()).unwrap();
        assert_eq!(info["type"], "info");
        assert_eq!(info["message"], "backend socket closed");

        let err: Value = serde_json::from_str(&encode_error("invalid payload").unwrap()).unwrap();
        assert_eq!(err["type"], "error");
        assert_eq!(err["message"], "invalid payload");
    }

    #[test]
    fn notification_parses_back() {
        let n: Notification =
            serde_json::from_str(r#"{"type":"error","message":"boom"}"#).unwrap();
        assert_eq!(n, Notification::error("boom"));
        assert_eq!(n.message(), "boom");
    }

    #[test]
    fn decode_reads_text() {
        let req = decode_client_frame(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(req.text, "hello");
    }

    #[test]
    fn decode_missing_text_defaults_to_empty() {
        assert_eq!(decode_client_frame("{}").unwrap().text, "");
        assert_eq!(decode_client_frame(r#"{"other":1}"#).unwrap().text, "");
        assert_eq!(decode_client_frame(r#"{"text":null}"#).unwrap().text, "");
    }

    #[test]
    fn decode_non_string_text_defaults_to_empty() {
        assert_eq!(decode_client_frame(r#"{"text":42}"#).unwrap().text, "");
        assert_eq!(decode_client_frame(r#"{"text":["a"]}"#).unwrap().text, "");
    }

    #[test]
    fn decode_non_object_json_is_accepted() {
        assert_eq!(decode_client_frame("5").unwrap().text, "");
        assert_eq!(decode_client_frame(r#""str""#).unwrap().text, "");
        assert_eq!(decode_client_frame("null").unwrap().text, "");
    }

    #[test]
    fn decode_rejects_non_json() {
        let err = decode_client_frame("not-json").unwrap_err();
        assert!(matches!(err, CodecError::InvalidPayload(_)));
        assert_eq!(err.to_string(), "invalid payload");
        assert!(decode_client_frame("").is_err());
    }

    proptest! {
        #[test]
        fn decode_recovers_any_encoded_text(text in any::<String>()) {
            let frame = encode_request(&text).unwrap();
            prop_assert_eq!(decode_client_frame(&frame).unwrap().text, text);
        }

        #[test]
        fn decode_recovers_quotes_and_control_characters(
            text in r#"["\\\x00-\x1f a-zé€😀]{0,32}"#
        ) {
            let frame = encode_request(&text).unwrap();
            prop_assert_eq!(decode_client_frame(&frame).unwrap().text, text);
        }
    }
}
