//! `bridge send` - submit one request through a running bridge and print the replies.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use socket_bridge::codec::CONNECT_TIMED_OUT;
use std::fmt;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// A client-bound frame, classified for display.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Progress {
        message: String,
        step: Option<u64>,
        total: Option<u64>,
    },
    Final(String),
    Info(String),
    Error(String),
    /// JSON with a type this client does not know
    Other(Value),
    /// Not JSON
    Raw(String),
}

impl Reply {
    pub fn parse(frame: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(frame) else {
            return Reply::Raw(frame.to_string());
        };

        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        match value.get("type").and_then(Value::as_str) {
            Some("progress") => Reply::Progress {
                message: text("message"),
                step: value.get("step").and_then(Value::as_u64),
                total: value.get("total").and_then(Value::as_u64),
            },
            Some("final") => Reply::Final(match value.get("result") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            }),
            Some("info") => Reply::Info(text("message")),
            Some("error") => Reply::Error(text("message")),
            _ => Reply::Other(value),
        }
    }

    /// The bridge sends exactly one info notification, after the backend
    /// closes. A connect timeout releases the backend with no close to follow.
    pub fn ends_exchange(&self) -> bool {
        match self {
            Reply::Info(_) => true,
            Reply::Error(message) => message == CONNECT_TIMED_OUT,
            _ => false,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn count(n: &Option<u64>) -> String {
            n.map_or_else(|| "?".to_string(), |n| n.to_string())
        }

        match self {
            Reply::Progress {
                message,
                step,
                total,
            } => write!(f, "[Progress] {} ({}/{})", message, count(step), count(total)),
            Reply::Final(result) => write!(f, "[Final] {}", result),
            Reply::Info(message) => write!(f, "[Info] {}", message),
            Reply::Error(message) => write!(f, "[Error] {}", message),
            Reply::Other(value) => write!(f, "[MSG] {}", value),
            Reply::Raw(text) => write!(f, "[RAW] {}", text),
        }
    }
}

/// Connect to the bridge at `url`, send `text`, and print every reply until
/// the backend connection is reported closed.
pub async fn send_command(url: &str, text: &str) -> Result<()> {
    let (ws_stream, _) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to bridge at {}", url))?;
    let (mut write, mut read) = ws_stream.split();

    let payload = socket_bridge::codec::encode_request(text)?;
    write
        .send(Message::Text(payload.into()))
        .await
        .context("Failed to send request")?;

    while let Some(msg) = read.next().await {
        match msg.context("Connection error")? {
            Message::Text(frame) => {
                let reply = Reply::parse(frame.as_str());
                println!("{}", reply);
                if reply.ends_exchange() {
                    break;
                }
            }
            Message::Binary(data) => {
                println!("{}", Reply::Raw(String::from_utf8_lossy(&data).into_owned()));
            }
            Message::Close(_) => {
                println!("Connection closed by bridge");
                break;
            }
            _ => {}
        }
    }

    let _ = write.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_progress() {
        let reply = Reply::parse(r#"{"type":"progress","message":"working","step":2,"total":5}"#);
        assert_eq!(
            reply,
            Reply::Progress {
                message: "working".into(),
                step: Some(2),
                total: Some(5),
            }
        );
        assert_eq!(reply.to_string(), "[Progress] working (2/5)");
        assert!(!reply.ends_exchange());
    }

    #[test]
    fn progress_without_counts() {
        let reply = Reply::parse(r#"{"type":"progress","message":"starting"}"#);
        assert_eq!(reply.to_string(), "[Progress] starting (?/?)");
    }

    #[test]
    fn parses_final_string_and_structured() {
        assert_eq!(
            Reply::parse(r#"{"type":"final","result":"HELLO"}"#).to_string(),
            "[Final] HELLO"
        );
        assert_eq!(
            Reply::parse(r#"{"type":"final","result":{"n":1}}"#).to_string(),
            r#"[Final] {"n":1}"#
        );
    }

    #[test]
    fn info_ends_exchange() {
        let reply = Reply::parse(r#"{"type":"info","message":"backend socket closed"}"#);
        assert_eq!(reply, Reply::Info("backend socket closed".into()));
        assert_eq!(reply.to_string(), "[Info] backend socket closed");
        assert!(reply.ends_exchange());
    }

    #[test]
    fn error_does_not_end_exchange() {
        let reply = Reply::parse(r#"{"type":"error","message":"invalid payload"}"#);
        assert_eq!(reply.to_string(), "[Error] invalid payload");
        assert!(!reply.ends_exchange());
    }

    #[test]
    fn connect_timeout_ends_exchange() {
        let reply = Reply::parse(r#"{"type":"error","message":"backend connect timed out"}"#);
        assert_eq!(reply.to_string(), "[Error] backend connect timed out");
        assert!(reply.ends_exchange());
    }

    #[test]
    fn unknown_json_and_raw_text() {
        assert_eq!(
            Reply::parse(r#"{"answer":42}"#),
            Reply::Other(json!({"answer": 42}))
        );
        assert_eq!(
            Reply::parse(r#"{"answer":42}"#).to_string(),
            r#"[MSG] {"answer":42}"#
        );
        assert_eq!(Reply::parse("plain words").to_string(), "[RAW] plain words");
    }
}
