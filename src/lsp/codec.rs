//! Sans-I/O LSP wire codec (spec §4.10, §9).
//!
//! A pure state machine: holds a receive buffer and a send buffer, exposes
//! `feed(bytes)` / `try_decode()` to pull framed messages out of incoming
//! bytes, and `encode(...)` / `drain()` to push framed messages into
//! outgoing bytes. All real I/O — reading stdout, writing stdin — belongs
//! to the outer driver in `client.rs`; this type never touches a socket or
//! pipe.

use serde_json::Value;

#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Response {
        id: Value,
        result: Option<Value>,
        error: Option<Value>,
    },
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
}

#[derive(Default)]
pub struct LspCodec {
    recv_buf: Vec<u8>,
    send_buf: Vec<u8>,
}

impl LspCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes read from the subprocess's stdout.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.recv_buf.extend_from_slice(bytes);
    }

    /// Attempts to decode one complete framed message from the receive
    /// buffer. Returns `None` if more bytes are needed.
    pub fn try_decode(&mut self) -> Option<IncomingMessage> {
        let header_end = find_header_end(&self.recv_buf)?;
        let header = std::str::from_utf8(&self.recv_buf[..header_end]).ok()?;
        let content_length = header
            .lines()
            .find_map(|line| line.strip_prefix("Content-Length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())?;

        let body_start = header_end + 4; // "\r\n\r\n"
        let body_end = body_start + content_length;
        if self.recv_buf.len() < body_end {
            return None;
        }

        let body = &self.recv_buf[body_start..body_end];
        let value: Value = serde_json::from_slice(body).ok()?;
        self.recv_buf.drain(..body_end);

        Some(parse_message(value))
    }

    /// Queues an outgoing JSON-RPC request/notification/response for `drain()`.
    pub fn encode(&mut self, message: &Value) {
        let body = serde_json::to_vec(message).expect("JSON-RPC message must serialize");
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.send_buf.extend_from_slice(header.as_bytes());
        self.send_buf.extend_from_slice(&body);
    }

    /// Drains and returns all bytes queued for the subprocess's stdin.
    pub fn drain(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.send_buf)
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_message(value: Value) -> IncomingMessage {
    let obj = value.as_object().cloned().unwrap_or_default();
    if let Some(id) = obj.get("id") {
        if obj.contains_key("method") {
            IncomingMessage::Request {
                id: id.clone(),
                method: obj.get("method").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                params: obj.get("params").cloned().unwrap_or(Value::Null),
            }
        } else {
            IncomingMessage::Response {
                id: id.clone(),
                result: obj.get("result").cloned(),
                error: obj.get("error").cloned(),
            }
        }
    } else {
        IncomingMessage::Notification {
            method: obj.get("method").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            params: obj.get("params").cloned().unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roundtrips_a_request() {
        let mut codec = LspCodec::new();
        codec.encode(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}));
        let bytes = codec.drain();

        let mut decoder = LspCodec::new();
        decoder.feed(&bytes);
        let msg = decoder.try_decode().unwrap();
        match msg {
            IncomingMessage::Request { id, method, .. } => {
                assert_eq!(id, json!(1));
                assert_eq!(method, "initialize");
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn returns_none_on_partial_frame() {
        let mut codec = LspCodec::new();
        codec.encode(&json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
        let mut bytes = codec.drain();
        bytes.truncate(bytes.len() - 2);
        let mut decoder = LspCodec::new();
        decoder.feed(&bytes);
        assert!(decoder.try_decode().is_none());
    }

    #[test]
    fn decodes_response_vs_notification() {
        let mut codec = LspCodec::new();
        codec.encode(&json!({"jsonrpc": "2.0", "id": 5, "result": {"ok": true}}));
        codec.encode(&json!({"jsonrpc": "2.0", "method": "textDocument/publishDiagnostics", "params": {}}));
        let bytes = codec.drain();

        let mut decoder = LspCodec::new();
        decoder.feed(&bytes);
        let first = decoder.try_decode().unwrap();
        assert!(matches!(first, IncomingMessage::Response { .. }));
        let second = decoder.try_decode().unwrap();
        assert!(matches!(second, IncomingMessage::Notification { .. }));
        assert!(decoder.try_decode().is_none());
    }

    #[test]
    fn handles_multiple_messages_fed_across_calls() {
        let mut codec = LspCodec::new();
        codec.encode(&json!({"jsonrpc": "2.0", "id": 1, "result": null}));
        let bytes = codec.drain();

        let mut decoder = LspCodec::new();
        decoder.feed(&bytes[..5]);
        assert!(decoder.try_decode().is_none());
        decoder.feed(&bytes[5..]);
        assert!(decoder.try_decode().is_some());
    }
}
