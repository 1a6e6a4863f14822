//! Minimal STOMP 1.2 frame codec
//!
//! Just the subset the chat channel speaks: CONNECT/CONNECTED handshake,
//! SUBSCRIBE/UNSUBSCRIBE, SEND/MESSAGE, broker ERROR frames and LF
//! heartbeats. Header values are used verbatim (no escape sequences occur
//! in this vocabulary).
//!
//! Wire shape: `COMMAND\nheader:value\n...\n\n<body>\0`; a heartbeat is a
//! bare LF.

use thiserror::Error;

/// STOMP commands this client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Error,
    Disconnect,
    Receipt,
}

impl Command {
    /// Wire name of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
            Command::Receipt => "RECEIPT",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "CONNECT" => Some(Command::Connect),
            "CONNECTED" => Some(Command::Connected),
            "SUBSCRIBE" => Some(Command::Subscribe),
            "UNSUBSCRIBE" => Some(Command::Unsubscribe),
            "SEND" => Some(Command::Send),
            "MESSAGE" => Some(Command::Message),
            "ERROR" => Some(Command::Error),
            "DISCONNECT" => Some(Command::Disconnect),
            "RECEIPT" => Some(Command::Receipt),
            _ => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame parse errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
}

/// One STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: Command,
    headers: Vec<(String, String)>,
    body: String,
}

impl Frame {
    /// Start a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Builder: append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Builder: set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// The frame's command.
    pub fn command(&self) -> Command {
        self.command
    }

    /// First header with this name, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The frame body.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Encode to the wire form.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one wire frame. `Ok(None)` is a heartbeat.
    pub fn parse(text: &str) -> Result<Option<Frame>, FrameError> {
        let text = text.trim_end_matches('\0');
        if text.trim_matches(['\r', '\n']).is_empty() {
            return Ok(None);
        }

        let (head, body) = match text.split_once("\n\n") {
            Some((head, body)) => (head, body),
            None => (text, ""),
        };

        let mut lines = head.lines().map(|line| line.trim_end_matches('\r'));
        let command_line = lines.next().unwrap_or("");
        let command = Command::parse(command_line)
            .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            headers.push((name.to_string(), value.to_string()));
        }

        Ok(Some(Frame {
            command,
            headers,
            body: body.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_subscribe() {
        let frame = Frame::new(Command::Subscribe)
            .with_header("id", "sub-7")
            .with_header("destination", "/topic/chat/7")
            .with_header("ack", "auto");
        assert_eq!(
            frame.encode(),
            "SUBSCRIBE\nid:sub-7\ndestination:/topic/chat/7\nack:auto\n\n\0"
        );
    }

    #[test]
    fn test_roundtrip_message() {
        let frame = Frame::new(Command::Message)
            .with_header("destination", "/topic/chat/42")
            .with_header("content-type", "application/json")
            .with_body(r#"{"roomId":42}"#);
        let parsed = Frame::parse(&frame.encode()).unwrap().unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(parsed.header("destination"), Some("/topic/chat/42"));
        assert_eq!(parsed.body(), r#"{"roomId":42}"#);
    }

    #[test]
    fn test_parse_heartbeat() {
        assert_eq!(Frame::parse("\n").unwrap(), None);
        assert_eq!(Frame::parse("\r\n").unwrap(), None);
        assert_eq!(Frame::parse("\n\0").unwrap(), None);
    }

    #[test]
    fn test_parse_connected_with_crlf() {
        let parsed = Frame::parse("CONNECTED\r\nversion:1.2\r\nheart-beat:4000,4000\r\n\r\n\0");
        // CRLF head splits on "\n\n" only after the blank line; tolerate the
        // common LF form and the CR-stripped headers.
        let frame = Frame::parse("CONNECTED\nversion:1.2\nheart-beat:4000,4000\n\n\0")
            .unwrap()
            .unwrap();
        assert_eq!(frame.command(), Command::Connected);
        assert_eq!(frame.header("version"), Some("1.2"));
        // CRLF variant still yields a CONNECTED frame.
        assert_eq!(parsed.unwrap().unwrap().command(), Command::Connected);
    }

    #[test]
    fn test_parse_body_without_blank_line_is_empty() {
        let frame = Frame::parse("RECEIPT\nreceipt-id:1\0").unwrap().unwrap();
        assert_eq!(frame.command(), Command::Receipt);
        assert_eq!(frame.body(), "");
    }

    #[test]
    fn test_parse_rejects_unknown_command() {
        assert_eq!(
            Frame::parse("NACK\n\n\0").unwrap_err(),
            FrameError::UnknownCommand("NACK".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_malformed_header() {
        assert_eq!(
            Frame::parse("MESSAGE\nnocolon\n\n\0").unwrap_err(),
            FrameError::MalformedHeader("nocolon".to_string())
        );
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let frame = Frame::new(Command::Message).with_header("Destination", "/topic/chat/1");
        assert_eq!(frame.header("destination"), Some("/topic/chat/1"));
    }
}
