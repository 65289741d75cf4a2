//! Reply notifications sent back to the commanding client
//!
//! The coordinator never returns text to its caller directly; it signals
//! `finish`, `fail`, `warn`, `error`, `debug` and `info` replies through a
//! [`Notifier`]. Each reply carries a one-character message code and a map of
//! keywords (`shutter_position`, `text`, ...).

use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::shutter::ShutterPosition;

/// Keyword map attached to a reply.
pub type Keywords = Map<String, Value>;

/// Message code of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageCode {
    /// Command finished successfully.
    #[serde(rename = ":")]
    Finish,
    /// Command failed.
    #[serde(rename = "f")]
    Fail,
    /// Informational, unsolicited or intermediate.
    #[serde(rename = "i")]
    Info,
    /// Non-fatal warning.
    #[serde(rename = "w")]
    Warning,
    /// Error diagnostic, usually followed by a fail.
    #[serde(rename = "e")]
    Error,
    /// Debug diagnostic.
    #[serde(rename = "d")]
    Debug,
}

impl MessageCode {
    /// Whether this code ends the command.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finish | Self::Fail)
    }
}

/// One reply line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    /// Id of the command this reply belongs to, 0 for unsolicited replies.
    pub command_id: u32,
    /// Message code.
    pub code: MessageCode,
    /// Keywords.
    pub data: Keywords,
}

impl Reply {
    /// Reply with arbitrary keywords.
    pub fn new(code: MessageCode, data: Keywords) -> Self {
        Self {
            command_id: 0,
            code,
            data,
        }
    }

    /// Reply carrying a single `text` keyword.
    pub fn text(code: MessageCode, text: impl Into<String>) -> Self {
        let mut data = Keywords::new();
        data.insert("text".to_string(), Value::String(text.into()));
        Self::new(code, data)
    }

    /// The `text` keyword, if any.
    pub fn text_value(&self) -> Option<&str> {
        self.data.get("text").and_then(Value::as_str)
    }

    /// The `shutter_position` keyword, if any.
    pub fn shutter_position(&self) -> Option<&str> {
        self.data.get("shutter_position").and_then(Value::as_str)
    }

    fn trace(&self) {
        match self.code {
            MessageCode::Error | MessageCode::Fail => {
                error!(command_id = self.command_id, data = ?self.data, "reply")
            }
            MessageCode::Warning => warn!(command_id = self.command_id, data = ?self.data, "reply"),
            MessageCode::Debug => debug!(command_id = self.command_id, data = ?self.data, "reply"),
            MessageCode::Finish | MessageCode::Info => {
                info!(command_id = self.command_id, data = ?self.data, "reply")
            }
        }
    }
}

/// Keyword map holding only `shutter_position`.
pub fn position_keywords(position: ShutterPosition) -> Keywords {
    let mut data = Keywords::new();
    data.insert(
        "shutter_position".to_string(),
        Value::String(position.as_str().to_string()),
    );
    data
}

/// Sink for replies.
pub trait Notifier: Send + Sync {
    /// Deliver one reply.
    fn notify(&self, reply: Reply);

    /// Trace and deliver.
    fn emit(&self, reply: Reply) {
        reply.trace();
        self.notify(reply);
    }

    /// Terminal success.
    fn finish(&self, data: Keywords) {
        self.emit(Reply::new(MessageCode::Finish, data));
    }

    /// Terminal failure.
    fn fail(&self, data: Keywords) {
        self.emit(Reply::new(MessageCode::Fail, data));
    }

    /// Informational keywords.
    fn info(&self, data: Keywords) {
        self.emit(Reply::new(MessageCode::Info, data));
    }

    /// Warning text.
    fn warn(&self, text: &str) {
        self.emit(Reply::text(MessageCode::Warning, text));
    }

    /// Error text.
    fn error(&self, text: &str) {
        self.emit(Reply::text(MessageCode::Error, text));
    }

    /// Debug text.
    fn debug(&self, text: &str) {
        self.emit(Reply::text(MessageCode::Debug, text));
    }
}

/// Stamps every reply with a command id before forwarding it.
#[derive(Clone)]
pub struct ScopedNotifier {
    inner: Arc<dyn Notifier>,
    command_id: u32,
}

impl ScopedNotifier {
    /// Wrap `inner` for the command `command_id`.
    pub fn new(inner: Arc<dyn Notifier>, command_id: u32) -> Self {
        Self { inner, command_id }
    }
}

impl Notifier for ScopedNotifier {
    fn notify(&self, mut reply: Reply) {
        reply.command_id = self.command_id;
        self.inner.notify(reply);
    }
}

#[derive(Serialize)]
struct ReplyLine<'a> {
    actor: &'a str,
    #[serde(flatten)]
    reply: &'a Reply,
}

/// Writes each reply as one JSON object per line.
pub struct JsonLinesNotifier<W> {
    actor: String,
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesNotifier<W> {
    /// Notifier writing to `writer` on behalf of `actor`.
    pub fn new(actor: impl Into<String>, writer: W) -> Self {
        Self {
            actor: actor.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_line(&self, reply: &Reply) -> std::io::Result<()> {
        let line = ReplyLine {
            actor: &self.actor,
            reply,
        };
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        serde_json::to_writer(&mut *writer, &line)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl<W: Write + Send> Notifier for JsonLinesNotifier<W> {
    fn notify(&self, reply: Reply) {
        if let Err(err) = self.write_line(&reply) {
            error!("Failed to write reply: {err}");
        }
    }
}
