//! Wire types between the host shell and the automation process.
//!
//! Both directions are newline-delimited JSON: the shell writes
//! [`ControlCommand`]s to the child's stdin, the child writes
//! [`ProcessEvent`]s to its stdout. Diagnostics go to stderr.

use std::fmt;
use std::io::Write;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::transport::Embed;

/// `source` tag attached to embeds forwarded from the counterpart.
pub const EMBED_SOURCE: &str = "fishing-bot";

// ── Shell → process ─────────────────────────────────────────────────

/// Control message sent to the automation process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ControlCommand {
    ToggleFishing,
    Shutdown,
    StartFishing,
    StopFishing,
    /// Anything else; ignored by the receiver.
    #[serde(other)]
    Unknown,
}

impl ControlCommand {
    /// Parse one control line. Malformed lines yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        serde_json::from_str(line).ok()
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ── Process → shell ─────────────────────────────────────────────────

/// Status strings displayed by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "Starting...")]
    Starting,
    #[serde(rename = "Running")]
    Running,
    #[serde(rename = "Fishing")]
    Fishing,
    #[serde(rename = "Running (Not Fishing)")]
    NotFishing,
    #[serde(rename = "Running (Timed out)")]
    TimedOut,
    #[serde(rename = "Stopping...")]
    Stopping,
    #[serde(rename = "Stopped")]
    Stopped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "Starting...",
            Self::Running => "Running",
            Self::Fishing => "Fishing",
            Self::NotFishing => "Running (Not Fishing)",
            Self::TimedOut => "Running (Timed out)",
            Self::Stopping => "Stopping...",
            Self::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted by the automation process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProcessEvent {
    Ready,
    Status {
        status: Status,
    },
    Log {
        content: String,
    },
    Embed {
        content: Embed,
        source: String,
        #[serde(rename = "messageId")]
        message_id: String,
    },
}

impl ProcessEvent {
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse one stdout line from the child. Non-event lines yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str(line).ok()
    }
}

// ── Event sinks ─────────────────────────────────────────────────────

/// Receiver of process events, injected wherever logs or status changes
/// originate.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ProcessEvent);

    fn on_log(&self, content: &str) {
        self.emit(ProcessEvent::Log {
            content: content.to_string(),
        });
    }

    fn on_status(&self, status: Status) {
        self.emit(ProcessEvent::Status { status });
    }

    fn on_embed(&self, embed: &Embed, message_id: &str) {
        self.emit(ProcessEvent::Embed {
            content: embed.normalized(),
            source: EMBED_SOURCE.to_string(),
            message_id: message_id.to_string(),
        });
    }

    fn on_ready(&self) {
        self.emit(ProcessEvent::Ready);
    }
}

/// Writes events as JSON lines (the child's stdout wire).
pub struct JsonLineSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLineSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl EventSink for JsonLineSink {
    fn emit(&self, event: ProcessEvent) {
        let line = event.to_line();
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            tracing::warn!("Failed to write event: {e}");
        }
    }
}

/// Forwards events into an mpsc channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProcessEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProcessEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ProcessEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}
