//! Immutable audit logging.
//!
//! Records every security-relevant event: key generation, rotation and
//! revocation, token issuance and redemption, and decryption failures. The
//! log is append-only and write-once; events carry a subject reference and
//! timestamp but never plaintext or key material.
//!
//! Supports pluggable sinks for forwarding events to files, S3, etc.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    KeyGenerated,
    KeyRotated,
    KeyRevoked,
    TokenIssued,
    TokenRedeemed,
    TokenRevoked,
    RedemptionFailed,
    DecryptionFailed,
}

/// How much attention the event deserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Security,
}

/// A permanent record of one security-relevant event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: EventType,
    /// The key id or token the event concerns. Never a secret.
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub detail: String,
}

impl AuditEvent {
    pub(crate) fn new(
        event_type: EventType,
        subject: impl Into<String>,
        severity: Severity,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            subject: subject.into(),
            timestamp: Utc::now(),
            severity,
            detail: detail.into(),
        }
    }
}

/// A sink that receives audit events. Implement this to forward events to a
/// file, database, S3, or other persistent store.
pub trait AuditSink: Send {
    /// Append an event. Called for every security-relevant operation.
    fn append(&mut self, event: AuditEvent);
}

/// An append-only log of all events.
/// Can forward events to additional sinks via `add_forward_sink`.
#[derive(Default, Serialize, Deserialize)]
pub struct AuditLog {
    events: Vec<AuditEvent>,
    #[serde(skip)]
    forward_sinks: Option<Vec<Box<dyn AuditSink>>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("events", &self.events)
            .field(
                "forward_sinks",
                &self.forward_sinks.as_ref().map(|s| s.len()),
            )
            .finish()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            forward_sinks: None,
        }
    }

    /// Add a sink to receive a copy of every event. Useful for persisting
    /// to a file, S3, or other store without replacing the in-memory log.
    pub fn add_forward_sink(&mut self, sink: Box<dyn AuditSink>) {
        self.forward_sinks
            .get_or_insert_with(Vec::new)
            .push(sink);
    }

    /// Append a new event to the log and forward to any attached sinks.
    pub fn append(&mut self, event: AuditEvent) {
        if let Some(ref mut sinks) = self.forward_sinks {
            for sink in sinks.iter_mut() {
                sink.append(event.clone());
            }
        }
        self.events.push(event);
    }

    /// Return the number of events in the log.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over the events.
    pub fn iter(&self) -> std::slice::Iter<'_, AuditEvent> {
        self.events.iter()
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: file
// ---------------------------------------------------------------------------

/// Writes audit events as JSON lines (one per event) to a file.
/// Creates the file if it doesn't exist; appends if it does.
pub struct FileAuditSink {
    file: std::fs::File,
}

impl FileAuditSink {
    /// Open or create a file for append-only audit logging.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl AuditSink for FileAuditSink {
    fn append(&mut self, event: AuditEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let _ = writeln!(self.file, "{line}");
            let _ = self.file.flush();
        }
    }
}
