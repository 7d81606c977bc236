// Copyright 2025 Cowboy AI, LLC.

//! Debezium envelope decoder
//!
//! Turns a raw bus message into a [`ChangeEvent`], or into one of the
//! non-event outcomes the consumption loop acknowledges without writing
//! anything: tombstones, schema-only payloads, and unsupported operations.
//!
//! The envelope is the standard `{ "payload": { "op", "before", "after",
//! "source", ... } }` shape. `op=d` selects `before`, every other operation
//! selects `after`; a null selected side means there is nothing to project.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};

/// Row-level change operation carried by the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOp {
    /// Row inserted (`c`)
    Create,
    /// Row updated (`u`)
    Update,
    /// Row deleted (`d`)
    Delete,
    /// Row read during an initial snapshot (`r`); projected like a create
    Read,
}

impl ChangeOp {
    /// The single-letter code Debezium uses for this operation
    pub fn code(&self) -> char {
        match self {
            ChangeOp::Create => 'c',
            ChangeOp::Update => 'u',
            ChangeOp::Delete => 'd',
            ChangeOp::Read => 'r',
        }
    }

    /// Whether this operation removes the row
    pub fn is_delete(&self) -> bool {
        matches!(self, ChangeOp::Delete)
    }
}

/// A decoded row-level change event
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// The change operation
    pub op: ChangeOp,
    /// Source table name, lower snake_case
    pub table: String,
    /// Column values of the selected row side
    pub row: Map<String, Value>,
    /// Topic the message arrived on; used only in diagnostics
    pub topic: String,
}

/// Why a well-formed message produced no event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The envelope has no `payload` field, or it is null
    NoPayload,
    /// The selected row side (`before`/`after`) is null
    NullRow,
    /// Truncate operations are not projected
    Truncate,
    /// Operation code this synchronizer does not know
    UnknownOp(String),
}

/// Outcome of decoding one bus message
#[derive(Debug, Clone)]
pub enum Decoded {
    /// A change event to project
    Event(ChangeEvent),
    /// Zero-length payload; a log-compaction tombstone
    Tombstone,
    /// Nothing to project, acknowledge and move on
    Skip(SkipReason),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Deserialize)]
struct Payload {
    #[serde(default)]
    op: Option<String>,
    #[serde(default)]
    before: Option<Map<String, Value>>,
    #[serde(default)]
    after: Option<Map<String, Value>>,
    #[serde(default)]
    source: Option<Source>,
}

#[derive(Deserialize)]
struct Source {
    #[serde(default)]
    table: Option<String>,
}

/// Decode one raw message into a [`Decoded`] outcome
///
/// Malformed JSON, a missing `op`, or a missing `source.table` are decode
/// errors; they poison only the current message, never the loop.
pub fn decode(topic: &str, payload: &[u8]) -> Result<Decoded> {
    if payload.is_empty() {
        return Ok(Decoded::Tombstone);
    }

    let envelope: Envelope =
        serde_json::from_slice(payload).map_err(|e| SyncError::Decode {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;

    let Some(body) = envelope.payload else {
        return Ok(Decoded::Skip(SkipReason::NoPayload));
    };

    let op_code = body.op.ok_or_else(|| SyncError::Decode {
        topic: topic.to_string(),
        reason: "envelope payload has no 'op'".to_string(),
    })?;

    let op = match op_code.as_str() {
        "c" => ChangeOp::Create,
        "u" => ChangeOp::Update,
        "d" => ChangeOp::Delete,
        "r" => ChangeOp::Read,
        "t" => return Ok(Decoded::Skip(SkipReason::Truncate)),
        _ => return Ok(Decoded::Skip(SkipReason::UnknownOp(op_code))),
    };

    let table = body
        .source
        .and_then(|s| s.table)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SyncError::Decode {
            topic: topic.to_string(),
            reason: "envelope payload has no 'source.table'".to_string(),
        })?;

    let row = if op.is_delete() { body.before } else { body.after };
    let Some(row) = row else {
        return Ok(Decoded::Skip(SkipReason::NullRow));
    };

    Ok(Decoded::Event(ChangeEvent {
        op,
        table,
        row,
        topic: topic.to_string(),
    }))
}
