// Copyright 2025 Cowboy AI, LLC.

//! Error types for the CDC-to-graph synchronizer
//!
//! Every failure the consumption loop can observe is folded into
//! [`SyncError`], and each variant belongs to exactly one [`ErrorClass`]
//! which determines how the loop disposes of the current message.

use thiserror::Error;

/// Result type for synchronizer operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while projecting CDC events into the graph
#[derive(Debug, Error)]
pub enum SyncError {
    /// The message payload could not be decoded into a change event
    #[error("failed to decode message on topic '{topic}': {reason}")]
    Decode {
        /// Topic the message arrived on
        topic: String,
        /// What went wrong during decoding
        reason: String,
    },

    /// The table is declared but the row does not satisfy its rule
    #[error("cannot map row from table '{table}': {reason}")]
    Mapping {
        /// Source table of the offending row
        table: String,
        /// Which precondition the row violated
        reason: String,
    },

    /// The graph server rejected the query; redelivery cannot fix this
    #[error("graph rejected query: {0}")]
    Rejected(String),

    /// Transient failure; the message may succeed on redelivery
    #[error("transient failure: {0}")]
    Retriable(String),

    /// Configuration error detected at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// Unrecoverable failure; the loop must terminate
    #[error("fatal: {0}")]
    Fatal(String),
}

/// How the consumption loop disposes of the message that raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Drop the message and acknowledge it; redelivery cannot help
    Drop,
    /// Do not acknowledge; the message will be redelivered
    Retry,
    /// Terminate the loop and release resources
    Fatal,
}

impl SyncError {
    /// Classify this error for the consumption loop
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::Decode { .. } | SyncError::Mapping { .. } | SyncError::Rejected(_) => {
                ErrorClass::Drop
            }
            SyncError::Retriable(_) => ErrorClass::Retry,
            SyncError::Config(_) | SyncError::Fatal(_) => ErrorClass::Fatal,
        }
    }
}
