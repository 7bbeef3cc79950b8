// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Upload failures.

use std::io;

use crate::protocol::Position;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("image is {len} bytes, too short to hold a 2-byte load address header")]
    InsufficientData { len: usize },

    #[error("image of {len} bytes does not fit in the 32-bit address space")]
    ImageTooLarge { len: usize },

    #[error("failed to send chunk at {at}: {source}")]
    Write {
        at: Position,
        #[source]
        source: io::Error,
    },

    #[error("failed to read from bridge after chunk at {at}: {source}")]
    Read {
        at: Position,
        #[source]
        source: io::Error,
    },

    #[error("timed out waiting for ack of chunk at {at}")]
    AckTimeout { at: Position },

    #[error(
        "bridge closed the connection before acking chunk at {at} (last acked: {})",
        last_acked_text(.last_acked)
    )]
    Closed {
        at: Position,
        last_acked: Option<u32>,
    },

    #[error("failed to write bridge output: {0}")]
    Sink(#[source] io::Error),
}

impl UploadError {
    /// Chunk in flight when the failure occurred, if any.
    pub fn position(&self) -> Option<Position> {
        match self {
            UploadError::Write { at, .. }
            | UploadError::Read { at, .. }
            | UploadError::AckTimeout { at }
            | UploadError::Closed { at, .. } => Some(*at),
            _ => None,
        }
    }
}

fn last_acked_text(last_acked: &Option<u32>) -> String {
    match last_acked {
        Some(address) => format!("0x{:x}", address),
        None => "none".to_string(),
    }
}

pub(crate) fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
