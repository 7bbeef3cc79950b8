// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Upload session: paced transmission of command lines and the trailing drain.
//!
//! The bridge has room for one command at a time. After each line the host
//! reads exactly one byte back before sending the next. The byte's value
//! carries no meaning here; only its arrival matters.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use tracing::{debug, info, trace};

use crate::cancel::CancelToken;
use crate::error::{is_timeout, UploadError};
use crate::protocol::{self, Chunk, Chunks, LoadPlan, Position};

/// Read timeout used while draining, so cancellation is noticed promptly.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Duplex byte stream to the bridge.
pub trait Connection: Read + Write {
    /// Bound how long one read may block during the drain phase.
    ///
    /// Streams that never block (in-memory buffers) can keep the default.
    fn set_poll_interval(&mut self, _interval: Duration) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for TcpStream {
    fn set_poll_interval(&mut self, interval: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(interval))
    }
}

impl<C: Connection + ?Sized> Connection for &mut C {
    fn set_poll_interval(&mut self, interval: Duration) -> io::Result<()> {
        (**self).set_poll_interval(interval)
    }
}

// --- Transmitter ---

/// Sends chunks one at a time, waiting for one ack byte after each.
pub struct Transmitter<'c, C: ?Sized> {
    conn: &'c mut C,
    last_acked: Option<u32>,
    bytes_sent: u64,
}

impl<'c, C: Read + Write + ?Sized> Transmitter<'c, C> {
    pub fn new(conn: &'c mut C) -> Self {
        Self {
            conn,
            last_acked: None,
            bytes_sent: 0,
        }
    }

    /// Address of the most recent chunk the bridge acknowledged.
    pub fn last_acked(&self) -> Option<u32> {
        self.last_acked
    }

    /// Payload bytes acknowledged so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Send one chunk and wait for its ack. Returns the ack byte.
    pub fn send_chunk(&mut self, chunk: &Chunk<'_>) -> Result<u8, UploadError> {
        let at = chunk.position();
        let line = chunk.command();
        trace!(address = chunk.address, len = chunk.payload.len(), "sending chunk");

        self.conn
            .write_all(line.as_bytes())
            .and_then(|()| self.conn.flush())
            .map_err(|source| UploadError::Write { at, source })?;

        let ack = self.read_ack(at)?;
        trace!(address = chunk.address, ack, "chunk acked");

        self.last_acked = Some(chunk.address);
        self.bytes_sent += chunk.payload.len() as u64;
        Ok(ack)
    }

    /// Send every chunk in order. `on_ack` sees each chunk once it is acked.
    ///
    /// Returns the number of payload bytes sent.
    pub fn transmit<'a, I, F>(&mut self, chunks: I, mut on_ack: F) -> Result<u64, UploadError>
    where
        I: IntoIterator<Item = Chunk<'a>>,
        F: FnMut(&Chunk<'a>, u8),
    {
        for chunk in chunks {
            let ack = self.send_chunk(&chunk)?;
            on_ack(&chunk, ack);
        }
        Ok(self.bytes_sent)
    }

    fn read_ack(&mut self, at: Position) -> Result<u8, UploadError> {
        let mut byte = [0u8; 1];
        loop {
            match self.conn.read(&mut byte) {
                Ok(0) => {
                    return Err(UploadError::Closed {
                        at,
                        last_acked: self.last_acked,
                    })
                }
                Ok(_) => return Ok(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => return Err(UploadError::AckTimeout { at }),
                Err(source) => return Err(UploadError::Read { at, source }),
            }
        }
    }
}

// --- AckDrain ---

/// Copy whatever the bridge sends after the upload into `sink`.
///
/// Stops cleanly when the bridge closes the connection or `cancel` fires.
/// `at` is the last chunk sent and is used only for error reporting.
/// Returns the number of bytes drained.
pub fn drain<C, W>(
    conn: &mut C,
    cancel: &CancelToken,
    sink: &mut W,
    at: Position,
) -> Result<u64, UploadError>
where
    C: Connection + ?Sized,
    W: Write + ?Sized,
{
    conn.set_poll_interval(DRAIN_POLL_INTERVAL)
        .map_err(|source| UploadError::Read { at, source })?;

    let mut buf = [0u8; 256];
    let mut total = 0u64;
    loop {
        if cancel.is_cancelled() {
            info!(bytes = total, "drain cancelled");
            return Ok(total);
        }

        match conn.read(&mut buf) {
            Ok(0) => {
                debug!(bytes = total, "bridge closed connection");
                return Ok(total);
            }
            Ok(n) => {
                sink.write_all(&buf[..n])
                    .and_then(|()| sink.flush())
                    .map_err(UploadError::Sink)?;
                total += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted || is_timeout(&e) => continue,
            Err(source) => return Err(UploadError::Read { at, source }),
        }
    }
}

// --- Upload ---

/// Phase of a single upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Resolving,
    Encoding,
    Transmitting,
    Draining,
    Done,
    Failed,
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub plan: LoadPlan,
    pub chunks: usize,
    pub bytes_sent: u64,
    pub bytes_drained: u64,
}

/// One upload of one image.
///
/// Holds only borrowed, immutable image data; each attempt starts from a
/// fresh `Upload`.
pub struct Upload<'a> {
    image: &'a [u8],
    plan: LoadPlan,
    state: UploadState,
    chunks_sent: usize,
    bytes_sent: u64,
    last: Option<Position>,
}

impl<'a> Upload<'a> {
    /// Resolve the load address for `image`.
    pub fn new(image: &'a [u8], explicit_address: Option<u32>) -> Result<Self, UploadError> {
        debug!(state = ?UploadState::Resolving, len = image.len(), "upload");
        let plan = protocol::resolve(image, explicit_address).inspect_err(|e| {
            debug!(state = ?UploadState::Failed, error = %e, "upload");
        })?;
        debug!(
            state = ?UploadState::Encoding,
            base_address = plan.base_address,
            skip_bytes = plan.skip_bytes,
            "upload"
        );

        Ok(Self {
            image,
            plan,
            state: UploadState::Encoding,
            chunks_sent: 0,
            bytes_sent: 0,
            last: None,
        })
    }

    pub fn plan(&self) -> LoadPlan {
        self.plan
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Payload bytes this upload will send.
    pub fn payload_len(&self) -> usize {
        self.plan.payload_len(self.image)
    }

    pub fn chunks(&self) -> Chunks<'a> {
        protocol::chunks(self.image, self.plan)
    }

    /// Send every chunk, waiting for one ack byte after each.
    pub fn transmit<C, F>(&mut self, conn: &mut C, mut on_ack: F) -> Result<u64, UploadError>
    where
        C: Read + Write + ?Sized,
        F: FnMut(&Chunk<'a>, u8),
    {
        debug_assert_eq!(self.state, UploadState::Encoding);
        self.enter(UploadState::Transmitting);

        let mut tx = Transmitter::new(conn);
        let chunks = self.chunks();
        let last = &mut self.last;
        let count = &mut self.chunks_sent;
        let result = tx.transmit(chunks, |chunk, ack| {
            *last = Some(chunk.position());
            *count += 1;
            on_ack(chunk, ack);
        });
        self.bytes_sent = tx.bytes_sent();

        match result {
            Ok(sent) => {
                info!(chunks = self.chunks_sent, bytes = sent, "image transmitted");
                Ok(sent)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Consume trailing bridge output until it closes or `cancel` fires.
    pub fn drain<C, W>(
        &mut self,
        conn: &mut C,
        cancel: &CancelToken,
        sink: &mut W,
    ) -> Result<u64, UploadError>
    where
        C: Connection + ?Sized,
        W: Write + ?Sized,
    {
        debug_assert_eq!(self.state, UploadState::Transmitting);
        self.enter(UploadState::Draining);

        let at = self.last.unwrap_or_else(|| self.plan.start());
        match drain(conn, cancel, sink, at) {
            Ok(n) => {
                self.enter(UploadState::Done);
                Ok(n)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Finish without draining.
    pub fn finish(mut self, bytes_drained: u64) -> UploadSummary {
        if self.state != UploadState::Done {
            self.enter(UploadState::Done);
        }
        UploadSummary {
            plan: self.plan,
            chunks: self.chunks_sent,
            bytes_sent: self.bytes_sent,
            bytes_drained,
        }
    }

    /// Run the whole upload over `conn`, which is closed when this returns.
    pub fn run<C, W, F>(
        mut self,
        mut conn: C,
        cancel: &CancelToken,
        sink: &mut W,
        on_ack: F,
    ) -> Result<UploadSummary, UploadError>
    where
        C: Connection,
        W: Write + ?Sized,
        F: FnMut(&Chunk<'a>, u8),
    {
        self.transmit(&mut conn, on_ack)?;
        let drained = self.drain(&mut conn, cancel, sink)?;
        Ok(self.finish(drained))
    }

    fn enter(&mut self, next: UploadState) {
        debug!(from = ?self.state, to = ?next, "upload");
        self.state = next;
    }

    fn fail(&mut self, e: UploadError) -> UploadError {
        debug!(from = ?self.state, error = %e, "upload failed");
        self.state = UploadState::Failed;
        e
    }
}
