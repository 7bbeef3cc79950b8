// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Core of the memory image uploader.
//!
//! - [`protocol`]: load address resolution, chunking and command rendering
//! - [`session`]: paced transmission over a bridge connection and the
//!   trailing output drain
//! - [`cancel`]: cancellation token bounding the drain
//!
//! Everything here is generic over `std::io::Read + Write`, so it runs the
//! same against a `TcpStream` or an in-memory test double.

pub mod cancel;
pub mod error;
pub mod protocol;
pub mod session;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use error::UploadError;
pub use protocol::{chunks, parse_load_address, render_command, resolve};
pub use protocol::{Chunk, Chunks, CommandLine, LoadPlan, Position};
pub use protocol::{CHUNK_SIZE, HEADER_SIZE, MAX_LINE_LEN};
pub use session::{drain, Connection, Transmitter, Upload, UploadState, UploadSummary};
