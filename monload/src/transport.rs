// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! TCP transport to the serial bridge.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::debug;

use monload_common::Connection;

/// Connection to the bridge. Closed when dropped.
pub struct Transport {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Transport {
    /// Connect to `host:port`, trying each resolved address in turn.
    ///
    /// `ack_timeout` bounds every read on the connection.
    pub fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        ack_timeout: Duration,
    ) -> Result<Self> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve {}:{}", host, port))?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            debug!(%addr, "connecting");
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(stream) => return Self::from_stream(stream, addr, ack_timeout),
                Err(e) => last_err = Some(e),
            }
        }

        match last_err {
            Some(e) => Err(e).with_context(|| format!("Failed to connect to {}:{}", host, port)),
            None => bail!("{}:{} did not resolve to any address", host, port),
        }
    }

    fn from_stream(stream: TcpStream, peer: SocketAddr, ack_timeout: Duration) -> Result<Self> {
        // A zero timeout would mean "block forever" to set_read_timeout
        let read_timeout = (!ack_timeout.is_zero()).then_some(ack_timeout);
        stream
            .set_read_timeout(read_timeout)
            .context("Failed to set read timeout")?;
        // Lines are small and each waits on an ack; don't let Nagle hold them
        stream.set_nodelay(true).context("Failed to set TCP_NODELAY")?;
        Ok(Self { stream, peer })
    }

    /// Get the peer address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Connection for Transport {
    fn set_poll_interval(&mut self, interval: Duration) -> io::Result<()> {
        self.stream.set_poll_interval(interval)
    }
}
