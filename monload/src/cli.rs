// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use monload_common::parse_load_address;

use crate::commands;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "monload", version)]
#[command(about = "Upload a memory image to a target through a TCP serial bridge")]
pub struct Cli {
    /// Bridge host name or IP address
    #[arg(value_name = "HOST")]
    pub host: String,

    /// Bridge TCP port
    #[arg(value_name = "PORT")]
    pub port: u16,

    /// Raw memory image
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Load address in hex. Without it, the first two bytes of the image are
    /// taken as a little-endian load address and not uploaded.
    #[arg(value_name = "LOAD_ADDRESS", value_parser = parse_load_address)]
    pub load_address: Option<u32>,

    /// Milliseconds to wait for each chunk's ack byte
    #[arg(long, value_name = "MS", env = "MONLOAD_ACK_TIMEOUT_MS", default_value = "5000")]
    pub ack_timeout: u64,

    /// Milliseconds to wait for the TCP connection
    #[arg(long, value_name = "MS", env = "MONLOAD_CONNECT_TIMEOUT_MS", default_value = "5000")]
    pub connect_timeout: u64,

    /// Seconds to keep showing bridge output after the upload (0 = until it disconnects)
    #[arg(long, value_name = "SECS", env = "MONLOAD_DRAIN_SECS", default_value = "0")]
    pub drain_timeout: u64,

    /// Disconnect as soon as the last chunk is acked
    #[arg(long)]
    pub no_drain: bool,

    /// Print the command lines instead of sending them
    #[arg(long)]
    pub dry_run: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    /// Drain limit, `None` when unbounded.
    pub fn drain_limit(&self) -> Option<Duration> {
        (self.drain_timeout > 0).then(|| Duration::from_secs(self.drain_timeout))
    }
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    if cli.dry_run {
        commands::dry_run(&cli.file, cli.load_address)
    } else {
        commands::upload(&cli)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("monload").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_positional_arguments() {
        let cli = parse(&["10.0.0.2", "4510", "image.prg"]);
        assert_eq!(cli.host, "10.0.0.2");
        assert_eq!(cli.port, 4510);
        assert_eq!(cli.file, PathBuf::from("image.prg"));
        assert_eq!(cli.load_address, None);
    }

    #[test]
    fn test_load_address_is_hex() {
        let cli = parse(&["bridge", "23", "a.bin", "2001"]);
        assert_eq!(cli.load_address, Some(0x2001));

        let cli = parse(&["bridge", "23", "a.bin", "0xC000"]);
        assert_eq!(cli.load_address, Some(0xc000));
    }

    #[test]
    fn test_bad_load_address_rejected() {
        assert!(Cli::try_parse_from(["monload", "bridge", "23", "a.bin", "xyz"]).is_err());
    }

    #[test]
    fn test_missing_file_rejected() {
        assert!(Cli::try_parse_from(["monload", "bridge", "23"]).is_err());
    }

    #[test]
    fn test_extra_argument_rejected() {
        assert!(Cli::try_parse_from(["monload", "h", "1", "f", "1000", "extra"]).is_err());
    }

    #[test]
    fn test_timeouts() {
        let cli = parse(&["h", "1", "f", "--ack-timeout", "250", "--drain-timeout", "3"]);
        assert_eq!(cli.ack_timeout(), Duration::from_millis(250));
        assert_eq!(cli.drain_limit(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_drain_unbounded_by_default() {
        let cli = parse(&["h", "1", "f"]);
        assert_eq!(cli.drain_limit(), None);
        assert!(!cli.no_drain);
    }
}
