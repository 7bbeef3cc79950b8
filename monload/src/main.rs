// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Memory image upload tool for TCP serial bridges.
//!
//! Usage:
//!   monload 192.168.1.20 4510 program.prg
//!   monload 192.168.1.20 4510 payload.bin 2000
//!   monload --dry-run 0 0 payload.bin 2000

mod cli;
mod commands;
mod transport;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    cli::run(args)
}
