// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use monload_common::{CancelToken, LoadPlan, Upload};

use crate::cli::Cli;
use crate::transport::Transport;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn read_image(file: &Path) -> Result<Vec<u8>> {
    let image = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    info!(file = %file.display(), len = image.len(), "image loaded");
    Ok(image)
}

fn describe_plan(plan: &LoadPlan) -> &'static str {
    if plan.skip_bytes > 0 {
        "from image header"
    } else {
        "explicit"
    }
}

/// Upload the image to the bridge and show its output afterwards.
pub fn upload(cli: &Cli) -> Result<()> {
    let image = read_image(&cli.file)?;
    println!("Read {} bytes.", image.len());

    let mut upload = Upload::new(&image, cli.load_address)
        .with_context(|| format!("Cannot upload {}", cli.file.display()))?;
    let plan = upload.plan();
    let payload_len = upload.payload_len();
    let crc32 = CRC32.checksum(&image[plan.skip_bytes..]);

    println!(
        "Payload: {} bytes, {} chunks, CRC32: 0x{:08x}",
        payload_len,
        upload.chunks().len(),
        crc32
    );
    println!(
        "Load:    0x{:x} ({})",
        plan.base_address,
        describe_plan(&plan)
    );
    println!("Bridge:  {}:{}", cli.host, cli.port);
    println!();

    let mut transport = Transport::connect(
        &cli.host,
        cli.port,
        cli.connect_timeout(),
        cli.ack_timeout(),
    )?;
    info!(peer = %transport.peer(), "connected");

    let pb = if cli.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(payload_len as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let sent = match upload.transmit(&mut transport, |chunk, _| {
        pb.inc(chunk.payload.len() as u64)
    }) {
        Ok(sent) => sent,
        Err(e) => {
            pb.abandon();
            return Err(e).context("Upload failed");
        }
    };
    pb.finish_with_message("Upload complete");

    println!("Uploaded {} bytes at 0x{:x}", sent, plan.base_address);

    let drained = if cli.no_drain {
        0
    } else {
        let cancel = cli
            .drain_limit()
            .map_or_else(CancelToken::new, CancelToken::with_deadline);
        println!("--- bridge output ---");
        let stdout = io::stdout();
        let mut out = stdout.lock();
        let n = upload
            .drain(&mut transport, &cancel, &mut out)
            .context("Failed while reading bridge output")?;
        writeln!(out)?;
        n
    };

    let summary = upload.finish(drained);
    info!(
        chunks = summary.chunks,
        bytes = summary.bytes_sent,
        drained = summary.bytes_drained,
        "upload finished"
    );

    Ok(())
}

/// Print the command lines an upload would send, without connecting.
pub fn dry_run(file: &Path, load_address: Option<u32>) -> Result<()> {
    let image = read_image(file)?;
    let upload = Upload::new(&image, load_address)
        .with_context(|| format!("Cannot upload {}", file.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_commands(&upload, &mut out)?;
    Ok(())
}

fn write_commands(upload: &Upload<'_>, out: &mut impl Write) -> io::Result<usize> {
    let mut count = 0;
    for chunk in upload.chunks() {
        out.write_all(chunk.command().as_bytes())?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_commands_header_image() {
        let image = [0x00, 0x10, 0xaa, 0xbb, 0xcc];
        let upload = Upload::new(&image, None).unwrap();
        let mut out = Vec::new();
        assert_eq!(write_commands(&upload, &mut out).unwrap(), 1);
        assert_eq!(out, b"s1000 aa bb cc\n");
    }

    #[test]
    fn test_write_commands_explicit_address() {
        let image = [0u8; 20];
        let upload = Upload::new(&image, Some(0x2000)).unwrap();
        let mut out = Vec::new();
        assert_eq!(write_commands(&upload, &mut out).unwrap(), 2);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "s2000 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0");
        assert_eq!(lines[1], "s2010 0 0 0 0");
    }

    #[test]
    fn test_describe_plan() {
        let header = LoadPlan {
            base_address: 0x801,
            skip_bytes: 2,
        };
        let explicit = LoadPlan {
            base_address: 0x801,
            skip_bytes: 0,
        };
        assert_eq!(describe_plan(&header), "from image header");
        assert_eq!(describe_plan(&explicit), "explicit");
    }

    #[test]
    fn test_read_image_missing_file() {
        let err = read_image(Path::new("/nonexistent/monload-image.bin")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
