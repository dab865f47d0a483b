//! Single-file download.

use std::fs::{self, File};
use std::io::{Read, Write};

use ohsync_core::{size::format_size, transfer_io_err, RemoteError, TransferError};

use crate::descriptors::DownloadDescriptor;

const CHUNK_SIZE: usize = 8 * 1024;

/// An open response body.
pub struct FetchResponse {
    /// `Content-Length`, when the server sent one.
    pub size: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

/// Opens URLs for reading. Implemented over HTTP in `ohsync-remote`.
pub trait Fetcher: Send + Sync {
    fn open(&self, url: &str) -> Result<FetchResponse, RemoteError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded { bytes: u64 },
    /// An existing file of a different size was removed and fetched again.
    Replaced { bytes: u64 },
    /// The target already exists with the remote size.
    AlreadyPresent,
    TooLarge { size: u64 },
}

impl DownloadOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Downloaded { .. } => "downloaded",
            Self::Replaced { .. } => "replaced",
            Self::AlreadyPresent => "present",
            Self::TooLarge { .. } => "too large",
        }
    }
}

/// Fetch one file to `descriptor.target`.
///
/// Files over `max_bytes` are skipped, as are targets that already have the
/// remote size. A target of any other size is replaced.
pub fn download_file(
    fetcher: &dyn Fetcher,
    descriptor: &DownloadDescriptor,
    max_bytes: u64,
) -> Result<DownloadOutcome, TransferError> {
    let response = fetcher.open(&descriptor.url)?;
    let size = response.size.or(descriptor.expected_size);
    let target = &descriptor.target;

    if let Some(size) = size {
        if size > max_bytes {
            tracing::info!(
                "skipping {}, {} > {}",
                descriptor.label,
                format_size(size),
                format_size(max_bytes)
            );
            return Ok(DownloadOutcome::TooLarge { size });
        }
    }

    let mut replacing = false;
    match fs::metadata(target) {
        Ok(meta) if Some(meta.len()) == size => {
            tracing::info!("skipping {}, exists and is the right size", descriptor.label);
            return Ok(DownloadOutcome::AlreadyPresent);
        }
        Ok(_) => {
            tracing::info!("removing {}, exists and is the wrong size", descriptor.label);
            fs::remove_file(target).map_err(|e| transfer_io_err(target, e))?;
            replacing = true;
        }
        Err(_) => {}
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| transfer_io_err(parent, e))?;
    }
    match size {
        Some(size) => tracing::info!("downloading {} ({})", descriptor.label, format_size(size)),
        None => tracing::info!("downloading {}", descriptor.label),
    }

    let mut body = response.body;
    let mut out = File::create(target).map_err(|e| transfer_io_err(target, e))?;
    let mut buf = [0u8; CHUNK_SIZE];
    let mut bytes = 0u64;
    loop {
        let n = body
            .read(&mut buf)
            .map_err(|e| TransferError::Network(e.to_string()))?;
        if n == 0 {
            break;
        }
        bytes += n as u64;
        // Without a known size the limit is enforced on the stream itself.
        if size.is_none() && bytes > max_bytes {
            drop(out);
            fs::remove_file(target).map_err(|e| transfer_io_err(target, e))?;
            tracing::info!(
                "skipping {}, over {} while streaming",
                descriptor.label,
                format_size(max_bytes)
            );
            return Ok(DownloadOutcome::TooLarge { size: bytes });
        }
        out.write_all(&buf[..n])
            .map_err(|e| transfer_io_err(target, e))?;
    }
    out.flush().map_err(|e| transfer_io_err(target, e))?;
    tracing::info!("downloaded {}", descriptor.label);

    Ok(if replacing {
        DownloadOutcome::Replaced { bytes }
    } else {
        DownloadOutcome::Downloaded { bytes }
    })
}
