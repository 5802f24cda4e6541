//! Input resolution: turn a user-supplied path or URL into a local roll file.
//!
//! pdfium opens documents by path, so URL inputs are downloaded into a
//! `TempDir` that lives as long as the [`ResolvedInput`]. Every route checks
//! the `%PDF` magic before returning so a scanned JPEG handed in by mistake
//! fails with [`RollError::NotAPdf`] rather than a pdfium error code.

use crate::error::RollError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// The resolved input: either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// The `TempDir` is held so the file survives until processing ends.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Returns the first four bytes when they are not the PDF magic.
///
/// Inputs shorter than four bytes are left for pdfium to reject.
pub fn bad_magic(head: &[u8]) -> Option<[u8; 4]> {
    if head.len() < 4 || &head[..4] == PDF_MAGIC {
        return None;
    }
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&head[..4]);
    Some(magic)
}

/// Resolve the input string to a local PDF path, downloading URLs.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, RollError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, RollError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(RollError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(RollError::PermissionDenied { path });
        }
        Err(_) => return Err(RollError::FileNotFound { path }),
    };

    let mut head = [0u8; 4];
    if file.read_exact(&mut head).is_ok() {
        if let Some(magic) = bad_magic(&head) {
            return Err(RollError::NotAPdf { path, magic });
        }
    }

    debug!(path = %path.display(), "Resolved local roll");
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, RollError> {
    info!(url, "Downloading roll");

    let failed = |reason: String| RollError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            RollError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let temp_dir = TempDir::new().map_err(|e| RollError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(filename_from_url(url));

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    if let Some(magic) = bad_magic(&bytes) {
        return Err(RollError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| RollError::Internal(format!("Failed to write temp file: {e}")))?;

    info!(path = %file_path.display(), bytes = bytes.len(), "Downloaded roll");

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment when it looks like a file name, else `roll.pdf`.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "roll.pdf".to_string())
}
