//! Error types for the edgequake-rollscan library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`RollError`] — **Fatal**: the run cannot proceed at all (the roll
//!   cannot be opened, wrong password, provider not configured). Returned as
//!   `Err(RollError)` from the top-level `extract*` functions.
//!
//! * [`PageError`] — **Non-fatal**: a single page contributed nothing
//!   (render glitch, recognition exhausted its retries). Stored inside
//!   [`crate::output::PageSummary`]; the run carries on with the next page.
//!
//! * [`RecognitionError`] — the outcome of one call to a
//!   [`crate::pipeline::recognize::RecognitionClient`]. Its display text is
//!   what [`crate::pipeline::retry::FailureClassifier`] inspects.
//!
//! Field-level problems are not errors at all: they are recorded as
//! [`crate::record::Issue`] values next to the normalised records.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-rollscan library.
#[derive(Debug, Error)]
pub enum RollError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Roll file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("No pages selected (document has {total} pages)")]
    NoPagesSelected { total: usize },

    /// Could not bind to a pdfium library.
    #[error("Failed to bind to pdfium library: {0}\nSet PDFIUM_DYNAMIC_LIB_PATH=/path/to/libpdfium or install pdfium system-wide.")]
    PdfiumBindingFailed(String),

    // ── Recognition errors ────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The page contributes zero records; the run continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation at {dpi} DPI failed: {detail}")]
    RenderFailed { page: usize, dpi: u32, detail: String },

    /// Recognition failed after the retry budget was spent (or on a
    /// permanent error, after a single attempt).
    #[error("Page {page}: recognition failed: {detail}")]
    RecognitionFailed { page: usize, detail: String },

    /// The run was cancelled while this page was in flight.
    #[error("Page {page}: cancelled")]
    Cancelled { page: usize },
}

impl PageError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PageError::Cancelled { .. })
    }
}

/// Failure of a single recognition request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionError {
    /// The caller aborted the request. Never retried.
    #[error("recognition cancelled")]
    Cancelled,

    /// No response within the per-call deadline.
    #[error("recognition request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The backend reported a failure; the message is kept verbatim.
    #[error("{0}")]
    Backend(String),

    /// The backend answered but the payload held no usable record list.
    #[error("malformed recognition response: {0}")]
    MalformedResponse(String),
}
