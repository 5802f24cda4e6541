//! # edgequake-rollscan
//!
//! Extract validated voter records from scanned electoral-roll PDFs using
//! Vision Language Models (VLMs).
//!
//! Electoral rolls are published as image-only PDFs: a grid of ~30 voter
//! boxes per page, often in Devanagari, sometimes thousands of pages long.
//! This crate rasterises each page, has a VLM transcribe the boxes into
//! JSON, then normalises and validates every field with a small rule
//! grammar, reporting problems as data rather than failing the run.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Page loop  strictly sequential; per page:
//!  │                  render @220 DPI → recognise (retry/backoff)
//!  │                  └─ < 15 records? render @300 DPI → recognise, keep the larger
//!  ├─ 3. Aggregate  running record list + de-duplicated live preview + progress
//!  ├─ 4. Normalise  rule table per field; failures become Issues
//!  └─ 5. Dedupe     first record per voter id wins
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_rollscan::{extract, CancelToken, RollConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / GEMINI_API_KEY / …
//!     let config = RollConfig::default();
//!     let output = extract("roll.pdf", &config, &CancelToken::new()).await?;
//!     for issue in &output.issues {
//!         eprintln!("{issue}");
//!     }
//!     print!("{}", output.to_csv());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `rollscan` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-rollscan = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod aggregate;
pub mod cancel;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use aggregate::{Aggregated, RunAggregator};
pub use cancel::CancelToken;
pub use config::{DedupPolicy, PageSelection, RollConfig, RollConfigBuilder};
pub use dedupe::{dedupe, dedupe_with};
pub use error::{PageError, RecognitionError, RollError};
pub use extract::{
    extract, extract_from_bytes, extract_sync, extract_to_file, extract_with, inspect,
    OutputFormat,
};
pub use normalize::{normalize, normalize_all};
pub use output::{DocumentMetadata, PageSummary, RollOutput, RunStats};
pub use pipeline::page::{PageOutcome, PageProcessor};
pub use pipeline::recognize::{RecognitionClient, VisionRecognizer};
pub use pipeline::render::{PageRenderer, PdfiumRenderer, RenderedPage};
pub use pipeline::retry::{FailureClass, FailureClassifier, MessageClassifier, RetryPolicy, RetryingInvoker};
pub use progress::{NoopProgress, ProgressCallback, ProgressSink};
pub use record::{Field, Issue, NormalizedRecord, RawRecord};
