//! Pipeline stages for roll extraction.
//!
//! Each submodule implements one step; the trait seams ([`render::PageRenderer`],
//! [`recognize::RecognitionClient`], [`retry::FailureClassifier`]) let tests
//! and callers swap implementations without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ recognize ──▶ parse
//! (URL/path) (pdfium)  (PNG/b64)   (VLM)      (JSON → RawRecord)
//!              ▲                     ▲
//!              └──── page ───────────┤ escalates DPI on low yield
//!                                  retry  classifies failures, backs off
//! ```
//!
//! 1. [`input`]     — canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]    — rasterise one page; `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]    — grayscale PNG, base64-wrapped for the multimodal request
//! 4. [`recognize`] — one vision-model call per page image
//! 5. [`parse`]     — tolerant JSON extraction from the model's reply
//! 6. [`retry`]     — bounded, cancellable retry with backoff
//! 7. [`page`]      — render, recognise, and re-render at higher DPI when a page under-yields

pub mod encode;
pub mod input;
pub mod page;
pub mod parse;
pub mod recognize;
pub mod render;
pub mod retry;
