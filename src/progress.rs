//! Progress sink for per-page extraction events.
//!
//! Inject an [`Arc<dyn ProgressSink>`] via
//! [`crate::config::RollConfigBuilder::progress_callback`] to receive
//! events as the aggregator works through the roll. Pages are processed one
//! at a time, so events arrive in page order and never concurrently for one
//! run; implementations still need `Send + Sync` because the run itself may
//! live on any tokio worker.
//!
//! # Example
//!
//! ```rust
//! use edgequake_rollscan::{ProgressSink, RollConfig};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ProgressSink for Printer {
//!     fn on_page_complete(&self, pages_processed: usize, total_pages: usize, records: usize) {
//!         eprintln!("{pages_processed}/{total_pages} pages, +{records} records");
//!     }
//! }
//!
//! let config = RollConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::record::RawRecord;
use std::sync::Arc;

/// Called by the aggregator as it processes each page.
///
/// All methods default to no-ops so callers only override what they need.
pub trait ProgressSink: Send + Sync {
    /// Called once before the first page, with the number of selected pages.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page is rendered.
    ///
    /// * `page_num` — 1-indexed page number in the document
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called after every page, successful or not.
    ///
    /// * `pages_processed` — pages finished so far in this run
    /// * `total_pages`     — pages selected for this run
    /// * `records`         — raw records the page contributed
    fn on_page_complete(&self, pages_processed: usize, total_pages: usize, records: usize) {
        let _ = (pages_processed, total_pages, records);
    }

    /// Called when a page contributed nothing because recognition or
    /// rendering failed. Not called for cancellation.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called with records that are new to the live preview.
    ///
    /// * `added`         — records first seen on this page
    /// * `preview_total` — preview size after adding them
    fn on_preview_update(&self, added: &[RawRecord], preview_total: usize) {
        let _ = (added, preview_total);
    }

    /// Called once after the last page (or after cancellation).
    fn on_run_complete(&self, total_pages: usize, pages_processed: usize, cancelled: bool) {
        let _ = (total_pages, pages_processed, cancelled);
    }
}

/// A no-op sink, used when no callback is configured.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {}

/// Convenience alias matching the type stored in [`crate::config::RollConfig`].
pub type ProgressCallback = Arc<dyn ProgressSink>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        completes: AtomicUsize,
        errors: AtomicUsize,
        preview: AtomicUsize,
    }

    impl ProgressSink for Tracking {
        fn on_page_complete(&self, _done: usize, _total: usize, _records: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_preview_update(&self, _added: &[RawRecord], preview_total: usize) {
            self.preview.store(preview_total, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_sink_does_not_panic() {
        let sink = NoopProgress;
        sink.on_run_start(3);
        sink.on_page_start(1, 3);
        sink.on_page_complete(1, 3, 30);
        sink.on_page_error(2, 3, "boom");
        sink.on_preview_update(&[], 0);
        sink.on_run_complete(3, 3, false);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let t = Tracking::default();
        t.on_page_complete(1, 2, 10);
        t.on_page_error(2, 2, "429");
        t.on_page_complete(2, 2, 0);
        t.on_preview_update(&[RawRecord::default()], 11);
        assert_eq!(t.completes.load(Ordering::SeqCst), 2);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
        assert_eq!(t.preview.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn arc_dyn_sink_works() {
        let sink: ProgressCallback = Arc::new(NoopProgress);
        sink.on_run_start(10);
        sink.on_page_complete(1, 10, 5);
    }
}
