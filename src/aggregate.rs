//! Incremental aggregation across a run's pages.
//!
//! [`RunAggregator`] owns everything that accumulates during one run: the
//! raw record list, the live preview and its seen-key set, and per-page
//! summaries. A fresh aggregator is built per run, so repeated or concurrent
//! runs never share state.
//!
//! The preview is a best-effort, de-duplicated view for progress displays.
//! It keys records by voter id, or by `name|parent|age|gender` when the id
//! is unreadable, which makes it looser than [`crate::dedupe`].

use crate::cancel::CancelToken;
use crate::dedupe::preview_key;
use crate::output::PageSummary;
use crate::pipeline::page::{PageOutcome, PageProcessor};
use crate::pipeline::retry::FailureClassifier;
use crate::progress::{NoopProgress, ProgressCallback};
use crate::record::RawRecord;
use crate::stream::page_stream;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the aggregation phase hands to normalisation.
#[derive(Debug, Clone, Default)]
pub struct Aggregated {
    /// Every raw record, in page order, before normalisation.
    pub records: Vec<RawRecord>,
    pub preview: Vec<RawRecord>,
    pub pages: Vec<PageSummary>,
    pub cancelled: bool,
}

pub struct RunAggregator {
    total_pages: usize,
    live_preview: bool,
    progress: ProgressCallback,
    seen: HashSet<String>,
    records: Vec<RawRecord>,
    preview: Vec<RawRecord>,
    pages: Vec<PageSummary>,
    processed: usize,
}

impl RunAggregator {
    pub fn new(total_pages: usize, live_preview: bool, progress: Option<ProgressCallback>) -> Self {
        Self {
            total_pages,
            live_preview,
            progress: progress.unwrap_or_else(|| Arc::new(NoopProgress)),
            seen: HashSet::new(),
            records: Vec::new(),
            preview: Vec::new(),
            pages: Vec::with_capacity(total_pages),
            processed: 0,
        }
    }

    /// Drive `processor` over `indices` in order, stopping between pages
    /// once `cancel` fires.
    pub async fn run<K: FailureClassifier>(
        mut self,
        processor: &PageProcessor<K>,
        indices: &[usize],
        cancel: &CancelToken,
    ) -> Aggregated {
        self.progress.on_run_start(self.total_pages);

        let mut pages = page_stream(
            processor,
            indices.to_vec(),
            cancel.clone(),
            Some(Arc::clone(&self.progress)),
        );
        while let Some(outcome) = pages.next().await {
            self.absorb(outcome);
        }
        drop(pages);

        let cancelled = cancel.is_cancelled();
        if cancelled {
            info!(
                processed = self.processed,
                total = self.total_pages,
                "Run cancelled, keeping records gathered so far"
            );
        }
        self.finish(cancelled)
    }

    /// Fold one page into the run.
    pub fn absorb(&mut self, outcome: PageOutcome) {
        let summary = PageSummary::from(&outcome);
        let page_num = outcome.page_num;
        let count = outcome.records.len();
        // A page cancelled during its fallback still keeps the primary records.
        let interrupted = outcome.is_cancelled() && count == 0;

        match outcome.error {
            Some(ref e) if e.is_cancelled() => {
                debug!(page = page_num, kept = count, "Page interrupted by cancellation");
                if !interrupted {
                    self.processed += 1;
                }
            }
            Some(ref e) => {
                self.processed += 1;
                warn!(page = page_num, error = %e, "Page failed");
                self.progress
                    .on_page_error(page_num, self.total_pages, &e.to_string());
            }
            None => self.processed += 1,
        }

        if self.live_preview {
            let added: Vec<RawRecord> = outcome
                .records
                .iter()
                .filter(|r| self.seen.insert(preview_key(r)))
                .cloned()
                .collect();
            if !added.is_empty() {
                self.preview.extend_from_slice(&added);
                self.progress.on_preview_update(&added, self.preview.len());
            }
        }

        self.records.extend(outcome.records);
        self.pages.push(summary);

        if !interrupted {
            self.progress
                .on_page_complete(self.processed, self.total_pages, count);
        }
        debug!(
            page = page_num,
            records = count,
            total_records = self.records.len(),
            preview = self.preview.len(),
            "Page aggregated"
        );
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn preview(&self) -> &[RawRecord] {
        &self.preview
    }

    pub fn pages_processed(&self) -> usize {
        self.processed
    }

    pub fn finish(self, cancelled: bool) -> Aggregated {
        self.progress
            .on_run_complete(self.total_pages, self.processed, cancelled);
        Aggregated {
            records: self.records,
            preview: self.preview,
            pages: self.pages,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageError;
    use crate::progress::ProgressSink;
    use std::sync::Mutex;

    fn rec(voter_id: &str, name: &str) -> RawRecord {
        RawRecord {
            voter_id: voter_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    fn outcome(page_num: usize, records: Vec<RawRecord>, error: Option<PageError>) -> PageOutcome {
        PageOutcome {
            page_num,
            records,
            dpi: Some(220),
            used_fallback: false,
            error,
            duration_ms: 1,
        }
    }

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl ProgressSink for Log {
        fn on_page_complete(&self, done: usize, total: usize, records: usize) {
            self.0.lock().unwrap().push(format!("complete {done}/{total} +{records}"));
        }

        fn on_page_error(&self, page: usize, _total: usize, _error: &str) {
            self.0.lock().unwrap().push(format!("error {page}"));
        }

        fn on_preview_update(&self, added: &[RawRecord], total: usize) {
            self.0.lock().unwrap().push(format!("preview +{} ={total}", added.len()));
        }
    }

    #[test]
    fn preview_dedups_by_voter_id_then_composite() {
        let mut agg = RunAggregator::new(2, true, None);
        agg.absorb(outcome(1, vec![rec("abc-1", "A"), rec("", "B")], None));
        agg.absorb(outcome(2, vec![rec("ABC1", "A again"), rec("", "B"), rec("", "C")], None));
        assert_eq!(agg.records().len(), 5);
        let names: Vec<&str> = agg.preview().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn preview_disabled_keeps_it_empty() {
        let mut agg = RunAggregator::new(1, false, None);
        agg.absorb(outcome(1, vec![rec("X", "A")], None));
        assert!(agg.preview().is_empty());
        assert_eq!(agg.records().len(), 1);
    }

    #[test]
    fn separate_runs_do_not_share_seen_keys() {
        let mut first = RunAggregator::new(1, true, None);
        first.absorb(outcome(1, vec![rec("X", "A")], None));
        let mut second = RunAggregator::new(1, true, None);
        second.absorb(outcome(1, vec![rec("X", "A")], None));
        assert_eq!(second.preview().len(), 1);
    }

    #[test]
    fn progress_reports_every_page() {
        let log = Arc::new(Log::default());
        let mut agg = RunAggregator::new(3, true, Some(log.clone()));
        agg.absorb(outcome(1, vec![rec("X", "A")], None));
        agg.absorb(outcome(
            2,
            Vec::new(),
            Some(PageError::RecognitionFailed {
                page: 2,
                detail: "429".into(),
            }),
        ));
        agg.absorb(outcome(3, vec![rec("X", "A")], None));
        let result = agg.finish(false);
        assert_eq!(
            *log.0.lock().unwrap(),
            vec![
                "preview +1 =1",
                "complete 1/3 +1",
                "error 2",
                "complete 2/3 +0",
                "complete 3/3 +1",
            ]
        );
        assert_eq!(result.pages.len(), 3);
        assert!(!result.cancelled);
    }

    #[test]
    fn cancelled_page_is_not_reported_as_error_or_completion() {
        let log = Arc::new(Log::default());
        let mut agg = RunAggregator::new(2, false, Some(log.clone()));
        agg.absorb(outcome(1, Vec::new(), Some(PageError::Cancelled { page: 1 })));
        assert!(log.0.lock().unwrap().is_empty());
        assert_eq!(agg.pages_processed(), 0);
    }

    #[test]
    fn cancelled_page_with_kept_records_counts_as_processed() {
        let log = Arc::new(Log::default());
        let mut agg = RunAggregator::new(2, true, Some(log.clone()));
        agg.absorb(outcome(
            1,
            vec![rec("X1", "A"), rec("X2", "B")],
            Some(PageError::Cancelled { page: 1 }),
        ));
        assert_eq!(
            *log.0.lock().unwrap(),
            vec!["preview +2 =2", "complete 1/2 +2"]
        );
        assert_eq!(agg.pages_processed(), 1);
        assert_eq!(agg.records().len(), 2);
    }
}
