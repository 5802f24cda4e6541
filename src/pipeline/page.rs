//! Single-page processing with resolution escalation.
//!
//! A page is rendered at the primary DPI and recognised. Roll pages are
//! dense and uniform (about 30 voter boxes), so a low record count is a
//! cheap, reliable sign that text was under-resolved: the page is then
//! rendered again at the fallback DPI and recognised once more, and the
//! attempt with more records is kept (ties keep the primary).
//!
//! Per-page failures never escape as `Err`. They are carried in
//! [`PageOutcome::error`] and the page contributes whatever the better
//! attempt produced, possibly nothing.

use crate::cancel::CancelToken;
use crate::config::RollConfig;
use crate::error::{PageError, RecognitionError};
use crate::pipeline::recognize::RecognitionClient;
use crate::pipeline::render::PageRenderer;
use crate::pipeline::retry::{FailureClassifier, MessageClassifier, RetryPolicy, RetryingInvoker};
use crate::record::RawRecord;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What one page contributed to the run.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Records from the better attempt.
    pub records: Vec<RawRecord>,
    /// DPI of the attempt that produced `records`; `None` when no attempt succeeded.
    pub dpi: Option<u32>,
    /// Whether the fallback render ran.
    pub used_fallback: bool,
    /// Set when no attempt succeeded, or when cancellation cut the page short.
    pub error: Option<PageError>,
    pub duration_ms: u64,
}

impl PageOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(PageError::is_cancelled)
    }

    /// Failed for a reason other than cancellation.
    pub fn is_failed(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.is_cancelled())
    }
}

/// Renders and recognises one page at a time.
pub struct PageProcessor<K = MessageClassifier> {
    renderer: Arc<dyn PageRenderer>,
    client: Arc<dyn RecognitionClient>,
    invoker: RetryingInvoker<K>,
    primary_dpi: u32,
    fallback_dpi: u32,
    low_yield_threshold: usize,
}

impl PageProcessor<MessageClassifier> {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        client: Arc<dyn RecognitionClient>,
        config: &RollConfig,
    ) -> Self {
        let invoker = RetryingInvoker::new(RetryPolicy::from_config(config));
        Self::with_invoker(renderer, client, invoker, config)
    }
}

impl<K: FailureClassifier> PageProcessor<K> {
    pub fn with_invoker(
        renderer: Arc<dyn PageRenderer>,
        client: Arc<dyn RecognitionClient>,
        invoker: RetryingInvoker<K>,
        config: &RollConfig,
    ) -> Self {
        Self {
            renderer,
            client,
            invoker,
            primary_dpi: config.primary_dpi,
            fallback_dpi: config.fallback_dpi,
            low_yield_threshold: config.low_yield_threshold,
        }
    }

    pub fn page_count(&self) -> usize {
        self.renderer.page_count()
    }

    fn wants_fallback(&self, count: usize) -> bool {
        self.fallback_dpi > self.primary_dpi && count < self.low_yield_threshold
    }

    /// Process the 0-indexed page. Never fails; see [`PageOutcome::error`].
    pub async fn process(&self, page_index: usize, cancel: &CancelToken) -> PageOutcome {
        let start = Instant::now();
        let page_num = page_index + 1;
        let finish = |records: Vec<RawRecord>,
                      dpi: Option<u32>,
                      used_fallback: bool,
                      error: Option<PageError>| PageOutcome {
            page_num,
            records,
            dpi,
            used_fallback,
            error,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        let (mut best, mut last_err) = match self.attempt(page_index, self.primary_dpi, cancel).await {
            Ok(records) => (Some((records, self.primary_dpi)), None),
            Err(e) if e.is_cancelled() => return finish(Vec::new(), None, false, Some(e)),
            Err(e) => (None, Some(e)),
        };

        let primary_count = best.as_ref().map_or(0, |(r, _)| r.len());
        if !self.wants_fallback(primary_count) {
            let (records, dpi) = best.map_or((Vec::new(), None), |(r, d)| (r, Some(d)));
            return finish(records, dpi, false, last_err);
        }

        info!(
            page = page_num,
            records = primary_count,
            threshold = self.low_yield_threshold,
            dpi = self.fallback_dpi,
            "Low yield, re-rendering at fallback resolution"
        );

        let mut cancelled = None;
        match self.attempt(page_index, self.fallback_dpi, cancel).await {
            Ok(records) => {
                let better = best
                    .as_ref()
                    .map_or(true, |(kept, _)| records.len() > kept.len());
                debug!(
                    page = page_num,
                    primary = primary_count,
                    fallback = records.len(),
                    kept_fallback = better,
                    "Fallback attempt finished"
                );
                if better {
                    best = Some((records, self.fallback_dpi));
                    last_err = None;
                }
            }
            Err(e) if e.is_cancelled() => cancelled = Some(e),
            Err(e) => {
                if best.is_none() {
                    last_err = Some(e);
                }
            }
        }

        let (records, dpi) = best.map_or((Vec::new(), None), |(r, d)| (r, Some(d)));
        let error = cancelled.or(if dpi.is_some() { None } else { last_err });
        if let Some(ref e) = error {
            if !e.is_cancelled() {
                warn!(page = page_num, error = %e, "Page contributed no records");
            }
        }
        finish(records, dpi, true, error)
    }

    /// One render + recognise cycle. The raster is dropped before returning.
    async fn attempt(
        &self,
        page_index: usize,
        dpi: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<RawRecord>, PageError> {
        let page_num = page_index + 1;
        if cancel.is_cancelled() {
            return Err(PageError::Cancelled { page: page_num });
        }

        let page = match self.renderer.render_page(page_index, dpi).await {
            Ok(p) => p,
            Err(e) => {
                warn!(page = page_num, dpi, error = %e, "Render failed");
                return Err(e);
            }
        };

        let client = &self.client;
        let rendered = &page;
        let result = self
            .invoker
            .invoke(|| client.recognize(rendered), cancel)
            .await;
        drop(page);

        match result {
            Ok(records) => {
                debug!(page = page_num, dpi, records = records.len(), "Page recognised");
                Ok(records)
            }
            Err(RecognitionError::Cancelled) => Err(PageError::Cancelled { page: page_num }),
            Err(e) => Err(PageError::RecognitionFailed {
                page: page_num,
                detail: e.to_string(),
            }),
        }
    }
}
