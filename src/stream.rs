//! Pull-based page source.
//!
//! Pages are yielded strictly one after another: the next page is not
//! rendered until the consumer polls for it, so the consumer's loop is the
//! single place where sequencing and cancellation are decided. Nothing here
//! runs concurrently; a rate-limited backend would only spend retry budget
//! on parallel requests.
//!
//! ```rust,no_run
//! # use edgequake_rollscan::{CancelToken, pipeline::page::PageProcessor};
//! # async fn demo(processor: PageProcessor) {
//! use edgequake_rollscan::stream::page_stream;
//! use futures::StreamExt;
//!
//! let mut pages = page_stream(&processor, vec![0, 1, 2], CancelToken::new(), None);
//! while let Some(outcome) = pages.next().await {
//!     println!("page {}: {} records", outcome.page_num, outcome.records.len());
//! }
//! # }
//! ```

use crate::cancel::CancelToken;
use crate::pipeline::page::{PageOutcome, PageProcessor};
use crate::pipeline::retry::FailureClassifier;
use crate::progress::ProgressCallback;
use futures::stream;
use std::pin::Pin;
use tokio_stream::Stream;

/// A boxed stream of page outcomes, in page order.
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = PageOutcome> + Send + 'a>>;

/// Yield one [`PageOutcome`] per 0-indexed page in `indices`, in order.
///
/// The stream ends early, without touching the next page, once `cancel`
/// fires. `progress` receives `on_page_start` as each page begins.
pub fn page_stream<'a, K>(
    processor: &'a PageProcessor<K>,
    indices: Vec<usize>,
    cancel: CancelToken,
    progress: Option<ProgressCallback>,
) -> PageStream<'a>
where
    K: FailureClassifier + 'a,
{
    let total = indices.len();
    let state = (indices.into_iter(), cancel, progress);

    Box::pin(stream::unfold(state, move |(mut pending, cancel, progress)| async move {
        if cancel.is_cancelled() {
            return None;
        }
        let index = pending.next()?;
        if let Some(ref cb) = progress {
            cb.on_page_start(index + 1, total);
        }
        let outcome = processor.process(index, &cancel).await;
        Some((outcome, (pending, cancel, progress)))
    }))
}
