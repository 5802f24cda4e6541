//! Whole-run tests over scripted backends.
//!
//! A [`ScriptedRenderer`] stands in for pdfium and a [`ScriptedClient`]
//! answers per `(page, dpi)`, so these run offline and deterministically.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_rollscan::{
    extract_with, CancelToken, DedupPolicy, Field, PageError, PageRenderer, PageSelection,
    ProgressSink, RawRecord, RecognitionClient, RecognitionError, RenderedPage, RollConfig,
    RollError,
};
use image::DynamicImage;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

// ── Test doubles ─────────────────────────────────────────────────────────────

struct ScriptedRenderer {
    pages: usize,
    /// 1-indexed pages that never render.
    broken: HashSet<usize>,
}

impl ScriptedRenderer {
    fn new(pages: usize) -> Self {
        Self {
            pages,
            broken: HashSet::new(),
        }
    }

    fn broken(mut self, page_num: usize) -> Self {
        self.broken.insert(page_num);
        self
    }
}

#[async_trait]
impl PageRenderer for ScriptedRenderer {
    fn page_count(&self) -> usize {
        self.pages
    }

    async fn render_page(&self, page_index: usize, dpi: u32) -> Result<RenderedPage, PageError> {
        let page_num = page_index + 1;
        if self.broken.contains(&page_num) {
            return Err(PageError::RenderFailed {
                page: page_num,
                dpi,
                detail: "bitmap allocation failed".into(),
            });
        }
        Ok(RenderedPage {
            page_num,
            dpi,
            image: DynamicImage::new_luma8(8, 8),
        })
    }
}

type Answer = Result<Vec<RawRecord>, String>;

#[derive(Default)]
struct ScriptedClient {
    answers: HashMap<(usize, u32), Answer>,
    calls: Mutex<Vec<(usize, u32)>>,
    /// Cancel this token while recognising the given page.
    cancel_on: Option<(usize, CancelToken)>,
}

impl ScriptedClient {
    fn answer(mut self, page_num: usize, dpi: u32, records: Vec<RawRecord>) -> Self {
        self.answers.insert((page_num, dpi), Ok(records));
        self
    }

    fn fail(mut self, page_num: usize, dpi: u32, message: &str) -> Self {
        self.answers.insert((page_num, dpi), Err(message.to_string()));
        self
    }

    fn cancel_on(mut self, page_num: usize, token: CancelToken) -> Self {
        self.cancel_on = Some((page_num, token));
        self
    }

    fn calls(&self) -> Vec<(usize, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecognitionClient for ScriptedClient {
    async fn recognize(&self, page: &RenderedPage) -> Result<Vec<RawRecord>, RecognitionError> {
        self.calls.lock().unwrap().push((page.page_num, page.dpi));
        if let Some((at, ref token)) = self.cancel_on {
            if at == page.page_num {
                token.cancel();
            }
        }
        match self.answers.get(&(page.page_num, page.dpi)) {
            Some(Ok(records)) => Ok(records.clone()),
            Some(Err(msg)) => Err(RecognitionError::Backend(msg.clone())),
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }
}

impl ProgressSink for Recorder {
    fn on_run_start(&self, total: usize) {
        self.push(format!("start {total}"));
    }

    fn on_page_start(&self, page_num: usize, total: usize) {
        self.push(format!("page {page_num}/{total}"));
    }

    fn on_page_complete(&self, done: usize, total: usize, records: usize) {
        self.push(format!("done {done}/{total} +{records}"));
    }

    fn on_page_error(&self, page_num: usize, _total: usize, _error: &str) {
        self.push(format!("error {page_num}"));
    }

    fn on_preview_update(&self, added: &[RawRecord], preview_total: usize) {
        self.push(format!("preview +{} ={preview_total}", added.len()));
    }

    fn on_run_complete(&self, total: usize, processed: usize, cancelled: bool) {
        self.push(format!("end {processed}/{total} cancelled={cancelled}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn voter(serial: usize, voter_id: &str, name: &str) -> RawRecord {
    RawRecord {
        id: serial.to_string(),
        voter_id: voter_id.into(),
        name: name.into(),
        father_or_husband_name: "Ramesh Patil".into(),
        gender: "F".into(),
        age: "42".into(),
        house_number: format!("घर क्रमांक: {serial}"),
        ac_part_info: format!("172/3/{serial}"),
        ..Default::default()
    }
}

/// `n` distinct, issue-free records unique to `(page, dpi)`.
fn voters(page_num: usize, dpi: u32, n: usize) -> Vec<RawRecord> {
    (1..=n)
        .map(|i| voter(i, &format!("P{page_num}D{dpi}N{i:03}"), &format!("Voter {i}")))
        .collect()
}

fn config() -> RollConfig {
    RollConfig::builder()
        .retry_base_delay_ms(0)
        .retry_jitter_ms(0)
        .build()
        .unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn low_yield_pages_fall_back_and_keep_the_larger_attempt() {
    let client = Arc::new(
        ScriptedClient::default()
            .answer(1, 220, voters(1, 220, 20))
            .answer(2, 220, voters(2, 220, 5))
            .answer(2, 300, voters(2, 300, 12))
            .answer(3, 220, voters(3, 220, 3))
            .answer(3, 300, voters(3, 300, 1)),
    );
    let out = extract_with(
        Arc::new(ScriptedRenderer::new(3)),
        client.clone(),
        &config(),
        &CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        client.calls(),
        vec![(1, 220), (2, 220), (2, 300), (3, 220), (3, 300)]
    );
    let dpis: Vec<Option<u32>> = out.pages.iter().map(|p| p.dpi).collect();
    assert_eq!(dpis, vec![Some(220), Some(300), Some(220)]);
    let fallback: Vec<bool> = out.pages.iter().map(|p| p.used_fallback).collect();
    assert_eq!(fallback, vec![false, true, true]);

    assert_eq!(out.stats.raw_records, 20 + 12 + 3);
    assert_eq!(out.stats.final_records, 35);
    assert_eq!(out.stats.fallback_pages, 2);
    assert_eq!(out.stats.failed_pages, 0);
    assert_eq!(out.stats.issue_count, 0, "issues: {:?}", out.issues);
    assert_eq!(out.records[0].voter_id, "P1D220N001");
    assert_eq!(out.records[20].voter_id, "P2D300N001");
}

#[tokio::test]
async fn page_selection_runs_in_document_order() {
    let client = Arc::new(ScriptedClient::default());
    let config = RollConfig::builder()
        .retry_base_delay_ms(0)
        .low_yield_threshold(0)
        .pages(PageSelection::Set(vec![4, 1, 4, 9]))
        .build()
        .unwrap();
    let out = extract_with(
        Arc::new(ScriptedRenderer::new(5)),
        client.clone(),
        &config,
        &CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(client.calls(), vec![(1, 220), (4, 220)]);
    assert_eq!(out.stats.total_pages, 5);
    assert_eq!(out.stats.selected_pages, 2);
}

#[tokio::test]
async fn empty_selection_is_fatal() {
    let config = RollConfig::builder()
        .pages(PageSelection::Range(10, 12))
        .build()
        .unwrap();
    let err = extract_with(
        Arc::new(ScriptedRenderer::new(3)),
        Arc::new(ScriptedClient::default()),
        &config,
        &CancelToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RollError::NoPagesSelected { total: 3 }));
}

#[tokio::test]
async fn same_voter_on_two_pages_keeps_the_first_reading() {
    let client = ScriptedClient::default()
        .answer(1, 220, vec![voter(1, "abc 123", "First")])
        .answer(2, 220, vec![voter(1, "ABC-123", "Second")]);
    let config = RollConfig::builder().low_yield_threshold(0).build().unwrap();
    let out = extract_with(
        Arc::new(ScriptedRenderer::new(2)),
        Arc::new(client),
        &config,
        &CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(out.stats.raw_records, 2);
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].name, "First");
    assert_eq!(out.records[0].voter_id, "ABC123");
    assert_eq!(out.preview.len(), 1);
}

#[tokio::test]
async fn records_without_voter_id_follow_the_dedup_policy() {
    let run = |policy: DedupPolicy| async move {
        let client = ScriptedClient::default()
            .answer(1, 220, vec![voter(1, "", "Sunita Patil")])
            .answer(2, 220, vec![voter(1, "  ", "Sunita  Patil")]);
        let config = RollConfig::builder()
            .low_yield_threshold(0)
            .final_dedup(policy)
            .build()
            .unwrap();
        extract_with(
            Arc::new(ScriptedRenderer::new(2)),
            Arc::new(client),
            &config,
            &CancelToken::new(),
        )
        .await
        .unwrap()
    };

    let strong = run(DedupPolicy::StrongKeyOnly).await;
    assert_eq!(strong.records.len(), 2);
    // The preview is looser and already collapses them.
    assert_eq!(strong.preview.len(), 1);

    let composite = run(DedupPolicy::CompositeFallback).await;
    assert_eq!(composite.records.len(), 1);
}

#[tokio::test]
async fn failed_pages_degrade_without_aborting_the_run() {
    let client = Arc::new(
        ScriptedClient::default()
            .answer(1, 220, voters(1, 220, 3))
            .fail(2, 220, "invalid api key")
            .answer(3, 220, voters(3, 220, 4)),
    );
    let recorder = Arc::new(Recorder::default());
    let config = RollConfig::builder()
        .low_yield_threshold(0)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let out = extract_with(
        Arc::new(ScriptedRenderer::new(4).broken(4)),
        client.clone(),
        &config,
        &CancelToken::new(),
    )
    .await
    .unwrap();

    // A permanent backend error is not retried.
    assert_eq!(client.calls(), vec![(1, 220), (2, 220), (3, 220)]);
    assert_eq!(out.stats.processed_pages, 4);
    assert_eq!(out.stats.failed_pages, 2);
    assert_eq!(out.stats.final_records, 7);
    assert!(matches!(
        out.pages[1].error,
        Some(PageError::RecognitionFailed { page: 2, .. })
    ));
    assert!(matches!(
        out.pages[3].error,
        Some(PageError::RenderFailed { page: 4, dpi: 220, .. })
    ));

    let events = recorder.events();
    assert!(events.contains(&"error 2".to_string()));
    assert!(events.contains(&"error 4".to_string()));
    assert_eq!(events.last().unwrap(), "end 4/4 cancelled=false");
}

#[tokio::test]
async fn transient_failures_are_retried_before_giving_up() {
    let client = Arc::new(ScriptedClient::default().fail(1, 220, "429 Too Many Requests"));
    let config = RollConfig::builder()
        .retry_base_delay_ms(0)
        .retry_jitter_ms(0)
        .low_yield_threshold(0)
        .build()
        .unwrap();
    let out = extract_with(
        Arc::new(ScriptedRenderer::new(1)),
        client.clone(),
        &config,
        &CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(client.calls().len(), 3);
    assert_eq!(out.stats.failed_pages, 1);
    assert!(out.records.is_empty());
}

#[tokio::test]
async fn cancelling_mid_run_keeps_completed_pages() {
    let cancel = CancelToken::new();
    let client = Arc::new(
        ScriptedClient::default()
            .answer(1, 220, voters(1, 220, 20))
            .answer(2, 220, voters(2, 220, 20))
            .answer(3, 220, voters(3, 220, 20))
            .cancel_on(2, cancel.clone()),
    );
    let recorder = Arc::new(Recorder::default());
    let config = RollConfig::builder()
        .retry_base_delay_ms(0)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let out = extract_with(
        Arc::new(ScriptedRenderer::new(4)),
        client.clone(),
        &config,
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(client.calls(), vec![(1, 220), (2, 220)]);
    assert!(out.stats.cancelled);
    assert_eq!(out.stats.selected_pages, 4);
    assert_eq!(out.stats.processed_pages, 2);
    assert_eq!(out.records.len(), 40);
    assert_eq!(
        recorder.events().last().unwrap(),
        "end 2/4 cancelled=true"
    );
}

#[tokio::test]
async fn cancelling_during_fallback_keeps_primary_records() {
    let cancel = CancelToken::new();
    let client = ScriptedClient::default()
        .answer(1, 220, voters(1, 220, 4))
        .cancel_on(1, cancel.clone());
    let recorder = Arc::new(Recorder::default());
    let config = RollConfig::builder()
        .retry_base_delay_ms(0)
        .retry_jitter_ms(0)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let out = extract_with(
        Arc::new(ScriptedRenderer::new(2)),
        Arc::new(client),
        &config,
        &cancel,
    )
    .await
    .unwrap();

    assert!(out.stats.cancelled);
    assert_eq!(out.records.len(), 4);
    assert_eq!(out.pages.len(), 1);
    assert!(matches!(out.pages[0].error, Some(PageError::Cancelled { page: 1 })));
    assert_eq!(out.stats.processed_pages, 1);
    assert_eq!(out.stats.failed_pages, 0);
    assert_eq!(
        recorder.events(),
        vec![
            "start 2",
            "page 1/2",
            "preview +4 =4",
            "done 1/2 +4",
            "end 1/2 cancelled=true",
        ]
    );
}

#[tokio::test]
async fn progress_events_arrive_in_page_order() {
    let client = ScriptedClient::default()
        .answer(1, 220, vec![voter(1, "A1", "A"), voter(2, "B2", "B")])
        .answer(2, 220, vec![voter(1, "A1", "A")]);
    let recorder = Arc::new(Recorder::default());
    let config = RollConfig::builder()
        .low_yield_threshold(0)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    extract_with(
        Arc::new(ScriptedRenderer::new(2)),
        Arc::new(client),
        &config,
        &CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        recorder.events(),
        vec![
            "start 2",
            "page 1/2",
            "preview +2 =2",
            "done 1/2 +2",
            "page 2/2",
            "done 2/2 +1",
            "end 2/2 cancelled=false",
        ]
    );
}

#[tokio::test]
async fn field_issues_are_reported_for_every_recognised_record() {
    let unlabeled = RawRecord {
        house_number: "near temple".into(),
        ..voter(7, "XYZ7654321", "Asha")
    };
    let client = ScriptedClient::default()
        .answer(1, 220, vec![unlabeled.clone()])
        .answer(2, 220, vec![unlabeled]);
    let config = RollConfig::builder().low_yield_threshold(0).build().unwrap();
    let out = extract_with(
        Arc::new(ScriptedRenderer::new(2)),
        Arc::new(client),
        &config,
        &CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].house_number, "");
    assert_eq!(out.records[0].house_number_raw, "near temple");
    assert_eq!(out.issues.len(), 2);
    assert!(out
        .issues
        .iter()
        .all(|i| i.field == Field::HouseNumber && i.record_id == "7"));
    assert_eq!(out.stats.issue_count, 2);
}

#[tokio::test]
async fn csv_export_of_a_run() {
    let client = ScriptedClient::default().answer(1, 220, vec![voter(1, "ABC1234567", "Sunita")]);
    let config = RollConfig::builder().low_yield_threshold(0).build().unwrap();
    let out = extract_with(
        Arc::new(ScriptedRenderer::new(1)),
        Arc::new(client),
        &config,
        &CancelToken::new(),
    )
    .await
    .unwrap();

    let csv = out.to_csv();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("id,voterId,name,"));
    assert_eq!(
        lines.next().unwrap(),
        "1,ABC1234567,Sunita,Ramesh Patil,F,42,1,172/3/1,,"
    );
}
