//! Top-level extraction entry points.
//!
//! [`extract`] is the usual way in: it resolves the input, opens the roll,
//! picks a vision provider and runs the whole pipeline. [`extract_with`]
//! takes the renderer and recognition client directly, which is how tests
//! and callers with their own backends drive the same run logic.
//!
//! Only failures to get the roll open (or a selection that matches no page)
//! are returned as `Err`. Everything per-page is in `output.pages` and
//! `output.stats`; everything per-field is in `output.issues`.

use crate::aggregate::RunAggregator;
use crate::cancel::CancelToken;
use crate::config::RollConfig;
use crate::dedupe::dedupe_with;
use crate::error::RollError;
use crate::normalize::normalize_all;
use crate::output::{DocumentMetadata, RollOutput, RunStats};
use crate::pipeline::input;
use crate::pipeline::page::PageProcessor;
use crate::pipeline::recognize::{RecognitionClient, VisionRecognizer};
use crate::pipeline::render::{self, PageRenderer, PdfiumRenderer};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Extract voter records from a roll file or URL.
///
/// # Errors
/// Returns `Err(RollError)` only for fatal errors: the input cannot be
/// found, read, downloaded or opened as a PDF, no provider is configured,
/// or the page selection is empty.
///
/// # Example
/// ```rust,no_run
/// use edgequake_rollscan::{extract, CancelToken, RollConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RollConfig::default();
/// let output = extract("AC172_part3.pdf", &config, &CancelToken::new()).await?;
/// println!("{} voters, {} issues", output.records.len(), output.issues.len());
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &RollConfig,
    cancel: &CancelToken,
) -> Result<RollOutput, RollError> {
    let input_str = input_str.as_ref();
    info!(input = input_str, "Starting extraction");

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let renderer = PdfiumRenderer::open(
        resolved.path(),
        config.password.as_deref(),
        config.max_rendered_pixels,
    )
    .await?;
    let metadata = renderer.metadata().clone();

    let provider = resolve_provider(config)?;
    let client = VisionRecognizer::new(provider, config);

    let mut output = extract_with(Arc::new(renderer), Arc::new(client), config, cancel).await?;
    output.metadata = Some(metadata);
    Ok(output)
}

/// Run the pipeline over an already-opened document.
///
/// Pages are processed strictly in order, one at a time; raw records are
/// then normalised and de-duplicated with `config.final_dedup`.
pub async fn extract_with(
    renderer: Arc<dyn PageRenderer>,
    client: Arc<dyn RecognitionClient>,
    config: &RollConfig,
    cancel: &CancelToken,
) -> Result<RollOutput, RollError> {
    let start = Instant::now();
    let total_pages = renderer.page_count();
    let indices = config.pages.to_indices(total_pages);
    if indices.is_empty() {
        return Err(RollError::NoPagesSelected { total: total_pages });
    }
    debug!(selected = indices.len(), total_pages, "Pages selected");

    let processor = PageProcessor::new(renderer, client, config);
    let aggregated = RunAggregator::new(
        indices.len(),
        config.live_preview,
        config.progress_callback.clone(),
    )
    .run(&processor, &indices, cancel)
    .await;

    let (normalized, issues) = normalize_all(&aggregated.records);
    let records = dedupe_with(normalized, config.final_dedup);

    let stats = RunStats {
        total_pages,
        selected_pages: indices.len(),
        processed_pages: aggregated
            .pages
            .iter()
            .filter(|p| p.is_processed())
            .count(),
        failed_pages: aggregated
            .pages
            .iter()
            .filter(|p| p.error.as_ref().is_some_and(|e| !e.is_cancelled()))
            .count(),
        fallback_pages: aggregated.pages.iter().filter(|p| p.used_fallback).count(),
        raw_records: aggregated.records.len(),
        preview_records: aggregated.preview.len(),
        final_records: records.len(),
        issue_count: issues.len(),
        cancelled: aggregated.cancelled,
        total_duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        pages = stats.processed_pages,
        failed = stats.failed_pages,
        fallback = stats.fallback_pages,
        raw = stats.raw_records,
        records = stats.final_records,
        issues = stats.issue_count,
        cancelled = stats.cancelled,
        duration_ms = stats.total_duration_ms,
        "Extraction complete"
    );

    Ok(RollOutput {
        records,
        issues,
        preview: aggregated.preview,
        pages: aggregated.pages,
        metadata: None,
        stats,
    })
}

/// Extract from PDF bytes held in memory.
///
/// The bytes are written to a managed temp file, removed on return.
pub async fn extract_from_bytes(
    bytes: &[u8],
    config: &RollConfig,
    cancel: &CancelToken,
) -> Result<RollOutput, RollError> {
    if let Some(magic) = input::bad_magic(bytes) {
        return Err(RollError::NotAPdf {
            path: "<memory>".into(),
            magic,
        });
    }
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| RollError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| RollError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    // `tmp` is dropped (and the file deleted) when `extract` returns
    extract(&path, config, cancel).await
}

/// Output file format for [`extract_to_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

impl OutputFormat {
    /// Guess from the file extension; JSON unless it ends in `.csv`.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => OutputFormat::Csv,
            _ => OutputFormat::Json,
        }
    }

    pub fn render(self, output: &RollOutput) -> Result<String, RollError> {
        match self {
            OutputFormat::Csv => Ok(output.to_csv()),
            OutputFormat::Json => output
                .to_json()
                .map_err(|e| RollError::Internal(format!("JSON serialisation: {e}"))),
        }
    }
}

/// Extract and write the result to `output_path`.
///
/// Uses atomic write (temp file + rename) so readers never see a partial file.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    format: OutputFormat,
    config: &RollConfig,
    cancel: &CancelToken,
) -> Result<RunStats, RollError> {
    let output = extract(input_str, config, cancel).await?;
    write_atomic(output_path.as_ref(), &format.render(&output)?).await?;
    Ok(output.stats)
}

/// Write `contents` to `path` via a sibling temp file and rename.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), RollError> {
    let write_err = |source| RollError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally; the run cannot be cancelled.
pub fn extract_sync(input_str: impl AsRef<str>, config: &RollConfig) -> Result<RollOutput, RollError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| RollError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(extract(input_str, config, &CancelToken::new()))
}

/// Read roll metadata without contacting any recognition backend.
pub async fn inspect(
    input_str: impl AsRef<str>,
    password: Option<&str>,
) -> Result<DocumentMetadata, RollError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    render::extract_metadata(resolved.path(), password).await
}

// ── Provider resolution ─────────────────────────────────────────────────

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, RollError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        RollError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the vision provider, most specific first:
///
/// 1. `config.provider`, used as-is
/// 2. `config.provider_name` with `config.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. whatever `ProviderFactory::from_env` detects
pub fn resolve_provider(config: &RollConfig) -> Result<Arc<dyn LLMProvider>, RollError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| RollError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, GEMINI_API_KEY, or pass --provider.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("out/roll.csv")), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_path(Path::new("roll.CSV")), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_path(Path::new("roll.json")), OutputFormat::Json);
        assert_eq!(OutputFormat::from_path(Path::new("roll")), OutputFormat::Json);
    }

    #[tokio::test]
    async fn write_atomic_creates_parent_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("roll.csv");
        write_atomic(&path, "id,voterId\r\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "id,voterId\r\n");
        assert!(!dir.path().join("nested").join("roll.csv.tmp").exists());
    }

    #[tokio::test]
    async fn non_pdf_bytes_are_rejected_before_any_io() {
        let err = extract_from_bytes(b"<html>", &RollConfig::default(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RollError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn inspect_missing_file_is_fatal() {
        let err = inspect("/no/such/roll.pdf", None).await.unwrap_err();
        assert!(matches!(err, RollError::FileNotFound { .. }));
    }
}
