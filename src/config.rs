//! Configuration types for electoral-roll extraction.
//!
//! All run behaviour is controlled through [`RollConfig`], built via its
//! [`RollConfigBuilder`]. Defaults are tuned for dense, tabular scanned
//! rolls (30 voter boxes per page) read by a rate-limited vision backend.

use crate::error::RollError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use edgequake_rollscan::RollConfig;
///
/// let config = RollConfig::builder()
///     .primary_dpi(200)
///     .low_yield_threshold(20)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RollConfig {
    /// First render resolution. Range: 72–600. Default: 220.
    pub primary_dpi: u32,

    /// Resolution used when a page under-yields. Default: 300.
    ///
    /// Must be at least `primary_dpi`. Equal values disable escalation.
    pub fallback_dpi: u32,

    /// A page that yields fewer records than this is re-rendered at
    /// `fallback_dpi`. Default: 15. `0` disables escalation.
    pub low_yield_threshold: usize,

    /// Cap on either rendered dimension, in pixels. Default: 4000.
    ///
    /// An A4 page at 300 DPI is 2480 × 3508 px; the cap only bites on
    /// oversized scans.
    pub max_rendered_pixels: u32,

    /// Recognition attempts per render, first try included. Default: 3.
    pub max_attempts: u32,

    /// Backoff base in milliseconds. Attempt `i` waits
    /// `retry_base_delay_ms * (i + 1) + jitter`. Default: 1200.
    pub retry_base_delay_ms: u64,

    /// Upper bound for the uniform random jitter added to each backoff.
    /// Default: 250.
    pub retry_jitter_ms: u64,

    /// Per-call recognition timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Maintain the de-duplicated live preview while pages arrive. Default: true.
    pub live_preview: bool,

    /// Policy for the final de-duplication pass. Default: strong key only.
    pub final_dedup: DedupPolicy,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// PDF user password for encrypted rolls.
    pub password: Option<String>,

    /// LLM model identifier. If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "gemini", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0 (transcription, not prose).
    pub temperature: f32,

    /// Maximum tokens per page response. Default: 8192.
    ///
    /// A full roll page is ~30 records of 15 fields; 8k leaves headroom for
    /// Devanagari text, which tokenises poorly.
    pub max_tokens: usize,

    /// Custom extraction prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RollConfig {
    fn default() -> Self {
        Self {
            primary_dpi: 220,
            fallback_dpi: 300,
            low_yield_threshold: 15,
            max_rendered_pixels: 4000,
            max_attempts: 3,
            retry_base_delay_ms: 1200,
            retry_jitter_ms: 250,
            api_timeout_secs: 120,
            live_preview: true,
            final_dedup: DedupPolicy::default(),
            pages: PageSelection::default(),
            password: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 8192,
            system_prompt: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RollConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollConfig")
            .field("primary_dpi", &self.primary_dpi)
            .field("fallback_dpi", &self.fallback_dpi)
            .field("low_yield_threshold", &self.low_yield_threshold)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_jitter_ms", &self.retry_jitter_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("live_preview", &self.live_preview)
            .field("final_dedup", &self.final_dedup)
            .field("pages", &self.pages)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProgressSink>"),
            )
            .finish()
    }
}

impl RollConfig {
    /// Create a new builder for `RollConfig`.
    pub fn builder() -> RollConfigBuilder {
        RollConfigBuilder {
            config: Self::default(),
        }
    }

    /// True when a page with `count` records should be re-rendered.
    pub fn wants_fallback(&self, count: usize) -> bool {
        self.fallback_dpi > self.primary_dpi && count < self.low_yield_threshold
    }
}

/// Builder for [`RollConfig`].
#[derive(Debug)]
pub struct RollConfigBuilder {
    config: RollConfig,
}

impl RollConfigBuilder {
    pub fn primary_dpi(mut self, dpi: u32) -> Self {
        self.config.primary_dpi = dpi;
        self
    }

    pub fn fallback_dpi(mut self, dpi: u32) -> Self {
        self.config.fallback_dpi = dpi;
        self
    }

    pub fn low_yield_threshold(mut self, n: usize) -> Self {
        self.config.low_yield_threshold = n;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    pub fn retry_jitter_ms(mut self, ms: u64) -> Self {
        self.config.retry_jitter_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn live_preview(mut self, v: bool) -> Self {
        self.config.live_preview = v;
        self
    }

    pub fn final_dedup(mut self, policy: DedupPolicy) -> Self {
        self.config.final_dedup = policy;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RollConfig, RollError> {
        let c = &self.config;
        for (name, dpi) in [("primary", c.primary_dpi), ("fallback", c.fallback_dpi)] {
            if !(72..=600).contains(&dpi) {
                return Err(RollError::InvalidConfig(format!(
                    "{name} DPI must be 72–600, got {dpi}"
                )));
            }
        }
        if c.fallback_dpi < c.primary_dpi {
            return Err(RollError::InvalidConfig(format!(
                "fallback DPI ({}) must not be below primary DPI ({})",
                c.fallback_dpi, c.primary_dpi
            )));
        }
        if c.max_attempts == 0 {
            return Err(RollError::InvalidConfig("max_attempts must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(RollError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the final pass treats records whose voter id could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DedupPolicy {
    /// Only records sharing a non-empty voter id are merged. (default)
    #[default]
    StrongKeyOnly,
    /// Records without a voter id are additionally merged on
    /// `name|parent|age|gender`, as the live preview does.
    CompositeFallback,
}

/// Specifies which pages of the roll to process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let in_range = |p: &usize| *p >= 1 && *p <= total_pages;
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => std::iter::once(*p).filter(in_range).map(|p| p - 1).collect(),
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages.iter().filter(|p| in_range(p)).map(|p| p - 1).collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}
