//! The recognition seam: one rendered page in, raw candidate records out.
//!
//! [`RecognitionClient`] is the only thing the page processor knows about
//! the backend. [`VisionRecognizer`] is the production implementation over an
//! `edgequake_llm` vision provider; tests substitute scripted clients.

use crate::config::RollConfig;
use crate::error::RecognitionError;
use crate::pipeline::encode::encode_page;
use crate::pipeline::parse::parse_records;
use crate::pipeline::render::RenderedPage;
use crate::prompts::{DEFAULT_SYSTEM_PROMPT, PAGE_INSTRUCTION};
use crate::record::RawRecord;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Reads voter records off one page image.
///
/// Implementations make a single attempt; retry, timeout and cancellation
/// are layered on by [`crate::pipeline::retry::RetryingInvoker`].
#[async_trait]
pub trait RecognitionClient: Send + Sync {
    async fn recognize(&self, page: &RenderedPage) -> Result<Vec<RawRecord>, RecognitionError>;
}

#[async_trait]
impl<T: RecognitionClient + ?Sized> RecognitionClient for Arc<T> {
    async fn recognize(&self, page: &RenderedPage) -> Result<Vec<RawRecord>, RecognitionError> {
        (**self).recognize(page).await
    }
}

/// [`RecognitionClient`] backed by a vision LLM.
///
/// ## Message layout
/// 1. system: the extraction prompt (or the configured override)
/// 2. user: a short instruction plus the page as a grayscale PNG
pub struct VisionRecognizer {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
}

impl VisionRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &RollConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
        }
    }
}

#[async_trait]
impl RecognitionClient for VisionRecognizer {
    async fn recognize(&self, page: &RenderedPage) -> Result<Vec<RawRecord>, RecognitionError> {
        let start = Instant::now();
        let image = encode_page(page)
            .map_err(|e| RecognitionError::Backend(format!("image encoding failed: {e}")))?;

        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(PAGE_INSTRUCTION, vec![image]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| RecognitionError::Backend(e.to_string()))?;

        debug!(
            page = page.page_num,
            dpi = page.dpi,
            input_tokens = response.prompt_tokens,
            output_tokens = response.completion_tokens,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Recognition response"
        );

        parse_records(&response.content)
    }
}

fn build_options(config: &RollConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
