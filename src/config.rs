//! Configuration types for curation and retrieval.
//!
//! Every knob lives in one of two structs, [`CurationConfig`] for the
//! interactive/batch curation side and [`RetrievalConfig`] for chunking,
//! indexing, and question answering, each built via a builder so callers
//! set only what they care about and rely on documented defaults.
//!
//! The two curation modes deliberately carry *separate* default top margins
//! (80pt for raw review, 60pt for flowchart conversion): the page area worth
//! keeping differs between selectable-text pages and flowchart pages, and
//! both values are plain configuration rather than hard-wired constants.

use crate::error::KbError;
use crate::geometry::Margins;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for a curation session (interactive or unattended).
#[derive(Clone)]
pub struct CurationConfig {
    /// Default margins for raw-text review, reset at each new page.
    /// Default: left 0, top 80, right 0, bottom 30 (points).
    pub raw_margins: Margins,

    /// Fixed margins for flowchart conversion (not operator-adjustable).
    /// Default: left 0, top 60, right 0, bottom 30 (points).
    pub flowchart_margins: Margins,

    /// Maximum rendered image dimension (width or height) in pixels.
    /// Default: 2000.
    ///
    /// A safety cap independent of page size: vision APIs work best around
    /// 1000 to 2000 px and reject very large uploads, and pdfium memory stays
    /// bounded regardless of physical page dimensions.
    pub max_render_pixels: u32,

    /// External editor program for manual correction.
    /// Resolution order: this field → `$EDITOR` → `"nano"`.
    pub editor: Option<String>,

    /// Custom vision instruction template. If `None`, uses
    /// [`crate::prompts::VISION_INSTRUCTIONS`].
    pub vision_instructions: Option<String>,

    /// Pre-constructed vision provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Vision provider name (e.g. "openai", "anthropic"). If `None` along
    /// with `provider`, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Vision model identifier. If `None`, uses the provider default.
    pub model: Option<String>,

    /// Sampling temperature for vision calls. Default: 0.1, low so the
    /// model transcribes what it sees rather than inventing.
    pub temperature: f32,

    /// Maximum tokens the vision model may generate per page. Default: 4096.
    pub max_tokens: usize,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            raw_margins: Margins::new(0.0, 80.0, 0.0, 30.0),
            flowchart_margins: Margins::new(0.0, 60.0, 0.0, 30.0),
            max_render_pixels: 2000,
            editor: None,
            vision_instructions: None,
            provider: None,
            provider_name: None,
            model: None,
            temperature: 0.1,
            max_tokens: 4096,
        }
    }
}

impl fmt::Debug for CurationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurationConfig")
            .field("raw_margins", &self.raw_margins)
            .field("flowchart_margins", &self.flowchart_margins)
            .field("max_render_pixels", &self.max_render_pixels)
            .field("editor", &self.editor)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl CurationConfig {
    pub fn builder() -> CurationConfigBuilder {
        CurationConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolve the editor program: config → `$EDITOR` → `nano`.
    pub fn resolve_editor(&self) -> String {
        if let Some(ref e) = self.editor {
            return e.clone();
        }
        std::env::var("EDITOR").unwrap_or_else(|_| "nano".to_string())
    }
}

/// Builder for [`CurationConfig`].
#[derive(Debug)]
pub struct CurationConfigBuilder {
    config: CurationConfig,
}

impl CurationConfigBuilder {
    pub fn raw_margins(mut self, m: Margins) -> Self {
        self.config.raw_margins = m;
        self
    }

    pub fn flowchart_margins(mut self, m: Margins) -> Self {
        self.config.flowchart_margins = m;
        self
    }

    pub fn max_render_pixels(mut self, px: u32) -> Self {
        self.config.max_render_pixels = px.max(100);
        self
    }

    pub fn editor(mut self, program: impl Into<String>) -> Self {
        self.config.editor = Some(program.into());
        self
    }

    pub fn vision_instructions(mut self, text: impl Into<String>) -> Self {
        self.config.vision_instructions = Some(text.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
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

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CurationConfig, KbError> {
        let c = &self.config;
        let bad = |m: &Margins| m.left < 0.0 || m.top < 0.0 || m.right < 0.0 || m.bottom < 0.0;
        if bad(&c.raw_margins) || bad(&c.flowchart_margins) {
            return Err(KbError::InvalidConfig(
                "Margins must be non-negative".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Configuration for chunking, index build, and question answering.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Sliding-window size in words. Default: 600.
    pub chunk_size: usize,

    /// Window overlap in words; must be strictly less than `chunk_size`.
    /// Default: 100.
    pub chunk_overlap: usize,

    /// Number of nearest chunks retrieved per question. Default: 10.
    pub top_k: usize,

    /// Sampling temperature for answer generation. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the generation model may produce. Default: 800.
    pub max_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 600,
            chunk_overlap: 100,
            top_k: 10,
            temperature: 0.2,
            max_tokens: 800,
        }
    }
}

impl RetrievalConfig {
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`RetrievalConfig`].
#[derive(Debug)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    pub fn chunk_size(mut self, words: usize) -> Self {
        self.config.chunk_size = words;
        self
    }

    pub fn chunk_overlap(mut self, words: usize) -> Self {
        self.config.chunk_overlap = words;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k.max(1);
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

    /// Build the configuration, validating constraints.
    ///
    /// Rejecting `chunk_overlap >= chunk_size` here is the non-termination
    /// guard: an overlap that large makes the window walk stop advancing.
    pub fn build(self) -> Result<RetrievalConfig, KbError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(KbError::InvalidConfig("chunk_size must be ≥ 1".into()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(KbError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        Ok(self.config)
    }
}
