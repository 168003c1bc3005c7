//! Curation state machine: interactive per-page review and the unattended
//! batch variant.
//!
//! The nested menus of the curation tool are modelled as an explicit state
//! machine rather than nested blocking input loops, so the termination,
//! skip, and retry semantics are testable with a scripted [`Operator`] and
//! a fake [`PageConverter`]: no terminal, no pdfium, no model.
//!
//! Per page: `Idle → {Skipped, RawReview, FlowchartReview} → Idle(next)`.
//! The machine never advances past a page without an explicit operator
//! action; a failed attempt returns to the top menu for the *same* page so
//! the operator decides what happens next. Operator-entered text is never
//! silently discarded; every edit ends in an explicit save-or-discard
//! confirmation.

use crate::config::CurationConfig;
use crate::corpus::CorpusStore;
use crate::editor;
use crate::error::{KbError, PageError};
use crate::geometry::{compute_clip, compute_crop_box, Margins};
use crate::pdf::PdfSource;
use crate::vision;
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::sync::Arc;
use tracing::{info, warn};

// ── Operator actions ─────────────────────────────────────────────────────

/// Top-menu action for the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAction {
    /// Move to the next page without committing anything.
    Skip,
    /// Enter the raw-text review loop.
    Raw,
    /// Enter the flowchart review loop.
    Flowchart,
    /// Exit the whole machine.
    Quit,
}

/// Action inside the raw-text review loop.
#[derive(Debug, Clone, PartialEq)]
pub enum RawAction {
    /// Commit the extracted text and return to the top menu.
    Accept,
    /// Replace the margin configuration and re-extract.
    AdjustMargins(Margins),
    /// Open the external editor on the extracted text.
    Edit,
    /// Re-run extraction with unchanged margins.
    Reextract,
    /// Leave the loop without committing.
    SkipPage,
    /// Exit the whole machine.
    QuitMode,
}

/// Action inside the flowchart review loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowchartAction {
    Accept,
    Edit,
    /// Re-invoke the vision model on the same rendered image.
    Retry,
    SkipPage,
    QuitMode,
}

/// The human (or scripted test double) driving a session.
///
/// The console implementation lives in the CLI binary; the library only
/// needs these five decisions.
pub trait Operator {
    fn page_action(&mut self, page: usize, total: usize) -> PageAction;
    fn raw_action(&mut self, margins: &Margins) -> RawAction;
    fn flowchart_action(&mut self) -> FlowchartAction;
    /// Explicit save-or-discard decision after an editor session.
    fn confirm_save(&mut self, preview: &str) -> bool;
    /// Display extracted text, model output, or an error to the operator.
    fn show(&mut self, heading: &str, body: &str);
}

// ── Page conversion boundary ─────────────────────────────────────────────

/// What the state machine needs from the page-conversion side.
#[async_trait]
pub trait PageConverter: Send + Sync {
    fn page_count(&self) -> usize;

    /// Selectable text inside the margin-clipped region, verbatim.
    async fn extract_raw(&self, page: usize, margins: &Margins) -> Result<String, PageError>;

    /// Render the page and crop it with the fixed flowchart margins.
    async fn render_flowchart(&self, page: usize) -> Result<DynamicImage, PageError>;

    /// Ask the vision collaborator to describe a cropped page image.
    async fn describe(&self, page: usize, image: &DynamicImage) -> Result<String, PageError>;
}

/// Production converter: pdfium extraction/rendering plus the vision model.
pub struct PdfPageConverter {
    source: PdfSource,
    config: CurationConfig,
    provider: Arc<dyn LLMProvider>,
}

impl PdfPageConverter {
    pub fn new(source: PdfSource, config: CurationConfig, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            source,
            config,
            provider,
        }
    }
}

#[async_trait]
impl PageConverter for PdfPageConverter {
    fn page_count(&self) -> usize {
        self.source.page_count()
    }

    async fn extract_raw(&self, page: usize, margins: &Margins) -> Result<String, PageError> {
        let bounds = self
            .source
            .page_bounds(page)
            .await
            .map_err(|e| PageError::Extract {
                page,
                detail: e.to_string(),
            })?;
        let clip = compute_clip(bounds, *margins).map_err(|e| PageError::Region {
            page,
            detail: e.to_string(),
        })?;
        self.source
            .extract_text(page, clip)
            .await
            .map_err(|e| PageError::Extract {
                page,
                detail: e.to_string(),
            })
    }

    async fn render_flowchart(&self, page: usize) -> Result<DynamicImage, PageError> {
        let bounds = self
            .source
            .page_bounds(page)
            .await
            .map_err(|e| PageError::Render {
                page,
                detail: e.to_string(),
            })?;
        let clip =
            compute_clip(bounds, self.config.flowchart_margins).map_err(|e| PageError::Region {
                page,
                detail: e.to_string(),
            })?;
        let rendered = self
            .source
            .render_page(page, self.config.max_render_pixels)
            .await
            .map_err(|e| PageError::Render {
                page,
                detail: e.to_string(),
            })?;
        let crop_box = compute_crop_box(
            clip,
            rendered.scale,
            rendered.image.width(),
            rendered.image.height(),
        )
        .map_err(|e| PageError::Render {
            page,
            detail: e.to_string(),
        })?;
        Ok(rendered.crop(&crop_box))
    }

    async fn describe(&self, page: usize, image: &DynamicImage) -> Result<String, PageError> {
        vision::describe_page(&self.provider, page, image, &self.config).await
    }
}

/// Resolve the vision/generation provider, most-specific first:
/// pre-built provider → named provider + model → environment auto-detection.
pub fn resolve_provider(config: &CurationConfig) -> Result<Arc<dyn LLMProvider>, KbError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-mini");
        return ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            KbError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        });
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| KbError::ProviderNotConfigured {
            provider: "auto".into(),
            hint: format!(
                "No provider could be auto-detected from environment.\n\
                 Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or name one explicitly.\n\
                 Error: {e}"
            ),
        })?;
    Ok(provider)
}

// ── Session ──────────────────────────────────────────────────────────────

/// Counters reported when a session or batch finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CurationStats {
    /// Page blocks committed to the corpus.
    pub committed: usize,
    /// Pages the operator explicitly skipped.
    pub skipped: usize,
    /// Pages whose conversion failed (batch mode).
    pub failed: usize,
}

/// Outcome of one review sub-loop.
enum ReviewOutcome {
    /// A block was committed; advance to the next page.
    Committed,
    /// Operator skipped; advance without committing.
    Skipped,
    /// The attempt failed before the operator saw content; stay on this
    /// page and re-show the top menu.
    Abandoned,
    /// Exit the whole machine.
    Quit,
}

/// One interactive curation run over a document.
pub struct CurationSession<'a, C: PageConverter, O: Operator> {
    converter: &'a C,
    store: &'a CorpusStore,
    operator: &'a mut O,
    config: &'a CurationConfig,
}

impl<'a, C: PageConverter, O: Operator> CurationSession<'a, C, O> {
    pub fn new(
        converter: &'a C,
        store: &'a CorpusStore,
        operator: &'a mut O,
        config: &'a CurationConfig,
    ) -> Self {
        Self {
            converter,
            store,
            operator,
            config,
        }
    }

    /// Run the machine from `start_page` until the operator quits or the
    /// cursor advances past the last page.
    pub async fn run(&mut self, start_page: usize) -> Result<CurationStats, KbError> {
        let total = self.converter.page_count();
        let mut page = start_page.max(1);
        let mut stats = CurationStats::default();

        while page <= total {
            let outcome = match self.operator.page_action(page, total) {
                PageAction::Quit => break,
                PageAction::Skip => ReviewOutcome::Skipped,
                PageAction::Raw => self.raw_review(page).await?,
                PageAction::Flowchart => self.flowchart_review(page).await?,
            };

            match outcome {
                ReviewOutcome::Committed => {
                    stats.committed += 1;
                    page += 1;
                }
                ReviewOutcome::Skipped => {
                    stats.skipped += 1;
                    page += 1;
                }
                ReviewOutcome::Abandoned => {
                    // Same page, fresh top-menu decision.
                }
                ReviewOutcome::Quit => break,
            }
        }

        info!(
            "Curation session finished: {} committed, {} skipped",
            stats.committed, stats.skipped
        );
        Ok(stats)
    }

    /// Raw-text review: extract, then loop on operator actions. Margins
    /// reset to the configured defaults on entry (per-page scope).
    async fn raw_review(&mut self, page: usize) -> Result<ReviewOutcome, KbError> {
        let mut margins = self.config.raw_margins;

        loop {
            let text = match self.converter.extract_raw(page, &margins).await {
                Ok(t) => {
                    let shown = if t.trim().is_empty() {
                        "[no selectable text with current margins]"
                    } else {
                        t.as_str()
                    };
                    self.operator.show("Extracted text", shown);
                    Some(t)
                }
                Err(e) => {
                    // Recoverable: the operator adjusts margins and retries.
                    warn!("raw extraction: {e}");
                    self.operator.show("Extraction failed", &e.to_string());
                    None
                }
            };

            loop {
                match self.operator.raw_action(&margins) {
                    RawAction::Accept => match text {
                        Some(ref t) => {
                            self.store.append(page, t)?;
                            return Ok(ReviewOutcome::Committed);
                        }
                        None => {
                            self.operator
                                .show("Nothing to save", "the last extraction failed");
                            continue;
                        }
                    },
                    RawAction::AdjustMargins(m) => {
                        margins = m;
                        break; // re-extract with the new margins
                    }
                    RawAction::Edit => {
                        let seed = text.as_deref().unwrap_or("");
                        match self.edit_and_confirm(page, seed)? {
                            Some(outcome) => return Ok(outcome),
                            None => continue, // discarded; back to the menu
                        }
                    }
                    RawAction::Reextract => break,
                    RawAction::SkipPage => return Ok(ReviewOutcome::Skipped),
                    RawAction::QuitMode => return Ok(ReviewOutcome::Quit),
                }
            }
        }
    }

    /// Flowchart review: render once, then loop on operator actions.
    /// Retry re-invokes the vision model on the same rendered image.
    async fn flowchart_review(&mut self, page: usize) -> Result<ReviewOutcome, KbError> {
        let image = match self.converter.render_flowchart(page).await {
            Ok(img) => img,
            Err(e) => {
                warn!("flowchart render: {e}");
                self.operator.show("Render failed", &e.to_string());
                return Ok(ReviewOutcome::Abandoned);
            }
        };

        let mut output = self.describe_and_show(page, &image).await;

        loop {
            match self.operator.flowchart_action() {
                FlowchartAction::Accept => match output {
                    Some(ref t) => {
                        self.store.append(page, t)?;
                        return Ok(ReviewOutcome::Committed);
                    }
                    None => {
                        self.operator
                            .show("Nothing to save", "the last conversion failed");
                    }
                },
                FlowchartAction::Edit => {
                    let seed = output.as_deref().unwrap_or("");
                    if let Some(outcome) = self.edit_and_confirm(page, seed)? {
                        return Ok(outcome);
                    }
                }
                FlowchartAction::Retry => {
                    output = self.describe_and_show(page, &image).await;
                }
                FlowchartAction::SkipPage => return Ok(ReviewOutcome::Skipped),
                FlowchartAction::QuitMode => return Ok(ReviewOutcome::Quit),
            }
        }
    }

    async fn describe_and_show(&mut self, page: usize, image: &DynamicImage) -> Option<String> {
        match self.converter.describe(page, image).await {
            Ok(t) => {
                let shown = if t.trim().is_empty() {
                    "[empty model output]"
                } else {
                    t.as_str()
                };
                self.operator.show("Model output", shown);
                Some(t)
            }
            Err(e) => {
                warn!("vision conversion: {e}");
                self.operator.show("Conversion failed", &e.to_string());
                None
            }
        }
    }

    /// Scoped editor session, then an explicit save-or-discard decision.
    /// Returns `Some(Committed)` on save, `None` on discard (caller loops).
    fn edit_and_confirm(&mut self, page: usize, seed: &str) -> Result<Option<ReviewOutcome>, KbError> {
        let program = self.config.resolve_editor();
        let edited = match editor::edit_text(&program, seed) {
            Ok(t) => t,
            Err(e) => {
                // Editor failure must not lose the session or the seed text.
                warn!("editor: {e}");
                self.operator.show("Editor failed", &e.to_string());
                return Ok(None);
            }
        };

        let preview = if edited.trim().is_empty() {
            "[empty after edit]"
        } else {
            edited.as_str()
        };
        if self.operator.confirm_save(preview) {
            self.store.append(page, &edited)?;
            Ok(Some(ReviewOutcome::Committed))
        } else {
            self.operator.show("Not saved", "returning to the menu");
            Ok(None)
        }
    }
}

// ── Unattended batch ─────────────────────────────────────────────────────

/// Convert a contiguous page range through the flowchart pipeline with no
/// operator in the loop.
///
/// Per-page failures are logged and counted, never fatal: one throttled
/// vision call must not cost a 200-page overnight run. `on_page` fires after
/// each page with the error, if any (the CLI hangs its progress bar on it).
pub async fn run_batch<C: PageConverter>(
    converter: &C,
    store: &CorpusStore,
    start: usize,
    end: usize,
    mut on_page: impl FnMut(usize, Option<&PageError>),
) -> Result<CurationStats, KbError> {
    let total = converter.page_count();
    let start = start.max(1);
    let end = end.min(total);
    if start > end {
        return Err(KbError::PageOutOfRange { page: start, total });
    }

    let mut stats = CurationStats::default();
    for page in start..=end {
        let result = convert_one(converter, page).await;
        match result {
            Ok(text) => {
                store.append(page, &text)?;
                stats.committed += 1;
                on_page(page, None);
            }
            Err(e) => {
                warn!("batch: {e}");
                stats.failed += 1;
                on_page(page, Some(&e));
            }
        }
    }

    info!(
        "Batch finished: {} committed, {} failed (pages {}..={})",
        stats.committed, stats.failed, start, end
    );
    Ok(stats)
}

async fn convert_one<C: PageConverter>(converter: &C, page: usize) -> Result<String, PageError> {
    let image = converter.render_flowchart(page).await?;
    converter.describe(page, &image).await
}
