//! Error types for the guidekb library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`KbError`] is fatal or query-level: the pipeline cannot proceed
//!   (bad source document, unreadable corpus, embedding dimension mismatch).
//!   Returned as `Err(KbError)` from top-level operations.
//!
//! * [`PageError`] is non-fatal: a single page failed (render glitch,
//!   transient vision-model error) but the session or batch continues.
//!   The curation loop reports it with the page ordinal and action so the
//!   operator can retry manually.
//!
//! One deliberate exception to "fatal": [`KbError::InvalidRegion`] is fatal
//! for the current extraction attempt only; inside a review loop the
//! operator recovers by adjusting margins.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal and query-level errors returned by the guidekb library.
///
/// Page-level failures use [`PageError`] and are handled at the curation
/// boundary rather than propagated here.
#[derive(Debug, Error)]
pub enum KbError {
    // ── Source document errors ────────────────────────────────────────────
    /// Source PDF was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt or unreadable: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// A page ordinal exceeds the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Geometry errors ───────────────────────────────────────────────────
    /// Margins reduced the page to a degenerate or inverted rectangle.
    ///
    /// Recoverable inside a review loop: the operator picks smaller margins
    /// and extraction is retried.
    #[error(
        "Margins produce an invalid clip region on a {width}x{height}pt page \
         (left+right={lr}, top+bottom={tb}); reduce the margins and retry"
    )]
    InvalidRegion {
        width: f32,
        height: f32,
        lr: f32,
        tb: f32,
    },

    /// Render scale must be positive; a zero-height page cannot be mapped
    /// to pixels.
    #[error("Invalid render scale {scale} (page height must be non-zero)")]
    InvalidScale { scale: f32 },

    // ── Corpus / index errors ─────────────────────────────────────────────
    /// Persisted corpus or index artifact is malformed.
    ///
    /// Where a rebuild path exists (the index), callers treat this as a
    /// trigger to rebuild from the corpus rather than a crash.
    #[error("Malformed corpus or index data: {0}")]
    CorpusFormat(String),

    /// A persisted index was built with a different embedding dimension
    /// than the active embedding collaborator produces.
    ///
    /// Fatal: silently coercing vectors of different dimensionality would
    /// corrupt every subsequent search.
    #[error(
        "Embedding dimension mismatch: index has {index_dim}, embedder returned {embedder_dim}.\n\
         Rebuild the index with `guidekb index --rebuild` or restore the original embedding model."
    )]
    EmbeddingDimensionMismatch {
        index_dim: usize,
        embedder_dim: usize,
    },

    // ── Collaborator errors ───────────────────────────────────────────────
    /// A vision, embedding, or generation collaborator call failed.
    #[error("{collaborator} collaborator call failed: {detail}")]
    Collaborator {
        collaborator: &'static str,
        detail: String,
    },

    /// No LLM provider could be resolved from configuration or environment.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Editor errors ─────────────────────────────────────────────────────
    /// The external editor program failed to start or exited abnormally.
    #[error("Editor '{program}' failed: {detail}")]
    EditorFailed { program: String, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or option validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O and catch-all ─────────────────────────────────────────────────
    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Reported by the curation loop and the unattended batch; processing of
/// other pages always continues.
#[derive(Debug, Clone, Error)]
pub enum PageError {
    /// Page rasterisation or cropping failed.
    #[error("Page {page}: render failed: {detail}")]
    Render { page: usize, detail: String },

    /// Selectable-text extraction failed.
    #[error("Page {page}: text extraction failed: {detail}")]
    Extract { page: usize, detail: String },

    /// The vision collaborator rejected or failed the conversion call.
    #[error("Page {page}: vision conversion failed: {detail}")]
    Vision { page: usize, detail: String },

    /// The clip region was degenerate for this page's geometry.
    #[error("Page {page}: {detail}")]
    Region { page: usize, detail: String },
}

impl PageError {
    /// The ordinal of the page this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::Render { page, .. }
            | PageError::Extract { page, .. }
            | PageError::Vision { page, .. }
            | PageError::Region { page, .. } => *page,
        }
    }
}
