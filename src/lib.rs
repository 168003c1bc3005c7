//! # guidekb
//!
//! Curate a knowledge base from scanned clinical-guideline PDFs, then answer
//! questions over it with retrieval-augmented generation.
//!
//! ## Why this crate?
//!
//! Guideline PDFs mix three kinds of pages: running text that extracts
//! cleanly, decision flowcharts that extract as garbage, and boilerplate
//! worth nothing at all. Fully automatic ingestion either drops the
//! flowcharts (losing the actual recommendations) or floods the corpus with
//! noise. This crate puts a human in the loop: a page-by-page curation
//! session where the operator picks raw extraction or vision-model
//! conversion per page, adjusts clip margins, edits the result, and commits
//! only what is worth keeping. The curated corpus then feeds a small
//! brute-force vector index and a context-constrained answer synthesizer.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Curate   per-page review: clip margins → extract text or
//!  │              render + vision model → edit → commit (or batch mode)
//!  ├─ 2. Corpus   append-only page-delimited text file
//!  ├─ 3. Chunk    page-aware sliding window (600 words, 100 overlap)
//!  ├─ 4. Index    embed chunks → aligned (vectors, chunks) JSON pair
//!  └─ 5. Ask      embed question → k nearest chunks → constrained answer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use guidekb::{
//!     CorpusStore, IndexPaths, OpenAiEmbedder, RetrievalConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let corpus = CorpusStore::new("corpus.txt").load()?;
//!     let config = RetrievalConfig::default();
//!     let embedder = OpenAiEmbedder::from_env()?;
//!     let paths = IndexPaths::in_dir("index");
//!
//!     let (index, _rebuilt) =
//!         guidekb::load_or_build(&paths, &corpus, &config, &embedder, false).await?;
//!     let hits = guidekb::retrieve("first-line therapy for stage II?",
//!         &index, &embedder, config.top_k).await?;
//!     for (chunk, dist) in &hits {
//!         println!("page {} (d² = {:.3})", chunk.page, dist);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `guidekb` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! guidekb = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod curate;
pub mod editor;
pub mod embed;
pub mod error;
pub mod geometry;
pub mod index;
pub mod pdf;
pub mod prompts;
pub mod retrieve;
pub mod vision;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use chunker::{chunk_blocks, chunk_corpus, Chunk};
pub use config::{CurationConfig, CurationConfigBuilder, RetrievalConfig, RetrievalConfigBuilder};
pub use corpus::{CorpusStore, PageBlock};
pub use curate::{
    resolve_provider, run_batch, CurationSession, CurationStats, FlowchartAction, Operator,
    PageAction, PageConverter, PdfPageConverter, RawAction,
};
pub use embed::{Embedder, OpenAiEmbedder};
pub use error::{KbError, PageError};
pub use geometry::{compute_clip, compute_crop_box, ClipRect, Margins, PageBounds, PixelBox};
pub use index::{load_or_build, IndexPaths, VectorIndex};
pub use pdf::{PdfSource, RenderedPage};
pub use retrieve::{answer, build_context, retrieve, synthesize, Answer};
