//! Append-only, page-delimited corpus store.
//!
//! The single persistence format shared by every producer: each committed
//! page becomes one framed block,
//!
//! ```text
//! === PAGE 17 ===
//! <trimmed content>
//! === END PAGE ===
//! ```
//!
//! appended in commit order (not necessarily page order; an operator may
//! skip and revisit pages out of sequence). There is no update or delete:
//! correction is a fresh append after the operator verifies content, never a
//! mutation of a prior block. This keeps a curation crash from ever
//! corrupting earlier work.

use crate::error::KbError;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const PAGE_START_PREFIX: &str = "=== PAGE ";
const PAGE_START_SUFFIX: &str = " ===";
const PAGE_END: &str = "=== END PAGE ===";

/// One committed unit of page content, as parsed back from the corpus file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBlock {
    /// 1-based page ordinal recorded in the start marker.
    pub page: usize,
    /// Trimmed content between the markers.
    pub content: String,
}

/// Append-only corpus file handle.
///
/// Single-writer by construction: one interactive session owns the file.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    path: PathBuf,
}

impl CorpusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one page block. Calling twice creates two blocks; avoiding
    /// duplicates is the caller's responsibility.
    pub fn append(&self, page: usize, content: &str) -> Result<(), KbError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        write!(
            file,
            "\n\n{}{}{}\n{}\n{}\n",
            PAGE_START_PREFIX,
            page,
            PAGE_START_SUFFIX,
            content.trim(),
            PAGE_END
        )?;
        debug!("Appended page {} block ({} bytes)", page, content.len());
        Ok(())
    }

    /// Load the entire corpus text.
    pub fn load(&self) -> Result<String, KbError> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KbError::FileNotFound {
                    path: self.path.clone(),
                }
            } else {
                KbError::Io(e)
            }
        })
    }

    /// Load and parse the corpus into page blocks in append order.
    pub fn load_blocks(&self) -> Result<Vec<PageBlock>, KbError> {
        parse_blocks(&self.load()?)
    }
}

/// Parse corpus text into page blocks.
///
/// Strict about framing: an unmatched start or end marker, or a start marker
/// without a parseable ordinal, is a [`KbError::CorpusFormat`]. Text outside
/// any block (blank separators) is ignored.
pub fn parse_blocks(text: &str) -> Result<Vec<PageBlock>, KbError> {
    let mut blocks = Vec::new();
    let mut current: Option<(usize, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_end();
        if let Some(ordinal) = parse_start_marker(trimmed) {
            let ordinal = ordinal?;
            if current.is_some() {
                return Err(KbError::CorpusFormat(format!(
                    "page {ordinal} block opened before previous block was closed"
                )));
            }
            current = Some((ordinal, Vec::new()));
        } else if trimmed == PAGE_END {
            let (page, lines) = current.take().ok_or_else(|| {
                KbError::CorpusFormat("end marker without a matching start marker".into())
            })?;
            blocks.push(PageBlock {
                page,
                content: lines.join("\n").trim().to_string(),
            });
        } else if let Some((_, ref mut lines)) = current {
            lines.push(trimmed);
        } else if !trimmed.trim().is_empty() {
            return Err(KbError::CorpusFormat(format!(
                "content outside any page block: {:?}",
                trimmed
            )));
        }
    }

    if let Some((page, _)) = current {
        return Err(KbError::CorpusFormat(format!(
            "page {} block is missing its end marker",
            page
        )));
    }

    Ok(blocks)
}

/// Returns `Some(ordinal)` when the line is a start marker; the inner Result
/// distinguishes a marker with an unparseable ordinal.
fn parse_start_marker(line: &str) -> Option<Result<usize, KbError>> {
    let rest = line.strip_prefix(PAGE_START_PREFIX)?;
    let digits = rest.strip_suffix(PAGE_START_SUFFIX)?;
    Some(digits.trim().parse::<usize>().map_err(|_| {
        KbError::CorpusFormat(format!("unparseable page ordinal in marker: {:?}", line))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CorpusStore {
        CorpusStore::new(dir.path().join("corpus.txt"))
    }

    #[test]
    fn two_appends_yield_two_framed_blocks_in_append_order() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        // Out-of-sequence ordinals: order reflects commits, not page numbers.
        s.append(9, "ninth page text\n").unwrap();
        s.append(3, "  third page text  ").unwrap();

        let blocks = s.load_blocks().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], PageBlock { page: 9, content: "ninth page text".into() });
        assert_eq!(blocks[1], PageBlock { page: 3, content: "third page text".into() });

        let raw = s.load().unwrap();
        assert_eq!(raw.matches("=== PAGE").count(), 2);
        assert_eq!(raw.matches("=== END PAGE ===").count(), 2);
    }

    #[test]
    fn multi_line_content_round_trips() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.append(1, "line one\nline two\n\nline four").unwrap();
        let blocks = s.load_blocks().unwrap();
        assert_eq!(blocks[0].content, "line one\nline two\n\nline four");
    }

    #[test]
    fn missing_end_marker_is_corpus_format_error() {
        let err = parse_blocks("\n=== PAGE 4 ===\nsome text\n").unwrap_err();
        assert!(matches!(err, KbError::CorpusFormat(_)), "got: {err}");
    }

    #[test]
    fn end_without_start_is_corpus_format_error() {
        let err = parse_blocks("=== END PAGE ===\n").unwrap_err();
        assert!(matches!(err, KbError::CorpusFormat(_)));
    }

    #[test]
    fn unparseable_ordinal_is_corpus_format_error() {
        let err = parse_blocks("=== PAGE twelve ===\nx\n=== END PAGE ===\n").unwrap_err();
        assert!(matches!(err, KbError::CorpusFormat(_)));
    }

    #[test]
    fn stray_text_between_blocks_is_rejected() {
        let text = "=== PAGE 1 ===\na\n=== END PAGE ===\nstray\n";
        let err = parse_blocks(text).unwrap_err();
        assert!(matches!(err, KbError::CorpusFormat(_)));
    }

    #[test]
    fn empty_corpus_parses_to_no_blocks() {
        assert!(parse_blocks("").unwrap().is_empty());
        assert!(parse_blocks("\n\n").unwrap().is_empty());
    }
}
