//! Page-aware sliding-window chunking.
//!
//! The corpus is split back into page blocks, and each block is windowed
//! independently: a chunk never spans two pages, so a retrieved chunk always
//! maps to exactly one committed page. Window starts advance by
//! `size − overlap` words; the final window is truncated to the remaining
//! words rather than padded. Output order is (block order, window order
//! within block) and becomes the chunk id order the vector index relies on.

use crate::config::RetrievalConfig;
use crate::corpus::{parse_blocks, PageBlock};
use crate::error::KbError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A contiguous word window from one page block; the unit indexed for
/// retrieval.
///
/// `id` is positional: assigned at build time, not persisted separately
/// from the chunk list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based sequence id in build order.
    pub id: usize,
    /// Owning page ordinal (1-based, from the page block).
    pub page: usize,
    /// The window text, words joined by single spaces.
    pub text: String,
}

/// Chunk the raw corpus text.
///
/// Parses page blocks first; framing errors propagate as
/// [`KbError::CorpusFormat`].
pub fn chunk_corpus(corpus: &str, config: &RetrievalConfig) -> Result<Vec<Chunk>, KbError> {
    let blocks = parse_blocks(corpus)?;
    Ok(chunk_blocks(&blocks, config))
}

/// Window each non-empty block into chunks.
///
/// `config` is assumed validated (`overlap < size`, enforced by
/// [`RetrievalConfig`]'s builder); the walk below would not terminate
/// otherwise.
pub fn chunk_blocks(blocks: &[PageBlock], config: &RetrievalConfig) -> Vec<Chunk> {
    debug_assert!(config.chunk_overlap < config.chunk_size);
    let step = config.chunk_size - config.chunk_overlap;

    let mut chunks = Vec::new();
    for block in blocks {
        let words: Vec<&str> = block.content.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        let mut start = 0;
        while start < words.len() {
            let end = (start + config.chunk_size).min(words.len());
            chunks.push(Chunk {
                id: chunks.len(),
                page: block.page,
                text: words[start..end].join(" "),
            });
            start += step;
        }
    }

    debug!(
        "Chunked {} page blocks into {} chunks (size {}, overlap {})",
        blocks.len(),
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(size: usize, overlap: usize) -> RetrievalConfig {
        RetrievalConfig::builder()
            .chunk_size(size)
            .chunk_overlap(overlap)
            .build()
            .unwrap()
    }

    fn block(page: usize, words: usize) -> PageBlock {
        let content = (0..words)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        PageBlock { page, content }
    }

    #[test]
    fn thousand_words_size_600_overlap_100() {
        let chunks = chunk_blocks(&[block(1, 1000)], &cfg(600, 100));
        assert_eq!(chunks.len(), 2);
        // Windows start at 0 and 500.
        assert!(chunks[0].text.starts_with("w0 "));
        assert_eq!(chunks[0].text.split(' ').count(), 600);
        assert!(chunks[1].text.starts_with("w500 "));
        // Second window truncated to the remaining 500 words (500..999).
        assert_eq!(chunks[1].text.split(' ').count(), 500);
        assert!(chunks[1].text.ends_with(" w999"));
    }

    #[test]
    fn chunks_never_cross_page_blocks() {
        let chunks = chunk_blocks(&[block(1, 50), block(2, 50)], &cfg(600, 100));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[1].page, 2);
        assert!(!chunks[0].text.contains("w49 w0"), "window crossed a page");
    }

    #[test]
    fn ids_are_positional_across_blocks() {
        let chunks = chunk_blocks(&[block(5, 700), block(2, 10)], &cfg(600, 100));
        let ids: Vec<usize> = chunks.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        // Block order, then window order within the block.
        assert_eq!(chunks[0].page, 5);
        assert_eq!(chunks[1].page, 5);
        assert_eq!(chunks[2].page, 2);
    }

    #[test]
    fn empty_blocks_are_skipped() {
        let blocks = vec![
            PageBlock { page: 1, content: String::new() },
            block(2, 5),
            PageBlock { page: 3, content: "   ".into() },
        ];
        let chunks = chunk_blocks(&blocks, &cfg(10, 2));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page, 2);
    }

    #[test]
    fn overlap_ge_size_cannot_be_configured() {
        assert!(RetrievalConfig::builder()
            .chunk_size(10)
            .chunk_overlap(10)
            .build()
            .is_err());
        assert!(RetrievalConfig::builder()
            .chunk_size(10)
            .chunk_overlap(11)
            .build()
            .is_err());
    }

    #[test]
    fn chunk_corpus_parses_framing() {
        let corpus = "\n\n=== PAGE 1 ===\nalpha beta gamma\n=== END PAGE ===\n";
        // Window starts advance by one word until they pass the last word,
        // so the final window is the single trailing word.
        let chunks = chunk_corpus(corpus, &cfg(2, 1)).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "alpha beta");
        assert_eq!(chunks[1].text, "beta gamma");
        assert_eq!(chunks[2].text, "gamma");
    }

    #[test]
    fn malformed_corpus_propagates_format_error() {
        let err = chunk_corpus("=== PAGE 1 ===\nno end", &cfg(5, 1)).unwrap_err();
        assert!(matches!(err, crate::error::KbError::CorpusFormat(_)));
    }
}
