//! Vector index: aligned (embedding, chunk) pairs with nearest-neighbor
//! search.
//!
//! The index is two parallel lists with one invariant: the i-th vector is
//! the embedding of the i-th chunk, for all i. Build preserves chunk order,
//! persist/load round-trip the pair losslessly, and search is brute-force
//! squared Euclidean over the table; corpora here are a few thousand
//! chunks, where a flat scan beats any ANN structure on both simplicity and
//! recall.
//!
//! ## Persistence
//!
//! Two co-located JSON artifacts: a vector table (with its dimension) and
//! the chunk list. Writes go to a temp file in the same directory and are
//! renamed into place, so a crash mid-persist never leaves a half-written
//! artifact. Load validates the alignment invariant; a violated or
//! unparseable pair is a [`KbError::CorpusFormat`], which callers answer
//! with a rebuild, not a crash.

use crate::chunker::Chunk;
use crate::config::RetrievalConfig;
use crate::embed::Embedder;
use crate::error::KbError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Locations of the two persisted artifacts.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub vectors: PathBuf,
    pub chunks: PathBuf,
}

impl IndexPaths {
    /// Conventional artifact names inside an index directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            vectors: dir.join("vectors.json"),
            chunks: dir.join("chunks.json"),
        }
    }

    /// Both-or-neither presence decides load-existing vs. build-fresh.
    pub fn both_present(&self) -> bool {
        self.vectors.is_file() && self.chunks.is_file()
    }
}

#[derive(Serialize, Deserialize)]
struct VectorTable {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

/// In-memory vector index. Read-only after build except for an explicit
/// rebuild, which replaces the whole value.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    chunks: Vec<Chunk>,
}

impl VectorIndex {
    /// Embed every chunk, in order, and assemble the aligned pair.
    ///
    /// Calls the embedding collaborator once per chunk sequentially; order
    /// is the correctness requirement, not latency. A vector whose length
    /// differs from the first one is a fatal
    /// [`KbError::EmbeddingDimensionMismatch`].
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<Self, KbError> {
        let mut vectors = Vec::with_capacity(chunks.len());
        let mut dimension = 0usize;

        for chunk in &chunks {
            let vector = embedder.embed(&chunk.text).await?;
            if vectors.is_empty() {
                dimension = vector.len();
            } else if vector.len() != dimension {
                return Err(KbError::EmbeddingDimensionMismatch {
                    index_dim: dimension,
                    embedder_dim: vector.len(),
                });
            }
            vectors.push(vector);
        }

        info!("Built index: {} chunks, dimension {}", chunks.len(), dimension);
        Ok(Self {
            dimension,
            vectors,
            chunks,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Embedding dimensionality of the stored vectors (0 for an empty index).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    /// Write both artifacts atomically (temp file + rename, same directory).
    pub fn persist(&self, paths: &IndexPaths) -> Result<(), KbError> {
        let table = VectorTable {
            dimension: self.dimension,
            vectors: self.vectors.clone(),
        };
        write_json_atomic(&paths.vectors, &table)?;
        write_json_atomic(&paths.chunks, &self.chunks)?;
        debug!(
            "Persisted index to {} / {}",
            paths.vectors.display(),
            paths.chunks.display()
        );
        Ok(())
    }

    /// Load and validate a persisted pair.
    ///
    /// Unparseable artifacts or a vector/chunk length mismatch are
    /// [`KbError::CorpusFormat`], recoverable by rebuilding.
    pub fn load(paths: &IndexPaths) -> Result<Self, KbError> {
        let table: VectorTable = read_json(&paths.vectors)?;
        let chunks: Vec<Chunk> = read_json(&paths.chunks)?;

        if table.vectors.len() != chunks.len() {
            return Err(KbError::CorpusFormat(format!(
                "index artifacts disagree: {} vectors vs {} chunks",
                table.vectors.len(),
                chunks.len()
            )));
        }
        if let Some(bad) = table.vectors.iter().find(|v| v.len() != table.dimension) {
            return Err(KbError::CorpusFormat(format!(
                "vector of dimension {} in a table declaring {}",
                bad.len(),
                table.dimension
            )));
        }

        Ok(Self {
            dimension: table.dimension,
            vectors: table.vectors,
            chunks,
        })
    }

    /// Nearest-neighbor search: at most `k` chunks by ascending squared
    /// Euclidean distance, ties broken by ascending chunk id.
    ///
    /// A query of the wrong dimensionality is a fatal configuration error,
    /// never silently coerced.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Chunk, f32)>, KbError> {
        if !self.is_empty() && query.len() != self.dimension {
            return Err(KbError::EmbeddingDimensionMismatch {
                index_dim: self.dimension,
                embedder_dim: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, squared_l2(query, v)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, d)| (self.chunks[i].clone(), d))
            .collect())
    }
}

/// Squared Euclidean distance; same metric at build and query time.
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), KbError> {
    let parent = path
        .parent()
        .ok_or_else(|| KbError::Internal(format!("no parent directory for {}", path.display())))?;
    std::fs::create_dir_all(parent)?;

    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec(value)
        .map_err(|e| KbError::Internal(format!("serialize {}: {e}", path.display())))?;
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, KbError> {
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            KbError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            KbError::Io(e)
        }
    })?;
    serde_json::from_slice(&data)
        .map_err(|e| KbError::CorpusFormat(format!("{}: {e}", path.display())))
}

/// Load the persisted index, or rebuild it from corpus text.
///
/// The rebuild path fires when either artifact is absent or the pair is
/// unreadable; recovery, not a fatal error. `force_rebuild` skips the load
/// attempt entirely. A freshly built index is persisted before returning.
/// Returns the index and whether it was rebuilt.
pub async fn load_or_build(
    paths: &IndexPaths,
    corpus_text: &str,
    config: &RetrievalConfig,
    embedder: &dyn Embedder,
    force_rebuild: bool,
) -> Result<(VectorIndex, bool), KbError> {
    if !force_rebuild && paths.both_present() {
        match VectorIndex::load(paths) {
            Ok(index) => {
                debug!("Loaded existing index ({} chunks)", index.len());
                return Ok((index, false));
            }
            Err(KbError::CorpusFormat(detail)) => {
                warn!("Persisted index unreadable ({detail}); rebuilding");
            }
            Err(e) => return Err(e),
        }
    }

    let chunks = crate::chunker::chunk_corpus(corpus_text, config)?;
    let index = VectorIndex::build(chunks, embedder).await?;
    index.persist(paths)?;
    Ok((index, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Deterministic fake: embeds text as [len, first-byte, vowel-count].
    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError> {
            let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count();
            Ok(vec![
                text.len() as f32,
                *text.as_bytes().first().unwrap_or(&0) as f32,
                vowels as f32,
            ])
        }
    }

    fn chunk(id: usize, text: &str) -> Chunk {
        Chunk {
            id,
            page: 1,
            text: text.to_string(),
        }
    }

    fn sample_chunks() -> Vec<Chunk> {
        vec![
            chunk(0, "alpha beta"),
            chunk(1, "gamma delta epsilon"),
            chunk(2, "zeta"),
        ]
    }

    #[tokio::test]
    async fn build_preserves_order_and_alignment() {
        let index = VectorIndex::build(sample_chunks(), &FakeEmbedder).await.unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.dimension(), 3);
        for (i, c) in index.chunks().iter().enumerate() {
            assert_eq!(c.id, i);
            assert_eq!(index.vectors()[i][0], c.text.len() as f32);
        }
    }

    #[tokio::test]
    async fn persist_load_round_trips_elementwise() {
        let dir = TempDir::new().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        let index = VectorIndex::build(sample_chunks(), &FakeEmbedder).await.unwrap();
        index.persist(&paths).unwrap();

        let loaded = VectorIndex::load(&paths).unwrap();
        assert_eq!(loaded, index);

        // Identical search results on the reloaded index.
        let query = vec![10.0, 97.0, 4.0];
        assert_eq!(
            index.search(&query, 10).unwrap(),
            loaded.search(&query, 10).unwrap()
        );
    }

    #[tokio::test]
    async fn search_exact_match_has_distance_zero_and_ranks_first() {
        let index = VectorIndex::build(sample_chunks(), &FakeEmbedder).await.unwrap();
        let stored = index.vectors()[1].clone();
        let hits = index.search(&stored, 10).unwrap();
        assert_eq!(hits[0].0.id, 1);
        assert_eq!(hits[0].1, 0.0);
        // Non-decreasing distances, at most k results.
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
        assert!(hits.len() <= 10);
        assert_eq!(index.search(&stored, 2).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn search_ties_break_by_ascending_chunk_id() {
        // Two identical texts → identical vectors → tied distances.
        let chunks = vec![chunk(0, "same words"), chunk(1, "same words")];
        let index = VectorIndex::build(chunks, &FakeEmbedder).await.unwrap();
        let query = index.vectors()[0].clone();
        let hits = index.search(&query, 2).unwrap();
        assert_eq!(hits[0].0.id, 0);
        assert_eq!(hits[1].0.id, 1);
    }

    #[tokio::test]
    async fn query_dimension_mismatch_is_fatal() {
        let index = VectorIndex::build(sample_chunks(), &FakeEmbedder).await.unwrap();
        let err = index.search(&[1.0, 2.0], 5).unwrap_err();
        assert!(matches!(err, KbError::EmbeddingDimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn misaligned_artifacts_are_corpus_format_error() {
        let dir = TempDir::new().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        let index = VectorIndex::build(sample_chunks(), &FakeEmbedder).await.unwrap();
        index.persist(&paths).unwrap();

        // Drop one chunk from the chunk list on disk.
        let mut chunks: Vec<Chunk> =
            serde_json::from_slice(&std::fs::read(&paths.chunks).unwrap()).unwrap();
        chunks.pop();
        std::fs::write(&paths.chunks, serde_json::to_vec(&chunks).unwrap()).unwrap();

        let err = VectorIndex::load(&paths).unwrap_err();
        assert!(matches!(err, KbError::CorpusFormat(_)));
    }

    const CORPUS: &str = "\n\n=== PAGE 1 ===\nalpha beta gamma delta\n=== END PAGE ===\n";

    fn small_config() -> RetrievalConfig {
        RetrievalConfig::builder()
            .chunk_size(2)
            .chunk_overlap(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn load_or_build_rebuilds_when_artifacts_absent() {
        let dir = TempDir::new().unwrap();
        let paths = IndexPaths::in_dir(dir.path());

        let (index, rebuilt) =
            load_or_build(&paths, CORPUS, &small_config(), &FakeEmbedder, false)
                .await
                .unwrap();
        assert!(rebuilt);
        assert!(!index.is_empty());
        assert!(paths.both_present());

        // Second call loads the persisted pair.
        let (again, rebuilt) =
            load_or_build(&paths, CORPUS, &small_config(), &FakeEmbedder, false)
                .await
                .unwrap();
        assert!(!rebuilt);
        assert_eq!(again, index);
    }

    #[tokio::test]
    async fn load_or_build_recovers_from_garbage_artifacts() {
        let dir = TempDir::new().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        std::fs::write(&paths.vectors, b"not json").unwrap();
        std::fs::write(&paths.chunks, b"also not json").unwrap();

        let (_, rebuilt) = load_or_build(&paths, CORPUS, &small_config(), &FakeEmbedder, false)
            .await
            .unwrap();
        assert!(rebuilt);
        assert!(VectorIndex::load(&paths).is_ok());
    }

    #[tokio::test]
    async fn empty_index_searches_to_nothing() {
        let index = VectorIndex::build(Vec::new(), &FakeEmbedder).await.unwrap();
        assert!(index.search(&[1.0, 2.0, 3.0], 5).unwrap().is_empty());
    }
}
