//! Corpus-to-retrieval pipeline test over the public API.
//!
//! Exercises the offline half of the system end to end: append curated
//! pages, chunk them, build and persist the index with a deterministic
//! embedder, reload it, and retrieve. No network, no PDF engine, no model;
//! the live collaborators are covered by their own modules and by manual
//! runs of the binary.

use async_trait::async_trait;
use guidekb::{
    build_context, load_or_build, retrieve, CorpusStore, Embedder, IndexPaths, KbError,
    RetrievalConfig, VectorIndex,
};
use tempfile::TempDir;

/// Embeds text as simple word statistics; close texts get close vectors.
struct WordStatsEmbedder;

#[async_trait]
impl Embedder for WordStatsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let stage = words.iter().filter(|w| w.contains("stage")).count();
        let drug = words.iter().filter(|w| w.contains("therapy")).count();
        Ok(vec![words.len() as f32, stage as f32, drug as f32])
    }
}

fn seed_corpus(store: &CorpusStore) {
    store
        .append(3, "Stage I disease: surveillance only, no adjuvant therapy recommended.")
        .unwrap();
    store
        .append(
            7,
            "Stage II disease with high-risk features: adjuvant therapy with regimen A \
             for six cycles.",
        )
        .unwrap();
    store
        .append(12, "Follow-up imaging schedule: every six months for two years.")
        .unwrap();
}

fn small_config(top_k: usize) -> RetrievalConfig {
    RetrievalConfig::builder()
        .chunk_size(8)
        .chunk_overlap(2)
        .top_k(top_k)
        .build()
        .unwrap()
}

#[tokio::test]
async fn curated_pages_flow_through_to_retrieval() {
    let dir = TempDir::new().unwrap();
    let store = CorpusStore::new(dir.path().join("corpus.txt"));
    seed_corpus(&store);

    let corpus = store.load().unwrap();
    let config = small_config(3);
    let paths = IndexPaths::in_dir(dir.path().join("index"));

    let (index, rebuilt) =
        load_or_build(&paths, &corpus, &config, &WordStatsEmbedder, false)
            .await
            .unwrap();
    assert!(rebuilt);
    assert!(!index.is_empty());

    // Every chunk carries the ordinal of the page it came from.
    let pages: Vec<usize> = index.chunks().iter().map(|c| c.page).collect();
    assert!(pages.iter().all(|p| [3, 7, 12].contains(p)));

    let hits = retrieve(
        "adjuvant therapy for stage II disease",
        &index,
        &WordStatsEmbedder,
        config.top_k,
    )
    .await
    .unwrap();
    assert!(!hits.is_empty());
    assert!(hits.len() <= 3);

    // The context block preserves nearest-first order.
    let context = build_context(&hits);
    assert!(context.starts_with(&hits[0].0.text));
}

#[tokio::test]
async fn second_run_loads_the_persisted_index_unchanged() {
    let dir = TempDir::new().unwrap();
    let store = CorpusStore::new(dir.path().join("corpus.txt"));
    seed_corpus(&store);

    let corpus = store.load().unwrap();
    let config = small_config(5);
    let paths = IndexPaths::in_dir(dir.path().join("index"));

    let (built, _) = load_or_build(&paths, &corpus, &config, &WordStatsEmbedder, false)
        .await
        .unwrap();
    let (loaded, rebuilt) = load_or_build(&paths, &corpus, &config, &WordStatsEmbedder, false)
        .await
        .unwrap();
    assert!(!rebuilt);
    assert_eq!(loaded, built);
}

#[tokio::test]
async fn appending_after_indexing_is_picked_up_by_a_forced_rebuild() {
    let dir = TempDir::new().unwrap();
    let store = CorpusStore::new(dir.path().join("corpus.txt"));
    seed_corpus(&store);

    let config = small_config(10);
    let paths = IndexPaths::in_dir(dir.path().join("index"));

    let corpus = store.load().unwrap();
    let (first, _) = load_or_build(&paths, &corpus, &config, &WordStatsEmbedder, false)
        .await
        .unwrap();

    store
        .append(20, "Newly curated page about maintenance therapy duration.")
        .unwrap();
    let corpus = store.load().unwrap();

    // Without --rebuild the stale index is served as-is.
    let (stale, rebuilt) = load_or_build(&paths, &corpus, &config, &WordStatsEmbedder, false)
        .await
        .unwrap();
    assert!(!rebuilt);
    assert_eq!(stale.len(), first.len());

    let (fresh, rebuilt) = load_or_build(&paths, &corpus, &config, &WordStatsEmbedder, true)
        .await
        .unwrap();
    assert!(rebuilt);
    assert!(fresh.len() > first.len());
    assert!(fresh.chunks().iter().any(|c| c.page == 20));

    // The rebuilt artifacts replaced the stale pair on disk.
    assert_eq!(VectorIndex::load(&paths).unwrap(), fresh);
}

#[tokio::test]
async fn truncated_artifact_triggers_a_clean_rebuild() {
    let dir = TempDir::new().unwrap();
    let store = CorpusStore::new(dir.path().join("corpus.txt"));
    seed_corpus(&store);

    let corpus = store.load().unwrap();
    let config = small_config(5);
    let paths = IndexPaths::in_dir(dir.path().join("index"));

    load_or_build(&paths, &corpus, &config, &WordStatsEmbedder, false)
        .await
        .unwrap();

    // Simulate a crash that left one artifact half-written.
    let bytes = std::fs::read(&paths.vectors).unwrap();
    std::fs::write(&paths.vectors, &bytes[..bytes.len() / 2]).unwrap();

    let (index, rebuilt) = load_or_build(&paths, &corpus, &config, &WordStatsEmbedder, false)
        .await
        .unwrap();
    assert!(rebuilt);
    assert!(!index.is_empty());
}
