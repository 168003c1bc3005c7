//! Question answering over the indexed corpus: retrieve, then synthesize.
//!
//! The two halves are separate functions on purpose. Retrieval is
//! deterministic given an index and an embedder; synthesis is a model call
//! whose output is constrained to the retrieved context by the prompt in
//! [`crate::prompts`]. Callers that only want the supporting chunks (or want
//! to inspect them before spending generation tokens) call [`retrieve`]
//! alone; [`answer`] wires the two together.

use crate::chunker::Chunk;
use crate::config::RetrievalConfig;
use crate::embed::Embedder;
use crate::error::KbError;
use crate::index::VectorIndex;
use crate::prompts::synthesis_prompt;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use tracing::debug;

/// A synthesized answer plus the chunks it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Supporting chunks, nearest first, with squared L2 distances.
    pub support: Vec<(Chunk, f32)>,
}

/// Embed the question and return its `k` nearest chunks.
pub async fn retrieve(
    question: &str,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    k: usize,
) -> Result<Vec<(Chunk, f32)>, KbError> {
    let query = embedder.embed(question).await?;
    let hits = index.search(&query, k)?;
    debug!("Retrieved {} chunks for question", hits.len());
    Ok(hits)
}

/// Concatenate retrieved chunks into the context block fed to synthesis.
///
/// Nearest-first order is preserved; blank lines separate chunks so page
/// boundaries inside the context stay visible to the model.
pub fn build_context(hits: &[(Chunk, f32)]) -> String {
    hits.iter()
        .map(|(c, _)| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Generate an answer from a context block. One attempt, no retry; any
/// provider failure surfaces as a collaborator error.
pub async fn synthesize(
    provider: &Arc<dyn LLMProvider>,
    context: &str,
    question: &str,
    config: &RetrievalConfig,
) -> Result<String, KbError> {
    let messages = vec![ChatMessage::user(synthesis_prompt(context, question))];
    let options = CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    };

    let response = provider
        .chat(&messages, Some(&options))
        .await
        .map_err(|e| KbError::Collaborator {
            collaborator: "generation",
            detail: e.to_string(),
        })?;

    debug!(
        "Synthesized answer: {} chars ({} in / {} out tokens)",
        response.content.len(),
        response.prompt_tokens,
        response.completion_tokens
    );
    Ok(response.content)
}

/// Full pipeline for one question: retrieve the nearest chunks, then
/// synthesize an answer constrained to them.
pub async fn answer(
    question: &str,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    provider: &Arc<dyn LLMProvider>,
    config: &RetrievalConfig,
) -> Result<Answer, KbError> {
    let support = retrieve(question, index, embedder, config.top_k).await?;
    let context = build_context(&support);
    let text = synthesize(provider, &context, question, config).await?;
    Ok(Answer { text, support })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: usize, text: &str) -> Chunk {
        Chunk {
            id,
            page: id + 1,
            text: text.to_string(),
        }
    }

    #[test]
    fn context_preserves_nearest_first_order() {
        let hits = vec![
            (chunk(3, "closest chunk"), 0.1),
            (chunk(0, "second chunk"), 0.5),
        ];
        let ctx = build_context(&hits);
        assert_eq!(ctx, "closest chunk\n\nsecond chunk");
    }

    #[test]
    fn context_of_no_hits_is_empty() {
        assert_eq!(build_context(&[]), "");
    }
}
