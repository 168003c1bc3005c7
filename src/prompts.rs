//! Instruction templates for the vision and generation collaborators.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: the two curation tools (interactive and
//!    unattended) send the identical instruction set, so their outputs land
//!    in the corpus in one canonical shape.
//!
//! 2. **Testability**: unit tests inspect prompts directly without calling
//!    a real model, so a wording regression is caught in CI.
//!
//! Callers can override the vision template via
//! [`crate::config::CurationConfig::vision_instructions`].

/// Instruction set for converting a cropped guideline-page image to text.
///
/// The target pages mix flowcharts, tables, and running paragraphs; the
/// rules below flatten all three into retrieval-friendly prose while keeping
/// every clinically meaningful detail (conditioned drug mentions, margin
/// references, the printed folio label) and dropping recurring boilerplate.
pub const VISION_INSTRUCTIONS: &str = r#"You are given an image of a guideline page that may contain a flowchart, a table, a diagram, or plain paragraphs. Convert it to text suitable for retrieval.

Follow these rules precisely:

1. FLOWCHARTS AND DIAGRAMS
   - Merge the visual guidance into a single clear, concise paragraph
   - Do NOT add facts not present in the image or invent steps

2. PARAGRAPH TEXT
   - Preserve paragraph text verbatim; remove only footnote superscripts

3. TABLES
   - Convert tabular content into structured key-value form

4. CONDITIONED TREATMENTS
   - When drugs are recommended based on a gene deletion or mutation
     (e.g. EGFR exon variants), state the condition and the drugs explicitly

5. REFERENCES
   - Keep the bracketed references shown in the side margin of the flowchart
   - Do NOT include the category note ("All recommendations are category 2A
     unless otherwise indicated") at the bottom
   - Do NOT include the word "References" from the bottom corner

6. FOLIO LABEL
   - Append the printed page label (the letter-and-number code at the
     bottom right) as a final line on its own"#;

/// Constrained prompt for answer synthesis from retrieved context.
///
/// The placeholders `{context}` and `{question}` are filled by
/// [`synthesis_prompt`].
const SYNTHESIS_TEMPLATE: &str = r#"You are an expert guideline assistant.

Answer the question strictly using the CONTEXT below.
If the answer is not present, say:
"Not specified in the guideline text provided."

For staging questions:
First determine the classification strictly from the stated criteria.
Once the classification is determined:
- Use ONLY recommendations explicitly stated for that exact classification.
- Do NOT include recommendations for higher or lower classifications.
- If a recommendation applies only above a threshold, verify the threshold explicitly.
If the guideline text is ambiguous, state "Not specified".

CONTEXT:
{context}

QUESTION:
{question}"#;

/// Assemble the synthesis prompt for a question and its retrieved context.
pub fn synthesis_prompt(context: &str, question: &str) -> String {
    SYNTHESIS_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question)
}
