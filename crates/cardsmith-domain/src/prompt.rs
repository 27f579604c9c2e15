//! Prompt construction for flashcard generation.

use cardsmith_llm::{CompletionRequest, Message};

use crate::services::generation::GenerationOptions;

/// Instruction describing the output contract.
pub const SYSTEM_PROMPT: &str = "\
You create study flashcards from documents. \
Respond with a JSON array of objects, each with exactly two string fields: \
\"question\" and \"answer\". \
Questions must be answerable from the document alone and answers must be concise. \
Cover the most important concepts, definitions and facts. \
Output only the JSON array: no prose, no explanations, no code fences.";

/// Cut `text` to at most `max_chars` characters.
///
/// Returns the possibly shortened text and whether anything was removed.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => (&text[..byte_index], true),
        None => (text, false),
    }
}

/// Build the user message carrying the document.
pub fn user_message(document: &str) -> String {
    format!("Create flashcards from the following document.\n\n---\n{document}\n---")
}

/// Build the completion request for a document.
///
/// `document` must already be truncated.
pub fn build_request(document: &str, options: &GenerationOptions) -> CompletionRequest {
    CompletionRequest::new(
        options.model.clone(),
        vec![Message::user(user_message(document))],
        options.max_tokens,
    )
    .with_system(SYSTEM_PROMPT)
    .with_temperature(options.temperature)
}
