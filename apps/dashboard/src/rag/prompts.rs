// Prompt text for the record chat. The whole exchange is a single turn:
// history stays in the local transcript and is never sent to the model.

use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, MARKDOWN_INSTRUCTION};

/// Opening line of every question prompt.
pub const ASSISTANT_ROLE: &str = "You are an assistant helping someone evaluate an opportunity.";

/// Stand-in for the context block when nothing is selected or uploaded.
pub const NO_CONTEXT: &str = "(No record is selected and no documents were uploaded.)\n";

/// Wraps an assembled context block and the user's question into one prompt.
pub fn build_prompt(context: &str, question: &str) -> String {
    let context = if context.trim().is_empty() {
        NO_CONTEXT
    } else {
        context
    };
    format!(
        "{ASSISTANT_ROLE}\n{GROUNDING_INSTRUCTION}\n{MARKDOWN_INSTRUCTION}\n\n---\n{context}---\n\nQUESTION: {}",
        question.trim()
    )
}
