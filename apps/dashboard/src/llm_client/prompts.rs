// Shared prompt fragments.
// Each feature that talks to the model keeps its own prompts.rs alongside it;
// fragments used across features live here.

/// Keeps answers inside the supplied material.
pub const GROUNDING_INSTRUCTION: &str = "\
Answer the question using ONLY the information provided below. \
If the answer is not contained in the information, say explicitly that the provided information does not contain it. \
Do not guess or rely on outside knowledge.";

/// Asks for output the markdown renderer understands.
pub const MARKDOWN_INSTRUCTION: &str = "\
Format your answer in markdown: headings, bullet or numbered lists, bold for key facts, \
and pipe tables when comparing several items.";
