//! Input text cleanup and sentence chunking.
//!
//! Upstream language models sometimes leak markdown headings or prompt
//! scaffolding into the text they hand to the speaker; [`sanitize`] strips
//! the known artefacts before synthesis.

/// Spoken instead of leaked prompt scaffolding.
pub const DEFAULT_FALLBACK_GREETING: &str = "Hello. How can I help you?";

/// Markup removed verbatim, longest first.
const STRIPPED_MARKUP: &[&str] = &["## Response", "##", "**"];

/// Prefixes that mark text as prompt scaffolding rather than a reply.
const SCAFFOLD_PREFIXES: &[&str] = &["The system will", "Conversation"];

/// Characters after which a chunk may end.
const BREAK_CHARS: &[char] = &['.', '!', ',', '?', ';'];

/// Strip markdown artefacts and replace scaffolding with `fallback`.
pub fn sanitize(text: &str, fallback: &str) -> String {
    let mut cleaned = text.to_owned();
    for markup in STRIPPED_MARKUP {
        cleaned = cleaned.replace(markup, "");
    }
    let cleaned = cleaned.trim();
    if SCAFFOLD_PREFIXES.iter().any(|p| cleaned.starts_with(p)) {
        return fallback.to_owned();
    }
    cleaned.to_owned()
}

/// Split after `. ! , ? ;` when followed by whitespace.
///
/// Chunks are trimmed; empty chunks are dropped. Punctuation not followed
/// by whitespace (decimals, abbreviations glued to the next word) does not
/// split.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if BREAK_CHARS.contains(&c) && chars.peek().is_some_and(|n| n.is_whitespace()) {
            push_chunk(&mut chunks, &current);
            current.clear();
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
        }
    }
    push_chunk(&mut chunks, &current);
    chunks
}

fn push_chunk(chunks: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_owned());
    }
}
