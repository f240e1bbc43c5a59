//! Prompts for the vision-model OCR pass.
//!
//! Kept apart from [`crate::pipeline::ocr`] so prompt wording can change and
//! be inspected by tests without touching provider or timeout handling.

/// System prompt for transcribing one rasterised page.
///
/// The answer is appended verbatim (after cleanup) to the page's native text,
/// so the model must return plain text only.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an OCR engine. Transcribe all text visible in the page image.

Rules:
1. Output plain text only. No Markdown, no HTML, no code fences.
2. Preserve reading order as a human would read the page, top to bottom.
3. Keep line breaks between lines and a blank line between paragraphs.
4. For tables, put one row per line with cells separated by a tab character.
5. Transcribe exactly what is printed. Do not translate, summarise or correct.
6. Skip purely decorative elements. Do not describe images.
7. If the page contains no legible text, output nothing."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_asks_for_plain_text() {
        assert!(OCR_SYSTEM_PROMPT.contains("plain text only"));
        assert!(!OCR_SYSTEM_PROMPT.contains("Markdown content"));
    }
}
