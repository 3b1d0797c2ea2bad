//! Deterministic cleanup of OCR-collaborator markdown output.
//!
//! Vision models occasionally wrap their whole answer in
//! ` ```markdown ... ``` ` fences, emit Windows line endings, or leave
//! runs of blank lines behind. These cheap string/regex rules normalise
//! the text before it is written into a batch artifact, so aggregation
//! concatenates clean sections. Each rule is a pure `&str → String`
//! function with no shared state.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to raw OCR output.
///
/// Rules (applied in order):
/// 1. Strip an outer markdown fence wrapping the whole output
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Ensure the text ends with exactly one newline
pub fn clean_ocr_output(input: &str) -> String {
    let s = strip_outer_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown)?\s*\n(.*?)\n?```\s*$").unwrap());

fn strip_outer_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 5: Ensure the text ends with a single newline ───────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fence_wrapper() {
        let input = "```markdown\n# Heading\n\nBody text.\n```";
        assert_eq!(clean_ocr_output(input), "# Heading\n\nBody text.\n");
    }

    #[test]
    fn strips_bare_fence_wrapper() {
        let input = "```\nPlain content\n```";
        assert_eq!(clean_ocr_output(input), "Plain content\n");
    }

    #[test]
    fn inner_fences_survive() {
        let input = "Before\n\n```rust\nfn main() {}\n```\n\nAfter";
        let cleaned = clean_ocr_output(input);
        assert!(cleaned.contains("```rust"));
        assert!(cleaned.starts_with("Before"));
    }

    #[test]
    fn normalises_crlf_and_trailing_spaces() {
        let input = "line one   \r\nline two\t\r\n";
        assert_eq!(clean_ocr_output(input), "line one\nline two\n");
    }

    #[test]
    fn collapses_blank_line_runs() {
        let input = "a\n\n\n\n\n\nb";
        assert_eq!(clean_ocr_output(input), "a\n\n\nb\n");
    }

    #[test]
    fn empty_input_becomes_single_newline() {
        assert_eq!(clean_ocr_output(""), "\n");
        assert_eq!(clean_ocr_output("   \n  \n"), "\n");
    }

    #[test]
    fn plain_text_gains_final_newline() {
        assert_eq!(clean_ocr_output("just text"), "just text\n");
    }
}
