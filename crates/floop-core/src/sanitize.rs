//! Content sanitization for correction text before it reaches the learning
//! pipeline (§4.B). Invoked by the `learn` collaborator boundary — never by
//! internal code that already trusts its input (seeded/pack content is
//! authored, not user-submitted).

use crate::error::FloopError;

/// Fixed cap on sanitized content length (characters, not bytes).
const MAX_LEN: usize = 4_000;

/// Strip control characters, HTML/XML-looking tags, demote Markdown
/// headings to list items, and truncate to a fixed cap. Idempotent:
/// `sanitize(sanitize(x)) == sanitize(x)` (§8 invariant) — none of the
/// passes below can reintroduce a character a later pass would strip.
pub fn sanitize(input: &str) -> String {
    let without_tags = strip_tags(input);
    let without_control = strip_control_chars(&without_tags);
    let demoted = demote_headings(&without_control);
    let truncated = truncate_chars(&demoted, MAX_LEN);
    truncated.trim().to_string()
}

/// `sanitize` plus the empty-after-sanitization rejection (§7 Validation).
pub fn sanitize_checked(input: &str) -> Result<String, FloopError> {
    let cleaned = sanitize(input);
    if cleaned.is_empty() {
        return Err(FloopError::Validation("content is empty after sanitization".to_string()));
    }
    Ok(cleaned)
}

/// Drop every control character except newline and tab (preserves
/// multi-line/indented structure while removing e.g. ANSI escapes and NUL).
fn strip_control_chars(s: &str) -> String {
    s.chars().filter(|c| !c.is_control() || *c == '\n' || *c == '\t').collect()
}

/// Naive angle-bracket tag stripping — good enough to neutralize
/// XML/HTML-looking markup in free-form correction text without a full
/// parser. An unterminated `<` consumes the remainder of the string, which
/// is intentional: a dangling opening tag is itself suspicious content.
fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            _ => out.push(c),
        }
    }
    out
}

/// Markdown headings (`#`, `##`, ...) become list items so a correction
/// can't inject a heading into the assembled prompt block (§4.I renders
/// canonical content directly).
fn demote_headings(s: &str) -> String {
    s.lines()
        .map(|line| match line.trim_start().strip_prefix('#') {
            Some(rest) => {
                let rest = rest.trim_start_matches('#').trim_start();
                format!("- {rest}")
            }
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_chars(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        s.to_string()
    } else {
        s.chars().take(cap).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_is_idempotent() {
        let input = "## Heading\n<script>alert(1)</script>text\u{0}\u{1b}";
        let once = sanitize(input);
        let twice = sanitize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn strips_control_characters() {
        let cleaned = sanitize("hello\u{0}world\u{7}");
        assert_eq!(cleaned, "helloworld");
    }

    #[test]
    fn strips_html_like_tags() {
        let cleaned = sanitize("never <b>ever</b> commit secrets");
        assert_eq!(cleaned, "never ever commit secrets");
    }

    #[test]
    fn demotes_markdown_headings_to_list_items() {
        let cleaned = sanitize("## Always do this\nand this too");
        assert_eq!(cleaned, "- Always do this\nand this too");
    }

    #[test]
    fn truncates_to_the_fixed_cap() {
        let input = "a".repeat(MAX_LEN + 500);
        let cleaned = sanitize(&input);
        assert_eq!(cleaned.chars().count(), MAX_LEN);
    }

    #[test]
    fn truncation_landing_on_whitespace_stays_idempotent() {
        // Cap is MAX_LEN=4000; this input truncates at a space, which a
        // naive trim-then-truncate order would shrink further on a second
        // pass (4000 -> 3999), breaking sanitize(sanitize(x)) == sanitize(x).
        let input = format!("{} {}", "a".repeat(MAX_LEN - 1), "b".repeat(501));
        let once = sanitize(&input);
        let twice = sanitize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_after_sanitization_is_rejected() {
        let result = sanitize_checked("   <><><>   ");
        assert!(result.is_err());
    }

    #[test]
    fn non_empty_content_passes_through() {
        let result = sanitize_checked("use pathlib instead of os.path").unwrap();
        assert_eq!(result, "use pathlib instead of os.path");
    }
}
