//! Snippet extraction from entry content.
//!
//! All functions are UTF-8 safe: cuts only happen on character boundaries and
//! lengths are counted in characters, not bytes.

use crate::types::SnippetMode;
use regex::Regex;
use std::sync::LazyLock;

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script>|<style\b.*?</style>")
        .expect("script/style regex is valid")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex is valid"));

static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").expect("paragraph regex is valid"));

const ELLIPSIS: &str = "...";

/// Extract a snippet from an entry body according to `mode`.
///
/// `is_html` selects whether markup is stripped first. Returns `None` for
/// [`SnippetMode::Disabled`] and for bodies with no visible text.
pub fn extract(
    body: &str,
    is_html: bool,
    query: &str,
    mode: SnippetMode,
    max_chars: usize,
) -> Option<String> {
    if max_chars == 0 {
        return None;
    }

    let text = || {
        if is_html {
            html_to_text(body)
        } else {
            collapse_whitespace(body)
        }
    };

    let snippet = match mode {
        SnippetMode::Disabled => return None,
        SnippetMode::FirstParagraph => {
            let paragraph = if is_html { first_paragraph(body) } else { None };
            match paragraph {
                Some(p) => truncate_chars(&p, max_chars),
                None => truncate_chars(&text(), max_chars),
            }
        },
        SnippetMode::FirstSentence => first_sentence(&text(), max_chars),
        SnippetMode::Matches => around_match(&text(), query, max_chars),
    };

    if snippet.is_empty() {
        None
    } else {
        Some(snippet)
    }
}

/// Strip markup and decode entities, collapsing whitespace.
pub fn html_to_text(html: &str) -> String {
    let without_code = SCRIPT_STYLE_RE.replace_all(html, " ");
    let without_tags = TAG_RE.replace_all(&without_code, " ");
    let decoded = html_escape::decode_html_entities(&without_tags);
    collapse_whitespace(&decoded)
}

/// Text of the first `<p>` element with visible content.
pub fn first_paragraph(html: &str) -> Option<String> {
    PARAGRAPH_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| html_to_text(m.as_str()))
        .find(|text| !text.is_empty())
}

/// The first sentence of `text`, bounded by `max_chars`.
pub fn first_sentence(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_end = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
            if at_end {
                return truncate_chars(&text[..i + c.len_utf8()], max_chars);
            }
        }
    }
    truncate_chars(text, max_chars)
}

/// A window of about `max_chars` characters centred on the first matching
/// query term. Falls back to the beginning of `text` when nothing matches.
pub fn around_match(text: &str, query: &str, max_chars: usize) -> String {
    let found = std::iter::once(query.trim())
        .chain(query.split_whitespace())
        .filter(|term| !term.is_empty())
        .find_map(|term| find_case_insensitive(text, term));

    match found {
        Some((start, end)) => window(text, start, end, max_chars),
        None => truncate_chars(text, max_chars),
    }
}

/// Cut `text` to at most `max_chars` characters, appending an ellipsis when
/// something was dropped.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((boundary, _)) => {
            let mut out = String::with_capacity(boundary + ELLIPSIS.len());
            out.push_str(text[..boundary].trim_end());
            out.push_str(ELLIPSIS);
            out
        },
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte range of the first case-insensitive occurrence of `needle`.
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }

    for (start, _) in haystack.char_indices() {
        let mut lowered = haystack[start..].char_indices().flat_map(|(offset, c)| {
            c.to_lowercase().map(move |lc| (offset + c.len_utf8(), lc))
        });
        let mut end = start;
        let matched = needle.iter().all(|want| match lowered.next() {
            Some((after, got)) if got == *want => {
                end = start + after;
                true
            },
            _ => false,
        });
        if matched {
            return Some((start, end));
        }
    }
    None
}

fn window(text: &str, start: usize, end: usize, max_chars: usize) -> String {
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = offsets.len() - 1;

    let match_start = offsets.partition_point(|&o| o < start);
    let match_end = offsets.partition_point(|&o| o < end);
    let budget = max_chars.saturating_sub(match_end - match_start);

    let from = match_start.saturating_sub(budget / 2);
    let to = (from + max_chars).clamp(match_end, total);

    let mut out = String::with_capacity(offsets[to] - offsets[from] + 2 * ELLIPSIS.len());
    if from > 0 {
        out.push_str(ELLIPSIS);
    }
    out.push_str(text[offsets[from]..offsets[to]].trim());
    if to < total {
        out.push_str(ELLIPSIS);
    }
    out
}
