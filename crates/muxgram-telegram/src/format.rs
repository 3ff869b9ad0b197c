//! Telegram HTML rendering helpers.
//!
//! Telegram accepts a small HTML subset (`<b>`, `<i>`, `<code>`, `<pre>`,
//! `<a href>`), rejects malformed messages outright, and caps a message at
//! 4096 bytes. Everything sent goes through these helpers: escaping,
//! markdown conversion for agent responses, and tag-safe chunking.

use std::sync::LazyLock;

use regex::Regex;

/// Practical per-message cap, with margin under Telegram's 4096.
pub const MAX_MESSAGE_LEN: usize = 4000;

/// Escape text for inclusion in Telegram HTML (text or attribute position).
#[must_use]
pub fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Wrap already-plain text in a fenced block.
#[must_use]
pub fn code_block(text: &str) -> String {
    format!("<pre>{}</pre>", html_escape(text))
}

/// Wrap already-plain text in inline code.
#[must_use]
pub fn inline_code(text: &str) -> String {
    format!("<code>{}</code>", html_escape(text))
}

/// Convert agent-response markdown to Telegram HTML.
///
/// Fenced code blocks are carved out first (split on ```` ``` ````, odd
/// segments are code) so inline transforms never touch code. Within prose
/// segments: bold, inline code, links with safe schemes, and headings.
#[must_use]
pub fn markdown_to_html(md: &str) -> String {
    let mut out = String::with_capacity(md.len());
    for (i, segment) in md.split("```").enumerate() {
        if i % 2 == 1 {
            // Code segment; drop an initial language tag line.
            let body = match segment.split_once('\n') {
                Some((first, rest)) if is_language_tag(first) => rest,
                _ => segment,
            };
            out.push_str(&code_block(body.trim_end_matches('\n')));
        } else {
            out.push_str(&prose_to_html(segment));
        }
    }
    out
}

fn is_language_tag(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c.is_ascii_alphanumeric() || c == '+')
}

fn prose_to_html(text: &str) -> String {
    static INLINE_CODE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"`([^`\n]+)`").expect("invalid regex"));
    static BOLD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("invalid regex"));
    static LINK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("invalid regex"));
    static HEADING: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+)$").expect("invalid regex"));

    // Escape first; the transforms below match on escaped text, and none
    // of their delimiters (`*`, backtick, brackets) are escapable chars.
    let escaped = html_escape(text);

    let step = INLINE_CODE.replace_all(&escaped, "<code>$1</code>");
    let step = BOLD.replace_all(&step, "<b>$1</b>");
    let step = LINK.replace_all(&step, |caps: &regex::Captures<'_>| {
        let label = &caps[1];
        let url = &caps[2];
        if url.starts_with("http://") || url.starts_with("https://") {
            format!("<a href=\"{url}\">{label}</a>")
        } else {
            format!("{label} ({url})")
        }
    });
    let step = HEADING.replace_all(&step, "<b>$1</b>");
    step.into_owned()
}

/// Largest index `<= at` that is a char boundary of `s`.
fn floor_boundary(s: &str, at: usize) -> usize {
    let mut i = at.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Append closing tags for anything left open in a truncated fragment.
fn close_open_tags(html: &str) -> String {
    static TAG: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<(/?)([a-zA-Z]+)[^>]*>").expect("invalid regex"));

    let mut open: Vec<String> = Vec::new();
    for cap in TAG.captures_iter(html) {
        let name = cap[2].to_lowercase();
        if &cap[1] == "/" {
            if let Some(pos) = open.iter().rposition(|t| *t == name) {
                open.remove(pos);
            }
        } else {
            open.push(name);
        }
    }

    let mut out = html.to_string();
    for tag in open.into_iter().rev() {
        out.push_str("</");
        out.push_str(&tag);
        out.push('>');
    }
    out
}

/// Walk `boundary` backwards until it is outside any tag or entity.
fn safe_html_boundary(html: &str, limit: usize) -> usize {
    let mut boundary = floor_boundary(html, limit);
    while boundary > 0 {
        let prefix = &html.as_bytes()[..boundary];
        let in_tag = match (
            prefix.iter().rposition(|&b| b == b'<'),
            prefix.iter().rposition(|&b| b == b'>'),
        ) {
            (Some(lt), Some(gt)) => lt > gt,
            (Some(_), None) => true,
            _ => false,
        };
        let in_entity = match (
            prefix.iter().rposition(|&b| b == b'&'),
            prefix.iter().rposition(|&b| b == b';'),
        ) {
            (Some(amp), Some(semi)) => amp > semi,
            (Some(_), None) => true,
            _ => false,
        };
        if !in_tag && !in_entity {
            break;
        }
        boundary = floor_boundary(html, boundary.saturating_sub(1));
    }
    boundary
}

/// Split HTML into standalone-valid chunks under `max_len` bytes.
///
/// Prefers paragraph and newline boundaries; never splits inside a tag or
/// entity; closes tags left open by a split so every chunk parses alone.
#[must_use]
pub fn chunk_html(html: &str, max_len: usize) -> Vec<String> {
    // Headroom for the closing tags a split can force onto a chunk.
    const CLOSER_HEADROOM: usize = 48;

    let max_len = if max_len == 0 { MAX_MESSAGE_LEN } else { max_len };
    if html.len() <= max_len {
        return vec![html.to_string()];
    }

    let split_limit = max_len.saturating_sub(CLOSER_HEADROOM).max(1);
    let mut chunks = Vec::new();
    let mut rest = html;
    while !rest.is_empty() {
        if rest.len() <= max_len {
            chunks.push(rest.to_string());
            break;
        }
        let hard = safe_html_boundary(rest, split_limit);
        let cut = rest[..hard]
            .rfind("\n\n")
            .map(|p| p + 2)
            .or_else(|| rest[..hard].rfind('\n').map(|p| p + 1))
            .unwrap_or(hard);
        let cut = if cut == 0 {
            floor_boundary(rest, max_len.max(1)).max(1)
        } else {
            cut
        };
        let (chunk, tail) = rest.split_at(cut);
        chunks.push(close_open_tags(chunk.trim_end_matches('\n')));
        rest = tail.trim_start_matches('\n');
    }
    chunks
}
