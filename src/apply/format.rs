//! Rendering of multiline quoted content into the body's Markdown
//! conventions: blockquote depth from structural rank, bold marker chains,
//! split heading lines.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::levels::HierarchyLevel;

const QUOTE_CHARS: &[char] = &[
    '"', '\u{201C}', '\u{201D}', '\u{201F}', '\u{2018}', '\u{2019}',
];

static PLAIN_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(([A-Za-z0-9]+)\)\s*").unwrap());
static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][A-Za-z \-',]*)\.\u{2014}\s*(.*)$").unwrap());

/// Whether content needs block treatment: multiple lines, or a line that
/// opens with a structural marker.
pub fn is_block_content(content: &str) -> bool {
    content.contains('\n') || {
        let sanitized = content.trim_start_matches(QUOTE_CHARS);
        PLAIN_MARKER_RE.is_match(sanitized.trim_start())
    }
}

struct BlockLine {
    markers: Vec<String>,
    rest: String,
    rank: Option<usize>,
}

/// Render quoted block content at the given blockquote depth. Each line's
/// depth is `base_depth + (rank − min_rank)`; lines without a marker stay
/// at the last active depth.
pub fn format_block(content: &str, base_depth: usize) -> String {
    let lines: Vec<BlockLine> = content
        .split('\n')
        .map(sanitize_line)
        .filter(|line| !line.is_empty())
        .map(parse_block_line)
        .collect();

    let min_rank = lines.iter().filter_map(|line| line.rank).min().unwrap_or(0);

    let mut depth = base_depth;
    let mut rendered = Vec::new();
    for line in &lines {
        if let Some(rank) = line.rank {
            depth = base_depth + (rank - min_rank);
        }
        let prefix = "> ".repeat(depth);
        let markers = line
            .markers
            .iter()
            .map(|label| format!("**({})**", label))
            .collect::<Vec<_>>()
            .join(" ");

        if let Some(captures) = HEADING_RE.captures(&line.rest) {
            let name = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            let body = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
            if markers.is_empty() {
                rendered.push(format!("{}**{}.\u{2014}**", prefix, name));
            } else {
                rendered.push(format!("{}{} **{}.\u{2014}**", prefix, markers, name));
            }
            if !body.is_empty() {
                rendered.push(format!("{}{}", prefix, body));
            }
            continue;
        }

        let line_text = match (markers.is_empty(), line.rest.is_empty()) {
            (true, _) => line.rest.clone(),
            (false, true) => markers,
            (false, false) => format!("{} {}", markers, line.rest),
        };
        rendered.push(format!("{}{}", prefix, line_text));
    }

    rendered.join("\n")
}

/// Strip the quote wrapping a block line carries from the bill text: a
/// leading smart quote, a trailing closing quote, and the sentence period
/// that follows a closing quote.
fn sanitize_line(raw: &str) -> String {
    let mut text = raw.trim().trim_start_matches(QUOTE_CHARS);
    if text.ends_with('.') {
        let before = &text[..text.len() - 1];
        if before.ends_with(QUOTE_CHARS) {
            text = before;
        }
    }
    text.trim_end_matches(QUOTE_CHARS).trim_end().to_string()
}

fn parse_block_line(text: String) -> BlockLine {
    let mut markers = Vec::new();
    let mut at = 0;
    while let Some(captures) = PLAIN_MARKER_RE.captures(&text[at..]) {
        let label = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        markers.push(label.to_string());
        at += captures.get(0).map(|m| m.end()).unwrap_or(0);
        if at >= text.len() {
            break;
        }
    }

    let rank = markers
        .first()
        .and_then(|label| HierarchyLevel::classify_bare(label).rank());

    BlockLine {
        rest: text[at..].to_string(),
        markers,
        rank,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_marker_line() {
        assert_eq!(
            format_block("\u{201C}(f) No individual shall qualify.\u{201D}.", 0),
            "**(f)** No individual shall qualify."
        );
    }

    #[test]
    fn test_nested_depths_follow_rank() {
        let content = "\u{201C}(5) Limits.\u{2014}\n\u{201C}(A) in general, none.\n\u{201C}(B) exceptions apply.\u{201D}";
        // paragraph rank anchors at depth 1, subparagraphs one deeper
        assert_eq!(
            format_block(content, 1),
            "> **(5)** **Limits.\u{2014}**\n> > **(A)** in general, none.\n> > **(B)** exceptions apply."
        );
    }

    #[test]
    fn test_non_marker_line_inherits_depth() {
        let content = "\u{201C}(2) first line\ncontinuation text.\u{201D}";
        assert_eq!(
            format_block(content, 0),
            "**(2)** first line\ncontinuation text."
        );
    }

    #[test]
    fn test_heading_line_splits() {
        assert_eq!(
            format_block("\u{201C}(c) Special rule.\u{2014}The Secretary may act.\u{201D}", 0),
            "**(c)** **Special rule.\u{2014}**\nThe Secretary may act."
        );
    }

    #[test]
    fn test_is_block_content() {
        assert!(is_block_content("(5) a new paragraph."));
        assert!(is_block_content("\u{201C}(A) first\n\u{201C}(B) second"));
        assert!(!is_block_content("with an elderly or disabled member"));
    }
}
