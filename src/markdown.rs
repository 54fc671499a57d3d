//! Statutory hierarchy recovered from a Markdown section body, where
//! nesting is encoded by blockquote depth (`> `, `> > `) and bold marker
//! chains (`**(a)** **(1)**`).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// One `(X)` marker occurrence. `rank` is the absolute depth: blockquote
/// depth plus position within the marker chain on its line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureMarker {
    pub label: String,
    pub rank: usize,
    /// byte offset of the marker (including any `**` wrap) in the body
    pub offset: usize,
    /// byte offset just past the marker
    pub end: usize,
    pub line: usize,
    pub parent: Option<usize>,
}

static QUOTE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^((?:\s*>)*)\s*").unwrap());
static BOLD_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*\*\(([A-Za-z0-9]+)\)\*\*\s*").unwrap());
static PLAIN_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\(([A-Za-z0-9]+)\)\s*").unwrap());

/// Blockquote depth of a line and the byte length of its quote prefix.
pub fn quote_depth(line: &str) -> (usize, usize) {
    let captures = QUOTE_PREFIX_RE
        .captures(line)
        .expect("prefix regex matches any line");
    let prefix = captures.get(0).map(|m| m.end()).unwrap_or(0);
    let depth = captures
        .get(1)
        .map(|m| m.as_str().matches('>').count())
        .unwrap_or(0);
    (depth, prefix)
}

/// The marker chain at the start of a line's content: labels with their
/// byte ranges relative to the line.
fn leading_chain(line: &str, content_start: usize) -> Vec<(String, usize, usize)> {
    let mut chain = Vec::new();
    let mut at = content_start;
    while let Some(captures) = BOLD_MARKER_RE
        .captures(&line[at..])
        .or_else(|| PLAIN_MARKER_RE.captures(&line[at..]))
    {
        let label = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let full = captures.get(0).map(|m| m.end()).unwrap_or(0);
        let trimmed_len = line[at..at + full].trim_end().len();
        chain.push((label.to_string(), at, at + trimmed_len));
        at += full;
        if at >= line.len() {
            break;
        }
    }
    chain
}

/// Scan a section body for structure markers and wire up parent links by
/// a stack keyed on rank.
pub fn scan_markers(body: &str) -> Vec<StructureMarker> {
    let mut markers = Vec::new();

    let mut offset = 0;
    for (line_index, line) in body.split('\n').enumerate() {
        let (depth, prefix) = quote_depth(line);
        for (position, (label, start, end)) in leading_chain(line, prefix).into_iter().enumerate()
        {
            markers.push(StructureMarker {
                label,
                rank: depth + position,
                offset: offset + start,
                end: offset + end,
                line: line_index,
                parent: None,
            });
        }
        offset += line.len() + 1;
    }

    let mut stack: Vec<usize> = Vec::new();
    for i in 0..markers.len() {
        while let Some(&top) = stack.last() {
            if markers[top].rank >= markers[i].rank {
                stack.pop();
            } else {
                break;
            }
        }
        markers[i].parent = stack.last().copied();
        stack.push(i);
    }

    markers
}

/// End of a marker's range: the next marker at its rank or broader, or
/// end-of-document.
pub fn marker_range_end(markers: &[StructureMarker], index: usize, body_len: usize) -> usize {
    markers[index + 1..]
        .iter()
        .find(|marker| marker.rank <= markers[index].rank)
        .map(|marker| marker.offset)
        .unwrap_or(body_len)
}

/// Whether `descendant` sits under `ancestor` in the marker tree.
pub fn is_descendant(markers: &[StructureMarker], mut descendant: usize, ancestor: usize) -> bool {
    while let Some(parent) = markers[descendant].parent {
        if parent == ancestor {
            return true;
        }
        descendant = parent;
    }
    false
}

/// A logical paragraph of the body: a run of non-blank lines, split
/// additionally at any line that opens a marker chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkdownParagraph {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub quote_depth: usize,
    pub leading_labels: Vec<String>,
}

pub fn split_paragraphs(body: &str) -> Vec<MarkdownParagraph> {
    let mut paragraphs: Vec<MarkdownParagraph> = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    let mut offset = 0;
    for line in body.split('\n') {
        let line_end = offset + line.len();
        let (_, prefix) = quote_depth(line);
        let blank = line.trim().is_empty();
        let opens_chain = !leading_chain(line, prefix).is_empty();

        if blank {
            if let Some((start, end)) = current.take() {
                paragraphs.push(make_paragraph(body, start, end));
            }
        } else if opens_chain || current.is_none() {
            if let Some((start, end)) = current.take() {
                paragraphs.push(make_paragraph(body, start, end));
            }
            current = Some((offset, line_end));
        } else {
            current = current.map(|(start, _)| (start, line_end));
        }

        offset = line_end + 1;
    }
    if let Some((start, end)) = current.take() {
        paragraphs.push(make_paragraph(body, start, end));
    }

    paragraphs
}

fn make_paragraph(body: &str, start: usize, end: usize) -> MarkdownParagraph {
    let text = &body[start..end];
    let first_line = text.split('\n').next().unwrap_or_default();
    let (depth, prefix) = quote_depth(first_line);
    let leading_labels = leading_chain(first_line, prefix)
        .into_iter()
        .map(|(label, _, _)| label)
        .collect();
    MarkdownParagraph {
        text: text.to_string(),
        start,
        end,
        quote_depth: depth,
        leading_labels,
    }
}

/// A node of the reconstructed hierarchy: its marker, the paragraphs of its
/// own text before (`heading`) and after (`footing`) its children, and the
/// children themselves.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    pub marker: String,
    pub rank: usize,
    pub start: usize,
    pub end: usize,
    pub heading: Vec<MarkdownParagraph>,
    pub footing: Vec<MarkdownParagraph>,
    pub sublevels: Vec<HierarchyNode>,
}

/// Build the hierarchy tree for a section body.
pub fn build_hierarchy(body: &str) -> Vec<HierarchyNode> {
    let markers = scan_markers(body);
    let paragraphs = split_paragraphs(body);

    let roots: Vec<usize> = markers
        .iter()
        .enumerate()
        .filter(|(_, marker)| marker.parent.is_none())
        .map(|(index, _)| index)
        .collect();

    roots
        .into_iter()
        .map(|index| build_node(&markers, &paragraphs, index, body.len()))
        .collect()
}

fn build_node(
    markers: &[StructureMarker],
    paragraphs: &[MarkdownParagraph],
    index: usize,
    body_len: usize,
) -> HierarchyNode {
    let marker = &markers[index];
    let start = marker.offset;
    let end = marker_range_end(markers, index, body_len);

    let children: Vec<usize> = markers
        .iter()
        .enumerate()
        .filter(|(_, m)| m.parent == Some(index))
        .map(|(i, _)| i)
        .collect();

    let sublevels: Vec<HierarchyNode> = children
        .iter()
        .map(|&child| build_node(markers, paragraphs, child, body_len))
        .collect();

    let heading_end = sublevels.first().map(|child| child.start).unwrap_or(end);
    let footing_start = sublevels.last().map(|child| child.end).unwrap_or(end);

    let heading = paragraphs
        .iter()
        .filter(|p| p.start >= start && p.start < heading_end)
        .cloned()
        .collect();
    let footing = paragraphs
        .iter()
        .filter(|p| p.start >= footing_start && p.start < end)
        .cloned()
        .collect();

    HierarchyNode {
        marker: marker.label.clone(),
        rank: marker.rank,
        start,
        end,
        heading,
        footing,
        sublevels,
    }
}

/// Descend through `sublevels` matching lowercased markers; the deepest
/// match wins, `None` when any segment misses.
pub fn lookup_path<'a>(roots: &'a [HierarchyNode], labels: &[&str]) -> Option<&'a HierarchyNode> {
    let (first, rest) = labels.split_first()?;
    let node = roots
        .iter()
        .find(|node| node.marker.to_lowercase() == first.to_lowercase())?;
    if rest.is_empty() {
        Some(node)
    } else {
        lookup_path(&node.sublevels, rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "**(a)** In general, benefits apply.\n\
        > **(1)** First paragraph text.\n\
        > **(2)** Second paragraph text.\n\
        > > **(A)** A subparagraph.\n\
        **(b)** Another subsection.";

    #[test]
    fn test_scan_markers_ranks_and_parents() {
        let markers = scan_markers(BODY);
        let labels: Vec<(&str, usize)> = markers
            .iter()
            .map(|m| (m.label.as_str(), m.rank))
            .collect();
        assert_eq!(
            labels,
            vec![("a", 0), ("1", 1), ("2", 1), ("A", 2), ("b", 0)]
        );

        assert_eq!(markers[0].parent, None);
        assert_eq!(markers[1].parent, Some(0));
        assert_eq!(markers[2].parent, Some(0));
        assert_eq!(markers[3].parent, Some(2));
        assert_eq!(markers[4].parent, None);
    }

    #[test]
    fn test_marker_chain_shares_line() {
        let body = "> > **(11)** **(A)** chained text.";
        let markers = scan_markers(body);
        assert_eq!(markers.len(), 2);
        assert_eq!((markers[0].label.as_str(), markers[0].rank), ("11", 2));
        assert_eq!((markers[1].label.as_str(), markers[1].rank), ("A", 3));
        assert_eq!(markers[1].parent, Some(0));
    }

    #[test]
    fn test_marker_range_ends() {
        let markers = scan_markers(BODY);
        // (a) runs to (b)
        assert_eq!(
            marker_range_end(&markers, 0, BODY.len()),
            markers[4].offset
        );
        // (2) runs to (b) — (A) is deeper and does not close it
        assert_eq!(
            marker_range_end(&markers, 2, BODY.len()),
            markers[4].offset
        );
        // (b) runs to end of document
        assert_eq!(marker_range_end(&markers, 4, BODY.len()), BODY.len());
    }

    #[test]
    fn test_is_descendant() {
        let markers = scan_markers(BODY);
        assert!(is_descendant(&markers, 3, 2));
        assert!(is_descendant(&markers, 3, 0));
        assert!(!is_descendant(&markers, 3, 4));
        assert!(!is_descendant(&markers, 0, 1));
    }

    #[test]
    fn test_split_paragraphs_on_markers_and_blanks() {
        let body = "**(a)** first line\ncontinuation line\n\nplain paragraph\n**(b)** next";
        let paragraphs = split_paragraphs(body);
        assert_eq!(paragraphs.len(), 3);
        assert_eq!(
            paragraphs[0].text,
            "**(a)** first line\ncontinuation line"
        );
        assert_eq!(paragraphs[0].leading_labels, vec!["a"]);
        assert_eq!(paragraphs[1].text, "plain paragraph");
        assert!(paragraphs[1].leading_labels.is_empty());
        assert_eq!(paragraphs[2].leading_labels, vec!["b"]);
    }

    #[test]
    fn test_quote_depth() {
        assert_eq!(quote_depth("no quotes").0, 0);
        assert_eq!(quote_depth("> one").0, 1);
        assert_eq!(quote_depth("> > two").0, 2);
    }

    #[test]
    fn test_build_hierarchy_headings_and_sublevels() {
        let roots = build_hierarchy(BODY);
        assert_eq!(roots.len(), 2);

        let a = &roots[0];
        assert_eq!(a.marker, "a");
        assert_eq!(a.sublevels.len(), 2);
        assert_eq!(a.heading.len(), 1);
        assert!(a.heading[0].text.contains("In general"));
        assert!(a.footing.is_empty());

        let two = &a.sublevels[1];
        assert_eq!(two.marker, "2");
        assert_eq!(two.sublevels.len(), 1);
        assert_eq!(two.sublevels[0].marker, "A");
    }

    #[test]
    fn test_lookup_path() {
        let roots = build_hierarchy(BODY);
        let node = lookup_path(&roots, &["a", "2", "A"]).unwrap();
        assert_eq!(node.marker, "A");

        // lookup is case-insensitive on markers
        let node = lookup_path(&roots, &["A", "2", "a"]).unwrap();
        assert_eq!(node.marker, "A");

        assert!(lookup_path(&roots, &["a", "3"]).is_none());
        assert!(lookup_path(&roots, &[]).is_none());
    }
}
