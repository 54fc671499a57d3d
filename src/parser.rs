use itertools::Itertools;
use ropey::Rope;

use crate::grammar::engine::ParseNode;
use crate::grammar::Grammar;

/// Result of parsing one instruction out of a run of lines. Offsets inside
/// `ast` are relative to the anchored slice the grammar accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInstruction {
    pub start_index: usize,
    pub end_index: usize,
    pub end_column: usize,
    pub text: String,
    pub ast: ParseNode,
}

/// Sentence-start markers worth re-anchoring on when the line does not
/// begin with the instruction itself.
const ANCHOR_MARKERS: &[&str] = &[
    "Section ",
    "Subsection ",
    "Paragraph ",
    "Subparagraph ",
    "Clause ",
    "Subclause ",
    "Item ",
    "Subitem ",
];

/// Feed `lines[start_index..]` to the grammar's `instruction` rule at every
/// anchor offset in the first line and keep the longest accepting parse.
/// Returns `None` on a parse miss; callers record the miss and move on.
pub fn parse_instruction_from_lines(
    grammar: &Grammar,
    lines: &[String],
    start_index: usize,
) -> Option<ParsedInstruction> {
    let first_line = lines.get(start_index)?;
    let source = lines[start_index..].join("\n");

    let anchors: Vec<usize> = std::iter::once(0)
        .chain(ANCHOR_MARKERS.iter().flat_map(|marker| {
            first_line
                .match_indices(marker)
                .map(|(offset, _)| offset)
                .collect_vec()
        }))
        .sorted_unstable()
        .dedup()
        .collect();

    let (anchor, best_end) = anchors
        .iter()
        .flat_map(|&anchor| {
            grammar
                .parse_all("instruction", &source[anchor..])
                .into_iter()
                .map(move |end| (anchor, anchor + end))
        })
        .max_by_key(|&(_, end)| end)?;

    let ast = grammar.parse_tree("instruction", &source[anchor..], best_end - anchor)?;

    let text = source[..best_end].to_string();
    let rope = Rope::from_str(&text);
    let last_line = rope.len_lines().saturating_sub(1);
    let end_index = start_index + last_line;
    let end_column = rope.line(last_line).len_chars();

    Some(ParsedInstruction {
        start_index,
        end_index,
        end_column,
        text,
        ast,
    })
}
