pub mod operation;

use itertools::Itertools;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::levels::{self, HierarchyLevel};
use crate::paragraph::{is_quoted_text, Paragraph};
use operation::{parse_operation, InstructionOperation, OperationKind};

/// Indent gap (in the extractor's visual units) that makes a paragraph a
/// child of the one above it rather than a sibling.
const CHILD_INDENT_GAP: f32 = 5.0;

/// One node of an instruction's operation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<HierarchyLevel>,
    pub operation: InstructionOperation,
    pub children: Vec<InstructionNode>,
    pub text: String,
}

impl InstructionNode {
    /// Operation content plus any quoted continuation paragraphs that
    /// attached below this node, joined into one multiline block.
    pub fn block_content(&self) -> Option<String> {
        let mut lines: Vec<&str> = Vec::new();
        if let Some(content) = &self.operation.content {
            lines.push(content);
        }
        for child in &self.children {
            if child.operation.kind == OperationKind::Unknown {
                if let Some(content) = &child.operation.content {
                    lines.push(content);
                }
            }
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

/// A discrete amendatory instruction recovered from the paragraph stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmendatoryInstruction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_section: Option<String>,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usc_citation: Option<String>,
    pub text: String,
    pub paragraphs: Vec<Paragraph>,
    pub start_page: u32,
    pub end_page: u32,
    pub tree: Vec<InstructionNode>,
}

static SEC_HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^SEC\.\s+\d+").unwrap());
static DIVISION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(TITLE|Subtitle|CHAPTER|SUBCHAPTER|PART|SEC\.)\s+[A-Z0-9]+[\s.\u{2014}-]")
        .unwrap()
});

const HEAD_MARKERS: &[&str] = &["is amended", "is repealed", "is further amended"];

fn is_boundary(text: &str) -> bool {
    let trimmed = text.trim();
    SEC_HEADER_RE.is_match(trimmed) || DIVISION_RE.is_match(trimmed)
}

fn is_head(paragraph: &Paragraph) -> bool {
    !paragraph.is_quoted() && HEAD_MARKERS.iter().any(|m| paragraph.text.contains(m))
}

fn label_rank(text: &str) -> Option<usize> {
    levels::leading_label(text.trim()).and_then(|(level, _)| level.rank())
}

// Paragraph tree built from visual indentation. Children are stored as
// arena indices so nodes stay movable.
struct ParaTree {
    children: Vec<Vec<usize>>,
    parent: Vec<Option<usize>>,
    roots: Vec<usize>,
}

fn build_para_tree(paragraphs: &[Paragraph]) -> ParaTree {
    let mut tree = ParaTree {
        children: vec![Vec::new(); paragraphs.len()],
        parent: vec![None; paragraphs.len()],
        roots: Vec::new(),
    };
    let mut stack: Vec<(usize, f32)> = Vec::new();

    for (i, paragraph) in paragraphs.iter().enumerate() {
        let indent = paragraph.indent();

        if paragraph.is_quoted() {
            // Continuation content hangs off whatever is open, at any depth.
            match stack.last() {
                Some(&(top, _)) => {
                    tree.children[top].push(i);
                    tree.parent[i] = Some(top);
                }
                None => tree.roots.push(i),
            }
            continue;
        }

        while let Some(&(_, top_indent)) = stack.last() {
            if indent > top_indent + CHILD_INDENT_GAP {
                break;
            }
            stack.pop();
        }
        match stack.last() {
            Some(&(top, _)) => {
                tree.children[top].push(i);
                tree.parent[i] = Some(top);
            }
            None => tree.roots.push(i),
        }
        stack.push((i, indent));
    }

    tree
}

/// Pre-order subtree collection that stops dead at the first structural
/// boundary (SEC. or division header).
fn collect_subtree(
    tree: &ParaTree,
    paragraphs: &[Paragraph],
    node: usize,
    out: &mut Vec<usize>,
) -> bool {
    if is_boundary(&paragraphs[node].text) {
        return false;
    }
    out.push(node);
    for &child in &tree.children[node] {
        if !collect_subtree(tree, paragraphs, child, out) {
            return false;
        }
    }
    true
}

/// Segment a paragraph stream into amendatory instructions.
///
/// Malformed input degrades to `unknown` operations; this never fails on
/// content shape.
pub fn extract_instructions(paragraphs: &[Paragraph]) -> Vec<AmendatoryInstruction> {
    let tree = build_para_tree(paragraphs);
    let mut consumed = vec![false; paragraphs.len()];
    let mut instructions = Vec::new();

    let mut bill_section: Option<String> = None;
    let mut last_citation: Option<String> = None;

    for i in 0..paragraphs.len() {
        if consumed[i] {
            continue;
        }
        let trimmed = paragraphs[i].text.trim();
        if SEC_HEADER_RE.is_match(trimmed) {
            bill_section = Some(trimmed.to_string());
            last_citation = None;
            continue;
        }
        if !is_head(&paragraphs[i]) {
            continue;
        }

        let mut collected = Vec::new();
        let complete = collect_subtree(&tree, paragraphs, i, &mut collected);

        if complete {
            let head_rank = label_rank(&paragraphs[i].text);
            let siblings: &[usize] = match tree.parent[i] {
                Some(p) => &tree.children[p],
                None => &tree.roots,
            };
            let position = siblings.iter().position(|&s| s == i);
            if let Some(position) = position {
                'sibling: for &s in &siblings[position + 1..] {
                    let sib = &paragraphs[s];
                    if is_boundary(&sib.text) || (is_head(sib) && !sib.is_quoted()) {
                        break;
                    }
                    let sib_rank = label_rank(&sib.text);
                    let eligible = sib.is_quoted()
                        || sib_rank.is_none()
                        || match (head_rank, sib_rank) {
                            (Some(h), Some(r)) => r > h,
                            _ => false,
                        };
                    if !eligible {
                        break;
                    }
                    if !collect_subtree(&tree, paragraphs, s, &mut collected) {
                        break 'sibling;
                    }
                }
            }
        }

        collected.sort_unstable();
        for &c in &collected {
            consumed[c] = true;
        }

        let texts = collected
            .iter()
            .map(|&c| paragraphs[c].text.trim().to_string())
            .collect_vec();
        let text = texts.join("\n");

        let citation = operation::extract_usc_citation(&text).or_else(|| {
            if text.contains("such section") {
                last_citation.clone()
            } else {
                None
            }
        });
        if citation.is_some() {
            last_citation = citation.clone();
        }

        let instruction_paragraphs = collected.iter().map(|&c| paragraphs[c].clone()).collect_vec();
        let start_page = instruction_paragraphs
            .iter()
            .map(|p| p.start_page)
            .min()
            .unwrap_or(0);
        let end_page = instruction_paragraphs
            .iter()
            .map(|p| p.end_page)
            .max()
            .unwrap_or(0);

        let virtuals = collected
            .iter()
            .flat_map(|&c| virtual_paragraphs(&paragraphs[c]))
            .collect_vec();
        let mut roots = rebuild_operation_tree(&virtuals);
        promote_strike_insert(&mut roots);

        debug!(
            "instruction at paragraph {} with {} operations",
            i,
            roots.len()
        );

        instructions.push(AmendatoryInstruction {
            bill_section: bill_section.clone(),
            target: instruction_target(&paragraphs[i].text),
            usc_citation: citation,
            text,
            paragraphs: instruction_paragraphs,
            start_page,
            end_page,
            tree: roots,
        });
    }

    instructions
}

/// The phrase before the amending verb, with leading labels stripped.
fn instruction_target(head_text: &str) -> String {
    let trimmed = head_text.trim();
    let cut = HEAD_MARKERS
        .iter()
        .filter_map(|m| trimmed.find(m))
        .min()
        .unwrap_or(trimmed.len());
    let mut target = trimmed[..cut].trim();
    while let Some((_, rest)) = levels::leading_label(target) {
        target = rest;
    }
    target.trim_end_matches([',', ' ']).to_string()
}

#[derive(Debug, Clone)]
struct VirtualParagraph {
    text: String,
    quoted: bool,
}

/// Split a collected paragraph into the discrete operations it combines:
/// at sentence punctuation followed by a label marker, and right after a
/// trailing `is amended—` that runs into its first sub-step.
fn virtual_paragraphs(paragraph: &Paragraph) -> Vec<VirtualParagraph> {
    if paragraph.is_quoted() {
        return vec![VirtualParagraph {
            text: paragraph.text.trim().to_string(),
            quoted: true,
        }];
    }

    static DELIM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.;]\s+(?:and\s+)?").unwrap());
    static LABEL_AT_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\((?:\d+|[a-z]|[A-Z]|[ivx]+)\)").unwrap());
    static AMENDED_DASH_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"is (?:further )?(?:amended|repealed)\u{2014}\s*").unwrap()
    });

    let text = paragraph.text.trim();
    let mut cuts: Vec<usize> = Vec::new();

    for m in DELIM_RE.find_iter(text) {
        if LABEL_AT_RE.is_match(&text[m.end()..]) {
            cuts.push(m.end());
        }
    }
    for m in AMENDED_DASH_RE.find_iter(text) {
        if LABEL_AT_RE.is_match(&text[m.end()..]) {
            cuts.push(m.end());
        }
    }

    cuts.sort_unstable();
    cuts.dedup();

    let mut parts = Vec::new();
    let mut start = 0;
    for cut in cuts {
        if cut > start {
            parts.push(&text[start..cut]);
            start = cut;
        }
    }
    parts.push(&text[start..]);

    parts
        .into_iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| VirtualParagraph {
            text: part.to_string(),
            quoted: is_quoted_text(part),
        })
        .collect_vec()
}

// Arena node used during operation-tree reconstruction.
struct BuildNode {
    label: Option<HierarchyLevel>,
    operation: InstructionOperation,
    text: String,
    children: Vec<usize>,
}

fn materialize(arena: &[BuildNode], id: usize) -> InstructionNode {
    InstructionNode {
        label: arena[id].label.clone(),
        operation: arena[id].operation.clone(),
        children: arena[id]
            .children
            .iter()
            .map(|&child| materialize(arena, child))
            .collect(),
        text: arena[id].text.clone(),
    }
}

/// Rebuild the nested operation tree from linear virtual paragraphs using
/// a stack keyed by label rank.
fn rebuild_operation_tree(virtuals: &[VirtualParagraph]) -> Vec<InstructionNode> {
    let mut arena: Vec<BuildNode> = Vec::new();
    let mut roots: Vec<usize> = Vec::new();
    // (arena id, rank) — unlabeled paragraphs sit at the root rank.
    let mut stack: Vec<(usize, i32)> = Vec::new();
    // Split siblings still accepting quoted children, with their deepest
    // target label.
    let mut split_recipients: Vec<(usize, String)> = Vec::new();

    for vpara in virtuals {
        if vpara.quoted {
            let child = arena.len();
            arena.push(BuildNode {
                label: None,
                operation: InstructionOperation {
                    kind: OperationKind::Unknown,
                    target: None,
                    striking_content: None,
                    content: Some(vpara.text.clone()),
                },
                text: vpara.text.clone(),
                children: Vec::new(),
            });

            let recipient = quoted_marker_val(&vpara.text).and_then(|val| {
                split_recipients
                    .iter()
                    .find(|(_, deepest)| deepest.eq_ignore_ascii_case(&val))
                    .map(|&(id, _)| id)
            });
            match recipient.or_else(|| stack.last().map(|&(id, _)| id)) {
                Some(parent) => arena[parent].children.push(child),
                None => roots.push(child),
            }
            continue;
        }

        let label = levels::leading_label(&vpara.text).map(|(level, _)| level);
        let rank = label
            .as_ref()
            .and_then(|level| level.rank())
            .map(|r| r as i32)
            .unwrap_or(-1);

        while let Some(&(_, top_rank)) = stack.last() {
            if top_rank >= rank {
                stack.pop();
            } else {
                break;
            }
        }

        split_recipients.clear();

        let operation = parse_operation(&vpara.text);
        let split_targets = plural_split_targets(&operation);

        let new_ids: Vec<usize> = match split_targets {
            Some(per_sibling) => {
                let ids = per_sibling
                    .into_iter()
                    .map(|target| {
                        let deepest = target
                            .last()
                            .and_then(|level| level.val())
                            .unwrap_or_default()
                            .to_string();
                        let id = arena.len();
                        arena.push(BuildNode {
                            label: label.clone(),
                            operation: InstructionOperation {
                                target: Some(target),
                                ..operation.clone()
                            },
                            text: vpara.text.clone(),
                            children: Vec::new(),
                        });
                        split_recipients.push((id, deepest));
                        id
                    })
                    .collect_vec();
                if !vpara.text.contains("the following") {
                    split_recipients.clear();
                }
                ids
            }
            None => {
                let id = arena.len();
                arena.push(BuildNode {
                    label: label.clone(),
                    operation,
                    text: vpara.text.clone(),
                    children: Vec::new(),
                });
                vec![id]
            }
        };

        for &id in &new_ids {
            match stack.last() {
                Some(&(parent, _)) => arena[parent].children.push(id),
                None => roots.push(id),
            }
        }
        // The last sibling stays open for following quoted children.
        if let Some(&last) = new_ids.last() {
            stack.push((last, rank));
        }
    }

    roots.iter().map(|&root| materialize(&arena, root)).collect()
}

/// Leading marker label of a quoted continuation paragraph, with the quote
/// character sanitized away.
fn quoted_marker_val(text: &str) -> Option<String> {
    let bare = text.trim_start_matches([
        '"', '\u{201C}', '\u{201D}', '\u{201F}', '\'', '\u{2018}', '\u{2019}',
    ]);
    levels::leading_label(bare.trim_start())
        .and_then(|(level, _)| level.val().map(|val| val.to_string()))
}

/// When an operation edits text and names several targets of one rank
/// (`subparagraphs (A) and (B)`), it becomes one sibling per target with
/// the shared broader prefix retained.
fn plural_split_targets(operation: &InstructionOperation) -> Option<Vec<Vec<HierarchyLevel>>> {
    if !operation.kind.edits_text() {
        return None;
    }
    let target = operation.target.as_ref()?;

    let duplicated_rank = target
        .iter()
        .filter_map(|level| level.rank())
        .duplicates()
        .at_most_one()
        .ok()??;

    let prefix = target
        .iter()
        .filter(|level| level.rank() != Some(duplicated_rank))
        .cloned()
        .collect_vec();
    let split = target
        .iter()
        .filter(|level| level.rank() == Some(duplicated_rank))
        .map(|level| {
            prefix
                .iter()
                .cloned()
                .chain(std::iter::once(level.clone()))
                .collect_vec()
        })
        .collect_vec();

    (split.len() > 1).then_some(split)
}

fn is_inserting_continuation(node: &InstructionNode) -> bool {
    node.operation.kind != OperationKind::Unknown
        && node.text.contains("inserting the following")
}

fn merge_inserting_continuation(node: &mut InstructionNode, donor: InstructionNode) {
    node.operation.kind = OperationKind::Replace;
    node.operation.content = donor.block_content();
    // the donor's quoted continuations move up with its content
    for child in donor.children {
        if child.operation.kind == OperationKind::Unknown {
            node.children.push(child);
        }
    }

    static STRIKE_TAIL_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"by striking\s+(.+)$").unwrap());
    if let Some(phrase) = STRIKE_TAIL_RE.captures(&node.text).and_then(|c| c.get(1)) {
        let target = node.operation.target.get_or_insert_with(Vec::new);
        for level in operation::parse_target(phrase.as_str()) {
            if !target.contains(&level) {
                target.push(level);
            }
        }
    }
}

/// Fuse `by striking <ref>` nodes with the `(X) inserting the following ...`
/// continuation that split off from them — either into a child position or
/// as the immediately following sibling — promoting the pair to a replace.
fn promote_strike_insert(nodes: &mut Vec<InstructionNode>) {
    for node in nodes.iter_mut() {
        promote_strike_insert(&mut node.children);
    }

    for node in nodes.iter_mut() {
        if node.operation.kind != OperationKind::Delete || !node.text.contains("by striking") {
            continue;
        }
        if let Some(index) = node.children.iter().position(is_inserting_continuation) {
            let child = node.children.remove(index);
            merge_inserting_continuation(node, child);
        }
    }

    let mut i = 0;
    while i < nodes.len() {
        let pair = nodes[i].operation.kind == OperationKind::Delete
            && nodes[i].text.contains("by striking")
            && nodes
                .get(i + 1)
                .is_some_and(is_inserting_continuation);
        if pair {
            let sibling = nodes.remove(i + 1);
            merge_inserting_continuation(&mut nodes[i], sibling);
        }
        i += 1;
    }
}
