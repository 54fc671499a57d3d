pub mod format;

use std::collections::HashMap;

use itertools::Itertools;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::effect::{
    AmendmentEffect, AttemptOutcome, Change, EffectDebug, EffectStatus, OperationMatchAttempt,
    ScopedRange, SearchTextKind, Segment, SegmentKind,
};
use crate::extract::operation::{parse_target, quoted_anchor, OperationKind};
use crate::extract::{AmendatoryInstruction, InstructionNode};
use crate::levels::{self, HierarchyLevel};
use crate::markdown::{is_descendant, marker_range_end, quote_depth, scan_markers, StructureMarker};
use format::{format_block, is_block_content};

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// cap on the scoped-range preview carried in diagnostics
    pub preview_limit: usize,
}

impl Default for ApplyOptions {
    fn default() -> ApplyOptions {
        ApplyOptions { preview_limit: 600 }
    }
}

/// Apply one extracted instruction to a section body.
pub fn apply_instruction(
    instruction: &AmendatoryInstruction,
    section_path: &str,
    section_body: &str,
) -> AmendmentEffect {
    apply_tree(
        &instruction.tree,
        section_path,
        section_body,
        &ApplyOptions::default(),
    )
}

/// Apply an operation tree to a section body, producing the segmented,
/// auditable effect record.
pub fn apply_tree(
    tree: &[InstructionNode],
    section_path: &str,
    body: &str,
    options: &ApplyOptions,
) -> AmendmentEffect {
    let ops = collect_operations(tree);
    let redesignations = redesignation_table(tree);

    let mut working = body.to_string();
    let mut attempts: Vec<OperationMatchAttempt> = Vec::new();
    let mut changes: Vec<Change> = Vec::new();
    let operation_count = ops.len();

    for op in &ops {
        if op.kind == OperationKind::Redesignate {
            // recorded for the `as so redesignated` retry, never executed
            attempts.push(base_attempt(op, false, None));
            continue;
        }

        let markers = scan_markers(&working);
        let explicit_path = body_path(&op.target);
        let has_explicit = !explicit_path.is_empty();

        let mut scope = (0, working.len());
        let mut scoped_range = None;
        if has_explicit {
            let resolved = resolve_scope(&markers, working.len(), &explicit_path).or_else(|| {
                retry_with_redesignations(
                    &markers,
                    working.len(),
                    &explicit_path,
                    &op.node_text,
                    &redesignations,
                )
            });
            let Some(resolved) = resolved else {
                attempts.push(OperationMatchAttempt {
                    outcome: AttemptOutcome::ScopeUnresolved,
                    ..base_attempt(op, true, None)
                });
                debug!("explicit target unresolved: {}", op.node_text);
                return AmendmentEffect::unsupported(
                    section_path,
                    body,
                    "explicit_target_scope_unresolved",
                    attempts,
                    operation_count,
                );
            };
            scope = resolved;
            if let Some(narrowed) = matter_preceding_end(&markers, scope, &op.node_text) {
                scope.1 = narrowed;
            }
            scoped_range = Some(preview_range(&working, scope, options.preview_limit));
        }

        let mut attempt = base_attempt(op, has_explicit, scoped_range);
        match build_patch(op, &working, scope, has_explicit) {
            Some(patch) => {
                if let Some((kind, text, index)) = patch.search {
                    attempt.search_text_kind = kind;
                    attempt.search_text = Some(text);
                    attempt.search_index = Some(index);
                }
                attempt.patch_applied = true;
                attempt.outcome = AttemptOutcome::Applied;
                changes.push(Change {
                    deleted: patch.deleted.clone(),
                    inserted: patch.inserted.clone(),
                });
                working.replace_range(patch.start..patch.end, &patch.inserted);
            }
            None => {
                attempt.outcome = AttemptOutcome::NoPatch;
            }
        }
        attempts.push(attempt);
    }

    if changes.is_empty() {
        return AmendmentEffect::unsupported(
            section_path,
            body,
            "no_patches_applied",
            attempts,
            operation_count,
        );
    }

    AmendmentEffect {
        status: EffectStatus::Ok,
        section_path: section_path.to_string(),
        segments: vec![Segment {
            kind: SegmentKind::Unchanged,
            text: working.clone(),
        }],
        changes,
        debug: EffectDebug {
            section_text_length: body.len(),
            operation_count,
            operation_attempts: attempts,
            failure_reason: None,
        },
    }
}

#[derive(Debug, Clone)]
struct CollectedOp {
    kind: OperationKind,
    node_text: String,
    striking: Option<String>,
    content: Option<String>,
    target: Vec<HierarchyLevel>,
}

struct Patch {
    start: usize,
    end: usize,
    deleted: String,
    inserted: String,
    search: Option<(SearchTextKind, String, usize)>,
}

fn base_attempt(
    op: &CollectedOp,
    has_explicit: bool,
    scoped_range: Option<ScopedRange>,
) -> OperationMatchAttempt {
    OperationMatchAttempt {
        operation_type: op.kind,
        node_text: op.node_text.clone(),
        striking_content: op.striking.clone(),
        target_path: levels::format_path(&op.target),
        has_explicit_target_path: has_explicit,
        scoped_range,
        search_text: None,
        search_text_kind: SearchTextKind::None,
        search_index: None,
        patch_applied: false,
        outcome: AttemptOutcome::NoPatch,
    }
}

fn preview_range(working: &str, range: (usize, usize), limit: usize) -> ScopedRange {
    let text = &working[range.0..range.1];
    ScopedRange {
        start: range.0,
        end: range.1,
        preview: text.chars().take(limit).collect(),
    }
}

/// Depth-first flattening. Each operation carries the union of its
/// ancestors' targets; an entry in a descendant evicts inherited entries at
/// its own rank or deeper.
fn collect_operations(tree: &[InstructionNode]) -> Vec<CollectedOp> {
    fn walk(node: &InstructionNode, inherited: &[HierarchyLevel], ops: &mut Vec<CollectedOp>) {
        let own: &[HierarchyLevel] = node.operation.target.as_deref().unwrap_or(&[]);
        let merged = merge_targets(inherited, own);
        match node.operation.kind {
            OperationKind::Context | OperationKind::Unknown => {}
            kind => ops.push(CollectedOp {
                kind,
                node_text: node.text.clone(),
                striking: node.operation.striking_content.clone(),
                content: node.block_content(),
                target: merged.clone(),
            }),
        }
        for child in &node.children {
            walk(child, &merged, ops);
        }
    }

    let mut ops = Vec::new();
    for node in tree {
        walk(node, &[], &mut ops);
    }
    ops
}

fn merge_targets(inherited: &[HierarchyLevel], own: &[HierarchyLevel]) -> Vec<HierarchyLevel> {
    if own.is_empty() {
        return inherited.to_vec();
    }
    let min_rank = own.iter().filter_map(|level| level.rank()).min().unwrap_or(0);
    inherited
        .iter()
        .filter(|level| level.rank().is_some_and(|rank| rank < min_rank))
        .cloned()
        .chain(own.iter().cloned())
        .collect()
}

/// The in-body part of a target path: everything below the section level.
fn body_path(target: &[HierarchyLevel]) -> Vec<HierarchyLevel> {
    target
        .iter()
        .filter(|level| level.rank().is_some_and(|rank| rank >= 1))
        .cloned()
        .collect()
}

/// Walk the target path against the marker tree, narrowing the byte range
/// at each step. Each match must lie inside the current range, carry the
/// wanted label, and descend from the previous match.
fn resolve_scope(
    markers: &[StructureMarker],
    body_len: usize,
    path: &[HierarchyLevel],
) -> Option<(usize, usize)> {
    let mut range = (0usize, body_len);
    let mut prev: Option<usize> = None;

    for level in path {
        let label = level.val()?.to_lowercase();
        let (index, marker) = markers.iter().enumerate().find(|(i, m)| {
            m.offset >= range.0
                && m.offset < range.1
                && m.label.to_lowercase() == label
                && prev.map_or(true, |p| m.rank > markers[p].rank && is_descendant(markers, *i, p))
        })?;
        range = (marker.offset, marker_range_end(markers, index, body_len));
        prev = Some(index);
    }
    Some(range)
}

/// The `as so redesignated` fallback: rewrite target labels through the
/// new→old mapping table and resolve once more.
fn retry_with_redesignations(
    markers: &[StructureMarker],
    body_len: usize,
    path: &[HierarchyLevel],
    node_text: &str,
    table: &HashMap<String, String>,
) -> Option<(usize, usize)> {
    if table.is_empty()
        || !(node_text.contains("as so redesignated") || node_text.contains("as so designated"))
    {
        return None;
    }
    let rewritten: Vec<HierarchyLevel> = path
        .iter()
        .map(|level| {
            let original = level
                .val()
                .and_then(|val| table.get(&val.to_lowercase()))
                .cloned();
            match (original, level.rank()) {
                (Some(old), Some(rank)) => {
                    HierarchyLevel::at_rank(rank, &old).unwrap_or_else(|| level.clone())
                }
                _ => level.clone(),
            }
        })
        .collect();
    resolve_scope(markers, body_len, &rewritten)
}

/// new label (lowercased) → old label, collected from redesignate nodes.
fn redesignation_table(tree: &[InstructionNode]) -> HashMap<String, String> {
    static REDESIGNATE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"redesignating\s+(.+?)\s+as\s+(.+)$").unwrap());

    fn walk(node: &InstructionNode, table: &mut HashMap<String, String>) {
        if node.operation.kind == OperationKind::Redesignate {
            if let Some(captures) = REDESIGNATE_RE.captures(&node.text) {
                let from = parse_target(captures.get(1).map(|m| m.as_str()).unwrap_or_default());
                let to = parse_target(captures.get(2).map(|m| m.as_str()).unwrap_or_default());
                for (old, new) in from.iter().zip(to.iter()) {
                    if let (Some(old), Some(new)) = (old.val(), new.val()) {
                        table.insert(new.to_lowercase(), old.to_string());
                    }
                }
            }
        }
        for child in &node.children {
            walk(child, table);
        }
    }

    let mut table = HashMap::new();
    for node in tree {
        walk(node, &mut table);
    }
    table
}

static MATTER_PRECEDING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"matter preceding\s+(?:subsection|subparagraph|paragraph|subclause|clause|subitem|item)s?\s+\(([A-Za-z0-9]+)\)",
    )
    .unwrap()
});

fn matter_preceding_end(
    markers: &[StructureMarker],
    range: (usize, usize),
    node_text: &str,
) -> Option<usize> {
    let captures = MATTER_PRECEDING_RE.captures(node_text)?;
    let label = captures.get(1)?.as_str().to_lowercase();
    markers
        .iter()
        .find(|m| m.offset > range.0 && m.offset < range.1 && m.label.to_lowercase() == label)
        .map(|m| m.offset)
}

/// Locate text inside the scope, falling back through the tolerant
/// strategies: designator-stripped, bare-section alias, citation-markup
/// fuzz, whitespace-flexible.
fn locate(working: &str, range: (usize, usize), needle: &str) -> Option<(usize, usize)> {
    let scope = &working[range.0..range.1];
    if let Some(at) = scope.find(needle) {
        return Some((range.0 + at, range.0 + at + needle.len()));
    }

    static DESIGNATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\([A-Za-z0-9]+\)\s*").unwrap());
    if let Some(m) = DESIGNATOR_RE.find(needle) {
        let tail = &needle[m.end()..];
        if !tail.is_empty() {
            if let Some(at) = scope.find(tail) {
                return Some((range.0 + at, range.0 + at + tail.len()));
            }
        }
    }

    static SECTION_NUM_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\bsection\s+([0-9][A-Za-z0-9]*)").unwrap());
    if let Some(captures) = SECTION_NUM_RE.captures(needle) {
        if let Some(num) = captures.get(1) {
            let pattern = format!(
                "{}{}{}",
                regex::escape(&needle[..num.start()]),
                r"[0-9][A-Za-z0-9\u{2013}\u{2014}-]*",
                regex::escape(&needle[num.end()..])
            );
            if let Some(m) = Regex::new(&pattern).ok().and_then(|re| re.find(scope)) {
                return Some((range.0 + m.start(), range.0 + m.end()));
            }
        }
    }

    static SECTION_REF_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)section\s+[0-9][A-Za-z0-9\u{2013}-]*(?:\([^)]*\))*").unwrap()
    });
    if let Some(m) = SECTION_REF_RE.find(needle) {
        let pattern = format!(
            "{}\\[?{}(?:\\]\\([^)]*\\))?{}",
            regex::escape(&needle[..m.start()]),
            regex::escape(m.as_str()),
            regex::escape(&needle[m.end()..])
        );
        if let Some(m) = Regex::new(&pattern).ok().and_then(|re| re.find(scope)) {
            return Some((range.0 + m.start(), range.0 + m.end()));
        }
    }

    let tokens = needle.split_whitespace().collect_vec();
    if tokens.len() > 1 {
        let pattern = tokens.iter().map(|token| regex::escape(token)).join(r"\s+");
        if let Some(m) = Regex::new(&pattern).ok().and_then(|re| re.find(scope)) {
            return Some((range.0 + m.start(), range.0 + m.end()));
        }
    }
    None
}

fn depth_of_line_containing(working: &str, pos: usize) -> usize {
    let at = pos.min(working.len());
    let line_start = working[..at].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = working[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(working.len());
    quote_depth(&working[line_start..line_end]).0
}

fn build_patch(
    op: &CollectedOp,
    working: &str,
    scope: (usize, usize),
    has_explicit: bool,
) -> Option<Patch> {
    match op.kind {
        OperationKind::Replace => {
            if let Some(striking) = &op.striking {
                let (start, end) = locate(working, scope, striking)?;
                return Some(Patch {
                    start,
                    end,
                    deleted: working[start..end].to_string(),
                    inserted: op.content.clone().unwrap_or_default(),
                    search: Some((SearchTextKind::Striking, striking.clone(), start)),
                });
            }
            if !has_explicit {
                return None;
            }
            let content = op.content.as_ref()?;
            let depth = depth_of_line_containing(working, scope.0);
            let deleted = working[scope.0..scope.1].to_string();
            let mut inserted = format_block(content, depth);
            if deleted.ends_with('\n') && !inserted.ends_with('\n') {
                inserted.push('\n');
            }
            Some(Patch {
                start: scope.0,
                end: scope.1,
                deleted,
                inserted,
                search: None,
            })
        }
        OperationKind::Delete => {
            let striking = op.striking.as_ref()?;
            let (mut start, end) = locate(working, scope, striking)?;
            let prev = working[..start].chars().last();
            let next = working[end..].chars().next();
            if prev == Some(' ') && next == Some(' ') {
                start -= 1;
            }
            Some(Patch {
                start,
                end,
                deleted: working[start..end].to_string(),
                inserted: String::new(),
                search: Some((SearchTextKind::Striking, striking.clone(), start)),
            })
        }
        OperationKind::Insert | OperationKind::AddAtEnd => {
            let content = op.content.as_ref()?;
            let pos = scope.1;
            let mut inserted = if is_block_content(content) {
                format_block(content, depth_of_line_containing(working, pos.saturating_sub(1)))
            } else {
                content.clone()
            };
            if pos > 0 && !working[..pos].ends_with('\n') {
                inserted.insert(0, '\n');
            }
            if pos < working.len() && !inserted.ends_with('\n') {
                inserted.push('\n');
            }
            Some(Patch {
                start: pos,
                end: pos,
                deleted: String::new(),
                inserted,
                search: None,
            })
        }
        OperationKind::InsertBefore | OperationKind::InsertAfter => {
            insert_at_anchor(op, working, scope)
        }
        OperationKind::Redesignate | OperationKind::Context | OperationKind::Unknown => None,
    }
}

fn insert_at_anchor(op: &CollectedOp, working: &str, scope: (usize, usize)) -> Option<Patch> {
    let content = op.content.as_ref()?;
    let before = op.kind == OperationKind::InsertBefore;

    let (anchor_start, anchor_end, anchor_text) = match quoted_anchor(&op.node_text) {
        Some(anchor) => {
            let (start, end) = locate(working, scope, &anchor)?;
            (start, end, anchor)
        }
        None if op.node_text.contains("the period at the end") => {
            let at = working[scope.0..scope.1].rfind('.')?;
            (scope.0 + at, scope.0 + at + 1, ".".to_string())
        }
        None => return None,
    };

    let pos = if before { anchor_start } else { anchor_end };
    let mut inserted = content.clone();

    let prev = working[..pos].chars().last();
    let next = working[pos..].chars().next();
    let first = inserted.chars().next();
    let last = inserted.chars().last();
    if prev.is_some_and(|c| c.is_alphanumeric())
        && first.is_some_and(|c| !c.is_whitespace() && !is_trailing_punct(c))
    {
        inserted.insert(0, ' ');
    }
    if next.is_some_and(|c| c.is_alphanumeric())
        && last.is_some_and(|c| !c.is_whitespace() && !is_leading_punct(c))
    {
        inserted.push(' ');
    }

    Some(Patch {
        start: pos,
        end: pos,
        deleted: String::new(),
        inserted,
        search: Some((
            if before {
                SearchTextKind::AnchorBefore
            } else {
                SearchTextKind::AnchorAfter
            },
            anchor_text,
            anchor_start,
        )),
    })
}

// Separator punctuation binds to the text before it, opener punctuation to
// the text after; neither side gets a pad next to its own binding.
fn is_trailing_punct(c: char) -> bool {
    matches!(c, ',' | ';' | '.' | ':' | ')' | ']' | '\u{2019}')
}

fn is_leading_punct(c: char) -> bool {
    matches!(c, '(' | '[' | '\u{2018}' | '\u{201C}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_instructions;
    use crate::extract::operation::InstructionOperation;
    use crate::levels::HierarchyLevel::{
        Clause, Paragraph, Section, Subclause, Subparagraph, Subsection,
    };
    use crate::paragraph::test_paragraph;
    use pretty_assertions::assert_eq;

    fn node(
        kind: OperationKind,
        target: Option<Vec<HierarchyLevel>>,
        striking: Option<&str>,
        content: Option<&str>,
        text: &str,
    ) -> InstructionNode {
        InstructionNode {
            label: None,
            operation: InstructionOperation {
                kind,
                target,
                striking_content: striking.map(|s| s.to_string()),
                content: content.map(|s| s.to_string()),
            },
            children: Vec::new(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_sibling_scoped_inserts() {
        let body = "**(A)** households shall be limited by rule.\n\
            **(B)** households shall be limited by rule.";
        let tree = vec![
            node(
                OperationKind::InsertBefore,
                Some(vec![Subparagraph("A".into())]),
                None,
                Some("without an elderly or disabled member"),
                "in subparagraph (A), by inserting \u{201C}without an elderly or disabled member\u{201D} before \u{201C}shall be\u{201D}",
            ),
            node(
                OperationKind::InsertBefore,
                Some(vec![Subparagraph("B".into())]),
                None,
                Some("with an elderly or disabled member"),
                "in subparagraph (B), by inserting \u{201C}with an elderly or disabled member\u{201D} before \u{201C}shall be\u{201D}",
            ),
        ];

        let effect = apply_tree(&tree, "/statutes/usc/section/7/2014", body, &Default::default());
        assert_eq!(effect.status, EffectStatus::Ok);
        assert_eq!(
            effect.segments[0].text,
            "**(A)** households without an elderly or disabled member shall be limited by rule.\n\
             **(B)** households with an elderly or disabled member shall be limited by rule."
        );
        assert_eq!(
            effect
                .changes
                .iter()
                .map(|change| change.inserted.as_str())
                .collect_vec(),
            vec![
                "without an elderly or disabled member ",
                "with an elderly or disabled member "
            ]
        );
    }

    #[test]
    fn test_such_section_pipeline_scopes_dollar_amounts() {
        let paragraphs = vec![
            test_paragraph("SEC. 10. STORAGE.", 40.0),
            test_paragraph(
                "(a) In general.\u{2014}Section 4025 of the Food and Nutrition Act of 2008 (7 U.S.C. 2034) is amended by inserting \u{201C}(including associated costs)\u{201D} after \u{201C}storage costs\u{201D}.",
                40.0,
            ),
            test_paragraph(
                "(b) Conforming.\u{2014}Subsection (c) of such section is amended\u{2014}",
                40.0,
            ),
            test_paragraph(
                "(1) in paragraph (1), by striking \u{201C}$10,000,000\u{201D} and inserting \u{201C}$20,000,000\u{201D};",
                50.0,
            ),
            test_paragraph(
                "(2) in paragraph (2), by striking \u{201C}$1,000,000\u{201D} and inserting \u{201C}$2,000,000\u{201D}; and",
                50.0,
            ),
            test_paragraph(
                "(3) in paragraph (3), by striking \u{201C}$10,000\u{201D} and inserting \u{201C}$20,000\u{201D}.",
                50.0,
            ),
        ];
        let instructions = extract_instructions(&paragraphs);
        assert_eq!(instructions.len(), 2);

        let body = "**(a)** The Secretary shall pay storage costs of up to $10,000,000.\n\
            **(c)** Funding.\n\
            > **(1)** There is appropriated $10,000,000.\n\
            > **(2)** Administrative costs of $1,000,000.\n\
            > **(3)** A minimum of $10,000.";

        let effect = apply_instruction(&instructions[1], "/statutes/usc/section/7/2034", body);
        assert_eq!(effect.status, EffectStatus::Ok);
        let result = &effect.segments[0].text;

        // subsection (a) amounts untouched, subsection (c) rewritten
        assert!(result.contains("**(a)** The Secretary shall pay storage costs of up to $10,000,000."));
        assert!(result.contains("> **(1)** There is appropriated $20,000,000."));
        assert!(result.contains("> **(2)** Administrative costs of $2,000,000."));
        assert!(result.contains("> **(3)** A minimum of $20,000."));
    }

    #[test]
    fn test_rewrite_subsection_to_read_as_follows() {
        let paragraphs = vec![test_paragraph(
            "Section 6(f) of the Act is amended to read as follows: \u{201C}(f) No individual shall qualify.\u{201D}.",
            40.0,
        )];
        let instructions = extract_instructions(&paragraphs);
        let body = "**(e)** e-text.\n**(f)** old (f) body.\n**(g)** g-text.";

        let effect = apply_instruction(&instructions[0], "/statutes/usc/section/7/2015", body);
        assert_eq!(effect.status, EffectStatus::Ok);
        assert_eq!(
            effect.segments[0].text,
            "**(e)** e-text.\n**(f)** No individual shall qualify.\n**(g)** g-text."
        );
    }

    #[test]
    fn test_explicit_unresolvable_target_short_circuits() {
        let body = "**(a)** a.\n**(b)** b.";
        let tree = vec![node(
            OperationKind::InsertAfter,
            Some(vec![
                Section("5".into()),
                Subsection("e".into()),
                Paragraph("6".into()),
                Subparagraph("C".into()),
                Clause("iv".into()),
                Subclause("I".into()),
            ]),
            None,
            Some("new text"),
            "by inserting \u{201C}new text\u{201D} after \u{201C}anchor\u{201D}",
        )];

        let effect = apply_tree(&tree, "/statutes/usc/section/5/1", body, &Default::default());
        assert_eq!(effect.status, EffectStatus::Unsupported);
        assert_eq!(
            effect.debug.failure_reason.as_deref(),
            Some("explicit_target_scope_unresolved")
        );
        assert_eq!(effect.segments[0].text, body);
        assert!(effect.changes.is_empty());
        assert_eq!(
            effect.debug.operation_attempts.last().unwrap().outcome,
            AttemptOutcome::ScopeUnresolved
        );
    }

    #[test]
    fn test_no_patches_is_unsupported() {
        let body = "**(a)** nothing to find here.";
        let tree = vec![node(
            OperationKind::Delete,
            None,
            Some("text that is absent"),
            None,
            "by striking \u{201C}text that is absent\u{201D}",
        )];

        let effect = apply_tree(&tree, "/statutes/usc/section/1/1", body, &Default::default());
        assert_eq!(effect.status, EffectStatus::Unsupported);
        assert_eq!(
            effect.debug.failure_reason.as_deref(),
            Some("no_patches_applied")
        );
        assert_eq!(effect.segments[0].text, body);
    }

    #[test]
    fn test_redesignation_round_trip() {
        let body = "**(A)** old text here.";
        let tree = vec![
            node(
                OperationKind::Redesignate,
                Some(vec![Subparagraph("A".into())]),
                None,
                None,
                "by redesignating subparagraph (A) as subparagraph (B)",
            ),
            node(
                OperationKind::Replace,
                Some(vec![Subparagraph("B".into())]),
                Some("old"),
                Some("new"),
                "in subparagraph (B), as so redesignated, by striking \u{201C}old\u{201D} and inserting \u{201C}new\u{201D}",
            ),
        ];

        let effect = apply_tree(&tree, "/statutes/usc/section/1/2", body, &Default::default());
        assert_eq!(effect.status, EffectStatus::Ok);
        assert_eq!(effect.segments[0].text, "**(A)** new text here.");
        // the redesignate itself never patches
        assert_eq!(
            effect.debug.operation_attempts[0].outcome,
            AttemptOutcome::NoPatch
        );
    }

    #[test]
    fn test_delete_takes_leading_space() {
        let body = "**(a)** keep this word here.";
        let tree = vec![node(
            OperationKind::Delete,
            None,
            Some("this"),
            None,
            "by striking \u{201C}this\u{201D}",
        )];

        let effect = apply_tree(&tree, "/statutes/usc/section/1/3", body, &Default::default());
        assert_eq!(effect.segments[0].text, "**(a)** keep word here.");
        assert_eq!(effect.changes[0].deleted, " this");
    }

    #[test]
    fn test_add_at_end_of_scope_formats_block() {
        let body = "**(a)** Funding.\n> **(1)** First rule.\n**(b)** Other.";
        let tree = vec![node(
            OperationKind::AddAtEnd,
            Some(vec![Subsection("a".into())]),
            None,
            Some("\u{201C}(2) Second rule.\u{201D}"),
            "in subsection (a), by adding at the end the following: \u{201C}(2) Second rule.\u{201D}",
        )];

        let effect = apply_tree(&tree, "/statutes/usc/section/1/4", body, &Default::default());
        assert_eq!(
            effect.segments[0].text,
            "**(a)** Funding.\n> **(1)** First rule.\n> **(2)** Second rule.\n**(b)** Other."
        );
    }

    #[test]
    fn test_insert_before_period_at_end() {
        let body = "**(a)** The limit shall apply.";
        let tree = vec![node(
            OperationKind::InsertBefore,
            Some(vec![Subsection("a".into())]),
            None,
            Some(", except as provided in subsection (b)"),
            "in subsection (a), by inserting before the period at the end \u{201C}, except as provided in subsection (b)\u{201D}",
        )];

        let effect = apply_tree(&tree, "/statutes/usc/section/1/5", body, &Default::default());
        assert_eq!(
            effect.segments[0].text,
            "**(a)** The limit shall apply, except as provided in subsection (b)."
        );
    }

    #[test]
    fn test_fuzzy_striking_tolerates_citation_links() {
        let body = "**(a)** as described in [section 2014(k)](/statutes/usc/section/7/2014) of this title.";
        let tree = vec![node(
            OperationKind::Replace,
            None,
            Some("in section 2014(k) of"),
            Some("in section 2014(r) of"),
            "by striking \u{201C}in section 2014(k) of\u{201D} and inserting \u{201C}in section 2014(r) of\u{201D}",
        )];

        let effect = apply_tree(&tree, "/statutes/usc/section/7/2020", body, &Default::default());
        assert_eq!(effect.status, EffectStatus::Ok);
        // the linked citation is matched and replaced wholesale
        assert_eq!(
            effect.segments[0].text,
            "**(a)** as described in section 2014(r) of this title."
        );
    }

    #[test]
    fn test_monotone_scope_narrowing() {
        let body = "**(a)** top.\n> **(1)** mid.\n> > **(A)** deep.\n**(b)** other.";
        let markers = scan_markers(body);

        let broad = resolve_scope(&markers, body.len(), &[Subsection("a".into())]).unwrap();
        let mid = resolve_scope(
            &markers,
            body.len(),
            &[Subsection("a".into()), Paragraph("1".into())],
        )
        .unwrap();
        let deep = resolve_scope(
            &markers,
            body.len(),
            &[
                Subsection("a".into()),
                Paragraph("1".into()),
                Subparagraph("A".into()),
            ],
        )
        .unwrap();

        assert!(broad.1 - broad.0 >= mid.1 - mid.0);
        assert!(mid.1 - mid.0 >= deep.1 - deep.0);
    }

    #[test]
    fn test_applied_patch_lies_within_scoped_range() {
        let body = "**(a)** alpha beta.\n**(b)** alpha gamma.";
        let tree = vec![node(
            OperationKind::Replace,
            Some(vec![Subsection("b".into())]),
            Some("alpha"),
            Some("delta"),
            "in subsection (b), by striking \u{201C}alpha\u{201D} and inserting \u{201C}delta\u{201D}",
        )];

        let effect = apply_tree(&tree, "/statutes/usc/section/1/6", body, &Default::default());
        let attempt = &effect.debug.operation_attempts[0];
        let range = attempt.scoped_range.as_ref().unwrap();
        let index = attempt.search_index.unwrap();
        assert!(index >= range.start && index < range.end);
        assert_eq!(
            effect.segments[0].text,
            "**(a)** alpha beta.\n**(b)** delta gamma."
        );
    }

    #[test]
    fn test_idempotent_effects_and_noop_round_trip() {
        let body = "**(a)** value is 10.";
        let tree = vec![node(
            OperationKind::Replace,
            None,
            Some("10"),
            Some("20"),
            "by striking \u{201C}10\u{201D} and inserting \u{201C}20\u{201D}",
        )];

        let first = apply_tree(&tree, "/statutes/usc/section/1/7", body, &Default::default());
        let second = apply_tree(&tree, "/statutes/usc/section/1/7", body, &Default::default());
        assert_eq!(first, second);

        // feeding the result through an empty tree reproduces the body
        let result = first.segments[0].text.clone();
        let noop = apply_tree(&[], "/statutes/usc/section/1/7", &result, &Default::default());
        assert_eq!(noop.segments[0].text, result);
        assert_eq!(noop.status, EffectStatus::Unsupported);
    }

    #[test]
    fn test_matter_preceding_narrows_scope() {
        let body = "**(a)** lead-in applies here.\n> **(1)** also applies here.";
        let tree = vec![node(
            OperationKind::Delete,
            Some(vec![Subsection("a".into())]),
            Some("applies"),
            None,
            "in subsection (a), in the matter preceding paragraph (1), by striking \u{201C}applies\u{201D}",
        )];

        let effect = apply_tree(&tree, "/statutes/usc/section/1/8", body, &Default::default());
        // only the matter before (1) is in scope; the paragraph keeps its
        // own occurrence
        assert_eq!(
            effect.segments[0].text,
            "**(a)** lead-in here.\n> **(1)** also applies here."
        );
    }
}
