pub mod tree;

use itertools::Itertools;
use log::debug;

use crate::grammar::engine::ParseNode;
use crate::levels::HierarchyLevel;
use tree::*;

/// Translator output: the semantic tree plus any structural issues met on
/// the way. Issues never abort the walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub tree: InstructionSemanticTree,
    pub issues: Vec<TranslationIssue>,
}

struct Translator {
    issues: Vec<TranslationIssue>,
    // refs named by the innermost `in subsections (x) and (y)` wrapper,
    // resolving a later `moving such sections` edit
    move_from: Option<Vec<HierarchyLevel>>,
}

/// Lower a grammar AST (rooted at `instruction`) into the semantic tree.
pub fn translate(ast: &ParseNode) -> Translation {
    let mut translator = Translator {
        issues: Vec::new(),
        move_from: None,
    };

    let (target_scope_path, target_section) = translator.top_scope(ast);

    let mut children = Vec::new();
    let verb = ast
        .child("amend_verb")
        .map(|node| node.text.as_str())
        .unwrap_or_default();
    if verb.contains("repealed") {
        // A repeal strikes the resolved scope itself.
        children.push(TreeChild::Edit {
            edit: UltimateEdit::Strike {
                target: StrikeTarget::Reference {
                    reference: Vec::new(),
                },
            },
        });
    }
    if let Some(tail) = ast.child("instruction_tail") {
        children.extend(translator.tail(tail));
    }

    debug!(
        "translated instruction into {} top-level children, {} issues",
        children.len(),
        translator.issues.len()
    );

    Translation {
        tree: InstructionSemanticTree {
            target_scope_path,
            target_section,
            children,
        },
        issues: translator.issues,
    }
}

enum Wrapper {
    Scope(HierarchyLevel),
    Location(LocationRestriction),
}

fn fold_wrappers(wrappers: Vec<Wrapper>, children: Vec<TreeChild>) -> Vec<TreeChild> {
    wrappers.into_iter().rev().fold(children, |inner, wrapper| {
        vec![match wrapper {
            Wrapper::Scope(scope) => TreeChild::Scope {
                scope,
                children: inner,
            },
            Wrapper::Location(restriction) => TreeChild::LocationRestriction {
                restriction,
                children: inner,
            },
        }]
    })
}

impl Translator {
    fn issue(&mut self, message: &str, node: &ParseNode) {
        self.issues.push(TranslationIssue {
            message: message.to_string(),
            node_type: node.rule.clone(),
            source_text: node.text.clone(),
        });
    }

    // Top-level scope path: an explicit title-code reference wins, then a
    // codification parenthetical, then the Internal Revenue Code special
    // case; the hierarchy path from the initial locator follows.
    fn top_scope(
        &mut self,
        ast: &ParseNode,
    ) -> (Option<Vec<TargetScopeSegment>>, Option<String>) {
        let Some(locator) = ast.child("locator_phrase") else {
            self.issue("missing target scope path", ast);
            return (None, None);
        };

        let mut segments: Vec<TargetScopeSegment> = Vec::new();

        if let Some(title_code) = locator.descendant("title_code") {
            let title = title_code
                .child("number")
                .map(|n| n.text.clone())
                .unwrap_or_default();
            segments.push(TargetScopeSegment::CodeReference {
                code: format!("{} U.S.C.", title),
            });
        } else if let Some(usc) = locator.descendant("usc_cite") {
            let title = usc
                .child("number")
                .map(|n| n.text.clone())
                .unwrap_or_default();
            segments.push(TargetScopeSegment::CodeReference {
                code: format!("{} U.S.C.", title),
            });
        } else if let Some(public_law) = locator.descendant("public_law_cite") {
            segments.push(TargetScopeSegment::ActReference {
                act: public_law.text.clone(),
            });
        } else if let Some(stat) = locator.descendant("stat_cite") {
            segments.push(TargetScopeSegment::ActReference {
                act: stat.text.clone(),
            });
        } else if locator.text.contains("Internal Revenue Code of 1986") {
            segments.push(TargetScopeSegment::CodeReference {
                code: "26 U.S.C.".to_string(),
            });
        }

        let mut scopes: Vec<HierarchyLevel> = Vec::new();
        if let Some(chain) = locator.child("level_chain") {
            if let Some(plural) = chain.child("top_plural") {
                // `Sections 3 and 4 ... are each amended` — keep the first
                // section as the path and note the rest.
                if let Some(first) = plural.child("section_id") {
                    scopes.push(HierarchyLevel::Section(first.text.clone()));
                }
                if plural.children_named("section_id").count() > 1 {
                    self.issue("plural top-level locator", plural);
                }
            }
            let mut groups: Vec<Vec<HierarchyLevel>> = chain
                .children_named("level_ref")
                .map(levels_from_ref)
                .collect();
            groups.extend(
                chain
                    .children_named("of_ref")
                    .filter_map(|of_ref| of_ref.child("level_ref"))
                    .map(levels_from_ref),
            );
            // `Paragraph (2) of section 4(b)` reads inner-out; the path is
            // outer-in.
            groups.reverse();
            scopes.extend(groups.into_iter().flatten());
        }

        let target_section = scopes
            .iter()
            .find_map(|level| match level {
                HierarchyLevel::Section(val) => Some(val.clone()),
                _ => None,
            })
            .or_else(|| {
                locator
                    .descendant("usc_cite")
                    .and_then(|usc| usc.child("section_id"))
                    .map(|n| n.text.clone())
            });

        segments.extend(
            scopes
                .into_iter()
                .map(|level| TargetScopeSegment::Scope { level }),
        );

        if segments.is_empty() {
            self.issue("missing target scope path", locator);
            (None, target_section)
        } else {
            (Some(segments), target_section)
        }
    }

    fn tail(&mut self, tail: &ParseNode) -> Vec<TreeChild> {
        if let Some(read) = tail.child("read_tail") {
            return vec![TreeChild::Edit {
                edit: UltimateEdit::Rewrite {
                    target: None,
                    content: block_text(read),
                },
            }];
        }
        if let Some(direct) = tail.child("direct_tail") {
            let wrappers = self.head_wrappers(direct);
            let edits = direct
                .child("edit_clauses")
                .map(|clauses| self.edit_clauses(clauses))
                .unwrap_or_default();
            return fold_wrappers(wrappers, edits);
        }
        if let Some(dash) = tail.child("dash_tail") {
            return dash
                .child("subinstruction_list")
                .map(|list| self.subinstruction_list(list))
                .unwrap_or_default();
        }
        Vec::new()
    }

    fn subinstruction_list(&mut self, list: &ParseNode) -> Vec<TreeChild> {
        list.children_named("subinstruction")
            .collect_vec()
            .into_iter()
            .flat_map(|sub| self.subinstruction(sub))
            .collect()
    }

    fn subinstruction(&mut self, sub: &ParseNode) -> Vec<TreeChild> {
        let Some(body) = sub.child("sub_body") else {
            self.issue("subinstruction without body", sub);
            return Vec::new();
        };

        if let Some(nested) = body.child("heads_then_dash") {
            let mut wrappers = self.head_wrappers(nested);
            if let Some(head) = nested.child("sub_head") {
                wrappers.extend(self.sub_head_wrappers(head));
            }
            let inner = nested
                .child("subinstruction_list")
                .map(|list| self.subinstruction_list(list))
                .unwrap_or_default();
            return fold_wrappers(wrappers, inner);
        }
        if let Some(heads) = body.child("heads_then_edits") {
            let wrappers = self.head_wrappers(heads);
            let edits = heads
                .child("edit_clauses")
                .map(|clauses| self.edit_clauses(clauses))
                .unwrap_or_default();
            return fold_wrappers(wrappers, edits);
        }
        if let Some(resolution) = body.child("resolution") {
            if resolution.text.contains("repealed") {
                return vec![TreeChild::Edit {
                    edit: UltimateEdit::Strike {
                        target: StrikeTarget::Reference {
                            reference: Vec::new(),
                        },
                    },
                }];
            }
            return vec![TreeChild::Edit {
                edit: UltimateEdit::Rewrite {
                    target: None,
                    content: block_text(resolution),
                },
            }];
        }
        Vec::new()
    }

    fn head_wrappers(&mut self, node: &ParseNode) -> Vec<Wrapper> {
        node.children_named("head_qual")
            .filter_map(|qual| qual.child("sub_head"))
            .collect_vec()
            .into_iter()
            .flat_map(|head| self.sub_head_wrappers(head))
            .collect()
    }

    fn sub_head_wrappers(&mut self, head: &ParseNode) -> Vec<Wrapper> {
        let Some(target) = head.child("sub_head_target") else {
            return Vec::new();
        };
        if let Some(scope) = target.child("sub_scope") {
            let levels = scope
                .child("level_ref")
                .map(levels_from_ref)
                .unwrap_or_default();
            return levels.into_iter().map(Wrapper::Scope).collect();
        }
        if let Some(plural) = target.child("sub_scope_plural") {
            let refs = self.plural_refs(plural);
            self.move_from = Some(refs.clone());
            return vec![Wrapper::Location(LocationRestriction::In { refs })];
        }
        if let Some(inner) = target.child("inner_location") {
            return vec![Wrapper::Location(self.inner_location(inner))];
        }
        Vec::new()
    }

    fn inner_location(&mut self, inner: &ParseNode) -> LocationRestriction {
        if let Some(sentence) = inner.child("sentence_loc") {
            let anchor = sentence
                .child("of_level")
                .and_then(|of| of.child("level_ref"))
                .map(levels_from_ref);
            let ordinal_text = sentence
                .child("ordinal")
                .map(|n| n.text.as_str())
                .unwrap_or_default()
                .to_string();
            return match ordinal_value(&ordinal_text) {
                Some(ordinal) => LocationRestriction::SentenceOrdinal { ordinal, anchor },
                None => LocationRestriction::SentenceLast { anchor },
            };
        }
        if let Some(matter) = inner.child("matter_loc") {
            let reference = matter
                .child("level_ref")
                .map(levels_from_ref)
                .unwrap_or_default();
            if matter.text.contains("preceding") {
                return LocationRestriction::MatterPreceding { reference };
            }
            return LocationRestriction::MatterFollowing { reference };
        }
        if let Some(heading) = inner.child("heading_loc") {
            if let Some(kind) = heading.child("heading_kind") {
                return LocationRestriction::SubLocationHeading {
                    sub_kind: kind.text.clone(),
                };
            }
            let of = heading
                .child("of_level")
                .and_then(|of| of.child("level_ref"))
                .map(levels_from_ref);
            return LocationRestriction::Heading { of };
        }
        self.issue("unrecognized inner location", inner);
        LocationRestriction::In { refs: Vec::new() }
    }

    fn edit_clauses(&mut self, clauses: &ParseNode) -> Vec<TreeChild> {
        clauses
            .children_named("edit_clause")
            .filter_map(|clause| clause.child("edit"))
            .collect_vec()
            .into_iter()
            .flat_map(|edit| self.edit(edit))
            .collect()
    }

    fn edit(&mut self, edit: &ParseNode) -> Vec<TreeChild> {
        let Some(inner) = edit.children.first() else {
            self.issue("empty edit", edit);
            return Vec::new();
        };
        let edits = match inner.rule.as_str() {
            "strike_edit" => self.strike_edit(inner),
            "insert_edit" => self.insert_edit(inner),
            "add_edit" => self.add_edit(inner),
            "redesignate_edit" => vec![self.redesignate_edit(inner)],
            "move_edit" => vec![self.move_edit(inner)],
            "amend_ref_edit" => vec![self.amend_ref_edit(inner)],
            _ => {
                self.issue("unrecognized edit", inner);
                Vec::new()
            }
        };
        edits
            .into_iter()
            .map(|edit| TreeChild::Edit { edit })
            .collect()
    }

    fn strike_edit(&mut self, node: &ParseNode) -> Vec<UltimateEdit> {
        let content = node
            .child("strike_insert")
            .map(|insert| self.insert_content(insert));

        let Some(target) = node.child("strike_target") else {
            self.issue("strike without target", node);
            return Vec::new();
        };

        let targets: Vec<StrikeTarget> = if let Some(quoted) = target.child("quoted") {
            vec![StrikeTarget::Text {
                text: quoted_body(quoted),
                each_place_it_appears: target.has_descendant("appearances"),
            }]
        } else if let Some(plural) = target.child("sub_scope_plural") {
            self.plural_refs(plural)
                .into_iter()
                .map(|level| StrikeTarget::Reference {
                    reference: vec![level],
                })
                .collect()
        } else if let Some(level_ref) = target.child("level_ref") {
            vec![StrikeTarget::Reference {
                reference: levels_from_ref(level_ref),
            }]
        } else if let Some(inner) = target.child("inner_location") {
            vec![StrikeTarget::Inner {
                location: self.inner_target(inner),
            }]
        } else if let Some(punct) = target.child("punct_target") {
            vec![StrikeTarget::Inner {
                location: InnerLocationTarget::Punctuation {
                    text: punctuation_char(&punct.text),
                },
            }]
        } else {
            self.issue("unrecognized strike target", target);
            Vec::new()
        };

        targets
            .into_iter()
            .map(|target| match content.clone() {
                Some(content) => UltimateEdit::StrikeInsert { target, content },
                None => UltimateEdit::Strike { target },
            })
            .collect()
    }

    fn inner_target(&mut self, inner: &ParseNode) -> InnerLocationTarget {
        match self.inner_location(inner) {
            LocationRestriction::SentenceOrdinal { ordinal, .. } => {
                InnerLocationTarget::SentenceOrdinal { ordinal }
            }
            LocationRestriction::SentenceLast { .. } => InnerLocationTarget::SentenceLast,
            LocationRestriction::MatterPreceding { reference } => {
                InnerLocationTarget::MatterPreceding { reference }
            }
            LocationRestriction::MatterFollowing { reference } => {
                InnerLocationTarget::MatterFollowing { reference }
            }
            _ => InnerLocationTarget::Heading,
        }
    }

    fn insert_content(&mut self, node: &ParseNode) -> String {
        let Some(content) = node.child("insert_content") else {
            self.issue("inserting without content", node);
            return String::new();
        };
        if let Some(quoted) = content.child("quoted") {
            return quoted_body(quoted);
        }
        block_text(content)
    }

    fn insert_edit(&mut self, node: &ParseNode) -> Vec<UltimateEdit> {
        let Some(what) = node.child("insert_what") else {
            self.issue("inserting without content", node);
            return Vec::new();
        };

        if let Some(quoted) = what.child("quoted") {
            let position = node
                .child("insert_anchor")
                .and_then(|anchor| self.insert_position(anchor));
            return vec![UltimateEdit::Insert {
                content: quoted_body(quoted),
                position,
            }];
        }

        // `inserting after/before <ref> the following:` — the anchor rides
        // inside insert_what.
        let reference = what.child("level_ref").map(levels_from_ref);
        let content = block_text(what);
        let position = reference.map(|reference| {
            let anchor = InsertAnchor::Reference { reference };
            if what.text.starts_with("before ") {
                InsertPosition::Before { anchor }
            } else {
                InsertPosition::After { anchor }
            }
        });
        vec![UltimateEdit::Insert { content, position }]
    }

    fn insert_position(&mut self, anchor_node: &ParseNode) -> Option<InsertPosition> {
        if anchor_node.text == " at the end" {
            return Some(InsertPosition::AtEndOf);
        }
        let anchor = anchor_node.child("anchor")?;
        let inner = if let Some(quoted) = anchor.child("quoted") {
            InsertAnchor::Text {
                text: quoted_body(quoted),
            }
        } else if let Some(punct) = anchor.child("punct_target") {
            InsertAnchor::Punctuation {
                text: punctuation_char(&punct.text),
            }
        } else if let Some(level_ref) = anchor.child("level_ref") {
            InsertAnchor::Reference {
                reference: levels_from_ref(level_ref),
            }
        } else {
            self.issue("unrecognized insert anchor", anchor);
            return None;
        };
        if anchor_node.text.starts_with(" before ") {
            Some(InsertPosition::Before { anchor: inner })
        } else {
            Some(InsertPosition::After { anchor: inner })
        }
    }

    fn add_edit(&mut self, node: &ParseNode) -> Vec<UltimateEdit> {
        if node.text.starts_with("adding at the end") {
            return vec![UltimateEdit::Insert {
                content: block_text(node),
                position: Some(InsertPosition::AtEndOf),
            }];
        }
        if node.text.starts_with("adding after ") {
            let reference = node
                .child("level_ref")
                .map(levels_from_ref)
                .unwrap_or_default();
            return vec![UltimateEdit::Insert {
                content: block_text(node),
                position: Some(InsertPosition::After {
                    anchor: InsertAnchor::Reference { reference },
                }),
            }];
        }
        let content = node
            .child("quoted")
            .map(|quoted| quoted_body(quoted))
            .unwrap_or_default();
        let position = node
            .child("insert_anchor")
            .and_then(|anchor| self.insert_position(anchor));
        vec![UltimateEdit::Insert { content, position }]
    }

    fn redesignate_edit(&mut self, node: &ParseNode) -> UltimateEdit {
        let mut mappings = Vec::new();
        if let Some(list) = node.child("redes_list") {
            for pair in list.children_named("redes_pair").collect_vec() {
                let refs = pair.children_named("redes_ref").collect_vec();
                let (Some(source), Some(dest)) = (refs.first(), refs.get(1)) else {
                    self.issue("incomplete redesignation pair", pair);
                    continue;
                };
                let sources = self.redes_levels(source);
                let dests = self.redes_levels(dest);
                if sources.len() != dests.len() {
                    self.issue("redesignation source/destination counts differ", pair);
                }
                mappings.extend(
                    sources
                        .into_iter()
                        .zip(dests)
                        .map(|(from, to)| RedesignationMapping { from, to }),
                );
            }
        }
        UltimateEdit::Redesignate {
            mappings,
            respectively: node.child("respectively").is_some(),
        }
    }

    fn redes_levels(&mut self, node: &ParseNode) -> Vec<HierarchyLevel> {
        if let Some(plural) = node.child("sub_scope_plural") {
            return self.plural_refs(plural);
        }
        if let Some(level_ref) = node.child("level_ref") {
            // the deepest segment is the one being renamed
            return levels_from_ref(level_ref).pop().into_iter().collect();
        }
        if let Some(range) = node.child("range_pair") {
            // hyphenated endpoints stay as the two explicit labels
            return range
                .children_named("paren_label")
                .map(|label| HierarchyLevel::classify_bare(&label_text(label)))
                .collect();
        }
        if node.rule == "redes_ref" {
            if let Some(label) = node.child("paren_label") {
                return vec![HierarchyLevel::classify_bare(&label_text(label))];
            }
        }
        self.issue("unrecognized redesignation reference", node);
        Vec::new()
    }

    fn move_edit(&mut self, node: &ParseNode) -> UltimateEdit {
        let from = if let Some(plural) = node.child("sub_scope_plural") {
            self.plural_refs(plural)
        } else {
            match self.move_from.clone() {
                Some(refs) => refs,
                None => {
                    self.issue("moving such sections with no antecedent refs", node);
                    Vec::new()
                }
            }
        };
        let direction = match node.child("move_direction").map(|n| n.text.as_str()) {
            Some("before") => MoveDirection::Before,
            _ => MoveDirection::After,
        };
        let anchor = node
            .child("level_ref")
            .map(levels_from_ref)
            .unwrap_or_default();
        UltimateEdit::Move {
            from,
            direction,
            anchor,
        }
    }

    fn amend_ref_edit(&mut self, node: &ParseNode) -> UltimateEdit {
        let target = node.child("level_ref").map(levels_from_ref);
        UltimateEdit::Rewrite {
            target,
            content: block_text(node),
        }
    }

    /// Expand a plural scope into its refs: listed labels directly,
    /// `(a) through (c)` ranges by label increment.
    fn plural_refs(&mut self, plural: &ParseNode) -> Vec<HierarchyLevel> {
        let kind = plural
            .child("plural_kind")
            .map(|n| n.text.as_str())
            .unwrap_or_default()
            .to_string();

        if let Some(range) = plural.child("sub_location_range") {
            let labels = range
                .children_named("sub_location")
                .filter_map(|loc| loc.child("paren_label"))
                .map(label_text)
                .collect_vec();
            if let (Some(start), Some(end)) = (labels.first(), labels.get(1)) {
                match expand_through(start, end) {
                    Some(expanded) => {
                        return expanded
                            .iter()
                            .filter_map(|label| level_of_kind(&kind, label))
                            .collect()
                    }
                    None => {
                        self.issue("unexpandable label range", range);
                        return labels
                            .iter()
                            .filter_map(|label| level_of_kind(&kind, label))
                            .collect();
                    }
                }
            }
            return Vec::new();
        }

        plural
            .child("label_list")
            .map(|list| {
                list.children_named("paren_label")
                    .map(label_text)
                    .filter_map(|label| level_of_kind(&kind, &label))
                    .collect_vec()
            })
            .unwrap_or_default()
    }
}

fn level_of_kind(plural_kind: &str, label: &str) -> Option<HierarchyLevel> {
    HierarchyLevel::from_kind(plural_kind, label)
}

fn label_text(paren_label: &ParseNode) -> String {
    paren_label
        .child("label_id")
        .map(|n| n.text.clone())
        .unwrap_or_default()
}

fn quoted_body(quoted: &ParseNode) -> String {
    quoted
        .child("qbody")
        .map(|n| n.text.clone())
        .unwrap_or_default()
}

/// The quoted block content of a node, shorn of surrounding whitespace,
/// terminal punctuation after the closing quote, and one layer of quotes.
fn block_text(node: &ParseNode) -> String {
    let Some(block) = node.descendant("block") else {
        return String::new();
    };
    let text = block.text.trim();
    let text = text.trim_end_matches(['.', ';', ',']);
    let text = text
        .trim_start_matches(['"', '\u{201C}', '\u{201D}', '\u{201F}'])
        .trim_end_matches(['"', '\u{201C}', '\u{201D}']);
    text.trim().to_string()
}

fn punctuation_char(text: &str) -> String {
    if text.contains("period") {
        ".".to_string()
    } else if text.contains("comma") {
        ",".to_string()
    } else {
        ";".to_string()
    }
}

fn ordinal_value(text: &str) -> Option<usize> {
    match text {
        "first" => Some(1),
        "second" => Some(2),
        "third" => Some(3),
        "fourth" => Some(4),
        "fifth" => Some(5),
        "sixth" => Some(6),
        _ => None,
    }
}

/// `(a) through (c)` → `a, b, c`; `(2) through (4)` → `2, 3, 4`. Only
/// single-letter and numeric labels expand.
fn expand_through(start: &str, end: &str) -> Option<Vec<String>> {
    if let (Ok(from), Ok(to)) = (start.parse::<u32>(), end.parse::<u32>()) {
        if from <= to {
            return Some((from..=to).map(|n| n.to_string()).collect());
        }
        return None;
    }
    let (from, to) = (single_letter(start)?, single_letter(end)?);
    if from <= to {
        Some((from..=to).map(|c| c.to_string()).collect())
    } else {
        None
    }
}

fn single_letter(label: &str) -> Option<char> {
    let mut chars = label.chars();
    let first = chars.next()?;
    (chars.next().is_none() && first.is_ascii_alphabetic()).then_some(first)
}

/// Hierarchy path segments denoted by one `level_ref` node: the referenced
/// level plus any suffix labels (`section 28(d)(1)(F)`).
pub fn levels_from_ref(node: &ParseNode) -> Vec<HierarchyLevel> {
    let inner = if node.rule == "level_ref" {
        match node.children.first() {
            Some(child) => child,
            None => return Vec::new(),
        }
    } else {
        node
    };

    match inner.rule.as_str() {
        "section_ref" => {
            let id = inner
                .child("section_id")
                .map(|n| n.text.clone())
                .unwrap_or_default();
            let mut levels = vec![HierarchyLevel::Section(id)];
            levels.extend(
                inner
                    .children_named("paren_label")
                    .map(|label| HierarchyLevel::classify_bare(&label_text(label))),
            );
            levels
        }
        "subsection_ref" | "paragraph_ref" | "subparagraph_ref" | "clause_ref"
        | "subclause_ref" | "item_ref" => {
            let kind = inner.rule.trim_end_matches("_ref");
            inner
                .child("paren_label")
                .and_then(|label| HierarchyLevel::from_kind(kind, &label_text(label)))
                .into_iter()
                .collect()
        }
        "subitem_ref" => inner
            .descendant("paren_label")
            .and_then(|label| HierarchyLevel::from_kind("subitem", &label_text(label)))
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::default_grammar;
    use crate::levels::HierarchyLevel::{Paragraph, Section, Subparagraph, Subsection};
    use crate::parser::parse_instruction_from_lines;

    fn translate_text(text: &str) -> Translation {
        let grammar = default_grammar().unwrap();
        let lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();
        let parsed = parse_instruction_from_lines(&grammar, &lines, 0)
            .unwrap_or_else(|| panic!("instruction should parse: {}", text));
        translate(&parsed.ast)
    }

    fn scope_levels(path: &[TargetScopeSegment]) -> Vec<HierarchyLevel> {
        path.iter()
            .filter_map(|segment| match segment {
                TargetScopeSegment::Scope { level } => Some(level.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_locator_scope_path() {
        let translation = translate_text(
            "Section 3(u)(4) of the Act is amended by striking \u{201C}a\u{201D}.",
        );
        let path = translation.tree.target_scope_path.unwrap();
        assert_eq!(
            scope_levels(&path),
            vec![
                Section("3".into()),
                Subsection("u".into()),
                Paragraph("4".into())
            ]
        );
        assert_eq!(translation.tree.target_section.as_deref(), Some("3"));
        assert!(translation.issues.is_empty());
    }

    #[test]
    fn test_title_code_reference_and_sentence_restriction() {
        let translation = translate_text(
            "Section 101 of title 10, United States Code, is amended in the first sentence of subsection (a) by striking \u{201C}A\u{201D}.",
        );
        let path = translation.tree.target_scope_path.unwrap();
        assert_eq!(
            path[0],
            TargetScopeSegment::CodeReference {
                code: "10 U.S.C.".into()
            }
        );
        assert_eq!(scope_levels(&path), vec![Section("101".into())]);

        assert_eq!(translation.tree.children.len(), 1);
        let TreeChild::LocationRestriction {
            restriction,
            children,
        } = &translation.tree.children[0]
        else {
            panic!("expected a location restriction, got {:?}", translation.tree.children);
        };
        assert_eq!(
            *restriction,
            LocationRestriction::SentenceOrdinal {
                ordinal: 1,
                anchor: Some(vec![Subsection("a".into())]),
            }
        );
        assert_eq!(
            children[0],
            TreeChild::Edit {
                edit: UltimateEdit::Strike {
                    target: StrikeTarget::Text {
                        text: "A".into(),
                        each_place_it_appears: false,
                    }
                }
            }
        );
    }

    #[test]
    fn test_alphanumeric_section_suffix() {
        let translation = translate_text(
            "Section 28(d)(1)(F) of the Act is amended by striking \u{201C}x\u{201D}.",
        );
        let path = translation.tree.target_scope_path.unwrap();
        assert_eq!(
            scope_levels(&path),
            vec![
                Section("28".into()),
                Subsection("d".into()),
                Paragraph("1".into()),
                Subparagraph("F".into())
            ]
        );
    }

    #[test]
    fn test_usc_parenthetical_becomes_code_reference() {
        let translation = translate_text(
            "Section 5(k) of the Food and Nutrition Act of 2008 (7 U.S.C. 2014(k)) is amended by striking \u{201C}x\u{201D}.",
        );
        let path = translation.tree.target_scope_path.unwrap();
        assert_eq!(
            path[0],
            TargetScopeSegment::CodeReference {
                code: "7 U.S.C.".into()
            }
        );
    }

    #[test]
    fn test_scope_wrappers_in_dash_instruction() {
        let translation = translate_text(
            "Section 9 of the Act is amended\u{2014}\n(1) in subsection (b), by striking \u{201C}old\u{201D} and inserting \u{201C}new\u{201D}; and\n(2) in subsection (c), by striking \u{201C}x\u{201D}.",
        );
        assert_eq!(translation.tree.children.len(), 2);
        let TreeChild::Scope { scope, children } = &translation.tree.children[0] else {
            panic!("expected scope wrapper");
        };
        assert_eq!(*scope, Subsection("b".into()));
        assert_eq!(
            children[0],
            TreeChild::Edit {
                edit: UltimateEdit::StrikeInsert {
                    target: StrikeTarget::Text {
                        text: "old".into(),
                        each_place_it_appears: false,
                    },
                    content: "new".into(),
                }
            }
        );
    }

    #[test]
    fn test_each_place_it_appears() {
        let translation = translate_text(
            "Section 2 of the Act is amended by striking \u{201C}Secretary\u{201D} each place it appears and inserting \u{201C}Administrator\u{201D}.",
        );
        let TreeChild::Edit { edit } = &translation.tree.children[0] else {
            panic!("expected edit");
        };
        assert_eq!(
            *edit,
            UltimateEdit::StrikeInsert {
                target: StrikeTarget::Text {
                    text: "Secretary".into(),
                    each_place_it_appears: true,
                },
                content: "Administrator".into(),
            }
        );
    }

    #[test]
    fn test_in_subsections_plural_restriction_feeds_move() {
        let translation = translate_text(
            "Section 4 of the Act is amended\u{2014}\n(1) in subsections (a) and (b), by moving such sections after paragraph (2).",
        );
        let TreeChild::LocationRestriction {
            restriction,
            children,
        } = &translation.tree.children[0]
        else {
            panic!("expected restriction, got {:?}", translation.tree.children);
        };
        assert_eq!(
            *restriction,
            LocationRestriction::In {
                refs: vec![Subsection("a".into()), Subsection("b".into())]
            }
        );
        assert_eq!(
            children[0],
            TreeChild::Edit {
                edit: UltimateEdit::Move {
                    from: vec![Subsection("a".into()), Subsection("b".into())],
                    direction: MoveDirection::After,
                    anchor: vec![Paragraph("2".into())],
                }
            }
        );
    }

    #[test]
    fn test_through_range_expansion() {
        let translation = translate_text(
            "Section 4 of the Act is amended\u{2014}\n(1) in subsections (a) through (c), by striking \u{201C}x\u{201D}.",
        );
        let TreeChild::LocationRestriction { restriction, .. } = &translation.tree.children[0]
        else {
            panic!("expected restriction");
        };
        assert_eq!(
            *restriction,
            LocationRestriction::In {
                refs: vec![
                    Subsection("a".into()),
                    Subsection("b".into()),
                    Subsection("c".into())
                ]
            }
        );
    }

    #[test]
    fn test_redesignation_mappings() {
        let translation = translate_text(
            "Section 4 of the Act is amended by redesignating paragraphs (2) and (3) as paragraphs (3) and (4), respectively.",
        );
        let TreeChild::Edit { edit } = &translation.tree.children[0] else {
            panic!("expected edit");
        };
        assert_eq!(
            *edit,
            UltimateEdit::Redesignate {
                mappings: vec![
                    RedesignationMapping {
                        from: Paragraph("2".into()),
                        to: Paragraph("3".into()),
                    },
                    RedesignationMapping {
                        from: Paragraph("3".into()),
                        to: Paragraph("4".into()),
                    },
                ],
                respectively: true,
            }
        );
        assert!(translation.issues.is_empty());
    }

    #[test]
    fn test_redesignation_count_mismatch_truncates_with_issue() {
        let translation = translate_text(
            "Section 4 of the Act is amended by redesignating paragraphs (2) and (3) as paragraphs (5), respectively.",
        );
        let TreeChild::Edit { edit } = &translation.tree.children[0] else {
            panic!("expected edit");
        };
        let UltimateEdit::Redesignate { mappings, .. } = edit else {
            panic!("expected redesignate");
        };
        assert_eq!(mappings.len(), 1);
        assert_eq!(translation.issues.len(), 1);
    }

    #[test]
    fn test_rewrite_to_read_as_follows() {
        let translation = translate_text(
            "Section 6(f) of the Act is amended to read as follows: \u{201C}(f) No individual shall qualify.\u{201D}.",
        );
        let TreeChild::Edit { edit } = &translation.tree.children[0] else {
            panic!("expected edit");
        };
        assert_eq!(
            *edit,
            UltimateEdit::Rewrite {
                target: None,
                content: "(f) No individual shall qualify.".into(),
            }
        );
    }

    #[test]
    fn test_repeal_becomes_scope_strike() {
        let translation =
            translate_text("Section 12 of the Act is repealed.");
        assert_eq!(
            translation.tree.children[0],
            TreeChild::Edit {
                edit: UltimateEdit::Strike {
                    target: StrikeTarget::Reference {
                        reference: vec![]
                    }
                }
            }
        );
    }
}
