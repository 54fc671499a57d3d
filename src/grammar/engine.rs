use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use serde::Serialize;

use super::{Grammar, RepeatMode, RuleNode};

/// One node of a reconstructed parse tree. `children` holds the nested
/// rule matches in document order; text matched directly by literals and
/// character classes is recoverable through [`ParseNode::tokens`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseNode {
    pub rule: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub children: Vec<ParseNode>,
}

impl ParseNode {
    pub fn child(&self, rule: &str) -> Option<&ParseNode> {
        self.children.iter().find(|child| child.rule == rule)
    }

    pub fn children_named<'a>(&'a self, rule: &'a str) -> impl Iterator<Item = &'a ParseNode> {
        self.children.iter().filter(move |child| child.rule == rule)
    }

    /// First descendant (depth-first, document order) with the given rule.
    pub fn descendant(&self, rule: &str) -> Option<&ParseNode> {
        for child in &self.children {
            if child.rule == rule {
                return Some(child);
            }
            if let Some(found) = child.descendant(rule) {
                return Some(found);
            }
        }
        None
    }

    pub fn has_descendant(&self, rule: &str) -> bool {
        self.descendant(rule).is_some()
    }

    /// Text matched directly by this node's literals and character classes:
    /// the stretches of `text` not covered by any child rule.
    pub fn tokens(&self) -> Vec<&str> {
        let mut tokens = Vec::new();
        let mut cursor = self.start;
        for child in &self.children {
            if child.start > cursor {
                tokens.push(&self.text[cursor - self.start..child.start - self.start]);
            }
            cursor = child.end;
        }
        if self.end > cursor {
            tokens.push(&self.text[cursor - self.start..]);
        }
        tokens.retain(|token| !token.is_empty());
        tokens
    }
}

/// Per-parse evaluation state: the memo table and the in-flight guard both
/// die with the call, keeping the engine reentrant.
pub struct ParseCtx<'g> {
    grammar: &'g Grammar,
    input: &'g str,
    memo: HashMap<(usize, usize), Rc<BTreeSet<usize>>>,
    in_flight: HashSet<(usize, usize)>,
}

impl<'g> ParseCtx<'g> {
    pub fn new(grammar: &'g Grammar, input: &'g str) -> ParseCtx<'g> {
        ParseCtx {
            grammar,
            input,
            memo: HashMap::new(),
            in_flight: HashSet::new(),
        }
    }

    /// All end offsets where the rule accepts starting at `pos`.
    pub fn parse_rule_all(&mut self, id: usize, pos: usize) -> Rc<BTreeSet<usize>> {
        let key = (id, pos);
        if let Some(cached) = self.memo.get(&key) {
            return Rc::clone(cached);
        }
        // A key already on the evaluation stack means left recursion; the
        // guard yields the empty set rather than a fixed point, keeping
        // evaluation total.
        if !self.in_flight.insert(key) {
            return Rc::new(BTreeSet::new());
        }
        let grammar = self.grammar;
        let ends = Rc::new(self.parse_node_all(grammar.rule(id), pos));
        self.in_flight.remove(&key);
        self.memo.insert(key, Rc::clone(&ends));
        ends
    }

    fn parse_node_all(&mut self, node: &RuleNode, pos: usize) -> BTreeSet<usize> {
        match node {
            RuleNode::Literal(literal) => {
                if self
                    .input
                    .get(pos..)
                    .is_some_and(|rest| rest.starts_with(literal))
                {
                    BTreeSet::from([pos + literal.len()])
                } else {
                    BTreeSet::new()
                }
            }
            RuleNode::CharClass(class) => {
                match self.input.get(pos..).and_then(|rest| rest.chars().next()) {
                    Some(ch) if class.matches(ch) => BTreeSet::from([pos + ch.len_utf8()]),
                    _ => BTreeSet::new(),
                }
            }
            RuleNode::Ref(id) => (*self.parse_rule_all(*id, pos)).clone(),
            RuleNode::Sequence(items) => {
                let mut frontier = BTreeSet::from([pos]);
                for item in items {
                    let mut next = BTreeSet::new();
                    for &p in &frontier {
                        next.extend(self.parse_node_all(item, p));
                    }
                    frontier = next;
                    if frontier.is_empty() {
                        break;
                    }
                }
                frontier
            }
            RuleNode::Choice(options) => {
                let mut ends = BTreeSet::new();
                for option in options {
                    ends.extend(self.parse_node_all(option, pos));
                }
                ends
            }
            RuleNode::Repeat(RepeatMode::Optional, inner) => {
                let mut ends = self.parse_node_all(inner, pos);
                ends.insert(pos);
                ends
            }
            RuleNode::Repeat(RepeatMode::Star, inner) => self.repeat_closure(inner, pos, true),
            RuleNode::Repeat(RepeatMode::Plus, inner) => self.repeat_closure(inner, pos, false),
        }
    }

    /// BFS closure over repeated applications of `inner`. Self-loops
    /// (`end == p`, possible with nullable inners) are skipped so the
    /// closure terminates.
    fn repeat_closure(&mut self, inner: &RuleNode, pos: usize, include_start: bool) -> BTreeSet<usize> {
        let mut reached = BTreeSet::new();
        if include_start {
            reached.insert(pos);
        }
        let mut seen = HashSet::from([pos]);
        let mut frontier = vec![pos];
        while let Some(p) = frontier.pop() {
            for end in self.parse_node_all(inner, p) {
                if end == p {
                    continue;
                }
                if seen.insert(end) {
                    reached.insert(end);
                    frontier.push(end);
                }
            }
        }
        reached
    }

    /// Rebuild one derivation spanning `pos..end` for the rule, guided by
    /// the memoized end-sets. Choice alternatives are tried in definition
    /// order; sequence splits prefer the shortest first element that still
    /// lets the rest complete, so list rules win over greedy text rules.
    pub fn build_rule_tree(&mut self, id: usize, pos: usize, end: usize) -> Option<ParseNode> {
        if !self.parse_rule_all(id, pos).contains(&end) {
            return None;
        }
        let rule = self.grammar.rule(id).clone();
        let children = self.build_node(&rule, pos, end)?;
        Some(ParseNode {
            rule: self.grammar.rule_name(id).to_string(),
            start: pos,
            end,
            text: self.input[pos..end].to_string(),
            children,
        })
    }

    fn build_node(&mut self, node: &RuleNode, pos: usize, end: usize) -> Option<Vec<ParseNode>> {
        match node {
            RuleNode::Literal(literal) => {
                let matches = end == pos + literal.len()
                    && self
                        .input
                        .get(pos..)
                        .is_some_and(|rest| rest.starts_with(literal));
                matches.then(Vec::new)
            }
            RuleNode::CharClass(class) => {
                match self.input.get(pos..).and_then(|rest| rest.chars().next()) {
                    Some(ch) if class.matches(ch) && end == pos + ch.len_utf8() => {
                        Some(Vec::new())
                    }
                    _ => None,
                }
            }
            RuleNode::Ref(id) => {
                let child = self.build_rule_tree(*id, pos, end)?;
                Some(vec![child])
            }
            RuleNode::Sequence(items) => self.build_sequence(items, pos, end),
            RuleNode::Choice(options) => options
                .iter()
                .find_map(|option| self.build_node(option, pos, end)),
            RuleNode::Repeat(RepeatMode::Optional, inner) => {
                if pos == end {
                    Some(Vec::new())
                } else {
                    self.build_node(inner, pos, end)
                }
            }
            RuleNode::Repeat(RepeatMode::Star, inner) => {
                if pos == end {
                    Some(Vec::new())
                } else {
                    self.build_repeat(inner, pos, end)
                }
            }
            RuleNode::Repeat(RepeatMode::Plus, inner) => self.build_repeat(inner, pos, end),
        }
    }

    fn build_sequence(
        &mut self,
        items: &[RuleNode],
        pos: usize,
        end: usize,
    ) -> Option<Vec<ParseNode>> {
        let Some((first, rest)) = items.split_first() else {
            return (pos == end).then(Vec::new);
        };
        if rest.is_empty() {
            return self.build_node(first, pos, end);
        }
        let splits: Vec<usize> = self
            .parse_node_all(first, pos)
            .into_iter()
            .filter(|&split| split <= end)
            .collect();
        for split in splits {
            if let Some(tail) = self.build_sequence(rest, split, end) {
                let mut children = self.build_node(first, pos, split)?;
                children.extend(tail);
                return Some(children);
            }
        }
        None
    }

    fn build_repeat(&mut self, inner: &RuleNode, pos: usize, end: usize) -> Option<Vec<ParseNode>> {
        let steps: Vec<usize> = self
            .parse_node_all(inner, pos)
            .into_iter()
            .filter(|&step| step > pos && step <= end)
            .collect();
        for step in steps {
            if step == end {
                if let Some(children) = self.build_node(inner, pos, step) {
                    return Some(children);
                }
                continue;
            }
            if let Some(tail) = self.build_repeat(inner, step, end) {
                let mut children = self.build_node(inner, pos, step)?;
                children.extend(tail);
                return Some(children);
            }
        }
        None
    }
}
