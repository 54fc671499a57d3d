pub mod engine;

use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use regex::Regex;

/// Repetition suffixes of the BNF expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatMode {
    Optional,
    Star,
    Plus,
}

/// One expression node of a grammar rule. Rule references carry the arena
/// id of the referenced rule, so the (possibly cyclic) rule graph needs no
/// owned back-edges.
#[derive(Debug, Clone)]
pub enum RuleNode {
    Literal(String),
    CharClass(CharClass),
    Ref(usize),
    Sequence(Vec<RuleNode>),
    Choice(Vec<RuleNode>),
    Repeat(RepeatMode, Box<RuleNode>),
}

/// A `[...]` single-character class, compiled once at load time.
#[derive(Debug, Clone)]
pub struct CharClass {
    pub body: String,
    regex: Regex,
}

impl CharClass {
    fn new(body: &str) -> Result<CharClass> {
        let regex = Regex::new(&format!("^[{}]$", body))
            .with_context(|| format!("bad character class [{}]", body))?;
        Ok(CharClass {
            body: body.to_string(),
            regex,
        })
    }

    pub fn matches(&self, ch: char) -> bool {
        let mut buf = [0u8; 4];
        self.regex.is_match(ch.encode_utf8(&mut buf))
    }
}

/// A loaded BNF grammar: an ordered rule table over an indexed arena.
///
/// Construction is the only fallible stage (§ unknown references,
/// unterminated literals, empty sequences); evaluation never fails.
#[derive(Debug)]
pub struct Grammar {
    names: IndexMap<String, usize>,
    rules: Vec<RuleNode>,
}

// Canonical definitions injected whenever a grammar file omits them. A
// rule they reference that the file also omits fails the load as an
// unknown reference.
const FALLBACK_RULES: &[(&str, &str)] = &[
    ("section_id", "[0-9]+ [A-Za-z0-9-]* | [0-9]+"),
    ("subitem_or_sub", "subitem_id"),
    ("sub_location_range", "sub_location \" through \" sub_location"),
];

/// The grammar shipped with the crate, covering the amendatory phrase
/// vocabulary the translator dispatches on.
pub const DEFAULT_GRAMMAR_SOURCE: &str = include_str!("../../assets/instruction.bnf");

pub fn default_grammar() -> Result<Grammar> {
    Grammar::load(DEFAULT_GRAMMAR_SOURCE).context("loading built-in instruction grammar")
}

impl Grammar {
    /// Load a grammar from its line-oriented source: `name ::= expression`,
    /// with non-empty lines lacking `::=` continuing the previous rule.
    pub fn load(source: &str) -> Result<Grammar> {
        let mut bodies: IndexMap<String, String> = IndexMap::new();
        let mut current: Option<String> = None;

        for line in source.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match line.split_once("::=") {
                Some((name, body)) => {
                    let name = name.trim().to_string();
                    if name.is_empty() {
                        bail!("rule with empty name: {:?}", line);
                    }
                    bodies.insert(name.clone(), body.trim().to_string());
                    current = Some(name);
                }
                None => {
                    let name = current
                        .as_ref()
                        .ok_or_else(|| anyhow!("continuation line before any rule: {:?}", line))?;
                    let body = bodies.get_mut(name).expect("current rule exists");
                    body.push(' ');
                    body.push_str(line.trim());
                }
            }
        }

        for (name, body) in FALLBACK_RULES {
            if !bodies.contains_key(*name) {
                bodies.insert(name.to_string(), body.to_string());
            }
        }

        let names: IndexMap<String, usize> = bodies
            .keys()
            .enumerate()
            .map(|(id, name)| (name.clone(), id))
            .collect();

        let rules = bodies
            .iter()
            .map(|(name, body)| {
                parse_expression(body, &names)
                    .with_context(|| format!("in rule {}", name))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Grammar { names, rules })
    }

    pub fn rule_id(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn rule_name(&self, id: usize) -> &str {
        self.names
            .get_index(id)
            .map(|(name, _)| name.as_str())
            .expect("arena id in range")
    }

    pub(crate) fn rule(&self, id: usize) -> &RuleNode {
        &self.rules[id]
    }

    /// All accepting end offsets (ascending, deduplicated) for `rule` over
    /// `input` starting at offset 0. Returns empty when the rule is unknown
    /// or nothing matches.
    pub fn parse_all(&self, rule: &str, input: &str) -> Vec<usize> {
        let Some(id) = self.rule_id(rule) else {
            return Vec::new();
        };
        let mut ctx = engine::ParseCtx::new(self, input);
        ctx.parse_rule_all(id, 0).iter().copied().collect()
    }

    /// Reconstruct the rule-typed parse tree for one accepting span.
    pub fn parse_tree(&self, rule: &str, input: &str, end: usize) -> Option<engine::ParseNode> {
        let id = self.rule_id(rule)?;
        let mut ctx = engine::ParseCtx::new(self, input);
        ctx.build_rule_tree(id, 0, end)
    }
}

// Expression tokenizer.

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(String),
    Class(String),
    Ident(String),
    Pipe,
    LParen,
    RParen,
    Star,
    Plus,
    Question,
}

fn tokenize(body: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '"' => {
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => literal.push('\n'),
                            Some('t') => literal.push('\t'),
                            Some('"') => literal.push('"'),
                            Some('\\') => literal.push('\\'),
                            other => bail!("bad escape in literal: \\{:?}", other),
                        },
                        Some(c) => literal.push(c),
                        None => bail!("unterminated literal in {:?}", body),
                    }
                }
                tokens.push(Token::Literal(literal));
            }
            '[' => {
                chars.next();
                let mut class = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some('\\') => {
                            class.push('\\');
                            match chars.next() {
                                Some(c) => class.push(c),
                                None => bail!("unterminated character class in {:?}", body),
                            }
                        }
                        Some(c) => class.push(c),
                        None => bail!("unterminated character class in {:?}", body),
                    }
                }
                tokens.push(Token::Class(class));
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '?' => {
                chars.next();
                tokens.push(Token::Question);
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => bail!("unexpected character {:?} in expression {:?}", other, body),
        }
    }

    Ok(tokens)
}

// Recursive descent over the token stream: choice > sequence > repeat >
// primary.

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    names: &'a IndexMap<String, usize>,
}

fn parse_expression(body: &str, names: &IndexMap<String, usize>) -> Result<RuleNode> {
    let tokens = tokenize(body)?;
    let mut parser = ExprParser {
        tokens: &tokens,
        pos: 0,
        names,
    };
    let node = parser.parse_choice()?;
    if parser.pos != parser.tokens.len() {
        bail!("trailing tokens after expression: {:?}", &parser.tokens[parser.pos..]);
    }
    Ok(node)
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn parse_choice(&mut self) -> Result<RuleNode> {
        let mut options = vec![self.parse_sequence()?];
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            options.push(self.parse_sequence()?);
        }
        if options.len() == 1 {
            Ok(options.pop().expect("single option"))
        } else {
            Ok(RuleNode::Choice(options))
        }
    }

    fn parse_sequence(&mut self) -> Result<RuleNode> {
        let mut items = Vec::new();
        while matches!(
            self.peek(),
            Some(Token::Literal(_)) | Some(Token::Class(_)) | Some(Token::Ident(_))
                | Some(Token::LParen)
        ) {
            items.push(self.parse_repeat()?);
        }
        match items.len() {
            0 => bail!("empty sequence"),
            1 => Ok(items.pop().expect("single item")),
            _ => Ok(RuleNode::Sequence(items)),
        }
    }

    fn parse_repeat(&mut self) -> Result<RuleNode> {
        let mut node = self.parse_primary()?;
        loop {
            let mode = match self.peek() {
                Some(Token::Star) => RepeatMode::Star,
                Some(Token::Plus) => RepeatMode::Plus,
                Some(Token::Question) => RepeatMode::Optional,
                _ => break,
            };
            self.pos += 1;
            node = RuleNode::Repeat(mode, Box::new(node));
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<RuleNode> {
        match self.peek().cloned() {
            Some(Token::Literal(literal)) => {
                self.pos += 1;
                Ok(RuleNode::Literal(literal))
            }
            Some(Token::Class(body)) => {
                self.pos += 1;
                Ok(RuleNode::CharClass(CharClass::new(&body)?))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                let id = self
                    .names
                    .get(&name)
                    .copied()
                    .ok_or_else(|| anyhow!("reference to unknown rule {}", name))?;
                Ok(RuleNode::Ref(id))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let node = self.parse_choice()?;
                if self.peek() != Some(&Token::RParen) {
                    bail!("expected )");
                }
                self.pos += 1;
                Ok(node)
            }
            other => bail!("expected expression, found {:?}", other),
        }
    }
}
