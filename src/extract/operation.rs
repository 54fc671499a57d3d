use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::levels::{self, HierarchyLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Replace,
    Delete,
    Insert,
    InsertBefore,
    InsertAfter,
    AddAtEnd,
    Redesignate,
    Context,
    Unknown,
}

impl OperationKind {
    /// Kinds that rewrite text spans. Redesignate and context only shape
    /// scope; unknown carries quoted continuation content.
    pub fn edits_text(&self) -> bool {
        matches!(
            self,
            OperationKind::Replace
                | OperationKind::Delete
                | OperationKind::Insert
                | OperationKind::InsertBefore
                | OperationKind::InsertAfter
                | OperationKind::AddAtEnd
        )
    }
}

/// One amendment operation parsed out of a paragraph of instruction text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionOperation {
    pub kind: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Vec<HierarchyLevel>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub striking_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl InstructionOperation {
    pub fn unknown() -> InstructionOperation {
        InstructionOperation {
            kind: OperationKind::Unknown,
            target: None,
            striking_content: None,
            content: None,
        }
    }

    pub fn context() -> InstructionOperation {
        InstructionOperation {
            kind: OperationKind::Context,
            target: None,
            striking_content: None,
            content: None,
        }
    }
}

// Bill PDFs mix straight quotes, curly quotes, and the occasional
// right-curly-as-open; every quote-sensitive pattern accepts all of them.
const QUOTE_CHARS: &[char] = &[
    '"', '\u{201C}', '\u{201D}', '\u{201F}', '\'', '\u{2018}', '\u{2019}',
];

fn quoted_after(text: &str, verb: &str) -> Option<String> {
    static STRIKING_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"striking\s+["\u{201C}\u{201D}\u{201F}'\u{2018}]([^"\u{201C}\u{201D}'\u{2018}\u{2019}]+)"#)
            .unwrap()
    });
    static INSERTING_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"inserting\s+["\u{201C}\u{201D}\u{201F}'\u{2018}]([^"\u{201C}\u{201D}'\u{2018}\u{2019}]+)"#)
            .unwrap()
    });

    let re: &Regex = match verb {
        "striking" => &STRIKING_RE,
        _ => &INSERTING_RE,
    };
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Content after a `the following:` or `as follows:` marker, shorn of
/// surrounding quotes and terminal punctuation.
fn following_content(text: &str) -> Option<String> {
    let idx = text
        .find("the following:")
        .map(|i| i + "the following:".len())
        .or_else(|| text.find("as follows:").map(|i| i + "as follows:".len()))?;
    let mut rest = text[idx..].trim();
    rest = rest.trim_end_matches(['.', ';', ',']);
    let rest = rest
        .trim_start_matches(QUOTE_CHARS)
        .trim_end_matches(QUOTE_CHARS);
    let rest = rest.trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

/// Greedy left-to-right consumption of a target phrase into hierarchy path
/// segments. Stops at the first stretch of text it does not recognize.
pub fn parse_target(target: &str) -> Vec<HierarchyLevel> {
    static NOISE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"^(?:in|of|and|the|by|striking|inserting|adding|redesignating|after|before|is amended|is repealed|is further amended|Act|,|;|\u{2014}|-|:)\s+",
        )
        .unwrap()
    });
    static PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\(([^)]*)\)\s*").unwrap());
    static QUALIFIER_WORD_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\b(?:as|added|amended|redesignated|inserted)\b").unwrap());
    static SECTION_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[Ss]ection\s+([0-9]+[A-Za-z0-9\u{2013}-]*)\s*").unwrap()
    });
    static VERBOSE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"^(?i)(subsection|subparagraph|paragraph|subclause|clause|subitem|item)s?\s+\(([A-Za-z0-9]+)\)\s*",
        )
        .unwrap()
    });

    let mut rest = target.trim_start();
    let mut section: Option<HierarchyLevel> = None;
    let mut path: Vec<HierarchyLevel> = Vec::new();

    loop {
        if rest.is_empty() {
            break;
        }
        if let Some(m) = NOISE_RE.find(rest) {
            rest = &rest[m.end()..];
            continue;
        }
        if let Some(captures) = SECTION_RE.captures(rest) {
            let id = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            if section.is_none() {
                section = Some(HierarchyLevel::Section(id.to_string()));
            }
            rest = &rest[captures.get(0).map(|m| m.end()).unwrap_or(0)..];
            continue;
        }
        if let Some(captures) = VERBOSE_RE.captures(rest) {
            let kind = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            let val = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
            if let Some(level) = HierarchyLevel::from_kind(kind, val) {
                path.push(level);
            }
            rest = &rest[captures.get(0).map(|m| m.end()).unwrap_or(0)..];
            continue;
        }
        if let Some(captures) = PAREN_RE.captures(rest) {
            let body = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            let end = captures.get(0).map(|m| m.end()).unwrap_or(0);
            if body.contains(char::is_whitespace) || QUALIFIER_WORD_RE.is_match(body) {
                // Qualifier like "(as amended by section 2)" — discarded.
                rest = &rest[end..];
                continue;
            }
            let level = HierarchyLevel::classify_bare(body);
            if level == HierarchyLevel::None {
                break;
            }
            path.push(level);
            rest = &rest[end..];
            continue;
        }
        break;
    }

    match section {
        Some(section) => std::iter::once(section).chain(path).collect(),
        None => path,
    }
}

/// Parse one paragraph of instruction text into an operation. Never fails:
/// text that fits no known shape comes back as `context` (structural) or is
/// left for the caller to mark `unknown`.
pub fn parse_operation(text: &str) -> InstructionOperation {
    static STRUCTURAL_STRIKE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"by striking\s+(.+?)\s+and\s+inserting\s+the following").unwrap()
    });

    static HEADING_PREFIX_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z \-',]*\.\u{2014}\s*").unwrap());

    let stripped = levels::leading_label(text)
        .map(|(_, rest)| rest)
        .unwrap_or(text);
    // small-caps headings like `In general.—` precede the operative phrase
    let stripped = match HEADING_PREFIX_RE.find(stripped) {
        Some(m) => &stripped[m.end()..],
        None => stripped,
    };

    let striking_content = quoted_after(stripped, "striking");
    let mut content = quoted_after(stripped, "inserting");
    if stripped.contains("the following:") || stripped.contains("as follows:") {
        if let Some(block) = following_content(stripped) {
            content = Some(block);
        }
    }

    let mut target = parse_target(stripped);
    if let Some(captures) = STRUCTURAL_STRIKE_RE.captures(stripped) {
        if let Some(phrase) = captures.get(1) {
            for level in parse_target(phrase.as_str()) {
                if !target.contains(&level) {
                    target.push(level);
                }
            }
        }
    }

    let has_striking = stripped.contains("by striking");
    let has_inserting = stripped.contains("inserting");

    let kind = if has_striking && has_inserting {
        OperationKind::Replace
    } else if stripped.contains("to read as follows") {
        OperationKind::Replace
    } else if has_striking || stripped.contains("is repealed") {
        OperationKind::Delete
    } else if stripped.contains("by inserting") {
        insert_direction(stripped)
    } else if stripped.contains("by adding") {
        OperationKind::AddAtEnd
    } else if stripped.contains("by redesignating") {
        OperationKind::Redesignate
    } else {
        OperationKind::Context
    };

    InstructionOperation {
        kind,
        target: if target.is_empty() { None } else { Some(target) },
        striking_content,
        content,
    }
}

fn insert_direction(text: &str) -> OperationKind {
    let start = text.find("by inserting").map(|i| i + "by inserting".len());
    let tail = start.map(|i| &text[i..]).unwrap_or(text);
    let before = tail.find(" before ");
    let after = tail.find(" after ");
    match (before, after) {
        (Some(b), Some(a)) if b < a => OperationKind::InsertBefore,
        (Some(_), None) => OperationKind::InsertBefore,
        (_, Some(_)) => OperationKind::InsertAfter,
        _ => OperationKind::Insert,
    }
}

/// Extract the quoted anchor of an insert_before / insert_after operation.
pub fn quoted_anchor(text: &str) -> Option<String> {
    static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?:after|before)\s+["\u{201C}\u{201D}\u{201F}'\u{2018}]([^"\u{201C}\u{201D}'\u{2018}\u{2019}]+)"#)
            .unwrap()
    });

    ANCHOR_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Normalized U.S.C. citation from free text, e.g. `7 U.S.C. 2014(k)(4)`.
pub fn extract_usc_citation(text: &str) -> Option<String> {
    static USC_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(\d+)\s+U\.S\.C\.\s+(\d+[A-Za-z0-9\u{2013}-]*(?:\([^)]*\))*)").unwrap()
    });
    static TITLE_CODE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)section\s+(\d+[A-Za-z0-9-]*(?:\([^)]*\))*)\s+of\s+title\s+(\d+),?\s+United States Code",
        )
        .unwrap()
    });

    if let Some(captures) = USC_RE.captures(text) {
        let title = captures.get(1)?.as_str();
        let section = captures.get(2)?.as_str();
        return Some(format!("{} U.S.C. {}", title, section));
    }
    if let Some(captures) = TITLE_CODE_RE.captures(text) {
        let section = captures.get(1)?.as_str();
        let title = captures.get(2)?.as_str();
        return Some(format!("{} U.S.C. {}", title, section));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::HierarchyLevel::{Paragraph, Section, Subparagraph, Subsection};

    #[test]
    fn test_striking_content_smart_quotes() {
        let op = parse_operation("by striking \u{201C}2023\u{201D} and inserting \u{201C}2025\u{201D}");
        assert_eq!(op.kind, OperationKind::Replace);
        assert_eq!(op.striking_content.as_deref(), Some("2023"));
        assert_eq!(op.content.as_deref(), Some("2025"));
    }

    #[test]
    fn test_striking_content_right_smart_quote_as_open() {
        // Some PDFs emit the closing curly quote on both sides.
        let op = parse_operation("by striking \u{201D}2023\u{201D}");
        assert_eq!(op.striking_content.as_deref(), Some("2023"));
        assert_eq!(op.kind, OperationKind::Delete);
    }

    #[test]
    fn test_following_overrides_inserting() {
        let op = parse_operation(
            "by striking paragraph (2) and inserting the following: \u{201C}(2) a new paragraph.\u{201D}",
        );
        assert_eq!(op.kind, OperationKind::Replace);
        assert_eq!(op.content.as_deref(), Some("(2) a new paragraph."));
        // structural strike target is folded into the path
        assert_eq!(op.target, Some(vec![Paragraph("2".into())]));
    }

    #[test]
    fn test_insert_directions() {
        let op = parse_operation(
            "by inserting \u{201C}with an elderly or disabled member\u{201D} after \u{201C}households\u{201D}",
        );
        assert_eq!(op.kind, OperationKind::InsertAfter);
        assert_eq!(
            op.content.as_deref(),
            Some("with an elderly or disabled member")
        );
        assert_eq!(
            quoted_anchor("by inserting \u{201C}x\u{201D} after \u{201C}households\u{201D}").as_deref(),
            Some("households")
        );

        let op = parse_operation("by inserting \u{201C}x\u{201D} before \u{201C}the period\u{201D}");
        assert_eq!(op.kind, OperationKind::InsertBefore);

        let op = parse_operation("by inserting \u{201C}x\u{201D}");
        assert_eq!(op.kind, OperationKind::Insert);
    }

    #[test]
    fn test_kind_decisions() {
        assert_eq!(
            parse_operation("Section 12 of the Act is repealed.").kind,
            OperationKind::Delete
        );
        assert_eq!(
            parse_operation("is amended to read as follows: \u{201C}(f) text.\u{201D}").kind,
            OperationKind::Replace
        );
        assert_eq!(
            parse_operation("by adding at the end the following: \u{201C}(4) more.\u{201D}").kind,
            OperationKind::AddAtEnd
        );
        assert_eq!(
            parse_operation("by redesignating paragraphs (2) and (3) as paragraphs (3) and (4)")
                .kind,
            OperationKind::Redesignate
        );
        assert_eq!(
            parse_operation("in subsection (a)\u{2014}").kind,
            OperationKind::Context
        );
    }

    #[test]
    fn test_parse_target_section_suffix() {
        let path = parse_target("Section 28(d)(1)(F) of the Act");
        assert_eq!(
            path,
            vec![
                Section("28".into()),
                Subsection("d".into()),
                Paragraph("1".into()),
                Subparagraph("F".into()),
            ]
        );
    }

    #[test]
    fn test_parse_target_verbose_and_plural() {
        let path = parse_target("in subparagraphs (A) and (B)");
        assert_eq!(
            path,
            vec![Subparagraph("A".into()), Subparagraph("B".into())]
        );

        let path = parse_target("in the matter preceding paragraph (2)");
        // "matter" is unrecognized; consumption stops before it
        assert_eq!(path, Vec::<HierarchyLevel>::new());
    }

    #[test]
    fn test_parse_target_qualifier_discarded() {
        let path = parse_target("subsection (c) (as amended by section 2) of such section");
        // The qualifier parenthetical disappears; its inner section ref is
        // not part of the path.
        assert_eq!(path, vec![Subsection("c".into())]);
    }

    #[test]
    fn test_parse_target_section_first() {
        let path = parse_target("subsection (b) of section 11");
        assert_eq!(path, vec![Section("11".into()), Subsection("b".into())]);
    }

    #[test]
    fn test_usc_citation() {
        assert_eq!(
            extract_usc_citation("the Food and Nutrition Act of 2008 (7 U.S.C. 2014(k)(4))")
                .as_deref(),
            Some("7 U.S.C. 2014(k)(4)")
        );
        // en-dash section numbers survive verbatim
        assert_eq!(
            extract_usc_citation("(7 U.S.C. 1308\u{2013}1)").as_deref(),
            Some("7 U.S.C. 1308\u{2013}1")
        );
        assert_eq!(
            extract_usc_citation("Section 101 of title 10, United States Code,").as_deref(),
            Some("10 U.S.C. 101")
        );
        assert_eq!(extract_usc_citation("the Act of 1956"), None);
    }
}
