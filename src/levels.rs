use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A single segment of statutory hierarchy, e.g. the `(b)` of
/// `section 5(b)(2)`. Rank runs from broadest (section) to narrowest
/// (subitem); `None` marks text that carries no label at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "val", rename_all = "snake_case")]
pub enum HierarchyLevel {
    Section(String),
    Subsection(String),
    Paragraph(String),
    Subparagraph(String),
    Clause(String),
    Subclause(String),
    Item(String),
    Subitem(String),
    None,
}

use HierarchyLevel::*;

impl HierarchyLevel {
    /// Rank order: section 0 through subitem 7. `None` has no rank.
    pub fn rank(&self) -> Option<usize> {
        match self {
            Section(_) => Some(0),
            Subsection(_) => Some(1),
            Paragraph(_) => Some(2),
            Subparagraph(_) => Some(3),
            Clause(_) => Some(4),
            Subclause(_) => Some(5),
            Item(_) => Some(6),
            Subitem(_) => Some(7),
            None => Option::None,
        }
    }

    pub fn val(&self) -> Option<&str> {
        match self {
            Section(v) | Subsection(v) | Paragraph(v) | Subparagraph(v) | Clause(v)
            | Subclause(v) | Item(v) | Subitem(v) => Some(v),
            None => Option::None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Section(_) => "section",
            Subsection(_) => "subsection",
            Paragraph(_) => "paragraph",
            Subparagraph(_) => "subparagraph",
            Clause(_) => "clause",
            Subclause(_) => "subclause",
            Item(_) => "item",
            Subitem(_) => "subitem",
            None => "none",
        }
    }

    /// Build a level from a verbose type word as it appears in bill text
    /// (singular or plural, any case).
    pub fn from_kind(kind: &str, val: &str) -> Option<HierarchyLevel> {
        let val = val.to_string();
        match kind.to_lowercase().trim_end_matches('s') {
            "section" => Some(Section(val)),
            "subsection" => Some(Subsection(val)),
            "paragraph" => Some(Paragraph(val)),
            "subparagraph" => Some(Subparagraph(val)),
            "clause" => Some(Clause(val)),
            "subclause" => Some(Subclause(val)),
            "item" => Some(Item(val)),
            "subitem" => Some(Subitem(val)),
            _ => Option::None,
        }
    }

    pub fn at_rank(rank: usize, val: &str) -> Option<HierarchyLevel> {
        let val = val.to_string();
        match rank {
            0 => Some(Section(val)),
            1 => Some(Subsection(val)),
            2 => Some(Paragraph(val)),
            3 => Some(Subparagraph(val)),
            4 => Some(Clause(val)),
            5 => Some(Subclause(val)),
            6 => Some(Item(val)),
            7 => Some(Subitem(val)),
            _ => Option::None,
        }
    }

    /// Classify a bare parenthesized label by its shape. Lowercase roman
    /// (`i`, `iv`, ...) wins over lowercase alpha, matching how bill text
    /// uses the two alphabets: clause labels are drawn from `[ivx]+`.
    pub fn classify_bare(label: &str) -> HierarchyLevel {
        static LOWER_ROMAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[ivx]+$").unwrap());
        static UPPER_ROMAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[IVX]+$").unwrap());
        static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").unwrap());
        static LOWER_ALPHA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]+$").unwrap());
        static UPPER_ALPHA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]+$").unwrap());

        let val = label.to_string();
        if LOWER_ROMAN.is_match(label) && label.len() > 1 {
            Clause(val)
        } else if UPPER_ROMAN.is_match(label) && label.len() > 1 {
            Subclause(val)
        } else if label == "i" || label == "v" || label == "x" {
            Clause(val)
        } else if label == "I" || label == "V" || label == "X" {
            Subclause(val)
        } else if NUMERIC.is_match(label) {
            Paragraph(val)
        } else if LOWER_ALPHA.is_match(label) {
            Subsection(val)
        } else if UPPER_ALPHA.is_match(label) {
            Subparagraph(val)
        } else {
            None
        }
    }
}

impl fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.val() {
            Some(val) => write!(f, "{}:{}", self.kind_name(), val),
            Option::None => write!(f, "{}", self.kind_name()),
        }
    }
}

/// Parse a leading `(X)` label from paragraph text. Returns the classified
/// level and the text after the label (and any following whitespace).
pub fn leading_label(text: &str) -> Option<(HierarchyLevel, &str)> {
    static LABEL_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\(([A-Za-z0-9]+)\)\s*").unwrap());

    let captures = LABEL_RE.captures(text)?;
    let full = captures.get(0)?;
    let label = captures.get(1)?;

    Some((
        HierarchyLevel::classify_bare(label.as_str()),
        &text[full.end()..],
    ))
}

/// Format a target path as `type:val > type:val`, the shape the applier's
/// diagnostics use.
pub fn format_path(path: &[HierarchyLevel]) -> String {
    path.iter()
        .map(|level| level.to_string())
        .collect::<Vec<_>>()
        .join(" > ")
}
