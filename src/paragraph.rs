use serde::{Deserialize, Serialize};

/// One line of PDF-extracted text with its visual placement. `x_start` is
/// the left edge in the extractor's units; the extractor upstream guarantees
/// consistent units within a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub x_start: f32,
    pub y: f32,
    pub page: u32,
    pub text: String,
}

/// A paragraph of bill text as delivered by the external PDF extractor.
///
/// `lines` is non-empty and in reading order; `lines[0].x_start` is the
/// indentation used for hierarchy inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    pub text: String,
    pub lines: Vec<Line>,
    pub start_page: u32,
    pub end_page: u32,
}

impl Paragraph {
    /// Visual indentation of the paragraph.
    pub fn indent(&self) -> f32 {
        self.lines.first().map(|line| line.x_start).unwrap_or(0.0)
    }

    /// Quoted continuation text starts with a quote character; it is content
    /// pulled into an instruction, not bill structure.
    pub fn is_quoted(&self) -> bool {
        is_quoted_text(&self.text)
    }
}

pub fn is_quoted_text(text: &str) -> bool {
    matches!(
        text.trim_start().chars().next(),
        Some('"') | Some('\u{201C}') | Some('\u{201D}') | Some('\'') | Some('\u{2018}')
            | Some('\u{2019}')
    )
}

#[cfg(test)]
pub fn test_paragraph(text: &str, indent: f32) -> Paragraph {
    Paragraph {
        text: text.to_string(),
        lines: vec![Line {
            x_start: indent,
            y: 0.0,
            page: 1,
            text: text.to_string(),
        }],
        start_page: 1,
        end_page: 1,
    }
}
