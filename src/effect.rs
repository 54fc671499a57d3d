use serde::{Deserialize, Serialize};

use crate::extract::operation::OperationKind;

/// The structured, auditable result of applying one instruction to a
/// section body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmendmentEffect {
    pub status: EffectStatus,
    pub section_path: String,
    pub segments: Vec<Segment>,
    pub changes: Vec<Change>,
    pub debug: EffectDebug,
}

impl AmendmentEffect {
    /// An unsupported effect reproduces the body untouched.
    pub fn unsupported(
        section_path: &str,
        body: &str,
        reason: &str,
        attempts: Vec<OperationMatchAttempt>,
        operation_count: usize,
    ) -> AmendmentEffect {
        AmendmentEffect {
            status: EffectStatus::Unsupported,
            section_path: section_path.to_string(),
            segments: vec![Segment {
                kind: SegmentKind::Unchanged,
                text: body.to_string(),
            }],
            changes: Vec::new(),
            debug: EffectDebug {
                section_text_length: body.len(),
                operation_count,
                operation_attempts: attempts,
                failure_reason: Some(reason.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectStatus {
    Ok,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Unchanged,
    Deleted,
    Inserted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub deleted: String,
    pub inserted: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectDebug {
    pub section_text_length: usize,
    pub operation_count: usize,
    pub operation_attempts: Vec<OperationMatchAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Per-operation diagnostics: what was searched, where, and how it went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMatchAttempt {
    pub operation_type: OperationKind,
    pub node_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub striking_content: Option<String>,
    /// formatted `type:val > type:val`
    pub target_path: String,
    pub has_explicit_target_path: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoped_range: Option<ScopedRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
    pub search_text_kind: SearchTextKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_index: Option<usize>,
    pub patch_applied: bool,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedRange {
    pub start: usize,
    pub end: usize,
    /// capped preview of the scoped text
    pub preview: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTextKind {
    Striking,
    AnchorBefore,
    AnchorAfter,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Applied,
    NoPatch,
    ScopeUnresolved,
}
