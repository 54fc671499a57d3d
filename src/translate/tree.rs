use serde::Serialize;

use crate::levels::HierarchyLevel;

/// Language-agnostic semantic tree for one amendatory instruction: scope
/// wrappers and location restrictions around ultimate edits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionSemanticTree {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_scope_path: Option<Vec<TargetScopeSegment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_section: Option<String>,
    pub children: Vec<TreeChild>,
}

/// One segment of the top-level scope path: a code or act reference, or a
/// hierarchy selector inside the targeted section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetScopeSegment {
    /// e.g. `7 U.S.C.`
    CodeReference { code: String },
    /// e.g. `Public Law 117–58`
    ActReference { act: String },
    Scope { level: HierarchyLevel },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeChild {
    Scope {
        scope: HierarchyLevel,
        children: Vec<TreeChild>,
    },
    LocationRestriction {
        restriction: LocationRestriction,
        children: Vec<TreeChild>,
    },
    Edit {
        edit: UltimateEdit,
    },
}

/// A textual qualifier narrowing where inside the scope an edit applies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LocationRestriction {
    In {
        refs: Vec<HierarchyLevel>,
    },
    Before {
        reference: Vec<HierarchyLevel>,
    },
    After {
        reference: Vec<HierarchyLevel>,
    },
    SentenceOrdinal {
        ordinal: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        anchor: Option<Vec<HierarchyLevel>>,
    },
    SentenceLast {
        #[serde(skip_serializing_if = "Option::is_none")]
        anchor: Option<Vec<HierarchyLevel>>,
    },
    Heading {
        #[serde(skip_serializing_if = "Option::is_none")]
        of: Option<Vec<HierarchyLevel>>,
    },
    SubLocationHeading {
        sub_kind: String,
    },
    MatterPreceding {
        reference: Vec<HierarchyLevel>,
    },
    MatterFollowing {
        reference: Vec<HierarchyLevel>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UltimateEdit {
    Strike {
        target: StrikeTarget,
    },
    StrikeInsert {
        target: StrikeTarget,
        content: String,
    },
    Insert {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<InsertPosition>,
    },
    Rewrite {
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<Vec<HierarchyLevel>>,
        content: String,
    },
    Redesignate {
        mappings: Vec<RedesignationMapping>,
        respectively: bool,
    },
    Move {
        from: Vec<HierarchyLevel>,
        direction: MoveDirection,
        anchor: Vec<HierarchyLevel>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrikeTarget {
    Text {
        text: String,
        each_place_it_appears: bool,
    },
    Reference {
        reference: Vec<HierarchyLevel>,
    },
    Inner {
        location: InnerLocationTarget,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InnerLocationTarget {
    Punctuation { text: String },
    Heading,
    SentenceOrdinal { ordinal: usize },
    SentenceLast,
    MatterPreceding { reference: Vec<HierarchyLevel> },
    MatterFollowing { reference: Vec<HierarchyLevel> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "position", rename_all = "snake_case")]
pub enum InsertPosition {
    Before { anchor: InsertAnchor },
    After { anchor: InsertAnchor },
    AtEndOf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InsertAnchor {
    Text { text: String },
    Punctuation { text: String },
    Reference { reference: Vec<HierarchyLevel> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedesignationMapping {
    pub from: HierarchyLevel,
    pub to: HierarchyLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveDirection {
    Before,
    After,
}

/// Structural incompleteness met while translating; the tree is still
/// produced, callers decide how hard to fail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationIssue {
    pub message: String,
    pub node_type: String,
    pub source_text: String,
}
