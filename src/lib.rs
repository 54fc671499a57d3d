//! Compiler chain for amendatory instructions in U.S. bills: extract
//! instruction trees from PDF paragraph streams, parse instruction text
//! with a BNF grammar, lower the AST to a semantic edit tree, and apply
//! edits to Markdown statute bodies.
//!
//! Control flow: paragraphs → [`extract`] → instruction trees →
//! ([`parser`] → [`translate`] for semantic analysis) → [`apply`] against
//! a section body → [`effect::AmendmentEffect`].

pub mod apply;
pub mod effect;
pub mod extract;
pub mod grammar;
pub mod levels;
pub mod markdown;
pub mod paragraph;
pub mod parser;
pub mod translate;

use effect::AmendmentEffect;
use paragraph::Paragraph;

/// Extract instructions from a paragraph stream and apply each one to the
/// given section body.
pub fn extract_and_apply(
    paragraphs: &[Paragraph],
    section_path: &str,
    section_body: &str,
) -> Vec<AmendmentEffect> {
    extract::extract_instructions(paragraphs)
        .iter()
        .map(|instruction| apply::apply_instruction(instruction, section_path, section_body))
        .collect()
}
