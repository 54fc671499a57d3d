use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::warn;
use rayon::prelude::*;
use serde_json::json;
use walkdir::WalkDir;

use amendatory::apply::{apply_tree, ApplyOptions};
use amendatory::extract::{extract_instructions, AmendatoryInstruction};
use amendatory::paragraph::Paragraph;
use amendatory::parser::parse_instruction_from_lines;
use amendatory::translate::translate;

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "amendatory")]
#[command(
    author,
    version,
    about = "Compile amendatory instructions from U.S. bills into executable edit plans"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract amendatory instructions from a paragraph-stream JSON file
    Extract {
        /// JSON array of PDF-extracted paragraphs
        paragraphs: PathBuf,
    },
    /// Parse instruction text with the grammar and print its semantic tree
    Parse {
        /// Plain-text file holding the instruction (possibly multiline)
        text: PathBuf,
    },
    /// Apply extracted instructions to a Markdown section body
    Apply {
        /// JSON array of extracted instructions
        instructions: PathBuf,
        /// Markdown file with the section body
        section: PathBuf,
        /// Section path like /statutes/usc/section/7/2014
        #[arg(long)]
        section_path: String,
    },
    /// Extract every *.paragraphs.json under a directory and report counts
    Batch { dir: PathBuf },
}

pub fn run_extract(path: &Path) -> Result<()> {
    let instructions = extract_file(path)?;
    println!("{}", serde_json::to_string_pretty(&instructions)?);
    Ok(())
}

fn extract_file(path: &Path) -> Result<Vec<AmendatoryInstruction>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading paragraphs from {}", path.display()))?;
    let paragraphs: Vec<Paragraph> = serde_json::from_str(&text)
        .with_context(|| format!("parsing paragraphs in {}", path.display()))?;
    Ok(extract_instructions(&paragraphs))
}

pub fn run_parse(path: &Path) -> Result<()> {
    let settings = Settings::new()?;
    let grammar = settings.load_grammar()?;

    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let lines: Vec<String> = text.lines().map(|line| line.to_string()).collect();

    match parse_instruction_from_lines(&grammar, &lines, 0) {
        None => println!("null"),
        Some(parsed) => {
            let translation = translate(&parsed.ast);
            let output = json!({
                "text": parsed.text,
                "endIndex": parsed.end_index,
                "endColumn": parsed.end_column,
                "tree": translation.tree,
                "issues": translation.issues,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

pub fn run_apply(instructions: &Path, section: &Path, section_path: &str) -> Result<()> {
    let settings = Settings::new()?;
    let options = ApplyOptions {
        preview_limit: settings.preview_limit,
    };

    let text = fs::read_to_string(instructions)
        .with_context(|| format!("reading instructions from {}", instructions.display()))?;
    let instructions: Vec<AmendatoryInstruction> = serde_json::from_str(&text)?;
    let body = fs::read_to_string(section)
        .with_context(|| format!("reading section body from {}", section.display()))?;

    let effects: Vec<_> = instructions
        .iter()
        .map(|instruction| apply_tree(&instruction.tree, section_path, &body, &options))
        .collect();
    println!("{}", serde_json::to_string_pretty(&effects)?);
    Ok(())
}

pub fn run_batch(dir: &Path) -> Result<()> {
    let files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(".paragraphs.json"))
        })
        .map(|entry| entry.path().to_path_buf())
        .collect();

    let counts: Vec<(PathBuf, usize)> = files
        .par_iter()
        .filter_map(|path| match extract_file(path) {
            Ok(instructions) => Some((path.clone(), instructions.len())),
            Err(err) => {
                warn!("skipping {}: {err:#}", path.display());
                None
            }
        })
        .collect();

    for (path, count) in &counts {
        println!("{}\t{}", path.display(), count);
    }
    println!(
        "{} files, {} instructions",
        counts.len(),
        counts.iter().map(|(_, count)| count).sum::<usize>()
    );
    Ok(())
}
