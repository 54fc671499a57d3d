use anyhow::Result;
use clap::Parser;

mod cli;
mod config;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Extract { paragraphs } => cli::run_extract(paragraphs),
        Commands::Parse { text } => cli::run_parse(text),
        Commands::Apply {
            instructions,
            section,
            section_path,
        } => cli::run_apply(instructions, section, section_path),
        Commands::Batch { dir } => cli::run_batch(dir),
    }
}
