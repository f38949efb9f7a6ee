//! CLI entry point for arcprobe
//!
//! Classifies captured M115 responses offline and inspects rule files.
//!
//! ```bash
//! arcprobe classify m115.txt --rules ~/.local/share/arcprobe/firmware/types.json
//! arcprobe rules
//! ```

use anyhow::{Context, Result};
use arcprobe::{classify_response, init_logging, RuleSet, BUILD_DATE, EMBEDDED_DEFAULTS, VERSION};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "arcprobe")]
#[command(about = "Detect printer firmware and G2/G3 arc support", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a captured M115 response, one response line per file line
    Classify {
        /// Path to the captured response
        response: PathBuf,

        /// Rule file to classify against; the built-in rules when omitted
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Show the rule set version and its firmware families
    Rules {
        /// Rule file to inspect; the built-in rules when omitted
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

fn load_rules(path: Option<&Path>) -> Result<RuleSet> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading rule file {}", path.display()))?;
            RuleSet::from_json(&text)
                .with_context(|| format!("parsing rule file {}", path.display()))
        }
        None => RuleSet::from_json(EMBEDDED_DEFAULTS).context("parsing built-in rules"),
    }
}

fn main() -> Result<()> {
    init_logging()?;
    tracing::debug!("arcprobe {} (built {})", VERSION, BUILD_DATE);

    let cli = Cli::parse();
    match cli.command {
        Commands::Classify { response, rules } => {
            let rules = load_rules(rules.as_deref())?;
            let text = std::fs::read_to_string(&response)
                .with_context(|| format!("reading response file {}", response.display()))?;
            let lines: Vec<String> = text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();

            let info = classify_response(&rules, &lines);
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Rules { rules } => {
            let rules = load_rules(rules.as_deref())?;
            println!("Rules version: {}", rules.version());
            for family in rules.families() {
                println!(
                    "  {:<16} {} ({}, {} version entries)",
                    family.key,
                    family.name,
                    family.version_compare_type,
                    family.versions.len()
                );
            }
        }
    }

    Ok(())
}
