//! Command-line front end for the CMIP6 oxygen collector.
//!
//! # Usage
//!
//! ```bash
//! omz scan /data/cmip6/o2 --experiment historical --experiment ssp585
//! omz scan --config analysis.toml --json > collection.json
//! omz defaults > analysis.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use omz_core::collector::collect;
use omz_core::config::Config;
use omz_core::reader::NetcdfReader;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "omz")]
#[command(about = "Collect CMIP6 ocean-oxygen output into model/experiment ensembles")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log progress of every model and experiment
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a directory and summarise what was found
    Scan {
        /// Directory holding the files (overrides the configuration)
        directory: Option<PathBuf>,

        /// Glob pattern for file names
        #[arg(short, long)]
        pattern: Option<String>,

        /// Separator around model names in file names
        #[arg(short, long)]
        separator: Option<String>,

        /// Model to look for; may be repeated
        #[arg(short, long = "model")]
        models: Vec<String>,

        /// Experiment to look for; may be repeated
        #[arg(short, long = "experiment")]
        experiments: Vec<String>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the default configuration as TOML
    Defaults,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => Config::default(),
    };

    match args.command {
        Command::Defaults => {
            print!("{}", Config::default().to_toml_string()?);
        }
        Command::Scan {
            directory,
            pattern,
            separator,
            models,
            experiments,
            json,
        } => {
            let options = &mut config.collector;
            if let Some(directory) = directory {
                options.directory = directory;
            }
            if let Some(pattern) = pattern {
                options.pattern = pattern;
            }
            if let Some(separator) = separator {
                options.separator = separator;
            }
            if !models.is_empty() {
                options.models = models;
            }
            if !experiments.is_empty() {
                options.experiments = experiments;
            }

            info!("Scanning {}", options.directory.display());
            let Some(collection) = collect(&NetcdfReader::new(), options)? else {
                println!("No files found");
                return Ok(());
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&collection.summary())?);
                return Ok(());
            }

            for entry in collection.summary() {
                let dims: Vec<String> = entry
                    .dims
                    .iter()
                    .map(|(dim, len)| format!("{dim}={len}"))
                    .collect();
                println!(
                    "{:<16} {:<12} {:>3} members  {}",
                    entry.model_id,
                    entry.experiment_id,
                    entry.members.len(),
                    dims.join(" ")
                );
            }
            for omission in collection.omissions() {
                println!("{}", omission.to_error());
            }
            let report = collection.report();
            if !report.unmatched.is_empty() {
                println!("{} file(s) matched no model", report.unmatched.len());
            }
            for ambiguity in &report.ambiguous {
                println!(
                    "{} counted for {:?} / {:?}",
                    ambiguity.path.display(),
                    ambiguity.models,
                    ambiguity.experiments
                );
            }
        }
    }
    Ok(())
}
