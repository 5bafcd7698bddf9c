// src/bin/derep_cli.rs

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process;

use derep_rs::output::OutputOptions;
use derep_rs::types::IdFormat;
use derep_rs::{run, DerepConfig};

/// Dereplicate FASTA files by exact sequence identity
#[derive(Parser)]
#[command(name = "derep-rs")]
#[command(version, about = "Unique FASTA sequences (100% identity) in swarm or best-id formats")]
struct Args {
    /// Input FASTA file(s), optionally .gz or .bz2 compressed
    fasta_files: Vec<PathBuf>,

    /// Output FASTA file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output sample counts file
    #[arg(short, long)]
    counts: Option<PathBuf>,

    /// Output ID map table
    #[arg(short, long)]
    map: Option<PathBuf>,

    /// Sample names file (<name>\t<file> per line)
    #[arg(short, long)]
    names: Option<PathBuf>,

    /// Minimum number of samples a sequence must occur in
    #[arg(short = 'l', long, default_value_t = 1)]
    min_samples: usize,

    /// Minimum total count of a sequence
    #[arg(short = 't', long, default_value_t = 1)]
    min_count: u64,

    /// Drop input files with fewer reads than this
    #[arg(short = 'r', long)]
    min_reads: Option<u64>,

    /// Output format: swarm (default)
    #[arg(short, long, conflicts_with = "bestid")]
    swarm: bool,

    /// Output format: best ID
    #[arg(short, long)]
    bestid: bool,

    /// Parse input files in parallel on this many threads
    #[arg(short = 'x', long, default_value_t = 1)]
    threads: usize,

    /// More information to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> DerepConfig {
        DerepConfig {
            fasta_files: self.fasta_files,
            output_fasta: self.output,
            output_counts: self.counts,
            output_map: self.map,
            sample_names: self.names,
            // no floor means no file is ever rejected
            min_file_reads: self.min_reads.unwrap_or(0),
            threads: self.threads,
            output: OutputOptions {
                min_samples: self.min_samples,
                min_count: self.min_count,
                id_format: if self.bestid && !self.swarm { IdFormat::BestId } else { IdFormat::Swarm },
            },
        }
    }
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => e.exit(),
    };

    let default_level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let verbose = args.verbose;
    let config = args.into_config();

    let spinner = if verbose {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(100));
        spinner
    } else {
        ProgressBar::hidden()
    };
    spinner.set_message(format!("Dereplicating {} FASTA file(s)...", config.fasta_files.len()));

    match run(&config) {
        Ok(results) => {
            spinner.finish_with_message(format!(
                "Done: {} sequences from {} kept file(s), {} excluded.",
                results.output.rows.len(),
                results.table.kept_files().len(),
                results.num_rejected()
            ));
        }
        Err(e) => {
            spinner.finish_and_clear();
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}
