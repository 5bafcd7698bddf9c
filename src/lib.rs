// src/lib.rs
pub mod types;
pub mod error;
pub mod fasta;
pub mod sample_names;
pub mod derep_table;
pub mod output;

use std::path::PathBuf;

use crate::derep_table::{ingest_parallel, DerepTable, FileOutcome, IngestSummary};
use crate::error::DerepError;
use crate::output::{assemble, write_outputs, DerepOutput, OutputOptions};
use crate::sample_names::SampleNames;

/// Everything a dereplication run needs to know.
#[derive(Debug, Clone, Default)]
pub struct DerepConfig {
    /// Input FASTA files, ingested in this order.
    pub fasta_files: Vec<PathBuf>,
    /// Catalogue destination; stdout when unset.
    pub output_fasta: Option<PathBuf>,
    pub output_counts: Option<PathBuf>,
    pub output_map: Option<PathBuf>,
    pub sample_names: Option<PathBuf>,
    /// Files with fewer reads are dropped after reading; 0 keeps everything.
    pub min_file_reads: u64,
    /// Parse files on this many threads; 0 or 1 reads them one by one.
    pub threads: usize,
    pub output: OutputOptions,
}

/// Result of a run, with the table kept around for inspection.
pub struct DerepResults {
    pub table: DerepTable,
    /// One summary per input file, in input order.
    pub files: Vec<IngestSummary>,
    pub output: DerepOutput,
}

impl DerepResults {
    pub fn num_rejected(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.outcome == FileOutcome::Rejected)
            .count()
    }
}

/// Loads sample names, ingests every input file and assembles the outputs.
pub fn dereplicate(config: &DerepConfig) -> Result<DerepResults, DerepError> {
    if config.fasta_files.is_empty() {
        return Err(DerepError::NoInputFiles);
    }

    // 1. Sample names, so a bad names file fails before any FASTA is read
    let names = match &config.sample_names {
        Some(path) => SampleNames::load(path)?,
        None => SampleNames::default(),
    };

    // 2. Fold every file into the table
    let mut table = DerepTable::new(config.min_file_reads);
    let files = if config.threads > 1 {
        ingest_parallel(&mut table, &config.fasta_files, config.threads)?
    } else {
        let mut files = Vec::with_capacity(config.fasta_files.len());
        for path in &config.fasta_files {
            files.push(table.ingest_file(path)?);
        }
        files
    };

    // 3. Filter and label
    let output = assemble(&table, &names, &config.output);
    log::info!(
        "{} distinct sequences, {} written, {} of {} files kept",
        table.num_clusters(),
        output.rows.len(),
        table.kept_files().len(),
        files.len()
    );

    Ok(DerepResults { table, files, output })
}

/// Runs [`dereplicate`] and writes all requested outputs.
pub fn run(config: &DerepConfig) -> Result<DerepResults, DerepError> {
    let results = dereplicate(config)?;
    write_outputs(
        &results.output,
        config.output_fasta.as_deref(),
        config.output_counts.as_deref(),
        config.output_map.as_deref(),
    )?;
    Ok(results)
}
