// src/output.rs

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::derep_table::{Cluster, DerepTable};
use crate::error::DerepError;
use crate::sample_names::SampleNames;
use crate::types::{ClusterRow, Fingerprint, IdFormat, MapRow};

/// Thresholds and naming applied identically to all three outputs.
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    /// Minimum number of kept files a cluster must occur in.
    pub min_samples: usize,
    /// Minimum abundance summed over kept files.
    pub min_count: u64,
    pub id_format: IdFormat,
}

impl Default for OutputOptions {
    fn default() -> Self {
        OutputOptions {
            min_samples: 1,
            min_count: 1,
            id_format: IdFormat::Swarm,
        }
    }
}

impl OutputOptions {
    /// Clusters zeroed by rollback only pass when both thresholds are 0.
    pub fn passes(&self, cluster: &Cluster) -> bool {
        cluster.sample_count() >= self.min_samples && cluster.total >= self.min_count
    }
}

/// The finished catalogue, abundance matrix and identifier map.
#[derive(Debug, Clone, Default)]
pub struct DerepOutput {
    /// Column labels of the abundance matrix, one per kept file.
    pub column_names: Vec<String>,
    /// Passing clusters in creation order.
    pub rows: Vec<ClusterRow>,
    /// Identifier map, ordered by fingerprint.
    pub map_rows: Vec<MapRow>,
}

/// Builds all outputs from the final table state.
pub fn assemble(table: &DerepTable, names: &SampleNames, options: &OutputOptions) -> DerepOutput {
    let column_names = table
        .kept_files()
        .iter()
        .map(|p| names.lookup(&p.to_string_lossy()))
        .collect();
    let num_slots = table.kept_files().len();

    let mut rows = Vec::new();
    for (key, cluster) in table.clusters() {
        if !options.passes(cluster) {
            continue;
        }
        rows.push(ClusterRow {
            label: cluster_label(table, key, cluster, options.id_format),
            sequence: cluster.sequence.clone(),
            counts: (0..num_slots).map(|slot| cluster.count_in(slot)).collect(),
        });
    }

    let mut mapped: Vec<(&Fingerprint, usize, &str)> = table
        .first_occurrences()
        .filter_map(|(idx, occ)| {
            let cluster = table.cluster(&occ.key)?;
            options.passes(cluster).then_some((&occ.key, idx, &*occ.id))
        })
        .collect();
    mapped.sort_by(|a, b| a.0.cmp(b.0).then(a.1.cmp(&b.1)));

    let mut map_rows = Vec::with_capacity(mapped.len());
    let mut last: Option<(&Fingerprint, String)> = None;
    for (key, _, read_id) in mapped {
        let label = match &last {
            Some((prev, label)) if *prev == key => label.clone(),
            // passes() already guaranteed the cluster exists
            _ => table
                .cluster(key)
                .map(|c| cluster_label(table, key, c, options.id_format))
                .unwrap_or_default(),
        };
        last = Some((key, label.clone()));
        map_rows.push(MapRow {
            label,
            read_id: read_id.to_string(),
        });
    }

    DerepOutput {
        column_names,
        rows,
        map_rows,
    }
}

fn cluster_label(table: &DerepTable, key: &Fingerprint, cluster: &Cluster, format: IdFormat) -> String {
    let swarm = || format!("{}_{}", key, cluster.total);
    match format {
        IdFormat::Swarm => swarm(),
        IdFormat::BestId => match table.representative(key).map(|occ| first_token(&occ.id)) {
            Some(token) if !token.is_empty() => token.to_string(),
            // empty or whitespace-led header
            _ => swarm(),
        },
    }
}

/// Header text up to the first whitespace character.
fn first_token(id: &str) -> &str {
    id.split(char::is_whitespace).next().unwrap_or("")
}

impl DerepOutput {
    pub fn write_catalogue<W: Write>(&self, mut out: W) -> io::Result<()> {
        for row in &self.rows {
            writeln!(out, ">{}\n{}", row.label, row.sequence)?;
        }
        out.flush()
    }

    pub fn write_counts<W: Write>(&self, mut out: W) -> io::Result<()> {
        write!(out, "id")?;
        for name in &self.column_names {
            write!(out, "\t{}", name)?;
        }
        writeln!(out)?;

        for row in &self.rows {
            write!(out, "{}", row.label)?;
            for count in &row.counts {
                write!(out, "\t{}", count)?;
            }
            writeln!(out)?;
        }
        out.flush()
    }

    pub fn write_map<W: Write>(&self, mut out: W) -> io::Result<()> {
        for row in &self.map_rows {
            writeln!(out, "{}\t{}", row.label, row.read_id)?;
        }
        out.flush()
    }
}

fn create_output(path: &Path) -> Result<BufWriter<File>, DerepError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| DerepError::Write {
            path: path.to_path_buf(),
            source,
        })
}

fn write_to_file<F>(path: &Path, what: &str, write: F) -> Result<(), DerepError>
where
    F: FnOnce(BufWriter<File>) -> io::Result<()>,
{
    log::info!("Writing {} file: {}", what, path.display());
    let out = create_output(path)?;
    write(out).map_err(|source| DerepError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes the catalogue (stdout when `fasta` is `None`) and any requested tables.
pub fn write_outputs(
    output: &DerepOutput,
    fasta: Option<&Path>,
    counts: Option<&Path>,
    map: Option<&Path>,
) -> Result<(), DerepError> {
    match fasta {
        Some(path) => write_to_file(path, "FASTA", |w| output.write_catalogue(w))?,
        None => {
            let stdout = io::stdout();
            output
                .write_catalogue(BufWriter::new(stdout.lock()))
                .map_err(|source| DerepError::Write {
                    path: "<stdout>".into(),
                    source,
                })?;
        }
    }
    if let Some(path) = counts {
        write_to_file(path, "counts", |w| output.write_counts(w))?;
    }
    if let Some(path) = map {
        write_to_file(path, "map", |w| output.write_map(w))?;
    }
    Ok(())
}
