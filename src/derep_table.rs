// src/derep_table.rs

use ahash::AHashMap;
use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::DerepError;
use crate::fasta;
use crate::types::{FastaRecord, Fingerprint, SampleSlot};

/// Everything known about one distinct sequence.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// First sequence text seen for this fingerprint, verbatim.
    pub sequence: String,
    /// Abundance summed over kept files.
    pub total: u64,
    /// Sparse per-slot abundance; slots with zero count are absent.
    pub slot_counts: AHashMap<SampleSlot, u64>,
    /// Indices into the occurrence log, in encounter order.
    pub members: Vec<usize>,
}

impl Cluster {
    fn new(sequence: String) -> Self {
        Cluster {
            sequence,
            total: 0,
            slot_counts: AHashMap::new(),
            members: Vec::new(),
        }
    }

    pub fn count_in(&self, slot: SampleSlot) -> u64 {
        self.slot_counts.get(&slot).copied().unwrap_or(0)
    }

    /// Number of kept files with a nonzero count.
    pub fn sample_count(&self) -> usize {
        self.slot_counts.len()
    }

    /// Clusters created only by rejected files stay in the table with zero abundance.
    pub fn is_live(&self) -> bool {
        self.total > 0
    }
}

/// One record as it was read, kept for traceability even after rollback.
#[derive(Debug, Clone)]
pub struct ReadOccurrence {
    /// Shared with the identifier map, so each identifier is allocated once.
    pub id: Arc<str>,
    pub key: Fingerprint,
    /// Presentation index of the file the read came from.
    pub file: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Kept { slot: SampleSlot },
    Rejected,
}

/// What happened to one ingested file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub path: PathBuf,
    pub records: u64,
    pub outcome: FileOutcome,
}

/// Undo log for the file currently being ingested.
struct FileTxn {
    file: usize,
    slot: SampleSlot,
    records: u64,
    touched: Vec<Fingerprint>,
}

/// Accumulates exact-duplicate counts across sample files.
///
/// Files are folded in strictly in the order presented. A file whose record
/// count falls below `min_file_reads` is rolled back after it has been read
/// and its provisional slot is handed to the next accepted file, so kept
/// files always occupy slots `0..kept_files().len()`.
#[derive(Debug, Default)]
pub struct DerepTable {
    clusters: AHashMap<Fingerprint, Cluster>,
    /// Fingerprints in cluster creation order.
    order: Vec<Fingerprint>,
    occurrences: Vec<ReadOccurrence>,
    /// Identifier -> index of its first occurrence. Never rebound.
    id_map: AHashMap<Arc<str>, usize>,
    files: Vec<FileOutcome>,
    kept_files: Vec<PathBuf>,
    next_slot: SampleSlot,
    min_file_reads: u64,
}

impl DerepTable {
    /// Creates an empty table; a `min_file_reads` of 0 keeps every file.
    pub fn new(min_file_reads: u64) -> Self {
        DerepTable {
            min_file_reads,
            ..Default::default()
        }
    }

    /// Opens `path` and ingests all of its records.
    pub fn ingest_file<P: AsRef<Path>>(&mut self, path: P) -> Result<IngestSummary, DerepError> {
        let path = path.as_ref();
        log::info!("Reading FASTA file: {}", path.display());
        let records = fasta::open(path)?;
        self.ingest(path, records)
    }

    /// Ingests one file's record stream and decides whether to keep it.
    ///
    /// A read error aborts ingestion; the table is then only fit to be dropped.
    pub fn ingest<P, I>(&mut self, path: P, records: I) -> Result<IngestSummary, DerepError>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = io::Result<FastaRecord>>,
    {
        let path = path.as_ref();
        let mut txn = self.begin();
        for record in records {
            let FastaRecord { id, seq } = record.map_err(|source| DerepError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            if seq.is_empty() {
                continue;
            }
            let key = Fingerprint::of(&seq);
            self.add_read(&mut txn, id, key, &seq);
        }
        Ok(self.commit_or_rollback(txn, path))
    }

    /// Folds a file that was parsed and fingerprinted independently.
    pub fn fold_partial(&mut self, partial: PartialFile) -> IngestSummary {
        let PartialFile { path, reads, sequences } = partial;
        let mut txn = self.begin();
        for (id, key) in reads {
            let seq = sequences.get(&key).map(String::as_str).unwrap_or("");
            self.add_read(&mut txn, id, key, seq);
        }
        self.commit_or_rollback(txn, &path)
    }

    fn begin(&mut self) -> FileTxn {
        let file = self.files.len();
        // Placeholder until the file's fate is known.
        self.files.push(FileOutcome::Rejected);
        FileTxn {
            file,
            slot: self.next_slot,
            records: 0,
            touched: Vec::new(),
        }
    }

    fn add_read(&mut self, txn: &mut FileTxn, id: String, key: Fingerprint, seq: &str) {
        let occurrence = self.occurrences.len();
        let order = &mut self.order;
        let cluster = self.clusters.entry(key).or_insert_with(|| {
            order.push(key);
            Cluster::new(seq.to_string())
        });

        cluster.total += 1;
        let slot_count = cluster.slot_counts.entry(txn.slot).or_insert(0);
        if *slot_count == 0 {
            txn.touched.push(key);
        }
        *slot_count += 1;
        cluster.members.push(occurrence);
        txn.records += 1;

        let id: Arc<str> = match self.id_map.get_key_value(id.as_str()) {
            Some((owned, _)) => {
                log::debug!("Read identifier '{}' seen again, keeping first mapping", id);
                Arc::clone(owned)
            }
            None => {
                let id: Arc<str> = Arc::from(id);
                self.id_map.insert(Arc::clone(&id), occurrence);
                id
            }
        };
        self.occurrences.push(ReadOccurrence { id, key, file: txn.file });
    }

    fn commit_or_rollback(&mut self, txn: FileTxn, path: &Path) -> IngestSummary {
        let outcome = if txn.records < self.min_file_reads {
            for key in &txn.touched {
                if let Some(cluster) = self.clusters.get_mut(key) {
                    let count = cluster.slot_counts.remove(&txn.slot).unwrap_or(0);
                    cluster.total -= count;
                }
            }
            log::warn!(
                "Excluding {}: {} reads is below the minimum of {}",
                path.display(),
                txn.records,
                self.min_file_reads
            );
            FileOutcome::Rejected
        } else {
            self.kept_files.push(path.to_path_buf());
            self.next_slot += 1;
            FileOutcome::Kept { slot: txn.slot }
        };
        self.files[txn.file] = outcome;

        log::debug!(
            "{}: {} reads, {} distinct, {:?}",
            path.display(),
            txn.records,
            txn.touched.len(),
            outcome
        );
        IngestSummary {
            path: path.to_path_buf(),
            records: txn.records,
            outcome,
        }
    }

    pub fn cluster(&self, key: &Fingerprint) -> Option<&Cluster> {
        self.clusters.get(key)
    }

    /// All clusters in creation order, including zeroed ones.
    pub fn clusters(&self) -> impl Iterator<Item = (&Fingerprint, &Cluster)> {
        self.order
            .iter()
            .filter_map(move |key| self.clusters.get(key).map(|c| (key, c)))
    }

    pub fn num_clusters(&self) -> usize {
        self.order.len()
    }

    pub fn kept_files(&self) -> &[PathBuf] {
        &self.kept_files
    }

    pub fn next_slot(&self) -> SampleSlot {
        self.next_slot
    }

    pub fn occurrences(&self) -> &[ReadOccurrence] {
        &self.occurrences
    }

    /// Fingerprint a read identifier was first folded into.
    pub fn identifier(&self, id: &str) -> Option<&Fingerprint> {
        self.id_map.get(id).map(|&idx| &self.occurrences[idx].key)
    }

    /// Occurrence indices that own an identifier, in encounter order.
    pub fn first_occurrences(&self) -> impl Iterator<Item = (usize, &ReadOccurrence)> {
        self.occurrences
            .iter()
            .enumerate()
            .filter(move |(idx, _)| self.owns_identifier(*idx))
    }

    /// Whether occurrence `idx` is the one its identifier is mapped through.
    pub fn owns_identifier(&self, idx: usize) -> bool {
        self.occurrences
            .get(idx)
            .is_some_and(|occ| self.id_map.get(&*occ.id) == Some(&idx))
    }

    pub fn is_file_kept(&self, file: usize) -> bool {
        matches!(self.files.get(file), Some(FileOutcome::Kept { .. }))
    }

    /// Earliest read of the cluster that owns its identifier.
    ///
    /// A cluster with abundance must be represented by a read from a kept
    /// file; a zeroed cluster falls back to any read mapped to it.
    pub fn representative(&self, key: &Fingerprint) -> Option<&ReadOccurrence> {
        let cluster = self.clusters.get(key)?;
        let mut owners = cluster
            .members
            .iter()
            .filter(|&&idx| self.owns_identifier(idx))
            .map(|&idx| &self.occurrences[idx]);
        if cluster.is_live() {
            owners.find(|occ| self.is_file_kept(occ.file))
        } else {
            owners.next()
        }
    }
}

/// One file parsed and fingerprinted on its own, ready to be folded in order.
#[derive(Debug, Default)]
pub struct PartialFile {
    pub path: PathBuf,
    /// (identifier, fingerprint) in file order.
    pub reads: Vec<(String, Fingerprint)>,
    /// First sequence text seen in this file per fingerprint.
    pub sequences: AHashMap<Fingerprint, String>,
}

impl PartialFile {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, DerepError> {
        let path = path.as_ref();
        log::info!("Reading FASTA file: {}", path.display());
        let mut partial = PartialFile {
            path: path.to_path_buf(),
            ..Default::default()
        };
        for record in fasta::open(path)? {
            let FastaRecord { id, seq } = record.map_err(|source| DerepError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let key = Fingerprint::of(&seq);
            partial.sequences.entry(key).or_insert(seq);
            partial.reads.push((id, key));
        }
        Ok(partial)
    }
}

/// Parses all files on a `threads`-wide pool, then folds them in the given order.
///
/// Produces the same table as ingesting the files one by one.
pub fn ingest_parallel<P: AsRef<Path> + Sync>(
    table: &mut DerepTable,
    paths: &[P],
    threads: usize,
) -> Result<Vec<IngestSummary>, DerepError> {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    let partials: Vec<PartialFile> =
        pool.install(|| paths.par_iter().map(PartialFile::read).collect::<Result<_, _>>())?;

    Ok(partials
        .into_iter()
        .map(|partial| table.fold_partial(partial))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn reads(pairs: &[(&str, &str)]) -> Vec<io::Result<FastaRecord>> {
        pairs
            .iter()
            .map(|(id, seq)| Ok(FastaRecord { id: id.to_string(), seq: seq.to_string() }))
            .collect()
    }

    /// Comparable snapshot of counts, slots and kept files.
    fn snapshot(table: &DerepTable) -> (Vec<(String, u64, Vec<(usize, u64)>)>, Vec<PathBuf>, usize) {
        let mut clusters: Vec<_> = table
            .clusters()
            .filter(|(_, c)| c.is_live())
            .map(|(k, c)| {
                let mut slots: Vec<_> = c.slot_counts.iter().map(|(&s, &n)| (s, n)).collect();
                slots.sort();
                (k.to_string(), c.total, slots)
            })
            .collect();
        clusters.sort();
        (clusters, table.kept_files().to_vec(), table.next_slot())
    }

    #[test]
    fn test_same_sequence_any_case_across_files() {
        let mut table = DerepTable::new(1);
        table.ingest("a.fa", reads(&[("a1", "ACGT"), ("a2", "acgt")])).unwrap();
        table.ingest("b.fa", reads(&[("b1", "AcGt"), ("b2", "acgt")])).unwrap();

        let key = Fingerprint::of("acgt");
        let cluster = table.cluster(&key).expect("cluster missing");
        assert_eq!(cluster.total, 4);
        assert_eq!((cluster.count_in(0), cluster.count_in(1)), (2, 2));
        assert_eq!(cluster.sequence, "ACGT", "First sequence must be kept verbatim");
        assert_eq!(table.num_clusters(), 1);
        assert_eq!(table.identifier("b1"), Some(&key));
    }

    #[test]
    fn test_count_conservation() {
        let mut table = DerepTable::new(0);
        table
            .ingest("a.fa", reads(&[("1", "AC"), ("2", "GG"), ("3", "ac"), ("4", "TTT")]))
            .unwrap();
        table.ingest("b.fa", reads(&[("5", "GG")])).unwrap();

        for (slot, expected) in [(0, 4u64), (1, 1)] {
            let sum: u64 = table.clusters().map(|(_, c)| c.count_in(slot)).sum();
            assert_eq!(sum, expected, "Slot {slot} sum must equal its record count");
        }
    }

    #[test]
    fn test_rollback_is_exact() {
        let mut rejected = DerepTable::new(2);
        rejected.ingest("a.fa", reads(&[("1", "AC"), ("2", "GG")])).unwrap();
        let summary = rejected.ingest("b.fa", reads(&[("3", "GG")])).unwrap();
        rejected.ingest("c.fa", reads(&[("4", "AC"), ("5", "TT")])).unwrap();

        let mut never_seen = DerepTable::new(2);
        never_seen.ingest("a.fa", reads(&[("1", "AC"), ("2", "GG")])).unwrap();
        never_seen.ingest("c.fa", reads(&[("4", "AC"), ("5", "TT")])).unwrap();

        assert_eq!(summary.outcome, FileOutcome::Rejected);
        assert_eq!(snapshot(&rejected), snapshot(&never_seen));
        // identifiers of the rejected file still resolve
        assert_eq!(rejected.identifier("3"), Some(&Fingerprint::of("gg")));
    }

    #[test]
    fn test_rejected_slot_is_reused() {
        let mut table = DerepTable::new(2);
        table.ingest("1.fa", reads(&[("a", "AC"), ("b", "GG")])).unwrap();
        table.ingest("2.fa", reads(&[("c", "AC")])).unwrap();
        let third = table.ingest("3.fa", reads(&[("d", "AC"), ("e", "AC")])).unwrap();

        assert_eq!(third.outcome, FileOutcome::Kept { slot: 1 });
        assert_eq!(table.kept_files(), &[PathBuf::from("1.fa"), PathBuf::from("3.fa")]);
        assert_eq!(table.next_slot(), 2);
        let ac = table.cluster(&Fingerprint::of("ac")).unwrap();
        assert_eq!(ac.total, 3);
        assert_eq!((ac.count_in(0), ac.count_in(1)), (1, 2));
    }

    #[test]
    fn test_slot_density() {
        let mut table = DerepTable::new(2);
        let files: [&[(&str, &str)]; 5] = [
            &[("1", "A")],
            &[("2", "A"), ("3", "C")],
            &[],
            &[("4", "G"), ("5", "G"), ("6", "T")],
            &[("7", "T")],
        ];
        for (i, recs) in files.iter().enumerate() {
            table.ingest(format!("{i}.fa"), reads(recs)).unwrap();
            let kept = table.kept_files().len();
            assert_eq!(table.next_slot(), kept);
            for (_, cluster) in table.clusters() {
                assert!(cluster.slot_counts.keys().all(|&s| s < kept), "Slot beyond kept files");
                assert!(cluster.slot_counts.values().all(|&n| n > 0), "Zero slot left behind");
            }
        }
        assert_eq!(table.kept_files().len(), 2);
    }

    #[test]
    fn test_zero_records_rejected_with_floor() {
        let mut table = DerepTable::new(1);
        let summary = table.ingest("empty.fa", reads(&[])).unwrap();
        assert_eq!(summary.outcome, FileOutcome::Rejected);
        assert!(table.kept_files().is_empty());

        let mut lenient = DerepTable::new(0);
        let summary = lenient.ingest("empty.fa", reads(&[])).unwrap();
        assert_eq!(summary.outcome, FileOutcome::Kept { slot: 0 });
    }

    #[test]
    fn test_representative_skips_rejected_file() {
        let mut table = DerepTable::new(2);
        table.ingest("A.fa", reads(&[("read1", "ACGT")])).unwrap();
        table.ingest("B.fa", reads(&[("read2", "ACGT"), ("read3", "TT")])).unwrap();

        let rep = table.representative(&Fingerprint::of("acgt")).expect("no representative");
        assert_eq!(&*rep.id, "read2");
    }

    #[test]
    fn test_duplicate_identifier_keeps_first_mapping() {
        let mut table = DerepTable::new(0);
        table.ingest("a.fa", reads(&[("r", "AA"), ("r", "CC")])).unwrap();
        assert_eq!(table.identifier("r"), Some(&Fingerprint::of("aa")));
        assert_eq!(table.cluster(&Fingerprint::of("cc")).unwrap().total, 1);
        assert_eq!(table.first_occurrences().count(), 1);
    }

    #[test]
    fn test_representative_owns_its_identifier() {
        let mut table = DerepTable::new(0);
        table.ingest("a.fa", reads(&[("r", "AA"), ("r", "CC"), ("s", "CC")])).unwrap();

        let aa = table.representative(&Fingerprint::of("aa")).expect("AA representative");
        assert_eq!(&*aa.id, "r");
        let cc = table.representative(&Fingerprint::of("cc")).expect("CC representative");
        assert_eq!(&*cc.id, "s", "Repeated identifier must not label a second cluster");
        assert!(table.owns_identifier(0));
        assert!(!table.owns_identifier(1));
    }

    #[test]
    fn test_repeated_identifier_shares_allocation() {
        let mut table = DerepTable::new(0);
        table.ingest("a.fa", reads(&[("r", "AA")])).unwrap();
        table.ingest("b.fa", reads(&[("r", "AA")])).unwrap();
        let occ = table.occurrences();
        assert!(Arc::ptr_eq(&occ[0].id, &occ[1].id));
    }

    #[test]
    fn test_zeroed_cluster_representative() {
        let mut table = DerepTable::new(2);
        table.ingest("a.fa", reads(&[("1", "AA"), ("2", "CC")])).unwrap();
        table.ingest("b.fa", reads(&[("3", "GG")])).unwrap();

        let gg = Fingerprint::of("gg");
        assert!(!table.cluster(&gg).unwrap().is_live());
        assert_eq!(table.representative(&gg).map(|o| &*o.id), Some("3"));
    }

    #[test]
    fn test_read_error_is_reported_with_path() {
        let mut table = DerepTable::new(0);
        let records = vec![
            Ok(FastaRecord { id: "1".into(), seq: "AC".into() }),
            Err(io::Error::new(io::ErrorKind::InvalidData, "bad byte")),
        ];
        let err = table.ingest("broken.fa", records).unwrap_err();
        assert!(matches!(err, DerepError::Read { ref path, .. } if path == Path::new("broken.fa")));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let dir = tempfile::tempdir().expect("tempdir");
        let contents = [
            ">a1\nACGT\n>a2\nGGCC\n>a3\nacgt\n",
            ">b1\nTTTT\n",
            ">c1\nggcc\n>c2\nAC\nGT\n>c3\nAAAA\n",
        ];
        let paths: Vec<PathBuf> = contents
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let p = dir.path().join(format!("s{i}.fa"));
                fs::write(&p, text).expect("write fixture");
                p
            })
            .collect();

        let mut sequential = DerepTable::new(2);
        for p in &paths {
            sequential.ingest_file(p).expect("sequential ingest");
        }
        let mut parallel = DerepTable::new(2);
        let summaries = ingest_parallel(&mut parallel, &paths, 3).expect("parallel ingest");

        assert_eq!(summaries[1].outcome, FileOutcome::Rejected);
        assert_eq!(snapshot(&sequential), snapshot(&parallel));
        let seq_order: Vec<_> = sequential.clusters().map(|(k, _)| *k).collect();
        let par_order: Vec<_> = parallel.clusters().map(|(k, _)| *k).collect();
        assert_eq!(seq_order, par_order);
    }
}
