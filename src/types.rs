// src/types.rs

use sha1::{Digest, Sha1};
use std::fmt;

/// Column index of a kept input file in the abundance vector.
pub type SampleSlot = usize;

/// Content identity of a sequence: SHA-1 of its lower-cased residues.
///
/// Ordering is byte order, which matches the lexicographic order of the
/// hex rendering used in output labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 20]);

impl Fingerprint {
    /// Fingerprint of `seq`, ignoring ASCII case.
    pub fn of(seq: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(seq.to_ascii_lowercase().as_bytes());
        Fingerprint(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// A minimal representation of one FASTA record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    /// Full header line after '>', trailing whitespace removed.
    pub id: String,
    /// Residues with all whitespace removed, case untouched.
    pub seq: String,
}

/// How clusters are labelled in every output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdFormat {
    /// `<fingerprint>_<count>`, as expected by swarm.
    #[default]
    Swarm,
    /// First token of the earliest surviving read identifier.
    BestId,
}

/// One cluster that passed the output filters.
#[derive(Debug, Clone)]
pub struct ClusterRow {
    pub label: String,
    pub sequence: String,
    pub counts: Vec<u64>, // one per kept file, in acceptance order
}

/// One line of the identifier map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRow {
    pub label: String,
    pub read_id: String,
}
