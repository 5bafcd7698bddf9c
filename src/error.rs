// src/error.rs

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Every fatal condition of a dereplication run.
#[derive(Debug, Error)]
pub enum DerepError {
    #[error("no input FASTA files supplied")]
    NoInputFiles,

    #[error("unable to open file: {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error while reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to write to file: {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("duplicate sample name '{name}' for {path} (already used for {previous})")]
    DuplicateName {
        name: String,
        path: String,
        previous: String,
    },

    #[error("malformed line {line} in sample names file {}: expected <name>\\t<file>", path.display())]
    MalformedSampleNames { path: PathBuf, line: usize },

    #[error("could not build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl DerepError {
    /// Process exit status for this error. Argument errors (2) are reported by clap itself.
    pub fn exit_code(&self) -> i32 {
        match self {
            DerepError::NoInputFiles => 3,
            DerepError::Open { .. } | DerepError::Read { .. } => 4,
            DerepError::DuplicateName { .. } => 5,
            DerepError::MalformedSampleNames { .. } => 6,
            DerepError::Write { .. } | DerepError::ThreadPool(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let open = DerepError::Open {
            path: PathBuf::from("a.fa"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        let dup = DerepError::DuplicateName {
            name: "S1".into(),
            path: "b.fa".into(),
            previous: "a.fa".into(),
        };
        let codes = [DerepError::NoInputFiles.exit_code(), open.exit_code(), dup.exit_code()];
        assert_eq!(codes, [3, 4, 5]);
        assert!(codes.iter().all(|&c| c != 0 && c != 2), "Codes must not clash with success or clap errors");
    }

    #[test]
    fn test_messages_name_the_file() {
        let err = DerepError::Open {
            path: PathBuf::from("sample1.filtered.fa"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(err.to_string(), "unable to open file: sample1.filtered.fa");
    }
}
