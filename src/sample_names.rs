// src/sample_names.rs

use ahash::AHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::DerepError;

/// Marker inserted by the upstream filtering step before the file extension.
pub const FILTERED_MARKER: &str = ".filtered.";

/// Extension assumed when deriving the filtered alias of a bare path.
pub const FILTERED_EXTENSION: &str = "fa";

/// Display names for input files, parsed from a file in the format:
/// ```text
/// <name>\t<filepath>
/// ```
/// Both the literal path and its filtered/unfiltered alias resolve to the name.
#[derive(Debug, Default, Clone)]
pub struct SampleNames {
    by_path: AHashMap<String, String>,
}

impl SampleNames {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DerepError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DerepError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Reading sample names file: {}", path.display());
        Self::parse(BufReader::new(file), path)
    }

    /// Parses name/path pairs from any reader; `source` is used in errors only.
    pub fn parse<R: BufRead>(reader: R, source: &Path) -> Result<Self, DerepError> {
        let mut by_path = AHashMap::new();
        // name -> first path declaring it
        let mut declared: AHashMap<String, String> = AHashMap::new();

        for (idx, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(|e| DerepError::Read {
                path: source.to_path_buf(),
                source: e,
            })?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            let mut parts = line.split('\t');
            let (name, file) = match (parts.next(), parts.next(), parts.next()) {
                (Some(name), Some(file), None) => (name, file),
                _ => {
                    return Err(DerepError::MalformedSampleNames {
                        path: PathBuf::from(source),
                        line: idx + 1,
                    })
                }
            };

            if let Some(previous) = declared.get(name) {
                return Err(DerepError::DuplicateName {
                    name: name.to_string(),
                    path: file.to_string(),
                    previous: previous.clone(),
                });
            }
            declared.insert(name.to_string(), file.to_string());

            by_path.insert(file.to_string(), name.to_string());
            let alias = match strip_filtered_suffix(file) {
                Some(base) => base.to_string(),
                None => format!("{file}{FILTERED_MARKER}{FILTERED_EXTENSION}"),
            };
            by_path.insert(alias, name.to_string());
        }

        Ok(SampleNames { by_path })
    }

    /// Display name for `path`, falling back to the path without its filtered suffix.
    pub fn lookup(&self, path: &str) -> String {
        match self.by_path.get(path) {
            Some(name) => name.clone(),
            None => strip_filtered_suffix(path).unwrap_or(path).to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// Returns `<base>` when `path` looks like `<base>.filtered.<ext>`.
pub fn strip_filtered_suffix(path: &str) -> Option<&str> {
    let (stem, ext) = path.rsplit_once('.')?;
    if ext.is_empty() || ext.contains('/') {
        return None;
    }
    let base = stem.strip_suffix(".filtered")?;
    if base.is_empty() {
        None
    } else {
        Some(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<SampleNames, DerepError> {
        SampleNames::parse(Cursor::new(text), Path::new("names.tsv"))
    }

    #[test]
    fn test_strip_filtered_suffix() {
        assert_eq!(strip_filtered_suffix("run/S1.filtered.fa"), Some("run/S1"));
        assert_eq!(strip_filtered_suffix("S1.filtered.fasta"), Some("S1"));
        assert_eq!(strip_filtered_suffix("S1.fa"), None);
        assert_eq!(strip_filtered_suffix("S1.filtered"), None);
        assert_eq!(strip_filtered_suffix(".filtered.fa"), None);
    }

    #[test]
    fn test_registers_both_aliases() {
        let names = parse("Station 1\tS1.filtered.fa\nStation 2\tS2\n").expect("parse failed");
        assert_eq!(names.lookup("S1.filtered.fa"), "Station 1");
        assert_eq!(names.lookup("S1"), "Station 1");
        assert_eq!(names.lookup("S2"), "Station 2");
        assert_eq!(names.lookup("S2.filtered.fa"), "Station 2");
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn test_lookup_falls_back_to_normalized_path() {
        let names = SampleNames::default();
        assert!(names.is_empty());
        assert_eq!(names.lookup("data/S9.filtered.fa"), "data/S9");
        assert_eq!(names.lookup("data/S9.fa.gz"), "data/S9.fa.gz");
    }

    #[test]
    fn test_duplicate_name_fails() {
        let err = parse("A\tS1.fa\nA\tS2.fa\n").unwrap_err();
        match err {
            DerepError::DuplicateName { name, path, previous } => {
                assert_eq!(name, "A");
                assert_eq!(path, "S2.fa");
                assert_eq!(previous, "S1.fa");
            }
            other => panic!("Expected DuplicateName, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let err = parse("A\tS1.fa\n\nB S2.fa\n").unwrap_err();
        assert!(matches!(err, DerepError::MalformedSampleNames { line: 3, .. }));
    }

    #[test]
    fn test_trailing_whitespace_and_blank_lines() {
        let names = parse("A\tS1.fa  \r\n\n").expect("parse failed");
        assert_eq!(names.lookup("S1.fa"), "A");
    }

    #[test]
    fn test_load_missing_file_is_open_error() {
        let err = SampleNames::load("/nonexistent/names.tsv").unwrap_err();
        assert!(matches!(err, DerepError::Open { .. }));
    }
}
