// src/fasta.rs

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;

use crate::error::DerepError;
use crate::types::FastaRecord;

/// Opens a FASTA file for streaming, decompressing `.gz` and `.bz2` by suffix.
pub fn open<P: AsRef<Path>>(path: P) -> Result<FastaRecords<Box<dyn BufRead>>, DerepError> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|source| DerepError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let reader: Box<dyn BufRead> = match ext {
        "gz" => Box::new(BufReader::new(MultiGzDecoder::new(f))),
        "bz2" => Box::new(BufReader::new(MultiBzDecoder::new(f))),
        _ => Box::new(BufReader::new(f)),
    };

    Ok(FastaRecords::new(reader))
}

/// Lazy iterator over the records of one FASTA stream.
///
/// Wrapped sequence lines are joined with all whitespace removed. Records
/// without residues, and anything before the first header, are skipped.
pub struct FastaRecords<R> {
    reader: R,
    line: String,
    pending_id: Option<String>,
    seq: String,
    done: bool,
}

impl<R: BufRead> FastaRecords<R> {
    pub fn new(reader: R) -> Self {
        FastaRecords {
            reader,
            line: String::new(),
            pending_id: None,
            seq: String::new(),
            done: false,
        }
    }

    /// Takes the record collected so far, if it has any residues.
    fn flush(&mut self) -> Option<FastaRecord> {
        let id = self.pending_id.take()?;
        if self.seq.is_empty() {
            return None;
        }
        Some(FastaRecord {
            id,
            seq: std::mem::take(&mut self.seq),
        })
    }
}

impl<R: BufRead> Iterator for FastaRecords<R> {
    type Item = io::Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    self.done = true;
                    return self.flush().map(Ok);
                }
                Ok(_) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }

            if let Some(header) = self.line.strip_prefix('>') {
                let id = header.trim_end().to_string();
                let finished = self.flush();
                self.seq.clear();
                self.pending_id = Some(id);
                if let Some(record) = finished {
                    return Some(Ok(record));
                }
            } else if self.pending_id.is_some() {
                self.seq
                    .extend(self.line.chars().filter(|c| !c.is_whitespace()));
            }
        }
    }
}
