// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::cmp;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::{Context, Result};
use bio::io::fasta;
use lru_time_cache::LruCache;

use crate::errors::Error;

/// Random access to reference sequences by chromosome name.
pub trait ReferenceSource: Send + Sync {
    /// Names and lengths of all sequences, in file order.
    fn sequences(&self) -> Vec<(String, u64)>;

    /// The whole sequence of `chrom`.
    fn seq(&self, chrom: &str) -> Result<Arc<Vec<u8>>>;

    /// Bases `[start, end)` of `chrom`, clamped to the sequence end.
    fn subseq(&self, chrom: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        let seq = self.seq(chrom)?;
        let end = cmp::min(end as usize, seq.len());
        let start = cmp::min(start as usize, end);
        Ok(seq[start..end].to_vec())
    }
}

/// A lazy buffer for reference sequences read from an indexed FASTA file.
pub struct Buffer {
    reader: RwLock<fasta::IndexedReader<fs::File>>,
    sequences: Mutex<LruCache<String, Arc<Vec<u8>>>>,
    reference_path: PathBuf,
}

impl Buffer {
    pub fn from_path<P: AsRef<Path> + std::fmt::Debug>(path: P, capacity: usize) -> Result<Self> {
        let fasta: fasta::IndexedReader<fs::File> = fasta::IndexedReader::from_file(&path)
            .with_context(|| {
                format!(
                    "Unable to read indexed FASTA {}. Has it been indexed with samtools faidx?",
                    path.as_ref().display()
                )
            })?;
        Ok(Buffer {
            reader: RwLock::new(fasta),
            sequences: Mutex::new(LruCache::with_capacity(capacity)),
            reference_path: path.as_ref().to_path_buf(),
        })
    }

    pub fn reference_path(&self) -> &Path {
        &self.reference_path
    }
}

impl ReferenceSource for Buffer {
    fn sequences(&self) -> Vec<(String, u64)> {
        self.reader
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .index
            .sequences()
            .into_iter()
            .map(|seq| (seq.name, seq.len))
            .collect()
    }

    /// Load given chromosome. This is O(1) if the chromosome was loaded before.
    fn seq(&self, chrom: &str) -> Result<Arc<Vec<u8>>> {
        let mut sequences = self
            .sequences
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(sequence) = sequences.get(chrom) {
            return Ok(Arc::clone(sequence));
        }
        let mut sequence = Vec::new();
        {
            let mut reader = self.reader.write().unwrap_or_else(PoisonError::into_inner);
            reader
                .fetch_all(chrom)
                .map_err(|_| Error::MissingReferenceSequence {
                    chrom: chrom.to_owned(),
                })?;
            reader.read(&mut sequence)?;
        }
        sequence.make_ascii_uppercase();
        let sequence = Arc::new(sequence);
        sequences.insert(chrom.to_owned(), Arc::clone(&sequence));
        Ok(sequence)
    }
}

/// Reference sequences held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryReference {
    sequences: Vec<(String, Arc<Vec<u8>>)>,
}

impl MemoryReference {
    pub fn new(sequences: Vec<(String, Vec<u8>)>) -> Self {
        MemoryReference {
            sequences: sequences
                .into_iter()
                .map(|(name, seq)| (name, Arc::new(seq.to_ascii_uppercase())))
                .collect(),
        }
    }
}

impl ReferenceSource for MemoryReference {
    fn sequences(&self) -> Vec<(String, u64)> {
        self.sequences
            .iter()
            .map(|(name, seq)| (name.clone(), seq.len() as u64))
            .collect()
    }

    fn seq(&self, chrom: &str) -> Result<Arc<Vec<u8>>> {
        self.sequences
            .iter()
            .find(|(name, _)| name == chrom)
            .map(|(_, seq)| Arc::clone(seq))
            .ok_or_else(|| {
                Error::MissingReferenceSequence {
                    chrom: chrom.to_owned(),
                }
                .into()
            })
    }
}
