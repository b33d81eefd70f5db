// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rust_htslib::bam::{self, Read};

use crate::errors::Error;
use crate::utils::genomics::{is_primary_chrom, normalize_chrom};

/// Chromosome names and lengths, indexed by target id.
#[derive(Debug, Clone, Default)]
pub struct SequenceDictionary {
    names: Vec<String>,
    lengths: Vec<u64>,
    tids: HashMap<String, u32>,
}

impl SequenceDictionary {
    pub fn new(sequences: Vec<(String, u64)>) -> Self {
        let tids = sequences
            .iter()
            .enumerate()
            .map(|(tid, (name, _))| (name.clone(), tid as u32))
            .collect();
        let (names, lengths) = sequences.into_iter().unzip();
        SequenceDictionary {
            names,
            lengths,
            tids,
        }
    }

    /// Read the dictionary from the header of a BAM file.
    pub fn from_bam<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = bam::Reader::from_path(path.as_ref()).with_context(|| {
            format!("Unable to read BAM file {}.", path.as_ref().display())
        })?;
        let header = reader.header();
        let sequences = header
            .target_names()
            .iter()
            .enumerate()
            .map(|(tid, name)| {
                (
                    String::from_utf8_lossy(name).into_owned(),
                    header.target_len(tid as u32).unwrap_or(0),
                )
            })
            .collect();
        Ok(SequenceDictionary::new(sequences))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn tid(&self, name: &str) -> Option<u32> {
        self.tids.get(name).copied()
    }

    pub fn name(&self, tid: u32) -> Result<&str> {
        self.names
            .get(tid as usize)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownChromosomeId { tid }.into())
    }

    pub fn length(&self, tid: u32) -> Option<u64> {
        self.lengths.get(tid as usize).copied()
    }

    /// Resolve a chromosome name to `(tid, length)`, as needed by `Region::parse`.
    pub fn lookup(&self, name: &str) -> Option<(u32, u64)> {
        self.tid(name).map(|tid| (tid, self.lengths[tid as usize]))
    }

    /// Like `lookup`, but tolerating a differing "chr" prefix convention.
    pub fn resolve(&self, name: &str) -> Option<(u32, u64)> {
        self.lookup(name).or_else(|| {
            let plain = normalize_chrom(name);
            if self.has_chr_prefix() {
                self.lookup(&format!("chr{}", plain))
            } else {
                self.lookup(&plain)
            }
        })
    }

    pub fn is_primary(&self, tid: u32) -> bool {
        self.names
            .get(tid as usize)
            .map_or(false, |name| is_primary_chrom(name))
    }

    /// Whether the chromosomes are named with a "chr" prefix.
    pub fn has_chr_prefix(&self) -> bool {
        self.names.iter().any(|name| name.starts_with("chr"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str, u64)> {
        self.names
            .iter()
            .zip(self.lengths.iter())
            .enumerate()
            .map(|(tid, (name, len))| (tid as u32, name.as_str(), *len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_tolerates_chr_prefix() {
        let dict = SequenceDictionary::new(vec![
            ("chr1".to_owned(), 1000),
            ("chrX".to_owned(), 500),
            ("chrUn_gl000220".to_owned(), 100),
        ]);
        assert_eq!(dict.resolve("1"), Some((0, 1000)));
        assert_eq!(dict.resolve("chrX"), Some((1, 500)));
        assert_eq!(dict.resolve("2"), None);
        assert!(dict.is_primary(1));
        assert!(!dict.is_primary(2));
        assert_eq!(dict.name(1).unwrap(), "chrX");
        assert!(dict.name(3).is_err());
    }
}
