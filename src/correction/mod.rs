// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! K-mer spectrum error correction of the reads entering assembly.

use std::collections::HashMap;

use anyhow::Result;
use bio::alphabets::dna;

use crate::reads::Read;

/// Corrects read sequences in place, attaching the result as
/// `Read::corrected`. Returns the number of reads that were changed.
pub trait KmerCorrector: Send + Sync {
    fn correct(&self, reads: &mut [Read]) -> Result<usize>;
}

/// Counts canonical k-mers over the read set and fixes single bases that
/// turn a solid k-mer into a weak one.
#[derive(Debug, Clone, new)]
pub struct KmerSpectrumCorrector {
    k: usize,
    /// Occurrences needed for a k-mer to be trusted.
    min_count: u32,
}

impl Default for KmerSpectrumCorrector {
    fn default() -> Self {
        KmerSpectrumCorrector::new(21, 3)
    }
}

fn canonical(kmer: &[u8]) -> Vec<u8> {
    let rc = dna::revcomp(kmer);
    if rc.as_slice() < kmer {
        rc
    } else {
        kmer.to_vec()
    }
}

fn is_acgt(kmer: &[u8]) -> bool {
    kmer.iter().all(|b| matches!(b, b'A' | b'C' | b'G' | b'T'))
}

impl KmerSpectrumCorrector {
    fn count(&self, reads: &[Read]) -> HashMap<Vec<u8>, u32> {
        let mut counts = HashMap::new();
        for read in reads {
            if read.seq.len() < self.k {
                continue;
            }
            for kmer in read.seq.windows(self.k).filter(|kmer| is_acgt(kmer)) {
                *counts.entry(canonical(kmer)).or_insert(0) += 1;
            }
        }
        counts
    }

    fn is_solid(&self, counts: &HashMap<Vec<u8>, u32>, kmer: &[u8]) -> bool {
        counts.get(&canonical(kmer)).map_or(false, |c| *c >= self.min_count)
    }

    fn correct_seq(&self, counts: &HashMap<Vec<u8>, u32>, seq: &[u8]) -> Option<Vec<u8>> {
        if seq.len() < self.k {
            return None;
        }
        let mut seq = seq.to_ascii_uppercase();
        let mut changed = false;
        let mut prev_solid = false;
        for i in 0..=seq.len() - self.k {
            let solid = self.is_solid(counts, &seq[i..i + self.k]);
            if !solid && prev_solid {
                // the base just entering the window is the suspect
                let last = i + self.k - 1;
                let original = seq[last];
                let fixes: Vec<u8> = b"ACGT"
                    .iter()
                    .copied()
                    .filter(|base| *base != original)
                    .filter(|base| {
                        seq[last] = *base;
                        let ok = self.is_solid(counts, &seq[i..i + self.k]);
                        seq[last] = original;
                        ok
                    })
                    .collect();
                if fixes.len() == 1 {
                    seq[last] = fixes[0];
                    changed = true;
                    prev_solid = true;
                    continue;
                }
            }
            prev_solid = solid;
        }
        if changed {
            Some(seq)
        } else {
            None
        }
    }
}

impl KmerCorrector for KmerSpectrumCorrector {
    fn correct(&self, reads: &mut [Read]) -> Result<usize> {
        let counts = self.count(reads);
        let mut corrected = 0;
        for read in reads.iter_mut() {
            if let Some(seq) = self.correct_seq(&counts, &read.seq) {
                read.corrected = Some(seq);
                corrected += 1;
            }
        }
        Ok(corrected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reads::tests::cigar;
    use crate::reads::SampleKind;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_single_error_is_fixed() {
        let mut rng = StdRng::seed_from_u64(42);
        let truth: Vec<u8> = (0..80).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect();
        let mut reads: Vec<_> = (0..5)
            .map(|i| {
                Read::mapped(
                    &format!("r{}", i),
                    SampleKind::Tumor,
                    0,
                    0,
                    cigar("80M"),
                    &truth,
                )
            })
            .collect();
        let mut faulty = truth.clone();
        faulty[50] = if faulty[50] == b'A' { b'C' } else { b'A' };
        reads.push(Read::mapped(
            "bad",
            SampleKind::Tumor,
            0,
            0,
            cigar("80M"),
            &faulty,
        ));

        let corrector = KmerSpectrumCorrector::default();
        let n = corrector.correct(&mut reads).unwrap();
        assert_eq!(n, 1);
        let bad = reads.iter().find(|r| r.qname == "bad").unwrap();
        assert_eq!(bad.corrected.as_deref(), Some(truth.as_slice()));
        assert_eq!(bad.assembly_seq(), truth.as_slice());
        assert!(reads.iter().filter(|r| r.qname != "bad").all(|r| r.corrected.is_none()));
    }
}
