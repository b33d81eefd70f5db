// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;

use crate::assembly::Assembler;

/// Greedy overlap assembly. The longest unused sequence seeds a contig which
/// is extended to the right and then to the left, each time by the unused
/// sequence with the longest acceptable overlap. Sequences contained in the
/// contig are absorbed.
#[derive(Debug, Clone, new)]
pub struct GreedyAssembler {
    /// Seed length for overlap candidate lookup.
    seed_len: usize,
}

impl Default for GreedyAssembler {
    fn default() -> Self {
        GreedyAssembler::new(15)
    }
}

struct Candidate {
    seq: usize,
    /// Offset of the sequence start relative to the contig start.
    offset: i64,
}

struct Layout<'a> {
    seqs: &'a [Vec<u8>],
    index: HashMap<&'a [u8], Vec<(usize, usize)>>,
    seed_len: usize,
    error_rate: f64,
    min_overlap: usize,
}

impl<'a> Layout<'a> {
    fn new(seqs: &'a [Vec<u8>], seed_len: usize, error_rate: f64, min_overlap: usize) -> Self {
        let mut index: HashMap<&[u8], Vec<(usize, usize)>> = HashMap::new();
        for (i, seq) in seqs.iter().enumerate() {
            if seq.len() < seed_len {
                continue;
            }
            for (offset, kmer) in seq.windows(seed_len).enumerate() {
                index.entry(kmer).or_default().push((i, offset));
            }
        }
        Layout {
            seqs,
            index,
            seed_len,
            error_rate,
            min_overlap,
        }
    }

    /// Placements of unused sequences seeded by k-mers of `contig[from..to]`.
    fn candidates(&self, contig: &[u8], from: usize, to: usize, used: &[bool]) -> Vec<Candidate> {
        let mut placements = BTreeSet::new();
        if to < from + self.seed_len {
            return Vec::new();
        }
        for pos in from..=(to - self.seed_len) {
            if let Some(hits) = self.index.get(&contig[pos..pos + self.seed_len]) {
                for (seq, offset) in hits {
                    if !used[*seq] {
                        placements.insert((*seq, pos as i64 - *offset as i64));
                    }
                }
            }
        }
        placements
            .into_iter()
            .map(|(seq, offset)| Candidate { seq, offset })
            .collect()
    }

    /// Number of mismatches between the sequence placed at `offset` and the
    /// contig, over their shared span, or `None` if the span is too short
    /// or too divergent.
    fn check(&self, contig: &[u8], candidate: &Candidate) -> Option<(usize, usize)> {
        let seq = &self.seqs[candidate.seq];
        let start = candidate.offset.max(0) as usize;
        let end = ((candidate.offset + seq.len() as i64).min(contig.len() as i64)).max(0) as usize;
        if end <= start {
            return None;
        }
        let overlap = end - start;
        if overlap < self.min_overlap {
            return None;
        }
        let mismatches = (start..end)
            .filter(|pos| contig[*pos] != seq[(*pos as i64 - candidate.offset) as usize])
            .count();
        if mismatches as f64 > (self.error_rate * overlap as f64).floor() {
            return None;
        }
        Some((overlap, mismatches))
    }

    fn extend(&self, contig: &mut Vec<u8>, used: &mut [bool], right: bool) -> usize {
        let max_len = self.seqs.iter().map(Vec::len).max().unwrap_or(0);
        let mut members = 0;
        loop {
            let (from, to) = if right {
                (contig.len().saturating_sub(max_len), contig.len())
            } else {
                (0, max_len.min(contig.len()))
            };
            let mut best: Option<(usize, usize, Candidate)> = None;
            for candidate in self.candidates(contig, from, to, used) {
                let seq_len = self.seqs[candidate.seq].len() as i64;
                let (overlap, mismatches) = match self.check(contig, &candidate) {
                    Some(hit) => hit,
                    None => continue,
                };
                let contained =
                    candidate.offset >= 0 && candidate.offset + seq_len <= contig.len() as i64;
                if contained {
                    used[candidate.seq] = true;
                    members += 1;
                    continue;
                }
                let extends = if right {
                    candidate.offset >= 0
                } else {
                    candidate.offset < 0 && candidate.offset + seq_len <= contig.len() as i64
                };
                if !extends {
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some((best_overlap, best_mismatches, _)) => {
                        overlap > *best_overlap
                            || (overlap == *best_overlap && mismatches < *best_mismatches)
                    }
                };
                if better {
                    best = Some((overlap, mismatches, candidate));
                }
            }
            let (overlap, _, candidate) = match best {
                Some(best) => best,
                None => return members,
            };
            let seq = &self.seqs[candidate.seq];
            if right {
                contig.extend_from_slice(&seq[overlap..]);
            } else {
                let mut extended = seq[..seq.len() - overlap].to_vec();
                extended.extend_from_slice(contig);
                *contig = extended;
            }
            used[candidate.seq] = true;
            members += 1;
        }
    }
}

impl Assembler for GreedyAssembler {
    fn assemble(
        &self,
        sequences: &[Vec<u8>],
        error_rate: f64,
        min_overlap: usize,
    ) -> Result<Vec<Vec<u8>>> {
        let mut seqs: Vec<Vec<u8>> = sequences
            .iter()
            .map(|seq| seq.to_ascii_uppercase())
            .filter(|seq| seq.len() >= min_overlap.max(self.seed_len))
            .collect();
        // longest first, ties broken by sequence
        seqs.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let mut copies: Vec<usize> = if seqs.is_empty() { Vec::new() } else { vec![1] };
        seqs.dedup_by(|seq, kept| {
            let duplicate = seq == kept;
            if duplicate {
                if let Some(n) = copies.last_mut() {
                    *n += 1;
                }
            } else {
                copies.push(1);
            }
            duplicate
        });

        let seed_len = self.seed_len.min(min_overlap.max(1));
        let layout = Layout::new(&seqs, seed_len, error_rate, min_overlap);
        let mut used = vec![false; seqs.len()];
        let mut contigs = Vec::new();
        for seed in 0..seqs.len() {
            if used[seed] {
                continue;
            }
            used[seed] = true;
            let mut contig = seqs[seed].clone();
            let mut members = copies[seed];
            members += layout.extend(&mut contig, &mut used, true);
            members += layout.extend(&mut contig, &mut used, false);
            // singletons only survive if they stem from an earlier round
            if members > 1 || is_prior_contig(&seqs[seed], sequences) {
                contigs.push(contig);
            }
        }
        Ok(contigs)
    }
}

/// Sequences longer than every other input are contigs of a previous round.
fn is_prior_contig(seq: &[u8], sequences: &[Vec<u8>]) -> bool {
    let mut lens: Vec<_> = sequences.iter().map(Vec::len).collect();
    lens.sort_unstable();
    let median = lens.get(lens.len() / 2).copied().unwrap_or(0);
    seq.len() > median * 3 / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_seq(len: usize, seed: u64) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
    }

    #[test]
    fn test_tiling_reads_assemble_into_one_contig() {
        let genome = random_seq(300, 1);
        let reads: Vec<Vec<u8>> = (0..=200)
            .step_by(20)
            .map(|s| genome[s..s + 100].to_vec())
            .collect();
        let contigs = GreedyAssembler::default().assemble(&reads, 0.0, 40).unwrap();
        assert_eq!(contigs, vec![genome]);
    }

    #[test]
    fn test_no_overlap_no_contig() {
        let a = random_seq(100, 2);
        let b = random_seq(100, 3);
        let contigs = GreedyAssembler::default()
            .assemble(&[a, b], 0.0, 40)
            .unwrap();
        assert!(contigs.is_empty());
    }

    #[test]
    fn test_mismatch_tolerance() {
        let genome = random_seq(200, 4);
        let left = genome[..120].to_vec();
        let mut right = genome[80..].to_vec();
        // one mismatch within the 40 base overlap
        right[10] = if right[10] == b'A' { b'C' } else { b'A' };
        let strict = GreedyAssembler::default()
            .assemble(&[left.clone(), right.clone()], 0.0, 30)
            .unwrap();
        assert!(strict.is_empty());
        let tolerant = GreedyAssembler::default()
            .assemble(&[left, right], 0.05, 30)
            .unwrap();
        assert_eq!(tolerant.len(), 1);
        assert_eq!(tolerant[0].len(), 200);
    }
}
