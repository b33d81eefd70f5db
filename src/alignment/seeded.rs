// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use bio::alignment::pairwise;
use bio::alignment::AlignmentOperation;
use bio::alphabets::dna;
use rust_htslib::bam::record::{Cigar, CigarString};

use crate::alignment::{Aligner, Alignment, ReferenceIndex};
use crate::genome::{IntervalSet, Region, SequenceDictionary};
use crate::reference::ReferenceSource;

const MATCH: i32 = 1;
const MISMATCH: i32 = -4;
const GAP_OPEN: i32 = -6;
const GAP_EXTEND: i32 = -1;
const MAX_MAPQ: u8 = 60;
/// Seeds occurring more often than this are repeats and not used.
const MAX_SEED_OCCURRENCES: usize = 500;
const MIN_SEEDS: usize = 2;
const MIN_SCORE: i32 = 20;

/// A reference sequence, or a window of one, known to the aligner.
#[derive(Debug, Clone, PartialEq, new)]
pub struct Target {
    pub name: String,
    pub tid: u32,
    /// Position of the first base on the full sequence.
    pub offset: u64,
    pub seq: Vec<u8>,
}

fn encode(kmer: &[u8]) -> Option<u64> {
    let mut code = 0u64;
    for base in kmer {
        let bits = match base {
            b'A' => 0,
            b'C' => 1,
            b'G' => 2,
            b'T' => 3,
            _ => return None,
        };
        code = (code << 2) | bits;
    }
    Some(code)
}

/// Seed-and-extend local aligner: exact k-mer seeds on both strands select
/// target windows, which are then aligned with Smith-Waterman.
pub struct SeededAligner {
    targets: Vec<Target>,
    index: HashMap<u64, Vec<(u32, u32)>>,
    k: usize,
    reference: String,
}

impl SeededAligner {
    /// `k` has to be at most 32.
    pub fn new(targets: Vec<Target>, k: usize, reference: &str) -> Self {
        let k = k.min(32).max(1);
        let mut index: HashMap<u64, Vec<(u32, u32)>> = HashMap::new();
        let targets: Vec<Target> = targets
            .into_iter()
            .map(|mut target| {
                target.seq.make_ascii_uppercase();
                target
            })
            .collect();
        for (t, target) in targets.iter().enumerate() {
            if target.seq.len() < k {
                continue;
            }
            for (pos, kmer) in target.seq.windows(k).enumerate() {
                if let Some(code) = encode(kmer) {
                    index.entry(code).or_default().push((t as u32, pos as u32));
                }
            }
        }
        SeededAligner {
            targets,
            index,
            k,
            reference: reference.to_owned(),
        }
    }

    /// Index every sequence of `reference`.
    pub fn from_reference(reference: &dyn ReferenceSource, k: usize, name: &str) -> Result<Self> {
        let targets = reference
            .sequences()
            .into_iter()
            .enumerate()
            .map(|(tid, (chrom, _))| {
                let seq = reference.seq(&chrom)?;
                Ok(Target::new(chrom, tid as u32, 0, seq.as_ref().clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SeededAligner::new(targets, k, name))
    }

    /// Windows of `target` (start, end) where seeds of `query` cluster along
    /// nearby diagonals.
    fn windows(&self, query: &[u8]) -> BTreeMap<u32, Vec<(usize, usize)>> {
        let mut diagonals: BTreeMap<u32, Vec<i64>> = BTreeMap::new();
        if query.len() >= self.k {
            for (qpos, kmer) in query.windows(self.k).enumerate() {
                let occurrences = match encode(kmer).and_then(|code| self.index.get(&code)) {
                    Some(occurrences) if occurrences.len() <= MAX_SEED_OCCURRENCES => occurrences,
                    _ => continue,
                };
                for (t, tpos) in occurrences {
                    diagonals
                        .entry(*t)
                        .or_default()
                        .push(*tpos as i64 - qpos as i64);
                }
            }
        }

        let qlen = query.len() as i64;
        let pad = qlen / 4 + 10;
        diagonals
            .into_iter()
            .map(|(t, mut diags)| {
                diags.sort_unstable();
                let tlen = self.targets[t as usize].seq.len() as i64;
                let mut windows = Vec::new();
                let mut cluster: Vec<i64> = Vec::new();
                let mut flush = |cluster: &mut Vec<i64>| {
                    if cluster.len() >= MIN_SEEDS {
                        let lo = cluster[0];
                        let hi = cluster[cluster.len() - 1];
                        let start = (lo - pad).max(0);
                        let end = (hi + qlen + pad).min(tlen);
                        if end > start {
                            windows.push((start as usize, end as usize));
                        }
                    }
                    cluster.clear();
                };
                for diag in diags {
                    if let Some(last) = cluster.last() {
                        if diag - last > qlen {
                            flush(&mut cluster);
                        }
                    }
                    cluster.push(diag);
                }
                flush(&mut cluster);
                (t, windows)
            })
            .collect()
    }

    fn local_alignment(
        &self,
        query: &[u8],
        name: &str,
        reverse: bool,
        t: u32,
        window: (usize, usize),
    ) -> Option<Alignment> {
        let target = &self.targets[t as usize];
        let y = &target.seq[window.0..window.1];
        let score = |a: u8, b: u8| if a == b { MATCH } else { MISMATCH };
        let mut aligner =
            pairwise::Aligner::with_capacity(query.len(), y.len(), GAP_OPEN, GAP_EXTEND, score);
        let aln = aligner.local(query, y);
        if aln.score < MIN_SCORE {
            return None;
        }

        let mut ops = Vec::new();
        if aln.xstart > 0 {
            ops.push(Cigar::SoftClip(aln.xstart as u32));
        }
        let mut matches = 0;
        let mut runs: Vec<(char, u32)> = Vec::new();
        for op in &aln.operations {
            let kind = match op {
                AlignmentOperation::Match => {
                    matches += 1;
                    'M'
                }
                AlignmentOperation::Subst => 'M',
                AlignmentOperation::Ins => 'I',
                AlignmentOperation::Del => 'D',
                _ => continue,
            };
            match runs.last_mut() {
                Some((last, len)) if *last == kind => *len += 1,
                _ => runs.push((kind, 1)),
            }
        }
        ops.extend(runs.into_iter().map(|(kind, len)| match kind {
            'M' => Cigar::Match(len),
            'I' => Cigar::Ins(len),
            _ => Cigar::Del(len),
        }));
        if aln.xend < query.len() {
            ops.push(Cigar::SoftClip((query.len() - aln.xend) as u32));
        }

        let qlen = query.len();
        let (query_start, query_end) = if reverse {
            (qlen - aln.xend, qlen - aln.xstart)
        } else {
            (aln.xstart, aln.xend)
        };
        Some(Alignment {
            query_name: name.to_owned(),
            tid: target.tid,
            target_name: target.name.clone(),
            pos: target.offset + (window.0 + aln.ystart) as u64,
            end: target.offset + (window.0 + aln.yend) as u64,
            query_start,
            query_end,
            query_len: qlen,
            reverse,
            cigar: CigarString(ops),
            mapq: 0,
            score: aln.score,
            matches,
            secondary: false,
            supplementary: false,
            reference: self.reference.clone(),
        })
    }
}

impl Aligner for SeededAligner {
    fn align(
        &self,
        seq: &[u8],
        name: &str,
        keep_secondary_frac: f64,
        max_secondary: usize,
    ) -> Result<Vec<Alignment>> {
        let forward = seq.to_ascii_uppercase();
        let mut hits = Vec::new();
        for &reverse in &[false, true] {
            let query = if reverse {
                dna::revcomp(&forward)
            } else {
                forward.clone()
            };
            for (t, windows) in self.windows(&query) {
                for window in windows {
                    if let Some(hit) = self.local_alignment(&query, name, reverse, t, window) {
                        hits.push(hit);
                    }
                }
            }
        }
        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| (a.tid, a.pos, a.reverse).cmp(&(b.tid, b.pos, b.reverse)))
        });
        hits.dedup_by(|a, b| (a.tid, a.pos, a.end, a.reverse) == (b.tid, b.pos, b.end, b.reverse));

        let mut selected: Vec<Alignment> = Vec::new();
        let mut n_secondary = 0;
        for hit in &hits {
            let covering = selected
                .iter()
                .filter(|s| !s.secondary)
                .find(|s| s.query_overlap(hit) * 2 > hit.query_span())
                .map(|s| s.score);
            match covering {
                None => {
                    let mut hit = hit.clone();
                    hit.supplementary = !selected.is_empty();
                    selected.push(hit);
                }
                Some(score) => {
                    if n_secondary < max_secondary
                        && hit.score as f64 >= keep_secondary_frac * score as f64
                    {
                        let mut hit = hit.clone();
                        hit.secondary = true;
                        selected.push(hit);
                        n_secondary += 1;
                    }
                }
            }
        }

        // mapping quality from the best competing hit over the same query part
        for aln in selected.iter_mut().filter(|aln| !aln.secondary) {
            let competitor = hits
                .iter()
                .filter(|h| (h.tid, h.pos, h.reverse) != (aln.tid, aln.pos, aln.reverse))
                .filter(|h| h.query_overlap(aln) * 2 > aln.query_span())
                .map(|h| h.score)
                .max();
            aln.mapq = match competitor {
                None => MAX_MAPQ,
                Some(other) => {
                    let frac = (aln.score - other).max(0) as f64 / aln.score.max(1) as f64;
                    (frac * MAX_MAPQ as f64).round() as u8
                }
            };
        }
        Ok(selected)
    }

    fn target_name(&self, tid: u32) -> Option<&str> {
        self.targets
            .iter()
            .find(|target| target.tid == tid)
            .map(|target| target.name.as_str())
    }

    fn targets(&self) -> Vec<(String, u64)> {
        self.targets
            .iter()
            .map(|target| (target.name.clone(), target.offset + target.seq.len() as u64))
            .collect()
    }
}

/// Builds aligners over padded windows of a large reference, so that only
/// the loci relevant to one region are indexed.
pub struct WindowedReferenceIndex {
    reference: Arc<dyn ReferenceSource>,
    dict: SequenceDictionary,
    pad: u64,
    k: usize,
}

impl WindowedReferenceIndex {
    pub fn new(reference: Arc<dyn ReferenceSource>, dict: SequenceDictionary, pad: u64, k: usize) -> Self {
        WindowedReferenceIndex {
            reference,
            dict,
            pad,
            k,
        }
    }
}

impl ReferenceIndex for WindowedReferenceIndex {
    fn aligner(&self, regions: &[Region]) -> Result<Arc<dyn Aligner>> {
        let windows: IntervalSet = regions
            .iter()
            .map(|region| region.padded(self.pad, self.dict.length(region.tid)))
            .collect();
        let targets = windows
            .merged()
            .iter()
            .map(|window| {
                let chrom = self.dict.name(window.tid)?;
                let seq = self.reference.subseq(chrom, window.start, window.end)?;
                Ok(Target::new(chrom.to_owned(), window.tid, window.start, seq))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(SeededAligner::new(targets, self.k, "human")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::MemoryReference;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_seq(len: usize, seed: u64) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
    }

    #[test]
    fn test_forward_and_reverse_hits() {
        let genome = random_seq(2000, 11);
        let aligner = SeededAligner::new(vec![Target::new("1".to_owned(), 0, 0, genome.clone())], 15, "human");

        let alns = aligner.align(&genome[500..600], "fw", 0.9, 10).unwrap();
        assert_eq!(alns.len(), 1);
        assert_eq!((alns[0].pos, alns[0].end), (500, 600));
        assert!(!alns[0].reverse);
        assert_eq!(alns[0].cigar.to_string(), "100M");
        assert_eq!(alns[0].matches, 100);
        assert_eq!(alns[0].mapq, 60);

        let rc = dna::revcomp(&genome[1000..1080]);
        let alns = aligner.align(&rc, "rv", 0.9, 10).unwrap();
        assert_eq!(alns.len(), 1);
        assert!(alns[0].reverse);
        assert_eq!((alns[0].pos, alns[0].end), (1000, 1080));
        assert_eq!((alns[0].query_start, alns[0].query_end), (0, 80));
    }

    #[test]
    fn test_deletion_in_query() {
        let mut genome = random_seq(2000, 12);
        // make the deletion placement unambiguous
        genome[1030] = if genome[1000] == b'A' { b'C' } else { b'A' };
        genome[1029] = if genome[999] == b'G' { b'T' } else { b'G' };
        let aligner = SeededAligner::new(vec![Target::new("1".to_owned(), 0, 0, genome.clone())], 15, "human");
        let mut query = genome[900..1000].to_vec();
        query.extend_from_slice(&genome[1030..1130]);
        let alns = aligner.align(&query, "del", 0.9, 10).unwrap();
        assert_eq!(alns[0].cigar.to_string(), "100M30D100M");
        assert_eq!((alns[0].pos, alns[0].end), (900, 1130));
    }

    #[test]
    fn test_split_alignment() {
        let mut genome = random_seq(5000, 13);
        // no base extends either piece across the junction
        genome[1100] = if genome[4000] == b'A' { b'C' } else { b'A' };
        genome[3999] = if genome[1099] == b'G' { b'T' } else { b'G' };
        let aligner = SeededAligner::new(vec![Target::new("1".to_owned(), 0, 0, genome.clone())], 15, "human");
        let mut query = genome[1000..1100].to_vec();
        query.extend_from_slice(&genome[4000..4100]);
        let alns = aligner.align(&query, "split", 0.9, 10).unwrap();
        let pieces: Vec<_> = alns.iter().filter(|a| !a.secondary).collect();
        assert_eq!(pieces.len(), 2);
        assert!(!pieces[0].supplementary);
        assert!(pieces[1].supplementary);
        let mut spans: Vec<_> = pieces.iter().map(|a| (a.query_start, a.pos)).collect();
        spans.sort();
        assert_eq!(spans, vec![(0, 1000), (100, 4000)]);
    }

    #[test]
    fn test_repeat_gets_secondary_and_low_mapq() {
        let unit = random_seq(120, 14);
        let mut genome = random_seq(600, 15);
        genome.extend_from_slice(&unit);
        genome.extend(random_seq(600, 16));
        genome.extend_from_slice(&unit);
        genome.extend(random_seq(600, 17));
        let aligner = SeededAligner::new(vec![Target::new("1".to_owned(), 0, 0, genome)], 15, "human");
        let alns = aligner.align(&unit, "rep", 0.9, 10).unwrap();
        assert_eq!(alns.len(), 2);
        assert!(alns[1].secondary);
        assert_eq!(alns[0].mapq, 0);
        let none = aligner.align(&unit, "rep", 0.9, 0).unwrap();
        assert_eq!(none.len(), 1);
    }

    #[test]
    fn test_windowed_index_reports_genome_coordinates() {
        let chrom = random_seq(20_000, 18);
        let reference: Arc<dyn ReferenceSource> =
            Arc::new(MemoryReference::new(vec![("7".to_owned(), chrom.clone())]));
        let dict = SequenceDictionary::new(vec![("7".to_owned(), 20_000)]);
        let index = WindowedReferenceIndex::new(reference, dict, 500, 15);
        let aligner = index.aligner(&[Region::new(0, 12_000, 13_000)]).unwrap();
        let alns = aligner.align(&chrom[12_400..12_500], "w", 0.9, 10).unwrap();
        assert_eq!(alns[0].pos, 12_400);
        assert_eq!(alns[0].target_name, "7");
        assert_eq!(aligner.target_name(0), Some("7"));
    }
}
