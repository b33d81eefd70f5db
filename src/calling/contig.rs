// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashSet;
use std::fmt::Write as FmtWrite;

use anyhow::Result;

use crate::alignment::{Aligner, Alignment, SeededAligner, Target};
use crate::assembly::AssembledContig;
use crate::calling::breakpoint::Breakpoint;
use crate::calling::config::Config;
use crate::genome::Region;
use crate::reads::{ContigHit, Read};
use crate::reference::ReferenceSource;
use crate::utils::genomics::has_simple_repeat;

const MIN_READ_IDENTITY: f64 = 0.9;
const MIN_READ_SPAN: f64 = 0.75;

/// Resolve competing human and microbial explanations of one contig.
///
/// Microbial alignments survive if they are primary or supplementary, carry
/// enough matches and mapping quality and share at most
/// `max_microbe_human_overlap` contig bases with any human alignment,
/// secondary ones included. Human
/// alignments survive if they carry enough matches and at most half of them
/// is claimed by a surviving microbial alignment.
pub fn disambiguate(
    human: Vec<Alignment>,
    microbe: Vec<Alignment>,
    config: &Config,
) -> (Vec<Alignment>, Vec<Alignment>) {
    let microbe: Vec<Alignment> = microbe
        .into_iter()
        .filter(|m| {
            !m.secondary
                && m.matches >= config.microbe_min_match
                && m.mapq >= config.microbe_min_mapq
                && human
                    .iter()
                    .all(|h| h.query_overlap(m) <= config.max_microbe_human_overlap)
        })
        .collect();
    let human = human
        .into_iter()
        .filter(|h| {
            h.matches >= config.min_contig_match
                && microbe
                    .iter()
                    .all(|m| h.query_overlap(m) * 2 <= h.query_span())
        })
        .collect();
    (human, microbe)
}

/// A contig with its surviving reference alignments and read support.
#[derive(Debug, Clone)]
pub struct AlignedContig {
    pub name: String,
    pub seq: Vec<u8>,
    pub alignments: Vec<Alignment>,
    pub microbe_alignments: Vec<Alignment>,
    /// Some human alignment touches the subwindow the contig was built in.
    pub local: bool,
    pub supporting_reads: Vec<String>,
    pub tumor_coverage: Vec<u32>,
    pub normal_coverage: Vec<u32>,
}

impl AlignedContig {
    /// `None` if no alignment survives disambiguation.
    pub fn new(
        contig: AssembledContig,
        human: Vec<Alignment>,
        microbe: Vec<Alignment>,
        window: &Region,
        config: &Config,
    ) -> Option<Self> {
        let (alignments, microbe_alignments) = disambiguate(human, microbe, config);
        if alignments.is_empty() && microbe_alignments.is_empty() {
            return None;
        }
        let local = alignments.iter().any(|aln| aln.region().overlaps(window));
        let len = contig.seq.len();
        Some(AlignedContig {
            name: contig.name,
            seq: contig.seq,
            alignments,
            microbe_alignments,
            local,
            supporting_reads: Vec::new(),
            tumor_coverage: vec![0; len],
            normal_coverage: vec![0; len],
        })
    }

    /// Whether microbial alignments should be attempted at all.
    pub fn is_low_complexity(seq: &[u8]) -> bool {
        has_simple_repeat(seq)
    }

    fn pieces(&self) -> Vec<(&Alignment, bool)> {
        self.alignments
            .iter()
            .map(|aln| (aln, false))
            .chain(self.microbe_alignments.iter().map(|aln| (aln, true)))
            .filter(|(aln, _)| !aln.secondary)
            .collect()
    }

    /// Split alignment or an indel in a human alignment.
    pub fn has_variant(&self) -> bool {
        let pieces = self.pieces();
        pieces.len() > 1 || pieces.iter().any(|(aln, microbial)| !microbial && aln.has_indel())
    }

    /// Breakpoints encoded by the alignments of this contig, without read
    /// support.
    pub fn breakpoints(&self, reference: &dyn ReferenceSource) -> Vec<Breakpoint> {
        let pieces = self.pieces();
        let mut breakpoints = Vec::new();
        for (aln, _) in pieces.iter().filter(|(aln, microbial)| !microbial && aln.has_indel()) {
            match reference.seq(&aln.target_name) {
                Ok(chrom_seq) => {
                    breakpoints.extend(Breakpoint::indels(aln, &self.seq, &chrom_seq))
                }
                Err(e) => warn!(
                    "Skipping indels of contig {} on {}: {}",
                    self.name, aln.target_name, e
                ),
            }
        }
        if pieces.len() > 1 {
            let alignments: Vec<&Alignment> = pieces.iter().map(|(aln, _)| *aln).collect();
            let microbial: Vec<bool> = pieces.iter().map(|(_, microbial)| *microbial).collect();
            breakpoints.extend(Breakpoint::junctions(&alignments, &self.seq, &microbial));
        }
        let num_alignments = self.alignments.len() + self.microbe_alignments.len();
        for bp in &mut breakpoints {
            bp.set_contig(&self.name, &self.seq, num_alignments, self.local);
        }
        breakpoints
    }

    fn add_support(&mut self, read: &Read, hit: &Alignment) {
        let coverage = if read.sample.is_tumor() {
            &mut self.tumor_coverage
        } else {
            &mut self.normal_coverage
        };
        for pos in hit.pos as usize..(hit.end as usize).min(coverage.len()) {
            coverage[pos] += 1;
        }
        self.supporting_reads.push(read.uid.clone());
    }

    /// Text rendering of the contig, its alignments and supporting reads,
    /// each laid out at its contig offset.
    pub fn plot(&self, reads: &[Read]) -> String {
        let mut out = String::new();
        let max = |cov: &[u32]| cov.iter().copied().max().unwrap_or(0);
        // writing to a String cannot fail
        let _ = writeln!(
            out,
            ">{}\tlen={}\tlocal={}\ttumor_cov={}\tnormal_cov={}",
            self.name,
            self.seq.len(),
            self.local as u8,
            max(&self.tumor_coverage),
            max(&self.normal_coverage)
        );
        let _ = writeln!(out, "{}", String::from_utf8_lossy(&self.seq));
        for aln in self.alignments.iter().chain(&self.microbe_alignments) {
            let _ = writeln!(
                out,
                "{}{}\t{}:{}({}) {} mapq={} {}{}",
                " ".repeat(aln.query_start),
                String::from_utf8_lossy(&self.seq[aln.query_start..aln.query_end]),
                aln.target_name,
                aln.pos + 1,
                if aln.reverse { '-' } else { '+' },
                aln.cigar,
                aln.mapq,
                aln.reference,
                if aln.secondary { " secondary" } else { "" }
            );
        }
        for read in reads {
            for hit in read.contig_hits.iter().filter(|hit| hit.contig == self.name) {
                let seq = if hit.reverse {
                    read.revcomp_seq()
                } else {
                    read.assembly_seq().to_vec()
                };
                let start = if hit.reverse {
                    seq.len() - hit.read_end
                } else {
                    hit.read_start
                };
                let len = (hit.contig_end - hit.contig_start) as usize;
                let end = (start + len).min(seq.len());
                let _ = writeln!(
                    out,
                    "{}{}\t{}",
                    " ".repeat(hit.contig_start as usize),
                    String::from_utf8_lossy(&seq[start..end]),
                    read.uid
                );
            }
        }
        out
    }
}

/// Align `reads` against the contigs. A read keeps at most one hit per
/// contig, with at least 90% identity and covering at least 75% of its
/// length. Returns the number of reads with any hit.
pub fn realign_reads(contigs: &mut [AlignedContig], reads: &mut [Read], config: &Config) -> usize {
    if contigs.is_empty() {
        return 0;
    }
    let targets = contigs
        .iter()
        .enumerate()
        .map(|(i, contig)| Target::new(contig.name.clone(), i as u32, 0, contig.seq.clone()))
        .collect();
    let aligner = SeededAligner::new(targets, config.seed_len, "contigs");

    let mut supported = 0;
    for read in reads.iter_mut() {
        let seq = read.assembly_seq().to_vec();
        let hits = match align_read(&aligner, &seq, &read.uid, config) {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Skipping read {} in contig realignment: {}", read.uid, e);
                continue;
            }
        };
        let mut seen = HashSet::new();
        for hit in hits {
            if !seen.insert(hit.tid) {
                continue;
            }
            if (hit.score as f64) < MIN_READ_IDENTITY * hit.matches as f64
                || (hit.query_span() as f64) < MIN_READ_SPAN * seq.len() as f64
            {
                continue;
            }
            let contig = &mut contigs[hit.tid as usize];
            contig.add_support(read, &hit);
            read.contig_hits.push(ContigHit {
                contig: contig.name.clone(),
                reverse: hit.reverse,
                contig_start: hit.pos,
                contig_end: hit.end,
                read_start: hit.query_start,
                read_end: hit.query_end,
                cigar: hit.cigar.clone(),
                score: hit.score,
            });
        }
        if !read.contig_hits.is_empty() {
            supported += 1;
        }
    }
    supported
}

fn align_read(aligner: &dyn Aligner, seq: &[u8], uid: &str, config: &Config) -> Result<Vec<Alignment>> {
    aligner.align(seq, uid, config.read_secondary_frac, config.read_max_secondary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reads::tests::cigar;
    use crate::reads::SampleKind;
    use bio::alphabets::dna;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn aln(query_start: usize, query_end: usize, reference: &str) -> Alignment {
        let len = (query_end - query_start) as u32;
        Alignment {
            query_name: "c".to_owned(),
            tid: 0,
            target_name: "1".to_owned(),
            pos: 10_000,
            end: 10_000 + len as u64,
            query_start,
            query_end,
            query_len: 300,
            reverse: false,
            cigar: cigar(&format!("{}S{}M", query_start, len)),
            mapq: 60,
            score: len as i32,
            matches: len,
            secondary: false,
            supplementary: false,
            reference: reference.to_owned(),
        }
    }

    #[test]
    fn test_small_microbe_overlap_keeps_both() {
        let config = Config::default();
        let (human, microbe) = disambiguate(
            vec![aln(100, 200, "human")],
            vec![aln(190, 250, "microbe")],
            &config,
        );
        assert_eq!(human.len(), 1);
        assert_eq!(microbe.len(), 1);
    }

    #[test]
    fn test_large_microbe_overlap_rejects_microbe() {
        let config = Config::default();
        let (human, microbe) = disambiguate(
            vec![aln(100, 200, "human")],
            vec![aln(150, 250, "microbe")],
            &config,
        );
        assert_eq!(human.len(), 1);
        assert!(microbe.is_empty());
    }

    #[test]
    fn test_secondary_human_overlap_rejects_microbe() {
        let config = Config::default();
        let mut secondary = aln(150, 250, "human");
        secondary.secondary = true;
        let (human, microbe) = disambiguate(
            vec![aln(0, 100, "human"), secondary],
            vec![aln(140, 250, "microbe")],
            &config,
        );
        assert!(microbe.is_empty());
        assert_eq!(human.len(), 2);
    }

    #[test]
    fn test_human_claimed_by_microbe_is_dropped() {
        let config = Config::default();
        // short human piece without any competing microbe alignment
        let (human, microbe) = disambiguate(vec![aln(0, 30, "human")], vec![], &config);
        assert!(human.is_empty() && microbe.is_empty());

        let mut weak = aln(0, 20, "human");
        weak.matches = 40;
        let (human, microbe) = disambiguate(vec![weak], vec![aln(0, 250, "microbe")], &config);
        assert!(human.is_empty());
        assert_eq!(microbe.len(), 1);
    }

    #[test]
    fn test_realign_reads() {
        let mut rng = StdRng::seed_from_u64(3);
        let seq: Vec<u8> = (0..300).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect();
        let mut contig = AlignedContig::new(
            AssembledContig {
                name: "c_1_0_1000C0".to_owned(),
                seq: seq.clone(),
            },
            vec![aln(0, 300, "human")],
            vec![],
            &Region::new(0, 9_000, 11_000),
            &Config::default(),
        )
        .unwrap();
        assert!(contig.local);

        let exact = Read::mapped("a", SampleKind::Tumor, 0, 0, cigar("100M"), &seq[50..150]);
        let reverse = Read::mapped(
            "b",
            SampleKind::Normal,
            0,
            0,
            cigar("100M"),
            &dna::revcomp(&seq[120..220]),
        );
        let random: Vec<u8> = (0..50).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect();
        let partial = Read::mapped(
            "c",
            SampleKind::Tumor,
            0,
            0,
            cigar("100M"),
            &[&seq[250..300], &random[..]].concat(),
        );
        let mut reads = vec![exact, reverse, partial];
        let mut contigs = vec![contig.clone()];
        let supported = realign_reads(&mut contigs, &mut reads, &Config::default());
        assert_eq!(supported, 2);
        assert_eq!(reads[0].contig_hits[0].contig_start, 50);
        assert_eq!(reads[0].contig_hits[0].contig_end, 150);
        assert!(reads[1].contig_hits[0].reverse);
        assert!(reads[2].contig_hits.is_empty());

        contig = contigs.remove(0);
        assert_eq!(contig.tumor_coverage[100], 1);
        assert_eq!(contig.normal_coverage[200], 1);
        assert_eq!(contig.tumor_coverage[10], 0);
        assert_eq!(contig.supporting_reads.len(), 2);
        assert!(contig.plot(&reads).contains("t000_0_a"));
    }
}
