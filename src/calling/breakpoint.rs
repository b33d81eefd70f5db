// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::cmp::{self, Reverse};
use std::fmt::Write as FmtWrite;

use bio::alphabets::dna;
use bio::stats::{LogProb, Prob};
use bio_types::strand::Strand;
use counter::Counter;
use rust_htslib::bam::record::Cigar;

use crate::alignment::Alignment;
use crate::calling::discordant::{DiscordantCluster, DiscordantClusterMap, CLUSTER_DISTANCE};
use crate::genome::IntervalSet;
use crate::genome::Region;
use crate::reads::walker::CigarKey;
use crate::reads::Read;
use crate::reference::ReferenceSource;
use crate::utils::genomics::has_simple_repeat;
use crate::utils::PROB_05;

/// Bases a read has to extend beyond the junction on each side.
const SPLIT_BUFFER: usize = 5;
/// Window for normal indels near an indel breakpoint.
const NEARBY_INDEL_DISTANCE: u64 = 5;
const MIN_MAPQ: u8 = 10;
const MIN_AF: f64 = 0.05;
const MIN_GRAYLIST_NORMAL_COVERAGE: u32 = 10;
const SEQUENCING_ERROR: f64 = 1e-3;
const MIN_SOMATIC_LOD: f64 = 1.0;
const REPEAT_CONTEXT: usize = 20;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
pub enum EvidenceKind {
    #[strum(serialize = "INDEL")]
    Indel,
    #[strum(serialize = "ASSMB")]
    Assembly,
    #[strum(serialize = "ASDIS")]
    AssemblyDiscordant,
    #[strum(serialize = "DSCRD")]
    Discordant,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
pub enum Confidence {
    #[strum(serialize = "PASS")]
    Pass,
    #[strum(serialize = "LOWMAPQ")]
    LowMapq,
    #[strum(serialize = "LOWAF")]
    LowAf,
    #[strum(serialize = "GRAYLISTANDLOWCOV")]
    GraylistAndLowCoverage,
    #[strum(serialize = "LOWSUPPORT")]
    LowSupport,
    #[strum(serialize = "NOLOCAL")]
    NoLocal,
}

/// One side of a breakpoint. `reverse` means the sequence continues to the
/// left of `pos` (strand `-`), otherwise to the right (strand `+`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Breakend {
    pub microbial: bool,
    pub tid: u32,
    pub pos: u64,
    pub reverse: bool,
    pub chrom: String,
    pub mapq: u8,
}

impl Breakend {
    pub fn strand(&self) -> Strand {
        if self.reverse {
            Strand::Reverse
        } else {
            Strand::Forward
        }
    }

    fn locus(&self) -> (bool, u32, u64) {
        (self.microbial, self.tid, self.pos)
    }

    /// Position and orientation, without alignment quality.
    fn coordinates(&self) -> (bool, u32, u64, bool) {
        (self.microbial, self.tid, self.pos, self.reverse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Indel {
    pub deletion: bool,
    pub len: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Support {
    pub tumor_split: u32,
    pub normal_split: u32,
    pub tumor_cigar: u32,
    pub normal_cigar: u32,
    pub normal_nearby_cigar: u32,
    pub tumor_discordant: u32,
    pub normal_discordant: u32,
}

impl Support {
    pub fn normal_alt(&self) -> u32 {
        self.normal_split + self.normal_cigar + self.normal_nearby_cigar + self.normal_discordant
    }

    pub fn tumor_alt(&self) -> u32 {
        cmp::max(self.tumor_split, self.tumor_cigar) + self.tumor_discordant
    }
}

/// A candidate junction between two reference loci, with its evidence and
/// annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoint {
    pub kind: EvidenceKind,
    pub b1: Breakend,
    pub b2: Breakend,
    pub indel: Option<Indel>,
    pub insertion: Vec<u8>,
    pub homology: Vec<u8>,
    pub contig: Option<String>,
    /// Contig interval (forward coordinates) a split read has to span.
    pub contig_span: Option<(usize, usize)>,
    pub num_alignments: usize,
    pub support: Support,
    pub discordant: Option<String>,
    pub local: bool,
    pub repeat: bool,
    pub blacklisted: bool,
    pub pon: usize,
    pub dbsnp: Option<String>,
    pub tumor_cov: u32,
    pub normal_cov: u32,
    pub normal_clip_cov: u32,
    pub tumor_af: f64,
    pub normal_af: f64,
    pub somatic_lod: f64,
    pub confidence: Confidence,
    pub somatic: bool,
    pub ref_allele: String,
    pub alt_allele: String,
    pub reads: Vec<String>,
}

impl Breakpoint {
    fn blank(kind: EvidenceKind, b1: Breakend, b2: Breakend) -> Self {
        Breakpoint {
            kind,
            b1,
            b2,
            indel: None,
            insertion: Vec::new(),
            homology: Vec::new(),
            contig: None,
            contig_span: None,
            num_alignments: 0,
            support: Support::default(),
            discordant: None,
            local: true,
            repeat: false,
            blacklisted: false,
            pon: 0,
            dbsnp: None,
            tumor_cov: 0,
            normal_cov: 0,
            normal_clip_cov: 0,
            tumor_af: 0.0,
            normal_af: 0.0,
            somatic_lod: 0.0,
            confidence: Confidence::LowSupport,
            somatic: false,
            ref_allele: String::new(),
            alt_allele: String::new(),
            reads: Vec::new(),
        }
    }

    /// Put the lower locus first.
    fn normalize(&mut self) {
        if self.b2.locus() < self.b1.locus() {
            std::mem::swap(&mut self.b1, &mut self.b2);
        }
    }

    /// Identity of the event, independent of the contig it was found on.
    fn event_key(&self) -> impl Ord + '_ {
        (
            self.b1.coordinates(),
            self.b2.coordinates(),
            self.indel,
            &self.insertion,
            &self.homology,
            self.kind == EvidenceKind::Discordant,
        )
    }

    /// The cigar tally key of an indel breakpoint.
    pub fn cigar_key(&self) -> Option<CigarKey> {
        self.indel.map(|indel| CigarKey {
            tid: self.b1.tid,
            pos: if indel.deletion {
                self.b1.pos
            } else {
                self.b2.pos
            },
            len: indel.len,
            deletion: indel.deletion,
        })
    }

    /// Indels within a contig alignment, left-normalized against
    /// `chrom_seq`, the full sequence of the aligned chromosome.
    pub fn indels(aln: &Alignment, contig_seq: &[u8], chrom_seq: &[u8]) -> Vec<Breakpoint> {
        let oriented = if aln.reverse {
            dna::revcomp(contig_seq)
        } else {
            contig_seq.to_vec()
        };
        let qlen = oriented.len();
        let ref_base = |pos: u64| chrom_seq.get(pos as usize).copied();
        let breakend = |pos: u64, reverse: bool| Breakend {
            microbial: false,
            tid: aln.tid,
            pos,
            reverse,
            chrom: aln.target_name.clone(),
            mapq: aln.mapq,
        };
        let mut breakpoints = Vec::new();
        let mut rpos = aln.pos;
        let mut qpos = 0usize;
        for op in aln.cigar.iter() {
            match op {
                Cigar::SoftClip(len) => qpos += *len as usize,
                Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) => {
                    rpos += *len as u64;
                    qpos += *len as usize;
                }
                Cigar::Del(len) => {
                    let len = *len as u64;
                    let (mut start, mut q) = (rpos, qpos);
                    while start > aln.pos
                        && ref_base(start - 1).is_some()
                        && ref_base(start - 1) == ref_base(start + len - 1)
                    {
                        start -= 1;
                        q -= 1;
                    }
                    let f = if aln.reverse { qlen - q } else { q };
                    let mut bp = Breakpoint::blank(
                        EvidenceKind::Indel,
                        breakend(start, false),
                        breakend(start + len, true),
                    );
                    bp.indel = Some(Indel {
                        deletion: true,
                        len: len as u32,
                    });
                    bp.contig_span = Some((f, f));
                    breakpoints.push(bp);
                    rpos += len;
                }
                Cigar::Ins(len) => {
                    let len = *len as usize;
                    let mut inserted = oriented[qpos..qpos + len].to_vec();
                    let (mut at, mut q) = (rpos, qpos);
                    while at > aln.pos
                        && ref_base(at - 1).is_some()
                        && ref_base(at - 1) == inserted.last().copied()
                    {
                        inserted.rotate_right(1);
                        at -= 1;
                        q -= 1;
                    }
                    let span = if aln.reverse {
                        (qlen - q - len, qlen - q)
                    } else {
                        (q, q + len)
                    };
                    let mut bp = Breakpoint::blank(
                        EvidenceKind::Indel,
                        breakend(at.saturating_sub(1), false),
                        breakend(at, true),
                    );
                    bp.indel = Some(Indel {
                        deletion: false,
                        len: len as u32,
                    });
                    bp.insertion = inserted;
                    bp.contig_span = Some(span);
                    breakpoints.push(bp);
                    qpos += len;
                }
                _ => (),
            }
        }
        breakpoints
    }

    /// Junctions between consecutive pieces of a split contig alignment.
    /// `pieces` are the non-secondary alignments of one contig.
    pub fn junctions(pieces: &[&Alignment], contig_seq: &[u8], microbial: &[bool]) -> Vec<Breakpoint> {
        let mut order: Vec<usize> = (0..pieces.len()).collect();
        order.sort_by_key(|i| (pieces[*i].query_start, pieces[*i].query_end));
        order
            .windows(2)
            .map(|pair| {
                let (a, b) = (pieces[pair[0]], pieces[pair[1]]);
                let end_of_a = if a.reverse {
                    (a.pos, true)
                } else {
                    (a.end.saturating_sub(1), false)
                };
                let start_of_b = if b.reverse {
                    (b.end.saturating_sub(1), false)
                } else {
                    (b.pos, true)
                };
                let b1 = Breakend {
                    microbial: microbial[pair[0]],
                    tid: a.tid,
                    pos: end_of_a.0,
                    reverse: end_of_a.1,
                    chrom: a.target_name.clone(),
                    mapq: a.mapq,
                };
                let b2 = Breakend {
                    microbial: microbial[pair[1]],
                    tid: b.tid,
                    pos: start_of_b.0,
                    reverse: start_of_b.1,
                    chrom: b.target_name.clone(),
                    mapq: b.mapq,
                };
                let mut bp = Breakpoint::blank(EvidenceKind::Assembly, b1, b2);
                let (lo, hi) = if a.query_end > b.query_start {
                    bp.homology = contig_seq[b.query_start..a.query_end].to_vec();
                    (b.query_start, a.query_end)
                } else {
                    bp.insertion = contig_seq[a.query_end..b.query_start].to_vec();
                    (a.query_end, b.query_start)
                };
                bp.contig_span = Some((lo, hi));
                bp.normalize();
                bp
            })
            .collect()
    }

    /// A breakpoint supported by discordant pairs alone.
    pub fn from_discordant(cluster: &DiscordantCluster, chrom1: &str, chrom2: &str) -> Self {
        let (pos1, reverse1) = cluster.breakend1();
        let (pos2, reverse2) = cluster.breakend2();
        let b1 = Breakend {
            microbial: false,
            tid: cluster.region1.tid,
            pos: pos1,
            reverse: reverse1,
            chrom: chrom1.to_owned(),
            mapq: cluster.mapq1.round() as u8,
        };
        let b2 = Breakend {
            microbial: false,
            tid: cluster.region2.tid,
            pos: pos2,
            reverse: reverse2,
            chrom: chrom2.to_owned(),
            mapq: cluster.mapq2.round() as u8,
        };
        let mut bp = Breakpoint::blank(EvidenceKind::Discordant, b1, b2);
        bp.support.tumor_discordant = cluster.tumor_count as u32;
        bp.support.normal_discordant = cluster.normal_count as u32;
        bp.discordant = Some(cluster.id.clone());
        bp.reads = cluster.reads.clone();
        bp.normalize();
        bp
    }

    /// Attach contig context: name, number of alignments, local flag and
    /// whether the junction lies in low complexity sequence.
    pub fn set_contig(&mut self, name: &str, contig_seq: &[u8], num_alignments: usize, local: bool) {
        self.contig = Some(name.to_owned());
        self.num_alignments = num_alignments;
        self.local = local;
        if let Some((lo, hi)) = self.contig_span {
            let from = lo.saturating_sub(REPEAT_CONTEXT);
            let to = cmp::min(hi + REPEAT_CONTEXT, contig_seq.len());
            self.repeat = from < to && has_simple_repeat(&contig_seq[from..to]);
        }
    }

    /// Count the reads spanning the junction on the contig.
    pub fn add_split_support(&mut self, reads: &[Read]) {
        let (contig, (lo, hi)) = match (&self.contig, self.contig_span) {
            (Some(contig), Some(span)) => (contig, span),
            _ => return,
        };
        let buffer = (SPLIT_BUFFER + self.homology.len()) as u64;
        for read in reads {
            let spans = read.contig_hits.iter().any(|hit| {
                &hit.contig == contig
                    && hit.contig_start + buffer <= lo as u64
                    && hit.contig_end >= hi as u64 + buffer
            });
            if spans {
                if read.sample.is_tumor() {
                    self.support.tumor_split += 1;
                } else {
                    self.support.normal_split += 1;
                }
                self.reads.push(read.uid.clone());
            }
        }
    }

    /// Cross-check an indel against the indels seen in read alignments.
    pub fn add_cigar_support(
        &mut self,
        tumor: &Counter<CigarKey>,
        normal: &Counter<CigarKey>,
        normal_positions: &Counter<(u32, u64)>,
    ) {
        let key = match self.cigar_key() {
            Some(key) => key,
            None => return,
        };
        self.support.tumor_cigar = tumor[&key] as u32;
        self.support.normal_cigar = normal[&key] as u32;
        let from = key.pos.saturating_sub(NEARBY_INDEL_DISTANCE);
        let nearby: usize = (from..=key.pos + NEARBY_INDEL_DISTANCE)
            .map(|pos| normal_positions[&(key.tid, pos)])
            .sum();
        self.support.normal_nearby_cigar = (nearby - normal[&key].min(nearby)) as u32;
    }

    /// Assign the best matching discordant cluster (same orientations, both
    /// ends nearby) to an assembly junction.
    pub fn add_discordant(&mut self, clusters: &mut DiscordantClusterMap) {
        if self.kind != EvidenceKind::Assembly || self.b1.microbial || self.b2.microbial {
            return;
        }
        let near = |region: &Region, end: &Breakend, reverse: bool| {
            reverse == end.reverse
                && region
                    .padded(CLUSTER_DISTANCE, None)
                    .contains_pos(end.tid, end.pos)
        };
        let best = clusters
            .values_mut()
            .filter(|c| {
                near(&c.region1, &self.b1, c.reverse1) && near(&c.region2, &self.b2, c.reverse2)
            })
            .max_by_key(|c| (c.total(), Reverse(c.id.clone())));
        if let Some(cluster) = best {
            cluster.contig = self.contig.clone();
            self.support.tumor_discordant = cluster.tumor_count as u32;
            self.support.normal_discordant = cluster.normal_count as u32;
            self.discordant = Some(cluster.id.clone());
            self.kind = EvidenceKind::AssemblyDiscordant;
        }
    }

    pub fn check_blacklist(&mut self, mask: &IntervalSet) {
        let hit = |end: &Breakend| {
            !end.microbial && mask.overlaps(&Region::new(end.tid, end.pos, end.pos + 1))
        };
        self.blacklisted = hit(&self.b1) || hit(&self.b2);
    }

    /// Allele frequencies and the normal LOD from the coverage at the
    /// breakpoint.
    pub fn set_coverage(&mut self, tumor_cov: u32, normal_cov: u32, normal_clip_cov: u32) {
        self.tumor_cov = tumor_cov;
        self.normal_cov = normal_cov;
        self.normal_clip_cov = normal_clip_cov;
        let af = |alt: u32, cov: u32| {
            if cov == 0 {
                if alt > 0 {
                    1.0
                } else {
                    0.0
                }
            } else {
                (alt as f64 / cov as f64).min(1.0)
            }
        };
        self.tumor_af = af(self.support.tumor_alt(), tumor_cov);
        self.normal_af = af(self.support.normal_alt(), normal_cov);

        let normal_ref = normal_cov.saturating_sub(normal_clip_cov) as f64;
        let normal_alt = self.support.normal_alt() as f64;
        let ln_ref = *LogProb::from(Prob(1.0 - SEQUENCING_ERROR)) * normal_ref
            + *LogProb::from(Prob(SEQUENCING_ERROR)) * normal_alt;
        let ln_het = **PROB_05 * (normal_ref + normal_alt);
        self.somatic_lod = (ln_ref - ln_het) / std::f64::consts::LN_10;
    }

    /// Assign confidence and somatic status. Somatic requires a normal
    /// sample without any alternative evidence that is confidently
    /// reference at this locus.
    pub fn score(&mut self, has_normal: bool) {
        let support = &self.support;
        let split = support.tumor_split + support.normal_split;
        self.confidence = match self.kind {
            EvidenceKind::Indel => {
                let required = if self.repeat { 5 } else { 3 };
                if self.b1.mapq < MIN_MAPQ {
                    Confidence::LowMapq
                } else if self.blacklisted && self.normal_cov < MIN_GRAYLIST_NORMAL_COVERAGE {
                    Confidence::GraylistAndLowCoverage
                } else if cmp::max(split, support.tumor_cigar + support.normal_cigar) < required {
                    Confidence::LowSupport
                } else if self.tumor_af < MIN_AF {
                    Confidence::LowAf
                } else {
                    Confidence::Pass
                }
            }
            EvidenceKind::Assembly | EvidenceKind::AssemblyDiscordant => {
                let discordant = support.tumor_discordant + support.normal_discordant;
                let enough = if discordant > 0 {
                    split + discordant >= 3
                } else {
                    split >= 4
                };
                if !self.local {
                    Confidence::NoLocal
                } else if cmp::min(self.b1.mapq, self.b2.mapq) < MIN_MAPQ {
                    Confidence::LowMapq
                } else if self.blacklisted && self.normal_cov < MIN_GRAYLIST_NORMAL_COVERAGE {
                    Confidence::GraylistAndLowCoverage
                } else if !enough {
                    Confidence::LowSupport
                } else if self.tumor_af < MIN_AF {
                    Confidence::LowAf
                } else {
                    Confidence::Pass
                }
            }
            EvidenceKind::Discordant => {
                if cmp::min(self.b1.mapq, self.b2.mapq) < MIN_MAPQ {
                    Confidence::LowMapq
                } else if support.tumor_discordant + support.normal_discordant < 4 {
                    Confidence::LowSupport
                } else {
                    Confidence::Pass
                }
            }
        };
        self.somatic = has_normal
            && self.support.normal_alt() == 0
            && self.normal_af == 0.0
            && self.pon == 0
            && self.somatic_lod >= MIN_SOMATIC_LOD;
    }

    /// Reference and alternative allele strings in VCF notation. Breakends
    /// on sequences missing from the references get `N`.
    pub fn set_alleles(
        &mut self,
        reference: &dyn ReferenceSource,
        microbes: Option<&dyn ReferenceSource>,
    ) {
        let base = |end: &Breakend, pos: u64| -> String {
            let source = if end.microbial { microbes } else { Some(reference) };
            source
                .and_then(|source| source.subseq(&end.chrom, pos, pos + 1).ok())
                .filter(|seq| !seq.is_empty())
                .map(|seq| String::from_utf8_lossy(&seq).into_owned())
                .unwrap_or_else(|| "N".to_owned())
        };
        match self.indel {
            Some(Indel {
                deletion: true,
                len,
            }) => {
                let anchor = self.b1.pos.saturating_sub(1);
                let deleted = reference
                    .subseq(&self.b1.chrom, anchor, self.b1.pos + len as u64)
                    .ok()
                    .filter(|seq| !seq.is_empty())
                    .map(|seq| String::from_utf8_lossy(&seq).into_owned());
                match deleted {
                    Some(deleted) => {
                        self.alt_allele = deleted[..1].to_owned();
                        self.ref_allele = deleted;
                    }
                    None => {
                        self.ref_allele = "N".to_owned();
                        self.alt_allele = "N".to_owned();
                    }
                }
            }
            Some(Indel {
                deletion: false, ..
            }) => {
                let anchor = base(&self.b1, self.b1.pos);
                self.alt_allele = format!("{}{}", anchor, String::from_utf8_lossy(&self.insertion));
                self.ref_allele = anchor;
            }
            None => {
                let t = base(&self.b1, self.b1.pos);
                let ins = String::from_utf8_lossy(&self.insertion).into_owned();
                let mate = format!("{}:{}", self.b2.chrom, self.b2.pos + 1);
                let bracket = if self.b2.reverse { '[' } else { ']' };
                self.alt_allele = if self.b1.reverse {
                    format!("{b}{m}{b}{i}{t}", b = bracket, m = mate, i = ins, t = t)
                } else {
                    format!("{t}{i}{b}{m}{b}", b = bracket, m = mate, i = ins, t = t)
                };
                self.ref_allele = t;
            }
        }
    }

    /// Span in bases, -1 for interchromosomal events.
    pub fn span(&self) -> i64 {
        if let Some(indel) = self.indel {
            return indel.len as i64;
        }
        if self.b1.microbial != self.b2.microbial || self.b1.tid != self.b2.tid {
            -1
        } else {
            (self.b2.pos as i64 - self.b1.pos as i64).abs()
        }
    }

    pub fn header() -> &'static str {
        "chr1\tpos1\tstrand1\tchr2\tpos2\tstrand2\tref\talt\tspan\tmapq1\tmapq2\t\
         nsplit\ttsplit\tndisc\ttdisc\tncigar\ttcigar\thomology\tinsertion\tcontig\t\
         numalign\tconfidence\tevidence\tpon\trepeat\tdbsnp\tsomatic\tsomatic_lod\t\
         tumor_af\tnormal_af\ttcov\tncov\tnclip\tblacklist\treads"
    }

    /// Tab separated record matching `header`.
    pub fn to_record(&self, read_tracking: bool) -> String {
        let flag = |value: bool| if value { "1" } else { "0" };
        let mut line = String::new();
        // writing to a String cannot fail
        let _ = write!(
            line,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.2}\t{:.3}\t{:.3}\t{}\t{}\t{}\t{}\t{}",
            self.b1.chrom,
            self.b1.pos + 1,
            self.b1.strand().strand_symbol(),
            self.b2.chrom,
            self.b2.pos + 1,
            self.b2.strand().strand_symbol(),
            self.ref_allele,
            self.alt_allele,
            self.span(),
            self.b1.mapq,
            self.b2.mapq,
            self.support.normal_split,
            self.support.tumor_split,
            self.support.normal_discordant,
            self.support.tumor_discordant,
            self.support.normal_cigar,
            self.support.tumor_cigar,
            dot_if_empty(&String::from_utf8_lossy(&self.homology)),
            dot_if_empty(&String::from_utf8_lossy(&self.insertion)),
            self.contig.as_deref().unwrap_or("."),
            self.num_alignments,
            self.confidence,
            self.kind,
            self.pon,
            flag(self.repeat),
            self.dbsnp.as_deref().unwrap_or("."),
            flag(self.somatic),
            self.somatic_lod,
            self.tumor_af,
            self.normal_af,
            self.tumor_cov,
            self.normal_cov,
            self.normal_clip_cov,
            flag(self.blacklisted),
            if read_tracking && !self.reads.is_empty() {
                self.reads.join(",")
            } else {
                ".".to_owned()
            }
        );
        line
    }
}

fn dot_if_empty(value: &str) -> &str {
    if value.is_empty() {
        "."
    } else {
        value
    }
}

/// Sort breakpoints and drop duplicate events, keeping the copy with the
/// most split support (then the highest mapq, then the smallest contig
/// name). The result does not depend on the input order.
pub fn dedup_breakpoints(breakpoints: &mut Vec<Breakpoint>) {
    breakpoints.sort_by(|a, b| {
        a.event_key()
            .cmp(&b.event_key())
            .then_with(|| {
                let total = |bp: &Breakpoint| {
                    bp.support.tumor_split + bp.support.normal_split + bp.support.tumor_discordant
                };
                total(b).cmp(&total(a))
            })
            .then_with(|| (b.b1.mapq, b.b2.mapq).cmp(&(a.b1.mapq, a.b2.mapq)))
            .then_with(|| a.support.cmp(&b.support))
            .then_with(|| a.contig.cmp(&b.contig))
            .then_with(|| a.reads.cmp(&b.reads))
    });
    breakpoints.dedup_by(|later, kept| later.event_key().cmp(&kept.event_key()).is_eq());
}
