// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Sequencing reads as they flow through a region: loaded from a sample,
//! optionally error corrected, and annotated with their alignments to the
//! assembled contigs.

use std::collections::HashSet;

use bio::alphabets::dna;
use rust_htslib::bam::record::{Aux, Cigar, CigarString};
use rust_htslib::bam::record::Record;

use crate::genome::Region;

pub mod filter;
pub mod mate_regions;
pub mod source;
pub mod walker;

pub use filter::{DefaultReadFilter, DefaultReadFilterBuilder, ReadFilter};
pub use mate_regions::{MateRegion, MateRegions};
pub use source::{BamSource, MemorySource, ReadSource, ReadSourceFactory};
pub use walker::RescueWalker;

const FLAG_PAIRED: u16 = 0x1;
const FLAG_UNMAPPED: u16 = 0x4;
const FLAG_MATE_UNMAPPED: u16 = 0x8;
const FLAG_REVERSE: u16 = 0x10;
const FLAG_MATE_REVERSE: u16 = 0x20;
const FLAG_FIRST: u16 = 0x40;
const FLAG_SECONDARY: u16 = 0x100;
const FLAG_QC_FAIL: u16 = 0x200;
const FLAG_DUPLICATE: u16 = 0x400;
const FLAG_SUPPLEMENTARY: u16 = 0x800;

#[derive(
    Clone,
    Copy,
    Debug,
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
pub enum SampleKind {
    #[strum(serialize = "t")]
    Tumor,
    #[strum(serialize = "n")]
    Normal,
}

impl SampleKind {
    pub fn is_tumor(self) -> bool {
        self == SampleKind::Tumor
    }
}

/// Alignment of a read against one assembled contig. Coordinates are on the
/// forward strand of the contig and of the read, half-open.
#[derive(Clone, Debug, PartialEq)]
pub struct ContigHit {
    pub contig: String,
    pub reverse: bool,
    pub contig_start: u64,
    pub contig_end: u64,
    pub read_start: usize,
    pub read_end: usize,
    pub cigar: CigarString,
    pub score: i32,
}

/// A sequencing read with the annotations the pipeline attaches to it.
#[derive(Clone, Debug)]
pub struct Read {
    /// Unique across samples: sample tag and index, pair flag and query name.
    pub uid: String,
    pub qname: String,
    pub sample: SampleKind,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
    pub corrected: Option<Vec<u8>>,
    /// For unmapped reads with a mapped mate this is the mate's locus.
    pub tid: Option<u32>,
    pub pos: u64,
    pub cigar: CigarString,
    pub mapq: u8,
    pub flags: u16,
    pub mate_tid: Option<u32>,
    pub mate_pos: u64,
    pub insert_size: i64,
    pub barcode: Option<String>,
    pub contig_hits: Vec<ContigHit>,
}

impl Read {
    /// A single-end read at `pos` on `tid`.
    pub fn mapped(
        qname: &str,
        sample: SampleKind,
        tid: u32,
        pos: u64,
        cigar: CigarString,
        seq: &[u8],
    ) -> Self {
        let mut read = Read {
            uid: String::new(),
            qname: qname.to_owned(),
            sample,
            seq: seq.to_vec(),
            qual: vec![30; seq.len()],
            corrected: None,
            tid: Some(tid),
            pos,
            cigar,
            mapq: 60,
            flags: 0,
            mate_tid: None,
            mate_pos: 0,
            insert_size: 0,
            barcode: None,
            contig_hits: Vec::new(),
        };
        read.assign_uid(0);
        read
    }

    /// Builder-style: make this read one end of a pair.
    pub fn paired_with(
        mut self,
        mate_tid: Option<u32>,
        mate_pos: u64,
        mate_reverse: bool,
        first: bool,
    ) -> Self {
        self.flags |= FLAG_PAIRED;
        if first {
            self.flags |= FLAG_FIRST;
        }
        match mate_tid {
            Some(mate_tid) => {
                self.mate_tid = Some(mate_tid);
                self.mate_pos = mate_pos;
                if mate_reverse {
                    self.flags |= FLAG_MATE_REVERSE;
                }
                if Some(mate_tid) == self.tid {
                    let (left, right) = if self.pos <= mate_pos {
                        (self.pos, mate_pos + self.seq.len() as u64)
                    } else {
                        (mate_pos, self.end())
                    };
                    let isize = (right - left) as i64;
                    self.insert_size = if self.pos <= mate_pos { isize } else { -isize };
                }
            }
            None => {
                self.flags |= FLAG_MATE_UNMAPPED;
            }
        }
        self.assign_uid(0);
        self
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags |= flags;
        self.assign_uid(0);
        self
    }

    pub fn with_mapq(mut self, mapq: u8) -> Self {
        self.mapq = mapq;
        self
    }

    pub fn reversed(self) -> Self {
        self.with_flags(FLAG_REVERSE)
    }

    /// An unmapped read; placed at `(tid, pos)` if its mate is mapped there.
    pub fn unmapped(qname: &str, sample: SampleKind, seq: &[u8], mate: Option<(u32, u64)>) -> Self {
        let mut read = Read::mapped(qname, sample, 0, 0, CigarString(Vec::new()), seq);
        read.flags = FLAG_UNMAPPED | FLAG_PAIRED;
        match mate {
            Some((tid, pos)) => {
                read.tid = Some(tid);
                read.pos = pos;
                read.mate_tid = Some(tid);
                read.mate_pos = pos;
            }
            None => {
                read.tid = None;
                read.flags |= FLAG_MATE_UNMAPPED;
            }
        }
        read.assign_uid(0);
        read
    }

    /// Convert an htslib record. The uid is assigned by the caller once the
    /// sample index is known.
    pub fn from_record(record: &Record, sample: SampleKind, barcode_tag: Option<&[u8]>) -> Self {
        let barcode = barcode_tag.and_then(|tag| match record.aux(tag) {
            Ok(Aux::String(value)) => Some(value.to_owned()),
            _ => None,
        });
        let to_tid = |tid: i32| if tid < 0 { None } else { Some(tid as u32) };
        Read {
            uid: String::new(),
            qname: String::from_utf8_lossy(record.qname()).into_owned(),
            sample,
            seq: record.seq().as_bytes(),
            qual: record.qual().to_vec(),
            corrected: None,
            tid: to_tid(record.tid()),
            pos: record.pos().max(0) as u64,
            cigar: record.cigar().take(),
            mapq: record.mapq(),
            flags: record.flags(),
            mate_tid: to_tid(record.mtid()),
            mate_pos: record.mpos().max(0) as u64,
            insert_size: record.insert_size(),
            barcode,
            contig_hits: Vec::new(),
        }
    }

    pub fn assign_uid(&mut self, sample_index: usize) {
        let tag: &'static str = self.sample.into();
        self.uid = format!(
            "{}{:03}_{}_{}",
            tag,
            sample_index,
            self.flags & (FLAG_FIRST | FLAG_SECONDARY | FLAG_SUPPLEMENTARY),
            self.qname
        );
    }

    pub fn is_paired(&self) -> bool {
        self.flags & FLAG_PAIRED != 0
    }

    pub fn is_unmapped(&self) -> bool {
        self.flags & FLAG_UNMAPPED != 0 || self.tid.is_none()
    }

    pub fn is_mate_unmapped(&self) -> bool {
        !self.is_paired() || self.flags & FLAG_MATE_UNMAPPED != 0 || self.mate_tid.is_none()
    }

    pub fn is_reverse(&self) -> bool {
        self.flags & FLAG_REVERSE != 0
    }

    pub fn is_mate_reverse(&self) -> bool {
        self.flags & FLAG_MATE_REVERSE != 0
    }

    pub fn is_secondary(&self) -> bool {
        self.flags & FLAG_SECONDARY != 0
    }

    pub fn is_supplementary(&self) -> bool {
        self.flags & FLAG_SUPPLEMENTARY != 0
    }

    pub fn is_duplicate(&self) -> bool {
        self.flags & FLAG_DUPLICATE != 0
    }

    pub fn is_qc_fail(&self) -> bool {
        self.flags & FLAG_QC_FAIL != 0
    }

    /// Sequence to assemble from: the corrected one if present.
    pub fn assembly_seq(&self) -> &[u8] {
        self.corrected.as_deref().unwrap_or(&self.seq)
    }

    /// Reference bases consumed by the alignment (at least one).
    pub fn ref_len(&self) -> u64 {
        let len: u64 = self
            .cigar
            .iter()
            .map(|op| match op {
                Cigar::Match(l) | Cigar::Del(l) | Cigar::RefSkip(l) | Cigar::Equal(l)
                | Cigar::Diff(l) => *l as u64,
                _ => 0,
            })
            .sum();
        len.max(1)
    }

    /// Exclusive end of the reference span.
    pub fn end(&self) -> u64 {
        self.pos + self.ref_len()
    }

    pub fn region(&self) -> Option<Region> {
        self.tid.map(|tid| Region::new(tid, self.pos, self.end()))
    }

    pub fn overlaps(&self, region: &Region) -> bool {
        self.region().map_or(false, |r| r.overlaps(region))
    }

    pub fn soft_clip_len(&self) -> u32 {
        self.cigar
            .iter()
            .map(|op| match op {
                Cigar::SoftClip(l) => *l,
                _ => 0,
            })
            .sum()
    }

    pub fn has_hard_clip(&self) -> bool {
        self.cigar.iter().any(|op| matches!(op, Cigar::HardClip(_)))
    }

    pub fn max_deletion(&self) -> u32 {
        self.cigar
            .iter()
            .filter_map(|op| match op {
                Cigar::Del(l) => Some(*l),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    pub fn max_insertion(&self) -> u32 {
        self.cigar
            .iter()
            .filter_map(|op| match op {
                Cigar::Ins(l) => Some(*l),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Whether the pair looks like it spans a rearrangement: mates on
    /// different chromosomes, an insert larger than `max_insert_size`, or a
    /// non forward-reverse orientation.
    pub fn is_discordant(&self, max_insert_size: i64) -> bool {
        if !self.is_paired() || self.is_unmapped() || self.is_mate_unmapped() {
            return false;
        }
        if self.mate_tid != self.tid {
            return true;
        }
        if self.insert_size.abs() > max_insert_size {
            return true;
        }
        let proper_orientation = if self.pos <= self.mate_pos {
            !self.is_reverse() && self.is_mate_reverse()
        } else {
            self.is_reverse() && !self.is_mate_reverse()
        };
        !proper_orientation && self.pos != self.mate_pos
    }

    /// Number of bases left after trimming both ends down to bases of at
    /// least `min_qual`.
    pub fn trimmed_len(&self, min_qual: u8) -> usize {
        let first = self.qual.iter().position(|q| *q >= min_qual);
        let last = self.qual.iter().rposition(|q| *q >= min_qual);
        match (first, last) {
            (Some(first), Some(last)) => last - first + 1,
            _ if self.qual.is_empty() => self.seq.len(),
            _ => 0,
        }
    }

    pub fn revcomp_seq(&self) -> Vec<u8> {
        dna::revcomp(&self.seq)
    }
}

/// Keep the first read for each uid. Applying this twice changes nothing.
pub fn dedup_reads<I: IntoIterator<Item = Read>>(reads: I) -> Vec<Read> {
    let mut seen = HashSet::new();
    reads
        .into_iter()
        .filter(|read| seen.insert(read.uid.clone()))
        .collect()
}
