// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Alignment of contigs to reference sequences and of reads to contigs.

use std::sync::Arc;

use anyhow::Result;
use rust_htslib::bam::record::{Cigar, CigarString};

use crate::genome::Region;

pub mod seeded;

pub use seeded::{SeededAligner, Target, WindowedReferenceIndex};

/// One local alignment of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub query_name: String,
    /// Chromosome id for genome targets, target index otherwise.
    pub tid: u32,
    pub target_name: String,
    /// Reference span, half-open.
    pub pos: u64,
    pub end: u64,
    /// Aligned part of the query in forward query coordinates, half-open.
    pub query_start: usize,
    pub query_end: usize,
    pub query_len: usize,
    pub reverse: bool,
    /// Cigar in reference orientation, including soft clips.
    pub cigar: CigarString,
    pub mapq: u8,
    pub score: i32,
    pub matches: u32,
    pub secondary: bool,
    pub supplementary: bool,
    /// Name of the reference this alignment was made against.
    pub reference: String,
}

impl Alignment {
    pub fn region(&self) -> Region {
        Region::new(self.tid, self.pos, self.end)
    }

    pub fn query_span(&self) -> usize {
        self.query_end - self.query_start
    }

    /// Number of query bases aligned by both `self` and `other`.
    pub fn query_overlap(&self, other: &Alignment) -> usize {
        self.query_end
            .min(other.query_end)
            .saturating_sub(self.query_start.max(other.query_start))
    }

    pub fn has_indel(&self) -> bool {
        self.cigar
            .iter()
            .any(|op| matches!(op, Cigar::Ins(_) | Cigar::Del(_)))
    }
}

/// Local aligner against a fixed set of targets.
pub trait Aligner: Send + Sync {
    /// All alignments of `seq`: a primary, supplementary pieces covering
    /// other parts of the query, and up to `max_secondary` secondaries
    /// scoring at least `keep_secondary_frac` of the best.
    fn align(
        &self,
        seq: &[u8],
        name: &str,
        keep_secondary_frac: f64,
        max_secondary: usize,
    ) -> Result<Vec<Alignment>>;

    fn target_name(&self, tid: u32) -> Option<&str>;

    /// Names and lengths of all targets, in id order.
    fn targets(&self) -> Vec<(String, u64)>;
}

/// Provides aligners for the parts of a reference needed by one region.
pub trait ReferenceIndex: Send + Sync {
    /// An aligner covering at least `regions` (all targets if the index is
    /// not region based).
    fn aligner(&self, regions: &[Region]) -> Result<Arc<dyn Aligner>>;
}

/// Index over a whole (small) reference, such as a microbial database.
pub struct StaticIndex {
    aligner: Arc<dyn Aligner>,
}

impl StaticIndex {
    pub fn new(aligner: Arc<dyn Aligner>) -> Self {
        StaticIndex { aligner }
    }
}

impl ReferenceIndex for StaticIndex {
    fn aligner(&self, _regions: &[Region]) -> Result<Arc<dyn Aligner>> {
        Ok(Arc::clone(&self.aligner))
    }
}
