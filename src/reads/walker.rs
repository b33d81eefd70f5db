// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashSet;

use anyhow::Result;
use counter::Counter;
use rust_htslib::bam::record::Cigar;

use crate::genome::{CoverageTrack, IntervalSet, Region};
use crate::reads::{MateRegion, MateRegions, Read, ReadFilter, ReadSource};

/// An indel observed in a read alignment, keyed by locus, length and type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CigarKey {
    pub tid: u32,
    /// First deleted base, or the base following an insertion.
    pub pos: u64,
    pub len: u32,
    pub deletion: bool,
}

impl CigarKey {
    /// All indels of a mapped read.
    pub fn from_read(read: &Read) -> Vec<CigarKey> {
        let tid = match read.tid {
            Some(tid) if !read.is_unmapped() => tid,
            _ => return Vec::new(),
        };
        let mut keys = Vec::new();
        let mut pos = read.pos;
        for op in read.cigar.iter() {
            match op {
                Cigar::Del(len) => {
                    keys.push(CigarKey {
                        tid,
                        pos,
                        len: *len,
                        deletion: true,
                    });
                    pos += *len as u64;
                }
                Cigar::Ins(len) => keys.push(CigarKey {
                    tid,
                    pos,
                    len: *len,
                    deletion: false,
                }),
                Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) | Cigar::RefSkip(len) => {
                    pos += *len as u64
                }
                _ => (),
            }
        }
        keys
    }
}

/// Settings shared by all walkers of a run.
#[derive(Debug, Clone, new)]
pub struct WalkerParams {
    /// Cap on the coverage of kept reads at any read start, 0 disables.
    pub max_coverage: u32,
    /// Padding around the mate position of a distant mate.
    pub mate_pad: u64,
    pub min_mate_mapq: u8,
}

/// Extracts evidence reads from one sample, collecting the bookkeeping the
/// later stages need: coverage tracks, indel tallies and mate regions.
pub struct RescueWalker<'a> {
    source: Box<dyn ReadSource>,
    sample_index: usize,
    filter: &'a dyn ReadFilter,
    blacklist: &'a IntervalSet,
    params: WalkerParams,
    rescue: bool,
    pub reads: Vec<Read>,
    pub cigars: Counter<CigarKey>,
    /// Indels per locus, regardless of length and type.
    pub cigar_positions: Counter<(u32, u64)>,
    pub mate_regions: MateRegions,
    pub coverage: CoverageTrack,
    /// Coverage of reads passing the evidence rules.
    pub weird_coverage: CoverageTrack,
    pub clip_coverage: CoverageTrack,
    kept_coverage: CoverageTrack,
    /// Ids of the evidence reads visited so far.
    seen: HashSet<String>,
    pub subsampled: usize,
}

impl<'a> RescueWalker<'a> {
    pub fn new(
        source: Box<dyn ReadSource>,
        sample_index: usize,
        filter: &'a dyn ReadFilter,
        blacklist: &'a IntervalSet,
        params: WalkerParams,
    ) -> Self {
        RescueWalker {
            source,
            sample_index,
            filter,
            blacklist,
            params,
            rescue: false,
            reads: Vec::new(),
            cigars: Counter::new(),
            cigar_positions: Counter::new(),
            mate_regions: MateRegions::new(),
            coverage: CoverageTrack::new(),
            weird_coverage: CoverageTrack::new(),
            clip_coverage: CoverageTrack::new(),
            kept_coverage: CoverageTrack::new(),
            seen: HashSet::new(),
            subsampled: 0,
        }
    }

    /// Switch to the rescue pass: reads are still collected, but coverage,
    /// indel tallies and mate regions are left as they were after the first
    /// pass. Reads already visited are skipped, so rescue regions may
    /// overlap the window or each other.
    pub fn start_rescue(&mut self) {
        self.rescue = true;
    }

    /// Collect the evidence reads overlapping each of `regions` (`None` for
    /// the whole file). `window` is the region under analysis. Returns the
    /// number of new reads kept.
    pub fn extract(&mut self, regions: &[Option<Region>], window: Option<&Region>) -> Result<usize> {
        let before = self.reads.len();
        for region in regions {
            self.source.fetch(region.as_ref())?;
            while let Some(read) = self.source.read() {
                let mut read = read?;
                read.assign_uid(self.sample_index);
                self.visit(read, window);
            }
        }
        Ok(self.reads.len() - before)
    }

    fn visit(&mut self, read: Read, window: Option<&Region>) {
        let region = read.region();
        if !self.rescue {
            if let Some(region) = region.filter(|_| counts_towards_coverage(&read)) {
                self.coverage.add(region.tid, region.start, region.end);
                if read.soft_clip_len() > 0 {
                    self.clip_coverage.add(region.tid, region.start, region.end);
                }
            }
        }
        if let Some(region) = region {
            if self.blacklist.overlaps(&region) {
                return;
            }
        }
        if !self.filter.matches(&read, window) {
            return;
        }
        if !self.seen.insert(read.uid.clone()) {
            return;
        }

        if !self.rescue {
            if let Some(region) = region {
                self.weird_coverage.add(region.tid, region.start, region.end);
            }
            for key in CigarKey::from_read(&read) {
                self.cigars[&key] += 1;
                self.cigar_positions[&(key.tid, key.pos)] += 1;
            }
            self.record_mate(&read, window);
        }

        if let Some(region) = region {
            if self.params.max_coverage > 0 {
                if self.kept_coverage.at(region.tid, region.start) >= self.params.max_coverage {
                    self.subsampled += 1;
                    return;
                }
                self.kept_coverage.add(region.tid, region.start, region.end);
            }
        }
        self.reads.push(read);
    }

    fn record_mate(&mut self, read: &Read, window: Option<&Region>) {
        if read.is_unmapped() || read.is_mate_unmapped() || read.mapq < self.params.min_mate_mapq {
            return;
        }
        let (mate_tid, partner) = match (read.mate_tid, read.region()) {
            (Some(mate_tid), Some(partner)) => (mate_tid, partner),
            _ => return,
        };
        let mate = Region::new(mate_tid, read.mate_pos, read.mate_pos + 1);
        let distant = match window {
            Some(window) => !window.overlaps(&mate),
            None => false,
        };
        if distant {
            self.mate_regions.add(MateRegion::new(
                mate.padded(self.params.mate_pad, None),
                1,
                partner,
            ));
        }
    }
}

fn counts_towards_coverage(read: &Read) -> bool {
    !(read.is_unmapped() || read.is_duplicate() || read.is_qc_fail() || read.is_secondary())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reads::tests::cigar;
    use crate::reads::{DefaultReadFilter, MemorySource, ReadSourceFactory, SampleKind};

    fn walker<'a>(
        reads: Vec<Read>,
        filter: &'a DefaultReadFilter,
        blacklist: &'a IntervalSet,
        max_coverage: u32,
    ) -> RescueWalker<'a> {
        let source = MemorySource::new(reads).open().unwrap();
        RescueWalker::new(
            source,
            0,
            filter,
            blacklist,
            WalkerParams::new(max_coverage, 250, 1),
        )
    }

    #[test]
    fn test_coverage_cap() {
        let filter = DefaultReadFilter::for_read_length(100);
        let blacklist = IntervalSet::new();
        let reads: Vec<_> = (0..100)
            .map(|i| {
                Read::mapped(
                    &format!("r{}", i),
                    SampleKind::Tumor,
                    0,
                    1000,
                    cigar("20S80M"),
                    &[b'A'; 100],
                )
            })
            .collect();
        let mut walker = walker(reads, &filter, &blacklist, 10);
        let window = Region::new(0, 0, 5000);
        let kept = walker.extract(&[Some(window)], Some(&window)).unwrap();
        assert_eq!(kept, 10);
        assert_eq!(walker.subsampled, 90);
        // coverage reflects what was observed, not what was kept
        assert_eq!(walker.coverage.at(0, 1000), 100);
        assert_eq!(walker.clip_coverage.at(0, 1000), 100);
    }

    #[test]
    fn test_indel_tally_and_mate_regions() {
        let filter = DefaultReadFilter::for_read_length(100);
        let blacklist = IntervalSet::new();
        let seq = [b'C'; 100];
        let mut reads = vec![
            Read::mapped("d1", SampleKind::Tumor, 0, 900, cigar("50M5D50M"), &seq),
            Read::mapped("d2", SampleKind::Tumor, 0, 910, cigar("40M5D60M"), &seq),
            Read::mapped("ok", SampleKind::Tumor, 0, 950, cigar("100M"), &seq)
                .paired_with(Some(0), 1100, true, true),
        ];
        for i in 0..3 {
            reads.push(
                Read::mapped(&format!("m{}", i), SampleKind::Tumor, 0, 1000 + i * 10, cigar("100M"), &seq)
                    .paired_with(Some(1), 70_000 + i * 20, false, true),
            );
        }
        let mut walker = walker(reads, &filter, &blacklist, 0);
        let window = Region::new(0, 0, 5000);
        assert_eq!(walker.extract(&[Some(window)], Some(&window)).unwrap(), 5);

        let key = CigarKey {
            tid: 0,
            pos: 950,
            len: 5,
            deletion: true,
        };
        assert_eq!(walker.cigars[&key], 2);
        assert_eq!(walker.cigar_positions[&(0, 950)], 2);
        assert_eq!(walker.mate_regions.len(), 1);
        let mate = walker.mate_regions.iter().next().unwrap();
        assert_eq!(mate.count, 3);
        assert_eq!(mate.region.tid, 1);
        assert!(mate.region.contains_pos(1, 70_040));
    }

    #[test]
    fn test_rescue_pass_leaves_bookkeeping() {
        let filter = DefaultReadFilter::for_read_length(100);
        let blacklist: IntervalSet = vec![Region::new(0, 3000, 4000)].into_iter().collect();
        let seq = [b'G'; 100];
        let reads = vec![
            Read::mapped("a", SampleKind::Tumor, 0, 1000, cigar("30S70M"), &seq),
            Read::mapped("b", SampleKind::Tumor, 0, 3500, cigar("30S70M"), &seq),
            Read::mapped("c", SampleKind::Tumor, 1, 500, cigar("30S70M"), &seq),
        ];
        let mut walker = walker(reads, &filter, &blacklist, 0);
        let window = Region::new(0, 0, 5000);
        assert_eq!(walker.extract(&[Some(window)], Some(&window)).unwrap(), 1);
        walker.start_rescue();
        let rescued = walker
            .extract(&[Some(Region::new(1, 0, 1000))], Some(&window))
            .unwrap();
        assert_eq!(rescued, 1);
        assert_eq!(walker.coverage.at(1, 550), 0);
        assert_eq!(walker.weird_coverage.at(0, 1050), 1);
    }

    #[test]
    fn test_rescue_skips_visited_reads() {
        let filter = DefaultReadFilter::for_read_length(100);
        let blacklist = IntervalSet::new();
        let seq = [b'G'; 100];
        let reads = vec![
            Read::mapped("in", SampleKind::Tumor, 0, 4950, cigar("30S70M"), &seq),
            Read::mapped("out", SampleKind::Tumor, 0, 5100, cigar("30S70M"), &seq),
        ];
        let mut walker = walker(reads, &filter, &blacklist, 0);
        let window = Region::new(0, 0, 5000);
        assert_eq!(walker.extract(&[Some(window)], Some(&window)).unwrap(), 1);
        walker.start_rescue();
        // two overlapping rescue regions, both also covering the window edge
        let rescued = walker
            .extract(
                &[Some(Region::new(0, 4900, 5200)), Some(Region::new(0, 5000, 5300))],
                Some(&window),
            )
            .unwrap();
        assert_eq!(rescued, 1);
        assert_eq!(walker.reads.len(), 2);
    }
}
