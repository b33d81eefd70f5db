// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::cmp;
use std::fmt;

use anyhow::Result;

use crate::errors;

/// A half-open interval `[start, end)` on chromosome `tid`.
///
/// Regions order by `(tid, start, end)`, which makes all regions on the same
/// chromosome axis comparable.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, new,
)]
pub struct Region {
    pub tid: u32,
    pub start: u64,
    pub end: u64,
}

impl Region {
    pub fn width(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn contains_pos(&self, tid: u32, pos: u64) -> bool {
        self.tid == tid && pos >= self.start && pos < self.end
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.tid == other.tid && self.start < other.end && other.start < self.end
    }

    /// Number of bases shared with `other`.
    pub fn overlap_len(&self, other: &Region) -> u64 {
        if self.tid != other.tid {
            return 0;
        }
        cmp::min(self.end, other.end).saturating_sub(cmp::max(self.start, other.start))
    }

    /// Extend by `pad` on both sides, never beyond `0` and `chrom_len`.
    pub fn padded(&self, pad: u64, chrom_len: Option<u64>) -> Region {
        let end = self.end + pad;
        Region {
            tid: self.tid,
            start: self.start.saturating_sub(pad),
            end: chrom_len.map_or(end, |len| cmp::min(end, len)),
        }
    }

    /// Parse `CHROM`, `CHROM:START-END` (1-based, inclusive) or `CHROM,START,END`
    /// (the region file format), resolving chromosome names through `tid_of`.
    pub fn parse<F>(spec: &str, tid_of: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<(u32, u64)>,
    {
        let spec = spec.trim();
        let (chrom, range) = if let Some((chrom, range)) = spec.split_once(':') {
            let (start, end) = range
                .replace(',', "")
                .split_once('-')
                .map(|(s, e)| (s.to_owned(), e.to_owned()))
                .ok_or_else(|| errors::invalid_region(spec))?;
            (chrom, Some((start, end)))
        } else {
            let fields: Vec<_> = spec.split(|c| c == ',' || c == '\t').collect();
            match fields.len() {
                1 => (fields[0], None),
                3 => (fields[0], Some((fields[1].to_owned(), fields[2].to_owned()))),
                _ => return Err(errors::invalid_region(spec).into()),
            }
        };
        let (tid, len) = tid_of(chrom).ok_or_else(|| errors::Error::UnknownChromosome {
            name: chrom.to_owned(),
        })?;
        match range {
            None => Ok(Region::new(tid, 0, len)),
            Some((start, end)) => {
                let start: u64 = start
                    .trim()
                    .parse()
                    .map_err(|_| errors::invalid_region(spec))?;
                let end: u64 = end
                    .trim()
                    .parse()
                    .map_err(|_| errors::invalid_region(spec))?;
                if end < start || start == 0 {
                    return Err(errors::invalid_region(spec).into());
                }
                Ok(Region::new(tid, start - 1, cmp::min(end, len)))
            }
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}-{}", self.tid, self.start + 1, self.end)
    }
}

/// Split `region` into chunks whose cores are at most `chunk_size` wide and
/// differ in width by at most one. Each chunk is padded by `pad` on both sides
/// (clamped to the region), so the union of the chunks is `region`. If
/// `2 * pad <= chunk_size`, adjacent chunks overlap by exactly `2 * pad`.
pub fn partition(region: &Region, chunk_size: u64, pad: u64) -> Vec<Region> {
    if chunk_size == 0 || region.width() <= chunk_size {
        return vec![*region];
    }
    let width = region.width();
    let n = (width + chunk_size - 1) / chunk_size;
    let (base, extra) = (width / n, width % n);
    let mut chunks = Vec::with_capacity(n as usize);
    let mut core_start = region.start;
    for i in 0..n {
        let core_end = core_start + base + if i < extra { 1 } else { 0 };
        chunks.push(Region::new(
            region.tid,
            cmp::max(core_start.saturating_sub(pad), region.start),
            cmp::min(core_end + pad, region.end),
        ));
        core_start = core_end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid_of(name: &str) -> Option<(u32, u64)> {
        match name {
            "1" => Some((0, 1_000_000)),
            "2" => Some((1, 500_000)),
            _ => None,
        }
    }

    #[test]
    fn test_parse_region() {
        assert_eq!(
            Region::parse("1:1001-2000", tid_of).unwrap(),
            Region::new(0, 1000, 2000)
        );
        assert_eq!(
            Region::parse("2,11,20", tid_of).unwrap(),
            Region::new(1, 10, 20)
        );
        assert_eq!(
            Region::parse("2", tid_of).unwrap(),
            Region::new(1, 0, 500_000)
        );
        assert!(Region::parse("3:1-10", tid_of).is_err());
        assert!(Region::parse("1:10", tid_of).is_err());
    }

    #[test]
    fn test_partition_overlap_is_twice_the_pad() {
        let region = Region::new(0, 1_000, 101_000);
        for &(chunk, pad) in &[(25_000, 500), (10_000, 0), (7_777, 123), (30_000, 1_000)] {
            let chunks = partition(&region, chunk, pad);
            assert!(chunks.len() > 1);
            assert_eq!(chunks.first().unwrap().start, region.start);
            assert_eq!(chunks.last().unwrap().end, region.end);
            for (a, b) in chunks.iter().zip(chunks.iter().skip(1)) {
                assert_eq!(a.overlap_len(b), 2 * pad);
                // no gaps
                assert!(b.start <= a.end);
            }
            for c in &chunks {
                assert!(c.width() <= chunk + 2 * pad);
            }
        }
    }

    #[test]
    fn test_partition_cores_never_exceed_chunk_size() {
        // a trailing remainder narrower than the pad
        let region = Region::new(0, 0, 10_100);
        let chunks = partition(&region, 1000, 200);
        assert_eq!(chunks.len(), 11);
        for (a, b) in chunks.iter().zip(chunks.iter().skip(1)) {
            assert_eq!(a.overlap_len(b), 400);
        }
        let cores: Vec<u64> = chunks
            .iter()
            .map(|c| c.width() - if c.start == region.start || c.end == region.end { 200 } else { 400 })
            .collect();
        assert!(cores.iter().all(|&core| core == 918 || core == 919));
        assert_eq!(cores.iter().sum::<u64>(), region.width());

        // pad wider than the chunk size still covers the region with bounded chunks
        let chunks = partition(&Region::new(0, 0, 5000), 1000, 800);
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[0], Region::new(0, 0, 1800));
        assert!(chunks.iter().all(|c| c.width() <= 1000 + 2 * 800));
        assert_eq!(chunks.last().unwrap().end, 5000);
    }

    #[test]
    fn test_partition_small_region() {
        let region = Region::new(0, 0, 100);
        assert_eq!(partition(&region, 1000, 50), vec![region]);
        assert_eq!(partition(&region, 0, 50), vec![region]);
    }
}
