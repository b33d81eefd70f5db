// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use crate::genome::{IntervalSet, Region, SequenceDictionary};

/// A distant locus pointed at by the mates of reads from the current window.
#[derive(Debug, Clone, PartialEq, new)]
pub struct MateRegion {
    pub region: Region,
    /// Number of reads whose mate falls here.
    pub count: usize,
    /// Locus of the read that first pointed here.
    pub partner: Region,
}

/// Mate regions collected by one or more walkers. Overlapping additions
/// increase the count of the existing region instead of adding a new one.
#[derive(Debug, Clone, Default)]
pub struct MateRegions {
    regions: Vec<MateRegion>,
}

impl MateRegions {
    pub fn new() -> Self {
        MateRegions::default()
    }

    pub fn add(&mut self, region: MateRegion) {
        match self
            .regions
            .iter_mut()
            .find(|existing| existing.region.overlaps(&region.region))
        {
            Some(existing) => existing.count += region.count,
            None => self.regions.push(region),
        }
    }

    /// Combine the regions of several walkers of the same sample class.
    pub fn merge<'a, I: IntoIterator<Item = &'a MateRegions>>(sets: I) -> Self {
        let mut merged = MateRegions::new();
        for set in sets {
            for region in &set.regions {
                merged.add(region.clone());
            }
        }
        merged
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MateRegion> {
        self.regions.iter()
    }
}

/// Tumor mate regions worth rescuing: supported by at least `min_count`
/// reads, on a primary chromosome, not blacklisted and not also seen in the
/// normal. The result is merged and indexed.
pub fn somatic_mate_regions(
    tumor: &MateRegions,
    normal: &MateRegions,
    blacklist: &IntervalSet,
    dict: &SequenceDictionary,
    min_count: usize,
) -> IntervalSet {
    tumor
        .iter()
        .filter(|mate| mate.count >= min_count)
        .filter(|mate| dict.is_primary(mate.region.tid))
        .filter(|mate| !blacklist.overlaps(&mate.region))
        .filter(|mate| !normal.iter().any(|n| n.region.overlaps(&mate.region)))
        .map(|mate| mate.region)
        .collect::<IntervalSet>()
        .merged()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mate(tid: u32, start: u64, count: usize) -> MateRegion {
        MateRegion::new(
            Region::new(tid, start, start + 1000),
            count,
            Region::new(0, 0, 100),
        )
    }

    fn dict() -> SequenceDictionary {
        SequenceDictionary::new(vec![
            ("1".to_owned(), 1_000_000),
            ("2".to_owned(), 1_000_000),
            ("GL000192.1".to_owned(), 500_000),
        ])
    }

    #[test]
    fn test_counts_accumulate_on_overlap() {
        let mut regions = MateRegions::new();
        regions.add(mate(1, 5000, 1));
        regions.add(mate(1, 5500, 1));
        regions.add(mate(1, 9000, 1));
        assert_eq!(regions.len(), 2);
        assert_eq!(regions.iter().next().unwrap().count, 2);
    }

    #[test]
    fn test_somatic_mate_regions_are_exclusive_of_normal() {
        let mut tumor = MateRegions::new();
        tumor.add(mate(1, 5000, 4));
        tumor.add(mate(1, 50_000, 4));
        tumor.add(mate(1, 90_000, 1));
        tumor.add(mate(2, 1000, 5));
        tumor.add(mate(0, 200_000, 3));
        let mut normal = MateRegions::new();
        normal.add(mate(1, 50_500, 1));
        let blacklist: IntervalSet = vec![Region::new(0, 199_000, 201_000)].into_iter().collect();

        let somatic = somatic_mate_regions(&tumor, &normal, &blacklist, &dict(), 3);
        assert_eq!(somatic.regions(), &[Region::new(1, 5000, 6000)]);
        for region in somatic.iter() {
            assert!(!normal.iter().any(|n| n.region.overlaps(region)));
            assert!(!blacklist.overlaps(region));
        }
    }
}
