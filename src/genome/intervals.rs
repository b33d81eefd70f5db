// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;
use std::iter::FromIterator;

use bio::data_structures::interval_tree::ArrayBackedIntervalTree;

use crate::genome::region::Region;

/// A collection of regions with tree-indexed overlap queries.
///
/// Queries are answered from per-chromosome interval trees once `index` has
/// been called; any mutation drops the index and queries fall back to a scan.
#[derive(Default, Clone, Debug)]
pub struct IntervalSet {
    regions: Vec<Region>,
    trees: Option<HashMap<u32, ArrayBackedIntervalTree<u64, usize>>>,
}

impl IntervalSet {
    pub fn new() -> Self {
        IntervalSet::default()
    }

    pub fn add(&mut self, region: Region) {
        self.regions.push(region);
        self.trees = None;
    }

    /// Append all regions of `other`.
    pub fn union(&mut self, other: &IntervalSet) {
        self.regions.extend(other.regions.iter().copied());
        self.trees = None;
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Total number of bases spanned by the members (overlaps counted twice).
    pub fn width(&self) -> u64 {
        self.regions.iter().map(|r| r.width()).sum()
    }

    /// Build the interval trees.
    pub fn index(&mut self) {
        let mut trees: HashMap<u32, Vec<(std::ops::Range<u64>, usize)>> = HashMap::new();
        for (i, region) in self.regions.iter().enumerate() {
            trees
                .entry(region.tid)
                .or_default()
                .push((region.start..region.end, i));
        }
        self.trees = Some(
            trees
                .into_iter()
                .map(|(tid, entries)| (tid, ArrayBackedIntervalTree::from_iter(entries)))
                .collect(),
        );
    }

    pub fn is_indexed(&self) -> bool {
        self.trees.is_some()
    }

    /// All members overlapping `query`.
    pub fn find_overlapping(&self, query: &Region) -> Vec<&Region> {
        match &self.trees {
            Some(trees) => {
                let tree = match trees.get(&query.tid) {
                    Some(tree) => tree,
                    None => return Vec::new(),
                };
                let mut hits: Vec<_> = tree
                    // widen by one base on each side, exact half-open test below
                    .find(query.start.saturating_sub(1)..query.end + 1)
                    .into_iter()
                    .map(|entry| *entry.data())
                    .filter(|i| self.regions[*i].overlaps(query))
                    .collect();
                hits.sort_unstable();
                hits.into_iter().map(|i| &self.regions[i]).collect()
            }
            None => self.regions.iter().filter(|r| r.overlaps(query)).collect(),
        }
    }

    pub fn overlaps(&self, query: &Region) -> bool {
        !self.find_overlapping(query).is_empty()
    }

    /// Sort and merge overlapping or abutting members, returning the merged set.
    pub fn merged(&self) -> IntervalSet {
        let mut sorted = self.regions.clone();
        sorted.sort();
        let mut merged: Vec<Region> = Vec::with_capacity(sorted.len());
        for region in sorted {
            match merged.last_mut() {
                Some(last) if last.tid == region.tid && region.start <= last.end => {
                    last.end = last.end.max(region.end);
                }
                _ => merged.push(region),
            }
        }
        let mut set = IntervalSet::from_iter(merged);
        set.index();
        set
    }
}

impl FromIterator<Region> for IntervalSet {
    fn from_iter<T: IntoIterator<Item = Region>>(iter: T) -> Self {
        IntervalSet {
            regions: iter.into_iter().collect(),
            trees: None,
        }
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> IntervalSet {
        vec![
            Region::new(0, 100, 200),
            Region::new(0, 150, 300),
            Region::new(0, 300, 400),
            Region::new(1, 100, 200),
            Region::new(0, 1000, 1100),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_overlap_indexed_and_unindexed_agree() {
        let mut set = set();
        let queries = [
            Region::new(0, 0, 100),
            Region::new(0, 199, 201),
            Region::new(0, 400, 1000),
            Region::new(0, 1099, 1200),
            Region::new(1, 50, 101),
            Region::new(2, 0, 10_000),
        ];
        let unindexed: Vec<_> = queries
            .iter()
            .map(|q| set.find_overlapping(q).len())
            .collect();
        set.index();
        let indexed: Vec<_> = queries
            .iter()
            .map(|q| set.find_overlapping(q).len())
            .collect();
        assert_eq!(unindexed, indexed);
        assert_eq!(indexed, vec![0, 2, 0, 1, 1, 0]);
    }

    #[test]
    fn test_merge() {
        let merged = set().merged();
        assert_eq!(
            merged.regions(),
            &[
                Region::new(0, 100, 400),
                Region::new(0, 1000, 1100),
                Region::new(1, 100, 200)
            ]
        );
        assert_eq!(merged.width(), 300 + 100 + 100);
        assert!(merged.is_indexed());
    }
}
