// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;

/// Dense counts over the span of one chromosome that has been touched so far.
#[derive(Debug, Clone, Default)]
struct ChromCoverage {
    offset: u64,
    counts: Vec<u32>,
}

impl ChromCoverage {
    fn ensure(&mut self, start: u64, end: u64) {
        if self.counts.is_empty() {
            self.offset = start;
            self.counts = vec![0; (end - start) as usize];
            return;
        }
        if start < self.offset {
            let mut grown = vec![0; (self.offset - start) as usize];
            grown.append(&mut self.counts);
            self.counts = grown;
            self.offset = start;
        }
        let cur_end = self.offset + self.counts.len() as u64;
        if end > cur_end {
            self.counts.resize((end - self.offset) as usize, 0);
        }
    }
}

/// Per-base read counts. Positions that were never touched report zero.
#[derive(Debug, Clone, Default)]
pub struct CoverageTrack {
    chroms: HashMap<u32, ChromCoverage>,
}

impl CoverageTrack {
    pub fn new() -> Self {
        CoverageTrack::default()
    }

    /// Increment every position of `[start, end)`.
    pub fn add(&mut self, tid: u32, start: u64, end: u64) {
        if end <= start {
            return;
        }
        let chrom = self.chroms.entry(tid).or_default();
        chrom.ensure(start, end);
        let from = (start - chrom.offset) as usize;
        let to = (end - chrom.offset) as usize;
        for count in &mut chrom.counts[from..to] {
            *count += 1;
        }
    }

    pub fn at(&self, tid: u32, pos: u64) -> u32 {
        self.chroms
            .get(&tid)
            .and_then(|chrom| {
                pos.checked_sub(chrom.offset)
                    .and_then(|i| chrom.counts.get(i as usize))
            })
            .copied()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.chroms.values().all(|c| c.counts.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_grows_in_both_directions() {
        let mut cov = CoverageTrack::new();
        cov.add(0, 100, 200);
        cov.add(0, 50, 120);
        cov.add(0, 190, 260);
        cov.add(3, 10, 11);

        assert_eq!(cov.at(0, 49), 0);
        assert_eq!(cov.at(0, 50), 1);
        assert_eq!(cov.at(0, 110), 2);
        assert_eq!(cov.at(0, 195), 2);
        assert_eq!(cov.at(0, 259), 1);
        assert_eq!(cov.at(0, 260), 0);
        assert_eq!(cov.at(3, 10), 1);
        assert_eq!(cov.at(1, 10), 0);
        assert_eq!(cov.at(0, u64::MAX), 0);
    }
}
