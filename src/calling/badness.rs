// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use crate::estimation::bam_params::BamParams;
use crate::genome::{CoverageTrack, IntervalSet, Region};

const MIN_BAD_COVERAGE: u32 = 10;
const WEIRD_FACTOR: f64 = 4.0;
const COVERAGE_FACTOR: f64 = 6.0;
const DILATION: u64 = 5;
const MERGE_GAP: u64 = 2;

/// Positions of `window` where the normal looks unreliable: at least 10
/// reads and either many more evidence reads than expected or a large
/// coverage excess. Flagged positions are dilated and coalesced into
/// regions.
pub fn bad_region_mask(
    window: &Region,
    weird: &CoverageTrack,
    total: &CoverageTrack,
    params: &BamParams,
) -> IntervalSet {
    let weird_limit = params.mean_coverage * params.frac_weird * WEIRD_FACTOR;
    let total_limit = params.mean_coverage * COVERAGE_FACTOR;

    let mut regions: Vec<Region> = Vec::new();
    for pos in window.start..window.end {
        let w = weird.at(window.tid, pos);
        let n = total.at(window.tid, pos);
        if w.max(n) < MIN_BAD_COVERAGE {
            continue;
        }
        if w as f64 >= weird_limit || n as f64 >= total_limit {
            let start = pos.saturating_sub(DILATION).max(window.start);
            let end = (pos + DILATION + 1).min(window.end);
            match regions.last_mut() {
                Some(last) if start < last.end + MERGE_GAP => last.end = last.end.max(end),
                _ => regions.push(Region::new(window.tid, start, end)),
            }
        }
    }
    regions.into_iter().collect()
}
