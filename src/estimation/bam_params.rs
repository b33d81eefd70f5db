// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use counter::Counter;
use itertools::Itertools;
use rust_htslib::bam::{self, FetchDefinition, Read as BamRead};

use crate::reads::{DefaultReadFilter, Read, ReadFilter, SampleKind};

/// Number of alignments inspected when learning the library parameters.
pub const NUM_RECORDS: usize = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsertSize {
    pub mean: f64,
    pub sd: f64,
}

/// Library parameters of one sample, learned from its first alignments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BamParams {
    pub read_len: u32,
    pub mean_read_len: f64,
    /// Mean per-base coverage over the inspected span.
    pub mean_coverage: f64,
    /// Fraction of reads passing the evidence rules.
    pub frac_weird: f64,
    pub insert_size: Option<InsertSize>,
    pub max_mapq: u8,
    pub num_reads: usize,
}

impl Default for BamParams {
    fn default() -> Self {
        BamParams {
            read_len: 101,
            mean_read_len: 101.0,
            mean_coverage: 30.0,
            frac_weird: 0.0,
            insert_size: None,
            max_mapq: 60,
            num_reads: 0,
        }
    }
}

impl BamParams {
    /// Estimate from the first `num_records` usable alignments of the file.
    /// Only reads that are mapped with nonzero MAPQ, not duplicates and
    /// where quality checks passed are taken.
    pub fn estimate(path: impl AsRef<Path>, num_records: Option<usize>) -> Result<Self> {
        let mut bam = bam::IndexedReader::from_path(path.as_ref())
            .with_context(|| format!("Unable to open indexed BAM {}.", path.as_ref().display()))?;
        bam.fetch(FetchDefinition::All)?;
        let mut reads = Vec::new();
        for record in bam.records() {
            let record = record?;
            if record.mapq() == 0
                || record.is_duplicate()
                || record.is_quality_check_failed()
                || record.is_unmapped()
            {
                continue;
            }
            reads.push(Read::from_record(&record, SampleKind::Tumor, None));
            if reads.len() >= num_records.unwrap_or(NUM_RECORDS) {
                break;
            }
        }
        Ok(Self::from_reads(&reads))
    }

    /// Load previously stored parameters (JSON).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Unable to read BAM parameters from {}.", path.as_ref().display())
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn from_reads(reads: &[Read]) -> Self {
        if reads.is_empty() {
            warn!(
                "Found no usable alignments to learn the library parameters from. \
                 Falling back to defaults."
            );
            return BamParams::default();
        }
        let read_len = reads.iter().map(|r| r.seq.len() as u32).max().unwrap_or(0);
        let mean_read_len =
            reads.iter().map(|r| r.seq.len()).sum::<usize>() as f64 / reads.len() as f64;
        let max_mapq = reads.iter().map(|r| r.mapq).max().unwrap_or(0);

        let filter = DefaultReadFilter::for_read_length(read_len as usize);
        let n_weird = reads.iter().filter(|r| filter.matches(r, None)).count();

        // span covered per chromosome
        let mut spans: HashMap<u32, (u64, u64)> = HashMap::new();
        for read in reads {
            if let Some(region) = read.region() {
                let span = spans.entry(region.tid).or_insert((region.start, region.end));
                span.0 = span.0.min(region.start);
                span.1 = span.1.max(region.end);
            }
        }
        let span: u64 = spans.values().map(|(start, end)| end - start).sum();
        let aligned: u64 = reads.iter().map(|r| r.seq.len() as u64).sum();
        let mean_coverage = if span > 0 {
            aligned as f64 / span as f64
        } else {
            0.0
        };

        let insert_size = estimate_insert_size(reads);
        if insert_size.is_none() {
            let orientations: Counter<(bool, bool)> = reads
                .iter()
                .map(|r| (r.is_paired(), r.is_mate_unmapped()))
                .collect();
            warn!(
                "Found no records to use for estimating the insert size. \
                 Paired reads with mapped mate: {}, without: {}, unpaired: {}.",
                orientations[&(true, false)],
                orientations[&(true, true)],
                orientations[&(false, true)] + orientations[&(false, false)],
            );
        }

        BamParams {
            read_len,
            mean_read_len,
            mean_coverage,
            frac_weird: n_weird as f64 / reads.len() as f64,
            insert_size,
            max_mapq,
            num_reads: reads.len(),
        }
    }
}

/// Mean and standard deviation of the absolute insert sizes of first mates
/// with both ends on the same chromosome, ignoring the outer 5% quantiles.
fn estimate_insert_size(reads: &[Read]) -> Option<InsertSize> {
    let mut tlens = reads
        .iter()
        .filter(|r| {
            r.is_paired()
                && r.flags & 0x40 != 0
                && !r.is_mate_unmapped()
                && r.mate_tid == r.tid
                && r.insert_size != 0
        })
        .map(|r| r.insert_size.abs() as f64)
        .collect_vec();
    if tlens.is_empty() {
        return None;
    }
    tlens.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let quantile = |q: f64| tlens[((tlens.len() - 1) as f64 * q).round() as usize];
    let (lower, upper) = (quantile(0.05), quantile(0.95));
    let valid = tlens
        .iter()
        .copied()
        .filter(|l| *l >= lower && *l <= upper)
        .collect_vec();
    let mean = valid.iter().sum::<f64>() / valid.len() as f64;
    let sd = if valid.len() > 1 {
        (valid.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / (valid.len() - 1) as f64).sqrt()
    } else {
        0.0
    };
    Some(InsertSize { mean, sd })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reads::tests::cigar;

    #[test]
    fn test_from_reads() {
        let mut reads = Vec::new();
        for i in 0..100u64 {
            let cig = if i % 10 == 0 { "20S80M" } else { "100M" };
            let mate_pos = i * 10 + 200 + (i % 3) * 10;
            reads.push(
                Read::mapped(&format!("r{}", i), SampleKind::Tumor, 0, i * 10, cigar(cig), &[b'A'; 100])
                    .paired_with(Some(0), mate_pos, true, true),
            );
        }
        let params = BamParams::from_reads(&reads);
        assert_eq!(params.read_len, 100);
        assert_eq!(params.num_reads, 100);
        assert_relative_eq!(params.frac_weird, 0.1);
        // 100 reads of 100 bases over a span of 1090 bases
        assert_relative_eq!(params.mean_coverage, 10_000.0 / 1090.0);
        let isize = params.insert_size.unwrap();
        assert_relative_eq!(isize.mean.round(), 310.0);
    }

    #[test]
    fn test_json_roundtrip_load() {
        let params = BamParams::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        fs::write(&path, serde_json::to_string(&params).unwrap()).unwrap();
        assert_eq!(BamParams::load(&path).unwrap(), params);
    }

    #[test]
    fn test_empty_falls_back_to_defaults() {
        assert_eq!(BamParams::from_reads(&[]), BamParams::default());
    }
}
