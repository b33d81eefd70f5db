// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::cmp;
use std::path::Path;

use anyhow::{Context, Result};
use bio::io::bed;

use crate::errors::Error;
use crate::genome::{IntervalSet, Region, SequenceDictionary};

/// Always excluded: chromosome, 0-based start, end.
const BUILTIN_BLACKLIST: &[(&str, u64, u64)] = &[("1", 33_139_670, 33_143_258)];

/// Load the intervals of a BED file. Records on chromosomes unknown to
/// `dict` are skipped. The result is merged and indexed.
pub fn load_bed<P: AsRef<Path>>(path: P, dict: &SequenceDictionary) -> Result<IntervalSet> {
    let path = path.as_ref();
    let mut reader = bed::Reader::from_file(path)
        .with_context(|| format!("Unable to read BED file {}.", path.display()))?;
    let mut intervals = IntervalSet::new();
    let mut skipped = 0;
    for record in reader.records() {
        let record = record.map_err(|e| Error::InvalidBedRecord {
            path: path.to_owned(),
            msg: e.to_string(),
        })?;
        if record.end() < record.start() {
            return Err(Error::InvalidBedRecord {
                path: path.to_owned(),
                msg: format!(
                    "end {} before start {} on {}",
                    record.end(),
                    record.start(),
                    record.chrom()
                ),
            }
            .into());
        }
        match dict.resolve(record.chrom()) {
            Some((tid, len)) => {
                let end = cmp::min(record.end(), len);
                if end > record.start() {
                    intervals.add(Region::new(tid, record.start(), end));
                }
            }
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(
            "Skipped {} records of {} on chromosomes missing from the BAM header.",
            skipped,
            path.display()
        );
    }
    Ok(intervals.merged())
}

/// The regions excluded in every run, as far as present in `dict`.
pub fn builtin_blacklist(dict: &SequenceDictionary) -> IntervalSet {
    BUILTIN_BLACKLIST
        .iter()
        .filter_map(|(chrom, start, end)| {
            dict.resolve(chrom)
                .filter(|(_, len)| len > start)
                .map(|(tid, len)| Region::new(tid, *start, cmp::min(*end, len)))
        })
        .collect::<IntervalSet>()
        .merged()
}

/// Union of the built-in regions and an optional BED file.
pub fn load_blacklist(path: Option<&Path>, dict: &SequenceDictionary) -> Result<IntervalSet> {
    let mut blacklist = builtin_blacklist(dict);
    if let Some(path) = path {
        blacklist.union(&load_bed(path, dict)?);
    }
    Ok(blacklist.merged())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn dict() -> SequenceDictionary {
        SequenceDictionary::new(vec![
            ("chr1".to_owned(), 50_000_000),
            ("chr2".to_owned(), 1_000_000),
        ])
    }

    #[test]
    fn test_load_bed() {
        let mut bed = tempfile::NamedTempFile::new().unwrap();
        writeln!(bed, "chr2\t100\t200").unwrap();
        writeln!(bed, "2\t150\t300").unwrap();
        writeln!(bed, "chrUn\t0\t10").unwrap();
        bed.flush().unwrap();
        let mask = load_bed(bed.path(), &dict()).unwrap();
        assert_eq!(mask.regions(), &[Region::new(1, 100, 300)]);
        assert!(mask.is_indexed());
    }

    #[test]
    fn test_builtin_region_is_always_blacklisted() {
        let blacklist = load_blacklist(None, &dict()).unwrap();
        assert!(blacklist.overlaps(&Region::new(0, 33_140_000, 33_140_001)));
        assert!(!blacklist.overlaps(&Region::new(0, 33_143_258, 33_143_300)));
        let none = builtin_blacklist(&SequenceDictionary::new(vec![("3".to_owned(), 1000)]));
        assert!(none.is_empty());
    }
}
