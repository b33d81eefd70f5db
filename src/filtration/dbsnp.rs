// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rust_htslib::bcf::{self, Read};

use crate::calling::breakpoint::Breakpoint;
use crate::utils::genomics::normalize_chrom;

/// Positions of a breakpoint and a dbSNP indel may differ by this much.
const POSITION_TOLERANCE: u64 = 1;

/// Known indels, keyed like the cigar tallies: chromosome (without "chr"
/// prefix), first deleted base or base following the insertion (0-based),
/// deletion, length.
#[derive(Debug, Clone, Default)]
pub struct DbSnp {
    indels: HashMap<(String, u64, bool, u32), String>,
}

impl DbSnp {
    /// Load the indels of a VCF/BCF file. SNVs and complex records are
    /// ignored.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = bcf::Reader::from_path(path)
            .with_context(|| format!("Unable to read dbSNP file {}.", path.display()))?;
        let mut records = Vec::new();
        for record in reader.records() {
            let record = record?;
            let rid = match record.rid() {
                Some(rid) => rid,
                None => continue,
            };
            let chrom = String::from_utf8_lossy(record.header().rid2name(rid)?).into_owned();
            let id = String::from_utf8_lossy(&record.id()).into_owned();
            let alleles: Vec<Vec<u8>> = record.alleles().iter().map(|a| a.to_vec()).collect();
            if let Some((reference, alts)) = alleles.split_first() {
                for alt in alts {
                    records.push((chrom.clone(), record.pos() as u64, reference.len(), alt.len(), id.clone()));
                }
            }
        }
        let dbsnp = Self::from_records(records);
        info!("Loaded {} dbSNP indels from {}.", dbsnp.len(), path.display());
        Ok(dbsnp)
    }

    /// Build from `(chrom, 0-based pos, ref length, alt length, id)`
    /// records in VCF representation.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = (String, u64, usize, usize, String)>,
    {
        let mut indels = HashMap::new();
        for (chrom, pos, ref_len, alt_len, id) in records {
            if ref_len == alt_len {
                continue;
            }
            let (deletion, len) = if ref_len > alt_len {
                (true, ref_len - alt_len)
            } else {
                (false, alt_len - ref_len)
            };
            indels
                .entry((normalize_chrom(&chrom), pos + 1, deletion, len as u32))
                .or_insert(id);
        }
        DbSnp { indels }
    }

    pub fn len(&self) -> usize {
        self.indels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indels.is_empty()
    }

    /// The id of a known indel matching the indel of `breakpoint`.
    pub fn query(&self, breakpoint: &Breakpoint) -> Option<String> {
        let key = breakpoint.cigar_key()?;
        let chrom = normalize_chrom(&breakpoint.b1.chrom);
        (key.pos.saturating_sub(POSITION_TOLERANCE)..=key.pos + POSITION_TOLERANCE).find_map(|pos| {
            self.indels
                .get(&(chrom.clone(), pos, key.deletion, key.len))
                .cloned()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_records() {
        let dbsnp = DbSnp::from_records(vec![
            ("chr1".to_owned(), 99, 6, 1, "rs1".to_owned()),
            ("1".to_owned(), 200, 1, 1, "rs2".to_owned()),
            ("1".to_owned(), 300, 1, 3, "rs3".to_owned()),
        ]);
        assert_eq!(dbsnp.len(), 2);
        assert_eq!(dbsnp.indels[&("1".to_owned(), 100, true, 5)], "rs1");
        assert_eq!(dbsnp.indels[&("1".to_owned(), 301, false, 2)], "rs3");
    }
}
