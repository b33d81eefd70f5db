// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use rust_htslib::bgzf;

use crate::calling::breakpoint::Breakpoint;
use crate::errors::Error;
use crate::utils::genomics::normalize_chrom;

/// Chromosome (without "chr" prefix), 1-based position, deletion, length.
type PonKey = (String, u64, bool, u32);

/// Indels recurrently seen in normal samples. One record per line:
/// `CHROM POS D|I LEN COUNT` (tab separated, `POS` 1-based, `#` starts a
/// comment line). Plain or bgzip compressed.
#[derive(Debug, Clone, Default)]
pub struct PanelOfNormals {
    sites: HashMap<PonKey, usize>,
}

impl PanelOfNormals {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = bgzf::Reader::from_path(path)
            .with_context(|| format!("Unable to read panel of normals {}.", path.display()))?;
        let pon = Self::from_reader(BufReader::new(reader))?;
        info!(
            "Loaded {} panel of normals sites from {}.",
            pon.len(),
            path.display()
        );
        Ok(pon)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut sites = HashMap::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let invalid = |msg: &str| Error::InvalidPonRecord {
                line: i + 1,
                msg: msg.to_owned(),
            };
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 5 {
                return Err(invalid("expected 5 tab separated fields").into());
            }
            let pos: u64 = fields[1].parse().map_err(|_| invalid("invalid position"))?;
            let deletion = match fields[2] {
                "D" => true,
                "I" => false,
                _ => return Err(invalid("indel type has to be D or I").into()),
            };
            let len: u32 = fields[3].parse().map_err(|_| invalid("invalid length"))?;
            let count: usize = fields[4].parse().map_err(|_| invalid("invalid count"))?;
            *sites
                .entry((normalize_chrom(fields[0]), pos, deletion, len))
                .or_insert(0) += count;
        }
        Ok(PanelOfNormals { sites })
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Number of normals carrying the indel of `breakpoint`, 0 for
    /// rearrangements.
    pub fn query(&self, breakpoint: &Breakpoint) -> usize {
        match breakpoint.cigar_key() {
            Some(key) => self
                .sites
                .get(&(
                    normalize_chrom(&breakpoint.b1.chrom),
                    key.pos + 1,
                    key.deletion,
                    key.len,
                ))
                .copied()
                .unwrap_or(0),
            None => 0,
        }
    }
}
