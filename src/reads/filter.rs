// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use crate::genome::Region;
use crate::reads::Read;

/// Adapter prefix; clipped reads containing it are library artifacts.
const ADAPTER: &[u8] = b"AGATCGGAAGAGC";

/// Decides which reads carry potential variant evidence.
pub trait ReadFilter: Send + Sync {
    fn matches(&self, read: &Read, window: Option<&Region>) -> bool;
}

/// Default evidence rules. A read has to pass the global exclusions and then
/// qualify through at least one of: discordant pair, soft clip, indel, mapped
/// read with unmapped mate or unmapped read with mapped mate.
#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned")]
pub struct DefaultReadFilter {
    /// Minimum length after quality trimming.
    min_length: usize,
    #[builder(default = "1200")]
    max_insert_size: i64,
    #[builder(default = "10")]
    min_clip: u32,
    #[builder(default = "4")]
    min_trim_qual: u8,
    #[builder(default = "1")]
    min_indel_mapq: u8,
    #[builder(default = "true")]
    adapter_trim: bool,
    /// Reads containing any of these sequences are excluded.
    #[builder(default)]
    motifs: Vec<Vec<u8>>,
    /// Only discordant pairs qualify.
    #[builder(default = "false")]
    discordant_only: bool,
}

impl DefaultReadFilter {
    /// Rules for a library with the given read length.
    pub fn for_read_length(read_len: usize) -> Self {
        DefaultReadFilter {
            min_length: (read_len as f64 * 0.8) as usize,
            max_insert_size: 1200,
            min_clip: 10,
            min_trim_qual: 4,
            min_indel_mapq: 1,
            adapter_trim: true,
            motifs: Vec::new(),
            discordant_only: false,
        }
    }

    pub fn max_insert_size(&self) -> i64 {
        self.max_insert_size
    }

    /// Exclusions applied before any rule: duplicates, QC failures, hard
    /// clipped, secondary and short reads.
    pub fn passes_global(&self, read: &Read) -> bool {
        !(read.is_duplicate()
            || read.is_qc_fail()
            || read.is_secondary()
            || read.has_hard_clip()
            || read.trimmed_len(self.min_trim_qual) < self.min_length)
    }

    fn has_adapter(&self, read: &Read) -> bool {
        read.soft_clip_len() > 0 && read.seq.windows(ADAPTER.len()).any(|w| w == ADAPTER)
    }

    fn has_motif(&self, read: &Read) -> bool {
        self.motifs
            .iter()
            .any(|motif| read.seq.windows(motif.len()).any(|w| w == motif.as_slice()))
    }
}

impl ReadFilter for DefaultReadFilter {
    fn matches(&self, read: &Read, _window: Option<&Region>) -> bool {
        if !self.passes_global(read) {
            return false;
        }
        if self.adapter_trim && self.has_adapter(read) {
            return false;
        }
        if self.has_motif(read) {
            return false;
        }
        let discordant = read.is_discordant(self.max_insert_size);
        if self.discordant_only {
            return discordant;
        }
        let mapped = !read.is_unmapped();
        let mate_mapped = read.is_paired() && !read.is_mate_unmapped();
        discordant
            || (mapped && read.soft_clip_len() >= self.min_clip)
            || (mapped && read.max_insertion() > 0)
            || (mapped && read.max_deletion() > 0 && read.mapq >= self.min_indel_mapq)
            || (mapped && read.is_paired() && !mate_mapped && read.mapq >= 1)
            || (!mapped && mate_mapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reads::tests::cigar;
    use crate::reads::SampleKind;

    fn read(cig: &str) -> Read {
        Read::mapped("r", SampleKind::Tumor, 0, 1000, cigar(cig), &[b'A'; 100])
            .paired_with(Some(0), 1200, true, true)
    }

    #[test]
    fn test_default_rules() {
        let filter = DefaultReadFilter::for_read_length(100);
        assert!(!filter.matches(&read("100M"), None));
        assert!(filter.matches(&read("20S80M"), None));
        assert!(!filter.matches(&read("5S95M"), None));
        assert!(filter.matches(&read("50M3I47M"), None));
        assert!(filter.matches(&read("50M3D50M"), None));
        assert!(!filter.matches(&read("50M3D50M").with_mapq(0), None));
        assert!(!filter.matches(&read("20H80M"), None));
        assert!(!filter.matches(&read("20S80M").with_flags(0x400), None));

        let far = Read::mapped("f", SampleKind::Tumor, 0, 1000, cigar("100M"), &[b'A'; 100])
            .paired_with(Some(0), 9000, true, true);
        assert!(filter.matches(&far, None));

        let lonely = Read::mapped("l", SampleKind::Tumor, 0, 1000, cigar("100M"), &[b'A'; 100])
            .paired_with(None, 0, false, true);
        assert!(filter.matches(&lonely, None));

        let unmapped = Read::unmapped("u", SampleKind::Tumor, &[b'A'; 100], Some((0, 1000)));
        assert!(filter.matches(&unmapped, None));
    }

    #[test]
    fn test_short_and_adapter_reads() {
        let filter = DefaultReadFilterBuilder::default()
            .min_length(80)
            .adapter_trim(true)
            .build()
            .unwrap();
        let short = Read::mapped("s", SampleKind::Tumor, 0, 10, cigar("20S40M"), &[b'A'; 60]);
        assert!(!filter.matches(&short, None));

        let mut seq = vec![b'C'; 100];
        seq[..ADAPTER.len()].copy_from_slice(ADAPTER);
        let adapter = Read::mapped("a", SampleKind::Tumor, 0, 10, cigar("20S80M"), &seq);
        assert!(!filter.matches(&adapter, None));
        // trimming is on unless disabled
        assert!(!DefaultReadFilter::for_read_length(100).matches(&adapter, None));
        let untrimmed = DefaultReadFilterBuilder::default()
            .min_length(80)
            .adapter_trim(false)
            .build()
            .unwrap();
        assert!(untrimmed.matches(&adapter, None));
    }

    #[test]
    fn test_motif_exclusion() {
        let filter = DefaultReadFilterBuilder::default()
            .min_length(80)
            .motifs(vec![b"TTAGGGTTAGGG".to_vec(), b"GGAATGGAAT".to_vec()])
            .build()
            .unwrap();
        let mut seq = vec![b'C'; 100];
        seq[40..52].copy_from_slice(b"TTAGGGTTAGGG");
        let telomeric = Read::mapped("t", SampleKind::Tumor, 0, 10, cigar("20S80M"), &seq);
        assert!(!filter.matches(&telomeric, None));

        // motifs exclude reads regardless of clipping
        let mut seq = vec![b'C'; 100];
        seq[0..10].copy_from_slice(b"GGAATGGAAT");
        let satellite = Read::mapped("s", SampleKind::Tumor, 0, 10, cigar("50M3D50M"), &seq);
        assert!(!filter.matches(&satellite, None));

        let clean = Read::mapped("c", SampleKind::Tumor, 0, 10, cigar("20S80M"), &[b'C'; 100]);
        assert!(filter.matches(&clean, None));
    }

    #[test]
    fn test_discordant_only() {
        let filter = DefaultReadFilterBuilder::default()
            .min_length(80)
            .discordant_only(true)
            .build()
            .unwrap();
        assert!(!filter.matches(&read("20S80M"), None));
        let far = Read::mapped("f", SampleKind::Tumor, 0, 1000, cigar("100M"), &[b'A'; 100])
            .paired_with(Some(2), 9000, true, true);
        assert!(filter.matches(&far, None));
    }
}
