//! genomics.rs
//!
//! Utility functions for genomics-related tasks

/// Strip "chr" prefix, so both "chr1" and "1" normalize to "1".
pub(crate) fn normalize_chrom(chrom: &str) -> String {
    chrom.trim_start_matches("chr").to_string()
}

/// Convert chromosome name to a sortable rank (natural human order)
/// This caters for chromosomes 1-22, X, Y, M/MT only.
pub(crate) fn chrom_rank_checked(chrom: &str) -> Option<u32> {
    let s = normalize_chrom(chrom);
    match s.parse::<u32>() {
        Ok(n @ 1..=22) => Some(n),
        Ok(_) => None,
        Err(_) => match s.as_str() {
            "X" => Some(23),
            "Y" => Some(24),
            "M" | "MT" => Some(25),
            _ => None,
        },
    }
}

/// Primary chromosomes are the autosomes and the sex chromosomes. Mate lookups
/// into decoys, unplaced contigs and the mitochondrion are not attempted.
pub fn is_primary_chrom(chrom: &str) -> bool {
    chrom_rank_checked(chrom).map_or(false, |rank| rank <= 24)
}

/// Length of the repeat stretch required for a sequence to count as low complexity.
const MIN_REPEAT_LEN: usize = 16;

/// Whether `seq` contains a mono- or dinucleotide repeat of at least 16 bases.
pub fn has_simple_repeat(seq: &[u8]) -> bool {
    for period in 1..=2 {
        if seq.len() < MIN_REPEAT_LEN {
            return false;
        }
        let mut run = period;
        for i in period..seq.len() {
            if seq[i].eq_ignore_ascii_case(&seq[i - period]) && seq[i] != b'N' {
                run += 1;
                if run >= MIN_REPEAT_LEN {
                    return true;
                }
            } else {
                run = period;
            }
        }
    }
    false
}
