// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

/// Run-wide settings. Built once from the command line and shared read-only
/// by all workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default)]
pub struct Config {
    pub analysis_id: String,
    pub threads: usize,
    /// Width of the work chunks; zero or less processes the genome in one go.
    pub chunk_size: i64,
    /// Padding around chunks and assembly windows.
    pub window_pad: u64,
    /// Width of the assembly subwindows within a chunk.
    pub assembly_window: u64,
    /// Reads beyond this coverage at a read start are not kept.
    pub max_coverage: u32,
    pub mate_lookup_min: usize,
    pub mate_region_pad: u64,
    pub min_mate_mapq: u8,
    pub discordant_insert_size: i64,
    pub error_rate: f64,
    pub min_overlap: Option<usize>,
    pub assembly_rounds: usize,
    /// Aux tag holding the barcode reads are partitioned by before assembly.
    pub assemble_by_tag: Option<String>,
    pub no_assemble_normal: bool,
    pub discordant_only: bool,
    pub exome: bool,
    /// Drop reads overlapping normal bad regions before assembly.
    pub exclude_bad_regions: bool,
    pub adapter_trim: bool,
    /// Reads containing any of these sequences are ignored.
    pub motifs: Vec<String>,
    pub kmer_correction: bool,
    pub min_contig_match: u32,
    pub contig_secondary_frac: f64,
    pub contig_max_secondary: usize,
    pub read_secondary_frac: f64,
    pub read_max_secondary: usize,
    pub microbe_min_match: u32,
    pub microbe_min_mapq: u8,
    pub max_microbe_human_overlap: usize,
    /// Chunks with more reads than this many per base are skipped.
    pub max_reads_per_base: usize,
    pub seed_len: usize,
    pub gzip: bool,
    pub read_tracking: bool,
    pub write_contig_bam: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            analysis_id: "no_id".to_owned(),
            threads: 1,
            chunk_size: 1_000_000,
            window_pad: 500,
            assembly_window: 25_000,
            max_coverage: 100,
            mate_lookup_min: 3,
            mate_region_pad: 250,
            min_mate_mapq: 1,
            discordant_insert_size: 1200,
            error_rate: 0.0,
            min_overlap: None,
            assembly_rounds: 2,
            assemble_by_tag: None,
            no_assemble_normal: false,
            discordant_only: false,
            exome: false,
            exclude_bad_regions: false,
            adapter_trim: true,
            motifs: Vec::new(),
            kmer_correction: true,
            min_contig_match: 35,
            contig_secondary_frac: 0.9,
            contig_max_secondary: 25,
            read_secondary_frac: 0.6,
            read_max_secondary: 10_000,
            microbe_min_match: 50,
            microbe_min_mapq: 10,
            max_microbe_human_overlap: 20,
            max_reads_per_base: 20,
            seed_len: 15,
            gzip: false,
            read_tracking: false,
            write_contig_bam: true,
        }
    }
}

impl Config {
    /// Mate regions need fewer supporting reads in discordant-only mode.
    pub fn mate_lookup_threshold(&self) -> usize {
        if self.discordant_only {
            2
        } else {
            self.mate_lookup_min
        }
    }
}
