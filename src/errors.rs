// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("input file {path} is not readable or does not exist")]
    UnreadableInput { path: PathBuf },
    #[error("at least one tumor BAM file has to be given with --tumor")]
    NoSamples,
    #[error("invalid number of threads: {threads}, must be at least 1")]
    InvalidThreadCount { threads: usize },
    #[error("padding {pad} is more than half the chunk size {chunk_size}")]
    InvalidPadding { pad: u64, chunk_size: u64 },
    #[error("invalid region '{spec}': use CHROM, CHROM:START-END or CHROM,START,END")]
    InvalidRegion { spec: String },
    #[error("chromosome {name} is not present in the BAM header")]
    UnknownChromosome { name: String },
    #[error("chromosome id {tid} is not present in the BAM header")]
    UnknownChromosomeId { tid: u32 },
    #[error("invalid BED record in {path}: {msg}")]
    InvalidBedRecord { path: PathBuf, msg: String },
    #[error("invalid panel of normals record at line {line}: {msg}")]
    InvalidPonRecord { line: usize, msg: String },
    #[error("assembly of window {window} failed: {msg}")]
    AssemblyFailed { window: String, msg: String },
    #[error("alignment of {name} failed: {msg}")]
    AlignmentFailed { name: String, msg: String },
    #[error("reference sequence {chrom} not found")]
    MissingReferenceSequence { chrom: String },
    #[error("a worker thread panicked")]
    WorkerPanicked,
}

pub(crate) fn invalid_region(spec: &str) -> Error {
    Error::InvalidRegion {
        spec: spec.to_owned(),
    }
}
