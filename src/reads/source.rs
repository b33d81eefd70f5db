// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rust_htslib::bam::{self, FetchDefinition, Read as BamRead};

use crate::errors::Error;
use crate::genome::Region;
use crate::reads::{Read, SampleKind};

/// Region-restricted read iteration over one sample.
pub trait ReadSource {
    /// Restrict iteration to `region`, or to the whole file if `None`.
    fn fetch(&mut self, region: Option<&Region>) -> Result<()>;

    /// The next read of the current fetch, `None` once exhausted.
    fn read(&mut self) -> Option<Result<Read>>;
}

/// Opens an independent `ReadSource` per worker.
pub trait ReadSourceFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn ReadSource>>;
}

/// Indexed BAM/CRAM file.
#[derive(Debug, Clone)]
pub struct BamSource {
    path: PathBuf,
    kind: SampleKind,
    barcode_tag: Option<Vec<u8>>,
}

impl BamSource {
    pub fn new<P: AsRef<Path>>(path: P, kind: SampleKind, barcode_tag: Option<&str>) -> Result<Self> {
        let path = path.as_ref().to_owned();
        if !path.exists() {
            return Err(Error::UnreadableInput { path }.into());
        }
        Ok(BamSource {
            path,
            kind,
            barcode_tag: barcode_tag.map(|tag| tag.as_bytes().to_vec()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReadSourceFactory for BamSource {
    fn open(&self) -> Result<Box<dyn ReadSource>> {
        let reader = bam::IndexedReader::from_path(&self.path)
            .with_context(|| format!("Unable to open indexed BAM {}.", self.path.display()))?;
        Ok(Box::new(BamReadSource {
            reader,
            record: bam::Record::new(),
            kind: self.kind,
            barcode_tag: self.barcode_tag.clone(),
        }))
    }
}

struct BamReadSource {
    reader: bam::IndexedReader,
    record: bam::Record,
    kind: SampleKind,
    barcode_tag: Option<Vec<u8>>,
}

impl ReadSource for BamReadSource {
    fn fetch(&mut self, region: Option<&Region>) -> Result<()> {
        match region {
            Some(region) => self.reader.fetch(FetchDefinition::Region(
                region.tid as i32,
                region.start as i64,
                region.end as i64,
            ))?,
            None => self.reader.fetch(FetchDefinition::All)?,
        }
        Ok(())
    }

    fn read(&mut self) -> Option<Result<Read>> {
        match self.reader.read(&mut self.record) {
            None => None,
            Some(Err(e)) => Some(Err(e.into())),
            Some(Ok(())) => Some(Ok(Read::from_record(
                &self.record,
                self.kind,
                self.barcode_tag.as_deref(),
            ))),
        }
    }
}

/// Reads held in memory, sorted by position. Useful for embedding the caller
/// into other tools and for tests.
#[derive(Debug, Clone)]
pub struct MemorySource {
    reads: Arc<Vec<Read>>,
}

impl MemorySource {
    pub fn new(mut reads: Vec<Read>) -> Self {
        reads.sort_by_key(|read| (read.tid.unwrap_or(u32::MAX), read.pos));
        MemorySource {
            reads: Arc::new(reads),
        }
    }
}

impl ReadSourceFactory for MemorySource {
    fn open(&self) -> Result<Box<dyn ReadSource>> {
        Ok(Box::new(MemoryReadSource {
            reads: Arc::clone(&self.reads),
            selected: Vec::new(),
            cursor: 0,
        }))
    }
}

struct MemoryReadSource {
    reads: Arc<Vec<Read>>,
    selected: Vec<usize>,
    cursor: usize,
}

impl ReadSource for MemoryReadSource {
    fn fetch(&mut self, region: Option<&Region>) -> Result<()> {
        self.selected = self
            .reads
            .iter()
            .enumerate()
            .filter(|(_, read)| match region {
                Some(region) => read.overlaps(region),
                None => true,
            })
            .map(|(i, _)| i)
            .collect();
        self.cursor = 0;
        Ok(())
    }

    fn read(&mut self) -> Option<Result<Read>> {
        let i = *self.selected.get(self.cursor)?;
        self.cursor += 1;
        Some(Ok(self.reads[i].clone()))
    }
}
