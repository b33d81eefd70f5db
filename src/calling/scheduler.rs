// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use anyhow::Result;

use crate::calling::config::Config;
use crate::calling::region::{RegionCaller, Resources};
use crate::errors::Error;
use crate::genome::region::partition;
use crate::genome::{Region, SequenceDictionary};
use crate::output::OutputSinks;
use crate::utils::worker_pool;

/// One chunk of the genome, processed by a single worker. `None` is the
/// whole genome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub index: usize,
    pub region: Option<Region>,
    label: String,
}

impl WorkItem {
    fn new(index: usize, region: Option<Region>, dict: &SequenceDictionary) -> Self {
        let label = match region {
            Some(region) => match dict.name(region.tid) {
                Ok(name) => format!("{}:{}-{}", name, region.start + 1, region.end),
                Err(_) => region.to_string(),
            },
            None => "whole genome".to_owned(),
        };
        WorkItem {
            index,
            region,
            label,
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "region {} ({})", self.index, self.label)
    }
}

/// Chunks to process. Without explicit regions, every chromosome of `dict`
/// is a target. Targets wider than a positive `chunk_size` are partitioned
/// into padded chunks, which requires `2 * pad <= chunk_size`. With neither
/// regions nor a positive chunk size, or if nothing remains, the single item
/// is the whole genome.
pub fn work_items(
    regions: &[Region],
    dict: &SequenceDictionary,
    chunk_size: i64,
    pad: u64,
) -> Result<Vec<WorkItem>> {
    if chunk_size > 0 {
        check_padding(chunk_size as u64, pad)?;
    }
    if regions.is_empty() && chunk_size <= 0 {
        return Ok(vec![WorkItem::new(0, None, dict)]);
    }
    let targets: Vec<Region> = if regions.is_empty() {
        dict.iter()
            .filter(|(_, _, len)| *len > 0)
            .map(|(tid, _, len)| Region::new(tid, 0, len))
            .collect()
    } else {
        regions.to_vec()
    };
    let chunks: Vec<Region> = if chunk_size > 0 {
        targets
            .iter()
            .flat_map(|target| partition(target, chunk_size as u64, pad))
            .collect()
    } else {
        targets
    };
    if chunks.is_empty() {
        return Ok(vec![WorkItem::new(0, None, dict)]);
    }
    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(index, region)| WorkItem::new(index, Some(region), dict))
        .collect())
}

/// Adjacent chunks only overlap by twice the padding if no core is narrower
/// than the padding.
fn check_padding(chunk_size: u64, pad: u64) -> Result<()> {
    if 2 * pad > chunk_size {
        return Err(Error::InvalidPadding { pad, chunk_size }.into());
    }
    Ok(())
}

/// Process all chunks with a fixed pool of workers and write their results
/// to `sinks`. A failing chunk is logged and counted, the others proceed.
/// Returns the number of failed chunks.
pub fn run(
    config: &Config,
    resources: &Resources,
    regions: &[Region],
    sinks: OutputSinks,
) -> Result<usize> {
    if config.threads == 0 {
        return Err(Error::InvalidThreadCount {
            threads: config.threads,
        }
        .into());
    }
    if !resources.samples.iter().any(|sample| sample.kind.is_tumor()) {
        return Err(Error::NoSamples.into());
    }

    check_padding(config.assembly_window, config.window_pad)?;
    let items = work_items(
        regions,
        &resources.dict,
        config.chunk_size,
        config.window_pad,
    )?;
    let total = items.len();
    let threads = config.threads.min(total);
    info!("Processing {} regions with {} threads.", total, threads);

    let start = Instant::now();
    let caller = RegionCaller::new(config, resources);
    let sinks = Mutex::new(sinks);
    let mut breakpoints = 0;
    let failures = worker_pool(
        items,
        threads,
        threads,
        |item| {
            let result = caller.call(item.region.as_ref())?;
            // a region is written as a whole, the guard is released on every exit
            let mut sinks = sinks.lock().unwrap_or_else(PoisonError::into_inner);
            sinks.write(&result, &resources.dict)?;
            Ok(*result.stats())
        },
        |processed| {
            for (done, stats) in processed.iter().enumerate() {
                breakpoints += stats.breakpoints;
                info!(
                    "Processed {}/{} regions ({} breakpoints so far).",
                    done + 1,
                    total,
                    breakpoints
                );
            }
            Ok(())
        },
    )?;

    sinks
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .finish()?;

    if failures > 0 {
        warn!("{} of {} regions failed, see the errors above.", failures, total);
    }
    info!(
        "Done after {:.1}s: {} breakpoints.",
        start.elapsed().as_secs_f64(),
        breakpoints
    );
    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> SequenceDictionary {
        SequenceDictionary::new(vec![
            ("1".to_owned(), 1_000_000),
            ("2".to_owned(), 500_000),
        ])
    }

    #[test]
    fn test_whole_genome_single_item() {
        let items = work_items(&[], &dict(), 0, 500).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].region, None);
        assert_eq!(items[0].to_string(), "region 0 (whole genome)");
    }

    #[test]
    fn test_chromosomes_are_chunked() {
        let items = work_items(&[], &dict(), 400_000, 500).unwrap();
        let regions: Vec<_> = items.iter().map(|item| item.region.unwrap()).collect();
        assert_eq!(
            regions,
            vec![
                Region::new(0, 0, 333_834),
                Region::new(0, 332_834, 667_167),
                Region::new(0, 666_167, 1_000_000),
                Region::new(1, 0, 250_500),
                Region::new(1, 249_500, 500_000),
            ]
        );
        assert!(items.iter().enumerate().all(|(i, item)| item.index == i));
        assert_eq!(items[1].to_string(), "region 1 (1:332835-667167)");
    }

    #[test]
    fn test_padding_wider_than_half_a_chunk_is_rejected() {
        let err = work_items(&[], &dict(), 1000, 600).unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::InvalidPadding {
                pad: 600,
                chunk_size: 1000
            })
        );
        // without chunking the padding is not used
        assert!(work_items(&[], &dict(), -1, 600).is_ok());
    }

    #[test]
    fn test_explicit_regions_without_chunking() {
        let regions = vec![Region::new(1, 100, 900_000), Region::new(0, 5, 10)];
        let items = work_items(&regions, &dict(), -1, 500).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].region, Some(Region::new(1, 100, 900_000)));
        assert_eq!(items[1].region, Some(Region::new(0, 5, 10)));
    }

    #[test]
    fn test_chunks_cover_region() {
        let region = Region::new(0, 1000, 25_000);
        let items = work_items(&[region], &dict(), 3000, 100).unwrap();
        let chunks: Vec<_> = items.iter().map(|item| item.region.unwrap()).collect();
        assert_eq!(chunks.first().unwrap().start, 1000);
        assert_eq!(chunks.last().unwrap().end, 25_000);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 200);
            assert!(pair[0].width() <= 3200);
        }
    }
}
