// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::genome::Region;
use crate::reads::{Read, SampleKind};

/// Maximal distance between consecutive read starts within a cluster.
pub const CLUSTER_DISTANCE: u64 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PairEnd {
    tid: u32,
    start: u64,
    end: u64,
    reverse: bool,
    mapq: u8,
}

#[derive(Debug, Clone)]
struct Pair {
    first: PairEnd,
    second: PairEnd,
    sample: SampleKind,
    uid: String,
}

/// Discordant read pairs agreeing in orientation and in the loci of both
/// ends.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscordantCluster {
    pub id: String,
    pub region1: Region,
    pub reverse1: bool,
    pub region2: Region,
    pub reverse2: bool,
    pub tumor_count: usize,
    pub normal_count: usize,
    pub mapq1: f64,
    pub mapq2: f64,
    pub reads: Vec<String>,
    /// Contig whose breakpoint this cluster has been assigned to.
    pub contig: Option<String>,
}

impl DiscordantCluster {
    fn from_pairs(pairs: &[&Pair]) -> Self {
        let span = |ends: Vec<&PairEnd>| {
            Region::new(
                ends[0].tid,
                ends.iter().map(|e| e.start).min().unwrap_or(0),
                ends.iter().map(|e| e.end).max().unwrap_or(0),
            )
        };
        let region1 = span(pairs.iter().map(|p| &p.first).collect());
        let region2 = span(pairs.iter().map(|p| &p.second).collect());
        let reverse1 = pairs[0].first.reverse;
        let reverse2 = pairs[0].second.reverse;
        let mean_mapq = |mapqs: Vec<u8>| {
            mapqs.iter().map(|q| *q as f64).sum::<f64>() / mapqs.len() as f64
        };
        let strand = |reverse: bool| if reverse { '-' } else { '+' };
        DiscordantCluster {
            id: format!(
                "{}:{}{}__{}:{}{}",
                region1.tid,
                region1.start,
                strand(reverse1),
                region2.tid,
                region2.start,
                strand(reverse2)
            ),
            region1,
            reverse1,
            region2,
            reverse2,
            tumor_count: pairs.iter().filter(|p| p.sample.is_tumor()).count(),
            normal_count: pairs.iter().filter(|p| !p.sample.is_tumor()).count(),
            mapq1: mean_mapq(pairs.iter().map(|p| p.first.mapq).collect()),
            mapq2: mean_mapq(pairs.iter().map(|p| p.second.mapq).collect()),
            reads: pairs.iter().map(|p| p.uid.clone()).collect(),
            contig: None,
        }
    }

    pub fn total(&self) -> usize {
        self.tumor_count + self.normal_count
    }

    /// Breakend position and orientation of the first end: reads on the
    /// forward strand point to a junction right of them.
    pub fn breakend1(&self) -> (u64, bool) {
        breakend(&self.region1, self.reverse1)
    }

    pub fn breakend2(&self) -> (u64, bool) {
        breakend(&self.region2, self.reverse2)
    }
}

fn breakend(region: &Region, reverse: bool) -> (u64, bool) {
    if reverse {
        (region.start, true)
    } else {
        (region.end.saturating_sub(1), false)
    }
}

pub type DiscordantClusterMap = BTreeMap<String, DiscordantCluster>;

/// One pair per sample and read name, anchored at its leftmost present end.
fn collect_pairs(reads: &[Read], max_insert_size: i64) -> Vec<Pair> {
    let mut by_name: BTreeMap<(SampleKind, &str), Vec<&Read>> = BTreeMap::new();
    for read in reads {
        if read.is_secondary() || read.is_supplementary() || !read.is_discordant(max_insert_size) {
            continue;
        }
        by_name
            .entry((read.sample, read.qname.as_str()))
            .or_default()
            .push(read);
    }
    by_name
        .into_iter()
        .filter_map(|(_, mut mates)| {
            mates.sort_by_key(|read| (read.tid, read.pos));
            let anchor = mates[0];
            let tid = anchor.tid?;
            let mate_tid = anchor.mate_tid?;
            let first = PairEnd {
                tid,
                start: anchor.pos,
                end: anchor.end(),
                reverse: anchor.is_reverse(),
                mapq: anchor.mapq,
            };
            let second = match mates.get(1) {
                Some(mate) => PairEnd {
                    tid: mate.tid?,
                    start: mate.pos,
                    end: mate.end(),
                    reverse: mate.is_reverse(),
                    mapq: mate.mapq,
                },
                None => PairEnd {
                    tid: mate_tid,
                    start: anchor.mate_pos,
                    end: anchor.mate_pos + anchor.seq.len() as u64,
                    reverse: anchor.is_mate_reverse(),
                    mapq: anchor.mapq,
                },
            };
            let (first, second) = if (second.tid, second.start) < (first.tid, first.start) {
                (second, first)
            } else {
                (first, second)
            };
            Some(Pair {
                first,
                second,
                sample: anchor.sample,
                uid: anchor.uid.clone(),
            })
        })
        .collect()
}

fn split_by_distance<'a, F>(mut pairs: Vec<&'a Pair>, key: F) -> Vec<Vec<&'a Pair>>
where
    F: Fn(&Pair) -> u64,
{
    pairs.sort_by_key(|pair| (key(pair), pair.uid.clone()));
    let mut groups: Vec<Vec<&Pair>> = Vec::new();
    for pair in pairs {
        match groups.last_mut() {
            Some(group)
                if key(pair) - key(group[group.len() - 1]) <= CLUSTER_DISTANCE =>
            {
                group.push(pair)
            }
            _ => groups.push(vec![pair]),
        }
    }
    groups
}

/// Cluster the discordant pairs among `reads` by strand, mate strand and
/// mate chromosome, then by the positions of both ends.
pub fn cluster_reads(reads: &[Read], max_insert_size: i64) -> DiscordantClusterMap {
    let pairs = collect_pairs(reads, max_insert_size);
    let by_orientation = pairs.iter().into_group_map_by(|pair| {
        (
            pair.first.tid,
            pair.first.reverse,
            pair.second.tid,
            pair.second.reverse,
        )
    });

    let mut clusters = DiscordantClusterMap::new();
    for (_, group) in by_orientation.into_iter().sorted_by_key(|(key, _)| *key) {
        for by_first in split_by_distance(group, |pair| pair.first.start) {
            for by_second in split_by_distance(by_first, |pair| pair.second.start) {
                let cluster = DiscordantCluster::from_pairs(&by_second);
                clusters.insert(cluster.id.clone(), cluster);
            }
        }
    }
    clusters
}
