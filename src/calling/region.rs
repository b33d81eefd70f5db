// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The per-region pipeline: read extraction with mate rescue, correction,
//! assembly, contig and read realignment and breakpoint calling.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use counter::Counter;

use crate::alignment::{Aligner, ReferenceIndex};
use crate::assembly::{AssembledContig, Assembler, AssemblyEngine, AssemblyParams};
use crate::calling::badness::bad_region_mask;
use crate::calling::breakpoint::{dedup_breakpoints, Breakend, Breakpoint, Confidence};
use crate::calling::config::Config;
use crate::calling::contig::{realign_reads, AlignedContig};
use crate::calling::discordant::{cluster_reads, DiscordantCluster};
use crate::correction::KmerCorrector;
use crate::errors::Error;
use crate::estimation::bam_params::BamParams;
use crate::filtration::{DbSnp, PanelOfNormals};
use crate::genome::region::partition;
use crate::genome::{CoverageTrack, IntervalSet, Region, SequenceDictionary};
use crate::reads::mate_regions::somatic_mate_regions;
use crate::reads::walker::{CigarKey, WalkerParams};
use crate::reads::{
    dedup_reads, DefaultReadFilterBuilder, MateRegions, Read, ReadSourceFactory, RescueWalker,
    SampleKind,
};
use crate::reference::ReferenceSource;

/// Extra contig length required beyond the read length.
const MIN_CONTIG_EXCESS: usize = 30;

/// One input BAM file.
pub struct Sample {
    pub name: String,
    pub kind: SampleKind,
    pub source: Box<dyn ReadSourceFactory>,
    pub params: BamParams,
}

/// Microbial reference and its index.
pub struct Microbes {
    pub index: Box<dyn ReferenceIndex>,
    pub reference: Arc<dyn ReferenceSource>,
}

/// Everything a worker needs besides the configuration. Built once before
/// scheduling and shared read-only by all workers.
pub struct Resources {
    pub dict: SequenceDictionary,
    pub samples: Vec<Sample>,
    pub reference: Arc<dyn ReferenceSource>,
    pub index: Box<dyn ReferenceIndex>,
    pub microbes: Option<Microbes>,
    /// Reads and mate regions here are ignored.
    pub blacklist: IntervalSet,
    /// Breakpoints here are tagged.
    pub indel_mask: IntervalSet,
    pub pon: Option<PanelOfNormals>,
    pub dbsnp: Option<DbSnp>,
    pub assembler: Box<dyn Assembler>,
    pub corrector: Box<dyn KmerCorrector>,
}

impl Resources {
    pub fn has_normal(&self) -> bool {
        self.samples.iter().any(|sample| !sample.kind.is_tumor())
    }

    /// Longest read length over all samples.
    pub fn read_len(&self) -> usize {
        self.samples
            .iter()
            .map(|sample| sample.params.read_len as usize)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegionStats {
    pub tumor_reads: usize,
    pub normal_reads: usize,
    pub mate_reads: usize,
    pub subsampled: usize,
    pub corrected: usize,
    pub contigs: usize,
    pub supported_reads: usize,
    pub discordant_clusters: usize,
    pub breakpoints: usize,
}

/// Indel tally of one locus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarCount {
    pub key: CigarKey,
    pub tumor: usize,
    pub normal: usize,
}

/// Everything one region contributes to the outputs.
#[derive(Debug, Default, Getters)]
#[getset(get = "pub")]
pub struct RegionResult {
    region: Option<Region>,
    breakpoints: Vec<Breakpoint>,
    discordant: Vec<DiscordantCluster>,
    contigs: Vec<AlignedContig>,
    /// Reads with at least one contig hit.
    reads: Vec<Read>,
    cigars: Vec<CigarCount>,
    bad_regions: IntervalSet,
    stats: RegionStats,
}

/// Coverage and indel tallies of one sample class.
#[derive(Default)]
struct ClassEvidence {
    coverage: Vec<CoverageTrack>,
    clip_coverage: Vec<CoverageTrack>,
    cigars: Counter<CigarKey>,
    cigar_positions: Counter<(u32, u64)>,
}

impl ClassEvidence {
    fn coverage_at(&self, tid: u32, pos: u64) -> u32 {
        self.coverage.iter().map(|track| track.at(tid, pos)).sum()
    }

    fn clip_coverage_at(&self, tid: u32, pos: u64) -> u32 {
        self.clip_coverage.iter().map(|track| track.at(tid, pos)).sum()
    }
}

pub struct RegionCaller<'a> {
    config: &'a Config,
    resources: &'a Resources,
}

impl<'a> RegionCaller<'a> {
    pub fn new(config: &'a Config, resources: &'a Resources) -> Self {
        RegionCaller { config, resources }
    }

    /// Run the whole pipeline on `region` (`None` for the whole genome).
    pub fn call(&self, region: Option<&Region>) -> Result<RegionResult> {
        let start = Instant::now();
        let config = self.config;
        let resources = self.resources;
        let mut stats = RegionStats::default();

        let filters = resources
            .samples
            .iter()
            .map(|sample| {
                DefaultReadFilterBuilder::default()
                    .min_length((sample.params.read_len as f64 * 0.8) as usize)
                    .max_insert_size(config.discordant_insert_size)
                    .adapter_trim(config.adapter_trim)
                    .motifs(config.motifs.iter().map(|motif| motif.as_bytes().to_vec()).collect())
                    .discordant_only(config.discordant_only)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;
        let params = WalkerParams::new(
            config.max_coverage,
            config.mate_region_pad,
            config.min_mate_mapq,
        );

        // first pass over the region itself
        let mut walkers = Vec::with_capacity(resources.samples.len());
        for (i, (sample, filter)) in resources.samples.iter().zip(&filters).enumerate() {
            let mut walker = RescueWalker::new(
                sample.source.open()?,
                i,
                filter,
                &resources.blacklist,
                params.clone(),
            );
            walker.extract(&[region.copied()], region)?;
            walkers.push(walker);
        }

        // second pass over the somatic mate regions
        let class_mates = |tumor: bool| {
            MateRegions::merge(
                walkers
                    .iter()
                    .zip(&resources.samples)
                    .filter(|(_, sample)| sample.kind.is_tumor() == tumor)
                    .map(|(walker, _)| &walker.mate_regions),
            )
        };
        let somatic = somatic_mate_regions(
            &class_mates(true),
            &class_mates(false),
            &resources.blacklist,
            &resources.dict,
            config.mate_lookup_threshold(),
        );
        // reads of the window already visited are skipped by the walkers
        let rescue: Vec<Option<Region>> = somatic
            .iter()
            .map(|mate| {
                Some(Region::new(
                    mate.tid,
                    mate.start,
                    resources
                        .dict
                        .length(mate.tid)
                        .map_or(mate.end, |len| mate.end.min(len)),
                ))
            })
            .collect();
        if !rescue.is_empty() {
            debug!("Rescuing mates from {} regions.", rescue.len());
            for walker in &mut walkers {
                walker.start_rescue();
                stats.mate_reads += walker.extract(&rescue, region)?;
            }
        }

        // pool reads and per-class evidence
        let mut tumor = ClassEvidence::default();
        let mut normal = ClassEvidence::default();
        let mut pooled = Vec::new();
        let mut bad_regions = IntervalSet::new();
        for (walker, sample) in walkers.into_iter().zip(&resources.samples) {
            stats.subsampled += walker.subsampled;
            let evidence = if sample.kind.is_tumor() {
                &mut tumor
            } else {
                if bad_regions.is_empty() && !config.exome {
                    if let Some(region) = region {
                        bad_regions = bad_region_mask(
                            region,
                            &walker.weird_coverage,
                            &walker.coverage,
                            &sample.params,
                        );
                    }
                }
                &mut normal
            };
            for (key, count) in walker.cigars.iter() {
                evidence.cigars[key] += *count;
            }
            for (key, count) in walker.cigar_positions.iter() {
                evidence.cigar_positions[key] += *count;
            }
            evidence.coverage.push(walker.coverage);
            evidence.clip_coverage.push(walker.clip_coverage);
            pooled.extend(walker.reads);
        }

        let mut reads = dedup_reads(pooled);
        if config.exclude_bad_regions && !bad_regions.is_empty() {
            reads.retain(|read| read.region().map_or(true, |r| !bad_regions.overlaps(&r)));
        }
        stats.tumor_reads = reads.iter().filter(|read| read.sample.is_tumor()).count();
        stats.normal_reads = reads.len() - stats.tumor_reads;

        let mut clusters = cluster_reads(&reads, config.discordant_insert_size);
        stats.discordant_clusters = clusters.len();

        // assembly and realignment
        let mut contigs = Vec::new();
        if !config.discordant_only && !reads.is_empty() {
            stats.corrected = self.correct(&mut reads, region);
            contigs = self.assemble(&reads, region, &somatic)?;
            stats.supported_reads = realign_reads(&mut contigs, &mut reads, config);
        }
        stats.contigs = contigs.len();

        // breakpoints
        let mut breakpoints = Vec::new();
        for contig in contigs.iter().filter(|contig| contig.has_variant()) {
            for mut breakpoint in contig.breakpoints(resources.reference.as_ref()) {
                breakpoint.add_split_support(&reads);
                breakpoint.add_cigar_support(&tumor.cigars, &normal.cigars, &normal.cigar_positions);
                breakpoint.add_discordant(&mut clusters);
                breakpoints.push(breakpoint);
            }
        }
        for cluster in clusters.values() {
            if cluster.contig.is_none() && cluster.total() >= 2 {
                breakpoints.push(Breakpoint::from_discordant(
                    cluster,
                    resources.dict.name(cluster.region1.tid)?,
                    resources.dict.name(cluster.region2.tid)?,
                ));
            }
        }
        dedup_breakpoints(&mut breakpoints);

        let microbe_reference = resources
            .microbes
            .as_ref()
            .map(|microbes| microbes.reference.as_ref());
        let has_normal = resources.has_normal();
        for breakpoint in &mut breakpoints {
            breakpoint.check_blacklist(&resources.indel_mask);
            if let Some(pon) = &resources.pon {
                breakpoint.pon = pon.query(breakpoint);
            }
            if let Some(dbsnp) = &resources.dbsnp {
                breakpoint.dbsnp = dbsnp.query(breakpoint);
            }
            let anchor: &Breakend = if breakpoint.b1.microbial {
                &breakpoint.b2
            } else {
                &breakpoint.b1
            };
            let (tid, pos) = (anchor.tid, anchor.pos);
            breakpoint.set_coverage(
                tumor.coverage_at(tid, pos),
                normal.coverage_at(tid, pos),
                normal.clip_coverage_at(tid, pos),
            );
            breakpoint.score(has_normal);
            breakpoint.set_alleles(resources.reference.as_ref(), microbe_reference);
            if breakpoint.confidence == Confidence::Pass {
                debug!(
                    "{} {}:{} {}:{} {} tsplit={} nsplit={} tdisc={} ndisc={}",
                    if breakpoint.somatic { "SOM" } else { "GER" },
                    breakpoint.b1.chrom,
                    breakpoint.b1.pos + 1,
                    breakpoint.b2.chrom,
                    breakpoint.b2.pos + 1,
                    breakpoint.kind,
                    breakpoint.support.tumor_split,
                    breakpoint.support.normal_split,
                    breakpoint.support.tumor_discordant,
                    breakpoint.support.normal_discordant
                );
            }
        }
        stats.breakpoints = breakpoints.len();

        let mut cigars: Vec<CigarCount> = tumor
            .cigars
            .keys()
            .chain(normal.cigars.keys())
            .copied()
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .map(|key| CigarCount {
                key,
                tumor: tumor.cigars[&key],
                normal: normal.cigars[&key],
            })
            .collect();
        if let Some(region) = region {
            cigars.retain(|count| region.contains_pos(count.key.tid, count.key.pos));
        }

        debug!(
            "Region {} done in {:.2}s: {}",
            region.map_or_else(|| "genome".to_owned(), |r| r.to_string()),
            start.elapsed().as_secs_f64(),
            serde_json::to_string(&stats)?
        );

        reads.retain(|read| !read.contig_hits.is_empty());
        Ok(RegionResult {
            region: region.copied(),
            breakpoints,
            discordant: clusters.into_iter().map(|(_, cluster)| cluster).collect(),
            contigs,
            reads,
            cigars,
            bad_regions,
            stats,
        })
    }

    /// Kmer correction, restricted to tumor reads if normals are not
    /// assembled. Failures leave the reads uncorrected.
    fn correct(&self, reads: &mut Vec<Read>, region: Option<&Region>) -> usize {
        if !self.config.kmer_correction {
            return 0;
        }
        let result = if self.config.no_assemble_normal {
            reads.sort_by_key(|read| !read.sample.is_tumor());
            let n_tumor = reads.iter().filter(|read| read.sample.is_tumor()).count();
            self.resources.corrector.correct(&mut reads[..n_tumor])
        } else {
            self.resources.corrector.correct(reads)
        };
        match result {
            Ok(corrected) => corrected,
            Err(e) => {
                warn!(
                    "Kmer correction failed for {}, assembling uncorrected reads: {}",
                    region.map_or_else(|| "genome".to_owned(), |r| r.to_string()),
                    e
                );
                0
            }
        }
    }

    /// Windows of `region` to assemble separately.
    fn assembly_windows(&self, region: Option<&Region>) -> Vec<Region> {
        let regions: Vec<Region> = match region {
            Some(region) => vec![*region],
            None => self
                .resources
                .dict
                .iter()
                .map(|(tid, _, len)| Region::new(tid, 0, len))
                .collect(),
        };
        regions
            .iter()
            .flat_map(|region| partition(region, self.config.assembly_window, self.config.window_pad))
            .collect()
    }

    fn assemble(
        &self,
        reads: &[Read],
        region: Option<&Region>,
        somatic_mates: &IntervalSet,
    ) -> Result<Vec<AlignedContig>> {
        let config = self.config;
        let resources = self.resources;
        let read_len = resources.read_len();
        let engine = AssemblyEngine::new(
            resources.assembler.as_ref(),
            AssemblyParams::new(
                config.error_rate,
                config.min_overlap,
                read_len,
                config.assembly_rounds,
            ),
            config.assemble_by_tag.is_some(),
        );

        let mut targets: Vec<Region> = match region {
            Some(region) => vec![*region],
            None => resources
                .dict
                .iter()
                .map(|(tid, _, len)| Region::new(tid, 0, len))
                .collect(),
        };
        targets.extend(somatic_mates.iter().copied());
        let human = resources.index.aligner(&targets)?;
        let microbe = match &resources.microbes {
            Some(microbes) => Some(microbes.index.aligner(&[])?),
            None => None,
        };

        let mut aligned = Vec::new();
        for window in self.assembly_windows(region) {
            if reads.len() as u64 > config.max_reads_per_base as u64 * window.width() {
                warn!(
                    "Skipping assembly of {}: {} reads is too dense.",
                    window,
                    reads.len()
                );
                continue;
            }
            let window_reads: Vec<&Read> = reads
                .iter()
                .filter(|read| !config.no_assemble_normal || read.sample.is_tumor())
                .filter(|read| read.overlaps(&window))
                .collect();
            if window_reads.len() < 2 {
                continue;
            }
            let name = format!("c_{}_{}_{}", window.tid + 1, window.start, window.end);
            let contigs = match engine.assemble(&name, &window_reads) {
                Ok(contigs) => contigs,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };
            for contig in contigs {
                if contig.seq.len() < read_len + MIN_CONTIG_EXCESS {
                    continue;
                }
                if let Some(contig) =
                    self.align_contig(contig, &window, human.as_ref(), microbe.as_deref())
                {
                    aligned.push(contig);
                }
            }
        }
        Ok(aligned)
    }

    fn align_contig(
        &self,
        contig: AssembledContig,
        window: &Region,
        human: &dyn Aligner,
        microbe: Option<&dyn Aligner>,
    ) -> Option<AlignedContig> {
        let config = self.config;
        let align = |aligner: &dyn Aligner| {
            aligner
                .align(
                    &contig.seq,
                    &contig.name,
                    config.contig_secondary_frac,
                    config.contig_max_secondary,
                )
                .map_err(|e| Error::AlignmentFailed {
                    name: contig.name.clone(),
                    msg: e.to_string(),
                })
        };
        let human_alignments = match align(human) {
            Ok(alignments) => alignments,
            Err(e) => {
                warn!("{}", e);
                return None;
            }
        };
        let microbe_alignments = match microbe {
            Some(microbe) if !AlignedContig::is_low_complexity(&contig.seq) => {
                align(microbe).unwrap_or_else(|e| {
                    warn!("{}", e);
                    Vec::new()
                })
            }
            _ => Vec::new(),
        };
        AlignedContig::new(contig, human_alignments, microbe_alignments, window, config)
    }
}
