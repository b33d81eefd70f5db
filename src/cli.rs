// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use structopt::StructOpt;

use crate::alignment::{SeededAligner, StaticIndex, WindowedReferenceIndex};
use crate::assembly::greedy::GreedyAssembler;
use crate::calling::config::{Config, ConfigBuilder};
use crate::calling::region::{Microbes, Resources, Sample};
use crate::calling::scheduler;
use crate::correction::KmerSpectrumCorrector;
use crate::errors::Error;
use crate::estimation::bam_params::BamParams;
use crate::filtration::blacklist::{load_bed, load_blacklist};
use crate::filtration::{DbSnp, PanelOfNormals};
use crate::genome::{IntervalSet, Region, SequenceDictionary};
use crate::output::OutputSinks;
use crate::reads::{BamSource, SampleKind};
use crate::reference::{Buffer, ReferenceSource};

/// Width of the chunks if `--chunk-size chr` is given.
const CHROMOSOME_CHUNK: i64 = 250_000_000;

#[derive(Debug, StructOpt, Serialize, Deserialize, Clone)]
#[structopt(
    name = "svscout",
    about = "Detect somatic structural variants and indels by local assembly of tumor-normal read sets."
)]
#[structopt(setting = structopt::clap::AppSettings::ColoredHelp)]
pub enum Svscout {
    #[structopt(
        name = "run",
        about = "Call structural variants and indels from tumor (and normal) BAM files."
    )]
    #[structopt(setting = structopt::clap::AppSettings::ColoredHelp)]
    Run {
        #[structopt(
            long = "tumor",
            short = "t",
            parse(from_os_str),
            required = true,
            help = "Indexed BAM file with reads from a tumor sample. Can be given multiple times."
        )]
        tumor: Vec<PathBuf>,
        #[structopt(
            long = "normal",
            short = "n",
            parse(from_os_str),
            help = "Indexed BAM file with reads from a normal sample. Can be given multiple times."
        )]
        normal: Vec<PathBuf>,
        #[structopt(
            long = "reference",
            short = "G",
            parse(from_os_str),
            help = "FASTA file with reference genome. Has to be indexed with samtools faidx."
        )]
        reference: PathBuf,
        #[structopt(
            long = "microbes",
            parse(from_os_str),
            help = "FASTA file with microbial sequences contigs are additionally aligned to."
        )]
        microbes: Option<PathBuf>,
        #[structopt(
            long = "region",
            short = "k",
            help = "Region (CHROM or CHROM:START-END) or file with one region per line \
                    (BED if ending in .bed) to restrict calling to."
        )]
        region: Option<String>,
        #[structopt(
            long = "chunk-size",
            default_value = "1000000",
            help = "Width of the chunks the genome is split into. 'chr' processes whole \
                    chromosomes, zero or less the whole genome at once."
        )]
        chunk_size: String,
        #[structopt(
            long = "pad",
            default_value = "500",
            help = "Padding added to both sides of each chunk."
        )]
        pad: u64,
        #[structopt(long = "threads", short = "p", default_value = "1", help = "Number of threads.")]
        threads: usize,
        #[structopt(
            long = "id",
            short = "a",
            default_value = "no_id",
            help = "Analysis id, used as prefix of all output files."
        )]
        id: String,
        #[structopt(
            long = "outdir",
            parse(from_os_str),
            default_value = ".",
            help = "Directory to write the output files to."
        )]
        outdir: PathBuf,
        #[structopt(
            long = "blacklist",
            parse(from_os_str),
            help = "BED file with regions to ignore reads and mate regions in."
        )]
        blacklist: Option<PathBuf>,
        #[structopt(
            long = "indel-mask",
            parse(from_os_str),
            help = "BED file with regions where indel breakpoints are tagged as blacklisted."
        )]
        indel_mask: Option<PathBuf>,
        #[structopt(
            long = "panel-of-normals",
            short = "q",
            parse(from_os_str),
            help = "Panel of normals (CHROM POS D|I LEN COUNT per line, optionally bgzipped)."
        )]
        panel_of_normals: Option<PathBuf>,
        #[structopt(
            long = "dbsnp",
            short = "D",
            parse(from_os_str),
            help = "dbSNP VCF/BCF file to annotate indels with."
        )]
        dbsnp: Option<PathBuf>,
        #[structopt(
            long = "max-coverage",
            default_value = "100",
            help = "Reads beyond this coverage are subsampled."
        )]
        max_coverage: u32,
        #[structopt(
            long = "error-rate",
            short = "e",
            default_value = "0",
            help = "Fraction of mismatches allowed in read overlaps during assembly."
        )]
        error_rate: f64,
        #[structopt(
            long = "min-overlap",
            help = "Minimal read overlap during assembly [default: 40% of the read length, at least 30]."
        )]
        min_overlap: Option<usize>,
        #[structopt(
            long = "assembly-rounds",
            default_value = "2",
            help = "Number of assembly rounds. More than one round bootstraps with a relaxed error rate."
        )]
        assembly_rounds: usize,
        #[structopt(
            long = "assemble-by-tag",
            help = "Assemble reads separately per value of this aux tag (e.g. BX for linked reads)."
        )]
        assemble_by_tag: Option<String>,
        #[structopt(long = "no-assemble-normal", help = "Assemble tumor reads only.")]
        no_assemble_normal: bool,
        #[structopt(
            long = "discordant-only",
            help = "Only cluster discordant read pairs, skip correction and assembly."
        )]
        discordant_only: bool,
        #[structopt(long = "exome", help = "Exome data: do not compute bad region masks.")]
        exome: bool,
        #[structopt(
            long = "no-adapter-trim",
            help = "Keep clipped reads containing adapter sequence."
        )]
        no_adapter_trim: bool,
        #[structopt(
            long = "motif-filter",
            parse(from_os_str),
            help = "File with one sequence per line. Reads containing any of them are ignored."
        )]
        motif_filter: Option<PathBuf>,
        #[structopt(
            long = "exclude-bad-regions",
            help = "Drop reads overlapping regions with anomalous coverage in the normal before assembly."
        )]
        exclude_bad_regions: bool,
        #[structopt(
            long = "no-kmer-correction",
            help = "Assemble the reads as they are."
        )]
        no_kmer_correction: bool,
        #[structopt(
            long = "num-to-sample",
            default_value = "1000000",
            help = "Number of alignments to learn the library parameters from."
        )]
        num_to_sample: usize,
        #[structopt(
            long = "tumor-params",
            parse(from_os_str),
            help = "Library parameters of the tumor samples as JSON, instead of learning them."
        )]
        tumor_params: Option<PathBuf>,
        #[structopt(
            long = "normal-params",
            parse(from_os_str),
            help = "Library parameters of the normal samples as JSON, instead of learning them."
        )]
        normal_params: Option<PathBuf>,
        #[structopt(
            long = "read-tracking",
            help = "Write the names of supporting reads to the breakpoint and discordant records."
        )]
        read_tracking: bool,
        #[structopt(long = "gzip", short = "z", help = "Compress the text outputs with bgzf.")]
        gzip: bool,
        #[structopt(long = "no-contig-bam", help = "Do not write contig alignments as BAM.")]
        no_contig_bam: bool,
        #[structopt(long = "verbose", short = "v", help = "Provide verbose output.")]
        verbose: bool,
    },
}

impl Svscout {
    pub fn verbose(&self) -> bool {
        match self {
            Svscout::Run { verbose, .. } => *verbose,
        }
    }

    /// Output prefix `<outdir>/<id>`.
    pub fn prefix(&self) -> PathBuf {
        match self {
            Svscout::Run { outdir, id, .. } => outdir.join(id),
        }
    }
}

/// Parse the chunk size option, `chr` meaning whole chromosomes.
pub fn parse_chunk_size(value: &str) -> Result<i64> {
    if value == "chr" {
        Ok(CHROMOSOME_CHUNK)
    } else {
        value
            .parse()
            .with_context(|| format!("Invalid chunk size {}, expected a number or 'chr'.", value))
    }
}

/// Regions from a region string or a file with one per line.
pub fn load_regions(spec: &str, dict: &SequenceDictionary) -> Result<Vec<Region>> {
    let path = Path::new(spec);
    if !path.is_file() {
        return Ok(vec![Region::parse(spec, |name| dict.resolve(name))?]);
    }
    if spec.ends_with(".bed") {
        let regions = load_bed(path, dict)?;
        return Ok(regions.regions().to_vec());
    }
    fs::read_to_string(path)
        .with_context(|| format!("Unable to read regions from {}.", spec))?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| Region::parse(line, |name| dict.resolve(name)))
        .collect()
}

/// Sequences of a motif file, one per line, upper cased.
pub fn load_motifs(path: &Path) -> Result<Vec<String>> {
    let motifs: Vec<String> = fs::read_to_string(path)
        .with_context(|| format!("Unable to read motifs from {}.", path.display()))?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_ascii_uppercase)
        .collect();
    info!("Loaded {} motifs from {}.", motifs.len(), path.display());
    Ok(motifs)
}

pub fn est_or_load_bam_params(
    params_file: &Option<impl AsRef<Path>>,
    bam_file: impl AsRef<Path>,
    num_records: usize,
) -> Result<BamParams> {
    if let Some(params_file) = params_file {
        BamParams::load(params_file)
    } else {
        BamParams::estimate(bam_file, Some(num_records))
    }
}

fn check_readable(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::UnreadableInput {
            path: path.to_owned(),
        }
        .into());
    }
    Ok(())
}

pub fn run(opt: Svscout) -> Result<()> {
    match opt {
        Svscout::Run {
            ref tumor,
            ref normal,
            ref reference,
            ref microbes,
            ref region,
            ref chunk_size,
            pad,
            threads,
            ref id,
            ref outdir,
            ref blacklist,
            ref indel_mask,
            ref panel_of_normals,
            ref dbsnp,
            max_coverage,
            error_rate,
            min_overlap,
            assembly_rounds,
            ref assemble_by_tag,
            no_assemble_normal,
            discordant_only,
            exome,
            no_adapter_trim,
            ref motif_filter,
            exclude_bad_regions,
            no_kmer_correction,
            num_to_sample,
            ref tumor_params,
            ref normal_params,
            read_tracking,
            gzip,
            no_contig_bam,
            ..
        } => {
            if tumor.is_empty() {
                return Err(Error::NoSamples.into());
            }
            if threads == 0 {
                return Err(Error::InvalidThreadCount { threads }.into());
            }
            for path in tumor
                .iter()
                .chain(normal)
                .chain(Some(reference))
                .chain(microbes)
                .chain(blacklist)
                .chain(motif_filter)
                .chain(indel_mask)
                .chain(panel_of_normals)
                .chain(dbsnp)
            {
                check_readable(path)?;
            }

            let config: Config = ConfigBuilder::default()
                .analysis_id(id.to_owned())
                .threads(threads)
                .chunk_size(parse_chunk_size(chunk_size)?)
                .window_pad(pad)
                .max_coverage(max_coverage)
                .error_rate(error_rate)
                .min_overlap(min_overlap)
                .assembly_rounds(assembly_rounds)
                .assemble_by_tag(assemble_by_tag.clone())
                .no_assemble_normal(no_assemble_normal)
                .discordant_only(discordant_only)
                .exome(exome)
                .adapter_trim(!no_adapter_trim)
                .motifs(match motif_filter {
                    Some(path) => load_motifs(path)?,
                    None => Vec::new(),
                })
                .exclude_bad_regions(exclude_bad_regions)
                .kmer_correction(!no_kmer_correction)
                .gzip(gzip)
                .read_tracking(read_tracking)
                .write_contig_bam(!no_contig_bam)
                .build()?;
            info!("Configuration: {}", serde_json::to_string(&config)?);

            let dict = SequenceDictionary::from_bam(&tumor[0])?;
            let mut samples = Vec::new();
            for (paths, kind, params_file) in &[
                (tumor, SampleKind::Tumor, tumor_params),
                (normal, SampleKind::Normal, normal_params),
            ] {
                for path in paths.iter() {
                    let params = est_or_load_bam_params(*params_file, path, num_to_sample)?;
                    info!(
                        "Library parameters of {}: {}",
                        path.display(),
                        serde_json::to_string(&params)?
                    );
                    samples.push(Sample {
                        name: path
                            .file_stem()
                            .map_or_else(|| path.display().to_string(), |stem| {
                                stem.to_string_lossy().into_owned()
                            }),
                        kind: *kind,
                        source: Box::new(BamSource::new(
                            path,
                            *kind,
                            config.assemble_by_tag.as_deref(),
                        )?),
                        params,
                    });
                }
            }

            let reference: Arc<dyn ReferenceSource> =
                Arc::new(Buffer::from_path(reference, threads + 1)?);
            let index = WindowedReferenceIndex::new(
                Arc::clone(&reference),
                dict.clone(),
                config.window_pad,
                config.seed_len,
            );
            let microbes = match microbes {
                Some(path) => {
                    info!("Indexing microbial sequences from {}.", path.display());
                    let microbe_reference: Arc<dyn ReferenceSource> =
                        Arc::new(Buffer::from_path(path, threads + 1)?);
                    let aligner =
                        SeededAligner::from_reference(microbe_reference.as_ref(), config.seed_len, "microbe")?;
                    Some(Microbes {
                        index: Box::new(StaticIndex::new(Arc::new(aligner))),
                        reference: microbe_reference,
                    })
                }
                None => None,
            };

            let indel_mask = match indel_mask {
                Some(path) => load_bed(path, &dict)?,
                None => IntervalSet::new(),
            };
            let resources = Resources {
                blacklist: load_blacklist(blacklist.as_deref(), &dict)?,
                indel_mask,
                pon: panel_of_normals
                    .as_ref()
                    .map(PanelOfNormals::from_path)
                    .transpose()?,
                dbsnp: dbsnp.as_ref().map(DbSnp::from_path).transpose()?,
                samples,
                reference,
                index: Box::new(index),
                microbes,
                assembler: Box::new(GreedyAssembler::default()),
                corrector: Box::new(KmerSpectrumCorrector::default()),
                dict,
            };

            let regions = match region {
                Some(spec) => load_regions(spec, &resources.dict)?,
                None => Vec::new(),
            };

            let sinks = OutputSinks::create(
                &outdir.join(id),
                &resources.dict,
                resources
                    .microbes
                    .as_ref()
                    .map(|microbes| microbes.reference.sequences())
                    .unwrap_or_default(),
                config.gzip,
                config.read_tracking,
                config.write_contig_bam,
            )?;
            scheduler::run(&config, &resources, &regions, sinks)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size() {
        assert_eq!(parse_chunk_size("chr").unwrap(), 250_000_000);
        assert_eq!(parse_chunk_size("-1").unwrap(), -1);
        assert!(parse_chunk_size("big").is_err());
    }

    #[test]
    fn test_parse_run() {
        let opt = Svscout::from_iter_safe(&[
            "svscout", "run", "-t", "tumor.bam", "-n", "normal.bam", "-G", "ref.fa", "-p", "4",
            "-a", "test", "--outdir", "out",
        ])
        .unwrap();
        assert_eq!(opt.prefix(), PathBuf::from("out/test"));
        assert!(!opt.verbose());
        match opt {
            Svscout::Run {
                tumor,
                normal,
                threads,
                chunk_size,
                ..
            } => {
                assert_eq!(tumor, vec![PathBuf::from("tumor.bam")]);
                assert_eq!(normal, vec![PathBuf::from("normal.bam")]);
                assert_eq!(threads, 4);
                assert_eq!(chunk_size, "1000000");
            }
        }
    }

    #[test]
    fn test_region_string() {
        let dict = SequenceDictionary::new(vec![("chr1".to_owned(), 10_000)]);
        let regions = load_regions("1:101-200", &dict).unwrap();
        assert_eq!(regions, vec![Region::new(0, 100, 200)]);
    }

    #[test]
    fn test_region_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.txt");
        fs::write(&path, "# targets\n1,1,100\n\n2\n").unwrap();
        let dict = SequenceDictionary::new(vec![("1".to_owned(), 1000), ("2".to_owned(), 500)]);
        let regions = load_regions(path.to_str().unwrap(), &dict).unwrap();
        assert_eq!(regions, vec![Region::new(0, 0, 100), Region::new(1, 0, 500)]);
    }

    #[test]
    fn test_motif_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motifs.txt");
        fs::write(&path, "ttagggttaggg\n\n# satellite\nGGAATGGAAT\n").unwrap();
        let motifs = load_motifs(&path).unwrap();
        assert_eq!(motifs, vec!["TTAGGGTTAGGG".to_owned(), "GGAATGGAAT".to_owned()]);
    }

    #[test]
    fn test_adapter_trim_flag() {
        let opt = Svscout::from_iter_safe(&[
            "svscout", "run", "-t", "tumor.bam", "-G", "ref.fa", "--no-adapter-trim",
            "--motif-filter", "motifs.txt",
        ])
        .unwrap();
        match opt {
            Svscout::Run {
                no_adapter_trim,
                motif_filter,
                ..
            } => {
                assert!(no_adapter_trim);
                assert_eq!(motif_filter, Some(PathBuf::from("motifs.txt")));
            }
        }
    }
}
