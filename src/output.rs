// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Output streams of a run. All files share the prefix `<out_dir>/<analysis id>`.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bio::alphabets::dna;
use rust_htslib::bam::{self, header::HeaderRecord, record::CigarString};
use rust_htslib::bgzf;

use crate::alignment::Alignment;
use crate::calling::breakpoint::Breakpoint;
use crate::calling::discordant::DiscordantCluster;
use crate::calling::region::RegionResult;
use crate::genome::SequenceDictionary;

/// Discordant clusters are reported if one side reaches this mean mapq.
const MIN_DISCORDANT_MAPQ: f64 = 5.0;

const ALIGNMENTS: &str = "alignments.txt";
const BREAKPOINTS: &str = "bps.txt";
const DISCORDANT: &str = "discordant.txt";
const CIGARMAP: &str = "cigarmap.txt";
const BAD_REGIONS: &str = "bad_regions.bed";
const CONTIGS_BAM: &str = "contigs.bam";
const MICROBE_BAM: &str = "microbe.bam";

/// A contig alignment waiting to be written to a BAM file.
#[derive(Debug, Clone)]
struct ContigRecord {
    tid: u32,
    pos: u64,
    qname: String,
    cigar: CigarString,
    seq: Vec<u8>,
    mapq: u8,
    flags: u16,
}

impl ContigRecord {
    fn new(aln: &Alignment, contig_seq: &[u8]) -> Self {
        let mut flags = 0;
        if aln.reverse {
            flags |= 0x10;
        }
        if aln.secondary {
            flags |= 0x100;
        }
        if aln.supplementary {
            flags |= 0x800;
        }
        ContigRecord {
            tid: aln.tid,
            pos: aln.pos,
            qname: aln.query_name.clone(),
            cigar: aln.cigar.clone(),
            seq: if aln.reverse {
                dna::revcomp(contig_seq)
            } else {
                contig_seq.to_vec()
            },
            mapq: aln.mapq,
            flags,
        }
    }

    fn to_bam(&self) -> bam::Record {
        let mut record = bam::Record::new();
        let qual = vec![255u8; self.seq.len()];
        record.set(self.qname.as_bytes(), Some(&self.cigar), &self.seq, &qual);
        record.set_tid(self.tid as i32);
        record.set_pos(self.pos as i64);
        record.set_mapq(self.mapq);
        record.set_flags(self.flags);
        record.set_mtid(-1);
        record.set_mpos(-1);
        record.set_insert_size(0);
        record
    }
}

/// The files written by a run. Text streams are appended per region and
/// compressed with bgzf on `finish` if requested. Contig alignments are
/// collected and written as coordinate sorted BAM files on `finish`.
pub struct OutputSinks {
    prefix: PathBuf,
    gzip: bool,
    read_tracking: bool,
    write_contig_bam: bool,
    alignments: Box<dyn Write + Send>,
    breakpoints: Box<dyn Write + Send>,
    discordant: Box<dyn Write + Send>,
    cigars: Box<dyn Write + Send>,
    bad_regions: Box<dyn Write + Send>,
    human_targets: Vec<(String, u64)>,
    microbe_targets: Vec<(String, u64)>,
    contig_records: Vec<ContigRecord>,
    microbe_records: Vec<ContigRecord>,
}

impl OutputSinks {
    /// Create all text streams and write their headers.
    /// `microbe_targets` are the sequences of the microbial reference, if any.
    pub fn create(
        prefix: &Path,
        dict: &SequenceDictionary,
        microbe_targets: Vec<(String, u64)>,
        gzip: bool,
        read_tracking: bool,
        write_contig_bam: bool,
    ) -> Result<Self> {
        if let Some(dir) = prefix.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Unable to create output directory {}.", dir.display()))?;
            }
        }
        let open = |suffix: &str| -> Result<Box<dyn Write + Send>> {
            let path = suffixed(prefix, suffix);
            let file = File::create(&path)
                .with_context(|| format!("Unable to create output file {}.", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        };
        let mut sinks = OutputSinks {
            prefix: prefix.to_owned(),
            gzip,
            read_tracking,
            write_contig_bam,
            alignments: open(ALIGNMENTS)?,
            breakpoints: open(BREAKPOINTS)?,
            discordant: open(DISCORDANT)?,
            cigars: open(CIGARMAP)?,
            bad_regions: open(BAD_REGIONS)?,
            human_targets: dict.iter().map(|(_, name, len)| (name.to_owned(), len)).collect(),
            microbe_targets,
            contig_records: Vec::new(),
            microbe_records: Vec::new(),
        };
        writeln!(sinks.breakpoints, "{}", Breakpoint::header())?;
        writeln!(
            sinks.discordant,
            "chr1\tpos1\tstrand1\tchr2\tpos2\tstrand2\ttcount\tncount\tmapq1\tmapq2\tcontig\treads"
        )?;
        writeln!(sinks.cigars, "chr\tpos\ttype\tlen\ttumor\tnormal")?;
        Ok(sinks)
    }

    pub fn path(&self, suffix: &str) -> PathBuf {
        suffixed(&self.prefix, suffix)
    }

    /// Append everything `result` contributes to the outputs.
    pub fn write(&mut self, result: &RegionResult, dict: &SequenceDictionary) -> Result<()> {
        for contig in result.contigs() {
            if contig.has_variant() {
                write!(self.alignments, "{}", contig.plot(result.reads()))?;
            }
            if self.write_contig_bam {
                self.contig_records.extend(
                    contig
                        .alignments
                        .iter()
                        .map(|aln| ContigRecord::new(aln, &contig.seq)),
                );
                self.microbe_records.extend(
                    contig
                        .microbe_alignments
                        .iter()
                        .map(|aln| ContigRecord::new(aln, &contig.seq)),
                );
            }
        }

        for breakpoint in result.breakpoints() {
            writeln!(self.breakpoints, "{}", breakpoint.to_record(self.read_tracking))?;
        }

        for cluster in result.discordant() {
            if cluster.mapq1.max(cluster.mapq2) >= MIN_DISCORDANT_MAPQ {
                writeln!(
                    self.discordant,
                    "{}",
                    discordant_record(cluster, dict, self.read_tracking)?
                )?;
            }
        }

        for count in result.cigars() {
            writeln!(
                self.cigars,
                "{}\t{}\t{}\t{}\t{}\t{}",
                dict.name(count.key.tid)?,
                count.key.pos + 1,
                if count.key.deletion { 'D' } else { 'I' },
                count.key.len,
                count.tumor,
                count.normal
            )?;
        }

        for region in result.bad_regions() {
            writeln!(
                self.bad_regions,
                "{}\t{}\t{}",
                dict.name(region.tid)?,
                region.start,
                region.end
            )?;
        }

        for sink in self.text_sinks() {
            sink.flush()?;
        }
        Ok(())
    }

    fn text_sinks(&mut self) -> [&mut Box<dyn Write + Send>; 5] {
        [
            &mut self.alignments,
            &mut self.breakpoints,
            &mut self.discordant,
            &mut self.cigars,
            &mut self.bad_regions,
        ]
    }

    /// Flush and close all streams, compress the text streams if requested
    /// and write the contig BAM files.
    pub fn finish(mut self) -> Result<()> {
        for sink in self.text_sinks() {
            sink.flush()?;
        }
        let OutputSinks {
            prefix,
            gzip,
            write_contig_bam,
            alignments,
            breakpoints,
            discordant,
            cigars,
            bad_regions,
            human_targets,
            microbe_targets,
            contig_records,
            microbe_records,
            ..
        } = self;
        drop((alignments, breakpoints, discordant, cigars, bad_regions));

        if gzip {
            for suffix in &[ALIGNMENTS, BREAKPOINTS, DISCORDANT, CIGARMAP, BAD_REGIONS] {
                compress(&suffixed(&prefix, suffix))?;
            }
        }
        if write_contig_bam {
            write_bam(&suffixed(&prefix, CONTIGS_BAM), &human_targets, contig_records)?;
            if !microbe_targets.is_empty() {
                write_bam(&suffixed(&prefix, MICROBE_BAM), &microbe_targets, microbe_records)?;
            }
        }
        Ok(())
    }
}

fn suffixed(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn discordant_record(
    cluster: &DiscordantCluster,
    dict: &SequenceDictionary,
    read_tracking: bool,
) -> Result<String> {
    let strand = |reverse: bool| if reverse { '-' } else { '+' };
    let (pos1, _) = cluster.breakend1();
    let (pos2, _) = cluster.breakend2();
    Ok(format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.1}\t{:.1}\t{}\t{}",
        dict.name(cluster.region1.tid)?,
        pos1 + 1,
        strand(cluster.reverse1),
        dict.name(cluster.region2.tid)?,
        pos2 + 1,
        strand(cluster.reverse2),
        cluster.tumor_count,
        cluster.normal_count,
        cluster.mapq1,
        cluster.mapq2,
        cluster.contig.as_deref().unwrap_or("."),
        if read_tracking {
            cluster.reads.join(",")
        } else {
            ".".to_owned()
        }
    ))
}

/// Replace `path` by its bgzf compressed version `path.gz`.
fn compress(path: &Path) -> Result<()> {
    let target = suffixed(path, "gz");
    {
        let mut reader = BufReader::new(
            File::open(path).with_context(|| format!("Unable to read {}.", path.display()))?,
        );
        let mut writer = bgzf::Writer::from_path(&target)
            .with_context(|| format!("Unable to create {}.", target.display()))?;
        loop {
            let buf = reader.fill_buf()?;
            if buf.is_empty() {
                break;
            }
            let len = buf.len();
            writer.write_all(buf)?;
            reader.consume(len);
        }
        writer.flush()?;
    }
    fs::remove_file(path)?;
    Ok(())
}

fn write_bam(path: &Path, targets: &[(String, u64)], mut records: Vec<ContigRecord>) -> Result<()> {
    let mut header = bam::Header::new();
    let mut hd = HeaderRecord::new(b"HD");
    hd.push_tag(b"VN", &"1.6");
    hd.push_tag(b"SO", &"coordinate");
    header.push_record(&hd);
    for (name, len) in targets {
        let mut sq = HeaderRecord::new(b"SQ");
        sq.push_tag(b"SN", name);
        sq.push_tag(b"LN", &(*len as i64));
        header.push_record(&sq);
    }
    let mut writer = bam::Writer::from_path(path, &header, bam::Format::Bam)
        .with_context(|| format!("Unable to create BAM file {}.", path.display()))?;
    records.sort_by(|a, b| (a.tid, a.pos, &a.qname).cmp(&(b.tid, b.pos, &b.qname)));
    for record in &records {
        writer.write(&record.to_bam())?;
    }
    Ok(())
}

