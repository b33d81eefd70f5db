// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Local de novo assembly of the evidence reads of a window.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::errors::Error;
use crate::reads::Read;

pub mod greedy;

pub use greedy::GreedyAssembler;

/// Lowest error tolerance of the bootstrap round when more than one round is
/// run.
const BOOTSTRAP_ERROR_RATE: f64 = 0.05;
const MIN_DEFAULT_OVERLAP: usize = 30;

/// Overlap assembler over plain sequences.
pub trait Assembler: Send + Sync {
    fn assemble(
        &self,
        sequences: &[Vec<u8>],
        error_rate: f64,
        min_overlap: usize,
    ) -> Result<Vec<Vec<u8>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, new)]
pub struct AssemblyParams {
    pub error_rate: f64,
    /// Minimum overlap; 40% of the mean read length, at least 30, if `None`.
    pub min_overlap: Option<usize>,
    pub mean_read_length: usize,
    pub rounds: usize,
}

impl AssemblyParams {
    pub fn min_overlap(&self) -> usize {
        self.min_overlap
            .unwrap_or_else(|| {
                ((self.mean_read_length as f64 * 0.4) as usize).max(MIN_DEFAULT_OVERLAP)
            })
            .max(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContig {
    pub name: String,
    pub seq: Vec<u8>,
}

/// Runs an `Assembler` over the reads of a window: optional partitioning by
/// barcode, the round schedule and contig naming.
pub struct AssemblyEngine<'a> {
    assembler: &'a dyn Assembler,
    params: AssemblyParams,
    by_barcode: bool,
}

impl<'a> AssemblyEngine<'a> {
    pub fn new(assembler: &'a dyn Assembler, params: AssemblyParams, by_barcode: bool) -> Self {
        AssemblyEngine {
            assembler,
            params,
            by_barcode,
        }
    }

    /// Assemble `reads` of the window named `name`. Contigs are named
    /// `<name>C<i>`, with the barcode spliced in as `BX_<code>` for
    /// barcode partitioned assembly.
    pub fn assemble(&self, name: &str, reads: &[&Read]) -> Result<Vec<AssembledContig>> {
        let mut partitions: BTreeMap<String, Vec<Vec<u8>>> = BTreeMap::new();
        for read in reads {
            let key = if self.by_barcode {
                format!("BX_{}", read.barcode.as_deref().unwrap_or("Default"))
            } else {
                String::new()
            };
            partitions
                .entry(key)
                .or_default()
                .push(read.assembly_seq().to_vec());
        }

        let mut contigs = Vec::new();
        for (key, sequences) in partitions {
            let instance = format!("{}{}", name, key);
            for (i, seq) in self.run_rounds(&instance, &sequences)?.into_iter().enumerate() {
                contigs.push(AssembledContig {
                    name: format!("{}C{}", instance, i),
                    seq,
                });
            }
        }
        Ok(contigs)
    }

    fn run_rounds(&self, instance: &str, sequences: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        let min_overlap = self.params.min_overlap();
        let rounds = self.params.rounds.max(1);
        let mut contigs: Vec<Vec<u8>> = Vec::new();
        for round in 0..rounds {
            let error_rate = if rounds > 1 && round == 0 {
                self.params.error_rate.max(BOOTSTRAP_ERROR_RATE)
            } else {
                self.params.error_rate
            };
            let mut input = contigs.clone();
            input.extend(sequences.iter().cloned());
            contigs = self
                .assembler
                .assemble(&input, error_rate, min_overlap)
                .map_err(|e| Error::AssemblyFailed {
                    window: instance.to_owned(),
                    msg: e.to_string(),
                })?;
            debug!(
                "Assembly round {} of {} yielded {} contigs from {} sequences.",
                round + 1,
                instance,
                contigs.len(),
                sequences.len()
            );
        }
        Ok(contigs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reads::tests::cigar;
    use crate::reads::SampleKind;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use std::sync::Mutex;

    struct FailingAssembler;

    /// Records the error rate of every call and returns its input.
    #[derive(Default)]
    struct RecordingAssembler {
        error_rates: Mutex<Vec<f64>>,
    }

    impl Assembler for RecordingAssembler {
        fn assemble(&self, sequences: &[Vec<u8>], error_rate: f64, _: usize) -> Result<Vec<Vec<u8>>> {
            self.error_rates.lock().unwrap().push(error_rate);
            Ok(sequences[..1].to_vec())
        }
    }

    impl Assembler for FailingAssembler {
        fn assemble(&self, _: &[Vec<u8>], _: f64, _: usize) -> Result<Vec<Vec<u8>>> {
            Err(anyhow::anyhow!("out of memory"))
        }
    }

    fn tiled_reads(barcode: Option<&str>, seed: u64) -> (Vec<u8>, Vec<Read>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let genome: Vec<u8> = (0..250).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect();
        let reads = (0..=150)
            .step_by(25)
            .map(|s| {
                let mut read = Read::mapped(
                    &format!("{}{}", seed, s),
                    SampleKind::Tumor,
                    0,
                    s as u64,
                    cigar("100M"),
                    &genome[s..s + 100],
                );
                read.barcode = barcode.map(str::to_owned);
                read
            })
            .collect();
        (genome, reads)
    }

    #[test]
    fn test_engine_names_contigs() {
        let (genome, reads) = tiled_reads(None, 7);
        let reads: Vec<_> = reads.iter().collect();
        let assembler = GreedyAssembler::default();
        let engine = AssemblyEngine::new(&assembler, AssemblyParams::new(0.0, None, 100, 2), false);
        let contigs = engine.assemble("c_1_0_1000", &reads).unwrap();
        assert_eq!(
            contigs,
            vec![AssembledContig {
                name: "c_1_0_1000C0".to_owned(),
                seq: genome
            }]
        );
    }

    #[test]
    fn test_engine_partitions_by_barcode() {
        let (_, mut reads) = tiled_reads(Some("AAAC"), 8);
        reads.extend(tiled_reads(None, 9).1);
        let reads: Vec<_> = reads.iter().collect();
        let assembler = GreedyAssembler::default();
        let engine = AssemblyEngine::new(&assembler, AssemblyParams::new(0.0, None, 100, 1), true);
        let names: Vec<_> = engine
            .assemble("c_2_100_200", &reads)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["c_2_100_200BX_AAACC0", "c_2_100_200BX_DefaultC0"]);
    }

    #[test]
    fn test_assembly_failure_is_an_error() {
        let (_, reads) = tiled_reads(None, 10);
        let reads: Vec<_> = reads.iter().collect();
        let engine = AssemblyEngine::new(
            &FailingAssembler,
            AssemblyParams::new(0.0, None, 100, 1),
            false,
        );
        assert!(engine.assemble("w", &reads).is_err());
    }

    #[test]
    fn test_bootstrap_round_is_never_stricter() {
        let (_, reads) = tiled_reads(None, 11);
        let reads: Vec<_> = reads.iter().collect();
        for &(error_rate, expected) in &[(0.01, [0.05, 0.01, 0.01]), (0.1, [0.1, 0.1, 0.1])] {
            let assembler = RecordingAssembler::default();
            let engine = AssemblyEngine::new(
                &assembler,
                AssemblyParams::new(error_rate, None, 100, 3),
                false,
            );
            engine.assemble("w", &reads).unwrap();
            assert_eq!(*assembler.error_rates.lock().unwrap(), expected.to_vec());
        }

        // a single round uses the configured rate
        let assembler = RecordingAssembler::default();
        let engine = AssemblyEngine::new(&assembler, AssemblyParams::new(0.0, None, 100, 1), false);
        engine.assemble("w", &reads).unwrap();
        assert_eq!(*assembler.error_rates.lock().unwrap(), vec![0.0]);
    }
}
