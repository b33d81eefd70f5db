// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

pub mod badness;
pub mod breakpoint;
pub mod config;
pub mod contig;
pub mod discordant;
pub mod region;
pub mod scheduler;

pub use breakpoint::{Breakpoint, Confidence, EvidenceKind};
pub use config::{Config, ConfigBuilder};
pub use region::{Microbes, RegionCaller, RegionResult, Resources, Sample};
pub use scheduler::{run, work_items, WorkItem};
