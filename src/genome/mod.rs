// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

pub mod coverage;
pub mod dictionary;
pub mod intervals;
pub mod region;

pub use coverage::CoverageTrack;
pub use dictionary::SequenceDictionary;
pub use intervals::IntervalSet;
pub use region::Region;
