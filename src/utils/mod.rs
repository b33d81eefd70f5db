// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use bio::stats::{LogProb, Prob};

pub mod genomics;
pub(crate) mod worker_pool;

pub(crate) use worker_pool::worker_pool;

lazy_static! {
    pub(crate) static ref PROB_05: LogProb = LogProb::from(Prob(0.5f64));
}
