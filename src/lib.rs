// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate derive_new;
#[macro_use]
extern crate derive_builder;
#[macro_use]
extern crate strum_macros;
#[macro_use]
extern crate getset;
#[macro_use]
extern crate lazy_static;
#[cfg(test)]
#[macro_use]
extern crate approx;

pub mod alignment;
pub mod assembly;
pub mod calling;
pub mod cli;
pub mod correction;
pub mod errors;
pub mod estimation;
pub mod filtration;
pub mod genome;
pub mod output;
pub mod reads;
pub mod reference;
pub mod utils;
