// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Read-only annotation sources: region masks, the panel of normals and
//! dbSNP. None of them ever removes a breakpoint.

pub mod blacklist;
pub mod dbsnp;
pub mod pon;

pub use dbsnp::DbSnp;
pub use pon::PanelOfNormals;
