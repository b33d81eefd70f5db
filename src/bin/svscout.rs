// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs;

use anyhow::{Context, Result};
use structopt::StructOpt;

use svscout::cli::{self, Svscout};

fn setup_logger(opt: &Svscout) -> Result<()> {
    let prefix = opt.prefix();
    if let Some(dir) = prefix.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let mut log_path = prefix.into_os_string();
    log_path.push(".log");

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{}] {}", record.level(), message))
        })
        .level(if opt.verbose() {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .chain(std::io::stderr())
        .chain(
            fern::log_file(&log_path)
                .with_context(|| format!("Unable to create log file {:?}.", log_path))?,
        )
        .apply()?;
    Ok(())
}

pub fn main() -> Result<()> {
    let opt = Svscout::from_args();
    setup_logger(&opt)?;
    cli::run(opt)
}
