//! Logging setup: `camera_hub/src/main.rs` just calls `env_logger::init()`
//! and lets `RUST_LOG` drive verbosity. Here `--verbose` raises the default
//! filter to `debug` and `--logfile` redirects output to a file instead of
//! stderr, since this appliance is meant to run unattended.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::fs::OpenOptions;

use env_logger::{Builder, Target};
use log::LevelFilter;

pub fn init(verbose: bool, logfile: Option<&str>) -> anyhow::Result<()> {
    let mut builder = Builder::from_default_env();

    if verbose {
        builder.filter_level(LevelFilter::Debug);
    } else {
        builder.filter_level(LevelFilter::Info);
    }

    if let Some(path) = logfile {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init().or_else(|e| {
        // Logging may already be installed by a test harness running in the
        // same process; that's not a start-up failure.
        log::debug!("logger already initialised: {e}");
        Ok(())
    })
}
