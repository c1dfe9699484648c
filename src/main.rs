// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 rhythmcache

mod cli;

use clap::Parser;

fn main() {
    let cli = cli::Cli::parse();
    if let Err(e) = cli::run(cli) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
