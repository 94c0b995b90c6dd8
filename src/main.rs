// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod cli;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let Cli { cmd } = Cli::parse();
    if let Err(e) = cli::process(cmd) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
