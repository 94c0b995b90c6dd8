// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use clap::Args;
use pciid::{CompileOptions, compile_file};
use std::path::PathBuf;

#[derive(Args)]
pub struct CompileCommand {
    /// Plaintext pci.ids input path
    #[arg(short, long)]
    input: PathBuf,

    /// Binary database output path
    #[arg(short, long)]
    output: PathBuf,

    /// Disable zlib compression of the string blocks
    #[arg(long)]
    no_compress: bool,
}

impl CompileCommand {
    pub fn run(self) -> anyhow::Result<()> {
        compile_file(
            &self.input,
            &self.output,
            &CompileOptions {
                compress: !self.no_compress,
            },
        )?;
        println!(
            "compiled {} -> {}",
            self.input.display(),
            self.output.display()
        );
        Ok(())
    }
}
