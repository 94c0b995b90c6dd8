// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use clap::Args;
use pciid::BinaryDb;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Args)]
pub struct DumpCommand {
    /// Binary database input path
    #[arg(short, long)]
    input: PathBuf,

    /// Plaintext output path; stdout when absent or "-"
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl DumpCommand {
    pub fn run(self) -> anyhow::Result<()> {
        let db = BinaryDb::open(&self.input)?;
        match self.output.as_deref() {
            Some(path) if path.as_os_str() != "-" => {
                let mut out = BufWriter::new(File::create(path)?);
                db.write_text(&mut out)?;
                out.flush()?;
            }
            _ => {
                let stdout = io::stdout();
                let mut out = BufWriter::new(stdout.lock());
                db.write_text(&mut out)?;
                out.flush()?;
            }
        }
        Ok(())
    }
}
