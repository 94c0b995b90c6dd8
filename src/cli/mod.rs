// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod compile_cmd;
mod dump_cmd;
mod lookup_cmd;

use clap::Parser;

pub(super) use self::compile_cmd::CompileCommand;
pub(super) use self::dump_cmd::DumpCommand;
pub(super) use self::lookup_cmd::LookupCommand;

/// Work with PCI ID databases: compile the plaintext `pci.ids` into the
/// binary format, reconstruct plaintext from a binary file, and run
/// one-shot lookups against whichever database discovery finds.
#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), version, about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Subcommand,
}

#[derive(clap::Subcommand)]
pub enum Subcommand {
    /// Compile a plaintext pci.ids into a binary database
    Compile(CompileCommand),

    /// Reconstruct plaintext from a binary database
    Dump(DumpCommand),

    /// Look up names in the discovered database
    Lookup(LookupCommand),
}

pub(super) fn process(cmd: Subcommand) -> anyhow::Result<()> {
    match cmd {
        Subcommand::Compile(cmd) => cmd.run(),
        Subcommand::Dump(cmd) => cmd.run(),
        Subcommand::Lookup(cmd) => cmd.run(),
    }
}

/// Hex id argument, with or without a `0x` prefix.
pub(crate) fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex id {s:?}: {e}"))
}

pub(crate) fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid hex id {s:?}: {e}"))
}

/// 24-bit class code like `0x030000`.
pub(crate) fn parse_hex_class_code(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let code = u32::from_str_radix(digits, 16).map_err(|e| format!("invalid class code {s:?}: {e}"))?;
    if code > 0xff_ffff {
        return Err(format!("class code {s:?} wider than 24 bits"));
    }
    Ok(code)
}
