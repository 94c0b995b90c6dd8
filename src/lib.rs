// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Readers and a compiler for the PCI ID database.
//!
//! The plaintext `pci.ids` database maps numeric PCI identifiers to
//! human-readable names. This crate compiles it into a self-describing,
//! randomly addressable binary file ([`compile_file`]), answers point
//! lookups from either representation behind one trait ([`PciDb`]), and
//! picks a source at open time ([`open_db`]): an explicit path beats
//! environment overrides, which beat system and bundled files, with
//! binary preferred over text within each tier.
//!
//! ```no_run
//! # fn main() -> Result<(), pciid::Error> {
//! let db = pciid::open_db(None)?;
//! if let Some(name) = db.vendor_name(0x8086)? {
//!     println!("{name}");
//! }
//! println!("{}", db.describe_device_best_effort(0x10de, 0x1234, Some(0x030000))?);
//! # Ok(())
//! # }
//! ```

mod binary;
mod blocks;
mod bundled;
mod compiler;
mod discovery;
mod error;
mod facade;
pub mod format;
mod interner;
mod parser;
mod text;

pub use binary::BinaryDb;
pub use compiler::{CompileOptions, compile_file, compile_to};
pub use discovery::{DiscoveryConfig, SYSTEM_DATA_DIR, open_db, open_with_config};
pub use error::{Error, Result};
pub use facade::{DbKind, PciDb};
pub use parser::{ParsedDb, parse_pci_ids};
pub use text::TextDb;
