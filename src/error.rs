// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// PCI ID database error
#[derive(Debug, Error)]
pub enum Error {
    /// Every discovery candidate failed to open. The last underlying
    /// failure is retained as the source for diagnostics.
    #[error(
        "no PCI ID database found; set PCIID_BIN or PCIID_TEXT, install hwdata, or allow bundled data"
    )]
    NotFound { source: Option<Box<Error>> },
    /// The file is not a usable binary database: bad magic, unsupported
    /// version, a section inconsistent with its length, or a corrupt
    /// string block.
    #[error("invalid database format: {0}")]
    InvalidFormat(String),
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt or empty text database")]
    Parse,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
