// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Database discovery. Builds an ordered candidate list from the
//! environment (plus an optional explicit path), tries each in order and
//! returns the first reader that opens. The order encodes two
//! preferences: a caller-supplied source beats everything, and binary
//! beats text within the same source tier.

use crate::binary::BinaryDb;
use crate::bundled::{bundled_bin, bundled_text, stage_resource};
use crate::error::{Error, Result};
use crate::facade::PciDb;
use crate::format::MAGIC;
use crate::text::TextDb;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where distributions install hwdata files.
pub const SYSTEM_DATA_DIR: &str = "/usr/share/hwdata";

const ENV_BIN: &str = "PCIID_BIN";
const ENV_TEXT: &str = "PCIID_TEXT";
const ENV_NO_SYSTEM: &str = "PCIID_NO_SYSTEM";
const ENV_NO_BUNDLED: &str = "PCIID_NO_BUNDLED";

/// Inputs to candidate resolution, split out from the process
/// environment so the ordering logic stays a pure function.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub explicit_path: Option<PathBuf>,
    pub env_bin: Option<PathBuf>,
    pub env_text: Option<PathBuf>,
    pub system_bin: PathBuf,
    pub system_text: PathBuf,
    pub allow_system: bool,
    pub allow_bundled: bool,
}

impl DiscoveryConfig {
    pub fn from_env(explicit_path: Option<&Path>) -> Self {
        let suppressed = |var: &str| std::env::var_os(var).is_some_and(|v| v == "1");
        DiscoveryConfig {
            explicit_path: explicit_path.map(Path::to_path_buf),
            env_bin: std::env::var_os(ENV_BIN).map(PathBuf::from),
            env_text: std::env::var_os(ENV_TEXT).map(PathBuf::from),
            system_bin: Path::new(SYSTEM_DATA_DIR).join("pci.ids.bin"),
            system_text: Path::new(SYSTEM_DATA_DIR).join("pci.ids"),
            allow_system: !suppressed(ENV_NO_SYSTEM),
            allow_bundled: !suppressed(ENV_NO_BUNDLED),
        }
    }
}

/// One potential database source. Failure of a candidate's opener never
/// aborts enumeration.
struct Candidate {
    kind: &'static str,
    reference: String,
    opener: Box<dyn FnOnce() -> Result<Box<dyn PciDb>>>,
}

/// First four bytes equal the canonical magic. Any read failure counts
/// as "not binary".
fn probe_is_binary(path: &Path) -> bool {
    let mut sig = [0u8; 4];
    match File::open(path).and_then(|mut f| f.read_exact(&mut sig)) {
        Ok(()) => sig == MAGIC.to_le_bytes(),
        Err(_) => false,
    }
}

fn resolve_candidates(config: DiscoveryConfig) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = Vec::new();

    // An explicit path is the whole list: probe its magic and open it as
    // whichever flavor it looks like, with no fallback.
    if let Some(path) = config.explicit_path {
        candidates.push(Candidate {
            kind: "path-auto",
            reference: path.display().to_string(),
            opener: Box::new(move || {
                if probe_is_binary(&path) {
                    Ok(Box::new(BinaryDb::open(&path)?) as Box<dyn PciDb>)
                } else {
                    Ok(Box::new(TextDb::open(&path)?) as Box<dyn PciDb>)
                }
            }),
        });
        return candidates;
    }

    if let Some(path) = config.env_bin {
        candidates.push(Candidate {
            kind: "env-bin",
            reference: path.display().to_string(),
            opener: Box::new(move || {
                if !probe_is_binary(&path) {
                    return Err(Error::InvalidFormat(format!(
                        "{ENV_BIN} is not a valid binary database: {}",
                        path.display()
                    )));
                }
                Ok(Box::new(BinaryDb::open(&path)?) as Box<dyn PciDb>)
            }),
        });
    }

    if let Some(path) = config.env_text {
        candidates.push(Candidate {
            kind: "env-text",
            reference: path.display().to_string(),
            opener: Box::new(move || Ok(Box::new(TextDb::open(&path)?) as Box<dyn PciDb>)),
        });
    }

    if config.allow_system {
        let path = config.system_bin;
        candidates.push(Candidate {
            kind: "sys-bin",
            reference: path.display().to_string(),
            opener: Box::new(move || Ok(Box::new(BinaryDb::open(&path)?) as Box<dyn PciDb>)),
        });
    }

    if config.allow_bundled
        && let Some(bytes) = bundled_bin()
    {
        candidates.push(Candidate {
            kind: "bundled-bin",
            reference: "<bundled>/pci.ids.bin".into(),
            opener: Box::new(move || {
                let staged = stage_resource(bytes)?;
                Ok(Box::new(BinaryDb::open_staged(staged)?) as Box<dyn PciDb>)
            }),
        });
    }

    if config.allow_system {
        let path = config.system_text;
        candidates.push(Candidate {
            kind: "sys-text",
            reference: path.display().to_string(),
            opener: Box::new(move || Ok(Box::new(TextDb::open(&path)?) as Box<dyn PciDb>)),
        });
    }

    if config.allow_bundled
        && let Some(bytes) = bundled_text()
    {
        candidates.push(Candidate {
            kind: "bundled-text",
            reference: "<bundled>/pci.ids".into(),
            opener: Box::new(move || {
                let staged = stage_resource(bytes)?;
                Ok(Box::new(TextDb::open_staged(staged)?) as Box<dyn PciDb>)
            }),
        });
    }

    candidates
}

/// Open a database from an explicit resolved configuration.
pub fn open_with_config(config: DiscoveryConfig) -> Result<Box<dyn PciDb>> {
    let mut last_err: Option<Error> = None;
    for candidate in resolve_candidates(config) {
        debug!(
            kind = candidate.kind,
            reference = %candidate.reference,
            "trying database candidate"
        );
        match (candidate.opener)() {
            Ok(db) => {
                debug!(kind = candidate.kind, reference = %candidate.reference, "database opened");
                return Ok(db);
            }
            Err(err) => {
                debug!(
                    kind = candidate.kind,
                    reference = %candidate.reference,
                    %err,
                    "candidate failed"
                );
                last_err = Some(err);
            }
        }
    }
    Err(Error::NotFound {
        source: last_err.map(Box::new),
    })
}

/// Open a database, selecting the source from `path` and the process
/// environment per the preference order described in the module docs.
pub fn open_db(path: Option<&Path>) -> Result<Box<dyn PciDb>> {
    open_with_config(DiscoveryConfig::from_env(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, compile_file};
    use crate::facade::DbKind;
    use std::fs;

    const SAMPLE: &str = "\
8086  Intel Corporation
\t1237  440FX - 82441FX PMC
C 06  Bridge
\t04  PCI bridge
";

    fn fixtures(dir: &Path) -> (PathBuf, PathBuf) {
        let text = dir.join("pci.ids");
        fs::write(&text, SAMPLE).unwrap();
        let bin = dir.join("pci.ids.bin");
        compile_file(&text, &bin, &CompileOptions::default()).unwrap();
        (text, bin)
    }

    fn config(dir: &Path) -> DiscoveryConfig {
        DiscoveryConfig {
            explicit_path: None,
            env_bin: None,
            env_text: None,
            system_bin: dir.join("no-such-system.bin"),
            system_text: dir.join("no-such-system.ids"),
            allow_system: false,
            allow_bundled: false,
        }
    }

    #[test]
    fn env_bin_beats_env_text() {
        let dir = tempfile::tempdir().unwrap();
        let (text, bin) = fixtures(dir.path());
        let db = open_with_config(DiscoveryConfig {
            env_bin: Some(bin),
            env_text: Some(text),
            ..config(dir.path())
        })
        .unwrap();
        assert_eq!(db.kind(), DbKind::Binary);
    }

    #[test]
    fn env_bin_with_bad_magic_is_never_opened_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let (text, _) = fixtures(dir.path());
        // env-bin points at a text file: its candidate fails the magic
        // probe and discovery moves on to env-text.
        let db = open_with_config(DiscoveryConfig {
            env_bin: Some(text.clone()),
            env_text: Some(text),
            ..config(dir.path())
        })
        .unwrap();
        assert_eq!(db.kind(), DbKind::Text);
    }

    #[test]
    fn env_bin_bad_magic_alone_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (text, _) = fixtures(dir.path());
        let err = open_with_config(DiscoveryConfig {
            env_bin: Some(text),
            ..config(dir.path())
        })
        .unwrap_err();
        assert!(matches!(err, Error::NotFound { source: Some(_) }));
    }

    #[test]
    fn explicit_path_probes_magic() {
        let dir = tempfile::tempdir().unwrap();
        let (text, bin) = fixtures(dir.path());
        let db = open_with_config(DiscoveryConfig {
            explicit_path: Some(bin),
            ..config(dir.path())
        })
        .unwrap();
        assert_eq!(db.kind(), DbKind::Binary);
        let db = open_with_config(DiscoveryConfig {
            explicit_path: Some(text),
            ..config(dir.path())
        })
        .unwrap();
        assert_eq!(db.kind(), DbKind::Text);
    }

    #[test]
    fn explicit_path_failure_does_not_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let (_, bin) = fixtures(dir.path());
        // A perfectly good env-bin is ignored once an explicit path is
        // given.
        let err = open_with_config(DiscoveryConfig {
            explicit_path: Some(dir.path().join("nonexistent")),
            env_bin: Some(bin),
            ..config(dir.path())
        })
        .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn system_bin_beats_system_text() {
        let dir = tempfile::tempdir().unwrap();
        let (text, bin) = fixtures(dir.path());
        let db = open_with_config(DiscoveryConfig {
            system_bin: bin,
            system_text: text,
            allow_system: true,
            ..config(dir.path())
        })
        .unwrap();
        assert_eq!(db.kind(), DbKind::Binary);
    }

    #[test]
    fn all_candidates_exhausted_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_with_config(config(dir.path())).unwrap_err();
        assert!(matches!(err, Error::NotFound { source: None }));
        let err = open_with_config(DiscoveryConfig {
            allow_system: true,
            ..config(dir.path())
        })
        .unwrap_err();
        assert!(matches!(err, Error::NotFound { source: Some(_) }));
    }

    #[test]
    fn staged_resource_lives_and_dies_with_the_reader() {
        let dir = tempfile::tempdir().unwrap();
        let (_, bin) = fixtures(dir.path());
        let staged = stage_resource(&fs::read(&bin).unwrap()).unwrap();
        let staged_path = staged.path().to_path_buf();
        let db = BinaryDb::open_staged(staged).unwrap();
        assert!(staged_path.exists());
        assert_eq!(
            db.vendor_name(0x8086).unwrap().as_deref(),
            Some("Intel Corporation")
        );
        Box::new(db).close().unwrap();
        assert!(!staged_path.exists());
    }
}
