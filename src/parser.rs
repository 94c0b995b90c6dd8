// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Streaming parser for the plaintext `pci.ids` grammar.
//!
//! The format is line-oriented and indentation-significant: vendors at
//! column zero, devices behind one tab, subsystems behind two; a `C BB`
//! line switches into the class section where one tab introduces a
//! subclass and two tabs a programming interface. Malformed lines are
//! skipped, never fatal.

use crate::error::Result;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subsystem {
    pub subvendor: u16,
    pub subdevice: u16,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: u16,
    pub name: String,
    pub subsystems: Vec<Subsystem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vendor {
    pub name: String,
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subclass {
    pub name: String,
    pub prog_ifs: BTreeMap<u8, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassBase {
    pub name: String,
    pub subclasses: BTreeMap<u8, Subclass>,
}

/// Intermediate form shared by the compiler and the text reader.
#[derive(Debug, Default, Clone)]
pub struct ParsedDb {
    pub vendors: BTreeMap<u16, Vendor>,
    pub classes: BTreeMap<u8, ClassBase>,
}

impl ParsedDb {
    /// A database with no vendors or no classes is rejected rather than
    /// compiled or served.
    pub fn is_unusable(&self) -> bool {
        self.vendors.is_empty() || self.classes.is_empty()
    }
}

/// Split into whitespace-separated fields, at most `max_fields` of them;
/// the final field keeps its internal whitespace.
fn split_fields(s: &str, max_fields: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() && out.len() + 1 < max_fields {
        match rest.find(char::is_whitespace) {
            Some(i) => {
                out.push(&rest[..i]);
                rest = rest[i..].trim_start();
            }
            None => {
                out.push(rest);
                rest = "";
            }
        }
    }
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

fn hex_u16(tok: &str) -> Option<u16> {
    u16::from_str_radix(tok, 16).ok()
}

fn hex_u8(tok: &str) -> Option<u8> {
    u8::from_str_radix(tok, 16).ok()
}

pub fn parse_pci_ids(path: &Path) -> Result<ParsedDb> {
    parse_pci_ids_reader(BufReader::new(File::open(path)?))
}

pub fn parse_pci_ids_reader<R: BufRead>(mut reader: R) -> Result<ParsedDb> {
    let mut db = ParsedDb::default();

    let mut in_classes = false;
    let mut cur_vendor: Option<u16> = None;
    let mut cur_base: Option<u8> = None;
    let mut cur_sub: Option<u8> = None;
    let mut skipped = 0u64;

    let mut raw = Vec::new();
    let mut line_no = 0u64;
    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            break;
        }
        line_no += 1;
        let lossy = String::from_utf8_lossy(&raw);
        let line = lossy.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // "C BB  Name" opens the class section.
        if line.starts_with("C ") {
            in_classes = true;
            let tok = split_fields(line, 3);
            match (tok.get(1), tok.get(2)) {
                (Some(id), Some(name)) if id.len() <= 2 => {
                    if let Some(base) = hex_u8(id) {
                        db.classes.insert(
                            base,
                            ClassBase {
                                name: (*name).to_owned(),
                                subclasses: BTreeMap::new(),
                            },
                        );
                        cur_base = Some(base);
                        cur_sub = None;
                        continue;
                    }
                    skipped += 1;
                    trace!(line_no, "skipping malformed class line");
                }
                _ => {
                    skipped += 1;
                    trace!(line_no, "skipping malformed class line");
                }
            }
            continue;
        }

        if !in_classes {
            if !line.starts_with('\t') {
                // Vendor: "vvvv  Vendor Name"; anything else at column
                // zero is skipped.
                let tok = split_fields(line, 2);
                if let Some(ven) = tok.first().filter(|t| t.len() == 4).and_then(|t| hex_u16(t)) {
                    db.vendors.insert(
                        ven,
                        Vendor {
                            name: tok.get(1).copied().unwrap_or_default().to_owned(),
                            devices: Vec::new(),
                        },
                    );
                    cur_vendor = Some(ven);
                } else {
                    skipped += 1;
                    trace!(line_no, "skipping malformed vendor line");
                }
                continue;
            }

            if line.starts_with("\t\t") {
                // Subsystem: "\t\tssss dddd  Name" under the current device.
                let tok = split_fields(line.trim(), 3);
                let ids = tok
                    .first()
                    .and_then(|t| hex_u16(t))
                    .zip(tok.get(1).and_then(|t| hex_u16(t)));
                let device = cur_vendor
                    .and_then(|ven| db.vendors.get_mut(&ven))
                    .and_then(|v| v.devices.last_mut());
                match (ids, device) {
                    (Some((subvendor, subdevice)), Some(device)) => {
                        device.subsystems.push(Subsystem {
                            subvendor,
                            subdevice,
                            name: tok.get(2).copied().unwrap_or_default().to_owned(),
                        });
                    }
                    _ => {
                        skipped += 1;
                        trace!(line_no, "skipping orphan or malformed subsystem line");
                    }
                }
                continue;
            }

            // Device: "\tdddd  Device Name" under the current vendor.
            let tok = split_fields(line.trim(), 2);
            let id = tok.first().and_then(|t| hex_u16(t));
            let vendor = cur_vendor.and_then(|ven| db.vendors.get_mut(&ven));
            match (id, vendor) {
                (Some(id), Some(vendor)) => {
                    vendor.devices.push(Device {
                        id,
                        name: tok.get(1).copied().unwrap_or_default().to_owned(),
                        subsystems: Vec::new(),
                    });
                }
                _ => {
                    skipped += 1;
                    trace!(line_no, "skipping orphan or malformed device line");
                }
            }
            continue;
        }

        // Class section.
        if !line.starts_with('\t') {
            // Bare "BB  Name" base line without the `C` marker.
            let tok = split_fields(line, 2);
            match (tok.first().filter(|t| t.len() <= 2), tok.get(1)) {
                (Some(id), Some(name)) => {
                    if let Some(base) = hex_u8(id) {
                        db.classes.insert(
                            base,
                            ClassBase {
                                name: (*name).to_owned(),
                                subclasses: BTreeMap::new(),
                            },
                        );
                        cur_base = Some(base);
                        cur_sub = None;
                        continue;
                    }
                    skipped += 1;
                }
                _ => skipped += 1,
            }
            continue;
        }

        if line.starts_with("\t\t") {
            // Programming interface: "\t\tpp  Name".
            let tok = split_fields(line.trim(), 2);
            let pi = tok.first().and_then(|t| hex_u8(t));
            let subclass = cur_base
                .zip(cur_sub)
                .and_then(|(base, sub)| db.classes.get_mut(&base)?.subclasses.get_mut(&sub));
            match (pi, subclass) {
                (Some(pi), Some(subclass)) => {
                    subclass
                        .prog_ifs
                        .insert(pi, tok.get(1).copied().unwrap_or_default().to_owned());
                }
                _ => {
                    skipped += 1;
                    trace!(line_no, "skipping orphan or malformed prog-if line");
                }
            }
            continue;
        }

        // Subclass: "\tss  Name".
        let tok = split_fields(line.trim(), 2);
        let sub = tok.first().and_then(|t| hex_u8(t));
        let class = cur_base.and_then(|base| db.classes.get_mut(&base));
        match (sub, class) {
            (Some(sub), Some(class)) => {
                class.subclasses.insert(
                    sub,
                    Subclass {
                        name: tok.get(1).copied().unwrap_or_default().to_owned(),
                        prog_ifs: BTreeMap::new(),
                    },
                );
                cur_sub = Some(sub);
            }
            _ => {
                skipped += 1;
                trace!(line_no, "skipping orphan or malformed subclass line");
            }
        }
    }

    debug!(
        vendors = db.vendors.len(),
        classes = db.classes.len(),
        skipped,
        "parsed pci.ids text"
    );
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\
# comment line
8086  Intel Corporation
\t1237  440FX - 82441FX PMC
10de  NVIDIA Corporation
\t1ba1  GP104M [GeForce GTX 1070 Mobile]
\t\t1458 1651  GeForce GTX 1070 Max-Q
C 03  Display controller
\t00  VGA compatible controller
\t\t00  VGA controller
";

    fn parse(text: &str) -> ParsedDb {
        parse_pci_ids_reader(Cursor::new(text)).unwrap()
    }

    #[test]
    fn parses_vendors_devices_subsystems() {
        let db = parse(SAMPLE);
        assert_eq!(db.vendors.len(), 2);
        let intel = &db.vendors[&0x8086];
        assert_eq!(intel.name, "Intel Corporation");
        assert_eq!(intel.devices[0].id, 0x1237);
        assert_eq!(intel.devices[0].name, "440FX - 82441FX PMC");

        let nvidia = &db.vendors[&0x10de];
        let dev = &nvidia.devices[0];
        assert_eq!(dev.subsystems.len(), 1);
        assert_eq!(dev.subsystems[0].subvendor, 0x1458);
        assert_eq!(dev.subsystems[0].subdevice, 0x1651);
        assert_eq!(dev.subsystems[0].name, "GeForce GTX 1070 Max-Q");
    }

    #[test]
    fn parses_class_tree() {
        let db = parse(SAMPLE);
        let display = &db.classes[&0x03];
        assert_eq!(display.name, "Display controller");
        let vga = &display.subclasses[&0x00];
        assert_eq!(vga.name, "VGA compatible controller");
        assert_eq!(vga.prog_ifs[&0x00], "VGA controller");
    }

    #[test]
    fn skips_malformed_and_orphan_lines() {
        let db = parse(
            "\tdead  orphan device before any vendor
zzzz  not hex at all
8086  Intel Corporation
\tnothex  skipped device
\t\t1458 1651  orphan subsystem, current vendor has no device
C 03  Display controller
\t\t00  orphan prog-if before any subclass
",
        );
        assert_eq!(db.vendors.len(), 1);
        assert!(db.vendors[&0x8086].devices.is_empty());
        assert!(db.classes[&0x03].subclasses.is_empty());
    }

    #[test]
    fn bare_base_line_inside_class_section() {
        let db = parse(
            "8086  Intel Corporation
C 02  Network controller
06  Bridge
\t04  PCI bridge
",
        );
        assert_eq!(db.classes[&0x06].name, "Bridge");
        assert_eq!(db.classes[&0x06].subclasses[&0x04].name, "PCI bridge");
    }

    #[test]
    fn later_vendor_replaces_earlier() {
        let db = parse(
            "8086  First name
\t1237  A device
8086  Second name
C 06  Bridge
",
        );
        assert_eq!(db.vendors[&0x8086].name, "Second name");
        assert!(db.vendors[&0x8086].devices.is_empty());
    }

    #[test]
    fn empty_input_is_unusable() {
        assert!(parse("").is_unusable());
        assert!(parse("# only comments\n").is_unusable());
        // Vendors without classes are still unusable.
        assert!(parse("8086  Intel Corporation\n").is_unusable());
    }
}
