// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Plaintext reader. Parses `pci.ids` once and builds the same compact
//! range-addressed arrays the binary format stores, with strings held in
//! the frozen pool instead of front-coded blocks. Lookup semantics are
//! identical to [`BinaryDb`](crate::BinaryDb).

use crate::error::{Error, Result};
use crate::facade::{DbKind, PciDb};
use crate::format::CLASS_BASE_SLOTS;
use crate::interner::{FinalizeOrder, FrozenPool, StringPool};
use crate::parser::{ParsedDb, parse_pci_ids};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug)]
pub struct TextDb {
    pool: FrozenPool,

    vendor_ids: Vec<u16>,
    vendor_name_sid: Vec<u32>,
    vendor_dev_start: Vec<u32>,
    vendor_dev_count: Vec<u32>,

    device_ids: Vec<u16>,
    device_name_sid: Vec<u32>,
    dev_sub_start: Vec<u32>,
    dev_sub_count: Vec<u32>,

    subvendor_ids: Vec<u16>,
    subdevice_ids: Vec<u16>,
    subsys_name_sid: Vec<u32>,

    class_base_sid: Vec<u32>,

    subclass_keys: Vec<u16>,
    subclass_name_sid: Vec<u32>,
    subclass_pi_start: Vec<u32>,
    subclass_pi_count: Vec<u32>,

    prog_if_vals: Vec<u8>,
    prog_if_name_sid: Vec<u32>,

    /// Keeps a staged bundled resource alive for as long as the reader.
    _staged: Option<NamedTempFile>,
}

impl TextDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = Self::from_parsed(parse_pci_ids(path)?)?;
        debug!(
            path = %path.display(),
            vendors = db.vendor_ids.len(),
            devices = db.device_ids.len(),
            "opened text PCI ID database"
        );
        Ok(db)
    }

    pub(crate) fn open_staged(staged: NamedTempFile) -> Result<Self> {
        let mut db = Self::from_parsed(parse_pci_ids(staged.path())?)?;
        db._staged = Some(staged);
        Ok(db)
    }

    /// Build the compact index arrays from a parsed database, walking it
    /// in the same sorted order as the compiler.
    pub fn from_parsed(parsed: ParsedDb) -> Result<Self> {
        if parsed.is_unusable() {
            return Err(Error::Parse);
        }

        // "" is interned first so id 0 can double as the absent marker
        // in the dense class-base table, mirroring the compiler.
        let mut pool = StringPool::new();
        pool.add("");
        for vendor in parsed.vendors.values() {
            pool.add(&vendor.name);
            for device in &vendor.devices {
                pool.add(&device.name);
                for subsystem in &device.subsystems {
                    pool.add(&subsystem.name);
                }
            }
        }
        for class in parsed.classes.values() {
            pool.add(&class.name);
            for subclass in class.subclasses.values() {
                pool.add(&subclass.name);
                for name in subclass.prog_ifs.values() {
                    pool.add(name);
                }
            }
        }
        let pool = pool.finalize(FinalizeOrder::Insertion);
        let sid = |s: &str| -> Result<u32> {
            pool.id_of(s)
                .ok_or_else(|| Error::InvalidFormat("string missing from frozen pool".into()))
        };

        let mut vendor_ids = Vec::new();
        let mut vendor_name_sid = Vec::new();
        let mut vendor_dev_start = Vec::new();
        let mut vendor_dev_count = Vec::new();
        let mut device_ids = Vec::new();
        let mut device_name_sid = Vec::new();
        let mut dev_sub_start = Vec::new();
        let mut dev_sub_count = Vec::new();
        let mut subvendor_ids = Vec::new();
        let mut subdevice_ids = Vec::new();
        let mut subsys_name_sid = Vec::new();

        for (&ven_id, vendor) in &parsed.vendors {
            let mut devices: Vec<_> = vendor.devices.iter().collect();
            devices.sort_by_key(|d| d.id);
            let dev_start = device_ids.len() as u32;
            for device in devices {
                let mut subsystems: Vec<_> = device.subsystems.iter().collect();
                subsystems.sort_by_key(|s| (s.subvendor, s.subdevice));
                let sub_start = subvendor_ids.len() as u32;
                for subsystem in subsystems {
                    subvendor_ids.push(subsystem.subvendor);
                    subdevice_ids.push(subsystem.subdevice);
                    subsys_name_sid.push(sid(&subsystem.name)?);
                }
                device_ids.push(device.id);
                device_name_sid.push(sid(&device.name)?);
                dev_sub_start.push(sub_start);
                dev_sub_count.push(subvendor_ids.len() as u32 - sub_start);
            }
            vendor_ids.push(ven_id);
            vendor_name_sid.push(sid(&vendor.name)?);
            vendor_dev_start.push(dev_start);
            vendor_dev_count.push(device_ids.len() as u32 - dev_start);
        }

        let mut class_base_sid = vec![0u32; CLASS_BASE_SLOTS];
        let mut subclass_keys = Vec::new();
        let mut subclass_name_sid = Vec::new();
        let mut subclass_pi_start = Vec::new();
        let mut subclass_pi_count = Vec::new();
        let mut prog_if_vals = Vec::new();
        let mut prog_if_name_sid = Vec::new();

        for (&base, class) in &parsed.classes {
            class_base_sid[usize::from(base)] = sid(&class.name)?;
            for (&sub, subclass) in &class.subclasses {
                let pi_start = prog_if_vals.len() as u32;
                for (&pi, name) in &subclass.prog_ifs {
                    prog_if_vals.push(pi);
                    prog_if_name_sid.push(sid(name)?);
                }
                subclass_keys.push(u16::from(base) << 8 | u16::from(sub));
                subclass_name_sid.push(sid(&subclass.name)?);
                subclass_pi_start.push(pi_start);
                subclass_pi_count.push(prog_if_vals.len() as u32 - pi_start);
            }
        }

        Ok(TextDb {
            pool,
            vendor_ids,
            vendor_name_sid,
            vendor_dev_start,
            vendor_dev_count,
            device_ids,
            device_name_sid,
            dev_sub_start,
            dev_sub_count,
            subvendor_ids,
            subdevice_ids,
            subsys_name_sid,
            class_base_sid,
            subclass_keys,
            subclass_name_sid,
            subclass_pi_start,
            subclass_pi_count,
            prog_if_vals,
            prog_if_name_sid,
            _staged: None,
        })
    }

    fn get(&self, sid: u32) -> Result<String> {
        self.pool
            .get(sid)
            .map(str::to_owned)
            .ok_or_else(|| Error::InvalidFormat(format!("string id {sid} out of range")))
    }

    fn vendor_index(&self, vendor_id: u16) -> Option<usize> {
        let i = self.vendor_ids.partition_point(|&id| id < vendor_id);
        (i < self.vendor_ids.len() && self.vendor_ids[i] == vendor_id).then_some(i)
    }

    fn device_index(&self, vendor_index: usize, device_id: u16) -> Option<usize> {
        let start = self.vendor_dev_start[vendor_index] as usize;
        let end = start + self.vendor_dev_count[vendor_index] as usize;
        let i = start + self.device_ids[start..end].partition_point(|&id| id < device_id);
        (i < end && self.device_ids[i] == device_id).then_some(i)
    }

    fn subsystem_index(&self, device_index: usize, subvendor: u16, subdevice: u16) -> Option<usize> {
        let start = self.dev_sub_start[device_index] as usize;
        let end = start + self.dev_sub_count[device_index] as usize;
        let key = (subvendor, subdevice);
        let (mut lo, mut hi) = (start, end);
        while lo < hi {
            let mid = (lo + hi) / 2;
            if (self.subvendor_ids[mid], self.subdevice_ids[mid]) < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        (lo < end && (self.subvendor_ids[lo], self.subdevice_ids[lo]) == key).then_some(lo)
    }

    fn subclass_index(&self, base: u8, sub: u8) -> Option<usize> {
        let key = u16::from(base) << 8 | u16::from(sub);
        let i = self.subclass_keys.partition_point(|&k| k < key);
        (i < self.subclass_keys.len() && self.subclass_keys[i] == key).then_some(i)
    }
}

impl PciDb for TextDb {
    fn kind(&self) -> DbKind {
        DbKind::Text
    }

    fn vendor_name(&self, vendor_id: u16) -> Result<Option<String>> {
        match self.vendor_index(vendor_id) {
            Some(i) => Ok(Some(self.get(self.vendor_name_sid[i])?)),
            None => Ok(None),
        }
    }

    fn device_name(&self, vendor_id: u16, device_id: u16) -> Result<Option<String>> {
        let Some(vi) = self.vendor_index(vendor_id) else {
            return Ok(None);
        };
        match self.device_index(vi, device_id) {
            Some(di) => Ok(Some(self.get(self.device_name_sid[di])?)),
            None => Ok(None),
        }
    }

    fn subsystem_name(
        &self,
        vendor_id: u16,
        device_id: u16,
        subvendor_id: u16,
        subdevice_id: u16,
    ) -> Result<Option<String>> {
        let Some(vi) = self.vendor_index(vendor_id) else {
            return Ok(None);
        };
        let Some(di) = self.device_index(vi, device_id) else {
            return Ok(None);
        };
        match self.subsystem_index(di, subvendor_id, subdevice_id) {
            Some(si) => Ok(Some(self.get(self.subsys_name_sid[si])?)),
            None => Ok(None),
        }
    }

    fn class_name(
        &self,
        base: u8,
        subclass: Option<u8>,
        prog_if: Option<u8>,
    ) -> Result<Option<String>> {
        let Some(sub) = subclass else {
            let sid = self.class_base_sid[usize::from(base)];
            if sid == 0 {
                return Ok(None);
            }
            return Ok(Some(self.get(sid)?));
        };

        let Some(i) = self.subclass_index(base, sub) else {
            // Unknown subclass falls back to the base name.
            return self.class_name(base, None, None);
        };
        let Some(pi) = prog_if else {
            return Ok(Some(self.get(self.subclass_name_sid[i])?));
        };

        let start = self.subclass_pi_start[i] as usize;
        let end = start + self.subclass_pi_count[i] as usize;
        let j = start + self.prog_if_vals[start..end].partition_point(|&v| v < pi);
        if j < end && self.prog_if_vals[j] == pi {
            return Ok(Some(self.get(self.prog_if_name_sid[j])?));
        }
        // Unknown prog-if falls back to the subclass name.
        Ok(Some(self.get(self.subclass_name_sid[i])?))
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
