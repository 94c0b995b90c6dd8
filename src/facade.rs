// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::error::Result;

/// Which backend answered [`crate::open_db`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Binary,
    Text,
}

/// Lookup capability set shared by the binary and text readers.
///
/// Point lookups return `Ok(None)` for a missing key; only genuine
/// corruption (a bad block decode in the binary backend) errors. The
/// provided methods are the only implementations of the class-code
/// resolver and the best-effort describer, so the two backends cannot
/// diverge on them.
pub trait PciDb: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> DbKind;

    fn vendor_name(&self, vendor_id: u16) -> Result<Option<String>>;

    fn device_name(&self, vendor_id: u16, device_id: u16) -> Result<Option<String>>;

    fn subsystem_name(
        &self,
        vendor_id: u16,
        device_id: u16,
        subvendor_id: u16,
        subdevice_id: u16,
    ) -> Result<Option<String>>;

    /// Resolve a class name at the requested specificity. An unknown
    /// subclass falls back to the base name and an unknown prog-if to
    /// the subclass name; `prog_if` is ignored unless `subclass` is set.
    fn class_name(&self, base: u8, subclass: Option<u8>, prog_if: Option<u8>)
    -> Result<Option<String>>;

    /// Release the underlying resources. Consuming the reader makes
    /// use-after-close unrepresentable; dropping without calling this
    /// releases the same resources.
    fn close(self: Box<Self>) -> Result<()>;

    /// Resolve a 24-bit class code `(base << 16) | (sub << 8) | pi` to
    /// the most specific name available at `depth` (clamped into
    /// `[0, 3]`): 3 tries prog-if, 2 subclass, 1 and 0 the base only.
    fn class_name_from_code(&self, class_code: u32, depth: i32) -> Result<Option<String>> {
        let base = ((class_code >> 16) & 0xff) as u8;
        let sub = ((class_code >> 8) & 0xff) as u8;
        let pi = (class_code & 0xff) as u8;
        let depth = depth.clamp(0, 3);
        if depth > 2
            && let Some(name) = self.class_name(base, Some(sub), Some(pi))?
        {
            return Ok(Some(name));
        }
        if depth > 1
            && let Some(name) = self.class_name(base, Some(sub), None)?
        {
            return Ok(Some(name));
        }
        self.class_name(base, None, None)
    }

    /// Always produces a label: `"<vendor> <device>"` when both the
    /// vendor and the device name resolve, otherwise `"Unknown
    /// <vendor|0xVVVV> <class|'PCI device'> (0xDDDD)"` with the class
    /// resolved at subclass depth. Empty names count as missing.
    fn describe_device_best_effort(
        &self,
        vendor_id: u16,
        device_id: u16,
        class_code: Option<u32>,
    ) -> Result<String> {
        let vendor = self
            .vendor_name(vendor_id)?
            .filter(|name| !name.is_empty());
        let device = self
            .device_name(vendor_id, device_id)?
            .filter(|name| !name.is_empty());
        if let (Some(vendor), Some(device)) = (&vendor, &device) {
            return Ok(format!("{vendor} {device}"));
        }
        let vendor = vendor.unwrap_or_else(|| format!("0x{vendor_id:04x}"));
        let class = match class_code {
            Some(code) => self.class_name_from_code(code, 2)?,
            None => None,
        };
        let class = class.unwrap_or_else(|| "PCI device".to_owned());
        Ok(format!("Unknown {vendor} {class} (0x{device_id:04x})"))
    }
}
