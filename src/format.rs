// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! On-disk layout of the binary PCI ID database.
//!
//! ```text
//! ┌──────────────────────────────┐ offset 0
//! │ header (112 bytes)           │ magic, version, flags, 13 section pairs
//! ├──────────────────────────────┤
//! │ string directory             │ u32 count, then absolute u32 offsets
//! ├──────────────────────────────┤
//! │ string blocks                │ front-coded, optionally deflated
//! ├──────────────────────────────┤
//! │ vendor rows                  │ sorted by vendor id
//! │ device rows                  │ sorted by device id within vendor
//! │ subsystem rows               │ sorted by (subvendor, subdevice)
//! │ class-base table             │ dense, 256 × u32 name id (0 = absent)
//! │ subclass rows                │ sorted by (base << 8) | sub
//! │ prog-if rows                 │ sorted by prog-if within subclass
//! └──────────────────────────────┘
//! ```
//!
//! All integers are little-endian and unsigned. Rows are packed with no
//! padding, so every read goes through byte-wise loads; nothing here
//! assumes host alignment.

use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::{self, Write};

/// `"PCIB"` once laid out little-endian (bytes `50 43 49 42`).
pub const MAGIC: u32 = 0x4249_4350;
pub const VERSION: u16 = 1;

/// Fixed header size: u32 magic + u16 version + u16 flags + 13 section pairs.
pub const HEADER_LEN: usize = 4 + 2 + 2 + SECTION_PAIRS * 8;
pub const SECTION_PAIRS: usize = 13;

/// Strings per front-coded block.
pub const BLOCK_STRIDE: u32 = 32;

/// Number of dense class-base slots, one per possible 8-bit base class.
pub const CLASS_BASE_SLOTS: usize = 256;
pub const CLASS_BASE_LEN: usize = CLASS_BASE_SLOTS * 4;

/// Byte extent of one file section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Section {
    pub off: u32,
    pub len: u32,
}

/// Parsed file header. The four reserved pairs after `misc` are
/// zero-filled on write and ignored on read.
#[derive(Debug, Clone, Copy, Default)]
pub struct Header {
    pub str_dir: Section,
    pub str_blocks: Section,
    pub vendors: Section,
    pub devices: Section,
    pub subsystems: Section,
    pub class_base: Section,
    pub subclasses: Section,
    pub prog_ifs: Section,
    pub misc: Section,
}

impl Header {
    /// Validate magic and version and read the section table. `buf` is
    /// the start of the mapped file.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::InvalidFormat(format!(
                "truncated header: {} bytes, need {HEADER_LEN}",
                buf.len()
            )));
        }
        let magic = LittleEndian::read_u32(&buf[0..4]);
        if magic != MAGIC {
            return Err(Error::InvalidFormat(format!("bad magic {magic:#010x}")));
        }
        let version = LittleEndian::read_u16(&buf[4..6]);
        if version != VERSION {
            return Err(Error::InvalidFormat(format!(
                "unsupported version {version}"
            )));
        }
        let section = |i: usize| Section {
            off: LittleEndian::read_u32(&buf[8 + i * 8..12 + i * 8]),
            len: LittleEndian::read_u32(&buf[12 + i * 8..16 + i * 8]),
        };
        Ok(Header {
            str_dir: section(0),
            str_blocks: section(1),
            vendors: section(2),
            devices: section(3),
            subsystems: section(4),
            class_base: section(5),
            subclasses: section(6),
            prog_ifs: section(7),
            misc: section(8),
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(MAGIC)?;
        w.write_u16::<LittleEndian>(VERSION)?;
        w.write_u16::<LittleEndian>(0)?; // flags
        let sections = [
            self.str_dir,
            self.str_blocks,
            self.vendors,
            self.devices,
            self.subsystems,
            self.class_base,
            self.subclasses,
            self.prog_ifs,
            self.misc,
        ];
        for s in sections {
            w.write_u32::<LittleEndian>(s.off)?;
            w.write_u32::<LittleEndian>(s.len)?;
        }
        for _ in sections.len()..SECTION_PAIRS {
            w.write_u32::<LittleEndian>(0)?;
            w.write_u32::<LittleEndian>(0)?;
        }
        Ok(())
    }
}

/// `u16 ven_id; u32 name_id; u32 dev_start; u32 dev_count`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorRow {
    pub id: u16,
    pub name_id: u32,
    pub dev_start: u32,
    pub dev_count: u32,
}

impl VendorRow {
    pub const SIZE: usize = 14;

    pub fn parse(buf: &[u8]) -> Self {
        VendorRow {
            id: LittleEndian::read_u16(&buf[0..2]),
            name_id: LittleEndian::read_u32(&buf[2..6]),
            dev_start: LittleEndian::read_u32(&buf[6..10]),
            dev_count: LittleEndian::read_u32(&buf[10..14]),
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.id)?;
        w.write_u32::<LittleEndian>(self.name_id)?;
        w.write_u32::<LittleEndian>(self.dev_start)?;
        w.write_u32::<LittleEndian>(self.dev_count)
    }
}

/// `u16 dev_id; u32 name_id; u32 sub_start; u32 sub_count`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRow {
    pub id: u16,
    pub name_id: u32,
    pub sub_start: u32,
    pub sub_count: u32,
}

impl DeviceRow {
    pub const SIZE: usize = 14;

    pub fn parse(buf: &[u8]) -> Self {
        DeviceRow {
            id: LittleEndian::read_u16(&buf[0..2]),
            name_id: LittleEndian::read_u32(&buf[2..6]),
            sub_start: LittleEndian::read_u32(&buf[6..10]),
            sub_count: LittleEndian::read_u32(&buf[10..14]),
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.id)?;
        w.write_u32::<LittleEndian>(self.name_id)?;
        w.write_u32::<LittleEndian>(self.sub_start)?;
        w.write_u32::<LittleEndian>(self.sub_count)
    }
}

/// `u16 sv; u16 sd; u32 name_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsysRow {
    pub subvendor: u16,
    pub subdevice: u16,
    pub name_id: u32,
}

impl SubsysRow {
    pub const SIZE: usize = 8;

    pub fn parse(buf: &[u8]) -> Self {
        SubsysRow {
            subvendor: LittleEndian::read_u16(&buf[0..2]),
            subdevice: LittleEndian::read_u16(&buf[2..4]),
            name_id: LittleEndian::read_u32(&buf[4..8]),
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.subvendor)?;
        w.write_u16::<LittleEndian>(self.subdevice)?;
        w.write_u32::<LittleEndian>(self.name_id)
    }
}

/// `u16 key = (base << 8) | sub; u32 name_id; u32 pi_start; u32 pi_count`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubclassRow {
    pub key: u16,
    pub name_id: u32,
    pub pi_start: u32,
    pub pi_count: u32,
}

impl SubclassRow {
    pub const SIZE: usize = 14;

    pub fn parse(buf: &[u8]) -> Self {
        SubclassRow {
            key: LittleEndian::read_u16(&buf[0..2]),
            name_id: LittleEndian::read_u32(&buf[2..6]),
            pi_start: LittleEndian::read_u32(&buf[6..10]),
            pi_count: LittleEndian::read_u32(&buf[10..14]),
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.key)?;
        w.write_u32::<LittleEndian>(self.name_id)?;
        w.write_u32::<LittleEndian>(self.pi_start)?;
        w.write_u32::<LittleEndian>(self.pi_count)
    }
}

/// `u8 pi; u32 name_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgIfRow {
    pub prog_if: u8,
    pub name_id: u32,
}

impl ProgIfRow {
    pub const SIZE: usize = 5;

    pub fn parse(buf: &[u8]) -> Self {
        ProgIfRow {
            prog_if: buf[0],
            name_id: LittleEndian::read_u32(&buf[1..5]),
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.prog_if)?;
        w.write_u32::<LittleEndian>(self.name_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = Header {
            str_dir: Section { off: 112, len: 8 },
            str_blocks: Section { off: 120, len: 40 },
            vendors: Section { off: 160, len: 28 },
            ..Default::default()
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(&buf[0..4], b"PCIB");

        let parsed = Header::parse(&buf).unwrap();
        assert_eq!(parsed.str_dir, header.str_dir);
        assert_eq!(parsed.str_blocks, header.str_blocks);
        assert_eq!(parsed.vendors, header.vendors);
        assert_eq!(parsed.misc, Section::default());
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut buf = Vec::new();
        Header::default().write_to(&mut buf).unwrap();
        buf[0..4].copy_from_slice(&0xDEADBEEF_u32.to_le_bytes());
        let err = Header::parse(&buf).unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn header_rejects_legacy_pcid_magic() {
        let mut buf = Vec::new();
        Header::default().write_to(&mut buf).unwrap();
        buf[0..4].copy_from_slice(b"PCID");
        assert!(Header::parse(&buf).is_err());
    }

    #[test]
    fn header_rejects_unsupported_version() {
        let mut buf = Vec::new();
        Header::default().write_to(&mut buf).unwrap();
        buf[4..6].copy_from_slice(&2u16.to_le_bytes());
        let err = Header::parse(&buf).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn rows_round_trip() {
        let row = VendorRow {
            id: 0x8086,
            name_id: 7,
            dev_start: 3,
            dev_count: 12,
        };
        let mut buf = Vec::new();
        row.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), VendorRow::SIZE);
        assert_eq!(VendorRow::parse(&buf), row);

        let row = SubsysRow {
            subvendor: 0x1458,
            subdevice: 0x1651,
            name_id: 9,
        };
        let mut buf = Vec::new();
        row.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), SubsysRow::SIZE);
        assert_eq!(SubsysRow::parse(&buf), row);

        let row = ProgIfRow {
            prog_if: 0x30,
            name_id: 2,
        };
        let mut buf = Vec::new();
        row.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), ProgIfRow::SIZE);
        assert_eq!(ProgIfRow::parse(&buf), row);
    }
}
