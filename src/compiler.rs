// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Text-to-binary compiler.
//!
//! Two-phase: every name is interned first, then the pool is frozen in
//! lexicographic order and the row tables are emitted with finalized
//! string ids. The header is written last, once every section offset is
//! known.

use crate::blocks::encode_block;
use crate::error::{Error, Result};
use crate::format::{
    BLOCK_STRIDE, CLASS_BASE_SLOTS, DeviceRow, HEADER_LEN, Header, ProgIfRow, Section, SubclassRow,
    SubsysRow, VendorRow,
};
use crate::interner::{FinalizeOrder, FrozenPool, StringPool};
use crate::parser::{ParsedDb, parse_pci_ids};
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Deflate each string block with zlib. Lookups are answered
    /// identically either way.
    pub compress: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { compress: true }
    }
}

/// Compile a plaintext `pci.ids` into a binary database file.
pub fn compile_file(input: &Path, output: &Path, options: &CompileOptions) -> Result<()> {
    let parsed = parse_pci_ids(input)?;
    let mut out = BufWriter::new(File::create(output)?);
    compile_to(&parsed, &mut out, options)?;
    out.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    Ok(())
}

/// Collect every name into the pool. The empty string is interned first;
/// sorted lexicographically it pins id 0, so a dense class-base slot of 0
/// always means "absent" and never shadows a real name.
fn intern_names(parsed: &ParsedDb) -> FrozenPool {
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
    pool.finalize(FinalizeOrder::Lexicographic)
}

fn sid(pool: &FrozenPool, s: &str) -> Result<u32> {
    pool.id_of(s)
        .ok_or_else(|| Error::InvalidFormat("string missing from frozen pool".into()))
}

fn u32_of(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::InvalidFormat("database exceeds u32 offsets".into()))
}

/// Compile an already parsed database to `out`. The writer ends up
/// positioned after the header.
pub fn compile_to<W: Write + Seek>(
    parsed: &ParsedDb,
    out: &mut W,
    options: &CompileOptions,
) -> Result<()> {
    if parsed.is_unusable() {
        return Err(Error::Parse);
    }
    let pool = intern_names(parsed);

    // Row tables, walked in sorted order so the reader can bisect.
    let mut vendor_rows = Vec::new();
    let mut device_rows = Vec::new();
    let mut subsys_rows = Vec::new();
    for (&ven_id, vendor) in &parsed.vendors {
        let mut devices: Vec<_> = vendor.devices.iter().collect();
        devices.sort_by_key(|d| d.id);
        let dev_start = u32_of(device_rows.len())?;
        for device in devices {
            let mut subsystems: Vec<_> = device.subsystems.iter().collect();
            subsystems.sort_by_key(|s| (s.subvendor, s.subdevice));
            let sub_start = u32_of(subsys_rows.len())?;
            for subsystem in subsystems {
                subsys_rows.push(SubsysRow {
                    subvendor: subsystem.subvendor,
                    subdevice: subsystem.subdevice,
                    name_id: sid(&pool, &subsystem.name)?,
                });
            }
            device_rows.push(DeviceRow {
                id: device.id,
                name_id: sid(&pool, &device.name)?,
                sub_start,
                sub_count: u32_of(subsys_rows.len())? - sub_start,
            });
        }
        vendor_rows.push(VendorRow {
            id: ven_id,
            name_id: sid(&pool, &vendor.name)?,
            dev_start,
            dev_count: u32_of(device_rows.len())? - dev_start,
        });
    }

    let mut class_base = vec![0u32; CLASS_BASE_SLOTS];
    let mut subclass_rows = Vec::new();
    let mut prog_if_rows = Vec::new();
    for (&base, class) in &parsed.classes {
        class_base[usize::from(base)] = sid(&pool, &class.name)?;
        for (&sub, subclass) in &class.subclasses {
            let pi_start = u32_of(prog_if_rows.len())?;
            for (&pi, name) in &subclass.prog_ifs {
                prog_if_rows.push(ProgIfRow {
                    prog_if: pi,
                    name_id: sid(&pool, name)?,
                });
            }
            subclass_rows.push(SubclassRow {
                key: u16::from(base) << 8 | u16::from(sub),
                name_id: sid(&pool, &subclass.name)?,
                pi_start,
                pi_count: u32_of(prog_if_rows.len())? - pi_start,
            });
        }
    }

    // Header placeholder; the real one lands here at the end.
    out.write_all(&[0u8; HEADER_LEN])?;

    // String directory, then the blocks it addresses.
    let stride = BLOCK_STRIDE as usize;
    let strings = pool.strings();
    let block_count = strings.len().div_ceil(stride);
    let str_dir_off = u32_of(HEADER_LEN)?;
    let str_dir_len = u32_of(4 + 4 * block_count)?;
    let blocks_off = str_dir_off + str_dir_len;

    let mut block_offsets = Vec::with_capacity(block_count);
    let mut blocks_buf = Vec::new();
    for chunk in strings.chunks(stride) {
        block_offsets.push(blocks_off + u32_of(blocks_buf.len())?);
        blocks_buf.extend_from_slice(&encode_block(chunk, options.compress)?);
    }
    out.write_u32::<LittleEndian>(u32_of(block_count)?)?;
    for off in &block_offsets {
        out.write_u32::<LittleEndian>(*off)?;
    }
    out.write_all(&blocks_buf)?;

    let section_at = |out: &mut W, len: usize| -> Result<Section> {
        let off = u32::try_from(out.stream_position()?)
            .map_err(|_| Error::InvalidFormat("database exceeds u32 offsets".into()))?;
        Ok(Section {
            off: off - u32_of(len)?,
            len: u32_of(len)?,
        })
    };

    for row in &vendor_rows {
        row.write_to(out)?;
    }
    let vendors = section_at(out, vendor_rows.len() * VendorRow::SIZE)?;

    for row in &device_rows {
        row.write_to(out)?;
    }
    let devices = section_at(out, device_rows.len() * DeviceRow::SIZE)?;

    for row in &subsys_rows {
        row.write_to(out)?;
    }
    let subsystems = section_at(out, subsys_rows.len() * SubsysRow::SIZE)?;

    for name_id in &class_base {
        out.write_u32::<LittleEndian>(*name_id)?;
    }
    let class_base_section = section_at(out, CLASS_BASE_SLOTS * 4)?;

    for row in &subclass_rows {
        row.write_to(out)?;
    }
    let subclasses = section_at(out, subclass_rows.len() * SubclassRow::SIZE)?;

    for row in &prog_if_rows {
        row.write_to(out)?;
    }
    let prog_ifs = section_at(out, prog_if_rows.len() * ProgIfRow::SIZE)?;

    let misc = section_at(out, 0)?;

    let header = Header {
        str_dir: Section {
            off: str_dir_off,
            len: str_dir_len,
        },
        str_blocks: Section {
            off: blocks_off,
            len: u32_of(blocks_buf.len())?,
        },
        vendors,
        devices,
        subsystems,
        class_base: class_base_section,
        subclasses,
        prog_ifs,
        misc,
    };
    out.seek(SeekFrom::Start(0))?;
    header.write_to(out)?;
    out.seek(SeekFrom::End(0))?;

    debug!(
        vendors = vendor_rows.len(),
        devices = device_rows.len(),
        subsystems = subsys_rows.len(),
        subclasses = subclass_rows.len(),
        prog_ifs = prog_if_rows.len(),
        strings = strings.len(),
        blocks = block_count,
        compressed = options.compress,
        "compiled pci.ids database"
    );
    Ok(())
}
