// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! On-disk invariants the reader relies on: canonical magic bytes and
//! strictly increasing row orderings per range.

mod common;

use pciid::format::{DeviceRow, Header, ProgIfRow, SubclassRow, SubsysRow, VendorRow};
use std::fs;

fn rows<'a, T>(
    bytes: &'a [u8],
    off: u32,
    len: u32,
    size: usize,
    parse: impl Fn(&'a [u8]) -> T + 'a,
) -> Vec<T> {
    let section = &bytes[off as usize..(off + len) as usize];
    assert_eq!(section.len() % size, 0);
    section.chunks(size).map(parse).collect()
}

fn compiled() -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let text = common::write_text(dir.path());
    let bin = common::build_bin(dir.path(), &text, true);
    fs::read(&bin).unwrap()
}

#[test]
fn file_starts_with_canonical_magic_bytes() {
    let bytes = compiled();
    assert_eq!(&bytes[0..4], b"PCIB");
    assert_eq!(&bytes[0..4], &[0x50, 0x43, 0x49, 0x42]);
}

#[test]
fn misc_section_is_reserved_and_empty() {
    let bytes = compiled();
    let header = Header::parse(&bytes).unwrap();
    assert_eq!(header.misc.len, 0);
}

#[test]
fn vendor_ids_strictly_increase() {
    let bytes = compiled();
    let header = Header::parse(&bytes).unwrap();
    let vendors = rows(
        &bytes,
        header.vendors.off,
        header.vendors.len,
        VendorRow::SIZE,
        VendorRow::parse,
    );
    assert!(!vendors.is_empty());
    assert!(vendors.windows(2).all(|w| w[0].id < w[1].id));
}

#[test]
fn device_ids_strictly_increase_within_each_vendor() {
    let bytes = compiled();
    let header = Header::parse(&bytes).unwrap();
    let vendors = rows(
        &bytes,
        header.vendors.off,
        header.vendors.len,
        VendorRow::SIZE,
        VendorRow::parse,
    );
    let devices = rows(
        &bytes,
        header.devices.off,
        header.devices.len,
        DeviceRow::SIZE,
        DeviceRow::parse,
    );
    for vendor in &vendors {
        let range = vendor.dev_start as usize..(vendor.dev_start + vendor.dev_count) as usize;
        assert!(range.end <= devices.len());
        assert!(devices[range].windows(2).all(|w| w[0].id < w[1].id));
    }
}

#[test]
fn subsystems_strictly_increase_within_each_device() {
    let bytes = compiled();
    let header = Header::parse(&bytes).unwrap();
    let devices = rows(
        &bytes,
        header.devices.off,
        header.devices.len,
        DeviceRow::SIZE,
        DeviceRow::parse,
    );
    let subsystems = rows(
        &bytes,
        header.subsystems.off,
        header.subsystems.len,
        SubsysRow::SIZE,
        SubsysRow::parse,
    );
    for device in &devices {
        let range = device.sub_start as usize..(device.sub_start + device.sub_count) as usize;
        assert!(range.end <= subsystems.len());
        assert!(
            subsystems[range]
                .windows(2)
                .all(|w| (w[0].subvendor, w[0].subdevice) < (w[1].subvendor, w[1].subdevice))
        );
    }
}

#[test]
fn subclass_keys_strictly_increase_and_prog_ifs_within_each() {
    let bytes = compiled();
    let header = Header::parse(&bytes).unwrap();
    let subclasses = rows(
        &bytes,
        header.subclasses.off,
        header.subclasses.len,
        SubclassRow::SIZE,
        SubclassRow::parse,
    );
    assert!(!subclasses.is_empty());
    assert!(subclasses.windows(2).all(|w| w[0].key < w[1].key));

    let prog_ifs = rows(
        &bytes,
        header.prog_ifs.off,
        header.prog_ifs.len,
        ProgIfRow::SIZE,
        ProgIfRow::parse,
    );
    for subclass in &subclasses {
        let range = subclass.pi_start as usize..(subclass.pi_start + subclass.pi_count) as usize;
        assert!(range.end <= prog_ifs.len());
        assert!(
            prog_ifs[range]
                .windows(2)
                .all(|w| w[0].prog_if < w[1].prog_if)
        );
    }
}

#[test]
fn compressed_and_uncompressed_share_row_tables() {
    let dir = tempfile::tempdir().unwrap();
    let text = common::write_text(dir.path());
    let compressed = fs::read(common::build_bin(dir.path(), &text, true)).unwrap();
    let raw = fs::read(common::build_bin(dir.path(), &text, false)).unwrap();
    let ch = Header::parse(&compressed).unwrap();
    let rh = Header::parse(&raw).unwrap();
    // Same rows either way; only the string blocks differ.
    assert_eq!(ch.vendors.len, rh.vendors.len);
    assert_eq!(ch.devices.len, rh.devices.len);
    assert_eq!(ch.subsystems.len, rh.subsystems.len);
    assert_eq!(ch.subclasses.len, rh.subclasses.len);
    assert_eq!(ch.prog_ifs.len, rh.prog_ifs.len);
    assert!(ch.str_blocks.len <= rh.str_blocks.len);
}
