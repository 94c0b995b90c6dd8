// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use pciid::{CompileOptions, compile_file};
use std::path::{Path, PathBuf};

/// Trimmed-down pci.ids with known vendors, devices, one subsystem and a
/// class tree, shared by the integration suites.
pub const MINIMAL_PCI_IDS: &str = "\
8086  Intel Corporation
\t1237  440FX - 82441FX PMC
10de  NVIDIA Corporation
\t1db6  GV100GL [Tesla V100 PCIe 32GB]
\t1ba1  GP104M [GeForce GTX 1070 Mobile]
\t\t1458 1651  GeForce GTX 1070 Max-Q
C 02  Network controller
\t00  Ethernet controller
C 03  Display controller
\t00  VGA compatible controller
\t\t00  VGA controller
\t\t01  8514 controller
\t01  XGA compatible controller
\t02  3D controller
\t80  Display controller
C 06  Bridge
\t04  PCI bridge
";

pub fn write_text(dir: &Path) -> PathBuf {
    let path = dir.join("pci.ids");
    std::fs::write(&path, MINIMAL_PCI_IDS).unwrap();
    path
}

pub fn build_bin(dir: &Path, text: &Path, compress: bool) -> PathBuf {
    let path = dir.join(if compress {
        "pci.ids.bin"
    } else {
        "pci.ids.uncompressed.bin"
    });
    compile_file(text, &path, &CompileOptions { compress }).unwrap();
    path
}
