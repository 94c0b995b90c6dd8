// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{parse_hex_class_code, parse_hex_u8, parse_hex_u16};
use clap::{Args, Subcommand};
use pciid::open_db;
use std::path::PathBuf;

#[derive(Args)]
pub struct LookupCommand {
    /// Database path; discovered from the environment when absent
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    query: Query,
}

#[derive(Subcommand)]
enum Query {
    /// Vendor name by id
    Vendor {
        #[arg(value_parser = parse_hex_u16)]
        vendor: u16,
    },

    /// Device name by vendor and device id
    Device {
        #[arg(value_parser = parse_hex_u16)]
        vendor: u16,
        #[arg(value_parser = parse_hex_u16)]
        device: u16,
    },

    /// Subsystem name by vendor, device, subvendor and subdevice id
    Subsystem {
        #[arg(value_parser = parse_hex_u16)]
        vendor: u16,
        #[arg(value_parser = parse_hex_u16)]
        device: u16,
        #[arg(value_parser = parse_hex_u16)]
        subvendor: u16,
        #[arg(value_parser = parse_hex_u16)]
        subdevice: u16,
    },

    /// Class name at base, subclass or prog-if depth
    Class {
        #[arg(value_parser = parse_hex_u8)]
        base: u8,
        #[arg(value_parser = parse_hex_u8)]
        subclass: Option<u8>,
        #[arg(value_parser = parse_hex_u8)]
        prog_if: Option<u8>,
    },

    /// Best-effort device description, like "Unknown NVIDIA Corporation
    /// VGA compatible controller (0x1234)"
    Describe {
        #[arg(value_parser = parse_hex_u16)]
        vendor: u16,
        #[arg(value_parser = parse_hex_u16)]
        device: u16,
        #[arg(value_parser = parse_hex_class_code)]
        class_code: Option<u32>,
    },
}

impl LookupCommand {
    pub fn run(self) -> anyhow::Result<()> {
        let db = open_db(self.database.as_deref())?;
        let answer = match self.query {
            Query::Vendor { vendor } => db.vendor_name(vendor)?,
            Query::Device { vendor, device } => db.device_name(vendor, device)?,
            Query::Subsystem {
                vendor,
                device,
                subvendor,
                subdevice,
            } => db.subsystem_name(vendor, device, subvendor, subdevice)?,
            Query::Class {
                base,
                subclass,
                prog_if,
            } => db.class_name(base, subclass, prog_if)?,
            Query::Describe {
                vendor,
                device,
                class_code,
            } => Some(db.describe_device_best_effort(vendor, device, class_code)?),
        };
        match answer {
            Some(name) => println!("{name}"),
            None => println!("(not found)"),
        }
        db.close()?;
        Ok(())
    }
}
