//! Persistent macro storage: binary trace files and the JSON catalog.
//!
//! A trace file is little endian:
//!
//! ```text
//!   Header (16 bytes)
//!     [0..4]   Magic "MAC2"
//!     [4..6]   Format version (2)
//!     [6..8]   Report size (64)
//!     [8..12]  Frame count
//!     [12..16] Duration in microseconds
//!   Frames (72 bytes each)
//!     [0..8]   Timestamp in microseconds
//!     [8..72]  Raw input report
//! ```
//!
//! Traces written with the older "MACO" version 1 magic share the same layout
//! and are still readable.
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use packed_struct::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drivers::procon2::hid_report::{RawFrame, REPORT_SIZE};

pub const MAGIC: [u8; 4] = *b"MAC2";
pub const FORMAT_VERSION: u16 = 2;
pub const MAGIC_V1: [u8; 4] = *b"MACO";
pub const FORMAT_VERSION_V1: u16 = 1;

pub const HEADER_SIZE: usize = 16;
pub const TIMESTAMP_SIZE: usize = 8;
pub const FRAME_SIZE: usize = TIMESTAMP_SIZE + REPORT_SIZE;

/// Name of the catalog file inside the macros directory
pub const CATALOG_FILE: &str = "index.json";

/// One recorded sample: (microseconds since the recording started, report)
pub type MacroFrame = (u64, RawFrame);

/// Possible errors from the macro store
#[derive(Error, Debug)]
pub enum MacroError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid catalog: {0}")]
    Catalog(#[from] serde_json::Error),
    #[error("macro {0} not found")]
    NotFound(u32),
    #[error("invalid trace magic {0:?}")]
    InvalidMagic([u8; 4]),
    #[error("unsupported trace version {0}")]
    UnsupportedVersion(u16),
    #[error("trace report size {0} does not match {REPORT_SIZE}")]
    ReportSizeMismatch(u16),
    #[error("trace is truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("trace announces {0} frames, which cannot be addressed")]
    TooLarge(u32),
    #[error("no frames to save")]
    NoData,
    #[error("invalid trace header: {0}")]
    Packing(#[from] PackingError),
}

/// Trace file header
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "16")]
pub struct PackedMacroHeader {
    #[packed_field(bytes = "0..=3")]
    pub magic: [u8; 4],
    #[packed_field(bytes = "4..=5", endian = "lsb")]
    pub version: u16,
    #[packed_field(bytes = "6..=7", endian = "lsb")]
    pub report_size: u16,
    #[packed_field(bytes = "8..=11", endian = "lsb")]
    pub frame_count: u32,
    #[packed_field(bytes = "12..=15", endian = "lsb")]
    pub duration_us: u32,
}

impl PackedMacroHeader {
    pub fn new(frame_count: u32, duration_us: u32) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            report_size: REPORT_SIZE as u16,
            frame_count,
            duration_us,
        }
    }

    /// Total length in bytes of a trace with this header, or None if it
    /// does not fit in the address space
    pub fn trace_len(&self) -> Option<usize> {
        (self.frame_count as usize)
            .checked_mul(FRAME_SIZE)?
            .checked_add(HEADER_SIZE)
    }
}

/// Parse and validate the header at the start of the given trace bytes
pub fn read_header(bytes: &[u8]) -> Result<PackedMacroHeader, MacroError> {
    if bytes.len() < HEADER_SIZE {
        return Err(MacroError::Truncated {
            expected: HEADER_SIZE,
            found: bytes.len(),
        });
    }
    let mut buf = [0u8; HEADER_SIZE];
    buf.copy_from_slice(&bytes[..HEADER_SIZE]);
    let header = PackedMacroHeader::unpack(&buf)?;

    let expected_version = match header.magic {
        MAGIC => FORMAT_VERSION,
        MAGIC_V1 => FORMAT_VERSION_V1,
        magic => return Err(MacroError::InvalidMagic(magic)),
    };
    if header.version != expected_version {
        return Err(MacroError::UnsupportedVersion(header.version));
    }
    if header.report_size as usize != REPORT_SIZE {
        return Err(MacroError::ReportSizeMismatch(header.report_size));
    }

    Ok(header)
}

/// Validate a complete trace and return its header. The trace must hold at
/// least as many frames as the header announces.
pub fn validate_trace(bytes: &[u8]) -> Result<PackedMacroHeader, MacroError> {
    let header = read_header(bytes)?;
    let expected = header
        .trace_len()
        .ok_or(MacroError::TooLarge(header.frame_count))?;
    if bytes.len() < expected {
        return Err(MacroError::Truncated {
            expected,
            found: bytes.len(),
        });
    }
    Ok(header)
}

/// Read the frame at the given index of a validated trace
pub fn frame_at(bytes: &[u8], index: usize) -> MacroFrame {
    let offset = HEADER_SIZE + index * FRAME_SIZE;
    let mut timestamp = [0u8; TIMESTAMP_SIZE];
    timestamp.copy_from_slice(&bytes[offset..offset + TIMESTAMP_SIZE]);
    let mut report = [0u8; REPORT_SIZE];
    report.copy_from_slice(&bytes[offset + TIMESTAMP_SIZE..offset + FRAME_SIZE]);
    (u64::from_le_bytes(timestamp), report)
}

/// Serialize frames into a complete trace
pub fn encode_trace(frames: &[MacroFrame]) -> Result<Vec<u8>, MacroError> {
    let duration_us = frames.last().map(|(ts, _)| *ts).unwrap_or(0);
    let header = PackedMacroHeader::new(
        frames.len() as u32,
        duration_us.min(u32::MAX as u64) as u32,
    );

    let mut data = Vec::with_capacity(header.trace_len().unwrap_or_default());
    data.extend_from_slice(&header.pack()?);
    for (timestamp, report) in frames {
        data.extend_from_slice(&timestamp.to_le_bytes());
        data.extend_from_slice(report);
    }
    Ok(data)
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroEntry {
    pub id: u32,
    pub name: String,
    pub filename: String,
    pub frame_count: u32,
    pub duration_ms: u32,
    #[serde(default)]
    pub created: String,
}

/// On-disk catalog. Keeps the highest id ever handed out so that ids are
/// never reused after a delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub next_id: u32,
    #[serde(default)]
    pub macros: Vec<MacroEntry>,
}

impl Catalog {
    /// Allocate the next macro id
    fn allocate_id(&mut self) -> u32 {
        let max_existing = self.macros.iter().map(|e| e.id).max().unwrap_or(0);
        let id = self.next_id.max(max_existing + 1).max(1);
        self.next_id = id + 1;
        id
    }
}

/// Catalog files written before the id high-water mark was tracked are a bare
/// list of entries.
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Current(Catalog),
    Legacy(Vec<MacroEntry>),
}

/// Replace every character that is unsafe in a file name
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

/// File name of the trace for the given id and display name
pub fn trace_filename(id: u32, name: &str) -> String {
    format!("{id:03}_{}.bin", sanitize_name(name))
}

/// Directory backed macro store
#[derive(Debug, Clone)]
pub struct MacroStore {
    dir: PathBuf,
}

impl MacroStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn catalog_path(&self) -> PathBuf {
        self.dir.join(CATALOG_FILE)
    }

    /// Path to the trace file of the given entry
    pub fn trace_path(&self, entry: &MacroEntry) -> PathBuf {
        self.dir.join(&entry.filename)
    }

    /// Load the catalog. A missing catalog is an empty one.
    pub fn load_catalog(&self) -> Result<Catalog, MacroError> {
        let data = match fs::read_to_string(self.catalog_path()) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Catalog::default()),
            Err(e) => return Err(e.into()),
        };
        if data.trim().is_empty() {
            return Ok(Catalog::default());
        }

        let catalog = match serde_json::from_str::<CatalogFile>(&data)? {
            CatalogFile::Current(catalog) => catalog,
            CatalogFile::Legacy(macros) => Catalog {
                next_id: 0,
                macros,
            },
        };
        Ok(catalog)
    }

    /// Rewrite the whole catalog
    fn write_catalog(&self, catalog: &Catalog) -> Result<(), MacroError> {
        fs::create_dir_all(&self.dir)?;
        let data = serde_json::to_string_pretty(catalog)?;
        fs::write(self.catalog_path(), data)?;
        Ok(())
    }

    /// Write the given frames as a new macro and return its id
    pub fn save(&self, frames: &[MacroFrame], name: Option<&str>) -> Result<u32, MacroError> {
        if frames.is_empty() {
            return Err(MacroError::NoData);
        }

        fs::create_dir_all(&self.dir)?;
        let mut catalog = self.load_catalog()?;
        let id = catalog.allocate_id();
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("macro_{id}"),
        };
        let filename = trace_filename(id, &name);

        let data = encode_trace(frames)?;
        let mut file = fs::File::create(self.dir.join(&filename))?;
        file.write_all(&data)?;
        file.flush()?;

        let duration_us = frames.last().map(|(ts, _)| *ts).unwrap_or(0);
        let entry = MacroEntry {
            id,
            name,
            filename,
            frame_count: frames.len() as u32,
            duration_ms: (duration_us / 1000).min(u32::MAX as u64) as u32,
            created: chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false),
        };
        catalog.macros.push(entry);
        self.write_catalog(&catalog)?;

        log::info!(
            "Saved macro {id} ({} frames, {duration_us}us)",
            frames.len()
        );
        Ok(id)
    }

    /// All catalog entries in slot order
    pub fn list(&self) -> Result<Vec<MacroEntry>, MacroError> {
        Ok(self.load_catalog()?.macros)
    }

    pub fn get(&self, id: u32) -> Result<MacroEntry, MacroError> {
        self.list()?
            .into_iter()
            .find(|entry| entry.id == id)
            .ok_or(MacroError::NotFound(id))
    }

    pub fn slot_count(&self) -> Result<usize, MacroError> {
        Ok(self.list()?.len())
    }

    /// Returns the id of the macro in the given slot, if any
    pub fn id_by_slot(&self, slot: usize) -> Result<Option<u32>, MacroError> {
        Ok(self.list()?.get(slot).map(|entry| entry.id))
    }

    /// Rename a macro and its trace file
    pub fn rename(&self, id: u32, new_name: &str) -> Result<(), MacroError> {
        let mut catalog = self.load_catalog()?;
        let Some(entry) = catalog.macros.iter_mut().find(|e| e.id == id) else {
            return Err(MacroError::NotFound(id));
        };

        let new_filename = trace_filename(id, new_name);
        if new_filename != entry.filename {
            let old_path = self.dir.join(&entry.filename);
            if old_path.exists() {
                fs::rename(&old_path, self.dir.join(&new_filename))?;
            } else {
                log::warn!("Trace file {old_path:?} for macro {id} is missing");
            }
        }
        entry.name = new_name.to_string();
        entry.filename = new_filename;
        self.write_catalog(&catalog)?;

        log::info!("Renamed macro {id} to '{new_name}'");
        Ok(())
    }

    /// Delete a macro and its trace file
    pub fn delete(&self, id: u32) -> Result<(), MacroError> {
        let mut catalog = self.load_catalog()?;
        let Some(index) = catalog.macros.iter().position(|e| e.id == id) else {
            return Err(MacroError::NotFound(id));
        };

        let entry = catalog.macros.remove(index);
        // Keep the id retired even if it was the highest one
        catalog.next_id = catalog.next_id.max(id + 1);
        if let Err(e) = fs::remove_file(self.trace_path(&entry)) {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(e.into());
            }
            log::warn!("Trace file {} for macro {id} was already gone", entry.filename);
        }
        self.write_catalog(&catalog)?;

        log::info!("Deleted macro {id}");
        Ok(())
    }

    /// Read and validate the trace of the given macro
    pub fn read_trace(&self, id: u32) -> Result<(PackedMacroHeader, Vec<MacroFrame>), MacroError> {
        let entry = self.get(id)?;
        let bytes = fs::read(self.trace_path(&entry))?;
        let header = validate_trace(&bytes)?;
        let frames = (0..header.frame_count as usize)
            .map(|index| frame_at(&bytes, index))
            .collect();
        Ok((header, frames))
    }
}
