// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! On-disk map tile container.
//!
//! A tile is a single little-endian file holding a handful of independently
//! versioned sections behind a directory:
//!
//! ```text
//! magic "RTIL" | container version u16 | section count varint
//! per section: tag string | version u16 | offset u64 | length u64 | crc32 u32
//! section payloads...
//! ```
//!
//! [`TileContainer`] memory-maps the file and verifies a section's CRC-32
//! the first time it is handed out. A missing optional section is `Ok(None)`;
//! a present section that fails its checksum is an error.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

pub mod codec;
pub mod sections;

pub use sections::{RoadRecord, SpeedCamera, Transition};

pub const MAGIC: [u8; 4] = *b"RTIL";
pub const CONTAINER_VERSION: u16 = 1;

/// Section tags. `GEOMETRY` and `JOINTS` are mandatory, the rest optional.
pub mod tags {
    pub const GEOMETRY: &str = "geometry";
    pub const JOINTS: &str = "joints";
    pub const RESTRICTIONS: &str = "restrictions";
    pub const ROAD_ACCESS: &str = "road_access";
    pub const SPEED_CAMS: &str = "speed_cams";
    pub const TRANSITIONS: &str = "transitions";
}

#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a tile file (bad magic)")]
    BadMagic,

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u16),

    #[error("section {tag:?} has unsupported version {version}")]
    UnsupportedSectionVersion { tag: String, version: u16 },

    #[error("section {0:?} is missing")]
    MissingSection(&'static str),

    #[error("section {0:?} failed its checksum")]
    ChecksumMismatch(String),

    #[error("section {0:?} points outside the file")]
    SectionOutOfBounds(String),

    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error("varint longer than 64 bits")]
    VarintOverflow,

    #[error("string is not valid utf-8")]
    InvalidString,

    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

#[derive(Debug, Clone)]
struct SectionEntry {
    tag: String,
    version: u16,
    offset: u64,
    length: u64,
    crc32: u32,
}

/// A checked view into one section of an open tile.
#[derive(Debug, Clone, Copy)]
pub struct Section<'a> {
    pub version: u16,
    pub data: &'a [u8],
}

/// A memory-mapped, directory-parsed tile file.
#[derive(Debug)]
pub struct TileContainer {
    mmap: Arc<Mmap>,
    directory: Vec<SectionEntry>,
}

impl TileContainer {
    pub fn open(path: &Path) -> Result<Self, TileError> {
        let file = File::open(path)?;
        // Tiles are read-only after generation, so the mapping stays valid.
        let mmap = unsafe { Mmap::map(&file)? };

        let mut r = codec::Reader::new(&mmap);
        let mut magic = [0u8; 4];
        for byte in &mut magic {
            *byte = r.read_u8()?;
        }
        if magic != MAGIC {
            return Err(TileError::BadMagic);
        }

        let version = r.read_u16()?;
        if version != CONTAINER_VERSION {
            return Err(TileError::UnsupportedVersion(version));
        }

        let count = r.read_varint()? as usize;
        let mut directory = Vec::with_capacity(count);
        for _ in 0..count {
            let tag = r.read_string()?;
            let version = r.read_u16()?;
            let offset = r.read_u64()?;
            let length = r.read_u64()?;
            let crc32 = r.read_u32()?;
            directory.push(SectionEntry {
                tag,
                version,
                offset,
                length,
                crc32,
            });
        }

        let container = Self {
            mmap: Arc::new(mmap),
            directory,
        };
        for entry in &container.directory {
            container.bounds_of(entry)?;
        }
        Ok(container)
    }

    fn bounds_of(&self, entry: &SectionEntry) -> Result<(usize, usize), TileError> {
        let start = usize::try_from(entry.offset)
            .map_err(|_| TileError::SectionOutOfBounds(entry.tag.clone()))?;
        let end = entry
            .offset
            .checked_add(entry.length)
            .and_then(|end| usize::try_from(end).ok())
            .filter(|&end| end <= self.mmap.len())
            .ok_or_else(|| TileError::SectionOutOfBounds(entry.tag.clone()))?;
        Ok((start, end))
    }

    /// Returns the named section, or `None` if the tile doesn't carry it.
    /// The payload's CRC-32 is verified before it is handed out.
    pub fn section(&self, tag: &str) -> Result<Option<Section<'_>>, TileError> {
        let entry = match self.directory.iter().find(|e| e.tag == tag) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let (start, end) = self.bounds_of(entry)?;
        let data = &self.mmap[start..end];
        if crc32fast::hash(data) != entry.crc32 {
            return Err(TileError::ChecksumMismatch(entry.tag.clone()));
        }
        Ok(Some(Section {
            version: entry.version,
            data,
        }))
    }

    /// Like [`TileContainer::section`], but a missing section is an error.
    pub fn required_section(&self, tag: &'static str) -> Result<Section<'_>, TileError> {
        self.section(tag)?.ok_or(TileError::MissingSection(tag))
    }
}

/// Builds a tile file section by section. Used by tile generation and tests.
#[derive(Debug, Default)]
pub struct TileWriter {
    sections: Vec<(String, u16, Vec<u8>)>,
}

impl TileWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_section(&mut self, tag: &str, version: u16, data: Vec<u8>) {
        self.sections.push((tag.to_string(), version, data));
    }

    pub fn write_to(&self, path: &Path) -> Result<(), TileError> {
        let mut file = File::create(path)?;
        file.write_all(&self.to_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // The directory length depends only on tags, so it can be sized
        // up front and payload offsets computed before anything is written.
        let mut directory_len = 0usize;
        for (tag, _, _) in &self.sections {
            let mut tag_len = Vec::new();
            codec::write_string(&mut tag_len, tag);
            directory_len += tag_len.len() + 2 + 8 + 8 + 4;
        }

        let mut header = Vec::new();
        header.extend_from_slice(&MAGIC);
        codec::write_u16(&mut header, CONTAINER_VERSION);
        codec::write_varint(&mut header, self.sections.len() as u64);

        let mut offset = (header.len() + directory_len) as u64;
        let mut out = header;
        for (tag, version, data) in &self.sections {
            codec::write_string(&mut out, tag);
            codec::write_u16(&mut out, *version);
            codec::write_u64(&mut out, offset);
            codec::write_u64(&mut out, data.len() as u64);
            codec::write_u32(&mut out, crc32fast::hash(data));
            offset += data.len() as u64;
        }
        for (_, _, data) in &self.sections {
            out.extend_from_slice(data);
        }
        out
    }
}
