//! # ZIP Archive Builder
//!
//! Packs generated files into a ZIP archive held in memory. Entries are
//! stored uncompressed (method 0), so the only computation per entry is a
//! CRC-32 over its bytes.
//!
//! ## Layout
//!
//! ```text
//! [local header + name + data] * n
//! [central directory record + name] * n
//! [end of central directory]
//! ```
//!
//! Every central directory record carries the byte offset of its local
//! header, and the end record carries the size and offset of the central
//! directory. Both are accumulated while entries are appended; an off-by-one
//! anywhere makes the archive unreadable by standard tools.
//!
//! Entry names are flagged as UTF-8 (general purpose bit 11). ZIP64 is not
//! produced: more than 65 535 entries or offsets past 4 GiB are rejected.

use std::collections::BTreeMap;

use chrono::{Datelike, Local, NaiveDateTime, Timelike};

use crate::errors::ArchiveError;
use crate::models::FileMap;

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4b50;

const VERSION: u16 = 20;
const FLAG_UTF8: u16 = 1 << 11;
const METHOD_STORED: u16 = 0;

const LOCAL_HEADER_LEN: usize = 30;
const CENTRAL_HEADER_LEN: usize = 46;
const END_RECORD_LEN: usize = 22;

/// Archive holding a single file, e.g. `index.html`.
pub fn zip_single(name: &str, content: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    build(&[(name, content)], Local::now().naive_local())
}

/// Archive of a generated file map, entries in path order.
pub fn zip_files(files: &FileMap) -> Result<Vec<u8>, ArchiveError> {
    zip_files_at(files, Local::now().naive_local())
}

/// Same as [`zip_files`] with an explicit modification time. Leading `/`
/// is dropped from paths; two paths that then coincide are an error.
pub fn zip_files_at(files: &FileMap, modified: NaiveDateTime) -> Result<Vec<u8>, ArchiveError> {
    let mut entries = BTreeMap::new();
    for (path, content) in files {
        let name = path.trim_start_matches('/');
        if entries.insert(name, content.as_bytes()).is_some() {
            return Err(ArchiveError::DuplicateEntry(name.to_string()));
        }
    }
    let entries: Vec<(&str, &[u8])> = entries.into_iter().collect();
    build(&entries, modified)
}

struct CentralEntry<'a> {
    name: &'a [u8],
    crc: u32,
    size: u32,
    offset: u32,
}

fn build(entries: &[(&str, &[u8])], modified: NaiveDateTime) -> Result<Vec<u8>, ArchiveError> {
    if entries.len() > usize::from(u16::MAX) {
        return Err(ArchiveError::TooManyEntries(entries.len()));
    }
    let (dos_time, dos_date) = dos_timestamp(modified);

    let capacity = entries
        .iter()
        .map(|(name, data)| LOCAL_HEADER_LEN + CENTRAL_HEADER_LEN + 2 * name.len() + data.len())
        .sum::<usize>()
        + END_RECORD_LEN;
    let mut out = Vec::with_capacity(capacity);
    let mut central = Vec::with_capacity(entries.len());

    for (name, data) in entries {
        let name_bytes = name.as_bytes();
        let name_len =
            u16::try_from(name_bytes.len()).map_err(|_| ArchiveError::NameTooLong((*name).to_string()))?;
        let size = u32::try_from(data.len()).map_err(|_| ArchiveError::TooLarge((*name).to_string()))?;
        let offset = u32::try_from(out.len()).map_err(|_| ArchiveError::TooLarge((*name).to_string()))?;
        let crc = crc32(data);

        put_u32(&mut out, LOCAL_HEADER_SIG);
        put_u16(&mut out, VERSION);
        put_u16(&mut out, FLAG_UTF8);
        put_u16(&mut out, METHOD_STORED);
        put_u16(&mut out, dos_time);
        put_u16(&mut out, dos_date);
        put_u32(&mut out, crc);
        put_u32(&mut out, size); // compressed
        put_u32(&mut out, size); // uncompressed
        put_u16(&mut out, name_len);
        put_u16(&mut out, 0); // extra field length
        out.extend_from_slice(name_bytes);
        out.extend_from_slice(data);

        central.push(CentralEntry {
            name: name_bytes,
            crc,
            size,
            offset,
        });
    }

    let directory_offset =
        u32::try_from(out.len()).map_err(|_| ArchiveError::TooLarge("central directory".to_string()))?;

    for entry in &central {
        put_u32(&mut out, CENTRAL_HEADER_SIG);
        put_u16(&mut out, VERSION); // made by
        put_u16(&mut out, VERSION); // needed to extract
        put_u16(&mut out, FLAG_UTF8);
        put_u16(&mut out, METHOD_STORED);
        put_u16(&mut out, dos_time);
        put_u16(&mut out, dos_date);
        put_u32(&mut out, entry.crc);
        put_u32(&mut out, entry.size);
        put_u32(&mut out, entry.size);
        // name length was range-checked when the local header was written
        put_u16(&mut out, entry.name.len() as u16);
        put_u16(&mut out, 0); // extra
        put_u16(&mut out, 0); // comment
        put_u16(&mut out, 0); // disk number start
        put_u16(&mut out, 0); // internal attributes
        put_u32(&mut out, 0); // external attributes
        put_u32(&mut out, entry.offset);
        out.extend_from_slice(entry.name);
    }

    let directory_size = u32::try_from(out.len() - directory_offset as usize)
        .map_err(|_| ArchiveError::TooLarge("central directory".to_string()))?;
    let count = central.len() as u16;

    put_u32(&mut out, END_OF_CENTRAL_DIR_SIG);
    put_u16(&mut out, 0); // this disk
    put_u16(&mut out, 0); // disk with central directory
    put_u16(&mut out, count);
    put_u16(&mut out, count);
    put_u32(&mut out, directory_size);
    put_u32(&mut out, directory_offset);
    put_u16(&mut out, 0); // comment length

    Ok(out)
}

/// MS-DOS (time, date). Years outside 1980..=2107 are clamped.
fn dos_timestamp(at: NaiveDateTime) -> (u16, u16) {
    let year = at.year().clamp(1980, 2107) as u16;
    let time = ((at.hour() as u16) << 11) | ((at.minute() as u16) << 5) | ((at.second() as u16) >> 1);
    let date = ((year - 1980) << 9) | ((at.month() as u16) << 5) | at.day() as u16;
    (time, date)
}

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = crc_table();

/// CRC-32 (IEEE 802.3, reflected) as used by ZIP.
pub fn crc32(data: &[u8]) -> u32 {
    let mut c = 0xFFFF_FFFFu32;
    for &byte in data {
        c = CRC_TABLE[((c ^ u32::from(byte)) & 0xFF) as usize] ^ (c >> 8);
    }
    c ^ 0xFFFF_FFFF
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}
