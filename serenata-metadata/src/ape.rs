// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An APEv1 and APEv2 metadata reader.

use std::io::{Seek, SeekFrom};

use serenata_core::errors::{decode_error, unsupported_error, Result};
use serenata_core::io::{FiniteStream, MediaSourceStream, ReadBytes, ScopedStream};
use serenata_core::meta::{ApeMetadata, ApeTagInfo, Metadata, MetadataMap};

use log::warn;

/// The length of an APE tag header or footer record.
pub const RECORD_LEN: u64 = 32;

/// The minimum length of an item: a 4-byte value size, 4-byte flags, and a key NUL-terminator.
const MIN_ITEM_LEN: u64 = 9;

const HAS_HEADER: u32 = 0x8000_0000;
const HAS_FOOTER: u32 = 0x4000_0000;
const IS_HEADER: u32 = 0x2000_0000;

struct Record {
    info: ApeTagInfo,
    has_header: bool,
    has_footer: bool,
    is_header: bool,
}

impl Record {
    /// Read an APE tag header or footer record.
    fn read<B: ReadBytes>(reader: &mut B) -> Result<Record> {
        let mut preamble = [0; 8];
        reader.read_buf_exact(&mut preamble)?;

        if preamble != *b"APETAGEX" {
            return unsupported_error("ape: invalid preamble");
        }

        // The version is 1000 for APEv1, and 2000 for APEv2.
        let version = reader.read_u32()?;

        if version != 1000 && version != 2000 {
            return unsupported_error("ape: unsupported version");
        }

        let tag_size = reader.read_u32()?;
        let item_count = reader.read_u32()?;
        let flags = reader.read_u32()?;
        let _reserved = reader.read_u64()?;

        // The tag size includes all items and the footer, which the footer itself is part of.
        if u64::from(tag_size) < RECORD_LEN {
            return decode_error("ape: invalid tag size");
        }

        // Flags should be ignored when reading an APEv1 tag. An APEv1 tag always has a footer and
        // never a header.
        let (has_header, has_footer, is_header) = match version {
            1000 => (false, true, false),
            _ => (flags & HAS_HEADER != 0, flags & HAS_FOOTER != 0, flags & IS_HEADER != 0),
        };

        Ok(Record {
            info: ApeTagInfo { version, tag_size, item_count, flags },
            has_header,
            has_footer,
            is_header,
        })
    }
}

/// Item value data types, stored in bits 2..1 of the item flags.
const ITEM_TYPE_UTF8: u32 = 0;

/// Read `count` items from the stream, bounded by `len` bytes, and append the UTF-8 items to the
/// map. Iteration stops early when less than the minimum item length remains.
fn read_items(mss: &mut MediaSourceStream, len: u64, count: u32, map: &mut MetadataMap) -> Result<()> {
    let mut scoped = ScopedStream::new(mss, len);

    for _ in 0..count {
        if scoped.bytes_available() < MIN_ITEM_LEN {
            break;
        }

        let value_len = scoped.read_u32()?;
        let item_flags = scoped.read_u32()?;

        // Read the NUL-terminated key. It may only contain printable ASCII characters.
        let mut key = Vec::new();
        let mut key_is_ascii = true;

        loop {
            let byte = scoped.read_u8()?;

            if byte == 0 {
                break;
            }

            if byte < 0x20 || byte > 0x7e {
                key_is_ascii = false;
            }

            key.push(byte);
        }

        let item_type = (item_flags >> 1) & 0x3;

        if item_type != ITEM_TYPE_UTF8 || !key_is_ascii {
            // Binary, external, and reserved typed items are skipped.
            scoped.ignore_bytes(u64::from(value_len))?;
            continue;
        }

        let mut value = vec![0u8; value_len as usize];
        scoped.read_buf_exact(&mut value)?;

        // Invalid key encoding was already rejected above; the value must also be UTF-8, or the
        // item is dropped.
        match (String::from_utf8(key), String::from_utf8(value)) {
            (Ok(key), Ok(value)) => map.push(&key, value),
            _ => warn!("ape: dropped item with invalid utf-8 value"),
        }
    }

    Ok(())
}

/// Reads an APE tag from its header. The stream must be positioned at the first byte of the
/// header record.
pub fn read_from_header(mss: &mut MediaSourceStream) -> Result<ApeMetadata> {
    let start = mss.pos();

    let record = Record::read(mss)?;

    if !record.is_header {
        return decode_error("ape: not a tag header");
    }

    // The header is not included in the tag size.
    let end = start + RECORD_LEN + u64::from(record.info.tag_size);

    let items_len = u64::from(record.info.tag_size)
        - if record.has_footer { RECORD_LEN } else { 0 };

    let mut map = MetadataMap::new();

    read_items(mss, items_len, record.info.item_count, &mut map)?;

    // Skip any remaining item bytes and the footer.
    mss.seek(SeekFrom::Start(end))?;

    Ok(ApeMetadata {
        metadata: Metadata { map, start_offset: start, end_offset: end },
        header: record.info,
    })
}

/// Reads an APE tag appended at the end of a stream through its footer. `window_end` is the
/// exclusive end position of the tag.
pub fn read_from_footer(mss: &mut MediaSourceStream, window_end: u64) -> Result<ApeMetadata> {
    if window_end < RECORD_LEN {
        return unsupported_error("ape: stream too small for a tag");
    }

    mss.seek(SeekFrom::Start(window_end - RECORD_LEN))?;

    let footer = Record::read(mss)?;

    if footer.is_header {
        return decode_error("ape: header record at end of stream");
    }

    // The tag size covers the items and the footer. The header, if present, precedes them.
    let total = u64::from(footer.info.tag_size)
        + if footer.has_header { RECORD_LEN } else { 0 };

    if total > window_end {
        return decode_error("ape: tag size overruns stream");
    }

    let start = window_end - total;

    mss.seek(SeekFrom::Start(start))?;

    // If the tag has a header, read it and verify it agrees with the footer.
    if footer.has_header {
        let header = Record::read(mss)?;

        if !header.is_header
            || header.info.version != footer.info.version
            || header.info.tag_size != footer.info.tag_size
            || header.info.item_count != footer.info.item_count
        {
            return decode_error("ape: header and footer mismatch");
        }
    }

    let items_len = u64::from(footer.info.tag_size) - RECORD_LEN;

    let mut map = MetadataMap::new();

    read_items(mss, items_len, footer.info.item_count, &mut map)?;

    mss.seek(SeekFrom::Start(window_end))?;

    Ok(ApeMetadata {
        metadata: Metadata { map, start_offset: start, end_offset: window_end },
        header: footer.info,
    })
}

/// Builds an item for an APEv2 tag.
#[cfg(test)]
fn build_item(key: &str, value: &str) -> Vec<u8> {
    let mut item = Vec::new();
    item.extend_from_slice(&(value.len() as u32).to_le_bytes());
    item.extend_from_slice(&0u32.to_le_bytes());
    item.extend_from_slice(key.as_bytes());
    item.push(0);
    item.extend_from_slice(value.as_bytes());
    item
}

/// Builds an APEv2 header or footer record.
#[cfg(test)]
fn build_record(tag_size: u32, item_count: u32, flags: u32) -> Vec<u8> {
    let mut record = Vec::new();
    record.extend_from_slice(b"APETAGEX");
    record.extend_from_slice(&2000u32.to_le_bytes());
    record.extend_from_slice(&tag_size.to_le_bytes());
    record.extend_from_slice(&item_count.to_le_bytes());
    record.extend_from_slice(&flags.to_le_bytes());
    record.extend_from_slice(&[0u8; 8]);
    record
}
