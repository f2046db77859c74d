// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An MP4/QuickTime `ilst` metadata reader.
//!
//! An MP4 file is a tree of atoms. The reader walks `moov → udta → meta → ilst`, reading the
//! iTunes-style metadata items within `ilst`. A malformed child atom is recovered from by seeking
//! to its parent's end and continuing with the parent's next sibling.

use std::io::{Seek, SeekFrom};

use serenata_core::errors::{decode_error, unsupported_error, Result};
use serenata_core::io::{MediaSourceStream, ReadBytes};
use serenata_core::meta::{Metadata, MetadataMap};
use serenata_core::util::text;

use log::{debug, warn};

use crate::id3v1;

/// Size of a standard atom header.
const HEADER_LEN: u64 = 8;
/// Size of an atom header with a 64-bit size.
const LARGE_HEADER_LEN: u64 = 16;

/// A parsed atom header.
#[derive(Copy, Clone, Debug)]
struct AtomHeader {
    /// The atom name.
    name: [u8; 4],
    /// The position of the atom.
    pos: u64,
    /// The exclusive end position of the atom.
    end: u64,
}

impl AtomHeader {
    /// Reads an atom header. The atom, sized or extending to the end of its parent, must lie
    /// within `parent_end`.
    fn read(mss: &mut MediaSourceStream, parent_end: u64) -> Result<AtomHeader> {
        let pos = mss.pos();

        let size = u64::from(mss.read_be_u32()?);
        let name = mss.read_quad_bytes()?;

        let end = match size {
            // An atom size of 0 indicates the atom spans the remainder of the file.
            0 => parent_end,
            // An atom size of 1 indicates a 64-bit atom size follows.
            1 => {
                let large_size = mss.read_be_u64()?;

                if large_size < LARGE_HEADER_LEN {
                    return decode_error("mp4: atom size is smaller than its header");
                }

                pos + large_size
            }
            _ => {
                if size < HEADER_LEN {
                    return decode_error("mp4: atom size is smaller than its header");
                }

                pos + size
            }
        };

        if end > parent_end {
            return decode_error("mp4: atom overruns its parent");
        }

        Ok(AtomHeader { name, pos, end })
    }

    /// Read the version and flags fields that prefix the body of a full atom.
    fn read_extended_header(&self, mss: &mut MediaSourceStream) -> Result<(u8, u32)> {
        let version = mss.read_u8()?;
        let flags = mss.read_be_u24()?;

        Ok((version, flags))
    }

    /// The remaining payload length at the given position.
    fn data_remaining_at(&self, pos: u64) -> u64 {
        self.end.saturating_sub(pos)
    }
}

/// The `ilst` byte ranges and entries accumulated during the walk.
#[derive(Default)]
struct IlstAccumulator {
    map: MetadataMap,
    first_start: Option<u64>,
    last_end: u64,
}

/// Reads the `ilst` metadata of an MP4 stream. The stream must be positioned at the `ftyp` atom.
pub fn read(mss: &mut MediaSourceStream) -> Result<Metadata> {
    let stream_end = match mss.byte_len() {
        Some(len) => len,
        None => return unsupported_error("mp4: stream length must be known"),
    };

    // The first atom must be `ftyp`, otherwise this is not an MP4 stream.
    let ftyp = AtomHeader::read(mss, stream_end)?;

    if ftyp.name != *b"ftyp" {
        return unsupported_error("mp4: missing ftyp atom");
    }

    mss.seek(SeekFrom::Start(ftyp.end))?;

    let mut acc = IlstAccumulator::default();

    // Walk the remaining top-level atoms. Once metadata has been found, errors in the remainder
    // of the stream do not discard it.
    let result = walk_root(mss, stream_end, &mut acc);

    match acc.first_start {
        Some(start) => {
            Ok(Metadata { map: acc.map, start_offset: start, end_offset: acc.last_end })
        }
        None => {
            result?;
            unsupported_error("mp4: no ilst metadata")
        }
    }
}

fn walk_root(mss: &mut MediaSourceStream, stream_end: u64, acc: &mut IlstAccumulator) -> Result<()> {
    while mss.pos() + HEADER_LEN <= stream_end {
        let atom = AtomHeader::read(mss, stream_end)?;

        if atom.name == *b"moov" {
            if let Err(err) = walk_moov(mss, atom, acc) {
                debug!("mp4: recovering from malformed moov child: {}", err);
            }
        }

        mss.seek(SeekFrom::Start(atom.end))?;
    }

    Ok(())
}

fn walk_moov(mss: &mut MediaSourceStream, moov: AtomHeader, acc: &mut IlstAccumulator) -> Result<()> {
    while mss.pos() + HEADER_LEN <= moov.end {
        let atom = AtomHeader::read(mss, moov.end)?;

        if atom.name == *b"udta" {
            if let Err(err) = walk_udta(mss, atom, acc) {
                debug!("mp4: recovering from malformed udta child: {}", err);
            }
        }

        mss.seek(SeekFrom::Start(atom.end))?;
    }

    Ok(())
}

fn walk_udta(mss: &mut MediaSourceStream, udta: AtomHeader, acc: &mut IlstAccumulator) -> Result<()> {
    while mss.pos() + HEADER_LEN <= udta.end {
        let atom = AtomHeader::read(mss, udta.end)?;

        if atom.name == *b"meta" {
            // `meta` is a full atom.
            atom.read_extended_header(mss)?;

            if let Err(err) = walk_meta(mss, atom, acc) {
                debug!("mp4: recovering from malformed meta child: {}", err);
            }
        }

        mss.seek(SeekFrom::Start(atom.end))?;
    }

    Ok(())
}

fn walk_meta(mss: &mut MediaSourceStream, meta: AtomHeader, acc: &mut IlstAccumulator) -> Result<()> {
    while mss.pos() + HEADER_LEN <= meta.end {
        let atom = AtomHeader::read(mss, meta.end)?;

        if atom.name == *b"ilst" {
            acc.first_start.get_or_insert(atom.pos);
            acc.last_end = acc.last_end.max(atom.end);

            if let Err(err) = read_ilst(mss, atom, &mut acc.map) {
                debug!("mp4: recovering from malformed ilst child: {}", err);
            }
        }

        mss.seek(SeekFrom::Start(atom.end))?;
    }

    Ok(())
}

fn read_ilst(mss: &mut MediaSourceStream, ilst: AtomHeader, map: &mut MetadataMap) -> Result<()> {
    while mss.pos() + HEADER_LEN <= ilst.end {
        let item = AtomHeader::read(mss, ilst.end)?;

        // A malformed child of the item is recovered from at the item's end.
        if let Err(err) = read_item(mss, item, map) {
            debug!("mp4: recovering from malformed metadata item: {}", err);
        }

        mss.seek(SeekFrom::Start(item.end))?;
    }

    Ok(())
}

/// Reads one `ilst` metadata item: a freeform (`----`) item keyed by its `mean` and `name`
/// children, or a standard item keyed by its atom name, with one or more `data` children.
fn read_item(mss: &mut MediaSourceStream, item: AtomHeader, map: &mut MetadataMap) -> Result<()> {
    let mut mean: Option<String> = None;
    let mut name: Option<String> = None;

    let is_freeform = item.name == *b"----";

    while mss.pos() + HEADER_LEN <= item.end {
        let child = AtomHeader::read(mss, item.end)?;

        match &child.name {
            b"data" => {
                let key = if is_freeform {
                    match build_freeform_key(&mean, &name) {
                        Some(key) => key,
                        None => {
                            return decode_error("mp4: freeform item missing its mean atom");
                        }
                    }
                }
                else {
                    // Atom names are not always ASCII (`©ART`), so carry them as Latin-1 text.
                    text::decode_latin1(&item.name)
                };

                read_data_atom(mss, child, &item.name, &key, map)?;
            }
            b"mean" => {
                mean = Some(read_full_atom_text(mss, &child)?);
            }
            b"name" => {
                name = Some(read_full_atom_text(mss, &child)?);
            }
            _ => (),
        }

        mss.seek(SeekFrom::Start(child.end))?;
    }

    Ok(())
}

fn build_freeform_key(mean: &Option<String>, name: &Option<String>) -> Option<String> {
    let mean = mean.as_ref()?;

    match name {
        Some(name) => Some(format!("{}.{}", mean, name)),
        None => Some(mean.clone()),
    }
}

/// Reads the UTF-8 payload of a `mean` or `name` full atom.
fn read_full_atom_text(mss: &mut MediaSourceStream, atom: &AtomHeader) -> Result<String> {
    let (_, _) = atom.read_extended_header(mss)?;

    let len = atom.data_remaining_at(mss.pos());

    let mut buf = vec![0u8; len as usize];
    mss.read_buf_exact(&mut buf)?;

    match String::from_utf8(buf) {
        Ok(value) => Ok(value),
        Err(_) => decode_error("mp4: freeform key is not utf-8"),
    }
}

/// The basic data types recognised within a `data` atom.
const DATA_TYPE_IMPLICIT: u32 = 0;
const DATA_TYPE_UTF8: u32 = 1;
const DATA_TYPE_UTF16_BE: u32 = 2;
const DATA_TYPE_BE_SIGNED_INT: u32 = 21;

/// Reads one `data` atom of a metadata item and appends its value, if representable as text, to
/// the map.
fn read_data_atom(
    mss: &mut MediaSourceStream,
    data: AtomHeader,
    item_name: &[u8; 4],
    key: &str,
    map: &mut MetadataMap,
) -> Result<()> {
    // The 4-byte type indicator: the high byte selects a type-set, and, for type-set 0, the low
    // 24 bits select a basic type from the well-known set.
    let (type_set, basic_type) = {
        let indicator = mss.read_be_u32()?;
        (indicator >> 24, indicator & 0x00ff_ffff)
    };

    // The 4-byte locale indicator is not used.
    let _locale = mss.read_be_u32()?;

    if type_set != 0 {
        warn!("mp4: skipping data atom with unknown type-set {}", type_set);
        return Ok(());
    }

    let len = data.data_remaining_at(mss.pos());

    let mut payload = vec![0u8; len as usize];
    mss.read_buf_exact(&mut payload)?;

    match basic_type {
        DATA_TYPE_UTF8 => match String::from_utf8(payload) {
            Ok(value) => map.push(key, value),
            Err(_) => warn!("mp4: dropped a data atom with invalid utf-8"),
        },
        DATA_TYPE_UTF16_BE => match text::decode_utf16be(&payload) {
            Some(value) => map.push(key, value),
            None => warn!("mp4: dropped a data atom with invalid utf-16"),
        },
        DATA_TYPE_BE_SIGNED_INT => match read_be_signed_int(&payload) {
            Some(value) => map.push(key, value.to_string()),
            None => warn!("mp4: dropped a signed integer data atom with an invalid width"),
        },
        DATA_TYPE_IMPLICIT => read_implicit_data(&payload, item_name, key, map),
        _ => {
            debug!("mp4: skipping data atom with unsupported type {}", basic_type);
        }
    }

    Ok(())
}

/// Interprets a big-endian signed integer of width 1, 2, 3, 4, or 8 bytes.
fn read_be_signed_int(payload: &[u8]) -> Option<i64> {
    let value = match *payload {
        [b0] => i64::from(b0 as i8),
        [b0, b1] => i64::from(i16::from_be_bytes([b0, b1])),
        [b0, b1, b2] => {
            // Sign-extend the 24-bit value.
            i64::from(i32::from_be_bytes([b0, b1, b2, 0]) >> 8)
        }
        [b0, b1, b2, b3] => i64::from(i32::from_be_bytes([b0, b1, b2, b3])),
        [b0, b1, b2, b3, b4, b5, b6, b7] => {
            i64::from_be_bytes([b0, b1, b2, b3, b4, b5, b6, b7])
        }
        _ => return None,
    };

    Some(value)
}

/// Interprets an implicitly-typed data payload. The interpretation depends on the item: `trkn`
/// and `disk` hold 16-bit number/total tuples, `gnre` holds a 1-based ID3v1 genre index. All
/// other implicitly-typed payloads are skipped.
fn read_implicit_data(payload: &[u8], item_name: &[u8; 4], key: &str, map: &mut MetadataMap) {
    match item_name {
        b"trkn" | b"disk" => {
            // A reserved 16-bit field, the number, and optionally the total, followed by
            // trailing bytes.
            if payload.len() < 4 {
                warn!("mp4: dropped an undersized number/total data atom");
                return;
            }

            let number = u16::from_be_bytes([payload[2], payload[3]]);

            let total = match payload.get(4..6) {
                Some(total) => u16::from_be_bytes([total[0], total[1]]),
                None => 0,
            };

            let value = if total != 0 {
                format!("{}/{}", number, total)
            }
            else {
                number.to_string()
            };

            map.push(key, value);
        }
        b"gnre" => {
            // A 16-bit genre identifier, offset one from the ID3v1 genre table.
            if payload.len() != 2 {
                warn!("mp4: dropped an undersized genre data atom");
                return;
            }

            let index = u16::from_be_bytes([payload[0], payload[1]]);

            if index == 0 || index > 256 {
                return;
            }

            if let Some(genre) = id3v1::genre_name((index - 1) as u8) {
                map.push(key, genre.to_string());
            }
        }
        _ => {
            debug!("mp4: skipping implicitly-typed data for item {:x?}", item_name);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Builds an atom from its name and body.
    pub fn atom(name: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(body);
        out
    }

    /// Builds a full atom (version + flags prefix) from its name and body.
    pub fn full_atom(name: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut full = vec![0u8; 4];
        full.extend_from_slice(body);
        atom(name, &full)
    }

    /// Builds a `data` atom with the given basic type and payload.
    pub fn data_atom(basic_type: u32, payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&basic_type.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(payload);
        atom(b"data", &body)
    }

    pub fn ftyp() -> Vec<u8> {
        atom(b"ftyp", b"M4A \x00\x00\x02\x00")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serenata_core::io::MediaSourceStream;

    use super::test_support::{atom, data_atom, ftyp, full_atom};

    fn read(data: Vec<u8>) -> super::Result<serenata_core::meta::Metadata> {
        let mut mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
        super::read(&mut mss)
    }

    #[test]
    fn verify_read_standard_items() {
        let ilst = atom(
            b"ilst",
            &[
                atom(b"\xa9nam", &data_atom(1, b"A Title")),
                atom(b"trkn", &data_atom(0, &[0, 0, 0, 3, 0, 12, 0, 0])),
                atom(b"gnre", &data_atom(0, &[0, 18])),
            ]
            .concat(),
        );

        let meta = atom(b"meta", &[vec![0u8; 4], atom(b"hdlr", &[0u8; 24]), ilst].concat());
        let moov = atom(b"moov", &atom(b"udta", &meta));

        let mut data = ftyp();
        data.extend_from_slice(&moov);

        let meta = read(data).unwrap();

        assert_eq!(meta.map.get_first("\u{a9}nam"), Some("A Title"));
        assert_eq!(meta.map.get_first("trkn"), Some("3/12"));
        // The stored genre identifier is 1-based against the ID3v1 genre table.
        assert_eq!(meta.map.get_first("gnre"), Some("Rock"));
    }

    #[test]
    fn verify_read_freeform_item() {
        let item = atom(
            b"----",
            &[
                full_atom(b"mean", b"com.apple.iTunes"),
                full_atom(b"name", b"replaygain_track_gain"),
                data_atom(1, b"-6.1 dB"),
            ]
            .concat(),
        );

        let ilst = atom(b"ilst", &item);
        let meta = atom(b"meta", &[vec![0u8; 4], ilst].concat());
        let moov = atom(b"moov", &atom(b"udta", &meta));

        let mut data = ftyp();
        data.extend_from_slice(&moov);

        let meta = read(data).unwrap();

        assert_eq!(
            meta.map.get_first("com.apple.iTunes.replaygain_track_gain"),
            Some("-6.1 dB")
        );
    }

    #[test]
    fn verify_rejects_missing_ftyp() {
        let data = atom(b"moov", &[]);
        assert!(read(data).is_err());
    }

    #[test]
    fn verify_rejects_stream_without_ilst() {
        let mut data = ftyp();
        data.extend_from_slice(&atom(b"moov", &atom(b"udta", &[])));

        assert!(read(data).is_err());
    }

    #[test]
    fn verify_large_atom_size() {
        // A moov atom written with a 64-bit size.
        let ilst = atom(b"ilst", &atom(b"\xa9alb", &data_atom(1, b"Large")));
        let meta = atom(b"meta", &[vec![0u8; 4], ilst].concat());
        let udta = atom(b"udta", &meta);

        let mut moov = Vec::new();
        moov.extend_from_slice(&1u32.to_be_bytes());
        moov.extend_from_slice(b"moov");
        moov.extend_from_slice(&((udta.len() + 16) as u64).to_be_bytes());
        moov.extend_from_slice(&udta);

        let mut data = ftyp();
        data.extend_from_slice(&moov);

        let meta = read(data).unwrap();

        assert_eq!(meta.map.get_first("\u{a9}alb"), Some("Large"));
    }

    #[test]
    fn verify_multiple_data_atoms_per_item() {
        let item = atom(b"\xa9gen", &[data_atom(1, b"Rock"), data_atom(1, b"Blues")].concat());

        let ilst = atom(b"ilst", &item);
        let meta = atom(b"meta", &[vec![0u8; 4], ilst].concat());
        let moov = atom(b"moov", &atom(b"udta", &meta));

        let mut data = ftyp();
        data.extend_from_slice(&moov);

        let meta = read(data).unwrap();

        assert_eq!(meta.map.get_all("\u{a9}gen"), vec!["Rock", "Blues"]);
    }

    #[test]
    fn verify_utf16_and_integer_data() {
        let ilst = atom(
            b"ilst",
            &[
                atom(b"\xa9ART", &data_atom(2, &[0x00, 0x68, 0x00, 0x69])),
                atom(b"tmpo", &data_atom(21, &[0x00, 0x80])),
            ]
            .concat(),
        );

        let meta = atom(b"meta", &[vec![0u8; 4], ilst].concat());
        let moov = atom(b"moov", &atom(b"udta", &meta));

        let mut data = ftyp();
        data.extend_from_slice(&moov);

        let meta = read(data).unwrap();

        assert_eq!(meta.map.get_first("\u{a9}ART"), Some("hi"));
        assert_eq!(meta.map.get_first("tmpo"), Some("128"));
    }
}
