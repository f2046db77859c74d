// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A Vorbis COMMENT metadata reader, shared by the FLAC and Ogg-Vorbis formats.

use serenata_core::errors::{decode_error, Result};
use serenata_core::io::{FiniteStream, ReadBytes};
use serenata_core::meta::MetadataMap;

use log::warn;

/// Returns true if every byte is within the printable ASCII range a Vorbis comment field name
/// permits, 0x20 through 0x7d, with 0x3d ('=') excluded.
fn is_valid_key(key: &[u8]) -> bool {
    key.iter().all(|&byte| byte >= 0x20 && byte <= 0x7d && byte != b'=')
}

/// Reads a Vorbis comment block, without the framing bit, and appends its fields to the map.
///
/// Comments are stored as `KEY=VALUE` records. Field names are ASCII and case-insensitive, and
/// are normalised to uppercase before storing. Values must be UTF-8; a record with an invalid
/// value is dropped.
pub fn read_comment_body<B: ReadBytes + FiniteStream>(
    reader: &mut B,
    map: &mut MetadataMap,
) -> Result<()> {
    // Read the vendor string length in bytes and ignore the vendor string.
    let vendor_len = reader.read_u32()?;

    if u64::from(vendor_len) > reader.bytes_available() {
        return decode_error("vorbis: vendor string length too large");
    }

    reader.ignore_bytes(u64::from(vendor_len))?;

    // Read the number of comments.
    let count = reader.read_u32()?;

    for _ in 0..count {
        // Read the comment string length in bytes. The declared length must fit in the remaining
        // block.
        let comment_len = reader.read_u32()?;

        if u64::from(comment_len) > reader.bytes_available() {
            return decode_error("vorbis: comment length too large");
        }

        let mut comment = vec![0u8; comment_len as usize];
        reader.read_buf_exact(&mut comment)?;

        // A comment without a separator can not be interpreted.
        let sep = match comment.iter().position(|&byte| byte == b'=') {
            Some(sep) => sep,
            None => return decode_error("vorbis: comment missing separator"),
        };

        let (key, value) = comment.split_at(sep);

        if !is_valid_key(key) {
            warn!("vorbis: dropped comment with an invalid field name");
            continue;
        }

        // Safety of the conversion was established by the field name validation.
        let key = String::from_utf8_lossy(key).to_ascii_uppercase();

        match std::str::from_utf8(&value[1..]) {
            Ok(value) => map.push(&key, value.to_string()),
            Err(_) => warn!("vorbis: dropped comment with an invalid utf-8 value"),
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn build_comment_body(vendor: &str, comments: &[&str]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    body.extend_from_slice(vendor.as_bytes());
    body.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for comment in comments {
        body.extend_from_slice(&(comment.len() as u32).to_le_bytes());
        body.extend_from_slice(comment.as_bytes());
    }
    body
}

#[cfg(test)]
mod tests {
    use serenata_core::io::BufReader;
    use serenata_core::meta::MetadataMap;

    use super::build_comment_body;

    #[test]
    fn verify_read_comment_body() {
        let body = build_comment_body("vendor", &["artist=Someone", "TITLE=Some Title"]);

        let mut map = MetadataMap::new();
        super::read_comment_body(&mut BufReader::new(&body), &mut map).unwrap();

        // Field names are normalised to uppercase at store time.
        assert_eq!(map.get_first("ARTIST"), Some("Someone"));
        assert_eq!(map.get_first("TITLE"), Some("Some Title"));
        assert!(!map.contains("artist"));
    }

    #[test]
    fn verify_rejects_oversized_vendor() {
        let mut body = Vec::new();
        body.extend_from_slice(&1000u32.to_le_bytes());
        body.extend_from_slice(b"tiny");

        let mut map = MetadataMap::new();
        assert!(super::read_comment_body(&mut BufReader::new(&body), &mut map).is_err());
    }

    #[test]
    fn verify_rejects_missing_separator() {
        let body = build_comment_body("vendor", &["no separator here"]);

        let mut map = MetadataMap::new();
        assert!(super::read_comment_body(&mut BufReader::new(&body), &mut map).is_err());
    }

    #[test]
    fn verify_drops_invalid_utf8_value() {
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&2u32.to_le_bytes());

        let bad = b"KEY=\xff\xfe";
        body.extend_from_slice(&(bad.len() as u32).to_le_bytes());
        body.extend_from_slice(bad);

        let good = b"ARTIST=ok";
        body.extend_from_slice(&(good.len() as u32).to_le_bytes());
        body.extend_from_slice(good);

        let mut map = MetadataMap::new();
        super::read_comment_body(&mut BufReader::new(&body), &mut map).unwrap();

        assert!(!map.contains("KEY"));
        assert_eq!(map.get_first("ARTIST"), Some("ok"));
    }
}
