// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ID3v2 frame body readers.

use serenata_core::errors::{decode_error, Result};
use serenata_core::io::{BufReader, FiniteStream, ReadBytes};
use serenata_core::util::text;

use smallvec::SmallVec;

/// Enumeration of valid encodings for text fields in ID3v2 tags.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// ISO-8859-1 (aka. Latin-1), terminated with 0x00.
    Latin1,
    /// UTF-16 with a byte-order-mark (BOM), terminated with 0x00 0x00.
    Utf16Bom,
    /// UTF-16 big-endian without a byte-order-mark (BOM), terminated with 0x00 0x00.
    Utf16Be,
    /// UTF-8, terminated with 0x00.
    Utf8,
}

impl Encoding {
    pub fn parse(encoding: u8) -> Option<Encoding> {
        match encoding {
            0 => Some(Encoding::Latin1),
            1 => Some(Encoding::Utf16Bom),
            2 => Some(Encoding::Utf16Be),
            3 => Some(Encoding::Utf8),
            // Invalid encoding.
            _ => None,
        }
    }
}

/// Read and validate an encoding indicator.
fn read_encoding(reader: &mut BufReader<'_>) -> Result<Encoding> {
    match reader.read_byte().ok().and_then(Encoding::parse) {
        Some(encoding) => Ok(encoding),
        _ => decode_error("id3v2: invalid text encoding"),
    }
}

/// Decodes a slice of bytes containing encoded text into a `String`. The bytes must not contain
/// the string terminator.
fn decode_text(buf: &[u8], encoding: Encoding) -> Result<String> {
    match encoding {
        Encoding::Latin1 => Ok(text::decode_latin1(buf)),
        Encoding::Utf8 => match String::from_utf8(buf.to_vec()) {
            Ok(decoded) => Ok(decoded),
            Err(_) => decode_error("id3v2: invalid utf-8 text"),
        },
        Encoding::Utf16Bom => {
            // An empty string carries no byte-order-mark.
            if buf.is_empty() {
                return Ok(String::new());
            }

            let decoded = match buf.split_at_checked(2) {
                Some(([0xfe, 0xff], rest)) => text::decode_utf16be(rest),
                Some(([0xff, 0xfe], rest)) => text::decode_utf16le(rest),
                _ => return decode_error("id3v2: invalid utf-16 byte-order-mark"),
            };

            match decoded {
                Some(decoded) => Ok(decoded),
                None => decode_error("id3v2: invalid utf-16 data"),
            }
        }
        Encoding::Utf16Be => match text::decode_utf16be(buf) {
            Some(decoded) => Ok(decoded),
            None => decode_error("id3v2: invalid utf-16 data"),
        },
    }
}

/// A string read from a frame body, and whether its terminator was present.
struct FrameString {
    text: String,
    terminated: bool,
}

/// Reads a null-terminated string of the specified encoding from the frame body. If the body
/// ends before the terminator is reached, all the bytes up-to that point are interpreted as the
/// string.
fn read_string(reader: &mut BufReader<'_>, encoding: Encoding) -> Result<FrameString> {
    let max_len = reader.bytes_available() as usize;

    let (buf, terminated) = match encoding {
        Encoding::Latin1 | Encoding::Utf8 => {
            // Byte-aligned encodings. The null-terminator is 1 byte.
            let buf = reader.scan_bytes_aligned_ref(&[0x00], 1, max_len)?;
            match buf.last() {
                Some(b'\0') => (&buf[..buf.len() - 1], true),
                _ => (buf, false),
            }
        }
        Encoding::Utf16Bom | Encoding::Utf16Be => {
            // Two-byte aligned encodings. The null-terminator is 2 bytes.
            let buf = reader.scan_bytes_aligned_ref(&[0x00, 0x00], 2, max_len)?;
            match buf.last_chunk::<2>() {
                Some(b"\0\0") => (&buf[..buf.len() - 2], true),
                _ => (buf, false),
            }
        }
    };

    Ok(FrameString { text: decode_text(buf, encoding)?, terminated })
}

/// Reads a text frame body (`T***` excluding `TXXX`/`TXX`): an encoding indicator followed by one
/// or more null-terminated strings. Empty strings are dropped.
pub fn read_text_frame(data: &[u8]) -> Result<SmallVec<[String; 1]>> {
    if data.is_empty() {
        return decode_error("id3v2: frame has a size of 0");
    }

    let mut reader = BufReader::new(data);
    let encoding = read_encoding(&mut reader)?;

    let mut values: SmallVec<[String; 1]> = Default::default();

    // Read strings until the body is exhausted. Multiple null-terminated strings are an ID3v2.4
    // feature, but are accepted in all versions.
    loop {
        let value = read_string(&mut reader, encoding)?;

        if !value.text.is_empty() {
            values.push(value.text);
        }

        if reader.bytes_available() == 0 {
            break;
        }
    }

    Ok(values)
}

/// Reads a user-defined text frame body (`TXXX`/`TXX`): an encoding indicator, a null-terminated
/// description used as the key, and the value.
pub fn read_user_text_frame(data: &[u8]) -> Result<(String, String)> {
    if data.is_empty() {
        return decode_error("id3v2: frame has a size of 0");
    }

    let mut reader = BufReader::new(data);
    let encoding = read_encoding(&mut reader)?;

    let desc = read_string(&mut reader, encoding)?;

    // Without a terminated description there is no value string at all.
    if !desc.terminated {
        return decode_error("id3v2: malformed user-defined text frame");
    }

    let value = read_string(&mut reader, encoding)?;

    Ok((desc.text, value.text))
}

/// Reads a comment (`COMM`/`COM`) or unsynchronized lyrics (`USLT`/`ULT`) frame body: an encoding
/// indicator, a 3-byte language code, a null-terminated description, and the text.
pub fn read_full_text_frame(data: &[u8]) -> Result<([u8; 3], String, String)> {
    if data.is_empty() {
        return decode_error("id3v2: frame has a size of 0");
    }

    let mut reader = BufReader::new(data);
    let encoding = read_encoding(&mut reader)?;

    let language = match reader.read_triple_bytes() {
        Ok(language) => language,
        Err(_) => return decode_error("id3v2: frame text ended unexpectedly"),
    };

    let desc = read_string(&mut reader, encoding)?;

    // The remainder of the body is the text. A trailing terminator, if present, is trimmed.
    let value = read_string(&mut reader, encoding)?;

    Ok((language, desc.text, value.text))
}
