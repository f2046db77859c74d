// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An ID3v2 (versions 2.2 through 2.4) tag reader.

use std::io::{Seek, SeekFrom};

use serenata_core::errors::{decode_error, end_of_stream_error, unsupported_error, Result};
use serenata_core::io::{FiniteStream, MediaSourceStream, ReadBytes, ScopedStream};
use serenata_core::meta::{FullTextMap, Id3v2Metadata, Id3v2TagInfo, Metadata, MetadataMap};

use log::{debug, warn};

mod frames;
pub mod sync;

use sync::{decode_syncsafe_u28, decode_unsynchronisation, read_syncsafe_leq32, UnsyncStream};

/// Size of the tag header, and of the optional ID3v2.4 footer.
const TAG_HEADER_LEN: u64 = 10;

#[derive(Debug)]
struct Header {
    major_version: u8,
    revision: u8,
    flags: u8,
    size: u32,
    unsynchronisation: bool,
    compression: bool,
    has_extended_header: bool,
    has_footer: bool,
}

/// Read the header of an ID3v2 (versions 2.2+) tag.
fn read_header<B: ReadBytes>(reader: &mut B) -> Result<Header> {
    let marker = reader.read_triple_bytes()?;

    if marker != *b"ID3" {
        return unsupported_error("id3v2: not an ID3v2 tag");
    }

    let major_version = reader.read_u8()?;
    let revision = reader.read_u8()?;
    let flags = reader.read_u8()?;
    let size = read_syncsafe_leq32(reader, 28)?;

    // Major and minor version numbers should never equal 0xff as per the specification.
    if major_version == 0xff || revision == 0xff {
        return decode_error("id3v2: invalid version number(s)");
    }

    // Only versions 2.2.x through 2.4.x are defined.
    if major_version < 2 || major_version > 4 {
        return unsupported_error("id3v2: unsupported ID3v2 version");
    }

    let mut header = Header {
        major_version,
        revision,
        flags,
        size,
        unsynchronisation: flags & 0x80 != 0,
        compression: false,
        has_extended_header: false,
        has_footer: false,
    };

    // With the exception of the version 2.2 compression flag, flags were added sequentially each
    // major version.
    if major_version == 2 {
        header.compression = flags & 0x40 != 0;
    }

    if major_version >= 3 {
        header.has_extended_header = flags & 0x40 != 0;
    }

    if major_version >= 4 {
        header.has_footer = flags & 0x10 != 0;
    }

    Ok(header)
}

/// Skip the extended header of an ID3v2.3 tag. The declared size excludes the 4 size bytes.
fn skip_id3v2p3_extended_header(reader: &mut BodyCursor<'_>) -> Result<()> {
    let size = reader.read_be_u32()?;

    if !(size == 6 || size == 10) {
        return decode_error("id3v2: invalid extended header size");
    }

    reader.skip(size as usize)
}

/// Skip the extended header of an ID3v2.4 tag. The declared size is synchsafe and includes its
/// own 4 size bytes.
fn skip_id3v2p4_extended_header(reader: &mut BodyCursor<'_>) -> Result<()> {
    let size = read_syncsafe_leq32(reader, 28)?;

    if size < 6 {
        return decode_error("id3v2: extended header size too small");
    }

    reader.skip(size as usize - 4)
}

/// A cursor over the buffered tag body.
struct BodyCursor<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> BodyCursor<'a> {
    fn new(body: &'a [u8]) -> Self {
        BodyCursor { body, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.body.len() - self.pos
    }

    fn skip(&mut self, count: usize) -> Result<()> {
        if count > self.remaining() {
            return end_of_stream_error();
        }
        self.pos += count;
        Ok(())
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return end_of_stream_error();
        }
        self.pos += count;
        Ok(&self.body[self.pos - count..self.pos])
    }

    /// Peek at the 4 bytes at an absolute body offset, if available.
    fn peek_at(&self, pos: usize) -> Option<&'a [u8]> {
        self.body.get(pos..pos + 4)
    }
}

impl ReadBytes for BodyCursor<'_> {
    fn read_byte(&mut self) -> std::io::Result<u8> {
        match self.body.get(self.pos) {
            Some(&byte) => {
                self.pos += 1;
                Ok(byte)
            }
            None => Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "out of bounds")),
        }
    }

    fn read_double_bytes(&mut self) -> std::io::Result<[u8; 2]> {
        let mut bytes = [0; 2];
        self.read_buf_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_triple_bytes(&mut self) -> std::io::Result<[u8; 3]> {
        let mut bytes = [0; 3];
        self.read_buf_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_quad_bytes(&mut self) -> std::io::Result<[u8; 4]> {
        let mut bytes = [0; 4];
        self.read_buf_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_buf(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let len = buf.len().min(self.remaining());
        buf[..len].copy_from_slice(&self.body[self.pos..self.pos + len]);
        self.pos += len;
        Ok(len)
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        if buf.len() > self.remaining() {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "out of bounds"));
        }
        buf.copy_from_slice(&self.body[self.pos..self.pos + buf.len()]);
        self.pos += buf.len();
        Ok(())
    }

    fn ignore_bytes(&mut self, count: u64) -> std::io::Result<()> {
        if count > self.remaining() as u64 {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "out of bounds"));
        }
        self.pos += count as usize;
        Ok(())
    }

    fn pos(&self) -> u64 {
        self.pos as u64
    }
}

/// Validates that a frame id only contains uppercase letters (A-Z) and digits (0-9).
fn is_valid_frame_id(id: &[u8]) -> bool {
    id.iter().all(|byte| byte.is_ascii_uppercase() || byte.is_ascii_digit())
}

/// A parsed per-version frame header.
struct FrameHeader {
    /// The frame id, as written in the tag.
    id: String,
    /// The length of the frame header, plus any flag extension bytes.
    prelude_len: usize,
    /// The length of the frame body following the prelude.
    body_len: usize,
    /// The frame body is unsynchronised (ID3v2.4 only).
    unsynchronised: bool,
    /// The frame is compressed or encrypted and must be skipped.
    skip: bool,
}

enum FrameOutcome {
    Frame(FrameHeader),
    /// Padding was encountered. The remainder of the tag may be skipped.
    Padding,
    /// The frame header is malformed. The rest of the tag must be abandoned.
    Malformed,
}

/// Read an ID3v2.2 frame header.
fn read_id3v2p2_frame_header(cursor: &BodyCursor<'_>) -> FrameOutcome {
    let header = &cursor.body[cursor.pos..];

    let id = &header[0..3];

    if !is_valid_frame_id(id) {
        // As per the specification, padding should be all 0s, but there are some tags which don't
        // obey the specification.
        if id.iter().any(|&byte| byte != 0) {
            warn!("id3v2: padding bytes not zero");
        }
        return FrameOutcome::Padding;
    }

    let size = u32::from_be_bytes([0, header[3], header[4], header[5]]) as usize;

    FrameOutcome::Frame(FrameHeader {
        id: String::from_utf8_lossy(id).into_owned(),
        prelude_len: 6,
        body_len: size,
        unsynchronised: false,
        skip: false,
    })
}

/// Read an ID3v2.3 frame header.
fn read_id3v2p3_frame_header(cursor: &BodyCursor<'_>) -> FrameOutcome {
    let header = &cursor.body[cursor.pos..];

    let id = &header[0..4];

    // An iTunes bug writes ID3v2.2 3 character frame ids into ID3v2.3 tags. Such a frame id has a
    // NUL as its 4th byte, and is otherwise valid.
    let id = if id[3] == 0 && is_valid_frame_id(&id[0..3]) { &id[0..3] } else { id };

    if !is_valid_frame_id(id) {
        if id.iter().any(|&byte| byte != 0) {
            warn!("id3v2: padding bytes not zero");
        }
        return FrameOutcome::Padding;
    }

    let size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let flags = u16::from_be_bytes([header[8], header[9]]);

    // Unused flag bits must be cleared.
    if flags & 0x1f1f != 0 {
        return FrameOutcome::Malformed;
    }

    let is_compressed = flags & 0x0080 != 0;
    let is_encrypted = flags & 0x0040 != 0;
    let is_grouped = flags & 0x0020 != 0;

    // When some flags are set, the frame header is extended with additional fields.
    let flag_data_len = if is_compressed { 4 } else { 0 } // 4-byte decompressed size.
        + if is_encrypted { 1 } else { 0 } // 1-byte encryption method.
        + if is_grouped { 1 } else { 0 }; // 1-byte group id.

    if size < flag_data_len {
        return FrameOutcome::Malformed;
    }

    FrameOutcome::Frame(FrameHeader {
        id: String::from_utf8_lossy(id).into_owned(),
        prelude_len: 10 + flag_data_len as usize,
        body_len: (size - flag_data_len) as usize,
        unsynchronised: false,
        skip: is_compressed || is_encrypted,
    })
}

/// Read an ID3v2.4 frame header.
///
/// ID3v2.4 frame sizes are synchsafe, however, many real-world encoders incorrectly write
/// non-synchsafe sizes. When the interpretations differ, the size under which a valid next frame
/// header follows the frame is used.
fn read_id3v2p4_frame_header(cursor: &BodyCursor<'_>) -> FrameOutcome {
    let header = &cursor.body[cursor.pos..];

    let id = &header[0..4];

    if !is_valid_frame_id(id) {
        if id.iter().any(|&byte| byte != 0) {
            warn!("id3v2: padding bytes not zero");
        }
        return FrameOutcome::Padding;
    }

    let size_bytes = [header[4], header[5], header[6], header[7]];
    let flags = u16::from_be_bytes([header[8], header[9]]);

    // Unused flag bits must be cleared.
    if flags & 0x8fb0 != 0 {
        return FrameOutcome::Malformed;
    }

    let syncsafe_size = decode_syncsafe_u28(size_bytes);

    let size = if sync::is_slice_syncsafe(&size_bytes) {
        // Both interpretations are identical.
        syncsafe_size
    }
    else {
        // The size is not synchsafe as written. Probe the candidate next-frame position of the
        // synchsafe interpretation first, and fall back to the raw interpretation if it does not
        // validate. When neither validates, keep the synchsafe interpretation.
        let raw_size = u32::from_be_bytes(size_bytes);

        if validates_as_next_frame(cursor, syncsafe_size) {
            syncsafe_size
        }
        else if validates_as_next_frame(cursor, raw_size) {
            debug!("id3v2: using non-synchsafe frame size");
            raw_size
        }
        else {
            syncsafe_size
        }
    };

    let is_grouped = flags & 0x0040 != 0;
    let is_compressed = flags & 0x0008 != 0;
    let is_encrypted = flags & 0x0004 != 0;
    let is_unsynchronised = flags & 0x0002 != 0;
    let has_data_length = flags & 0x0001 != 0;

    // When some flags are set, the frame header is extended with additional fields.
    let flag_data_len = if is_grouped { 1 } else { 0 } // 1-byte group id.
        + if is_encrypted { 1 } else { 0 } // 1-byte encryption method.
        + if has_data_length { 4 } else { 0 }; // 4-byte data length indicator.

    if size < flag_data_len {
        return FrameOutcome::Malformed;
    }

    FrameOutcome::Frame(FrameHeader {
        id: String::from_utf8_lossy(id).into_owned(),
        prelude_len: 10 + flag_data_len as usize,
        body_len: (size - flag_data_len) as usize,
        unsynchronised: is_unsynchronised,
        skip: is_compressed || is_encrypted,
    })
}

/// Returns true if a valid frame header, padding, or the end of the tag body lies at the
/// candidate frame size from the current frame header.
fn validates_as_next_frame(cursor: &BodyCursor<'_>, candidate_size: u32) -> bool {
    let next = match (cursor.pos + 10).checked_add(candidate_size as usize) {
        Some(next) => next,
        None => return false,
    };

    if next == cursor.body.len() {
        return true;
    }

    match cursor.peek_at(next) {
        Some(header) => header.iter().all(|&byte| byte == 0) || is_valid_frame_id(header),
        None => false,
    }
}

/// Parse all frames of the buffered tag body, appending entries to the metadata and full-text
/// maps. Frame-level errors are recovered by skipping the frame; a malformed frame header
/// abandons the remainder of the body.
fn parse_frames(
    cursor: &mut BodyCursor<'_>,
    major_version: u8,
    map: &mut MetadataMap,
    comments: &mut FullTextMap,
    lyrics: &mut FullTextMap,
) {
    let min_frame_len = if major_version == 2 { 6 } else { 10 };

    while cursor.remaining() >= min_frame_len {
        let outcome = match major_version {
            2 => read_id3v2p2_frame_header(cursor),
            3 => read_id3v2p3_frame_header(cursor),
            4 => read_id3v2p4_frame_header(cursor),
            _ => unreachable!("id3v2: unexpected version"),
        };

        let frame = match outcome {
            FrameOutcome::Frame(frame) => frame,
            FrameOutcome::Padding => break,
            FrameOutcome::Malformed => {
                warn!("id3v2: malformed frame header, abandoning tag");
                break;
            }
        };

        // The prelude is always buffered, but the declared body may overrun the tag. This is a
        // framing error with no recovery point.
        if cursor.skip(frame.prelude_len).is_err() || cursor.remaining() < frame.body_len {
            warn!("id3v2: frame '{}' overruns tag, abandoning tag", frame.id);
            break;
        }

        // A frame must be atleast 1 byte as per the specification, but can be skipped.
        if frame.body_len == 0 {
            warn!("id3v2: frame '{}' was skipped because it has a size of 0", frame.id);
            continue;
        }

        let data = match cursor.take(frame.body_len) {
            Ok(data) => data,
            Err(_) => break,
        };

        if frame.skip {
            warn!("id3v2: frame '{}' was skipped (compressed or encrypted)", frame.id);
            continue;
        }

        // Reverse per-frame unsynchronisation (ID3v2.4 only) after reading the declared size.
        let mut unsync_buf;
        let data = if frame.unsynchronised {
            unsync_buf = data.to_vec();
            &*decode_unsynchronisation(&mut unsync_buf)
        }
        else {
            data
        };

        // Errors from the frame body readers are not fatal. On error, the frame is dropped and
        // parsing continues at the next frame.
        let result = match frame.id.as_str() {
            "TXXX" | "TXX" => frames::read_user_text_frame(data).map(|(key, value)| {
                map.push(&key, value);
            }),
            "COMM" | "COM" => frames::read_full_text_frame(data).map(|(language, desc, value)| {
                comments.push(language, &desc, value);
            }),
            "USLT" | "ULT" => frames::read_full_text_frame(data).map(|(language, desc, value)| {
                lyrics.push(language, &desc, value);
            }),
            id if id.starts_with('T') => frames::read_text_frame(data).map(|values| {
                for value in values {
                    map.push(&frame.id, value);
                }
            }),
            _ => {
                // All other frames are skipped.
                Ok(())
            }
        };

        if let Err(err) = result {
            warn!("id3v2: frame '{}' was dropped: {}", frame.id, err);
        }
    }
}

/// Reads an ID3v2 tag. The stream must be positioned at the first byte of the tag header.
pub fn read(mss: &mut MediaSourceStream) -> Result<Id3v2Metadata> {
    let start = mss.pos();

    let header = read_header(mss)?;

    let mut end = start + TAG_HEADER_LEN + u64::from(header.size);
    if header.has_footer {
        end += TAG_HEADER_LEN;
    }

    // Reject a tag whose declared size overruns the stream before buffering it.
    if let Some(len) = mss.byte_len() {
        if end > len {
            return end_of_stream_error();
        }
    }

    let info = Id3v2TagInfo {
        major_version: header.major_version,
        revision: header.revision,
        flags: header.flags,
        size: header.size,
    };

    let mut map = MetadataMap::new();
    let mut comments = FullTextMap::new();
    let mut lyrics = FullTextMap::new();

    // Version 2.2 of the standard specifies a compression flag bit, but does not specify a
    // compression standard. There is no way to interpret the tag data, so the whole tag is
    // skipped.
    if header.compression {
        warn!("id3v2: skipping ID3v2.2 tag with compression");
        mss.ignore_bytes(u64::from(header.size))?;

        return Ok(Id3v2Metadata {
            metadata: Metadata { map, start_offset: start, end_offset: end },
            header: info,
            comments,
            unsynchronized_lyrics: lyrics,
        });
    }

    // Buffer the tag body. When the whole tag is unsynchronised (versions before 2.4), the body
    // is decoded while streaming it in. ID3v2.4 unsynchronisation is per-frame and is handled
    // when each frame is read.
    let body = if header.unsynchronisation && header.major_version < 4 {
        let mut unsync = UnsyncStream::new(ScopedStream::new(&mut *mss, u64::from(header.size)));
        let mut body = Vec::with_capacity(header.size as usize);

        while unsync.bytes_available() > 0 {
            match unsync.read_byte() {
                Ok(byte) => body.push(byte),
                // A stuffed 0x00 as the final raw byte exhausts the scope mid-read.
                Err(_) if unsync.bytes_available() == 0 => break,
                Err(err) => return Err(err.into()),
            }
        }

        body
    }
    else {
        let mut body = vec![0u8; header.size as usize];
        mss.read_buf_exact(&mut body)?;
        body
    };

    let mut cursor = BodyCursor::new(&body);

    if header.has_extended_header {
        match header.major_version {
            3 => skip_id3v2p3_extended_header(&mut cursor)?,
            4 => skip_id3v2p4_extended_header(&mut cursor)?,
            _ => return decode_error("id3v2: extended header on unsupported version"),
        }
    }

    parse_frames(&mut cursor, header.major_version, &mut map, &mut comments, &mut lyrics);

    // Read and skip the footer. It repeats the tag header with a "3DI" identifier.
    if header.has_footer {
        let marker = mss.read_triple_bytes()?;

        if marker != *b"3DI" {
            warn!("id3v2: footer identifier not found");
        }

        mss.ignore_bytes(7)?;
    }

    Ok(Id3v2Metadata {
        metadata: Metadata { map, start_offset: start, end_offset: end },
        header: info,
        comments,
        unsynchronized_lyrics: lyrics,
    })
}

/// Reads an ID3v2 tag appended at the end of a stream through its ID3v2.4 footer. `window_end` is
/// the exclusive end position of the tag.
pub fn read_from_footer(mss: &mut MediaSourceStream, window_end: u64) -> Result<Id3v2Metadata> {
    if window_end < 2 * TAG_HEADER_LEN {
        return unsupported_error("id3v2: stream too small for an appended tag");
    }

    mss.seek(SeekFrom::Start(window_end - TAG_HEADER_LEN))?;

    let marker = mss.read_triple_bytes()?;

    if marker != *b"3DI" {
        return unsupported_error("id3v2: not an ID3v2 footer");
    }

    // The footer repeats the major version, revision, flags, and size of the header.
    let _major_version = mss.read_u8()?;
    let _revision = mss.read_u8()?;
    let _flags = mss.read_u8()?;
    let size = read_syncsafe_leq32(mss, 28)?;

    let total = 2 * TAG_HEADER_LEN + u64::from(size);

    if total > window_end {
        return decode_error("id3v2: appended tag size overruns stream");
    }

    mss.seek(SeekFrom::Start(window_end - total))?;

    let tag = read(mss)?;

    // A footer-discovered tag must end exactly at the footer.
    if tag.metadata.end_offset != window_end {
        return decode_error("id3v2: appended tag does not end at its footer");
    }

    Ok(tag)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serenata_core::io::MediaSourceStream;

    use super::sync::encode_syncsafe_u28;

    /// Build an ID3v2 tag with the given version, flags, and frame data.
    fn build_tag(major_version: u8, flags: u8, body: &[u8]) -> Vec<u8> {
        let mut tag = Vec::new();
        tag.extend_from_slice(b"ID3");
        tag.push(major_version);
        tag.push(0);
        tag.push(flags);
        tag.extend_from_slice(&encode_syncsafe_u28(body.len() as u32));
        tag.extend_from_slice(body);
        tag
    }

    fn build_text_frame(id: &[u8; 4], text: &str) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(id);
        frame.extend_from_slice(&encode_syncsafe_u28(text.len() as u32 + 1));
        frame.extend_from_slice(&[0, 0]);
        frame.push(3);
        frame.extend_from_slice(text.as_bytes());
        frame
    }

    fn read_tag(data: Vec<u8>) -> super::Id3v2Metadata {
        let mut mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
        super::read(&mut mss).unwrap()
    }

    #[test]
    fn verify_read_id3v2p4_text_frames() {
        let mut body = Vec::new();
        body.extend_from_slice(&build_text_frame(b"TIT2", "Title"));
        body.extend_from_slice(&build_text_frame(b"TPE1", "Artist"));
        // Padding.
        body.extend_from_slice(&[0u8; 32]);

        let tag = read_tag(build_tag(4, 0, &body));

        assert_eq!(tag.metadata.map.get_first("TIT2"), Some("Title"));
        assert_eq!(tag.metadata.map.get_first("TPE1"), Some("Artist"));
        assert_eq!(tag.metadata.start_offset, 0);
        assert_eq!(tag.metadata.end_offset, (10 + body.len()) as u64);
    }

    #[test]
    fn verify_read_id3v2p3_full_tag_unsynchronisation() {
        // A UTF-16 text frame whose byte-order-mark forces 0xff bytes into the tag body.
        let mut frame = Vec::new();
        frame.extend_from_slice(b"TIT2");
        frame.extend_from_slice(&7u32.to_be_bytes());
        frame.extend_from_slice(&[0, 0]);
        frame.push(1);
        frame.extend_from_slice(&[0xff, 0xfe]);
        frame.extend_from_slice(&[0x68, 0x00, 0x69, 0x00]);

        // Tag-level unsynchronisation applies to the whole body.
        let body = super::sync::encode_unsynchronisation(&frame);
        assert_ne!(body.len(), frame.len());

        let tag = read_tag(build_tag(3, 0x80, &body));

        assert_eq!(tag.metadata.map.get_first("TIT2"), Some("hi"));
    }

    #[test]
    fn verify_read_comments_and_lyrics() {
        let mut comm = Vec::new();
        comm.extend_from_slice(b"COMM");
        let comm_body = b"\x00eng\x00a comment";
        comm.extend_from_slice(&encode_syncsafe_u28(comm_body.len() as u32));
        comm.extend_from_slice(&[0, 0]);
        comm.extend_from_slice(comm_body);

        let mut uslt = Vec::new();
        uslt.extend_from_slice(b"USLT");
        let uslt_body = b"\x00engdesc\x00the lyrics";
        uslt.extend_from_slice(&encode_syncsafe_u28(uslt_body.len() as u32));
        uslt.extend_from_slice(&[0, 0]);
        uslt.extend_from_slice(uslt_body);

        let mut body = comm;
        body.extend_from_slice(&uslt);

        let tag = read_tag(build_tag(4, 0, &body));

        assert!(tag.metadata.map.is_empty());

        let comments: Vec<_> = tag.comments.entries().collect();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].language(), b"eng");
        assert_eq!(comments[0].value(), "a comment");

        let lyrics: Vec<_> = tag.unsynchronized_lyrics.entries().collect();
        assert_eq!(lyrics.len(), 1);
        assert_eq!(lyrics[0].description(), "desc");
        assert_eq!(lyrics[0].value(), "the lyrics");
    }

    #[test]
    fn verify_user_defined_frame_key() {
        let mut frame = Vec::new();
        frame.extend_from_slice(b"TXXX");
        let frame_body = b"\x03CUSTOM\x00custom value";
        frame.extend_from_slice(&encode_syncsafe_u28(frame_body.len() as u32));
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(frame_body);

        let tag = read_tag(build_tag(4, 0, &frame));

        assert_eq!(tag.metadata.map.get_first("CUSTOM"), Some("custom value"));
        assert!(!tag.metadata.map.contains("TXXX"));
    }

    #[test]
    fn verify_itunes_v2p2_frame_id_in_v2p3_tag() {
        let mut frame = Vec::new();
        frame.extend_from_slice(b"TT2\x00");
        frame.extend_from_slice(&6u32.to_be_bytes());
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(b"\x03Title");

        let tag = read_tag(build_tag(3, 0, &frame));

        assert_eq!(tag.metadata.map.get_first("TT2"), Some("Title"));
    }

    #[test]
    fn verify_skips_invalid_encoding_frame() {
        let mut bad = Vec::new();
        bad.extend_from_slice(b"TIT2");
        bad.extend_from_slice(&encode_syncsafe_u28(4));
        bad.extend_from_slice(&[0, 0]);
        bad.extend_from_slice(b"\x0fbad");

        let mut body = bad;
        body.extend_from_slice(&build_text_frame(b"TPE1", "Artist"));

        let tag = read_tag(build_tag(4, 0, &body));

        // The invalid frame is dropped, the rest of the tag is read.
        assert!(!tag.metadata.map.contains("TIT2"));
        assert_eq!(tag.metadata.map.get_first("TPE1"), Some("Artist"));
    }

    #[test]
    fn verify_v2p2_compressed_tag_is_skipped() {
        let tag = read_tag(build_tag(2, 0x40, &[0xde, 0xad, 0xbe, 0xef]));

        assert!(tag.metadata.map.is_empty());
        assert_eq!(tag.metadata.end_offset, 14);
    }

    #[test]
    fn verify_read_id3v2p2_frames() {
        // ID3v2.2 frames have a 3 character id and a 24-bit size.
        let mut frame = Vec::new();
        frame.extend_from_slice(b"TT2");
        frame.extend_from_slice(&[0, 0, 6]);
        frame.extend_from_slice(b"\x03Title");

        let mut body = frame;
        body.extend_from_slice(b"TP1");
        body.extend_from_slice(&[0, 0, 7]);
        body.extend_from_slice(b"\x03Artist");

        let tag = read_tag(build_tag(2, 0, &body));

        assert_eq!(tag.header.major_version, 2);
        assert_eq!(tag.metadata.map.get_first("TT2"), Some("Title"));
        assert_eq!(tag.metadata.map.get_first("TP1"), Some("Artist"));
    }

    #[test]
    fn verify_skips_id3v2p3_extended_header() {
        let mut body = Vec::new();
        // Extended header: size 6 (excluding these size bytes), flags, padding size.
        body.extend_from_slice(&6u32.to_be_bytes());
        body.extend_from_slice(&[0, 0]);
        body.extend_from_slice(&0u32.to_be_bytes());

        let mut frame = Vec::new();
        frame.extend_from_slice(b"TIT2");
        frame.extend_from_slice(&6u32.to_be_bytes());
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(b"\x03Title");
        body.extend_from_slice(&frame);

        let tag = read_tag(build_tag(3, 0x40, &body));

        assert_eq!(tag.metadata.map.get_first("TIT2"), Some("Title"));
    }

    #[test]
    fn verify_skips_id3v2p4_extended_header() {
        let mut body = Vec::new();
        // Extended header: synchsafe size 6 (including these size bytes), flag count, no flags.
        body.extend_from_slice(&encode_syncsafe_u28(6));
        body.extend_from_slice(&[1, 0]);
        body.extend_from_slice(&build_text_frame(b"TIT2", "Title"));

        let tag = read_tag(build_tag(4, 0x40, &body));

        assert_eq!(tag.metadata.map.get_first("TIT2"), Some("Title"));
    }

    #[test]
    fn verify_id3v2p4_per_frame_unsynchronisation() {
        // A Latin-1 body whose 0xff byte was unsynchronised within the frame: the declared frame
        // size counts the stuffed byte, and the frame's unsynchronisation flag is set.
        let decoded = [0x00, 0xff, 0xe9];
        let stuffed = super::sync::encode_unsynchronisation(&decoded);
        assert_eq!(stuffed.len(), 4);

        let mut frame = Vec::new();
        frame.extend_from_slice(b"TPE1");
        frame.extend_from_slice(&encode_syncsafe_u28(stuffed.len() as u32));
        frame.extend_from_slice(&[0, 0x02]);
        frame.extend_from_slice(&stuffed);

        let tag = read_tag(build_tag(4, 0, &frame));

        assert_eq!(tag.metadata.map.get_first("TPE1"), Some("\u{ff}\u{e9}"));
    }

    #[test]
    fn verify_overrunning_frame_abandons_tag() {
        let mut body = build_text_frame(b"TIT2", "Kept");

        // A frame whose declared size exceeds the remaining tag body.
        body.extend_from_slice(b"TPE1");
        body.extend_from_slice(&encode_syncsafe_u28(1000));
        body.extend_from_slice(&[0, 0]);
        body.extend_from_slice(b"\x03x");

        let tag = read_tag(build_tag(4, 0, &body));

        assert_eq!(tag.metadata.map.get_first("TIT2"), Some("Kept"));
        assert!(!tag.metadata.map.contains("TPE1"));
    }

    #[test]
    fn verify_read_from_footer_round_trip() {
        let mut data = vec![0x11u8; 40];

        let body = build_text_frame(b"TALB", "Album");

        // An appended tag requires the footer flag.
        let mut tag = build_tag(4, 0x10, &body);
        tag.extend_from_slice(b"3DI");
        tag.push(4);
        tag.push(0);
        tag.push(0x10);
        tag.extend_from_slice(&encode_syncsafe_u28(body.len() as u32));

        data.extend_from_slice(&tag);

        let len = data.len() as u64;

        let mut mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
        let tag = super::read_from_footer(&mut mss, len).unwrap();

        assert_eq!(tag.metadata.map.get_first("TALB"), Some("Album"));
        assert_eq!(tag.metadata.start_offset, 40);
        assert_eq!(tag.metadata.end_offset, len);
    }

    #[test]
    fn verify_multiple_values_per_text_frame() {
        let mut frame = Vec::new();
        frame.extend_from_slice(b"TPE1");
        let frame_body = b"\x03One\x00Two\x00Three";
        frame.extend_from_slice(&encode_syncsafe_u28(frame_body.len() as u32));
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(frame_body);

        let tag = read_tag(build_tag(4, 0, &frame));

        assert_eq!(tag.metadata.map.get_all("TPE1"), vec!["One", "Two", "Three"]);
        assert_eq!(tag.metadata.map.value_count("TPE1"), 3);
    }
}
