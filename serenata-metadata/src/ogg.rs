// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An Ogg-Vorbis comment header reader.
//!
//! The logical Vorbis bitstream is stored in a sequence of physical Ogg pages. The
//! [`OggPageStream`] reassembles the logical byte stream across page boundaries; the comment
//! header parser reads through it without observing pages at all.

use std::io::{self, Seek, SeekFrom};

use serenata_core::errors::{decode_error, unsupported_error, Result};
use serenata_core::io::{FiniteStream, MediaSourceStream, ReadBytes};
use serenata_core::meta::{Metadata, MetadataMap};

use crate::vorbis;

const OGG_PAGE_MARKER: [u8; 4] = *b"OggS";

/// A reader over the logical byte stream stored in a sequence of Ogg pages.
///
/// Page headers are consumed lazily when the current page's payload is exhausted. End-of-stream
/// between pages is a clean end-of-file; end-of-stream inside a page header or payload is a
/// truncation error.
pub struct OggPageStream<'a> {
    inner: &'a mut MediaSourceStream,
    stream_len: u64,
    /// Unread payload bytes remaining in the current page.
    page_remaining: u64,
    /// The absolute end position of the current page's payload.
    page_end_pos: u64,
    /// Total logical bytes read.
    logical_read: u64,
}

impl<'a> OggPageStream<'a> {
    pub fn new(inner: &'a mut MediaSourceStream) -> Result<Self> {
        let stream_len = match inner.byte_len() {
            Some(len) => len,
            None => return unsupported_error("ogg: stream length must be known"),
        };

        let page_end_pos = inner.pos();

        Ok(OggPageStream { inner, stream_len, page_remaining: 0, page_end_pos, logical_read: 0 })
    }

    /// The absolute end position of the most recently consumed page's payload.
    pub fn page_end_pos(&self) -> u64 {
        self.page_end_pos
    }

    /// Reads the next page header. The stream must be positioned at the page marker.
    fn next_page(&mut self) -> io::Result<()> {
        // Distinguish a clean end-of-stream at a page boundary from a truncated page: the very
        // first marker byte is allowed to hit end-of-stream.
        let first = self.inner.read_byte()?;

        let header = (|| {
            let mut marker = [0u8; 4];
            marker[0] = first;
            self.inner.read_buf_exact(&mut marker[1..])?;

            if marker != OGG_PAGE_MARKER {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "ogg: missing page marker",
                ));
            }

            // There is only one OGG version, and that is version 0.
            if self.inner.read_byte()? != 0 {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "ogg: invalid version"));
            }

            // The header type flag.
            let _flags = self.inner.read_byte()?;

            // Absolute granule position, serial, sequence number, and checksum are not used.
            self.inner.ignore_bytes(8 + 4 + 4 + 4)?;

            let n_segments = self.inner.read_byte()?;

            if n_segments == 0 {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "ogg: empty page"));
            }

            let mut payload_len = 0u64;

            for _ in 0..n_segments {
                payload_len += u64::from(self.inner.read_byte()?);
            }

            if payload_len == 0 {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "ogg: empty page"));
            }

            Ok(payload_len)
        })();

        match header {
            Ok(payload_len) => {
                self.page_remaining = payload_len;
                self.page_end_pos = self.inner.pos() + payload_len;
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "ogg: truncated page header"))
            }
            Err(err) => Err(err),
        }
    }
}

impl ReadBytes for OggPageStream<'_> {
    fn read_byte(&mut self) -> io::Result<u8> {
        if self.page_remaining == 0 {
            self.next_page()?;
        }

        let byte = self.inner.read_byte().map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                io::Error::new(io::ErrorKind::UnexpectedEof, "ogg: truncated page payload")
            }
            else {
                err
            }
        })?;

        self.page_remaining -= 1;
        self.logical_read += 1;

        Ok(byte)
    }

    fn read_double_bytes(&mut self) -> io::Result<[u8; 2]> {
        let mut bytes = [0; 2];
        self.read_buf_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_triple_bytes(&mut self) -> io::Result<[u8; 3]> {
        let mut bytes = [0; 3];
        self.read_buf_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_quad_bytes(&mut self) -> io::Result<[u8; 4]> {
        let mut bytes = [0; 4];
        self.read_buf_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_buf(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        for (idx, slot) in buf.iter_mut().enumerate() {
            match self.read_byte() {
                Ok(byte) => *slot = byte,
                Err(_) if idx > 0 => return Ok(idx),
                Err(err) => return Err(err),
            }
        }
        Ok(buf.len())
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut filled = 0;

        while filled < buf.len() {
            if self.page_remaining == 0 {
                self.next_page()?;
            }

            let len = (buf.len() - filled).min(self.page_remaining as usize);
            self.inner.read_buf_exact(&mut buf[filled..filled + len]).map_err(|err| {
                if err.kind() == io::ErrorKind::UnexpectedEof {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "ogg: truncated page payload")
                }
                else {
                    err
                }
            })?;

            self.page_remaining -= len as u64;
            self.logical_read += len as u64;
            filled += len;
        }

        Ok(())
    }

    fn ignore_bytes(&mut self, count: u64) -> io::Result<()> {
        for _ in 0..count {
            self.read_byte()?;
        }
        Ok(())
    }

    fn pos(&self) -> u64 {
        self.inner.pos()
    }
}

impl FiniteStream for OggPageStream<'_> {
    /// The logical length is unknowable without walking every page; the remaining physical bytes
    /// are an upper bound, which is all the comment body reader requires.
    fn byte_len(&self) -> u64 {
        self.bytes_read() + self.bytes_available()
    }

    fn bytes_read(&self) -> u64 {
        self.logical_read
    }

    fn bytes_available(&self) -> u64 {
        self.stream_len.saturating_sub(self.inner.pos()) + self.page_remaining
    }
}

/// Reads the comment header of an Ogg-Vorbis stream. The stream must be positioned at the first
/// page of the logical bitstream.
pub fn read(mss: &mut MediaSourceStream) -> Result<Metadata> {
    let start = mss.pos();

    // Establish the page marker before committing to a page walk.
    let marker = mss.read_quad_bytes()?;

    if marker != OGG_PAGE_MARKER {
        return unsupported_error("ogg: not an ogg stream");
    }

    mss.seek(SeekFrom::Start(start))?;

    let mut pages = OggPageStream::new(mss)?;

    // The first packet is the Vorbis identification header.
    if pages.read_byte()? != 0x01 {
        return unsupported_error("ogg: not a vorbis identification header");
    }

    let mut magic = [0u8; 6];
    pages.read_buf_exact(&mut magic)?;

    if magic != *b"vorbis" {
        return unsupported_error("ogg: not a vorbis bitstream");
    }

    // Skip the identification parameters: version, channels, sample rate, bitrates, and block
    // sizes.
    pages.ignore_bytes(22)?;

    if pages.read_byte()? & 0x01 == 0 {
        return decode_error("ogg: identification header framing bit unset");
    }

    // The second packet is the comment header. It may span multiple pages.
    if pages.read_byte()? != 0x03 {
        return decode_error("ogg: missing vorbis comment header");
    }

    pages.read_buf_exact(&mut magic)?;

    if magic != *b"vorbis" {
        return decode_error("ogg: missing vorbis comment header");
    }

    let mut map = MetadataMap::new();

    vorbis::read_comment_body(&mut pages, &mut map)?;

    if pages.read_byte()? & 0x01 == 0 {
        return decode_error("ogg: comment header framing bit unset");
    }

    // The tag ends with the page in which the comment packet ended.
    let end = pages.page_end_pos();

    mss.seek(SeekFrom::Start(end))?;

    Ok(Metadata { map, start_offset: start, end_offset: end })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serenata_core::io::{MediaSourceStream, ReadBytes};

    pub(crate) fn build_page(segments: &[&[u8]], sequence: u32, flags: u8) -> Vec<u8> {
        let mut page = Vec::new();
        page.extend_from_slice(b"OggS");
        page.push(0);
        page.push(flags);
        page.extend_from_slice(&0u64.to_le_bytes());
        page.extend_from_slice(&0x1234u32.to_le_bytes());
        page.extend_from_slice(&sequence.to_le_bytes());
        page.extend_from_slice(&0u32.to_le_bytes());
        page.push(segments.len() as u8);
        for segment in segments {
            assert!(segment.len() <= 255);
            page.push(segment.len() as u8);
        }
        for segment in segments {
            page.extend_from_slice(segment);
        }
        page
    }

    #[test]
    fn verify_page_stream_reassembly() {
        let page1 = build_page(&[b"hello, "], 0, 0x02);
        let page2 = build_page(&[b"world"], 1, 0x04);

        let mut data = page1;
        data.extend_from_slice(&page2);

        let mut mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
        let mut pages = super::OggPageStream::new(&mut mss).unwrap();

        let mut buf = [0u8; 12];
        pages.read_buf_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello, world");

        // A clean end-of-file between pages.
        let err = pages.read_byte().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn verify_page_stream_rejects_empty_page() {
        let data = build_page(&[b""], 0, 0);

        let mut mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
        let mut pages = super::OggPageStream::new(&mut mss).unwrap();

        let err = pages.read_byte().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn verify_read_single_page_stream() {
        let mut ident = vec![0x01];
        ident.extend_from_slice(b"vorbis");
        ident.extend_from_slice(&[0u8; 22]);
        ident.push(0x01);

        let mut comment = vec![0x03];
        comment.extend_from_slice(b"vorbis");
        comment.extend_from_slice(&6u32.to_le_bytes());
        comment.extend_from_slice(b"vendor");
        comment.extend_from_slice(&1u32.to_le_bytes());
        comment.extend_from_slice(&8u32.to_le_bytes());
        comment.extend_from_slice(b"title=hi");
        comment.push(0x01);

        let data = build_page(&[&ident, &comment], 0, 0x02);
        let len = data.len() as u64;

        let mut mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
        let meta = super::read(&mut mss).unwrap();

        assert_eq!(meta.map.get_first("TITLE"), Some("hi"));
        assert_eq!(meta.start_offset, 0);
        assert_eq!(meta.end_offset, len);
    }

    #[test]
    fn verify_truncated_payload_is_an_error() {
        let mut data = build_page(&[b"full payload"], 0, 0);
        data.truncate(data.len() - 4);

        let mut mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
        let mut pages = super::OggPageStream::new(&mut mss).unwrap();

        let mut buf = [0u8; 12];
        let err = pages.read_buf_exact(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
