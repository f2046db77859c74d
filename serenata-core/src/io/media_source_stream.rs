// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp;
use std::io;
use std::io::{Read, Seek};

use super::{MediaSource, ReadBytes};

const END_OF_STREAM_ERROR_STR: &str = "end of stream";

/// A `MediaSourceStream` is the common reader type for Serenata. By using type erasure and dynamic
/// dispatch, `MediaSourceStream` wraps and hides the inner reader from the consumer, allowing any
/// typical `Read`er to be used with Serenata in a generic way, selectable at runtime.
///
/// To minimize system call and dynamic dispatch overhead on the inner reader, and to amortize that
/// overhead over many bytes, `MediaSourceStream` implements a block read-ahead buffer. A `seek()`
/// invalidates the buffer.
pub struct MediaSourceStream {
    /// The source reader.
    inner: Box<dyn MediaSource>,
    /// The read-ahead buffer.
    buf: Box<[u8]>,
    /// The number of valid bytes in the read-ahead buffer.
    buf_len: usize,
    /// The read position within the read-ahead buffer.
    read_pos: usize,
    /// The absolute stream position of the first byte of the read-ahead buffer.
    base_pos: u64,
}

impl MediaSourceStream {
    const BLOCK_LEN: usize = 8 * 1024;

    pub fn new(source: Box<dyn MediaSource>) -> Self {
        MediaSourceStream {
            inner: source,
            buf: vec![0u8; Self::BLOCK_LEN].into_boxed_slice(),
            buf_len: 0,
            read_pos: 0,
            base_pos: 0,
        }
    }

    /// Returns the length in bytes of the underlying source, if available.
    pub fn byte_len(&self) -> Option<u64> {
        self.inner.byte_len()
    }

    /// Returns if the read-ahead buffer has been exhausted.
    #[inline(always)]
    fn is_buffer_exhausted(&self) -> bool {
        self.read_pos == self.buf_len
    }

    /// If the read-ahead buffer has been exhausted, fetch a new block of data to replenish it.
    fn fetch(&mut self) -> io::Result<()> {
        if self.is_buffer_exhausted() {
            self.base_pos += self.buf_len as u64;
            self.read_pos = 0;
            self.buf_len = 0;

            loop {
                match self.inner.read(&mut self.buf) {
                    Ok(len) => {
                        self.buf_len = len;
                        break;
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(())
    }

    /// If the read-ahead buffer has been exhausted, fetch a new block of data to replenish it. If
    /// no more data could be fetched, return an end-of-stream error.
    fn fetch_or_eof(&mut self) -> io::Result<()> {
        self.fetch()?;

        if self.is_buffer_exhausted() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, END_OF_STREAM_ERROR_STR));
        }

        Ok(())
    }

    /// Resets the read-ahead buffer, and sets the absolute stream position to `pos`.
    fn reset(&mut self, pos: u64) {
        self.read_pos = 0;
        self.buf_len = 0;
        self.base_pos = pos;
    }
}

impl io::Read for MediaSourceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Serve buffered bytes first.
        if self.read_pos < self.buf_len {
            let len = cmp::min(self.buf_len - self.read_pos, buf.len());
            buf[..len].copy_from_slice(&self.buf[self.read_pos..self.read_pos + len]);
            self.read_pos += len;
            return Ok(len);
        }

        // The read-ahead buffer is exhausted. Large reads bypass it entirely.
        if buf.len() >= self.buf.len() {
            self.base_pos += self.buf_len as u64;
            self.read_pos = 0;
            self.buf_len = 0;

            let len = self.inner.read(buf)?;
            self.base_pos += len as u64;
            return Ok(len);
        }

        self.fetch()?;

        let len = cmp::min(self.buf_len - self.read_pos, buf.len());
        buf[..len].copy_from_slice(&self.buf[self.read_pos..self.read_pos + len]);
        self.read_pos += len;
        Ok(len)
    }
}

impl io::Seek for MediaSourceStream {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        // The current position of the underlying reader is ahead of the current position of the
        // MediaSourceStream by however many bytes have not been read from the read-ahead buffer
        // yet. Resolve seeks from the current position against the stream position, not the
        // reader position.
        let pos = match pos {
            io::SeekFrom::Current(0) => return Ok(self.pos()),
            io::SeekFrom::Current(delta) => {
                let target = self.pos() as i64 + delta;

                if target < 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "seek before start of stream",
                    ));
                }

                self.inner.seek(io::SeekFrom::Start(target as u64))?
            }
            _ => self.inner.seek(pos)?,
        };

        self.reset(pos);

        Ok(pos)
    }
}

impl ReadBytes for MediaSourceStream {
    #[inline(always)]
    fn read_byte(&mut self) -> io::Result<u8> {
        if self.is_buffer_exhausted() {
            self.fetch_or_eof()?;
        }

        let value = self.buf[self.read_pos];
        self.read_pos += 1;

        Ok(value)
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
        // Implemented via the io::Read trait.
        let read = io::Read::read(self, buf)?;

        // Unlike the io::Read trait, ReadBytes returns an end-of-stream error when no more data
        // can be read. If a non-zero read is requested, and 0 bytes are read, return an
        // end-of-stream error.
        if !buf.is_empty() && read == 0 {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, END_OF_STREAM_ERROR_STR))
        }
        else {
            Ok(read)
        }
    }

    fn read_buf_exact(&mut self, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match io::Read::read(self, buf) {
                Ok(0) => break,
                Ok(count) => {
                    buf = &mut buf[count..];
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
                Err(e) => return Err(e),
            }
        }

        if !buf.is_empty() {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, END_OF_STREAM_ERROR_STR))
        }
        else {
            Ok(())
        }
    }

    fn ignore_bytes(&mut self, count: u64) -> io::Result<()> {
        if count == 0 {
            return Ok(());
        }

        let target = self.pos() + count;

        // If the source length is known, reject skips past the end of the stream so a truncated
        // structure surfaces immediately rather than on a later read.
        if let Some(len) = self.inner.byte_len() {
            if target > len {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, END_OF_STREAM_ERROR_STR));
            }
        }

        // Skip within the read-ahead buffer if possible, otherwise seek.
        let buffered = (self.buf_len - self.read_pos) as u64;

        if count <= buffered {
            self.read_pos += count as usize;
        }
        else {
            io::Seek::seek(self, io::SeekFrom::Start(target))?;
        }

        Ok(())
    }

    fn pos(&self) -> u64 {
        self.base_pos + self.read_pos as u64
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek, SeekFrom};

    use super::MediaSourceStream;
    use crate::io::ReadBytes;

    /// Generate a vector of bytes of the specified length using a PRNG.
    fn generate_random_bytes(len: usize) -> Vec<u8> {
        let mut lcg: u32 = 0xec57c4bf;

        let mut bytes = vec![0; len];

        for quad in bytes.chunks_mut(4) {
            lcg = lcg.wrapping_mul(1664525).wrapping_add(1013904223);
            for (dest, src) in quad.iter_mut().zip(&lcg.to_ne_bytes()) {
                *dest = *src;
            }
        }

        bytes
    }

    #[test]
    fn verify_mss_read() {
        let data = generate_random_bytes(40 * 1024);

        let mut mss = MediaSourceStream::new(Box::new(Cursor::new(data.clone())));

        // Single byte reads across multiple buffer refills.
        for byte in &data[..16 * 1024] {
            assert_eq!(*byte, mss.read_byte().unwrap());
        }

        mss.ignore_bytes(11).unwrap();
        assert_eq!(mss.pos(), 11 + 16 * 1024);

        let mut buf = vec![0u8; 20 * 1024];
        mss.read_buf_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &data[11 + 16 * 1024..11 + 36 * 1024]);
    }

    #[test]
    fn verify_mss_seek() {
        let data = generate_random_bytes(64 * 1024);

        let mut mss = MediaSourceStream::new(Box::new(Cursor::new(data.clone())));

        mss.seek(SeekFrom::Start(1024)).unwrap();
        assert_eq!(mss.pos(), 1024);
        assert_eq!(mss.read_byte().unwrap(), data[1024]);

        mss.seek(SeekFrom::Current(-1)).unwrap();
        assert_eq!(mss.read_byte().unwrap(), data[1024]);

        mss.seek(SeekFrom::End(-1)).unwrap();
        assert_eq!(mss.read_byte().unwrap(), data[data.len() - 1]);
        assert!(mss.read_byte().is_err());
    }

    #[test]
    fn verify_mss_ignore_past_end() {
        let data = generate_random_bytes(100);

        let mut mss = MediaSourceStream::new(Box::new(Cursor::new(data)));

        assert!(mss.ignore_bytes(100).is_ok());
        assert!(mss.ignore_bytes(1).is_err());
    }
}
