// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A reader for the metadata blocks of a FLAC stream.

use serenata_core::errors::{decode_error, unsupported_error, Result};
use serenata_core::io::{MediaSourceStream, ReadBytes, ScopedStream};
use serenata_core::meta::{Metadata, MetadataMap};

use crate::id3v2::sync::read_syncsafe_leq32;
use crate::vorbis;

/// The VORBIS_COMMENT metadata block type.
const BLOCK_TYPE_VORBIS_COMMENT: u8 = 4;

/// The invalid metadata block type.
const BLOCK_TYPE_INVALID: u8 = 127;

/// Reads the metadata blocks of a FLAC stream. The stream must be positioned at the "fLaC"
/// stream marker, or at an ID3v2 tag immediately preceding it, which is skipped.
///
/// Only VORBIS_COMMENT blocks contribute entries; all other blocks are skipped.
pub fn read(mss: &mut MediaSourceStream) -> Result<Metadata> {
    let mut start = mss.pos();

    let mut marker = mss.read_quad_bytes()?;

    // Some files prefix the FLAC stream with an ID3v2 tag. Skip over it transparently.
    if marker[0..3] == *b"ID3" {
        // The marker consumed the major version. Skip the revision and flags, then the declared
        // tag size.
        mss.ignore_bytes(2)?;
        let size = read_syncsafe_leq32(mss, 28)?;
        mss.ignore_bytes(u64::from(size))?;

        start = mss.pos();
        marker = mss.read_quad_bytes()?;
    }

    if marker != *b"fLaC" {
        return unsupported_error("flac: missing stream marker");
    }

    let mut map = MetadataMap::new();

    loop {
        let header = mss.read_u8()?;

        let is_last = header & 0x80 != 0;
        let block_type = header & 0x7f;
        let block_len = mss.read_be_u24()?;

        if block_type == BLOCK_TYPE_INVALID {
            return decode_error("flac: invalid metadata block type");
        }

        if block_type == BLOCK_TYPE_VORBIS_COMMENT {
            let mut scoped = ScopedStream::new(&mut *mss, u64::from(block_len));
            vorbis::read_comment_body(&mut scoped, &mut map)?;
            scoped.ignore()?;
        }
        else {
            mss.ignore_bytes(u64::from(block_len))?;
        }

        if is_last {
            break;
        }
    }

    Ok(Metadata { map, start_offset: start, end_offset: mss.pos() })
}
