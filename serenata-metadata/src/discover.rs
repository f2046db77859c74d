// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Multi-format tag discovery.
//!
//! A single stream may carry several tags at once: any number of prefixed tags stacked at the
//! head, and any legal stack-up of appended tags at the tail. [`read_all`] walks the whole stream
//! and collects every tag it can find, in two passes:
//!
//! 1. Prefixed tags are probed repeatedly at the running position, in order of preference: ID3v2,
//!    FLAC, Ogg-Vorbis, and an APE header. Each successful parse advances the position to the
//!    exact end of the parsed tag. When no prefixed probe succeeds at offset zero, an MP4 walk is
//!    attempted there instead.
//! 2. Appended tags are probed from the end of the stream: ID3v1, an APE footer, and an ID3v2
//!    footer. Each successful parse shrinks the window to the discovered tag's start, which
//!    handles the legal ID3v2 + APE + ID3v1 stack-up and its subsets.
//!
//! Every parser failure is treated as "format not found here": the cursor is restored and
//! discovery moves on, so a malformed tag never prevents reading a later valid one.

use std::io::{Seek, SeekFrom};

use serenata_core::errors::{unsupported_error, Result};
use serenata_core::io::MediaSourceStream;
use serenata_core::meta::{AllMetadata, TypedMetadata};

use log::debug;

use crate::{ape, flac, id3v1, id3v2, mp4, ogg};

/// Reads all tags of a stream. The returned tags appear in discovery order: prefixed tags in
/// file order, then appended tags from the end of the file inwards.
///
/// Returns an `AllMetadata` with zero tags when the stream contains none.
pub fn read_all(mss: &mut MediaSourceStream) -> Result<AllMetadata> {
    let stream_end = match mss.byte_len() {
        Some(len) => len,
        None => return unsupported_error("discover: stream length must be known"),
    };

    let mut all = AllMetadata::default();

    // Pass 1: prefixed tags, stacked from the head of the stream.
    let mut pos = 0u64;

    mss.seek(SeekFrom::Start(0))?;

    'prefix: loop {
        match id3v2::read(mss) {
            Ok(tag) => {
                pos = tag.metadata.end_offset;
                all.tags.push(TypedMetadata::Id3v2(tag));
                mss.seek(SeekFrom::Start(pos))?;
                continue 'prefix;
            }
            Err(err) => {
                debug!("discover: no id3v2 tag at {}: {}", pos, err);
                mss.seek(SeekFrom::Start(pos))?;
            }
        }

        match flac::read(mss) {
            Ok(meta) => {
                pos = meta.end_offset;
                all.tags.push(TypedMetadata::Flac(meta));
                mss.seek(SeekFrom::Start(pos))?;
                continue 'prefix;
            }
            Err(err) => {
                debug!("discover: no flac metadata at {}: {}", pos, err);
                mss.seek(SeekFrom::Start(pos))?;
            }
        }

        match ogg::read(mss) {
            Ok(meta) => {
                pos = meta.end_offset;
                all.tags.push(TypedMetadata::Vorbis(meta));
                mss.seek(SeekFrom::Start(pos))?;
                continue 'prefix;
            }
            Err(err) => {
                debug!("discover: no ogg vorbis comment at {}: {}", pos, err);
                mss.seek(SeekFrom::Start(pos))?;
            }
        }

        match ape::read_from_header(mss) {
            Ok(tag) => {
                pos = tag.metadata.end_offset;
                all.tags.push(TypedMetadata::Ape(tag));
                mss.seek(SeekFrom::Start(pos))?;
                continue 'prefix;
            }
            Err(err) => {
                debug!("discover: no ape tag at {}: {}", pos, err);
                mss.seek(SeekFrom::Start(pos))?;
            }
        }

        break;
    }

    // The MP4 atom walk is only attempted when no prefixed tag was found at offset zero.
    let mut prefix_end = pos;

    if all.is_empty() {
        mss.seek(SeekFrom::Start(0))?;

        match mp4::read(mss) {
            Ok(meta) => {
                prefix_end = meta.end_offset;
                all.tags.push(TypedMetadata::Mp4(meta));
            }
            Err(err) => debug!("discover: no mp4 metadata: {}", err),
        }
    }

    // Pass 2: appended tags, discovered from the end of the stream inwards. No byte range already
    // covered by an accepted tag is read again.
    let mut window_end = stream_end;

    'suffix: loop {
        if window_end <= prefix_end {
            break;
        }

        if window_end - prefix_end >= id3v1::TAG_LEN {
            if let Ok(meta) = id3v1::read(mss, window_end) {
                window_end = meta.start_offset;
                all.tags.push(TypedMetadata::Id3v1(meta));
                continue 'suffix;
            }
        }

        if window_end - prefix_end >= ape::RECORD_LEN {
            if let Ok(tag) = ape::read_from_footer(mss, window_end) {
                if tag.metadata.start_offset >= prefix_end {
                    window_end = tag.metadata.start_offset;
                    all.tags.push(TypedMetadata::Ape(tag));
                    continue 'suffix;
                }
            }
        }

        if window_end - prefix_end >= 20 {
            if let Ok(tag) = id3v2::read_from_footer(mss, window_end) {
                if tag.metadata.start_offset >= prefix_end {
                    window_end = tag.metadata.start_offset;
                    all.tags.push(TypedMetadata::Id3v2(tag));
                    continue 'suffix;
                }
            }
        }

        break;
    }

    Ok(all)
}
