// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An ID3v1 metadata reader.

use std::io::{Seek, SeekFrom};

use serenata_core::errors::{unsupported_error, Result};
use serenata_core::io::{MediaSourceStream, ReadBytes};
use serenata_core::meta::{Metadata, MetadataMap};
use serenata_core::util::text;

/// The fixed length of an ID3v1 tag.
pub const TAG_LEN: u64 = 128;

/// The list of genres defined by ID3v1, including the Winamp extensions.
const GENRES: &[&str] = &[
    "Blues",
    "Classic Rock",
    "Country",
    "Dance",
    "Disco",
    "Funk",
    "Grunge",
    "Hip-Hop",
    "Jazz",
    "Metal",
    "New Age",
    "Oldies",
    "Other",
    "Pop",
    "R&B",
    "Rap",
    "Reggae",
    "Rock",
    "Techno",
    "Industrial",
    "Alternative",
    "Ska",
    "Death Metal",
    "Pranks",
    "Soundtrack",
    "Euro-Techno",
    "Ambient",
    "Trip-Hop",
    "Vocal",
    "Jazz+Funk",
    "Fusion",
    "Trance",
    "Classical",
    "Instrumental",
    "Acid",
    "House",
    "Game",
    "Sound Clip",
    "Gospel",
    "Noise",
    "Alternative Rock",
    "Bass",
    "Soul",
    "Punk",
    "Space",
    "Meditative",
    "Instrumental Pop",
    "Instrumental Rock",
    "Ethnic",
    "Gothic",
    "Darkwave",
    "Techno-Industrial",
    "Electronic",
    "Pop-Folk",
    "Eurodance",
    "Dream",
    "Southern Rock",
    "Comedy",
    "Cult",
    "Gangsta",
    "Top 40",
    "Christian Rap",
    "Pop/Funk",
    "Jungle",
    "Native American",
    "Cabaret",
    "New Wave",
    "Psychedelic",
    "Rave",
    "Showtunes",
    "Trailer",
    "Lo-Fi",
    "Tribal",
    "Acid Punk",
    "Acid Jazz",
    "Polka",
    "Retro",
    "Musical",
    "Rock & Roll",
    "Hard Rock",
    "Folk",
    "Folk-Rock",
    "National Folk",
    "Swing",
    "Fast Fusion",
    "Bebob",
    "Latin",
    "Revival",
    "Celtic",
    "Bluegrass",
    "Avantgarde",
    "Gothic Rock",
    "Progressive Rock",
    "Psychedelic Rock",
    "Symphonic Rock",
    "Slow Rock",
    "Big Band",
    "Chorus",
    "Easy Listening",
    "Acoustic",
    "Humour",
    "Speech",
    "Chanson",
    "Opera",
    "Chamber Music",
    "Sonata",
    "Symphony",
    "Booty Bass",
    "Primus",
    "Porn Groove",
    "Satire",
    "Slow Jam",
    "Club",
    "Tango",
    "Samba",
    "Folklore",
    "Ballad",
    "Power Ballad",
    "Rhythmic Soul",
    "Freestyle",
    "Duet",
    "Punk Rock",
    "Drum Solo",
    "A Cappella",
    "Euro-House",
    "Dance Hall",
    "Goa",
    "Drum & Bass",
    "Club-House",
    "Hardcore",
    "Terror",
    "Indie",
    "BritPop",
    "Negerpunk",
    "Polsk Punk",
    "Beat",
    "Christian Gangsta Rap",
    "Heavy Metal",
    "Black Metal",
    "Crossover",
    "Contemporary Christian",
    "Christian Rock",
    "Merengue",
    "Salsa",
    "Thrash Metal",
    "Anime",
    "Jpop",
    "Synthpop",
    "Abstract",
    "Art Rock",
    "Baroque",
    "Bhangra",
    "Big Beat",
    "Breakbeat",
    "Chillout",
    "Downtempo",
    "Dub",
    "EBM",
    "Eclectic",
    "Electro",
    "Electroclash",
    "Emo",
    "Experimental",
    "Garage",
    "Global",
    "IDM",
    "Illbient",
    "Industro-Goth",
    "Jam Band",
    "Krautrock",
    "Leftfield",
    "Lounge",
    "Math Rock",
    "New Romantic",
    "Nu-Breakz",
    "Post-Punk",
    "Post-Rock",
    "Psytrance",
    "Shoegaze",
    "Space Rock",
    "Trop Rock",
    "World Music",
    "Neoclassical",
    "Audiobook",
    "Audio Theatre",
    "Neue Deutsche Welle",
    "Podcast",
    "Indie Rock",
    "G-Funk",
    "Dubstep",
    "Garage Rock",
    "Psybient",
];

/// Gets the name of a genre from its ID3v1 genre index. Indicies beyond the table are dropped.
pub(crate) fn genre_name(index: u8) -> Option<&'static str> {
    GENRES.get(usize::from(index)).copied()
}

/// Decodes a fixed-length Latin-1 field, trimming padding. Returns `None` if the trimmed field is
/// empty.
fn decode_field(buf: &[u8]) -> Option<String> {
    let text = text::decode_latin1(buf);
    let trimmed = text.trim_matches(|c| c == ' ' || c == '\0');

    if trimmed.is_empty() {
        None
    }
    else {
        Some(trimmed.to_string())
    }
}

/// Reads an ID3v1 tag from the final 128 bytes before `window_end`.
pub fn read(mss: &mut MediaSourceStream, window_end: u64) -> Result<Metadata> {
    if window_end < TAG_LEN {
        return unsupported_error("id3v1: stream too small for a tag");
    }

    let start = window_end - TAG_LEN;

    mss.seek(SeekFrom::Start(start))?;

    let mut buf = [0u8; 128];
    mss.read_buf_exact(&mut buf)?;

    if buf[0..3] != *b"TAG" {
        return unsupported_error("id3v1: not an ID3v1 tag");
    }

    let mut map = MetadataMap::new();

    if let Some(title) = decode_field(&buf[3..33]) {
        map.push("title", title);
    }

    if let Some(artist) = decode_field(&buf[33..63]) {
        map.push("artist", artist);
    }

    if let Some(album) = decode_field(&buf[63..93]) {
        map.push("album", album);
    }

    if let Some(year) = decode_field(&buf[93..97]) {
        map.push("date", year);
    }

    // If the second-last byte of the comment field is 0, the last byte of the comment field is
    // the track number (ID3v1.1).
    let comment = if buf[125] == 0 {
        if buf[126] != 0 {
            map.push("track", buf[126].to_string());
        }

        decode_field(&buf[97..125])
    }
    else {
        decode_field(&buf[97..127])
    };

    if let Some(comment) = comment {
        map.push("comment", comment);
    }

    if let Some(genre) = genre_name(buf[127]) {
        map.push("genre", genre.to_string());
    }

    Ok(Metadata { map, start_offset: start, end_offset: window_end })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serenata_core::io::MediaSourceStream;

    fn build_tag(title: &[u8], artist: &[u8], track: Option<u8>, genre: u8) -> Vec<u8> {
        let mut tag = vec![0u8; 128];
        tag[0..3].copy_from_slice(b"TAG");
        tag[3..3 + title.len()].copy_from_slice(title);
        tag[33..33 + artist.len()].copy_from_slice(artist);
        if let Some(track) = track {
            tag[126] = track;
        }
        tag[127] = genre;
        tag
    }

    #[test]
    fn verify_read_id3v1() {
        let tag = build_tag(b"Some Title", b"Some Artist", Some(7), 17);

        let mut mss = MediaSourceStream::new(Box::new(Cursor::new(tag)));
        let meta = super::read(&mut mss, 128).unwrap();

        assert_eq!(meta.map.get_first("title"), Some("Some Title"));
        assert_eq!(meta.map.get_first("artist"), Some("Some Artist"));
        assert_eq!(meta.map.get_first("track"), Some("7"));
        assert_eq!(meta.map.get_first("genre"), Some("Rock"));
        assert!(!meta.map.contains("album"));
        assert_eq!(meta.start_offset, 0);
        assert_eq!(meta.end_offset, 128);
    }

    #[test]
    fn verify_track_requires_comment_terminator() {
        // A full-width comment leaves no room for a track number.
        let mut tag = build_tag(b"T", b"A", None, 255);
        for byte in tag[97..127].iter_mut() {
            *byte = b'c';
        }

        let mut mss = MediaSourceStream::new(Box::new(Cursor::new(tag)));
        let meta = super::read(&mut mss, 128).unwrap();

        assert!(!meta.map.contains("track"));
        assert_eq!(meta.map.get_first("comment").map(str::len), Some(30));
        // Genre index 255 is out of table range and dropped.
        assert!(!meta.map.contains("genre"));
    }

    #[test]
    fn verify_rejects_missing_marker() {
        let tag = vec![0u8; 128];

        let mut mss = MediaSourceStream::new(Box::new(Cursor::new(tag)));
        assert!(super::read(&mut mss, 128).is_err());
    }
}
