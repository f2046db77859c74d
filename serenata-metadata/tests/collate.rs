// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end collation tests over discovered streams.

use std::io::Cursor;

use serenata_core::io::MediaSourceStream;
use serenata_core::meta::AllMetadata;
use serenata_metadata::collate::{Collator, CollatorConfig, Field};
use serenata_metadata::id3v2::sync::encode_syncsafe_u28;
use serenata_metadata::read_all;

fn read(data: Vec<u8>) -> AllMetadata {
    let mut mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
    read_all(&mut mss).unwrap()
}

fn id3v2_frame(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.extend_from_slice(id);
    frame.extend_from_slice(&encode_syncsafe_u28(body.len() as u32));
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(body);
    frame
}

fn id3v2_tag(frames: &[Vec<u8>]) -> Vec<u8> {
    let body = frames.concat();

    let mut tag = Vec::new();
    tag.extend_from_slice(b"ID3");
    tag.extend_from_slice(&[4, 0, 0]);
    tag.extend_from_slice(&encode_syncsafe_u28(body.len() as u32));
    tag.extend_from_slice(&body);
    tag
}

fn id3v1_tag(title: &str, artist: &str, track: u8) -> Vec<u8> {
    let mut tag = vec![0u8; 128];
    tag[0..3].copy_from_slice(b"TAG");
    tag[3..3 + title.len()].copy_from_slice(title.as_bytes());
    tag[33..33 + artist.len()].copy_from_slice(artist.as_bytes());
    tag[126] = track;
    tag[127] = 255;
    tag
}

fn text_body(text: &str) -> Vec<u8> {
    let mut body = vec![0x03];
    body.extend_from_slice(text.as_bytes());
    body
}

#[test]
fn id3v2_outranks_id3v1() {
    let mut data = id3v2_tag(&[
        id3v2_frame(b"TPE1", &text_body("Modern Artist")),
        id3v2_frame(b"TIT2", &text_body("Modern Title")),
    ]);
    data.extend_from_slice(&[0x22; 100]);
    data.extend_from_slice(&id3v1_tag("Old Title", "Old Artist", 9));

    let all = read(data);
    assert_eq!(all.len(), 2);

    let collator = Collator::new(&all, CollatorConfig::default());

    // ID3v1 is a last resort: with an ID3v2 tag present it contributes nothing.
    assert_eq!(collator.artist().as_deref(), Some("Modern Artist"));
    assert_eq!(collator.artists(), vec!["Modern Artist"]);
    assert_eq!(collator.title().as_deref(), Some("Modern Title"));

    // But the ID3v2 tag carries no track number, so the ID3v1 one wins by default.
    assert_eq!(collator.track_number().map(|t| t.number), Some(9));
}

#[test]
fn id3v1_contributes_when_alone() {
    let mut data = vec![0x22; 100];
    data.extend_from_slice(&id3v1_tag("Only Title", "Only Artist", 3));

    let all = read(data);

    let collator = Collator::new(&all, CollatorConfig::default());

    assert_eq!(collator.artist().as_deref(), Some("Only Artist"));
    assert_eq!(collator.titles(), vec!["Only Title"]);
}

#[test]
fn values_deduplicate_across_tags() {
    // The same artist spelled with different casing in two normal-priority tags collapses to one
    // value, keeping the higher-priority spelling.
    let mut flac = Vec::new();
    flac.extend_from_slice(b"fLaC");
    flac.push(0x84);
    let mut comment = Vec::new();
    comment.extend_from_slice(&0u32.to_le_bytes());
    comment.extend_from_slice(&1u32.to_le_bytes());
    let record = b"ARTIST=Some Artist";
    comment.extend_from_slice(&(record.len() as u32).to_le_bytes());
    comment.extend_from_slice(record);
    flac.extend_from_slice(&(comment.len() as u32).to_be_bytes()[1..]);
    flac.extend_from_slice(&comment);

    // An APE tag at the end of the stream with a different casing of the same artist.
    let mut item = Vec::new();
    item.extend_from_slice(&11u32.to_le_bytes());
    item.extend_from_slice(&0u32.to_le_bytes());
    item.extend_from_slice(b"Artist\0SOME ARTIST");

    let mut footer = Vec::new();
    footer.extend_from_slice(b"APETAGEX");
    footer.extend_from_slice(&2000u32.to_le_bytes());
    footer.extend_from_slice(&((item.len() + 32) as u32).to_le_bytes());
    footer.extend_from_slice(&1u32.to_le_bytes());
    footer.extend_from_slice(&0x4000_0000u32.to_le_bytes());
    footer.extend_from_slice(&[0u8; 8]);

    let mut data = flac;
    data.extend_from_slice(&[0x22; 64]);
    data.extend_from_slice(&item);
    data.extend_from_slice(&footer);

    let all = read(data);
    assert_eq!(all.len(), 2);

    let collator = Collator::new(&all, CollatorConfig::default());
    assert_eq!(collator.artists(), vec!["Some Artist"]);
}

#[test]
fn comments_come_from_id3v2_comm_frames() {
    // A described comment written before the main (empty-description) comment: the main comment
    // still wins.
    let data = id3v2_tag(&[
        id3v2_frame(b"COMM", b"\x00engtool\x00written by a tagger"),
        id3v2_frame(b"COMM", b"\x00eng\x00ripped with care"),
    ]);

    let all = read(data);

    let collator = Collator::new(&all, CollatorConfig::default());
    assert_eq!(collator.prioritized_value(Field::Comment).as_deref(), Some("ripped with care"));
}

#[test]
fn track_numbers_collect_across_tags() {
    let mut data = id3v2_tag(&[id3v2_frame(b"TRCK", &text_body("3/12"))]);
    data.extend_from_slice(&[0x22; 100]);
    data.extend_from_slice(&id3v1_tag("t", "a", 4));

    let all = read(data);

    let collator = Collator::new(&all, CollatorConfig::default());

    let track = collator.track_number().unwrap();
    assert_eq!(track.number, 3);
    assert_eq!(track.total, Some(12));

    let numbers = collator.track_numbers();
    assert_eq!(numbers.numbers, vec![3, 4]);
    assert_eq!(numbers.totals, vec![12]);
}

#[test]
fn padded_values_are_trimmed() {
    let data = id3v2_tag(&[id3v2_frame(b"TALB", &text_body("  Padded Album  "))]);

    let all = read(data);

    let collator = Collator::new(&all, CollatorConfig::default());
    assert_eq!(collator.album().as_deref(), Some("Padded Album"));
}
