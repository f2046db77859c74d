// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::fs::File;
use std::process::ExitCode;

use serenata_core::errors::Result;
use serenata_core::io::MediaSourceStream;
use serenata_core::meta::{AllMetadata, MetadataMap, TypedMetadata};
use serenata_metadata::collate::{Collator, CollatorConfig};
use serenata_metadata::read_all;

use clap::{Arg, Command};
use log::error;

struct Options<'a> {
    /// Print only the raw tags, without the collated summary.
    raw_only: bool,
    /// Print one merged value per key across all tags.
    merged: bool,
    /// Print the unsynchronized lyrics for this ISO-639-2 language.
    lyrics_language: Option<&'a str>,
}

fn main() -> ExitCode {
    pretty_env_logger::init();

    let matches = Command::new("Serenata Dump")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Print every audio tag a file contains")
        .arg(
            Arg::new("raw")
                .long("raw")
                .help("Print only the raw tags, without the collated summary"),
        )
        .arg(
            Arg::new("merged")
                .long("merged")
                .help("Also print one merged value per key across all tags"),
        )
        .arg(
            Arg::new("lyrics")
                .long("lyrics")
                .value_name("LANG")
                .takes_value(true)
                .help("Also print the unsynchronized lyrics for the given ISO-639-2 language"),
        )
        .arg(Arg::new("FILE").help("The file(s) to read").required(true).multiple_values(true))
        .get_matches();

    let opts = Options {
        raw_only: matches.is_present("raw"),
        merged: matches.is_present("merged"),
        lyrics_language: matches.value_of("lyrics"),
    };

    if let Some(language) = opts.lyrics_language {
        if language.len() != 3 {
            error!("the lyrics language must be a 3 character ISO-639-2 code");
            return ExitCode::FAILURE;
        }
    }

    let mut status = ExitCode::SUCCESS;

    for path in matches.values_of("FILE").unwrap() {
        if let Err(err) = dump_file(path, &opts) {
            error!("{}: {}", path, err);
            status = ExitCode::FAILURE;
        }
    }

    status
}

fn dump_file(path: &str, opts: &Options<'_>) -> Result<()> {
    let file = File::open(path)?;
    let mut mss = MediaSourceStream::new(Box::new(file));

    let all = read_all(&mut mss)?;

    println!("{}:", path);

    if all.is_empty() {
        println!("  (no tags)");
        return Ok(());
    }

    for (idx, tag) in all.iter().enumerate() {
        print_tag(idx, tag);
    }

    if opts.merged {
        print_merged(&all);
    }

    if let Some(language) = opts.lyrics_language {
        print_lyrics(&all, language);
    }

    if !opts.raw_only {
        print_summary(&all);
    }

    Ok(())
}

fn print_tag(idx: usize, tag: &TypedMetadata) {
    println!(
        "  [{}] {} tag, bytes {}..{}",
        idx,
        tag.kind(),
        tag.start_offset(),
        tag.end_offset()
    );

    // Duplicates of a key are printed once, joined, on the key's first line.
    let mut printed = HashSet::new();

    for entry in tag.map().iter() {
        if !printed.insert(entry.name()) {
            continue;
        }

        if let Some(joined) = tag.map().get_joined(entry.name(), "; ") {
            println!("      {:<24}: {}", escape(entry.name()), escape(&joined));
        }
    }

    if let TypedMetadata::Id3v2(id3v2) = tag {
        for comment in id3v2.comments.entries() {
            println!(
                "      comment [{}] {:<12}: {}",
                escape(&String::from_utf8_lossy(comment.language())),
                escape(comment.description()),
                escape(comment.value())
            );
        }

        for lyrics in id3v2.unsynchronized_lyrics.entries() {
            println!(
                "      lyrics  [{}] {:<12}: {}",
                escape(&String::from_utf8_lossy(lyrics.language())),
                escape(lyrics.description()),
                escape(lyrics.value())
            );
        }
    }
}

/// Prints one value per key across all tags: later-discovered tags override earlier values of
/// the same key, while keys keep the position of their first appearance.
fn print_merged(all: &AllMetadata) {
    let mut merged = MetadataMap::new();

    for tag in all.iter() {
        for entry in tag.map().iter() {
            merged.put_or_replace_first(entry.name(), entry.value().to_string());
        }
    }

    println!("  merged:");

    for entry in merged.iter() {
        println!("      {:<24}: {}", escape(entry.name()), escape(entry.value()));
    }
}

/// Prints the unsynchronized lyrics carried by any ID3v2 tag for the given language.
fn print_lyrics(all: &AllMetadata, language: &str) {
    let code: [u8; 3] = match language.as_bytes().try_into() {
        Ok(code) => code,
        Err(_) => return,
    };

    println!("  lyrics ({}):", language);

    let mut found = false;

    for tag in all.iter() {
        if let TypedMetadata::Id3v2(id3v2) = tag {
            for value in id3v2.unsynchronized_lyrics.values_for_language(&code) {
                println!("      {}", escape(value));
                found = true;
            }
        }
    }

    if !found {
        println!("      (none)");
    }
}

fn print_summary(all: &AllMetadata) {
    let collator = Collator::new(all, CollatorConfig::default());

    println!("  collated:");

    print_field("artist", collator.artist().as_deref());
    print_field("album", collator.album().as_deref());
    print_field("title", collator.title().as_deref());

    match collator.track_number() {
        Some(track) => match track.total {
            Some(total) => println!("      {:<24}: {} of {}", "track", track.number, total),
            None => println!("      {:<24}: {}", "track", track.number),
        },
        None => println!("      {:<24}: -", "track"),
    }
}

fn print_field(name: &str, value: Option<&str>) {
    match value {
        Some(value) => println!("      {:<24}: {}", name, escape(value)),
        None => println!("      {:<24}: -", name),
    }
}

/// Escapes control characters for terminal display.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for ch in text.chars() {
        if ch.is_control() {
            match ch {
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push_str(&format!("\\x{:02x}", u32::from(ch))),
            }
        }
        else {
            out.push(ch);
        }
    }

    out
}
