// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cross-tag collation.
//!
//! A file frequently carries the same information in more than one tag, written by different
//! software, in different encodings, with different spellings of the same key. The [`Collator`]
//! reduces the raw multi-tag view produced by discovery to a single best-guess answer per logical
//! field by applying a cross-format priority order, Unicode case-folding and canonical
//! normalisation, and a heuristic recovery of Windows-1251 text that was mis-decoded as Latin-1.

use std::borrow::Cow;
use std::collections::HashSet;

use serenata_core::meta::{AllMetadata, TagKind, TypedMetadata};
use serenata_core::util::text;

use unicase::UniCase;
use unicode_normalization::UnicodeNormalization;

/// A logical, format-independent field.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Field {
    Artist,
    AlbumArtist,
    Album,
    Title,
    TrackNumber,
    TrackTotal,
    Date,
    Genre,
    Comment,
}

impl Field {
    /// All logical fields.
    pub const ALL: [Field; 9] = [
        Field::Artist,
        Field::AlbumArtist,
        Field::Album,
        Field::Title,
        Field::TrackNumber,
        Field::TrackTotal,
        Field::Date,
        Field::Genre,
        Field::Comment,
    ];
}

/// The ordered list of tag-native keys to try for one logical field, per tag kind. A kind with no
/// equivalent key carries an empty list.
struct FieldKeys {
    id3v1: &'static [&'static str],
    id3v2: &'static [&'static str],
    ape: &'static [&'static str],
    flac: &'static [&'static str],
    vorbis: &'static [&'static str],
    mp4: &'static [&'static str],
}

impl FieldKeys {
    fn for_kind(&self, kind: TagKind) -> &'static [&'static str] {
        match kind {
            TagKind::Id3v1 => self.id3v1,
            TagKind::Id3v2 => self.id3v2,
            TagKind::Ape => self.ape,
            TagKind::Flac => self.flac,
            TagKind::Vorbis => self.vorbis,
            TagKind::Mp4 => self.mp4,
        }
    }
}

const ARTIST_KEYS: FieldKeys = FieldKeys {
    id3v1: &["artist"],
    id3v2: &["TPE1", "TP1"],
    ape: &["Artist"],
    flac: &["ARTIST"],
    vorbis: &["ARTIST"],
    mp4: &["\u{a9}ART"],
};

const ALBUM_ARTIST_KEYS: FieldKeys = FieldKeys {
    id3v1: &[],
    id3v2: &["TPE2", "TP2"],
    ape: &["Album Artist"],
    flac: &["ALBUMARTIST", "ALBUM ARTIST"],
    vorbis: &["ALBUMARTIST", "ALBUM ARTIST"],
    mp4: &["aART"],
};

const ALBUM_KEYS: FieldKeys = FieldKeys {
    id3v1: &["album"],
    id3v2: &["TALB", "TAL"],
    ape: &["Album"],
    flac: &["ALBUM"],
    vorbis: &["ALBUM"],
    mp4: &["\u{a9}alb"],
};

const TITLE_KEYS: FieldKeys = FieldKeys {
    id3v1: &["title"],
    id3v2: &["TIT2", "TT2"],
    ape: &["Title"],
    flac: &["TITLE"],
    vorbis: &["TITLE"],
    mp4: &["\u{a9}nam"],
};

const TRACK_NUMBER_KEYS: FieldKeys = FieldKeys {
    id3v1: &["track"],
    id3v2: &["TRCK", "TRK"],
    ape: &["Track"],
    flac: &["TRACKNUMBER"],
    vorbis: &["TRACKNUMBER"],
    mp4: &["trkn"],
};

const TRACK_TOTAL_KEYS: FieldKeys = FieldKeys {
    id3v1: &[],
    id3v2: &[],
    ape: &[],
    flac: &["TRACKTOTAL", "TOTALTRACKS"],
    vorbis: &["TRACKTOTAL", "TOTALTRACKS"],
    mp4: &[],
};

const DATE_KEYS: FieldKeys = FieldKeys {
    id3v1: &["date"],
    id3v2: &["TDRC", "TYER", "TYE"],
    ape: &["Year"],
    flac: &["DATE"],
    vorbis: &["DATE"],
    mp4: &["\u{a9}day"],
};

const GENRE_KEYS: FieldKeys = FieldKeys {
    id3v1: &["genre"],
    id3v2: &["TCON", "TCO"],
    ape: &["Genre"],
    flac: &["GENRE"],
    vorbis: &["GENRE"],
    mp4: &["gnre", "\u{a9}gen"],
};

const COMMENT_KEYS: FieldKeys = FieldKeys {
    id3v1: &["comment"],
    // ID3v2 comments are COMM frames, held in the tag's full-text collection rather than its map.
    id3v2: &[],
    ape: &["Comment"],
    flac: &["COMMENT", "DESCRIPTION"],
    vorbis: &["COMMENT", "DESCRIPTION"],
    mp4: &["\u{a9}cmt"],
};

fn field_keys(field: Field) -> &'static FieldKeys {
    match field {
        Field::Artist => &ARTIST_KEYS,
        Field::AlbumArtist => &ALBUM_ARTIST_KEYS,
        Field::Album => &ALBUM_KEYS,
        Field::Title => &TITLE_KEYS,
        Field::TrackNumber => &TRACK_NUMBER_KEYS,
        Field::TrackTotal => &TRACK_TOTAL_KEYS,
        Field::Date => &DATE_KEYS,
        Field::Genre => &GENRE_KEYS,
        Field::Comment => &COMMENT_KEYS,
    }
}

/// The contribution priority of a tag kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TagPriority {
    Normal,
    /// The kind contributes values only when no normal-priority kind contributed any.
    LastResort,
}

/// An ordering over tag kinds, with a contribution priority per kind.
#[derive(Clone, Debug)]
pub struct Prioritization {
    pub order: Vec<(TagKind, TagPriority)>,
}

impl Default for Prioritization {
    fn default() -> Self {
        Prioritization {
            order: vec![
                (TagKind::Mp4, TagPriority::Normal),
                (TagKind::Flac, TagPriority::Normal),
                (TagKind::Vorbis, TagPriority::Normal),
                (TagKind::Id3v2, TagPriority::Normal),
                (TagKind::Ape, TagPriority::Normal),
                (TagKind::Id3v1, TagPriority::LastResort),
            ],
        }
    }
}

/// How multiple tags of the same kind are ordered among themselves before prioritisation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DuplicateTagStrategy {
    /// Sort tags of each kind by entry count, descending, so the largest tag wins.
    #[default]
    PrioritizeBest,
    /// Keep tags of each kind in file order.
    PrioritizeFirst,
    /// Keep only the first tag of each kind.
    IgnoreDuplicates,
}

/// Collator configuration.
#[derive(Clone, Debug, Default)]
pub struct CollatorConfig {
    pub prioritization: Prioritization,
    pub duplicate_tag_strategy: DuplicateTagStrategy,
}

/// Trims ASCII spaces and NULs from both sides of a value, and recovers Windows-1251 text that
/// was mis-decoded as Latin-1. Returns `None` for a value that trims to nothing.
pub fn ameliorate_canonical(value: &str) -> Option<Cow<'_, str>> {
    let trimmed = value.trim_matches(|c| c == ' ' || c == '\0');

    if trimmed.is_empty() {
        return None;
    }

    if trimmed.chars().all(|c| u32::from(c) <= 0xff) && text::is_likely_windows1251(trimmed) {
        // Reinterpret each codepoint as the Windows-1251 byte it was decoded from. The detector
        // guarantees no codepoint maps to the sole invalid byte.
        let bytes: Vec<u8> = trimmed.chars().map(|c| c as u8).collect();

        if let Some(recovered) = text::decode_windows1251(&bytes) {
            return Some(Cow::Owned(recovered));
        }
    }

    Some(Cow::Borrowed(trimmed))
}

/// An insertion-ordered set of ameliorated values.
///
/// Two values are considered equal when their Unicode case-foldings of their canonical (NFC)
/// normalisations are equal. The first ameliorated spelling inserted is the one stored.
#[derive(Default)]
pub struct CollatedTextSet<'a> {
    values: Vec<Cow<'a, str>>,
    keys: HashSet<UniCase<String>>,
}

impl<'a> CollatedTextSet<'a> {
    pub fn new() -> Self {
        Default::default()
    }

    /// Ameliorates and inserts a value. Values that trim to nothing, or that are already present
    /// under case-folded canonical equality, are dropped.
    pub fn insert(&mut self, value: &'a str) {
        let ameliorated = match ameliorate_canonical(value) {
            Some(ameliorated) => ameliorated,
            None => return,
        };

        let key = UniCase::new(ameliorated.nfc().collect::<String>());

        if self.keys.insert(key) {
            self.values.push(ameliorated);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// The collected values, in insertion order.
    pub fn into_values(self) -> Vec<Cow<'a, str>> {
        self.values
    }
}

/// The parsed track numbering of a stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TrackNumber {
    pub number: u32,
    pub total: Option<u32>,
}

/// All track numerators and denominators found across every tag, deduplicated, in priority
/// order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackNumbers {
    pub numbers: Vec<u32>,
    pub totals: Vec<u32>,
}

/// A prioritised, de-duplicated view over all tags of a stream.
pub struct Collator<'a> {
    /// Tags of normal-priority kinds, in priority order with the duplicate strategy applied.
    normal: Vec<&'a TypedMetadata>,
    /// Tags of last-resort kinds, likewise ordered.
    last_resort: Vec<&'a TypedMetadata>,
}

impl<'a> Collator<'a> {
    pub fn new(all: &'a AllMetadata, config: CollatorConfig) -> Self {
        let mut normal = Vec::new();
        let mut last_resort = Vec::new();

        for (kind, priority) in &config.prioritization.order {
            let mut tags: Vec<&TypedMetadata> = all.of_kind(*kind).collect();

            match config.duplicate_tag_strategy {
                DuplicateTagStrategy::PrioritizeBest => {
                    // A stable sort keeps file order among equally-sized tags.
                    tags.sort_by_key(|tag| std::cmp::Reverse(tag.map().len()));
                }
                DuplicateTagStrategy::PrioritizeFirst => (),
                DuplicateTagStrategy::IgnoreDuplicates => {
                    tags.truncate(1);
                }
            }

            match priority {
                TagPriority::Normal => normal.extend(tags),
                TagPriority::LastResort => last_resort.extend(tags),
            }
        }

        Collator { normal, last_resort }
    }

    /// Iterates the raw candidate values one tag contributes for a field, in key order.
    fn tag_values(tag: &'a TypedMetadata, field: Field) -> impl Iterator<Item = &'a str> {
        let keys = field_keys(field).for_kind(tag.kind());

        let mapped = keys.iter().flat_map(move |&key| tag.map().values(key));

        // ID3v2 comments live in the tag's full-text collection, not its map.
        let comments = match tag {
            TypedMetadata::Id3v2(id3v2) if field == Field::Comment => Some(&id3v2.comments),
            _ => None,
        };

        // The main comment of an ID3v2 tag is, by convention, the one with an empty
        // description. Those entries are tried first, described entries after.
        mapped.chain(comments.into_iter().flat_map(|comments| {
            comments.values_for_description("").chain(
                comments
                    .entries()
                    .filter(|entry| !entry.description().is_empty())
                    .map(|entry| entry.value()),
            )
        }))
    }

    /// Gets the single highest-priority ameliorated value for a field.
    pub fn prioritized_value(&self, field: Field) -> Option<Cow<'a, str>> {
        for tag in &self.normal {
            for value in Self::tag_values(tag, field) {
                if let Some(ameliorated) = ameliorate_canonical(value) {
                    return Some(ameliorated);
                }
            }
        }

        // Last-resort kinds contribute only when nothing else did.
        for tag in &self.last_resort {
            for value in Self::tag_values(tag, field) {
                if let Some(ameliorated) = ameliorate_canonical(value) {
                    return Some(ameliorated);
                }
            }
        }

        None
    }

    /// Collects every distinct ameliorated value for a field across all tags, in priority order.
    pub fn collated_values(&self, field: Field) -> Vec<Cow<'a, str>> {
        let mut set = CollatedTextSet::new();

        for tag in &self.normal {
            for value in Self::tag_values(tag, field) {
                set.insert(value);
            }
        }

        if set.is_empty() {
            for tag in &self.last_resort {
                for value in Self::tag_values(tag, field) {
                    set.insert(value);
                }
            }
        }

        set.into_values()
    }

    pub fn artist(&self) -> Option<Cow<'a, str>> {
        self.prioritized_value(Field::Artist)
    }

    pub fn artists(&self) -> Vec<Cow<'a, str>> {
        self.collated_values(Field::Artist)
    }

    pub fn album(&self) -> Option<Cow<'a, str>> {
        self.prioritized_value(Field::Album)
    }

    pub fn albums(&self) -> Vec<Cow<'a, str>> {
        self.collated_values(Field::Album)
    }

    pub fn title(&self) -> Option<Cow<'a, str>> {
        self.prioritized_value(Field::Title)
    }

    pub fn titles(&self) -> Vec<Cow<'a, str>> {
        self.collated_values(Field::Title)
    }

    /// Parses the prioritised track-number value with the grammar `NUMBER ["/" TOTAL]`. A missing
    /// or zero denominator falls back to the track-total field; a zero numerator is treated as
    /// absent.
    pub fn track_number(&self) -> Option<TrackNumber> {
        let value = self.prioritized_value(Field::TrackNumber)?;

        let (number, total) = split_track_value(&value);

        let number = number.filter(|&number| number != 0)?;

        let total = total
            .filter(|&total| total != 0)
            .or_else(|| {
                self.prioritized_value(Field::TrackTotal)
                    .and_then(|total| parse_track_part(&total))
                    .filter(|&total| total != 0)
            });

        Some(TrackNumber { number, total })
    }

    /// Collects every track numerator and denominator across all tags into two deduplicated,
    /// insertion-ordered sets. Zeroes and unparsable values are dropped.
    pub fn track_numbers(&self) -> TrackNumbers {
        let mut result = TrackNumbers::default();
        let mut seen_numbers = HashSet::new();
        let mut seen_totals = HashSet::new();

        for tag in self.normal.iter().chain(&self.last_resort) {
            for value in Self::tag_values(tag, Field::TrackNumber) {
                let (number, total) = split_track_value(value);

                if let Some(number) = number.filter(|&number| number != 0) {
                    if seen_numbers.insert(number) {
                        result.numbers.push(number);
                    }
                }

                if let Some(total) = total.filter(|&total| total != 0) {
                    if seen_totals.insert(total) {
                        result.totals.push(total);
                    }
                }
            }

            for value in Self::tag_values(tag, Field::TrackTotal) {
                if let Some(total) = parse_track_part(value).filter(|&total| total != 0) {
                    if seen_totals.insert(total) {
                        result.totals.push(total);
                    }
                }
            }
        }

        result
    }
}

fn parse_track_part(part: &str) -> Option<u32> {
    part.trim_matches(|c| c == ' ' || c == '\0').parse().ok()
}

/// Splits a track value under the grammar `NUMBER ["/" TOTAL]`.
fn split_track_value(value: &str) -> (Option<u32>, Option<u32>) {
    match value.split_once('/') {
        Some((number, total)) => (parse_track_part(number), parse_track_part(total)),
        None => (parse_track_part(value), None),
    }
}
