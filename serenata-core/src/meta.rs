// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `meta` module defines the tag data model shared by all metadata readers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A single key-value entry of a [`MetadataMap`].
#[derive(Clone, Debug)]
pub struct MapEntry {
    name: Arc<str>,
    value: String,
}

impl MapEntry {
    /// The tag-native key of the entry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value of the entry.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// An ordered multimap from tag-native keys to values.
///
/// Duplicate keys are preserved in insertion order, and all duplicates of a key share a single
/// key allocation. Both keys and values are UTF-8: readers transcode or validate before
/// inserting.
#[derive(Clone, Debug, Default)]
pub struct MetadataMap {
    entries: Vec<MapEntry>,
    index: HashMap<Arc<str>, Vec<usize>>,
}

impl MetadataMap {
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends a key-value pair, preserving any existing entries for the same key.
    pub fn push(&mut self, name: &str, value: String) {
        let interned = match self.index.get_key_value(name) {
            Some((key, _)) => Arc::clone(key),
            None => Arc::from(name),
        };

        let entry_idx = self.entries.len();

        self.entries.push(MapEntry { name: Arc::clone(&interned), value });
        self.index.entry(interned).or_default().push(entry_idx);
    }

    /// Returns true if the map contains atleast one entry for the given key.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Gets the first value stored for the given key.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        let indicies = self.index.get(name)?;
        indicies.first().map(|&idx| self.entries[idx].value.as_str())
    }

    /// Iterates over all values stored for the given key, in insertion order.
    pub fn values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let indicies = self.index.get(name).map(|v| v.as_slice()).unwrap_or(&[]);
        indicies.iter().map(move |&idx| self.entries[idx].value.as_str())
    }

    /// Gets all values stored for the given key, in insertion order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.values(name).collect()
    }

    /// Joins all values stored for the given key with a separator. Returns `None` if the key is
    /// absent.
    pub fn get_joined(&self, name: &str, sep: &str) -> Option<String> {
        if !self.contains(name) {
            return None;
        }
        Some(self.get_all(name).join(sep))
    }

    /// Replaces the first value stored for the given key, or appends a new entry if the key is
    /// absent. Duplicate entries beyond the first are left untouched.
    pub fn put_or_replace_first(&mut self, name: &str, value: String) {
        match self.index.get(name).and_then(|indicies| indicies.first()) {
            Some(&idx) => self.entries[idx].value = value,
            None => self.push(name, value),
        }
    }

    /// The number of values stored for the given key.
    pub fn value_count(&self, name: &str) -> usize {
        self.index.get(name).map(|indicies| indicies.len()).unwrap_or(0)
    }

    /// The total number of entries in the map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &MapEntry> {
        self.entries.iter()
    }
}

/// An entry of a [`FullTextMap`]: a language-tagged, described, free-form text.
#[derive(Clone, Debug)]
pub struct FullTextEntry {
    language: [u8; 3],
    description: Arc<str>,
    value: String,
}

impl FullTextEntry {
    /// The ISO-639-2 language code of the entry, as written in the tag.
    pub fn language(&self) -> &[u8; 3] {
        &self.language
    }

    /// The description of the entry.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The text of the entry.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// An ordered collection of language-tagged, described texts (ID3v2 comments and unsynchronized
/// lyrics), with secondary indexes by language and by description.
#[derive(Clone, Debug, Default)]
pub struct FullTextMap {
    entries: Vec<FullTextEntry>,
    by_lang: HashMap<[u8; 3], Vec<usize>>,
    by_desc: HashMap<Arc<str>, Vec<usize>>,
}

impl FullTextMap {
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends an entry.
    pub fn push(&mut self, language: [u8; 3], description: &str, value: String) {
        let interned = match self.by_desc.get_key_value(description) {
            Some((key, _)) => Arc::clone(key),
            None => Arc::from(description),
        };

        let entry_idx = self.entries.len();

        self.entries.push(FullTextEntry {
            language,
            description: Arc::clone(&interned),
            value,
        });

        self.by_lang.entry(language).or_default().push(entry_idx);
        self.by_desc.entry(interned).or_default().push(entry_idx);
    }

    /// Iterates over all entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &FullTextEntry> {
        self.entries.iter()
    }

    /// Iterates over the values of all entries with the given language.
    pub fn values_for_language<'a>(
        &'a self,
        language: &[u8; 3],
    ) -> impl Iterator<Item = &'a str> + 'a {
        let indicies = self.by_lang.get(language).map(|v| v.as_slice()).unwrap_or(&[]);
        indicies.iter().map(move |&idx| self.entries[idx].value.as_str())
    }

    /// Iterates over the values of all entries with the given description.
    pub fn values_for_description<'a>(
        &'a self,
        description: &str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        let indicies = self.by_desc.get(description).map(|v| v.as_slice()).unwrap_or(&[]);
        indicies.iter().map(move |&idx| self.entries[idx].value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A single parsed tag: its entries plus the absolute, header-inclusive byte range it occupies in
/// the source stream.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    pub map: MetadataMap,
    pub start_offset: u64,
    pub end_offset: u64,
}

/// The declared header fields of an ID3v2 tag.
///
/// `size` is the declared tag body in bytes: it excludes the 10-byte header, and includes any
/// extended header, padding, and (per ID3v2.4 rules) footer data but not the footer itself.
#[derive(Copy, Clone, Debug)]
pub struct Id3v2TagInfo {
    pub major_version: u8,
    pub revision: u8,
    pub flags: u8,
    pub size: u32,
}

/// The 32-byte APE tag header/footer record.
///
/// `tag_size` includes all items and the footer, but not the header.
#[derive(Copy, Clone, Debug)]
pub struct ApeTagInfo {
    pub version: u32,
    pub tag_size: u32,
    pub item_count: u32,
    pub flags: u32,
}

/// An ID3v2 tag with its version header and the full-text frame collections.
#[derive(Clone, Debug)]
pub struct Id3v2Metadata {
    pub metadata: Metadata,
    pub header: Id3v2TagInfo,
    pub comments: FullTextMap,
    pub unsynchronized_lyrics: FullTextMap,
}

/// An APE tag with its header/footer record.
#[derive(Clone, Debug)]
pub struct ApeMetadata {
    pub metadata: Metadata,
    pub header: ApeTagInfo,
}

/// The kind of a tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TagKind {
    Id3v1,
    Id3v2,
    Ape,
    Flac,
    Vorbis,
    Mp4,
}

impl TagKind {
    /// All tag kinds, in no particular order.
    pub const ALL: [TagKind; 6] =
        [TagKind::Id3v1, TagKind::Id3v2, TagKind::Ape, TagKind::Flac, TagKind::Vorbis, TagKind::Mp4];
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TagKind::Id3v1 => "ID3v1",
            TagKind::Id3v2 => "ID3v2",
            TagKind::Ape => "APE",
            TagKind::Flac => "FLAC",
            TagKind::Vorbis => "Vorbis",
            TagKind::Mp4 => "MP4",
        };
        f.write_str(name)
    }
}

/// A parsed tag of any supported kind.
#[derive(Clone, Debug)]
pub enum TypedMetadata {
    Id3v1(Metadata),
    Id3v2(Id3v2Metadata),
    Ape(ApeMetadata),
    Flac(Metadata),
    Vorbis(Metadata),
    Mp4(Metadata),
}

impl TypedMetadata {
    /// The kind of this tag.
    pub fn kind(&self) -> TagKind {
        match self {
            TypedMetadata::Id3v1(_) => TagKind::Id3v1,
            TypedMetadata::Id3v2(_) => TagKind::Id3v2,
            TypedMetadata::Ape(_) => TagKind::Ape,
            TypedMetadata::Flac(_) => TagKind::Flac,
            TypedMetadata::Vorbis(_) => TagKind::Vorbis,
            TypedMetadata::Mp4(_) => TagKind::Mp4,
        }
    }

    /// The common metadata of this tag.
    pub fn metadata(&self) -> &Metadata {
        match self {
            TypedMetadata::Id3v1(meta) => meta,
            TypedMetadata::Id3v2(id3v2) => &id3v2.metadata,
            TypedMetadata::Ape(ape) => &ape.metadata,
            TypedMetadata::Flac(meta) => meta,
            TypedMetadata::Vorbis(meta) => meta,
            TypedMetadata::Mp4(meta) => meta,
        }
    }

    /// The key-value entries of this tag.
    pub fn map(&self) -> &MetadataMap {
        &self.metadata().map
    }

    /// The absolute byte position of the start of this tag in the source stream.
    pub fn start_offset(&self) -> u64 {
        self.metadata().start_offset
    }

    /// The absolute byte position of the exclusive end of this tag in the source stream.
    pub fn end_offset(&self) -> u64 {
        self.metadata().end_offset
    }
}

/// All tags discovered in a stream, in discovery order: prefixed tags in file order first, then
/// appended tags from the end of the file inwards.
#[derive(Clone, Debug, Default)]
pub struct AllMetadata {
    pub tags: Vec<TypedMetadata>,
}

impl AllMetadata {
    /// Iterates over all tags in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &TypedMetadata> {
        self.tags.iter()
    }

    /// Iterates over all tags of the given kind in discovery order.
    pub fn of_kind(&self, kind: TagKind) -> impl Iterator<Item = &TypedMetadata> {
        self.tags.iter().filter(move |tag| tag.kind() == kind)
    }

    /// Gets the first discovered tag of the given kind.
    pub fn first_of_kind(&self, kind: TagKind) -> Option<&TypedMetadata> {
        self.of_kind(kind).next()
    }

    /// Gets the last discovered tag of the given kind.
    pub fn last_of_kind(&self, kind: TagKind) -> Option<&TypedMetadata> {
        self.of_kind(kind).last()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
