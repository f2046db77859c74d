// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! This crate implements readers for the audio tag formats that may coexist within a single
//! file: ID3v1, ID3v2 (versions 2.2 through 2.4, prefixed or appended), APEv1/v2, the FLAC
//! Vorbis comment block, the standalone Ogg-Vorbis comment packet, and MP4/iTunes `ilst` atoms.
//!
//! Each reader decodes one tag instance into the common [`serenata_core::meta`] model, preserving
//! tag-native keys and duplicates verbatim. The [`discover`] module walks a whole stream and
//! collects every tag it contains; the [`collate`] module reduces the raw multi-tag view to a
//! single best-guess answer per logical field.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Serenata crates. Please see the workspace Cargo.toml for
// their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::manual_range_contains)]

pub mod ape;
pub mod collate;
pub mod discover;
pub mod flac;
pub mod id3v1;
pub mod id3v2;
pub mod mp4;
pub mod ogg;
pub mod vorbis;

pub use collate::{Collator, CollatorConfig};
pub use discover::read_all;
