// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Text encoding conversions used by the metadata readers.

/// Decodes a slice of bytes as ISO/IEC 8859-1 (aka. Latin-1).
///
/// Every byte maps to the Unicode codepoint of the same value, therefore this conversion is total
/// and injective.
pub fn decode_latin1(buf: &[u8]) -> String {
    buf.iter().map(|&byte| char::from(byte)).collect()
}

/// Decodes a slice of bytes as Windows-1251.
///
/// Returns `None` if the input contains the byte `0x98`, the sole byte with no assigned
/// character.
pub fn decode_windows1251(buf: &[u8]) -> Option<String> {
    encoding_rs::WINDOWS_1251
        .decode_without_bom_handling_and_without_replacement(buf)
        .map(|text| text.into_owned())
}

/// Decodes a slice of bytes as big-endian UTF-16.
///
/// Returns `None` if the input length is odd or the input contains unpaired surrogates.
pub fn decode_utf16be(buf: &[u8]) -> Option<String> {
    encoding_rs::UTF_16BE
        .decode_without_bom_handling_and_without_replacement(buf)
        .map(|text| text.into_owned())
}

/// Decodes a slice of bytes as little-endian UTF-16.
///
/// Returns `None` if the input length is odd or the input contains unpaired surrogates.
pub fn decode_utf16le(buf: &[u8]) -> Option<String> {
    encoding_rs::UTF_16LE
        .decode_without_bom_handling_and_without_replacement(buf)
        .map(|text| text.into_owned())
}

/// Returns true if the byte maps to a Cyrillic letter under Windows-1251.
fn is_cyrillic_windows1251(byte: u8) -> bool {
    match byte {
        // А-Я, а-я.
        0xc0..=0xff => true,
        // Ё, ё.
        0xa8 | 0xb8 => true,
        // Ђ, Ѓ, ѓ, Љ, Њ, Ќ, Ћ, Џ, ђ, љ, њ, ќ, ћ, џ.
        0x80 | 0x81 | 0x83 | 0x8a | 0x8c..=0x8f | 0x90 | 0x9a | 0x9c..=0x9f => true,
        // Ў, ў, Ј, Ґ, Є, Ї, І, і, ґ, є, ј, Ѕ, ѕ, ї.
        0xa1 | 0xa2 | 0xa3 | 0xa5 | 0xaa | 0xaf | 0xb2..=0xb4 | 0xba | 0xbc..=0xbf => true,
        _ => false,
    }
}

/// Heuristically detects text that was Windows-1251 on disk but was decoded as Latin-1.
///
/// The text qualifies when every codepoint is within U+0000..=U+00FF, none is U+0098, and either
/// a run of 4 or more consecutive codepoints maps to Cyrillic letters under Windows-1251, or, in
/// the absence of any ASCII letter, atleast 2 codepoints do.
pub fn is_likely_windows1251(text: &str) -> bool {
    let mut run = 0usize;
    let mut longest_run = 0usize;
    let mut cyrillic = 0usize;
    let mut has_ascii_letter = false;

    for ch in text.chars() {
        let cp = u32::from(ch);

        if cp > 0xff || cp == 0x98 {
            return false;
        }

        if ch.is_ascii_alphabetic() {
            has_ascii_letter = true;
        }

        if is_cyrillic_windows1251(cp as u8) {
            run += 1;
            cyrillic += 1;
            longest_run = longest_run.max(run);
        }
        else {
            run = 0;
        }
    }

    longest_run >= 4 || (!has_ascii_letter && cyrillic >= 2)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn verify_latin1_total_and_injective() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let decoded = decode_latin1(&bytes);

        assert_eq!(decoded.chars().count(), 256);

        let unique: HashSet<char> = decoded.chars().collect();
        assert_eq!(unique.len(), 256);

        for (byte, ch) in bytes.iter().zip(decoded.chars()) {
            assert_eq!(u32::from(*byte), u32::from(ch));
        }
    }

    #[test]
    fn verify_windows1251_total_except_0x98() {
        let mut unique = HashSet::new();

        for byte in 0u8..=255 {
            let decoded = decode_windows1251(&[byte]);

            if byte == 0x98 {
                assert!(decoded.is_none());
            }
            else {
                let text = decoded.unwrap();
                assert_eq!(text.chars().count(), 1);
                assert!(unique.insert(text));
            }
        }

        assert_eq!(unique.len(), 255);
    }

    #[test]
    fn verify_windows1251_cyrillic() {
        // "Апостроф" as Windows-1251.
        let decoded = decode_windows1251(&[0xc0, 0xef, 0xee, 0xf1, 0xf2, 0xf0, 0xee, 0xf4]);
        assert_eq!(decoded.as_deref(), Some("Апостроф"));
    }

    #[test]
    fn verify_utf16_decoding() {
        assert_eq!(decode_utf16be(&[0x00, 0x41, 0x00, 0x42]).as_deref(), Some("AB"));
        assert_eq!(decode_utf16le(&[0x41, 0x00, 0x42, 0x00]).as_deref(), Some("AB"));

        // Odd length.
        assert!(decode_utf16be(&[0x00, 0x41, 0x00]).is_none());
        // Unpaired high surrogate.
        assert!(decode_utf16be(&[0xd8, 0x00, 0x00, 0x41]).is_none());
    }

    #[test]
    fn verify_windows1251_detector() {
        // Cyrillic mis-decoded as Latin-1 (run of 8).
        assert!(is_likely_windows1251("\u{c0}\u{ef}\u{ee}\u{f1}\u{f2}\u{f0}\u{ee}\u{f4}"));

        // No ASCII letters and two Cyrillic-mapped codepoints.
        assert!(is_likely_windows1251("\u{c0}\u{2e}\u{c1}"));

        // Plain ASCII text.
        assert!(!is_likely_windows1251("Hello, world"));

        // ASCII letters with a short Cyrillic-mapped suffix (run below threshold).
        assert!(!is_likely_windows1251("abc\u{c0}\u{c1}"));

        // Codepoints beyond U+00FF can not have been Latin-1 decoded.
        assert!(!is_likely_windows1251("Апостроф"));

        // U+0098 never decodes from Windows-1251.
        assert!(!is_likely_windows1251("\u{c0}\u{c1}\u{c2}\u{c3}\u{98}"));
    }
}
