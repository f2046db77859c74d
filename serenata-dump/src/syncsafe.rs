// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::process::ExitCode;

use serenata_metadata::id3v2::sync::{decode_syncsafe_u28, encode_syncsafe_u28};

use clap::{Arg, Command};

fn main() -> ExitCode {
    let matches = Command::new("Serenata Syncsafe")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Encode or decode 28-bit synchsafe integers")
        .arg(Arg::new("decode").short('d').long("decode").help("Decode instead of encode"))
        .arg(Arg::new("NUMBER").help("The number to convert").required(true))
        .get_matches();

    let number = matches.value_of("NUMBER").unwrap();

    let value = match parse_number(number) {
        Some(value) => value,
        None => {
            eprintln!("error: '{}' is not a valid number", number);
            return ExitCode::FAILURE;
        }
    };

    if matches.is_present("decode") {
        let decoded = decode_syncsafe_u28(value.to_be_bytes());
        println!("{} (0x{:x})", decoded, decoded);
    }
    else {
        if value >= 1 << 28 {
            eprintln!("error: {} does not fit in a 28-bit synchsafe integer", value);
            return ExitCode::FAILURE;
        }

        let encoded = u32::from_be_bytes(encode_syncsafe_u28(value));
        println!("{} (0x{:x})", encoded, encoded);
    }

    ExitCode::SUCCESS
}

fn parse_number(text: &str) -> Option<u32> {
    match text.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
