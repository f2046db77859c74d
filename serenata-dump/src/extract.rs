// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::process::ExitCode;

use serenata_core::io::MediaSourceStream;
use serenata_metadata::read_all;

use clap::{Arg, Command};
use log::error;

fn main() -> ExitCode {
    pretty_env_logger::init();

    let matches = Command::new("Serenata Extract")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Copy one discovered tag's byte range out of a file")
        .arg(Arg::new("INPUT").help("The file to read").required(true))
        .arg(Arg::new("OUTPUT").help("The file to write the tag to").required(true))
        .arg(Arg::new("INDEX").help("The discovery-order index of the tag to extract"))
        .get_matches();

    let input = matches.value_of("INPUT").unwrap();
    let output = matches.value_of("OUTPUT").unwrap();

    let index = match matches.value_of("INDEX").unwrap_or("0").parse::<usize>() {
        Ok(index) => index,
        Err(_) => {
            error!("the tag index must be a non-negative integer");
            return ExitCode::FAILURE;
        }
    };

    match extract(input, output, index) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn extract(input: &str, output: &str, index: usize) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = File::open(input)?;

    let all = {
        let mut mss = MediaSourceStream::new(Box::new(file.try_clone()?));
        read_all(&mut mss)?
    };

    let tag = match all.tags.get(index) {
        Some(tag) => tag,
        None => {
            return Err(format!("no tag with index {} ({} found)", index, all.len()).into());
        }
    };

    let len = tag.end_offset() - tag.start_offset();

    file.seek(SeekFrom::Start(tag.start_offset()))?;

    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf)?;

    File::create(output)?.write_all(&buf)?;

    println!(
        "wrote {} tag, bytes {}..{} ({} bytes), to {}",
        tag.kind(),
        tag.start_offset(),
        tag.end_offset(),
        len,
        output
    );

    Ok(())
}
