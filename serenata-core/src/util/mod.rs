// Serenata
// Copyright (c) 2019-2024 The Project Serenata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `util` module provides shared utilities.

pub mod text;
