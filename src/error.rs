// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{fmt, io};

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Json(serde_json::Error),
    /// A fused obstacle carried a bin index outside [0, 72) or one that does
    /// not match its bearing.
    InvalidBin(usize),
    InvalidConfig(String),
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Json(err) => write!(f, "json error: {}", err),
            Error::InvalidBin(bin) => write!(f, "invalid obstacle bin: {}", bin),
            Error::InvalidConfig(reason) => write!(f, "invalid configuration: {}", reason),
        }
    }
}
