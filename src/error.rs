// Copyright 2019 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors of the drop target shell.

use std::fmt;
use std::sync::Arc;

use crate::backend::error as backend;

/// Drop target errors.
#[derive(Debug, Clone)]
pub enum Error {
    /// Platform specific error.
    Platform(backend::Error),
    /// Fetching the dropped data failed.
    Transfer(TransferError),
    /// The drop context cannot be used for the requested operation.
    InvalidContext(&'static str),
    /// Other miscellaneous error.
    Other(Arc<anyhow::Error>),
}

/// Why the data of a drop could not be retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// The selection owner did not answer in time.
    Timeout,
    /// The selection owner refused to convert the selection to the requested format.
    Declined,
    /// The data arrived in a property of the given format instead of format 8.
    UnsupportedFormat(u8),
    /// An incremental transfer was announced without its size.
    MissingIncrLength,
    /// The property holding the data disappeared before it could be read.
    PropertyVanished,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            Error::Platform(err) => fmt::Display::fmt(err, f),
            Error::Transfer(err) => fmt::Display::fmt(err, f),
            Error::InvalidContext(what) => write!(f, "Invalid drop context: {what}"),
            Error::Other(s) => write!(f, "{s}"),
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            TransferError::Timeout => write!(f, "Timeout while waiting for the selection owner"),
            TransferError::Declined => write!(f, "The selection owner declined the conversion"),
            TransferError::UnsupportedFormat(format) => {
                write!(f, "Unsupported selection property format {format}")
            }
            TransferError::MissingIncrLength => write!(f, "INCR transfer without a length"),
            TransferError::PropertyVanished => write!(f, "The selection property vanished"),
        }
    }
}

impl std::error::Error for Error {}

impl std::error::Error for TransferError {}

impl From<anyhow::Error> for Error {
    fn from(src: anyhow::Error) -> Error {
        Error::Other(Arc::new(src))
    }
}

impl From<backend::Error> for Error {
    fn from(src: backend::Error) -> Error {
        Error::Platform(src)
    }
}

impl From<TransferError> for Error {
    fn from(src: TransferError) -> Error {
        Error::Transfer(src)
    }
}
