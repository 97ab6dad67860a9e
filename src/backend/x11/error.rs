// Copyright 2020 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors of the X11 drop target backend.

use std::fmt;
use std::sync::Arc;

use x11rb::errors::{ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::xproto::Window;

#[derive(Debug, Clone)]
pub enum Error {
    XError(Arc<ReplyError>),
    /// Writing a protocol marker property failed.
    PropertyWrite(&'static str, Arc<ReplyError>),
    /// The attributes of a drag source window could not be queried.
    WindowAttributes(Window),
    /// Selecting structure notifications on a drag source window failed.
    SelectInput(Window, Arc<ReplyError>),
}

impl Error {
    /// Attach the name of the property that was being written.
    pub(crate) fn property_write(self, property: &'static str) -> Error {
        match self {
            Error::XError(e) => Error::PropertyWrite(property, e),
            other => other,
        }
    }

    pub(crate) fn select_input(self, window: Window) -> Error {
        match self {
            Error::XError(e) => Error::SelectInput(window, e),
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            Error::XError(e) => e.fmt(f),
            Error::PropertyWrite(property, e) => {
                write!(f, "Cannot write {} property: {}", property, e)
            }
            Error::WindowAttributes(window) => {
                write!(f, "XGetWindowAttributes failed for window {:#x}", window)
            }
            Error::SelectInput(window, e) => {
                write!(f, "XSelectInput failed for window {:#x}: {}", window, e)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<x11rb::x11_utils::X11Error> for Error {
    fn from(err: x11rb::x11_utils::X11Error) -> Error {
        Error::XError(Arc::new(ReplyError::X11Error(err)))
    }
}

impl From<ReplyError> for Error {
    fn from(err: ReplyError) -> Error {
        Error::XError(Arc::new(err))
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Error {
        Error::XError(Arc::new(ReplyError::ConnectionError(err)))
    }
}

impl From<ReplyOrIdError> for Error {
    fn from(err: ReplyOrIdError) -> Error {
        match err {
            ReplyOrIdError::X11Error(e) => e.into(),
            ReplyOrIdError::ConnectionError(e) => e.into(),
            ReplyOrIdError::IdsExhausted => ConnectionError::UnknownError.into(),
        }
    }
}
