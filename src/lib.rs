// Copyright 2023 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! Drop target support for X11 drag and drop.
//!
//! `druid-dnd` implements the receiving side of the two drag and drop protocols found on
//! X11 desktops: [XDnD] and the Motif protocol. Windows are registered as drop sites on a
//! [`DropTargetShell`], which turns the protocol messages into [`DropNotification`]s for a
//! [`DropTargetListener`]. The listener answers with [`DropTargetShell::send_response`],
//! fetches the data with [`DropTargetShell::get_data`] and ends the drop with
//! [`DropTargetShell::send_drop_done`].
//!
//! Drop sites may also live inside windows of other clients (embedders), and XEmbed clients
//! hosted by a drop site receive the drags over it.
//!
//! [XDnD]: https://freedesktop.org/wiki/Specifications/XDND/
//! [`DropTargetShell`]: x11::DropTargetShell
//! [`DropTargetShell::send_response`]: x11::DropTargetShell::send_response
//! [`DropTargetShell::get_data`]: x11::DropTargetShell::get_data
//! [`DropTargetShell::send_drop_done`]: x11::DropTargetShell::send_drop_done

#![warn(rustdoc::broken_intra_doc_links)]
#![allow(clippy::new_without_default)]
#![deny(clippy::trivially_copy_pass_by_ref)]

pub use kurbo;

mod backend;
mod common_util;
mod config;
mod dnd;
mod error;

pub use backend::x11;

pub use config::{DndConfig, DEFAULT_SELECTION_TIMEOUT};
pub use dnd::{
    DragDropToken, DropActions, DropEventKind, DropNotification, DropTargetListener, MessageType,
};
pub use error::{Error, TransferError};
