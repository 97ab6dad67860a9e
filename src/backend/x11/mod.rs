// Copyright 2020 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! X11 implementation of the drop target protocols.

// # Notes on error handling in X11
//
// Drag sources are other clients, and the windows they name may be gone by the time we
// look at them. Requests that hit such a window report `Ok(None)` through the transport
// instead of failing, and the protocols treat the message as not handled.
//
// When checking for X11 errors synchronously, there are two places where the error could
// happen. An error on the request means the connection is broken. There's no need for
// extra error context here, because the fact that the connection broke has nothing to do
// with what we're trying to do. An error on the reply means there was something wrong with
// the request, and so we add context. This convention is used throughout the x11 backend.
//
// The event thread never propagates errors; they are logged and the event is reported as
// not handled.

#[macro_use]
mod util;

pub mod application;
pub mod error;
mod motif;
mod protocol;
mod registry;
pub mod screen;
mod selection;
mod shell;
pub mod transport;
mod wire;
mod xdnd;

#[cfg(test)]
mod testing;

pub use x11rb::protocol::xproto::{Atom, Window};

pub use application::{EventLoop, EventLoopHandle};
pub use protocol::{DropContext, ProtocolKind};
pub use registry::EmbedderEntry;
pub use shell::DropTargetShell;
pub use transport::{DndAtoms, Transport, WindowState, X11Transport};
