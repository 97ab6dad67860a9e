// Copyright 2020 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! Miscellaneous utility functions for working with X11.

use x11rb::protocol::xproto::{Atom, GetPropertyReply};

macro_rules! log_x11 {
    ($val:expr) => {
        if let Err(e) = $val {
            // We probably don't want to include file/line numbers. This logging is done in
            // a context where X11 errors probably just mean that the connection to the X server
            // was lost. In particular, it doesn't represent a druid-dnd bug for which we want
            // more context.
            tracing::error!("X11 error: {}", e);
        }
    };
}

/// Wrapper around `Mutex::lock` that turns poisoning into an error with context.
macro_rules! lock {
    ($val:expr) => {{
        $val.lock().map_err(|_| {
            anyhow::anyhow!(
                "[{}:{}] {} is poisoned",
                std::file!(),
                std::line!(),
                std::stringify!($val)
            )
        })
    }};
}

/// The 32-bit items of a property, if it has the given type and format 32.
pub(crate) fn property_atoms(reply: &GetPropertyReply, type_: Atom) -> Option<Vec<u32>> {
    if reply.type_ != type_ {
        return None;
    }
    reply.value32().map(|items| items.collect())
}

/// The first 32-bit item of a property of the given type, if any.
pub(crate) fn property_u32(reply: &GetPropertyReply, type_: Atom) -> Option<u32> {
    property_atoms(reply, type_).and_then(|items| items.first().copied())
}

/// Encode 32-bit items the way the server expects the data of a format 32 property.
pub(crate) fn u32_bytes(items: &[u32]) -> Vec<u8> {
    items.iter().flat_map(|item| item.to_ne_bytes()).collect()
}
