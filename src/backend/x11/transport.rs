// Copyright 2023 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! The window system primitives the drop target protocols are built on.
//!
//! Everything the protocols need from the X server goes through the [`Transport`] trait, so
//! the state machines can be driven by a real connection ([`X11Transport`]) or by a scripted
//! server in tests.

use std::convert::TryFrom;

use anyhow::Context;
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::xproto::{
    Atom, ClientMessageEvent, ConnectionExt, CreateWindowAux, EventMask, GetPropertyReply,
    MapState, PropMode, Timestamp, Window, WindowClass,
};
use x11rb::protocol::ErrorKind;
use x11rb::resource_manager::new_from_default as new_resource_db_from_default;
use x11rb::rust_connection::RustConnection;

use super::error::Error;
use super::screen::{self, Monitor};
use crate::config::DndConfig;

// This creates a `struct DndAtoms` containing the atoms that make up the interop surface with
// other X clients. The names must not change:
//
// Xdnd*
//
// The XDnD protocol, see https://freedesktop.org/wiki/Specifications/XDND/
//
// _MOTIF_DRAG_*, _MOTIF_ATOM_0, XmTRANSFER_*
//
// The Motif drag and drop protocol, see DragICCI.h in the Motif sources.
//
// DELETE
//
// Target requested from the source after a successful move.
//
// INCR
//
// Type used for incremental selection transfers
//
// _DRUID_DND_SELECTION
//
// The property on our proxy window that selection data is converted into.
//
// _DRUID_DND_WAKEUP
//
// Type of the client message that wakes the event loop up when it has to stop.
x11rb::atom_manager! {
    pub DndAtoms: DndAtomsCookie {
        XdndAware,
        XdndProxy,
        XdndEnter,
        XdndPosition,
        XdndStatus,
        XdndLeave,
        XdndDrop,
        XdndFinished,
        XdndActionCopy,
        XdndActionMove,
        XdndActionLink,
        XdndActionList,
        XdndTypeList,
        XdndSelection,
        _MOTIF_DRAG_WINDOW,
        _MOTIF_DRAG_TARGETS,
        _MOTIF_DRAG_INITIATOR_INFO,
        _MOTIF_DRAG_RECEIVER_INFO,
        _MOTIF_DRAG_AND_DROP_MESSAGE,
        _MOTIF_ATOM_0,
        XmTRANSFER_SUCCESS,
        XmTRANSFER_FAILURE,
        DELETE,
        INCR,
        _DRUID_DND_SELECTION,
        _DRUID_DND_WAKEUP,
    }
}

/// The `AnyPropertyType` wildcard for [`Transport::get_property`].
pub const ANY_PROPERTY_TYPE: Atom = 0;

/// What the protocols need to know about a window when hit-testing drop sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub mapped: bool,
    pub width: u16,
    pub height: u16,
}

/// Requests the drop target protocols issue to the window system.
///
/// Requests that name a window which no longer exists report `Ok(None)` instead of an
/// error; drag sources are other processes and may disappear at any time.
pub trait Transport: Send + Sync {
    fn atoms(&self) -> &DndAtoms;

    /// The root window of the screen we are running on.
    fn root(&self) -> Window;

    fn intern_atom(&self, name: &str) -> Result<Atom, Error>;

    /// Create the unmapped, input-only window that acts as DnD proxy for embedded drop
    /// sites and as requestor for selection transfers.
    fn create_proxy_window(&self) -> Result<Window, Error>;

    /// Read up to `long_length` 32-bit units of a property, without deleting it.
    fn get_property(
        &self,
        window: Window,
        property: Atom,
        type_: Atom,
        long_length: u32,
    ) -> Result<Option<GetPropertyReply>, Error>;

    /// Replace a property and wait for the server to confirm the write.
    ///
    /// `data` holds the raw property bytes; for format 32 these are native endian.
    fn change_property(
        &self,
        window: Window,
        property: Atom,
        type_: Atom,
        format: u8,
        data: &[u8],
    ) -> Result<(), Error>;

    fn delete_property(&self, window: Window, property: Atom) -> Result<(), Error>;

    /// Send a client message to `destination` with an empty event mask.
    fn send_client_message(
        &self,
        destination: Window,
        message: &ClientMessageEvent,
    ) -> Result<(), Error>;

    /// The event mask this client has selected on `window`.
    fn window_event_mask(&self, window: Window) -> Result<Option<u32>, Error>;

    fn select_input(&self, window: Window, event_mask: u32) -> Result<(), Error>;

    fn window_state(&self, window: Window) -> Result<Option<WindowState>, Error>;

    /// Translate `(x, y)` from `src` to `dst` coordinates.
    fn translate_coordinates(
        &self,
        src: Window,
        dst: Window,
        x: i32,
        y: i32,
    ) -> Result<Option<(i32, i32)>, Error>;

    fn convert_selection(
        &self,
        requestor: Window,
        selection: Atom,
        target: Atom,
        property: Atom,
        time: Timestamp,
    ) -> Result<(), Error>;

    /// The monitors of the screen, in root window coordinates.
    fn monitors(&self) -> Vec<Monitor>;

    fn flush(&self) -> Result<(), Error>;
}

/// Map a `BadWindow` reply to `None`; the window went away while we were looking at it.
fn ignore_bad_window<T>(result: Result<T, ReplyError>) -> Result<Option<T>, Error> {
    match result {
        Ok(reply) => Ok(Some(reply)),
        Err(ReplyError::X11Error(e)) if e.error_kind == ErrorKind::Window => {
            tracing::debug!("ignoring BadWindow for resource {:#x}", e.bad_value);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn clamp_coordinate(value: i32) -> i16 {
    i16::try_from(value).unwrap_or(if value < 0 { i16::MIN } else { i16::MAX })
}

/// [`Transport`] on top of an x11rb connection.
#[derive(Debug)]
pub struct X11Transport<C = RustConnection> {
    /// The connection to the X server.
    connection: C,
    /// The screen our proxy window and the root window belong to.
    screen_num: usize,
    /// The atoms that we need
    atoms: DndAtoms,
    /// Scale factor applied to every monitor, from `DRUID_X11_DPI` or `Xft.dpi`.
    scale: f64,
}

impl X11Transport<RustConnection> {
    /// Connect to the display named by `$DISPLAY`.
    pub fn connect(config: &DndConfig) -> Result<Self, anyhow::Error> {
        let (conn, screen_num) = x11rb::connect(None).context("connect to the X server")?;
        X11Transport::new(conn, screen_num, config)
    }
}

impl<C: Connection + Send + Sync> X11Transport<C> {
    pub fn new(connection: C, screen_num: usize, config: &DndConfig) -> Result<Self, anyhow::Error> {
        if connection.setup().roots.get(screen_num).is_none() {
            anyhow::bail!("Invalid screen num: {}", screen_num);
        }
        let atoms = DndAtoms::new(&connection)?
            .reply()
            .context("get X11 atoms")?;

        let dpi = match config.dpi {
            Some(dpi) => Some(dpi),
            None => new_resource_db_from_default(&connection)
                .ok()
                .and_then(|rdb| match rdb.get_value::<f64>("Xft.dpi", "") {
                    Ok(dpi) => dpi,
                    Err(err) => {
                        tracing::warn!("Unable to parse Xft.dpi: {:?}", err);
                        None
                    }
                }),
        };
        let scale = dpi.map(|dpi| dpi / 96.).unwrap_or(1.0);

        Ok(X11Transport {
            connection,
            screen_num,
            atoms,
            scale,
        })
    }

    #[inline]
    pub fn connection(&self) -> &C {
        &self.connection
    }

    #[inline]
    pub fn screen_num(&self) -> usize {
        self.screen_num
    }
}

impl<C: Connection + Send + Sync> Transport for X11Transport<C> {
    fn atoms(&self) -> &DndAtoms {
        &self.atoms
    }

    fn root(&self) -> Window {
        self.connection.setup().roots[self.screen_num].root
    }

    fn intern_atom(&self, name: &str) -> Result<Atom, Error> {
        Ok(self
            .connection
            .intern_atom(false, name.as_bytes())?
            .reply()?
            .atom)
    }

    fn create_proxy_window(&self) -> Result<Window, Error> {
        let conn = &self.connection;
        let id = conn.generate_id()?;
        conn.create_window(
            // Window depth
            0,
            // The new window's ID
            id,
            // Parent window of this new window
            self.root(),
            // X-coordinate of the new window
            -10,
            // Y-coordinate of the new window
            -10,
            // Width of the new window
            1,
            // Height of the new window
            1,
            // Border width
            0,
            // Window class type
            WindowClass::INPUT_ONLY,
            // Visual ID
            x11rb::COPY_FROM_PARENT,
            // Window properties mask
            &CreateWindowAux::new()
                .event_mask(u32::from(EventMask::PROPERTY_CHANGE | EventMask::STRUCTURE_NOTIFY)),
        )?
        .check()?;
        Ok(id)
    }

    fn get_property(
        &self,
        window: Window,
        property: Atom,
        type_: Atom,
        long_length: u32,
    ) -> Result<Option<GetPropertyReply>, Error> {
        let cookie = self
            .connection
            .get_property(false, window, property, type_, 0, long_length)?;
        ignore_bad_window(cookie.reply())
    }

    fn change_property(
        &self,
        window: Window,
        property: Atom,
        type_: Atom,
        format: u8,
        data: &[u8],
    ) -> Result<(), Error> {
        let unit = usize::from(format / 8).max(1);
        let data_len = u32::try_from(data.len() / unit).unwrap_or(u32::MAX);
        self.connection
            .change_property(PropMode::REPLACE, window, property, type_, format, data_len, data)?
            .check()?;
        Ok(())
    }

    fn delete_property(&self, window: Window, property: Atom) -> Result<(), Error> {
        self.connection.delete_property(window, property)?;
        Ok(())
    }

    fn send_client_message(
        &self,
        destination: Window,
        message: &ClientMessageEvent,
    ) -> Result<(), Error> {
        self.connection
            .send_event(false, destination, EventMask::NO_EVENT, *message)?;
        Ok(())
    }

    fn window_event_mask(&self, window: Window) -> Result<Option<u32>, Error> {
        let cookie = self.connection.get_window_attributes(window)?;
        Ok(ignore_bad_window(cookie.reply())?.map(|attrs| u32::from(attrs.your_event_mask)))
    }

    fn select_input(&self, window: Window, event_mask: u32) -> Result<(), Error> {
        let aux = x11rb::protocol::xproto::ChangeWindowAttributesAux::new().event_mask(event_mask);
        let cookie = self.connection.change_window_attributes(window, &aux)?;
        // A vanished source window is not worth failing the session setup over.
        match ignore_bad_window(cookie.check())? {
            Some(()) | None => Ok(()),
        }
    }

    fn window_state(&self, window: Window) -> Result<Option<WindowState>, Error> {
        let attrs = self.connection.get_window_attributes(window)?;
        let geometry = self.connection.get_geometry(window)?;
        let attrs = match ignore_bad_window(attrs.reply())? {
            Some(attrs) => attrs,
            None => return Ok(None),
        };
        let geometry = match ignore_bad_window(geometry.reply())? {
            Some(geometry) => geometry,
            None => return Ok(None),
        };
        Ok(Some(WindowState {
            mapped: u8::from(attrs.map_state) != u8::from(MapState::UNMAPPED),
            width: geometry.width,
            height: geometry.height,
        }))
    }

    fn translate_coordinates(
        &self,
        src: Window,
        dst: Window,
        x: i32,
        y: i32,
    ) -> Result<Option<(i32, i32)>, Error> {
        let cookie = self.connection.translate_coordinates(
            src,
            dst,
            clamp_coordinate(x),
            clamp_coordinate(y),
        )?;
        Ok(ignore_bad_window(cookie.reply())?.map(|reply| (reply.dst_x.into(), reply.dst_y.into())))
    }

    fn convert_selection(
        &self,
        requestor: Window,
        selection: Atom,
        target: Atom,
        property: Atom,
        time: Timestamp,
    ) -> Result<(), Error> {
        self.connection
            .convert_selection(requestor, selection, target, property, time)?;
        Ok(())
    }

    fn monitors(&self) -> Vec<Monitor> {
        screen::get_monitors(&self.connection, self.screen_num, self.scale)
    }

    fn flush(&self) -> Result<(), Error> {
        self.connection.flush()?;
        Ok(())
    }
}
