// Copyright 2023 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! The operations shared by the drop target protocols, and the state they operate on.

use std::collections::HashSet;

use kurbo::Point;
use x11rb::protocol::xproto::{Atom, ClientMessageEvent, Timestamp, Window};

use super::error::Error;
use super::registry::EmbeddingRegistry;
use super::screen::{self, Monitor};
use super::transport::{DndAtoms, Transport};
use crate::dnd::{DragDropToken, DropActions, DropEventKind, DropNotification, MessageType};

/// The drag and drop protocols we implement the drop target side of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    Motif,
    Xdnd,
}

/// The message behind a drop notification.
///
/// Hand it back to [`DropTargetShell::send_response`], [`DropTargetShell::get_data`] and
/// [`DropTargetShell::send_drop_done`].
///
/// [`DropTargetShell::send_response`]: super::DropTargetShell::send_response
/// [`DropTargetShell::get_data`]: super::DropTargetShell::get_data
/// [`DropTargetShell::send_drop_done`]: super::DropTargetShell::send_drop_done
#[derive(Clone, Copy, Debug)]
pub struct DropContext {
    pub(crate) kind: ProtocolKind,
    pub(crate) token: DragDropToken,
    pub(crate) message: ClientMessageEvent,
}

impl DropContext {
    pub fn kind(&self) -> ProtocolKind {
        self.kind
    }

    /// The drag session this context belongs to.
    pub fn token(&self) -> DragDropToken {
        self.token
    }

    pub fn message(&self) -> &ClientMessageEvent {
        &self.message
    }
}

/// The selection and timestamp to convert when fetching the data of a drag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionRequest {
    pub selection: Atom,
    pub time: Timestamp,
}

/// Where to relay status and finish messages while an XEmbed client is the drop target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ProxyMode {
    /// The real drag source.
    pub source: Window,
    /// The window the source is talking to.
    pub window: Window,
}

/// The state of the shell a protocol may read or change while handling a call.
pub(crate) struct ProtocolCx<'a> {
    pub conn: &'a dyn Transport,
    /// Our proxy window; also the requestor of selection conversions.
    pub proxy_window: Window,
    /// Windows registered as drop sites.
    pub targets: &'a HashSet<Window>,
    pub registry: &'a mut EmbeddingRegistry,
    pub monitors: &'a [Monitor],
    /// While set, status and finish messages from an XEmbed client are relayed to the
    /// drag source.
    pub proxy_mode: &'a mut Option<ProxyMode>,
    /// Notifications to deliver once the state lock is released.
    pub outbox: &'a mut Vec<DropNotification>,
}

impl ProtocolCx<'_> {
    #[inline]
    pub fn atoms(&self) -> &DndAtoms {
        self.conn.atoms()
    }

    pub fn is_local_target(&self, window: Window) -> bool {
        self.targets.contains(&window)
    }

    /// Convert a root window position into logical coordinates of `window`.
    pub fn to_local(&self, window: Window, x: i32, y: i32) -> Result<Option<Point>, Error> {
        let scale = screen::scale_at(self.monitors, x, y);
        let local = self
            .conn
            .translate_coordinates(self.conn.root(), window, x, y)?
            .map(|(lx, ly)| Point::new(f64::from(lx) / scale, f64::from(ly) / scale));
        Ok(local)
    }

    /// Find our drop site for a message addressed to `window` at the root position `(x, y)`.
    ///
    /// Returns the site and the position in its coordinates.
    pub fn resolve_target(
        &self,
        window: Window,
        x: i32,
        y: i32,
    ) -> Result<Option<(Window, Point)>, Error> {
        let site = if self.is_local_target(window) {
            Some(window)
        } else {
            self.registry
                .embedded_drop_site(self.conn, window, x, y)?
                .filter(|site| self.is_local_target(*site))
        };
        match site {
            Some(site) => Ok(self.to_local(site, x, y)?.map(|point| (site, point))),
            None => Ok(None),
        }
    }

    /// Re-address a client message to the previous owner of an embedder window.
    pub fn forward_to_toplevel(
        &self,
        kind: ProtocolKind,
        toplevel: Window,
        message: &ClientMessageEvent,
    ) -> Result<(), Error> {
        let entry = match self.registry.entry(kind, toplevel) {
            Some(entry) if entry.overridden => entry,
            _ => return Ok(()),
        };
        let destination = if entry.proxy != 0 {
            entry.proxy
        } else {
            toplevel
        };
        let mut message = *message;
        message.window = toplevel;
        self.conn.send_client_message(destination, &message)
    }

    pub fn notify(&mut self, notification: DropNotification) {
        tracing::trace!(
            "{:?} on {:#x} at {:?}",
            notification.kind,
            notification.window,
            notification.position
        );
        self.outbox.push(notification);
    }
}

/// The drop target side of one drag and drop protocol.
///
/// Every method runs with the state lock of the shell held. Errors are only returned for
/// transport failures; malformed, stale and foreign messages are reported as not handled.
pub(crate) trait DropTargetProtocol: Send {
    fn kind(&self) -> ProtocolKind;

    /// Advertise `window` as a drop site.
    fn register_drop_target(&mut self, cx: &mut ProtocolCx, window: Window) -> Result<(), Error>;

    fn unregister_drop_target(&mut self, cx: &mut ProtocolCx, window: Window)
        -> Result<(), Error>;

    /// Route drags over a foreign embedder window through our proxy window.
    fn register_embedder_drop_site(
        &mut self,
        cx: &mut ProtocolCx,
        embedder: Window,
    ) -> Result<(), Error>;

    /// Restore what the embedder advertised before `register_embedder_drop_site`.
    fn unregister_embedder_drop_site(
        &mut self,
        cx: &mut ProtocolCx,
        embedder: Window,
    ) -> Result<(), Error>;

    /// Record what `embedded` advertises, without changing it.
    fn register_embedded_drop_site(
        &mut self,
        cx: &mut ProtocolCx,
        embedded: Window,
    ) -> Result<(), Error>;

    fn is_protocol_supported(&self, cx: &ProtocolCx, window: Window) -> Result<bool, Error>;

    fn message_type(&self, atoms: &DndAtoms, message: &ClientMessageEvent) -> MessageType;

    /// Advance the session state machine. Returns whether the message was handled.
    fn process_client_message(
        &mut self,
        cx: &mut ProtocolCx,
        message: &ClientMessageEvent,
    ) -> Result<bool, Error>;

    /// Tell the source whether the site under the pointer accepts `action`.
    fn send_response(
        &mut self,
        cx: &mut ProtocolCx,
        context: &DropContext,
        event: DropEventKind,
        action: DropActions,
    ) -> Result<bool, Error>;

    /// The selection and time to convert when fetching data for `context`.
    fn selection_request(
        &self,
        atoms: &DndAtoms,
        context: &DropContext,
    ) -> Result<SelectionRequest, crate::Error>;

    /// Tell the source the drop is complete and end the session.
    fn send_drop_done(
        &mut self,
        cx: &mut ProtocolCx,
        context: &DropContext,
        success: bool,
        action: DropActions,
    ) -> Result<bool, Error>;

    /// End the session, if any. Safe to call at any time.
    fn cleanup(&mut self, cx: &mut ProtocolCx);

    /// The source window of the active session, or 0.
    fn source_window(&self) -> Window;

    /// The token of the active session.
    fn session_token(&self) -> Option<DragDropToken>;

    /// Whether the drag is over one of our drop sites.
    fn is_drag_over_component(&self) -> bool;

    /// Tell the previous owner of `toplevel` that a drag entered it.
    fn send_enter_to_toplevel(
        &mut self,
        cx: &mut ProtocolCx,
        toplevel: Window,
        message: &ClientMessageEvent,
    ) -> Result<(), Error>;

    /// Tell the previous owner of `toplevel` that the drag left it.
    fn send_leave_to_toplevel(
        &mut self,
        cx: &mut ProtocolCx,
        toplevel: Window,
        message: &ClientMessageEvent,
    ) -> Result<(), Error>;

    /// Pass a drag event on to an XEmbed client.
    ///
    /// `context` is `None` for the exit of a session that ended without a message. Returns
    /// false if the protocol cannot forward to `embedded`, in which case the event is
    /// delivered to the listener as usual.
    fn forward_event_to_embedded(
        &mut self,
        _cx: &mut ProtocolCx,
        _embedded: Window,
        _context: Option<&DropContext>,
        _event: DropEventKind,
    ) -> Result<bool, Error> {
        Ok(false)
    }
}

/// Pass a handled or unhandled message addressed to an embedder window on to the window's
/// previous owner, so that drops onto the parts of the embedder outside our sites keep
/// working.
pub(crate) fn post_process_client_message(
    protocol: &mut dyn DropTargetProtocol,
    cx: &mut ProtocolCx,
    message: &ClientMessageEvent,
    processed: bool,
) -> Result<(), Error> {
    let toplevel = message.window;
    let kind = protocol.kind();
    if cx.registry.entry(kind, toplevel).is_none() {
        return Ok(());
    }

    if !processed {
        return cx.forward_to_toplevel(kind, toplevel, message);
    }

    match protocol.message_type(cx.atoms(), message) {
        MessageType::Motion | MessageType::Drop => {
            if !protocol.is_drag_over_component() {
                cx.forward_to_toplevel(kind, toplevel, message)?;
            }
        }
        MessageType::Enter => {
            if kind != ProtocolKind::Motif {
                protocol.send_enter_to_toplevel(cx, toplevel, message)?;
            }
        }
        MessageType::Leave => match kind {
            ProtocolKind::Motif => cx.forward_to_toplevel(kind, toplevel, message)?,
            ProtocolKind::Xdnd => protocol.send_leave_to_toplevel(cx, toplevel, message)?,
        },
        MessageType::Unknown => {}
    }
    Ok(())
}
