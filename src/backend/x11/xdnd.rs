// Copyright 2023 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! The drop target side of the XDnD protocol.
//!
//! See <https://freedesktop.org/wiki/Specifications/XDND/>. All messages are format 32 client
//! messages; word 0 is the window of the sender.

use kurbo::Point;
use tracing::debug;
use x11rb::protocol::xproto::{Atom, AtomEnum, ClientMessageEvent, EventMask, Window};

use super::error::Error;
use super::protocol::{
    DropContext, DropTargetProtocol, ProtocolCx, ProtocolKind, ProxyMode, SelectionRequest,
};
use super::registry::EmbedderEntry;
use super::transport::DndAtoms;
use super::util::{property_atoms, property_u32, u32_bytes};
use crate::dnd::{DragDropToken, DropActions, DropEventKind, DropNotification, MessageType};

/// The oldest version we talk.
const XDND_MIN_PROTOCOL_VERSION: u32 = 3;
/// The first version with `XdndProxy`.
const XDND_PROXY_VERSION: u32 = 4;
/// The version we advertise, and the newest we talk.
pub(crate) const XDND_PROTOCOL_VERSION: u32 = 5;

/// In `XdndEnter` word 1: the source has more than three types, see `XdndTypeList`.
const XDND_DATA_TYPES_BIT: u32 = 0x1;
/// In `XdndStatus` word 1: the target accepts the drop.
const XDND_ACCEPT_DROP_FLAG: u32 = 0x1;
/// In `XdndFinished` word 1: the drop succeeded.
const XDND_ACCEPTED_FLAG: u32 = 0x1;

fn version_of_enter(data: &[u32; 5]) -> u32 {
    data[1] >> 24
}

fn atom_to_action(atoms: &DndAtoms, atom: Atom) -> DropActions {
    if atom == atoms.XdndActionCopy {
        DropActions::COPY
    } else if atom == atoms.XdndActionMove {
        DropActions::MOVE
    } else if atom == atoms.XdndActionLink {
        DropActions::LINK
    } else {
        DropActions::empty()
    }
}

fn action_to_atom(atoms: &DndAtoms, action: DropActions) -> Atom {
    match action.preferred() {
        DropActions::COPY => atoms.XdndActionCopy,
        DropActions::MOVE => atoms.XdndActionMove,
        DropActions::LINK => atoms.XdndActionLink,
        _ => x11rb::NONE,
    }
}

/// The window and version `window` advertises through `XdndAware` and `XdndProxy`.
fn read_aware(cx: &ProtocolCx, window: Window) -> Result<EmbedderEntry, Error> {
    let atoms = cx.atoms();
    let atom_type = u32::from(AtomEnum::ATOM);
    let window_type = u32::from(AtomEnum::WINDOW);
    let version = cx
        .conn
        .get_property(window, atoms.XdndAware, atom_type, 1)?
        .and_then(|reply| property_u32(&reply, atom_type));
    let proxy = match version {
        Some(version) if version >= XDND_PROXY_VERSION => cx
            .conn
            .get_property(window, atoms.XdndProxy, window_type, 1)?
            .and_then(|reply| property_u32(&reply, window_type))
            .unwrap_or(x11rb::NONE),
        _ => x11rb::NONE,
    };
    Ok(EmbedderEntry {
        overridden: version.is_some(),
        version: version.unwrap_or(0),
        proxy,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct EmbeddedTarget {
    client: Window,
    /// The window the messages to the client are sent to.
    destination: Window,
}

#[derive(Debug, Default)]
pub(crate) struct XdndProtocol {
    source_window: Window,
    source_window_mask: u32,
    source_protocol_version: u32,
    source_actions: DropActions,
    /// The source has no action list; collect the actions it asks for instead.
    track_source_actions: bool,
    source_formats: Vec<Atom>,
    target_window: Option<Window>,
    position: Point,
    user_action: DropActions,
    token: Option<DragDropToken>,
    /// The XEmbed client the drag is currently forwarded to.
    embedded: Option<EmbeddedTarget>,
}

impl XdndProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_session_source(&self, message: &ClientMessageEvent) -> bool {
        self.source_window != x11rb::NONE && message.data.as_data32()[0] == self.source_window
    }

    fn context(&self, message: &ClientMessageEvent) -> Option<DropContext> {
        self.token.map(|token| DropContext {
            kind: ProtocolKind::Xdnd,
            token,
            message: *message,
        })
    }

    /// Report an event, or forward it if `window` hosts an XEmbed client.
    fn notify(
        &mut self,
        cx: &mut ProtocolCx,
        window: Window,
        kind: DropEventKind,
        action: DropActions,
        context: Option<DropContext>,
    ) -> Result<(), Error> {
        if let Some(client) = cx.registry.xembed_client(window) {
            if self.forward_event_to_embedded(cx, client, context.as_ref(), kind)? {
                return Ok(());
            }
        }
        cx.notify(DropNotification {
            window,
            kind,
            position: self.position,
            action,
            source_actions: self.source_actions,
            formats: self.source_formats.clone(),
            context,
        });
        Ok(())
    }

    /// An `XdndEnter` from us, announcing the session to `window` at `version`.
    fn enter_message(
        &self,
        cx: &ProtocolCx,
        window: Window,
        source: Window,
        version: u32,
    ) -> ClientMessageEvent {
        let mut data = [0u32; 5];
        data[0] = source;
        data[1] = version << 24;
        if self.source_formats.len() > 3 {
            data[1] |= XDND_DATA_TYPES_BIT;
        }
        for (slot, format) in data[2..].iter_mut().zip(&self.source_formats) {
            *slot = *format;
        }
        ClientMessageEvent::new(32, window, cx.atoms().XdndEnter, data)
    }

    fn leave_message(&self, cx: &ProtocolCx, window: Window, source: Window) -> ClientMessageEvent {
        ClientMessageEvent::new(32, window, cx.atoms().XdndLeave, [source, 0, 0, 0, 0])
    }

    fn process_enter(
        &mut self,
        cx: &mut ProtocolCx,
        message: &ClientMessageEvent,
    ) -> Result<bool, Error> {
        if self.source_window != x11rb::NONE {
            debug!("XdndEnter while a drag is in progress");
            return Ok(false);
        }
        if !cx.is_local_target(message.window)
            && cx.registry.entry(ProtocolKind::Xdnd, message.window).is_none()
        {
            return Ok(false);
        }
        let data = message.data.as_data32();
        let version = version_of_enter(&data);
        if !(XDND_MIN_PROTOCOL_VERSION..=XDND_PROTOCOL_VERSION).contains(&version) {
            debug!("unsupported XDnD version {}", version);
            return Ok(false);
        }
        let source_window = data[0];
        let atoms = *cx.atoms();
        let atom_type = u32::from(AtomEnum::ATOM);

        let mut track_source_actions = false;
        let list = cx
            .conn
            .get_property(source_window, atoms.XdndActionList, atom_type, u32::MAX)?
            .and_then(|reply| property_atoms(&reply, atom_type));
        let source_actions = match list {
            Some(list) => list
                .into_iter()
                .fold(DropActions::empty(), |acc, atom| acc | atom_to_action(&atoms, atom)),
            None => {
                track_source_actions = true;
                DropActions::COPY
            }
        };

        let source_formats = if data[1] & XDND_DATA_TYPES_BIT != 0 {
            cx.conn
                .get_property(source_window, atoms.XdndTypeList, atom_type, u32::MAX)?
                .and_then(|reply| property_atoms(&reply, atom_type))
                .unwrap_or_default()
        } else {
            data[2..]
                .iter()
                .copied()
                .filter(|atom| *atom != x11rb::NONE)
                .collect()
        };

        let mask = cx
            .conn
            .window_event_mask(source_window)?
            .ok_or(Error::WindowAttributes(source_window))?;
        cx.conn
            .select_input(
                source_window,
                mask | u32::from(EventMask::STRUCTURE_NOTIFY),
            )
            .map_err(|e| e.select_input(source_window))?;

        self.source_window = source_window;
        self.source_window_mask = mask;
        self.source_protocol_version = version;
        self.source_actions = source_actions;
        self.track_source_actions = track_source_actions;
        self.source_formats = source_formats;
        self.token = Some(DragDropToken::next());
        Ok(true)
    }

    fn process_position(
        &mut self,
        cx: &mut ProtocolCx,
        message: &ClientMessageEvent,
    ) -> Result<bool, Error> {
        if !self.is_session_source(message) {
            return Ok(false);
        }
        let data = message.data.as_data32();
        let x = (data[2] >> 16) as u16;
        let y = (data[2] & 0xFFFF) as u16;
        let action = atom_to_action(cx.atoms(), data[4]);
        if self.track_source_actions {
            self.source_actions |= action;
        }

        let context = self.context(message);
        let target = cx.resolve_target(message.window, i32::from(x), i32::from(y))?;
        match (self.target_window, target) {
            (Some(old), None) => {
                self.target_window = None;
                self.notify(cx, old, DropEventKind::Exit, DropActions::empty(), context)?;
            }
            (old, Some((window, position))) => {
                self.position = position;
                self.target_window = Some(window);
                let kind = match old {
                    Some(old) if old == window => DropEventKind::Motion,
                    Some(old) => {
                        self.notify(cx, old, DropEventKind::Exit, DropActions::empty(), context)?;
                        DropEventKind::Enter
                    }
                    None => DropEventKind::Enter,
                };
                self.notify(cx, window, kind, action, context)?;
            }
            (None, None) => {}
        }
        self.user_action = action;
        Ok(true)
    }

    fn process_leave(
        &mut self,
        cx: &mut ProtocolCx,
        message: &ClientMessageEvent,
    ) -> Result<bool, Error> {
        if !self.is_session_source(message) {
            return Ok(false);
        }
        self.cleanup(cx);
        Ok(true)
    }

    fn process_drop(
        &mut self,
        cx: &mut ProtocolCx,
        message: &ClientMessageEvent,
    ) -> Result<bool, Error> {
        if !self.is_session_source(message) {
            return Ok(false);
        }
        let target = match self.target_window {
            Some(target) => target,
            None => return Ok(false),
        };
        let context = self.context(message);
        self.notify(cx, target, DropEventKind::Drop, self.user_action, context)?;
        Ok(true)
    }
}

impl DropTargetProtocol for XdndProtocol {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Xdnd
    }

    fn register_drop_target(&mut self, cx: &mut ProtocolCx, window: Window) -> Result<(), Error> {
        cx.conn
            .change_property(
                window,
                cx.atoms().XdndAware,
                AtomEnum::ATOM.into(),
                32,
                &u32_bytes(&[XDND_PROTOCOL_VERSION]),
            )
            .map_err(|e| e.property_write("XdndAware"))
    }

    fn unregister_drop_target(
        &mut self,
        cx: &mut ProtocolCx,
        window: Window,
    ) -> Result<(), Error> {
        cx.conn.delete_property(window, cx.atoms().XdndAware)
    }

    fn register_embedder_drop_site(
        &mut self,
        cx: &mut ProtocolCx,
        embedder: Window,
    ) -> Result<(), Error> {
        let entry = read_aware(cx, embedder)?;
        if entry.overridden && entry.proxy == cx.proxy_window {
            return Ok(());
        }
        let atoms = *cx.atoms();
        let proxy = u32_bytes(&[cx.proxy_window]);
        let window_type = AtomEnum::WINDOW.into();

        // A proxy must point at itself, and sources check that it is aware.
        cx.conn
            .change_property(cx.proxy_window, atoms.XdndProxy, window_type, 32, &proxy)
            .map_err(|e| e.property_write("XdndProxy"))?;
        cx.conn
            .change_property(
                cx.proxy_window,
                atoms.XdndAware,
                AtomEnum::ATOM.into(),
                32,
                &u32_bytes(&[XDND_PROTOCOL_VERSION]),
            )
            .map_err(|e| e.property_write("XdndAware"))?;
        cx.conn
            .change_property(
                embedder,
                atoms.XdndAware,
                AtomEnum::ATOM.into(),
                32,
                &u32_bytes(&[XDND_PROTOCOL_VERSION]),
            )
            .map_err(|e| e.property_write("XdndAware"))?;
        cx.conn
            .change_property(embedder, atoms.XdndProxy, window_type, 32, &proxy)
            .map_err(|e| e.property_write("XdndProxy"))?;
        cx.registry.set_entry(ProtocolKind::Xdnd, embedder, entry);
        Ok(())
    }

    fn unregister_embedder_drop_site(
        &mut self,
        cx: &mut ProtocolCx,
        embedder: Window,
    ) -> Result<(), Error> {
        let atoms = *cx.atoms();
        if !cx.registry.has_embedders() {
            cx.conn.delete_property(cx.proxy_window, atoms.XdndAware)?;
            cx.conn.delete_property(cx.proxy_window, atoms.XdndProxy)?;
        }
        match cx.registry.remove_entry(ProtocolKind::Xdnd, embedder) {
            Some(entry) if entry.overridden => {
                cx.conn
                    .change_property(
                        embedder,
                        atoms.XdndAware,
                        AtomEnum::ATOM.into(),
                        32,
                        &u32_bytes(&[entry.version]),
                    )
                    .map_err(|e| e.property_write("XdndAware"))?;
                if entry.proxy != x11rb::NONE {
                    cx.conn
                        .change_property(
                            embedder,
                            atoms.XdndProxy,
                            AtomEnum::WINDOW.into(),
                            32,
                            &u32_bytes(&[entry.proxy]),
                        )
                        .map_err(|e| e.property_write("XdndProxy"))
                } else {
                    cx.conn.delete_property(embedder, atoms.XdndProxy)
                }
            }
            _ => {
                cx.conn.delete_property(embedder, atoms.XdndAware)?;
                cx.conn.delete_property(embedder, atoms.XdndProxy)
            }
        }
    }

    fn register_embedded_drop_site(
        &mut self,
        cx: &mut ProtocolCx,
        embedded: Window,
    ) -> Result<(), Error> {
        let entry = read_aware(cx, embedded)?;
        cx.registry.set_entry(ProtocolKind::Xdnd, embedded, entry);
        Ok(())
    }

    fn is_protocol_supported(&self, cx: &ProtocolCx, window: Window) -> Result<bool, Error> {
        let atom_type = u32::from(AtomEnum::ATOM);
        Ok(cx
            .conn
            .get_property(window, cx.atoms().XdndAware, atom_type, 1)?
            .and_then(|reply| property_u32(&reply, atom_type))
            .is_some())
    }

    fn message_type(&self, atoms: &DndAtoms, message: &ClientMessageEvent) -> MessageType {
        if message.format != 32 {
            return MessageType::Unknown;
        }
        let type_ = message.type_;
        if type_ == atoms.XdndEnter {
            MessageType::Enter
        } else if type_ == atoms.XdndPosition {
            MessageType::Motion
        } else if type_ == atoms.XdndLeave {
            MessageType::Leave
        } else if type_ == atoms.XdndDrop {
            MessageType::Drop
        } else {
            MessageType::Unknown
        }
    }

    fn process_client_message(
        &mut self,
        cx: &mut ProtocolCx,
        message: &ClientMessageEvent,
    ) -> Result<bool, Error> {
        match self.message_type(cx.atoms(), message) {
            MessageType::Enter => self.process_enter(cx, message),
            MessageType::Motion => self.process_position(cx, message),
            MessageType::Leave => self.process_leave(cx, message),
            MessageType::Drop => self.process_drop(cx, message),
            MessageType::Unknown => Ok(false),
        }
    }

    fn send_response(
        &mut self,
        cx: &mut ProtocolCx,
        context: &DropContext,
        event: DropEventKind,
        action: DropActions,
    ) -> Result<bool, Error> {
        let message = &context.message;
        if message.type_ != cx.atoms().XdndPosition || event == DropEventKind::Drop {
            return Ok(false);
        }
        let source = message.data.as_data32()[0];
        let action = if event == DropEventKind::Exit {
            DropActions::empty()
        } else {
            action
        };
        let accept = if action.is_empty() {
            0
        } else {
            XDND_ACCEPT_DROP_FLAG
        };
        // The rectangle in words 2 and 3 is always empty.
        let data = [
            message.window,
            accept,
            0,
            0,
            action_to_atom(cx.atoms(), action),
        ];
        let status = ClientMessageEvent::new(32, source, cx.atoms().XdndStatus, data);
        cx.conn.send_client_message(source, &status)?;
        Ok(true)
    }

    fn selection_request(
        &self,
        atoms: &DndAtoms,
        context: &DropContext,
    ) -> Result<SelectionRequest, crate::Error> {
        let message = &context.message;
        let data = message.data.as_data32();
        let time = if message.type_ == atoms.XdndPosition {
            data[3]
        } else if message.type_ == atoms.XdndDrop {
            data[2]
        } else {
            return Err(crate::Error::InvalidContext(
                "XDnD data is only available during position and drop",
            ));
        };
        Ok(SelectionRequest {
            selection: atoms.XdndSelection,
            time,
        })
    }

    fn send_drop_done(
        &mut self,
        cx: &mut ProtocolCx,
        context: &DropContext,
        success: bool,
        action: DropActions,
    ) -> Result<bool, Error> {
        let message = &context.message;
        let atoms = *cx.atoms();
        if message.type_ != atoms.XdndDrop {
            return Ok(false);
        }
        let data = message.data.as_data32();
        let source = data[0];
        let time = data[2];

        if success && action == DropActions::MOVE {
            cx.conn.convert_selection(
                cx.proxy_window,
                atoms.XdndSelection,
                atoms.DELETE,
                atoms._DRUID_DND_SELECTION,
                time,
            )?;
        }

        let mut finished = [message.window, 0, 0, 0, 0];
        if self.source_protocol_version >= 5 && success {
            finished[1] = XDND_ACCEPTED_FLAG;
            finished[2] = action_to_atom(&atoms, action);
        }
        let finished = ClientMessageEvent::new(32, source, atoms.XdndFinished, finished);
        cx.conn.send_client_message(source, &finished)?;
        cx.conn.flush()?;

        self.target_window = None;
        self.cleanup(cx);
        Ok(true)
    }

    fn cleanup(&mut self, cx: &mut ProtocolCx) {
        if self.source_window != x11rb::NONE {
            log_x11!(cx
                .conn
                .select_input(self.source_window, self.source_window_mask));
        }
        if let Some(target) = self.target_window.take() {
            log_x11!(self.notify(cx, target, DropEventKind::Exit, DropActions::empty(), None));
        }
        *self = XdndProtocol::default();
    }

    fn source_window(&self) -> Window {
        self.source_window
    }

    fn session_token(&self) -> Option<DragDropToken> {
        self.token
    }

    fn is_drag_over_component(&self) -> bool {
        self.target_window.is_some()
    }

    fn send_enter_to_toplevel(
        &mut self,
        cx: &mut ProtocolCx,
        toplevel: Window,
        _message: &ClientMessageEvent,
    ) -> Result<(), Error> {
        let entry = match cx.registry.entry(ProtocolKind::Xdnd, toplevel) {
            Some(entry) if entry.overridden => entry,
            _ => return Ok(()),
        };
        let version = entry.version.min(self.source_protocol_version);
        let enter = self.enter_message(cx, toplevel, self.source_window, version);
        cx.forward_to_toplevel(ProtocolKind::Xdnd, toplevel, &enter)
    }

    fn send_leave_to_toplevel(
        &mut self,
        cx: &mut ProtocolCx,
        toplevel: Window,
        message: &ClientMessageEvent,
    ) -> Result<(), Error> {
        let source = message.data.as_data32()[0];
        let leave = self.leave_message(cx, toplevel, source);
        cx.forward_to_toplevel(ProtocolKind::Xdnd, toplevel, &leave)
    }

    fn forward_event_to_embedded(
        &mut self,
        cx: &mut ProtocolCx,
        embedded: Window,
        context: Option<&DropContext>,
        event: DropEventKind,
    ) -> Result<bool, Error> {
        let entry = match cx.registry.entry(ProtocolKind::Xdnd, embedded) {
            Some(entry) if entry.overridden => entry,
            _ => return Ok(false),
        };
        let target = EmbeddedTarget {
            client: embedded,
            destination: if entry.proxy != x11rb::NONE {
                entry.proxy
            } else {
                embedded
            },
        };
        let atoms = *cx.atoms();

        match event {
            DropEventKind::Enter | DropEventKind::Motion => {
                let message = match context {
                    Some(context) => context.message,
                    None => return Ok(true),
                };
                if self.embedded != Some(target) {
                    let version = entry.version.min(self.source_protocol_version);
                    let enter = self.enter_message(cx, target.client, cx.proxy_window, version);
                    if self.source_formats.len() > 3 {
                        // The client cannot read the list from the source window through us.
                        cx.conn
                            .change_property(
                                cx.proxy_window,
                                atoms.XdndTypeList,
                                AtomEnum::ATOM.into(),
                                32,
                                &u32_bytes(&self.source_formats),
                            )
                            .map_err(|e| e.property_write("XdndTypeList"))?;
                    }
                    cx.conn.send_client_message(target.destination, &enter)?;
                    self.embedded = Some(target);
                    *cx.proxy_mode = Some(ProxyMode {
                        source: self.source_window,
                        window: message.window,
                    });
                }
                let mut position = message;
                position.window = target.client;
                let mut data = position.data.as_data32();
                data[0] = cx.proxy_window;
                position.data = data.into();
                cx.conn.send_client_message(target.destination, &position)?;
            }
            DropEventKind::Exit => {
                if self.embedded.take().is_some() {
                    let leave = self.leave_message(cx, target.client, cx.proxy_window);
                    cx.conn.send_client_message(target.destination, &leave)?;
                    *cx.proxy_mode = None;
                }
            }
            DropEventKind::Drop => {
                let message = match context {
                    Some(context) => context.message,
                    None => return Ok(true),
                };
                // The client answers with XdndFinished, which ends proxy mode when relayed.
                if self.embedded.take().is_some() {
                    let mut drop = message;
                    drop.window = target.client;
                    let mut data = drop.data.as_data32();
                    data[0] = cx.proxy_window;
                    drop.data = data.into();
                    cx.conn.send_client_message(target.destination, &drop)?;
                }
            }
        }
        Ok(true)
    }
}
