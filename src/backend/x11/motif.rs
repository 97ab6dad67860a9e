// Copyright 2023 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! The drop target side of the Motif drag and drop protocol.
//!
//! Motif messages are format 8 client messages on `_MOTIF_DRAG_AND_DROP_MESSAGE`. The first
//! byte packs the reason with the sender, the second declares the byte order of all
//! multi-byte fields. The layouts we read:
//!
//! ```text
//! TOP_LEVEL_ENTER    reason | order | flags(2) | time(4) | src_window(4) | property(4)
//! TOP_LEVEL_LEAVE    reason | order | flags(2) | time(4) | src_window(4)
//! DRAG_MOTION        reason | order | flags(2) | time(4) | x(2) | y(2)
//! OPERATION_CHANGED  reason | order | flags(2) | time(4)
//! DROP_START         reason | order | flags(2) | time(4) | x(2) | y(2) | property(4) | src_window(4)
//! ```
//!
//! Motif sources announce neither their actions nor their formats inline. Actions are
//! collected from the motion messages; formats live in a table on the Motif drag window,
//! indexed by the initiator info the source puts on its own window.

use kurbo::Point;
use tracing::debug;
use x11rb::protocol::xproto::{Atom, AtomEnum, ClientMessageEvent, EventMask, Window};

use super::error::Error;
use super::protocol::{
    DropContext, DropTargetProtocol, ProtocolCx, ProtocolKind, SelectionRequest,
};
use super::registry::EmbedderEntry;
use super::transport::DndAtoms;
use super::wire::{ByteOrder, ByteView, ByteViewMut};
use crate::dnd::{
    DragDropToken, DropActions, DropEventKind, DropNotification, MessageType,
};

const MOTIF_DND_PROTOCOL_VERSION: u8 = 0;

const MOTIF_DYNAMIC_STYLE: u8 = 5;

const INITIATOR_INFO_SIZE: usize = 8;
const RECEIVER_INFO_SIZE: usize = 16;

const MESSAGE_REASON_MASK: u8 = 0x7F;
const MESSAGE_SENDER_MASK: u8 = 0x80;
const MESSAGE_FROM_RECEIVER: u8 = 0x80;

const ACTION_MASK: u16 = 0x000F;
const ACTION_SHIFT: u16 = 0;
const STATUS_MASK: u16 = 0x00F0;
const STATUS_SHIFT: u16 = 4;
const ACTIONS_MASK: u16 = 0x0F00;
const ACTIONS_SHIFT: u16 = 8;

const TOP_LEVEL_ENTER: u8 = 0;
const TOP_LEVEL_LEAVE: u8 = 1;
const DRAG_MOTION: u8 = 2;
const DROP_SITE_ENTER: u8 = 3;
const DROP_SITE_LEAVE: u8 = 4;
const DROP_START: u8 = 5;
const OPERATION_CHANGED: u8 = 8;

const INVALID_DROP_SITE: u16 = 2;
const VALID_DROP_SITE: u16 = 3;

const MOTIF_NOOP: u16 = 0;
const MOTIF_MOVE: u16 = 1;
const MOTIF_COPY: u16 = 2;
const MOTIF_LINK: u16 = 4;

fn motif_to_actions(motif: u16) -> DropActions {
    let mut actions = DropActions::empty();
    if motif & MOTIF_MOVE != 0 {
        actions |= DropActions::MOVE;
    }
    if motif & MOTIF_COPY != 0 {
        actions |= DropActions::COPY;
    }
    if motif & MOTIF_LINK != 0 {
        actions |= DropActions::LINK;
    }
    actions
}

fn actions_to_motif(actions: DropActions) -> u16 {
    let mut motif = MOTIF_NOOP;
    if actions.contains(DropActions::MOVE) {
        motif |= MOTIF_MOVE;
    }
    if actions.contains(DropActions::COPY) {
        motif |= MOTIF_COPY;
    }
    if actions.contains(DropActions::LINK) {
        motif |= MOTIF_LINK;
    }
    motif
}

/// Decoded view of a Motif client message.
#[derive(Clone, Copy, Debug)]
struct MotifMessage {
    data: [u8; 20],
    order: ByteOrder,
}

impl MotifMessage {
    fn parse(atoms: &DndAtoms, message: &ClientMessageEvent) -> Option<MotifMessage> {
        if message.type_ != atoms._MOTIF_DRAG_AND_DROP_MESSAGE || message.format != 8 {
            return None;
        }
        let data = message.data.as_data8();
        let order = ByteOrder::from_byte(data[1])?;
        Some(MotifMessage { data, order })
    }

    fn view(&self) -> ByteView<'_> {
        ByteView::new(&self.data, self.order)
    }

    fn reason(&self) -> u8 {
        self.data[0] & MESSAGE_REASON_MASK
    }

    fn from_receiver(&self) -> bool {
        self.data[0] & MESSAGE_SENDER_MASK == MESSAGE_FROM_RECEIVER
    }

    fn flags(&self) -> u16 {
        self.view().u16(2).unwrap_or(0)
    }

    fn time(&self) -> u32 {
        self.view().u32(4).unwrap_or(0)
    }

    fn position(&self) -> (i32, i32) {
        let view = self.view();
        (
            view.i16(8).map(i32::from).unwrap_or(0),
            view.i16(10).map(i32::from).unwrap_or(0),
        )
    }

    fn u32_at(&self, offset: usize) -> u32 {
        self.view().u32(offset).unwrap_or(0)
    }

    /// The user's action and the source's actions from the flags.
    fn actions(&self) -> (DropActions, DropActions) {
        let flags = self.flags();
        (
            motif_to_actions((flags & ACTION_MASK) >> ACTION_SHIFT),
            motif_to_actions((flags & ACTIONS_MASK) >> ACTIONS_SHIFT),
        )
    }
}

/// A receiver info structure that advertises no drop sites of its own.
fn receiver_info(proxy: Window) -> [u8; RECEIVER_INFO_SIZE] {
    let mut info = [0; RECEIVER_INFO_SIZE];
    let mut writer = ByteViewMut::native(&mut info);
    writer.set_u8(1, MOTIF_DND_PROTOCOL_VERSION);
    writer.set_u8(2, MOTIF_DYNAMIC_STYLE);
    writer.set_u32(4, proxy);
    writer.set_u16(8, 0);
    writer.set_u32(12, RECEIVER_INFO_SIZE as u32);
    info
}

/// The receiver info bytes of `window`, if it has a well-formed structure.
fn read_receiver_info(cx: &ProtocolCx, window: Window) -> Result<Option<Vec<u8>>, Error> {
    let info_atom = cx.atoms()._MOTIF_DRAG_RECEIVER_INFO;
    let reply = match cx.conn.get_property(window, info_atom, info_atom, u32::MAX)? {
        Some(reply) => reply,
        None => return Ok(None),
    };
    let valid = reply.type_ != x11rb::NONE
        && reply.format == 8
        && reply.value.len() >= RECEIVER_INFO_SIZE
        && ByteView::declared(&reply.value).is_some();
    Ok(if valid { Some(reply.value) } else { None })
}

/// Look up entry `index` of the target list table on the Motif drag window.
fn read_target_list(cx: &ProtocolCx, index: u16) -> Result<Vec<Atom>, Error> {
    let atoms = cx.atoms();
    let window_type = u32::from(AtomEnum::WINDOW);
    let drag_window = cx
        .conn
        .get_property(cx.conn.root(), atoms._MOTIF_DRAG_WINDOW, window_type, 1)?
        .and_then(|reply| super::util::property_u32(&reply, window_type));
    let drag_window = match drag_window {
        Some(window) if window != x11rb::NONE => window,
        _ => {
            debug!("no Motif drag window");
            return Ok(Vec::new());
        }
    };

    let targets = atoms._MOTIF_DRAG_TARGETS;
    let table = match cx
        .conn
        .get_property(drag_window, targets, targets, u32::MAX)?
    {
        Some(reply) if reply.type_ == targets && reply.format == 8 => reply.value,
        _ => return Ok(Vec::new()),
    };
    Ok(parse_target_list(&table, index).unwrap_or_default())
}

/// `byte_order(1) | version(1) | num_lists(2) | size(4)`, then `count(2) | atoms(4 * count)`
/// for each list.
fn parse_target_list(table: &[u8], index: u16) -> Option<Vec<Atom>> {
    let view = ByteView::declared(table)?;
    if view.u8(1)? != MOTIF_DND_PROTOCOL_VERSION {
        return None;
    }
    let num_lists = view.u16(2)?;
    if index >= num_lists {
        return None;
    }
    let mut offset = 8;
    for list in 0..num_lists {
        let count = usize::from(view.u16(offset)?);
        offset += 2;
        if list == index {
            return (0..count).map(|i| view.u32(offset + 4 * i)).collect();
        }
        offset += 4 * count;
    }
    None
}

#[derive(Debug, Default)]
pub(crate) struct MotifProtocol {
    source_window: Window,
    source_window_mask: u32,
    /// The selection named by the enter message.
    source_atom: Atom,
    source_actions: DropActions,
    source_formats: Vec<Atom>,
    target_window: Option<Window>,
    position: Point,
    user_action: DropActions,
    token: Option<DragDropToken>,
    /// A leave arrived; its exit is delivered with the next message unless that is a drop.
    top_level_leave_postponed: bool,
}

impl MotifProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(
        &self,
        cx: &mut ProtocolCx,
        window: Window,
        kind: DropEventKind,
        action: DropActions,
        context: Option<DropContext>,
    ) {
        cx.notify(DropNotification {
            window,
            kind,
            position: self.position,
            action,
            source_actions: self.source_actions,
            formats: self.source_formats.clone(),
            context,
        });
    }

    fn context(&self, message: ClientMessageEvent) -> Option<DropContext> {
        self.token.map(|token| DropContext {
            kind: ProtocolKind::Motif,
            token,
            message,
        })
    }

    fn process_top_level_enter(
        &mut self,
        cx: &mut ProtocolCx,
        message: &ClientMessageEvent,
        motif: &MotifMessage,
    ) -> Result<bool, Error> {
        if self.target_window.is_some() || self.source_window != x11rb::NONE {
            debug!("Motif enter while a drag is in progress");
            return Ok(false);
        }
        if !cx.is_local_target(message.window)
            && cx.registry.entry(ProtocolKind::Motif, message.window).is_none()
        {
            return Ok(false);
        }

        let source_window = motif.u32_at(8);
        let property = motif.u32_at(12);

        let initiator_type = cx.atoms()._MOTIF_DRAG_INITIATOR_INFO;
        let info = cx
            .conn
            .get_property(source_window, property, initiator_type, 2)?
            .filter(|reply| {
                reply.type_ == initiator_type
                    && reply.format == 8
                    && reply.value.len() == INITIATOR_INFO_SIZE
                    && reply.bytes_after == 0
            });
        let formats = match info.as_ref().and_then(|reply| ByteView::declared(&reply.value)) {
            Some(view) => {
                if view.u8(1) != Some(MOTIF_DND_PROTOCOL_VERSION) {
                    debug!("unsupported Motif protocol version {:?}", view.u8(1));
                    return Ok(false);
                }
                let index = view.u16(2).unwrap_or(0);
                read_target_list(cx, index)?
            }
            None => Vec::new(),
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
        self.source_atom = property;
        self.source_actions = DropActions::empty();
        self.source_formats = formats;
        self.token = Some(DragDropToken::next());
        Ok(true)
    }

    fn process_drag_motion(
        &mut self,
        cx: &mut ProtocolCx,
        message: &ClientMessageEvent,
        motif: &MotifMessage,
    ) -> Result<bool, Error> {
        if self.source_window == x11rb::NONE {
            return Ok(false);
        }
        let (action, actions) = motif.actions();

        // Motion messages do not name the source; put it where responses look for it.
        let mut data = motif.data;
        ByteViewMut::new(&mut data, motif.order).set_u32(12, self.source_window);
        let mut stamped = *message;
        stamped.data = data.into();
        let context = self.context(stamped);

        let target = if motif.reason() == OPERATION_CHANGED {
            self.target_window.map(|window| (window, self.position))
        } else {
            let (x, y) = motif.position();
            cx.resolve_target(message.window, x, y)?
        };

        self.source_actions |= actions;
        match (self.target_window, target) {
            (Some(old), None) => {
                self.notify(cx, old, DropEventKind::Exit, DropActions::empty(), context);
            }
            (old, Some((window, position))) => {
                self.position = position;
                let kind = match old {
                    Some(old) if old == window => DropEventKind::Motion,
                    Some(old) => {
                        self.notify(cx, old, DropEventKind::Exit, DropActions::empty(), context);
                        DropEventKind::Enter
                    }
                    None => DropEventKind::Enter,
                };
                self.notify(cx, window, kind, action, context);
            }
            (None, None) => {}
        }

        self.user_action = action;
        self.target_window = target.map(|(window, _)| window);
        Ok(true)
    }

    fn process_top_level_leave(
        &mut self,
        cx: &mut ProtocolCx,
        message: &ClientMessageEvent,
        motif: &MotifMessage,
    ) -> Result<bool, Error> {
        let source_window = motif.u32_at(8);
        if self.source_window == x11rb::NONE || source_window != self.source_window {
            return Ok(false);
        }

        // A drop may follow on another window. Wake ourselves up so that the exit is
        // delivered if it does not.
        self.top_level_leave_postponed = true;
        let dummy = ClientMessageEvent::new(32, message.window, x11rb::NONE, [0u32; 5]);
        let destination = if cx.registry.entry(ProtocolKind::Motif, message.window).is_some() {
            cx.proxy_window
        } else {
            message.window
        };
        cx.conn.send_client_message(destination, &dummy)?;
        Ok(true)
    }

    fn process_drop_start(
        &mut self,
        cx: &mut ProtocolCx,
        message: &ClientMessageEvent,
        motif: &MotifMessage,
    ) -> Result<bool, Error> {
        let source_window = motif.u32_at(16);
        if self.source_window == x11rb::NONE || source_window != self.source_window {
            return Ok(false);
        }
        let (action, actions) = motif.actions();
        self.source_actions |= actions;
        let (x, y) = motif.position();
        let context = self.context(*message);

        match cx.resolve_target(message.window, x, y)? {
            Some((window, position)) => {
                self.position = position;
                self.target_window = Some(window);
                self.notify(cx, window, DropEventKind::Drop, action, context);
            }
            None => {
                if let Some(old) = self.target_window.take() {
                    self.notify(cx, old, DropEventKind::Exit, DropActions::empty(), context);
                }
            }
        }
        self.user_action = action;
        Ok(true)
    }
}

impl DropTargetProtocol for MotifProtocol {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Motif
    }

    fn register_drop_target(&mut self, cx: &mut ProtocolCx, window: Window) -> Result<(), Error> {
        let info_atom = cx.atoms()._MOTIF_DRAG_RECEIVER_INFO;
        cx.conn
            .change_property(window, info_atom, info_atom, 8, &receiver_info(x11rb::NONE))
            .map_err(|e| e.property_write("Motif receiver info"))
    }

    fn unregister_drop_target(
        &mut self,
        cx: &mut ProtocolCx,
        window: Window,
    ) -> Result<(), Error> {
        cx.conn
            .delete_property(window, cx.atoms()._MOTIF_DRAG_RECEIVER_INFO)
    }

    fn register_embedder_drop_site(
        &mut self,
        cx: &mut ProtocolCx,
        embedder: Window,
    ) -> Result<(), Error> {
        let info_atom = cx.atoms()._MOTIF_DRAG_RECEIVER_INFO;
        let mut entry = EmbedderEntry {
            overridden: false,
            version: 0,
            proxy: x11rb::NONE,
        };

        let info = match read_receiver_info(cx, embedder)? {
            Some(mut info) => {
                let view = ByteView::declared(&info);
                entry.overridden = true;
                entry.version = view.and_then(|v| v.u8(1)).map(u32::from).unwrap_or(0);
                entry.proxy = view.and_then(|v| v.u32(4)).unwrap_or(x11rb::NONE);
                if entry.proxy == cx.proxy_window {
                    // Already routed through us.
                    return Ok(());
                }
                if let Some(mut writer) = ByteViewMut::declared(&mut info) {
                    writer.set_u32(4, cx.proxy_window);
                }
                info
            }
            None => receiver_info(cx.proxy_window).to_vec(),
        };

        cx.conn
            .change_property(embedder, info_atom, info_atom, 8, &info)
            .map_err(|e| e.property_write("Motif receiver info"))?;
        cx.registry.set_entry(ProtocolKind::Motif, embedder, entry);
        Ok(())
    }

    fn unregister_embedder_drop_site(
        &mut self,
        cx: &mut ProtocolCx,
        embedder: Window,
    ) -> Result<(), Error> {
        let info_atom = cx.atoms()._MOTIF_DRAG_RECEIVER_INFO;
        match cx.registry.remove_entry(ProtocolKind::Motif, embedder) {
            Some(entry) if entry.overridden => {
                if let Some(mut info) = read_receiver_info(cx, embedder)? {
                    if let Some(mut writer) = ByteViewMut::declared(&mut info) {
                        writer.set_u32(4, entry.proxy);
                    }
                    cx.conn
                        .change_property(embedder, info_atom, info_atom, 8, &info)
                        .map_err(|e| e.property_write("Motif receiver info"))?;
                }
                Ok(())
            }
            Some(_) => cx.conn.delete_property(embedder, info_atom),
            None => Ok(()),
        }
    }

    fn register_embedded_drop_site(
        &mut self,
        cx: &mut ProtocolCx,
        embedded: Window,
    ) -> Result<(), Error> {
        let entry = match read_receiver_info(cx, embedded)? {
            Some(info) => {
                let view = ByteView::declared(&info);
                EmbedderEntry {
                    overridden: true,
                    version: view.and_then(|v| v.u8(1)).map(u32::from).unwrap_or(0),
                    proxy: view.and_then(|v| v.u32(4)).unwrap_or(x11rb::NONE),
                }
            }
            None => EmbedderEntry {
                overridden: false,
                version: 0,
                proxy: x11rb::NONE,
            },
        };
        cx.registry.set_entry(ProtocolKind::Motif, embedded, entry);
        Ok(())
    }

    fn is_protocol_supported(&self, cx: &ProtocolCx, window: Window) -> Result<bool, Error> {
        Ok(read_receiver_info(cx, window)?.is_some())
    }

    fn message_type(&self, atoms: &DndAtoms, message: &ClientMessageEvent) -> MessageType {
        if message.type_ != atoms._MOTIF_DRAG_AND_DROP_MESSAGE || message.format != 8 {
            return MessageType::Unknown;
        }
        match message.data.as_data8()[0] & MESSAGE_REASON_MASK {
            TOP_LEVEL_ENTER => MessageType::Enter,
            DRAG_MOTION | OPERATION_CHANGED => MessageType::Motion,
            TOP_LEVEL_LEAVE => MessageType::Leave,
            DROP_START => MessageType::Drop,
            _ => MessageType::Unknown,
        }
    }

    fn process_client_message(
        &mut self,
        cx: &mut ProtocolCx,
        message: &ClientMessageEvent,
    ) -> Result<bool, Error> {
        let motif = MotifMessage::parse(cx.atoms(), message);
        let reason = motif.as_ref().map(MotifMessage::reason);

        if self.top_level_leave_postponed {
            self.top_level_leave_postponed = false;
            if reason != Some(DROP_START) {
                self.cleanup(cx);
            }
        }

        let motif = match motif {
            Some(motif) => motif,
            None => return Ok(false),
        };
        if motif.from_receiver() {
            return Ok(false);
        }

        match motif.reason() {
            TOP_LEVEL_ENTER => self.process_top_level_enter(cx, message, &motif),
            DRAG_MOTION | OPERATION_CHANGED => self.process_drag_motion(cx, message, &motif),
            TOP_LEVEL_LEAVE => self.process_top_level_leave(cx, message, &motif),
            DROP_START => self.process_drop_start(cx, message, &motif),
            _ => Ok(false),
        }
    }

    fn send_response(
        &mut self,
        cx: &mut ProtocolCx,
        context: &DropContext,
        event: DropEventKind,
        action: DropActions,
    ) -> Result<bool, Error> {
        let motif = match MotifMessage::parse(cx.atoms(), &context.message) {
            Some(motif) if !motif.from_receiver() => motif,
            _ => return Ok(false),
        };
        let reason = motif.reason();
        let reply_reason = match reason {
            DRAG_MOTION => match event {
                DropEventKind::Enter => DROP_SITE_ENTER,
                DropEventKind::Exit => DROP_SITE_LEAVE,
                DropEventKind::Motion | DropEventKind::Drop => DRAG_MOTION,
            },
            OPERATION_CHANGED | DROP_START => reason,
            _ => return Ok(false),
        };
        let destination = if reason == DROP_START {
            motif.u32_at(16)
        } else {
            motif.u32_at(12)
        };

        // The source's actions are echoed back either way.
        let flags = motif.flags() & !ACTION_MASK & !STATUS_MASK;
        let flags = if action.is_empty() || event == DropEventKind::Exit {
            flags | (MOTIF_NOOP << ACTION_SHIFT) | (INVALID_DROP_SITE << STATUS_SHIFT)
        } else {
            flags | (actions_to_motif(action) << ACTION_SHIFT) | (VALID_DROP_SITE << STATUS_SHIFT)
        };

        let order = ByteOrder::native();
        let mut data = [0u8; 20];
        let mut writer = ByteViewMut::new(&mut data, order);
        writer.set_u8(0, reply_reason | MESSAGE_FROM_RECEIVER);
        writer.set_u8(1, order.to_byte());
        writer.set_u16(2, flags);
        writer.set_u32(4, motif.time());
        if event != DropEventKind::Exit {
            let (x, y) = motif.position();
            writer.set_u16(8, x as u16);
            writer.set_u16(10, y as u16);
        }

        let reply = ClientMessageEvent::new(
            8,
            destination,
            cx.atoms()._MOTIF_DRAG_AND_DROP_MESSAGE,
            data,
        );
        cx.conn.send_client_message(destination, &reply)?;
        Ok(true)
    }

    fn selection_request(
        &self,
        atoms: &DndAtoms,
        context: &DropContext,
    ) -> Result<SelectionRequest, crate::Error> {
        let motif = MotifMessage::parse(atoms, &context.message)
            .ok_or(crate::Error::InvalidContext("not a Motif drag message"))?;
        let selection = match motif.reason() {
            DRAG_MOTION | OPERATION_CHANGED if self.source_atom != x11rb::NONE => self.source_atom,
            DROP_START => motif.u32_at(12),
            _ => {
                return Err(crate::Error::InvalidContext(
                    "Motif data is only available during motion and drop",
                ))
            }
        };
        Ok(SelectionRequest {
            selection,
            time: motif.time(),
        })
    }

    fn send_drop_done(
        &mut self,
        cx: &mut ProtocolCx,
        context: &DropContext,
        success: bool,
        action: DropActions,
    ) -> Result<bool, Error> {
        let motif = match MotifMessage::parse(cx.atoms(), &context.message) {
            Some(motif) if !motif.from_receiver() && motif.reason() == DROP_START => motif,
            _ => return Ok(false),
        };
        let atoms = *cx.atoms();
        let selection = motif.u32_at(12);
        let time = motif.time();

        if success && action == DropActions::MOVE {
            cx.conn.convert_selection(
                cx.proxy_window,
                selection,
                atoms.DELETE,
                atoms._MOTIF_ATOM_0,
                time,
            )?;
        }
        let status = if success {
            atoms.XmTRANSFER_SUCCESS
        } else {
            atoms.XmTRANSFER_FAILURE
        };
        cx.conn
            .convert_selection(cx.proxy_window, selection, status, atoms._MOTIF_ATOM_0, time)?;
        cx.conn.flush()?;

        // The drop is over; no exit for the site.
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
            self.notify(cx, target, DropEventKind::Exit, DropActions::empty(), None);
        }
        *self = MotifProtocol::default();
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
        _cx: &mut ProtocolCx,
        _toplevel: Window,
        _message: &ClientMessageEvent,
    ) -> Result<(), Error> {
        unreachable!("Motif enter messages are never synthesized for embedders")
    }

    fn send_leave_to_toplevel(
        &mut self,
        _cx: &mut ProtocolCx,
        _toplevel: Window,
        _message: &ClientMessageEvent,
    ) -> Result<(), Error> {
        unreachable!("Motif leave messages are forwarded verbatim")
    }
}
