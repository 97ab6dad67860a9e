// Copyright 2023 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! A scripted, in-memory X server for unit tests.
//!
//! Windows live in one flat coordinate space: the origin of a window is its position on the
//! root window. The server can also play the owner of a selection, answering conversions
//! directly, incrementally, or not at all.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use kurbo::Rect;
use x11rb::protocol::xproto::{
    Atom, ClientMessageEvent, EventMask, GetPropertyReply, Property, PropertyNotifyEvent,
    SelectionNotifyEvent, Timestamp, Window, PROPERTY_NOTIFY_EVENT, SELECTION_NOTIFY_EVENT,
};
use x11rb::protocol::{ErrorKind, Event};
use x11rb::x11_utils::X11Error;

use super::error::Error;
use super::protocol::{
    post_process_client_message, DropContext, DropTargetProtocol, ProtocolCx, ProtocolKind,
    ProxyMode,
};
use super::registry::{EmbedderEntry, EmbeddingRegistry};
use super::screen::Monitor;
use super::transport::{DndAtoms, Transport, WindowState, ANY_PROPERTY_TYPE};
use crate::dnd::{DropActions, DropEventKind, DropNotification};

pub(crate) const ROOT: Window = 0x1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FakeProperty {
    pub type_: Atom,
    pub format: u8,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Conversion {
    pub requestor: Window,
    pub selection: Atom,
    pub target: Atom,
    pub property: Atom,
    pub time: Timestamp,
}

/// How the owner of a selection answers conversions.
#[derive(Clone, Debug)]
pub(crate) enum Owner {
    /// Write the data in one go.
    Direct(Vec<u8>),
    /// Announce INCR and hand out `chunk_size` bytes per chunk.
    Incremental {
        data: Vec<u8>,
        chunk_size: usize,
        format: u8,
    },
    /// Answer with property `None`.
    Decline,
    /// Never answer.
    Silent,
    /// Announce INCR and never send a chunk.
    Stall(Vec<u8>),
}

#[derive(Debug)]
struct FakeWindow {
    origin: (i32, i32),
    size: (u16, u16),
    mapped: bool,
    event_mask: u32,
}

#[derive(Debug)]
struct Incr {
    requestor: Window,
    property: Atom,
    type_: Atom,
    format: u8,
    /// `None` once the terminating empty chunk was written.
    chunks: Option<VecDeque<Vec<u8>>>,
    stalled: bool,
}

#[derive(Debug, Default)]
struct ServerState {
    windows: HashMap<Window, FakeWindow>,
    properties: HashMap<(Window, Atom), FakeProperty>,
    sent: Vec<(Window, ClientMessageEvent)>,
    conversions: Vec<Conversion>,
    failing: HashSet<Atom>,
    owners: HashMap<Atom, Owner>,
    incr: Option<Incr>,
    interned: HashMap<String, Atom>,
    monitors: Vec<Monitor>,
    proxy_window: Window,
    next_id: u32,
}

#[derive(Debug)]
pub(crate) struct FakeServer {
    atoms: DndAtoms,
    state: Mutex<ServerState>,
    events: Mutex<VecDeque<Event>>,
}

fn access_error(property: Atom) -> Error {
    X11Error {
        error_kind: ErrorKind::Access,
        error_code: 10,
        sequence: 0,
        bad_value: property,
        minor_opcode: 0,
        major_opcode: 18,
        extension_name: None,
        request_name: Some("ChangeProperty"),
    }
    .into()
}

fn window_error(window: Window) -> Error {
    X11Error {
        error_kind: ErrorKind::Window,
        error_code: 3,
        sequence: 0,
        bad_value: window,
        minor_opcode: 0,
        major_opcode: 18,
        extension_name: None,
        request_name: Some("ChangeProperty"),
    }
    .into()
}

impl FakeServer {
    pub fn new() -> FakeServer {
        let server = FakeServer {
            atoms: FakeServer::atoms(),
            state: Mutex::new(ServerState {
                next_id: 0x10_0000,
                ..ServerState::default()
            }),
            events: Mutex::new(VecDeque::new()),
        };
        server.add_window_at(ROOT, (0, 0), (u16::MAX, u16::MAX));
        server
    }

    /// The atoms every fake server uses.
    pub fn atoms() -> DndAtoms {
        DndAtoms {
            XdndAware: 0x101,
            XdndProxy: 0x102,
            XdndEnter: 0x103,
            XdndPosition: 0x104,
            XdndStatus: 0x105,
            XdndLeave: 0x106,
            XdndDrop: 0x107,
            XdndFinished: 0x108,
            XdndActionCopy: 0x109,
            XdndActionMove: 0x10a,
            XdndActionLink: 0x10b,
            XdndActionList: 0x10c,
            XdndTypeList: 0x10d,
            XdndSelection: 0x10e,
            _MOTIF_DRAG_WINDOW: 0x201,
            _MOTIF_DRAG_TARGETS: 0x202,
            _MOTIF_DRAG_INITIATOR_INFO: 0x203,
            _MOTIF_DRAG_RECEIVER_INFO: 0x204,
            _MOTIF_DRAG_AND_DROP_MESSAGE: 0x205,
            _MOTIF_ATOM_0: 0x206,
            XmTRANSFER_SUCCESS: 0x207,
            XmTRANSFER_FAILURE: 0x208,
            DELETE: 0x301,
            INCR: 0x302,
            _DRUID_DND_SELECTION: 0x303,
            _DRUID_DND_WAKEUP: 0x304,
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    fn push_event(&self, event: Event) {
        self.events.lock().unwrap().push_back(event);
    }

    pub fn next_event(&self) -> Option<Event> {
        self.events.lock().unwrap().pop_front()
    }

    pub fn selection_notify(
        requestor: Window,
        selection: Atom,
        target: Atom,
        property: Atom,
    ) -> Event {
        Event::SelectionNotify(SelectionNotifyEvent {
            response_type: SELECTION_NOTIFY_EVENT,
            sequence: 0,
            time: 0,
            requestor,
            selection,
            target,
            property,
        })
    }

    pub fn root_window(&self) -> Window {
        ROOT
    }

    /// The window `create_proxy_window` made last.
    pub fn proxy_window(&self) -> Window {
        self.state().proxy_window
    }

    pub fn add_window(&self, window: Window) {
        self.add_window_at(window, (0, 0), (100, 100));
    }

    pub fn add_window_at(&self, window: Window, origin: (i32, i32), size: (u16, u16)) {
        self.state().windows.insert(
            window,
            FakeWindow {
                origin,
                size,
                mapped: true,
                event_mask: 0,
            },
        );
    }

    pub fn remove_window(&self, window: Window) {
        let mut state = self.state();
        state.windows.remove(&window);
        state.properties.retain(|(w, _), _| *w != window);
    }

    pub fn set_property(&self, window: Window, property: Atom, type_: Atom, format: u8, data: &[u8]) {
        self.write_property(
            window,
            property,
            FakeProperty {
                type_,
                format,
                data: data.to_vec(),
            },
        );
    }

    pub fn set_property32(&self, window: Window, property: Atom, type_: Atom, items: &[u32]) {
        let data: Vec<u8> = items.iter().flat_map(|i| i.to_ne_bytes()).collect();
        self.set_property(window, property, type_, 32, &data);
    }

    pub fn property(&self, window: Window, property: Atom) -> Option<FakeProperty> {
        self.state().properties.get(&(window, property)).cloned()
    }

    pub fn property32(&self, window: Window, property: Atom) -> Option<Vec<u32>> {
        let property = self.property(window, property)?;
        if property.format != 32 {
            return None;
        }
        Some(
            property
                .data
                .chunks_exact(4)
                .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    /// The event mask selected on `window`; 0 for unknown windows.
    pub fn event_mask(&self, window: Window) -> u32 {
        self.state()
            .windows
            .get(&window)
            .map(|w| w.event_mask)
            .unwrap_or(0)
    }

    pub fn sent(&self) -> Vec<(Window, ClientMessageEvent)> {
        self.state().sent.clone()
    }

    pub fn last_sent(&self) -> Option<(Window, ClientMessageEvent)> {
        self.state().sent.last().copied()
    }

    pub fn conversions(&self) -> Vec<Conversion> {
        self.state().conversions.clone()
    }

    /// Make writes of `property` fail with BadAccess.
    pub fn fail_writes(&self, property: Atom) {
        self.state().failing.insert(property);
    }

    pub fn set_owner(&self, selection: Atom, owner: Owner) {
        self.state().owners.insert(selection, owner);
    }

    pub fn set_monitors(&self, monitors: Vec<Monitor>) {
        self.state().monitors = monitors;
    }

    /// Store a property and report the change if the window asked for it.
    fn write_property(&self, window: Window, property: Atom, value: FakeProperty) {
        let notify = {
            let mut state = self.state();
            state.properties.insert((window, property), value);
            wants_property_changes(&state, window)
        };
        if notify {
            self.push_event(property_notify(window, property, Property::NEW_VALUE));
        }
    }

    /// Write the next chunk of an INCR transfer after the requestor deleted the last one.
    fn continue_incr(&self, window: Window, property: Atom) {
        let next = {
            let mut state = self.state();
            let incr = match state.incr.as_mut() {
                Some(incr) if (incr.requestor, incr.property) == (window, property) => incr,
                _ => return,
            };
            if incr.stalled {
                return;
            }
            match incr.chunks.as_mut().map(VecDeque::pop_front) {
                Some(chunk) => {
                    if chunk.is_none() {
                        incr.chunks = None;
                    }
                    Some((incr.type_, incr.format, chunk.unwrap_or_default()))
                }
                None => {
                    state.incr = None;
                    None
                }
            }
        };
        if let Some((type_, format, data)) = next {
            self.write_property(
                window,
                property,
                FakeProperty {
                    type_,
                    format,
                    data,
                },
            );
        }
    }

    fn start_incr(&self, conversion: Conversion, data: Vec<u8>, chunk_size: usize, format: u8, stalled: bool) {
        let length = data.len() as u32;
        let chunks: VecDeque<Vec<u8>> = data.chunks(chunk_size.max(1)).map(<[u8]>::to_vec).collect();
        self.state().incr = Some(Incr {
            requestor: conversion.requestor,
            property: conversion.property,
            type_: conversion.target,
            format,
            chunks: Some(chunks),
            stalled,
        });
        let incr = self.atoms.INCR;
        self.set_property32(conversion.requestor, conversion.property, incr, &[length]);
    }
}

fn wants_property_changes(state: &ServerState, window: Window) -> bool {
    let mask = u32::from(EventMask::PROPERTY_CHANGE);
    state
        .windows
        .get(&window)
        .map(|w| w.event_mask & mask == mask)
        .unwrap_or(false)
}

fn property_notify(window: Window, atom: Atom, state: Property) -> Event {
    Event::PropertyNotify(PropertyNotifyEvent {
        response_type: PROPERTY_NOTIFY_EVENT,
        sequence: 0,
        window,
        atom,
        time: 0,
        state,
    })
}

impl Transport for FakeServer {
    fn atoms(&self) -> &DndAtoms {
        &self.atoms
    }

    fn root(&self) -> Window {
        ROOT
    }

    fn intern_atom(&self, name: &str) -> Result<Atom, Error> {
        let mut state = self.state();
        let next = 0x8000 + state.interned.len() as Atom;
        Ok(*state.interned.entry(name.to_string()).or_insert(next))
    }

    fn create_proxy_window(&self) -> Result<Window, Error> {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        state.proxy_window = id;
        state.windows.insert(
            id,
            FakeWindow {
                origin: (-10, -10),
                size: (1, 1),
                mapped: false,
                event_mask: u32::from(EventMask::PROPERTY_CHANGE | EventMask::STRUCTURE_NOTIFY),
            },
        );
        Ok(id)
    }

    fn get_property(
        &self,
        window: Window,
        property: Atom,
        type_: Atom,
        long_length: u32,
    ) -> Result<Option<GetPropertyReply>, Error> {
        let state = self.state();
        if !state.windows.contains_key(&window) {
            return Ok(None);
        }
        let mut reply = GetPropertyReply::default();
        let value = match state.properties.get(&(window, property)) {
            Some(value) => value,
            None => return Ok(Some(reply)),
        };
        reply.type_ = value.type_;
        reply.format = value.format;
        let unit = usize::from(value.format / 8).max(1);
        if type_ != ANY_PROPERTY_TYPE && type_ != value.type_ {
            reply.bytes_after = value.data.len() as u32;
            return Ok(Some(reply));
        }
        let max = (long_length as usize).saturating_mul(4);
        let len = value.data.len().min(max);
        reply.value = value.data[..len].to_vec();
        reply.value_len = (len / unit) as u32;
        reply.bytes_after = (value.data.len() - len) as u32;
        Ok(Some(reply))
    }

    fn change_property(
        &self,
        window: Window,
        property: Atom,
        type_: Atom,
        format: u8,
        data: &[u8],
    ) -> Result<(), Error> {
        {
            let state = self.state();
            if state.failing.contains(&property) {
                return Err(access_error(property));
            }
            if !state.windows.contains_key(&window) {
                return Err(window_error(window));
            }
        }
        self.set_property(window, property, type_, format, data);
        Ok(())
    }

    fn delete_property(&self, window: Window, property: Atom) -> Result<(), Error> {
        let notify = {
            let mut state = self.state();
            state.properties.remove(&(window, property)).is_some()
                && wants_property_changes(&state, window)
        };
        if notify {
            self.push_event(property_notify(window, property, Property::DELETE));
        }
        self.continue_incr(window, property);
        Ok(())
    }

    fn send_client_message(
        &self,
        destination: Window,
        message: &ClientMessageEvent,
    ) -> Result<(), Error> {
        self.state().sent.push((destination, *message));
        Ok(())
    }

    fn window_event_mask(&self, window: Window) -> Result<Option<u32>, Error> {
        Ok(self.state().windows.get(&window).map(|w| w.event_mask))
    }

    fn select_input(&self, window: Window, event_mask: u32) -> Result<(), Error> {
        if let Some(w) = self.state().windows.get_mut(&window) {
            w.event_mask = event_mask;
        }
        Ok(())
    }

    fn window_state(&self, window: Window) -> Result<Option<WindowState>, Error> {
        Ok(self.state().windows.get(&window).map(|w| WindowState {
            mapped: w.mapped,
            width: w.size.0,
            height: w.size.1,
        }))
    }

    fn translate_coordinates(
        &self,
        src: Window,
        dst: Window,
        x: i32,
        y: i32,
    ) -> Result<Option<(i32, i32)>, Error> {
        let state = self.state();
        match (state.windows.get(&src), state.windows.get(&dst)) {
            (Some(src), Some(dst)) => Ok(Some((
                x + src.origin.0 - dst.origin.0,
                y + src.origin.1 - dst.origin.1,
            ))),
            _ => Ok(None),
        }
    }

    fn convert_selection(
        &self,
        requestor: Window,
        selection: Atom,
        target: Atom,
        property: Atom,
        time: Timestamp,
    ) -> Result<(), Error> {
        let conversion = Conversion {
            requestor,
            selection,
            target,
            property,
            time,
        };
        let owner = {
            let mut state = self.state();
            state.conversions.push(conversion);
            state.owners.get(&selection).cloned()
        };
        let answer = match owner {
            None | Some(Owner::Decline) => x11rb::NONE,
            Some(Owner::Silent) => return Ok(()),
            Some(Owner::Direct(data)) => {
                self.set_property(requestor, property, target, 8, &data);
                property
            }
            Some(Owner::Incremental {
                data,
                chunk_size,
                format,
            }) => {
                self.start_incr(conversion, data, chunk_size, format, false);
                property
            }
            Some(Owner::Stall(data)) => {
                self.start_incr(conversion, data, 1, 8, true);
                property
            }
        };
        self.push_event(FakeServer::selection_notify(
            requestor, selection, target, answer,
        ));
        Ok(())
    }

    fn monitors(&self) -> Vec<Monitor> {
        self.state().monitors.clone()
    }

    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Feeds the events of a [`FakeServer`] to a sink on a background thread, like an event loop.
pub(crate) struct EventPump {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventPump {
    pub fn spawn(server: Arc<FakeServer>, mut sink: impl FnMut(&Event) + Send + 'static) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    match server.next_event() {
                        Some(event) => sink(&event),
                        None => std::thread::sleep(Duration::from_millis(1)),
                    }
                }
            })
        };
        EventPump {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Drives one protocol against a [`FakeServer`] with the state a shell would give it.
pub(crate) struct Harness<P> {
    pub server: Arc<FakeServer>,
    pub protocol: P,
    proxy_window: Window,
    targets: HashSet<Window>,
    registry: EmbeddingRegistry,
    monitors: Vec<Monitor>,
    proxy_mode: Option<ProxyMode>,
    outbox: Vec<DropNotification>,
}

impl<P: DropTargetProtocol> Harness<P> {
    pub fn new(protocol: P) -> Self {
        let server = Arc::new(FakeServer::new());
        let proxy_window = server.create_proxy_window().unwrap();
        Harness {
            server,
            protocol,
            proxy_window,
            targets: HashSet::new(),
            registry: EmbeddingRegistry::default(),
            monitors: Vec::new(),
            proxy_mode: None,
            outbox: Vec::new(),
        }
    }

    fn with_cx<R>(&mut self, f: impl FnOnce(&mut P, &mut ProtocolCx) -> R) -> R {
        let Harness {
            server,
            protocol,
            proxy_window,
            targets,
            registry,
            monitors,
            proxy_mode,
            outbox,
        } = self;
        let mut cx = ProtocolCx {
            conn: &**server,
            proxy_window: *proxy_window,
            targets: &*targets,
            registry,
            monitors: monitors.as_slice(),
            proxy_mode,
            outbox,
        };
        f(protocol, &mut cx)
    }

    pub fn proxy_window(&self) -> Window {
        self.proxy_window
    }

    pub fn proxy_mode(&self) -> Option<ProxyMode> {
        self.proxy_mode
    }

    pub fn add_target(&mut self, window: Window) {
        self.targets.insert(window);
    }

    pub fn embed(&mut self, embedder: Window, site: Window) {
        self.registry.add_site(embedder, site);
    }

    pub fn unembed(&mut self, embedder: Window, site: Window) {
        self.registry.remove_site(embedder, site);
    }

    pub fn set_xembed_client(&mut self, canvas: Window, client: Window) {
        self.registry.set_xembed_client(canvas, client);
    }

    /// One monitor covering everything, at `scale`.
    pub fn set_monitor_scale(&mut self, scale: f64) {
        self.monitors = vec![Monitor::new(
            true,
            Rect::new(0.0, 0.0, f64::from(u16::MAX), f64::from(u16::MAX)),
            scale,
        )];
    }

    pub fn registry_entry(&self, kind: ProtocolKind, window: Window) -> Option<EmbedderEntry> {
        self.registry.entry(kind, window)
    }

    pub fn take_notifications(&mut self) -> Vec<DropNotification> {
        std::mem::take(&mut self.outbox)
    }

    pub fn process(&mut self, message: &ClientMessageEvent) -> Result<bool, Error> {
        self.with_cx(|p, cx| p.process_client_message(cx, message))
    }

    /// Process a message and pass it on to the previous owner of an embedder, as the shell
    /// does.
    pub fn dispatch(&mut self, message: &ClientMessageEvent) -> Result<bool, Error> {
        self.with_cx(|p, cx| {
            let processed = p.process_client_message(cx, message)?;
            post_process_client_message(p, cx, message, processed)?;
            Ok(processed)
        })
    }

    pub fn respond(
        &mut self,
        context: &DropContext,
        event: DropEventKind,
        action: DropActions,
    ) -> Result<bool, Error> {
        self.with_cx(|p, cx| p.send_response(cx, context, event, action))
    }

    pub fn drop_done(
        &mut self,
        context: &DropContext,
        success: bool,
        action: DropActions,
    ) -> Result<bool, Error> {
        self.with_cx(|p, cx| p.send_drop_done(cx, context, success, action))
    }

    pub fn cleanup(&mut self) {
        self.with_cx(|p, cx| p.cleanup(cx))
    }

    pub fn register_drop_target(&mut self, window: Window) -> Result<(), Error> {
        self.with_cx(|p, cx| p.register_drop_target(cx, window))
    }

    pub fn unregister_drop_target(&mut self, window: Window) -> Result<(), Error> {
        self.with_cx(|p, cx| p.unregister_drop_target(cx, window))
    }

    pub fn register_embedder(&mut self, window: Window) -> Result<(), Error> {
        self.with_cx(|p, cx| p.register_embedder_drop_site(cx, window))
    }

    pub fn unregister_embedder(&mut self, window: Window) -> Result<(), Error> {
        self.with_cx(|p, cx| p.unregister_embedder_drop_site(cx, window))
    }

    pub fn register_embedded(&mut self, window: Window) -> Result<(), Error> {
        self.with_cx(|p, cx| p.register_embedded_drop_site(cx, window))
    }

    pub fn is_supported(&mut self, window: Window) -> Result<bool, Error> {
        self.with_cx(|p, cx| p.is_protocol_supported(cx, window))
    }
}
