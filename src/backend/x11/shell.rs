// Copyright 2023 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! The drop target coordinator: registration, event dispatch and the operations a listener
//! uses to answer a drag.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};
use x11rb::protocol::xproto::{Atom, ClientMessageEvent, Window};
use x11rb::protocol::Event;

use super::error::Error;
use super::motif::MotifProtocol;
use super::protocol::{
    post_process_client_message, DropContext, DropTargetProtocol, ProtocolCx, ProtocolKind,
    ProxyMode,
};
use super::registry::EmbeddingRegistry;
use super::screen::Monitor;
use super::selection::SelectionTransfer;
use super::transport::Transport;
use super::xdnd::XdndProtocol;
use crate::config::DndConfig;
use crate::dnd::{DropActions, DropEventKind, DropNotification, DropTargetListener, MessageType};

/// Everything the global lock protects.
struct ShellState {
    proxy_window: Window,
    protocols: Vec<Box<dyn DropTargetProtocol>>,
    /// Index into `protocols` of the protocol with an active session.
    active: Option<usize>,
    targets: HashSet<Window>,
    registry: EmbeddingRegistry,
    monitors: Vec<Monitor>,
    proxy_mode: Option<ProxyMode>,
}

impl ShellState {
    /// Split the state into the protocols and the context they operate on.
    fn split<'a>(
        &'a mut self,
        conn: &'a dyn Transport,
        outbox: &'a mut Vec<DropNotification>,
    ) -> (
        &'a mut Vec<Box<dyn DropTargetProtocol>>,
        &'a mut Option<usize>,
        ProtocolCx<'a>,
    ) {
        let ShellState {
            proxy_window,
            protocols,
            active,
            targets,
            registry,
            monitors,
            proxy_mode,
        } = self;
        let cx = ProtocolCx {
            conn,
            proxy_window: *proxy_window,
            targets,
            registry,
            monitors,
            proxy_mode,
            outbox,
        };
        (protocols, active, cx)
    }
}

struct ShellInner {
    conn: Arc<dyn Transport>,
    config: DndConfig,
    state: Mutex<ShellState>,
    listener: Mutex<Box<dyn DropTargetListener>>,
    transfer: SelectionTransfer,
}

/// The drop target side of Motif and XDnD for one X connection.
///
/// All protocol state sits behind a single lock. The event thread feeds X events to
/// [`handle_event`]; notifications reach the listener after the lock has been released, so
/// the listener and any other thread may call [`send_response`], [`get_data`] and
/// [`send_drop_done`].
///
/// [`handle_event`]: DropTargetShell::handle_event
/// [`send_response`]: DropTargetShell::send_response
/// [`get_data`]: DropTargetShell::get_data
/// [`send_drop_done`]: DropTargetShell::send_drop_done
#[derive(Clone)]
pub struct DropTargetShell {
    inner: Arc<ShellInner>,
}

impl DropTargetShell {
    pub fn new(
        conn: Arc<dyn Transport>,
        config: DndConfig,
        listener: impl DropTargetListener + 'static,
    ) -> Result<Self, crate::Error> {
        let proxy_window = conn.create_proxy_window()?;
        let mut protocols: Vec<Box<dyn DropTargetProtocol>> = Vec::new();
        if config.xdnd {
            protocols.push(Box::new(XdndProtocol::new()));
        }
        if config.motif {
            protocols.push(Box::new(MotifProtocol::new()));
        }
        if protocols.is_empty() {
            warn!("all drag and drop protocols are disabled");
        }
        let monitors = conn.monitors();
        let state = ShellState {
            proxy_window,
            protocols,
            active: None,
            targets: HashSet::new(),
            registry: EmbeddingRegistry::default(),
            monitors,
            proxy_mode: None,
        };
        Ok(DropTargetShell {
            inner: Arc::new(ShellInner {
                conn,
                config,
                state: Mutex::new(state),
                listener: Mutex::new(Box::new(listener)),
                transfer: SelectionTransfer::new(),
            }),
        })
    }

    /// The window drags over embedder windows are routed through.
    pub fn proxy_window(&self) -> Result<Window, crate::Error> {
        Ok(lock!(self.inner.state)?.proxy_window)
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.conn
    }

    /// Run `f` on every protocol, under the lock, and deliver what it reports afterwards.
    fn for_each_protocol(
        &self,
        mut f: impl FnMut(&mut dyn DropTargetProtocol, &mut ProtocolCx) -> Result<(), Error>,
    ) -> Result<(), crate::Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = lock!(self.inner.state)?;
            let (protocols, _, mut cx) = state.split(&*self.inner.conn, &mut outbox);
            protocols
                .iter_mut()
                .try_for_each(|protocol| f(&mut **protocol, &mut cx))
        };
        self.deliver(outbox);
        Ok(result?)
    }

    /// Like [`for_each_protocol`], but when `f` fails, `undo` runs on the protocols it
    /// already succeeded on.
    ///
    /// [`for_each_protocol`]: DropTargetShell::for_each_protocol
    fn for_each_protocol_or_undo(
        &self,
        mut f: impl FnMut(&mut dyn DropTargetProtocol, &mut ProtocolCx) -> Result<(), Error>,
        mut undo: impl FnMut(&mut dyn DropTargetProtocol, &mut ProtocolCx) -> Result<(), Error>,
    ) -> Result<(), crate::Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = lock!(self.inner.state)?;
            let (protocols, _, mut cx) = state.split(&*self.inner.conn, &mut outbox);
            let mut result = Ok(());
            for done in 0..protocols.len() {
                if let Err(e) = f(&mut *protocols[done], &mut cx) {
                    for protocol in protocols[..done].iter_mut().rev() {
                        log_x11!(undo(&mut **protocol, &mut cx));
                    }
                    result = Err(e);
                    break;
                }
            }
            result
        };
        self.deliver(outbox);
        Ok(result?)
    }

    /// Advertise `window` as a drop site with every protocol.
    pub fn register_drop_site(&self, window: Window) -> Result<(), crate::Error> {
        self.for_each_protocol_or_undo(
            |protocol, cx| protocol.register_drop_target(cx, window),
            |protocol, cx| protocol.unregister_drop_target(cx, window),
        )?;
        lock!(self.inner.state)?.targets.insert(window);
        debug!("registered drop site {:#x}", window);
        Ok(())
    }

    pub fn unregister_drop_site(&self, window: Window) -> Result<(), crate::Error> {
        lock!(self.inner.state)?.targets.remove(&window);
        self.for_each_protocol(|protocol, cx| protocol.unregister_drop_target(cx, window))
    }

    /// Make `site`, which lives inside the foreign window `embedder`, receive drags.
    ///
    /// The first site of an embedder takes over the embedder's protocol properties.
    pub fn register_embedded_drop_site(
        &self,
        embedder: Window,
        site: Window,
    ) -> Result<(), crate::Error> {
        let first = lock!(self.inner.state)?.registry.add_site(embedder, site);
        if !first {
            return Ok(());
        }
        let result = self.for_each_protocol_or_undo(
            |protocol, cx| protocol.register_embedder_drop_site(cx, embedder),
            |protocol, cx| protocol.unregister_embedder_drop_site(cx, embedder),
        );
        if result.is_err() {
            lock!(self.inner.state)?.registry.remove_site(embedder, site);
        }
        result
    }

    /// Undo [`register_embedded_drop_site`]. The last site restores the embedder.
    ///
    /// [`register_embedded_drop_site`]: DropTargetShell::register_embedded_drop_site
    pub fn unregister_embedded_drop_site(
        &self,
        embedder: Window,
        site: Window,
    ) -> Result<(), crate::Error> {
        let last = lock!(self.inner.state)?.registry.remove_site(embedder, site);
        if !last {
            return Ok(());
        }
        self.for_each_protocol(|protocol, cx| protocol.unregister_embedder_drop_site(cx, embedder))
    }

    /// Forward drags over the drop site `canvas` to the XEmbed client it hosts.
    ///
    /// Returns whether the client talks XDnD; if not, drags over the canvas are reported to
    /// the listener as usual.
    pub fn register_xembed_client(
        &self,
        canvas: Window,
        client: Window,
    ) -> Result<bool, crate::Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = lock!(self.inner.state)?;
            let (protocols, _, mut cx) = state.split(&*self.inner.conn, &mut outbox);
            let mut result = Ok(());
            for protocol in protocols.iter_mut() {
                result = protocol.register_embedded_drop_site(&mut cx, client);
                if result.is_err() {
                    break;
                }
            }
            result.map(|()| {
                let supported = cx
                    .registry
                    .entry(ProtocolKind::Xdnd, client)
                    .map(|entry| entry.overridden && entry.version >= 3)
                    .unwrap_or(false);
                if supported {
                    cx.registry.set_xembed_client(canvas, client);
                }
                supported
            })
        };
        self.deliver(outbox);
        Ok(result?)
    }

    pub fn unregister_xembed_client(&self, canvas: Window) -> Result<(), crate::Error> {
        let mut state = lock!(self.inner.state)?;
        if let Some(client) = state.registry.remove_xembed_client(canvas) {
            state.registry.remove_entry(ProtocolKind::Xdnd, client);
            state.registry.remove_entry(ProtocolKind::Motif, client);
        }
        Ok(())
    }

    /// Re-read what an embedded window advertises after it changed its properties.
    pub fn update_embedder_drop_site(&self, window: Window) -> Result<(), crate::Error> {
        {
            let state = lock!(self.inner.state)?;
            let known = state.registry.entry(ProtocolKind::Xdnd, window).is_some()
                || state.registry.entry(ProtocolKind::Motif, window).is_some();
            // Embedders carry our own properties now; their entries hold the previous owner.
            if !known || state.registry.is_embedder(window) {
                return Ok(());
            }
        }
        debug!("drop site metadata of {:#x} changed", window);
        self.for_each_protocol(|protocol, cx| protocol.register_embedded_drop_site(cx, window))
    }

    /// The protocols `window` advertises itself as a drop site for.
    pub fn supported_protocols(&self, window: Window) -> Result<Vec<ProtocolKind>, crate::Error> {
        let mut outbox = Vec::new();
        let mut state = lock!(self.inner.state)?;
        let (protocols, _, cx) = state.split(&*self.inner.conn, &mut outbox);
        let mut supported = Vec::new();
        for protocol in protocols.iter() {
            if protocol.is_protocol_supported(&cx, window)? {
                supported.push(protocol.kind());
            }
        }
        Ok(supported)
    }

    /// Classify a client message by the enabled protocols.
    pub fn message_type(&self, message: &ClientMessageEvent) -> Result<MessageType, crate::Error> {
        let state = lock!(self.inner.state)?;
        let atoms = self.inner.conn.atoms();
        Ok(state
            .protocols
            .iter()
            .map(|protocol| protocol.message_type(atoms, message))
            .find(|kind| *kind != MessageType::Unknown)
            .unwrap_or(MessageType::Unknown))
    }

    /// Re-read the monitor layout used to scale drag positions.
    pub fn refresh_monitors(&self) -> Result<(), crate::Error> {
        let monitors = self.inner.conn.monitors();
        lock!(self.inner.state)?.monitors = monitors;
        Ok(())
    }

    /// Handle an X event. Returns whether the event was meant for drag and drop.
    ///
    /// Call this on the event thread for every event; it never fails, errors are logged.
    pub fn handle_event(&self, event: &Event) -> bool {
        match self.handle_event_inner(event) {
            Ok(handled) => handled,
            Err(e) => {
                error!("Error handling drag and drop event: {}", e);
                false
            }
        }
    }

    fn handle_event_inner(&self, event: &Event) -> Result<bool, crate::Error> {
        match event {
            Event::SelectionNotify(_) => Ok(self.inner.transfer.handle_event(event)),
            Event::PropertyNotify(notify) => {
                if self.inner.transfer.handle_event(event) {
                    return Ok(true);
                }
                let atoms = self.inner.conn.atoms();
                if notify.atom == atoms.XdndAware || notify.atom == atoms._MOTIF_DRAG_RECEIVER_INFO
                {
                    self.update_embedder_drop_site(notify.window)?;
                }
                Ok(false)
            }
            Event::DestroyNotify(destroy) => self.source_destroyed(destroy.window),
            Event::ClientMessage(message) => self.client_message(message),
            _ => Ok(false),
        }
    }

    /// End the session whose source went away without saying goodbye.
    fn source_destroyed(&self, window: Window) -> Result<bool, crate::Error> {
        let mut outbox = Vec::new();
        let handled = {
            let mut state = lock!(self.inner.state)?;
            if state.proxy_mode.map(|mode| mode.source) == Some(window) {
                state.proxy_mode = None;
            }
            let (protocols, active, mut cx) = state.split(&*self.inner.conn, &mut outbox);
            match *active {
                Some(index) if protocols[index].source_window() == window => {
                    debug!("drag source {:#x} was destroyed", window);
                    protocols[index].cleanup(&mut cx);
                    *active = None;
                    true
                }
                _ => false,
            }
        };
        self.deliver(outbox);
        Ok(handled)
    }

    fn client_message(&self, message: &ClientMessageEvent) -> Result<bool, crate::Error> {
        let conn = &*self.inner.conn;
        let mut outbox = Vec::new();
        let result = {
            let mut state = lock!(self.inner.state)?;
            let (protocols, active, mut cx) = state.split(conn, &mut outbox);
            let result = match relay_to_source(protocols, active, &mut cx, message) {
                Ok(true) => Ok(true),
                Ok(false) => dispatch(protocols, active, &mut cx, message),
                Err(e) => Err(e),
            };
            log_x11!(conn.flush());
            result
        };
        self.deliver(outbox);
        Ok(result?)
    }

    /// Tell the source of `context` whether `action` is acceptable at the current position.
    ///
    /// Returns false if the context cannot be answered, for example because its session is
    /// over.
    pub fn send_response(
        &self,
        context: &DropContext,
        event: DropEventKind,
        action: DropActions,
    ) -> Result<bool, crate::Error> {
        let conn = &*self.inner.conn;
        let mut outbox = Vec::new();
        let result = {
            let mut state = lock!(self.inner.state)?;
            let (protocols, _, mut cx) = state.split(conn, &mut outbox);
            match session_protocol(protocols, context) {
                Some(protocol) => {
                    let sent = protocol.send_response(&mut cx, context, event, action);
                    log_x11!(conn.flush());
                    sent
                }
                None => {
                    debug!("response for a finished drag session");
                    Ok(false)
                }
            }
        };
        self.deliver(outbox);
        Ok(result?)
    }

    /// Fetch the data of the drag in `context` in `format`.
    ///
    /// Blocks until the source answered or the configured timeout passed. Must not be
    /// called on the event thread, which has to deliver the answer.
    pub fn get_data(&self, context: &DropContext, format: Atom) -> Result<Vec<u8>, crate::Error> {
        let (request, proxy_window) = {
            let state = lock!(self.inner.state)?;
            let protocol = state
                .protocols
                .iter()
                .find(|p| {
                    p.kind() == context.kind && p.session_token() == Some(context.token)
                })
                .ok_or(crate::Error::InvalidContext("the drag session is over"))?;
            (
                protocol.selection_request(self.inner.conn.atoms(), context)?,
                state.proxy_window,
            )
        };
        let conn = &*self.inner.conn;
        self.inner.transfer.fetch(
            conn,
            proxy_window,
            conn.atoms()._DRUID_DND_SELECTION,
            request.selection,
            format,
            request.time,
            self.inner.config.selection_timeout,
        )
    }

    /// Fetch the data of the drag in `context` in the format named `format`.
    pub fn get_data_named(
        &self,
        context: &DropContext,
        format: &str,
    ) -> Result<Vec<u8>, crate::Error> {
        let atom = self.inner.conn.intern_atom(format)?;
        self.get_data(context, atom)
    }

    /// Tell the source the drop is complete, and end the session.
    pub fn send_drop_done(
        &self,
        context: &DropContext,
        success: bool,
        action: DropActions,
    ) -> Result<bool, crate::Error> {
        let conn = &*self.inner.conn;
        let mut outbox = Vec::new();
        let result = {
            let mut state = lock!(self.inner.state)?;
            let (protocols, active, mut cx) = state.split(conn, &mut outbox);
            let index = protocols.iter().position(|p| {
                p.kind() == context.kind && p.session_token() == Some(context.token)
            });
            match index {
                Some(index) => {
                    let done = protocols[index].send_drop_done(&mut cx, context, success, action);
                    if protocols[index].source_window() == x11rb::NONE && *active == Some(index) {
                        *active = None;
                    }
                    done
                }
                None => {
                    debug!("drop done for a finished drag session");
                    Ok(false)
                }
            }
        };
        self.deliver(outbox);
        Ok(result?)
    }

    /// Hand notifications to the listener. The state lock must not be held.
    fn deliver(&self, outbox: Vec<DropNotification>) {
        if outbox.is_empty() {
            return;
        }
        match self.inner.listener.lock() {
            Ok(mut listener) => {
                for notification in outbox {
                    listener.notify(notification);
                }
            }
            Err(_) => error!("drop target listener is poisoned"),
        }
    }
}

/// The protocol whose session `context` belongs to, if that session is still active.
fn session_protocol<'a>(
    protocols: &'a mut [Box<dyn DropTargetProtocol>],
    context: &DropContext,
) -> Option<&'a mut Box<dyn DropTargetProtocol>> {
    protocols
        .iter_mut()
        .find(|p| p.kind() == context.kind && p.session_token() == Some(context.token))
}

/// While an XEmbed client is the drop target, pass its status and finish messages on to the
/// real source.
fn relay_to_source(
    protocols: &mut [Box<dyn DropTargetProtocol>],
    active: &mut Option<usize>,
    cx: &mut ProtocolCx,
    message: &ClientMessageEvent,
) -> Result<bool, Error> {
    let mode = match *cx.proxy_mode {
        Some(mode) => mode,
        None => return Ok(false),
    };
    let atoms = *cx.atoms();
    let finished = message.type_ == atoms.XdndFinished;
    if message.window != cx.proxy_window
        || message.format != 32
        || !(finished || message.type_ == atoms.XdndStatus)
    {
        return Ok(false);
    }

    let mut relayed = *message;
    relayed.window = mode.source;
    let mut data = relayed.data.as_data32();
    data[0] = mode.window;
    relayed.data = data.into();
    cx.conn.send_client_message(mode.source, &relayed)?;

    if finished {
        *cx.proxy_mode = None;
        if let Some(index) = protocols.iter().position(|p| p.kind() == ProtocolKind::Xdnd) {
            protocols[index].cleanup(cx);
            if *active == Some(index) {
                *active = None;
            }
        }
    }
    Ok(true)
}

/// Run a client message through the protocols: the one with an active session first, then the
/// others until one takes it.
fn dispatch(
    protocols: &mut [Box<dyn DropTargetProtocol>],
    active: &mut Option<usize>,
    cx: &mut ProtocolCx,
    message: &ClientMessageEvent,
) -> Result<bool, Error> {
    let mut handled_by = None;
    if let Some(index) = *active {
        if protocols[index].process_client_message(cx, message)? {
            handled_by = Some(index);
        }
    }
    if handled_by.is_none() {
        for index in (0..protocols.len()).filter(|i| Some(*i) != *active) {
            if protocols[index].process_client_message(cx, message)? {
                handled_by = Some(index);
                break;
            }
        }
    }

    let atoms = *cx.atoms();
    if let Some(owner) = protocols
        .iter()
        .position(|p| p.message_type(&atoms, message) != MessageType::Unknown)
    {
        post_process_client_message(
            &mut *protocols[owner],
            cx,
            message,
            handled_by == Some(owner),
        )?;
    }

    match handled_by {
        Some(index) if protocols[index].source_window() != x11rb::NONE => *active = Some(index),
        _ => {
            if let Some(index) = *active {
                if protocols[index].source_window() == x11rb::NONE {
                    *active = None;
                }
            }
        }
    }
    Ok(handled_by.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::x11::testing::{EventPump, FakeServer, Owner};
    use crate::backend::x11::wire::{ByteOrder, ByteViewMut};
    use crate::backend::x11::xdnd::XDND_PROTOCOL_VERSION;
    use std::sync::mpsc;
    use std::time::Duration;
    use test_log::test;
    use x11rb::protocol::xproto::{AtomEnum, DestroyNotifyEvent, DESTROY_NOTIFY_EVENT};

    static_assertions::assert_impl_all!(DropTargetShell: Send, Sync);

    const SOURCE: Window = 0x500;
    const SITE: Window = 0x100;
    const TEXT: Atom = 0x7001;

    struct Setup {
        server: Arc<FakeServer>,
        shell: DropTargetShell,
        notifications: mpsc::Receiver<DropNotification>,
    }

    fn setup(config: DndConfig) -> Setup {
        let server = Arc::new(FakeServer::new());
        server.add_window(SOURCE);
        server.add_window_at(SITE, (10, 10), (200, 100));
        let (tx, notifications) = mpsc::channel();
        let tx = Mutex::new(tx);
        let shell = DropTargetShell::new(server.clone(), config, move |n: DropNotification| {
            tx.lock().unwrap().send(n).unwrap();
        })
        .unwrap();
        shell.register_drop_site(SITE).unwrap();
        Setup {
            server,
            shell,
            notifications,
        }
    }

    fn xdnd(type_: Atom, window: Window, data: [u32; 5]) -> Event {
        Event::ClientMessage(ClientMessageEvent::new(32, window, type_, data))
    }

    fn xdnd_drag(setup: &Setup) -> DropContext {
        let atoms = FakeServer::atoms();
        assert!(setup
            .shell
            .handle_event(&xdnd(atoms.XdndEnter, SITE, [SOURCE, 5 << 24, TEXT, 0, 0])));
        let position = [SOURCE, 0, (20 << 16) | 30, 9, atoms.XdndActionCopy];
        assert!(setup
            .shell
            .handle_event(&xdnd(atoms.XdndPosition, SITE, position)));
        let enter = setup.notifications.try_recv().unwrap();
        assert_eq!(enter.kind, DropEventKind::Enter);
        enter.context.unwrap()
    }

    #[test]
    fn registration_advertises_both_protocols() {
        let setup = setup(DndConfig::default());
        let atoms = FakeServer::atoms();
        assert_eq!(
            setup.server.property32(SITE, atoms.XdndAware),
            Some(vec![XDND_PROTOCOL_VERSION])
        );
        assert!(setup
            .server
            .property(SITE, atoms._MOTIF_DRAG_RECEIVER_INFO)
            .is_some());

        setup.shell.unregister_drop_site(SITE).unwrap();
        assert!(setup.server.property(SITE, atoms.XdndAware).is_none());
        assert!(setup
            .server
            .property(SITE, atoms._MOTIF_DRAG_RECEIVER_INFO)
            .is_none());
    }

    #[test]
    fn sites_report_both_protocols() {
        let setup = setup(DndConfig::default());
        assert_eq!(
            setup.shell.supported_protocols(SITE).unwrap(),
            vec![ProtocolKind::Xdnd, ProtocolKind::Motif]
        );
        assert!(setup.shell.supported_protocols(SOURCE).unwrap().is_empty());

        let atoms = FakeServer::atoms();
        let position = ClientMessageEvent::new(32, SITE, atoms.XdndPosition, [0u32; 5]);
        assert_eq!(
            setup.shell.message_type(&position).unwrap(),
            MessageType::Motion
        );
        let status = ClientMessageEvent::new(32, SITE, atoms.XdndStatus, [0u32; 5]);
        assert_eq!(
            setup.shell.message_type(&status).unwrap(),
            MessageType::Unknown
        );
    }

    #[test]
    fn disabled_protocols_are_not_advertised() {
        let setup = setup(DndConfig {
            motif: false,
            ..DndConfig::default()
        });
        let atoms = FakeServer::atoms();
        assert!(setup.server.property(SITE, atoms.XdndAware).is_some());
        assert!(setup
            .server
            .property(SITE, atoms._MOTIF_DRAG_RECEIVER_INFO)
            .is_none());
    }

    #[test]
    fn failed_registration_is_reported() {
        let server = Arc::new(FakeServer::new());
        server.add_window(SITE);
        server.fail_writes(FakeServer::atoms().XdndAware);
        let shell =
            DropTargetShell::new(server, DndConfig::default(), |_: DropNotification| {}).unwrap();
        assert!(matches!(
            shell.register_drop_site(SITE),
            Err(crate::Error::Platform(Error::PropertyWrite("XdndAware", _)))
        ));
    }

    #[test]
    fn failed_registration_leaves_nothing_behind() {
        let server = Arc::new(FakeServer::new());
        server.add_window(SITE);
        let atoms = FakeServer::atoms();
        server.fail_writes(atoms._MOTIF_DRAG_RECEIVER_INFO);
        let shell = DropTargetShell::new(server.clone(), DndConfig::default(), |_: DropNotification| {})
            .unwrap();
        assert!(matches!(
            shell.register_drop_site(SITE),
            Err(crate::Error::Platform(Error::PropertyWrite("Motif receiver info", _)))
        ));
        assert!(server.property(SITE, atoms.XdndAware).is_none());
        assert!(shell.supported_protocols(SITE).unwrap().is_empty());
    }

    #[test]
    fn listener_can_respond_from_the_callback() {
        let server = Arc::new(FakeServer::new());
        server.add_window(SOURCE);
        server.add_window_at(SITE, (10, 10), (200, 100));
        let shell_slot: Arc<Mutex<Option<DropTargetShell>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&shell_slot);
        let shell = DropTargetShell::new(server.clone(), DndConfig::default(), move |n: DropNotification| {
            let shell = slot.lock().unwrap().clone().unwrap();
            if let Some(context) = n.context {
                shell
                    .send_response(&context, n.kind, n.source_actions.preferred())
                    .unwrap();
            }
        })
        .unwrap();
        *shell_slot.lock().unwrap() = Some(shell.clone());
        shell.register_drop_site(SITE).unwrap();

        let atoms = FakeServer::atoms();
        shell.handle_event(&xdnd(atoms.XdndEnter, SITE, [SOURCE, 5 << 24, TEXT, 0, 0]));
        let position = [SOURCE, 0, (20 << 16) | 30, 9, atoms.XdndActionCopy];
        shell.handle_event(&xdnd(atoms.XdndPosition, SITE, position));

        let (destination, status) = server.last_sent().unwrap();
        assert_eq!(destination, SOURCE);
        assert_eq!(status.type_, atoms.XdndStatus);
        assert_eq!(status.data.as_data32()[1], 1);
    }

    #[test]
    fn destroyed_source_ends_the_session() {
        let setup = setup(DndConfig::default());
        xdnd_drag(&setup);
        let destroy = Event::DestroyNotify(DestroyNotifyEvent {
            response_type: DESTROY_NOTIFY_EVENT,
            sequence: 0,
            event: SOURCE,
            window: SOURCE,
        });
        assert!(setup.shell.handle_event(&destroy));
        let exit = setup.notifications.try_recv().unwrap();
        assert_eq!(exit.kind, DropEventKind::Exit);
        assert!(exit.context.is_none());
        assert!(!setup.shell.handle_event(&destroy));
    }

    #[test]
    fn stale_contexts_are_refused() {
        let setup = setup(DndConfig::default());
        let context = xdnd_drag(&setup);
        let atoms = FakeServer::atoms();
        assert!(setup
            .shell
            .handle_event(&xdnd(atoms.XdndLeave, SITE, [SOURCE, 0, 0, 0, 0])));
        assert!(!setup
            .shell
            .send_response(&context, DropEventKind::Motion, DropActions::COPY)
            .unwrap());
        assert!(!setup
            .shell
            .send_drop_done(&context, true, DropActions::COPY)
            .unwrap());
        assert!(matches!(
            setup.shell.get_data(&context, TEXT),
            Err(crate::Error::InvalidContext(_))
        ));
    }

    #[test]
    fn drop_data_is_fetched_while_the_event_thread_runs() {
        let setup = setup(DndConfig {
            selection_timeout: Duration::from_secs(2),
            ..DndConfig::default()
        });
        let atoms = FakeServer::atoms();
        setup.server.set_owner(
            atoms.XdndSelection,
            Owner::Incremental {
                data: b"dropped text".to_vec(),
                chunk_size: 5,
                format: 8,
            },
        );
        xdnd_drag(&setup);
        assert!(setup
            .shell
            .handle_event(&xdnd(atoms.XdndDrop, SITE, [SOURCE, 0, 11, 0, 0])));
        let dropped = setup.notifications.try_recv().unwrap();
        assert_eq!(dropped.kind, DropEventKind::Drop);
        let context = dropped.context.unwrap();

        let shell = setup.shell.clone();
        let _pump = EventPump::spawn(Arc::clone(&setup.server), move |event| {
            shell.handle_event(event);
        });
        assert_eq!(setup.shell.get_data(&context, TEXT).unwrap(), b"dropped text");
        let conversion = setup.server.conversions()[0];
        assert_eq!(conversion.selection, atoms.XdndSelection);
        assert_eq!(conversion.time, 11);

        assert!(setup
            .shell
            .send_drop_done(&context, true, DropActions::COPY)
            .unwrap());
        let (_, finished) = setup.server.last_sent().unwrap();
        assert_eq!(finished.type_, atoms.XdndFinished);
    }

    #[test]
    fn xembed_finish_is_relayed_to_the_source() {
        const CLIENT: Window = 0x800;
        let setup = setup(DndConfig::default());
        let atoms = FakeServer::atoms();
        setup.server.add_window(CLIENT);
        setup
            .server
            .set_property32(CLIENT, atoms.XdndAware, AtomEnum::ATOM.into(), &[5]);
        assert!(setup.shell.register_xembed_client(SITE, CLIENT).unwrap());

        assert!(setup
            .shell
            .handle_event(&xdnd(atoms.XdndEnter, SITE, [SOURCE, 5 << 24, TEXT, 0, 0])));
        let position = [SOURCE, 0, (20 << 16) | 30, 9, atoms.XdndActionCopy];
        assert!(setup
            .shell
            .handle_event(&xdnd(atoms.XdndPosition, SITE, position)));
        assert!(setup
            .shell
            .handle_event(&xdnd(atoms.XdndDrop, SITE, [SOURCE, 0, 11, 0, 0])));
        assert!(setup.notifications.try_recv().is_err());

        let proxy = setup.shell.proxy_window().unwrap();
        let status = [CLIENT, 1, 0, 0, atoms.XdndActionCopy];
        assert!(setup
            .shell
            .handle_event(&xdnd(atoms.XdndStatus, proxy, status)));
        let (destination, relayed) = setup.server.last_sent().unwrap();
        assert_eq!((destination, relayed.window), (SOURCE, SOURCE));
        assert_eq!(relayed.data.as_data32()[0], SITE);

        let finished = [CLIENT, 1, atoms.XdndActionCopy, 0, 0];
        assert!(setup
            .shell
            .handle_event(&xdnd(atoms.XdndFinished, proxy, finished)));
        let (destination, relayed) = setup.server.last_sent().unwrap();
        assert_eq!((destination, relayed.type_), (SOURCE, atoms.XdndFinished));
        // The session is over and proxy mode with it.
        assert!(!setup
            .shell
            .handle_event(&xdnd(atoms.XdndFinished, proxy, finished)));
        assert_eq!(setup.server.event_mask(SOURCE), 0);
    }

    #[test]
    fn embedded_site_changes_are_tracked() {
        const EMBEDDER: Window = 0x700;
        const CLIENT: Window = 0x800;
        let setup = setup(DndConfig::default());
        let atoms = FakeServer::atoms();
        setup.server.add_window_at(EMBEDDER, (0, 0), (1000, 1000));
        setup.server.add_window(CLIENT);
        setup
            .shell
            .register_embedded_drop_site(EMBEDDER, SITE)
            .unwrap();
        let proxy = setup.shell.proxy_window().unwrap();
        assert_eq!(
            setup.server.property32(EMBEDDER, atoms.XdndProxy),
            Some(vec![proxy])
        );
        assert_eq!(setup.server.property32(proxy, atoms.XdndAware), Some(vec![5]));

        // A client that starts talking XDnD later becomes a forwarding target.
        assert!(!setup.shell.register_xembed_client(SITE, CLIENT).unwrap());
        setup
            .server
            .set_property32(CLIENT, atoms.XdndAware, AtomEnum::ATOM.into(), &[4]);
        let changed = Event::PropertyNotify(x11rb::protocol::xproto::PropertyNotifyEvent {
            response_type: x11rb::protocol::xproto::PROPERTY_NOTIFY_EVENT,
            sequence: 0,
            window: CLIENT,
            atom: atoms.XdndAware,
            time: 0,
            state: x11rb::protocol::xproto::Property::NEW_VALUE,
        });
        assert!(!setup.shell.handle_event(&changed));
        assert!(setup.shell.register_xembed_client(SITE, CLIENT).unwrap());

        setup
            .shell
            .unregister_embedded_drop_site(EMBEDDER, SITE)
            .unwrap();
        assert!(setup.server.property(EMBEDDER, atoms.XdndProxy).is_none());
        assert!(setup.server.property(proxy, atoms.XdndAware).is_none());
    }

    fn motif(reason: u8, fill: impl FnOnce(&mut ByteViewMut)) -> Event {
        let mut data = [0u8; 20];
        let mut writer = ByteViewMut::new(&mut data, ByteOrder::Little);
        writer.set_u8(0, reason);
        writer.set_u8(1, ByteOrder::Little.to_byte());
        fill(&mut writer);
        Event::ClientMessage(ClientMessageEvent::new(
            8,
            SITE,
            FakeServer::atoms()._MOTIF_DRAG_AND_DROP_MESSAGE,
            data,
        ))
    }

    #[test]
    fn motif_leave_is_flushed_by_its_wake_up_message() {
        let setup = setup(DndConfig::default());
        assert!(setup.shell.handle_event(&motif(0, |w| w.set_u32(8, SOURCE))));
        assert!(setup.shell.handle_event(&motif(2, |w| {
            w.set_u16(2, 0x0202);
            w.set_u16(8, 20);
            w.set_u16(10, 30);
        })));
        assert_eq!(
            setup.notifications.try_recv().unwrap().kind,
            DropEventKind::Enter
        );
        assert!(setup.shell.handle_event(&motif(1, |w| w.set_u32(8, SOURCE))));
        assert!(setup.notifications.try_recv().is_err());

        let (destination, wake_up) = setup.server.last_sent().unwrap();
        assert_eq!(destination, SITE);
        assert!(!setup.shell.handle_event(&Event::ClientMessage(wake_up)));
        assert_eq!(
            setup.notifications.try_recv().unwrap().kind,
            DropEventKind::Exit
        );
    }
}
