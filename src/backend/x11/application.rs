// Copyright 2020 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! The event thread: reads X events and hands them to the drop target shell.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Error};
use tracing::{debug, error};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ClientMessageEvent, Window};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use super::shell::DropTargetShell;
use super::transport::{Transport, X11Transport};

/// Stops an [`EventLoop`] from any thread.
#[derive(Clone)]
pub struct EventLoopHandle {
    conn: Arc<dyn Transport>,
    /// The shell's proxy window, which the wake up message is addressed to.
    window: Window,
    quitting: Arc<AtomicBool>,
}

impl EventLoopHandle {
    fn for_shell(shell: &DropTargetShell) -> Result<EventLoopHandle, crate::Error> {
        Ok(EventLoopHandle {
            conn: Arc::clone(shell.transport()),
            window: shell.proxy_window()?,
            quitting: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn quit(&self) {
        if self.quitting.swap(true, Ordering::SeqCst) {
            return;
        }
        // With an empty event mask the server delivers the message to the window's creator.
        let wakeup = ClientMessageEvent::new(
            32,
            self.window,
            self.conn.atoms()._DRUID_DND_WAKEUP,
            [0u32; 5],
        );
        let sent = self
            .conn
            .send_client_message(self.window, &wakeup)
            .and_then(|()| self.conn.flush());
        if let Err(e) = sent {
            error!("Failed to wake the event loop up: {}", e);
        }
    }
}

/// Runs the event thread of a [`DropTargetShell`].
pub struct EventLoop {
    transport: Arc<X11Transport<RustConnection>>,
    shell: DropTargetShell,
    handle: EventLoopHandle,
}

impl EventLoop {
    /// `shell` must have been created on `transport`.
    pub fn new(
        transport: Arc<X11Transport<RustConnection>>,
        shell: DropTargetShell,
    ) -> Result<EventLoop, Error> {
        let handle =
            EventLoopHandle::for_shell(&shell).context("Failed to set up the event loop")?;
        Ok(EventLoop {
            transport,
            shell,
            handle,
        })
    }

    pub fn handle(&self) -> EventLoopHandle {
        self.handle.clone()
    }

    pub fn shell(&self) -> &DropTargetShell {
        &self.shell
    }

    /// Dispatch events until [`EventLoopHandle::quit`] is called or the connection breaks.
    ///
    /// Events that are not about drag and drop are passed to `unhandled`.
    pub fn run(&self, unhandled: impl FnMut(&Event)) -> Result<(), Error> {
        let conn = self.transport.connection();
        let next_event = || -> Result<Event, Error> {
            conn.flush()?;
            // Threads waiting for replies queue the events they read on the way, and wake
            // us up when they do.
            Ok(conn.wait_for_event()?)
        };
        dispatch_events(&self.shell, &self.handle.quitting, next_event, unhandled)
    }
}

/// Hand the events `next_event` blocks for to `shell` until `quitting` is set.
fn dispatch_events(
    shell: &DropTargetShell,
    quitting: &AtomicBool,
    mut next_event: impl FnMut() -> Result<Event, Error>,
    mut unhandled: impl FnMut(&Event),
) -> Result<(), Error> {
    loop {
        let event = next_event().context("Error while waiting for X11 events")?;
        if quitting.load(Ordering::SeqCst) {
            debug!("event loop quit");
            return Ok(());
        }
        if let Event::Error(e) = &event {
            error!("X11 error: {:?}", e);
        } else if !shell.handle_event(&event) {
            unhandled(&event);
        }
    }
}
