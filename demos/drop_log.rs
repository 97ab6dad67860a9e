// Copyright 2023 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! Opens a window that accepts `text/plain` drops and logs every drag over it.
//!
//! Run with `RUST_LOG=debug` to see the protocol traffic as well.

use std::sync::{mpsc, Arc};
use std::thread;

use druid_dnd::x11::{DropTargetShell, EventLoop, Transport, X11Transport};
use druid_dnd::{DndConfig, DropActions, DropEventKind, DropNotification};
use tracing_subscriber::EnvFilter;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ConnectionExt, CreateWindowAux, EventMask, PropMode, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::wrapper::ConnectionExt as _;

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = DndConfig::from_env();
    let transport = Arc::new(X11Transport::connect(&config)?);
    let text_plain = transport.intern_atom("text/plain")?;
    let wm_protocols = transport.intern_atom("WM_PROTOCOLS")?;
    let wm_delete_window = transport.intern_atom("WM_DELETE_WINDOW")?;

    let conn = transport.connection();
    let screen = &conn.setup().roots[transport.screen_num()];
    let window = conn.generate_id()?;
    conn.create_window(
        x11rb::COPY_DEPTH_FROM_PARENT,
        window,
        screen.root,
        0,
        0,
        400,
        300,
        0,
        WindowClass::INPUT_OUTPUT,
        x11rb::COPY_FROM_PARENT,
        &CreateWindowAux::new()
            .background_pixel(screen.white_pixel)
            .event_mask(EventMask::STRUCTURE_NOTIFY),
    )?;
    conn.change_property32(
        PropMode::REPLACE,
        window,
        wm_protocols,
        AtomEnum::ATOM,
        &[wm_delete_window],
    )?;
    conn.change_property8(
        PropMode::REPLACE,
        window,
        AtomEnum::WM_NAME,
        AtomEnum::STRING,
        b"Drop text here",
    )?;
    conn.map_window(window)?;
    conn.flush()?;

    let (tx, rx) = mpsc::channel::<DropNotification>();
    let shell = DropTargetShell::new(transport.clone(), config, move |n: DropNotification| {
        // Fetching data blocks until the event thread delivers it, so answer elsewhere.
        let _ = tx.send(n);
    })?;
    shell.register_drop_site(window)?;

    let worker_shell = shell.clone();
    thread::spawn(move || {
        for notification in rx {
            if let Err(e) = answer(&worker_shell, &notification, text_plain) {
                tracing::error!("Failed to answer {:?}: {}", notification.kind, e);
            }
        }
    });

    let event_loop = EventLoop::new(transport.clone(), shell)?;
    let handle = event_loop.handle();
    event_loop.run(|event| {
        if let Event::ClientMessage(message) = event {
            if message.type_ == wm_protocols && message.data.as_data32()[0] == wm_delete_window {
                handle.quit();
            }
        }
    })?;
    Ok(())
}

fn answer(
    shell: &DropTargetShell,
    notification: &DropNotification,
    text_plain: u32,
) -> Result<(), druid_dnd::Error> {
    tracing::info!(
        "{:?} at ({:.0}, {:.0}) user action {:?}, source offers {:?}",
        notification.kind,
        notification.position.x,
        notification.position.y,
        notification.action,
        notification.source_actions,
    );
    let context = match &notification.context {
        Some(context) => context,
        None => return Ok(()),
    };
    let offers_text = notification.formats.contains(&text_plain);
    let action = if offers_text && notification.source_actions.contains(DropActions::COPY) {
        DropActions::COPY
    } else {
        DropActions::empty()
    };

    match notification.kind {
        DropEventKind::Enter | DropEventKind::Motion => {
            shell.send_response(context, notification.kind, action)?;
        }
        DropEventKind::Drop => {
            if action.is_empty() {
                shell.send_drop_done(context, false, action)?;
                return Ok(());
            }
            let result = shell.get_data(context, text_plain);
            match &result {
                Ok(data) => tracing::info!("dropped: {}", String::from_utf8_lossy(data)),
                Err(e) => tracing::warn!("could not fetch the drop: {}", e),
            }
            shell.send_drop_done(context, result.is_ok(), action)?;
        }
        DropEventKind::Exit => {}
    }
    Ok(())
}
