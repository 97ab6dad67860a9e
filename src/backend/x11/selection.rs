// Copyright 2020 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! Fetching drag data through the X selection mechanism.
//!
//! The thread asking for data converts the selection into a property of our proxy window
//! and sleeps on a condition variable. The event thread hands it the `SelectionNotify` and
//! `PropertyNotify` events of the transfer through [`SelectionTransfer::handle_event`].

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use x11rb::protocol::xproto::{Atom, Property, Timestamp, Window};
use x11rb::protocol::Event;

use super::transport::{Transport, ANY_PROPERTY_TYPE};
use crate::error::{Error, TransferError};

/// The most we reserve up front for an INCR transfer, whatever size the owner announces.
const MAX_PREALLOCATION: usize = 1 << 20;

/// An event of the transfer in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Received {
    /// The owner answered the conversion; `None` means it declined.
    Notify(Option<Atom>),
    /// A new value of the transfer property was written.
    NewValue,
}

#[derive(Debug, Default)]
struct Slot {
    /// A transfer is in progress.
    busy: bool,
    requestor: Window,
    property: Atom,
    selection: Atom,
    target: Atom,
    received: VecDeque<Received>,
}

/// The single selection transfer slot of a drop target shell.
#[derive(Debug, Default)]
pub(crate) struct SelectionTransfer {
    slot: Mutex<Slot>,
    cond: Condvar,
}

/// Releases the slot when a transfer ends, however it ends.
struct Busy<'a>(&'a SelectionTransfer);

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.0.slot.lock() {
            slot.busy = false;
            slot.received.clear();
        }
        self.0.cond.notify_all();
    }
}

impl SelectionTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slot>, Error> {
        Ok(lock!(self.slot)?)
    }

    /// Offer an event to the transfer in progress. Returns true if the event belonged to it.
    pub fn handle_event(&self, event: &Event) -> bool {
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(_) => {
                warn!("selection transfer slot is poisoned");
                return false;
            }
        };
        if !slot.busy {
            return false;
        }
        let received = match event {
            // Conversions of other targets, like the ones ending a drop, answer to the same
            // requestor.
            Event::SelectionNotify(notify)
                if notify.requestor == slot.requestor
                    && notify.selection == slot.selection
                    && notify.target == slot.target
                    && (notify.property == slot.property || notify.property == x11rb::NONE) =>
            {
                let property = if notify.property == x11rb::NONE {
                    None
                } else {
                    Some(notify.property)
                };
                Received::Notify(property)
            }
            Event::PropertyNotify(notify)
                if notify.window == slot.requestor
                    && notify.atom == slot.property
                    && notify.state == Property::NEW_VALUE =>
            {
                Received::NewValue
            }
            _ => return false,
        };
        slot.received.push_back(received);
        self.cond.notify_all();
        true
    }

    /// Wait until the event thread hands us an event `accept` likes, or until `timeout`
    /// passes without one.
    fn wait_for(
        &self,
        timeout: Duration,
        accept: impl Fn(Received) -> bool,
    ) -> Result<Received, Error> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock()?;
        loop {
            if let Some(index) = slot.received.iter().position(|r| accept(*r)) {
                if let Some(received) = slot.received.remove(index) {
                    return Ok(received);
                }
            }
            let now = Instant::now();
            if deadline <= now {
                return Err(TransferError::Timeout.into());
            }
            slot = match self.cond.wait_timeout(slot, deadline - now) {
                Ok((slot, _)) => slot,
                Err(_) => return Err(anyhow::anyhow!("selection transfer slot is poisoned").into()),
            };
        }
    }

    /// Convert `selection` to `target` into `property` on `requestor` and return the data.
    ///
    /// Blocks until the owner answered, each wait bounded by `timeout`. Concurrent calls are
    /// served one after the other.
    pub fn fetch(
        &self,
        conn: &dyn Transport,
        requestor: Window,
        property: Atom,
        selection: Atom,
        target: Atom,
        time: Timestamp,
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        let _busy = {
            let mut slot = self.lock()?;
            while slot.busy {
                slot = match self.cond.wait(slot) {
                    Ok(slot) => slot,
                    Err(_) => {
                        return Err(anyhow::anyhow!("selection transfer slot is poisoned").into())
                    }
                };
            }
            slot.busy = true;
            slot.requestor = requestor;
            slot.property = property;
            slot.selection = selection;
            slot.target = target;
            slot.received.clear();
            Busy(self)
        };

        debug!(
            "converting selection {} to {} at {}",
            selection, target, time
        );
        conn.convert_selection(requestor, selection, target, property, time)?;
        conn.flush()?;

        match self.wait_for(timeout, |r| matches!(r, Received::Notify(_)))? {
            Received::Notify(Some(_)) => {}
            _ => {
                debug!("selection owner declined the conversion");
                return Err(TransferError::Declined.into());
            }
        }

        let reply = conn
            .get_property(requestor, property, ANY_PROPERTY_TYPE, u32::MAX)?
            .filter(|reply| reply.type_ != x11rb::NONE)
            .ok_or(TransferError::PropertyVanished)?;

        if reply.type_ != conn.atoms().INCR {
            debug!("got selection contents directly");
            conn.delete_property(requestor, property)?;
            conn.flush()?;
            return Ok(reply.value);
        }

        let announced = reply
            .value32()
            .and_then(|items| items.last())
            .ok_or(TransferError::MissingIncrLength)?;
        // The new value notification of the INCR announcement is not a chunk.
        self.lock()?
            .received
            .retain(|r| *r != Received::NewValue);
        // Deleting the announcement starts the transfer.
        conn.delete_property(requestor, property)?;
        conn.flush()?;
        if announced == 0 {
            return Ok(Vec::new());
        }

        debug!("doing an INCR transfer of about {} bytes", announced);
        let mut value = Vec::with_capacity((announced as usize).min(MAX_PREALLOCATION));
        loop {
            self.wait_for(timeout, |r| r == Received::NewValue)?;
            let chunk = conn
                .get_property(requestor, property, ANY_PROPERTY_TYPE, u32::MAX)?
                .ok_or(TransferError::PropertyVanished)?;
            conn.delete_property(requestor, property)?;
            conn.flush()?;
            if chunk.value.is_empty() {
                debug!("INCR transfer finished");
                return Ok(value);
            }
            if chunk.format != 8 {
                return Err(TransferError::UnsupportedFormat(chunk.format).into());
            }
            value.extend_from_slice(&chunk.value);
        }
    }
}
