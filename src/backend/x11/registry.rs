// Copyright 2023 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! Bookkeeping for drop sites that live inside windows of other clients.
//!
//! An *embedder* is a foreign window hosting one of our drop sites. To receive drags over
//! it we point its protocol properties at our proxy window, and remember what was there
//! before so that it can be restored, and so that messages we do not handle can be passed
//! on to the previous owner.

use std::collections::HashMap;

use x11rb::protocol::xproto::Window;

use super::error::Error;
use super::protocol::ProtocolKind;
use super::transport::Transport;

/// What an embedder window advertised before we took it over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmbedderEntry {
    /// Whether the window already advertised the protocol.
    pub overridden: bool,
    /// The protocol version the previous owner advertised.
    pub version: u32,
    /// The proxy the previous owner advertised, or 0.
    pub proxy: Window,
}

#[derive(Debug, Default)]
pub struct EmbeddingRegistry {
    entries: HashMap<(ProtocolKind, Window), EmbedderEntry>,
    /// Embedder window to the drop sites it hosts, in registration order.
    sites: HashMap<Window, Vec<Window>>,
    /// Canvas window to the XEmbed client it hosts.
    xembed_clients: HashMap<Window, Window>,
}

impl EmbeddingRegistry {
    pub fn entry(&self, kind: ProtocolKind, embedder: Window) -> Option<EmbedderEntry> {
        self.entries.get(&(kind, embedder)).copied()
    }

    pub fn set_entry(&mut self, kind: ProtocolKind, embedder: Window, entry: EmbedderEntry) {
        self.entries.insert((kind, embedder), entry);
    }

    pub fn remove_entry(&mut self, kind: ProtocolKind, embedder: Window) -> Option<EmbedderEntry> {
        self.entries.remove(&(kind, embedder))
    }

    /// Whether `window` hosts any of our drop sites.
    pub fn is_embedder(&self, window: Window) -> bool {
        self.sites.contains_key(&window)
    }

    /// Whether any embedder still hosts one of our drop sites.
    pub fn has_embedders(&self) -> bool {
        !self.sites.is_empty()
    }

    /// Add a site to an embedder. Returns true if it is the embedder's first site.
    pub fn add_site(&mut self, embedder: Window, site: Window) -> bool {
        let sites = self.sites.entry(embedder).or_default();
        let first = sites.is_empty();
        if !sites.contains(&site) {
            sites.push(site);
        }
        first
    }

    /// Remove a site from an embedder. Returns true if that was the embedder's last site.
    pub fn remove_site(&mut self, embedder: Window, site: Window) -> bool {
        let sites = match self.sites.get_mut(&embedder) {
            Some(sites) => sites,
            None => return false,
        };
        let before = sites.len();
        sites.retain(|s| *s != site);
        if sites.is_empty() {
            self.sites.remove(&embedder);
            before > 0
        } else {
            false
        }
    }

    pub fn sites(&self, embedder: Window) -> &[Window] {
        self.sites.get(&embedder).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn xembed_client(&self, canvas: Window) -> Option<Window> {
        self.xembed_clients.get(&canvas).copied()
    }

    pub fn set_xembed_client(&mut self, canvas: Window, client: Window) {
        self.xembed_clients.insert(canvas, client);
    }

    pub fn remove_xembed_client(&mut self, canvas: Window) -> Option<Window> {
        self.xembed_clients.remove(&canvas)
    }

    /// Find the mapped drop site of `embedder` under the root window point `(x, y)`.
    pub fn embedded_drop_site(
        &self,
        conn: &dyn Transport,
        embedder: Window,
        x: i32,
        y: i32,
    ) -> Result<Option<Window>, Error> {
        let root = conn.root();
        for &site in self.sites(embedder) {
            let (site_x, site_y) = match conn.translate_coordinates(root, site, x, y)? {
                Some(position) => position,
                None => continue,
            };
            if site_x < 0 || site_y < 0 {
                continue;
            }
            let state = match conn.window_state(site)? {
                Some(state) => state,
                None => continue,
            };
            if state.mapped && site_x < i32::from(state.width) && site_y < i32::from(state.height)
            {
                return Ok(Some(site));
            }
        }
        Ok(None)
    }
}
