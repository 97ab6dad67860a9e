// Copyright 2023 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration of the drop target shell.

use std::time::Duration;

use tracing::warn;

/// How long to wait for a selection owner when no timeout is configured.
pub const DEFAULT_SELECTION_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Configuration of a [`DropTargetShell`].
///
/// [`DropTargetShell`]: crate::x11::DropTargetShell
#[derive(Clone, Debug, PartialEq)]
pub struct DndConfig {
    /// Upper bound for each wait on the selection owner: the initial conversion and every
    /// chunk of an incremental transfer.
    pub selection_timeout: Duration,
    /// Overrides the `Xft.dpi` resource when computing the scale of drop coordinates.
    pub dpi: Option<f64>,
    /// Whether windows are advertised as Motif drop sites.
    pub motif: bool,
    /// Whether windows are advertised as XDnD drop sites.
    pub xdnd: bool,
}

impl Default for DndConfig {
    fn default() -> Self {
        DndConfig {
            selection_timeout: DEFAULT_SELECTION_TIMEOUT,
            dpi: None,
            motif: true,
            xdnd: true,
        }
    }
}

impl DndConfig {
    /// Build a configuration from the process environment.
    ///
    /// * `DRUID_DND_TIMEOUT_MS`: selection timeout in milliseconds.
    /// * `DRUID_X11_DPI`: the dpi to assume instead of `Xft.dpi`.
    /// * `DRUID_DND_DISABLE_MOTIF`, `DRUID_DND_DISABLE_XDND`: turn a protocol off.
    pub fn from_env() -> Self {
        DndConfig::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = DndConfig::default();

        if let Some(value) = lookup("DRUID_DND_TIMEOUT_MS") {
            match value.trim().parse::<u64>() {
                Ok(ms) => config.selection_timeout = Duration::from_millis(ms),
                Err(err) => warn!(
                    "Unable to parse DRUID_DND_TIMEOUT_MS {:?}: {}, defaulting to {:?}",
                    value, err, config.selection_timeout
                ),
            }
        }

        if let Some(value) = lookup("DRUID_X11_DPI") {
            match value.trim().parse::<f64>() {
                Ok(dpi) if dpi > 0.0 => config.dpi = Some(dpi),
                Ok(dpi) => warn!("Ignoring non-positive DRUID_X11_DPI {}", dpi),
                Err(err) => warn!("Unable to parse DRUID_X11_DPI {:?}: {}", value, err),
            }
        }

        config.motif = !is_set(lookup("DRUID_DND_DISABLE_MOTIF"));
        config.xdnd = !is_set(lookup("DRUID_DND_DISABLE_XDND"));
        config
    }
}

fn is_set(value: Option<String>) -> bool {
    match value.as_deref().map(str::trim) {
        None | Some("") | Some("0") => false,
        Some(value) => !value.eq_ignore_ascii_case("false"),
    }
}
