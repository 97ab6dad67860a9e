// Copyright 2020 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! X11 Monitors and the scale factor of drag coordinates.

use x11rb::connection::Connection;
use x11rb::errors::ReplyOrIdError;
use x11rb::protocol::randr::{self, ConnectionExt as _, Crtc};
use x11rb::protocol::xproto::{Screen, Timestamp};

use kurbo::{Point, Rect};

/// A monitor, in root window coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Monitor {
    pub primary: bool,
    pub rect: Rect,
    /// Device pixels per logical pixel.
    pub scale: f64,
}

impl Monitor {
    pub fn new(primary: bool, rect: Rect, scale: f64) -> Monitor {
        Monitor {
            primary,
            rect,
            scale,
        }
    }

    /// Whether `point` lies on this monitor. The right and bottom edges are exclusive.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.rect.x0
            && point.x < self.rect.x1
            && point.y >= self.rect.y0
            && point.y < self.rect.y1
    }
}

/// The scale factor of the monitor showing the root window point `(x, y)`.
///
/// Points that are on no monitor use the primary monitor, or 1.0 if there is none.
pub fn scale_at(monitors: &[Monitor], x: i32, y: i32) -> f64 {
    let point = Point::new(x as f64, y as f64);
    monitors
        .iter()
        .find(|monitor| monitor.contains(point))
        .or_else(|| monitors.iter().find(|monitor| monitor.primary))
        .map(|monitor| monitor.scale)
        .filter(|scale| *scale > 0.0)
        .unwrap_or(1.0)
}

fn monitor<Pos>(
    primary: bool,
    (x, y): (Pos, Pos),
    (width, height): (u16, u16),
    scale: f64,
) -> Monitor
where
    Pos: Into<i32>,
{
    let x = x.into() as f64;
    let y = y.into() as f64;
    let rect = Rect::new(x, y, x + width as f64, y + height as f64);
    Monitor::new(primary, rect, scale)
}

pub(crate) fn get_monitors(conn: &impl Connection, screen_num: usize, scale: f64) -> Vec<Monitor> {
    match get_monitors_impl(conn, screen_num, scale) {
        Ok(monitors) => monitors,
        Err(err) => {
            tracing::error!("Error in get_monitors(): {:?}", err);
            Vec::new()
        }
    }
}

fn get_monitors_impl(
    conn: &impl Connection,
    screen_num: usize,
    scale: f64,
) -> Result<Vec<Monitor>, ReplyOrIdError> {
    let screen = &conn.setup().roots[screen_num];

    if conn
        .extension_information(randr::X11_EXTENSION_NAME)?
        .is_none()
    {
        return get_monitors_core(screen, scale);
    }

    // Monitor support was added in RandR 1.5
    let version = conn.randr_query_version(1, 5)?.reply()?;
    match (version.major_version, version.minor_version) {
        (major, _) if major >= 2 => get_monitors_randr_monitors(conn, screen, scale),
        (1, minor) if minor >= 5 => get_monitors_randr_monitors(conn, screen, scale),
        (1, minor) if minor >= 3 => {
            let reply = conn
                .randr_get_screen_resources_current(screen.root)?
                .reply()?;
            get_monitors_randr_crtcs_timestamp(conn, &reply.crtcs, reply.config_timestamp, scale)
        }
        (1, minor) if minor >= 2 => {
            let reply = conn.randr_get_screen_resources(screen.root)?.reply()?;
            get_monitors_randr_crtcs_timestamp(conn, &reply.crtcs, reply.config_timestamp, scale)
        }
        _ => get_monitors_core(screen, scale),
    }
}

fn get_monitors_core(screen: &Screen, scale: f64) -> Result<Vec<Monitor>, ReplyOrIdError> {
    Ok(vec![monitor(
        true,
        (0, 0),
        (screen.width_in_pixels, screen.height_in_pixels),
        scale,
    )])
}

fn get_monitors_randr_monitors(
    conn: &impl Connection,
    screen: &Screen,
    scale: f64,
) -> Result<Vec<Monitor>, ReplyOrIdError> {
    let result = conn
        .randr_get_monitors(screen.root, true)?
        .reply()?
        .monitors
        .iter()
        .map(|info| {
            monitor(
                info.primary,
                (info.x, info.y),
                (info.width, info.height),
                scale,
            )
        })
        .collect();
    Ok(result)
}

// This function first sends a number of requests, collect()ing them into a Vec and then gets the
// replies. This saves round-trips. Without the collect(), there would be one round-trip per CRTC.
#[allow(clippy::needless_collect)]
fn get_monitors_randr_crtcs_timestamp(
    conn: &impl Connection,
    crtcs: &[Crtc],
    config_timestamp: Timestamp,
    scale: f64,
) -> Result<Vec<Monitor>, ReplyOrIdError> {
    let requests = crtcs
        .iter()
        .map(|&crtc| conn.randr_get_crtc_info(crtc, config_timestamp))
        .collect::<Vec<_>>();

    let mut result = Vec::new();
    for request in requests.into_iter() {
        let reply = request?.reply()?;
        if reply.width != 0 && reply.height != 0 {
            // First CRTC is assumed to be the primary output
            let primary = result.is_empty();
            result.push(monitor(
                primary,
                (reply.x, reply.y),
                (reply.width, reply.height),
                scale,
            ));
        }
    }

    Ok(result)
}
