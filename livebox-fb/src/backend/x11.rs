/*
 * Livebox viewer frame buffer library
 *
 * Copyright (C) 2026  The livebox-fb authors
 *
 * This program is free software; you can redistribute it and/or
 * modify it under the terms of the GNU General Public License
 * as published by the Free Software Foundation; either version 2
 * of the License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program; if not, write to the Free Software
 * Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301, USA.
 *
 */

//! Pixmap transfer over the MIT-SHM extension.
//!
//! Every transfer creates a private segment, has the server attach it and
//! copy the pixmap into it, and then tears all of that down again.  Any step
//! can fail independently; the guards below release whatever was acquired in
//! reverse order.

use super::ImageSource;
use crate::sync::Surface;
use crate::sysv::{Attachment, Segment};
use crate::{Error, Result};
use std::cell::Cell;
use std::convert::TryFrom;
use std::fmt;
use x11rb::connection::Connection as _;
use x11rb::errors::{ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::shm::{self, ConnectionExt as _};
use x11rb::protocol::xproto::ImageFormat;
use x11rb::rust_connection::RustConnection;

/// An [`ImageSource`] backed by an X server connection
pub struct XShmSource {
    conn: RustConnection,
    healthy: Cell<bool>,
}

impl fmt::Debug for XShmSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XShmSource")
            .field("healthy", &self.healthy.get())
            .finish()
    }
}

/// The server's attachment of a transfer segment
struct ServerAttachment<'a> {
    conn: &'a RustConnection,
    seg: shm::Seg,
}

impl Drop for ServerAttachment<'_> {
    fn drop(&mut self) {
        let res = self
            .conn
            .shm_detach(self.seg)
            .and_then(|_| self.conn.flush());
        if let Err(e) = res {
            log::error!("failed to detach XShm segment {:#x}: {}", self.seg, e);
        }
    }
}

impl XShmSource {
    /// Connects to `display`, or to `$DISPLAY` if `None`.  Fails if the
    /// server does not support MIT-SHM.
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen) = RustConnection::connect(display)
            .map_err(|e| Error::fault("connecting to the X server", e))?;
        let version = conn
            .shm_query_version()
            .map_err(|e| Error::fault("querying MIT-SHM", e))?
            .reply()
            .map_err(|e| Error::fault("querying MIT-SHM", e))?;
        log::debug!(
            "connected to X screen {}, MIT-SHM {}.{}",
            screen,
            version.major_version,
            version.minor_version
        );
        Ok(Self {
            conn,
            healthy: Cell::new(true),
        })
    }

    fn lost(&self, what: &'static str, e: ConnectionError) -> Error {
        self.healthy.set(false);
        Error::fault(what, e)
    }

    fn reply_failed(&self, what: &'static str, e: ReplyError) -> Error {
        if let ReplyError::ConnectionError(_) = e {
            self.healthy.set(false);
        }
        Error::fault(what, e)
    }

    fn new_seg(&self) -> Result<shm::Seg> {
        self.conn.generate_id().map_err(|e| match e {
            ReplyOrIdError::ConnectionError(e) => self.lost("allocating an XShm segment ID", e),
            e => Error::fault("allocating an XShm segment ID", e),
        })
    }
}

impl ImageSource for XShmSource {
    fn fetch(
        &mut self,
        pixmap: u32,
        surface: &Surface,
        consume: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let width = u16::try_from(surface.width)
            .map_err(|_| Error::InvalidParameter("surface too wide for the X server"))?;
        let height = u16::try_from(surface.height)
            .map_err(|_| Error::InvalidParameter("surface too tall for the X server"))?;
        let size = surface.byte_size();

        let segment = Segment::create(size)?;
        let local = Attachment::attach(segment.id(), false)?;
        let seg = self.new_seg()?;
        self.conn
            .shm_attach(seg, segment.id() as u32, false)
            .map_err(|e| self.lost("attaching the transfer segment", e))?
            .check()
            .map_err(|e| self.reply_failed("attaching the transfer segment", e))?;
        let _server = ServerAttachment {
            conn: &self.conn,
            seg,
        };
        let reply = self
            .conn
            .shm_get_image(
                pixmap,
                0,
                0,
                width,
                height,
                !0,
                ImageFormat::Z_PIXMAP.into(),
                seg,
                0,
            )
            .map_err(|e| self.lost("requesting the pixmap image", e))?
            .reply()
            .map_err(|e| self.reply_failed("requesting the pixmap image", e))?;
        log::trace!(
            "pixmap {:#x}: depth {}, {} bytes",
            pixmap,
            reply.depth,
            reply.size
        );
        // SAFETY: the segment is private to us and the server, and the
        // server is done writing once it has replied
        let image = unsafe { local.as_slice() };
        let filled = (reply.size as usize).min(image.len());
        consume(&image[..filled])
    }

    fn is_healthy(&self) -> bool {
        self.healthy.get()
    }
}
