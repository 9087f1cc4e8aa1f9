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

//! Transport backends.  Each one knows how to tell whether the producer has
//! materialized a surface, and how to pull pixels out of it.

use crate::context::TransportContext;
use crate::identifier::Transport;
use crate::sync::{Region, Surface};
use crate::Result;

mod file;
mod pixmap;
mod shm;
#[cfg(feature = "x11")]
pub mod x11;

pub use pixmap::ImageSource;

/// Operations every transport provides
pub(crate) trait TransportBackend {
    /// True once the producer has created the surface.  Never an error: a
    /// surface that does not exist yet is simply not ready.
    fn is_ready(&self) -> bool;

    /// Refresh `region` of `dst`, which holds the whole surface, from the
    /// producer.
    fn sync(
        &self,
        ctx: &mut TransportContext,
        surface: &Surface,
        region: Region,
        dst: &mut [u8],
    ) -> Result<()>;
}

/// Selects the backend for a transport
pub(crate) fn for_transport(transport: &Transport) -> Box<dyn TransportBackend + '_> {
    match *transport {
        Transport::File { ref path } => Box::new(file::FileBackend { path }),
        Transport::Pixmap { pixmap, .. } => Box::new(pixmap::PixmapBackend { pixmap }),
        Transport::SharedMemory { shmid } => Box::new(shm::ShmBackend { shmid }),
    }
}
