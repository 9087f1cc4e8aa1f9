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

//! Refreshing buffer contents from the producer.

use crate::backend;
use crate::context::TransportContext;
use crate::handle::{FrameBuffer, Payload};
use crate::{Error, Result};
use std::ops::Range;

/// Geometry of a surface
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Surface {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per pixel
    pub pixel_size: usize,
}

impl Surface {
    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * self.pixel_size
    }

    /// Bytes in the whole surface.  Handles only exist for surfaces where
    /// this does not overflow.
    pub fn byte_size(&self) -> usize {
        self.stride() * self.height as usize
    }

    pub(crate) fn checked_byte_size(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.pixel_size)?
            .checked_mul(self.height as usize)
    }
}

/// A rectangle of pixels, relative to the top-left corner of a surface
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Region {
    /// Leftmost column
    pub x: u32,
    /// Topmost row
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Region {
    /// Creates a region
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole of `surface`
    pub fn full(surface: &Surface) -> Self {
        Self::new(0, 0, surface.width, surface.height)
    }

    /// True if the region contains no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True if the region is exactly the whole of `surface`
    pub fn covers(&self, surface: &Surface) -> bool {
        *self == Self::full(surface)
    }

    /// True if the region lies entirely within `surface`
    pub fn fits(&self, surface: &Surface) -> bool {
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        matches!((right, bottom), (Some(r), Some(b)) if r <= surface.width && b <= surface.height)
    }

    /// Byte ranges of each row of the region, as offsets into a buffer
    /// holding the whole surface.  The region must fit the surface.
    pub(crate) fn row_spans(self, surface: &Surface) -> impl Iterator<Item = Range<usize>> {
        debug_assert!(self.fits(surface), "region checked by caller");
        let (pixel_size, surface_width) = (surface.pixel_size, surface.width as usize);
        let (x, len) = (self.x as usize, self.width as usize * pixel_size);
        (self.y..self.y + self.height).map(move |row| {
            let start = (row as usize * surface_width + x) * pixel_size;
            start..start + len
        })
    }
}

/// Refreshes `region` of the buffer currently attached to `fb`.
///
/// Succeeds without doing anything if no buffer is attached, if the region is
/// empty, or if the transport is shared memory.  File I/O failures are
/// logged and otherwise ignored.
///
/// # Errors
///
/// - [`Error::InvalidParameter`] if the region does not fit the surface.
/// - [`Error::Fault`] if a pixmap transfer fails.
pub fn sync(ctx: &mut TransportContext, fb: &FrameBuffer, region: Region) -> Result<()> {
    let buffer = match fb.buffer() {
        Some(buffer) => buffer,
        None => {
            log::trace!("{}: no buffer attached, nothing to sync", fb.identifier());
            return Ok(());
        }
    };
    let surface = fb.surface();
    if !region.fits(&surface) {
        return Err(Error::InvalidParameter("region does not fit the surface"));
    }
    if region.is_empty() {
        return Ok(());
    }
    let mut payload = buffer.payload.borrow_mut();
    let dst = match *payload {
        Payload::Local(ref mut bytes) => bytes,
        _ => return Ok(()),
    };
    assert!(
        dst.len() >= surface.byte_size(),
        "buffers are allocated at the surface size, which never changes; qed"
    );
    backend::for_transport(fb.identifier().transport()).sync(ctx, &surface, region, dst)
}
