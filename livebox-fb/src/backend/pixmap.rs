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

//! Surfaces backed by a pixmap on the display server.
//!
//! The whole pixmap is always transferred; the requested region is then
//! copied out of the transfer image.

use super::TransportBackend;
use crate::context::TransportContext;
use crate::sync::{Region, Surface};
use crate::{Error, Result};

/// Something that can copy a remote pixmap into process memory.
///
/// The real implementation talks to the X server (see
/// [`XShmSource`](crate::backend::x11::XShmSource)); tests provide their own.
pub trait ImageSource {
    /// Transfer all of `pixmap`, which has the geometry of `surface`, and
    /// pass the image to `consume`.  Every resource acquired for the
    /// transfer MUST be released before this returns, whether or not it
    /// succeeds.
    fn fetch(
        &mut self,
        pixmap: u32,
        surface: &Surface,
        consume: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()>;

    /// False if the connection behind this source is known to be broken.
    /// Unhealthy sources are dropped, and a new one is created on next use.
    fn is_healthy(&self) -> bool {
        true
    }
}

pub(super) struct PixmapBackend {
    pub(super) pixmap: Option<u32>,
}

impl TransportBackend for PixmapBackend {
    fn is_ready(&self) -> bool {
        self.pixmap.map_or(false, |pixmap| pixmap != 0)
    }

    fn sync(
        &self,
        ctx: &mut TransportContext,
        surface: &Surface,
        region: Region,
        dst: &mut [u8],
    ) -> Result<()> {
        let pixmap = self
            .pixmap
            .ok_or(Error::InvalidParameter("pixmap identifier has no handle"))?;
        let source = ctx.image_source()?;
        let res = source.fetch(pixmap, surface, &mut |image| {
            copy_region(image, surface, region, &mut dst[..])
        });
        if res.is_err() && !source.is_healthy() {
            log::warn!("display connection is broken, reconnecting on next sync");
            ctx.discard_image_source();
        }
        res
    }
}

fn short_image(len: usize, surface: &Surface) -> Error {
    Error::fault(
        "pixmap transfer",
        format!(
            "image has {} bytes, {}x{}x{} surface needs {}",
            len,
            surface.width,
            surface.height,
            surface.pixel_size,
            surface.byte_size()
        ),
    )
}

/// Copies `region` of a whole-surface image into `dst`
fn copy_region(image: &[u8], surface: &Surface, region: Region, dst: &mut [u8]) -> Result<()> {
    if region.covers(surface) {
        let size = surface.byte_size();
        let src = image.get(..size).ok_or_else(|| short_image(image.len(), surface))?;
        dst[..size].copy_from_slice(src);
        Ok(())
    } else {
        copy_rows(image, surface, region, dst)
    }
}

fn copy_rows(image: &[u8], surface: &Surface, region: Region, dst: &mut [u8]) -> Result<()> {
    for span in region.row_spans(surface) {
        let src = image
            .get(span.clone())
            .ok_or_else(|| short_image(image.len(), surface))?;
        dst[span].copy_from_slice(src);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> Surface {
        Surface {
            width: 5,
            height: 4,
            pixel_size: 2,
        }
    }

    fn image() -> Vec<u8> {
        (0..40u8).map(|i| 200 - i).collect()
    }

    #[test]
    fn full_copy_matches_row_copy() {
        let surface = surface();
        let full = Region::full(&surface);
        let mut whole = vec![0u8; 40];
        let mut by_rows = vec![0u8; 40];
        copy_region(&image(), &surface, full, &mut whole).unwrap();
        copy_rows(&image(), &surface, full, &mut by_rows).unwrap();
        assert_eq!(whole, by_rows);
        assert_eq!(whole, image());
    }

    #[test]
    fn partial_copy() {
        let surface = surface();
        let mut dst = vec![0u8; 40];
        copy_region(&image(), &surface, Region::new(4, 2, 1, 2), &mut dst).unwrap();
        let image = image();
        for (at, byte) in dst.iter().enumerate() {
            let (row, col) = (at / 10, (at % 10) / 2);
            if row >= 2 && col == 4 {
                assert_eq!(*byte, image[at]);
            } else {
                assert_eq!(*byte, 0, "byte {} was touched", at);
            }
        }
    }

    #[test]
    fn short_images_are_faults() {
        let surface = surface();
        let mut dst = vec![0u8; 40];
        let err = copy_region(&image()[..39], &surface, Region::full(&surface), &mut dst)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Fault);
        let err = copy_region(&image()[..39], &surface, Region::new(0, 3, 5, 1), &mut dst)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Fault);
        assert!(copy_region(&image()[..39], &surface, Region::new(0, 0, 5, 3), &mut dst).is_ok());
    }

    #[test]
    fn readiness() {
        assert!(PixmapBackend { pixmap: Some(9) }.is_ready());
        assert!(!PixmapBackend { pixmap: Some(0) }.is_ready());
        assert!(!PixmapBackend { pixmap: None }.is_ready());
    }
}
