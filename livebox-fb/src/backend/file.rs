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

//! Surfaces backed by a regular file.
//!
//! The producer may still be writing the file, or may have truncated it, when
//! we read.  None of that is an error: whatever could not be read keeps its
//! previous contents, and the next update notification fixes it up.

use super::TransportBackend;
use crate::context::TransportContext;
use crate::sync::{Region, Surface};
use crate::Result;
use std::ffi::CString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::ffi::OsStrExt as _;
use std::path::Path;

pub(super) struct FileBackend<'a> {
    pub(super) path: &'a Path,
}

impl TransportBackend for FileBackend<'_> {
    fn is_ready(&self) -> bool {
        let path = match CString::new(self.path.as_os_str().as_bytes()) {
            Ok(path) => path,
            Err(_) => return false,
        };
        if unsafe { libc::access(path.as_ptr(), libc::R_OK) } == 0 {
            true
        } else {
            log::debug!(
                "{} is not readable yet: {}",
                self.path.display(),
                std::io::Error::last_os_error()
            );
            false
        }
    }

    fn sync(
        &self,
        _: &mut TransportContext,
        surface: &Surface,
        region: Region,
        dst: &mut [u8],
    ) -> Result<()> {
        let mut file = match File::open(self.path) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("cannot open {}: {}", self.path.display(), e);
                return Ok(());
            }
        };
        if region.covers(surface) {
            let size = surface.byte_size();
            match file.read(&mut dst[..size]) {
                Ok(n) if n == size => {}
                Ok(n) => log::warn!(
                    "short read from {}: {} of {} bytes",
                    self.path.display(),
                    n,
                    size
                ),
                Err(e) => log::warn!("cannot read {}: {}", self.path.display(), e),
            }
            return Ok(());
        }
        for span in region.row_spans(surface) {
            if let Err(e) = file.seek(SeekFrom::Start(span.start as u64)) {
                log::warn!(
                    "cannot seek {} to {}: {}",
                    self.path.display(),
                    span.start,
                    e
                );
                break;
            }
            let wanted = span.len();
            match file.read(&mut dst[span]) {
                Ok(n) if n == wanted => {}
                Ok(n) => {
                    log::warn!(
                        "short read from {}: {} of {} bytes",
                        self.path.display(),
                        n,
                        wanted
                    );
                    break;
                }
                Err(e) => {
                    log::warn!("cannot read {}: {}", self.path.display(), e);
                    break;
                }
            }
        }
        Ok(())
    }
}
