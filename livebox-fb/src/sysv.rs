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

//! System V shared memory segments.
//!
//! Segments attached from the producer are never resized, recreated, or
//! removed here.  Only segments created by [`Segment::create`] are removed,
//! and only when they are dropped.

use crate::{Error, Result};
use livebox_fb_proto::ShmHeader;
use std::io;
use std::os::raw::c_int;

fn stat(shmid: c_int) -> Result<libc::shmid_ds> {
    let mut ds = std::mem::MaybeUninit::<libc::shmid_ds>::uninit();
    // SAFETY: IPC_STAT fully initializes `ds` when it succeeds
    if unsafe { libc::shmctl(shmid, libc::IPC_STAT, ds.as_mut_ptr()) } != 0 {
        return Err(Error::last_os_error("shmctl(IPC_STAT)"));
    }
    Ok(unsafe { ds.assume_init() })
}

/// Number of processes currently attached to the segment, as counted by the
/// kernel
pub(crate) fn attach_count(shmid: c_int) -> Result<usize> {
    Ok(stat(shmid)?.shm_nattch as usize)
}

/// A private segment owned by this process.  It is marked for removal when
/// dropped; the kernel frees it once the last attachment goes away.
#[derive(Debug)]
pub(crate) struct Segment {
    id: c_int,
}

impl Segment {
    pub(crate) fn create(size: usize) -> Result<Self> {
        let id = unsafe { libc::shmget(libc::IPC_PRIVATE, size.max(1), libc::IPC_CREAT | 0o600) };
        if id < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::ENOMEM) | Some(libc::ENOSPC) => Error::OutOfMemory(size),
                _ => Error::fault("shmget", err),
            });
        }
        Ok(Self { id })
    }

    pub(crate) fn id(&self) -> c_int {
        self.id
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if unsafe { libc::shmctl(self.id, libc::IPC_RMID, std::ptr::null_mut()) } != 0 {
            log::error!(
                "failed to remove transfer segment {}: {}",
                self.id,
                io::Error::last_os_error()
            );
        }
    }
}

/// A segment mapped into this process.  Detached when dropped.
#[derive(Debug)]
pub(crate) struct Attachment {
    ptr: *mut u8,
    len: usize,
    shmid: c_int,
}

impl Attachment {
    /// Attaches segment `shmid`.  The length is taken from the kernel, never
    /// from anything the producer wrote into the segment.
    pub(crate) fn attach(shmid: c_int, read_only: bool) -> Result<Self> {
        let len = stat(shmid)?.shm_segsz as usize;
        let flags = if read_only { libc::SHM_RDONLY } else { 0 };
        let ptr = unsafe { libc::shmat(shmid, std::ptr::null(), flags) };
        if ptr as isize == -1 {
            return Err(Error::last_os_error("shmat"));
        }
        log::debug!("attached segment {} ({} bytes) at {:p}", shmid, len, ptr);
        Ok(Self {
            ptr: ptr as *mut u8,
            len,
            shmid,
        })
    }

    pub(crate) fn shmid(&self) -> c_int {
        self.shmid
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Copies bytes starting at `offset` into `dst`, returning how many were
    /// copied.  The other side may be writing concurrently; torn reads are
    /// possible and accepted.
    pub(crate) fn copy_out(&self, offset: usize, dst: &mut [u8]) -> usize {
        let available = self.len.saturating_sub(offset);
        let count = available.min(dst.len());
        if count != 0 {
            // SAFETY: `offset + count <= self.len`, and the mapping stays valid
            // until `self` is dropped
            unsafe { std::ptr::copy_nonoverlapping(self.ptr.add(offset), dst.as_mut_ptr(), count) }
        }
        count
    }

    /// Snapshot of the producer's header, or `None` if the segment is too
    /// small to hold one
    pub(crate) fn header(&self) -> Option<ShmHeader> {
        let mut raw = [0u8; <ShmHeader as livebox_fb_proto::Castable>::SIZE];
        if self.copy_out(0, &mut raw) != raw.len() {
            return None;
        }
        ShmHeader::read_from(&raw)
    }

    /// Views the whole segment as a slice.
    ///
    /// # Safety
    ///
    /// Nothing else may write to the segment while the slice is alive.  This
    /// holds for private transfer segments once the X server has replied, but
    /// never for producer-owned segments.
    pub(crate) unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr, self.len)
    }

    /// Detaches now, reporting failure instead of only logging it
    pub(crate) fn detach(self) -> Result<()> {
        let ptr = self.ptr;
        std::mem::forget(self);
        if unsafe { libc::shmdt(ptr as *const libc::c_void) } != 0 {
            return Err(Error::last_os_error("shmdt"));
        }
        Ok(())
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        if unsafe { libc::shmdt(self.ptr as *const libc::c_void) } != 0 {
            log::error!(
                "failed to detach segment {}: {}",
                self.shmid,
                io::Error::last_os_error()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_segment_lifecycle() {
        let segment = Segment::create(4096).expect("shmget works");
        let writer = Attachment::attach(segment.id(), false).unwrap();
        assert!(writer.len() >= 4096);
        assert_eq!(attach_count(segment.id()).unwrap(), 1);
        unsafe { std::ptr::write_bytes(writer.ptr, 0xA5, 16) };
        let reader = Attachment::attach(segment.id(), true).unwrap();
        assert_eq!(attach_count(segment.id()).unwrap(), 2);
        let mut out = [0u8; 20];
        assert_eq!(reader.copy_out(0, &mut out), 20);
        assert_eq!(&out[..16], &[0xA5; 16][..]);
        assert_eq!(&out[16..], &[0; 4][..]);
        assert_eq!(reader.copy_out(reader.len() - 2, &mut out), 2);
        reader.detach().unwrap();
        assert_eq!(attach_count(segment.id()).unwrap(), 1);
        drop(writer);
    }

    #[test]
    fn missing_segment() {
        let segment = Segment::create(64).unwrap();
        let id = segment.id();
        drop(segment);
        match Attachment::attach(id, true) {
            Err(e) => assert_eq!(e.kind(), crate::ErrorKind::Fault),
            Ok(a) => panic!("attached a removed segment: {:?}", a),
        }
    }
}
