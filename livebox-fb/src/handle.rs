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

//! Frame buffer handles and the buffers acquired through them.
//!
//! A [`FrameBuffer`] owns at most one file or pixmap buffer, which is created
//! on first acquire and freed when its last [`Pixels`] is released.  The
//! buffer only holds a weak reference back to the handle, so either side may
//! go away first.  Shared memory buffers are never owned by the handle: each
//! acquire is a separate attachment of the producer's segment.

use crate::backend;
use crate::context::TransportContext;
use crate::identifier::{Identifier, Transport, TransportKind};
use crate::sync::{self, Region, Surface};
use crate::sysv::{self, Attachment};
use crate::{Error, Result};
use livebox_fb_proto::{BufferState, Castable, ShmHeader};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

#[cfg(test)]
mod tests;

/// A handle to a producer's surface
#[derive(Debug)]
pub struct FrameBuffer {
    inner: Rc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    identifier: Identifier,
    width: u32,
    height: u32,
    buffer: RefCell<Option<Rc<Buffer>>>,
}

#[derive(Debug)]
pub(crate) enum Payload {
    /// File and pixmap pixels, owned by this process
    Local(Vec<u8>),
    /// The producer's segment, header included
    Shared(Attachment),
    /// Freed on the final release
    Released,
}

#[derive(Debug)]
pub(crate) struct Buffer {
    kind: TransportKind,
    state: Cell<BufferState>,
    refcnt: Cell<usize>,
    owner: RefCell<Weak<HandleInner>>,
    pub(crate) payload: RefCell<Payload>,
}

/// Pixels acquired from a [`FrameBuffer`].
///
/// Every successful [`FrameBuffer::acquire`] must be paired with one
/// [`Pixels::release`].  Releasing through any `Pixels` of the same buffer
/// counts; dropping a `Pixels` without releasing it keeps a file or pixmap
/// buffer alive until its handle is gone.
#[derive(Debug)]
pub struct Pixels {
    buffer: Rc<Buffer>,
}

impl FrameBuffer {
    /// Creates a handle for the surface named by `identifier`.  Nothing is
    /// allocated or read until [`FrameBuffer::acquire`].
    ///
    /// A recognized schema with a malformed handle (such as `pixmap://x`)
    /// still produces a handle, but one that is never ready and cannot be
    /// acquired.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidIdentifier`] if the identifier is empty or its
    ///   schema is unknown.
    /// - [`Error::InvalidParameter`] if the surface size overflows.
    pub fn create(identifier: &str, width: u32, height: u32) -> Result<Self> {
        let identifier = Identifier::resolve_lenient(identifier)?;
        let surface = Surface {
            width,
            height,
            pixel_size: identifier.transport().pixel_size(),
        };
        if surface.checked_byte_size().is_none() {
            return Err(Error::InvalidParameter("surface size overflows"));
        }
        log::debug!("created handle for {} ({}x{})", identifier, width, height);
        Ok(Self {
            inner: Rc::new(HandleInner {
                identifier,
                width,
                height,
                buffer: RefCell::new(None),
            }),
        })
    }

    /// Destroys the handle.  An attached buffer is not released: whoever
    /// still holds [`Pixels`] for it keeps valid access.  Equivalent to
    /// dropping the handle.
    pub fn destroy(self) {}

    /// The identifier this handle was created with
    pub fn identifier(&self) -> &Identifier {
        &self.inner.identifier
    }

    /// The transport selected by the identifier
    pub fn transport_kind(&self) -> TransportKind {
        self.inner.identifier.kind()
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.inner.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// Bytes per pixel
    pub fn pixel_size(&self) -> usize {
        self.inner.identifier.transport().pixel_size()
    }

    /// Geometry of the surface
    pub fn surface(&self) -> Surface {
        Surface {
            width: self.inner.width,
            height: self.inner.height,
            pixel_size: self.pixel_size(),
        }
    }

    /// Size of the surface in bytes
    pub fn byte_size(&self) -> usize {
        self.surface().byte_size()
    }

    /// True once the producer has materialized the surface
    pub fn is_ready(&self) -> bool {
        backend::for_transport(self.inner.identifier.transport()).is_ready()
    }

    /// True if a file or pixmap buffer is currently attached
    pub fn has_buffer(&self) -> bool {
        self.inner.buffer.borrow().is_some()
    }

    pub(crate) fn buffer(&self) -> Option<Rc<Buffer>> {
        self.inner.buffer.borrow().clone()
    }

    /// Acquires the surface's pixels.
    ///
    /// For files and pixmaps, the first acquire allocates a zeroed buffer and
    /// fills it from the producer; later ones share that buffer.  For shared
    /// memory, every acquire attaches the producer's segment anew.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if the identifier has no valid handle.
    ///   Handle 0 is never valid.
    /// - [`Error::OutOfMemory`] if the buffer cannot be allocated.
    /// - [`Error::Fault`] if the segment cannot be attached, or the first
    ///   pixmap transfer fails.
    pub fn acquire(&self, ctx: &mut TransportContext) -> Result<Pixels> {
        match *self.inner.identifier.transport() {
            Transport::SharedMemory { shmid: None | Some(0) }
            | Transport::Pixmap {
                pixmap: None | Some(0),
                ..
            } => return Err(Error::InvalidParameter("identifier has no valid handle")),
            Transport::SharedMemory { shmid: Some(shmid) } => return self.attach_shared(shmid),
            Transport::File { .. } | Transport::Pixmap { .. } => {}
        }
        if let Some(buffer) = self.buffer() {
            buffer.refcnt.set(buffer.refcnt.get() + 1);
            return Ok(Pixels { buffer });
        }

        let size = self.byte_size();
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| Error::OutOfMemory(size))?;
        bytes.resize(size, 0);
        let buffer = Rc::new(Buffer {
            kind: self.transport_kind(),
            state: Cell::new(BufferState::Created),
            refcnt: Cell::new(0),
            owner: RefCell::new(Rc::downgrade(&self.inner)),
            payload: RefCell::new(Payload::Local(bytes)),
        });
        *self.inner.buffer.borrow_mut() = Some(buffer.clone());
        if let Err(e) = self.sync_all(ctx) {
            log::debug!("initial sync of {} failed: {}", self.identifier(), e);
            *self.inner.buffer.borrow_mut() = None;
            buffer.state.set(BufferState::Destroyed);
            return Err(e);
        }
        buffer.refcnt.set(1);
        log::debug!("allocated {} byte buffer for {}", size, self.identifier());
        Ok(Pixels { buffer })
    }

    fn attach_shared(&self, shmid: i32) -> Result<Pixels> {
        let attachment = Attachment::attach(shmid, true)?;
        match attachment.header() {
            None => {
                return Err(Error::fault(
                    "attaching the producer segment",
                    format!("segment {} is too small for a header", shmid),
                ))
            }
            Some(header) if !header.is_live_shm() => log::warn!(
                "segment {} has state {:#x} and type {}",
                shmid,
                header.state,
                header.ty
            ),
            Some(_) => {}
        }
        Ok(Pixels {
            buffer: Rc::new(Buffer {
                kind: TransportKind::SharedMemory,
                state: Cell::new(BufferState::Created),
                refcnt: Cell::new(0),
                owner: RefCell::new(Weak::new()),
                payload: RefCell::new(Payload::Shared(attachment)),
            }),
        })
    }

    /// Refreshes `region` of the attached buffer.  See [`sync::sync`].
    pub fn sync(&self, ctx: &mut TransportContext, region: Region) -> Result<()> {
        sync::sync(ctx, self, region)
    }

    /// Refreshes the whole attached buffer
    pub fn sync_all(&self, ctx: &mut TransportContext) -> Result<()> {
        self.sync(ctx, Region::full(&self.surface()))
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.inner.buffer.borrow_mut().take() {
            log::debug!(
                "{} destroyed with {} outstanding references",
                self.inner.identifier,
                buffer.refcnt.get()
            );
            *buffer.owner.borrow_mut() = Weak::new();
        }
    }
}

impl Buffer {
    /// The live header of a shared buffer, or `None` for other buffers
    fn shared_header(&self) -> Result<Option<ShmHeader>> {
        match *self.payload.borrow() {
            Payload::Shared(ref attachment) => attachment
                .header()
                .map(Some)
                .ok_or(Error::InvalidParameter("segment has no header")),
            _ => Ok(None),
        }
    }

    fn check_live(&self) -> Result<Option<ShmHeader>> {
        if self.state.get() != BufferState::Created {
            return Err(Error::InvalidParameter("buffer has been destroyed"));
        }
        let header = self.shared_header()?;
        if let Some(header) = header {
            if header.state() != Some(BufferState::Created) {
                return Err(Error::InvalidParameter("producer has destroyed the buffer"));
            }
        }
        Ok(header)
    }

    fn release_shared(&self, header: ShmHeader) -> Result<()> {
        if header.buffer_type().is_none() {
            log::warn!("releasing segment with unknown buffer type {}", header.ty);
        }
        self.state.set(BufferState::Destroyed);
        if let Payload::Shared(attachment) = self.payload.replace(Payload::Released) {
            let shmid = attachment.shmid();
            if let Err(e) = attachment.detach() {
                log::error!("segment {}: {}", shmid, e);
            }
        }
        Ok(())
    }

    fn release_local(&self) -> Result<()> {
        let count = self.refcnt.get();
        assert!(count > 0, "live buffers are always referenced; qed");
        self.refcnt.set(count - 1);
        if count > 1 {
            return Ok(());
        }
        self.state.set(BufferState::Destroyed);
        self.payload.replace(Payload::Released);
        if let Some(owner) = self.owner.replace(Weak::new()).upgrade() {
            let mut slot = owner.buffer.borrow_mut();
            if slot.as_ref().map_or(false, |b| std::ptr::eq(&**b, self)) {
                *slot = None;
            }
        }
        log::debug!("{:?} buffer freed", self.kind);
        Ok(())
    }
}

impl Pixels {
    /// Releases one reference.
    ///
    /// For shared memory this detaches the segment.  For files and pixmaps
    /// it drops the reference count, freeing the buffer and detaching it from
    /// its handle when the count reaches zero.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if the buffer is no longer live, for
    /// instance because it has already been released for the last time.
    pub fn release(&self) -> Result<()> {
        let header = self.buffer.check_live()?;
        match header {
            Some(header) => self.buffer.release_shared(header),
            None => self.buffer.release_local(),
        }
    }

    /// Number of references to the buffer.  For shared memory this is the
    /// number of attachments the kernel knows of, across all processes.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if the buffer is no longer live.
    pub fn reference_count(&self) -> Result<usize> {
        self.buffer.check_live()?;
        match *self.buffer.payload.borrow() {
            Payload::Shared(ref attachment) => sysv::attach_count(attachment.shmid()),
            _ => Ok(self.buffer.refcnt.get()),
        }
    }

    /// The transport this buffer came from
    pub fn transport_kind(&self) -> TransportKind {
        self.buffer.kind
    }

    /// Lifecycle state of the buffer
    pub fn state(&self) -> BufferState {
        self.buffer.state.get()
    }

    /// Number of pixel bytes.  Zero once the buffer is destroyed.
    pub fn len(&self) -> usize {
        match *self.buffer.payload.borrow() {
            Payload::Local(ref bytes) => bytes.len(),
            Payload::Shared(ref attachment) => attachment.len().saturating_sub(ShmHeader::SIZE),
            Payload::Released => 0,
        }
    }

    /// True if there are no pixel bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pointer to the first pixel, or null once the buffer is destroyed.
    ///
    /// The pointer is valid for [`Pixels::len`] bytes until the buffer is
    /// released for the last time.  Shared memory behind it may change at
    /// any moment.
    pub fn as_ptr(&self) -> *const u8 {
        match *self.buffer.payload.borrow() {
            Payload::Local(ref bytes) => bytes.as_ptr(),
            // SAFETY: attachments are at least one header long
            Payload::Shared(ref attachment) => unsafe { attachment.as_ptr().add(ShmHeader::SIZE) },
            Payload::Released => std::ptr::null(),
        }
    }

    /// Copies the pixels into `dst`, returning the number of bytes copied
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if the buffer is no longer live.
    pub fn read_into(&self, dst: &mut [u8]) -> Result<usize> {
        self.buffer.check_live()?;
        match *self.buffer.payload.borrow() {
            Payload::Local(ref bytes) => {
                let count = bytes.len().min(dst.len());
                dst[..count].copy_from_slice(&bytes[..count]);
                Ok(count)
            }
            Payload::Shared(ref attachment) => Ok(attachment.copy_out(ShmHeader::SIZE, dst)),
            Payload::Released => Err(Error::InvalidParameter("buffer has been destroyed")),
        }
    }

    /// Copies the pixels into a new vector
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if the buffer is no longer live.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = vec![0; self.len()];
        let count = self.read_into(&mut out)?;
        out.truncate(count);
        Ok(out)
    }
}
