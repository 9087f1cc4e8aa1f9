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

//! Viewer-side access to frame buffers rendered by a widget producer.
//!
//! The producer names each surface with an identifier such as
//! `file:///var/run/box/42.raw`, `pixmap://4194305:4` or `shm://131074`.  A
//! viewer creates a [`FrameBuffer`] for the identifier, [acquires] the
//! pixels, and [syncs] them whenever the producer reports an update.
//!
//! ```rust,no_run
//! use livebox_fb::{Config, FrameBuffer, Region, TransportContext};
//!
//! # fn main() -> livebox_fb::Result<()> {
//! let mut ctx = TransportContext::new(Config::from_env());
//! let fb = FrameBuffer::create("file:///tmp/box.raw", 64, 64)?;
//! let pixels = fb.acquire(&mut ctx)?;
//! fb.sync(&mut ctx, Region::new(0, 0, 16, 16))?;
//! println!("{} bytes", pixels.len());
//! pixels.release()?;
//! # Ok(())
//! # }
//! ```
//!
//! Nothing here is thread safe.  A viewer drives all of its frame buffers
//! from one thread.
//!
//! [acquires]: FrameBuffer::acquire
//! [syncs]: FrameBuffer::sync

#![forbid(missing_docs)]

pub mod backend;
pub mod context;
mod error;
mod handle;
pub mod identifier;
pub mod sync;
mod sysv;

pub use context::{Config, TransportContext};
pub use error::{Error, ErrorKind, Result};
pub use handle::{FrameBuffer, Pixels};
pub use identifier::{Identifier, Transport, TransportKind};
pub use livebox_fb_proto::{self as proto, BufferState};
pub use sync::{sync, Region, Surface};
