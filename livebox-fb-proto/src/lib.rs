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

//! Layout definitions shared between the widget producer and the viewer.
//! This crate does no I/O.
//!
//! # Identifiers
//!
//! A surface is named by a schema-prefixed string.  The producer hands these
//! strings to the viewer over the control plane, and the viewer uses the
//! schema to pick a transport:
//!
//! - [`SCHEMA_FILE`]: the producer writes raw pixels into a regular file.
//! - [`SCHEMA_PIXMAP`]: the pixels live in an X11 pixmap on the server.  An
//!   optional `:<n>` suffix overrides the number of bytes per pixel.
//! - [`SCHEMA_SHM`]: the pixels live in a System V shared memory segment,
//!   prefixed by a [`ShmHeader`].
//!
//! # Shared memory
//!
//! The producer owns the segment and may modify it at any time, without any
//! synchronization.  Nothing in the header can be trusted; the viewer reads
//! it once per operation and validates every tag.  All values are in native
//! byte order.

#![forbid(missing_docs)]
#![no_std]

/// Schema of identifiers backed by a regular file
pub const SCHEMA_FILE: &str = "file://";

/// Schema of identifiers backed by an X11 pixmap
pub const SCHEMA_PIXMAP: &str = "pixmap://";

/// Schema of identifiers backed by a System V shared memory segment
pub const SCHEMA_SHM: &str = "shm://";

/// Bytes per pixel when the identifier does not say otherwise.  This is the
/// size of a C `int`, which is what producers have always assumed.
pub const DEFAULT_PIXEL_SIZE: usize = core::mem::size_of::<core::ffi::c_int>();

/// A type that can be viewed as raw bytes, and filled from raw bytes.
///
/// # Safety
///
/// This trait MUST NOT be implemented on any type that contains padding, or
/// that has invalid bit patterns.  Use [`castable!`] instead of implementing
/// it by hand.
pub unsafe trait Castable: Sized {
    /// The size of the type.  MUST be equal to [`core::mem::size_of`].
    const SIZE: usize;

    /// Views `self` as bytes, without copying.
    fn as_bytes(&self) -> &[u8] {
        // SAFETY: by the contract of `Castable`, `self` has no padding bytes.
        unsafe { core::slice::from_raw_parts(self as *const Self as *const u8, Self::SIZE) }
    }

    /// Views `self` as mutable bytes, without copying.
    fn as_mut_bytes(&mut self) -> &mut [u8] {
        // SAFETY: any bit pattern is valid for a `Castable` type, so writing
        // through the slice cannot put `self` in an invalid state.
        unsafe { core::slice::from_raw_parts_mut(self as *mut Self as *mut u8, Self::SIZE) }
    }
}

macro_rules! unsafe_impl_castable {
    ($($i: ty),*) => {$(
        unsafe impl Castable for $i {
            const SIZE: usize = core::mem::size_of::<$i>();
        }
    )*};
}

unsafe_impl_castable!(u8, u16, u32, u64, i8, i16, i32, i64);

/// Define a `#[repr(C)]` struct that implements [`Castable`].  Compilation
/// fails if the compiler would have to insert padding, or if a field is not
/// itself [`Castable`].
///
/// ```rust
/// # use livebox_fb_proto::castable;
/// castable! {
///     /// A struct
///     pub struct Test {
///         /// First field
///         a: u32,
///         /// Second field
///         b: u32,
///     }
/// }
/// ```
///
/// Padding is rejected:
///
/// ```rust,compile_fail
/// # use livebox_fb_proto::castable;
/// castable! {
///     /// A struct
///     pub struct Test {
///         /// First field
///         a: u32,
///         /// Second field
///         b: u64,
///     }
/// }
/// ```
#[macro_export]
macro_rules! castable {
    ($($(#[doc = $m: expr])*
    $p: vis struct $s: ident {
        $(
            $(#[doc = $n: expr])*
            $name: ident : $ty : ty
        ),*$(,)?
    })+) => {
        $(
        #[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
        $(#[doc = $m])*
        #[repr(C)]
        $p struct $s {
            $(
                $(#[doc = $n])*
                pub $name : $ty
            ),*
        }
        unsafe impl $crate::Castable for $s {
            const SIZE: usize = {
                const SIZE: usize = $(<$ty as $crate::Castable>::SIZE +)* 0;
                let _: [u8; ::core::mem::size_of::<$s>()] = [0u8; SIZE];
                SIZE
            };
        }
        )+
    }
}

macro_rules! enum_const {
    (
        #[repr($t: ident)]
        $(#[$i: meta])*
        $p: vis enum $n: ident {
            $(
                $(#[$j: meta])*
                ($const_name: ident, $variant_name: ident) = $e: expr
            ),*$(,)?
        }
    ) => {
        $(#[$i])*
        #[repr($t)]
        #[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
        $p enum $n {
            $(
                $(#[$j])*
                $variant_name = $e,
            )*
        }

        $(
            $(#[$j])*
            $p const $const_name: $t = $n::$variant_name as $t;
        )*

        impl $n {
            /// Converts an untrusted raw tag, returning `None` if the tag is
            /// not known.
            pub fn from_raw(raw: $t) -> Option<Self> {
                match raw {
                    $($const_name => Some(Self::$variant_name),)*
                    _ => None,
                }
            }
        }
    }
}

enum_const! {
    #[repr(u32)]
    /// Lifecycle tags of a buffer.  The odd values make a zeroed or recycled
    /// header easy to tell apart from a live one.
    pub enum BufferState {
        /// The buffer is live
        (BUFFER_CREATED, Created) = 0x00be_ef00,
        /// The buffer has been released for the last time
        (BUFFER_DESTROYED, Destroyed) = 0x00de_ad00,
    }
}

enum_const! {
    #[repr(u32)]
    /// Transport tags, as stored in [`ShmHeader::ty`]
    pub enum BufferType {
        /// Pixels read from a regular file
        (BUFFER_TYPE_FILE, File) = 0,
        /// Pixels attached from a System V shared memory segment
        (BUFFER_TYPE_SHM, Shm) = 1,
        /// Pixels copied out of an X11 pixmap
        (BUFFER_TYPE_PIXMAP, Pixmap) = 2,
        /// The producer failed to set the buffer up
        (BUFFER_TYPE_ERROR, Error) = 3,
    }
}

castable! {
    /// The header at the start of every shared memory segment.  The pixel
    /// payload starts immediately after it, at offset [`ShmHeader::SIZE`].
    pub struct ShmHeader {
        /// UNTRUSTED lifecycle tag.  See [`BufferState`].
        state: u32,
        /// UNTRUSTED transport tag.  See [`BufferType`].
        ty: u32,
        /// Reference count kept by the producer.  Informational only: the
        /// kernel's attach count is authoritative for the viewer.
        refcnt: i32,
        /// Must be ignored.  Keeps `info` 8-byte aligned.
        reserved: u32,
        /// Opaque producer-side back-pointer.  MUST NOT be dereferenced.
        info: u64,
    }
}

impl ShmHeader {
    /// Reads a header from the start of `bytes`, or returns `None` if there
    /// are not enough bytes.
    pub fn read_from(bytes: &[u8]) -> Option<Self> {
        let mut header = Self::default();
        let size = header.as_bytes().len();
        header.as_mut_bytes().copy_from_slice(bytes.get(..size)?);
        Some(header)
    }

    /// The lifecycle tag, or `None` if it is not a known value
    pub fn state(&self) -> Option<BufferState> {
        BufferState::from_raw(self.state)
    }

    /// The transport tag, or `None` if it is not a known value
    pub fn buffer_type(&self) -> Option<BufferType> {
        BufferType::from_raw(self.ty)
    }

    /// True if the producer has marked this segment as a live shared memory
    /// buffer
    pub fn is_live_shm(&self) -> bool {
        self.state() == Some(BufferState::Created) && self.buffer_type() == Some(BufferType::Shm)
    }
}
