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

use std::io;

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by frame buffer operations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The identifier is empty or has no known schema
    #[error("invalid buffer identifier {0:?}")]
    InvalidIdentifier(String),
    /// A bad handle, a malformed identifier, or an operation on a buffer that
    /// has already been destroyed
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    /// Allocating a buffer or a transfer image failed
    #[error("out of memory allocating {0} bytes")]
    OutOfMemory(usize),
    /// The display or the kernel failed in a way that cannot be recovered
    /// from within the current call
    #[error("{what} failed: {source}")]
    Fault {
        /// The operation that failed
        what: &'static str,
        /// The underlying error
        #[source]
        source: BoxedSource,
    },
    /// The transport is not available in this build
    #[error("{0} is not supported")]
    NotSupported(&'static str),
}

/// The kind of an [`Error`], for callers that only need to branch on it
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// See [`Error::InvalidIdentifier`]
    InvalidIdentifier,
    /// See [`Error::InvalidParameter`]
    InvalidParameter,
    /// See [`Error::OutOfMemory`]
    OutOfMemory,
    /// See [`Error::Fault`]
    Fault,
    /// See [`Error::NotSupported`]
    NotSupported,
}

impl Error {
    /// Returns the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            Error::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Error::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Error::Fault { .. } => ErrorKind::Fault,
            Error::NotSupported(_) => ErrorKind::NotSupported,
        }
    }

    pub(crate) fn fault(what: &'static str, source: impl Into<BoxedSource>) -> Self {
        Error::Fault {
            what,
            source: source.into(),
        }
    }

    /// Wraps the current `errno`
    pub(crate) fn last_os_error(what: &'static str) -> Self {
        Self::fault(what, io::Error::last_os_error())
    }
}

/// Result type of this crate
pub type Result<T> = std::result::Result<T, Error>;
