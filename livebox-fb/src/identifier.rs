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

//! Surface identifiers.
//!
//! Identifiers come from the producer and are not trusted.  The schema is
//! matched case-insensitively; the numeric parts must be plain decimal.

use crate::{Error, Result};
use livebox_fb_proto::{DEFAULT_PIXEL_SIZE, SCHEMA_FILE, SCHEMA_PIXMAP, SCHEMA_SHM};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The transport selected by an identifier's schema
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TransportKind {
    /// `file://`
    File,
    /// `pixmap://`
    Pixmap,
    /// `shm://`
    SharedMemory,
}

impl TransportKind {
    /// Resolves the schema of `identifier`
    pub fn of(identifier: &str) -> Option<Self> {
        [
            (SCHEMA_FILE, TransportKind::File),
            (SCHEMA_PIXMAP, TransportKind::Pixmap),
            (SCHEMA_SHM, TransportKind::SharedMemory),
        ]
        .iter()
        .find(|(schema, _)| has_prefix(identifier, schema))
        .map(|&(_, kind)| kind)
    }

    /// The schema string, including the `://`
    pub fn schema(self) -> &'static str {
        match self {
            TransportKind::File => SCHEMA_FILE,
            TransportKind::Pixmap => SCHEMA_PIXMAP,
            TransportKind::SharedMemory => SCHEMA_SHM,
        }
    }
}

/// A parsed identifier.  `None` in a handle slot means the identifier had a
/// known schema but an unparsable handle.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Transport {
    /// Pixels are read from a regular file
    File {
        /// Path to the file
        path: PathBuf,
    },
    /// Pixels are copied out of an X11 pixmap
    Pixmap {
        /// The pixmap XID
        pixmap: Option<u32>,
        /// Bytes per pixel
        pixel_size: usize,
    },
    /// Pixels are attached from a System V shared memory segment
    SharedMemory {
        /// The segment ID
        shmid: Option<i32>,
    },
}

impl Transport {
    /// The kind of this transport
    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::File { .. } => TransportKind::File,
            Transport::Pixmap { .. } => TransportKind::Pixmap,
            Transport::SharedMemory { .. } => TransportKind::SharedMemory,
        }
    }

    /// Bytes per pixel implied by this transport
    pub fn pixel_size(&self) -> usize {
        match *self {
            Transport::Pixmap { pixel_size, .. } => pixel_size,
            _ => DEFAULT_PIXEL_SIZE,
        }
    }
}

/// An immutable, schema-prefixed surface identifier
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Identifier {
    raw: String,
    transport: Transport,
}

impl Identifier {
    /// Parses an identifier, failing if any part of it is malformed.
    pub fn parse(identifier: &str) -> Result<Self> {
        let parsed = Self::resolve_lenient(identifier)?;
        let complete = match &parsed.transport {
            Transport::Pixmap { pixmap, .. } => pixmap.is_some(),
            Transport::SharedMemory { shmid } => shmid.is_some(),
            Transport::File { path } => !path.as_os_str().is_empty(),
        };
        if complete {
            Ok(parsed)
        } else {
            Err(Error::InvalidIdentifier(identifier.to_owned()))
        }
    }

    /// Resolves the schema of an identifier, tolerating a malformed handle.
    /// Fails only if the identifier is empty or has no known schema.
    pub fn resolve_lenient(identifier: &str) -> Result<Self> {
        let kind = TransportKind::of(identifier)
            .ok_or_else(|| Error::InvalidIdentifier(identifier.to_owned()))?;
        let rest = &identifier[kind.schema().len()..];
        let transport = match kind {
            TransportKind::File => Transport::File {
                path: PathBuf::from(rest),
            },
            TransportKind::Pixmap => match parse_pixmap(rest) {
                Some((pixmap, pixel_size)) => Transport::Pixmap {
                    pixmap: Some(pixmap),
                    pixel_size,
                },
                None => Transport::Pixmap {
                    pixmap: None,
                    pixel_size: DEFAULT_PIXEL_SIZE,
                },
            },
            TransportKind::SharedMemory => Transport::SharedMemory {
                shmid: parse_decimal(rest),
            },
        };
        log::debug!("identifier {:?} resolved to {:?}", identifier, transport);
        Ok(Self {
            raw: identifier.to_owned(),
            transport,
        })
    }

    /// The identifier exactly as it was provided
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The parsed transport
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// The transport kind
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// The backing path, for `file://` identifiers
    pub fn path(&self) -> Option<&Path> {
        match self.transport {
            Transport::File { ref path } => Some(path),
            _ => None,
        }
    }
}

impl FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn has_prefix(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// `<handle>:<depth>` is tried before `<handle>`.  A bad depth falls back to
/// the default rather than rejecting the handle.
fn parse_pixmap(s: &str) -> Option<(u32, usize)> {
    if let Some((handle, depth)) = split_once(s, ':') {
        let depth = parse_decimal(depth)
            .filter(|&d: &usize| d != 0)
            .unwrap_or_else(|| {
                log::debug!("ignoring bad pixmap depth {:?}", depth);
                DEFAULT_PIXEL_SIZE
            });
        return Some((parse_decimal(handle)?, depth));
    }
    Some((parse_decimal(s)?, DEFAULT_PIXEL_SIZE))
}

fn split_once(s: &str, delimiter: char) -> Option<(&str, &str)> {
    let index = s.find(delimiter)?;
    Some((&s[..index], &s[index + delimiter.len_utf8()..]))
}

fn parse_decimal<T: FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
