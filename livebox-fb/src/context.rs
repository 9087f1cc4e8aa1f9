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

//! Per-viewer transport state.
//!
//! A [`TransportContext`] holds the display connection used for pixmap
//! transfers.  It is created by the viewer and passed to every operation that
//! may talk to the display server; nothing here is global.

use crate::backend::ImageSource;
use crate::Result;
use std::fmt;

/// Environment variable naming the display used for pixmap transfers.
/// Takes precedence over `DISPLAY`.
pub const DISPLAY_ENV: &str = "LIVEBOX_FB_DISPLAY";

/// Environment variable holding the number of connection attempts
pub const CONNECT_ATTEMPTS_ENV: &str = "LIVEBOX_FB_CONNECT_ATTEMPTS";

/// Transport configuration
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Display to connect to.  `None` means the platform default.
    pub display: Option<String>,
    /// How many times to try connecting to the display before giving up.
    /// Zero is treated as one.
    pub connect_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display: None,
            connect_attempts: 1,
        }
    }
}

impl Config {
    /// Reads the configuration from the environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let display = lookup(DISPLAY_ENV)
            .or_else(|| lookup("DISPLAY"))
            .filter(|d| !d.is_empty());
        let connect_attempts = match lookup(CONNECT_ATTEMPTS_ENV) {
            None => 1,
            Some(s) => s.trim().parse().unwrap_or_else(|_| {
                log::warn!("ignoring bad {} value {:?}", CONNECT_ATTEMPTS_ENV, s);
                1
            }),
        };
        Self {
            display,
            connect_attempts,
        }
    }
}

/// State shared by all frame buffers of one viewer
#[derive(Default)]
pub struct TransportContext {
    config: Config,
    source: Option<Box<dyn ImageSource>>,
}

impl fmt::Debug for TransportContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportContext")
            .field("config", &self.config)
            .field("connected", &self.source.is_some())
            .finish()
    }
}

impl TransportContext {
    /// Creates a context.  The display is not contacted until the first
    /// pixmap transfer.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            source: None,
        }
    }

    /// Creates a context that transfers pixmaps through `source`
    pub fn with_image_source(source: impl ImageSource + 'static) -> Self {
        Self {
            config: Config::default(),
            source: Some(Box::new(source)),
        }
    }

    /// The configuration of this context
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// True if an image source is currently open
    pub fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    /// Returns the image source, connecting to the display first if needed
    pub(crate) fn image_source(&mut self) -> Result<&mut dyn ImageSource> {
        let source = match self.source.take() {
            Some(source) => source,
            None => self.connect()?,
        };
        Ok(&mut **self.source.insert(source))
    }

    pub(crate) fn discard_image_source(&mut self) {
        self.source = None;
    }

    #[cfg(feature = "x11")]
    fn connect(&self) -> Result<Box<dyn ImageSource>> {
        use crate::backend::x11::XShmSource;
        let attempts = self.config.connect_attempts.max(1);
        let mut attempt = 1;
        loop {
            match XShmSource::connect(self.config.display.as_deref()) {
                Ok(source) => break Ok(Box::new(source) as Box<dyn ImageSource>),
                Err(e) if attempt < attempts => {
                    log::warn!("display connection attempt {} failed: {}", attempt, e);
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        }
    }

    #[cfg(not(feature = "x11"))]
    fn connect(&self) -> Result<Box<dyn ImageSource>> {
        Err(crate::Error::NotSupported("pixmap transfer without X11 support"))
    }
}
