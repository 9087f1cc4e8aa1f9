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

use super::TransportBackend;
use crate::context::TransportContext;
use crate::sync::{Region, Surface};
use crate::Result;

/// Surfaces backed by a producer-owned System V segment.  The attachment
/// already shows the producer's latest writes, so there is nothing to sync.
pub(super) struct ShmBackend {
    pub(super) shmid: Option<i32>,
}

impl TransportBackend for ShmBackend {
    fn is_ready(&self) -> bool {
        self.shmid.map_or(false, |shmid| shmid != 0)
    }

    fn sync(&self, _: &mut TransportContext, _: &Surface, _: Region, _: &mut [u8]) -> Result<()> {
        Ok(())
    }
}
