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

use super::*;
use crate::backend::ImageSource;
use crate::sysv::Segment;
use crate::ErrorKind;
use livebox_fb_proto::{BUFFER_CREATED, BUFFER_DESTROYED, BUFFER_TYPE_SHM};
use std::path::Path;

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
}

fn file_id(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn kind<T: std::fmt::Debug>(res: Result<T>) -> ErrorKind {
    res.expect_err("operation should have failed").kind()
}

#[derive(Default)]
struct MockSource {
    image: Vec<u8>,
    fetches: usize,
    fail: bool,
    broken: bool,
}

struct SharedMock(Rc<RefCell<MockSource>>);

impl ImageSource for SharedMock {
    fn fetch(
        &mut self,
        _pixmap: u32,
        _surface: &Surface,
        consume: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let image = {
            let mut mock = self.0.borrow_mut();
            mock.fetches += 1;
            if mock.fail {
                return Err(Error::fault("fetching the mock pixmap", "mock failure"));
            }
            mock.image.clone()
        };
        consume(&image)
    }

    fn is_healthy(&self) -> bool {
        !self.0.borrow().broken
    }
}

fn mock_context(image: Vec<u8>) -> (Rc<RefCell<MockSource>>, TransportContext) {
    let mock = Rc::new(RefCell::new(MockSource {
        image,
        ..Default::default()
    }));
    let ctx = TransportContext::with_image_source(SharedMock(mock.clone()));
    (mock, ctx)
}

#[test]
fn create_and_destroy_without_acquire() {
    for id in &["file:///nonexistent/box.raw", "pixmap://12:2", "shm://77"] {
        let fb = FrameBuffer::create(id, 8, 4).unwrap();
        assert_eq!(fb.identifier().as_str(), *id);
        assert!(!fb.has_buffer());
        fb.destroy();
    }
    let fb = FrameBuffer::create("PIXMAP://12:2", 8, 4).unwrap();
    assert_eq!(fb.transport_kind(), TransportKind::Pixmap);
    assert_eq!(fb.pixel_size(), 2);
    assert_eq!(fb.byte_size(), 64);
}

#[test]
fn bad_identifiers() {
    assert_eq!(kind(FrameBuffer::create("", 1, 1)), ErrorKind::InvalidIdentifier);
    assert_eq!(
        kind(FrameBuffer::create("http://x", 1, 1)),
        ErrorKind::InvalidIdentifier
    );
    let mut ctx = TransportContext::default();
    for id in &["pixmap://x", "pixmap://0", "shm://", "shm://-3", "shm://0"] {
        let fb = FrameBuffer::create(id, 1, 1).unwrap();
        assert!(!fb.is_ready());
        assert_eq!(kind(fb.acquire(&mut ctx)), ErrorKind::InvalidParameter);
    }
    assert!(!ctx.is_connected());
}

#[test]
fn oversized_surfaces() {
    assert_eq!(
        kind(FrameBuffer::create("file:///x", u32::MAX, u32::MAX)),
        ErrorKind::InvalidParameter
    );
}

#[cfg(target_pointer_width = "64")]
#[test]
fn unallocatable_buffers() {
    let fb = FrameBuffer::create("file:///x", u32::MAX, 600_000_000).unwrap();
    let mut ctx = TransportContext::default();
    assert_eq!(kind(fb.acquire(&mut ctx)), ErrorKind::OutOfMemory);
    assert!(!fb.has_buffer());
}

#[test]
fn sync_without_buffer() {
    let mut ctx = TransportContext::default();
    let fb = FrameBuffer::create("pixmap://5", 4, 4).unwrap();
    fb.sync_all(&mut ctx).unwrap();
    fb.sync(&mut ctx, Region::new(100, 100, 5, 5)).unwrap();
    assert!(!ctx.is_connected());
}

#[test]
fn file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("box.raw");
    let first = pattern(16, 1);
    std::fs::write(&path, &first).unwrap();

    let mut ctx = TransportContext::default();
    let fb = FrameBuffer::create(&file_id(&path), 2, 2).unwrap();
    assert!(fb.is_ready());
    let pixels = fb.acquire(&mut ctx).unwrap();
    assert!(fb.has_buffer());
    assert_eq!(pixels.transport_kind(), TransportKind::File);
    assert_eq!(pixels.state(), BufferState::Created);
    assert_eq!(pixels.len(), 16);
    assert_eq!(pixels.to_vec().unwrap(), first);

    let second = pattern(16, 100);
    std::fs::write(&path, &second).unwrap();
    fb.sync(&mut ctx, Region::new(1, 1, 1, 1)).unwrap();
    let mut expected = first.clone();
    expected[12..16].copy_from_slice(&second[12..16]);
    assert_eq!(pixels.to_vec().unwrap(), expected);
    fb.sync_all(&mut ctx).unwrap();
    assert_eq!(pixels.to_vec().unwrap(), second);

    // truncated by the producer: the bottom row keeps its old contents
    std::fs::write(&path, &pattern(8, 50)).unwrap();
    fb.sync(&mut ctx, Region::new(0, 0, 2, 2)).unwrap();
    let mut expected = pattern(8, 50);
    expected.extend_from_slice(&second[8..]);
    assert_eq!(pixels.to_vec().unwrap(), expected);

    assert_eq!(
        kind(fb.sync(&mut ctx, Region::new(1, 0, 2, 1))),
        ErrorKind::InvalidParameter
    );
    fb.sync(&mut ctx, Region::new(2, 2, 0, 0)).unwrap();
    pixels.release().unwrap();
    assert!(!fb.has_buffer());
    assert!(!ctx.is_connected());
}

#[test]
fn truncated_file_with_partial_sync() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("box.raw");
    let first = pattern(16, 1);
    std::fs::write(&path, &first).unwrap();
    let mut ctx = TransportContext::default();
    let fb = FrameBuffer::create(&file_id(&path), 2, 2).unwrap();
    let pixels = fb.acquire(&mut ctx).unwrap();

    // right column: rows cover bytes 4..8 and 12..16, the file now ends at 6
    let shorter = pattern(6, 111);
    std::fs::write(&path, &shorter).unwrap();
    fb.sync(&mut ctx, Region::new(1, 0, 1, 2)).unwrap();
    let mut expected = first.clone();
    expected[4..6].copy_from_slice(&shorter[4..6]);
    assert_eq!(pixels.to_vec().unwrap(), expected);

    // the file is gone entirely
    std::fs::remove_file(&path).unwrap();
    fb.sync(&mut ctx, Region::new(0, 1, 2, 1)).unwrap();
    assert_eq!(pixels.to_vec().unwrap(), expected);
    pixels.release().unwrap();
}

#[test]
fn missing_file_gives_zeroed_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let fb = FrameBuffer::create(&file_id(&dir.path().join("absent")), 3, 1).unwrap();
    assert!(!fb.is_ready());
    let pixels = fb.acquire(&mut TransportContext::default()).unwrap();
    assert_eq!(pixels.to_vec().unwrap(), vec![0; 12]);
    pixels.release().unwrap();
}

#[test]
fn reference_counting() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("box.raw");
    std::fs::write(&path, pattern(4, 0)).unwrap();
    let mut ctx = TransportContext::default();
    let fb = FrameBuffer::create(&file_id(&path), 1, 1).unwrap();

    let first = fb.acquire(&mut ctx).unwrap();
    let others: Vec<_> = (0..3).map(|_| fb.acquire(&mut ctx).unwrap()).collect();
    assert_eq!(first.reference_count().unwrap(), 4);
    assert_eq!(first.as_ptr(), others[2].as_ptr());

    for pixels in &others {
        pixels.release().unwrap();
    }
    assert_eq!(first.reference_count().unwrap(), 1);
    assert!(fb.has_buffer());
    first.release().unwrap();
    assert!(!fb.has_buffer());
    assert_eq!(first.state(), BufferState::Destroyed);
    assert!(first.is_empty());
    assert!(first.as_ptr().is_null());
    assert_eq!(kind(first.release()), ErrorKind::InvalidParameter);
    assert_eq!(kind(others[0].reference_count()), ErrorKind::InvalidParameter);
    assert_eq!(kind(first.to_vec()), ErrorKind::InvalidParameter);

    // a fresh buffer is allocated for the next acquire
    let again = fb.acquire(&mut ctx).unwrap();
    assert_eq!(again.reference_count().unwrap(), 1);
    assert_eq!(again.to_vec().unwrap(), pattern(4, 0));
    again.release().unwrap();
}

#[test]
fn buffers_outlive_their_handle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("box.raw");
    std::fs::write(&path, pattern(8, 9)).unwrap();
    let fb = FrameBuffer::create(&file_id(&path), 2, 1).unwrap();
    let pixels = fb.acquire(&mut TransportContext::default()).unwrap();
    let extra = fb.acquire(&mut TransportContext::default()).unwrap();
    fb.destroy();

    assert_eq!(pixels.to_vec().unwrap(), pattern(8, 9));
    extra.release().unwrap();
    assert_eq!(pixels.reference_count().unwrap(), 1);
    pixels.release().unwrap();
    assert_eq!(pixels.state(), BufferState::Destroyed);
    assert_eq!(kind(pixels.release()), ErrorKind::InvalidParameter);
}

#[test]
fn pixmap_transfers() {
    let (mock, mut ctx) = mock_context(pattern(16, 3));
    let fb = FrameBuffer::create("pixmap://4194305", 2, 2).unwrap();
    assert!(fb.is_ready());
    let pixels = fb.acquire(&mut ctx).unwrap();
    assert_eq!(mock.borrow().fetches, 1);
    assert_eq!(pixels.transport_kind(), TransportKind::Pixmap);
    assert_eq!(pixels.to_vec().unwrap(), pattern(16, 3));

    let shared = fb.acquire(&mut ctx).unwrap();
    assert_eq!(mock.borrow().fetches, 1);
    assert_eq!(shared.reference_count().unwrap(), 2);

    mock.borrow_mut().image = pattern(16, 200);
    fb.sync(&mut ctx, Region::new(0, 1, 1, 1)).unwrap();
    assert_eq!(mock.borrow().fetches, 2);
    let mut expected = pattern(16, 3);
    expected[8..12].copy_from_slice(&pattern(16, 200)[8..12]);
    assert_eq!(pixels.to_vec().unwrap(), expected);

    // empty regions are not transferred
    fb.sync(&mut ctx, Region::new(1, 1, 0, 1)).unwrap();
    assert_eq!(mock.borrow().fetches, 2);

    shared.release().unwrap();
    pixels.release().unwrap();
    assert!(!fb.has_buffer());
    assert!(ctx.is_connected());
}

#[test]
fn failed_pixmap_transfers() {
    let (mock, mut ctx) = mock_context(pattern(16, 0));
    let fb = FrameBuffer::create("pixmap://7", 2, 2).unwrap();
    mock.borrow_mut().fail = true;
    assert_eq!(kind(fb.acquire(&mut ctx)), ErrorKind::Fault);
    assert!(!fb.has_buffer());
    assert!(ctx.is_connected());

    mock.borrow_mut().fail = false;
    let pixels = fb.acquire(&mut ctx).unwrap();
    assert_eq!(pixels.reference_count().unwrap(), 1);

    // a broken connection is dropped, the buffer is kept
    {
        let mut mock = mock.borrow_mut();
        mock.fail = true;
        mock.broken = true;
    }
    assert_eq!(kind(fb.sync_all(&mut ctx)), ErrorKind::Fault);
    assert!(!ctx.is_connected());
    assert!(fb.has_buffer());
    assert_eq!(pixels.to_vec().unwrap(), pattern(16, 0));
    pixels.release().unwrap();
}

#[test]
fn short_pixmap_images() {
    let (_mock, mut ctx) = mock_context(pattern(10, 0));
    let fb = FrameBuffer::create("pixmap://7", 2, 2).unwrap();
    assert_eq!(kind(fb.acquire(&mut ctx)), ErrorKind::Fault);
    assert!(!fb.has_buffer());
}

/// Creates a segment with a non-zero ID.  A segment that got ID 0 is
/// returned too and must be kept alive, or the kernel may hand 0 out again.
fn nonzero_segment(size: usize) -> (Segment, Option<Segment>) {
    let segment = Segment::create(size).unwrap();
    if segment.id() != 0 {
        return (segment, None);
    }
    (Segment::create(size).unwrap(), Some(segment))
}

/// A producer-side segment holding a header and `payload`
struct Producer {
    segment: Segment,
    mapping: Attachment,
    _zero: Option<Segment>,
}

impl Producer {
    fn new(payload: &[u8]) -> Self {
        let (segment, zero) = nonzero_segment(ShmHeader::SIZE + payload.len());
        let mapping = Attachment::attach(segment.id(), false).unwrap();
        let producer = Self {
            segment,
            mapping,
            _zero: zero,
        };
        producer.write(ShmHeader::SIZE, payload);
        producer.set_header(BUFFER_CREATED, BUFFER_TYPE_SHM);
        producer
    }

    fn write(&self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= self.mapping.len());
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                (self.mapping.as_ptr() as *mut u8).add(offset),
                bytes.len(),
            )
        }
    }

    fn set_header(&self, state: u32, ty: u32) {
        let header = ShmHeader {
            state,
            ty,
            refcnt: 1,
            ..Default::default()
        };
        self.write(0, header.as_bytes());
    }

    fn id(&self) -> String {
        format!("shm://{}", self.segment.id())
    }
}

#[test]
fn shared_memory_attachments() {
    let producer = Producer::new(&pattern(16, 5));
    let shmid = producer.segment.id();
    let mut ctx = TransportContext::default();
    let fb = FrameBuffer::create(&producer.id(), 2, 2).unwrap();
    assert!(fb.is_ready());

    let first = fb.acquire(&mut ctx).unwrap();
    let second = fb.acquire(&mut ctx).unwrap();
    assert!(!fb.has_buffer());
    assert_eq!(first.transport_kind(), TransportKind::SharedMemory);
    assert_eq!(first.len(), 16);
    assert_eq!(first.to_vec().unwrap(), pattern(16, 5));
    assert_eq!(first.reference_count().unwrap(), 3);

    // producer writes show up without syncing
    producer.write(ShmHeader::SIZE, &[0xff; 4]);
    fb.sync_all(&mut ctx).unwrap();
    assert_eq!(&second.to_vec().unwrap()[..4], &[0xff; 4][..]);

    first.release().unwrap();
    assert_eq!(first.state(), BufferState::Destroyed);
    assert_eq!(kind(first.release()), ErrorKind::InvalidParameter);
    assert_eq!(second.reference_count().unwrap(), 2);

    producer.set_header(BUFFER_DESTROYED, BUFFER_TYPE_SHM);
    assert_eq!(kind(second.release()), ErrorKind::InvalidParameter);
    assert_eq!(kind(second.reference_count()), ErrorKind::InvalidParameter);
    drop(second);
    assert_eq!(sysv::attach_count(shmid).unwrap(), 1);
    assert!(!ctx.is_connected());
}

#[test]
fn shared_memory_with_unexpected_headers() {
    let producer = Producer::new(&pattern(4, 0));
    let fb = FrameBuffer::create(&producer.id(), 1, 1).unwrap();
    let mut ctx = TransportContext::default();

    producer.set_header(0, 0);
    let stale = fb.acquire(&mut ctx).unwrap();
    assert_eq!(kind(stale.release()), ErrorKind::InvalidParameter);

    producer.set_header(BUFFER_CREATED, 42);
    stale.release().unwrap();
    assert_eq!(sysv::attach_count(producer.segment.id()).unwrap(), 1);
}

#[test]
fn shared_memory_too_small_for_header() {
    let (segment, _zero) = nonzero_segment(8);
    let fb = FrameBuffer::create(&format!("shm://{}", segment.id()), 1, 1).unwrap();
    assert_eq!(
        kind(fb.acquire(&mut TransportContext::default())),
        ErrorKind::Fault
    );
    assert_eq!(sysv::attach_count(segment.id()).unwrap(), 0);
}

#[test]
fn shared_memory_without_segment() {
    let (segment, _zero) = nonzero_segment(64);
    let id = format!("shm://{}", segment.id());
    drop(segment);
    let fb = FrameBuffer::create(&id, 1, 1).unwrap();
    assert_eq!(
        kind(fb.acquire(&mut TransportContext::default())),
        ErrorKind::Fault
    );
}
