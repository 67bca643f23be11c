//! Growable GPU buffer with scoped CPU writes.
//!
//! GL cannot keep a buffer mapped across draws, so writes go into a CPU
//! staging store through [`DynamicBuffer::map`] / [`DynamicBuffer::unmap`]
//! and [`DynamicBuffer::upload`] copies the most recent range to the GPU.

use bytemuck::Pod;
use tracing::debug;

use crate::{BufferKind, BufferUsageHint, GraphicsBackend, Result, VisualiserError};

#[derive(Debug)]
pub struct DynamicBuffer<B: GraphicsBackend> {
    handle: B::Buffer,
    kind: BufferKind,
    hint: BufferUsageHint,
    staging: Vec<u8>,
    gpu_capacity: u32,
    offset: u32,
    mapped_size: u32,
    last_offset: u32,
    last_size: u32,
    mapped: bool,
    dirty: bool,
}

impl<B: GraphicsBackend> DynamicBuffer<B> {
    pub fn new(
        backend: &mut B,
        capacity: u32,
        kind: BufferKind,
        hint: BufferUsageHint,
    ) -> Result<Self> {
        let handle = backend.create_buffer()?;
        backend.allocate_buffer(handle, kind, capacity, hint);
        Ok(Self {
            handle,
            kind,
            hint,
            staging: vec![0; capacity as usize],
            gpu_capacity: capacity,
            offset: 0,
            mapped_size: 0,
            last_offset: 0,
            last_size: 0,
            mapped: false,
            dirty: false,
        })
    }

    pub fn handle(&self) -> B::Buffer {
        self.handle
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn hint(&self) -> BufferUsageHint {
        self.hint
    }

    /// Total size in bytes.
    pub fn capacity(&self) -> u32 {
        self.staging.len() as u32
    }

    /// Where the next mapping starts.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// `(offset, size)` in bytes of the range written by the last mapping.
    pub fn last_written(&self) -> (u32, u32) {
        (self.last_offset, self.last_size)
    }

    /// Reserves room for `elements` values of `element_size` bytes and
    /// returns the writable bytes with the offset they will have on the GPU.
    ///
    /// Grows the buffer when the request does not fit. Fails without side
    /// effects if the buffer is already mapped.
    pub fn map(&mut self, elements: u32, element_size: u32) -> Result<(&mut [u8], u32)> {
        if self.mapped {
            return Err(VisualiserError::BufferUsage("buffer is already mapped"));
        }
        let size = elements
            .checked_mul(element_size)
            .ok_or(VisualiserError::BufferUsage("mapping size overflows"))?;

        let remaining = self.capacity() - self.offset;
        if size > remaining {
            let grown = self
                .capacity()
                .checked_add(size)
                .ok_or(VisualiserError::BufferUsage("buffer size overflows"))?;
            debug!(from = self.capacity(), to = grown, kind = ?self.kind, "growing buffer");
            self.ensure_size(grown);
        }

        self.mapped = true;
        self.mapped_size = size;
        let start = self.offset as usize;
        Ok((&mut self.staging[start..start + size as usize], self.offset))
    }

    /// Ends the current mapping and records its range for the next upload
    /// and draw. Does nothing when not mapped.
    pub fn unmap(&mut self) {
        if !self.mapped {
            return;
        }
        self.mapped = false;
        self.last_offset = self.offset;
        self.last_size = self.mapped_size;
        self.offset += self.mapped_size;
        self.mapped_size = 0;
        self.dirty = true;
    }

    /// Maps, copies `items` and unmaps. Returns the byte offset of the data.
    pub fn write<T: Pod>(&mut self, items: &[T]) -> Result<u32> {
        let elements = u32::try_from(items.len())
            .map_err(|_| VisualiserError::BufferUsage("too many elements to map"))?;
        let element_size = u32::try_from(std::mem::size_of::<T>())
            .map_err(|_| VisualiserError::BufferUsage("element type too large"))?;
        let bytes: &[u8] = bytemuck::cast_slice(items);
        let (target, offset) = self.map(elements, element_size)?;
        target.copy_from_slice(bytes);
        self.unmap();
        Ok(offset)
    }

    /// Grows the buffer to at least `size` bytes. Never shrinks.
    pub fn ensure_size(&mut self, size: u32) {
        if size as usize > self.staging.len() {
            self.staging.resize(size as usize, 0);
        }
    }

    /// Starts writing from the beginning of the buffer again.
    pub fn reset(&mut self) -> Result<()> {
        if self.mapped {
            return Err(VisualiserError::BufferUsage("cannot reset a mapped buffer"));
        }
        self.offset = 0;
        Ok(())
    }

    /// Copies pending writes to the GPU store.
    ///
    /// Only the last written range is sent unless the buffer grew since the
    /// last upload, in which case the GPU store is reallocated and refilled.
    pub fn upload(&mut self, backend: &mut B) -> Result<()> {
        if self.mapped {
            return Err(VisualiserError::BufferUsage("upload while mapped"));
        }
        if self.gpu_capacity < self.capacity() {
            backend.allocate_buffer(self.handle, self.kind, self.capacity(), self.hint);
            backend.write_buffer(self.handle, self.kind, 0, &self.staging);
            self.gpu_capacity = self.capacity();
        } else if self.dirty && self.last_size > 0 {
            let start = self.last_offset as usize;
            let end = start + self.last_size as usize;
            backend.write_buffer(self.handle, self.kind, self.last_offset, &self.staging[start..end]);
        }
        self.dirty = false;
        Ok(())
    }

    pub fn bind(&self, backend: &mut B) {
        backend.bind_buffer(self.kind, Some(self.handle));
    }

    pub fn unbind(&self, backend: &mut B) {
        backend.bind_buffer(self.kind, None);
    }

    pub fn destroy(self, backend: &mut B) {
        backend.delete_buffer(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeadlessBackend;

    fn vertex_buffer(gpu: &mut HeadlessBackend, capacity: u32) -> DynamicBuffer<HeadlessBackend> {
        DynamicBuffer::new(gpu, capacity, BufferKind::Vertex, BufferUsageHint::Dynamic).unwrap()
    }

    #[test]
    fn growth_keeps_kind_and_hint() {
        let mut gpu = HeadlessBackend::new();
        let mut buffer =
            DynamicBuffer::new(&mut gpu, 16, BufferKind::Index, BufferUsageHint::Stream).unwrap();
        buffer.ensure_size(64);
        assert_eq!(buffer.capacity(), 64);

        let (bytes, offset) = buffer.map(25, 4).unwrap();
        assert_eq!(bytes.len(), 100);
        assert_eq!(offset, 0);
        buffer.unmap();

        assert!(buffer.capacity() >= 100);
        assert_eq!(buffer.kind(), BufferKind::Index);
        buffer.upload(&mut gpu).unwrap();
        assert_eq!(gpu.buffer_hint(buffer.handle()), Some(BufferUsageHint::Stream));
        assert_eq!(gpu.buffer_data(buffer.handle()).unwrap().len(), buffer.capacity() as usize);
    }

    #[test]
    fn ensure_size_is_grow_only_and_idempotent() {
        let mut gpu = HeadlessBackend::new();
        let mut buffer = vertex_buffer(&mut gpu, 64);
        buffer.ensure_size(32);
        assert_eq!(buffer.capacity(), 64);
        buffer.ensure_size(128);
        buffer.ensure_size(128);
        assert_eq!(buffer.capacity(), 128);
    }

    #[test]
    fn second_map_is_rejected_and_keeps_the_offset() {
        let mut gpu = HeadlessBackend::new();
        let mut buffer = vertex_buffer(&mut gpu, 64);
        buffer.map(2, 4).unwrap();
        buffer.unmap();

        let (_, first) = buffer.map(2, 4).unwrap();
        assert_eq!(first, 8);
        let err = buffer.map(2, 4).unwrap_err();
        assert!(matches!(err, VisualiserError::BufferUsage(_)));
        assert_eq!(buffer.offset(), first);
        assert!(buffer.is_mapped());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn oversized_write_is_rejected_before_mapping() {
        let mut gpu = HeadlessBackend::new();
        let mut buffer = vertex_buffer(&mut gpu, 64);
        // A slice of zero-sized elements needs no backing memory.
        let len = u32::MAX as usize + 1;
        let huge: &[()] =
            unsafe { std::slice::from_raw_parts(std::ptr::NonNull::<()>::dangling().as_ptr(), len) };

        let err = buffer.write(huge).unwrap_err();
        assert!(matches!(err, VisualiserError::BufferUsage(_)));
        assert!(!buffer.is_mapped());
        assert_eq!(buffer.offset(), 0);
    }

    #[test]
    fn unmap_without_map_is_harmless() {
        let mut gpu = HeadlessBackend::new();
        let mut buffer = vertex_buffer(&mut gpu, 64);
        buffer.unmap();
        assert_eq!(buffer.last_written(), (0, 0));
        assert_eq!(buffer.offset(), 0);
    }

    #[test]
    fn upload_sends_only_the_last_range() {
        let mut gpu = HeadlessBackend::new();
        let mut buffer = vertex_buffer(&mut gpu, 64);

        let values = [1.0f32, 2.0, 3.0];
        let first = buffer.write(&values).unwrap();
        let second = buffer.write(&values).unwrap();
        assert_eq!((first, second), (0, 12));

        let capacity = buffer.capacity();
        buffer.upload(&mut gpu).unwrap();
        assert_eq!(buffer.capacity(), capacity);
        assert_eq!(gpu.buffer_writes(buffer.handle()), [(12, 12)]);

        let (offset, size) = buffer.last_written();
        assert!(offset + size <= buffer.capacity());
        let stored = &gpu.buffer_data(buffer.handle()).unwrap()[12..24];
        assert_eq!(stored, bytemuck::cast_slice::<f32, u8>(&values));

        buffer.upload(&mut gpu).unwrap();
        assert_eq!(gpu.buffer_writes(buffer.handle()).len(), 1);
    }

    #[test]
    fn upload_while_mapped_is_rejected() {
        let mut gpu = HeadlessBackend::new();
        let mut buffer = vertex_buffer(&mut gpu, 64);
        buffer.map(1, 4).unwrap();
        assert!(buffer.upload(&mut gpu).is_err());
        assert!(buffer.reset().is_err());
    }

    #[test]
    fn reset_rewinds_without_shrinking() {
        let mut gpu = HeadlessBackend::new();
        let mut buffer = vertex_buffer(&mut gpu, 8);
        buffer.write(&[0u32; 4]).unwrap();
        let capacity = buffer.capacity();

        buffer.reset().unwrap();
        assert_eq!(buffer.offset(), 0);
        assert_eq!(buffer.capacity(), capacity);
        assert_eq!(buffer.write(&[7u32]).unwrap(), 0);
    }

    #[test]
    fn bind_follows_the_buffer_kind() {
        let mut gpu = HeadlessBackend::new();
        let buffer =
            DynamicBuffer::new(&mut gpu, 8, BufferKind::Index, BufferUsageHint::Static).unwrap();
        buffer.bind(&mut gpu);
        assert_eq!(gpu.bound_buffer(BufferKind::Index), Some(buffer.handle()));
        assert_eq!(gpu.bound_buffer(BufferKind::Vertex), None);

        buffer.unbind(&mut gpu);
        assert_eq!(gpu.bound_buffer(BufferKind::Index), None);
        buffer.destroy(&mut gpu);
        assert_eq!(gpu.live_objects(), 0);
    }
}
