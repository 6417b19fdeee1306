//! Typed uniform and storage buffers.

use std::marker::PhantomData;

use bytemuck::Pod;
use wgpu::util::DeviceExt;

use super::ResourceId;

/// A uniform buffer holding exactly one `T`.
pub struct UniformBuffer<T: Pod> {
    id: ResourceId,
    buffer: wgpu::Buffer,
    _marker: PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T> {
    pub fn new(device: &wgpu::Device, label: &str, value: &T) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(value),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        Self {
            id: ResourceId::next(),
            buffer,
            _marker: PhantomData,
        }
    }

    pub fn write(&self, queue: &wgpu::Queue, value: &T) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(value));
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}

/// A read-only storage array of up to `capacity` elements of `T`.
pub struct StorageBuffer<T: Pod> {
    id: ResourceId,
    buffer: wgpu::Buffer,
    capacity: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> StorageBuffer<T> {
    pub fn new(device: &wgpu::Device, label: &str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (capacity * std::mem::size_of::<T>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            id: ResourceId::next(),
            buffer,
            capacity,
            _marker: PhantomData,
        }
    }

    /// Write `items` from the start of the buffer. Items past capacity are
    /// dropped; the number written is returned.
    pub fn write(&self, queue: &wgpu::Queue, items: &[T]) -> usize {
        let count = items.len().min(self.capacity);
        if count < items.len() {
            log::warn!(
                "[StorageBuffer] {} items exceed capacity {}, truncating",
                items.len(),
                self.capacity
            );
        }
        if count > 0 {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&items[..count]));
        }
        count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}
