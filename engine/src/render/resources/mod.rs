//! GPU Resource Handles
//!
//! Thin owners around wgpu objects. Every handle carries a process-unique
//! [`ResourceId`], is not `Clone`, and releases its GPU object on drop.

pub mod buffer;
pub mod framebuffer;
pub mod texture;
pub mod vertex_array;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub use buffer::{StorageBuffer, UniformBuffer};
pub use framebuffer::{
    Framebuffer, FramebufferLayout, FramebufferLimits, Renderbuffer, bytes_per_sample,
};
pub use texture::{Cubemap, PixelFormat, Texture, TextureData};
pub use vertex_array::VertexArray;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one GPU object. Never reused within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res{}", self.0)
    }
}
