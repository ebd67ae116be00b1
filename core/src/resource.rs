//! # GPU Resources
//!
//! GPU-visible buffers shared between the host and the engines.
//!
//! An [`OsResource`] is a cheap, clonable handle. Every clone refers to the
//! same backing memory, so a write retired by an engine is visible to the
//! host through any other clone.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use spin::Mutex;

use crate::error::{Error, Result};
use crate::types::{ByteSize, GpuAddr, Handle, ResourceMarker};

/// GPU resource identifier
pub type ResourceId = Handle<ResourceMarker>;

// =============================================================================
// OS RESOURCE
// =============================================================================

/// A GPU-visible buffer
#[derive(Clone)]
pub struct OsResource {
    /// Unique ID
    id: ResourceId,
    /// Debug name
    name: &'static str,
    /// GPU address
    gpu_addr: GpuAddr,
    /// Backing memory
    memory: Arc<Mutex<Vec<u8>>>,
}

impl OsResource {
    /// Create a zero-filled resource
    pub fn new(id: ResourceId, name: &'static str, gpu_addr: GpuAddr, size: ByteSize) -> Self {
        Self {
            id,
            name,
            gpu_addr,
            memory: Arc::new(Mutex::new(vec![0u8; size.as_bytes() as usize])),
        }
    }

    /// Get resource ID
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Get debug name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get GPU address
    pub fn gpu_addr(&self) -> GpuAddr {
        self.gpu_addr
    }

    /// Get size
    pub fn size(&self) -> ByteSize {
        ByteSize::from_bytes(self.memory.lock().len() as u64)
    }

    /// Check if both handles refer to the same resource
    pub fn same_as(&self, other: &OsResource) -> bool {
        self.id == other.id
    }

    fn check_range(len: usize, offset: u32, width: usize) -> Result<usize> {
        let start = offset as usize;
        match start.checked_add(width) {
            Some(end) if end <= len => Ok(start),
            _ => Err(Error::BufferOverflow),
        }
    }

    /// Read a little-endian dword
    pub fn read_u32(&self, offset: u32) -> Result<u32> {
        let mem = self.memory.lock();
        let start = Self::check_range(mem.len(), offset, 4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&mem[start..start + 4]);
        Ok(u32::from_le_bytes(raw))
    }

    /// Read a little-endian qword
    pub fn read_u64(&self, offset: u32) -> Result<u64> {
        let mem = self.memory.lock();
        let start = Self::check_range(mem.len(), offset, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&mem[start..start + 8]);
        Ok(u64::from_le_bytes(raw))
    }

    /// Write a little-endian dword
    pub fn write_u32(&self, offset: u32, value: u32) -> Result<()> {
        let mut mem = self.memory.lock();
        let start = Self::check_range(mem.len(), offset, 4)?;
        mem[start..start + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Write a little-endian qword
    pub fn write_u64(&self, offset: u32, value: u64) -> Result<()> {
        let mut mem = self.memory.lock();
        let start = Self::check_range(mem.len(), offset, 8)?;
        mem[start..start + 8].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

impl PartialEq for OsResource {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for OsResource {}

impl fmt::Debug for OsResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsResource")
            .field("id", &self.id.id())
            .field("name", &self.name)
            .field("gpu_addr", &self.gpu_addr)
            .finish()
    }
}

static_assertions::assert_impl_all!(OsResource: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(size: u64) -> OsResource {
        OsResource::new(
            ResourceId::new(1),
            "test",
            GpuAddr::new(0x10000),
            ByteSize::from_bytes(size),
        )
    }

    #[test]
    fn test_clones_share_memory() {
        let a = resource(16);
        let b = a.clone();
        a.write_u64(8, 0xdead_beef_0000_0001).unwrap();
        assert_eq!(b.read_u64(8).unwrap(), 0xdead_beef_0000_0001);
        assert!(a.same_as(&b));
    }

    #[test]
    fn test_out_of_bounds() {
        let r = resource(8);
        assert_eq!(r.write_u64(4, 1), Err(Error::BufferOverflow));
        assert_eq!(r.read_u32(8), Err(Error::BufferOverflow));
        assert_eq!(r.read_u32(u32::MAX), Err(Error::BufferOverflow));
    }

    #[test]
    fn test_size() {
        assert_eq!(resource(64).size(), ByteSize::from_bytes(64));
    }
}
