use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;

use tracing::debug;

use crate::tensor::Blob;
use crate::utils::{
    error::{Result, ShadowError},
    math::format_shape,
};

use super::memory_tracker::MemoryTracker;

/// Handle to a blob, resolved once at graph-build time.
pub type BlobId = usize;

const F32_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// Per-network registry owning every blob plus one grow-only scratch buffer.
///
/// Blobs live in `RefCell`s: execution is single threaded, and an operator
/// needs shared borrows of its inputs while it mutably borrows its outputs.
#[derive(Debug)]
pub struct Workspace {
    blobs: Vec<RefCell<Blob>>,
    names: HashMap<String, BlobId>,
    temp: RefCell<Vec<f32>>,
    memory: MemoryTracker,
}

impl Workspace {
    pub fn new(memory_limit_bytes: u64) -> Self {
        Self {
            blobs: Vec::new(),
            names: HashMap::new(),
            temp: RefCell::new(Vec::new()),
            memory: MemoryTracker::new(memory_limit_bytes),
        }
    }

    /// Return the blob registered under `name`, creating an empty one if absent.
    pub fn create_blob(&mut self, name: &str) -> BlobId {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = self.blobs.len();
        self.blobs.push(RefCell::new(Blob::new(name)));
        self.names.insert(name.to_string(), id);
        id
    }

    /// Like [`Workspace::create_blob`], then shapes the blob.
    pub fn create_blob_with_shape(&mut self, name: &str, dims: &[usize]) -> Result<BlobId> {
        let id = self.create_blob(name);
        self.reshape_blob(id, dims)?;
        Ok(id)
    }

    pub fn has_blob(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn blob_id(&self, name: &str) -> Result<BlobId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| ShadowError::Network(format!("Unknown blob {}", name)))
    }

    pub fn blob(&self, id: BlobId) -> Ref<'_, Blob> {
        self.blobs[id].borrow()
    }

    pub fn blob_mut(&self, id: BlobId) -> RefMut<'_, Blob> {
        self.blobs[id].borrow_mut()
    }

    pub fn blob_shape(&self, id: BlobId) -> Vec<usize> {
        self.blob(id).shape().to_vec()
    }

    /// Reshape a blob, charging any growth against the memory budget.
    pub fn reshape_blob(&mut self, id: BlobId, dims: &[usize]) -> Result<()> {
        let blob = self.blobs[id].get_mut();
        let needed = dims.iter().product::<usize>().saturating_sub(blob.capacity());
        if needed > 0 {
            self.memory.allocate(needed as u64 * F32_BYTES)?;
        }
        let grown = blob.reshape(dims)?;
        if grown > 0 {
            debug!(
                "workspace: blob {} grew by {} elements to {}",
                blob.name(),
                grown,
                format_shape(dims)
            );
        }
        Ok(())
    }

    /// Ensure the shared scratch buffer holds at least `count` elements.
    pub fn grow_temp_buffer(&mut self, count: usize) -> Result<()> {
        let temp = self.temp.get_mut();
        if count <= temp.len() {
            return Ok(());
        }
        let grown = count - temp.len();
        self.memory.allocate(grown as u64 * F32_BYTES)?;
        temp.try_reserve_exact(grown).map_err(|e| {
            ShadowError::OutOfMemory(format!("temp buffer failed to grow to {}: {}", count, e))
        })?;
        temp.resize(count, 0.0);
        debug!("workspace: temp buffer grew to {} elements", count);
        Ok(())
    }

    pub fn temp_buffer_len(&self) -> usize {
        self.temp.borrow().len()
    }

    pub fn temp_buffer_mut(&self) -> RefMut<'_, Vec<f32>> {
        self.temp.borrow_mut()
    }

    pub fn num_blobs(&self) -> usize {
        self.blobs.len()
    }

    pub fn memory_in_use(&self) -> u64 {
        self.memory.get_current()
    }

    pub fn memory_limit(&self) -> u64 {
        self.memory.get_maximum()
    }

    /// Free every blob and the scratch buffer.
    pub fn release(&mut self) {
        for blob in &mut self.blobs {
            let freed = blob.get_mut().release();
            self.memory.deallocate(freed as u64 * F32_BYTES);
        }
        self.blobs.clear();
        self.names.clear();
        let temp = self.temp.get_mut();
        self.memory.deallocate(temp.len() as u64 * F32_BYTES);
        *temp = Vec::new();
    }
}
