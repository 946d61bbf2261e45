use crate::utils::{
    error::{Result, ShadowError},
    math::{format_shape, product},
};

/// A named, shaped, contiguous f32 buffer.
///
/// The backing buffer only ever grows: reshaping to a smaller element count
/// keeps the allocation and exposes a prefix of it.
#[derive(Clone, Debug, Default)]
pub struct Blob {
    name: String,
    shape: Vec<usize>,
    count: usize,
    data: Vec<f32>,
}

impl Blob {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_shape(name: impl Into<String>, dims: &[usize]) -> Result<Self> {
        let mut blob = Self::new(name);
        blob.reshape(dims)?;
        Ok(blob)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dim(&self, axis: usize) -> usize {
        self.shape[axis]
    }

    /// Dimension at a possibly negative axis.
    pub fn shape_at(&self, axis: i64) -> Result<usize> {
        Ok(self.shape[self.canonical_index(axis)?])
    }

    pub fn num_axes(&self) -> usize {
        self.shape.len()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Product of the dimensions from `axis` to the end.
    pub fn count_from(&self, axis: usize) -> usize {
        self.count_range(axis, self.num_axes())
    }

    /// Product of the dimensions in `[start, end)`.
    pub fn count_range(&self, start: usize, end: usize) -> usize {
        debug_assert!(start <= end && end <= self.num_axes());
        product(&self.shape[start..end])
    }

    pub fn canonical_index(&self, axis: i64) -> Result<usize> {
        let num_axes = self.num_axes() as i64;
        if axis < -num_axes || axis >= num_axes {
            return Err(ShadowError::Shape(format!(
                "axis {} out of range for blob {} with {} axes {}",
                axis,
                self.name,
                num_axes,
                format_shape(&self.shape)
            )));
        }
        Ok(if axis < 0 { axis + num_axes } else { axis } as usize)
    }

    /// Number of elements the buffer can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Set a new shape, growing the buffer when needed.
    ///
    /// Returns how many elements were newly allocated (0 when the existing
    /// buffer was large enough).
    pub fn reshape(&mut self, dims: &[usize]) -> Result<usize> {
        let count = product(dims);
        let grown = count.saturating_sub(self.data.len());
        if grown > 0 {
            self.data.try_reserve_exact(grown).map_err(|e| {
                ShadowError::OutOfMemory(format!(
                    "blob {} failed to grow to {} elements: {}",
                    self.name, count, e
                ))
            })?;
            self.data.resize(count, 0.0);
        }
        self.shape.clear();
        self.shape.extend_from_slice(dims);
        self.count = count;
        Ok(grown)
    }

    /// Change the shape of a blob whose buffer already holds the new count.
    ///
    /// Used during forward passes, where allocation is not allowed; the
    /// capacity must have been reserved by an earlier reshape.
    pub fn reshape_in_place(&mut self, dims: &[usize]) {
        let count = product(dims);
        assert!(
            count <= self.data.len(),
            "blob {} cannot hold {} without growing",
            self.name,
            format_shape(dims)
        );
        self.shape.clear();
        self.shape.extend_from_slice(dims);
        self.count = count;
    }

    pub fn data(&self) -> &[f32] {
        &self.data[..self.count]
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data[..self.count]
    }

    pub fn set_data(&mut self, src: &[f32]) -> Result<()> {
        if src.len() != self.count {
            return Err(ShadowError::Shape(format!(
                "blob {} {} holds {} elements, got {}",
                self.name,
                format_shape(&self.shape),
                self.count,
                src.len()
            )));
        }
        self.data[..self.count].copy_from_slice(src);
        Ok(())
    }

    /// Drop the backing buffer; the blob goes back to an empty shape.
    pub fn release(&mut self) -> usize {
        let freed = self.data.len();
        self.data = Vec::new();
        self.shape.clear();
        self.count = 0;
        freed
    }
}
