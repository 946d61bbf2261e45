use std::path::Path;

use tracing::warn;

use crate::utils::error::{Result, ShadowError};

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Sequential cursor over a flat weight stream.
///
/// Operators pull their parameters in declaration order; asking for more
/// floats than remain is an error rather than a silent misread.
#[derive(Debug)]
pub struct WeightReader<'a> {
    data: &'a [f32],
    pos: usize,
}

impl<'a> WeightReader<'a> {
    pub fn new(data: &'a [f32]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn consumed(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Take the next `count` floats on behalf of operator `op`.
    pub fn take(&mut self, op: &str, count: usize) -> Result<&'a [f32]> {
        if count > self.remaining() {
            return Err(ShadowError::WeightUnderrun {
                op: op.to_string(),
                needed: count,
                remaining: self.remaining(),
            });
        }
        let data: &'a [f32] = self.data;
        let chunk = &data[self.pos..self.pos + count];
        self.pos += count;
        Ok(chunk)
    }
}

/// Read a weight file: skip `header_bytes`, then decode native-endian f32s.
pub fn read_weight_file(path: impl AsRef<Path>, header_bytes: usize) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    decode_weights(&bytes, header_bytes).map_err(|e| match e {
        ShadowError::Network(msg) => ShadowError::Network(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

pub(crate) fn decode_weights(bytes: &[u8], header_bytes: usize) -> Result<Vec<f32>> {
    if bytes.len() < header_bytes {
        return Err(ShadowError::Network(format!(
            "weight stream of {} bytes is shorter than its {} byte header",
            bytes.len(),
            header_bytes
        )));
    }
    let body = &bytes[header_bytes..];
    let trailing = body.len() % F32_BYTES;
    if trailing != 0 {
        warn!(
            "weights: ignoring {} trailing bytes that do not form a float",
            trailing
        );
    }
    Ok(bytemuck::pod_collect_to_vec::<u8, f32>(
        &body[..body.len() - trailing],
    ))
}
