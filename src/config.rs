use crate::utils::error::{Result, ShadowError};

/// Which math backend executes the BLAS primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Plain single-threaded loops.
    #[default]
    Naive,
    /// Row-parallel GEMM/GEMV and chunked elementwise ops on the rayon pool.
    Parallel,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub batch: usize,
    pub backend: BackendKind,
    pub memory_limit_bytes: Option<u64>,
    pub weight_header_bytes: usize,
}

impl EngineConfig {
    pub fn build(mut self) -> Result<Self> {
        if self.batch == 0 {
            return Err(ShadowError::Network(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if let Some(0) = self.memory_limit_bytes {
            return Err(ShadowError::Network(
                "Memory limit must be greater than 0 bytes".to_string(),
            ));
        }

        if self.memory_limit_bytes.is_none() {
            self.memory_limit_bytes = Some(host_memory_bytes());
        }

        Ok(self)
    }

    /// The budget the workspace tracks allocations against.
    pub fn memory_limit(&self) -> u64 {
        self.memory_limit_bytes.unwrap_or(u64::MAX)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch: 1,
            backend: BackendKind::Naive,
            memory_limit_bytes: None,
            weight_header_bytes: 16,
        }
    }
}

// sys-info reports kilobytes
fn host_memory_bytes() -> u64 {
    match sys_info::mem_info() {
        Ok(info) if info.total > 0 => info.total.saturating_mul(1024),
        _ => u64::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_weight_file_layout() {
        let config = EngineConfig::default();
        assert_eq!(config.batch, 1);
        assert_eq!(config.weight_header_bytes, 16);
        assert_eq!(config.backend, BackendKind::Naive);
    }

    #[test]
    fn build_rejects_zero_batch() {
        let config = EngineConfig {
            batch: 0,
            ..Default::default()
        };
        assert!(config.build().is_err());
    }

    #[test]
    fn build_fills_memory_limit() {
        let config = EngineConfig::default().build().unwrap();
        assert!(config.memory_limit_bytes.is_some());
        assert!(config.memory_limit() > 0);
    }

    #[test]
    fn explicit_limit_is_kept() {
        let config = EngineConfig {
            memory_limit_bytes: Some(4096),
            ..Default::default()
        }
        .build()
        .unwrap();
        assert_eq!(config.memory_limit(), 4096);
    }
}
