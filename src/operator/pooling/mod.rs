mod f32_cpu;
mod pooling;

pub use f32_cpu::PoolMode;
pub use pooling::PoolingOp;
