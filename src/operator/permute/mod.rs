mod f32_cpu;
mod permute;

pub use permute::PermuteOp;
