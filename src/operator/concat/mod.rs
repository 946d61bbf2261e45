mod concat;
mod f32_cpu;

pub use concat::ConcatOp;
