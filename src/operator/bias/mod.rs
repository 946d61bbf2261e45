mod bias;
mod f32_cpu;

pub use bias::BiasOp;
