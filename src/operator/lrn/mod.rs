mod f32_cpu;
mod lrn;

pub use lrn::LrnOp;
