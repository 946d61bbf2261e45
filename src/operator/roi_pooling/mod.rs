mod f32_cpu;
mod roi_pooling;

pub use roi_pooling::RoiPoolingOp;
