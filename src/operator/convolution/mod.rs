mod convolution;
mod f32_cpu;

pub use convolution::ConvolutionOp;
