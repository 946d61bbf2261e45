mod activate;
mod f32_cpu;

pub use activate::{ActivateOp, ActivateType};
pub(crate) use f32_cpu::activate_inplace;
