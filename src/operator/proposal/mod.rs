mod f32_cpu;
mod proposal;

pub use f32_cpu::{RectInfo, generate_anchors, nms_sorted};
pub use proposal::ProposalOp;
