pub mod activate;
pub mod batch_norm;
pub mod bias;
pub mod concat;
pub mod connected;
pub mod convolution;
pub mod data;
pub mod dropout;
pub mod factory;
pub mod flatten;
pub mod lrn;
pub mod operator;
pub mod permute;
pub mod pooling;
pub mod proposal;
pub mod reshape;
pub mod roi_pooling;
