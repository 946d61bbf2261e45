//! Shadow - a lightweight neural network inference engine
//!
//! Networks are described by a [`NetDef`], instantiated into operators over a
//! shared workspace of blobs, fed trained weights, and run forward on the CPU
//! through a pluggable BLAS backend. Detection post-processing lives in
//! [`boxes`].

pub mod blas;

pub mod boxes;

pub mod config;

pub mod network;

pub mod operator;

pub mod tensor;

pub mod utils;

pub mod workspace;

pub use blas::{Blas, Context};
pub use boxes::BoundingBox;
pub use config::{BackendKind, EngineConfig};
pub use network::{
    argument::{ArgValue, Argument},
    net_def::{BlobDef, InputDef, NetDef, OpDef},
    network::Network,
};
pub use operator::{factory::Operators, operator::Operator};
pub use tensor::Blob;
pub use utils::error::{Result, ShadowError};
pub use workspace::Workspace;
