use crate::{
    network::net_def::OpDef,
    utils::error::{Result, ShadowError},
    workspace::Workspace,
};

use super::{
    activate::ActivateOp, batch_norm::BatchNormOp, bias::BiasOp, concat::ConcatOp,
    connected::ConnectedOp, convolution::ConvolutionOp, data::DataOp, dropout::DropoutOp,
    flatten::FlattenOp, lrn::LrnOp, operator::Operator, permute::PermuteOp, pooling::PoolingOp,
    proposal::ProposalOp, reshape::ReshapeOp, roi_pooling::RoiPoolingOp,
};

/// Type names understood by [`Operators::create`].
pub const OPERATOR_TYPES: &[&str] = &[
    "Activate",
    "BatchNorm",
    "Bias",
    "Concat",
    "Connected",
    "Convolution",
    "Data",
    "Dropout",
    "Flatten",
    "InnerProduct",
    "LRN",
    "Permute",
    "Pooling",
    "Proposal",
    "Reshape",
    "ROIPooling",
];

pub struct Operators;

impl Operators {
    /// Construct the operator named by `def.op_type`, binding its bottoms and
    /// creating its tops in `ws`.
    pub fn create(def: &OpDef, ws: &mut Workspace) -> Result<Box<dyn Operator>> {
        let op: Box<dyn Operator> = match def.op_type.as_str() {
            "Activate" => Box::new(ActivateOp::new(def, ws)?),
            "BatchNorm" => Box::new(BatchNormOp::new(def, ws)?),
            "Bias" => Box::new(BiasOp::new(def, ws)?),
            "Concat" => Box::new(ConcatOp::new(def, ws)?),
            "Connected" | "InnerProduct" => Box::new(ConnectedOp::new(def, ws)?),
            "Convolution" => Box::new(ConvolutionOp::new(def, ws)?),
            "Data" => Box::new(DataOp::new(def, ws)?),
            "Dropout" => Box::new(DropoutOp::new(def, ws)?),
            "Flatten" => Box::new(FlattenOp::new(def, ws)?),
            "LRN" => Box::new(LrnOp::new(def, ws)?),
            "Permute" => Box::new(PermuteOp::new(def, ws)?),
            "Pooling" => Box::new(PoolingOp::new(def, ws)?),
            "Proposal" => Box::new(ProposalOp::new(def, ws)?),
            "Reshape" => Box::new(ReshapeOp::new(def, ws)?),
            "ROIPooling" => Box::new(RoiPoolingOp::new(def, ws)?),
            _ => {
                return Err(ShadowError::UnknownOperator {
                    name: def.name.clone(),
                    op_type: def.op_type.clone(),
                });
            }
        };
        Ok(op)
    }

    pub fn is_registered(op_type: &str) -> bool {
        OPERATOR_TYPES.contains(&op_type)
    }
}
