use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    blas::Context,
    network::net_def::OpDef,
    operator::operator::{OpBase, Operator, copy_bottom_to_top},
    utils::error::Result,
    workspace::Workspace,
};

use super::f32_cpu::activate_inplace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivateType {
    Linear,
    Relu,
    Leaky,
    Sigmoid,
    Tanh,
}

impl ActivateType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ActivateType::Linear),
            1 => Some(ActivateType::Relu),
            2 => Some(ActivateType::Leaky),
            3 => Some(ActivateType::Sigmoid),
            4 => Some(ActivateType::Tanh),
            _ => None,
        }
    }

    #[inline]
    pub fn apply(self, x: f32, slope: f32) -> f32 {
        match self {
            ActivateType::Linear => x,
            ActivateType::Relu => x.max(0.0),
            ActivateType::Leaky => {
                if x > 0.0 {
                    x
                } else {
                    slope * x
                }
            }
            ActivateType::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivateType::Tanh => x.tanh(),
        }
    }
}

pub struct ActivateOp {
    base: OpBase,
    activate_type: ActivateType,
    slope: f32,
}

impl ActivateOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        let base = OpBase::new(def, ws)?;
        Ok(Self {
            base,
            activate_type: ActivateType::Relu,
            slope: 0.1,
        })
    }
}

impl Debug for ActivateOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Activate(name={}, type={:?}, slope={})",
            self.base.name(),
            self.activate_type,
            self.slope
        )
    }
}

impl Operator for ActivateOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn setup(&mut self, _ws: &mut Workspace) -> Result<()> {
        self.base.check_io(1, 1, false)?;
        let code = self.base.arg::<i32>("type", 1)?;
        self.activate_type = ActivateType::from_code(code)
            .ok_or_else(|| self.base.error(format!("unknown activation type {}", code)))?;
        self.slope = self.base.arg("slope", 0.1f32)?;
        Ok(())
    }

    fn reshape(&mut self, ws: &mut Workspace) -> Result<()> {
        if !self.base.in_place() {
            let shape = ws.blob_shape(self.base.bottom(0));
            self.base.reshape_top(ws, 0, &shape)?;
        }
        self.base.trace_reshape(ws);
        Ok(())
    }

    fn forward(&self, ws: &Workspace, ctx: &Context) {
        copy_bottom_to_top(&self.base, ws, ctx);
        let mut top = ws.blob_mut(self.base.top(0));
        activate_inplace(top.data_mut(), self.activate_type, self.slope);
    }
}
