use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    blas::{BinaryOp, Context},
    network::net_def::OpDef,
    operator::operator::{OpBase, Operator, copy_bottom_to_top},
    utils::error::Result,
    workspace::Workspace,
};

/// Network input stage: `top = (bottom - mean_value) * scale`.
pub struct DataOp {
    base: OpBase,
    scale: f32,
    mean_value: f32,
}

impl DataOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        Ok(Self {
            base: OpBase::new(def, ws)?,
            scale: 1.0,
            mean_value: 0.0,
        })
    }
}

impl Debug for DataOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Data(name={}, scale={}, mean_value={})",
            self.base.name(),
            self.scale,
            self.mean_value
        )
    }
}

impl Operator for DataOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn setup(&mut self, _ws: &mut Workspace) -> Result<()> {
        self.base.check_io(1, 1, false)?;
        self.scale = self.base.arg("scale", 1.0f32)?;
        self.mean_value = self.base.arg("mean_value", 0.0f32)?;
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
        let blas = ctx.blas();
        let mut top = ws.blob_mut(self.base.top(0));
        let count = top.count();
        if self.mean_value != 0.0 {
            blas.binary_scalar_inplace(BinaryOp::Sub, count, top.data_mut(), 0, self.mean_value);
        }
        if self.scale != 1.0 {
            blas.scal(count, self.scale, top.data_mut(), 0);
        }
    }
}
