use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    blas::Context,
    network::net_def::OpDef,
    operator::operator::{OpBase, Operator},
    utils::{error::Result, macros::op_ensure},
    workspace::Workspace,
};

use super::f32_cpu::{lrn_apply, lrn_scale};

/// Local response normalisation across channels.
pub struct LrnOp {
    base: OpBase,
    size: usize,
    alpha: f32,
    beta: f32,
    k: f32,
    dims: (usize, usize, usize, usize),
}

impl LrnOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        Ok(Self {
            base: OpBase::new(def, ws)?,
            size: 5,
            alpha: 1e-4,
            beta: 0.75,
            k: 1.0,
            dims: (0, 0, 0, 0),
        })
    }
}

impl Debug for LrnOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "LRN(name={}, size={}, alpha={}, beta={}, k={})",
            self.base.name(),
            self.size,
            self.alpha,
            self.beta,
            self.k
        )
    }
}

impl Operator for LrnOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn setup(&mut self, _ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        base.check_io(1, 1, false)?;
        self.size = base.arg("local_size", 5usize)?;
        self.alpha = base.arg("alpha", 1e-4f32)?;
        self.beta = base.arg("beta", 0.75f32)?;
        self.k = base.arg("k", 1.0f32)?;
        op_ensure!(base, self.size > 0, "local_size must be > 0");
        Ok(())
    }

    fn reshape(&mut self, ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        let shape = ws.blob_shape(base.bottom(0));
        op_ensure!(base, shape.len() == 4, "expects a 4-D bottom, got {:?}", shape);
        if !base.in_place() {
            base.reshape_top(ws, 0, &shape)?;
        }
        let count: usize = shape.iter().product();
        base.grow_temp_buffer(ws, count)?;
        self.dims = (shape[0], shape[1], shape[2], shape[3]);
        self.base.trace_reshape(ws);
        Ok(())
    }

    fn forward(&self, ws: &Workspace, _ctx: &Context) {
        let mut scale = ws.temp_buffer_mut();
        let mut top = ws.blob_mut(self.base.top(0));
        let count = top.count();
        if self.base.in_place() {
            lrn_scale(top.data(), self.dims, self.size, self.alpha, self.k, &mut scale);
            for (v, &s) in top.data_mut().iter_mut().zip(&scale[..count]) {
                *v *= s.powf(-self.beta);
            }
        } else {
            let bottom = ws.blob(self.base.bottom(0));
            lrn_scale(bottom.data(), self.dims, self.size, self.alpha, self.k, &mut scale);
            lrn_apply(bottom.data(), &scale[..count], self.beta, top.data_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::operator::tests::run;

    #[test]
    fn single_channel_window() {
        // size 1, alpha 1, beta 1, k 0: y = x / x² = 1/x.
        let def = OpDef::new("LRN", "norm")
            .input("data")
            .output("norm")
            .arg("local_size", 1)
            .arg("alpha", 1.0)
            .arg("beta", 1.0)
            .arg("k", 0.0);
        let (_, out) = run(&def, &[("data", &[1, 1, 1, 2], &[2.0, 4.0])]);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn in_place_matches_copy() {
        let data: Vec<f32> = (0..24).map(|v| (v as f32 - 12.0) / 5.0).collect();
        let copy = OpDef::new("LRN", "norm").input("data").output("norm").arg("local_size", 3);
        let inplace = OpDef::new("LRN", "norm").input("data").output("data").arg("local_size", 3);
        let (_, a) = run(&copy, &[("data", &[2, 3, 2, 2], &data)]);
        let (_, b) = run(&inplace, &[("data", &[2, 3, 2, 2], &data)]);
        assert_eq!(a, b);
    }
}
