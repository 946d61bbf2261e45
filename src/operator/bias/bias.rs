use std::fmt::{Debug, Formatter, Result as FmtResult};

use tracing::warn;

use crate::{
    blas::Context,
    network::net_def::OpDef,
    operator::operator::{OpBase, Operator, copy_bottom_to_top},
    utils::{error::Result, macros::op_ensure},
    workspace::Workspace,
};

use super::f32_cpu::bias_inplace;

/// Adds a bias broadcast over the axes after `axis .. axis + num_axis`.
///
/// The bias is the second bottom when given, otherwise an owned parameter
/// (inline, loaded, or zero-initialised from the bottom's shape).
pub struct BiasOp {
    base: OpBase,
    axis: usize,
    bias_dim: usize,
    inner_dim: usize,
}

impl BiasOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        Ok(Self {
            base: OpBase::new(def, ws)?,
            axis: 1,
            bias_dim: 0,
            inner_dim: 0,
        })
    }

    fn bias_shape(&self, ws: &Workspace) -> Vec<usize> {
        if self.base.bottoms().len() > 1 {
            ws.blob_shape(self.base.bottom(1))
        } else {
            self.base.param(0).shape().to_vec()
        }
    }
}

impl Debug for BiasOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Bias(name={}, axis={}, bias_dim={}, inner_dim={})",
            self.base.name(),
            self.axis,
            self.bias_dim,
            self.inner_dim
        )
    }
}

impl Operator for BiasOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn setup(&mut self, ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        op_ensure!(
            base,
            (1..=2).contains(&base.bottoms().len()) && base.tops().len() == 1,
            "expects 1 or 2 bottoms and 1 top"
        );
        let bottom_shape = ws.blob_shape(base.bottom(0));
        let axis = base.arg::<i64>("axis", 1)?;
        let num_axes = bottom_shape.len() as i64;
        op_ensure!(
            base,
            axis >= -num_axes && axis < num_axes,
            "axis {} out of range for {} axes",
            axis,
            num_axes
        );
        self.axis = if axis < 0 { axis + num_axes } else { axis } as usize;
        let num_axis = base.arg::<i64>("num_axis", 1)?;
        op_ensure!(base, num_axis >= -1, "num_axis must be >= -1, got {}", num_axis);

        if base.bottoms().len() == 1 && base.params().is_empty() {
            let end_axis = if num_axis == -1 {
                bottom_shape.len()
            } else {
                self.axis + num_axis as usize
            };
            op_ensure!(
                base,
                end_axis <= bottom_shape.len(),
                "axis {} + num_axis {} exceeds {} axes",
                self.axis,
                num_axis,
                bottom_shape.len()
            );
            let blob = base.new_param("bias", &bottom_shape[self.axis..end_axis])?;
            warn!("{}: bias param is initialized with the default value 0", base.name());
            self.base.params_mut().push(blob);
        }
        Ok(())
    }

    fn reshape(&mut self, ws: &mut Workspace) -> Result<()> {
        let bottom_shape = ws.blob_shape(self.base.bottom(0));
        let bias_shape = self.bias_shape(ws);
        let base = &self.base;
        let start_axis = if bias_shape.is_empty() { 0 } else { self.axis };
        op_ensure!(
            base,
            bottom_shape.len() >= start_axis + bias_shape.len(),
            "bias {:?} does not fit bottom {:?} at axis {}",
            bias_shape,
            bottom_shape,
            start_axis
        );
        op_ensure!(
            base,
            bottom_shape[start_axis..start_axis + bias_shape.len()] == bias_shape[..],
            "bias {:?} does not match bottom {:?} at axis {}",
            bias_shape,
            bottom_shape,
            start_axis
        );
        if !base.in_place() {
            base.reshape_top(ws, 0, &bottom_shape)?;
        }
        self.bias_dim = bias_shape.iter().product();
        self.inner_dim = bottom_shape[start_axis + bias_shape.len()..].iter().product();
        self.base.trace_reshape(ws);
        Ok(())
    }

    fn forward(&self, ws: &Workspace, ctx: &Context) {
        copy_bottom_to_top(&self.base, ws, ctx);
        let mut top = ws.blob_mut(self.base.top(0));
        if self.base.bottoms().len() > 1 {
            let bias = ws.blob(self.base.bottom(1));
            bias_inplace(top.data_mut(), bias.data(), self.bias_dim, self.inner_dim);
        } else {
            bias_inplace(top.data_mut(), self.base.param(0).data(), self.bias_dim, self.inner_dim);
        }
    }
}
