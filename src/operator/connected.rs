use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    blas::Context,
    network::{net_def::OpDef, weights::WeightReader},
    operator::operator::{OpBase, Operator},
    utils::{error::Result, macros::op_ensure},
    workspace::{BlobId, Workspace},
};

const WEIGHT: usize = 0;
const BIAS: usize = 1;

/// Fully connected layer, `y = x·Wᵀ + b` with `W` stored `[num_output, in]`
/// (or `[in, num_output]` when `transpose` is set).
pub struct ConnectedOp {
    base: OpBase,
    num_output: usize,
    bias_term: bool,
    transpose: bool,
    in_features: usize,
    batch: usize,
    bias_multiplier: BlobId,
}

impl ConnectedOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        let base = OpBase::new(def, ws)?;
        let bias_multiplier = ws.create_blob(&format!("{}_bias_multiplier", def.name));
        Ok(Self {
            base,
            num_output: 0,
            bias_term: true,
            transpose: false,
            in_features: 0,
            batch: 0,
            bias_multiplier,
        })
    }
}

impl Debug for ConnectedOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Connected(name={}, num_output={}, in_features={}, bias_term={}, transpose={})",
            self.base.name(),
            self.num_output,
            self.in_features,
            self.bias_term,
            self.transpose
        )
    }
}

impl Operator for ConnectedOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn setup(&mut self, ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        base.check_io(1, 1, false)?;
        op_ensure!(base, !base.in_place(), "cannot run in place");
        self.num_output = base.arg("num_output", 0usize)?;
        self.bias_term = base.arg("bias_term", true)?;
        self.transpose = base.arg("transpose", false)?;
        op_ensure!(base, self.num_output > 0, "num_output must be > 0");

        let bottom = ws.blob(base.bottom(0));
        op_ensure!(base, bottom.num_axes() >= 1, "bottom must have a batch axis");
        self.in_features = bottom.count_from(1);
        drop(bottom);

        let weight_shape = if self.transpose {
            [self.in_features, self.num_output]
        } else {
            [self.num_output, self.in_features]
        };
        op_ensure!(
            base,
            base.params().len() <= 2,
            "expects at most 2 parameter blobs, got {}",
            base.params().len()
        );
        if self.base.params().is_empty() {
            let weight = self.base.new_param("weight", &weight_shape)?;
            self.base.params_mut().push(weight);
        }
        if self.base.params().len() == 1 {
            let bias = self.base.new_param("bias", &[self.num_output])?;
            self.base.params_mut().push(bias);
        }
        let base = &self.base;
        op_ensure!(
            base,
            base.param(WEIGHT).count() == self.num_output * self.in_features,
            "weight blob must hold {}x{} values, got {}",
            weight_shape[0],
            weight_shape[1],
            base.param(WEIGHT).count()
        );
        op_ensure!(
            base,
            base.param(BIAS).count() == self.num_output,
            "bias blob must hold {} values",
            self.num_output
        );
        Ok(())
    }

    fn reshape(&mut self, ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        let shape = ws.blob_shape(base.bottom(0));
        let in_features: usize = shape[1..].iter().product();
        op_ensure!(
            base,
            in_features == self.in_features,
            "bottom {:?} has {} features, expected {}",
            shape,
            in_features,
            self.in_features
        );
        let batch = shape[0];
        base.reshape_top(ws, 0, &[batch, self.num_output])?;
        base.reshape_blob(ws, self.bias_multiplier, &[batch])?;
        ws.blob_mut(self.bias_multiplier).data_mut().fill(1.0);
        self.batch = batch;
        self.base.trace_reshape(ws);
        Ok(())
    }

    fn forward(&self, ws: &Workspace, ctx: &Context) {
        let blas = ctx.blas();
        let bottom = ws.blob(self.base.bottom(0));
        let mut top = ws.blob_mut(self.base.top(0));
        let weight = self.base.param(WEIGHT).data();

        if self.batch == 1 {
            blas.gemv(
                self.transpose,
                if self.transpose { self.in_features } else { self.num_output },
                if self.transpose { self.num_output } else { self.in_features },
                1.0,
                weight,
                0,
                bottom.data(),
                0,
                0.0,
                top.data_mut(),
                0,
            );
        } else {
            blas.gemm(
                false,
                !self.transpose,
                self.batch,
                self.num_output,
                self.in_features,
                1.0,
                bottom.data(),
                0,
                weight,
                0,
                0.0,
                top.data_mut(),
                0,
            );
        }

        if self.bias_term {
            let multiplier = ws.blob(self.bias_multiplier);
            blas.gemm(
                false,
                false,
                self.batch,
                self.num_output,
                1,
                1.0,
                multiplier.data(),
                0,
                self.base.param(BIAS).data(),
                0,
                1.0,
                top.data_mut(),
                0,
            );
        }
    }

    fn load_weights(&mut self, reader: &mut WeightReader<'_>) -> Result<()> {
        let name = self.base.name().to_string();
        let biases = reader.take(&name, self.num_output)?;
        let weights = reader.take(&name, self.num_output * self.in_features)?;
        let params = self.base.params_mut();
        params[BIAS].set_data(biases)?;
        params[WEIGHT].set_data(weights)?;
        Ok(())
    }
}
