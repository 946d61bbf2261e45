use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    blas::{BinaryOp, Context},
    network::net_def::OpDef,
    operator::operator::{OpBase, Operator, copy_bottom_to_top},
    utils::{error::Result, macros::op_ensure},
    workspace::{BlobId, Workspace},
};

/// Batch normalisation without the affine part.
///
/// Statistics are reduced with two GEMVs (spatial, then batch) and broadcast
/// back with rank-1 GEMMs against vectors of ones. With `use_global_stats`
/// the stored running mean/variance are used, descaled by the stored factor.
pub struct BatchNormOp {
    base: OpBase,
    use_global_stats: bool,
    eps: f32,
    // (batch, channels, spatial)
    dims: (usize, usize, usize),
    mean: BlobId,
    variance: BlobId,
    temp: BlobId,
    batch_by_channel: BlobId,
    sum_batch_multiplier: BlobId,
    sum_spatial_multiplier: BlobId,
}

impl BatchNormOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        let base = OpBase::new(def, ws)?;
        let mut scratch = |suffix: &str| ws.create_blob(&format!("{}_{}", def.name, suffix));
        Ok(Self {
            mean: scratch("mean"),
            variance: scratch("variance"),
            temp: scratch("temp"),
            batch_by_channel: scratch("batch_by_channel"),
            sum_batch_multiplier: scratch("sum_batch_multiplier"),
            sum_spatial_multiplier: scratch("sum_spatial_multiplier"),
            base,
            use_global_stats: true,
            eps: 1e-5,
            dims: (0, 0, 0),
        })
    }
}

impl Debug for BatchNormOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "BatchNorm(name={}, use_global_stats={}, eps={})",
            self.base.name(),
            self.use_global_stats,
            self.eps
        )
    }
}

impl Operator for BatchNormOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn setup(&mut self, _ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        base.check_io(1, 1, false)?;
        self.use_global_stats = base.arg("use_global_stats", true)?;
        self.eps = base.arg("eps", 1e-5f32)?;
        if self.use_global_stats {
            op_ensure!(
                base,
                base.params().len() == 3,
                "global statistics need mean, variance and scale factor blobs, got {} blobs",
                base.params().len()
            );
            op_ensure!(
                base,
                base.param(2).count() == 1,
                "scale factor blob must hold one value"
            );
        }
        Ok(())
    }

    fn reshape(&mut self, ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        let shape = ws.blob_shape(base.bottom(0));
        op_ensure!(base, !shape.is_empty(), "bottom must have at least one axis");
        let batch = shape[0];
        let (channels, spatial) = if shape.len() == 1 {
            (1, 1)
        } else {
            (shape[1], shape[2..].iter().product())
        };
        if self.use_global_stats {
            op_ensure!(
                base,
                base.param(0).count() == channels && base.param(1).count() == channels,
                "running statistics must hold {} channels",
                channels
            );
        }
        if !base.in_place() {
            base.reshape_top(ws, 0, &shape)?;
        }

        base.reshape_blob(ws, self.mean, &[1, channels])?;
        base.reshape_blob(ws, self.variance, &[1, channels])?;
        base.reshape_blob(ws, self.temp, &shape)?;
        base.reshape_blob(ws, self.batch_by_channel, &[batch, channels])?;
        base.reshape_blob(ws, self.sum_batch_multiplier, &[batch])?;
        ws.blob_mut(self.sum_batch_multiplier).data_mut().fill(1.0);
        base.reshape_blob(ws, self.sum_spatial_multiplier, &[1, 1, spatial])?;
        ws.blob_mut(self.sum_spatial_multiplier).data_mut().fill(1.0);

        self.dims = (batch, channels, spatial);
        self.base.trace_reshape(ws);
        Ok(())
    }

    fn forward(&self, ws: &Workspace, ctx: &Context) {
        copy_bottom_to_top(&self.base, ws, ctx);

        let blas = ctx.blas();
        let (batch, channels, spatial) = self.dims;
        let mut top = ws.blob_mut(self.base.top(0));
        let mut mean = ws.blob_mut(self.mean);
        let mut variance = ws.blob_mut(self.variance);
        let mut temp = ws.blob_mut(self.temp);
        let mut batch_by_channel = ws.blob_mut(self.batch_by_channel);
        let ones_batch = ws.blob(self.sum_batch_multiplier);
        let ones_spatial = ws.blob(self.sum_spatial_multiplier);
        let count = top.count();
        let inv_count = 1.0 / (batch * spatial) as f32;

        if self.use_global_stats {
            let scale = self.base.param(2).data()[0];
            let factor = if scale == 0.0 { 0.0 } else { 1.0 / scale };
            let (running_mean, running_var) = (self.base.param(0), self.base.param(1));
            blas.binary_scalar(BinaryOp::Mul, channels, running_mean.data(), 0, factor, mean.data_mut(), 0);
            blas.binary_scalar(BinaryOp::Mul, channels, running_var.data(), 0, factor, variance.data_mut(), 0);
        } else {
            blas.gemv(false, batch * channels, spatial, inv_count, top.data(), 0, ones_spatial.data(), 0, 0.0, batch_by_channel.data_mut(), 0);
            blas.gemv(true, batch, channels, 1.0, batch_by_channel.data(), 0, ones_batch.data(), 0, 0.0, mean.data_mut(), 0);
        }

        // top -= mean, broadcast over batch then spatial
        blas.gemm(false, false, batch, channels, 1, 1.0, ones_batch.data(), 0, mean.data(), 0, 0.0, batch_by_channel.data_mut(), 0);
        blas.gemm(false, false, batch * channels, spatial, 1, -1.0, batch_by_channel.data(), 0, ones_spatial.data(), 0, 1.0, top.data_mut(), 0);

        if !self.use_global_stats {
            blas.binary_scalar(BinaryOp::Pow, count, top.data(), 0, 2.0, temp.data_mut(), 0);
            blas.gemv(false, batch * channels, spatial, inv_count, temp.data(), 0, ones_spatial.data(), 0, 0.0, batch_by_channel.data_mut(), 0);
            blas.gemv(true, batch, channels, 1.0, batch_by_channel.data(), 0, ones_batch.data(), 0, 0.0, variance.data_mut(), 0);
        }

        blas.binary_scalar_inplace(BinaryOp::Add, channels, variance.data_mut(), 0, self.eps);
        blas.binary_scalar_inplace(BinaryOp::Pow, channels, variance.data_mut(), 0, 0.5);

        // top /= stddev, broadcast the same way
        blas.gemm(false, false, batch, channels, 1, 1.0, ones_batch.data(), 0, variance.data(), 0, 0.0, batch_by_channel.data_mut(), 0);
        blas.gemm(false, false, batch * channels, spatial, 1, 1.0, batch_by_channel.data(), 0, ones_spatial.data(), 0, 0.0, temp.data_mut(), 0);
        blas.binary_inplace(BinaryOp::Div, count, top.data_mut(), 0, temp.data(), 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::operator::tests::{run, setup_err};

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-4, "{:?} vs {:?}", a, b);
        }
    }

    #[test]
    fn global_statistics_are_descaled() {
        // Stored stats are accumulated ×2, so the factor 2 divides them back out.
        let def = OpDef::new("BatchNorm", "bn")
            .input("data")
            .output("bn")
            .blob(&[2], vec![2.0, 4.0])
            .blob(&[2], vec![8.0, 18.0])
            .blob(&[1], vec![2.0]);
        let (shape, out) = run(&def, &[("data", &[1, 2, 1, 2], &[3.0, 5.0, 2.0, 8.0])]);
        assert_eq!(shape, vec![1, 2, 1, 2]);
        let s0 = (4.0f32 + 1e-5).sqrt();
        let s1 = (9.0f32 + 1e-5).sqrt();
        assert_close(&out, &[2.0 / s0, 4.0 / s0, 0.0, 6.0 / s1]);
    }

    #[test]
    fn batch_statistics_over_batch_and_space() {
        let def = OpDef::new("BatchNorm", "bn")
            .input("data")
            .output("data")
            .arg("use_global_stats", false);
        // Channel 0 sees {1, 3, 5, 7}: mean 4, variance 5.
        let (_, out) = run(
            &def,
            &[("data", &[2, 1, 1, 2], &[1.0, 3.0, 5.0, 7.0])],
        );
        let s = (5.0f32 + 1e-5).sqrt();
        assert_close(&out, &[-3.0 / s, -1.0 / s, 1.0 / s, 3.0 / s]);
    }

    #[test]
    fn global_stats_need_three_blobs() {
        let def = OpDef::new("BatchNorm", "bn").input("data").output("bn");
        let err = setup_err(&def, &[("data", &[1, 2, 2, 2], &[])]);
        assert!(err.to_string().contains("scale factor"));
    }
}
