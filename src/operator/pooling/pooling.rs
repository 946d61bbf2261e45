use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    blas::Context,
    network::net_def::OpDef,
    operator::operator::{OpBase, Operator},
    tensor::shape::pool_out_size,
    utils::{error::Result, macros::op_ensure},
    workspace::Workspace,
};

use super::f32_cpu::{PoolGeometry, PoolMode, pooling};

pub struct PoolingOp {
    base: OpBase,
    mode: PoolMode,
    kernel_size: usize,
    stride: usize,
    pad: usize,
    global_pooling: bool,
    full_pooling: bool,
    geometry: Option<PoolGeometry>,
}

impl PoolingOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        Ok(Self {
            base: OpBase::new(def, ws)?,
            mode: PoolMode::Max,
            kernel_size: 0,
            stride: 1,
            pad: 0,
            global_pooling: false,
            full_pooling: true,
            geometry: None,
        })
    }
}

impl Debug for PoolingOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Pooling(name={}, mode={:?}, kernel_size={}, stride={}, pad={}, global={}, full={})",
            self.base.name(),
            self.mode,
            self.kernel_size,
            self.stride,
            self.pad,
            self.global_pooling,
            self.full_pooling
        )
    }
}

impl Operator for PoolingOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn setup(&mut self, _ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        base.check_io(1, 1, false)?;
        op_ensure!(base, !base.in_place(), "cannot run in place");
        self.mode = match base.arg::<i32>("pool", 0)? {
            0 => PoolMode::Max,
            1 => PoolMode::Ave,
            other => return Err(base.error(format!("unknown pool mode {}", other))),
        };
        self.global_pooling = base.arg("global_pooling", false)?;
        self.full_pooling = base.arg("full_pooling", true)?;
        self.kernel_size = base.arg("kernel_size", 0usize)?;
        self.stride = base.arg("stride", 1usize)?;
        self.pad = base.arg("pad", 0usize)?;
        if !self.global_pooling {
            op_ensure!(base, self.kernel_size > 0, "kernel_size must be > 0");
            op_ensure!(base, self.stride > 0, "stride must be > 0");
            op_ensure!(
                base,
                self.pad < self.kernel_size,
                "pad {} must be smaller than kernel_size {}",
                self.pad,
                self.kernel_size
            );
        }
        Ok(())
    }

    fn reshape(&mut self, ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        let shape = ws.blob_shape(base.bottom(0));
        op_ensure!(base, shape.len() == 4, "expects a 4-D bottom, got {:?}", shape);
        let (batch, channels, in_h, in_w) = (shape[0], shape[1], shape[2], shape[3]);

        let (kernel_h, kernel_w, stride, pad) = if self.global_pooling {
            (in_h, in_w, 1, 0)
        } else {
            (self.kernel_size, self.kernel_size, self.stride, self.pad)
        };
        op_ensure!(
            base,
            in_h + 2 * pad >= kernel_h && in_w + 2 * pad >= kernel_w,
            "kernel {}x{} exceeds padded input {}x{}",
            kernel_h,
            kernel_w,
            in_h + 2 * pad,
            in_w + 2 * pad
        );
        let out_h = pool_out_size(in_h, kernel_h, stride, pad, self.full_pooling);
        let out_w = pool_out_size(in_w, kernel_w, stride, pad, self.full_pooling);
        base.reshape_top(ws, 0, &[batch, channels, out_h, out_w])?;

        self.geometry = Some(PoolGeometry {
            batch,
            channels,
            in_h,
            in_w,
            kernel_h,
            kernel_w,
            stride,
            pad,
            out_h,
            out_w,
        });
        self.base.trace_reshape(ws);
        Ok(())
    }

    fn forward(&self, ws: &Workspace, _ctx: &Context) {
        let Some(g) = self.geometry.as_ref() else {
            return;
        };
        let bottom = ws.blob(self.base.bottom(0));
        let mut top = ws.blob_mut(self.base.top(0));
        pooling(bottom.data(), g, self.mode, top.data_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::operator::tests::{run, setup_err};

    #[test]
    fn max_pooling_op() {
        let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let def = OpDef::new("Pooling", "pool")
            .input("data")
            .output("pool")
            .arg("kernel_size", 2)
            .arg("stride", 2);
        let (shape, out) = run(&def, &[("data", &[1, 1, 4, 4], &data)]);
        assert_eq!(shape, vec![1, 1, 2, 2]);
        assert_eq!(out, vec![5.0, 7.0, 13.0, 15.0]);
    }

    #[test]
    fn global_average_pooling() {
        let def = OpDef::new("Pooling", "gap")
            .input("data")
            .output("gap")
            .arg("pool", 1)
            .arg("global_pooling", true);
        let (shape, out) = run(
            &def,
            &[("data", &[1, 2, 2, 2], &[1.0, 2.0, 3.0, 4.0, 10.0, 10.0, 10.0, 10.0])],
        );
        assert_eq!(shape, vec![1, 2, 1, 1]);
        assert_eq!(out, vec![2.5, 10.0]);
    }

    #[test]
    fn floor_mode_drops_partial_windows() {
        let def = OpDef::new("Pooling", "pool")
            .input("data")
            .output("pool")
            .arg("kernel_size", 2)
            .arg("stride", 2)
            .arg("full_pooling", false);
        let (shape, _) = run(&def, &[("data", &[1, 1, 5, 5], &[0.0; 25])]);
        assert_eq!(shape, vec![1, 1, 2, 2]);
    }

    #[test]
    fn rejects_unknown_mode() {
        let def = OpDef::new("Pooling", "pool")
            .input("data")
            .output("pool")
            .arg("pool", 3)
            .arg("kernel_size", 2);
        let err = setup_err(&def, &[("data", &[1, 1, 4, 4], &[])]);
        assert!(err.to_string().contains("unknown pool mode 3"));
    }
}
