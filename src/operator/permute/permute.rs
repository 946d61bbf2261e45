use crate::{
    blas::Context,
    network::net_def::OpDef,
    operator::operator::{OpBase, Operator},
    utils::{error::Result, macros::op_ensure},
    workspace::Workspace,
};

use super::f32_cpu::permute;

/// Axis permutation. Axes missing from `order` keep their relative order
/// after the listed ones.
#[derive(Debug)]
pub struct PermuteOp {
    base: OpBase,
    order: Vec<usize>,
    bottom_shape: Vec<usize>,
}

impl PermuteOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        Ok(Self {
            base: OpBase::new(def, ws)?,
            order: Vec::new(),
            bottom_shape: Vec::new(),
        })
    }
}

impl Operator for PermuteOp {
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
        let num_axes = ws.blob(base.bottom(0)).num_axes();
        let requested = base.repeated_arg::<usize>("order", Vec::new())?;

        let mut order = Vec::with_capacity(num_axes);
        for axis in requested {
            op_ensure!(base, axis < num_axes, "order axis {} out of range for {} axes", axis, num_axes);
            op_ensure!(base, !order.contains(&axis), "order axis {} is duplicated", axis);
            order.push(axis);
        }
        for axis in 0..num_axes {
            if !order.contains(&axis) {
                order.push(axis);
            }
        }
        self.order = order;
        Ok(())
    }

    fn reshape(&mut self, ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        let shape = ws.blob_shape(base.bottom(0));
        op_ensure!(
            base,
            shape.len() == self.order.len(),
            "bottom rank changed from {} to {}",
            self.order.len(),
            shape.len()
        );
        let top_shape: Vec<usize> = self.order.iter().map(|&axis| shape[axis]).collect();
        base.reshape_top(ws, 0, &top_shape)?;
        self.bottom_shape = shape;
        self.base.trace_reshape(ws);
        Ok(())
    }

    fn forward(&self, ws: &Workspace, _ctx: &Context) {
        let bottom = ws.blob(self.base.bottom(0));
        let mut top = ws.blob_mut(self.base.top(0));
        permute(bottom.data(), &self.bottom_shape, &self.order, top.data_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::operator::tests::{run, setup_err};

    #[test]
    fn nchw_to_nhwc() {
        // (1, 2, 1, 3) channels-first → (1, 1, 3, 2)
        let def = OpDef::new("Permute", "perm")
            .input("data")
            .output("perm")
            .arg("order", vec![0, 2, 3, 1]);
        let (shape, out) = run(&def, &[("data", &[1, 2, 1, 3], &[1.0, 2.0, 3.0, 10.0, 20.0, 30.0])]);
        assert_eq!(shape, vec![1, 1, 3, 2]);
        assert_eq!(out, vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
    }

    #[test]
    fn missing_axes_are_appended() {
        let def = OpDef::new("Permute", "perm")
            .input("data")
            .output("perm")
            .arg("order", vec![2]);
        let (shape, _) = run(&def, &[("data", &[2, 3, 4], &[0.0; 24])]);
        assert_eq!(shape, vec![4, 2, 3]);
    }

    #[test]
    fn duplicate_axes_are_rejected() {
        let def = OpDef::new("Permute", "perm")
            .input("data")
            .output("perm")
            .arg("order", vec![1, 1]);
        let err = setup_err(&def, &[("data", &[2, 3], &[])]);
        assert!(err.to_string().contains("duplicated"));
    }
}
