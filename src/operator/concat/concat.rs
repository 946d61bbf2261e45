use crate::{
    blas::Context,
    network::net_def::OpDef,
    operator::operator::{OpBase, Operator},
    utils::{error::Result, macros::op_ensure},
    workspace::Workspace,
};

use super::f32_cpu::concat_into;

#[derive(Debug)]
pub struct ConcatOp {
    base: OpBase,
    axis: usize,
    outer: usize,
    inner: usize,
    // per bottom
    axis_lens: Vec<usize>,
}

impl ConcatOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        Ok(Self {
            base: OpBase::new(def, ws)?,
            axis: 1,
            outer: 0,
            inner: 0,
            axis_lens: Vec::new(),
        })
    }
}

impl Operator for ConcatOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn setup(&mut self, ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        base.check_io(1, 1, true)?;
        op_ensure!(base, base.tops().len() == 1, "expects a single top");
        op_ensure!(
            base,
            !base.bottoms().contains(&base.top(0)),
            "cannot run in place"
        );
        let axis = base.arg::<i64>("axis", 1)?;
        self.axis = ws
            .blob(base.bottom(0))
            .canonical_index(axis)
            .map_err(|e| base.error(e.to_string()))?;
        Ok(())
    }

    fn reshape(&mut self, ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        let first = ws.blob_shape(base.bottom(0));
        let mut top_shape = first.clone();
        let mut axis_lens = Vec::with_capacity(base.bottoms().len());
        axis_lens.push(first[self.axis]);
        for &id in &base.bottoms()[1..] {
            let shape = ws.blob_shape(id);
            op_ensure!(
                base,
                shape.len() == first.len(),
                "all bottoms need {} axes, got {:?}",
                first.len(),
                shape
            );
            for (i, (&a, &b)) in shape.iter().zip(&first).enumerate() {
                op_ensure!(
                    base,
                    i == self.axis || a == b,
                    "bottom {:?} does not match {:?} outside axis {}",
                    shape,
                    first,
                    self.axis
                );
            }
            top_shape[self.axis] += shape[self.axis];
            axis_lens.push(shape[self.axis]);
        }
        base.reshape_top(ws, 0, &top_shape)?;
        self.outer = first[..self.axis].iter().product();
        self.inner = first[self.axis + 1..].iter().product();
        self.axis_lens = axis_lens;
        self.base.trace_reshape(ws);
        Ok(())
    }

    fn forward(&self, ws: &Workspace, _ctx: &Context) {
        let mut top = ws.blob_mut(self.base.top(0));
        let dst_axis: usize = self.axis_lens.iter().sum();
        let mut offset = 0;
        for (&id, &len) in self.base.bottoms().iter().zip(&self.axis_lens) {
            let bottom = ws.blob(id);
            concat_into(bottom.data(), self.outer, self.inner, len, dst_axis, offset, top.data_mut());
            offset += len;
        }
    }
}
