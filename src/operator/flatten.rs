use crate::{
    blas::Context,
    network::net_def::OpDef,
    operator::operator::{OpBase, Operator, copy_bottom_to_top},
    utils::{error::Result, macros::op_ensure},
    workspace::Workspace,
};

/// Collapses axes `axis ..= end_axis` into one. Data is untouched; when the
/// top is a separate blob the values are copied across.
#[derive(Debug)]
pub struct FlattenOp {
    base: OpBase,
    axis: i64,
    end_axis: i64,
}

impl FlattenOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        Ok(Self {
            base: OpBase::new(def, ws)?,
            axis: 1,
            end_axis: -1,
        })
    }
}

/// Shape after merging `axis ..= end_axis` (both already canonical).
pub(crate) fn flatten_shape(shape: &[usize], axis: usize, end_axis: usize) -> Vec<usize> {
    let mut top_shape = shape[..axis].to_vec();
    top_shape.push(shape[axis..=end_axis].iter().product());
    top_shape.extend_from_slice(&shape[end_axis + 1..]);
    top_shape
}

impl Operator for FlattenOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn setup(&mut self, _ws: &mut Workspace) -> Result<()> {
        self.base.check_io(1, 1, false)?;
        self.axis = self.base.arg("axis", 1i64)?;
        self.end_axis = self.base.arg("end_axis", -1i64)?;
        Ok(())
    }

    fn reshape(&mut self, ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        let bottom_id = base.bottom(0);
        let (axis, end_axis) = {
            let bottom = ws.blob(bottom_id);
            let axis = bottom.canonical_index(self.axis);
            let end_axis = bottom.canonical_index(self.end_axis);
            match (axis, end_axis) {
                (Ok(a), Ok(e)) => (a, e),
                (Err(e), _) | (_, Err(e)) => return Err(base.error(e.to_string())),
            }
        };
        op_ensure!(
            base,
            axis <= end_axis,
            "axis {} must not come after end_axis {}",
            axis,
            end_axis
        );
        let top_shape = flatten_shape(&ws.blob_shape(bottom_id), axis, end_axis);
        base.reshape_top(ws, 0, &top_shape)?;
        self.base.trace_reshape(ws);
        Ok(())
    }

    fn forward(&self, ws: &Workspace, ctx: &Context) {
        copy_bottom_to_top(&self.base, ws, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::operator::tests::{build, run};

    #[test]
    fn merges_trailing_axes() {
        assert_eq!(flatten_shape(&[2, 3, 4, 5], 1, 3), vec![2, 60]);
        assert_eq!(flatten_shape(&[2, 3, 4, 5], 1, 2), vec![2, 12, 5]);
        assert_eq!(flatten_shape(&[7], 0, 0), vec![7]);
    }

    #[test]
    fn copies_into_a_separate_top() {
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let def = OpDef::new("Flatten", "flat").input("data").output("flat");
        let (shape, out) = run(&def, &[("data", &[2, 3, 2], &data)]);
        assert_eq!(shape, vec![2, 6]);
        assert_eq!(out, data);
    }

    #[test]
    fn in_place_only_changes_the_shape() {
        let def = OpDef::new("Flatten", "flat")
            .input("data")
            .output("data")
            .arg("axis", 0);
        let (ws, op) = build(&def, &[("data", &[2, 2], &[1.0, 2.0, 3.0, 4.0])]);
        let blob = ws.blob(op.base().top(0));
        assert_eq!(blob.shape(), &[4]);
        assert_eq!(blob.data(), &[1.0, 2.0, 3.0, 4.0]);
    }
}
