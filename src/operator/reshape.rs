use crate::{
    blas::Context,
    network::net_def::OpDef,
    operator::operator::{OpBase, Operator, copy_bottom_to_top},
    utils::{error::Result, macros::op_ensure},
    workspace::Workspace,
};

/// Replaces axes `axis .. axis + num_axis` of the bottom with `shape`.
///
/// In `shape`, 0 copies the corresponding bottom dimension and a single -1
/// is inferred from the remaining element count.
#[derive(Debug)]
pub struct ReshapeOp {
    base: OpBase,
    shape: Vec<i64>,
    axis: i64,
    num_axis: i64,
    inferred_axis: Option<usize>,
}

impl ReshapeOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        Ok(Self {
            base: OpBase::new(def, ws)?,
            shape: Vec::new(),
            axis: 0,
            num_axis: -1,
            inferred_axis: None,
        })
    }

    fn top_shape(&self, bottom: &[usize]) -> Result<Vec<usize>> {
        let base = &self.base;
        let num_axes = bottom.len() as i64;
        op_ensure!(
            base,
            self.axis >= -(num_axes + 1) && self.axis <= num_axes,
            "axis {} out of range for {} axes",
            self.axis,
            num_axes
        );
        let start = if self.axis < 0 {
            self.axis + num_axes + 1
        } else {
            self.axis
        } as usize;
        let end = if self.num_axis == -1 {
            bottom.len()
        } else {
            start + self.num_axis as usize
        };
        op_ensure!(
            base,
            end <= bottom.len(),
            "axis {} + num_axis {} exceeds {} axes",
            start,
            self.num_axis,
            num_axes
        );

        let mut top = bottom[..start].to_vec();
        for (i, &d) in self.shape.iter().enumerate() {
            let dim = match d {
                0 => {
                    op_ensure!(
                        base,
                        start + i < bottom.len(),
                        "shape entry {} copies a missing bottom axis",
                        i
                    );
                    bottom[start + i]
                }
                -1 => 1,
                d => d as usize,
            };
            top.push(dim);
        }
        top.extend_from_slice(&bottom[end..]);

        let bottom_count: usize = bottom.iter().product();
        if let Some(i) = self.inferred_axis {
            let known: usize = top.iter().product();
            op_ensure!(
                base,
                known > 0 && bottom_count % known == 0,
                "cannot infer axis {} of {:?} from {} elements",
                i,
                self.shape,
                bottom_count
            );
            top[start + i] = bottom_count / known;
        }
        let top_count: usize = top.iter().product();
        op_ensure!(
            base,
            top_count == bottom_count,
            "reshape from {:?} to {:?} changes the element count",
            bottom,
            top
        );
        Ok(top)
    }
}

impl Operator for ReshapeOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn setup(&mut self, _ws: &mut Workspace) -> Result<()> {
        let base = &self.base;
        base.check_io(1, 1, false)?;
        self.shape = base.repeated_arg("shape", Vec::new())?;
        self.axis = base.arg("axis", 0i64)?;
        self.num_axis = base.arg("num_axis", -1i64)?;
        op_ensure!(base, self.num_axis >= -1, "num_axis must be >= -1");

        let mut inferred = None;
        for (i, &d) in self.shape.iter().enumerate() {
            op_ensure!(base, d >= -1, "shape entry {} is {}", i, d);
            if d == -1 {
                op_ensure!(base, inferred.is_none(), "only one shape entry may be -1");
                inferred = Some(i);
            }
        }
        self.inferred_axis = inferred;
        Ok(())
    }

    fn reshape(&mut self, ws: &mut Workspace) -> Result<()> {
        let bottom_shape = ws.blob_shape(self.base.bottom(0));
        let top_shape = self.top_shape(&bottom_shape)?;
        self.base.reshape_top(ws, 0, &top_shape)?;
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
    use crate::operator::operator::tests::{run, setup_err};

    fn reshape_def(shape: Vec<i64>) -> OpDef {
        OpDef::new("Reshape", "reshape")
            .input("data")
            .output("reshape")
            .arg("shape", shape)
    }

    #[test]
    fn copies_and_infers_dims() {
        let data: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let (shape, out) = run(&reshape_def(vec![0, -1, 4]), &[("data", &[2, 3, 4], &data)]);
        assert_eq!(shape, vec![2, 3, 4]);
        assert_eq!(out, data);

        let (shape, _) = run(&reshape_def(vec![-1]), &[("data", &[2, 3, 4], &data)]);
        assert_eq!(shape, vec![24]);
    }

    #[test]
    fn partial_axis_range() {
        let def = reshape_def(vec![2, 3]).arg("axis", 1).arg("num_axis", 1);
        let (shape, _) = run(&def, &[("data", &[4, 6, 5], &[0.0; 120])]);
        assert_eq!(shape, vec![4, 2, 3, 5]);
    }

    #[test]
    fn rejects_count_changes_and_double_inference() {
        let err = setup_err(&reshape_def(vec![5, 5]), &[("data", &[2, 3, 4], &[])]);
        assert!(err.to_string().contains("element count"));

        let err = setup_err(&reshape_def(vec![-1, -1]), &[("data", &[2, 3, 4], &[])]);
        assert!(err.to_string().contains("only one"));
    }
}
