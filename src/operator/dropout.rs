use crate::{
    blas::Context,
    network::net_def::OpDef,
    operator::operator::{OpBase, Operator, copy_bottom_to_top},
    utils::error::Result,
    workspace::Workspace,
};

/// Inference-time dropout is the identity.
#[derive(Debug)]
pub struct DropoutOp {
    base: OpBase,
}

impl DropoutOp {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        Ok(Self {
            base: OpBase::new(def, ws)?,
        })
    }
}

impl Operator for DropoutOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn setup(&mut self, _ws: &mut Workspace) -> Result<()> {
        self.base.check_io(1, 1, false)
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
    }
}
