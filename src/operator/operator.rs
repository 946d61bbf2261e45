use std::fmt::Debug;

use tracing::debug;

use crate::{
    blas::Context,
    network::{
        argument::{ArgType, ArgumentHelper},
        net_def::OpDef,
        weights::WeightReader,
    },
    tensor::Blob,
    utils::{
        error::{Result, ShadowError},
        math::format_shape,
    },
    workspace::{BlobId, Workspace},
};

/// State shared by every operator: identity, arguments, blob bindings and
/// owned parameters.
///
/// Bottoms and tops are handles into the network's workspace; the operator
/// never owns them. Parameter blobs (weights, biases, statistics) are owned.
#[derive(Debug)]
pub struct OpBase {
    name: String,
    op_type: String,
    args: ArgumentHelper,
    bottoms: Vec<BlobId>,
    tops: Vec<BlobId>,
    params: Vec<Blob>,
}

impl OpBase {
    pub fn new(def: &OpDef, ws: &mut Workspace) -> Result<Self> {
        let args = ArgumentHelper::new(&def.args, &def.name)?;

        // Bottoms must already exist: graph order is the declaration order.
        let bottoms = def
            .inputs
            .iter()
            .map(|input| {
                ws.blob_id(input).map_err(|_| {
                    ShadowError::operator(
                        &def.name,
                        &def.op_type,
                        format!("bottom blob {} is not produced by an earlier operator", input),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let tops = def.outputs.iter().map(|output| ws.create_blob(output)).collect();

        let mut params = Vec::with_capacity(def.blobs.len());
        for (i, blob_def) in def.blobs.iter().enumerate() {
            let mut blob = Blob::with_shape(format!("{}_param_{}", def.name, i), &blob_def.shape)
                .map_err(|e| ShadowError::operator(&def.name, &def.op_type, e.to_string()))?;
            if !blob_def.data.is_empty() {
                blob.set_data(&blob_def.data)
                    .map_err(|e| ShadowError::operator(&def.name, &def.op_type, e.to_string()))?;
            }
            params.push(blob);
        }

        Ok(Self {
            name: def.name.clone(),
            op_type: def.op_type.clone(),
            args,
            bottoms,
            tops,
            params,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn bottoms(&self) -> &[BlobId] {
        &self.bottoms
    }

    pub fn tops(&self) -> &[BlobId] {
        &self.tops
    }

    pub fn bottom(&self, i: usize) -> BlobId {
        self.bottoms[i]
    }

    pub fn top(&self, i: usize) -> BlobId {
        self.tops[i]
    }

    /// True when the first top is the first bottom.
    pub fn in_place(&self) -> bool {
        !self.bottoms.is_empty() && !self.tops.is_empty() && self.bottoms[0] == self.tops[0]
    }

    pub fn has_arg(&self, name: &str) -> bool {
        self.args.has_argument(name)
    }

    pub fn arg<T: ArgType>(&self, name: &str, default: T) -> Result<T> {
        self.args
            .single(name, default)
            .map_err(|e| self.error(e.to_string()))
    }

    pub fn repeated_arg<T: ArgType>(&self, name: &str, default: Vec<T>) -> Result<Vec<T>> {
        self.args
            .repeated(name, default)
            .map_err(|e| self.error(e.to_string()))
    }

    pub fn params(&self) -> &[Blob] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Vec<Blob> {
        &mut self.params
    }

    pub fn param(&self, i: usize) -> &Blob {
        &self.params[i]
    }

    pub fn error(&self, message: impl Into<String>) -> ShadowError {
        ShadowError::operator(&self.name, &self.op_type, message)
    }

    /// Require exactly (or at least, with `at_least`) this many bottoms and tops.
    pub fn check_io(&self, bottoms: usize, tops: usize, at_least: bool) -> Result<()> {
        let ok = if at_least {
            self.bottoms.len() >= bottoms && self.tops.len() >= tops
        } else {
            self.bottoms.len() == bottoms && self.tops.len() == tops
        };
        if !ok {
            return Err(self.error(format!(
                "expects {}{} bottoms and {} tops, got {} and {}",
                if at_least { "at least " } else { "" },
                bottoms,
                tops,
                self.bottoms.len(),
                self.tops.len()
            )));
        }
        Ok(())
    }

    /// Reshape top `i`, reporting budget failures against this operator.
    pub fn reshape_top(&self, ws: &mut Workspace, i: usize, dims: &[usize]) -> Result<()> {
        self.reshape_blob(ws, self.tops[i], dims)
    }

    /// Reshape a workspace blob this operator writes, such as a scratch
    /// multiplier.
    pub fn reshape_blob(&self, ws: &mut Workspace, id: BlobId, dims: &[usize]) -> Result<()> {
        ws.reshape_blob(id, dims)
            .map_err(|e| self.error(e.to_string()))
    }

    pub fn grow_temp_buffer(&self, ws: &mut Workspace, count: usize) -> Result<()> {
        ws.grow_temp_buffer(count)
            .map_err(|e| self.error(e.to_string()))
    }

    /// A zero-filled parameter blob named after this operator.
    pub fn new_param(&self, suffix: &str, dims: &[usize]) -> Result<Blob> {
        Blob::with_shape(format!("{}_{}", self.name, suffix), dims)
            .map_err(|e| self.error(e.to_string()))
    }

    pub(crate) fn trace_reshape(&self, ws: &Workspace) {
        let describe = |ids: &[BlobId]| {
            ids.iter()
                .map(|&id| {
                    let blob = ws.blob(id);
                    format!("{}{}", blob.name(), format_shape(blob.shape()))
                })
                .collect::<Vec<_>>()
                .join(" + ")
        };
        debug!(
            "{}({}): {} -> {}",
            self.name,
            self.op_type,
            describe(&self.bottoms),
            describe(&self.tops)
        );
    }
}

/// The operator lifecycle: `setup` once, `reshape` whenever input shapes
/// change, `forward` any number of times against the last reshape.
pub trait Operator: Debug {
    fn base(&self) -> &OpBase;

    fn base_mut(&mut self) -> &mut OpBase;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn op_type(&self) -> &str {
        self.base().op_type()
    }

    // Reads arguments and validates or creates parameter blobs.
    fn setup(&mut self, _ws: &mut Workspace) -> Result<()> {
        Ok(())
    }

    // Recomputes top and scratch shapes from the current bottom shapes.
    fn reshape(&mut self, ws: &mut Workspace) -> Result<()>;

    // Pure computation over already-shaped buffers.
    fn forward(&self, ws: &Workspace, ctx: &Context);

    /// True when `forward` may shrink this operator's tops. The network then
    /// reshapes every later operator before running it.
    fn reshapes_in_forward(&self) -> bool {
        false
    }

    // Pulls this operator's parameters from the weight stream, if it has any.
    fn load_weights(&mut self, _reader: &mut WeightReader<'_>) -> Result<()> {
        Ok(())
    }

    fn release(&mut self) {
        self.base_mut().params_mut().clear();
    }
}

/// Copy bottom 0 into top 0 unless they are the same blob.
pub(crate) fn copy_bottom_to_top(base: &OpBase, ws: &Workspace, ctx: &Context) {
    if base.in_place() {
        return;
    }
    let bottom = ws.blob(base.bottom(0));
    let mut top = ws.blob_mut(base.top(0));
    let count = bottom.count();
    ctx.blas().copy(count, bottom.data(), 0, top.data_mut(), 0);
}
