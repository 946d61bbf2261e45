use std::cell::Ref;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::{
    blas::Context,
    config::EngineConfig,
    operator::{factory::Operators, operator::Operator},
    tensor::Blob,
    utils::{
        error::{Result, ShadowError},
        math::format_shape,
    },
    workspace::{BlobId, Workspace},
};

use super::{
    argument::{ArgType, ArgumentHelper},
    net_def::NetDef,
    weights::{WeightReader, read_weight_file},
};

/// An instantiated network: operators in execution order over one shared
/// workspace.
///
/// Build it once from a [`NetDef`], load weights, then call
/// [`Network::forward`] as often as needed. Output views stay valid until the
/// next call that takes `&mut self`.
pub struct Network {
    name: String,
    ops: Vec<Box<dyn Operator>>,
    ws: Workspace,
    ctx: Context,
    in_blobs: Vec<String>,
    out_blobs: Vec<String>,
    in_ids: Vec<BlobId>,
    args: ArgumentHelper,
    config: EngineConfig,
}

impl Network {
    pub fn new(def: &NetDef, config: &EngineConfig) -> Result<Self> {
        let config = config.clone().build()?;
        let args = ArgumentHelper::new(&def.args, &def.name)?;

        if def.inputs.is_empty() {
            return Err(ShadowError::Network(format!(
                "network {} declares no inputs",
                def.name
            )));
        }

        // Reject unknown types before anything is allocated.
        if let Some(op) = def.ops.iter().find(|op| !Operators::is_registered(&op.op_type)) {
            return Err(ShadowError::UnknownOperator {
                name: op.name.clone(),
                op_type: op.op_type.clone(),
            });
        }

        let mut ws = Workspace::new(config.memory_limit());
        let mut in_blobs = Vec::with_capacity(def.inputs.len());
        let mut in_ids = Vec::with_capacity(def.inputs.len());
        for input in &def.inputs {
            if ws.has_blob(&input.name) {
                return Err(ShadowError::Network(format!(
                    "input {} is declared twice",
                    input.name
                )));
            }
            let mut dims = input.dims.clone();
            validate_input_dims(&input.name, &dims)?;
            dims[0] = config.batch;
            in_ids.push(ws.create_blob_with_shape(&input.name, &dims)?);
            in_blobs.push(input.name.clone());
        }

        let mut ops = Vec::with_capacity(def.ops.len());
        for op_def in &def.ops {
            let mut op = Operators::create(op_def, &mut ws)?;
            op.setup(&mut ws)?;
            op.reshape(&mut ws)?;
            ops.push(op);
        }

        let out_blobs = if def.outputs.is_empty() {
            def.ops
                .last()
                .map(|op| op.outputs.clone())
                .unwrap_or_default()
        } else {
            def.outputs.clone()
        };
        for out in &out_blobs {
            if !ws.has_blob(out) {
                return Err(ShadowError::Network(format!(
                    "output {} is not produced by any operator",
                    out
                )));
            }
        }

        info!(
            "Network {}: {} operators, {} blobs, inputs [{}], outputs [{}], {} of {} bytes in use",
            def.name,
            ops.len(),
            ws.num_blobs(),
            in_blobs.join(", "),
            out_blobs.join(", "),
            ws.memory_in_use(),
            ws.memory_limit()
        );

        Ok(Self {
            name: def.name.clone(),
            ops,
            ws,
            ctx: Context::new(config.backend),
            in_blobs,
            out_blobs,
            in_ids,
            args,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read a weight file, skipping the configured header, and load it.
    pub fn load_weights_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let weights = read_weight_file(path, self.config.weight_header_bytes)?;
        info!("Network {}: read {} floats from {}", self.name, weights.len(), path.display());
        self.load_weights(&weights)
    }

    /// Hand the weight stream to every operator in declaration order.
    pub fn load_weights(&mut self, weights: &[f32]) -> Result<()> {
        let consumed = self.load_weights_upto(weights, self.ops.len())?;
        if consumed < weights.len() {
            warn!(
                "Network {}: {} of {} weights were not used",
                self.name,
                weights.len() - consumed,
                weights.len()
            );
        }
        Ok(())
    }

    /// Load weights for the first `cut_off` operators only, returning the
    /// number of floats consumed.
    pub fn load_weights_upto(&mut self, weights: &[f32], cut_off: usize) -> Result<usize> {
        let mut reader = WeightReader::new(weights);
        for op in self.ops.iter_mut().take(cut_off) {
            let before = reader.consumed();
            op.load_weights(&mut reader)?;
            if reader.consumed() > before {
                debug!("{}({}): loaded {} weights", op.name(), op.op_type(), reader.consumed() - before);
            }
        }
        info!(
            "Network {}: loaded {} weights into {} operators",
            self.name,
            reader.consumed(),
            cut_off.min(self.ops.len())
        );
        Ok(reader.consumed())
    }

    /// Copy each input buffer into its blob, then run every operator.
    ///
    /// Operators after one whose output size is only known at run time
    /// (Proposal, ROIPooling) are reshaped against the live shapes first.
    pub fn forward(&mut self, inputs: &[(&str, &[f32])]) -> Result<()> {
        let mut fed = vec![false; self.in_ids.len()];
        for (name, data) in inputs {
            let index = self.input_index(name)?;
            let mut blob = self.ws.blob_mut(self.in_ids[index]);
            if data.len() != blob.count() {
                return Err(ShadowError::Network(format!(
                    "input {} expects {} values for shape {}, got {}",
                    name,
                    blob.count(),
                    format_shape(blob.shape()),
                    data.len()
                )));
            }
            blob.set_data(data)?;
            fed[index] = true;
        }
        if let Some(missing) = fed.iter().position(|&f| !f) {
            return Err(ShadowError::Network(format!(
                "no data supplied for input {}",
                self.in_blobs[missing]
            )));
        }

        let mut shapes_changed = false;
        for op in &mut self.ops {
            if shapes_changed {
                op.reshape(&mut self.ws)?;
            }
            op.forward(&self.ws, &self.ctx);
            shapes_changed |= op.reshapes_in_forward();
        }
        self.ctx.finish();
        Ok(())
    }

    /// Give inputs new shapes (batch included) and re-run every reshape.
    pub fn reshape_inputs(&mut self, shapes: &[(&str, &[usize])]) -> Result<()> {
        for (name, dims) in shapes {
            let index = self.input_index(name)?;
            validate_input_dims(name, dims)?;
            if dims[0] == 0 {
                return Err(ShadowError::Network(format!("input {} has a zero batch", name)));
            }
            self.ws.reshape_blob(self.in_ids[index], dims)?;
        }
        for op in &mut self.ops {
            op.reshape(&mut self.ws)?;
        }
        debug!(
            "Network {}: reshaped, {} bytes in use, temp buffer {} floats",
            self.name,
            self.ws.memory_in_use(),
            self.ws.temp_buffer_len()
        );
        Ok(())
    }

    pub fn has_blob(&self, name: &str) -> bool {
        self.ws.has_blob(name)
    }

    pub fn blob(&self, name: &str) -> Option<Ref<'_, Blob>> {
        let id = self.ws.blob_id(name).ok()?;
        Some(self.ws.blob(id))
    }

    pub fn output_data(&self, name: &str) -> Result<Ref<'_, [f32]>> {
        let id = self.ws.blob_id(name)?;
        Ok(Ref::map(self.ws.blob(id), |blob| blob.data()))
    }

    pub fn in_blobs(&self) -> &[String] {
        &self.in_blobs
    }

    pub fn out_blobs(&self) -> &[String] {
        &self.out_blobs
    }

    pub fn has_argument(&self, name: &str) -> bool {
        self.args.has_argument(name)
    }

    /// A network-level argument, e.g. `num_classes`.
    pub fn get_single_argument<T: ArgType>(&self, name: &str, default: T) -> Result<T> {
        self.args.single(name, default)
    }

    pub fn get_repeated_argument<T: ArgType>(&self, name: &str, default: Vec<T>) -> Result<Vec<T>> {
        self.args.repeated(name, default)
    }

    /// Drop every operator and free the workspace.
    pub fn release(&mut self) {
        for op in &mut self.ops {
            op.release();
        }
        self.ops.clear();
        self.ws.release();
        self.in_ids.clear();
        info!("Network {}: released", self.name);
    }

    fn input_index(&self, name: &str) -> Result<usize> {
        self.in_blobs
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| ShadowError::Network(format!("{} is not a network input", name)))
    }
}

impl Debug for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Network(name={}, ops={}, inputs={:?}, outputs={:?}, batch={})",
            self.name,
            self.ops.len(),
            self.in_blobs,
            self.out_blobs,
            self.config.batch
        )
    }
}

fn validate_input_dims(name: &str, dims: &[usize]) -> Result<()> {
    if dims.is_empty() {
        return Err(ShadowError::Network(format!("input {} has no dimensions", name)));
    }
    if dims[1..].contains(&0) {
        return Err(ShadowError::Network(format!(
            "input {} has a zero dimension in {}",
            name,
            format_shape(dims)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::net_def::OpDef;

    fn conv_net() -> NetDef {
        NetDef::new("tiny")
            .input("data", &[1, 1, 2, 2])
            .op(OpDef::new("Convolution", "conv1")
                .input("data")
                .output("conv1")
                .arg("num_output", 1)
                .arg("kernel_size", 1))
            .op(OpDef::new("Activate", "relu1")
                .input("conv1")
                .output("conv1")
                .arg("type", 1))
    }

    #[test]
    fn forward_runs_operators_in_order() {
        let mut net = Network::new(&conv_net(), &EngineConfig::default()).unwrap();
        assert_eq!(net.out_blobs(), &["conv1".to_string()]);
        net.load_weights(&[-1.0, 2.0]).unwrap();
        net.forward(&[("data", &[0.0, 1.0, 2.0, -3.0])]).unwrap();
        assert_eq!(&*net.output_data("conv1").unwrap(), &[0.0, 1.0, 3.0, 0.0]);
    }

    #[test]
    fn batch_comes_from_the_config() {
        let config = EngineConfig {
            batch: 3,
            ..Default::default()
        };
        let net = Network::new(&conv_net(), &config).unwrap();
        assert_eq!(net.blob("data").unwrap().shape(), &[3, 1, 2, 2]);
        assert_eq!(net.blob("conv1").unwrap().shape(), &[3, 1, 2, 2]);
    }

    #[test]
    fn forward_checks_input_names_and_lengths() {
        let mut net = Network::new(&conv_net(), &EngineConfig::default()).unwrap();
        assert!(matches!(
            net.forward(&[("image", &[0.0; 4])]),
            Err(ShadowError::Network(_))
        ));
        assert!(matches!(
            net.forward(&[("data", &[0.0; 3])]),
            Err(ShadowError::Network(_))
        ));
        assert!(matches!(net.forward(&[]), Err(ShadowError::Network(_))));
    }

    #[test]
    fn reshape_inputs_propagates() {
        let mut net = Network::new(&conv_net(), &EngineConfig::default()).unwrap();
        net.reshape_inputs(&[("data", &[2, 1, 3, 3])]).unwrap();
        assert_eq!(net.blob("conv1").unwrap().shape(), &[2, 1, 3, 3]);
        net.forward(&[("data", &[1.0; 18])]).unwrap();
        assert_eq!(net.output_data("conv1").unwrap().len(), 18);
    }

    #[test]
    fn upto_leaves_later_operators_untouched() {
        let mut net = Network::new(&conv_net(), &EngineConfig::default()).unwrap();
        assert_eq!(net.load_weights_upto(&[1.0, 2.0, 3.0], 0).unwrap(), 0);
        assert_eq!(net.load_weights_upto(&[1.0, 2.0, 3.0], 2).unwrap(), 2);
    }

    #[test]
    fn empty_and_zero_inputs_are_rejected() {
        let no_inputs = NetDef::new("empty");
        assert!(Network::new(&no_inputs, &EngineConfig::default()).is_err());

        let zero_dim = NetDef::new("zero").input("data", &[1, 0, 4]);
        assert!(matches!(
            Network::new(&zero_dim, &EngineConfig::default()),
            Err(ShadowError::Network(_))
        ));

        let no_dims = NetDef::new("nodims").input("data", &[]);
        assert!(Network::new(&no_dims, &EngineConfig::default()).is_err());
    }

    #[test]
    fn unknown_types_are_reported_before_building() {
        let def = NetDef::new("bad")
            .input("data", &[1, 4])
            .op(OpDef::new("Dropout", "drop").input("missing").output("drop"))
            .op(OpDef::new("Softmax", "prob").input("drop").output("prob"));
        match Network::new(&def, &EngineConfig::default()) {
            Err(ShadowError::UnknownOperator { name, op_type }) => {
                assert_eq!(name, "prob");
                assert_eq!(op_type, "Softmax");
            }
            other => panic!("expected an unknown operator, got {:?}", other),
        }
    }

    #[test]
    fn net_arguments_and_release() {
        let def = conv_net().arg("num_classes", 10);
        let mut net = Network::new(&def, &EngineConfig::default()).unwrap();
        assert_eq!(net.get_single_argument("num_classes", 1000i32).unwrap(), 10);
        assert_eq!(net.get_single_argument("missing", 7i32).unwrap(), 7);
        net.release();
        assert_eq!(net.num_ops(), 0);
        assert!(net.blob("data").is_none());
    }
}
