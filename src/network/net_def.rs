use super::argument::{ArgValue, Argument};

/// An inline parameter blob attached to an operator definition.
///
/// Empty `data` leaves the parameter zero-initialised.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlobDef {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// One operator record of a network definition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OpDef {
    pub op_type: String,
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub args: Vec<Argument>,
    pub blobs: Vec<BlobDef>,
}

impl OpDef {
    pub fn new(op_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.push(Argument::new(name, value));
        self
    }

    pub fn blob(mut self, shape: &[usize], data: Vec<f32>) -> Self {
        self.blobs.push(BlobDef {
            shape: shape.to_vec(),
            data,
        });
        self
    }
}

/// A declared network input. Dimension 0 is the batch and is replaced by the
/// configured batch size.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputDef {
    pub name: String,
    pub dims: Vec<usize>,
}

/// A parsed network descriptor: inputs, then operators in execution order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetDef {
    pub name: String,
    pub inputs: Vec<InputDef>,
    pub outputs: Vec<String>,
    pub ops: Vec<OpDef>,
    pub args: Vec<Argument>,
}

impl NetDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn input(mut self, name: impl Into<String>, dims: &[usize]) -> Self {
        self.inputs.push(InputDef {
            name: name.into(),
            dims: dims.to_vec(),
        });
        self
    }

    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    pub fn op(mut self, op: OpDef) -> Self {
        self.ops.push(op);
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.push(Argument::new(name, value));
        self
    }
}
