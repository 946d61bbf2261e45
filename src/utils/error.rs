use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShadowError>;

#[derive(Error, Debug)]
pub enum ShadowError {
    #[error("Operator {name} ({op_type}): {message}")]
    Operator {
        name: String,
        op_type: String,
        message: String,
    },

    #[error("Unknown operator type {op_type} for operator {name}")]
    UnknownOperator { name: String, op_type: String },

    #[error("Argument {name}: {message}")]
    Argument { name: String, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error(
        "Weight stream underrun in operator {op}: needed {needed} floats, only {remaining} remaining"
    )]
    WeightUnderrun {
        op: String,
        needed: usize,
        remaining: usize,
    },

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShadowError {
    pub fn operator(name: &str, op_type: &str, message: impl Into<String>) -> Self {
        ShadowError::Operator {
            name: name.to_string(),
            op_type: op_type.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_error_names_the_operator() {
        let err = ShadowError::operator("conv1", "Convolution", "kernel_size must be > 0");
        assert_eq!(
            err.to_string(),
            "Operator conv1 (Convolution): kernel_size must be > 0"
        );
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.weights");
        let err: ShadowError = io.into();
        assert!(matches!(err, ShadowError::Io(_)));
    }
}
